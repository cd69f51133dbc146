use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Browser window identifier.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct WindowId(u32);

impl WindowId {
    pub const fn new(id: u32) -> Self { Self(id) }

    pub const fn get(self) -> u32 { self.0 }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

impl FromStr for WindowId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> { s.parse().map(WindowId) }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct TabId(u32);

impl TabId {
    pub const fn new(id: u32) -> Self { Self(id) }

    pub const fn get(self) -> u32 { self.0 }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

/// Integer window bounds, the only form handed to window placement calls.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub top: i32,
    pub left: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(top: i32, left: i32, width: i32, height: i32) -> Self {
        Self { top, left, width, height }
    }
}

/// A screen area in (possibly fractional, zoom adjusted) CSS pixels.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenRect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl ScreenRect {
    pub const fn new(top: f64, left: f64, width: f64, height: f64) -> Self {
        Self { top, left, width, height }
    }

    pub fn scaled(self, zoom: f64) -> Self {
        Self {
            top: self.top * zoom,
            left: self.left * zoom,
            width: self.width * zoom,
            height: self.height * zoom,
        }
    }
}

/// Last screen rectangle seen by the coordination context. Any field may be
/// missing on first run.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PartialScreen {
    pub top: Option<f64>,
    pub left: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

impl PartialScreen {
    /// Fills every missing field from `display`.
    pub fn or(self, display: ScreenRect) -> ScreenRect {
        ScreenRect {
            top: self.top.unwrap_or(display.top),
            left: self.left.unwrap_or(display.left),
            width: self.width.filter(|w| *w > 0.0).unwrap_or(display.width),
            height: self.height.filter(|h| *h > 0.0).unwrap_or(display.height),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self { Self { x, y } }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_screen_falls_back_per_field() {
        let display = ScreenRect::new(0.0, 0.0, 1920.0, 1080.0);
        let last = PartialScreen {
            top: Some(25.0),
            left: None,
            width: Some(0.0),
            height: Some(900.0),
        };
        assert_eq!(last.or(display), ScreenRect::new(25.0, 0.0, 1920.0, 900.0));
    }

    #[test]
    fn window_id_round_trips_through_map_keys() {
        let id: WindowId = "42".parse().unwrap();
        assert_eq!(id, WindowId::new(42));
        assert_eq!(id.to_string(), "42");
        assert!("savedPositionAndSize".parse::<WindowId>().is_err());
    }
}

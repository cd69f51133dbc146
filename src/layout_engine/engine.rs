use strum::{AsRefStr, Display};
use tracing::trace;

use crate::common::config::Config;
use crate::model::geometry::{Rect, ScreenRect};
use crate::model::popup_info::SavedGeometry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum PlacementSource {
    Domain,
    Global,
    Centered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub source: PlacementSource,
    pub bounds: Rect,
}

/// Decides where a new preview window goes.
///
/// Lookup order is the remembered geometry for the target's hostname, then
/// the last geometry used anywhere, then a default-sized window centered on
/// the last known screen rectangle.
pub struct GeometryResolver<'a> {
    config: &'a Config,
}

impl<'a> GeometryResolver<'a> {
    pub fn new(config: &'a Config) -> Self { Self { config } }

    /// `display` is the requesting display's available area. It only fills
    /// in parts of the stored screen rectangle that are missing.
    pub fn resolve(&self, host: Option<&str>, display: ScreenRect) -> Placement {
        let saved = self.config.popup_windows_info.saved();
        let placement = self.remembered(saved, host).unwrap_or_else(|| self.centered(display));
        trace!(
            ?host,
            source = %placement.source,
            bounds = ?placement.bounds,
            "resolved popup geometry"
        );
        placement
    }

    fn remembered(&self, saved: &SavedGeometry, host: Option<&str>) -> Option<Placement> {
        if self.config.remember_popup_size_and_position_for_domain
            && let Some(bounds) = host.and_then(|h| saved.for_domain(h)).filter(usable)
        {
            return Some(Placement { source: PlacementSource::Domain, bounds });
        }
        if self.config.remember_popup_size_and_position
            && let Some(bounds) = saved.global.filter(usable)
        {
            return Some(Placement { source: PlacementSource::Global, bounds });
        }
        None
    }

    fn centered(&self, display: ScreenRect) -> Placement {
        let (width, height) = self.config.popup_size();
        let (width, height) = (f64::from(width), f64::from(height));
        let screen = self.config.last_screen().or(display);

        let left = clamp_start(
            screen.left + (screen.width - width) / 2.0,
            screen.left,
            screen.width,
            width,
        );
        let top = clamp_start(
            screen.top + (screen.height - height) / 2.0,
            screen.top,
            screen.height,
            height,
        );

        Placement {
            source: PlacementSource::Centered,
            bounds: Rect::new(round(top), round(left), round(width), round(height)),
        }
    }
}

fn usable(rect: &Rect) -> bool { rect.width > 0 && rect.height > 0 }

/// Keeps `[pos, pos + size]` inside `[start, start + extent]`; when the window
/// is larger than the screen it is pinned to `start`.
fn clamp_start(pos: f64, start: f64, extent: f64, size: f64) -> f64 {
    pos.min(start + extent - size).max(start)
}

fn round(v: f64) -> i32 { v.round() as i32 }

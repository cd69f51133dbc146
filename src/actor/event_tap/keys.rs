use std::time::Duration;

use bitflags::bitflags;
use tokio::time::Instant;

use crate::common::config::DoubleTapKey;

/// Two presses of the same key closer than this count as a double tap.
pub const KEY_REPEAT_WINDOW: Duration = Duration::from_millis(300);

pub const ESCAPE: &str = "Escape";

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u8 {
        const CTRL = 1 << 0;
        const ALT = 1 << 1;
        const SHIFT = 1 << 2;
        const META = 1 << 3;
    }
}

impl DoubleTapKey {
    pub fn modifier(self) -> Option<Modifiers> {
        match self {
            DoubleTapKey::None => None,
            DoubleTapKey::Ctrl => Some(Modifiers::CTRL),
            DoubleTapKey::Alt => Some(Modifiers::ALT),
            DoubleTapKey::Shift => Some(Modifiers::SHIFT),
            DoubleTapKey::Meta => Some(Modifiers::META),
        }
    }
}

/// Detects the same key pressed twice in quick succession while a modifier
/// is held.
#[derive(Debug, Default)]
pub struct KeyRepeatDetector {
    last: Option<(String, Instant)>,
}

impl KeyRepeatDetector {
    /// Returns true when this press completes a double tap. A completed double
    /// tap is forgotten, so a third press starts over.
    pub fn observe(
        &mut self,
        key: &str,
        held: Modifiers,
        required: Modifiers,
        now: Instant,
    ) -> bool {
        let repeat = held.contains(required)
            && self.last.as_ref().is_some_and(|(last, at)| {
                last == key && now.saturating_duration_since(*at) < KEY_REPEAT_WINDOW
            });
        if repeat {
            self.last = None;
        } else {
            self.last = Some((key.to_owned(), now));
        }
        repeat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_tap_with_modifier_held() {
        let t0 = Instant::now();
        let ctrl = Modifiers::CTRL;
        let mut d = KeyRepeatDetector::default();
        assert!(!d.observe("Control", ctrl, ctrl, t0));
        assert!(d.observe("Control", ctrl, ctrl, t0 + Duration::from_millis(120)));
        // Third press starts a new sequence.
        assert!(!d.observe("Control", ctrl, ctrl, t0 + Duration::from_millis(200)));
    }

    #[test]
    fn slow_or_unmodified_presses_do_not_count() {
        let t0 = Instant::now();
        let mut d = KeyRepeatDetector::default();
        let alt = Modifiers::ALT;
        assert!(!d.observe("a", alt, alt, t0));
        assert!(!d.observe("a", alt, alt, t0 + KEY_REPEAT_WINDOW));

        let mut d = KeyRepeatDetector::default();
        assert!(!d.observe("a", Modifiers::empty(), alt, t0));
        assert!(!d.observe("a", Modifiers::SHIFT, alt, t0 + Duration::from_millis(10)));
    }

    #[test]
    fn different_key_resets() {
        let t0 = Instant::now();
        let mut d = KeyRepeatDetector::default();
        let meta = Modifiers::META;
        assert!(!d.observe("Meta", meta, meta, t0));
        assert!(!d.observe("k", meta, meta, t0 + Duration::from_millis(50)));
        assert!(d.observe("k", meta, meta, t0 + Duration::from_millis(100)));
    }

    #[test]
    fn double_tap_key_modifiers() {
        assert_eq!(DoubleTapKey::None.modifier(), None);
        assert_eq!(DoubleTapKey::Ctrl.modifier(), Some(Modifiers::CTRL));
        assert_eq!("Meta".parse::<DoubleTapKey>().unwrap().modifier(), Some(Modifiers::META));
    }
}

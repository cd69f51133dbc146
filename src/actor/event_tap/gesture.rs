//! Click disambiguation for links.
//!
//! A click on a link is held back for [`SINGLE_CLICK_DELAY`]. If a second
//! click arrives first, the pair is a double click and the link is followed
//! normally; otherwise the held click becomes a preview request. The machine
//! is pure: callers pass the current time in and carry out the returned
//! [`Effect`]s.

use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use super::keys::{ESCAPE, KeyRepeatDetector, Modifiers};
use crate::common::config::{Config, DoubleTapKey};
use crate::model::geometry::Point;
use crate::model::message::Request;
use crate::model::url_pattern::UrlPatterns;
use crate::ui::overlay::BlurStyle;

pub const SINGLE_CLICK_DELAY: Duration = Duration::from_millis(250);
/// Longer than [`SINGLE_CLICK_DELAY`]: a second click 250-300ms after the
/// first arrives after the preview was already requested. It is swallowed
/// rather than followed, so that click pair still yields exactly one preview.
pub const DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(300);
/// Pointer-downs this soon after the window gains focus are swallowed.
pub const FOCUS_GUARD: Duration = Duration::from_millis(50);
pub const MASK_SETTLE_DELAY: Duration = Duration::from_millis(50);

/// Page options the machine reacts to.
#[derive(Debug, Clone)]
pub struct GestureSettings {
    pub preview_enabled: bool,
    pub preview_disabled: UrlPatterns,
    pub link_disabled: UrlPatterns,
    pub close_by_esc: bool,
    pub close_when_focused: bool,
    pub double_tap: DoubleTapKey,
    pub blur: Option<BlurStyle>,
}

impl From<&Config> for GestureSettings {
    fn from(config: &Config) -> Self {
        GestureSettings {
            preview_enabled: config.preview_mode_enable,
            preview_disabled: config.preview_disabled_patterns(),
            link_disabled: config.link_disabled_patterns(),
            close_by_esc: config.close_by_esc,
            close_when_focused: config.close_when_focused_initial_window,
            double_tap: config.double_tap_key_to_send_page_back,
            blur: config.blur(),
        }
    }
}

impl Default for GestureSettings {
    fn default() -> Self { GestureSettings::from(&Config::default()) }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClickState {
    Idle,
    ArmedSingleClick {
        link: String,
        pointer: Point,
        token: u64,
        armed_at: Instant,
    },
    /// A double click was recognised; the re-dispatched click for `link` must
    /// pass through untouched.
    DoubleClickSuppressed { link: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Message for the coordinator.
    Send(Request),
    /// Ask the coordinator for a preview of `link`.
    RequestPreview { link: String, pointer: Point },
    /// Refresh the toolbar icon for this page.
    UpdateIcon,
    ArmTimer { token: u64, delay: Duration },
    CancelTimer { token: u64 },
    Redispatch(String),
    ApplyBlur(BlurStyle),
    RemoveBlur,
    ApplyClickMask,
    RemoveClickMask { after: Duration },
    ClearSelection,
}

/// What should happen to the page's own handling of an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Default,
    Suppress,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub disposition: Disposition,
    pub effects: Vec<Effect>,
}

impl Outcome {
    fn pass(effects: Vec<Effect>) -> Self { Outcome { disposition: Disposition::Default, effects } }

    fn suppress(effects: Vec<Effect>) -> Self {
        Outcome { disposition: Disposition::Suppress, effects }
    }
}

#[derive(Debug)]
pub struct GestureMachine {
    settings: GestureSettings,
    state: ClickState,
    preview_mode: bool,
    mouse_down: bool,
    popup_triggered: bool,
    focus_at: Option<Instant>,
    last_fired: Option<Instant>,
    blur_shown: bool,
    next_token: u64,
    keys: KeyRepeatDetector,
}

impl GestureMachine {
    pub fn new(settings: GestureSettings, location: &str) -> Self {
        let mut machine = GestureMachine {
            settings,
            state: ClickState::Idle,
            preview_mode: false,
            mouse_down: false,
            popup_triggered: false,
            focus_at: None,
            last_fired: None,
            blur_shown: false,
            next_token: 1,
            keys: KeyRepeatDetector::default(),
        };
        machine.evaluate(location);
        machine
    }

    pub fn state(&self) -> &ClickState { &self.state }

    /// Whether links on the current page are intercepted.
    pub fn preview_mode(&self) -> bool { self.preview_mode }

    pub fn settings(&self) -> &GestureSettings { &self.settings }

    fn evaluate(&mut self, location: &str) {
        self.preview_mode =
            self.settings.preview_enabled && !self.settings.preview_disabled.matches(location);
        self.popup_triggered = false;
    }

    /// New options or a new page address.
    pub fn reconfigure(&mut self, settings: GestureSettings, location: &str) -> Outcome {
        self.settings = settings;
        self.location_changed(location)
    }

    pub fn location_changed(&mut self, location: &str) -> Outcome {
        self.evaluate(location);
        trace!(location, preview_mode = self.preview_mode, "preview eligibility evaluated");
        Outcome::pass(vec![Effect::UpdateIcon])
    }

    fn link_ignored(&self, link: &str) -> bool {
        link.trim_start().starts_with("javascript:") || self.settings.link_disabled.matches(link)
    }

    fn remove_blur(&mut self, effects: &mut Vec<Effect>) {
        if std::mem::take(&mut self.blur_shown) {
            effects.push(Effect::RemoveBlur);
        }
    }

    pub fn pointer_down(&mut self, link: Option<&str>, now: Instant) -> Outcome {
        if !self.preview_mode {
            return Outcome::pass(Vec::new());
        }
        if let Some(at) = self.focus_at
            && now.saturating_duration_since(at) < FOCUS_GUARD
        {
            trace!("pointer-down right after focus swallowed");
            return Outcome::suppress(Vec::new());
        }
        self.focus_at = None;

        let mut effects = Vec::new();
        self.remove_blur(&mut effects);
        if !link.is_some_and(|l| self.link_ignored(l)) {
            effects.push(Effect::UpdateIcon);
        }
        if self.settings.close_when_focused {
            effects.push(Effect::Send(Request::WindowRegainedFocus));
        }
        effects.push(Effect::Send(Request::SavePositionSize));

        self.mouse_down = true;
        self.popup_triggered = false;
        Outcome::pass(effects)
    }

    pub fn click(&mut self, link: Option<&str>, pointer: Point, now: Instant) -> Outcome {
        if !self.preview_mode {
            return Outcome::pass(Vec::new());
        }
        let Some(link) = link.filter(|l| !self.link_ignored(l)) else {
            return Outcome::pass(vec![Effect::UpdateIcon]);
        };

        match std::mem::replace(&mut self.state, ClickState::Idle) {
            ClickState::DoubleClickSuppressed { link: replayed } if replayed == link => {
                trace!(link, "re-dispatched click passes through");
                Outcome::pass(vec![Effect::UpdateIcon])
            }
            ClickState::ArmedSingleClick { token, armed_at, .. }
                if now.saturating_duration_since(armed_at) < DOUBLE_CLICK_WINDOW =>
            {
                trace!(link, "double click; following link normally");
                self.state = ClickState::DoubleClickSuppressed { link: link.to_owned() };
                Outcome::suppress(vec![
                    Effect::CancelTimer { token },
                    Effect::Redispatch(link.to_owned()),
                    Effect::UpdateIcon,
                ])
            }
            previous => {
                let mut effects = Vec::new();
                if let ClickState::ArmedSingleClick { token, .. } = previous {
                    effects.push(Effect::CancelTimer { token });
                }
                if let Some(fired) = self.last_fired
                    && now.saturating_duration_since(fired) < DOUBLE_CLICK_WINDOW
                {
                    trace!(link, "second click after preview fired swallowed");
                    return Outcome::suppress(effects);
                }

                let token = self.next_token;
                self.next_token += 1;
                self.state = ClickState::ArmedSingleClick {
                    link: link.to_owned(),
                    pointer,
                    token,
                    armed_at: now,
                };
                effects.push(Effect::ArmTimer { token, delay: SINGLE_CLICK_DELAY });
                effects.push(Effect::UpdateIcon);
                Outcome::suppress(effects)
            }
        }
    }

    /// The single-click timer `token` expired.
    pub fn timer_fired(&mut self, token: u64, now: Instant) -> Outcome {
        let (link, pointer) = match &self.state {
            ClickState::ArmedSingleClick { token: armed, link, pointer, .. } if *armed == token => {
                (link.clone(), *pointer)
            }
            _ => {
                trace!(token, "stale click timer ignored");
                return Outcome::pass(Vec::new());
            }
        };
        self.state = ClickState::Idle;
        if !self.mouse_down || self.popup_triggered {
            return Outcome::pass(Vec::new());
        }

        self.popup_triggered = true;
        self.last_fired = Some(now);
        let mut effects = Vec::new();
        if let Some(style) = self.settings.blur {
            self.blur_shown = true;
            effects.push(Effect::ApplyBlur(style));
        }
        effects.push(Effect::ApplyClickMask);
        effects.push(Effect::RequestPreview { link, pointer });
        Outcome::pass(effects)
    }

    pub fn focus_gained(&mut self, now: Instant) -> Outcome {
        self.focus_at = Some(now);
        if matches!(self.state, ClickState::DoubleClickSuppressed { .. }) {
            self.state = ClickState::Idle;
        }

        let mut effects = Vec::new();
        self.remove_blur(&mut effects);
        effects.push(Effect::UpdateIcon);
        if self.settings.close_when_focused {
            effects.push(Effect::Send(Request::WindowRegainedFocus));
        }
        effects.push(Effect::ClearSelection);
        effects.push(Effect::RemoveClickMask { after: MASK_SETTLE_DELAY });
        Outcome::pass(effects)
    }

    /// Scrolling a popup may have been preceded by a move or resize that no
    /// pointer-down reported.
    pub fn scroll_end(&mut self) -> Outcome {
        if !self.preview_mode {
            return Outcome::pass(Vec::new());
        }
        Outcome::pass(vec![Effect::Send(Request::SavePositionSize)])
    }

    pub fn key_down(&mut self, key: &str, held: Modifiers, now: Instant) -> Outcome {
        if key == ESCAPE {
            if !self.settings.close_by_esc {
                return Outcome::pass(Vec::new());
            }
            return Outcome::pass(vec![Effect::Send(Request::CloseCurrentTab)]);
        }
        let Some(required) = self.settings.double_tap.modifier() else {
            return Outcome::pass(Vec::new());
        };
        if self.keys.observe(key, held, required, now) {
            Outcome::pass(vec![Effect::Send(Request::SendPageBack)])
        } else {
            Outcome::pass(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const PAGE: &str = "https://news.test/front";
    const LINK: &str = "https://example.com/a";

    fn ms(n: u64) -> Duration { Duration::from_millis(n) }

    fn machine() -> GestureMachine { GestureMachine::new(GestureSettings::default(), PAGE) }

    fn previews(outcome: &Outcome) -> usize {
        outcome.effects.iter().filter(|e| matches!(e, Effect::RequestPreview { .. })).count()
    }

    fn armed_token(outcome: &Outcome) -> u64 {
        outcome
            .effects
            .iter()
            .find_map(|e| match e {
                Effect::ArmTimer { token, .. } => Some(*token),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn lone_click_becomes_one_preview() {
        let t0 = Instant::now();
        let mut m = machine();
        m.pointer_down(Some(LINK), t0);
        let click = m.click(Some(LINK), Point::new(10.0, 20.0), t0 + ms(5));
        assert_eq!(click.disposition, Disposition::Suppress);
        let token = armed_token(&click);
        assert!(click.effects.contains(&Effect::ArmTimer { token, delay: SINGLE_CLICK_DELAY }));

        let fired = m.timer_fired(token, t0 + ms(255));
        assert_eq!(previews(&fired), 1);
        assert!(fired.effects.contains(&Effect::ApplyClickMask));
        assert!(fired.effects.contains(&Effect::RequestPreview {
            link: LINK.to_owned(),
            pointer: Point::new(10.0, 20.0),
        }));
        assert_eq!(m.state(), &ClickState::Idle);

        // The same token cannot fire twice.
        assert_eq!(previews(&m.timer_fired(token, t0 + ms(300))), 0);
    }

    #[test]
    fn double_click_never_previews() {
        let t0 = Instant::now();
        let mut m = machine();
        m.pointer_down(Some(LINK), t0);
        let first = m.click(Some(LINK), Point::default(), t0);
        let token = armed_token(&first);

        m.pointer_down(Some(LINK), t0 + ms(100));
        let second = m.click(Some(LINK), Point::default(), t0 + ms(120));
        assert_eq!(second.disposition, Disposition::Suppress);
        assert_eq!(second.effects[..2], [
            Effect::CancelTimer { token },
            Effect::Redispatch(LINK.to_owned()),
        ]);

        // A timer that was already in flight must not produce a preview.
        assert_eq!(previews(&m.timer_fired(token, t0 + ms(250))), 0);

        let replay = m.click(Some(LINK), Point::default(), t0 + ms(125));
        assert_eq!(replay.disposition, Disposition::Default);
        assert_eq!(m.state(), &ClickState::Idle);
    }

    #[test]
    fn late_second_click_is_swallowed() {
        let t0 = Instant::now();
        let mut m = machine();
        m.pointer_down(Some(LINK), t0);
        let token = armed_token(&m.click(Some(LINK), Point::default(), t0));
        assert_eq!(previews(&m.timer_fired(token, t0 + ms(250))), 1);

        let late = m.click(Some(LINK), Point::default(), t0 + ms(280));
        assert_eq!(late.disposition, Disposition::Suppress);
        assert!(late.effects.is_empty());
        assert_eq!(m.state(), &ClickState::Idle);
    }

    #[test]
    fn ignored_links_pass_through() {
        let settings = GestureSettings {
            link_disabled: UrlPatterns::new(["https://bank.test/*"]),
            ..GestureSettings::default()
        };
        let mut m = GestureMachine::new(settings, PAGE);
        let t0 = Instant::now();

        for link in ["javascript:void(0)", "https://bank.test/login"] {
            let down = m.pointer_down(Some(link), t0);
            assert_eq!(down.disposition, Disposition::Default);
            assert!(down.effects.contains(&Effect::Send(Request::SavePositionSize)));
            let click = m.click(Some(link), Point::default(), t0);
            assert_eq!(click.disposition, Disposition::Default);
        }
        let plain = m.click(None, Point::default(), t0);
        assert_eq!(plain.disposition, Disposition::Default);
        assert_eq!(m.state(), &ClickState::Idle);
    }

    #[test]
    fn disabled_page_is_not_intercepted() {
        let settings = GestureSettings {
            preview_disabled: UrlPatterns::new(["https://news.test/*"]),
            ..GestureSettings::default()
        };
        let mut m = GestureMachine::new(settings.clone(), PAGE);
        assert!(!m.preview_mode());
        let click = m.click(Some(LINK), Point::default(), Instant::now());
        assert_eq!(click, Outcome::pass(Vec::new()));

        m.reconfigure(settings, "https://other.test/");
        assert!(m.preview_mode());
    }

    #[test]
    fn focus_guard_swallows_immediate_pointer_down() {
        let t0 = Instant::now();
        let mut m = machine();
        let focus = m.focus_gained(t0);
        assert!(focus.effects.contains(&Effect::RemoveClickMask { after: MASK_SETTLE_DELAY }));
        assert!(focus.effects.contains(&Effect::Send(Request::WindowRegainedFocus)));

        let early = m.pointer_down(Some(LINK), t0 + ms(10));
        assert_eq!(early, Outcome::suppress(Vec::new()));
        let later = m.pointer_down(Some(LINK), t0 + ms(60));
        assert_eq!(later.disposition, Disposition::Default);
    }

    #[test]
    fn blur_is_shown_on_preview_and_removed_on_focus() {
        let t0 = Instant::now();
        let mut m = machine();
        m.pointer_down(Some(LINK), t0);
        let token = armed_token(&m.click(Some(LINK), Point::default(), t0));
        let fired = m.timer_fired(token, t0 + ms(250));
        assert_eq!(fired.effects[0], Effect::ApplyBlur(BlurStyle { px: 3.0, secs: 1.0 }));

        let focus = m.focus_gained(t0 + ms(900));
        assert_eq!(focus.effects[0], Effect::RemoveBlur);
        let again = m.focus_gained(t0 + ms(950));
        assert!(!again.effects.contains(&Effect::RemoveBlur));
    }

    #[test]
    fn timer_without_pointer_down_does_nothing() {
        let t0 = Instant::now();
        let mut m = machine();
        let token = armed_token(&m.click(Some(LINK), Point::default(), t0));
        assert_eq!(m.timer_fired(token, t0 + ms(250)), Outcome::pass(Vec::new()));
    }

    #[test]
    fn scroll_end_saves_geometry_only_in_preview_mode() {
        let mut m = machine();
        assert_eq!(m.scroll_end(), Outcome::pass(vec![Effect::Send(Request::SavePositionSize)]));

        let settings = GestureSettings { preview_enabled: false, ..GestureSettings::default() };
        let mut off = GestureMachine::new(settings, PAGE);
        assert_eq!(off.scroll_end(), Outcome::pass(Vec::new()));
    }

    #[test]
    fn keys_close_and_send_back() {
        let t0 = Instant::now();
        let mut m = machine();
        assert_eq!(m.key_down(ESCAPE, Modifiers::empty(), t0).effects, [Effect::Send(
            Request::CloseCurrentTab
        )]);

        assert!(m.key_down("Control", Modifiers::CTRL, t0).effects.is_empty());
        assert_eq!(m.key_down("Control", Modifiers::CTRL, t0 + ms(150)).effects, [Effect::Send(
            Request::SendPageBack
        )]);

        let settings = GestureSettings {
            close_by_esc: false,
            double_tap: DoubleTapKey::None,
            ..GestureSettings::default()
        };
        let mut m = GestureMachine::new(settings, PAGE);
        assert!(m.key_down(ESCAPE, Modifiers::empty(), t0).effects.is_empty());
        m.key_down("Control", Modifiers::CTRL, t0);
        assert!(m.key_down("Control", Modifiers::CTRL, t0 + ms(10)).effects.is_empty());
    }
}

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn from_prefers_dark(dark: bool) -> Self { if dark { Theme::Dark } else { Theme::Light } }
}

/// Inputs that decide which toolbar icon is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IconState {
    pub theme: Theme,
    /// Preview mode as reported by the page; `None` when the page did not say.
    pub page_preview_mode: Option<bool>,
    /// The global preview mode switch.
    pub preview_enabled: bool,
}

pub const ICON_LIGHT: &str = "resources/icon.svg";
pub const ICON_DARK: &str = "resources/icon-dark.svg";
pub const ICON_DISABLED_LIGHT: &str = "resources/inBlacklist.png";
pub const ICON_DISABLED_DARK: &str = "resources/inBlacklist-dark.svg";

/// The disabled-list icon is only shown when preview mode is globally on but
/// the page opted out.
pub fn icon_path(state: IconState) -> &'static str {
    let page_disabled = state.preview_enabled && state.page_preview_mode == Some(false);
    match (state.theme, page_disabled) {
        (Theme::Dark, true) => ICON_DISABLED_DARK,
        (Theme::Dark, false) => ICON_DARK,
        (Theme::Light, true) => ICON_DISABLED_LIGHT,
        (Theme::Light, false) => ICON_LIGHT,
    }
}

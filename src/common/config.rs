//! User configuration.
//!
//! Every option is stored under its own key in the [`ConfigStore`]. Loading
//! overlays the stored keys on the defaults, so a missing or unreadable key
//! never fails the load; it just keeps its default.

use std::path::PathBuf;

use once_cell::sync::Lazy;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};
use tracing::{debug, info, warn};

use crate::model::geometry::PartialScreen;
use crate::model::popup_info::PopupWindowsInfo;
use crate::model::url_pattern::UrlPatterns;
use crate::sys::browser::{BrowserFamily, WindowType};
use crate::sys::storage::{ConfigStore, Entries, StoreError};
use crate::ui::overlay::BlurStyle;

pub const DEFAULT_POPUP_WIDTH: u32 = 1000;
pub const DEFAULT_POPUP_HEIGHT: u32 = 800;

pub mod keys {
    pub const CLOSE_WHEN_FOCUSED_INITIAL_WINDOW: &str = "closeWhenFocusedInitialWindow";
    pub const BLUR_ENABLE: &str = "blurEnable";
    pub const BLUR_PX: &str = "blurPx";
    pub const BLUR_TIME: &str = "blurTime";
    pub const REMEMBER_POPUP_SIZE_AND_POSITION: &str = "rememberPopupSizeAndPosition";
    pub const REMEMBER_POPUP_SIZE_AND_POSITION_FOR_DOMAIN: &str =
        "rememberPopupSizeAndPositionForDomain";
    pub const POPUP_WINDOWS_INFO: &str = "popupWindowsInfo";
    pub const CLOSE_BY_ESC: &str = "closeByEsc";
    pub const DOUBLE_TAP_KEY_TO_SEND_PAGE_BACK: &str = "doubleTapKeyToSendPageBack";
    pub const PREVIEW_MODE_DISABLED_URLS: &str = "previewModeDisabledUrls";
    pub const PREVIEW_MODE_WINDOW_TYPE: &str = "previewModeWindowType";
    pub const PREVIEW_MODE_ENABLE: &str = "previewModeEnable";
    pub const DOUBLE_CLICK_AS_CLICK: &str = "doubleClickAsClick";
    pub const IS_FIREFOX: &str = "isFirefox";
    pub const LINK_DISABLED_URLS: &str = "linkDisabledUrls";
    pub const ENABLE_CONTAINER_IDENTIFY: &str = "enableContainerIdentify";
    pub const POPUP_WIDTH: &str = "popupWidth";
    pub const POPUP_HEIGHT: &str = "popupHeight";
    pub const LAST_SCREEN_TOP: &str = "lastScreenTop";
    pub const LAST_SCREEN_LEFT: &str = "lastScreenLeft";
    pub const LAST_SCREEN_WIDTH: &str = "lastScreenWidth";
    pub const LAST_SCREEN_HEIGHT: &str = "lastScreenHeight";
    pub const LAST_CLIENT_X: &str = "lastClientX";
    pub const LAST_CLIENT_Y: &str = "lastClientY";
}

/// Keys the page context reacts to.
pub const PAGE_KEYS: &[&str] = &[
    keys::PREVIEW_MODE_DISABLED_URLS,
    keys::LINK_DISABLED_URLS,
    keys::CLOSE_WHEN_FOCUSED_INITIAL_WINDOW,
    keys::CLOSE_BY_ESC,
    keys::DOUBLE_TAP_KEY_TO_SEND_PAGE_BACK,
    keys::PREVIEW_MODE_WINDOW_TYPE,
    keys::PREVIEW_MODE_ENABLE,
    keys::BLUR_ENABLE,
    keys::BLUR_PX,
    keys::BLUR_TIME,
    keys::ENABLE_CONTAINER_IDENTIFY,
];

/// Modifier that has to be held while double tapping a key to send the page
/// back to its origin window.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, AsRefStr,
)]
pub enum DoubleTapKey {
    None,
    #[default]
    Ctrl,
    Alt,
    Shift,
    Meta,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub close_when_focused_initial_window: bool,
    pub blur_enable: bool,
    #[serde(deserialize_with = "lenient_f64")]
    pub blur_px: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub blur_time: f64,
    pub remember_popup_size_and_position: bool,
    pub remember_popup_size_and_position_for_domain: bool,
    pub popup_windows_info: PopupWindowsInfo,
    pub close_by_esc: bool,
    pub double_tap_key_to_send_page_back: DoubleTapKey,
    pub preview_mode_disabled_urls: Vec<String>,
    pub preview_mode_window_type: WindowType,
    pub preview_mode_enable: bool,
    pub double_click_as_click: bool,
    pub is_firefox: bool,
    pub link_disabled_urls: Vec<String>,
    pub enable_container_identify: bool,
    #[serde(deserialize_with = "lenient_dimension", skip_serializing_if = "Option::is_none")]
    pub popup_width: Option<u32>,
    #[serde(deserialize_with = "lenient_dimension", skip_serializing_if = "Option::is_none")]
    pub popup_height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_screen_top: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_screen_left: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_screen_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_screen_height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_client_x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_client_y: Option<f64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            close_when_focused_initial_window: true,
            blur_enable: true,
            blur_px: 3.0,
            blur_time: 1.0,
            remember_popup_size_and_position: true,
            remember_popup_size_and_position_for_domain: true,
            popup_windows_info: PopupWindowsInfo::default(),
            close_by_esc: true,
            double_tap_key_to_send_page_back: DoubleTapKey::Ctrl,
            preview_mode_disabled_urls: Vec::new(),
            preview_mode_window_type: WindowType::Popup,
            preview_mode_enable: true,
            double_click_as_click: true,
            is_firefox: false,
            link_disabled_urls: Vec::new(),
            enable_container_identify: true,
            popup_width: None,
            popup_height: None,
            last_screen_top: None,
            last_screen_left: None,
            last_screen_width: None,
            last_screen_height: None,
            last_client_x: None,
            last_client_y: None,
        }
    }
}

static DEFAULT_ENTRIES: Lazy<Entries> = Lazy::new(|| match serde_json::to_value(Config::default()) {
    Ok(Value::Object(map)) => map,
    _ => Entries::new(),
});

impl Config {
    /// Default values keyed by storage name. Optional keys without a default
    /// are absent.
    pub fn default_entries() -> &'static Entries { &DEFAULT_ENTRIES }

    /// Every key the configuration reads, including the optional ones.
    pub fn all_keys() -> Vec<&'static str> {
        use keys::*;
        let mut all: Vec<&'static str> = vec![
            CLOSE_WHEN_FOCUSED_INITIAL_WINDOW,
            BLUR_ENABLE,
            BLUR_PX,
            BLUR_TIME,
            REMEMBER_POPUP_SIZE_AND_POSITION,
            REMEMBER_POPUP_SIZE_AND_POSITION_FOR_DOMAIN,
            POPUP_WINDOWS_INFO,
            CLOSE_BY_ESC,
            DOUBLE_TAP_KEY_TO_SEND_PAGE_BACK,
            PREVIEW_MODE_DISABLED_URLS,
            PREVIEW_MODE_WINDOW_TYPE,
            PREVIEW_MODE_ENABLE,
            DOUBLE_CLICK_AS_CLICK,
            IS_FIREFOX,
            LINK_DISABLED_URLS,
            ENABLE_CONTAINER_IDENTIFY,
        ];
        all.extend([
            POPUP_WIDTH,
            POPUP_HEIGHT,
            LAST_SCREEN_TOP,
            LAST_SCREEN_LEFT,
            LAST_SCREEN_WIDTH,
            LAST_SCREEN_HEIGHT,
            LAST_CLIENT_X,
            LAST_CLIENT_Y,
        ]);
        all
    }

    /// Overlays `stored` on the defaults. Stored values that do not parse are
    /// dropped with a warning and their default is kept.
    pub fn from_entries(stored: Entries) -> Config {
        let mut merged = Config::default_entries().clone();
        for (key, value) in stored {
            if value.is_null() && !is_optional_key(&key) {
                continue;
            }
            let mut candidate = Config::default_entries().clone();
            candidate.insert(key.clone(), value.clone());
            match serde_json::from_value::<Config>(Value::Object(candidate)) {
                Ok(_) => {
                    merged.insert(key, value);
                }
                Err(e) => warn!(%key, "Ignoring unreadable stored option: {e}"),
            }
        }
        serde_json::from_value(Value::Object(merged)).unwrap_or_else(|e| {
            warn!("Falling back to default configuration: {e}");
            Config::default()
        })
    }

    pub fn last_screen(&self) -> PartialScreen {
        PartialScreen {
            top: self.last_screen_top,
            left: self.last_screen_left,
            width: self.last_screen_width,
            height: self.last_screen_height,
        }
    }

    pub fn popup_size(&self) -> (u32, u32) {
        (
            self.popup_width.unwrap_or(DEFAULT_POPUP_WIDTH),
            self.popup_height.unwrap_or(DEFAULT_POPUP_HEIGHT),
        )
    }

    pub fn blur(&self) -> Option<BlurStyle> {
        self.blur_enable.then_some(BlurStyle { px: self.blur_px, secs: self.blur_time })
    }

    pub fn link_disabled_patterns(&self) -> UrlPatterns { UrlPatterns::new(&self.link_disabled_urls) }

    pub fn preview_disabled_patterns(&self) -> UrlPatterns {
        UrlPatterns::new(&self.preview_mode_disabled_urls)
    }
}

fn is_optional_key(key: &str) -> bool { !Config::default_entries().contains_key(key) }

/// Reads the whole configuration. The snapshot is only as fresh as this call.
pub async fn load<S: ConfigStore>(store: &S) -> Result<Config, StoreError> {
    let stored = store.get(&Config::all_keys()).await?;
    Ok(Config::from_entries(stored))
}

/// Writes `value` under `key`.
pub async fn save<S: ConfigStore, T: Serialize>(
    store: &S,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let value = serde_json::to_value(value)
        .map_err(|source| StoreError::Codec { key: key.to_owned(), source })?;
    let mut items = Entries::new();
    items.insert(key.to_owned(), value);
    store.set(items).await
}

/// First-run setup: stores every default that is not stored yet, plus the
/// browser family. Returns the keys written.
pub async fn install_defaults<S: ConfigStore>(
    store: &S,
    family: BrowserFamily,
) -> Result<Vec<String>, StoreError> {
    let stored = store.get(&Config::all_keys()).await?;
    let mut missing: Entries = Config::default_entries()
        .iter()
        .filter(|(key, _)| !stored.contains_key(key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    if missing.contains_key(keys::IS_FIREFOX) {
        missing.insert(keys::IS_FIREFOX.to_owned(), Value::Bool(family == BrowserFamily::Firefox));
    }

    let written: Vec<String> = missing.keys().cloned().collect();
    if !missing.is_empty() {
        store.set(missing).await?;
    }
    info!(count = written.len(), %family, "installed default options");
    Ok(written)
}

/// Parses option overrides from TOML. Keys use the storage names.
pub fn parse_overrides(text: &str) -> Result<Entries, toml::de::Error> {
    let table: Entries = toml::from_str(text)?;
    for key in table.keys() {
        if !Config::all_keys().contains(&key.as_str()) {
            debug!(%key, "override for unknown option");
        }
    }
    Ok(table)
}

pub fn default_overrides_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("popup-preview").join("config.toml"))
}

fn number_from(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Accepts numbers and numeric strings, as written by the options page.
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where D: Deserializer<'de> {
    let value = Value::deserialize(deserializer)?;
    number_from(&value).ok_or_else(|| de::Error::custom(format!("expected a number, got {value}")))
}

/// Like `parseInt(v) || fallback`: zero, blanks and `null` mean "unset".
fn lenient_dimension<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where D: Deserializer<'de> {
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    if let Value::String(s) = &value
        && s.trim().is_empty()
    {
        return Ok(None);
    }
    let n = number_from(&value)
        .ok_or_else(|| de::Error::custom(format!("expected a dimension, got {value}")))?;
    Ok((n >= 1.0).then(|| n.trunc().min(u32::MAX as f64) as u32))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::sys::storage::MemoryStore;

    fn entries(value: Value) -> Entries {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn defaults_use_storage_key_names() {
        let defaults = Config::default_entries();
        assert_eq!(defaults.get("previewModeEnable"), Some(&json!(true)));
        assert_eq!(defaults.get("doubleTapKeyToSendPageBack"), Some(&json!("Ctrl")));
        assert_eq!(defaults.get("previewModeWindowType"), Some(&json!("popup")));
        assert_eq!(defaults.get("popupWindowsInfo"), Some(&json!({})));
        assert!(!defaults.contains_key("popupWidth"));
        for key in defaults.keys() {
            assert!(Config::all_keys().contains(&key.as_str()), "{key} missing from all_keys");
        }
    }

    #[test]
    fn stored_values_win_and_bad_values_fall_back() {
        let config = Config::from_entries(entries(json!({
            "blurPx": "7",
            "previewModeEnable": false,
            "closeByEsc": "sometimes",
            "popupWidth": "640",
            "popupHeight": 0,
        })));
        assert_eq!(config.blur_px, 7.0);
        assert!(!config.preview_mode_enable);
        assert!(config.close_by_esc);
        assert_eq!(config.popup_size(), (640, DEFAULT_POPUP_HEIGHT));
    }

    #[test]
    fn null_values_keep_defaults() {
        let config = Config::from_entries(entries(json!({
            "popupWindowsInfo": null,
            "blurEnable": null,
            "lastScreenTop": null,
        })));
        assert!(config.blur_enable);
        assert_eq!(config.last_screen_top, None);
        assert!(!config.popup_windows_info.has_origins());
    }

    #[tokio::test]
    async fn install_only_writes_missing_keys() {
        let store = MemoryStore::with_entries(entries(json!({ "blurEnable": false })));
        let written = install_defaults(&store, BrowserFamily::Firefox).await.unwrap();
        assert!(!written.contains(&"blurEnable".to_owned()));
        assert!(written.contains(&"previewModeEnable".to_owned()));

        let config = load(&store).await.unwrap();
        assert!(!config.blur_enable);
        assert!(config.is_firefox);

        let again = install_defaults(&store, BrowserFamily::Firefox).await.unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn overrides_parse_from_toml() {
        let overrides = parse_overrides(
            "previewModeWindowType = \"normal\"\nlinkDisabledUrls = [\"https://*.bank.test/*\"]\n",
        )
        .unwrap();
        let config = Config::from_entries(overrides);
        assert_eq!(config.preview_mode_window_type, WindowType::Normal);
        assert!(config.link_disabled_patterns().matches("https://www.bank.test/login"));
    }
}

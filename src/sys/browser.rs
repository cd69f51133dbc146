//! Window and tab management surface of the host browser.

mod simulated;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
pub use simulated::SimulatedBrowser;

use crate::model::geometry::{Rect, TabId, WindowId};

/// Container id the browser uses when a tab has no container.
pub const DEFAULT_COOKIE_STORE: &str = "firefox-default";

#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WindowType {
    #[default]
    Popup,
    Normal,
    Panel,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum BrowserFamily {
    Firefox,
    #[default]
    Chromium,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub id: WindowId,
    pub window_type: WindowType,
    pub bounds: Rect,
    pub focused: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: TabId,
    pub window_id: WindowId,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub incognito: bool,
    #[serde(default)]
    pub cookie_store_id: Option<String>,
}

impl TabInfo {
    /// The tab's container id, unless it is the default one.
    pub fn container(&self) -> Option<&str> {
        self.cookie_store_id.as_deref().filter(|id| *id != DEFAULT_COOKIE_STORE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateWindow {
    pub url: String,
    pub window_type: WindowType,
    pub bounds: Rect,
    pub focused: bool,
    pub incognito: bool,
    pub cookie_store_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTab {
    pub window_id: WindowId,
    pub url: String,
    pub cookie_store_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrowserError {
    #[error("no such window or tab: {0}")]
    NotFound(String),
    #[error("browser refused the request: {0}")]
    Refused(String),
    #[error("browser connection lost")]
    Disconnected,
}

/// The browser's window/tab API. Every call yields to the event loop.
#[allow(async_fn_in_trait)]
pub trait Browser {
    async fn get_window(&self, id: WindowId) -> Result<WindowInfo, BrowserError>;

    async fn create_window(&self, request: CreateWindow) -> Result<WindowInfo, BrowserError>;

    async fn remove_window(&self, id: WindowId) -> Result<(), BrowserError>;

    async fn create_tab(&self, request: CreateTab) -> Result<TabInfo, BrowserError>;

    async fn remove_tab(&self, id: TabId) -> Result<(), BrowserError>;

    async fn active_tab(&self, window: WindowId) -> Result<Option<TabInfo>, BrowserError>;

    async fn tab_zoom(&self, tab: TabId) -> Result<f64, BrowserError>;

    async fn set_icon(&self, path: &str) -> Result<(), BrowserError>;

    async fn browser_family(&self) -> BrowserFamily;
}

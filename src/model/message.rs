//! Messages exchanged between the page context and the coordinator.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use strum::{AsRefStr, Display, EnumString};

use crate::model::geometry::{Point, ScreenRect, WindowId};
use crate::sys::browser::TabInfo;
use crate::ui::action_icon::Theme;

/// What caused a preview request.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Trigger {
    #[default]
    Click,
    #[serde(other)]
    Other,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Request {
    #[serde(rename = "openPreviewRequest")]
    OpenPreview {
        link_url: String,
        trigger: Trigger,
        /// Pointer screen position.
        last_client_x: f64,
        last_client_y: f64,
        /// Available screen rectangle of the requesting display.
        top: f64,
        left: f64,
        width: f64,
        height: f64,
    },
    SavePositionSize,
    CloseCurrentTab,
    WindowRegainedFocus,
    SendPageBack,
    UpdateIcon {
        theme: Theme,
        preview_mode: Option<bool>,
    },
}

impl Request {
    pub fn open_preview(link_url: impl Into<String>, pointer: Point, screen: ScreenRect) -> Self {
        Request::OpenPreview {
            link_url: link_url.into(),
            trigger: Trigger::Click,
            last_client_x: pointer.x,
            last_client_y: pointer.y,
            top: screen.top,
            left: screen.left,
            width: screen.width,
            height: screen.height,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Request::OpenPreview { .. } => "openPreviewRequest",
            Request::SavePositionSize => "savePositionSize",
            Request::CloseCurrentTab => "closeCurrentTab",
            Request::WindowRegainedFocus => "windowRegainedFocus",
            Request::SendPageBack => "sendPageBack",
            Request::UpdateIcon { .. } => "updateIcon",
        }
    }
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: String,
    pub message: Option<String>,
}

impl Response {
    pub fn ack(status: impl Into<String>) -> Self {
        Response { status: status.into(), message: None }
    }
}

/// Where a message came from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageSender {
    pub window_id: WindowId,
    #[serde(default)]
    pub tab: Option<TabInfo>,
}

impl MessageSender {
    pub fn tab_url(&self) -> Option<&str> { self.tab.as_ref().and_then(|t| t.url.as_deref()) }
}

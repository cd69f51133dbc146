//! The reactor owns the popup lifecycle: it tracks which preview windows
//! belong to which origin window, decides where new previews are placed, and
//! reconciles that state with window events reported by the browser.
//!
//! Events are processed one at a time, so each read-modify-write of the
//! tracking tree runs to completion before the next event is looked at. The
//! store stays the only durable owner of the tree; the reactor re-reads it at
//! the start of every operation.

mod events;
mod managers;
mod query;

#[cfg(test)]
mod testing;

use tokio::sync::oneshot;
use tracing::{Instrument, debug, info, trace, warn};
use url::Url;

pub use self::query::{QueryRequest, ReactorQueryHandle};
use self::events::message::MessageEventHandler;
use self::events::window::WindowEventHandler;
use self::managers::{CommunicationManager, PopupManager};
use crate::actor::{self, action_icon};
use crate::common::config::{self, Config, keys};
use crate::error::{PreviewError, Result};
use crate::layout_engine::GeometryResolver;
use crate::model::geometry::{Point, Rect, ScreenRect, TabId, WindowId};
use crate::model::message::{MessageSender, Request, Response, Trigger};
use crate::model::popup_info::PopupRecord;
use crate::sys::browser::{Browser, BrowserError, CreateTab, CreateWindow, TabInfo, WindowType};
use crate::sys::storage::{ConfigStore, Entries, StorageChange};
use crate::ui::action_icon::{IconState, Theme, icon_path};

pub type Sender = actor::Sender<Event>;
pub type Receiver = actor::Receiver<Event>;

#[derive(Debug)]
pub enum Event {
    /// First run (or update) of the extension.
    Installed,
    /// A request from a page. `resp` receives the acknowledgement.
    Message {
        request: Request,
        sender: MessageSender,
        resp: Option<oneshot::Sender<Response>>,
    },
    WindowRemoved(WindowId),
    WindowFocusRegained(WindowId),
    StorageChanged(StorageChange),
    RegisterIconSender(action_icon::Sender),
    Query(QueryRequest),
}

/// What the page knew when it asked for a preview.
#[derive(Debug, Clone, Default)]
pub struct PlacementHints {
    /// Available area of the requesting display, already zoom adjusted.
    pub display: ScreenRect,
    /// The tab the link was activated in.
    pub source_tab: Option<TabInfo>,
}

pub struct Reactor<B, S> {
    browser: B,
    store: S,
    popup_manager: PopupManager,
    communication_manager: CommunicationManager,
}

impl<B: Browser, S: ConfigStore> Reactor<B, S> {
    pub fn new(browser: B, store: S) -> Self {
        Reactor {
            browser,
            store,
            popup_manager: PopupManager::new(),
            communication_manager: CommunicationManager { icon_tx: None },
        }
    }

    pub async fn run(mut self, mut events: Receiver) {
        while let Some((span, event)) = events.recv().await {
            self.handle_event(event).instrument(span).await;
        }
        debug!("reactor channel closed");
    }

    fn log_event(event: &Event) {
        match event {
            Event::StorageChanged(..) | Event::Query(..) => trace!(?event, "Event"),
            _ => debug!(?event, "Event"),
        }
    }

    /// Failures are logged here; nothing escapes the event loop.
    pub async fn handle_event(&mut self, event: Event) {
        Self::log_event(&event);
        match event {
            Event::Installed => {
                let family = self.browser.browser_family().await;
                if let Err(e) = config::install_defaults(&self.store, family).await {
                    warn!("Failed to install default options: {e}");
                }
            }
            Event::Message { request, sender, resp } => {
                MessageEventHandler::handle_message(self, request, sender, resp).await;
            }
            Event::WindowRemoved(window) => {
                WindowEventHandler::handle_window_removed(self, window).await;
            }
            Event::WindowFocusRegained(window) => {
                WindowEventHandler::handle_window_focus_regained(self, window).await;
            }
            Event::StorageChanged(change) => {
                if change.touches(keys::POPUP_WINDOWS_INFO) {
                    self.popup_manager.invalidate();
                }
            }
            Event::RegisterIconSender(tx) => self.communication_manager.icon_tx = Some(tx),
            Event::Query(req) => self.handle_query_request(req).await,
        }
    }

    /// Registers `window` as an origin when nothing is tracked yet. Returns
    /// whether the tree changed.
    pub async fn ensure_origin_registered(&mut self, window: WindowId) -> Result<bool> {
        let mut tree = self.popup_manager.load(&self.store).await?;
        if !tree.register_first_origin(window) {
            return Ok(false);
        }
        self.popup_manager.save(&self.store, tree).await?;
        info!(%window, "registered first origin window");
        Ok(true)
    }

    /// Opens `url` in a new preview window on behalf of `origin`.
    pub async fn open_preview(
        &mut self,
        origin: WindowId,
        url: &str,
        trigger: Trigger,
        hints: PlacementHints,
    ) -> Result<WindowId> {
        let target = Url::parse(url)
            .map_err(|reason| PreviewError::InvalidTarget { url: url.to_owned(), reason })?;
        let host = target.host_str().map(str::to_owned);

        let config = config::load(&self.store).await?;
        let placement = GeometryResolver::new(&config).resolve(host.as_deref(), hints.display);
        let window_type = match trigger {
            Trigger::Click => config.preview_mode_window_type,
            Trigger::Other => WindowType::Normal,
        };
        let source_tab = hints.source_tab.as_ref();
        let request = CreateWindow {
            url: target.to_string(),
            window_type,
            bounds: placement.bounds,
            focused: true,
            incognito: source_tab.is_some_and(|t| t.incognito),
            cookie_store_id: container_of(&config, source_tab),
        };

        let window = self.browser.create_window(request).await.map_err(|e| {
            warn!(%origin, %url, "Failed to create preview window: {e}");
            PreviewError::WindowCreation(e)
        })?;
        info!(%origin, popup = %window.id, source = %placement.source, "opened preview window");

        // The tree may have changed while the window was being created.
        let mut tree = self.popup_manager.load(&self.store).await?;
        let owner = tree.origin_of(origin).unwrap_or(origin);
        if let Err(rejected) = tree.insert_popup(owner, window.id, PopupRecord::from(&window)) {
            warn!(%owner, popup = %window.id, ?rejected, "Not tracking preview window");
            return Ok(window.id);
        }
        tree.saved_mut().remember(
            window.bounds,
            host.as_deref(),
            config.remember_popup_size_and_position,
            config.remember_popup_size_and_position_for_domain,
        );
        self.popup_manager.save(&self.store, tree).await?;
        Ok(window.id)
    }

    /// Records new bounds for a tracked popup. Origins and untracked windows
    /// are left alone. `tab_url` is the page shown in the popup.
    pub async fn save_geometry(
        &mut self,
        window: WindowId,
        rect: Rect,
        tab_url: Option<&str>,
    ) -> Result<bool> {
        let config = config::load(&self.store).await?;
        let mut tree = config.popup_windows_info;
        if !tree.update_popup_bounds(window, rect) {
            trace!(%window, "not a tracked popup; geometry not saved");
            return Ok(false);
        }
        let host = tab_url
            .and_then(|u| Url::parse(u).ok())
            .and_then(|u| u.host_str().map(str::to_owned));
        tree.saved_mut().remember(
            rect,
            host.as_deref(),
            config.remember_popup_size_and_position,
            config.remember_popup_size_and_position_for_domain,
        );
        self.popup_manager.save(&self.store, tree).await?;
        debug!(%window, ?rect, ?host, "saved popup geometry");
        Ok(true)
    }

    /// Forgets a closed window: a tracked popup, or an origin that never got
    /// one. Removing an untracked id does nothing.
    pub async fn on_window_removed(&mut self, window: WindowId) -> Result<bool> {
        let mut tree = self.popup_manager.load(&self.store).await?;
        if tree.forget_empty_origin(window) {
            self.popup_manager.save(&self.store, tree).await?;
            debug!(%window, "origin without popups removed");
            return Ok(true);
        }
        let Some((origin, _)) = tree.remove_popup(window) else {
            trace!(%window, "removed window was not a tracked popup");
            return Ok(false);
        };
        let origin_emptied = !tree.is_origin(origin);
        self.popup_manager.save(&self.store, tree).await?;
        info!(popup = %window, %origin, origin_emptied, "popup window removed");
        Ok(true)
    }

    /// Closes every popup of `window` when it is an origin. Returns the popups
    /// that were closed. Popups the browser no longer knows are pruned.
    pub async fn on_window_focus_regained(&mut self, window: WindowId) -> Result<Vec<WindowId>> {
        let tree = self.popup_manager.load(&self.store).await?;
        let Some(popups) = tree.popups_of(window) else {
            return Ok(Vec::new());
        };
        let popups: Vec<WindowId> = popups.keys().copied().collect();

        let mut closed = Vec::new();
        let mut missing = Vec::new();
        for popup in popups {
            match self.browser.remove_window(popup).await {
                Ok(()) => closed.push(popup),
                Err(BrowserError::NotFound(_)) => missing.push(popup),
                Err(e) => warn!(%popup, origin = %window, "Failed to close popup: {e}"),
            }
        }

        if !missing.is_empty() {
            let mut tree = self.popup_manager.load(&self.store).await?;
            for popup in &missing {
                tree.remove_popup(*popup);
            }
            self.popup_manager.save(&self.store, tree).await?;
            debug!(?missing, "pruned popups that no longer exist");
        }
        if !closed.is_empty() {
            info!(origin = %window, ?closed, "closed popups after origin regained focus");
        }
        Ok(closed)
    }

    /// Reopens `url` as a tab of the popup's origin window and closes the
    /// popup.
    pub async fn return_to_origin(
        &mut self,
        popup: WindowId,
        url: &str,
        source_tab: Option<&TabInfo>,
    ) -> Result<TabId> {
        let config = config::load(&self.store).await?;
        let origin = config
            .popup_windows_info
            .origin_of(popup)
            .ok_or(PreviewError::OrphanPopup(popup))?;

        let tab = self
            .browser
            .create_tab(CreateTab {
                window_id: origin,
                url: url.to_owned(),
                cookie_store_id: container_of(&config, source_tab),
            })
            .await
            .map_err(PreviewError::WindowCreation)?;

        match self.browser.remove_window(popup).await {
            Ok(()) => {}
            Err(BrowserError::NotFound(_)) => debug!(%popup, "popup already gone"),
            Err(e) => warn!(%popup, "Failed to close popup after sending page back: {e}"),
        }
        info!(%popup, %origin, tab = %tab.id, "sent page back to origin");
        Ok(tab.id)
    }

    /// Closes the sender's tab, but only inside a tracked popup window.
    pub async fn close_current_tab(&mut self, sender: &MessageSender) -> Result<bool> {
        let tree = self.popup_manager.load(&self.store).await?;
        if !tree.is_popup(sender.window_id) {
            trace!(window = %sender.window_id, "close request outside a popup ignored");
            return Ok(false);
        }

        let tab = match &sender.tab {
            Some(tab) => Some(tab.id),
            None => match self.browser.active_tab(sender.window_id).await {
                Ok(tab) => tab.map(|t| t.id),
                Err(e) => {
                    warn!(window = %sender.window_id, "Failed to find active tab: {e}");
                    None
                }
            },
        };
        let Some(tab) = tab else {
            return Ok(false);
        };
        match self.browser.remove_tab(tab).await {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(%tab, "Failed to close tab: {e}");
                Ok(false)
            }
        }
    }

    /// Best effort. Icon failures never reach the caller.
    pub async fn update_icon(&mut self, theme: Theme, page_preview_mode: Option<bool>) {
        let preview_enabled = match self.store.get(&[keys::PREVIEW_MODE_ENABLE]).await {
            Ok(stored) => Config::from_entries(stored).preview_mode_enable,
            Err(e) => {
                debug!("Using default preview switch for icon: {e}");
                Config::default().preview_mode_enable
            }
        };
        let state = IconState { theme, page_preview_mode, preview_enabled };
        match &self.communication_manager.icon_tx {
            Some(tx) => tx.send(action_icon::Event::Update(state)),
            None => {
                if let Err(e) = self.browser.set_icon(icon_path(state)).await {
                    warn!("Failed to set action icon: {e}");
                }
            }
        }
    }

    /// Zoom factor of the page a message came from; 1.0 when unknown.
    async fn zoom_factor(&self, sender: &MessageSender) -> f64 {
        let tab = match &sender.tab {
            Some(tab) => Some(tab.id),
            None => self.browser.active_tab(sender.window_id).await.ok().flatten().map(|t| t.id),
        };
        let Some(tab) = tab else {
            return 1.0;
        };
        match self.browser.tab_zoom(tab).await {
            Ok(zoom) if zoom > 0.0 => zoom,
            Ok(_) => 1.0,
            Err(e) => {
                debug!(%tab, "Assuming no zoom: {e}");
                1.0
            }
        }
    }

    /// Stores the pointer and screen rectangle of a preview request in one
    /// write.
    async fn record_pointer(&self, pointer: Point, screen: ScreenRect) -> Result<()> {
        let mut items = Entries::new();
        for (key, value) in [
            (keys::LAST_CLIENT_X, pointer.x),
            (keys::LAST_CLIENT_Y, pointer.y),
            (keys::LAST_SCREEN_TOP, screen.top),
            (keys::LAST_SCREEN_LEFT, screen.left),
            (keys::LAST_SCREEN_WIDTH, screen.width),
            (keys::LAST_SCREEN_HEIGHT, screen.height),
        ] {
            items.insert(key.to_owned(), serde_json::json!(value));
        }
        self.store.set(items).await?;
        Ok(())
    }
}

/// The container to open new pages in, when container identity is on and the
/// source tab is not in the default container.
fn container_of(config: &Config, tab: Option<&TabInfo>) -> Option<String> {
    if !config.enable_container_identify {
        return None;
    }
    tab.and_then(TabInfo::container).map(str::to_owned)
}

use tokio::sync::oneshot;

use super::{Event, PlacementHints, Reactor};
use crate::model::geometry::{Point, Rect, ScreenRect, WindowId};
use crate::model::message::{MessageSender, Request, Response};
use crate::model::popup_info::PopupWindowsInfo;
use crate::sys::browser::{SimulatedBrowser, TabInfo};
use crate::sys::storage::MemoryStore;

pub const DISPLAY: ScreenRect = ScreenRect::new(0.0, 0.0, 1920.0, 1080.0);
pub const ORIGIN_BOUNDS: Rect = Rect::new(0, 0, 1920, 1080);

pub fn w(id: u32) -> WindowId { WindowId::new(id) }

pub type TestReactor = Reactor<SimulatedBrowser, MemoryStore>;

pub struct Fixture {
    pub browser: SimulatedBrowser,
    pub store: MemoryStore,
    pub reactor: TestReactor,
}

impl Fixture {
    pub fn new() -> Self {
        let browser = SimulatedBrowser::default();
        let store = MemoryStore::default();
        let reactor = Reactor::new(browser.clone(), store.clone());
        Fixture { browser, store, reactor }
    }

    /// Adds a user window showing `url`; the returned sender speaks for its
    /// only tab.
    pub fn open_user_window(&self, id: u32, url: &str) -> MessageSender {
        let tab = self.browser.open_window(w(id), ORIGIN_BOUNDS, url);
        MessageSender { window_id: w(id), tab: Some(tab) }
    }

    /// The page in an existing window, as the router would see it.
    pub fn sender_in(&self, window: WindowId) -> MessageSender {
        let tab: Option<TabInfo> = self.browser.tabs_in(window).into_iter().last();
        MessageSender { window_id: window, tab }
    }

    pub fn hints(&self) -> PlacementHints { PlacementHints { display: DISPLAY, source_tab: None } }

    /// Sends `request` through the router and returns its acknowledgement.
    pub async fn message(&mut self, request: Request, sender: MessageSender) -> Response {
        let (tx, rx) = oneshot::channel();
        self.reactor.handle_event(Event::Message { request, sender, resp: Some(tx) }).await;
        rx.await.expect("every message is acknowledged")
    }

    pub async fn click_link(&mut self, sender: MessageSender, url: &str) -> Response {
        let request = Request::open_preview(url, Point::new(300.0, 200.0), DISPLAY);
        self.message(request, sender).await
    }

    /// Delivers the removal notifications the browser produced so far.
    pub async fn feed_removals(&mut self) -> Vec<WindowId> {
        let removed = self.browser.take_removed();
        for window in &removed {
            self.reactor.handle_event(Event::WindowRemoved(*window)).await;
        }
        removed
    }

    pub async fn tree(&mut self) -> PopupWindowsInfo {
        self.reactor.popup_manager.load(&self.store).await.expect("store is readable")
    }
}

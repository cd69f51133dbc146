//! An in-memory browser used by the replay command and by tests.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::{
    Browser, BrowserError, BrowserFamily, CreateTab, CreateWindow, TabInfo, WindowInfo, WindowType,
};
use crate::common::collections::{BTreeMap, HashMap, HashSet};
use crate::model::geometry::{Rect, TabId, WindowId};

#[derive(Debug)]
struct State {
    family: BrowserFamily,
    next_window: u32,
    next_tab: u32,
    windows: BTreeMap<WindowId, WindowInfo>,
    tabs: BTreeMap<TabId, TabInfo>,
    zoom: HashMap<TabId, f64>,
    icon: Option<String>,
    refuse_next_create: Option<String>,
    refuse_close: HashSet<WindowId>,
    removed: Vec<WindowId>,
    created: Vec<CreateWindow>,
}

#[derive(Clone, Debug)]
pub struct SimulatedBrowser {
    state: Arc<Mutex<State>>,
}

impl Default for SimulatedBrowser {
    fn default() -> Self { Self::new(BrowserFamily::default()) }
}

impl SimulatedBrowser {
    pub fn new(family: BrowserFamily) -> Self {
        SimulatedBrowser {
            state: Arc::new(Mutex::new(State {
                family,
                next_window: 1,
                next_tab: 1,
                windows: BTreeMap::new(),
                tabs: BTreeMap::new(),
                zoom: HashMap::default(),
                icon: None,
                refuse_next_create: None,
                refuse_close: HashSet::default(),
                removed: Vec::new(),
                created: Vec::new(),
            })),
        }
    }

    /// Ids handed to windows created from now on start at `id`.
    pub fn set_next_window_id(&self, id: u32) { self.state.lock().next_window = id; }

    /// Adds a window with one tab showing `url`.
    pub fn open_window(&self, id: WindowId, bounds: Rect, url: &str) -> TabInfo {
        let mut state = self.state.lock();
        state.windows.insert(id, WindowInfo {
            id,
            window_type: WindowType::Normal,
            bounds,
            focused: true,
        });
        state.next_window = state.next_window.max(id.get() + 1);
        state.add_tab(id, url.to_owned(), false, None)
    }

    pub fn set_zoom(&self, tab: TabId, zoom: f64) { self.state.lock().zoom.insert(tab, zoom); }

    pub fn move_window(&self, id: WindowId, bounds: Rect) {
        if let Some(window) = self.state.lock().windows.get_mut(&id) {
            window.bounds = bounds;
        }
    }

    pub fn refuse_next_create(&self, reason: &str) {
        self.state.lock().refuse_next_create = Some(reason.to_owned());
    }

    pub fn refuse_close(&self, id: WindowId) { self.state.lock().refuse_close.insert(id); }

    /// Closes a window as the user would, without going through the API.
    pub fn user_close(&self, id: WindowId) -> bool { self.state.lock().close_window(id) }

    /// Window removals since the last call, in order.
    pub fn take_removed(&self) -> Vec<WindowId> { std::mem::take(&mut self.state.lock().removed) }

    pub fn created(&self) -> Vec<CreateWindow> { self.state.lock().created.clone() }

    pub fn windows(&self) -> Vec<WindowInfo> { self.state.lock().windows.values().cloned().collect() }

    pub fn has_window(&self, id: WindowId) -> bool { self.state.lock().windows.contains_key(&id) }

    pub fn tabs_in(&self, window: WindowId) -> Vec<TabInfo> {
        self.state.lock().tabs.values().filter(|t| t.window_id == window).cloned().collect()
    }

    pub fn icon(&self) -> Option<String> { self.state.lock().icon.clone() }
}

impl State {
    fn add_tab(
        &mut self,
        window: WindowId,
        url: String,
        incognito: bool,
        cookie_store_id: Option<String>,
    ) -> TabInfo {
        let id = TabId::new(self.next_tab);
        self.next_tab += 1;
        let tab = TabInfo {
            id,
            window_id: window,
            url: Some(url),
            incognito,
            cookie_store_id,
        };
        self.tabs.insert(id, tab.clone());
        tab
    }

    fn close_window(&mut self, id: WindowId) -> bool {
        if self.windows.remove(&id).is_none() {
            return false;
        }
        self.tabs.retain(|_, tab| tab.window_id != id);
        self.removed.push(id);
        true
    }
}

impl Browser for SimulatedBrowser {
    async fn get_window(&self, id: WindowId) -> Result<WindowInfo, BrowserError> {
        self.state
            .lock()
            .windows
            .get(&id)
            .cloned()
            .ok_or_else(|| BrowserError::NotFound(format!("window {id}")))
    }

    async fn create_window(&self, request: CreateWindow) -> Result<WindowInfo, BrowserError> {
        let mut state = self.state.lock();
        if let Some(reason) = state.refuse_next_create.take() {
            return Err(BrowserError::Refused(reason));
        }
        let id = WindowId::new(state.next_window);
        state.next_window += 1;
        let window = WindowInfo {
            id,
            window_type: request.window_type,
            bounds: request.bounds,
            focused: request.focused,
        };
        state.windows.insert(id, window.clone());
        state.add_tab(id, request.url.clone(), request.incognito, request.cookie_store_id.clone());
        state.created.push(request);
        trace!(%id, "simulated window created");
        Ok(window)
    }

    async fn remove_window(&self, id: WindowId) -> Result<(), BrowserError> {
        let mut state = self.state.lock();
        if state.refuse_close.contains(&id) {
            return Err(BrowserError::Refused(format!("window {id} cannot be closed")));
        }
        if state.close_window(id) {
            Ok(())
        } else {
            Err(BrowserError::NotFound(format!("window {id}")))
        }
    }

    async fn create_tab(&self, request: CreateTab) -> Result<TabInfo, BrowserError> {
        let mut state = self.state.lock();
        if !state.windows.contains_key(&request.window_id) {
            return Err(BrowserError::NotFound(format!("window {}", request.window_id)));
        }
        Ok(state.add_tab(request.window_id, request.url, false, request.cookie_store_id))
    }

    async fn remove_tab(&self, id: TabId) -> Result<(), BrowserError> {
        let mut state = self.state.lock();
        let Some(tab) = state.tabs.remove(&id) else {
            return Err(BrowserError::NotFound(format!("tab {id}")));
        };
        // Closing the last tab closes its window.
        if !state.tabs.values().any(|t| t.window_id == tab.window_id) {
            state.close_window(tab.window_id);
        }
        Ok(())
    }

    async fn active_tab(&self, window: WindowId) -> Result<Option<TabInfo>, BrowserError> {
        let state = self.state.lock();
        if !state.windows.contains_key(&window) {
            return Err(BrowserError::NotFound(format!("window {window}")));
        }
        Ok(state.tabs.values().filter(|t| t.window_id == window).last().cloned())
    }

    async fn tab_zoom(&self, tab: TabId) -> Result<f64, BrowserError> {
        let state = self.state.lock();
        if !state.tabs.contains_key(&tab) {
            return Err(BrowserError::NotFound(format!("tab {tab}")));
        }
        Ok(state.zoom.get(&tab).copied().unwrap_or(1.0))
    }

    async fn set_icon(&self, path: &str) -> Result<(), BrowserError> {
        self.state.lock().icon = Some(path.to_owned());
        Ok(())
    }

    async fn browser_family(&self) -> BrowserFamily { self.state.lock().family }
}

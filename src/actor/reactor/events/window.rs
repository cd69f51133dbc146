use tracing::warn;

use crate::actor::reactor::Reactor;
use crate::model::geometry::WindowId;
use crate::sys::browser::Browser;
use crate::sys::storage::ConfigStore;

pub struct WindowEventHandler;

impl WindowEventHandler {
    /// Every removal is routed here; untracked ids are ignored by the
    /// reactor.
    pub async fn handle_window_removed<B: Browser, S: ConfigStore>(
        reactor: &mut Reactor<B, S>,
        window: WindowId,
    ) {
        if let Err(e) = reactor.on_window_removed(window).await {
            warn!(%window, "Failed to forget removed window: {e}");
        }
    }

    pub async fn handle_window_focus_regained<B: Browser, S: ConfigStore>(
        reactor: &mut Reactor<B, S>,
        window: WindowId,
    ) {
        if let Err(e) = reactor.on_window_focus_regained(window).await {
            warn!(%window, "Failed to sweep popups of focused window: {e}");
        }
    }
}

//! The page (DOM) surface seen by the event tap.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::model::geometry::ScreenRect;

/// Synchronous DOM operations available to the page context.
///
/// Implementations must not call back into the event tap from inside these
/// methods; a re-dispatched click is delivered later as a fresh input.
pub trait PageSurface {
    fn location(&self) -> String;

    fn prefers_dark(&self) -> bool;

    /// `screen.avail{Top,Left,Width,Height}` of the display showing the page.
    fn available_screen(&self) -> ScreenRect;

    /// Replays a click on `link` without interception.
    fn redispatch_click(&self, link: &str);

    fn apply_blur(&self, style: &str);

    fn remove_blur(&self);

    fn apply_click_mask(&self, css: &str);

    fn remove_click_mask(&self);

    fn clear_selection(&self);
}

/// DOM operations recorded by a [`HeadlessPage`].
#[derive(Debug, Clone, PartialEq)]
pub enum PageAction {
    Redispatched(String),
    Blurred(String),
    Unblurred,
    Masked,
    Unmasked,
    SelectionCleared,
}

/// A page without a DOM. Operations are recorded for the replay driver, which
/// delivers re-dispatched clicks back to the event tap.
#[derive(Clone, Debug)]
pub struct HeadlessPage {
    location: String,
    screen: ScreenRect,
    dark: bool,
    actions: Arc<Mutex<Vec<PageAction>>>,
}

impl HeadlessPage {
    pub fn new(location: impl Into<String>, screen: ScreenRect, dark: bool) -> Self {
        HeadlessPage { location: location.into(), screen, dark, actions: Arc::default() }
    }

    pub fn take_actions(&self) -> Vec<PageAction> { std::mem::take(&mut *self.actions.lock()) }

    fn record(&self, action: PageAction) {
        trace!(?action, location = %self.location, "page action");
        self.actions.lock().push(action);
    }
}

impl PageSurface for HeadlessPage {
    fn location(&self) -> String { self.location.clone() }

    fn prefers_dark(&self) -> bool { self.dark }

    fn available_screen(&self) -> ScreenRect { self.screen }

    fn redispatch_click(&self, link: &str) { self.record(PageAction::Redispatched(link.to_owned())) }

    fn apply_blur(&self, style: &str) { self.record(PageAction::Blurred(style.to_owned())) }

    fn remove_blur(&self) { self.record(PageAction::Unblurred) }

    fn apply_click_mask(&self, _css: &str) { self.record(PageAction::Masked) }

    fn remove_click_mask(&self) { self.record(PageAction::Unmasked) }

    fn clear_selection(&self) { self.record(PageAction::SelectionCleared) }
}

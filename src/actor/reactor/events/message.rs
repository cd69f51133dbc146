use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::actor::reactor::{PlacementHints, Reactor};
use crate::error::PreviewError;
use crate::model::geometry::{Point, ScreenRect};
use crate::model::message::{MessageSender, Request, Response};
use crate::sys::browser::Browser;
use crate::sys::storage::ConfigStore;

const STATUS_LINK: &str = "link handled";
const STATUS_SAVED: &str = "position and size saved";
const STATUS_ESC: &str = "esc handled";
const STATUS_FOCUS: &str = "window focus handled";
const STATUS_SEND_BACK: &str = "send Page Back handled";
const STATUS_ICON: &str = "Icon update handled";
const STATUS_ERROR: &str = "error";

fn status_of(request: &Request) -> &'static str {
    match request {
        Request::OpenPreview { .. } => STATUS_LINK,
        Request::SavePositionSize => STATUS_SAVED,
        Request::CloseCurrentTab => STATUS_ESC,
        Request::WindowRegainedFocus => STATUS_FOCUS,
        Request::SendPageBack => STATUS_SEND_BACK,
        Request::UpdateIcon { .. } => STATUS_ICON,
    }
}

fn reply(resp: Option<oneshot::Sender<Response>>, response: Response) {
    if let Some(resp) = resp {
        // The page may have navigated away; nobody is waiting then.
        let _ = resp.send(response);
    }
}

pub struct MessageEventHandler;

impl MessageEventHandler {
    /// Every message first makes sure some origin is registered, then gets its
    /// acknowledgement, then is acted on.
    pub async fn handle_message<B: Browser, S: ConfigStore>(
        reactor: &mut Reactor<B, S>,
        request: Request,
        sender: MessageSender,
        resp: Option<oneshot::Sender<Response>>,
    ) {
        if let Err(e) = reactor.ensure_origin_registered(sender.window_id).await {
            warn!(action = request.action(), "Failed to read popup tracking state: {e}");
            reply(resp, Response { status: STATUS_ERROR.to_owned(), message: Some(e.to_string()) });
            return;
        }
        reply(resp, Response::ack(status_of(&request)));

        match request {
            Request::OpenPreview {
                link_url,
                trigger,
                last_client_x,
                last_client_y,
                top,
                left,
                width,
                height,
            } => {
                let zoom = reactor.zoom_factor(&sender).await;
                let screen = ScreenRect::new(top, left, width, height).scaled(zoom);
                let pointer = Point::new(last_client_x * zoom, last_client_y * zoom);
                if let Err(e) = reactor.record_pointer(pointer, screen).await {
                    warn!("Failed to record pointer position: {e}");
                }

                let source_tab = match sender.tab.clone() {
                    Some(tab) => Some(tab),
                    None => reactor.browser.active_tab(sender.window_id).await.ok().flatten(),
                };
                let hints = PlacementHints { display: screen, source_tab };
                match reactor.open_preview(sender.window_id, &link_url, trigger, hints).await {
                    Ok(popup) => debug!(%popup, %link_url, "preview request handled"),
                    Err(e @ PreviewError::InvalidTarget { .. }) => info!("Ignoring preview: {e}"),
                    Err(e) => warn!(%link_url, "Preview failed: {e}"),
                }
            }
            Request::SavePositionSize => {
                let window = match reactor.browser.get_window(sender.window_id).await {
                    Ok(window) => window,
                    Err(e) => {
                        debug!(window = %sender.window_id, "Cannot read window bounds: {e}");
                        return;
                    }
                };
                if let Err(e) =
                    reactor.save_geometry(window.id, window.bounds, sender.tab_url()).await
                {
                    warn!(window = %window.id, "Failed to save geometry: {e}");
                }
            }
            Request::CloseCurrentTab => {
                if let Err(e) = reactor.close_current_tab(&sender).await {
                    warn!(window = %sender.window_id, "Failed to handle close request: {e}");
                }
            }
            Request::WindowRegainedFocus => {
                if let Err(e) = reactor.on_window_focus_regained(sender.window_id).await {
                    warn!(window = %sender.window_id, "Failed to sweep popups: {e}");
                }
            }
            Request::SendPageBack => {
                let Some(url) = sender.tab_url().map(str::to_owned) else {
                    debug!(window = %sender.window_id, "send back without a page url");
                    return;
                };
                match reactor.return_to_origin(sender.window_id, &url, sender.tab.as_ref()).await {
                    Ok(_) => {}
                    Err(PreviewError::OrphanPopup(window)) => {
                        debug!(%window, "send back from a window that is not a popup")
                    }
                    Err(e) => warn!(window = %sender.window_id, "Failed to send page back: {e}"),
                }
            }
            Request::UpdateIcon { theme, preview_mode } => {
                reactor.update_icon(theme, preview_mode).await;
            }
        }
    }
}

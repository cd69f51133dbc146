use popup_preview::actor;
use popup_preview::actor::reactor::{Event, Reactor, ReactorQueryHandle};
use popup_preview::model::geometry::{Point, Rect, ScreenRect, WindowId};
use popup_preview::model::message::{MessageSender, Request, Response};
use popup_preview::replay::{self, Script};
use popup_preview::sys::browser::SimulatedBrowser;
use popup_preview::sys::storage::{ConfigStore, FileStore, MemoryStore};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::oneshot;

const DISPLAY: ScreenRect = ScreenRect::new(0.0, 0.0, 1920.0, 1080.0);

fn w(id: u32) -> WindowId { WindowId::new(id) }

async fn send(tx: &actor::Sender<Event>, request: Request, sender: MessageSender) -> Response {
    let (resp, rx) = oneshot::channel();
    tx.send(Event::Message { request, sender, resp: Some(resp) });
    rx.await.expect("reactor acknowledges every message")
}

#[test_log::test(tokio::test)]
async fn popups_follow_their_origin_through_the_channel() {
    let browser = SimulatedBrowser::default();
    let store = MemoryStore::default();
    let tab = browser.open_window(w(10), Rect::new(0, 0, 1920, 1080), "https://news.example.org/");
    browser.set_next_window_id(20);
    let origin = MessageSender { window_id: w(10), tab: Some(tab) };

    let (tx, rx) = actor::channel();
    let reactor = Reactor::new(browser.clone(), store.clone());
    let queries = ReactorQueryHandle::new(tx.clone());

    let session = async move {
        let point = Point::new(300.0, 200.0);
        let a = Request::open_preview("https://example.com/a", point, DISPLAY);
        let b = Request::open_preview("https://example.com/b", point, DISPLAY);
        assert_eq!(send(&tx, a, origin.clone()).await.status, "link handled");
        assert_eq!(send(&tx, b, origin.clone()).await.status, "link handled");

        let tree = queries.query_popup_tree().await.expect("tree");
        assert_eq!(tree.origin_of(w(20)), Some(w(10)));
        assert_eq!(tree.origin_of(w(21)), Some(w(10)));

        // The sweep closes both popups; their removals are reported afterwards.
        tx.send(Event::WindowFocusRegained(w(10)));
        queries.query_popup_tree().await.expect("tree");
        for window in browser.take_removed() {
            tx.send(Event::WindowRemoved(window));
        }
        let tree = queries.query_popup_tree().await.expect("tree");
        assert!(!tree.has_origins());
        assert_eq!(browser.windows().len(), 1);
    };
    tokio::join!(session, reactor.run(rx));
}

#[test_log::test(tokio::test)]
async fn replayed_session_persists_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage.json");
    let script: Script = serde_json::from_value(json!({
        "family": "Firefox",
        "steps": [
            "installed",
            { "openWindow": { "id": 10, "url": "https://news.example.org/" } },
            {
                "message": {
                    "from": 10,
                    "request": {
                        "action": "openPreviewRequest",
                        "linkUrl": "https://example.com/a",
                        "trigger": "click",
                        "lastClientX": 300.0,
                        "lastClientY": 200.0,
                        "top": 0.0,
                        "left": 0.0,
                        "width": 1920.0,
                        "height": 1080.0,
                    }
                }
            },
            { "message": { "from": 11, "request": { "action": "sendPageBack" } } },
        ]
    }))
    .unwrap();

    let report = replay::run(script, FileStore::open(&path).await.unwrap()).await.unwrap();
    let statuses: Vec<_> = report.acks.iter().map(|a| a.response.status.as_str()).collect();
    assert_eq!(statuses, vec!["link handled", "send Page Back handled"]);
    assert!(!report.tree.has_origins());

    let reopened = FileStore::open(&path).await.unwrap();
    let stored = reopened.get(&["isFirefox", "popupWindowsInfo"]).await.unwrap();
    assert_eq!(stored.get("isFirefox"), Some(&json!(true)));
    assert_eq!(
        stored.get("popupWindowsInfo"),
        Some(&json!({
            "savedPositionAndSize": {
                "top": 140,
                "left": 460,
                "width": 1000,
                "height": 800,
                "example.com": { "top": 140, "left": 460, "width": 1000, "height": 800 },
            }
        }))
    );
}

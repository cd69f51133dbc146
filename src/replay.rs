//! Scripted sessions against the simulated browser.
//!
//! A script is a list of steps: windows appearing, page messages, page input,
//! user closes and focus changes. The driver feeds them to the actors in order
//! and waits for the reactor to catch up after every step, so the resulting
//! tree does not depend on scheduling.

use std::time::Duration;

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::actor;
use crate::actor::action_icon::ActionIcon;
use crate::actor::event_tap::{Disposition, EventTap, Input, Modifiers};
use crate::actor::notification_center::NotificationCenter;
use crate::actor::reactor::{self, Reactor, ReactorQueryHandle};
use crate::common::collections::BTreeMap;
use crate::common::config;
use crate::model::geometry::{Point, Rect, ScreenRect, WindowId};
use crate::model::message::{MessageSender, Request, Response};
use crate::model::popup_info::PopupWindowsInfo;
use crate::sys::browser::{BrowserFamily, SimulatedBrowser, WindowInfo};
use crate::sys::page::{HeadlessPage, PageAction};
use crate::sys::storage::{ConfigStore, Entries};

const DEFAULT_BOUNDS: Rect = Rect::new(0, 0, 1920, 1080);

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    #[serde(default)]
    pub family: BrowserFamily,
    /// Whether pages report a dark color scheme.
    #[serde(default)]
    pub dark: bool,
    /// Written to the store before the first step.
    #[serde(default)]
    pub options: Entries,
    pub steps: Vec<Step>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Step {
    Installed,
    OpenWindow {
        id: WindowId,
        url: String,
        #[serde(default)]
        bounds: Option<Rect>,
    },
    /// A runtime message sent by the page in `from`.
    Message { from: WindowId, request: Request },
    /// DOM input on the page in `window`.
    Page { window: WindowId, input: PageInput },
    /// The user closes a window.
    Close(WindowId),
    Focus(WindowId),
    SetOptions(Entries),
    /// Milliseconds.
    Wait(u64),
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PageInput {
    PointerDown {
        #[serde(default)]
        link: Option<String>,
    },
    Click {
        #[serde(default)]
        link: Option<String>,
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
    },
    Key {
        key: String,
        #[serde(default)]
        modifiers: Vec<String>,
    },
    Focus,
    ScrollEnd,
}

impl PageInput {
    fn into_input(self) -> anyhow::Result<Input> {
        Ok(match self {
            PageInput::PointerDown { link } => Input::PointerDown { link },
            PageInput::Click { link, x, y } => Input::Click { link, pointer: Point::new(x, y) },
            PageInput::Key { key, modifiers } => {
                let mut held = Modifiers::empty();
                for name in modifiers {
                    held |= Modifiers::from_name(&name.to_ascii_uppercase())
                        .ok_or_else(|| anyhow!("unknown modifier {name:?}"))?;
                }
                Input::KeyDown { key, modifiers: held }
            }
            PageInput::Focus => Input::FocusGained,
            PageInput::ScrollEnd => Input::ScrollEnd,
        })
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct Ack {
    pub window: WindowId,
    pub action: &'static str,
    pub response: Response,
}

#[derive(Debug)]
pub struct Report {
    pub acks: Vec<Ack>,
    pub tree: PopupWindowsInfo,
    pub windows: Vec<WindowInfo>,
    pub page_actions: BTreeMap<WindowId, Vec<PageAction>>,
    pub navigations: Vec<(WindowId, String)>,
    pub icon: Option<String>,
}

impl Report {
    /// The tracking tree drawn with one node per origin.
    pub fn render_tree(&self) -> String {
        use ascii_tree::Tree;

        let origins = self
            .tree
            .origins()
            .map(|origin| {
                let popups = self
                    .tree
                    .popups_of(origin)
                    .into_iter()
                    .flatten()
                    .map(|(id, record)| {
                        let b = record.bounds();
                        let kind = record.window_type;
                        format!("{id} {kind} {}x{}+{}+{}", b.width, b.height, b.left, b.top)
                    })
                    .collect::<Vec<_>>();
                if popups.is_empty() {
                    Tree::Leaf(vec![format!("origin {origin} (no popups)")])
                } else {
                    Tree::Node(format!("origin {origin}"), vec![Tree::Leaf(popups)])
                }
            })
            .collect();

        let mut out = String::new();
        if ascii_tree::write_tree(&mut out, &Tree::Node("popupWindowsInfo".to_owned(), origins))
            .is_err()
        {
            out.push_str("popupWindowsInfo (unprintable)\n");
        }
        out
    }
}

struct Driver<S> {
    browser: SimulatedBrowser,
    store: S,
    reactor_tx: reactor::Sender,
    queries: ReactorQueryHandle,
    dark: bool,
    pages: BTreeMap<WindowId, EventTap<HeadlessPage>>,
    acks: Vec<Ack>,
    page_actions: BTreeMap<WindowId, Vec<PageAction>>,
    navigations: Vec<(WindowId, String)>,
}

impl<S: ConfigStore> Driver<S> {
    fn sender_in(&self, window: WindowId) -> MessageSender {
        MessageSender { window_id: window, tab: self.browser.tabs_in(window).into_iter().last() }
    }

    async fn step(&mut self, step: Step) -> anyhow::Result<()> {
        debug!(?step, "replay step");
        match step {
            Step::Installed => self.reactor_tx.send(reactor::Event::Installed),
            Step::OpenWindow { id, url, bounds } => {
                self.browser.open_window(id, bounds.unwrap_or(DEFAULT_BOUNDS), &url);
            }
            Step::Message { from, request } => {
                let action = request.action();
                let (tx, rx) = oneshot::channel();
                let sender = self.sender_in(from);
                self.reactor_tx.send(reactor::Event::Message { request, sender, resp: Some(tx) });
                let response = rx.await.context("reactor dropped a message unanswered")?;
                info!(window = %from, action, status = %response.status, "message acknowledged");
                self.acks.push(Ack { window: from, action, response });
            }
            Step::Page { window, input } => {
                let input = input.into_input()?;
                self.page(window).await?.handle_input(input);
            }
            Step::Close(window) => {
                if !self.browser.user_close(window) {
                    warn!(%window, "Cannot close unknown window");
                }
            }
            Step::Focus(window) => {
                self.reactor_tx.send(reactor::Event::WindowFocusRegained(window));
                if let Some(tap) = self.pages.get_mut(&window) {
                    tap.handle_input(Input::FocusGained);
                }
            }
            Step::SetOptions(entries) => {
                self.store.set(entries).await.context("writing options")?;
                let config = config::load(&self.store).await.context("reloading options")?;
                for tap in self.pages.values_mut() {
                    tap.handle_config_updated(&config);
                }
            }
            Step::Wait(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
        }
        self.settle().await
    }

    /// The event tap of the page in `window`, created on first use.
    async fn page(&mut self, window: WindowId) -> anyhow::Result<&mut EventTap<HeadlessPage>> {
        if !self.pages.contains_key(&window) {
            let identity = self.sender_in(window);
            let location = identity
                .tab_url()
                .map(str::to_owned)
                .ok_or_else(|| anyhow!("window {window} has no page"))?;
            let bounds = self
                .browser
                .windows()
                .into_iter()
                .find(|w| w.id == window)
                .map_or(DEFAULT_BOUNDS, |w| w.bounds);
            let screen = ScreenRect::new(
                f64::from(bounds.top),
                f64::from(bounds.left),
                f64::from(bounds.width),
                f64::from(bounds.height),
            );
            let config = config::load(&self.store).await.context("loading page options")?;
            let surface = HeadlessPage::new(location, screen, self.dark);
            let tap = EventTap::new(surface, &config, identity, self.reactor_tx.clone());
            self.pages.insert(window, tap);
        }
        self.pages.get_mut(&window).ok_or_else(|| anyhow!("window {window} has no page"))
    }

    /// Runs expired page timers, delivers re-dispatched clicks and waits until
    /// the reactor has seen every resulting removal.
    async fn settle(&mut self) -> anyhow::Result<()> {
        loop {
            for (window, tap) in &mut self.pages {
                tap.process_expired_timers();
                for action in tap.surface().take_actions() {
                    if let PageAction::Redispatched(link) = &action {
                        let click =
                            Input::Click { link: Some(link.clone()), pointer: Point::default() };
                        if tap.handle_input(click) == Disposition::Default {
                            info!(%window, %link, "page followed link");
                            self.navigations.push((*window, link.clone()));
                        }
                    }
                    self.page_actions.entry(*window).or_default().push(action);
                }
            }

            self.barrier().await?;
            let removed = self.browser.take_removed();
            if removed.is_empty() {
                return Ok(());
            }
            for window in removed {
                self.pages.remove(&window);
                self.reactor_tx.send(reactor::Event::WindowRemoved(window));
            }
        }
    }

    /// Events are handled in order, so an answered query means everything
    /// sent before it has been processed.
    async fn barrier(&self) -> anyhow::Result<PopupWindowsInfo> {
        self.queries.query_popup_tree().await.ok_or_else(|| anyhow!("reactor stopped answering"))
    }

    async fn finish(&mut self) -> anyhow::Result<Report> {
        let tree = self.barrier().await?;
        Ok(Report {
            acks: std::mem::take(&mut self.acks),
            tree,
            windows: self.browser.windows(),
            page_actions: std::mem::take(&mut self.page_actions),
            navigations: std::mem::take(&mut self.navigations),
            icon: None,
        })
    }
}

/// Plays `script` against a fresh simulated browser backed by `store`.
pub async fn run<S: ConfigStore + Clone>(script: Script, store: S) -> anyhow::Result<Report> {
    let browser = SimulatedBrowser::new(script.family);
    if !script.options.is_empty() {
        store.set(script.options).await.context("writing script options")?;
    }

    let (reactor_tx, reactor_rx) = actor::channel();
    let (icon_tx, icon_rx) = actor::channel();
    let reactor = Reactor::new(browser.clone(), store.clone());
    let icon = ActionIcon::new(browser.clone(), icon_rx);
    let center = NotificationCenter::new(store.clone(), reactor_tx.clone());
    reactor_tx.send(reactor::Event::RegisterIconSender(icon_tx));

    let mut driver = Driver {
        browser: browser.clone(),
        store,
        queries: ReactorQueryHandle::new(reactor_tx.clone()),
        reactor_tx,
        dark: script.dark,
        pages: BTreeMap::new(),
        acks: Vec::new(),
        page_actions: BTreeMap::new(),
        navigations: Vec::new(),
    };
    let steps = async {
        for step in script.steps {
            driver.step(step).await?;
        }
        driver.finish().await
    };

    // Dropping the reactor drops the icon sender, which flushes the icon actor.
    let actors = async {
        tokio::select! {
            report = steps => report,
            () = reactor.run(reactor_rx) => Err(anyhow!("reactor stopped early")),
            () = center.run() => Err(anyhow!("storage notifications stopped early")),
        }
    };
    let (report, ()) = tokio::join!(actors, icon.run());
    let mut report = report?;
    report.icon = browser.icon();
    Ok(report)
}

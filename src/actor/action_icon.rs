//! Applies toolbar icon updates. Bursts are collapsed so only the last state
//! in a quiet period reaches the browser.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{trace, warn};

use crate::actor;
use crate::sys::browser::Browser;
use crate::ui::action_icon::{IconState, icon_path};

const DEBOUNCE: Duration = Duration::from_millis(150);

#[derive(Debug)]
pub enum Event {
    Update(IconState),
}

pub type Sender = actor::Sender<Event>;
pub type Receiver = actor::Receiver<Event>;

pub struct ActionIcon<B> {
    browser: B,
    rx: Receiver,
    shown: Option<&'static str>,
}

impl<B: Browser> ActionIcon<B> {
    pub fn new(browser: B, rx: Receiver) -> Self { Self { browser, rx, shown: None } }

    pub async fn run(mut self) {
        let mut pending: Option<IconState> = None;
        let deadline = tokio::time::sleep(DEBOUNCE);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                () = &mut deadline, if pending.is_some() => {
                    if let Some(state) = pending.take() {
                        self.apply(state).await;
                    }
                }
                maybe = self.rx.recv() => match maybe {
                    Some((span, Event::Update(state))) => {
                        let _enter = span.enter();
                        trace!(?state, "icon update queued");
                        pending = Some(state);
                        deadline.as_mut().reset(Instant::now() + DEBOUNCE);
                    }
                    None => {
                        if let Some(state) = pending.take() {
                            self.apply(state).await;
                        }
                        break;
                    }
                },
            }
        }
    }

    async fn apply(&mut self, state: IconState) {
        let path = icon_path(state);
        if self.shown == Some(path) {
            return;
        }
        match self.browser.set_icon(path).await {
            Ok(()) => self.shown = Some(path),
            Err(e) => warn!(path, "Failed to set action icon: {e}"),
        }
    }
}

//! Forwards storage change notifications: every change goes to the reactor,
//! and changes to page options reload the event tap's configuration.

use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, warn};

use crate::actor::{event_tap, reactor};
use crate::common::config::{self, PAGE_KEYS, keys};
use crate::sys::storage::{ConfigStore, StorageChange, ValueChange};

pub struct NotificationCenter<S> {
    store: S,
    changes: BroadcastStream<StorageChange>,
    reactor_tx: reactor::Sender,
    event_tap_tx: Option<event_tap::Sender>,
}

impl<S: ConfigStore> NotificationCenter<S> {
    /// Subscribes right away, so nothing written after this call is missed.
    pub fn new(store: S, reactor_tx: reactor::Sender) -> Self {
        let changes = BroadcastStream::new(store.subscribe());
        NotificationCenter { store, changes, reactor_tx, event_tap_tx: None }
    }

    pub fn with_event_tap(mut self, tx: event_tap::Sender) -> Self {
        self.event_tap_tx = Some(tx);
        self
    }

    pub async fn run(mut self) {
        while self.step().await {}
        debug!("storage notifications closed");
    }

    /// Handles the next notification. Returns false once the store is gone.
    pub async fn step(&mut self) -> bool {
        let change = match self.changes.next().await {
            Some(Ok(change)) => change,
            Some(Err(BroadcastStreamRecvError::Lagged(missed))) => {
                warn!(missed, "Storage notifications dropped; assuming every key changed");
                assume_all_changed()
            }
            None => return false,
        };
        self.dispatch(change).await;
        true
    }

    async fn dispatch(&self, change: StorageChange) {
        let page_relevant = change.touches_any(PAGE_KEYS);
        self.reactor_tx.send(reactor::Event::StorageChanged(change));

        let Some(tx) = &self.event_tap_tx else { return };
        if !page_relevant {
            return;
        }
        match config::load(&self.store).await {
            Ok(config) => tx.send(event_tap::Event::ConfigUpdated(config)),
            Err(e) => warn!("Failed to reload page options: {e}"),
        }
    }
}

fn assume_all_changed() -> StorageChange {
    let mut change = StorageChange::default();
    for key in PAGE_KEYS.iter().chain([&keys::POPUP_WINDOWS_INFO]) {
        change
            .changes
            .insert((*key).to_owned(), ValueChange { old_value: None, new_value: None });
    }
    change
}

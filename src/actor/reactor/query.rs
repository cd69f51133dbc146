use tokio::sync::oneshot;
use tracing::warn;

use crate::actor::reactor::{Event, Reactor, Sender};
use crate::common::config::{self, Config};
use crate::model::popup_info::PopupWindowsInfo;
use crate::sys::browser::Browser;
use crate::sys::storage::ConfigStore;

#[derive(Clone)]
pub struct ReactorQueryHandle {
    tx: Sender,
}

impl ReactorQueryHandle {
    pub fn new(tx: Sender) -> Self { Self { tx } }

    async fn send_query<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> QueryRequest,
    ) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        self.tx.try_send(Event::Query(build(tx))).ok()?;
        rx.await.ok()
    }

    /// The tracking tree as the reactor sees it, or `None` when the reactor is
    /// gone or the store cannot be read.
    pub async fn query_popup_tree(&self) -> Option<PopupWindowsInfo> {
        self.send_query(QueryRequest::PopupTree).await.flatten()
    }

    pub async fn query_config(&self) -> Option<Config> {
        self.send_query(QueryRequest::Config).await.flatten()
    }
}

#[derive(Debug)]
pub enum QueryRequest {
    PopupTree(oneshot::Sender<Option<PopupWindowsInfo>>),
    Config(oneshot::Sender<Option<Config>>),
}

impl<B: Browser, S: ConfigStore> Reactor<B, S> {
    pub(super) async fn handle_query_request(&mut self, req: QueryRequest) {
        match req {
            QueryRequest::PopupTree(resp) => {
                let _ = resp.send(self.query_popup_tree().await);
            }
            QueryRequest::Config(resp) => {
                let config = match config::load(&self.store).await {
                    Ok(config) => Some(config),
                    Err(e) => {
                        warn!("Config query failed: {e}");
                        None
                    }
                };
                let _ = resp.send(config);
            }
        }
    }

    async fn query_popup_tree(&mut self) -> Option<PopupWindowsInfo> {
        if let Some(tree) = self.popup_manager.cached() {
            return Some(tree.clone());
        }
        match self.popup_manager.load(&self.store).await {
            Ok(tree) => Some(tree),
            Err(e) => {
                warn!("Popup tree query failed: {e}");
                None
            }
        }
    }
}

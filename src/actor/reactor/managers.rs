use tracing::trace;

use crate::actor::action_icon;
use crate::common::config::keys;
use crate::model::popup_info::PopupWindowsInfo;
use crate::sys::storage::{ConfigStore, Entries, StoreError};

/// Reads and writes the popup tracking tree, keeping the last copy seen.
///
/// The copy only answers queries. Operations always start from a fresh read
/// because the store can be changed behind our back.
pub struct PopupManager {
    cached: Option<PopupWindowsInfo>,
}

impl PopupManager {
    pub fn new() -> Self { PopupManager { cached: None } }

    pub async fn load<S: ConfigStore>(
        &mut self,
        store: &S,
    ) -> Result<PopupWindowsInfo, StoreError> {
        let mut stored = store.get(&[keys::POPUP_WINDOWS_INFO]).await?;
        let tree = match stored.remove(keys::POPUP_WINDOWS_INFO) {
            Some(value) => serde_json::from_value(value).map_err(|source| StoreError::Codec {
                key: keys::POPUP_WINDOWS_INFO.to_owned(),
                source,
            })?,
            None => PopupWindowsInfo::default(),
        };
        self.cached = Some(tree.clone());
        Ok(tree)
    }

    /// Writes the whole tree, saved geometry included, in one call.
    pub async fn save<S: ConfigStore>(
        &mut self,
        store: &S,
        tree: PopupWindowsInfo,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(&tree).map_err(|source| StoreError::Codec {
            key: keys::POPUP_WINDOWS_INFO.to_owned(),
            source,
        })?;
        let mut items = Entries::new();
        items.insert(keys::POPUP_WINDOWS_INFO.to_owned(), value);
        store.set(items).await?;
        self.cached = Some(tree);
        Ok(())
    }

    pub fn cached(&self) -> Option<&PopupWindowsInfo> { self.cached.as_ref() }

    pub fn invalidate(&mut self) {
        if self.cached.take().is_some() {
            trace!("popup tree cache invalidated");
        }
    }
}

/// Where icon changes go once an icon actor has registered.
pub struct CommunicationManager {
    pub icon_tx: Option<action_icon::Sender>,
}

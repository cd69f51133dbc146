use crate::model::geometry::WindowId;
use crate::sys::browser::BrowserError;
use crate::sys::storage::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("invalid preview target {url:?}: {reason}")]
    InvalidTarget {
        url: String,
        #[source]
        reason: url::ParseError,
    },
    #[error("could not create the preview window")]
    WindowCreation(#[source] BrowserError),
    #[error("window {0} is not tracked as a popup")]
    OrphanPopup(WindowId),
    #[error("storage unavailable")]
    StorageUnavailable(#[from] StoreError),
}

pub type Result<T, E = PreviewError> = std::result::Result<T, E>;

//! Style text for the visual feedback shown while a preview opens.

use serde::{Deserialize, Serialize};

pub const CLICK_MASK_ID: &str = "clickMask";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct BlurStyle {
    pub px: f64,
    pub secs: f64,
}

impl BlurStyle {
    /// Inline style for a full-viewport layer that blurs what is behind it and
    /// lets pointer events through.
    pub fn layer_style(&self) -> String {
        format!(
            "position: fixed; top: 0; left: 0; width: 100%; height: 100%; \
             z-index: 2147483647; backdrop-filter: blur({}px); \
             transition: backdrop-filter {}s ease; pointer-events: none;",
            self.px, self.secs
        )
    }
}

/// Stylesheet for the input-blocking mask. Form controls stay usable; links
/// do not.
pub fn click_mask_css() -> String {
    format!(
        "#{id} {{ position: fixed; top: 0; left: 0; width: 100vw; height: 100vh; \
         background: rgba(0, 0, 0, 0); z-index: 9999; cursor: not-allowed; pointer-events: all; }}\n\
         body * {{ pointer-events: none !important; }}\n\
         input, button, textarea, select {{ pointer-events: auto !important; }}\n\
         a {{ pointer-events: none !important; }}\n\
         #{id} {{ pointer-events: all; }}",
        id = CLICK_MASK_ID
    )
}

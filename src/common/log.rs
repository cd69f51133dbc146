use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};
use tracing_tree::HierarchicalLayer;

const DEFAULT_DIRECTIVE: &str = "popup_preview=info";

/// Installs the global subscriber. `RUST_LOG` takes precedence over
/// `verbosity`; each verbosity step lowers the crate's level by one.
pub fn init_logging(verbosity: u8) {
    let fallback = match verbosity {
        0 => DEFAULT_DIRECTIVE,
        1 => "popup_preview=debug",
        _ => "popup_preview=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let tree = HierarchicalLayer::default()
        .with_indent_amount(2)
        .with_indent_lines(true)
        .with_targets(true)
        .with_bracketed_fields(true);

    if Registry::default().with(filter).with(tree).try_init().is_err() {
        tracing::debug!("global subscriber already installed");
    }
}

/// Logs a failed best-effort operation at `warn` and discards the error.
pub fn warn_on_err<E: std::fmt::Display>(context: &str, res: Result<(), E>) {
    if let Err(e) = res {
        tracing::warn!("Failed to {}: {}", context, e);
    }
}

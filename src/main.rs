use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use popup_preview::common::config::{self, Config};
use popup_preview::common::log::{init_logging, warn_on_err};
use popup_preview::replay::{self, Report, Script};
use popup_preview::sys::storage::{ConfigStore, Entries, FileStore, MemoryStore};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "popup-preview", about = "Preview popup coordinator, driven by scripts")]
struct Cli {
    /// More logging; repeat for trace output.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// TOML file with option overrides, keyed by storage name.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a JSON session script against a simulated browser
    Replay {
        script: PathBuf,

        /// Persist storage to this JSON file instead of memory.
        #[arg(long)]
        store: Option<PathBuf>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the default options as TOML
    Defaults,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Replay { script, store, json } => {
            let text = tokio::fs::read_to_string(&script)
                .await
                .with_context(|| format!("reading {}", script.display()))?;
            let script: Script = serde_json::from_str(&text)
                .with_context(|| format!("parsing {}", script.display()))?;
            let overrides = load_overrides(cli.config.as_ref()).await?;

            let report = match store {
                Some(path) => {
                    let store = FileStore::open(&path)
                        .await
                        .with_context(|| format!("opening store {}", path.display()))?;
                    debug!(path = %store.path().display(), "using file store");
                    run(script, store, overrides).await?
                }
                None => run(script, MemoryStore::default(), overrides).await?,
            };
            print_report(&report, json)?;
        }
        Commands::Defaults => {
            let text = toml::to_string(&Config::default()).context("encoding defaults")?;
            print!("{text}");
        }
    }
    Ok(())
}

async fn run<S: ConfigStore + Clone>(
    script: Script,
    store: S,
    overrides: Entries,
) -> anyhow::Result<Report> {
    if !overrides.is_empty() {
        info!(count = overrides.len(), "applying option overrides");
        warn_on_err("apply option overrides", store.set(overrides).await);
    }
    replay::run(script, store).await
}

/// Reads overrides from `path`, or from the default location when it exists.
async fn load_overrides(path: Option<&PathBuf>) -> anyhow::Result<Entries> {
    let (path, required) = match path {
        Some(path) => (path.clone(), true),
        None => match config::default_overrides_path() {
            Some(path) => (path, false),
            None => return Ok(Entries::new()),
        },
    };
    let text = match tokio::fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Entries::new());
        }
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    config::parse_overrides(&text).with_context(|| format!("parsing {}", path.display()))
}

fn print_report(report: &Report, json: bool) -> anyhow::Result<()> {
    if json {
        let value = serde_json::json!({
            "acks": report.acks,
            "popupWindowsInfo": report.tree,
            "windows": report.windows,
            "navigations": report.navigations,
            "icon": report.icon,
        });
        println!("{}", serde_json::to_string_pretty(&value).context("encoding report")?);
        return Ok(());
    }

    for ack in &report.acks {
        println!("{} {} -> {}", ack.window, ack.action, ack.response.status);
    }
    for (window, link) in &report.navigations {
        println!("{window} followed {link}");
    }
    print!("{}", report.render_tree());
    if let Some(icon) = &report.icon {
        println!("icon: {icon}");
    }
    Ok(())
}

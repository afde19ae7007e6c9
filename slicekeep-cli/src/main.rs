use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use slicekeep::{
    Clock, DocumentStatus, FileStorage, HydrationReport, PersistConfig, SliceOutcomeKind,
    StorageEngine, StoredDocument, SystemClock,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "slicekeep-cli")]
#[command(about = "Slicekeep CLI - inspect and maintain persisted state documents", long_about = None)]
struct Args {
    /// Storage directory of the file engine
    #[arg(short = 'd', long, default_value = "./data/state")]
    dir: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List stored keys
    List,
    /// Show the document stored under a key
    Inspect { key: String },
    /// Hydrate a configured item and report the outcome of every slice
    Check {
        /// YAML persist configuration
        #[arg(short, long)]
        config: PathBuf,

        /// Print the hydration report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete the document stored under a key
    Remove { key: String },
    /// Delete every stored document
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    match execute(&args.dir, &args.command).await {
        Ok(output) => {
            info!("{}", output);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "{}", format!("Error: {:#}", e).red());
            std::process::exit(1);
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stdout)
        .with_env_filter(filter)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn execute(dir: &Path, command: &Command) -> Result<String> {
    let storage = FileStorage::new(dir);
    storage
        .check_root()
        .await
        .with_context(|| format!("storage directory {:?}", dir))?;

    match command {
        Command::List => {
            let keys = storage.keys().await?;
            if keys.is_empty() {
                return Ok("(empty)".dimmed().to_string());
            }
            Ok(keys
                .iter()
                .enumerate()
                .map(|(i, key)| format!("{}) \"{}\"", i + 1, key))
                .collect::<Vec<_>>()
                .join("\n"))
        }
        Command::Inspect { key } => match storage.get_item(key).await? {
            Some(raw) => {
                let doc = StoredDocument::parse(&raw)
                    .with_context(|| format!("document at '{}'", key))?;
                Ok(render_document(key, &doc, SystemClock.now_millis()))
            }
            None => Ok("(nil)".dimmed().to_string()),
        },
        Command::Check { config, json } => {
            let config = PersistConfig::from_file(config)?;
            let item = config.builder(Arc::new(storage)).build()?;
            let report = item.init().await;
            item.shutdown();

            if *json {
                Ok(serde_json::to_string_pretty(&report)?)
            } else {
                Ok(render_report(&config.key, config.version, &report))
            }
        }
        Command::Remove { key } => {
            storage.remove_item(key).await?;
            Ok("OK".green().to_string())
        }
        Command::Clear => {
            let removed = storage.keys().await?.len();
            storage.clear().await?;
            Ok(format!("{} ({} removed)", "OK".green(), removed))
        }
    }
}

fn render_document(key: &str, doc: &StoredDocument, now: u64) -> String {
    let mut lines = vec![format!(
        "{} (document v{}, {} slices)",
        key.bold(),
        doc.version,
        doc.slices.len()
    )];

    for name in doc.names() {
        match doc.record(name) {
            Some(Ok(record)) => lines.push(format!(
                "  {:<20} v{:<4} age {:<8} {} bytes",
                name,
                record.version,
                format_age(record.age_millis(now)),
                record.payload.len()
            )),
            _ => lines.push(format!("  {:<20} {}", name, "malformed record".red())),
        }
    }

    lines.join("\n")
}

fn render_report(key: &str, version: u32, report: &HydrationReport) -> String {
    let status = match &report.status {
        DocumentStatus::Missing => "missing".dimmed(),
        DocumentStatus::Unreadable => "unreadable".red(),
        DocumentStatus::Corrupt => "corrupt".red(),
        DocumentStatus::VersionMismatch { stored, expected } => {
            format!("version mismatch (stored v{}, expected v{})", stored, expected).yellow()
        }
        DocumentStatus::Loaded => "loaded".green(),
    };

    let mut lines = vec![format!("{} (document v{}): {}", key.bold(), version, status)];

    for (name, kind) in &report.slices {
        let label = kind.to_string();
        let label = match kind {
            SliceOutcomeKind::Valid => label.green(),
            SliceOutcomeKind::Missing => label.dimmed(),
            SliceOutcomeKind::Stale | SliceOutcomeKind::Expired => label.yellow(),
            SliceOutcomeKind::Corrupt => label.red(),
        };
        lines.push(format!("  {:<20} {}", name, label));
    }

    if !report.dropped.is_empty() {
        lines.push(format!(
            "  {} {}",
            "unregistered:".dimmed(),
            report.dropped.join(", ")
        ));
    }

    lines.join("\n")
}

fn format_age(millis: u64) -> String {
    match millis {
        0..1_000 => format!("{}ms", millis),
        1_000..60_000 => format!("{:.1}s", millis as f64 / 1_000.0),
        60_000..3_600_000 => format!("{}m", millis / 60_000),
        3_600_000..86_400_000 => format!("{}h", millis / 3_600_000),
        _ => format!("{}d", millis / 86_400_000),
    }
}

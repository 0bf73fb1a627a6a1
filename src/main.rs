use anyhow::Context;
use campus_events::config::Config;
use campus_events::normalize::DateTimeNormalizer;
use campus_events::pipeline::{extract_saved_page, run_now};
use campus_events::types::{SourceKind, SourceStatus};
use campus_events::{logging, storage::PublishedEvent};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "campus-events")]
#[command(about = "Campus event calendar, venue and athletics aggregator")]
#[command(version)]
struct Cli {
    /// Directory for the daily JSON log file
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape every configured source once and save the result
    Run {
        /// TOML configuration file (defaults to $CAMPUS_EVENTS_CONFIG or ./config.toml)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Only run these sources (comma-separated names)
        #[arg(long)]
        sources: Option<String>,
        /// Output directory for the JSON documents
        #[arg(long)]
        output: Option<PathBuf>,
        /// Abort unfinished sources after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Extract events from a saved page without touching the network
    Extract {
        /// general, venue or athletics
        #[arg(long)]
        kind: SourceKind,
        #[arg(long)]
        file: PathBuf,
        /// URL the page was saved from
        #[arg(long)]
        url: String,
    },
    /// List configured sources
    Sources {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load(&path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Config::from_env().context("loading configuration"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = logging::init_logging(&cli.log_dir);

    match cli.command {
        Commands::Run {
            config,
            sources,
            output,
            timeout_secs,
        } => {
            let mut config = load_config(config)?;
            if let Some(list) = sources {
                let names: Vec<String> = list
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                config.select_sources(&names)?;
            }
            if let Some(dir) = output {
                config.output.dir = dir;
            }
            if timeout_secs.is_some() {
                config.run.timeout_secs = timeout_secs;
            }

            println!("🚀 Running {} sources...", config.sources.len());
            let result = run_now(&config).await?;

            println!("\n📊 Run results:");
            for report in &result.sources {
                match &report.status {
                    SourceStatus::Completed => println!(
                        "   {}: {} events, {} skipped",
                        report.name,
                        report.event_count(),
                        report.skipped.len()
                    ),
                    SourceStatus::Failed { reason } => {
                        println!("   {}: ❌ failed ({})", report.name, reason)
                    }
                    SourceStatus::Cancelled => println!("   {}: ⏹ cancelled", report.name),
                }
            }
            println!("✅ {}", result.summary_line());
            if !result.failed_sources().is_empty() {
                warn!("Run finished with failed sources");
            }
        }
        Commands::Extract { kind, file, url } => {
            let html = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let (extraction, batch) =
                extract_saved_page(kind, &html, &url, DateTimeNormalizer::default())?;
            info!(
                "Extracted {} bags, {} events from {}",
                extraction.bags.len(),
                batch.events.len(),
                file.display()
            );
            for reason in &extraction.skipped {
                warn!("Skipped: {}", reason);
            }
            let published: Vec<PublishedEvent> =
                batch.events.iter().map(PublishedEvent::from).collect();
            let output = serde_json::json!({
                "bags": extraction.bags,
                "events": published,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Sources { config } => {
            let config = match load_config(config) {
                Ok(config) => config,
                Err(e) => {
                    error!("{:#}", e);
                    return Err(e);
                }
            };
            for source in &config.sources {
                println!(
                    "{:<12} {:<10} rendered={:<5} {} url(s)",
                    source.name,
                    source.kind,
                    source.rendered,
                    source.urls.len()
                );
            }
        }
    }
    Ok(())
}

//! rustpaperrank - arXiv digest with heuristic ranking
//!
//! ## Usage
//!
//! ### Fetch, rank and publish
//! ```bash
//! rustpaperrank fetch --output ./docs --top-n 10
//! ```
//!
//! ### Rank an offline batch
//! ```bash
//! rustpaperrank rank --input records.json
//! ```
//!
//! ### HTTP Server Mode
//! ```bash
//! rustpaperrank serve --port 3000
//! ```

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rustpaperrank::config::AppConfig;
use rustpaperrank::export::{CsvSink, JsonFeedSink, PaperSink};
use rustpaperrank::model::records_from_values;
use rustpaperrank::pipeline::{Pipeline, PipelineOptions};
use rustpaperrank::ranking::ScoredPaper;
use rustpaperrank::revisions::NoRevisions;
use rustpaperrank::server;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// arXiv digest with heuristic ranking
#[derive(Parser)]
#[command(name = "rustpaperrank")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// JSON config file (missing keys keep their defaults)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch recent arXiv papers, rank them and publish the top N
    Fetch {
        /// Output directory for papers.json and ranked.csv
        #[arg(short, long, default_value = "./docs")]
        output: PathBuf,

        /// Search topic (repeatable, replaces configured topics)
        #[arg(long = "topic")]
        topics: Vec<String>,

        /// Submission window in days
        #[arg(long)]
        window_days: Option<i64>,

        #[command(flatten)]
        limits: LimitArgs,

        /// Skip arXiv revision lookups
        #[arg(long)]
        no_revisions: bool,

        /// Attach Semantic Scholar citation counts
        #[arg(long)]
        citations: bool,

        /// Semantic Scholar API key
        #[arg(long)]
        semantic_scholar_key: Option<String>,
    },

    /// Rank records from a JSON array file without network access
    Rank {
        /// JSON file holding an array of records
        #[arg(short, long)]
        input: PathBuf,

        /// Write ranked papers as CSV instead of printing JSON
        #[arg(long)]
        csv: Option<PathBuf>,

        #[command(flatten)]
        limits: LimitArgs,
    },

    /// Run as HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Print the effective configuration as JSON
    Config,
}

#[derive(clap::Args)]
struct LimitArgs {
    /// Papers kept right after sorting
    #[arg(long)]
    top_k: Option<usize>,

    /// Papers handed to the sinks
    #[arg(long)]
    top_n: Option<usize>,
}

impl LimitArgs {
    fn apply(&self, config: &mut AppConfig) {
        if self.top_k.is_some() {
            config.ranking.limits.top_k = self.top_k;
        }
        if self.top_n.is_some() {
            config.ranking.limits.top_n = self.top_n;
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if cli.log_json {
        fmt().json().with_env_filter(filter).with_target(true).init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .init();
    }

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Fetch {
            output,
            topics,
            window_days,
            limits,
            no_revisions,
            citations,
            semantic_scholar_key,
        } => {
            let mut config = config;
            if !topics.is_empty() {
                config.search.topics = topics;
            }
            if let Some(days) = window_days {
                config.search.window_days = days;
            }
            if semantic_scholar_key.is_some() {
                config.lookup.semantic_scholar_key = semantic_scholar_key;
            }
            limits.apply(&mut config);

            let options = PipelineOptions {
                resolve_revisions: !no_revisions,
                fetch_citations: citations,
            };
            run_fetch(config, options, &output).await
        }
        Commands::Rank { input, csv, limits } => {
            let mut config = config;
            limits.apply(&mut config);
            run_rank(config, &input, csv.as_deref())
        }
        Commands::Serve { port, host } => run_server(config, &host, port).await,
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(p) => AppConfig::from_path(p)
            .with_context(|| format!("Failed to load config from {}", p.display())),
        None => Ok(AppConfig::default()),
    }
}

// ============================================================================
// Fetch Pipeline
// ============================================================================

async fn run_fetch(config: AppConfig, options: PipelineOptions, output: &Path) -> Result<()> {
    std::fs::create_dir_all(output).context("Failed to create output directory")?;

    let pipeline = Pipeline::new(config).context("Invalid configuration")?;
    let now = Utc::now();
    let report = pipeline.run(options, now).await.context("Pipeline failed")?;

    println!(
        "Fetched {} papers, {} relevant, {} unique, {} selected.",
        report.fetched,
        report.relevant,
        report.unique,
        report.selected.len()
    );
    if options.fetch_citations {
        println!("Citations attached to {} papers.", report.citations_matched);
    }

    print_ranked(&report.selected);

    let feed = JsonFeedSink::new(output.join("papers.json"));
    let feed_report = feed
        .publish(&report.selected, now)
        .context("Failed to update feed")?;
    println!(
        "Feed: {} added, {} already present, {} total ({})",
        feed_report.added,
        feed_report.skipped,
        feed_report.total,
        feed.path().display()
    );

    CsvSink::new(output.join("ranked.csv"))
        .publish(&report.selected, now)
        .context("Failed to write CSV")?;

    println!("\n✓ Pipeline complete. Results in: {}", output.display());
    Ok(())
}

fn run_rank(config: AppConfig, input: &Path, csv: Option<&Path>) -> Result<()> {
    let content = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let values: Vec<serde_json::Value> =
        serde_json::from_str(&content).context("Input must be a JSON array of records")?;
    let mut records = records_from_values(values);

    let now = Utc::now();
    for record in &mut records {
        record.normalize_age(now);
    }

    let pipeline = Pipeline::new(config).context("Invalid configuration")?;
    let total = records.len();
    let selected = pipeline.select(pipeline.prepare(records), &NoRevisions);
    info!(input = total, selected = selected.len(), "Offline ranking done");

    match csv {
        Some(path) => {
            CsvSink::new(path)
                .publish(&selected, now)
                .context("Failed to write CSV")?;
            println!("Saved {} ranked papers to {}", selected.len(), path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&selected)?),
    }
    Ok(())
}

fn print_ranked(papers: &[ScoredPaper]) {
    for (idx, paper) in papers.iter().enumerate() {
        let record = &paper.record;
        println!("\n{}. {}", idx + 1, record.title);
        println!("   Score: {:.2} (pre-damping {:.2})", paper.score, paper.pre_damping);
        println!("   Authors: {}", record.display_authors());
        println!(
            "   Published: {} ({} days ago)",
            record.published.format("%Y-%m-%d"),
            record.days_since_publication
        );
        if let Some(stats) = record.citations {
            println!(
                "   Citations: {} (trend {:.3}/day)",
                stats.citation_count, stats.trend_score
            );
        }
        if let Some(link) = &record.link {
            println!("   Link: {}", link);
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

async fn run_server(config: AppConfig, host: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid host:port")?;

    println!("Starting server at http://{}", addr);
    server::run(addr, config).await.context("Server error")?;
    Ok(())
}

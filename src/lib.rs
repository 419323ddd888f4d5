//! # rustpaperrank
//!
//! arXiv paper digest: fetch recent papers, rank them with weighted heuristics and
//! publish the top of the list to a JSON feed.
//!
//! ## Modules
//!
//! - [`arxiv`] - arXiv query API client and Atom parsing
//! - [`filter`] - Keyword exclusion filter
//! - [`dedup`] - Title deduplication
//! - [`ranking`] - Heuristic scoring engine
//! - [`revisions`] - Revision count resolution with neutral fallback
//! - [`semanticscholar`] - Citation enrichment
//! - [`export`] - JSON feed and CSV sinks
//! - [`pipeline`] - Stage orchestration
//! - [`server`] - HTTP ranking service
//! - [`config`] - Weights, keyword tables and limits
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rustpaperrank::{config::AppConfig, pipeline::{Pipeline, PipelineOptions}};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pipeline = Pipeline::new(AppConfig::default())?;
//!     let report = pipeline.run(PipelineOptions::default(), chrono::Utc::now()).await?;
//!     println!("Selected {} papers", report.selected.len());
//!     Ok(())
//! }
//! ```

pub mod arxiv;
pub mod config;
pub mod dedup;
pub mod error;
pub mod export;
pub mod filter;
pub mod model;
pub mod pipeline;
pub mod ranking;
pub mod revisions;
pub mod semanticscholar;
pub mod server;

pub use error::{PaperRankError, Result};

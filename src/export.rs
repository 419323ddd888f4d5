//! Sinks for ranked papers: a JSON feed for the static site and a flat CSV.

use crate::error::Result;
use crate::model::{dedup_key, format_authors, MAX_DISPLAY_AUTHORS, UNKNOWN_AUTHOR};
use crate::ranking::ScoredPaper;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::info;

/// Status given to papers entering the feed
pub const DEFAULT_STATUS: &str = "To Read";

/// Outcome of publishing a batch to a sink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub added: usize,
    pub skipped: usize,
    /// Papers held by the sink after publishing
    pub total: usize,
}

/// Destination for ranked papers.
pub trait PaperSink {
    fn publish(&self, papers: &[ScoredPaper], now: DateTime<Utc>) -> Result<PublishReport>;
}

/// Website feed file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Feed {
    pub metadata: FeedMetadata,
    pub papers: Vec<FeedPaper>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedMetadata {
    pub generated_at: Option<DateTime<Utc>>,
    pub total_papers: usize,
    pub topics: Vec<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// One paper as the website sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPaper {
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub summary: String,
    pub topic: String,
    pub status: String,
    /// When the paper entered the feed
    pub date: DateTime<Utc>,
    pub published: DateTime<Utc>,
    #[serde(default)]
    pub arxiv_id: String,
    #[serde(default)]
    pub pdf_url: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub score: f64,
}

impl FeedPaper {
    fn from_scored(paper: &ScoredPaper, now: DateTime<Utc>) -> Self {
        let record = &paper.record;
        let arxiv_id = record.external_id.clone().unwrap_or_default();
        let authors = if record.authors.is_empty() {
            vec![UNKNOWN_AUTHOR.to_string()]
        } else {
            record.authors.clone()
        };

        Self {
            id: if arxiv_id.is_empty() {
                record.dedup_key()
            } else {
                arxiv_id.clone()
            },
            title: record.title.trim().to_string(),
            authors,
            summary: record.abstract_text.clone(),
            topic: record.topic.clone(),
            status: DEFAULT_STATUS.to_string(),
            date: now,
            published: record.published,
            arxiv_id,
            pdf_url: record.pdf_url.clone().unwrap_or_default(),
            link: record.link.clone().unwrap_or_default(),
            score: paper.score,
        }
    }
}

/// JSON feed that merges new papers into the existing file.
///
/// Papers already present (same arXiv id, or same normalized title) are skipped, so
/// repeated runs never duplicate entries.
#[derive(Debug, Clone)]
pub struct JsonFeedSink {
    path: PathBuf,
}

impl JsonFeedSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the current feed; a missing file is an empty feed.
    pub fn load(&self) -> Result<Feed> {
        if !self.path.exists() {
            return Ok(Feed::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, feed: &Feed) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(feed)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl PaperSink for JsonFeedSink {
    fn publish(&self, papers: &[ScoredPaper], now: DateTime<Utc>) -> Result<PublishReport> {
        let mut feed = self.load()?;

        let mut known_ids: HashSet<String> = feed
            .papers
            .iter()
            .filter(|p| !p.arxiv_id.is_empty())
            .map(|p| p.arxiv_id.clone())
            .collect();
        let mut known_titles: HashSet<String> =
            feed.papers.iter().map(|p| dedup_key(&p.title)).collect();

        let mut report = PublishReport::default();

        for paper in papers {
            let entry = FeedPaper::from_scored(paper, now);
            let title_key = dedup_key(&entry.title);
            let id_known = !entry.arxiv_id.is_empty() && known_ids.contains(&entry.arxiv_id);

            if id_known || known_titles.contains(&title_key) {
                report.skipped += 1;
                continue;
            }

            if !entry.arxiv_id.is_empty() {
                known_ids.insert(entry.arxiv_id.clone());
            }
            known_titles.insert(title_key);
            feed.papers.push(entry);
            report.added += 1;
        }

        // Newest first; stable so same-run papers keep rank order
        feed.papers.sort_by(|a, b| b.date.cmp(&a.date));

        let topics: BTreeSet<String> = feed.papers.iter().map(|p| p.topic.clone()).collect();
        feed.metadata = FeedMetadata {
            generated_at: Some(now),
            total_papers: feed.papers.len(),
            topics: topics.into_iter().collect(),
            last_updated: feed.papers.first().map(|p| p.date),
        };
        report.total = feed.papers.len();

        self.save(&feed)?;
        info!(
            path = %self.path.display(),
            added = report.added,
            skipped = report.skipped,
            total = report.total,
            "Feed updated"
        );

        Ok(report)
    }
}

/// Flat CSV row for a scored paper
#[derive(Debug, Serialize)]
pub struct CsvRow {
    pub rank: usize,
    pub title: String,
    pub authors: String,
    pub published: String,
    pub arxiv_id: String,
    pub topic: String,
    pub score: f64,
    pub pre_damping: f64,
    pub damped: bool,
    pub revision_count: u32,
    /// `name=weight` pairs of the heuristics that fired
    pub heuristics: String,
    pub citation_count: Option<u64>,
    pub trend_score: Option<f64>,
    pub link: String,
    pub pdf_url: String,
}

impl CsvRow {
    pub fn new(rank: usize, paper: &ScoredPaper) -> Self {
        let record = &paper.record;
        Self {
            rank,
            title: record.title.trim().to_string(),
            authors: format_authors(&record.authors, MAX_DISPLAY_AUTHORS),
            published: record.published.format("%Y-%m-%d").to_string(),
            arxiv_id: record.external_id.clone().unwrap_or_default(),
            topic: record.topic.clone(),
            score: paper.score,
            pre_damping: paper.pre_damping,
            damped: paper.damped,
            revision_count: paper.revision_count,
            heuristics: paper
                .breakdown
                .iter()
                .map(|(h, w)| format!("{}={}", h, w))
                .collect::<Vec<_>>()
                .join(","),
            citation_count: record.citations.map(|c| c.citation_count),
            trend_score: record.citations.map(|c| c.trend_score),
            link: record.link.clone().unwrap_or_default(),
            pdf_url: record.pdf_url.clone().unwrap_or_default(),
        }
    }
}

/// CSV file rewritten on every publish
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PaperSink for CsvSink {
    fn publish(&self, papers: &[ScoredPaper], _now: DateTime<Utc>) -> Result<PublishReport> {
        let rows: Vec<CsvRow> = papers
            .iter()
            .enumerate()
            .map(|(idx, p)| CsvRow::new(idx + 1, p))
            .collect();
        save_csv(&self.path, &rows)?;
        Ok(PublishReport {
            added: rows.len(),
            skipped: 0,
            total: rows.len(),
        })
    }
}

/// Save data to CSV file
pub fn save_csv<T: Serialize>(path: &Path, data: &[T]) -> Result<()> {
    if data.is_empty() {
        info!(path = %path.display(), "No data to save");
        return Ok(());
    }

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(true)
        .from_path(path)?;

    for item in data {
        wtr.serialize(item)?;
    }

    wtr.flush()?;
    info!(path = %path.display(), rows = data.len(), "Saved CSV");
    Ok(())
}

//! Paper records flowing through the filter, dedup and ranking stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Placeholder shown when a record carries no author names
pub const UNKNOWN_AUTHOR: &str = "Unknown Author";

/// Number of names shown before "et al."
pub const MAX_DISPLAY_AUTHORS: usize = 3;

/// One candidate publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    /// Missing titles decode as empty and are dropped by dedup
    #[serde(default)]
    pub title: String,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    /// Author names in display order
    #[serde(default)]
    pub authors: Vec<String>,
    pub published: DateTime<Utc>,
    /// arXiv id without the version suffix
    #[serde(default)]
    pub external_id: Option<String>,
    /// Query topic that produced this record
    #[serde(default)]
    pub topic: String,
    /// Whole days since `published`, never below 1
    #[serde(default)]
    pub days_since_publication: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<CitationStats>,
}

/// Citation counters from Semantic Scholar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CitationStats {
    pub citation_count: u64,
    pub influential_citation_count: u64,
    /// Citations per day since publication
    pub trend_score: f64,
}

impl PaperRecord {
    /// Create a record, deriving `days_since_publication` from `now`.
    pub fn new(
        title: impl Into<String>,
        abstract_text: impl Into<String>,
        authors: Vec<String>,
        published: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            title: title.into(),
            abstract_text: abstract_text.into(),
            authors,
            published,
            external_id: None,
            topic: String::new(),
            days_since_publication: days_since(published, now),
            link: None,
            pdf_url: None,
            citations: None,
        }
    }

    /// Recompute the age for records that arrived without one (e.g. over HTTP).
    pub fn normalize_age(&mut self, now: DateTime<Utc>) {
        if self.days_since_publication == 0 {
            self.days_since_publication = days_since(self.published, now);
        }
    }

    /// Dedup key for this record's title.
    pub fn dedup_key(&self) -> String {
        dedup_key(&self.title)
    }

    /// Authors joined for display, see [`format_authors`].
    pub fn display_authors(&self) -> String {
        format_authors(&self.authors, MAX_DISPLAY_AUTHORS)
    }

    /// Attach citation counters and derive the trend score.
    pub fn set_citations(&mut self, citation_count: u64, influential_citation_count: u64) {
        let days = self.days_since_publication.max(1);
        self.citations = Some(CitationStats {
            citation_count,
            influential_citation_count,
            trend_score: citation_count as f64 / f64::from(days),
        });
    }
}

/// Decode records one at a time, skipping entries that do not form a record.
pub fn records_from_values(values: Vec<serde_json::Value>) -> Vec<PaperRecord> {
    values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(index = index, error = %e, "Skipping malformed record");
                None
            }
        })
        .collect()
}

/// Lower-cased, trimmed title used as the dedup key.
pub fn dedup_key(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Whole days between `published` and `now`, clamped to at least 1.
pub fn days_since(published: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let days = (now - published).num_days().max(1);
    u32::try_from(days).unwrap_or(u32::MAX)
}

/// Format an author list, truncating with "et al." past `max_authors`.
pub fn format_authors(authors: &[String], max_authors: usize) -> String {
    if authors.is_empty() {
        return UNKNOWN_AUTHOR.to_string();
    }
    if authors.len() <= max_authors {
        return authors.join(", ");
    }
    format!("{} et al.", authors[..max_authors].join(", "))
}

//! Heuristic paper scorer.
//!
//! Each record is scored by a fixed sequence of keyword and metadata rules whose weights
//! come from [`RankingConfig`]. Contributions are additive, so the order below only
//! matters for the breakdown's readability:
//!
//! 1. blacklist gate (abstract), which zeroes the record and stops
//! 2. revision count > 1
//! 3. high-impact organization among the authors
//! 4. "benchmark" in the abstract
//! 5. "open-source" / "open source" in the abstract
//! 6. trending term in title or abstract
//! 7. at least [`MIN_TOPIC_OVERLAP`] core topics in the abstract
//! 8. recency tier
//!
//! Scores under [`DAMPING_THRESHOLD`] are multiplied by [`DAMPING_FACTOR`], then every
//! score is rounded to two decimals.

use crate::config::{Heuristic, RankingConfig};
use crate::model::PaperRecord;
use crate::revisions::RevisionLookup;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Scores strictly below this are damped
pub const DAMPING_THRESHOLD: f64 = 2.0;

/// Multiplier applied to damped scores
pub const DAMPING_FACTOR: f64 = 0.8;

/// Papers at most this old get the full recency weight
pub const RECENCY_FULL_DAYS: u32 = 3;

/// Papers at most this old get half the recency weight
pub const RECENCY_HALF_DAYS: u32 = 7;

/// Core-topic matches needed for the overlap signal
pub const MIN_TOPIC_OVERLAP: usize = 2;

/// Contribution of every heuristic that fired, by name.
pub type ScoreBreakdown = BTreeMap<Heuristic, f64>;

/// Terminal classification of a scored record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Blacklisted,
    Ranked,
}

/// A record annotated with its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPaper {
    pub record: PaperRecord,
    pub score: f64,
    /// Sum of contributions before damping and rounding
    pub pre_damping: f64,
    pub damped: bool,
    pub revision_count: u32,
    pub breakdown: ScoreBreakdown,
    pub disposition: Disposition,
}

/// Rule-based scorer built from a [`RankingConfig`].
#[derive(Debug, Clone)]
pub struct Ranker {
    config: RankingConfig,
    blacklist: Vec<String>,
    high_impact_orgs: Vec<String>,
    trending: Vec<String>,
    core_topics: Vec<String>,
}

impl Ranker {
    pub fn new(config: RankingConfig) -> Self {
        let keywords = &config.keywords;
        Self {
            blacklist: lowercase_terms(&keywords.blacklist),
            high_impact_orgs: lowercase_terms(&keywords.high_impact_orgs),
            trending: lowercase_terms(&keywords.trending),
            core_topics: lowercase_terms(&keywords.core_topics),
            config,
        }
    }

    /// Score a single record.
    pub fn score<L: RevisionLookup + ?Sized>(&self, record: PaperRecord, revisions: &L) -> ScoredPaper {
        let abstract_lower = record.abstract_text.to_lowercase();

        if let Some(term) = find_term(&abstract_lower, &self.blacklist) {
            debug!(title = %record.title, term = %term, "Blacklisted");
            return ScoredPaper {
                record,
                score: 0.0,
                pre_damping: 0.0,
                damped: false,
                revision_count: 0,
                breakdown: ScoreBreakdown::new(),
                disposition: Disposition::Blacklisted,
            };
        }

        let mut breakdown = ScoreBreakdown::new();

        let revision_count = revisions.revisions_for(&record);
        if revision_count > 1 {
            self.fire(&mut breakdown, Heuristic::Versions, 1.0);
        }

        let authors_lower = record.authors.join(" ").to_lowercase();
        if find_term(&authors_lower, &self.high_impact_orgs).is_some() {
            self.fire(&mut breakdown, Heuristic::HighImpactAuthors, 1.0);
        }

        if abstract_lower.contains("benchmark") {
            self.fire(&mut breakdown, Heuristic::BenchmarkMention, 1.0);
        }

        if abstract_lower.contains("open-source") || abstract_lower.contains("open source") {
            self.fire(&mut breakdown, Heuristic::OpenSourceMention, 1.0);
        }

        let text = format!("{} {}", record.title.to_lowercase(), abstract_lower);
        if find_term(&text, &self.trending).is_some() {
            self.fire(&mut breakdown, Heuristic::TrendingKeywords, 1.0);
        }

        let overlap = self
            .core_topics
            .iter()
            .filter(|t| abstract_lower.contains(t.as_str()))
            .count();
        if overlap >= MIN_TOPIC_OVERLAP {
            self.fire(&mut breakdown, Heuristic::TopicOverlap, 1.0);
        }

        let days = record.days_since_publication.max(1);
        if days <= RECENCY_FULL_DAYS {
            self.fire(&mut breakdown, Heuristic::Recency, 1.0);
        } else if days <= RECENCY_HALF_DAYS {
            self.fire(&mut breakdown, Heuristic::Recency, 0.5);
        }

        let pre_damping: f64 = breakdown.values().sum();
        let damped = pre_damping < DAMPING_THRESHOLD;
        let raw = if damped {
            pre_damping * DAMPING_FACTOR
        } else {
            pre_damping
        };
        let score = round2(raw);

        debug!(
            title = %record.title,
            score = score,
            pre_damping = pre_damping,
            damped = damped,
            fired = breakdown.len(),
            "Scored"
        );

        ScoredPaper {
            record,
            score,
            pre_damping,
            damped,
            revision_count,
            breakdown,
            disposition: Disposition::Ranked,
        }
    }

    /// Score, drop blacklisted records, sort by score (stable) and apply `top_k`.
    ///
    /// Input must already be filtered and deduplicated.
    pub fn rank<L: RevisionLookup + ?Sized>(
        &self,
        records: Vec<PaperRecord>,
        revisions: &L,
    ) -> Vec<ScoredPaper> {
        if records.is_empty() {
            info!("No papers to rank");
            return Vec::new();
        }
        if self.config.weights.is_empty() {
            warn!(records = records.len(), "Weight table is empty, nothing ranked");
            return Vec::new();
        }

        let total = records.len();
        let mut ranked: Vec<ScoredPaper> = records
            .into_iter()
            .map(|r| self.score(r, revisions))
            .filter(|s| s.disposition == Disposition::Ranked)
            .collect();
        let blacklisted = total - ranked.len();

        // sort_by is stable: equal scores keep feed order
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        apply_limit(&mut ranked, self.config.limits.top_k);

        info!(
            total = total,
            blacklisted = blacklisted,
            returned = ranked.len(),
            top_k = ?self.config.limits.top_k,
            "Ranking complete"
        );

        ranked
    }

    fn fire(&self, breakdown: &mut ScoreBreakdown, heuristic: Heuristic, fraction: f64) {
        breakdown.insert(heuristic, self.config.weight(heuristic) * fraction);
    }
}

/// Truncate to `limit` entries when a limit is set.
pub fn apply_limit<T>(items: &mut Vec<T>, limit: Option<usize>) {
    if let Some(n) = limit {
        items.truncate(n);
    }
}

fn lowercase_terms(terms: &[String]) -> Vec<String> {
    terms
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn find_term<'a>(haystack: &str, terms: &'a [String]) -> Option<&'a str> {
    terms
        .iter()
        .find(|t| haystack.contains(t.as_str()))
        .map(String::as_str)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

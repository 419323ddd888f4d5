//! Keyword exclusion filter applied before dedup and ranking.

use crate::model::PaperRecord;
use tracing::{debug, info};

/// Drops records whose title or abstract mentions an excluded term.
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    exclude: Vec<String>,
}

impl RelevanceFilter {
    pub fn new(exclude_keywords: &[String]) -> Self {
        Self {
            exclude: exclude_keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// True unless an excluded term is a substring of the lower-cased title or abstract.
    pub fn is_relevant(&self, record: &PaperRecord) -> bool {
        let title = record.title.to_lowercase();
        let abstract_text = record.abstract_text.to_lowercase();

        match self
            .exclude
            .iter()
            .find(|bad| title.contains(bad.as_str()) || abstract_text.contains(bad.as_str()))
        {
            Some(term) => {
                debug!(term = %term, title = %record.title, "Excluded record");
                false
            }
            None => true,
        }
    }

    /// Keep only relevant records, preserving order.
    pub fn retain(&self, records: Vec<PaperRecord>) -> Vec<PaperRecord> {
        let before = records.len();
        let kept: Vec<PaperRecord> = records.into_iter().filter(|r| self.is_relevant(r)).collect();
        info!(
            total = before,
            kept = kept.len(),
            excluded = before - kept.len(),
            "Relevance filter applied"
        );
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use chrono::Utc;

    fn record(title: &str, abstract_text: &str) -> PaperRecord {
        PaperRecord::new(title, abstract_text, vec![], Utc::now(), Utc::now())
    }

    fn default_filter() -> RelevanceFilter {
        RelevanceFilter::new(&SearchConfig::default().exclude_keywords)
    }

    #[test]
    fn test_excludes_title_and_abstract_matches() {
        let filter = default_filter();
        assert!(!filter.is_relevant(&record("Point Cloud Completion", "")));
        assert!(!filter.is_relevant(&record("A model", "We study 3D scene graphs.")));
        assert!(!filter.is_relevant(&record("RGB-D Fusion", "depth")));
        assert!(filter.is_relevant(&record("Scaling Laws for LLMs", "We fit power laws.")));
    }

    #[test]
    fn test_empty_fields_are_relevant() {
        assert!(default_filter().is_relevant(&record("", "")));
    }

    #[test]
    fn test_empty_exclusion_list_keeps_everything() {
        let filter = RelevanceFilter::new(&["  ".to_string()]);
        assert!(filter.is_relevant(&record("3D geometry", "scene")));
    }

    #[test]
    fn test_retain_preserves_order() {
        let records = vec![
            record("First", "language"),
            record("Scene Understanding", ""),
            record("Third", "text"),
        ];
        let kept = default_filter().retain(records);
        let titles: Vec<&str> = kept.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Third"]);
    }
}

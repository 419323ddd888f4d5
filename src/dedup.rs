//! Title-based deduplication.

use crate::model::PaperRecord;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Collapse records with equal normalized titles, keeping the first occurrence.
///
/// Records whose title is empty after trimming cannot be keyed and are dropped.
pub fn dedupe(records: Vec<PaperRecord>) -> Vec<PaperRecord> {
    let mut seen: HashSet<String> = HashSet::with_capacity(records.len());
    let mut unique = Vec::with_capacity(records.len());

    for record in records {
        let key = record.dedup_key();
        if key.is_empty() {
            warn!(
                external_id = record.external_id.as_deref().unwrap_or(""),
                "Dropping record without a title"
            );
            continue;
        }
        if seen.insert(key) {
            unique.push(record);
        } else {
            debug!(title = %record.title, "Duplicate title dropped");
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(title: &str) -> PaperRecord {
        PaperRecord::new(title, "", vec![], Utc::now(), Utc::now())
    }

    fn titles(records: &[PaperRecord]) -> Vec<&str> {
        records.iter().map(|r| r.title.as_str()).collect()
    }

    #[test]
    fn test_first_seen_wins_across_case_and_whitespace() {
        let mut a = record(" Scaling Laws ");
        a.abstract_text = "first".to_string();
        let mut b = record("scaling laws");
        b.abstract_text = "second".to_string();

        let out = dedupe(vec![a, b]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, " Scaling Laws ");
        assert_eq!(out[0].abstract_text, "first");
    }

    #[test]
    fn test_preserves_order() {
        let out = dedupe(vec![record("B"), record("A"), record("b"), record("C"), record("a")]);
        assert_eq!(titles(&out), vec!["B", "A", "C"]);
    }

    #[test]
    fn test_idempotent() {
        let input = vec![record("X"), record(" x"), record("Y"), record("Z "), record("y")];
        let once = dedupe(input);
        let twice = dedupe(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_identity_on_unique_titles() {
        let input = vec![record("One"), record("Two"), record("Three")];
        assert_eq!(dedupe(input.clone()), input);
    }

    #[test]
    fn test_drops_blank_titles() {
        let out = dedupe(vec![record("   "), record("Kept"), record("")]);
        assert_eq!(titles(&out), vec!["Kept"]);
    }
}

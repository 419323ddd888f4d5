//! Fetch -> Filter -> Dedup -> Rank -> top-N.

use crate::arxiv::ArxivClient;
use crate::config::AppConfig;
use crate::dedup::dedupe;
use crate::error::Result;
use crate::filter::RelevanceFilter;
use crate::model::PaperRecord;
use crate::ranking::{apply_limit, Ranker, ScoredPaper};
use crate::revisions::{NoRevisions, RevisionLookup, RevisionResolver};
use crate::semanticscholar;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

/// Optional network stages
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Look up arXiv revision counts (otherwise every paper counts as one version)
    pub resolve_revisions: bool,
    /// Attach Semantic Scholar citation counts to the selected papers
    pub fetch_citations: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            resolve_revisions: true,
            fetch_citations: false,
        }
    }
}

/// Counts per stage plus the selected papers
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub fetched: usize,
    pub relevant: usize,
    pub unique: usize,
    pub citations_matched: usize,
    pub selected: Vec<ScoredPaper>,
}

pub struct Pipeline {
    config: AppConfig,
    filter: RelevanceFilter,
    ranker: Ranker,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            filter: RelevanceFilter::new(&config.search.exclude_keywords),
            ranker: Ranker::new(config.ranking.clone()),
            config,
        })
    }

    /// Relevance filter followed by dedup.
    pub fn prepare(&self, records: Vec<PaperRecord>) -> Vec<PaperRecord> {
        dedupe(self.filter.retain(records))
    }

    /// Rank prepared records and apply the outer `top_n` limit.
    pub fn select<L: RevisionLookup + ?Sized>(
        &self,
        prepared: Vec<PaperRecord>,
        revisions: &L,
    ) -> Vec<ScoredPaper> {
        let mut ranked = self.ranker.rank(prepared, revisions);
        apply_limit(&mut ranked, self.config.ranking.limits.top_n);
        ranked
    }

    /// Run the whole pipeline against the live arXiv API.
    pub async fn run(&self, options: PipelineOptions, now: DateTime<Utc>) -> Result<PipelineReport> {
        let client = ArxivClient::new(Duration::from_secs(self.config.lookup.timeout_secs))?;

        info!("Stage 1: arXiv fetch");
        let fetched = client.fetch_recent(&self.config.search, now).await?;
        let fetched_count = fetched.len();

        info!("Stage 2: filter and dedup");
        let filtered = self.filter.retain(fetched);
        let relevant = filtered.len();
        let prepared = dedupe(filtered);
        let unique = prepared.len();

        info!("Stage 3: rank");
        let mut selected = if options.resolve_revisions {
            let resolver = RevisionResolver::from_config(client, &self.config.lookup);
            let table = resolver.resolve(&prepared).await;
            self.select(prepared, &table)
        } else {
            self.select(prepared, &NoRevisions)
        };

        let mut citations_matched = 0;
        if options.fetch_citations {
            info!("Stage 4: citation enrichment");
            citations_matched = self.enrich_citations(&mut selected).await;
        }

        info!(
            fetched = fetched_count,
            relevant = relevant,
            unique = unique,
            selected = selected.len(),
            "Pipeline complete"
        );

        Ok(PipelineReport {
            fetched: fetched_count,
            relevant,
            unique,
            citations_matched,
            selected,
        })
    }

    async fn enrich_citations(&self, selected: &mut [ScoredPaper]) -> usize {
        let ids: Vec<String> = selected
            .iter()
            .filter_map(|p| p.record.external_id.clone())
            .collect();

        match semanticscholar::batch_lookup(&ids, self.config.lookup.semantic_scholar_key.as_deref()).await {
            Ok(results) => {
                let mut records: Vec<PaperRecord> =
                    selected.iter().map(|p| p.record.clone()).collect();
                let matched = semanticscholar::apply_citations(&mut records, &results);
                for (paper, record) in selected.iter_mut().zip(records) {
                    paper.record = record;
                }
                matched
            }
            Err(e) => {
                warn!(error = %e, "Citation enrichment failed");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revisions::RevisionTable;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 20, 0, 0, 0).unwrap()
    }

    fn record(title: &str, abstract_text: &str, days: i64) -> PaperRecord {
        PaperRecord::new(title, abstract_text, vec![], now() - ChronoDuration::days(days), now())
    }

    #[test]
    fn test_prepare_filters_then_dedupes() {
        let pipeline = Pipeline::new(AppConfig::default()).unwrap();
        let prepared = pipeline.prepare(vec![
            record("Scene Graphs", "", 1),
            record("LLM Agents", "", 1),
            record(" llm agents ", "", 1),
            record("", "", 1),
        ]);
        assert_eq!(prepared.len(), 1);
        assert_eq!(prepared[0].title, "LLM Agents");
    }

    #[test]
    fn test_select_applies_outer_limit() {
        let mut config = AppConfig::default();
        config.ranking.limits.top_k = Some(4);
        config.ranking.limits.top_n = Some(2);
        let pipeline = Pipeline::new(config).unwrap();

        let records: Vec<PaperRecord> = (0..6)
            .map(|i| record(&format!("Paper {i}"), "benchmark", i + 1))
            .collect();
        let selected = pipeline.select(records, &NoRevisions);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].record.title, "Paper 0");
    }

    #[test]
    fn test_select_uses_revision_table() {
        let pipeline = Pipeline::new(AppConfig::default()).unwrap();
        let mut revised = record("Revised", "", 30);
        revised.external_id = Some("2503.00001".to_string());
        let plain = record("Plain", "", 30);

        let mut table = RevisionTable::default();
        table.insert("2503.00001", 4);

        let selected = pipeline.select(vec![plain, revised], &table);
        assert_eq!(selected[0].record.title, "Revised");
        assert_eq!(selected[0].revision_count, 4);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = AppConfig::default();
        config.search.topics.clear();
        assert!(Pipeline::new(config).is_err());
    }
}

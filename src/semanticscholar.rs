//! Semantic Scholar API Client
//!
//! Batch lookup of arXiv papers to attach citation counts (informational, never scored).
//!
//! API Details:
//! - Batch endpoint: POST /graph/v1/paper/batch
//! - Max 500 papers per request
//! - Rate limit: 1 req/s (unauthenticated), higher with API key

use crate::error::{PaperRankError, Result};
use crate::model::PaperRecord;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Semantic Scholar API base URL
const SS_API_BASE: &str = "https://api.semanticscholar.org/graph/v1";

/// Maximum papers per batch request
const MAX_BATCH_SIZE: usize = 500;

/// Citation data for one arXiv paper
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CitationResult {
    pub arxiv_id: String,
    pub citation_count: u64,
    pub influential_citation_count: u64,
    pub paper_id: String,
}

#[derive(Debug, Deserialize)]
struct SSPaper {
    #[serde(rename = "paperId")]
    paper_id: Option<String>,
    #[serde(rename = "citationCount")]
    citation_count: Option<u64>,
    #[serde(rename = "influentialCitationCount")]
    influential_citation_count: Option<u64>,
    #[serde(rename = "externalIds")]
    external_ids: Option<SSExternalIds>,
}

#[derive(Debug, Deserialize)]
struct SSExternalIds {
    #[serde(rename = "ArXiv")]
    arxiv: Option<String>,
}

/// Batch lookup papers by arXiv id using Semantic Scholar API.
///
/// # Arguments
///
/// * `arxiv_ids` - arXiv ids without version suffix or "ARXIV:" prefix
/// * `api_key` - Optional API key for higher rate limits
///
/// # Returns
///
/// Results for the papers Semantic Scholar knows about. Failed batches are skipped.
pub async fn batch_lookup(arxiv_ids: &[String], api_key: Option<&str>) -> Result<Vec<CitationResult>> {
    let valid_ids: Vec<&String> = arxiv_ids.iter().filter(|d| !d.is_empty()).collect();

    if valid_ids.is_empty() {
        return Ok(Vec::new());
    }

    let client = Client::builder()
        .timeout(Duration::from_secs(60))
        .build()?;

    info!(total = valid_ids.len(), "Starting Semantic Scholar batch lookup");

    let (batch_count, chunk_size) = batch_plan(valid_ids.len());

    info!(
        batches = batch_count,
        chunk_size = chunk_size,
        "Chunking ids for batch requests"
    );

    let mut all_results = Vec::new();

    for (batch_idx, chunk) in valid_ids.chunks(chunk_size).enumerate() {
        match fetch_batch(&client, chunk, api_key).await {
            Ok(papers) => {
                info!(
                    batch = batch_idx + 1,
                    found = papers.len(),
                    "Batch completed"
                );
                all_results.extend(papers);
            }
            Err(e) => {
                warn!(batch = batch_idx + 1, error = %e, "Batch failed");
            }
        }

        // 1 second between requests (unauthenticated limit)
        if batch_idx < batch_count - 1 {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    info!(
        total_found = all_results.len(),
        "Semantic Scholar lookup complete"
    );

    Ok(all_results)
}

/// Attach citation counts to records by arXiv id. Returns how many records matched.
pub fn apply_citations(records: &mut [PaperRecord], results: &[CitationResult]) -> usize {
    let by_id: HashMap<&str, &CitationResult> = results
        .iter()
        .filter(|r| !r.arxiv_id.is_empty())
        .map(|r| (r.arxiv_id.as_str(), r))
        .collect();

    let mut matched = 0;
    for record in records.iter_mut() {
        let hit = record
            .external_id
            .as_deref()
            .and_then(|id| by_id.get(id).copied());
        if let Some(result) = hit {
            record.set_citations(result.citation_count, result.influential_citation_count);
            matched += 1;
        }
    }
    matched
}

/// Number of batches and even chunk size for `total` ids
fn batch_plan(total: usize) -> (usize, usize) {
    let batch_count = total.div_ceil(MAX_BATCH_SIZE).max(1);
    let chunk_size = total.div_ceil(batch_count).max(1);
    (batch_count, chunk_size)
}

/// Fetch a single batch of papers
async fn fetch_batch(
    client: &Client,
    arxiv_ids: &[&String],
    api_key: Option<&str>,
) -> Result<Vec<CitationResult>> {
    let url = format!(
        "{}/paper/batch?fields=citationCount,influentialCitationCount,externalIds",
        SS_API_BASE
    );

    let ids: Vec<String> = arxiv_ids.iter().map(|d| format!("ARXIV:{}", d)).collect();
    let body = serde_json::json!({ "ids": ids });

    debug!(url = %url, count = ids.len(), "Sending batch request");

    let mut request = client.post(&url).json(&body);

    if let Some(key) = api_key {
        request = request.header("x-api-key", key);
    }

    let response = request.send().await?;
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(PaperRankError::RateLimited(1));
    }

    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), error = %error_text, "API error");
        return Err(PaperRankError::Api {
            code: status.as_u16(),
            message: format!("Semantic Scholar API error: {} - {}", status, error_text),
        });
    }

    let text = response.text().await?;
    parse_batch_response(&text, arxiv_ids)
}

/// The batch endpoint answers positionally, with `null` for unknown ids.
fn parse_batch_response(text: &str, requested: &[&String]) -> Result<Vec<CitationResult>> {
    let papers: Vec<Option<SSPaper>> = serde_json::from_str(text).map_err(|e| {
        PaperRankError::Parse(format!("Failed to parse Semantic Scholar response: {}", e))
    })?;

    let results = papers
        .into_iter()
        .zip(requested.iter())
        .filter_map(|(paper, requested_id)| paper.map(|p| (p, requested_id)))
        .map(|(paper, requested_id)| {
            let arxiv_id = paper
                .external_ids
                .and_then(|ids| ids.arxiv)
                .unwrap_or_else(|| requested_id.to_string());

            CitationResult {
                arxiv_id,
                citation_count: paper.citation_count.unwrap_or(0),
                influential_citation_count: paper.influential_citation_count.unwrap_or(0),
                paper_id: paper.paper_id.unwrap_or_default(),
            }
        })
        .collect();

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};

    #[test]
    fn test_batch_chunking() {
        assert_eq!(batch_plan(1200), (3, 400)); // ceil(1200/500) = 3, ceil(1200/3) = 400
        assert_eq!(batch_plan(500), (1, 500));
        assert_eq!(batch_plan(7), (1, 7));
    }

    #[test]
    fn test_parse_batch_response_skips_nulls() {
        let a = "2401.00001".to_string();
        let b = "2401.00002".to_string();
        let c = "2401.00003".to_string();
        let requested = vec![&a, &b, &c];
        let text = r#"[
            {"paperId": "abc", "citationCount": 42, "influentialCitationCount": 3,
             "externalIds": {"ArXiv": "2401.00001", "DOI": "10.1/x"}},
            null,
            {"paperId": "def", "citationCount": null, "externalIds": null}
        ]"#;

        let results = parse_batch_response(text, &requested).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].arxiv_id, "2401.00001");
        assert_eq!(results[0].citation_count, 42);
        assert_eq!(results[0].influential_citation_count, 3);
        // Falls back to the requested id when externalIds is missing
        assert_eq!(results[1].arxiv_id, "2401.00003");
        assert_eq!(results[1].citation_count, 0);
    }

    #[test]
    fn test_parse_batch_response_rejects_garbage() {
        assert!(parse_batch_response("{\"error\": 1}", &[]).is_err());
    }

    #[test]
    fn test_apply_citations() {
        let now = Utc::now();
        let mut with_id = PaperRecord::new("A", "", vec![], now - ChronoDuration::days(5), now);
        with_id.external_id = Some("2401.00001".to_string());
        let without_id = PaperRecord::new("B", "", vec![], now, now);
        let mut records = vec![with_id, without_id];

        let results = vec![CitationResult {
            arxiv_id: "2401.00001".to_string(),
            citation_count: 20,
            influential_citation_count: 1,
            paper_id: "abc".to_string(),
        }];

        assert_eq!(apply_citations(&mut records, &results), 1);
        let stats = records[0].citations.unwrap();
        assert_eq!(stats.citation_count, 20);
        assert!((stats.trend_score - 4.0).abs() < 1e-9);
        assert!(records[1].citations.is_none());
    }
}

//! HTTP ranking service.
//!
//! `POST /rank` runs filter, dedup and ranking over posted records. The service never
//! calls external APIs; revision counts may be supplied in the request.

use crate::config::AppConfig;
use crate::error::Result;
use crate::model::records_from_values;
use crate::pipeline::Pipeline;
use crate::ranking::ScoredPaper;
use crate::revisions::RevisionTable;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared service state
pub struct AppState {
    config: AppConfig,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }
}

/// Rank request body
#[derive(Debug, Deserialize)]
pub struct RankRequest {
    /// Decoded one by one so a malformed entry does not reject the batch
    pub records: Vec<serde_json::Value>,
    /// External id -> revision count
    #[serde(default)]
    pub revisions: HashMap<String, u32>,
    pub top_k: Option<usize>,
    pub top_n: Option<usize>,
}

/// Rank response
#[derive(Debug, Serialize)]
pub struct RankResponse {
    pub status: String,
    pub count: usize,
    pub results: Vec<ScoredPaper>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/rank", post(rank_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process exits
pub async fn run(addr: SocketAddr, config: AppConfig) -> Result<()> {
    config.validate()?;
    let app = router(Arc::new(AppState::new(config)));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

/// Rank endpoint handler
async fn rank_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RankRequest>,
) -> Json<RankResponse> {
    info!(records = req.records.len(), top_k = ?req.top_k, top_n = ?req.top_n, "Rank request");

    let mut config = state.config.clone();
    if req.top_k.is_some() {
        config.ranking.limits.top_k = req.top_k;
    }
    if req.top_n.is_some() {
        config.ranking.limits.top_n = req.top_n;
    }

    let pipeline = match Pipeline::new(config) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "Invalid ranking configuration");
            return Json(RankResponse {
                status: format!("error: {}", e),
                count: 0,
                results: vec![],
            });
        }
    };

    let now = Utc::now();
    let mut records = records_from_values(req.records);
    for record in &mut records {
        record.normalize_age(now);
    }

    let revisions = RevisionTable::from(req.revisions);
    let results = pipeline.select(pipeline.prepare(records), &revisions);

    Json(RankResponse {
        status: "success".to_string(),
        count: results.len(),
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Heuristic;
    use crate::ranking::Disposition;

    fn request(json: serde_json::Value) -> RankRequest {
        serde_json::from_value(json).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        assert_eq!(health_handler().await, "OK");
    }

    #[tokio::test]
    async fn test_rank_handler() {
        let state = Arc::new(AppState::new(AppConfig::default()));
        let published = (Utc::now() - chrono::Duration::days(30)).to_rfc3339();
        let req = request(serde_json::json!({
            "records": [
                {"title": "Plain Paper", "published": published},
                {"title": "Revised Paper", "published": published, "external_id": "2503.00001",
                 "abstract": "a benchmark with open source code"},
                {"title": "revised paper", "published": published},
                {"title": "Scene Paper", "published": published},
                {"title": "Protein Paper", "abstract": "protein design", "published": published}
            ],
            "revisions": {"2503.00001": 3},
            "top_n": 5
        }));

        let Json(resp) = rank_handler(State(state), Json(req)).await;
        assert_eq!(resp.status, "success");
        assert_eq!(resp.count, 2);
        assert_eq!(resp.results[0].record.title, "Revised Paper");
        assert_eq!(resp.results[0].score, 3.0);
        assert!(resp.results[0].breakdown.contains_key(&Heuristic::Versions));
        assert_eq!(resp.results[0].record.days_since_publication, 30);
        assert!(resp
            .results
            .iter()
            .all(|r| r.disposition == Disposition::Ranked));
    }

    #[tokio::test]
    async fn test_rank_handler_skips_malformed_records() {
        let state = Arc::new(AppState::new(AppConfig::default()));
        let published = Utc::now().to_rfc3339();
        let req = request(serde_json::json!({
            "records": [
                {"title": "Good Paper", "published": published},
                {"abstract": "no title here", "published": published},
                {"title": "Undated Paper"}
            ]
        }));

        let Json(resp) = rank_handler(State(state), Json(req)).await;
        assert_eq!(resp.status, "success");
        assert_eq!(resp.count, 1);
        assert_eq!(resp.results[0].record.title, "Good Paper");
    }

    #[tokio::test]
    async fn test_rank_handler_top_n_override() {
        let state = Arc::new(AppState::new(AppConfig::default()));
        let published = Utc::now().to_rfc3339();
        let records: Vec<serde_json::Value> = (0..4)
            .map(|i| serde_json::json!({"title": format!("P{i}"), "published": published}))
            .collect();
        let req = request(serde_json::json!({"records": records, "top_n": 1}));

        let Json(resp) = rank_handler(State(state), Json(req)).await;
        assert_eq!(resp.count, 1);
        assert_eq!(resp.results[0].record.title, "P0");
    }
}

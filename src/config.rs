//! Runtime configuration: search topics, heuristic weights, keyword tables and lookup limits.
//!
//! Every section has a `Default` matching the stock pipeline, so a JSON config file only
//! needs the keys it overrides.

use crate::error::{PaperRankError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Accepted range for the submission window
pub const MIN_WINDOW_DAYS: i64 = 1;
pub const MAX_WINDOW_DAYS: i64 = 3650;

/// One named scoring rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Heuristic {
    Versions,
    HighImpactAuthors,
    BenchmarkMention,
    OpenSourceMention,
    TrendingKeywords,
    TopicOverlap,
    Recency,
}

impl Heuristic {
    /// All heuristics in evaluation order
    pub const ALL: [Heuristic; 7] = [
        Heuristic::Versions,
        Heuristic::HighImpactAuthors,
        Heuristic::BenchmarkMention,
        Heuristic::OpenSourceMention,
        Heuristic::TrendingKeywords,
        Heuristic::TopicOverlap,
        Heuristic::Recency,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Heuristic::Versions => "versions",
            Heuristic::HighImpactAuthors => "high_impact_authors",
            Heuristic::BenchmarkMention => "benchmark_mention",
            Heuristic::OpenSourceMention => "open_source_mention",
            Heuristic::TrendingKeywords => "trending_keywords",
            Heuristic::TopicOverlap => "topic_overlap",
            Heuristic::Recency => "recency",
        }
    }

    fn default_weight(self) -> f64 {
        match self {
            Heuristic::Versions => 1.0,
            Heuristic::HighImpactAuthors => 2.0,
            Heuristic::BenchmarkMention => 1.0,
            Heuristic::OpenSourceMention => 1.0,
            Heuristic::TrendingKeywords => 2.0,
            Heuristic::TopicOverlap => 1.5,
            Heuristic::Recency => 1.0,
        }
    }
}

impl std::fmt::Display for Heuristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub search: SearchConfig,
    pub ranking: RankingConfig,
    pub lookup: LookupConfig,
}

impl AppConfig {
    /// Load a JSON config file. Missing keys keep their defaults.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would break the pipeline's guarantees.
    pub fn validate(&self) -> Result<()> {
        if self.search.topics.is_empty() {
            return Err(PaperRankError::Config(
                "search.topics must not be empty".to_string(),
            ));
        }
        if !(MIN_WINDOW_DAYS..=MAX_WINDOW_DAYS).contains(&self.search.window_days) {
            return Err(PaperRankError::Config(format!(
                "search.window_days must be within {}..={}, got {}",
                MIN_WINDOW_DAYS, MAX_WINDOW_DAYS, self.search.window_days
            )));
        }
        if self.lookup.concurrency == 0 {
            return Err(PaperRankError::Config(
                "lookup.concurrency must be at least 1".to_string(),
            ));
        }
        if self.lookup.timeout_secs == 0 {
            return Err(PaperRankError::Config(
                "lookup.timeout_secs must be at least 1".to_string(),
            ));
        }
        self.ranking.validate()
    }
}

/// arXiv search parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Query topics, searched one at a time
    pub topics: Vec<String>,
    /// arXiv categories used by the fallback query
    pub categories: Vec<String>,
    /// Submission window in days
    pub window_days: i64,
    pub max_results_per_topic: usize,
    pub fallback_max_results: usize,
    /// Terms that exclude a record from title or abstract
    pub exclude_keywords: Vec<String>,
    /// Pause between topic queries
    pub topic_delay_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            topics: strings(&[
                "large language model",
                "transformer",
                "rlhf",
                "multimodal LLM",
                "LLM reasoning",
                "LLM alignment",
                "retrieval augmented generation",
            ]),
            categories: strings(&["cs.CL", "cs.LG", "cs.AI", "stat.ML"]),
            window_days: 14,
            max_results_per_topic: 20,
            fallback_max_results: 10,
            exclude_keywords: strings(&[
                "3d",
                "point cloud",
                "rgb-d",
                "reconstruction",
                "scene",
                "geometry",
            ]),
            topic_delay_ms: 2000,
        }
    }
}

/// Scoring weights, keyword tables and truncation limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub weights: BTreeMap<Heuristic, f64>,
    pub keywords: KeywordLists,
    pub limits: RankingLimits,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            weights: Heuristic::ALL
                .iter()
                .map(|h| (*h, h.default_weight()))
                .collect(),
            keywords: KeywordLists::default(),
            limits: RankingLimits::default(),
        }
    }
}

impl RankingConfig {
    /// Weight for a heuristic; absent entries contribute nothing.
    pub fn weight(&self, heuristic: Heuristic) -> f64 {
        self.weights.get(&heuristic).copied().unwrap_or(0.0)
    }

    pub fn validate(&self) -> Result<()> {
        for (heuristic, weight) in &self.weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(PaperRankError::Config(format!(
                    "weight for {} must be a non-negative number, got {}",
                    heuristic, weight
                )));
            }
        }
        Ok(())
    }
}

/// Keyword tables consulted by the heuristics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordLists {
    /// Abstract terms that zero a record's score
    pub blacklist: Vec<String>,
    /// Organization names matched against the author list
    pub high_impact_orgs: Vec<String>,
    pub trending: Vec<String>,
    pub core_topics: Vec<String>,
}

impl Default for KeywordLists {
    fn default() -> Self {
        Self {
            blacklist: strings(&[
                "medical imaging",
                "protein",
                "molecular",
                "remote sensing",
                "autonomous driving",
                "traffic",
                "stock market",
                "agriculture",
                "seismic",
                "quantum circuit",
            ]),
            high_impact_orgs: strings(&[
                "openai",
                "deepmind",
                "google",
                "meta ai",
                "facebook ai",
                "anthropic",
                "microsoft research",
                "nvidia",
                "stanford",
                "berkeley",
                "carnegie mellon",
                "allen institute",
                "hugging face",
                "tsinghua",
            ]),
            trending: strings(&[
                "large language model",
                "llm",
                "foundation model",
                "transformer",
                "attention mechanism",
                "mixture of experts",
                "rlhf",
                "reinforcement learning from human feedback",
                "direct preference optimization",
                "preference optimization",
                "alignment",
                "instruction tuning",
                "chain-of-thought",
                "chain of thought",
                "in-context learning",
                "retrieval-augmented",
                "retrieval augmented",
                "agentic",
                "tool use",
                "multimodal",
                "vision-language",
                "diffusion model",
                "reasoning model",
                "test-time compute",
                "scaling law",
                "distillation",
                "quantization",
                "long context",
                "speculative decoding",
                "state space model",
                "mamba",
                "hallucination",
                "red teaming",
                "jailbreak",
                "interpretability",
                "synthetic data",
                "reward model",
            ]),
            core_topics: strings(&[
                "language model",
                "alignment",
                "reasoning",
                "retrieval",
                "multimodal",
                "instruction",
                "preference",
                "interpretability",
            ]),
        }
    }
}

/// The two truncation points: `top_k` right after sorting, `top_n` applied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingLimits {
    pub top_k: Option<usize>,
    pub top_n: Option<usize>,
}

impl Default for RankingLimits {
    fn default() -> Self {
        Self {
            top_k: Some(15),
            top_n: Some(10),
        }
    }
}

/// External lookup behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Lookups in flight at once
    pub concurrency: usize,
    /// Minimum spacing between request starts
    pub min_interval_ms: u64,
    /// Per-call timeout
    pub timeout_secs: u64,
    pub semantic_scholar_key: Option<String>,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            min_interval_ms: 1000,
            timeout_secs: 10,
            semantic_scholar_key: None,
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

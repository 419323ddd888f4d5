//! arXiv API client
//!
//! Fetches recent papers per topic from the arXiv Atom query API and resolves the latest
//! version number of a paper for the revision signal.
//!
//! API Details:
//! - Query endpoint: GET /api/query (Atom 1.0 response)
//! - `search_query` uses field prefixes (`all:`, `ti:`, `cat:`) joined by `+AND+` / `+OR+`
//! - `id_list` returns the latest version of each listed paper
//! - arXiv asks clients to keep to about one request every three seconds

use crate::config::SearchConfig;
use crate::error::{OptionExt, PaperRankError, Result};
use crate::model::{days_since, PaperRecord};
use crate::revisions::RevisionSource;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use feed_rs::model::Entry;
use regex::Regex;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// arXiv query API endpoint
pub const ARXIV_API_URL: &str = "https://export.arxiv.org/api/query";

/// Topic recorded for papers found by the fallback query
pub const FALLBACK_TOPIC: &str = "General";

/// Base delay for retry backoff
const RETRY_BASE_SECS: u64 = 3;

/// User agent sent with every request
const USER_AGENT: &str = "rustpaperrank/0.1 (arXiv digest)";

/// A parsed arXiv identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArxivId {
    /// Identifier without version suffix, e.g. `2401.01234` or `hep-th/9901001`
    pub id: String,
    pub version: Option<u32>,
}

/// arXiv API client with retries on rate limiting
#[derive(Debug, Clone)]
pub struct ArxivClient {
    client: Client,
    base_url: String,
    max_retries: u32,
}

impl ArxivClient {
    /// Create a client with the given per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| PaperRankError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: ARXIV_API_URL.to_string(),
            max_retries: 3,
        })
    }

    /// Point the client at another endpoint (mirrors, local fixtures)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fetch recent papers for every configured topic.
    ///
    /// Topics that fail are logged and skipped. If the windowed search produces nothing
    /// at all, a single combined title/category query for the newest papers is used
    /// instead; only that query's failure is returned as an error.
    pub async fn fetch_recent(
        &self,
        search: &SearchConfig,
        now: DateTime<Utc>,
    ) -> Result<Vec<PaperRecord>> {
        let start = now - ChronoDuration::days(search.window_days);
        let mut all_records = Vec::new();
        let mut failures = 0usize;

        info!(
            topics = search.topics.len(),
            from = %start.format("%Y-%m-%d"),
            to = %now.format("%Y-%m-%d"),
            "Fetching recent arXiv papers"
        );

        for (idx, topic) in search.topics.iter().enumerate() {
            match self
                .search_window(topic, start, now, search.max_results_per_topic)
                .await
            {
                Ok(records) => {
                    info!(topic = %topic, count = records.len(), "Topic fetched");
                    all_records.extend(records);
                }
                Err(e) => {
                    warn!(topic = %topic, error = %e, "Topic search failed");
                    failures += 1;
                }
            }

            if idx + 1 < search.topics.len() && search.topic_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(search.topic_delay_ms)).await;
            }
        }

        if !all_records.is_empty() {
            info!(total = all_records.len(), failed_topics = failures, "arXiv fetch complete");
            return Ok(all_records);
        }

        warn!(
            failed_topics = failures,
            "Windowed search found nothing, falling back to newest papers"
        );
        self.search_fallback(search, now).await
    }

    /// Search one topic inside a submission window
    pub async fn search_window(
        &self,
        topic: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_results: usize,
    ) -> Result<Vec<PaperRecord>> {
        let url = build_window_url(&self.base_url, topic, start, end, max_results)?;
        debug!(url = %url, "Window query");
        let body = self.fetch_feed(&url).await?;
        parse_feed(&body, topic, end)
    }

    /// Newest papers matching any topic title within the configured categories
    pub async fn search_fallback(
        &self,
        search: &SearchConfig,
        now: DateTime<Utc>,
    ) -> Result<Vec<PaperRecord>> {
        let url = build_fallback_url(
            &self.base_url,
            &search.topics,
            &search.categories,
            search.fallback_max_results,
        )?;
        debug!(url = %url, "Fallback query");
        let body = self.fetch_feed(&url).await?;
        parse_feed(&body, FALLBACK_TOPIC, now)
    }

    /// GET with exponential backoff on 429 and 5xx
    async fn fetch_feed(&self, url: &Url) -> Result<Vec<u8>> {
        let mut retries = 0;

        loop {
            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(PaperRankError::RateLimited(_)) | Err(PaperRankError::Api { code: 500..=599, .. })
                    if retries < self.max_retries =>
                {
                    let backoff = Duration::from_secs(RETRY_BASE_SECS * 2u64.pow(retries));
                    warn!(
                        retries = retries,
                        backoff_secs = backoff.as_secs(),
                        "arXiv busy, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    retries += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &Url) -> Result<Vec<u8>> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(PaperRankError::RateLimited(RETRY_BASE_SECS));
        }

        if !status.is_success() {
            return Err(PaperRankError::Api {
                code: status.as_u16(),
                message: format!("arXiv API error: {}", status),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

impl RevisionSource for ArxivClient {
    /// Latest version number reported by an `id_list` query.
    async fn revision_count(&self, external_id: &str) -> Result<u32> {
        let url = build_id_list_url(&self.base_url, external_id)?;
        let body = self.fetch_once(&url).await?;
        latest_version(&body)
    }
}

/// `all:<topic> AND submittedDate:[start TO end]`, newest first
pub fn build_window_url(
    base_url: &str,
    topic: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    max_results: usize,
) -> Result<Url> {
    let query = format!(
        "all:{}+AND+submittedDate:[{}+TO+{}]",
        plus_join(topic),
        start.format("%Y%m%d"),
        end.format("%Y%m%d")
    );
    build_url(base_url, &query, max_results)
}

/// `(ti:a OR ti:b ...) AND (cat:x OR cat:y ...)`, newest first
pub fn build_fallback_url(
    base_url: &str,
    topics: &[String],
    categories: &[String],
    max_results: usize,
) -> Result<Url> {
    let topic_part = topics
        .iter()
        .map(|t| format!("ti:{}", plus_join(t)))
        .collect::<Vec<_>>()
        .join("+OR+");
    let query = if categories.is_empty() {
        format!("({})", topic_part)
    } else {
        let category_part = categories
            .iter()
            .map(|c| format!("cat:{}", urlencoding::encode(c)))
            .collect::<Vec<_>>()
            .join("+OR+");
        format!("({})+AND+({})", topic_part, category_part)
    };
    build_url(base_url, &query, max_results)
}

/// Lookup of a single paper by id
pub fn build_id_list_url(base_url: &str, external_id: &str) -> Result<Url> {
    let id = external_id.trim();
    if id.is_empty() {
        return Err(PaperRankError::Validation("empty arXiv id".to_string()));
    }
    let raw = format!("{}?id_list={}&max_results=1", base_url, urlencoding::encode(id));
    Url::parse(&raw).map_err(|e| PaperRankError::Parse(format!("Invalid arXiv URL: {}", e)))
}

fn build_url(base_url: &str, query: &str, max_results: usize) -> Result<Url> {
    let raw = format!(
        "{}?search_query={}&sortBy=submittedDate&sortOrder=descending&max_results={}",
        base_url, query, max_results
    );
    Url::parse(&raw).map_err(|e| PaperRankError::Parse(format!("Invalid arXiv URL: {}", e)))
}

/// Words URL-encoded and joined by `+`, the way arXiv expects spaces.
fn plus_join(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(|w| urlencoding::encode(w).into_owned())
        .collect::<Vec<_>>()
        .join("+")
}

/// Parse an Atom response into records tagged with `topic`.
///
/// Entries without a title or date are skipped.
pub fn parse_feed(body: &[u8], topic: &str, now: DateTime<Utc>) -> Result<Vec<PaperRecord>> {
    let feed = feed_rs::parser::parse(body)?;
    let total = feed.entries.len();

    let records: Vec<PaperRecord> = feed
        .entries
        .into_iter()
        .filter_map(|entry| entry_to_record(entry, topic, now))
        .collect();

    if records.len() < total {
        warn!(
            skipped = total - records.len(),
            topic = topic,
            "Skipped malformed feed entries"
        );
    }

    Ok(records)
}

fn entry_to_record(entry: Entry, topic: &str, now: DateTime<Utc>) -> Option<PaperRecord> {
    let title = entry.title.map(|t| clean_text(&t.content)).unwrap_or_default();
    if title.is_empty() {
        debug!(id = %entry.id, "Entry without title");
        return None;
    }

    let Some(published) = entry.published.or(entry.updated) else {
        debug!(id = %entry.id, "Entry without date");
        return None;
    };

    let abstract_text = entry
        .summary
        .map(|s| clean_text(&s.content))
        .unwrap_or_default();

    let authors: Vec<String> = entry
        .authors
        .iter()
        .map(|a| clean_text(&a.name))
        .filter(|a| !a.is_empty())
        .collect();

    let arxiv_id = parse_arxiv_id(&entry.id);

    let link = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref() == Some("alternate"))
        .or_else(|| entry.links.first())
        .map(|l| l.href.clone());

    let pdf_url = entry
        .links
        .iter()
        .find(|l| l.media_type.as_deref() == Some("application/pdf"))
        .map(|l| l.href.clone())
        .or_else(|| {
            arxiv_id
                .as_ref()
                .map(|id| format!("https://arxiv.org/pdf/{}", id.id))
        });

    Some(PaperRecord {
        title,
        abstract_text,
        authors,
        published,
        external_id: arxiv_id.map(|id| id.id),
        topic: topic.to_string(),
        days_since_publication: days_since(published, now),
        link,
        pdf_url,
        citations: None,
    })
}

/// Version of the first entry in an `id_list` response
fn latest_version(body: &[u8]) -> Result<u32> {
    let feed = feed_rs::parser::parse(body)?;
    let entry = feed.entries.first().ok_or_parse("empty arXiv response")?;
    parse_arxiv_id(&entry.id)
        .and_then(|id| id.version)
        .ok_or_parse("no version in arXiv entry id")
}

/// Extract an arXiv id and optional version from an id, abs URL or pdf URL.
///
/// ```
/// use rustpaperrank::arxiv::parse_arxiv_id;
///
/// let id = parse_arxiv_id("http://arxiv.org/abs/2401.01234v3").unwrap();
/// assert_eq!(id.id, "2401.01234");
/// assert_eq!(id.version, Some(3));
/// ```
pub fn parse_arxiv_id(value: &str) -> Option<ArxivId> {
    let re = Regex::new(
        r"(\d{4}\.\d{4,5}|[a-z][a-z\-]*(?:\.[A-Z]{2})?/\d{7})(?:v(\d+))?(?:\.pdf)?/?$",
    )
    .ok()?;
    let caps = re.captures(value.trim())?;
    Some(ArxivId {
        id: caps.get(1)?.as_str().to_string(),
        version: caps.get(2).and_then(|v| v.as_str().parse().ok()),
    })
}

/// Collapse runs of whitespace (arXiv wraps titles and abstracts)
fn clean_text(text: &str) -> String {
    match Regex::new(r"\s+") {
        Ok(re) => re.replace_all(text.trim(), " ").to_string(),
        Err(_) => text.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <link href="http://arxiv.org/api/query" rel="self" type="application/atom+xml"/>
  <title type="html">ArXiv Query</title>
  <id>http://arxiv.org/api/abc</id>
  <updated>2025-03-20T00:00:00-04:00</updated>
  <entry>
    <id>http://arxiv.org/abs/2503.01234v2</id>
    <updated>2025-03-19T17:59:59Z</updated>
    <published>2025-03-17T17:59:59Z</published>
    <title>Scaling Laws for
      Preference Optimization</title>
    <summary>  We study preference optimization
  at scale and release an open-source benchmark.
</summary>
    <author><name>Ada Lovelace</name></author>
    <author><name>Alan Turing</name></author>
    <link href="http://arxiv.org/abs/2503.01234v2" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2503.01234v2" rel="related" type="application/pdf"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2503.09999v1</id>
    <published>2025-03-18T10:00:00Z</published>
    <title></title>
    <summary>No title here.</summary>
  </entry>
</feed>"#;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 20, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_feed() {
        let records = parse_feed(SAMPLE_FEED.as_bytes(), "rlhf", now()).unwrap();
        assert_eq!(records.len(), 1);

        let r = &records[0];
        assert_eq!(r.title, "Scaling Laws for Preference Optimization");
        assert_eq!(
            r.abstract_text,
            "We study preference optimization at scale and release an open-source benchmark."
        );
        assert_eq!(r.authors, vec!["Ada Lovelace", "Alan Turing"]);
        assert_eq!(r.external_id.as_deref(), Some("2503.01234"));
        assert_eq!(r.topic, "rlhf");
        assert_eq!(r.days_since_publication, 2);
        assert_eq!(r.link.as_deref(), Some("http://arxiv.org/abs/2503.01234v2"));
        assert_eq!(r.pdf_url.as_deref(), Some("http://arxiv.org/pdf/2503.01234v2"));
    }

    #[test]
    fn test_latest_version() {
        assert_eq!(latest_version(SAMPLE_FEED.as_bytes()).unwrap(), 2);

        let empty = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom"><id>x</id><title>t</title><updated>2025-03-20T00:00:00Z</updated></feed>"#;
        assert!(latest_version(empty.as_bytes()).is_err());
        assert!(latest_version(b"not xml at all").is_err());
    }

    #[test]
    fn test_parse_arxiv_id() {
        let id = parse_arxiv_id("2401.12345").unwrap();
        assert_eq!(id.id, "2401.12345");
        assert_eq!(id.version, None);

        let id = parse_arxiv_id("https://arxiv.org/pdf/2401.12345v4.pdf").unwrap();
        assert_eq!(id.id, "2401.12345");
        assert_eq!(id.version, Some(4));

        let id = parse_arxiv_id("http://arxiv.org/abs/hep-th/9901001v1").unwrap();
        assert_eq!(id.id, "hep-th/9901001");
        assert_eq!(id.version, Some(1));

        let id = parse_arxiv_id("http://arxiv.org/abs/math.GT/0309136").unwrap();
        assert_eq!(id.id, "math.GT/0309136");

        assert!(parse_arxiv_id("http://arxiv.org/api/errors#incorrect_id_format").is_none());
    }

    #[test]
    fn test_build_window_url() {
        let start = Utc.with_ymd_and_hms(2025, 3, 6, 0, 0, 0).unwrap();
        let url = build_window_url(ARXIV_API_URL, "large language model", start, now(), 20).unwrap();
        let s = url.as_str();
        assert!(s.starts_with("https://export.arxiv.org/api/query?search_query="));
        assert!(s.contains("all:large+language+model"));
        assert!(s.contains("submittedDate:[20250306+TO+20250320]"));
        assert!(s.contains("sortBy=submittedDate"));
        assert!(s.contains("max_results=20"));
    }

    #[test]
    fn test_build_fallback_url() {
        let topics = vec!["rlhf".to_string(), "LLM reasoning".to_string()];
        let categories = vec!["cs.CL".to_string(), "cs.LG".to_string()];
        let url = build_fallback_url(ARXIV_API_URL, &topics, &categories, 10).unwrap();
        assert!(url
            .as_str()
            .contains("(ti:rlhf+OR+ti:LLM+reasoning)+AND+(cat:cs.CL+OR+cat:cs.LG)"));
    }

    #[test]
    fn test_build_id_list_url() {
        let url = build_id_list_url(ARXIV_API_URL, "2401.12345").unwrap();
        assert!(url.as_str().ends_with("?id_list=2401.12345&max_results=1"));
        assert!(build_id_list_url(ARXIV_API_URL, "  ").is_err());
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  a\n   b\tc  "), "a b c");
    }
}

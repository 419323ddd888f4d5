//! Custom error types for rustpaperrank.
//!
//! This module defines all error types used throughout the application.
//! All functions return `Result<T, PaperRankError>` instead of using `unwrap()`.

use thiserror::Error;

/// Main error type for rustpaperrank operations.
///
/// Uses `thiserror` for ergonomic error handling and automatic `Display` implementation.
#[derive(Debug, Error)]
pub enum PaperRankError {
    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Atom feed could not be parsed
    #[error("Feed error: {0}")]
    Feed(#[from] feed_rs::parser::ParseFeedError),

    /// Response or record parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rate limited by external API
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    /// External API returned an error
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: u16,
        /// Error message from API
        message: String,
    },

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias using `PaperRankError`
pub type Result<T> = std::result::Result<T, PaperRankError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| PaperRankError::Parse(msg.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_or_parse() {
        let missing: Option<u32> = None;
        let err = missing.ok_or_parse("no version").unwrap_err();
        assert_eq!(err.to_string(), "Parse error: no version");
        assert_eq!(Some(3).ok_or_parse("unused").unwrap(), 3);
    }
}

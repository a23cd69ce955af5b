//! Failure records and error classification for the crawler.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Categorized crawl error. Drives the retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimit,
    ModelNotFound,
    AdvisorApi,
    LlmApi,
    Network,
    Parse,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::ModelNotFound => "model_not_found",
            Self::AdvisorApi => "advisor_api",
            Self::LlmApi => "llm_api",
            Self::Network => "network",
            Self::Parse => "parse",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "rate_limit" => Self::RateLimit,
            "model_not_found" => Self::ModelNotFound,
            "advisor_api" => Self::AdvisorApi,
            "llm_api" => Self::LlmApi,
            "network" => Self::Network,
            "parse" => Self::Parse,
            _ => Self::Unknown,
        }
    }

    /// Categorize an error message by scanning for known markers.
    pub fn classify(message: &str) -> Self {
        let msg = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| msg.contains(n));

        if has(&["rate limit", "429", "too many requests"]) {
            Self::RateLimit
        } else if has(&["model not found", "llm indicated no match", "brand not found"]) {
            Self::ModelNotFound
        } else if has(&["motul"]) {
            Self::AdvisorApi
        } else if has(&["groq"]) {
            Self::LlmApi
        } else if has(&["connection", "timeout", "network", "dial"]) {
            Self::Network
        } else if has(&["parse", "invalid"]) {
            Self::Parse
        } else {
            Self::Unknown
        }
    }

    /// When a failure of this kind should be retried, relative to now.
    /// `None` means the failure is treated as permanent (no auto-retry).
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit => Some(Duration::minutes(1)),
            Self::Network => Some(Duration::minutes(5)),
            Self::ModelNotFound => None,
            _ => Some(Duration::minutes(30)),
        }
    }
}

/// One failure row, unique per vehicle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub id: i32,
    pub vehicle_id: i32,
    pub error_kind: ErrorKind,
    pub message: String,
    pub attempts: i32,
    pub last_attempt: DateTime<Utc>,
    /// `None` means the failure will not be retried automatically.
    pub next_attempt: Option<DateTime<Utc>>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

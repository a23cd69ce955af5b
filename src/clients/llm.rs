//! Groq chat client used as a fuzzy classifier over candidate lists.
//!
//! Holds an ordered pool of API keys. On a per-minute rate limit the failing
//! key cools down for 60 seconds and the client rotates to the next key; on
//! a daily-quota limit the key is parked until the next UTC midnight. When
//! the whole pool is daily-exhausted, calls block until midnight (observing
//! cancellation) and a background task restores the pool.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::rate_limit::{RateLimitError, RateLimiter};

const DEFAULT_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";
const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

/// Body substrings that distinguish a daily-quota 429 from a per-minute one.
const DAILY_LIMIT_MARKERS: [&str; 4] = ["tokens per day", "requests per day", "daily", "quota"];

const TURBO_MARKERS: [&str; 5] = ["turbo", "tsi", "tfsi", "t200", "thp"];
const DIESEL_MARKERS: [&str; 7] = ["diesel", "tdi", "cdti", "hdi", "dci", "jtd", "d4d"];

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Groq API error (status {status}): {body}")]
    Api { status: u16, body: String },
    #[error("Groq request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("all API keys rate limited: {0}")]
    AllKeysRateLimited(String),
    #[error("no candidates provided")]
    NoCandidates,
    #[error("LLM indicated no match")]
    NoMatch,
    #[error("empty response from LLM")]
    EmptyResponse,
    #[error("request cancelled")]
    Cancelled,
}

impl From<RateLimitError> for LlmError {
    fn from(_: RateLimitError) -> Self {
        LlmError::Cancelled
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub endpoint: String,
    pub model: String,
    pub requests_per_minute: f64,
    /// Cooldown before a minute-limited key is tried again.
    pub minute_cooldown: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            requests_per_minute: 30.0,
            minute_cooldown: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: ChatUsage,
    error: Option<ChatErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatErrorBody {
    #[serde(default)]
    message: String,
}

/// Outcome of one chat attempt against one key.
#[derive(Debug, Clone)]
pub enum ChatReply {
    Success { content: String, total_tokens: u32 },
    /// HTTP 429 or an in-body quota error; the body decides daily vs minute.
    RateLimited { body: String },
}

/// Transport seam so the key-pool logic is testable without a live provider.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn chat(&self, api_key: &str, request: &ChatRequest) -> Result<ChatReply, LlmError>;
}

/// Production transport over reqwest.
pub struct HttpChatApi {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpChatApi {
    pub fn new(endpoint: &str) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn chat(&self, api_key: &str, request: &ChatRequest) -> Result<ChatReply, LlmError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status.as_u16() == 429 {
            return Ok(ChatReply::RateLimited { body });
        }
        if !status.is_success() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|_| LlmError::EmptyResponse)?;

        if let Some(err) = parsed.error {
            // Some quota errors arrive with a 200 wrapper.
            if is_daily_limit_body(&err.message) {
                return Ok(ChatReply::RateLimited { body: err.message });
            }
            return Err(LlmError::Api {
                status: status.as_u16(),
                body: err.message,
            });
        }

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(LlmError::EmptyResponse)?;

        Ok(ChatReply::Success {
            content,
            total_tokens: parsed.usage.total_tokens,
        })
    }
}

fn is_daily_limit_body(body: &str) -> bool {
    let lower = body.to_lowercase();
    DAILY_LIMIT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Next UTC midnight after `now`.
fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now.date_naive() + chrono::Days::new(1);
    Utc.from_utc_datetime(&tomorrow.and_hms_opt(0, 0, 0).unwrap())
}

#[derive(Debug, Clone, Default)]
struct KeyStatus {
    rate_limited: bool,
    rate_limited_at: Option<Instant>,
    daily_exhausted: bool,
    daily_exhausted_at: Option<DateTime<Utc>>,
    error_count: u32,
}

#[derive(Debug)]
struct PoolState {
    keys: Vec<KeyStatus>,
    all_exhausted_until: Option<DateTime<Utc>>,
    /// Test hook: replaces the computed next-midnight reset time.
    reset_override: Option<DateTime<Utc>>,
}

/// Serializable key-pool health for the monitor endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct KeyPoolHealth {
    pub total_keys: usize,
    pub active_keys: usize,
    pub rate_limited_keys: usize,
    pub daily_exhausted_keys: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_exhausted_until: Option<DateTime<Utc>>,
}

/// One (target, candidates) pair of a batch call.
#[derive(Debug, Clone)]
pub struct BatchMatchRequest {
    pub id: usize,
    pub target: String,
    pub candidates: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BatchMatchResult {
    pub id: usize,
    /// 0-based index of the chosen candidate; `None` = no match.
    pub matched_index: Option<usize>,
    pub matched_value: Option<String>,
}

/// Chat client with key-pool failover and daily-quota awareness.
pub struct DisambiguatorClient {
    transport: Arc<dyn ChatApi>,
    config: LlmConfig,
    keys: Vec<String>,
    current_key: AtomicUsize,
    pool: Mutex<PoolState>,
    rate_limiter: RateLimiter,
    cancel: CancellationToken,
    reset_task: Mutex<Option<JoinHandle<()>>>,
}

impl DisambiguatorClient {
    pub fn new(
        keys: Vec<String>,
        config: LlmConfig,
        cancel: CancellationToken,
    ) -> Result<Arc<Self>, reqwest::Error> {
        let transport = Arc::new(HttpChatApi::new(&config.endpoint)?);
        Ok(Self::with_transport(transport, keys, config, cancel))
    }

    /// Build with an explicit transport (tests inject stubs here).
    pub fn with_transport(
        transport: Arc<dyn ChatApi>,
        keys: Vec<String>,
        config: LlmConfig,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        assert!(!keys.is_empty(), "at least one API key is required");
        let rate_limiter = RateLimiter::new(config.requests_per_minute / 60.0);
        let key_count = keys.len();

        let client = Arc::new(Self {
            transport,
            config,
            keys,
            current_key: AtomicUsize::new(0),
            pool: Mutex::new(PoolState {
                keys: vec![KeyStatus::default(); key_count],
                all_exhausted_until: None,
                reset_override: None,
            }),
            rate_limiter,
            cancel,
            reset_task: Mutex::new(None),
        });

        // Background reset of daily flags at UTC midnight.
        let weak = Arc::downgrade(&client);
        let handle = tokio::spawn(async move {
            loop {
                let Some(client) = weak.upgrade() else { break };
                let wait = (client.next_reset_time() - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                drop(client);
                tokio::time::sleep(wait.max(Duration::from_millis(50))).await;
                match weak.upgrade() {
                    Some(client) => client.reset_all_daily_limits(),
                    None => break,
                }
            }
        });
        *client.reset_task.lock().unwrap() = Some(handle);

        info!(keys = key_count, "disambiguator client initialized");
        client
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Health view for the status endpoint.
    pub fn key_pool_health(&self) -> KeyPoolHealth {
        let pool = self.pool.lock().unwrap();
        let mut active = 0;
        let mut minute = 0;
        let mut daily = 0;
        for status in &pool.keys {
            if status.daily_exhausted {
                daily += 1;
            } else if status.rate_limited {
                minute += 1;
            } else {
                active += 1;
            }
        }
        KeyPoolHealth {
            total_keys: pool.keys.len(),
            active_keys: active,
            rate_limited_keys: minute,
            daily_exhausted_keys: daily,
            all_exhausted_until: pool.all_exhausted_until,
        }
    }

    fn next_reset_time(&self) -> DateTime<Utc> {
        let pool = self.pool.lock().unwrap();
        pool.reset_override
            .unwrap_or_else(|| next_utc_midnight(Utc::now()))
    }

    #[cfg(test)]
    pub(crate) fn set_reset_override(&self, at: DateTime<Utc>) {
        self.pool.lock().unwrap().reset_override = Some(at);
    }

    fn reset_all_daily_limits(&self) {
        let mut pool = self.pool.lock().unwrap();
        let mut reset = 0;
        for status in pool.keys.iter_mut() {
            if status.daily_exhausted {
                reset += 1;
            }
            *status = KeyStatus::default();
        }
        pool.all_exhausted_until = None;
        if reset > 0 {
            info!(keys_reset = reset, "daily reset: API keys restored");
        }
    }

    /// Pick the best candidate for a free-text target.
    ///
    /// Single-candidate inputs short-circuit without a provider call. A
    /// response without a usable index falls back to the deterministic
    /// engine-type heuristic, so a non-empty candidate list always yields a
    /// candidate.
    pub async fn best_match(
        &self,
        target: &str,
        candidates: &[String],
    ) -> Result<String, LlmError> {
        if candidates.is_empty() {
            return Err(LlmError::NoCandidates);
        }
        if candidates.len() == 1 {
            return Ok(candidates[0].clone());
        }

        let mut options = String::new();
        for (i, candidate) in candidates.iter().enumerate() {
            options.push_str(&format!("{}.{} ", i + 1, candidate));
        }
        // The prompt must force a bare number; anything chattier and small
        // models answer with prose.
        let prompt = format!(
            "Q: Which option best matches \"{}\"?\n\
             IMPORTANT: If vehicle has NO turbo keywords (Turbo/TSI/T200/THP), choose NON-turbo option.\n\
             {}\nA:",
            target,
            options.trim_end()
        );

        self.rate_limiter.acquire(&self.cancel).await?;
        let response = self.chat_with_failover(&prompt, 5).await?;

        match parse_index_reply(&response, candidates.len()) {
            Some(index) => Ok(candidates[index].clone()),
            None => {
                warn!(response, target, "LLM reply unusable, using heuristic fallback");
                Ok(heuristic_fallback(target, candidates).to_string())
            }
        }
    }

    /// Resolve several (target, candidates) pairs in one provider call.
    /// The reply is a comma-separated index list; unparseable positions keep
    /// the first candidate and an explicit `0` means no match.
    pub async fn best_match_batch(
        &self,
        requests: &[BatchMatchRequest],
    ) -> Result<Vec<BatchMatchResult>, LlmError> {
        if requests.is_empty() {
            return Err(LlmError::NoCandidates);
        }
        if requests.len() == 1 {
            let req = &requests[0];
            let value = self.best_match(&req.target, &req.candidates).await?;
            let index = req.candidates.iter().position(|c| *c == value).unwrap_or(0);
            return Ok(vec![BatchMatchResult {
                id: req.id,
                matched_index: Some(index),
                matched_value: Some(value),
            }]);
        }

        let mut prompt =
            String::from("Match each vehicle to its best option. Reply with comma-separated numbers.\n");
        let mut max_options = 0;
        for (i, req) in requests.iter().enumerate() {
            let mut options = String::new();
            for (j, candidate) in req.candidates.iter().enumerate() {
                options.push_str(&format!("{}.{} ", j + 1, candidate));
            }
            max_options = max_options.max(req.candidates.len());
            prompt.push_str(&format!(
                "V{}:{}|Opts:{}\n",
                i + 1,
                req.target,
                options.trim_end()
            ));
        }
        prompt.push_str(&format!(
            "Reply format: n1,n2,n3... (numbers 1-{} for each, 0=no match)",
            max_options
        ));

        self.rate_limiter.acquire(&self.cancel).await?;
        let response = self.chat_with_failover(&prompt, 200).await?;
        Ok(parse_batch_reply(&response, requests))
    }

    fn current_key(&self) -> (usize, &str) {
        let idx = self.current_key.load(Ordering::Relaxed) % self.keys.len();
        (idx, &self.keys[idx])
    }

    /// Mark a key and pick the next usable one. Returns false when every
    /// key is unavailable; in that case `all_exhausted_until` is published
    /// iff the whole pool hit its daily quota.
    fn rotate_key(&self, failed_idx: usize, daily: bool) -> bool {
        let mut pool = self.pool.lock().unwrap();

        if daily {
            pool.keys[failed_idx].daily_exhausted = true;
            pool.keys[failed_idx].daily_exhausted_at = Some(Utc::now());
            warn!(key_idx = failed_idx, "API key daily quota exhausted");
        } else {
            pool.keys[failed_idx].rate_limited = true;
            pool.keys[failed_idx].rate_limited_at = Some(Instant::now());
            pool.keys[failed_idx].error_count += 1;
        }

        let key_count = pool.keys.len();
        for offset in 1..=key_count {
            let idx = (failed_idx + offset) % key_count;
            let status = &mut pool.keys[idx];

            if status.daily_exhausted {
                continue;
            }
            if status.rate_limited {
                let expired = status
                    .rate_limited_at
                    .map(|at| at.elapsed() >= self.config.minute_cooldown)
                    .unwrap_or(true);
                if expired {
                    status.rate_limited = false;
                    status.rate_limited_at = None;
                    status.error_count = 0;
                } else {
                    continue;
                }
            }

            self.current_key.store(idx, Ordering::Relaxed);
            info!(from = failed_idx, to = idx, daily, "rotated to next API key");
            return true;
        }

        if pool.keys.iter().all(|s| s.daily_exhausted) {
            let reset_at = pool
                .reset_override
                .unwrap_or_else(|| next_utc_midnight(Utc::now()));
            pool.all_exhausted_until = Some(reset_at);
            warn!(resume_at = %reset_at, "all API keys daily-exhausted, blocking until reset");
        } else {
            warn!("all API keys temporarily rate limited");
        }
        false
    }

    fn mark_key_success(&self, idx: usize) {
        let mut pool = self.pool.lock().unwrap();
        pool.keys[idx].rate_limited = false;
        pool.keys[idx].rate_limited_at = None;
        pool.keys[idx].error_count = 0;
        // daily_exhausted stays set until the reset task clears it
    }

    /// Block while the whole pool is daily-exhausted.
    async fn wait_for_pool_reset(&self) -> Result<(), LlmError> {
        loop {
            let until = self.pool.lock().unwrap().all_exhausted_until;
            let Some(until) = until else { return Ok(()) };
            let now = Utc::now();
            if until <= now {
                self.reset_all_daily_limits();
                return Ok(());
            }
            let wait = (until - now).to_std().unwrap_or(Duration::ZERO);
            info!(resume_at = %until, "waiting for daily key reset");
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(LlmError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    async fn chat_with_failover(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: prompt.to_string(),
            }],
            temperature: 0.0,
            max_tokens,
        };

        loop {
            self.wait_for_pool_reset().await?;

            let mut tried = 0;
            while tried < self.keys.len() {
                if self.cancel.is_cancelled() {
                    return Err(LlmError::Cancelled);
                }

                let (idx, key) = self.current_key();
                let skip = self.pool.lock().unwrap().keys[idx].daily_exhausted;
                if skip {
                    debug!(key_idx = idx, "skipping daily-exhausted key");
                    self.current_key
                        .store((idx + 1) % self.keys.len(), Ordering::Relaxed);
                    tried += 1;
                    continue;
                }

                match self.transport.chat(key, &request).await? {
                    ChatReply::Success {
                        content,
                        total_tokens,
                    } => {
                        self.mark_key_success(idx);
                        debug!(key_idx = idx, total_tokens, "chat request succeeded");
                        return Ok(content);
                    }
                    ChatReply::RateLimited { body } => {
                        let daily = is_daily_limit_body(&body);
                        warn!(key_idx = idx, daily, "rate limit hit, rotating key");
                        if self.rotate_key(idx, daily) {
                            tried += 1;
                            continue;
                        }
                        let exhausted = self.pool.lock().unwrap().all_exhausted_until;
                        if exhausted.is_some() {
                            break; // outer loop waits for the daily reset
                        }
                        return Err(LlmError::AllKeysRateLimited(body));
                    }
                }
            }

            let exhausted = self.pool.lock().unwrap().all_exhausted_until;
            if exhausted.is_none() {
                return Err(LlmError::AllKeysRateLimited(
                    "every key was tried".to_string(),
                ));
            }
        }
    }
}

impl Drop for DisambiguatorClient {
    fn drop(&mut self) {
        if let Some(handle) = self.reset_task.lock().unwrap().take() {
            handle.abort();
        }
    }
}

/// Extract a 1-based candidate index from an LLM reply.
///
/// The first digit found wins. `0`, out-of-range values and digit-free
/// replies all return `None` so the caller can apply the heuristic fallback.
fn parse_index_reply(response: &str, candidate_count: usize) -> Option<usize> {
    let digit = response.chars().find(|c| c.is_ascii_digit())?;
    let value = digit.to_digit(10)? as usize;
    if value >= 1 && value <= candidate_count {
        Some(value - 1)
    } else {
        None
    }
}

/// Deterministic candidate selection when the LLM does not cooperate:
/// prefer a candidate matching the target's engine category (turbo or
/// diesel markers), otherwise take the first.
fn heuristic_fallback<'a>(target: &str, candidates: &'a [String]) -> &'a str {
    let target_lower = target.to_lowercase();
    let target_turbo = TURBO_MARKERS.iter().any(|m| target_lower.contains(m));
    let target_diesel = DIESEL_MARKERS.iter().any(|m| target_lower.contains(m));

    for candidate in candidates {
        let lower = candidate.to_lowercase();
        let turbo = TURBO_MARKERS.iter().any(|m| lower.contains(m));
        let diesel = DIESEL_MARKERS.iter().any(|m| lower.contains(m));
        if turbo == target_turbo && diesel == target_diesel {
            return candidate;
        }
    }
    &candidates[0]
}

fn parse_batch_reply(response: &str, requests: &[BatchMatchRequest]) -> Vec<BatchMatchResult> {
    let mut results: Vec<BatchMatchResult> = requests
        .iter()
        .map(|req| BatchMatchResult {
            id: req.id,
            matched_index: Some(0),
            matched_value: req.candidates.first().cloned(),
        })
        .collect();

    let numbers = response
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty());

    for (i, number) in numbers.enumerate() {
        if i >= requests.len() {
            break;
        }
        let Ok(value) = number.parse::<usize>() else {
            continue;
        };
        let req = &requests[i];
        if value == 0 {
            results[i].matched_index = None;
            results[i].matched_value = None;
        } else if value <= req.candidates.len() {
            results[i].matched_index = Some(value - 1);
            results[i].matched_value = Some(req.candidates[value - 1].clone());
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    /// Scripted transport: per-key queues of replies, with a call log.
    struct StubChat {
        replies: StdMutex<HashMap<String, Vec<Result<ChatReply, ()>>>>,
        calls: StdMutex<Vec<String>>,
    }

    impl StubChat {
        fn new() -> Self {
            Self {
                replies: StdMutex::new(HashMap::new()),
                calls: StdMutex::new(Vec::new()),
            }
        }

        fn script(&self, key: &str, reply: ChatReply) {
            self.replies
                .lock()
                .unwrap()
                .entry(key.to_string())
                .or_default()
                .push(Ok(reply));
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatApi for StubChat {
        async fn chat(&self, api_key: &str, _request: &ChatRequest) -> Result<ChatReply, LlmError> {
            self.calls.lock().unwrap().push(api_key.to_string());
            let mut replies = self.replies.lock().unwrap();
            let queue = replies.entry(api_key.to_string()).or_default();
            if queue.is_empty() {
                // Default to success once the script runs out.
                return Ok(ChatReply::Success {
                    content: "1".to_string(),
                    total_tokens: 3,
                });
            }
            queue.remove(0).map_err(|_| LlmError::EmptyResponse)
        }
    }

    fn fast_config() -> LlmConfig {
        LlmConfig {
            requests_per_minute: 60_000.0,
            minute_cooldown: Duration::from_millis(50),
            ..Default::default()
        }
    }

    fn candidates(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_index_reply() {
        assert_eq!(parse_index_reply("2", 3), Some(1));
        assert_eq!(parse_index_reply("Answer: 3.", 3), Some(2));
        assert_eq!(parse_index_reply("0", 3), None);
        assert_eq!(parse_index_reply("7", 3), None);
        assert_eq!(parse_index_reply("none of them", 3), None);
    }

    #[test]
    fn test_heuristic_fallback_prefers_engine_category() {
        let opts = candidates(&["Polo 1.0 MPI", "Polo 1.0 TSI Turbo"]);
        assert_eq!(heuristic_fallback("Polo 1.0 TSI 128cv", &opts), "Polo 1.0 TSI Turbo");
        assert_eq!(heuristic_fallback("Polo 1.0 MPI 84cv", &opts), "Polo 1.0 MPI");

        let opts = candidates(&["Ranger 2.5 Flex", "Ranger 3.2 Diesel"]);
        assert_eq!(heuristic_fallback("Ranger 3.2 TDI", &opts), "Ranger 3.2 Diesel");
        // No category-consistent candidate: first wins.
        let opts = candidates(&["Uno Turbo", "Uno Turbo i.e."]);
        assert_eq!(heuristic_fallback("Uno Mille", &opts), "Uno Turbo");
    }

    #[tokio::test]
    async fn test_single_candidate_short_circuits() {
        let stub = Arc::new(StubChat::new());
        let client = DisambiguatorClient::with_transport(
            stub.clone(),
            vec!["k0".into()],
            fast_config(),
            CancellationToken::new(),
        );

        let result = client
            .best_match("Gol 1.0", &candidates(&["Gol 1.0 12V"]))
            .await
            .unwrap();
        assert_eq!(result, "Gol 1.0 12V");
        assert!(stub.calls().is_empty(), "no provider call expected");
    }

    #[tokio::test]
    async fn test_minute_limit_rotates_and_advances_current() {
        let stub = Arc::new(StubChat::new());
        stub.script("k0", ChatReply::RateLimited { body: "slow down".into() });
        stub.script("k1", ChatReply::Success { content: "2".into(), total_tokens: 3 });
        stub.script("k1", ChatReply::Success { content: "1".into(), total_tokens: 3 });

        let client = DisambiguatorClient::with_transport(
            stub.clone(),
            vec!["k0".into(), "k1".into()],
            fast_config(),
            CancellationToken::new(),
        );

        let opts = candidates(&["HB 20S", "HB 20", "HB 20X"]);
        let first = client.best_match("HB20", &opts).await.unwrap();
        assert_eq!(first, "HB 20");

        // Current index advanced: the second call goes straight to k1.
        let _ = client.best_match("HB20", &opts).await.unwrap();
        assert_eq!(stub.calls(), vec!["k0", "k1", "k1"]);

        let health = client.key_pool_health();
        assert_eq!(health.rate_limited_keys, 1);
        assert_eq!(health.active_keys, 1);
    }

    #[tokio::test]
    async fn test_minute_limited_key_recovers_after_cooldown() {
        let stub = Arc::new(StubChat::new());
        stub.script("k0", ChatReply::RateLimited { body: "slow down".into() });

        let client = DisambiguatorClient::with_transport(
            stub.clone(),
            vec!["k0".into(), "k1".into()],
            fast_config(),
            CancellationToken::new(),
        );

        let opts = candidates(&["A", "B"]);
        client.best_match("x", &opts).await.unwrap();
        let limited = client.key_pool_health().rate_limited_keys;
        assert_eq!(limited, 1);

        // After the cooldown a later rotation may hand work back to k0.
        tokio::time::sleep(Duration::from_millis(60)).await;
        stub.script("k1", ChatReply::RateLimited { body: "slow down".into() });
        client.best_match("x", &opts).await.unwrap();
        assert_eq!(*stub.calls().last().unwrap(), "k0".to_string());
    }

    #[tokio::test]
    async fn test_all_minute_limited_fails_immediately() {
        let stub = Arc::new(StubChat::new());
        stub.script("k0", ChatReply::RateLimited { body: "slow down".into() });
        stub.script("k1", ChatReply::RateLimited { body: "slow down".into() });

        let client = DisambiguatorClient::with_transport(
            stub.clone(),
            vec!["k0".into(), "k1".into()],
            LlmConfig {
                minute_cooldown: Duration::from_secs(60),
                requests_per_minute: 60_000.0,
                ..Default::default()
            },
            CancellationToken::new(),
        );

        let err = client
            .best_match("x", &candidates(&["A", "B"]))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::AllKeysRateLimited(_)));
    }

    #[tokio::test]
    async fn test_daily_quota_parks_key_until_reset() {
        let stub = Arc::new(StubChat::new());
        stub.script(
            "k0",
            ChatReply::RateLimited { body: "Rate limit reached: tokens per day".into() },
        );
        stub.script("k1", ChatReply::Success { content: "1".into(), total_tokens: 2 });

        let client = DisambiguatorClient::with_transport(
            stub.clone(),
            vec!["k0".into(), "k1".into()],
            fast_config(),
            CancellationToken::new(),
        );

        let opts = candidates(&["A", "B"]);
        client.best_match("x", &opts).await.unwrap();

        let health = client.key_pool_health();
        assert_eq!(health.daily_exhausted_keys, 1);

        // k0 stays parked even after the minute cooldown.
        tokio::time::sleep(Duration::from_millis(60)).await;
        client.best_match("x", &opts).await.unwrap();
        assert!(!stub.calls().iter().skip(1).any(|k| k == "k0"));
    }

    #[tokio::test]
    async fn test_full_daily_exhaustion_blocks_until_reset() {
        let stub = Arc::new(StubChat::new());
        stub.script("k0", ChatReply::RateLimited { body: "requests per day exceeded".into() });
        stub.script("k1", ChatReply::RateLimited { body: "daily quota exceeded".into() });
        // After the reset the rotated-to index is still k1.
        stub.script("k1", ChatReply::Success { content: "2".into(), total_tokens: 2 });

        let client = DisambiguatorClient::with_transport(
            stub.clone(),
            vec!["k0".into(), "k1".into()],
            fast_config(),
            CancellationToken::new(),
        );
        client.set_reset_override(Utc::now() + chrono::Duration::milliseconds(150));

        let start = Instant::now();
        let result = client
            .best_match("x", &candidates(&["A", "B"]))
            .await
            .unwrap();
        assert_eq!(result, "B");
        assert!(start.elapsed() >= Duration::from_millis(120));

        let health = client.key_pool_health();
        assert_eq!(health.daily_exhausted_keys, 0);
    }

    #[tokio::test]
    async fn test_batch_reply_parsing() {
        let requests = vec![
            BatchMatchRequest {
                id: 0,
                target: "Gol".into(),
                candidates: candidates(&["Gol 1.0", "Gol 1.6"]),
            },
            BatchMatchRequest {
                id: 1,
                target: "Uno".into(),
                candidates: candidates(&["Uno Mille", "Uno Way"]),
            },
            BatchMatchRequest {
                id: 2,
                target: "Ka".into(),
                candidates: candidates(&["Ka 1.0"]),
            },
        ];

        let results = parse_batch_reply("2, 0, 9", &requests);
        assert_eq!(results[0].matched_index, Some(1));
        assert_eq!(results[1].matched_index, None);
        // Out-of-range keeps the default first candidate.
        assert_eq!(results[2].matched_index, Some(0));
        assert_eq!(results[2].matched_value.as_deref(), Some("Ka 1.0"));
    }
}

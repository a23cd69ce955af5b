//! Typed client for the Motul oil-advisor gateway.
//!
//! Four GET endpoints mirror the external protocol: brands, models (per
//! brand and year), types (per model) and recommendations (per type). Every
//! request passes through the shared rate limiter and a bounded
//! retry/backoff loop.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::rate_limit::{RateLimitError, RateLimiter};

const DEFAULT_BASE_URL: &str = "https://gateway-apim.motul.com/oil-advisor";
const LOCALE: &str = "pt-BR";
const BUSINESS_UNIT: &str = "Brazil";

#[derive(Debug, thiserror::Error)]
pub enum AdvisorError {
    #[error("Motul API error (status {status}): {body}")]
    Api { status: u16, body: String },
    #[error("Motul API request failed after {attempts} attempts: {source}")]
    Transport {
        attempts: u32,
        source: reqwest::Error,
    },
    #[error("failed to parse Motul response: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("request cancelled")]
    Cancelled,
}

impl From<RateLimitError> for AdvisorError {
    fn from(_: RateLimitError) -> Self {
        AdvisorError::Cancelled
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AdvisorBrand {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AdvisorModel {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AdvisorType {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct BrandsResponse {
    #[serde(default)]
    brands: Vec<AdvisorBrand>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<AdvisorModel>,
}

#[derive(Debug, Deserialize)]
struct TypesResponse {
    #[serde(default)]
    types: Vec<AdvisorType>,
}

/// The recommendations payload. Components live inside the vehicle block.
#[derive(Debug, Clone, Deserialize)]
pub struct SpecificationsResponse {
    pub vehicle: SpecificationsVehicle,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpecificationsVehicle {
    #[serde(rename = "categoryId", default)]
    pub category_id: String,
    #[serde(default)]
    pub brand: String,
    #[serde(rename = "type", default)]
    pub type_name: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub components: Components,
}

/// The gateway has shipped two shapes for `components`: a structured array
/// of component objects, and an older flat heterogeneous array of strings
/// and numbers. Both are modeled; the parser dispatches on the variant.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Components {
    Structured(Vec<AdvisorComponent>),
    Flat(Vec<serde_json::Value>),
}

impl Default for Components {
    fn default() -> Self {
        Components::Structured(Vec::new())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvisorComponent {
    pub category: ComponentCategory,
    #[serde(default)]
    pub capacities: Vec<ComponentCapacity>,
    #[serde(default)]
    pub recommendations: Vec<ComponentRecommendation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComponentCategory {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComponentCapacity {
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComponentRecommendation {
    #[serde(default)]
    pub products: Vec<RecommendedProduct>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendedProduct {
    #[serde(default)]
    pub name: String,
}

/// HTTP client for the advisor gateway.
pub struct AdvisorClient {
    http: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryConfig,
    base_url: String,
    cancel: CancellationToken,
}

impl AdvisorClient {
    pub fn new(
        rate_limiter: Arc<RateLimiter>,
        cancel: CancellationToken,
    ) -> Result<Self, reqwest::Error> {
        Self::with_base_url(DEFAULT_BASE_URL, rate_limiter, cancel)
    }

    /// Create a client against a custom gateway URL (used by tests).
    pub fn with_base_url(
        base_url: &str,
        rate_limiter: Arc<RateLimiter>,
        cancel: CancellationToken,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .gzip(true)
            .build()?;
        Ok(Self {
            http,
            rate_limiter,
            retry: RetryConfig::default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            cancel,
        })
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// All car brands.
    pub async fn get_brands(&self) -> Result<Vec<AdvisorBrand>, AdvisorError> {
        let url = format!(
            "{}/vehicle-brands?categoryId=CAR&locale={}&BU={}",
            self.base_url, LOCALE, BUSINESS_UNIT
        );
        let body = self.fetch_with_retry(&url).await?;
        let resp: BrandsResponse = serde_json::from_str(&body)?;
        Ok(resp.brands)
    }

    /// Models for a brand in a given year. The gateway's model list is
    /// year-conditional, so callers sample several years and deduplicate.
    pub async fn get_models(
        &self,
        brand_id: &str,
        year: i32,
    ) -> Result<Vec<AdvisorModel>, AdvisorError> {
        let url = format!(
            "{}/vehicle-models?vehicleBrandId={}&year={}&locale={}&BU={}",
            self.base_url, brand_id, year, LOCALE, BUSINESS_UNIT
        );
        let body = self.fetch_with_retry(&url).await?;
        let resp: ModelsResponse = serde_json::from_str(&body)?;
        Ok(resp.models)
    }

    /// Vehicle types (variants) for a model.
    pub async fn get_vehicle_types(&self, model_id: &str) -> Result<Vec<AdvisorType>, AdvisorError> {
        let url = format!(
            "{}/vehicle-types?vehicleModelId={}&locale={}&BU={}",
            self.base_url, model_id, LOCALE, BUSINESS_UNIT
        );
        let body = self.fetch_with_retry(&url).await?;
        let resp: TypesResponse = serde_json::from_str(&body)?;
        Ok(resp.types)
    }

    /// Oil recommendations for a vehicle type.
    pub async fn get_specifications(
        &self,
        type_id: &str,
    ) -> Result<SpecificationsResponse, AdvisorError> {
        let url = format!(
            "{}/recommendations?vehicleTypeId={}&locale={}&BU={}",
            self.base_url, type_id, LOCALE, BUSINESS_UNIT
        );
        let body = self.fetch_with_retry(&url).await?;
        let resp: SpecificationsResponse = serde_json::from_str(&body)?;
        Ok(resp)
    }

    /// GET with rate limiting and exponential backoff. Retries transport
    /// errors and 429/500/502/503; any other non-2xx surfaces verbatim.
    async fn fetch_with_retry(&self, url: &str) -> Result<String, AdvisorError> {
        let mut backoff = self.retry.initial_backoff;

        for attempt in 0..=self.retry.max_retries {
            self.rate_limiter.acquire(&self.cancel).await?;

            let result = self.http.get(url).send().await;
            let response = match result {
                Ok(resp) => resp,
                Err(e) => {
                    if attempt < self.retry.max_retries {
                        warn!(url, attempt, error = %e, "advisor request failed, backing off");
                        self.sleep_backoff(&mut backoff).await?;
                        continue;
                    }
                    return Err(AdvisorError::Transport {
                        attempts: attempt + 1,
                        source: e,
                    });
                }
            };

            let status = response.status();
            if status.is_success() {
                let body = response.text().await.map_err(|e| AdvisorError::Transport {
                    attempts: attempt + 1,
                    source: e,
                })?;
                return Ok(body);
            }

            let retryable = matches!(
                status,
                StatusCode::TOO_MANY_REQUESTS
                    | StatusCode::INTERNAL_SERVER_ERROR
                    | StatusCode::BAD_GATEWAY
                    | StatusCode::SERVICE_UNAVAILABLE
            );
            let body = response.text().await.unwrap_or_default();

            if retryable && attempt < self.retry.max_retries {
                debug!(url, %status, attempt, "retryable advisor status");
                self.sleep_backoff(&mut backoff).await?;
                continue;
            }

            return Err(AdvisorError::Api {
                status: status.as_u16(),
                body,
            });
        }

        unreachable!("retry loop always returns");
    }

    async fn sleep_backoff(&self, backoff: &mut Duration) -> Result<(), AdvisorError> {
        tokio::select! {
            _ = self.cancel.cancelled() => return Err(AdvisorError::Cancelled),
            _ = tokio::time::sleep(*backoff) => {}
        }
        *backoff = Duration::from_secs_f64(
            (backoff.as_secs_f64() * self.retry.multiplier)
                .min(self.retry.max_backoff.as_secs_f64()),
        );
        Ok(())
    }
}

//! Outbound clients: the oil-advisor HTTP API, the Groq LLM, and the rate
//! limiter that paces both.

mod advisor;
mod llm;
mod rate_limit;

pub use advisor::{
    AdvisorBrand, AdvisorClient, AdvisorComponent, AdvisorError, AdvisorModel, AdvisorType,
    ComponentCapacity, ComponentCategory, ComponentRecommendation, Components, RecommendedProduct,
    RetryConfig, SpecificationsResponse, SpecificationsVehicle,
};
pub use llm::{
    BatchMatchRequest, BatchMatchResult, ChatApi, ChatMessage, ChatReply, ChatRequest,
    DisambiguatorClient, HttpChatApi, KeyPoolHealth, LlmConfig, LlmError,
};
pub use rate_limit::{RateLimitError, RateLimiter};

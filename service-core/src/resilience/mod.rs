//! Process-local resilience primitives: admission control, failure isolation and retry.

pub mod circuit_breaker;
pub mod retry;
pub mod token_bucket;

pub use circuit_breaker::{
    CallOutcome, CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitOpenError,
    CircuitState,
};
pub use retry::{RetryConfig, retry_with_backoff};
pub use token_bucket::{RateDecision, RateLimitPolicy, TokenBucketLimiter};

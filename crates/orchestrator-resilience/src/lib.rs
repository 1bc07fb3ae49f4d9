//! # Orchestrator Resilience
//!
//! Failure handling for calls into agents:
//! - Circuit breaker per (protocol, agent) pair
//! - Retry policy with exponential backoff, jitter and deadline awareness

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod circuit_breaker;
pub mod retry;

// Re-export main types
pub use circuit_breaker::{
    BreakerKey, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerStats,
    CircuitState,
};
pub use retry::{RetryConfig, RetryPolicy, RetryPolicyBuilder, RetryResult};

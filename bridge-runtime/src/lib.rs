//! Runtime primitives shared by the bridge's Kafka-facing crates: retry with
//! exponential backoff and a circuit breaker, used to turn transient Kafka
//! poll failures into bounded retries and, past a threshold, an escalation
//! rather than an unbounded retry loop.
//!
//! # Example
//!
//! ```rust,no_run
//! use bridge_runtime::{retry_with_backoff, RetryPolicy};
//!
//! # async fn example() -> Result<(), String> {
//! let policy = RetryPolicy::default();
//! let result = retry_with_backoff(&policy, || async {
//!     // poll the Kafka consumer, return Err on a transient failure
//!     Ok::<_, String>(42)
//! }).await?;
//! # let _ = result;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod metrics;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, State as CircuitBreakerState,
};
pub use retry::{retry_with_backoff, retry_with_predicate, RetryPolicy};

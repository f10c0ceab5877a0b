//! Idempotency-aware retry transport for `reqwest`.
//!
//! [`RetryTransport`] is a [`reqwest_middleware::Middleware`] that retries
//! a request against a [`RetryPolicy`], sleeping between attempts according
//! to a `resilient_backoff::BackoffStrategy` and cooperating with server
//! throttle hints (`Retry-After`, `X-RateLimit-*`).

#![warn(missing_docs)]
#![warn(clippy::all)]

mod events;
mod policy;
mod throttle;
mod transport;

pub use events::RetryEvent;
pub use policy::{DefaultPolicy, LimitAttempts, RetryAttempt, RetryPolicy};
pub use throttle::{parse_rate_limit_reset, parse_retry_after, throttle_hint};
pub use transport::{RetryTransport, RetryTransportBuilder};

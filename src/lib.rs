//! Composable building blocks for resilient HTTP clients and servers.
//!
//! Each piece lives in its own crate and is re-exported here behind a
//! feature flag, so a consumer only pulls in what it uses:
//!
//! - [`backoff`]: constant/linear/exponential/jittered backoff strategies.
//! - [`retry`]: an idempotency-aware retry transport for `reqwest`.
//! - [`scheduler`]: a tick scheduler with graceful shutdown.
//! - [`cache`]: a conditional-GET refresh cache controller.
//!
//! Enable `tracing` and/or `metrics` for observability across whichever
//! pieces are active, or `full` for everything at once.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use resilient_core as core;

#[cfg(feature = "backoff")]
#[cfg_attr(docsrs, doc(cfg(feature = "backoff")))]
pub use resilient_backoff as backoff;

#[cfg(feature = "retry")]
#[cfg_attr(docsrs, doc(cfg(feature = "retry")))]
pub use resilient_retry as retry;

#[cfg(feature = "scheduler")]
#[cfg_attr(docsrs, doc(cfg(feature = "scheduler")))]
pub use resilient_scheduler as scheduler;

#[cfg(feature = "cache")]
#[cfg_attr(docsrs, doc(cfg(feature = "cache")))]
pub use resilient_cache as cache;

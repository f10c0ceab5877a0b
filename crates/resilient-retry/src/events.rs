//! Observability events emitted by the retry transport.

use resilient_core::ResilienceEvent;
use std::time::{Duration, Instant};

/// An event emitted by a [`crate::RetryTransport`] while it processes a
/// request.
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// An attempt was unsuccessful and another will follow after `delay`.
    Retry {
        /// Name of the transport instance.
        name: String,
        /// 1-based number of the attempt that just failed.
        attempt: u32,
        /// Computed sleep before the next attempt.
        delay: Duration,
        timestamp: Instant,
    },
    /// The policy declined further attempts; the last result is returned
    /// to the caller as-is.
    GiveUp {
        /// Name of the transport instance.
        name: String,
        /// Total number of attempts made.
        attempts: u32,
        timestamp: Instant,
    },
    /// An attempt succeeded (a response was returned, regardless of its
    /// status, and the policy did not ask for a retry).
    Success {
        /// Name of the transport instance.
        name: String,
        /// Total number of attempts made.
        attempts: u32,
        timestamp: Instant,
    },
}

impl ResilienceEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::Retry { .. } => "retry",
            RetryEvent::GiveUp { .. } => "give_up",
            RetryEvent::Success { .. } => "success",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RetryEvent::Retry { timestamp, .. } => *timestamp,
            RetryEvent::GiveUp { timestamp, .. } => *timestamp,
            RetryEvent::Success { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            RetryEvent::Retry { name, .. } => name,
            RetryEvent::GiveUp { name, .. } => name,
            RetryEvent::Success { name, .. } => name,
        }
    }
}

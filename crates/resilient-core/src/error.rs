//! Unified error type for composed resilient-http pieces.
//!
//! Each piece (retry transport, scheduler, refresh cache) defines its own
//! error enum for the failure modes it introduces. `ResilienceError<E>`
//! wraps those plus an `Application(E)` variant for the caller's own error
//! type, so code that stacks several pieces together can propagate one
//! error type with `?` instead of juggling several.

use std::fmt;
use std::time::Duration;

/// A unified error type for composed resilience pieces.
///
/// `E` is the application-level error type produced by the wrapped work
/// (for example a mapper's deserialization error, or a tick's own error).
#[derive(Debug)]
pub enum ResilienceError<E> {
    /// Building a component failed because its configuration was invalid
    /// (e.g. `min_delay > max_delay`, zero workers).
    Construction(String),

    /// The underlying transport failed to produce an HTTP response at all
    /// (connection refused, DNS failure, TLS error, I/O timeout).
    Transport(String),

    /// A response carrying a non-2xx status was returned after retries were
    /// exhausted or the status was deemed non-retryable.
    HttpStatus {
        /// HTTP status code of the final response.
        status: u16,
    },

    /// The request or response body could not be read, or a request body
    /// needed to be replayed for a retry but was not rewindable.
    Body(String),

    /// A `Mapper` failed to decode a response body into its target type.
    Mapper(String),

    /// The operation was cancelled before it completed, either by an
    /// explicit cancellation token or because a scheduler was shut down.
    Cancelled,

    /// A tick or request did not complete within its allotted time.
    Timeout {
        /// The duration that was allotted.
        after: Duration,
    },

    /// An error produced by the caller's own application code (a `Tick`
    /// implementation, a `Mapper`, a retry predicate).
    Application(E),
}

impl<E: fmt::Display> fmt::Display for ResilienceError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResilienceError::Construction(msg) => write!(f, "invalid configuration: {msg}"),
            ResilienceError::Transport(msg) => write!(f, "transport error: {msg}"),
            ResilienceError::HttpStatus { status } => {
                write!(f, "request failed with status {status}")
            }
            ResilienceError::Body(msg) => write!(f, "body error: {msg}"),
            ResilienceError::Mapper(msg) => write!(f, "mapper error: {msg}"),
            ResilienceError::Cancelled => write!(f, "operation cancelled"),
            ResilienceError::Timeout { after } => {
                write!(f, "operation timed out after {after:?}")
            }
            ResilienceError::Application(err) => write!(f, "{err}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for ResilienceError<E> {}

impl<E> ResilienceError<E> {
    /// Returns true if this is a construction (configuration) error.
    pub fn is_construction(&self) -> bool {
        matches!(self, ResilienceError::Construction(_))
    }

    /// Returns true if this is a transport-level error.
    pub fn is_transport(&self) -> bool {
        matches!(self, ResilienceError::Transport(_))
    }

    /// Returns true if this wraps an application error.
    pub fn is_application(&self) -> bool {
        matches!(self, ResilienceError::Application(_))
    }

    /// Returns true if the operation was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ResilienceError::Cancelled)
    }

    /// Returns the wrapped application error, if this is that variant.
    pub fn application_error(&self) -> Option<&E> {
        match self {
            ResilienceError::Application(err) => Some(err),
            _ => None,
        }
    }

    /// Consumes the error and returns the wrapped application error, if any.
    pub fn into_application_error(self) -> Option<E> {
        match self {
            ResilienceError::Application(err) => Some(err),
            _ => None,
        }
    }

    /// Maps the application error variant, leaving every other variant
    /// unchanged.
    pub fn map_application<F, E2>(self, f: F) -> ResilienceError<E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            ResilienceError::Construction(msg) => ResilienceError::Construction(msg),
            ResilienceError::Transport(msg) => ResilienceError::Transport(msg),
            ResilienceError::HttpStatus { status } => ResilienceError::HttpStatus { status },
            ResilienceError::Body(msg) => ResilienceError::Body(msg),
            ResilienceError::Mapper(msg) => ResilienceError::Mapper(msg),
            ResilienceError::Cancelled => ResilienceError::Cancelled,
            ResilienceError::Timeout { after } => ResilienceError::Timeout { after },
            ResilienceError::Application(err) => ResilienceError::Application(f(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct MyError(String);

    impl fmt::Display for MyError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "my error: {}", self.0)
        }
    }

    #[test]
    fn display_formats_each_variant() {
        let err: ResilienceError<MyError> = ResilienceError::Construction("bad config".into());
        assert_eq!(err.to_string(), "invalid configuration: bad config");

        let err: ResilienceError<MyError> = ResilienceError::HttpStatus { status: 503 };
        assert_eq!(err.to_string(), "request failed with status 503");

        let err: ResilienceError<MyError> = ResilienceError::Cancelled;
        assert_eq!(err.to_string(), "operation cancelled");
    }

    #[test]
    fn application_error_accessors() {
        let err: ResilienceError<MyError> =
            ResilienceError::Application(MyError("oops".to_string()));
        assert!(err.is_application());
        assert_eq!(err.application_error().unwrap().0, "oops");

        let err: ResilienceError<MyError> = ResilienceError::Cancelled;
        assert!(err.application_error().is_none());
    }

    #[test]
    fn map_application_only_touches_that_variant() {
        let err: ResilienceError<MyError> =
            ResilienceError::Application(MyError("oops".to_string()));
        let mapped = err.map_application(|e| e.0.len());
        assert_eq!(mapped.application_error().copied(), Some(4));

        let err: ResilienceError<MyError> = ResilienceError::Transport("refused".into());
        let mapped = err.map_application(|e| e.0.len());
        assert!(mapped.is_transport());
    }

    #[test]
    fn predicates_are_mutually_exclusive() {
        let err: ResilienceError<MyError> = ResilienceError::Transport("refused".into());
        assert!(err.is_transport());
        assert!(!err.is_construction());
        assert!(!err.is_cancelled());
    }
}

//! The retry transport itself: a [`reqwest_middleware::Middleware`] that
//! repeatedly delegates to the inner transport until the policy declines
//! further attempts or the request is cancelled.

use crate::events::RetryEvent;
use crate::policy::{DefaultPolicy, RetryAttempt, RetryPolicy};
use crate::throttle;
use async_trait::async_trait;
use http::Extensions;
use reqwest::{Request, Response};
use reqwest_middleware::{Error as MiddlewareError, Middleware, Next, Result as MiddlewareResult};
use resilient_backoff::BackoffStrategy;
use resilient_core::EventListeners;
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tokio_util::sync::CancellationToken;

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_histogram, histogram};

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

/// A `reqwest_middleware` layer implementing the retry transport: it
/// retries idempotent requests against a [`RetryPolicy`], sleeping between
/// attempts according to a [`BackoffStrategy`] and any throttle hint the
/// server provides.
///
/// Install it with [`reqwest_middleware::ClientBuilder::with`].
pub struct RetryTransport<P = DefaultPolicy> {
    policy: Arc<P>,
    backoff: Arc<dyn BackoffStrategy>,
    event_listeners: EventListeners<RetryEvent>,
    name: String,
}

impl<P: RetryPolicy + 'static> RetryTransport<P> {
    /// Starts building a retry transport.
    pub fn builder() -> RetryTransportBuilder<P> {
        RetryTransportBuilder::new()
    }
}

async fn wait_for_cancellation(token: &Option<CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending::<()>().await,
    }
}

#[async_trait]
impl<P: RetryPolicy + 'static> Middleware for RetryTransport<P> {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> MiddlewareResult<Response> {
        let rewind_template = req.try_clone();
        let rewindable = rewind_template.is_some();
        let cancel = extensions.get::<CancellationToken>().cloned();

        let mut current = req;
        let mut attempt_count: u32 = 0;

        let outcome = loop {
            attempt_count += 1;
            let request_for_policy = current.try_clone();
            let result = next.clone().run(current, extensions).await;

            if !rewindable {
                break result;
            }

            let should_retry = {
                let request_ref = request_for_policy
                    .as_ref()
                    .expect("a rewindable request clones successfully");
                let attempt = RetryAttempt {
                    request: request_ref,
                    response: result.as_ref().ok(),
                    error: result.as_ref().err(),
                    count: attempt_count,
                };
                self.policy.should_retry(&attempt)
            };

            if !should_retry {
                break result;
            }

            let mut delay = self.backoff.next();
            match result {
                Ok(response) => {
                    if let Some(hint) = throttle::throttle_hint(response.headers(), SystemTime::now())
                    {
                        delay = delay.max(hint);
                    }
                    let _ = response.bytes().await;
                }
                Err(_) => {}
            }

            #[cfg(feature = "tracing")]
            debug!(retry = %self.name, attempt = attempt_count, delay = ?delay, "retrying request");

            #[cfg(feature = "metrics")]
            counter!("retry_attempts_total", "retry" => self.name.clone()).increment(1);

            self.event_listeners.emit(&RetryEvent::Retry {
                name: self.name.clone(),
                attempt: attempt_count,
                delay,
                timestamp: Instant::now(),
            });

            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = wait_for_cancellation(&cancel) => {
                        break Err(MiddlewareError::Middleware(anyhow::anyhow!(
                            "request cancelled during retry backoff"
                        )));
                    }
                }
            }

            current = rewind_template
                .as_ref()
                .expect("rewindable body guarantees clone succeeds")
                .try_clone()
                .expect("a request that cloned once clones again");
        };

        self.backoff.done();

        if outcome.is_ok() {
            #[cfg(feature = "tracing")]
            debug!(retry = %self.name, attempts = attempt_count, "request succeeded");

            #[cfg(feature = "metrics")]
            {
                counter!("retry_calls_total", "retry" => self.name.clone(), "result" => "success")
                    .increment(1);
                histogram!("retry_attempts", "retry" => self.name.clone())
                    .record(attempt_count as f64);
            }

            self.event_listeners.emit(&RetryEvent::Success {
                name: self.name.clone(),
                attempts: attempt_count,
                timestamp: Instant::now(),
            });
        } else {
            #[cfg(feature = "tracing")]
            warn!(retry = %self.name, attempts = attempt_count, "giving up after exhausting retries");

            #[cfg(feature = "metrics")]
            counter!("retry_calls_total", "retry" => self.name.clone(), "result" => "exhausted")
                .increment(1);

            self.event_listeners.emit(&RetryEvent::GiveUp {
                name: self.name.clone(),
                attempts: attempt_count,
                timestamp: Instant::now(),
            });
        }

        outcome
    }
}

/// Builds a [`RetryTransport`].
pub struct RetryTransportBuilder<P = DefaultPolicy> {
    policy: Option<Arc<P>>,
    backoff: Option<Arc<dyn BackoffStrategy>>,
    event_listeners: EventListeners<RetryEvent>,
    name: String,
}

impl<P: RetryPolicy + 'static> RetryTransportBuilder<P> {
    /// Creates a new, unconfigured builder.
    pub fn new() -> Self {
        Self {
            policy: None,
            backoff: None,
            event_listeners: EventListeners::new(),
            name: "retry-transport".to_string(),
        }
    }

    /// Sets the retry policy. Defaults to [`DefaultPolicy`].
    pub fn policy(mut self, policy: P) -> Self {
        self.policy = Some(Arc::new(policy));
        self
    }

    /// Sets the backoff strategy. Defaults to
    /// `resilient_backoff::BackoffOptions::new().build()`.
    pub fn backoff(mut self, backoff: Arc<dyn BackoffStrategy>) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Registers an event listener.
    pub fn on_event<L>(mut self, listener: L) -> Self
    where
        L: resilient_core::EventListener<RetryEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    /// Names this transport instance, surfaced on every emitted event.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builds the transport.
    pub fn build(self) -> RetryTransport<P>
    where
        P: Default,
    {
        #[cfg(feature = "metrics")]
        {
            describe_counter!(
                "retry_calls_total",
                "Total number of retried requests (success or exhausted)"
            );
            describe_counter!(
                "retry_attempts_total",
                "Total number of retry attempts across all requests"
            );
            describe_histogram!(
                "retry_attempts",
                "Number of attempts per successful request"
            );
        }

        RetryTransport {
            policy: self.policy.unwrap_or_else(|| Arc::new(P::default())),
            backoff: self
                .backoff
                .unwrap_or_else(|| resilient_backoff::BackoffOptions::new().build()),
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}

impl<P: RetryPolicy + Default + 'static> Default for RetryTransportBuilder<P> {
    fn default() -> Self {
        Self::new()
    }
}

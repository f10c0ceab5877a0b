//! The refresh cache controller itself.

use crate::entry::{CacheEntry, Ready};
use crate::lifetime::parse_cache_lifetime;
use crate::mapper::Mapper;
use crate::static_headers::StaticHeaders;
use async_trait::async_trait;
use http::HeaderMap;
use reqwest_middleware::ClientWithMiddleware;
use resilient_backoff::BackoffStrategy;
use resilient_retry::{RetryAttempt, RetryPolicy, RetryTransport};
use resilient_scheduler::Tick;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter};

/// TLS options passed through to the default client when no `http_client`
/// is supplied.
#[derive(Debug, Default, Clone)]
pub struct TlsOptions {
    /// Disables certificate verification. Intended for tests against a
    /// local server with a self-signed certificate; never enable this in
    /// production.
    pub danger_accept_invalid_certs: bool,
}

struct DynRetryPolicy(Arc<dyn RetryPolicy>);

impl RetryPolicy for DynRetryPolicy {
    fn should_retry(&self, attempt: &RetryAttempt<'_>) -> bool {
        self.0.should_retry(attempt)
    }
}

impl Default for DynRetryPolicy {
    fn default() -> Self {
        Self(Arc::new(resilient_retry::DefaultPolicy))
    }
}

fn build_default_client(timeout: Duration, tls: &TlsOptions) -> reqwest::Client {
    // reqwest has no separate TLS-handshake or response-header timeout, so
    // the connect budget doubles for both connect and TLS, and the overall
    // per-request timeout stands in for the response-header budget.
    let connect_timeout = timeout.div_f64(3.0);

    let mut builder = reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(timeout)
        .pool_max_idle_per_host(0)
        .tcp_keepalive(None);

    if tls.danger_accept_invalid_certs {
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder
        .build()
        .expect("default reqwest client configuration is always valid")
}

/// Maintains a single value `V`, derived from one remote resource fetched
/// over HTTP GET, kept approximately in sync with that resource's cache
/// lifetime. Implements [`Tick`] so a [`resilient_scheduler::Scheduler`]
/// can dispatch it directly.
pub struct RefreshCache<V, M> {
    url: String,
    mapper: Arc<M>,
    client: ClientWithMiddleware,
    min_interval: Duration,
    max_interval: Duration,
    entry: CacheEntry<V>,
    ready: Ready,
}

impl<V, M> RefreshCache<V, M>
where
    V: Clone + Send + Sync + 'static,
    M: Mapper<V> + 'static,
{
    /// Starts building a refresh cache for `url`, decoded with `mapper`.
    pub fn builder(url: impl Into<String>, mapper: M) -> RefreshCacheBuilder<V, M> {
        RefreshCacheBuilder::new(url, mapper)
    }

    /// Non-blocking snapshot of the current value and whether it has ever
    /// been populated.
    pub async fn get(&self) -> (Option<V>, bool) {
        self.entry.get().await
    }

    /// The readiness signal: closes once the first successful cycle
    /// completes.
    pub fn ready(&self) -> &Ready {
        &self.ready
    }
}

#[async_trait]
impl<V, M> Tick for RefreshCache<V, M>
where
    V: Clone + Send + Sync + 'static,
    M: Mapper<V> + Send + Sync + 'static,
{
    async fn run(&self, cancel: &CancellationToken) -> Duration {
        #[cfg(feature = "tracing")]
        tracing::info!(url = %self.url, "fetch start");

        let (etag, last_modified) = self.entry.validators().await;

        let mut request = self.client.get(&self.url);
        if !etag.is_empty() {
            request = request.header(http::header::IF_NONE_MATCH, etag);
        }
        if !last_modified.is_empty() {
            request = request.header(http::header::IF_MODIFIED_SINCE, last_modified);
        }
        request = request.with_extension(cancel.clone());

        let response = match request.send().await {
            Ok(response) => response,
            Err(reqwest_middleware::Error::Middleware(_)) => {
                // Our retry transport only raises a Middleware error on
                // cancellation; return silently, per the contract.
                #[cfg(feature = "metrics")]
                counter!("cache_refresh_total", "url" => self.url.clone(), "outcome" => "cancelled")
                    .increment(1);
                return self.min_interval;
            }
            Err(reqwest_middleware::Error::Reqwest(err)) => {
                #[cfg(feature = "tracing")]
                if err.is_builder() {
                    tracing::warn!(error = %err, "request creation failed");
                } else {
                    tracing::warn!(error = %err, "http error after retries");
                }
                #[cfg(not(feature = "tracing"))]
                let _ = err;
                #[cfg(feature = "metrics")]
                counter!("cache_refresh_total", "url" => self.url.clone(), "outcome" => "transport_error")
                    .increment(1);
                return self.min_interval;
            }
        };

        match response.status() {
            reqwest::StatusCode::NOT_MODIFIED => {
                #[cfg(feature = "tracing")]
                tracing::info!(url = %self.url, "resource unchanged");
                #[cfg(feature = "metrics")]
                counter!("cache_refresh_total", "url" => self.url.clone(), "outcome" => "unchanged")
                    .increment(1);
                self.ready.fire();
                parse_cache_lifetime(
                    response.headers(),
                    SystemTime::now(),
                    self.min_interval,
                    self.max_interval,
                )
            }
            reqwest::StatusCode::OK => {
                let headers = response.headers().clone();
                let bytes = match response.bytes().await {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(error = %err, "body read error");
                        #[cfg(not(feature = "tracing"))]
                        let _ = err;
                        #[cfg(feature = "metrics")]
                        counter!("cache_refresh_total", "url" => self.url.clone(), "outcome" => "body_error")
                            .increment(1);
                        return self.min_interval;
                    }
                };

                match self.mapper.map(&bytes) {
                    Ok(value) => {
                        let etag = header_str(&headers, http::header::ETAG);
                        let last_modified = header_str(&headers, http::header::LAST_MODIFIED);
                        self.entry.replace(value, etag, last_modified).await;
                        #[cfg(feature = "tracing")]
                        tracing::info!(url = %self.url, "resource updated");
                        #[cfg(feature = "metrics")]
                        counter!("cache_refresh_total", "url" => self.url.clone(), "outcome" => "updated")
                            .increment(1);
                        self.ready.fire();
                        parse_cache_lifetime(
                            &headers,
                            SystemTime::now(),
                            self.min_interval,
                            self.max_interval,
                        )
                    }
                    Err(err) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(error = %err, "parse error");
                        #[cfg(not(feature = "tracing"))]
                        let _ = err;
                        #[cfg(feature = "metrics")]
                        counter!("cache_refresh_total", "url" => self.url.clone(), "outcome" => "parse_error")
                            .increment(1);
                        self.min_interval
                    }
                }
            }
            status => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%status, "non-retriable status");
                #[cfg(not(any(feature = "tracing", feature = "metrics")))]
                let _ = status;
                #[cfg(feature = "metrics")]
                counter!(
                    "cache_refresh_total",
                    "url" => self.url.clone(),
                    "outcome" => "unexpected_status",
                    "status" => status.as_u16().to_string()
                )
                .increment(1);
                self.min_interval
            }
        }
    }
}

fn header_str(headers: &HeaderMap, name: http::HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

/// Builds a [`RefreshCache`].
pub struct RefreshCacheBuilder<V, M> {
    url: String,
    mapper: M,
    http_client: Option<reqwest::Client>,
    tls: TlsOptions,
    timeout: Duration,
    static_headers: HeaderMap,
    min_interval: Duration,
    max_interval: Duration,
    retry_policy: Option<Arc<dyn RetryPolicy>>,
    retry_backoff: Option<Arc<dyn BackoffStrategy>>,
    _value: std::marker::PhantomData<V>,
}

impl<V, M> RefreshCacheBuilder<V, M>
where
    V: Clone + Send + Sync + 'static,
    M: Mapper<V> + Send + Sync + 'static,
{
    fn new(url: impl Into<String>, mapper: M) -> Self {
        Self {
            url: url.into(),
            mapper,
            http_client: None,
            tls: TlsOptions::default(),
            timeout: Duration::from_secs(10),
            static_headers: HeaderMap::new(),
            min_interval: Duration::from_secs(30),
            max_interval: Duration::from_secs(3600),
            retry_policy: None,
            retry_backoff: None,
            _value: std::marker::PhantomData,
        }
    }

    /// Supplies a pre-built client instead of the default one. When set,
    /// `timeout` and `tls` are ignored; the client is still wrapped in the
    /// retry transport and the static-header injector.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// TLS options for the default client.
    pub fn tls(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }

    /// Per-request timeout budget for the default client.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Adds a header sent with every request, unless a conditional header
    /// of the same name is already present.
    pub fn static_header(mut self, name: http::HeaderName, value: http::HeaderValue) -> Self {
        self.static_headers.insert(name, value);
        self
    }

    /// The floor for the refresh delay, also used whenever a cycle fails.
    pub fn min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    /// The ceiling for the refresh delay.
    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    /// Overrides the retry policy used by the cache's internal retry
    /// transport. Defaults to [`resilient_retry::DefaultPolicy`].
    pub fn retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Overrides the backoff strategy used by the cache's internal retry
    /// transport.
    pub fn retry_backoff(mut self, backoff: Arc<dyn BackoffStrategy>) -> Self {
        self.retry_backoff = Some(backoff);
        self
    }

    /// Builds the cache.
    pub fn build(self) -> RefreshCache<V, M> {
        #[cfg(feature = "metrics")]
        describe_counter!(
            "cache_refresh_total",
            "Total number of refresh cycles, labeled by outcome"
        );

        let max_interval = self.max_interval.max(self.min_interval);
        let base_client = self
            .http_client
            .unwrap_or_else(|| build_default_client(self.timeout, &self.tls));

        let mut retry_builder = RetryTransport::<DynRetryPolicy>::builder()
            .name(format!("refresh-cache:{}", self.url));
        if let Some(policy) = self.retry_policy {
            retry_builder = retry_builder.policy(DynRetryPolicy(policy));
        }
        if let Some(backoff) = self.retry_backoff {
            retry_builder = retry_builder.backoff(backoff);
        }

        let client = reqwest_middleware::ClientBuilder::new(base_client)
            .with(retry_builder.build())
            .with(StaticHeaders(self.static_headers))
            .build();

        RefreshCache {
            url: self.url,
            mapper: Arc::new(self.mapper),
            client,
            min_interval: self.min_interval,
            max_interval,
            entry: CacheEntry::new(),
            ready: Ready::new(),
        }
    }
}

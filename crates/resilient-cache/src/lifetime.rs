//! Cache-lifetime derivation from response headers.

use http::HeaderMap;
use std::time::{Duration, SystemTime};

fn lifetime_from_headers(headers: &HeaderMap, now: SystemTime) -> Duration {
    if let Some(cache_control) = headers
        .get(http::header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
    {
        let directives: Vec<&str> = cache_control.split(',').map(str::trim).collect();

        if directives
            .iter()
            .any(|d| d.eq_ignore_ascii_case("no-store") || d.eq_ignore_ascii_case("no-cache"))
        {
            return Duration::ZERO;
        }

        for directive in &directives {
            let lower = directive.to_ascii_lowercase();
            if let Some(value) = lower.strip_prefix("max-age=") {
                if let Ok(seconds) = value.trim().parse::<i64>() {
                    return Duration::from_secs(seconds.max(0) as u64);
                }
            }
        }
    }

    if let Some(expires) = headers
        .get(http::header::EXPIRES)
        .and_then(|v| v.to_str().ok())
    {
        if let Ok(when) = httpdate::parse_http_date(expires) {
            return when.duration_since(now).unwrap_or(Duration::ZERO);
        }
    }

    Duration::ZERO
}

/// Derives the caching delay from response headers: `Cache-Control:
/// max-age` first, then `Expires`, `no-store`/`no-cache` yielding zero,
/// clamped to `[min_interval, max_interval]`.
pub fn parse_cache_lifetime(
    headers: &HeaderMap,
    now: SystemTime,
    min_interval: Duration,
    max_interval: Duration,
) -> Duration {
    lifetime_from_headers(headers, now).clamp(min_interval, max_interval)
}

//! Parsing of server-provided throttle hints.
//!
//! Honoured in precedence order: `Retry-After` first, then
//! `X-RateLimit-Remaining` / `X-RateLimit-Reset`.

use http::HeaderMap;
use std::time::{Duration, SystemTime};

/// Parses `Retry-After`, which is either an integer number of seconds or an
/// HTTP-date. Values that resolve to a point not in the future are treated
/// as "no hint".
pub fn parse_retry_after(headers: &HeaderMap, now: SystemTime) -> Option<Duration> {
    let raw = headers.get(http::header::RETRY_AFTER)?.to_str().ok()?;

    if let Ok(seconds) = raw.trim().parse::<i64>() {
        return if seconds > 0 {
            Some(Duration::from_secs(seconds as u64))
        } else {
            None
        };
    }

    let when = httpdate::parse_http_date(raw.trim()).ok()?;
    when.duration_since(now).ok()
}

/// Parses `X-RateLimit-Remaining: 0` combined with `X-RateLimit-Reset`
/// (epoch seconds). Returns `None` unless remaining is exactly zero and the
/// reset instant is still in the future.
pub fn parse_rate_limit_reset(headers: &HeaderMap, now: SystemTime) -> Option<Duration> {
    let remaining = headers.get("x-ratelimit-remaining")?.to_str().ok()?;
    if remaining.trim() != "0" {
        return None;
    }

    let reset_epoch: u64 = headers
        .get("x-ratelimit-reset")?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()?;

    let reset_at = SystemTime::UNIX_EPOCH + Duration::from_secs(reset_epoch);
    reset_at.duration_since(now).ok()
}

/// Resolves the throttle hint for a response: `Retry-After` wins, falling
/// back to the rate-limit headers.
pub fn throttle_hint(headers: &HeaderMap, now: SystemTime) -> Option<Duration> {
    parse_retry_after(headers, now).or_else(|| parse_rate_limit_reset(headers, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers_with(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(
                http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        headers
    }

    #[test]
    fn retry_after_seconds() {
        let headers = headers_with(&[("retry-after", "120")]);
        let now = SystemTime::now();
        assert_eq!(
            parse_retry_after(&headers, now),
            Some(Duration::from_secs(120))
        );
    }

    #[test]
    fn retry_after_zero_or_negative_is_no_hint() {
        let headers = headers_with(&[("retry-after", "0")]);
        assert_eq!(parse_retry_after(&headers, SystemTime::now()), None);
    }

    #[test]
    fn retry_after_http_date() {
        let now = SystemTime::now();
        let future = now + Duration::from_secs(60);
        let formatted = httpdate::fmt_http_date(future);
        let headers = headers_with(&[("retry-after", &formatted)]);

        let parsed = parse_retry_after(&headers, now).unwrap();
        // httpdate truncates to whole seconds.
        assert!(parsed.as_secs() >= 59 && parsed.as_secs() <= 60);
    }

    #[test]
    fn rate_limit_reset_requires_zero_remaining() {
        let now = SystemTime::now();
        let reset_epoch = now
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 30;
        let headers = headers_with(&[
            ("x-ratelimit-remaining", "1"),
            ("x-ratelimit-reset", &reset_epoch.to_string()),
        ]);
        assert_eq!(parse_rate_limit_reset(&headers, now), None);
    }

    #[test]
    fn rate_limit_reset_future_is_a_hint() {
        let now = SystemTime::now();
        let reset_epoch = now
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 30;
        let headers = headers_with(&[
            ("x-ratelimit-remaining", "0"),
            ("x-ratelimit-reset", &reset_epoch.to_string()),
        ]);
        let hint = parse_rate_limit_reset(&headers, now).unwrap();
        assert!(hint.as_secs() >= 29 && hint.as_secs() <= 30);
    }

    #[test]
    fn retry_after_takes_precedence_over_rate_limit_headers() {
        let now = SystemTime::now();
        let reset_epoch = now
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 999;
        let headers = headers_with(&[
            ("retry-after", "5"),
            ("x-ratelimit-remaining", "0"),
            ("x-ratelimit-reset", &reset_epoch.to_string()),
        ]);
        assert_eq!(throttle_hint(&headers, now), Some(Duration::from_secs(5)));
    }
}

//! Backoff strategy family for resilient-http.
//!
//! A [`BackoffStrategy`] hands out a delay for the next retry attempt and
//! advances its own internal state; [`BackoffStrategy::done`] resets that
//! state so the strategy is ready for a fresh top-level call. All four
//! provided strategies are safe for concurrent use.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A source of randomness in `[0, 1)`, the seam used by [`JitteredBackoff`].
///
/// Implementations must be safe to share across threads. Tests inject a
/// deterministic source instead of the default thread-local RNG.
pub trait RngSource: Send + Sync {
    /// Returns the next random value in `[0, 1)`.
    fn next_f64(&self) -> f64;
}

/// The default randomness source, backed by `rand::thread_rng()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngSource;

impl RngSource for ThreadRngSource {
    fn next_f64(&self) -> f64 {
        use rand::Rng;
        rand::thread_rng().gen_range(0.0..1.0)
    }
}

/// A strategy for computing delays between retry attempts.
pub trait BackoffStrategy: Send + Sync {
    /// Returns the delay for the upcoming attempt and advances internal
    /// state (e.g. an attempt counter).
    fn next(&self) -> Duration;

    /// Resets internal state so the next call to [`next`](Self::next)
    /// behaves as if this were a freshly constructed strategy.
    fn done(&self);

    /// The smallest delay this strategy can return.
    fn min_delay(&self) -> Duration;

    /// The largest delay this strategy can return.
    fn max_delay(&self) -> Duration;
}

/// Always returns the same delay.
#[derive(Debug)]
pub struct ConstantBackoff {
    delay: Duration,
}

impl ConstantBackoff {
    /// Creates a constant backoff returning `delay` for every attempt.
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl BackoffStrategy for ConstantBackoff {
    fn next(&self) -> Duration {
        self.delay
    }

    fn done(&self) {}

    fn min_delay(&self) -> Duration {
        self.delay
    }

    fn max_delay(&self) -> Duration {
        self.delay
    }
}

/// Grows linearly with the attempt number, clamped to `[min, max]`.
#[derive(Debug)]
pub struct LinearBackoff {
    min: Duration,
    max: Duration,
    attempt: AtomicU32,
}

impl LinearBackoff {
    /// Creates a linear backoff bounded by `min` and `max`.
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            attempt: AtomicU32::new(0),
        }
    }
}

impl BackoffStrategy for LinearBackoff {
    fn next(&self) -> Duration {
        let n = self.attempt.fetch_add(1, Ordering::SeqCst) as u64 + 1;
        let raw = self.min.saturating_mul(n as u32);
        raw.clamp(self.min, self.max)
    }

    fn done(&self) {
        self.attempt.store(0, Ordering::SeqCst);
    }

    fn min_delay(&self) -> Duration {
        self.min
    }

    fn max_delay(&self) -> Duration {
        self.max
    }
}

/// Grows exponentially with the attempt number, clamped to `[min, max]`.
#[derive(Debug)]
pub struct ExponentialBackoff {
    min: Duration,
    max: Duration,
    growth_factor: f64,
    attempt: AtomicU32,
}

impl ExponentialBackoff {
    /// Creates an exponential backoff. `growth_factor` must be greater
    /// than 1.0; callers typically go through [`BackoffOptions`] which
    /// enforces this via the constructor-selection rules.
    pub fn new(min: Duration, max: Duration, growth_factor: f64) -> Self {
        Self {
            min,
            max,
            growth_factor,
            attempt: AtomicU32::new(0),
        }
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn next(&self) -> Duration {
        let n = self.attempt.fetch_add(1, Ordering::SeqCst) + 1;
        let raw = self.min.as_secs_f64() * self.growth_factor.powi(n as i32);
        Duration::from_secs_f64(raw).clamp(self.min, self.max)
    }

    fn done(&self) {
        self.attempt.store(0, Ordering::SeqCst);
    }

    fn min_delay(&self) -> Duration {
        self.min
    }

    fn max_delay(&self) -> Duration {
        self.max
    }
}

/// Wraps an inner strategy and scales each delay down by a random fraction,
/// so concurrent clients retrying after the same failure don't all wake up
/// at once.
pub struct JitteredBackoff<B: BackoffStrategy> {
    inner: B,
    fraction: f64,
    rng: Arc<dyn RngSource>,
}

impl<B: BackoffStrategy> JitteredBackoff<B> {
    /// Wraps `inner`, scaling each returned delay by `1 - r * fraction` for
    /// a fresh `r` in `[0, 1)` drawn from `rng` on every call.
    pub fn new(inner: B, fraction: f64, rng: Arc<dyn RngSource>) -> Self {
        Self {
            inner,
            fraction: fraction.clamp(0.0, 1.0),
            rng,
        }
    }
}

impl<B: BackoffStrategy> BackoffStrategy for JitteredBackoff<B> {
    fn next(&self) -> Duration {
        let base = self.inner.next();
        let r = self.rng.next_f64();
        Duration::from_secs_f64(base.as_secs_f64() * (1.0 - r * self.fraction))
    }

    fn done(&self) {
        self.inner.done()
    }

    fn min_delay(&self) -> Duration {
        Duration::from_secs_f64(self.inner.min_delay().as_secs_f64() * (1.0 - self.fraction))
    }

    fn max_delay(&self) -> Duration {
        self.inner.max_delay()
    }
}

/// Builder implementing the backoff constructor-selection rules: pick
/// `min`, `max`, `growth_factor`, `jitter` and optionally a custom
/// [`RngSource`], then call [`build`](Self::build) to get the concrete
/// strategy those options select.
///
/// - `min >= max` selects [`ConstantBackoff`] (pinned at `max`).
/// - Otherwise `growth_factor <= 1.0` selects [`LinearBackoff`].
/// - Otherwise selects [`ExponentialBackoff`], wrapped in
///   [`JitteredBackoff`] when `jitter > 0.0`.
///
/// Negative `min`/`max` clamp to zero, `jitter` clamps to `[0, 1]`, and an
/// unset `rng` defaults to [`ThreadRngSource`].
#[derive(Default)]
pub struct BackoffOptions {
    min: Option<Duration>,
    max: Option<Duration>,
    growth_factor: Option<f64>,
    jitter: Option<f64>,
    rng: Option<Arc<dyn RngSource>>,
}

impl BackoffOptions {
    /// Creates a new, unconfigured builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the minimum delay. Negative durations are impossible in Rust's
    /// `Duration`, so this only ever clamps at `build()` time relative to
    /// `max`.
    pub fn min_delay(mut self, min: Duration) -> Self {
        self.min = Some(min);
        self
    }

    /// Sets the maximum delay.
    pub fn max_delay(mut self, max: Duration) -> Self {
        self.max = Some(max);
        self
    }

    /// Sets the growth factor used when the strategy is exponential.
    pub fn growth_factor(mut self, growth_factor: f64) -> Self {
        self.growth_factor = Some(growth_factor);
        self
    }

    /// Sets the jitter fraction, clamped to `[0, 1]` at build time.
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Supplies a custom randomness source for jittering.
    pub fn rng(mut self, rng: Arc<dyn RngSource>) -> Self {
        self.rng = Some(rng);
        self
    }

    /// Builds the strategy selected by the constructor-selection rules.
    pub fn build(self) -> Arc<dyn BackoffStrategy> {
        let min = self.min.unwrap_or(Duration::from_millis(100));
        let max = self.max.unwrap_or(Duration::from_secs(30));
        let growth_factor = self.growth_factor.unwrap_or(2.0);
        let jitter = self.jitter.unwrap_or(0.0).clamp(0.0, 1.0);
        let rng = self.rng.unwrap_or_else(|| Arc::new(ThreadRngSource));

        if min >= max {
            return Arc::new(ConstantBackoff::new(max));
        }

        if growth_factor <= 1.0 {
            return Arc::new(LinearBackoff::new(min, max));
        }

        let exponential = ExponentialBackoff::new(min, max, growth_factor);
        if jitter > 0.0 {
            Arc::new(JitteredBackoff::new(exponential, jitter, rng))
        } else {
            Arc::new(exponential)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_backoff_returns_same_duration() {
        let backoff = ConstantBackoff::new(Duration::from_millis(50));
        assert_eq!(backoff.next(), Duration::from_millis(50));
        assert_eq!(backoff.next(), Duration::from_millis(50));
        backoff.done();
        assert_eq!(backoff.next(), Duration::from_millis(50));
    }

    #[test]
    fn linear_backoff_grows_then_clamps() {
        let backoff = LinearBackoff::new(Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(backoff.next(), Duration::from_millis(100));
        assert_eq!(backoff.next(), Duration::from_millis(200));
        assert_eq!(backoff.next(), Duration::from_millis(300));
        assert_eq!(backoff.next(), Duration::from_millis(350));
    }

    #[test]
    fn exponential_backoff_grows() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10), 2.0);
        let first = backoff.next();
        let second = backoff.next();
        assert!(second > first, "expected {second:?} > {first:?}");
    }

    #[test]
    fn exponential_backoff_respects_max() {
        let backoff =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_millis(500), 2.0);
        for _ in 0..20 {
            assert!(backoff.next() <= Duration::from_millis(500));
        }
    }

    #[test]
    fn exponential_backoff_stays_in_bounds() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(50), Duration::from_secs(5), 3.0);
        for _ in 0..10 {
            let d = backoff.next();
            assert!(d >= backoff.min_delay());
            assert!(d <= backoff.max_delay());
        }
    }

    #[test]
    fn done_resets_to_fresh_construction_value() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10), 2.0);
        let first = backoff.next();
        backoff.next();
        backoff.next();
        backoff.done();
        let after_reset = backoff.next();
        assert_eq!(first, after_reset);
    }

    struct FixedRng(f64);

    impl RngSource for FixedRng {
        fn next_f64(&self) -> f64 {
            self.0
        }
    }

    #[test]
    fn jittered_backoff_never_exceeds_underlying() {
        let inner = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10), 2.0);
        let control = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10), 2.0);
        let jittered = JitteredBackoff::new(inner, 0.5, Arc::new(FixedRng(0.9)));

        for _ in 0..5 {
            let underlying = control.next();
            let jittered_value = jittered.next();
            assert!(jittered_value <= underlying);
        }
    }

    #[test]
    fn jittered_backoff_has_variance_across_rng_draws() {
        let low = JitteredBackoff::new(
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10), 2.0),
            0.5,
            Arc::new(FixedRng(0.0)),
        );
        let high = JitteredBackoff::new(
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10), 2.0),
            0.5,
            Arc::new(FixedRng(0.99)),
        );
        assert!(low.next() > high.next());
    }

    #[test]
    fn constructor_selects_constant_when_min_exceeds_max() {
        let backoff = BackoffOptions::new()
            .min_delay(Duration::from_secs(10))
            .max_delay(Duration::from_secs(1))
            .build();
        assert_eq!(backoff.next(), Duration::from_secs(1));
        assert_eq!(backoff.next(), Duration::from_secs(1));
    }

    #[test]
    fn constructor_selects_linear_when_growth_not_above_one() {
        let backoff = BackoffOptions::new()
            .min_delay(Duration::from_millis(100))
            .max_delay(Duration::from_secs(1))
            .growth_factor(1.0)
            .build();
        let first = backoff.next();
        let second = backoff.next();
        assert!(second >= first);
        assert!(second <= Duration::from_secs(1));
    }

    #[test]
    fn constructor_selects_exponential_without_jitter() {
        let backoff = BackoffOptions::new()
            .min_delay(Duration::from_millis(100))
            .max_delay(Duration::from_secs(1))
            .growth_factor(2.0)
            .build();
        let first = backoff.next();
        let second = backoff.next();
        assert!(second >= first);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn arb_bounds() -> impl Strategy<Value = (u64, u64)> {
            (10u64..1_000, 1_000u64..60_000)
        }

        fn arb_growth_factor() -> impl Strategy<Value = f64> {
            1.01f64..8.0
        }

        fn arb_fraction() -> impl Strategy<Value = f64> {
            0.0f64..1.0
        }

        proptest! {
            /// Every exponential instance stays within [min, max] regardless
            /// of how many attempts it has served.
            #[test]
            fn exponential_instance_stays_within_bounds(
                (min_ms, max_ms) in arb_bounds(),
                growth_factor in arb_growth_factor(),
                attempts in 1usize..50,
            ) {
                let backoff = ExponentialBackoff::new(
                    Duration::from_millis(min_ms),
                    Duration::from_millis(max_ms),
                    growth_factor,
                );
                for _ in 0..attempts {
                    let delay = backoff.next();
                    prop_assert!(delay >= backoff.min_delay());
                    prop_assert!(delay <= backoff.max_delay());
                }
            }

            /// A jittered strategy never returns a delay larger than its
            /// underlying strategy would have, for any RNG draw.
            #[test]
            fn jittered_strategy_never_exceeds_underlying_for_any_draw(
                (min_ms, max_ms) in arb_bounds(),
                growth_factor in arb_growth_factor(),
                fraction in arb_fraction(),
                draw in arb_fraction(),
            ) {
                let control = ExponentialBackoff::new(
                    Duration::from_millis(min_ms),
                    Duration::from_millis(max_ms),
                    growth_factor,
                );
                let jittered = JitteredBackoff::new(
                    ExponentialBackoff::new(
                        Duration::from_millis(min_ms),
                        Duration::from_millis(max_ms),
                        growth_factor,
                    ),
                    fraction,
                    Arc::new(FixedRng(draw)),
                );

                prop_assert!(jittered.next() <= control.next());
            }

            /// The constructor-selection rules always pick a strategy whose
            /// bounds match the requested min/max, whatever growth factor
            /// is requested.
            #[test]
            fn constructor_selection_respects_requested_bounds(
                (min_ms, max_ms) in arb_bounds(),
                growth_factor in 0.0f64..8.0,
            ) {
                let backoff = BackoffOptions::new()
                    .min_delay(Duration::from_millis(min_ms))
                    .max_delay(Duration::from_millis(max_ms))
                    .growth_factor(growth_factor)
                    .build();

                for _ in 0..10 {
                    let delay = backoff.next();
                    prop_assert!(delay <= Duration::from_millis(max_ms));
                }
            }
        }
    }

    #[test]
    fn constructor_wraps_exponential_in_jitter_when_requested() {
        let backoff = BackoffOptions::new()
            .min_delay(Duration::from_millis(100))
            .max_delay(Duration::from_secs(10))
            .growth_factor(2.0)
            .jitter(0.5)
            .rng(Arc::new(FixedRng(0.5)))
            .build();
        // underlying exponential at n=1 would be 200ms; jitter with r=0.5,
        // fraction=0.5 scales by (1 - 0.25) = 0.75.
        let value = backoff.next();
        assert!(value < Duration::from_millis(200));
    }
}

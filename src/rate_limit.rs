//! Per-identifier rate limiting for tag sightings.
//!
//! Readers report the same tag many times per second while it sits on the
//! antenna. The limiter lets one sighting per identifier through per window
//! and rejects the rest, so downstream clients see each tap once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Default rate window used by every source.
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_millis(5000);

/// A rate limiter keyed by identifier string.
///
/// Each identifier is tracked independently. The first sighting is always
/// accepted; later ones are accepted once at least `window` has elapsed since
/// the last accepted one. Rejected sightings do not move the timer.
///
/// Timestamps are milliseconds on a caller-chosen monotonic clock. Entries
/// older than the window are swept at most once per window, which never
/// changes a decision since an expired entry and a missing one both accept.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum time between accepted sightings of one identifier
    window: Duration,
    /// Last accepted time for each identifier, in milliseconds
    last_seen: HashMap<String, u64>,
    /// Time of the last expiry sweep
    last_sweep: u64,
}

impl RateLimiter {
    /// Create a limiter with the given window.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use tag_bridge::rate_limit::RateLimiter;
    ///
    /// let mut limiter = RateLimiter::new(Duration::from_millis(5000));
    /// assert!(limiter.accept("ABCD", 0));
    /// assert!(!limiter.accept("ABCD", 4999));
    /// assert!(limiter.accept("ABCD", 5000));
    /// ```
    pub fn new(window: Duration) -> Self {
        RateLimiter {
            window,
            last_seen: HashMap::new(),
            last_sweep: 0,
        }
    }

    /// The configured window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Decide whether a sighting of `id` at `now` (ms) is accepted.
    ///
    /// Returns `true` and records `now` when there is no prior entry or at
    /// least one window has passed since the last accepted sighting.
    /// Returns `false` without touching state otherwise.
    pub fn accept(&mut self, id: &str, now: u64) -> bool {
        let window = self.window_millis();
        self.sweep(now, window);

        match self.last_seen.get_mut(id) {
            Some(last) if now.saturating_sub(*last) < window => false,
            Some(last) => {
                *last = now;
                true
            }
            None => {
                self.last_seen.insert(id.to_string(), now);
                true
            }
        }
    }

    /// Number of identifiers currently remembered.
    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    /// Returns `true` if no identifier is remembered.
    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }

    fn window_millis(&self) -> u64 {
        u64::try_from(self.window.as_millis()).unwrap_or(u64::MAX)
    }

    fn sweep(&mut self, now: u64, window: u64) {
        if now.saturating_sub(self.last_sweep) < window {
            return;
        }
        self.last_seen
            .retain(|_, last| now.saturating_sub(*last) < window);
        self.last_sweep = now;
    }
}

/// A [`RateLimiter`] that can be shared between sources running on different
/// tasks or threads.
///
/// Cloning yields a handle to the same limiter; two sources holding clones
/// suppress each other's duplicates. The check-and-record step runs under one
/// lock so concurrent sightings of the same identifier cannot both pass.
#[derive(Debug, Clone)]
pub struct SharedRateLimiter {
    inner: Arc<Mutex<RateLimiter>>,
    epoch: Instant,
}

impl SharedRateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RateLimiter::new(window))),
            epoch: Instant::now(),
        }
    }

    /// Accept or reject a sighting at an explicit time (ms).
    pub fn accept_at(&self, id: &str, now: u64) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .accept(id, now)
    }

    /// Accept or reject a sighting using the limiter's monotonic clock.
    pub fn accept(&self, id: &str) -> bool {
        let now = u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.accept_at(id, now)
    }

    /// The configured window.
    pub fn window(&self) -> Duration {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .window()
    }

    /// Returns `true` if both handles point at the same limiter.
    pub fn same_limiter(&self, other: &SharedRateLimiter) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Parse a duration from a human-readable string.
///
/// Supports the following suffixes:
/// - `ms` or no suffix: milliseconds
/// - `s`: seconds
/// - `m`: minutes
/// - `h`: hours
///
/// A bare number is milliseconds so that `*_RATE_MS=5000` style environment
/// values work unchanged.
///
/// # Examples
/// ```
/// use tag_bridge::rate_limit::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("5000").unwrap(), Duration::from_millis(5000));
/// assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
/// assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();

    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    if let Some(num) = src.strip_suffix("ms") {
        return parse_number(num, "milliseconds").map(Duration::from_millis);
    }

    if let Some(num) = src.strip_suffix('h') {
        return parse_number(num, "hours").and_then(|h| {
            h.checked_mul(3600)
                .map(Duration::from_secs)
                .ok_or_else(|| format!("invalid hours: {}", num))
        });
    }

    if let Some(num) = src.strip_suffix('m') {
        return parse_number(num, "minutes").and_then(|m| {
            m.checked_mul(60)
                .map(Duration::from_secs)
                .ok_or_else(|| format!("invalid minutes: {}", num))
        });
    }

    if let Some(num) = src.strip_suffix('s') {
        return parse_number(num, "seconds").map(Duration::from_secs);
    }

    src.parse()
        .map(Duration::from_millis)
        .map_err(|_| format!("invalid duration: {}", src))
}

fn parse_number(num: &str, unit: &str) -> Result<u64, String> {
    num.trim()
        .parse()
        .map_err(|_| format!("invalid {}: {}", unit, num))
}

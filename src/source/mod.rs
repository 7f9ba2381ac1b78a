//! Ingestion source adapters.
//!
//! Every adapter turns its own input (advertisements, serial lines, gateway
//! messages) into [`NormalizedEvent`](crate::event::NormalizedEvent)s, gates
//! them through a rate limiter and hands them to the broadcaster. Malformed
//! input is dropped silently; it is expected noise from the radio and readers.

pub mod ble;
pub mod gateway;
pub mod serial;

use crate::rate_limit::SharedRateLimiter;
use std::time::Duration;

/// How rate limiters are assigned to sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LimiterScope {
    /// Each source suppresses only its own duplicates
    #[default]
    PerSource,
    /// One limiter for all sources; a tag seen over BLE is also suppressed
    /// on serial and vice versa
    Shared,
}

/// Rate windows per source, resolved from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindows {
    /// Base window, also used by the shared limiter
    pub base: Duration,
    pub ble: Duration,
    pub serial: Duration,
    pub gateway: Duration,
}

impl RateWindows {
    /// All sources use the same window.
    pub fn uniform(window: Duration) -> Self {
        Self {
            base: window,
            ble: window,
            serial: window,
            gateway: window,
        }
    }
}

/// The limiter each source uses.
///
/// The gateway path has no limiter unless asked for, matching a relay that
/// forwards everything it is told.
#[derive(Debug, Clone)]
pub struct Limiters {
    pub ble: SharedRateLimiter,
    pub serial: SharedRateLimiter,
    pub gateway: Option<SharedRateLimiter>,
}

impl Limiters {
    pub fn new(scope: LimiterScope, windows: RateWindows, limit_gateway: bool) -> Self {
        match scope {
            LimiterScope::PerSource => Self {
                ble: SharedRateLimiter::new(windows.ble),
                serial: SharedRateLimiter::new(windows.serial),
                gateway: limit_gateway.then(|| SharedRateLimiter::new(windows.gateway)),
            },
            LimiterScope::Shared => {
                let shared = SharedRateLimiter::new(windows.base);
                Self {
                    ble: shared.clone(),
                    serial: shared.clone(),
                    gateway: limit_gateway.then_some(shared),
                }
            }
        }
    }
}

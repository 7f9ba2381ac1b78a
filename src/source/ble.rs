//! BLE source: beacon advertisements to `ble` and `nfc` events.

use crate::beacon::{self, BeaconClass};
use crate::broadcast::Broadcaster;
use crate::event::{Device, NormalizedEvent, RawBleEvent};
use crate::rate_limit::SharedRateLimiter;
use crate::scanner::Advertisement;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

/// Default company id filter.
pub const DEFAULT_COMPANY_ID: u16 = 0xFFFF;

/// Turns advertisements from one vendor into events.
#[derive(Debug, Clone)]
pub struct BleAdapter {
    company_id: u16,
    limiter: SharedRateLimiter,
    broadcaster: Broadcaster,
}

impl BleAdapter {
    pub fn new(company_id: u16, limiter: SharedRateLimiter, broadcaster: Broadcaster) -> Self {
        Self {
            company_id,
            limiter,
            broadcaster,
        }
    }

    /// Process one advertisement.
    ///
    /// - Payloads from other vendors (or shorter than the company id) are ignored.
    /// - Idle beacons are ignored.
    /// - Everything else is published as a raw `ble` event, with `uid` set when
    ///   an identifier was extracted. The radio reports the same beacon many
    ///   times and this event is not rate limited.
    /// - Extracted identifiers accepted by the rate limiter are published as
    ///   an `nfc` event, which is also returned.
    pub fn handle(&self, advertisement: &Advertisement) -> Option<NormalizedEvent> {
        let payload = &advertisement.manufacturer_data;
        if beacon::company_id(payload) != Some(self.company_id) {
            return None;
        }

        let class = beacon::classify(payload);
        if class == BeaconClass::Idle {
            trace!(address = ?advertisement.address, "idle beacon");
            return None;
        }

        let uid = class.identifier().cloned();
        self.broadcaster.publish_ble(RawBleEvent {
            bytes: payload.clone(),
            uid: uid.clone(),
        });

        let id = uid?;
        if !self.limiter.accept(id.as_str()) {
            debug!(%id, "BLE sighting rate limited");
            return None;
        }

        info!(%id, address = advertisement.address.as_deref().unwrap_or("unknown"), "BLE UID");
        let event = NormalizedEvent::now(id, Device::Ble);
        self.broadcaster.publish_nfc(event.clone());
        Some(event)
    }

    /// Process advertisements until the scanner closes its channel.
    pub async fn run(self, mut advertisements: mpsc::Receiver<Advertisement>) {
        info!(company_id = %format!("0x{:04X}", self.company_id), "BLE bridge initialized");
        while let Some(advertisement) = advertisements.recv().await {
            self.handle(&advertisement);
        }
        info!("BLE scanner closed, BLE bridge inactive");
    }
}

/// Parse a company id given as `0x`-prefixed hex or decimal.
///
/// # Example
/// ```
/// use tag_bridge::source::ble::parse_company_id;
///
/// assert_eq!(parse_company_id("0xFFFF").unwrap(), 0xFFFF);
/// assert_eq!(parse_company_id("1177").unwrap(), 0x0499);
/// ```
pub fn parse_company_id(src: &str) -> Result<u16, String> {
    let src = src.trim();
    let parsed = match src.strip_prefix("0x").or_else(|| src.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => src.parse(),
    };
    parsed.map_err(|_| format!("invalid company id: {}", src))
}

//! Events published to subscribers.

use crate::identifier::Identifier;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// The ingestion source a sighting came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Ble,
    Serial,
    Gateway,
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Ble => write!(f, "ble"),
            Device::Serial => write!(f, "serial"),
            Device::Gateway => write!(f, "gateway"),
        }
    }
}

/// One accepted tag sighting, normalized across sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedEvent {
    /// Uppercase hex identifier
    pub id: Identifier,
    /// Receipt time in milliseconds since the Unix epoch
    pub ts: i64,
    /// Source that reported the sighting
    pub device: Device,
}

impl NormalizedEvent {
    /// Create an event stamped with the current wall-clock time.
    pub fn now(id: Identifier, device: Device) -> Self {
        Self {
            id,
            ts: unix_millis(SystemTime::now()),
            device,
        }
    }
}

/// Unprocessed BLE manufacturer data, for clients wanting raw access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawBleEvent {
    /// Full manufacturer data including the company id prefix
    pub bytes: Vec<u8>,
    /// Identifier extracted from the bytes, if any
    pub uid: Option<Identifier>,
}

/// Which subscriber endpoint a frame is delivered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// `nfc` and `ble` events
    Public,
    /// Relayed gateway `uid` messages
    Stream,
}

/// A message on a subscriber socket, encoded as `{"event": .., "data": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum Frame {
    /// Welcome acknowledgment sent on connect
    Hello { ok: bool },
    Nfc(NormalizedEvent),
    Ble(RawBleEvent),
    /// Gateway payload forwarded verbatim
    Uid(serde_json::Value),
}

impl Frame {
    pub fn hello() -> Self {
        Frame::Hello { ok: true }
    }

    /// The channel this frame is published on. `Hello` is sent directly to a
    /// single socket and is never published.
    pub fn channel(&self) -> Channel {
        match self {
            Frame::Hello { .. } | Frame::Uid(_) => Channel::Stream,
            Frame::Nfc(_) | Frame::Ble(_) => Channel::Public,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Milliseconds since the Unix epoch; clocks before the epoch read as 0.
pub fn unix_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

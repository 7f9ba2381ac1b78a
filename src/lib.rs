//! `tag-bridge` library.
//!
//! Normalizes tag sightings from three sources (BLE beacons, a serial NFC
//! reader and remote gateways) into one deduplicated event stream served
//! over WebSockets.
//!
//! The binary (`src/main.rs`) is responsible for logging setup, signals and
//! process exit codes. The pipeline itself lives in [`crate::app`] where it
//! can be tested deterministically with an injected scanner.

pub mod app;
pub mod beacon;
pub mod broadcast;
pub mod event;
pub mod identifier;
pub mod logging;
pub mod rate_limit;
pub mod scanner;
pub mod server;
pub mod source;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use app::{Options, Profile, RunError};
pub use beacon::{BeaconClass, classify, extract_uid, is_idle};
pub use broadcast::Broadcaster;
pub use event::{Device, Frame, NormalizedEvent, RawBleEvent};
pub use identifier::{Identifier, ParseIdentifierError};
pub use rate_limit::{RateLimiter, SharedRateLimiter, parse_duration};
pub use scanner::{Advertisement, ScanError};

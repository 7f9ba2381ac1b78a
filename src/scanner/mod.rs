//! BLE advertisement scanning.
//!
//! The scanner only delivers raw manufacturer data; filtering by company id
//! and identifier extraction happen in the BLE source adapter, so any backend
//! (or a fake one in tests) feeds the same pipeline.

#[cfg(feature = "bluer")]
pub mod bluer;

use thiserror::Error;
use tokio::sync::mpsc;

/// Channel buffer size for discovered advertisements.
pub const ADVERTISEMENT_CHANNEL_BUFFER_SIZE: usize = 100;

/// Manufacturer-specific data seen in one advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Address of the advertising device, for logging
    pub address: Option<String>,
    /// Little-endian company id followed by the vendor payload
    pub manufacturer_data: Vec<u8>,
}

impl Advertisement {
    /// Rebuild the on-air byte layout from a company id and its data, as
    /// BlueZ reports them split apart.
    pub fn from_parts(address: Option<String>, company_id: u16, data: &[u8]) -> Self {
        let mut manufacturer_data = Vec::with_capacity(data.len() + 2);
        manufacturer_data.extend_from_slice(&company_id.to_le_bytes());
        manufacturer_data.extend_from_slice(data);
        Self {
            address,
            manufacturer_data,
        }
    }
}

/// Error type for scanner operations.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    /// Backend not available (not compiled in)
    #[allow(dead_code)]
    #[error("Backend '{0}' not available (not compiled in)")]
    BackendNotAvailable(String),
}

/// Start scanning with the compiled-in radio backend.
///
/// Returns a receiver of advertisements. Scanning follows the adapter's power
/// state and ends when the receiver is dropped.
pub async fn start_scan() -> Result<mpsc::Receiver<Advertisement>, ScanError> {
    #[cfg(feature = "bluer")]
    return bluer::start_scan().await;
    #[cfg(not(feature = "bluer"))]
    return Err(ScanError::BackendNotAvailable("bluer".into()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_prefixes_company_id() {
        let adv = Advertisement::from_parts(Some("AA:BB".into()), 0x0499, b"UID:12");
        assert_eq!(
            adv.manufacturer_data,
            vec![0x99, 0x04, b'U', b'I', b'D', b':', b'1', b'2']
        );
    }

    #[test]
    fn test_scan_error_display() {
        let err = ScanError::Bluetooth("adapter missing".to_string());
        assert_eq!(format!("{}", err), "Bluetooth error: adapter missing");

        let err = ScanError::BackendNotAvailable("bluer".to_string());
        assert_eq!(
            format!("{}", err),
            "Backend 'bluer' not available (not compiled in)"
        );
    }
}

//! Tag identifier extraction from BLE manufacturer-specific data.
//!
//! Beacons carry the tag identifier as ASCII text after a `UID:` marker, or
//! announce that no tag is present with an `IDLE` marker. Markers are matched
//! as raw bytes because the rest of the payload (the company id prefix in
//! particular) is not text.

use crate::identifier::Identifier;

/// Payloads shorter than this are never inspected.
///
/// Both markers are 4 bytes and a 2-byte company id precedes them.
pub const MIN_PAYLOAD_LEN: usize = 6;

/// Marker of a beacon announcing that no tag is present.
pub const IDLE_MARKER: [u8; 4] = *b"IDLE";

/// Marker preceding the hex identifier.
pub const UID_MARKER: [u8; 4] = *b"UID:";

/// Result of inspecting one advertisement payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeaconClass {
    /// The payload contains the idle marker.
    Idle,
    /// An identifier followed the `UID:` marker.
    Identified(Identifier),
    /// Too short, no marker, or a marker with no hex after it.
    Unrecognized,
}

impl BeaconClass {
    /// The identifier, if one was extracted.
    pub fn identifier(&self) -> Option<&Identifier> {
        match self {
            BeaconClass::Identified(id) => Some(id),
            _ => None,
        }
    }
}

/// Classify a manufacturer data payload.
///
/// The idle check wins over identifier extraction: an idle payload is never
/// reported as identified even if it also contains `UID:`.
///
/// # Example
/// ```
/// use tag_bridge::beacon::{BeaconClass, classify};
///
/// let class = classify(b"\xFF\xFFUID:1a2B9Z");
/// assert_eq!(class.identifier().map(|id| id.as_str()), Some("1A2B9"));
/// assert_eq!(classify(b"\xFF\xFFIDLE UID:12"), BeaconClass::Idle);
/// ```
pub fn classify(payload: &[u8]) -> BeaconClass {
    if payload.len() < MIN_PAYLOAD_LEN {
        return BeaconClass::Unrecognized;
    }

    if is_idle(payload) {
        return BeaconClass::Idle;
    }

    match extract_uid(payload) {
        Some(id) => BeaconClass::Identified(id),
        None => BeaconClass::Unrecognized,
    }
}

/// Returns `true` if the payload contains the `IDLE` marker at any offset.
pub fn is_idle(payload: &[u8]) -> bool {
    payload.len() >= MIN_PAYLOAD_LEN && find_marker(payload, &IDLE_MARKER).is_some()
}

/// Extract the identifier following the first `UID:` marker.
///
/// Reads hex digit bytes (either case) up to the first non-hex byte or the
/// end of the payload and returns them uppercased. Returns `None` for short
/// payloads, a missing marker, or a marker not followed by any hex digit.
/// Later markers are never consulted.
pub fn extract_uid(payload: &[u8]) -> Option<Identifier> {
    if payload.len() < MIN_PAYLOAD_LEN {
        return None;
    }

    let start = find_marker(payload, &UID_MARKER)? + UID_MARKER.len();
    let uid: String = payload[start..]
        .iter()
        .take_while(|b| b.is_ascii_hexdigit())
        .map(|b| char::from(b.to_ascii_uppercase()))
        .collect();

    if uid.is_empty() {
        None
    } else {
        Some(Identifier::from_normalized(uid))
    }
}

/// Read the little-endian company id from the first two payload bytes.
pub fn company_id(payload: &[u8]) -> Option<u16> {
    match payload {
        [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
        _ => None,
    }
}

fn find_marker(payload: &[u8], marker: &[u8; 4]) -> Option<usize> {
    payload.windows(marker.len()).position(|w| w == marker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TEST_COMPANY_ID, manufacturer_payload};

    fn uid_of(payload: &[u8]) -> Option<String> {
        extract_uid(payload).map(|id| id.as_str().to_string())
    }

    #[test]
    fn test_extract_stops_at_non_hex() {
        let payload = manufacturer_payload(TEST_COMPANY_ID, b"UID:1a2B9Z");
        assert_eq!(uid_of(&payload), Some("1A2B9".to_string()));
    }

    #[test]
    fn test_extract_reads_to_end() {
        let payload = manufacturer_payload(TEST_COMPANY_ID, b"UID:04a1b2c3d4e5f6");
        assert_eq!(uid_of(&payload), Some("04A1B2C3D4E5F6".to_string()));
    }

    #[test]
    fn test_extract_marker_at_end_fails() {
        let payload = manufacturer_payload(TEST_COMPANY_ID, b"xxUID:");
        assert_eq!(uid_of(&payload), None);
        assert_eq!(classify(&payload), BeaconClass::Unrecognized);
    }

    #[test]
    fn test_extract_marker_followed_by_non_hex_fails() {
        let payload = manufacturer_payload(TEST_COMPANY_ID, b"UID:zz12");
        assert_eq!(uid_of(&payload), None);
    }

    #[test]
    fn test_extract_uses_first_marker_only() {
        // First marker yields nothing, the second is never consulted.
        let payload = manufacturer_payload(TEST_COMPANY_ID, b"UID:-UID:ABCD");
        assert_eq!(uid_of(&payload), None);

        let payload = manufacturer_payload(TEST_COMPANY_ID, b"UID:12 UID:ABCD");
        assert_eq!(uid_of(&payload), Some("12".to_string()));
    }

    #[test]
    fn test_extract_marker_after_binary_bytes() {
        let mut payload = vec![0xFF, 0xFF, 0x00, 0x80, 0xFE];
        payload.extend_from_slice(b"UID:c0ffee");
        payload.push(0x00);
        assert_eq!(uid_of(&payload), Some("C0FFEE".to_string()));
    }

    #[test]
    fn test_idle_anywhere() {
        assert!(is_idle(&manufacturer_payload(TEST_COMPANY_ID, b"IDLE")));
        assert!(is_idle(&manufacturer_payload(TEST_COMPANY_ID, b"\x01\x02IDLE\x03")));
        assert!(!is_idle(&manufacturer_payload(TEST_COMPANY_ID, b"IDL")));
        assert!(!is_idle(&manufacturer_payload(TEST_COMPANY_ID, b"idle")));
    }

    #[test]
    fn test_idle_wins_over_uid() {
        let payload = manufacturer_payload(TEST_COMPANY_ID, b"UID:ABCDIDLE");
        assert_eq!(classify(&payload), BeaconClass::Idle);

        let payload = manufacturer_payload(TEST_COMPANY_ID, b"IDLEUID:ABCD");
        assert_eq!(classify(&payload), BeaconClass::Idle);
    }

    #[test]
    fn test_short_payload_unrecognized() {
        // "IDLE" fits, but five bytes are below the minimum.
        assert_eq!(classify(b"IDLE!"), BeaconClass::Unrecognized);
        assert!(!is_idle(b"IDLE!"));
        assert_eq!(classify(b"UID:1"), BeaconClass::Unrecognized);
        assert_eq!(classify(b""), BeaconClass::Unrecognized);
    }

    #[test]
    fn test_six_byte_payload_inspected() {
        assert_eq!(classify(b"UID:1A").identifier().map(|id| id.as_str()), Some("1A"));
        assert_eq!(classify(b"xxIDLE"), BeaconClass::Idle);
    }

    #[test]
    fn test_no_marker_unrecognized() {
        let payload = manufacturer_payload(TEST_COMPANY_ID, b"hello world");
        assert_eq!(classify(&payload), BeaconClass::Unrecognized);
    }

    #[test]
    fn test_company_id_little_endian() {
        assert_eq!(company_id(&[0x99, 0x04, 0x05]), Some(0x0499));
        assert_eq!(company_id(&[0xFF, 0xFF]), Some(0xFFFF));
        assert_eq!(company_id(&[0xFF]), None);
        assert_eq!(company_id(&[]), None);
    }
}

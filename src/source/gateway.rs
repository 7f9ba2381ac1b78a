//! Gateway relay: sightings forwarded by a trusted remote reader process.
//!
//! A gateway authenticates with a shared secret when it connects and then
//! sends `uid` messages. Each accepted message is relayed verbatim to the
//! stream subscribers and re-emitted as an `nfc` event stamped with the
//! bridge's own receipt time.

use crate::broadcast::Broadcaster;
use crate::event::{Device, NormalizedEvent};
use crate::identifier::Identifier;
use crate::rate_limit::SharedRateLimiter;
use serde::Deserialize;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, info};

/// Query parameter carrying the token.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Header carrying the token.
pub const TOKEN_HEADER: &str = "x-gateway-token";

/// Why a gateway connection was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("gateway channel disabled: no token configured")]
    NotConfigured,
}

/// Tokens a connecting gateway presented, one per supported location.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PresentedToken<'a> {
    /// `Authorization: Bearer <token>`
    pub credential: Option<&'a str>,
    /// `?token=<token>`
    pub query: Option<&'a str>,
    /// `x-gateway-token: <token>`
    pub header: Option<&'a str>,
}

impl<'a> PresentedToken<'a> {
    /// The token to check: the first location present, in priority order
    /// credential, query, header. Empty values count as absent.
    pub fn effective(&self) -> Option<&'a str> {
        [self.credential, self.query, self.header]
            .into_iter()
            .flatten()
            .find(|t| !t.is_empty())
    }
}

/// An inbound gateway message: `{"event": "uid", "data": {"uid": ..}}`.
#[derive(Debug, Deserialize)]
struct InboundFrame {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Authenticates gateways and relays their sightings.
#[derive(Debug, Clone)]
pub struct GatewayRelay {
    secret: Option<String>,
    limiter: Option<SharedRateLimiter>,
    broadcaster: Broadcaster,
}

impl GatewayRelay {
    /// Create a relay. Without a secret every gateway is refused.
    pub fn new(
        secret: Option<String>,
        limiter: Option<SharedRateLimiter>,
        broadcaster: Broadcaster,
    ) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            limiter,
            broadcaster,
        }
    }

    /// Returns `true` if gateways can authenticate at all.
    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Check a connecting gateway's token against the shared secret.
    pub fn authorize(&self, presented: &PresentedToken<'_>) -> Result<(), RelayError> {
        let secret = self.secret.as_deref().ok_or(RelayError::NotConfigured)?;
        match presented.effective() {
            Some(token) if constant_time_eq(token.as_bytes(), secret.as_bytes()) => Ok(()),
            _ => Err(RelayError::Unauthorized),
        }
    }

    /// Handle one text message from an authenticated gateway.
    ///
    /// Messages that are not JSON, are not `uid` events, or lack a hex `uid`
    /// string are dropped without a reply. Returns the `nfc` event emitted.
    pub fn handle_message(&self, text: &str) -> Option<NormalizedEvent> {
        let frame: InboundFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "dropping malformed gateway message");
                return None;
            }
        };
        if frame.event != "uid" {
            debug!(event = %frame.event, "ignoring gateway event");
            return None;
        }
        self.handle_sighting(frame.data)
    }

    /// Relay a sighting payload; see [`GatewayRelay::handle_message`].
    pub fn handle_sighting(&self, payload: serde_json::Value) -> Option<NormalizedEvent> {
        let id: Identifier = payload.get("uid")?.as_str()?.parse().ok()?;

        if let Some(limiter) = &self.limiter
            && !limiter.accept(id.as_str())
        {
            debug!(%id, "gateway sighting rate limited");
            return None;
        }

        info!(%id, "gateway UID");
        self.broadcaster.publish_uid(payload);
        let event = NormalizedEvent::now(id, Device::Gateway);
        self.broadcaster.publish_nfc(event.clone());
        Some(event)
    }
}

/// Compare two byte strings in time independent of where they differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    bool::from(a.ct_eq(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Frame;
    use crate::test_utils::{broadcaster_with_receiver, drain};
    use serde_json::json;
    use std::time::Duration;

    const SECRET: &str = "s3cret";

    fn relay(broadcaster: Broadcaster) -> GatewayRelay {
        GatewayRelay::new(Some(SECRET.to_string()), None, broadcaster)
    }

    fn token<'a>(
        credential: Option<&'a str>,
        query: Option<&'a str>,
        header: Option<&'a str>,
    ) -> PresentedToken<'a> {
        PresentedToken {
            credential,
            query,
            header,
        }
    }

    #[test]
    fn test_authorize_each_location() {
        let relay = relay(Broadcaster::default());
        assert_eq!(relay.authorize(&token(Some(SECRET), None, None)), Ok(()));
        assert_eq!(relay.authorize(&token(None, Some(SECRET), None)), Ok(()));
        assert_eq!(relay.authorize(&token(None, None, Some(SECRET))), Ok(()));
    }

    #[test]
    fn test_authorize_rejects_missing_or_wrong_token() {
        let relay = relay(Broadcaster::default());
        assert_eq!(
            relay.authorize(&PresentedToken::default()),
            Err(RelayError::Unauthorized)
        );
        assert_eq!(
            relay.authorize(&token(None, Some("s3cre"), None)),
            Err(RelayError::Unauthorized)
        );
        assert_eq!(
            relay.authorize(&token(None, None, Some("S3CRET"))),
            Err(RelayError::Unauthorized)
        );
    }

    #[test]
    fn test_authorize_uses_first_present_location() {
        let relay = relay(Broadcaster::default());
        // A wrong credential is not rescued by a correct header.
        assert_eq!(
            relay.authorize(&token(Some("wrong"), None, Some(SECRET))),
            Err(RelayError::Unauthorized)
        );
        // Empty values are skipped.
        assert_eq!(relay.authorize(&token(Some(""), Some(SECRET), None)), Ok(()));
    }

    #[test]
    fn test_authorize_without_secret_refuses_everyone() {
        let relay = GatewayRelay::new(None, None, Broadcaster::default());
        assert!(!relay.is_configured());
        assert_eq!(
            relay.authorize(&PresentedToken::default()),
            Err(RelayError::NotConfigured)
        );

        let relay = GatewayRelay::new(Some(String::new()), None, Broadcaster::default());
        assert_eq!(
            relay.authorize(&token(Some(""), None, None)),
            Err(RelayError::NotConfigured)
        );
    }

    #[test]
    fn test_uid_message_relayed_and_normalized() {
        let (broadcaster, mut rx) = broadcaster_with_receiver();
        let relay = relay(broadcaster);

        let event = relay
            .handle_message(r#"{"event":"uid","data":{"uid":"1234ABCD"}}"#)
            .unwrap();
        assert_eq!(event.id.as_str(), "1234ABCD");
        assert_eq!(event.device, Device::Gateway);

        assert_eq!(
            drain(&mut rx),
            vec![Frame::Uid(json!({"uid": "1234ABCD"})), Frame::Nfc(event)]
        );
    }

    #[test]
    fn test_relay_is_verbatim_but_event_is_normalized() {
        let (broadcaster, mut rx) = broadcaster_with_receiver();
        let relay = relay(broadcaster);
        let payload = json!({"uid": "ab12cd34", "ts": 1, "reader": "door"});

        let event = relay.handle_sighting(payload.clone()).unwrap();
        assert_eq!(event.id.as_str(), "AB12CD34");
        // The gateway's own timestamp is not trusted.
        assert_ne!(event.ts, 1);
        assert_eq!(drain(&mut rx)[0], Frame::Uid(payload));
    }

    #[test]
    fn test_invalid_messages_dropped_silently() {
        let (broadcaster, mut rx) = broadcaster_with_receiver();
        let relay = relay(broadcaster);

        for text in [
            "not json",
            r#"{"event":"uid"}"#,
            r#"{"event":"uid","data":{}}"#,
            r#"{"event":"uid","data":{"uid":""}}"#,
            r#"{"event":"uid","data":{"uid":42}}"#,
            r#"{"event":"uid","data":{"uid":"not-hex"}}"#,
            r#"{"event":"ping","data":{"uid":"1234ABCD"}}"#,
        ] {
            assert!(relay.handle_message(text).is_none(), "{text}");
        }
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_no_dedup_without_limiter() {
        let (broadcaster, mut rx) = broadcaster_with_receiver();
        let relay = relay(broadcaster);

        assert!(relay.handle_sighting(json!({"uid": "1234ABCD"})).is_some());
        assert!(relay.handle_sighting(json!({"uid": "1234ABCD"})).is_some());
        assert_eq!(drain(&mut rx).len(), 4);
    }

    #[test]
    fn test_limiter_drops_whole_sighting() {
        let (broadcaster, mut rx) = broadcaster_with_receiver();
        let limiter = SharedRateLimiter::new(Duration::from_secs(3600));
        let relay = GatewayRelay::new(Some(SECRET.to_string()), Some(limiter), broadcaster);

        assert!(relay.handle_sighting(json!({"uid": "1234ABCD"})).is_some());
        assert!(relay.handle_sighting(json!({"uid": "1234abcd"})).is_none());
        assert_eq!(drain(&mut rx).len(), 2);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
        assert!(!constant_time_eq(b"", b"a"));
        assert!(constant_time_eq(b"", b""));
    }
}

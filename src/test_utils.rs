use crate::broadcast::Broadcaster;
use crate::event::{Channel, Frame};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Company id used by test payloads (the default filter).
pub const TEST_COMPANY_ID: u16 = 0xFFFF;

/// Build manufacturer data: little-endian company id followed by `body`.
pub fn manufacturer_payload(company_id: u16, body: &[u8]) -> Vec<u8> {
    let mut payload = company_id.to_le_bytes().to_vec();
    payload.extend_from_slice(body);
    payload
}

/// Receivers on both broadcast channels.
pub struct Subscribers {
    pub public: broadcast::Receiver<Arc<Frame>>,
    pub stream: broadcast::Receiver<Arc<Frame>>,
}

/// Drain every queued frame: stream frames first, then public ones.
pub fn drain(subscribers: &mut Subscribers) -> Vec<Frame> {
    let mut frames = Vec::new();
    for rx in [&mut subscribers.stream, &mut subscribers.public] {
        while let Ok(frame) = rx.try_recv() {
            frames.push((*frame).clone());
        }
    }
    frames
}

/// A broadcaster together with receivers subscribed before any publish.
pub fn broadcaster_with_receiver() -> (Broadcaster, Subscribers) {
    let broadcaster = Broadcaster::new(64);
    let subscribers = Subscribers {
        public: broadcaster.subscribe(Channel::Public),
        stream: broadcaster.subscribe(Channel::Stream),
    };
    (broadcaster, subscribers)
}

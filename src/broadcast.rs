//! Fan-out of frames to every connected subscriber.

use crate::event::{Channel, Frame, NormalizedEvent, RawBleEvent};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Number of frames buffered per subscriber before it starts lagging.
pub const BROADCAST_BUFFER_SIZE: usize = 256;

/// Cheaply cloneable handle publishing frames to all subscribers.
///
/// Each [`Channel`] has its own buffer, so a flood of raw `ble` frames never
/// makes a `/stream` subscriber lag behind relayed `uid` frames.
///
/// Publishing never blocks and never fails: with no subscriber connected the
/// frame is simply dropped.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    public: broadcast::Sender<Arc<Frame>>,
    stream: broadcast::Sender<Arc<Frame>>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (public, _) = broadcast::channel(capacity);
        let (stream, _) = broadcast::channel(capacity);
        Self { public, stream }
    }

    fn sender(&self, channel: Channel) -> &broadcast::Sender<Arc<Frame>> {
        match channel {
            Channel::Public => &self.public,
            Channel::Stream => &self.stream,
        }
    }

    /// Subscribe to every frame published on `channel` from now on.
    pub fn subscribe(&self, channel: Channel) -> broadcast::Receiver<Arc<Frame>> {
        self.sender(channel).subscribe()
    }

    /// Publish a frame on its channel; returns the number of subscribers it
    /// reached.
    pub fn publish(&self, frame: Frame) -> usize {
        self.sender(frame.channel())
            .send(Arc::new(frame))
            .unwrap_or(0)
    }

    /// Publish a normalized `nfc` event.
    pub fn publish_nfc(&self, event: NormalizedEvent) -> usize {
        self.publish(Frame::Nfc(event))
    }

    /// Publish a raw `ble` event.
    pub fn publish_ble(&self, event: RawBleEvent) -> usize {
        self.publish(Frame::Ble(event))
    }

    /// Relay a gateway payload verbatim as a `uid` message.
    pub fn publish_uid(&self, payload: serde_json::Value) -> usize {
        self.publish(Frame::Uid(payload))
    }

    /// Number of subscribers currently connected to `channel`.
    pub fn subscriber_count(&self, channel: Channel) -> usize {
        self.sender(channel).receiver_count()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(BROADCAST_BUFFER_SIZE)
    }
}

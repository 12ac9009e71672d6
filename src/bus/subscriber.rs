//! Channel-backed subscriber sink and keepalive frames

use crate::bus::AlertSink;
use crate::error::DeliveryError;
use crate::types::alert::AlertEvent;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::sync::watch;

const PONG: &str = r#"{"type":"pong"}"#;

/// Outbound frame queued for a subscriber's writer task
#[derive(Debug, Clone)]
pub enum Frame {
    Event(Arc<AlertEvent>),
    Pong,
}

impl Frame {
    /// Text encoding sent over the wire
    pub fn encode(&self) -> serde_json::Result<String> {
        match self {
            Frame::Event(event) => serde_json::to_string(event.as_ref()),
            Frame::Pong => Ok(PONG.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct ControlMessage {
    #[serde(rename = "type")]
    kind: String,
}

/// Reply owed for an inbound subscriber message, if any.
///
/// Only `{"type": "ping"}` gets an answer. Anything else is ignored.
pub fn keepalive_reply(text: &str) -> Option<Frame> {
    match serde_json::from_str::<ControlMessage>(text) {
        Ok(msg) if msg.kind == "ping" => Some(Frame::Pong),
        _ => None,
    }
}

/// Sink that enqueues frames on a bounded channel drained by the
/// subscriber's writer. A full queue that does not drain within the
/// delivery timeout fails the send.
///
/// Clones share the queue and the detach flag, so the session holding one
/// clone observes the bus dropping another.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Frame>,
    timeout: Duration,
    detached: Arc<watch::Sender<bool>>,
}

impl ChannelSink {
    /// Create a sink together with the receiving half for the writer task
    pub fn channel(capacity: usize, timeout: Duration) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (detached, _) = watch::channel(false);
        (
            Self {
                tx,
                timeout,
                detached: Arc::new(detached),
            },
            rx,
        )
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn is_detached(&self) -> bool {
        *self.detached.borrow()
    }

    /// Resolves once the bus has dropped this sink
    pub async fn detached(&self) {
        let mut rx = self.detached.subscribe();
        // the sender lives in `self`, so the wait cannot fail
        let _ = rx.wait_for(|detached| *detached).await;
    }

    /// Queue a frame behind any events already pending for this subscriber
    pub async fn send_frame(&self, frame: Frame) -> Result<(), DeliveryError> {
        self.tx
            .send_timeout(frame, self.timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => {
                    DeliveryError::Timeout(self.timeout.as_millis() as u64)
                }
                SendTimeoutError::Closed(_) => DeliveryError::Closed,
            })
    }
}

#[async_trait]
impl AlertSink for ChannelSink {
    async fn deliver(&self, event: Arc<AlertEvent>) -> Result<(), DeliveryError> {
        self.send_frame(Frame::Event(event)).await
    }

    fn detach(&self) {
        self.detached.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explainer::RiskExplainer;
    use crate::types::alert::RiskLevelThresholds;
    use crate::types::transaction::Transaction;

    fn event() -> Arc<AlertEvent> {
        let tx = Transaction::new(50.0, 14, 0.5, 5.0);
        let result = RiskExplainer::new().explain(&tx, 0.0, false);
        Arc::new(AlertEvent::new(tx, result, &RiskLevelThresholds::default()))
    }

    #[test]
    fn test_keepalive_reply() {
        assert!(matches!(keepalive_reply(r#"{"type": "ping"}"#), Some(Frame::Pong)));
        assert!(keepalive_reply(r#"{"type": "hello"}"#).is_none());
        assert!(keepalive_reply("ping").is_none());
        assert_eq!(Frame::Pong.encode().unwrap(), r#"{"type":"pong"}"#);
    }

    #[tokio::test]
    async fn test_channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::channel(8, Duration::from_millis(100));
        let first = event();
        let second = event();

        sink.deliver(first.clone()).await.unwrap();
        sink.send_frame(Frame::Pong).await.unwrap();
        sink.deliver(second.clone()).await.unwrap();

        match rx.recv().await {
            Some(Frame::Event(e)) => assert_eq!(e.event_id, first.event_id),
            other => panic!("unexpected frame: {:?}", other),
        }
        assert!(matches!(rx.recv().await, Some(Frame::Pong)));
        match rx.recv().await {
            Some(Frame::Event(e)) => assert_eq!(e.event_id, second.event_id),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closed_receiver_fails_delivery() {
        let (sink, rx) = ChannelSink::channel(8, Duration::from_millis(100));
        drop(rx);
        assert!(sink.is_closed());
        assert_eq!(sink.deliver(event()).await, Err(DeliveryError::Closed));
    }

    #[tokio::test]
    async fn test_full_channel_times_out() {
        let (sink, _rx) = ChannelSink::channel(1, Duration::from_millis(20));
        sink.deliver(event()).await.unwrap();
        assert_eq!(sink.deliver(event()).await, Err(DeliveryError::Timeout(20)));
    }

    #[tokio::test]
    async fn test_detach_wakes_every_clone() {
        let (sink, _rx) = ChannelSink::channel(1, Duration::from_millis(20));
        let session = sink.clone();
        assert!(!session.is_detached());

        let waiter = tokio::spawn(async move { session.detached().await });
        sink.detach();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(sink.is_detached());
        // already detached resolves immediately
        tokio::time::timeout(Duration::from_millis(100), sink.detached())
            .await
            .unwrap();
    }

    #[test]
    fn test_event_frame_encodes_payload() {
        let event = event();
        let text = Frame::Event(event.clone()).encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["event_id"], serde_json::json!(event.event_id));
        assert_eq!(value["result"]["severity"], serde_json::json!("LOW"));
    }
}

//! Fan-out of scored events to live subscribers, split by interest

pub mod subscriber;

use crate::error::DeliveryError;
use crate::types::alert::AlertEvent;
use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

pub use subscriber::{keepalive_reply, ChannelSink, Frame};

pub type SubscriberId = u64;

/// Which events a subscriber receives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Interest {
    /// Every scored event
    All,
    /// Flagged events only
    FraudOnly,
}

impl Interest {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interest::All => "all",
            Interest::FraudOnly => "fraud-only",
        }
    }
}

impl fmt::Display for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination for published events. A failed delivery removes the sink.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, event: Arc<AlertEvent>) -> Result<(), DeliveryError>;

    /// Called once the bus has removed this sink after a failed delivery
    fn detach(&self) {}
}

type Registry = Mutex<Vec<(SubscriberId, Arc<dyn AlertSink>)>>;

/// Per-interest delivery counts for one event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub all: usize,
    pub fraud_only: usize,
}

/// Independent subscriber registries with remove-on-failure delivery
pub struct AlertBus {
    next_id: AtomicU64,
    all: Registry,
    fraud_only: Registry,
}

impl AlertBus {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            all: Mutex::new(Vec::new()),
            fraud_only: Mutex::new(Vec::new()),
        }
    }

    fn registry(&self, interest: Interest) -> &Registry {
        match interest {
            Interest::All => &self.all,
            Interest::FraudOnly => &self.fraud_only,
        }
    }

    pub fn subscribe(&self, interest: Interest, sink: Arc<dyn AlertSink>) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut registry = self.registry(interest).lock();
        registry.push((id, sink));
        debug!(subscriber = id, interest = %interest, total = registry.len(), "Subscriber added");
        id
    }

    /// Returns false if the subscriber was already gone
    pub fn unsubscribe(&self, interest: Interest, id: SubscriberId) -> bool {
        let mut registry = self.registry(interest).lock();
        let before = registry.len();
        registry.retain(|(sid, _)| *sid != id);
        before != registry.len()
    }

    pub fn subscriber_count(&self, interest: Interest) -> usize {
        self.registry(interest).lock().len()
    }

    pub fn total_subscribers(&self) -> usize {
        self.subscriber_count(Interest::All) + self.subscriber_count(Interest::FraudOnly)
    }

    /// Deliver to every subscriber of `interest` registered when the call
    /// starts. Subscribers whose delivery fails are dropped. Returns the
    /// number of successful deliveries.
    pub async fn publish(&self, event: Arc<AlertEvent>, interest: Interest) -> usize {
        let snapshot: Vec<(SubscriberId, Arc<dyn AlertSink>)> =
            self.registry(interest).lock().clone();
        if snapshot.is_empty() {
            return 0;
        }

        let outcomes = join_all(snapshot.iter().map(|(_, sink)| {
            let event = Arc::clone(&event);
            async move { sink.deliver(event).await }
        }))
        .await;

        let mut failed = Vec::new();
        for ((id, sink), outcome) in snapshot.iter().zip(outcomes) {
            if let Err(e) = outcome {
                warn!(subscriber = *id, interest = %interest, error = %e, "Dropping subscriber after failed delivery");
                failed.push((*id, Arc::clone(sink)));
            }
        }

        if !failed.is_empty() {
            self.registry(interest)
                .lock()
                .retain(|(id, _)| !failed.iter().any(|(failed_id, _)| failed_id == id));
            for (_, sink) in &failed {
                sink.detach();
            }
        }

        snapshot.len() - failed.len()
    }

    /// Publish to `All`, and to `FraudOnly` when the event is flagged
    pub async fn dispatch(&self, event: Arc<AlertEvent>) -> DispatchReport {
        let all = self.publish(Arc::clone(&event), Interest::All).await;
        let fraud_only = if event.is_flagged() {
            self.publish(event, Interest::FraudOnly).await
        } else {
            0
        };
        DispatchReport { all, fraud_only }
    }
}

impl Default for AlertBus {
    fn default() -> Self {
        Self::new()
    }
}

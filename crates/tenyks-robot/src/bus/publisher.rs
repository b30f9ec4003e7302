//! Outbound publisher: outbound queue → services channel.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use tenyks_core::OutboundItem;

use super::{BusError, Publish};

/// Drains the outbound queue, publishing each item in its own task.
///
/// A failed publish is logged and the item is dropped. It never blocks the
/// drain or other publishes.
pub struct OutboundPublisher {
    bus: Arc<dyn Publish>,
    channel: Arc<str>,
}

impl OutboundPublisher {
    pub fn new(bus: Arc<dyn Publish>, channel: &str) -> Self {
        Self {
            bus,
            channel: channel.into(),
        }
    }

    /// Run until every sender of the queue is gone, then wait for the
    /// publishes still in flight.
    pub async fn run(self, mut queue: mpsc::UnboundedReceiver<OutboundItem>) {
        info!(channel = %self.channel, "Outbound publisher started");
        let mut in_flight = JoinSet::new();

        while let Some(item) = queue.recv().await {
            let bus = Arc::clone(&self.bus);
            let channel = Arc::clone(&self.channel);
            in_flight.spawn(async move {
                let connection = item.connection.clone();
                if let Err(e) = publish_item(bus.as_ref(), &channel, &item).await {
                    error!(connection = %connection, error = %e, "Failed to publish outbound item");
                }
            });
            // Reap finished publishes so the set does not grow without bound.
            while in_flight.try_join_next().is_some() {}
        }

        while in_flight.join_next().await.is_some() {}
        info!("Outbound publisher stopped");
    }
}

async fn publish_item(bus: &dyn Publish, channel: &str, item: &OutboundItem) -> Result<(), BusError> {
    let payload = item.to_json()?;
    debug!(connection = %item.connection, command = %item.command, "Publishing");
    bus.publish(channel, payload).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tenyks_core::InboundLine;

    #[derive(Default)]
    struct Recorder {
        published: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Publish for Recorder {
        async fn publish(&self, channel: &str, payload: String) -> Result<(), BusError> {
            if payload.contains("fail-me") {
                return Err(BusError::Closed);
            }
            self.published
                .lock()
                .unwrap()
                .push((channel.to_string(), payload));
            Ok(())
        }
    }

    fn item(raw: &str) -> OutboundItem {
        OutboundItem::from_line(InboundLine::new("net1", raw))
    }

    #[tokio::test]
    async fn every_item_is_published_on_the_services_channel() {
        let bus = Arc::new(Recorder::default());
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(item("one")).unwrap();
        tx.send(item("two")).unwrap();
        drop(tx);

        OutboundPublisher::new(bus.clone(), "tenyks.services.broadcast_to")
            .run(rx)
            .await;

        let published = bus.published.lock().unwrap();
        assert_eq!(published.len(), 2);
        assert!(published.iter().all(|(c, _)| c == "tenyks.services.broadcast_to"));
        let mut messages: Vec<String> = published
            .iter()
            .map(|(_, p)| {
                let v: serde_json::Value = serde_json::from_str(p).unwrap();
                v["full_message"].as_str().unwrap().to_string()
            })
            .collect();
        messages.sort();
        assert_eq!(messages, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn failed_publish_does_not_stop_the_drain() {
        let bus = Arc::new(Recorder::default());
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(item("fail-me")).unwrap();
        tx.send(item("after")).unwrap();
        drop(tx);

        OutboundPublisher::new(bus.clone(), "svc").run(rx).await;

        let published = bus.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert!(published[0].1.contains("after"));
    }
}

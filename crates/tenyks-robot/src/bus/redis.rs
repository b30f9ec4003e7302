//! Redis-backed bus, built on `fred`.

use async_trait::async_trait;
use fred::clients::SubscriberClient;
use fred::prelude::{
    Builder, Client, ClientLike, Config, EventInterface, PubsubInterface, ReconnectPolicy,
    ServerConfig,
};
use fred::types::Message;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tenyks_core::config::RedisSettings;

use super::{BusError, MessageSource, Publish};

fn client_config(settings: &RedisSettings) -> Config {
    Config {
        server: ServerConfig::new_centralized(settings.host.clone(), settings.port),
        database: Some(settings.db),
        password: settings.password.clone().filter(|p| !p.is_empty()),
        ..Default::default()
    }
}

fn reconnect_policy() -> ReconnectPolicy {
    // Unlimited attempts, 100ms doubling up to 30s.
    ReconnectPolicy::new_exponential(0, 100, 30_000, 2)
}

/// Shared publishing client. `fred` reconnects it in the background.
#[derive(Clone)]
pub struct RedisPublisher {
    client: Client,
}

impl RedisPublisher {
    pub async fn connect(settings: &RedisSettings) -> Result<Self, BusError> {
        let client = Builder::from_config(client_config(settings))
            .set_policy(reconnect_policy())
            .build()?;
        client.init().await?;
        info!(host = %settings.host, port = settings.port, db = settings.db, "Connected to Redis publisher");
        Ok(Self { client })
    }

    pub async fn quit(&self) {
        if let Err(e) = self.client.quit().await {
            debug!(error = %e, "Redis publisher quit failed");
        }
    }
}

#[async_trait]
impl Publish for RedisPublisher {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), BusError> {
        let receivers: i64 = self.client.publish(channel, payload).await?;
        debug!(channel, receivers, "Published");
        Ok(())
    }
}

/// A subscription to one channel. Resubscribes after reconnects.
pub struct RedisSubscription {
    client: SubscriberClient,
    messages: broadcast::Receiver<Message>,
    manager: JoinHandle<()>,
}

impl RedisSubscription {
    pub async fn subscribe(settings: &RedisSettings, channel: &str) -> Result<Self, BusError> {
        let client = Builder::from_config(client_config(settings))
            .set_policy(reconnect_policy())
            .build_subscriber_client()?;
        client.init().await?;
        let manager = client.manage_subscriptions();
        let messages = client.message_rx();
        client.subscribe(channel.to_string()).await?;
        info!(channel, "Subscribed");
        Ok(Self {
            client,
            messages,
            manager,
        })
    }

    /// A handle that can end this subscription from another task.
    pub fn closer(&self) -> SubscriptionCloser {
        SubscriptionCloser {
            client: self.client.clone(),
        }
    }
}

/// Quits the subscriber client behind a [`RedisSubscription`].
#[derive(Clone)]
pub struct SubscriptionCloser {
    client: SubscriberClient,
}

impl SubscriptionCloser {
    pub async fn quit(&self) {
        if let Err(e) = self.client.quit().await {
            debug!(error = %e, "Redis subscriber quit failed");
        }
    }
}

impl Drop for RedisSubscription {
    fn drop(&mut self) {
        self.manager.abort();
    }
}

#[async_trait]
impl MessageSource for RedisSubscription {
    async fn next_message(&mut self) -> Option<Result<String, BusError>> {
        loop {
            match self.messages.recv().await {
                Ok(message) => return Some(message.value.convert::<String>().map_err(BusError::from)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Subscriber lagged; control messages dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

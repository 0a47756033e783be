//! # Redis / KeyDB Pub/Sub Transport
//!
//! A dedicated `SubscriberClient` receives; publishes go through the
//! shared pool, since `Pool` does not implement `PubsubInterface` in
//! fred v10.

use std::time::Duration;

use async_trait::async_trait;
use fred::clients::{Pool, SubscriberClient};
use fred::interfaces::{ClientLike, EventInterface, PubsubInterface};
use fred::types::{Message, MessageKind};
use shared_types::TransportError;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::registry::ChannelKind;
use crate::transport::{PubSubTransport, TransportMessage};

fn command_error(e: fred::error::Error) -> TransportError {
    TransportError::Command(e.to_string())
}

/// Pub/sub transport over Redis / KeyDB.
pub struct RedisTransport {
    pool: Pool,
    subscriber: SubscriberClient,
    messages: tokio::sync::Mutex<broadcast::Receiver<Message>>,
}

impl RedisTransport {
    /// Open a subscriber connection using the pool's configuration.
    ///
    /// # Errors
    ///
    /// `TransportError::ConnectionLost` if the subscriber cannot connect.
    pub async fn connect(pool: Pool) -> Result<Self, TransportError> {
        let client = pool.next();
        let subscriber = SubscriberClient::new(
            client.client_config(),
            None,
            None,
            client.client_reconnect_policy(),
        );
        let _connection = subscriber.connect();
        subscriber
            .wait_for_connect()
            .await
            .map_err(|e| TransportError::ConnectionLost(e.to_string()))?;

        let messages = tokio::sync::Mutex::new(subscriber.message_rx());
        info!("Pub/sub subscriber connected");
        Ok(Self {
            pool,
            subscriber,
            messages,
        })
    }

    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.subscriber.is_connected() {
            Ok(())
        } else {
            Err(TransportError::ConnectionLost(
                "subscriber connection down".to_string(),
            ))
        }
    }
}

fn to_transport_message(message: Message) -> Option<TransportMessage> {
    let kind = match message.kind {
        MessageKind::PMessage => ChannelKind::Pattern,
        MessageKind::Message => ChannelKind::Exact,
        _ => return None,
    };
    let payload = message.value.as_str()?.to_string();
    Some(TransportMessage {
        channel: message.channel.to_string(),
        kind,
        // fred does not expose the matched pattern; the registry picks the
        // most specific registered pattern instead.
        pattern: None,
        payload,
    })
}

#[async_trait]
impl PubSubTransport for RedisTransport {
    async fn publish(&self, channel: &str, payload: &str) -> Result<usize, TransportError> {
        let receivers: i64 = self
            .pool
            .next()
            .publish(channel, payload)
            .await
            .map_err(command_error)?;
        Ok(usize::try_from(receivers).unwrap_or_default())
    }

    async fn subscribe(&self, channel: &str) -> Result<(), TransportError> {
        self.subscriber.subscribe(channel).await.map_err(command_error)
    }

    async fn psubscribe(&self, pattern: &str) -> Result<(), TransportError> {
        self.subscriber
            .psubscribe(pattern)
            .await
            .map_err(command_error)
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), TransportError> {
        self.subscriber
            .unsubscribe(channel)
            .await
            .map_err(command_error)
    }

    async fn punsubscribe(&self, pattern: &str) -> Result<(), TransportError> {
        self.subscriber
            .punsubscribe(pattern)
            .await
            .map_err(command_error)
    }

    async fn receive(&self, timeout: Duration) -> Result<Option<TransportMessage>, TransportError> {
        self.ensure_connected()?;
        let mut messages = self.messages.lock().await;

        let wait = async {
            loop {
                match messages.recv().await {
                    Ok(message) => match to_transport_message(message) {
                        Some(message) => return Ok(message),
                        None => debug!("Skipped non-message pub/sub frame"),
                    },
                    Err(broadcast::error::RecvError::Lagged(count)) => {
                        warn!(lagged = count, "Subscriber lagged, messages dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(TransportError::Closed);
                    }
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(message)) => Ok(Some(message)),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }

    async fn reconnect(&self) -> Result<(), TransportError> {
        self.subscriber
            .force_reconnection()
            .await
            .map_err(|e| TransportError::ConnectionLost(e.to_string()))?;
        *self.messages.lock().await = self.subscriber.message_rx();
        debug!("Pub/sub subscriber reconnected");
        Ok(())
    }
}

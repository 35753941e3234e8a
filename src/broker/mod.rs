//! Message broker capabilities.
//!
//! [`Publish`] is what the queue sink needs, [`Subscription`] is what the
//! queue source needs. Each consumed [`Message`] carries an [`AckHandle`]
//! that is consumed by acknowledging it, so a message can be acked at most
//! once. [`Resubscribing`] keeps a subscription alive across broker
//! disconnects. [`amqp`] implements the capabilities on RabbitMQ.

pub mod amqp;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Broker failures, classified the way the consumer reports them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("Connection was closed")]
    ConnectionClosed,
    #[error("Channel was closed by the server")]
    ChannelClosed,
    #[error("Channel cancellation occurred")]
    ChannelCancelled,
    #[error("invalid broker address: {0}")]
    InvalidAddress(String),
    #[error("broker transport error: {0}")]
    Transport(String),
}

/// Publishes raw message bodies to one fixed destination.
#[async_trait]
pub trait Publish: Send + Sync {
    async fn publish(&self, body: &[u8]) -> Result<(), BrokerError>;

    /// Exchange or topic the messages go to.
    fn destination(&self) -> &str;
}

#[async_trait]
pub trait Acknowledge: Send {
    async fn ack(self: Box<Self>) -> Result<(), BrokerError>;
}

/// Token for one unacknowledged message.
pub struct AckHandle(Box<dyn Acknowledge>);

impl AckHandle {
    pub fn new(inner: impl Acknowledge + 'static) -> Self {
        Self(Box::new(inner))
    }

    pub async fn ack(self) -> Result<(), BrokerError> {
        self.0.ack().await
    }
}

impl fmt::Debug for AckHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AckHandle")
    }
}

/// One consumed message.
#[derive(Debug)]
pub struct Message {
    pub body: Bytes,
    pub ack: AckHandle,
}

/// Pull-based view of a queue subscription.
///
/// `None` means the subscription will never yield again.
#[async_trait]
pub trait Subscription: Send {
    async fn next_message(&mut self) -> Option<Result<Message, BrokerError>>;
}

/// Opens fresh subscriptions to one queue.
#[async_trait]
pub trait Subscribe: Send + Sync {
    type Subscription: Subscription;

    async fn subscribe(&self) -> Result<Self::Subscription, BrokerError>;
}

/// A subscription that never ends.
///
/// When the current subscription errors or its stream ends, the classified
/// error is returned and the next call waits `retry_delay` before
/// subscribing again. A failed attempt is returned the same way and retried
/// on the following call.
pub struct Resubscribing<S: Subscribe> {
    subscriber: S,
    current: Option<S::Subscription>,
    retry_delay: Duration,
}

impl<S: Subscribe> Resubscribing<S> {
    /// Subscribes once up front, so a broker that is unreachable at startup
    /// is reported to the caller.
    pub async fn start(subscriber: S, retry_delay: Duration) -> Result<Self, BrokerError> {
        let current = subscriber.subscribe().await?;
        Ok(Self {
            subscriber,
            current: Some(current),
            retry_delay,
        })
    }
}

#[async_trait]
impl<S: Subscribe> Subscription for Resubscribing<S> {
    async fn next_message(&mut self) -> Option<Result<Message, BrokerError>> {
        if self.current.is_none() {
            tokio::time::sleep(self.retry_delay).await;
            match self.subscriber.subscribe().await {
                Ok(subscription) => {
                    info!("Resubscribed to broker");
                    self.current = Some(subscription);
                }
                Err(e) => return Some(Err(e)),
            }
        }

        let next = self.current.as_mut()?.next_message().await;
        match next {
            Some(Ok(message)) => Some(Ok(message)),
            Some(Err(e)) => {
                debug!(error = %e, "Dropping broken subscription");
                self.current = None;
                Some(Err(e))
            }
            None => {
                // A consumer stream only ends when the server cancels it.
                self.current = None;
                Some(Err(BrokerError::ChannelCancelled))
            }
        }
    }
}

/// Connection parameters shared by publisher and consumer.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub address: String,
    pub username: String,
    pub password: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            address: "amqp://localhost:5672/".to_string(),
            username: "guest".to_string(),
            password: "guest".to_string(),
        }
    }
}

impl BrokerConfig {
    /// The address with username and password filled in.
    pub fn uri(&self) -> Result<String, BrokerError> {
        let invalid = |reason: &str| BrokerError::InvalidAddress(format!("{}: {reason}", self.address));

        let mut url = Url::parse(&self.address).map_err(|e| invalid(&e.to_string()))?;
        url.set_username(&self.username)
            .map_err(|_| invalid("cannot carry credentials"))?;
        url.set_password(Some(&self.password))
            .map_err(|_| invalid("cannot carry credentials"))?;
        Ok(url.to_string())
    }
}

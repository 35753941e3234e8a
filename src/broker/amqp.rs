//! RabbitMQ implementation of the broker capabilities, on `lapin`.

use super::{
    AckHandle, Acknowledge, BrokerConfig, BrokerError, Message, Publish, Subscribe, Subscription,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind,
    acker::Acker, options::*, types::FieldTable,
};
use tracing::{debug, info};

const CONSUMER_TAG: &str = "siri_vm_shovel";

impl From<lapin::Error> for BrokerError {
    fn from(err: lapin::Error) -> Self {
        match err {
            lapin::Error::IOError(_) | lapin::Error::InvalidConnectionState(_) => {
                BrokerError::ConnectionClosed
            }
            lapin::Error::InvalidChannelState(_) | lapin::Error::ProtocolError(_) => {
                BrokerError::ChannelClosed
            }
            other => BrokerError::Transport(other.to_string()),
        }
    }
}

async fn connect(config: &BrokerConfig) -> Result<(Connection, Channel), BrokerError> {
    let uri = config.uri()?;
    let connection = Connection::connect(&uri, ConnectionProperties::default()).await?;
    let channel = connection.create_channel().await?;
    info!(address = %config.address, user = %config.username, "Connected to RabbitMQ");
    Ok((connection, channel))
}

/// Publishes every message to one fanout exchange.
pub struct AmqpPublisher {
    _connection: Connection,
    channel: Channel,
    exchange: String,
}

impl AmqpPublisher {
    pub async fn connect(config: &BrokerConfig, exchange: &str) -> Result<Self, BrokerError> {
        let (connection, channel) = connect(config).await?;

        channel
            .exchange_declare(
                exchange,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        info!(exchange, "Publishing to RabbitMQ exchange");

        Ok(Self {
            _connection: connection,
            channel,
            exchange: exchange.to_string(),
        })
    }
}

#[async_trait]
impl Publish for AmqpPublisher {
    async fn publish(&self, body: &[u8]) -> Result<(), BrokerError> {
        // The publisher confirm is not awaited; durability is the broker's job.
        self.channel
            .basic_publish(
                &self.exchange,
                "",
                BasicPublishOptions::default(),
                body,
                BasicProperties::default().with_content_type("application/json".into()),
            )
            .await?;
        debug!(exchange = %self.exchange, bytes = body.len(), "Published message");
        Ok(())
    }

    fn destination(&self) -> &str {
        &self.exchange
    }
}

/// Manual-ack consumer on one durable queue, one message in flight at a time.
///
/// Lives as long as its connection; wrap an [`AmqpSubscriber`] in
/// [`super::Resubscribing`] to survive disconnects.
pub struct AmqpSubscription {
    _connection: Connection,
    _channel: Channel,
    consumer: Consumer,
}

impl AmqpSubscription {
    pub async fn connect(config: &BrokerConfig, queue: &str) -> Result<Self, BrokerError> {
        let (connection, channel) = connect(config).await?;

        channel.basic_qos(1, BasicQosOptions::default()).await?;
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        let consumer = channel
            .basic_consume(
                queue,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(queue, "Consuming from RabbitMQ queue");

        Ok(Self {
            _connection: connection,
            _channel: channel,
            consumer,
        })
    }
}

/// Opens a new [`AmqpSubscription`] on every call.
pub struct AmqpSubscriber {
    config: BrokerConfig,
    queue: String,
}

impl AmqpSubscriber {
    pub fn new(config: BrokerConfig, queue: impl Into<String>) -> Self {
        Self {
            config,
            queue: queue.into(),
        }
    }
}

#[async_trait]
impl Subscribe for AmqpSubscriber {
    type Subscription = AmqpSubscription;

    async fn subscribe(&self) -> Result<AmqpSubscription, BrokerError> {
        AmqpSubscription::connect(&self.config, &self.queue).await
    }
}

#[async_trait]
impl Subscription for AmqpSubscription {
    async fn next_message(&mut self) -> Option<Result<Message, BrokerError>> {
        match self.consumer.next().await {
            Some(Ok(delivery)) => {
                let lapin::message::Delivery { data, acker, .. } = delivery;
                Some(Ok(Message {
                    body: Bytes::from(data),
                    ack: AckHandle::new(AmqpAck(acker)),
                }))
            }
            Some(Err(err)) => Some(Err(err.into())),
            None => None,
        }
    }
}

struct AmqpAck(Acker);

#[async_trait]
impl Acknowledge for AmqpAck {
    async fn ack(self: Box<Self>) -> Result<(), BrokerError> {
        self.0.ack(BasicAckOptions::default()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapin::{ChannelState, ConnectionState};
    use std::sync::Arc;

    #[test]
    fn test_io_errors_are_connection_closed() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: BrokerError = lapin::Error::IOError(Arc::new(io)).into();
        assert_eq!(err, BrokerError::ConnectionClosed);

        let err: BrokerError = lapin::Error::InvalidConnectionState(ConnectionState::Closed).into();
        assert_eq!(err, BrokerError::ConnectionClosed);
    }

    #[test]
    fn test_channel_state_errors_are_channel_closed() {
        let err: BrokerError = lapin::Error::InvalidChannelState(ChannelState::Closed).into();
        assert_eq!(err, BrokerError::ChannelClosed);
    }

    #[test]
    fn test_other_errors_are_transport() {
        let err: BrokerError = lapin::Error::ChannelsLimitReached.into();
        assert!(matches!(err, BrokerError::Transport(_)));
    }
}

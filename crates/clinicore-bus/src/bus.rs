//! Broker connection, publish and subscribe.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use crate::config::BusConfig;
use crate::envelope::EventEnvelope;
use crate::error::BusError;
use crate::handler::EventHandler;

/// Persistent delivery mode: the message survives a broker restart.
const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Connection to the topic-exchange broker.
///
/// Cheap to clone is not a goal here; wrap in `Arc` and share.
pub struct EventBus {
    connection: Connection,
    channel: Channel,
    config: BusConfig,
}

impl EventBus {
    /// Connects to the broker with a bounded retry loop and declares the
    /// durable topic exchange.
    ///
    /// On final failure the error propagates; event propagation is a
    /// required feature, so the process should not serve traffic without it.
    #[instrument(skip(config), fields(exchange = %config.exchange))]
    pub async fn connect(config: BusConfig) -> Result<Self, BusError> {
        let mut last_error = String::new();

        for attempt in 1..=config.connect_attempts {
            match Connection::connect(&config.url, ConnectionProperties::default()).await {
                Ok(connection) => {
                    let channel = connection.create_channel().await?;
                    channel
                        .confirm_select(ConfirmSelectOptions::default())
                        .await?;
                    channel
                        .exchange_declare(
                            &config.exchange,
                            ExchangeKind::Topic,
                            ExchangeDeclareOptions {
                                durable: true,
                                ..Default::default()
                            },
                            FieldTable::default(),
                        )
                        .await?;

                    info!(
                        exchange = %config.exchange,
                        attempt,
                        "Connected to message broker"
                    );

                    return Ok(Self {
                        connection,
                        channel,
                        config,
                    });
                }
                Err(e) => {
                    warn!(
                        attempt,
                        attempts = config.connect_attempts,
                        error = %e,
                        "Broker connection attempt failed"
                    );
                    last_error = e.to_string();
                    if attempt < config.connect_attempts {
                        sleep(Duration::from_millis(config.connect_delay_ms)).await;
                    }
                }
            }
        }

        error!(
            attempts = config.connect_attempts,
            error = %last_error,
            "Giving up on broker connection"
        );
        Err(BusError::Connect {
            attempts: config.connect_attempts,
            message: last_error,
        })
    }

    /// Publishes an event to the topic exchange.
    ///
    /// The payload is wrapped in an [`EventEnvelope`] and published as
    /// persistent under `routing_key`, defaulting to the event type. A
    /// failure here surfaces to the caller and nothing rolls back the
    /// already-committed database write that triggered it; the event is
    /// lost (no outbox).
    pub async fn publish(
        &self,
        event_type: &str,
        data: Value,
        routing_key: Option<&str>,
    ) -> Result<(), BusError> {
        let envelope = EventEnvelope::new(event_type, data, &self.config.source);
        let routing_key = routing_key.unwrap_or(event_type);
        let payload = serde_json::to_vec(&envelope)?;

        let confirm = self
            .channel
            .basic_publish(
                &self.config.exchange,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(DELIVERY_MODE_PERSISTENT),
            )
            .await?;
        check_confirmation(confirm.await?, routing_key)?;

        debug!(
            event_id = %envelope.id,
            event_type = %event_type,
            routing_key = %routing_key,
            "Published event"
        );

        Ok(())
    }

    /// Subscribes a handler to a routing-key pattern.
    ///
    /// Declares a durable queue (server-named when `queue_name` is `None`),
    /// binds it to the exchange with `pattern`, limits in-flight deliveries
    /// to the configured prefetch and consumes with manual acknowledgment.
    /// Handler success acks; handler failure nacks with requeue.
    ///
    /// Returns the consumer task handle; the task ends when the channel
    /// closes.
    pub async fn subscribe(
        &self,
        pattern: &str,
        handler: Arc<dyn EventHandler>,
        queue_name: Option<&str>,
    ) -> Result<tokio::task::JoinHandle<()>, BusError> {
        let queue = self
            .channel
            .queue_declare(
                queue_name.unwrap_or(""),
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        let queue_name = queue.name().as_str().to_string();

        self.channel
            .queue_bind(
                &queue_name,
                &self.config.exchange,
                pattern,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        // Fair dispatch: the broker holds the next message until the
        // previous one is acked or nacked.
        self.channel
            .basic_qos(self.config.prefetch, BasicQosOptions::default())
            .await?;

        let mut consumer = self
            .channel
            .basic_consume(
                &queue_name,
                &format!("{}-{}", self.config.source, queue_name),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(queue = %queue_name, pattern = %pattern, "Subscribed to event pattern");

        let handle = tokio::spawn(async move {
            while let Some(delivery) = consumer.next().await {
                let delivery = match delivery {
                    Ok(delivery) => delivery,
                    Err(e) => {
                        error!(queue = %queue_name, error = %e, "Consumer stream error");
                        break;
                    }
                };

                let envelope: EventEnvelope = match serde_json::from_slice(&delivery.data) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        // An undeserializable message can never succeed;
                        // requeueing it would spin forever. Drop it.
                        warn!(queue = %queue_name, error = %e, "Dropping malformed delivery");
                        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                            error!(queue = %queue_name, error = %e, "Failed to ack malformed delivery");
                        }
                        continue;
                    }
                };

                let event_id = envelope.id.clone();
                match handler.handle(envelope).await {
                    Ok(()) => {
                        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                            error!(queue = %queue_name, event_id = %event_id, error = %e, "Ack failed");
                        }
                    }
                    Err(e) => {
                        warn!(
                            queue = %queue_name,
                            event_id = %event_id,
                            error = %e,
                            "Handler failed, requeueing delivery"
                        );
                        if let Err(e) = delivery
                            .nack(BasicNackOptions {
                                requeue: true,
                                ..Default::default()
                            })
                            .await
                        {
                            error!(queue = %queue_name, event_id = %event_id, error = %e, "Nack failed");
                        }
                    }
                }
            }

            info!(queue = %queue_name, "Consumer stopped");
        });

        Ok(handle)
    }

    /// True only when both the connection and the channel are live.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }

    /// Closes the channel and connection. Idempotent; closing an already
    /// closed bus is a no-op.
    pub async fn disconnect(&self) -> Result<(), BusError> {
        if !self.is_healthy() {
            return Ok(());
        }
        self.channel.close(200, "shutdown").await?;
        self.connection.close(200, "shutdown").await?;
        info!("Disconnected from message broker");
        Ok(())
    }
}

/// Maps a broker confirmation onto the publish result.
///
/// The channel runs in confirm mode, so anything other than an explicit ack
/// means the broker did not take responsibility for the message and the
/// publish must fail.
fn check_confirmation(confirmation: Confirmation, routing_key: &str) -> Result<(), BusError> {
    if confirmation.is_ack() {
        Ok(())
    } else {
        Err(BusError::Rejected {
            routing_key: routing_key.to_string(),
        })
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("exchange", &self.config.exchange)
            .field("healthy", &self.is_healthy())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Broker round-trips are exercised against a live broker by the
    // surrounding deployment; these tests cover the retry policy and
    // publish defaults that do not need one.

    #[tokio::test]
    async fn test_connect_gives_up_after_bounded_attempts() {
        let config = BusConfig::new("amqp://127.0.0.1:1").with_connect_retry(2, 10);
        let started = std::time::Instant::now();
        let err = EventBus::connect(config).await.unwrap_err();

        match err {
            BusError::Connect { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("expected connect error, got {other:?}"),
        }
        // One inter-attempt delay, not an unbounded loop.
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_connect_error_carries_last_failure() {
        let config = BusConfig::new("amqp://127.0.0.1:1").with_connect_retry(1, 10);
        let err = EventBus::connect(config).await.unwrap_err();
        assert!(!err.to_string().is_empty());
        assert!(err.to_string().contains("after 1 attempts"));
    }

    #[test]
    fn test_acked_confirmation_is_ok() {
        assert!(check_confirmation(Confirmation::Ack(None), "appointment.created").is_ok());
    }

    #[test]
    fn test_nacked_confirmation_fails_the_publish() {
        let err = check_confirmation(Confirmation::Nack(None), "appointment.created").unwrap_err();
        assert!(matches!(
            err,
            BusError::Rejected { ref routing_key } if routing_key == "appointment.created"
        ));
        assert!(err.to_string().contains("appointment.created"));
    }

    #[test]
    fn test_unconfirmed_publish_fails() {
        assert!(check_confirmation(Confirmation::NotRequested, "appointment.status").is_err());
    }
}

// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Publisher
//!
//! Publishes raw byte payloads to a queue through the default exchange.
//! [`send`] is the one-shot form: it opens its own connection, declares the
//! queue, publishes once and closes everything again.

use crate::{
    channel::{close_amqp_channel, new_amqp_channel},
    configs::AmqpConfigs,
    errors::AmqpError,
    otel,
    queue::QueueDefinition,
};
use lapin::{options::BasicPublishOptions, types::ShortString, BasicProperties, Channel};
use opentelemetry::Context;
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Content type stamped on every published message, whatever the payload.
pub const CONTENT_TYPE: &str = "text/javascript";

/// Deadline for a single publish, confirmation included.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection name used by [`send`].
const PUBLISHER_CONNECTION_NAME: &str = "amqp-helper-publisher";

/// Publishes messages to queues through the default exchange.
pub struct AmqpPublisher {
    channel: Arc<Channel>,
}

impl AmqpPublisher {
    /// Creates a new publisher on `channel`.
    pub fn new(channel: Arc<Channel>) -> AmqpPublisher {
        AmqpPublisher { channel }
    }

    /// Publishes `data` to the default exchange with `queue` as routing key.
    ///
    /// The publish and its broker confirmation must both finish within
    /// [`PUBLISH_TIMEOUT`].
    ///
    /// # Returns
    /// Ok(()) on success, `PublishingError` if the broker rejects the
    /// message, `PublishTimeoutError` if the deadline passes first
    pub async fn publish(&self, queue: &str, data: &[u8]) -> Result<(), AmqpError> {
        let properties = BasicProperties::default()
            .with_content_type(ShortString::from(CONTENT_TYPE))
            .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
            .with_headers(otel::inject_headers(&Context::current()));

        with_deadline(PUBLISH_TIMEOUT, async {
            let confirm = match self
                .channel
                .basic_publish(
                    "",
                    queue,
                    BasicPublishOptions {
                        mandatory: false,
                        immediate: false,
                    },
                    data,
                    properties,
                )
                .await
            {
                Err(err) => {
                    error!(error = err.to_string(), "error publishing message");
                    Err(AmqpError::PublishingError)
                }
                Ok(confirm) => Ok(confirm),
            }?;

            match confirm.await {
                Err(err) => {
                    error!(error = err.to_string(), "error confirming message");
                    Err(AmqpError::PublishingError)
                }
                Ok(confirmation) if confirmation.is_nack() => {
                    error!("message nacked by the broker");
                    Err(AmqpError::PublishingError)
                }
                Ok(_) => Ok(()),
            }
        })
        .await
    }
}

/// Runs `fut` to completion unless `timeout` elapses first.
pub(crate) async fn with_deadline<F, T>(timeout: Duration, fut: F) -> Result<T, AmqpError>
where
    F: Future<Output = Result<T, AmqpError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            error!(timeout_ms = timeout.as_millis() as u64, "publish deadline exceeded");
            Err(AmqpError::PublishTimeoutError)
        }
    }
}

/// Publishes a single message to `queue` over a dedicated connection.
///
/// Opens a connection and channel, declares the queue durable, publishes
/// `data` with a [`PUBLISH_TIMEOUT`] deadline and closes the channel and
/// connection whether or not the publish succeeded.
///
/// # Returns
/// Ok(()) once the message is published, or the error of the first step
/// that failed
pub async fn send(cfg: &AmqpConfigs, queue: &str, data: &[u8]) -> Result<(), AmqpError> {
    info!(queue = queue, "sending message");

    let (conn, channel) = new_amqp_channel(cfg, PUBLISHER_CONNECTION_NAME).await?;

    let result = publish_once(channel.clone(), queue, data).await;
    close_amqp_channel(&conn, &channel).await;

    if result.is_ok() {
        info!(queue = queue, payload = %String::from_utf8_lossy(data), "sent");
    }

    result
}

async fn publish_once(channel: Arc<Channel>, queue: &str, data: &[u8]) -> Result<(), AmqpError> {
    QueueDefinition::new(queue).durable().declare(&channel).await?;
    debug!(queue = queue, bytes = data.len(), "publishing message");
    AmqpPublisher::new(channel).publish(queue, data).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded_is_a_timeout() {
        let result: Result<(), AmqpError> =
            with_deadline(PUBLISH_TIMEOUT, future::pending()).await;

        assert_eq!(result, Err(AmqpError::PublishTimeoutError));
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_deadline_is_five_seconds() {
        let just_in_time = with_deadline(PUBLISH_TIMEOUT, async {
            tokio::time::sleep(Duration::from_millis(4_900)).await;
            Ok(())
        })
        .await;
        assert_eq!(just_in_time, Ok(()));

        let too_late = with_deadline(PUBLISH_TIMEOUT, async {
            tokio::time::sleep(Duration::from_millis(5_100)).await;
            Ok(())
        })
        .await;
        assert_eq!(too_late, Err(AmqpError::PublishTimeoutError));
    }

    #[tokio::test]
    async fn test_deadline_passes_inner_result_through() {
        let ok = with_deadline(PUBLISH_TIMEOUT, async { Ok(42) }).await;
        assert_eq!(ok, Ok(42));

        let err: Result<(), AmqpError> =
            with_deadline(PUBLISH_TIMEOUT, async { Err(AmqpError::PublishingError) }).await;
        assert_eq!(err, Err(AmqpError::PublishingError));
    }

    #[tokio::test]
    async fn test_send_to_unreachable_broker_is_a_connection_error() {
        let cfg = AmqpConfigs::default().with_host("127.0.0.1").with_port("1");

        let result = send(&cfg, "test", b"hello").await;

        assert_eq!(result, Err(AmqpError::ConnectionError));
    }
}

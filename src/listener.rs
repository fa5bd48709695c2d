// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Listener
//!
//! Subscribes to a single durable queue and hands every delivery to a
//! [`ConsumerHandler`]. Deliveries are auto-acknowledged by the broker, so a
//! message counts as consumed as soon as it is delivered, before the handler
//! runs.
//!
//! A listener owns its connection and channel for its whole lifetime and
//! releases them once the caller's shutdown signal fires.

use crate::{
    channel::{close_amqp_channel, new_amqp_channel},
    configs::AmqpConfigs,
    errors::AmqpError,
    handler::ConsumerHandler,
    otel,
    plugin::Plugin,
    queue::QueueDefinition,
};
use futures_util::StreamExt;
use lapin::{
    options::{BasicCancelOptions, BasicConsumeOptions},
    protocol::basic::AMQPProperties,
    types::FieldTable,
    Channel, Consumer,
};
use opentelemetry::trace::TraceContextExt;
use std::{future::Future, sync::Arc};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, error, info, warn};

/// Listens on `queue` until `shutdown` resolves.
///
/// This function:
/// 1. Connects to the broker, naming the connection after the plugin
/// 2. Declares the queue durable
/// 3. Registers an auto-ack consumer with a broker-assigned tag
/// 4. Spawns one task that calls `handler` for each delivery, in order
/// 5. Waits for `shutdown`, then cancels the consumer and lets the task
///    finish the deliveries it already holds
///
/// The channel and connection are closed before returning, on every path.
///
/// # Returns
/// Ok(()) after a requested shutdown. `ConsumerError` if the delivery stream
/// ends on its own, `InternalError` if the handler task panics, or the error
/// of the setup step that failed.
pub async fn listen<A, H, S>(
    cfg: &AmqpConfigs,
    queue: &str,
    handler: H,
    args: A,
    plugin: Plugin,
    shutdown: S,
) -> Result<(), AmqpError>
where
    A: Send + Sync + 'static,
    H: ConsumerHandler<A> + 'static,
    S: Future<Output = ()>,
{
    let (conn, channel) = new_amqp_channel(cfg, &plugin.name).await?;

    let result = consume_until(channel.clone(), queue, handler, args, plugin, shutdown).await;
    close_amqp_channel(&conn, &channel).await;

    result
}

/// Listens on `queue` until the process is terminated or the broker goes
/// away.
pub async fn listen_forever<A, H>(
    cfg: &AmqpConfigs,
    queue: &str,
    handler: H,
    args: A,
    plugin: Plugin,
) -> Result<(), AmqpError>
where
    A: Send + Sync + 'static,
    H: ConsumerHandler<A> + 'static,
{
    listen(cfg, queue, handler, args, plugin, std::future::pending()).await
}

async fn consume_until<A, H, S>(
    channel: Arc<Channel>,
    queue: &str,
    handler: H,
    args: A,
    plugin: Plugin,
    shutdown: S,
) -> Result<(), AmqpError>
where
    A: Send + Sync + 'static,
    H: ConsumerHandler<A> + 'static,
    S: Future<Output = ()>,
{
    QueueDefinition::new(queue).durable().declare(&channel).await?;

    let consumer = match channel
        .basic_consume(
            queue,
            "",
            BasicConsumeOptions {
                no_local: false,
                no_ack: true,
                exclusive: false,
                nowait: false,
            },
            FieldTable::default(),
        )
        .await
    {
        Err(err) => {
            error!(error = err.to_string(), queue = queue, "error to create the consumer");
            Err(AmqpError::BindingConsumerError(queue.to_owned()))
        }
        Ok(c) => Ok(c),
    }?;
    let tag = consumer.tag();

    let plugin_name = plugin.name.clone();
    let queue_name = queue.to_owned();
    let mut task =
        spawn_consumer_task(move || drain(consumer, queue_name, handler, args, plugin));

    info!(
        plugin = %plugin_name,
        queue = queue,
        "waiting for messages"
    );

    tokio::select! {
        _ = shutdown => {
            info!(plugin = %plugin_name, queue = queue, "stopping listener");

            match channel
                .basic_cancel(tag.as_str(), BasicCancelOptions::default())
                .await
            {
                Ok(_) => {
                    if let Err(err) = task.await {
                        error!(error = err.to_string(), "consumer task failed");
                        return Err(AmqpError::InternalError);
                    }
                }
                Err(err) => {
                    // Closing the channel below ends the delivery stream and
                    // with it the task.
                    warn!(error = err.to_string(), "failure to cancel the consumer");
                }
            }

            Ok(())
        }
        joined = &mut task => match joined {
            Ok(()) => {
                error!(queue = queue, "delivery stream closed by the broker");
                Err(AmqpError::ConsumerError("delivery stream closed".to_owned()))
            }
            Err(err) => {
                error!(error = err.to_string(), "consumer task failed");
                Err(AmqpError::InternalError)
            }
        },
    }
}

/// Runs the future built by `make` on the blocking pool.
///
/// Handlers are free to block: the task never occupies a runtime worker, so
/// the listener's shutdown branch keeps being polled even on a current-thread
/// runtime. The future is built on the blocking thread, which lets it hold
/// values that are not `Send` (the attached trace context).
pub(crate) fn spawn_consumer_task<M, F>(make: M) -> JoinHandle<F::Output>
where
    M: FnOnce() -> F + Send + 'static,
    F: Future,
    F::Output: Send + 'static,
{
    let handle = Handle::current();
    tokio::task::spawn_blocking(move || handle.block_on(make()))
}

/// Feeds every delivery of `consumer` to `handler`, one at a time.
async fn drain<A, H>(mut consumer: Consumer, queue: String, handler: H, args: A, plugin: Plugin)
where
    A: Send + Sync,
    H: ConsumerHandler<A>,
{
    while let Some(result) = consumer.next().await {
        match result {
            Ok(delivery) => {
                dispatch(
                    &handler,
                    &args,
                    &plugin,
                    &queue,
                    &delivery.properties,
                    &delivery.data,
                )
                .await
            }
            Err(err) => error!(error = err.to_string(), "errors consume msg"),
        }
    }

    debug!(queue = %queue, "delivery stream ended");
}

/// Runs the handler for one delivery inside a consumer span.
///
/// The span, parented to the context carried in the delivery headers, is
/// the current context while the handler runs.
pub(crate) async fn dispatch<A, H>(
    handler: &H,
    args: &A,
    plugin: &Plugin,
    queue: &str,
    props: &AMQPProperties,
    data: &[u8],
) where
    A: Send + Sync,
    H: ConsumerHandler<A> + ?Sized,
{
    let (ctx, span) = otel::consumer_span(props, queue);
    let cx = ctx.with_span(span);
    let _guard = cx.clone().attach();

    debug!(queue = queue, bytes = data.len(), "received message");
    handler.exec(args, plugin, data).await;

    cx.span().end();
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockall::mock;
    use opentelemetry::Context;
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            mpsc,
        },
        time::Duration,
    };

    mock! {
        Handler {}

        #[async_trait]
        impl ConsumerHandler<String> for Handler {
            async fn exec(&self, args: &String, plugin: &Plugin, message: &[u8]);
        }
    }

    #[tokio::test]
    async fn test_dispatch_passes_context_and_body_unchanged() {
        let mut handler = MockHandler::new();
        handler
            .expect_exec()
            .withf(|args, plugin, message| {
                args == "analysis-42" && plugin.name == "js-sbom" && message == b"hello"
            })
            .times(1)
            .return_const(());

        dispatch(
            &handler,
            &"analysis-42".to_owned(),
            &Plugin::new("js-sbom"),
            "test",
            &AMQPProperties::default(),
            b"hello",
        )
        .await;
    }

    #[tokio::test]
    async fn test_dispatch_with_empty_body() {
        let mut handler = MockHandler::new();
        handler
            .expect_exec()
            .withf(|_, _, message| message.is_empty())
            .times(1)
            .return_const(());

        dispatch(
            &handler,
            &String::new(),
            &Plugin::default(),
            "test",
            &AMQPProperties::default(),
            &[],
        )
        .await;
    }

    #[tokio::test]
    async fn test_handler_runs_inside_the_consumer_span() {
        let active = AtomicBool::new(false);
        let handler = |_: &(), _: &Plugin, _: &[u8]| {
            active.store(Context::current().has_active_span(), Ordering::SeqCst);
        };

        dispatch(
            &handler,
            &(),
            &Plugin::default(),
            "test",
            &AMQPProperties::default(),
            b"hello",
        )
        .await;

        assert!(active.load(Ordering::SeqCst));
        assert!(!Context::current().has_active_span());
    }

    #[tokio::test]
    async fn test_blocking_consumer_task_does_not_stall_the_runtime() {
        let (tx, rx) = mpsc::channel::<()>();
        let task = spawn_consumer_task(move || async move {
            rx.recv().unwrap();
        });

        // On a current-thread runtime this only wakes up if the task above
        // is not blocking the runtime thread.
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(()).unwrap();

        assert!(task.await.is_ok());
    }

    #[tokio::test]
    async fn test_panicking_consumer_task_reports_a_join_error() {
        let task = spawn_consumer_task(|| async {
            panic!("handler failed");
        });

        assert!(task.await.unwrap_err().is_panic());
    }

    #[tokio::test]
    async fn test_listen_on_unreachable_broker_is_a_connection_error() {
        let cfg = AmqpConfigs::default().with_host("127.0.0.1").with_port("1");
        let handler = |_: &(), _: &Plugin, _: &[u8]| {};

        let result = listen(
            &cfg,
            "test",
            handler,
            (),
            Plugin::new("js-sbom"),
            std::future::pending(),
        )
        .await;

        assert_eq!(result, Err(AmqpError::ConnectionError));
    }
}

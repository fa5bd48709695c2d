// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Declaration
//!
//! Queues are owned by the broker; this module only describes a queue and
//! declares it, which is idempotent as long as the flags match what the
//! broker already has.

use crate::errors::AmqpError;
use lapin::{options::QueueDeclareOptions, types::FieldTable, Channel};
use tracing::{debug, error};

/// Definition of a queue with its declaration flags.
///
/// Listeners and publishers both declare `QueueDefinition::new(name).durable()`:
/// not exclusive, not deleted when unused, no extra arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueDefinition {
    pub(crate) name: String,
    pub(crate) durable: bool,
}

impl QueueDefinition {
    /// Creates a new queue definition with the given name.
    ///
    /// By default, the queue is non-durable.
    pub fn new(name: &str) -> QueueDefinition {
        QueueDefinition {
            name: name.to_owned(),
            durable: false,
        }
    }

    /// Makes the queue durable, persisting across broker restarts.
    ///
    /// This keeps the queue definition only; messages are not marked
    /// persistent by it.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    pub(crate) fn options(&self) -> QueueDeclareOptions {
        QueueDeclareOptions {
            durable: self.durable,
            ..QueueDeclareOptions::default()
        }
    }

    /// Declares the queue on the broker, without extra arguments.
    ///
    /// # Returns
    /// Ok(()) on success or `DeclareQueueError` on failure
    pub async fn declare(&self, channel: &Channel) -> Result<(), AmqpError> {
        debug!("declaring queue: {}", self.name);

        match channel
            .queue_declare(&self.name, self.options(), FieldTable::default())
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = %self.name,
                    "error to declare the queue"
                );
                Err(AmqpError::DeclareQueueError(self.name.clone()))
            }
            Ok(queue) => {
                debug!(
                    name = %self.name,
                    messages = queue.message_count(),
                    consumers = queue.consumer_count(),
                    "queue declared"
                );
                Ok(())
            }
        }
    }
}

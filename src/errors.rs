// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the AMQP Helper
//!
//! Every failure of the listen and send operations is reported through
//! `AmqpError`. Nothing in this crate terminates the process; the host decides
//! whether to retry, shut down, or carry on.

use thiserror::Error;

/// Represents errors that can occur while talking to the broker.
///
/// Each variant names the step that failed. The underlying lapin error is
/// logged where it happens, so the variants only carry what the caller needs
/// to tell failures apart.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// Internal errors that don't fit into other categories
    #[error("internal error")]
    InternalError,

    /// Error establishing a connection to the broker
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error registering a consumer on the given queue
    #[error("failure to declare consumer `{0}`")]
    BindingConsumerError(String),

    /// Error publishing a message
    #[error("failure to publish")]
    PublishingError,

    /// The publish did not complete before its deadline
    #[error("publish deadline exceeded")]
    PublishTimeoutError,

    /// Error while consuming messages
    #[error("failure to consume message `{0}`")]
    ConsumerError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_queue() {
        assert_eq!(
            AmqpError::DeclareQueueError("sbom".to_owned()).to_string(),
            "failure to declare a queue `sbom`"
        );
        assert_eq!(
            AmqpError::BindingConsumerError("sbom".to_owned()).to_string(),
            "failure to declare consumer `sbom`"
        );
    }
}

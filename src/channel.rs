// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Channel Management
//!
//! This module opens the connection and channel used by a single listen or
//! send call, and releases them when the call is done. Connections are never
//! shared between calls.

use crate::{configs::AmqpConfigs, errors::AmqpError};
use lapin::{types::LongString, Channel, Connection, ConnectionProperties};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Reply code sent with a normal channel/connection close.
const REPLY_SUCCESS: u16 = 200;

/// Creates a new AMQP connection and channel.
///
/// # Parameters
/// * `cfg` - Broker connection settings
/// * `name` - Connection name shown in the broker management UI
///
/// # Returns
/// * `Result<(Arc<Connection>, Arc<Channel>), AmqpError>` -
///   The connection and channel on success, `ConnectionError` or
///   `ChannelError` on failure.
pub async fn new_amqp_channel(
    cfg: &AmqpConfigs,
    name: &str,
) -> Result<(Arc<Connection>, Arc<Channel>), AmqpError> {
    debug!("creating amqp connection...");
    let options =
        ConnectionProperties::default().with_connection_name(LongString::from(name.to_owned()));

    let conn = match Connection::connect(&cfg.uri(), options).await {
        Ok(c) => Ok(c),
        Err(err) => {
            error!(
                error = err.to_string(),
                host = %cfg.host,
                port = %cfg.port,
                "failure to connect"
            );
            Err(AmqpError::ConnectionError)
        }
    }?;
    debug!("amqp connected");

    debug!("creating amqp channel...");
    match conn.create_channel().await {
        Ok(c) => {
            debug!("channel created");
            Ok((Arc::new(conn), Arc::new(c)))
        }
        Err(err) => {
            error!(error = err.to_string(), "error to create the channel");
            close_connection(&conn).await;
            Err(AmqpError::ChannelError)
        }
    }
}

/// Closes the channel, then its connection.
///
/// Close failures are logged and swallowed: by the time this runs the
/// operation's outcome is already decided.
pub async fn close_amqp_channel(conn: &Connection, channel: &Channel) {
    if channel.status().connected() {
        if let Err(err) = channel.close(REPLY_SUCCESS, "OK").await {
            warn!(error = err.to_string(), "failure to close the channel");
        }
    }

    close_connection(conn).await;
    debug!("amqp connection closed");
}

async fn close_connection(conn: &Connection) {
    if conn.status().connected() {
        if let Err(err) = conn.close(REPLY_SUCCESS, "OK").await {
            warn!(error = err.to_string(), "failure to close the connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_broker_is_a_connection_error() {
        let cfg = AmqpConfigs::default().with_host("127.0.0.1").with_port("1");

        let result = new_amqp_channel(&cfg, "test").await;

        assert_eq!(result.err(), Some(AmqpError::ConnectionError));
    }
}

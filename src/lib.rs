// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Thin helpers to publish raw payloads to a durable broker queue and to
//! listen on one, calling a handler per delivered message.

mod otel;

pub mod channel;
pub mod configs;
pub mod errors;
pub mod handler;
pub mod listener;
pub mod plugin;
pub mod publisher;
pub mod queue;

pub use configs::AmqpConfigs;
pub use errors::AmqpError;
pub use handler::ConsumerHandler;
pub use listener::{listen, listen_forever};
pub use plugin::Plugin;
pub use publisher::{send, AmqpPublisher};

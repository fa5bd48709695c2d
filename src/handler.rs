// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Handlers
//!
//! A listener hands every delivery to a `ConsumerHandler` along with the
//! caller's argument and plugin record. Plain closures and functions with the
//! matching signature implement the trait directly.

use crate::plugin::Plugin;
use async_trait::async_trait;

/// Handles the body of one delivered message.
///
/// Messages are acknowledged before `exec` is called, so a handler that fails
/// or panics does not get the message redelivered.
///
/// A listener runs its handler on a thread of the blocking pool, so plain
/// synchronous closures may take as long as they need without holding up a
/// runtime worker. Deliveries still wait for the previous call to return.
#[async_trait]
pub trait ConsumerHandler<A>: Send + Sync
where
    A: Send + Sync,
{
    async fn exec(&self, args: &A, plugin: &Plugin, message: &[u8]);
}

#[async_trait]
impl<A, F> ConsumerHandler<A> for F
where
    A: Send + Sync,
    F: Fn(&A, &Plugin, &[u8]) + Send + Sync,
{
    async fn exec(&self, args: &A, plugin: &Plugin, message: &[u8]) {
        self(args, plugin, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_closure_is_a_handler() {
        let seen = Mutex::new(Vec::new());
        let handler = |args: &u32, plugin: &Plugin, message: &[u8]| {
            seen.lock()
                .unwrap()
                .push((*args, plugin.name.clone(), message.to_vec()));
        };

        let args: u32 = 7;
        handler.exec(&args, &Plugin::new("js-sbom"), b"hello").await;

        assert_eq!(
            seen.into_inner().unwrap(),
            vec![(7, "js-sbom".to_owned(), b"hello".to_vec())]
        );
    }
}

//! # Bus Client Traits
//!
//! `BusAgent` binds identity material into an authenticated
//! `BusConnection`. All gateway traffic goes through a connection.

use crate::message::{Message, PayloadObject};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::Stream;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;

/// Errors reported by the bus.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The agent could not be reached.
    #[error("bus agent unreachable: {0}")]
    AgentUnreachable(String),

    /// Binding identity material failed.
    #[error("failed to bind entity: {0}")]
    Bind(String),

    /// URI or URI pattern is not valid for the operation.
    #[error("invalid uri {uri:?}: {reason}")]
    InvalidUri { uri: String, reason: String },

    /// The bus refused the operation.
    #[error("bus rejected request: {0}")]
    Rejected(String),

    /// The connection has been closed.
    #[error("bus connection closed")]
    Closed,
}

/// A finite sequence of messages (query results).
pub type MessageStream = BoxStream<'static, Message>;

/// A live subscription. Dropping it releases the subscription on the bus.
pub struct Subscription {
    stream: MessageStream,
    on_release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap a message stream with a release hook run on drop.
    pub fn new<F>(stream: MessageStream, on_release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            stream,
            on_release: Some(Box::new(on_release)),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("released", &self.on_release.is_none())
            .finish()
    }
}

impl Stream for Subscription {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        self.stream.as_mut().poll_next(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.on_release.take() {
            release();
        }
    }
}

/// Agent that turns identity material into connections.
#[async_trait]
pub trait BusAgent: Send + Sync {
    /// Address this agent was configured with.
    fn address(&self) -> &str;

    /// Bind an untagged identity payload and return its connection.
    async fn bind(&self, payload: &[u8]) -> Result<Arc<dyn BusConnection>, BusError>;
}

/// An authenticated session on the bus, acting as one identity.
#[async_trait]
pub trait BusConnection: Send + Sync {
    /// VK of the bound identity, URL-safe base64.
    fn vk(&self) -> &str;

    /// Retained messages under `uri`. The stream ends when the bus has
    /// delivered everything it has.
    async fn query(&self, uri: &str) -> Result<MessageStream, BusError>;

    /// Publish payload objects to `uri`.
    async fn publish(
        &self,
        uri: &str,
        payload_objects: Vec<PayloadObject>,
        persist: bool,
    ) -> Result<(), BusError>;

    /// Live messages under `uri` until the returned handle is dropped.
    async fn subscribe(&self, uri: &str) -> Result<Subscription, BusError>;
}

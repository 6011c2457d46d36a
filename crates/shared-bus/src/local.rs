//! # In-Process Bus
//!
//! `LocalRouter` implements the bus traits inside the gateway process.
//! Suitable for single-node deployments and tests; a networked agent would
//! implement the same traits.
//!
//! - Live traffic goes over one `tokio::sync::broadcast` channel; each
//!   subscription filters it by URI pattern.
//! - Persisted publishes are retained (last message per URI) and served by
//!   `query`.
//! - Active subscriptions are counted per pattern and released on drop.

use crate::connection::{BusAgent, BusConnection, BusError, MessageStream, Subscription};
use crate::entity::Entity;
use crate::message::{Message, PayloadObject};
use crate::uri::{uri_matches, validate_pattern, validate_topic};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use futures::future;
use futures::StreamExt;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

/// Agent address that selects the in-process router.
pub const LOCAL_AGENT_ADDRESS: &str = "local";

type SubscriptionCounts = Arc<RwLock<HashMap<String, usize>>>;

/// Shared state of the in-process bus.
pub struct LocalRouter {
    /// Live message fan-out.
    sender: broadcast::Sender<Message>,

    /// Last persisted message per URI.
    retained: RwLock<BTreeMap<String, Message>>,

    /// Active subscription count by pattern.
    subscriptions: SubscriptionCounts,

    /// Total messages published.
    messages_published: AtomicU64,

    capacity: usize,
}

impl LocalRouter {
    /// Create a router with default capacity.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a router with the given per-subscriber buffer.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self {
            sender,
            retained: RwLock::new(BTreeMap::new()),
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            messages_published: AtomicU64::new(0),
            capacity,
        })
    }

    /// Agent bound to this router.
    #[must_use]
    pub fn agent(self: &Arc<Self>) -> LocalAgent {
        LocalAgent {
            router: Arc::clone(self),
            address: LOCAL_AGENT_ADDRESS.to_string(),
        }
    }

    /// Active subscriptions on exactly `pattern`.
    #[must_use]
    pub fn subscription_count(&self, pattern: &str) -> usize {
        self.subscriptions.read().get(pattern).copied().unwrap_or(0)
    }

    /// Active subscriptions across all patterns.
    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.read().values().sum()
    }

    /// Total messages published.
    #[must_use]
    pub fn messages_published(&self) -> u64 {
        self.messages_published.load(Ordering::Relaxed)
    }

    /// Per-subscriber buffer size.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn retained_matching(&self, pattern: &str) -> Vec<Message> {
        self.retained
            .read()
            .iter()
            .filter(|(uri, _)| uri_matches(pattern, uri))
            .map(|(_, msg)| msg.clone())
            .collect()
    }

    fn deliver(&self, message: Message, persist: bool) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);

        if persist {
            self.retained
                .write()
                .insert(message.uri.clone(), message.clone());
        }

        let uri = message.uri.clone();
        match self.sender.send(message) {
            Ok(receivers) => debug!(uri = %uri, receivers, persist, "Message published"),
            Err(_) => debug!(uri = %uri, persist, "Message published (no live subscribers)"),
        }
    }

    fn open_subscription(&self, pattern: &str) -> Subscription {
        let receiver = self.sender.subscribe();
        *self
            .subscriptions
            .write()
            .entry(pattern.to_string())
            .or_insert(0) += 1;

        debug!(pattern, "New subscription created");

        let filter = pattern.to_string();
        let stream = BroadcastStream::new(receiver)
            .filter_map(move |received| {
                future::ready(match received {
                    Ok(msg) if uri_matches(&filter, &msg.uri) => Some(msg),
                    Ok(_) => None,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(pattern = %filter, skipped, "Subscriber lagged, messages dropped");
                        None
                    }
                })
            })
            .boxed();

        let counts = Arc::clone(&self.subscriptions);
        let key = pattern.to_string();
        Subscription::new(stream, move || release(&counts, &key))
    }
}

fn release(counts: &SubscriptionCounts, pattern: &str) {
    let mut subs = counts.write();
    let Some(count) = subs.get_mut(pattern) else {
        return;
    };
    *count = count.saturating_sub(1);
    if *count == 0 {
        subs.remove(pattern);
    }
    debug!(pattern, "Subscription released");
}

/// Agent for the in-process router.
#[derive(Clone)]
pub struct LocalAgent {
    router: Arc<LocalRouter>,
    address: String,
}

#[async_trait]
impl BusAgent for LocalAgent {
    fn address(&self) -> &str {
        &self.address
    }

    async fn bind(&self, payload: &[u8]) -> Result<Arc<dyn BusConnection>, BusError> {
        let entity = Entity::from_payload(payload).map_err(|e| BusError::Bind(e.to_string()))?;
        let vk = entity.vk();
        debug!(vk = %vk, "Entity bound to local router");
        Ok(Arc::new(LocalConnection {
            vk,
            router: Arc::clone(&self.router),
        }))
    }
}

/// A connection on the in-process router.
pub struct LocalConnection {
    vk: String,
    router: Arc<LocalRouter>,
}

#[async_trait]
impl BusConnection for LocalConnection {
    fn vk(&self) -> &str {
        &self.vk
    }

    async fn query(&self, uri: &str) -> Result<MessageStream, BusError> {
        validate_pattern(uri)?;
        let matches = self.router.retained_matching(uri);
        Ok(futures::stream::iter(matches).boxed())
    }

    async fn publish(
        &self,
        uri: &str,
        payload_objects: Vec<PayloadObject>,
        persist: bool,
    ) -> Result<(), BusError> {
        validate_topic(uri)?;
        self.router
            .deliver(Message::new(uri, self.vk.as_str(), payload_objects), persist);
        Ok(())
    }

    async fn subscribe(&self, uri: &str) -> Result<Subscription, BusError> {
        validate_pattern(uri)?;
        Ok(self.router.open_subscription(uri))
    }
}

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use circles_types::{ChangeEvent, ChangeKind, CircleError, Collection};

use crate::subscription::Subscription;

/// Default number of undelivered events a slow subscriber may fall behind by
/// before it starts losing the oldest ones.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Fans row-level change events out to every open subscription.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Every subscriber receives every event and filters locally
    broadcast_tx: broadcast::Sender<ChangeEvent>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(DispatcherInner { broadcast_tx }),
        }
    }

    /// Publish a change to all subscribers. Having none is not an error.
    pub fn publish(&self, event: ChangeEvent) {
        debug!("publish {:?} on {}", event.kind, event.collection.table());
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register interest in some change kinds of one collection.
    ///
    /// `kinds` must not be empty. Only events published after this call are
    /// delivered.
    pub fn subscribe(
        &self,
        collection: Collection,
        kinds: &[ChangeKind],
    ) -> Result<Subscription, CircleError> {
        if kinds.is_empty() {
            return Err(CircleError::Validation(format!(
                "subscription to {} needs at least one event kind",
                collection.table()
            )));
        }

        let mut wanted = kinds.to_vec();
        wanted.sort();
        wanted.dedup();

        let subscription = Subscription::new(collection, wanted, self.inner.broadcast_tx.subscribe());
        debug!(
            "subscription {} opened on {} for {:?}",
            subscription.id(),
            collection.table(),
            kinds
        );
        Ok(subscription)
    }

    /// Number of live receivers, released or not yet dropped.
    pub fn receiver_count(&self) -> usize {
        self.inner.broadcast_tx.receiver_count()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

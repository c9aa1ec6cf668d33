use std::sync::Arc;

use uuid::Uuid;

use circles_realtime::Dispatcher;
use circles_types::CircleError;
use circles_types::store::{AuthContext, ChainClient, DurableStore};

use crate::config::{ClientConfig, DEFAULT_THREAD_TTL_DAYS};
use crate::identity::{AnonymousIds, FileStorage};
use crate::notice::Notifier;

/// Everything a view needs from the outside world.
#[derive(Clone)]
pub struct ClientContext {
    pub store: Arc<dyn DurableStore>,
    pub feed: Dispatcher,
    pub auth: Arc<dyn AuthContext>,
    pub identities: Arc<AnonymousIds>,
    pub notifier: Notifier,
    pub chain: Option<Arc<dyn ChainClient>>,
    pub thread_ttl_days: i64,
}

impl ClientContext {
    pub fn new(
        store: Arc<dyn DurableStore>,
        feed: Dispatcher,
        auth: Arc<dyn AuthContext>,
        identities: Arc<AnonymousIds>,
        notifier: Notifier,
    ) -> Self {
        Self {
            store,
            feed,
            auth,
            identities,
            notifier,
            chain: None,
            thread_ttl_days: DEFAULT_THREAD_TTL_DAYS,
        }
    }

    /// Build a context whose pseudonyms live in the configured identity file.
    pub fn from_config(
        config: &ClientConfig,
        store: Arc<dyn DurableStore>,
        feed: Dispatcher,
        auth: Arc<dyn AuthContext>,
        notifier: Notifier,
    ) -> Result<Self, CircleError> {
        let storage = FileStorage::open(&config.identity_path).map_err(CircleError::Storage)?;
        let identities = Arc::new(AnonymousIds::new(Arc::new(storage)));
        Ok(Self::new(store, feed, auth, identities, notifier)
            .with_thread_ttl_days(config.thread_ttl_days))
    }

    pub fn with_chain(mut self, chain: Arc<dyn ChainClient>) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn with_thread_ttl_days(mut self, days: i64) -> Self {
        self.thread_ttl_days = days;
        self
    }
}

/// A fixed signed-in user (or nobody).
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticAuth(pub Option<Uuid>);

impl StaticAuth {
    pub fn signed_in(user_id: Uuid) -> Self {
        Self(Some(user_id))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl AuthContext for StaticAuth {
    fn current_user(&self) -> Option<Uuid> {
        self.0
    }
}

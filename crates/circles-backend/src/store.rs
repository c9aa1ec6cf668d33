use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use circles_db::Database;
use circles_db::queries::VoteChange;
use circles_realtime::Dispatcher;
use circles_types::api::{ChatMessageRow, ThreadMessageRow, ThreadRow, VoteRow};
use circles_types::store::DurableStore;
use circles_types::{ChangeEvent, ChangeKind, Collection, VoteDirection};

use crate::config::BackendConfig;

/// SQLite tables plus the change feed that mirrors every write.
///
/// Each write runs on the blocking pool and, once committed, publishes the
/// affected row to the dispatcher.
#[derive(Clone)]
pub struct Backend {
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl Backend {
    pub fn new(db: Database, dispatcher: Dispatcher) -> Self {
        Self {
            db: Arc::new(db),
            dispatcher,
        }
    }

    pub fn open(config: &BackendConfig) -> Result<Self> {
        let db = Database::open(&config.db_path)?;
        Ok(Self::new(db, Dispatcher::with_capacity(config.feed_capacity)))
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?, Dispatcher::new()))
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn create_circle(&self, name: &str) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let name_owned = name.to_string();
        self.blocking(move |db| db.create_circle(&id.to_string(), &name_owned))
            .await?;
        info!("Support circle '{}' created ({})", name, id);
        Ok(id)
    }

    /// Id of the circle called `name`, creating it on first use.
    pub async fn ensure_circle(&self, name: &str) -> Result<Uuid> {
        let name_owned = name.to_string();
        let existing = self
            .blocking(move |db| db.find_circle_by_name(&name_owned))
            .await?;
        match existing {
            Some(id) => Ok(Uuid::parse_str(&id)?),
            None => self.create_circle(name).await,
        }
    }

    pub async fn upsert_profile(&self, user_id: Uuid, username: &str) -> Result<()> {
        let username = username.to_string();
        self.blocking(move |db| db.upsert_profile(&user_id.to_string(), &username))
            .await
    }

    /// Run a blocking DB call off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(db.as_ref()))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                anyhow!("Database task failed: {}", e)
            })?
    }

    fn publish<T: Serialize>(&self, collection: Collection, kind: ChangeKind, row: &T) {
        match ChangeEvent::new(collection, kind, row) {
            Ok(event) => self.dispatcher.publish(event),
            Err(e) => warn!("Dropping {:?} event on {}: {}", kind, collection.table(), e),
        }
    }

    fn publish_vote_change(&self, kind: ChangeKind, change: &VoteChange) {
        self.publish(Collection::MessageVotes, kind, &change.vote);
        self.publish(Collection::ThreadMessages, ChangeKind::Updated, &change.message);
    }
}

#[async_trait]
impl DurableStore for Backend {
    async fn circle_exists(&self, circle_id: Uuid) -> Result<bool> {
        self.blocking(move |db| db.circle_exists(&circle_id.to_string()))
            .await
    }

    // -- Threads --

    async fn threads_by_circle(&self, circle_id: Uuid) -> Result<Vec<ThreadRow>> {
        self.blocking(move |db| db.get_threads(&circle_id.to_string()))
            .await
    }

    async fn view_thread(&self, thread_id: Uuid) -> Result<ThreadRow> {
        let row = self
            .blocking(move |db| db.increment_view_count(&thread_id.to_string()))
            .await?
            .ok_or_else(|| anyhow!("Thread not found: {}", thread_id))?;
        self.publish(Collection::DiscussionThreads, ChangeKind::Updated, &row);
        Ok(row)
    }

    async fn insert_thread(&self, row: &ThreadRow) -> Result<ThreadRow> {
        let row = row.clone();
        let stored = self.blocking(move |db| db.insert_thread(&row)).await?;
        self.publish(Collection::DiscussionThreads, ChangeKind::Created, &stored);
        Ok(stored)
    }

    async fn set_thread_blockchain_id(&self, thread_id: Uuid, blockchain_id: &str) -> Result<()> {
        let blockchain_id = blockchain_id.to_string();
        let row = self
            .blocking(move |db| db.set_thread_blockchain_id(&thread_id.to_string(), &blockchain_id))
            .await?
            .ok_or_else(|| anyhow!("Thread not found: {}", thread_id))?;
        self.publish(Collection::DiscussionThreads, ChangeKind::Updated, &row);
        Ok(())
    }

    // -- Thread messages --

    async fn messages_by_thread(&self, thread_id: Uuid) -> Result<Vec<ThreadMessageRow>> {
        self.blocking(move |db| db.get_thread_messages(&thread_id.to_string()))
            .await
    }

    async fn insert_thread_message(&self, row: &ThreadMessageRow) -> Result<()> {
        let row = row.clone();
        let stored = self.blocking(move |db| db.insert_thread_message(&row)).await?;
        self.publish(Collection::ThreadMessages, ChangeKind::Created, &stored);
        Ok(())
    }

    async fn delete_thread_message(&self, message_id: Uuid) -> Result<()> {
        let removed = self
            .blocking(move |db| db.delete_thread_message(&message_id.to_string()))
            .await?
            .ok_or_else(|| anyhow!("Message not found: {}", message_id))?;
        self.publish(Collection::ThreadMessages, ChangeKind::Deleted, &removed);
        Ok(())
    }

    // -- Votes --

    async fn find_vote(&self, message_id: Uuid, user_id: Uuid) -> Result<Option<VoteRow>> {
        self.blocking(move |db| db.find_vote(&message_id.to_string(), &user_id.to_string()))
            .await
    }

    async fn votes_by_user(&self, user_id: Uuid) -> Result<Vec<VoteRow>> {
        self.blocking(move |db| db.get_votes_by_user(&user_id.to_string()))
            .await
    }

    async fn insert_vote(&self, row: &VoteRow) -> Result<()> {
        let row = row.clone();
        let change = self.blocking(move |db| db.insert_vote(&row)).await?;
        self.publish_vote_change(ChangeKind::Created, &change);
        Ok(())
    }

    async fn update_vote(&self, vote_id: Uuid, direction: VoteDirection) -> Result<()> {
        let change = self
            .blocking(move |db| db.update_vote(&vote_id.to_string(), direction))
            .await?
            .ok_or_else(|| anyhow!("Vote not found: {}", vote_id))?;
        self.publish_vote_change(ChangeKind::Updated, &change);
        Ok(())
    }

    async fn delete_vote(&self, vote_id: Uuid) -> Result<()> {
        let change = self
            .blocking(move |db| db.delete_vote(&vote_id.to_string()))
            .await?
            .ok_or_else(|| anyhow!("Vote not found: {}", vote_id))?;
        self.publish_vote_change(ChangeKind::Deleted, &change);
        Ok(())
    }

    // -- Chat --

    async fn chat_messages_by_circle(&self, circle_id: Uuid) -> Result<Vec<ChatMessageRow>> {
        self.blocking(move |db| db.get_chat_messages(&circle_id.to_string()))
            .await
    }

    async fn insert_chat_message(&self, row: &ChatMessageRow) -> Result<()> {
        let row = row.clone();
        let stored = self.blocking(move |db| db.insert_chat_message(&row)).await?;
        self.publish(Collection::CircleMessages, ChangeKind::Created, &stored);
        Ok(())
    }

    async fn delete_chat_message(&self, message_id: Uuid) -> Result<()> {
        let removed = self
            .blocking(move |db| db.delete_chat_message(&message_id.to_string()))
            .await?
            .ok_or_else(|| anyhow!("Chat message not found: {}", message_id))?;
        self.publish(Collection::CircleMessages, ChangeKind::Deleted, &removed);
        Ok(())
    }
}

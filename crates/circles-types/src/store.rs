//! Collaborators the client core is written against.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{ChatMessageRow, ThreadMessageRow, ThreadRow, VoteRow};
use crate::models::VoteDirection;

/// Row-level CRUD over the durable collections.
///
/// Change events for every successful write are delivered separately on the
/// feed; implementations must not assume the caller observes them.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn circle_exists(&self, circle_id: Uuid) -> Result<bool>;

    // -- Threads --

    /// Threads in a circle, newest first.
    async fn threads_by_circle(&self, circle_id: Uuid) -> Result<Vec<ThreadRow>>;

    /// Fetch a thread for display and count the view.
    async fn view_thread(&self, thread_id: Uuid) -> Result<ThreadRow>;

    async fn insert_thread(&self, row: &ThreadRow) -> Result<ThreadRow>;

    async fn set_thread_blockchain_id(&self, thread_id: Uuid, blockchain_id: &str) -> Result<()>;

    // -- Thread messages --

    /// Messages in a thread, oldest first.
    async fn messages_by_thread(&self, thread_id: Uuid) -> Result<Vec<ThreadMessageRow>>;

    async fn insert_thread_message(&self, row: &ThreadMessageRow) -> Result<()>;

    async fn delete_thread_message(&self, message_id: Uuid) -> Result<()>;

    // -- Votes --

    async fn find_vote(&self, message_id: Uuid, user_id: Uuid) -> Result<Option<VoteRow>>;

    async fn votes_by_user(&self, user_id: Uuid) -> Result<Vec<VoteRow>>;

    async fn insert_vote(&self, row: &VoteRow) -> Result<()>;

    async fn update_vote(&self, vote_id: Uuid, direction: VoteDirection) -> Result<()>;

    async fn delete_vote(&self, vote_id: Uuid) -> Result<()>;

    // -- Chat --

    /// Chat messages in a circle, oldest first.
    async fn chat_messages_by_circle(&self, circle_id: Uuid) -> Result<Vec<ChatMessageRow>>;

    async fn insert_chat_message(&self, row: &ChatMessageRow) -> Result<()>;

    async fn delete_chat_message(&self, message_id: Uuid) -> Result<()>;
}

/// Who is signed in, if anyone.
pub trait AuthContext: Send + Sync {
    fn current_user(&self) -> Option<Uuid>;
}

/// A record as stored by the discussion contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainRecord {
    pub id: u64,
    pub content: String,
    pub author: String,
    pub timestamp: i64,
    pub view_count: u64,
}

/// Remote procedures of the deployed discussion contract. Each call resolves
/// only after network confirmation.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn create_record(&self, content: &str) -> Result<()>;

    async fn record_count(&self) -> Result<u64>;

    async fn get_record(&self, index: u64) -> Result<ChainRecord>;

    async fn add_comment(&self, record: u64, content: &str) -> Result<()>;

    async fn vote_comment(&self, record: u64, comment: u64, upvote: bool) -> Result<()>;
}

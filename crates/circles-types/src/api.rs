//! Row shapes exactly as the durable store stores and emits them.
//!
//! Each collection has one row struct and one `From` conversion into its
//! domain model; schema drift is absorbed here and nowhere else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChatMessage, Tally, Thread, ThreadMessage, Vote, VoteDirection};

// -- JWT Claims --

/// Claims carried by session tokens issued by the auth collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Threads --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadRow {
    pub id: Uuid,
    pub circle_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub anonymous_id: String,
    #[serde(default)]
    pub view_count: u32,
    #[serde(default)]
    pub blockchain_id: Option<String>,
}

impl From<ThreadRow> for Thread {
    fn from(row: ThreadRow) -> Self {
        Self {
            id: row.id,
            circle_id: row.circle_id,
            title: row.title,
            anonymous_id: row.anonymous_id,
            created_at: row.created_at,
            expires_at: row.expires_at,
            view_count: row.view_count,
            blockchain_id: row.blockchain_id.filter(|id| !id.is_empty()),
        }
    }
}

impl From<&Thread> for ThreadRow {
    fn from(thread: &Thread) -> Self {
        Self {
            id: thread.id,
            circle_id: thread.circle_id,
            title: thread.title.clone(),
            created_at: thread.created_at,
            expires_at: thread.expires_at,
            anonymous_id: thread.anonymous_id.clone(),
            view_count: thread.view_count,
            blockchain_id: thread.blockchain_id.clone(),
        }
    }
}

// -- Thread messages --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessageRow {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub anonymous_id: String,
    #[serde(default)]
    pub upvotes: u32,
    #[serde(default)]
    pub downvotes: u32,
    #[serde(default)]
    pub blockchain_id: Option<String>,
}

impl From<ThreadMessageRow> for ThreadMessage {
    fn from(row: ThreadMessageRow) -> Self {
        Self {
            id: row.id,
            thread_id: row.thread_id,
            content: row.content,
            created_at: row.created_at,
            anonymous_id: row.anonymous_id,
            tally: Tally::new(row.upvotes, row.downvotes),
            user_vote: None,
            blockchain_id: row.blockchain_id.filter(|id| !id.is_empty()),
        }
    }
}

impl From<&ThreadMessage> for ThreadMessageRow {
    fn from(message: &ThreadMessage) -> Self {
        Self {
            id: message.id,
            thread_id: message.thread_id,
            content: message.content.clone(),
            created_at: message.created_at,
            anonymous_id: message.anonymous_id.clone(),
            upvotes: message.tally.upvotes,
            downvotes: message.tally.downvotes,
            blockchain_id: message.blockchain_id.clone(),
        }
    }
}

// -- Chat --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessageRow {
    pub id: Uuid,
    pub circle_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Joined from the author's profile when available.
    #[serde(default)]
    pub username: Option<String>,
}

impl From<ChatMessageRow> for ChatMessage {
    fn from(row: ChatMessageRow) -> Self {
        Self {
            id: row.id,
            circle_id: row.circle_id,
            user_id: row.user_id,
            content: row.content,
            created_at: row.created_at,
            username: row.username,
        }
    }
}

impl From<&ChatMessage> for ChatMessageRow {
    fn from(message: &ChatMessage) -> Self {
        Self {
            id: message.id,
            circle_id: message.circle_id,
            user_id: message.user_id,
            content: message.content.clone(),
            created_at: message.created_at,
            username: message.username.clone(),
        }
    }
}

// -- Votes --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteRow {
    pub id: Uuid,
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub vote_type: VoteDirection,
    pub created_at: DateTime<Utc>,
}

impl From<VoteRow> for Vote {
    fn from(row: VoteRow) -> Self {
        Self {
            id: row.id,
            message_id: row.message_id,
            user_id: row.user_id,
            direction: row.vote_type,
            created_at: row.created_at,
        }
    }
}

impl From<&Vote> for VoteRow {
    fn from(vote: &Vote) -> Self {
        Self {
            id: vote.id,
            message_id: vote.message_id,
            user_id: vote.user_id,
            vote_type: vote.direction,
            created_at: vote.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn thread_message_row_defaults_missing_tallies() {
        let row: ThreadMessageRow = serde_json::from_value(json!({
            "id": "6a3c1a3e-6a8f-4a4e-9d53-0d7a2c0f1b11",
            "thread_id": "0f2b2d8e-3c1e-4b1a-8d3b-51f0b6d2a7c4",
            "content": "hi",
            "created_at": "2024-05-01T12:00:00Z",
            "anonymous_id": "anon-1234abcd",
        }))
        .unwrap();

        let message = ThreadMessage::from(row);
        assert_eq!(message.tally, Tally::default());
        assert_eq!(message.user_vote, None);
        assert_eq!(message.blockchain_id, None);
    }

    #[test]
    fn empty_blockchain_id_means_none() {
        let row: ThreadRow = serde_json::from_value(json!({
            "id": "6a3c1a3e-6a8f-4a4e-9d53-0d7a2c0f1b11",
            "circle_id": "0f2b2d8e-3c1e-4b1a-8d3b-51f0b6d2a7c4",
            "title": "Coping with loss",
            "created_at": "2024-05-01T12:00:00Z",
            "expires_at": "2024-05-31T12:00:00Z",
            "anonymous_id": "anon-1234abcd",
            "view_count": 4,
            "blockchain_id": "",
        }))
        .unwrap();

        let thread = Thread::from(row);
        assert_eq!(thread.view_count, 4);
        assert_eq!(thread.blockchain_id, None);
    }

    #[test]
    fn vote_row_uses_store_vote_type_names() {
        let row: VoteRow = serde_json::from_value(json!({
            "id": "6a3c1a3e-6a8f-4a4e-9d53-0d7a2c0f1b11",
            "message_id": "0f2b2d8e-3c1e-4b1a-8d3b-51f0b6d2a7c4",
            "user_id": "2b0f6d1e-9c3a-4f8e-b2d1-7a6c5e4d3b21",
            "vote_type": "downvote",
            "created_at": "2024-05-01T12:00:00Z",
        }))
        .unwrap();
        assert_eq!(Vote::from(row).direction, VoteDirection::Down);
    }
}

use serde::{Deserialize, Serialize};

use crate::api::{ChatMessageRow, ThreadMessageRow, ThreadRow, VoteRow};
use crate::error::CircleError;
use crate::models::{ChatMessage, Thread, ThreadMessage, Vote};

/// Durable collections that publish row-level change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    DiscussionThreads,
    ThreadMessages,
    MessageVotes,
    CircleMessages,
}

impl Collection {
    pub fn table(self) -> &'static str {
        match self {
            Self::DiscussionThreads => "discussion_threads",
            Self::ThreadMessages => "thread_messages",
            Self::MessageVotes => "message_votes",
            Self::CircleMessages => "circle_messages",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// A row-level change as it comes off the feed.
///
/// `record` is the row's new state for `Created`/`Updated` and its last-known
/// state for `Deleted`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub collection: Collection,
    pub kind: ChangeKind,
    pub record: serde_json::Value,
}

impl ChangeEvent {
    pub fn new<T: Serialize>(
        collection: Collection,
        kind: ChangeKind,
        row: &T,
    ) -> Result<Self, CircleError> {
        let record = serde_json::to_value(row).map_err(|source| CircleError::Decode {
            collection: collection.table(),
            source,
        })?;
        Ok(Self {
            collection,
            kind,
            record,
        })
    }

    /// Decode the payload into the domain model for this collection.
    pub fn decode(&self) -> Result<Record, CircleError> {
        Record::decode(self.collection, &self.record)
    }
}

/// A decoded change payload, one variant per collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Thread(Thread),
    ThreadMessage(ThreadMessage),
    ChatMessage(ChatMessage),
    Vote(Vote),
}

impl Record {
    pub fn decode(collection: Collection, payload: &serde_json::Value) -> Result<Self, CircleError> {
        let decode_err = |source| CircleError::Decode {
            collection: collection.table(),
            source,
        };
        let record = match collection {
            Collection::DiscussionThreads => {
                let row: ThreadRow = serde_json::from_value(payload.clone()).map_err(decode_err)?;
                Self::Thread(row.into())
            }
            Collection::ThreadMessages => {
                let row: ThreadMessageRow =
                    serde_json::from_value(payload.clone()).map_err(decode_err)?;
                Self::ThreadMessage(row.into())
            }
            Collection::MessageVotes => {
                let row: VoteRow = serde_json::from_value(payload.clone()).map_err(decode_err)?;
                Self::Vote(row.into())
            }
            Collection::CircleMessages => {
                let row: ChatMessageRow =
                    serde_json::from_value(payload.clone()).map_err(decode_err)?;
                Self::ChatMessage(row.into())
            }
        };
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn decode_matches_collection() {
        let row = ChatMessageRow {
            id: Uuid::new_v4(),
            circle_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            content: "hello".into(),
            created_at: Utc::now(),
            username: None,
        };
        let event = ChangeEvent::new(Collection::CircleMessages, ChangeKind::Created, &row).unwrap();

        match event.decode().unwrap() {
            Record::ChatMessage(message) => {
                assert_eq!(message.id, row.id);
                assert_eq!(message.content, "hello");
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn decode_rejects_wrong_shape() {
        let event = ChangeEvent {
            collection: Collection::MessageVotes,
            kind: ChangeKind::Created,
            record: serde_json::json!({ "id": "not-a-uuid" }),
        };
        let err = event.decode().unwrap_err();
        assert!(matches!(err, CircleError::Decode { collection: "message_votes", .. }));
    }
}

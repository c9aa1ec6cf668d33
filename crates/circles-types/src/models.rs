use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Anything held in an optimistic list is identified by a single UUID.
pub trait Keyed {
    fn key(&self) -> Uuid;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteDirection {
    #[serde(rename = "upvote")]
    Up,
    #[serde(rename = "downvote")]
    Down,
}

impl VoteDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "upvote",
            Self::Down => "downvote",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "upvote" => Some(Self::Up),
            "downvote" => Some(Self::Down),
            _ => None,
        }
    }
}

/// Up/down counts for one message. Both buckets stay non-negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub upvotes: u32,
    pub downvotes: u32,
}

impl Tally {
    pub fn new(upvotes: u32, downvotes: u32) -> Self {
        Self { upvotes, downvotes }
    }

    /// Move one voter from `prev` to `next`. At most one bucket is
    /// decremented and at most one incremented.
    pub fn apply(&mut self, prev: Option<VoteDirection>, next: Option<VoteDirection>) {
        if prev == next {
            return;
        }
        match prev {
            Some(VoteDirection::Up) => self.upvotes = self.upvotes.saturating_sub(1),
            Some(VoteDirection::Down) => self.downvotes = self.downvotes.saturating_sub(1),
            None => {}
        }
        match next {
            Some(VoteDirection::Up) => self.upvotes += 1,
            Some(VoteDirection::Down) => self.downvotes += 1,
            None => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: Uuid,
    pub circle_id: Uuid,
    pub title: String,
    pub anonymous_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub view_count: u32,
    /// Index of the matching record on chain, for chain-backed threads.
    pub blockchain_id: Option<String>,
}

impl Thread {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl Keyed for Thread {
    fn key(&self) -> Uuid {
        self.id
    }
}

/// A message posted inside a discussion thread, attributed to a pseudonym.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub anonymous_id: String,
    pub tally: Tally,
    /// The caller's own vote. Local state only; the store never sends it.
    pub user_vote: Option<VoteDirection>,
    pub blockchain_id: Option<String>,
}

impl Keyed for ThreadMessage {
    fn key(&self) -> Uuid {
        self.id
    }
}

/// A real-time chat message inside a circle. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub circle_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub username: Option<String>,
}

impl Keyed for ChatMessage {
    fn key(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub id: Uuid,
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub direction: VoteDirection,
    pub created_at: DateTime<Utc>,
}

impl Keyed for Vote {
    fn key(&self) -> Uuid {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn tally_none_to_up() {
        let mut t = Tally::default();
        t.apply(None, Some(VoteDirection::Up));
        assert_eq!(t, Tally::new(1, 0));
    }

    #[test]
    fn tally_switch_direction() {
        let mut t = Tally::new(1, 0);
        t.apply(Some(VoteDirection::Up), Some(VoteDirection::Down));
        assert_eq!(t, Tally::new(0, 1));
        t.apply(Some(VoteDirection::Down), None);
        assert_eq!(t, Tally::new(0, 0));
    }

    #[test]
    fn tally_same_direction_is_noop() {
        let mut t = Tally::new(3, 2);
        t.apply(Some(VoteDirection::Down), Some(VoteDirection::Down));
        assert_eq!(t, Tally::new(3, 2));
    }

    #[test]
    fn tally_never_goes_negative() {
        let mut t = Tally::default();
        t.apply(Some(VoteDirection::Up), None);
        assert_eq!(t, Tally::default());
    }

    #[test]
    fn vote_direction_wire_names() {
        assert_eq!(serde_json::to_string(&VoteDirection::Up).unwrap(), "\"upvote\"");
        assert_eq!(VoteDirection::parse("downvote"), Some(VoteDirection::Down));
        assert_eq!(VoteDirection::parse("remove"), None);
    }

    #[test]
    fn thread_expiry() {
        let now = Utc::now();
        let thread = Thread {
            id: Uuid::new_v4(),
            circle_id: Uuid::new_v4(),
            title: "t".into(),
            anonymous_id: "anon-00000000".into(),
            created_at: now - Duration::days(31),
            expires_at: now - Duration::days(1),
            view_count: 0,
            blockchain_id: None,
        };
        assert!(thread.is_expired(now));
        assert!(!thread.is_expired(now - Duration::days(2)));
    }
}

//! Database row types. These map directly to SQLite rows.
//! Distinct from circles-types wire rows to keep the DB layer independent.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use uuid::Uuid;

use circles_types::VoteDirection;
use circles_types::api::{ChatMessageRow, ThreadMessageRow, ThreadRow, VoteRow};

pub struct ThreadRecord {
    pub id: String,
    pub circle_id: String,
    pub title: String,
    pub anonymous_id: String,
    pub created_at: String,
    pub expires_at: String,
    pub view_count: i64,
    pub blockchain_id: Option<String>,
}

pub struct ThreadMessageRecord {
    pub id: String,
    pub thread_id: String,
    pub content: String,
    pub anonymous_id: String,
    pub created_at: String,
    pub upvotes: i64,
    pub downvotes: i64,
    pub blockchain_id: Option<String>,
}

pub struct VoteRecord {
    pub id: String,
    pub message_id: String,
    pub user_id: String,
    pub vote_type: String,
    pub created_at: String,
}

pub struct ChatMessageRecord {
    pub id: String,
    pub circle_id: String,
    pub user_id: String,
    pub username: Option<String>,
    pub content: String,
    pub created_at: String,
}

/// Timestamps are stored as fixed-width RFC 3339 so that text ordering
/// matches time ordering.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's own datetime('now') has no timezone; treat it as UTC.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .with_context(|| format!("corrupt timestamp '{}'", raw))
}

fn parse_uuid(raw: &str, field: &str) -> Result<Uuid> {
    raw.parse::<Uuid>()
        .with_context(|| format!("corrupt {} '{}'", field, raw))
}

fn count(raw: i64) -> u32 {
    u32::try_from(raw).unwrap_or(0)
}

impl TryFrom<ThreadRecord> for ThreadRow {
    type Error = anyhow::Error;

    fn try_from(r: ThreadRecord) -> Result<Self> {
        Ok(Self {
            id: parse_uuid(&r.id, "thread id")?,
            circle_id: parse_uuid(&r.circle_id, "circle_id")?,
            title: r.title,
            created_at: parse_timestamp(&r.created_at)?,
            expires_at: parse_timestamp(&r.expires_at)?,
            anonymous_id: r.anonymous_id,
            view_count: count(r.view_count),
            blockchain_id: r.blockchain_id,
        })
    }
}

impl TryFrom<ThreadMessageRecord> for ThreadMessageRow {
    type Error = anyhow::Error;

    fn try_from(r: ThreadMessageRecord) -> Result<Self> {
        Ok(Self {
            id: parse_uuid(&r.id, "message id")?,
            thread_id: parse_uuid(&r.thread_id, "thread_id")?,
            content: r.content,
            created_at: parse_timestamp(&r.created_at)?,
            anonymous_id: r.anonymous_id,
            upvotes: count(r.upvotes),
            downvotes: count(r.downvotes),
            blockchain_id: r.blockchain_id,
        })
    }
}

impl TryFrom<VoteRecord> for VoteRow {
    type Error = anyhow::Error;

    fn try_from(r: VoteRecord) -> Result<Self> {
        let vote_type = VoteDirection::parse(&r.vote_type)
            .with_context(|| format!("corrupt vote_type '{}' on vote '{}'", r.vote_type, r.id))?;
        Ok(Self {
            id: parse_uuid(&r.id, "vote id")?,
            message_id: parse_uuid(&r.message_id, "message_id")?,
            user_id: parse_uuid(&r.user_id, "user_id")?,
            vote_type,
            created_at: parse_timestamp(&r.created_at)?,
        })
    }
}

impl TryFrom<ChatMessageRecord> for ChatMessageRow {
    type Error = anyhow::Error;

    fn try_from(r: ChatMessageRecord) -> Result<Self> {
        Ok(Self {
            id: parse_uuid(&r.id, "message id")?,
            circle_id: parse_uuid(&r.circle_id, "circle_id")?,
            user_id: parse_uuid(&r.user_id, "user_id")?,
            content: r.content,
            created_at: parse_timestamp(&r.created_at)?,
            username: r.username,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_timestamp_formats() {
        let now = Utc::now();
        let stored = format_timestamp(&now);
        assert_eq!(parse_timestamp(&stored).unwrap().timestamp_micros(), now.timestamp_micros());

        let sqlite = parse_timestamp("2024-05-01 12:00:00").unwrap();
        assert_eq!(format_timestamp(&sqlite), "2024-05-01T12:00:00.000000Z");
    }

    #[test]
    fn corrupt_vote_type_is_an_error() {
        let record = VoteRecord {
            id: Uuid::new_v4().to_string(),
            message_id: Uuid::new_v4().to_string(),
            user_id: Uuid::new_v4().to_string(),
            vote_type: "sideways".into(),
            created_at: format_timestamp(&Utc::now()),
        };
        assert!(VoteRow::try_from(record).is_err());
    }
}

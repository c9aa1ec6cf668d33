use crate::Database;
use crate::models::{
    ChatMessageRecord, ThreadMessageRecord, ThreadRecord, VoteRecord, format_timestamp,
};
use anyhow::Result;
use rusqlite::{Connection, Row};

use circles_types::VoteDirection;
use circles_types::api::{ChatMessageRow, ThreadMessageRow, ThreadRow, VoteRow};

const THREAD_COLUMNS: &str =
    "id, circle_id, title, anonymous_id, created_at, expires_at, view_count, blockchain_id";
const MESSAGE_COLUMNS: &str =
    "id, thread_id, content, anonymous_id, created_at, upvotes, downvotes, blockchain_id";
const VOTE_COLUMNS: &str = "id, message_id, user_id, vote_type, created_at";

/// Result of a vote write: the vote row (new state, or last-known state for a
/// removal) plus the message with its recounted tallies.
pub struct VoteChange {
    pub vote: VoteRow,
    pub message: ThreadMessageRow,
}

impl Database {
    // -- Circles --

    pub fn create_circle(&self, id: &str, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO support_circles (id, name) VALUES (?1, ?2)",
                (id, name),
            )?;
            Ok(())
        })
    }

    pub fn circle_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT 1 FROM support_circles WHERE id = ?1", [id], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn find_circle_by_name(&self, name: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let id = conn
                .query_row("SELECT id FROM support_circles WHERE name = ?1", [name], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(id)
        })
    }

    // -- Profiles --

    pub fn upsert_profile(&self, id: &str, username: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO profiles (id, username) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET username = excluded.username",
                (id, username),
            )?;
            Ok(())
        })
    }

    // -- Threads --

    pub fn insert_thread(&self, row: &ThreadRow) -> Result<ThreadRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO discussion_threads
                    (id, circle_id, title, anonymous_id, created_at, expires_at, view_count, blockchain_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    row.id.to_string(),
                    row.circle_id.to_string(),
                    row.title,
                    row.anonymous_id,
                    format_timestamp(&row.created_at),
                    format_timestamp(&row.expires_at),
                    row.view_count,
                    row.blockchain_id,
                ],
            )?;
            query_thread(conn, &row.id.to_string())?
                .ok_or_else(|| anyhow::anyhow!("Thread vanished after insert: {}", row.id))
        })
    }

    pub fn get_thread(&self, id: &str) -> Result<Option<ThreadRow>> {
        self.with_conn(|conn| query_thread(conn, id))
    }

    /// Threads in a circle, newest first.
    pub fn get_threads(&self, circle_id: &str) -> Result<Vec<ThreadRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM discussion_threads WHERE circle_id = ?1 ORDER BY created_at DESC",
                THREAD_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let records = stmt
                .query_map([circle_id], thread_record)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            records.into_iter().map(ThreadRow::try_from).collect()
        })
    }

    /// Count one view and return the updated thread.
    pub fn increment_view_count(&self, id: &str) -> Result<Option<ThreadRow>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE discussion_threads SET view_count = view_count + 1 WHERE id = ?1",
                [id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_thread(conn, id)
        })
    }

    pub fn set_thread_blockchain_id(&self, id: &str, blockchain_id: &str) -> Result<Option<ThreadRow>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE discussion_threads SET blockchain_id = ?2 WHERE id = ?1",
                (id, blockchain_id),
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_thread(conn, id)
        })
    }

    // -- Thread messages --

    pub fn insert_thread_message(&self, row: &ThreadMessageRow) -> Result<ThreadMessageRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO thread_messages
                    (id, thread_id, content, anonymous_id, created_at, upvotes, downvotes, blockchain_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, ?6)",
                rusqlite::params![
                    row.id.to_string(),
                    row.thread_id.to_string(),
                    row.content,
                    row.anonymous_id,
                    format_timestamp(&row.created_at),
                    row.blockchain_id,
                ],
            )?;
            query_thread_message(conn, &row.id.to_string())?
                .ok_or_else(|| anyhow::anyhow!("Message vanished after insert: {}", row.id))
        })
    }

    pub fn get_thread_message(&self, id: &str) -> Result<Option<ThreadMessageRow>> {
        self.with_conn(|conn| query_thread_message(conn, id))
    }

    /// Messages in a thread, oldest first.
    pub fn get_thread_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM thread_messages WHERE thread_id = ?1 ORDER BY created_at ASC",
                MESSAGE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let records = stmt
                .query_map([thread_id], thread_message_record)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            records.into_iter().map(ThreadMessageRow::try_from).collect()
        })
    }

    /// Delete a message and its votes. Returns the last-known row, or `None`
    /// if nothing was deleted.
    pub fn delete_thread_message(&self, id: &str) -> Result<Option<ThreadMessageRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(existing) = query_thread_message(&tx, id)? else {
                return Ok(None);
            };
            tx.execute("DELETE FROM message_votes WHERE message_id = ?1", [id])?;
            tx.execute("DELETE FROM thread_messages WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(Some(existing))
        })
    }

    // -- Votes --

    pub fn find_vote(&self, message_id: &str, user_id: &str) -> Result<Option<VoteRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM message_votes WHERE message_id = ?1 AND user_id = ?2",
                VOTE_COLUMNS
            );
            conn.query_row(&sql, (message_id, user_id), vote_record)
                .optional()?
                .map(VoteRow::try_from)
                .transpose()
        })
    }

    pub fn get_votes_by_user(&self, user_id: &str) -> Result<Vec<VoteRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM message_votes WHERE user_id = ?1", VOTE_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let records = stmt
                .query_map([user_id], vote_record)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            records.into_iter().map(VoteRow::try_from).collect()
        })
    }

    /// Insert a vote and recount the message in one transaction. A second
    /// vote for the same (message, user) pair violates the unique index.
    pub fn insert_vote(&self, row: &VoteRow) -> Result<VoteChange> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let message_id = row.message_id.to_string();
            tx.execute(
                "INSERT INTO message_votes (id, message_id, user_id, vote_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    row.id.to_string(),
                    message_id,
                    row.user_id.to_string(),
                    row.vote_type.as_str(),
                    format_timestamp(&row.created_at),
                ],
            )?;
            let vote = query_vote(&tx, &row.id.to_string())?
                .ok_or_else(|| anyhow::anyhow!("Vote vanished after insert: {}", row.id))?;
            let message = recount_votes(&tx, &message_id)?;
            tx.commit()?;
            Ok(VoteChange { vote, message })
        })
    }

    pub fn update_vote(&self, id: &str, direction: VoteDirection) -> Result<Option<VoteChange>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE message_votes SET vote_type = ?2 WHERE id = ?1",
                (id, direction.as_str()),
            )?;
            if changed == 0 {
                return Ok(None);
            }
            let vote = query_vote(&tx, id)?
                .ok_or_else(|| anyhow::anyhow!("Vote vanished after update: {}", id))?;
            let message = recount_votes(&tx, &vote.message_id.to_string())?;
            tx.commit()?;
            Ok(Some(VoteChange { vote, message }))
        })
    }

    pub fn delete_vote(&self, id: &str) -> Result<Option<VoteChange>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(vote) = query_vote(&tx, id)? else {
                return Ok(None);
            };
            tx.execute("DELETE FROM message_votes WHERE id = ?1", [id])?;
            let message = recount_votes(&tx, &vote.message_id.to_string())?;
            tx.commit()?;
            Ok(Some(VoteChange { vote, message }))
        })
    }

    // -- Chat --

    pub fn insert_chat_message(&self, row: &ChatMessageRow) -> Result<ChatMessageRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO circle_messages (id, circle_id, user_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    row.id.to_string(),
                    row.circle_id.to_string(),
                    row.user_id.to_string(),
                    row.content,
                    format_timestamp(&row.created_at),
                ],
            )?;
            query_chat_message(conn, &row.id.to_string())?
                .ok_or_else(|| anyhow::anyhow!("Chat message vanished after insert: {}", row.id))
        })
    }

    /// Chat messages in a circle, oldest first.
    pub fn get_chat_messages(&self, circle_id: &str) -> Result<Vec<ChatMessageRow>> {
        self.with_conn(|conn| {
            // JOIN profiles to fetch the author's username in a single query
            let mut stmt = conn.prepare(
                "SELECT m.id, m.circle_id, m.user_id, p.username, m.content, m.created_at
                 FROM circle_messages m
                 LEFT JOIN profiles p ON m.user_id = p.id
                 WHERE m.circle_id = ?1
                 ORDER BY m.created_at ASC",
            )?;
            let records = stmt
                .query_map([circle_id], chat_message_record)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            records.into_iter().map(ChatMessageRow::try_from).collect()
        })
    }

    pub fn delete_chat_message(&self, id: &str) -> Result<Option<ChatMessageRow>> {
        self.with_conn(|conn| {
            let Some(existing) = query_chat_message(conn, id)? else {
                return Ok(None);
            };
            conn.execute("DELETE FROM circle_messages WHERE id = ?1", [id])?;
            Ok(Some(existing))
        })
    }
}

fn thread_record(row: &Row<'_>) -> rusqlite::Result<ThreadRecord> {
    Ok(ThreadRecord {
        id: row.get(0)?,
        circle_id: row.get(1)?,
        title: row.get(2)?,
        anonymous_id: row.get(3)?,
        created_at: row.get(4)?,
        expires_at: row.get(5)?,
        view_count: row.get(6)?,
        blockchain_id: row.get(7)?,
    })
}

fn thread_message_record(row: &Row<'_>) -> rusqlite::Result<ThreadMessageRecord> {
    Ok(ThreadMessageRecord {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        content: row.get(2)?,
        anonymous_id: row.get(3)?,
        created_at: row.get(4)?,
        upvotes: row.get(5)?,
        downvotes: row.get(6)?,
        blockchain_id: row.get(7)?,
    })
}

fn vote_record(row: &Row<'_>) -> rusqlite::Result<VoteRecord> {
    Ok(VoteRecord {
        id: row.get(0)?,
        message_id: row.get(1)?,
        user_id: row.get(2)?,
        vote_type: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn chat_message_record(row: &Row<'_>) -> rusqlite::Result<ChatMessageRecord> {
    Ok(ChatMessageRecord {
        id: row.get(0)?,
        circle_id: row.get(1)?,
        user_id: row.get(2)?,
        username: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn query_thread(conn: &Connection, id: &str) -> Result<Option<ThreadRow>> {
    let sql = format!("SELECT {} FROM discussion_threads WHERE id = ?1", THREAD_COLUMNS);
    conn.query_row(&sql, [id], thread_record)
        .optional()?
        .map(ThreadRow::try_from)
        .transpose()
}

fn query_thread_message(conn: &Connection, id: &str) -> Result<Option<ThreadMessageRow>> {
    let sql = format!("SELECT {} FROM thread_messages WHERE id = ?1", MESSAGE_COLUMNS);
    conn.query_row(&sql, [id], thread_message_record)
        .optional()?
        .map(ThreadMessageRow::try_from)
        .transpose()
}

fn query_vote(conn: &Connection, id: &str) -> Result<Option<VoteRow>> {
    let sql = format!("SELECT {} FROM message_votes WHERE id = ?1", VOTE_COLUMNS);
    conn.query_row(&sql, [id], vote_record)
        .optional()?
        .map(VoteRow::try_from)
        .transpose()
}

fn query_chat_message(conn: &Connection, id: &str) -> Result<Option<ChatMessageRow>> {
    conn.query_row(
        "SELECT m.id, m.circle_id, m.user_id, p.username, m.content, m.created_at
         FROM circle_messages m
         LEFT JOIN profiles p ON m.user_id = p.id
         WHERE m.id = ?1",
        [id],
        chat_message_record,
    )
    .optional()?
    .map(ChatMessageRow::try_from)
    .transpose()
}

/// Recompute a message's tallies from its vote rows. The vote table is the
/// source of truth; the counters on the message are derived.
fn recount_votes(conn: &Connection, message_id: &str) -> Result<ThreadMessageRow> {
    conn.execute(
        "UPDATE thread_messages SET
            upvotes = (SELECT COUNT(*) FROM message_votes WHERE message_id = ?1 AND vote_type = 'upvote'),
            downvotes = (SELECT COUNT(*) FROM message_votes WHERE message_id = ?1 AND vote_type = 'downvote')
         WHERE id = ?1",
        [message_id],
    )?;
    query_thread_message(conn, message_id)?
        .ok_or_else(|| anyhow::anyhow!("Message not found: {}", message_id))
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn seeded() -> (Database, Uuid, ThreadRow) {
        let db = Database::open_in_memory().unwrap();
        let circle = Uuid::new_v4();
        db.create_circle(&circle.to_string(), "grief support").unwrap();
        let now = Utc::now();
        let thread = db
            .insert_thread(&ThreadRow {
                id: Uuid::new_v4(),
                circle_id: circle,
                title: "First week".into(),
                created_at: now,
                expires_at: now + Duration::days(30),
                anonymous_id: "anon-0badf00d".into(),
                view_count: 0,
                blockchain_id: None,
            })
            .unwrap();
        (db, circle, thread)
    }

    fn message(db: &Database, thread_id: Uuid) -> ThreadMessageRow {
        db.insert_thread_message(&ThreadMessageRow {
            id: Uuid::new_v4(),
            thread_id,
            content: "you are not alone".into(),
            created_at: Utc::now(),
            anonymous_id: "anon-0badf00d".into(),
            upvotes: 0,
            downvotes: 0,
            blockchain_id: None,
        })
        .unwrap()
    }

    fn vote(message_id: Uuid, user_id: Uuid, vote_type: VoteDirection) -> VoteRow {
        VoteRow {
            id: Uuid::new_v4(),
            message_id,
            user_id,
            vote_type,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn circles_are_found_by_name() {
        let (db, circle, _) = seeded();
        assert_eq!(
            db.find_circle_by_name("grief support").unwrap(),
            Some(circle.to_string())
        );
        assert_eq!(db.find_circle_by_name("nobody here").unwrap(), None);
    }

    #[test]
    fn view_count_increments_per_fetch() {
        let (db, _, thread) = seeded();
        let id = thread.id.to_string();
        assert_eq!(db.increment_view_count(&id).unwrap().unwrap().view_count, 1);
        assert_eq!(db.increment_view_count(&id).unwrap().unwrap().view_count, 2);
        assert!(db.increment_view_count(&Uuid::new_v4().to_string()).unwrap().is_none());
    }

    #[test]
    fn threads_are_listed_newest_first() {
        let (db, circle, first) = seeded();
        let now = Utc::now() + Duration::seconds(5);
        let second = db
            .insert_thread(&ThreadRow {
                id: Uuid::new_v4(),
                circle_id: circle,
                title: "Second".into(),
                created_at: now,
                expires_at: now + Duration::days(30),
                anonymous_id: "anon-0badf00d".into(),
                view_count: 0,
                blockchain_id: None,
            })
            .unwrap();

        let ids: Vec<Uuid> = db
            .get_threads(&circle.to_string())
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[test]
    fn vote_writes_recount_tallies() {
        let (db, _, thread) = seeded();
        let msg = message(&db, thread.id);
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let change = db.insert_vote(&vote(msg.id, alice, VoteDirection::Up)).unwrap();
        assert_eq!((change.message.upvotes, change.message.downvotes), (1, 0));

        let change = db.insert_vote(&vote(msg.id, bob, VoteDirection::Up)).unwrap();
        assert_eq!((change.message.upvotes, change.message.downvotes), (2, 0));

        let change = db
            .update_vote(&change.vote.id.to_string(), VoteDirection::Down)
            .unwrap()
            .unwrap();
        assert_eq!((change.message.upvotes, change.message.downvotes), (1, 1));

        let change = db.delete_vote(&change.vote.id.to_string()).unwrap().unwrap();
        assert_eq!(change.vote.user_id, bob);
        assert_eq!((change.message.upvotes, change.message.downvotes), (1, 0));
    }

    #[test]
    fn second_vote_for_same_pair_is_rejected() {
        let (db, _, thread) = seeded();
        let msg = message(&db, thread.id);
        let alice = Uuid::new_v4();

        db.insert_vote(&vote(msg.id, alice, VoteDirection::Up)).unwrap();
        assert!(db.insert_vote(&vote(msg.id, alice, VoteDirection::Down)).is_err());

        let stored = db
            .find_vote(&msg.id.to_string(), &alice.to_string())
            .unwrap()
            .unwrap();
        assert_eq!(stored.vote_type, VoteDirection::Up);
        assert_eq!(db.get_votes_by_user(&alice.to_string()).unwrap().len(), 1);
    }

    #[test]
    fn deleting_a_message_removes_its_votes() {
        let (db, _, thread) = seeded();
        let msg = message(&db, thread.id);
        let alice = Uuid::new_v4();
        db.insert_vote(&vote(msg.id, alice, VoteDirection::Down)).unwrap();

        let removed = db.delete_thread_message(&msg.id.to_string()).unwrap();
        assert_eq!(removed.map(|m| m.id), Some(msg.id));
        assert!(db.get_votes_by_user(&alice.to_string()).unwrap().is_empty());
        assert!(db.delete_thread_message(&msg.id.to_string()).unwrap().is_none());
    }

    #[test]
    fn chat_messages_carry_profile_username() {
        let (db, circle, _) = seeded();
        let user = Uuid::new_v4();
        db.upsert_profile(&user.to_string(), "sam").unwrap();

        let stored = db
            .insert_chat_message(&ChatMessageRow {
                id: Uuid::new_v4(),
                circle_id: circle,
                user_id: user,
                content: "hello".into(),
                created_at: Utc::now(),
                username: None,
            })
            .unwrap();
        assert_eq!(stored.username.as_deref(), Some("sam"));

        let listed = db.get_chat_messages(&circle.to_string()).unwrap();
        assert_eq!(listed.len(), 1);

        let removed = db.delete_chat_message(&stored.id.to_string()).unwrap();
        assert_eq!(removed.map(|m| m.content), Some("hello".to_string()));
        assert!(db.get_chat_messages(&circle.to_string()).unwrap().is_empty());
    }

    #[test]
    fn circle_existence() {
        let (db, circle, _) = seeded();
        assert!(db.circle_exists(&circle.to_string()).unwrap());
        assert!(!db.circle_exists(&Uuid::new_v4().to_string()).unwrap());
    }
}

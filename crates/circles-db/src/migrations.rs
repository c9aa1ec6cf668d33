use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS support_circles (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL UNIQUE,
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS profiles (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS discussion_threads (
            id              TEXT PRIMARY KEY,
            circle_id       TEXT NOT NULL REFERENCES support_circles(id),
            title           TEXT NOT NULL,
            anonymous_id    TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            expires_at      TEXT NOT NULL,
            view_count      INTEGER NOT NULL DEFAULT 0,
            blockchain_id   TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_threads_circle
            ON discussion_threads(circle_id, created_at);

        CREATE TABLE IF NOT EXISTS thread_messages (
            id              TEXT PRIMARY KEY,
            thread_id       TEXT NOT NULL REFERENCES discussion_threads(id),
            content         TEXT NOT NULL,
            anonymous_id    TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            upvotes         INTEGER NOT NULL DEFAULT 0,
            downvotes       INTEGER NOT NULL DEFAULT 0,
            blockchain_id   TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_thread_messages_thread
            ON thread_messages(thread_id, created_at);

        CREATE TABLE IF NOT EXISTS message_votes (
            id          TEXT PRIMARY KEY,
            message_id  TEXT NOT NULL REFERENCES thread_messages(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL,
            vote_type   TEXT NOT NULL CHECK (vote_type IN ('upvote', 'downvote')),
            created_at  TEXT NOT NULL,
            UNIQUE(message_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_votes_user
            ON message_votes(user_id);

        CREATE TABLE IF NOT EXISTS circle_messages (
            id          TEXT PRIMARY KEY,
            circle_id   TEXT NOT NULL REFERENCES support_circles(id),
            user_id     TEXT NOT NULL,
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_circle_messages_circle
            ON circle_messages(circle_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}

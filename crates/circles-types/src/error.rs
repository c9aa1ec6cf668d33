use thiserror::Error;
use uuid::Uuid;

/// Failures surfaced at the coordinator boundary.
///
/// Validation and permission errors are raised before any network call.
/// `Write` means an optimistic change has already been rolled back.
#[derive(Error, Debug)]
pub enum CircleError {
    #[error("message content is empty")]
    EmptyContent,

    #[error("thread title is empty")]
    EmptyTitle,

    #[error("{0}")]
    Validation(String),

    #[error("you must be signed in")]
    NotSignedIn,

    #[error("only the author can do that")]
    PermissionDenied,

    #[error("record not found: {0}")]
    NotFound(Uuid),

    #[error("durable write failed: {0:#}")]
    Write(anyhow::Error),

    #[error("durable read failed: {0:#}")]
    Read(anyhow::Error),

    #[error("malformed {collection} payload: {source}")]
    Decode {
        collection: &'static str,
        source: serde_json::Error,
    },

    #[error("chain call failed: {0:#}")]
    Chain(anyhow::Error),

    #[error("local storage error: {0:#}")]
    Storage(anyhow::Error),
}

//! SQLite-backed durable store with a built-in change feed, plus the token
//! session used as the authentication collaborator.

pub mod auth;
pub mod config;
pub mod store;

pub use auth::{TokenSession, issue_token};
pub use config::BackendConfig;
pub use store::Backend;

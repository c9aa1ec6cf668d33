pub mod api;
pub mod error;
pub mod events;
pub mod models;
pub mod store;

pub use error::CircleError;
pub use events::{ChangeEvent, ChangeKind, Collection, Record};
pub use models::{ChatMessage, Keyed, Tally, Thread, ThreadMessage, Vote, VoteDirection};

//! Client-side reconciliation core.
//!
//! Views (`ChatRoom`, `ThreadBoard`, `ThreadView`) own their in-memory lists,
//! apply user actions optimistically, write through to the durable store and
//! merge change-feed echoes by id.

pub mod chain;
pub mod chat;
pub mod config;
pub mod context;
pub mod identity;
pub mod list;
pub mod logging;
pub mod notice;
pub mod thread_view;
pub mod threads;
pub mod votes;

pub use chat::ChatRoom;
pub use config::ClientConfig;
pub use context::{ClientContext, StaticAuth};
pub use identity::{AnonymousIds, FileStorage, KeyValueStore, MemoryStorage};
pub use list::OptimisticList;
pub use notice::{Notice, NoticeLevel, Notifier};
pub use thread_view::ThreadView;
pub use threads::ThreadBoard;
pub use votes::{VoteOutcome, VoteWrite, set_vote};

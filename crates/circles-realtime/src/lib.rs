//! Change-feed fan-out and table-scoped subscriptions.
//!
//! Producers publish every row change once; each subscriber sees only the
//! collection and change kinds it registered for, in publish order.

pub mod dispatcher;
pub mod subscription;

pub use dispatcher::Dispatcher;
pub use subscription::{Handlers, Subscription, SubscriptionHandle};

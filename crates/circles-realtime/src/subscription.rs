use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use circles_types::{ChangeEvent, ChangeKind, Collection, Record};

type Handler<'a> = Box<dyn FnMut(Record) -> anyhow::Result<()> + Send + 'a>;

/// One callback per change kind. Kinds without a handler are ignored.
#[derive(Default)]
pub struct Handlers<'a> {
    on_created: Option<Handler<'a>>,
    on_updated: Option<Handler<'a>>,
    on_deleted: Option<Handler<'a>>,
}

impl<'a> Handlers<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_created(mut self, f: impl FnMut(Record) -> anyhow::Result<()> + Send + 'a) -> Self {
        self.on_created = Some(Box::new(f));
        self
    }

    pub fn on_updated(mut self, f: impl FnMut(Record) -> anyhow::Result<()> + Send + 'a) -> Self {
        self.on_updated = Some(Box::new(f));
        self
    }

    pub fn on_deleted(mut self, f: impl FnMut(Record) -> anyhow::Result<()> + Send + 'a) -> Self {
        self.on_deleted = Some(Box::new(f));
        self
    }

    fn for_kind(&mut self, kind: ChangeKind) -> Option<&mut Handler<'a>> {
        match kind {
            ChangeKind::Created => self.on_created.as_mut(),
            ChangeKind::Updated => self.on_updated.as_mut(),
            ChangeKind::Deleted => self.on_deleted.as_mut(),
        }
    }
}

/// Releases a subscription from anywhere. Cloneable, and releasing twice
/// (or after the subscription was dropped) does nothing.
#[derive(Clone)]
pub struct SubscriptionHandle {
    id: Uuid,
    token: CancellationToken,
}

impl SubscriptionHandle {
    pub fn release(&self) {
        if !self.token.is_cancelled() {
            self.token.cancel();
            debug!("subscription {} released", self.id);
        }
    }

    pub fn is_released(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// A live registration on one collection. Dropping it releases it.
pub struct Subscription {
    id: Uuid,
    collection: Collection,
    kinds: Vec<ChangeKind>,
    rx: broadcast::Receiver<ChangeEvent>,
    token: CancellationToken,
}

impl Subscription {
    pub(crate) fn new(
        collection: Collection,
        kinds: Vec<ChangeKind>,
        rx: broadcast::Receiver<ChangeEvent>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            collection,
            kinds,
            rx,
            token: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn handle(&self) -> SubscriptionHandle {
        SubscriptionHandle {
            id: self.id,
            token: self.token.clone(),
        }
    }

    pub fn release(&self) {
        self.handle().release();
    }

    pub fn is_released(&self) -> bool {
        self.token.is_cancelled()
    }

    fn matches(&self, event: &ChangeEvent) -> bool {
        event.collection == self.collection && self.kinds.contains(&event.kind)
    }

    /// Wait for the next matching event. Returns `None` once released or when
    /// the feed is gone.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            if self.token.is_cancelled() {
                return None;
            }

            let result = tokio::select! {
                biased;
                _ = self.token.cancelled() => return None,
                result = self.rx.recv() => result,
            };

            match result {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(n)) => {
                    warn!(
                        "subscription {} on {} lagged by {} events",
                        self.id,
                        self.collection.table(),
                        n
                    );
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next matching event if one is already queued.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        loop {
            if self.token.is_cancelled() {
                return None;
            }

            match self.rx.try_recv() {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(n)) => {
                    warn!(
                        "subscription {} on {} lagged by {} events",
                        self.id,
                        self.collection.table(),
                        n
                    );
                    continue;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Decode `event` if this subscription should see it. Undecodable
    /// payloads are logged and yield `None`.
    pub fn accept(&self, event: &ChangeEvent) -> Option<(ChangeKind, Record)> {
        if self.is_released() || !self.matches(event) {
            return None;
        }

        match event.decode() {
            Ok(record) => Some((event.kind, record)),
            Err(e) => {
                warn!("subscription {}: {}", self.id, e);
                None
            }
        }
    }

    /// Decode `event` and hand it to the handler for its kind.
    ///
    /// Returns whether a handler ran. Decode and handler errors are logged and
    /// swallowed so one bad payload cannot end the subscription.
    pub fn dispatch(&self, handlers: &mut Handlers<'_>, event: ChangeEvent) -> bool {
        let Some((kind, record)) = self.accept(&event) else {
            return false;
        };

        let Some(handler) = handlers.for_kind(kind) else {
            debug!("no {:?} handler on subscription {}, dropping event", kind, self.id);
            return false;
        };

        if let Err(e) = (*handler)(record) {
            warn!("{:?} handler on {} failed: {:#}", kind, self.collection.table(), e);
        }
        true
    }

    /// Deliver events to `handlers` until released or the feed closes.
    pub async fn run(mut self, mut handlers: Handlers<'_>) {
        while let Some(event) = self.recv().await {
            self.dispatch(&mut handlers, event);
        }
        debug!("subscription {} on {} ended", self.id, self.collection.table());
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::Utc;
    use circles_types::api::ChatMessageRow;
    use circles_types::{CircleError, Collection};

    use super::*;
    use crate::Dispatcher;

    fn chat_event(kind: ChangeKind, content: &str) -> ChangeEvent {
        let row = ChatMessageRow {
            id: Uuid::new_v4(),
            circle_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            content: content.into(),
            created_at: Utc::now(),
            username: None,
        };
        ChangeEvent::new(Collection::CircleMessages, kind, &row).unwrap()
    }

    fn content_of(record: Record) -> String {
        match record {
            Record::ChatMessage(m) => m.content,
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn empty_kinds_are_rejected() {
        let dispatcher = Dispatcher::new();
        let err = dispatcher.subscribe(Collection::CircleMessages, &[]).err();
        assert!(matches!(err, Some(CircleError::Validation(_))));
    }

    #[tokio::test]
    async fn filters_by_collection_and_kind_in_order() {
        let dispatcher = Dispatcher::new();
        let mut sub = dispatcher
            .subscribe(Collection::CircleMessages, &[ChangeKind::Created, ChangeKind::Deleted])
            .unwrap();

        dispatcher.publish(chat_event(ChangeKind::Created, "one"));
        dispatcher.publish(chat_event(ChangeKind::Updated, "skipped"));
        dispatcher.publish(ChangeEvent {
            collection: Collection::ThreadMessages,
            kind: ChangeKind::Created,
            record: serde_json::json!({}),
        });
        dispatcher.publish(chat_event(ChangeKind::Deleted, "two"));

        let first = sub.recv().await.unwrap();
        assert_eq!(first.kind, ChangeKind::Created);
        assert_eq!(content_of(first.decode().unwrap()), "one");

        let second = sub.recv().await.unwrap();
        assert_eq!(second.kind, ChangeKind::Deleted);
        assert_eq!(content_of(second.decode().unwrap()), "two");

        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn handler_errors_do_not_end_subscription() {
        let dispatcher = Dispatcher::new();
        let sub = dispatcher
            .subscribe(Collection::CircleMessages, &[ChangeKind::Created])
            .unwrap();
        let handle = sub.handle();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_handler = seen.clone();
        let handlers = Handlers::new().on_created(move |record| {
            let content = content_of(record);
            seen_in_handler.lock().unwrap().push(content.clone());
            if content == "bad" {
                anyhow::bail!("handler refused {}", content);
            }
            Ok(())
        });

        dispatcher.publish(chat_event(ChangeKind::Created, "bad"));
        dispatcher.publish(chat_event(ChangeKind::Created, "good"));

        let task = tokio::spawn(sub.run(handlers));
        while seen.lock().unwrap().len() < 2 {
            tokio::task::yield_now().await;
        }
        handle.release();
        task.await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["bad".to_string(), "good".to_string()]);
    }

    #[tokio::test]
    async fn release_is_idempotent_and_stops_delivery() {
        let dispatcher = Dispatcher::new();
        let mut sub = dispatcher
            .subscribe(Collection::CircleMessages, &[ChangeKind::Created])
            .unwrap();
        let handle = sub.handle();

        dispatcher.publish(chat_event(ChangeKind::Created, "queued"));
        handle.release();
        handle.release();
        sub.release();

        assert!(sub.is_released());
        assert!(sub.recv().await.is_none());

        let mut calls = 0;
        let mut handlers = Handlers::new().on_created(|_| {
            calls += 1;
            Ok(())
        });
        assert!(!sub.dispatch(&mut handlers, chat_event(ChangeKind::Created, "late")));
        drop(handlers);
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn release_after_drop_is_a_noop() {
        let dispatcher = Dispatcher::new();
        let sub = dispatcher
            .subscribe(Collection::CircleMessages, &[ChangeKind::Created])
            .unwrap();
        let handle = sub.handle();
        drop(sub);

        assert!(handle.is_released());
        handle.release();
        assert_eq!(dispatcher.receiver_count(), 0);
    }

    #[tokio::test]
    async fn release_wakes_a_waiting_receiver() {
        let dispatcher = Dispatcher::new();
        let mut sub = dispatcher
            .subscribe(Collection::CircleMessages, &[ChangeKind::Created])
            .unwrap();
        let handle = sub.handle();

        let waiter = tokio::spawn(async move { sub.recv().await.is_none() });
        tokio::task::yield_now().await;
        handle.release();
        assert!(waiter.await.unwrap());
    }

    #[test]
    fn undecodable_payload_is_skipped() {
        let dispatcher = Dispatcher::new();
        let sub = dispatcher
            .subscribe(Collection::CircleMessages, &[ChangeKind::Created])
            .unwrap();

        let mut calls = 0;
        let mut handlers = Handlers::new().on_created(|_| {
            calls += 1;
            Ok(())
        });
        let bogus = ChangeEvent {
            collection: Collection::CircleMessages,
            kind: ChangeKind::Created,
            record: serde_json::json!({ "content": 7 }),
        };
        assert!(!sub.dispatch(&mut handlers, bogus));
        assert!(sub.dispatch(&mut handlers, chat_event(ChangeKind::Created, "ok")));
        drop(handlers);
        assert_eq!(calls, 1);
    }
}

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use circles_realtime::Subscription;
use circles_types::api::ChatMessageRow;
use circles_types::{ChangeEvent, ChangeKind, ChatMessage, CircleError, Collection, Record};

use crate::context::ClientContext;
use crate::list::OptimisticList;

/// Live chat inside one circle.
pub struct ChatRoom {
    ctx: ClientContext,
    circle_id: Uuid,
    messages: OptimisticList<ChatMessage>,
    subscription: Subscription,
    closed: bool,
}

impl ChatRoom {
    /// Subscribe first, then load, so nothing written in between is missed.
    pub async fn open(ctx: ClientContext, circle_id: Uuid) -> Result<Self, CircleError> {
        let subscription = ctx
            .feed
            .subscribe(Collection::CircleMessages, &[ChangeKind::Created, ChangeKind::Deleted])?;

        let rows = ctx
            .store
            .chat_messages_by_circle(circle_id)
            .await
            .map_err(|e| ctx.notifier.fail(CircleError::Read(e), "Failed to load messages"))?;
        let messages = OptimisticList::from_items(rows.into_iter().map(ChatMessage::from));

        info!("Chat for circle {} opened with {} messages", circle_id, messages.len());
        Ok(Self {
            ctx,
            circle_id,
            messages,
            subscription,
            closed: false,
        })
    }

    pub fn circle_id(&self) -> Uuid {
        self.circle_id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.messages.items()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub async fn send(&mut self, content: &str) -> Result<Uuid, CircleError> {
        let notifier = &self.ctx.notifier;
        let Some(user_id) = self.ctx.auth.current_user() else {
            return Err(notifier.fail(CircleError::NotSignedIn, "You must be logged in to send messages"));
        };
        if content.trim().is_empty() {
            return Err(notifier.fail(CircleError::EmptyContent, "Message cannot be empty"));
        }

        let message = ChatMessage {
            id: Uuid::new_v4(),
            circle_id: self.circle_id,
            user_id,
            content: content.to_string(),
            created_at: Utc::now(),
            username: None,
        };
        let inserted = self.messages.push(message.clone());

        if let Err(e) = self
            .ctx
            .store
            .insert_chat_message(&ChatMessageRow::from(&message))
            .await
        {
            if inserted {
                self.messages.remove(message.id);
            }
            return Err(self.ctx.notifier.fail(CircleError::Write(e), "Failed to send message"));
        }

        debug!("chat message {} sent to circle {}", message.id, self.circle_id);
        Ok(message.id)
    }

    /// Delete one of the signed-in user's own messages.
    pub async fn delete(&mut self, message_id: Uuid) -> Result<(), CircleError> {
        let notifier = &self.ctx.notifier;
        let Some(user_id) = self.ctx.auth.current_user() else {
            return Err(notifier.fail(CircleError::NotSignedIn, "You must be logged in to delete messages"));
        };
        let Some(message) = self.messages.get(message_id) else {
            return Err(notifier.fail(CircleError::NotFound(message_id), "Message not found"));
        };
        if message.user_id != user_id {
            return Err(notifier.fail(
                CircleError::PermissionDenied,
                "You can only delete your own messages",
            ));
        }

        let removed = self.messages.remove(message_id);
        if let Err(e) = self.ctx.store.delete_chat_message(message_id).await {
            if let Some(message) = removed {
                self.messages.push(message);
            }
            return Err(self.ctx.notifier.fail(CircleError::Write(e), "Failed to delete message"));
        }

        self.ctx.notifier.success("Success", "Message deleted successfully");
        Ok(())
    }

    /// Merge one change event. Returns whether the list changed.
    pub fn apply(&mut self, event: &ChangeEvent) -> bool {
        if self.closed {
            return false;
        }
        let Some((kind, Record::ChatMessage(message))) = self.subscription.accept(event) else {
            return false;
        };
        if message.circle_id != self.circle_id {
            return false;
        }

        match kind {
            ChangeKind::Created => self.messages.push(message),
            ChangeKind::Deleted => self.messages.remove(message.id).is_some(),
            ChangeKind::Updated => false,
        }
    }

    /// Apply every event already queued. Returns how many changed the list.
    pub fn pump(&mut self) -> usize {
        let mut changed = 0;
        while let Some(event) = self.subscription.try_recv() {
            if self.apply(&event) {
                changed += 1;
            }
        }
        changed
    }

    /// Wait for the next event and apply it. Returns false once closed.
    pub async fn next_event(&mut self) -> bool {
        match self.subscription.recv().await {
            Some(event) => {
                self.apply(&event);
                true
            }
            None => false,
        }
    }

    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.subscription.release();
            debug!("chat for circle {} closed", self.circle_id);
        }
    }
}

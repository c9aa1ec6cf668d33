use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use circles_realtime::Subscription;
use circles_types::api::ThreadMessageRow;
use circles_types::{
    ChangeEvent, ChangeKind, CircleError, Collection, Record, Tally, Thread, ThreadMessage,
    VoteDirection,
};

use crate::chain;
use crate::context::ClientContext;
use crate::list::OptimisticList;
use crate::votes;

/// One open discussion thread: its messages, their tallies and the caller's
/// own votes.
pub struct ThreadView {
    ctx: ClientContext,
    thread: Thread,
    anonymous_id: String,
    chain_content: Option<String>,
    messages: OptimisticList<ThreadMessage>,
    subscription: Subscription,
    closed: bool,
}

impl ThreadView {
    /// Open a thread, counting the view.
    pub async fn open(ctx: ClientContext, thread_id: Uuid) -> Result<Self, CircleError> {
        let subscription = ctx.feed.subscribe(
            Collection::ThreadMessages,
            &[ChangeKind::Created, ChangeKind::Updated, ChangeKind::Deleted],
        )?;

        let thread = Thread::from(
            ctx.store
                .view_thread(thread_id)
                .await
                .map_err(|e| ctx.notifier.fail(CircleError::Read(e), "Failed to load discussion"))?,
        );
        let anonymous_id = ctx
            .identities
            .get(thread.circle_id)
            .map_err(|e| ctx.notifier.fail(e, "Failed to load discussion"))?;

        let messages = load_messages(&ctx, thread_id).await?;

        let chain_content = match (&ctx.chain, chain_index(&thread)) {
            (Some(client), Some(index)) => match chain::record_content(client.as_ref(), index).await {
                Ok(content) => Some(content),
                Err(e) => {
                    warn!("Chain content for thread {} unavailable: {}", thread_id, e);
                    None
                }
            },
            _ => None,
        };

        info!(
            "Thread {} opened with {} messages ({} views)",
            thread_id,
            messages.len(),
            thread.view_count
        );
        Ok(Self {
            ctx,
            thread,
            anonymous_id,
            chain_content,
            messages,
            subscription,
            closed: false,
        })
    }

    pub fn thread(&self) -> &Thread {
        &self.thread
    }

    pub fn anonymous_id(&self) -> &str {
        &self.anonymous_id
    }

    /// Content of the backing chain record, when there is one.
    pub fn chain_content(&self) -> Option<&str> {
        self.chain_content.as_deref()
    }

    pub fn messages(&self) -> &[ThreadMessage] {
        self.messages.items()
    }

    pub fn message(&self, id: Uuid) -> Option<&ThreadMessage> {
        self.messages.get(id)
    }

    /// Reload messages and the caller's votes from the store.
    pub async fn refresh(&mut self) -> Result<(), CircleError> {
        self.messages = load_messages(&self.ctx, self.thread.id).await?;
        Ok(())
    }

    /// Post under this device's pseudonym.
    pub async fn send(&mut self, content: &str) -> Result<Uuid, CircleError> {
        if content.trim().is_empty() {
            return Err(self.ctx.notifier.fail(CircleError::EmptyContent, "Message cannot be empty"));
        }

        if let (Some(client), Some(index)) = (self.ctx.chain.clone(), chain_index(&self.thread)) {
            client
                .add_comment(index, content)
                .await
                .map_err(|e| self.ctx.notifier.fail(CircleError::Chain(e), "Failed to post on chain"))?;
        }

        let message = ThreadMessage {
            id: Uuid::new_v4(),
            thread_id: self.thread.id,
            content: content.to_string(),
            created_at: Utc::now(),
            anonymous_id: self.anonymous_id.clone(),
            tally: Tally::default(),
            user_vote: None,
            blockchain_id: None,
        };
        let inserted = self.messages.push(message.clone());

        if let Err(e) = self
            .ctx
            .store
            .insert_thread_message(&ThreadMessageRow::from(&message))
            .await
        {
            if inserted {
                self.messages.remove(message.id);
            }
            return Err(self.ctx.notifier.fail(CircleError::Write(e), "Failed to send message"));
        }

        debug!("message {} posted to thread {}", message.id, self.thread.id);
        Ok(message.id)
    }

    /// Delete a message this device posted.
    pub async fn delete(&mut self, message_id: Uuid) -> Result<(), CircleError> {
        let notifier = &self.ctx.notifier;
        let Some(message) = self.messages.get(message_id) else {
            return Err(notifier.fail(CircleError::NotFound(message_id), "Message not found"));
        };
        if message.anonymous_id != self.anonymous_id {
            return Err(notifier.fail(
                CircleError::PermissionDenied,
                "You can only delete your own messages",
            ));
        }

        let removed = self.messages.remove(message_id);
        if let Err(e) = self.ctx.store.delete_thread_message(message_id).await {
            if let Some(message) = removed {
                self.messages.push(message);
            }
            return Err(self.ctx.notifier.fail(CircleError::Write(e), "Failed to delete message"));
        }

        self.ctx.notifier.success("Success", "Message deleted successfully");
        Ok(())
    }

    /// Set the caller's vote on a message; `None` withdraws it.
    pub async fn vote(
        &mut self,
        message_id: Uuid,
        next: Option<VoteDirection>,
    ) -> Result<(), CircleError> {
        let notifier = &self.ctx.notifier;
        let Some(user_id) = self.ctx.auth.current_user() else {
            return Err(notifier.fail(CircleError::NotSignedIn, "Please sign in to vote on messages"));
        };
        let Some(message) = self.messages.get(message_id) else {
            return Err(notifier.fail(CircleError::NotFound(message_id), "Message not found"));
        };

        let prev = message.user_vote;
        if prev == next {
            return Ok(());
        }
        let prev_tally = message.tally;
        let comment_index = message.blockchain_id.as_deref().and_then(chain::parse_index);

        self.messages.update(message_id, |m| {
            m.tally.apply(prev, next);
            m.user_vote = next;
        });

        let outcome = match votes::set_vote(self.ctx.store.as_ref(), message_id, user_id, next).await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.messages.update(message_id, |m| {
                    m.tally = prev_tally;
                    m.user_vote = prev;
                });
                return Err(self
                    .ctx
                    .notifier
                    .fail(CircleError::Write(e), "Failed to register your vote"));
            }
        };

        // The local vote was stale: redo the tally move from what the store held.
        if outcome.previous != prev {
            debug!(
                "vote on {} was {:?} in the store, not {:?}",
                message_id, outcome.previous, prev
            );
            self.messages.update(message_id, |m| {
                m.tally = prev_tally;
                m.tally.apply(outcome.previous, next);
            });
        }

        self.cast_chain_vote(next, comment_index).await;
        Ok(())
    }

    /// Mirror a recorded vote on chain. The durable vote stands even if this
    /// fails. The contract has no way to withdraw a vote.
    async fn cast_chain_vote(&self, next: Option<VoteDirection>, comment_index: Option<u64>) {
        let (Some(client), Some(record), Some(comment), Some(direction)) = (
            &self.ctx.chain,
            chain_index(&self.thread),
            comment_index,
            next,
        ) else {
            return;
        };

        if let Err(e) = client
            .vote_comment(record, comment, direction == VoteDirection::Up)
            .await
        {
            warn!("Chain vote on record {} comment {} failed: {}", record, comment, e);
        }
    }

    /// Merge one change event. Returns whether the list changed.
    pub fn apply(&mut self, event: &ChangeEvent) -> bool {
        if self.closed {
            return false;
        }
        let Some((kind, Record::ThreadMessage(incoming))) = self.subscription.accept(event) else {
            return false;
        };
        if incoming.thread_id != self.thread.id {
            return false;
        }

        match kind {
            ChangeKind::Created => self.messages.push(incoming),
            ChangeKind::Updated => self.messages.update(incoming.id, |m| {
                m.tally = incoming.tally;
                m.content = incoming.content;
            }),
            ChangeKind::Deleted => self.messages.remove(incoming.id).is_some(),
        }
    }

    pub fn pump(&mut self) -> usize {
        let mut changed = 0;
        while let Some(event) = self.subscription.try_recv() {
            if self.apply(&event) {
                changed += 1;
            }
        }
        changed
    }

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
            debug!("thread {} closed", self.thread.id);
        }
    }
}

fn chain_index(thread: &Thread) -> Option<u64> {
    thread.blockchain_id.as_deref().and_then(chain::parse_index)
}

/// Messages oldest first, with the signed-in user's votes merged in. Vote
/// lookup failures leave `user_vote` unset rather than failing the load.
async fn load_messages(
    ctx: &ClientContext,
    thread_id: Uuid,
) -> Result<OptimisticList<ThreadMessage>, CircleError> {
    let rows = ctx
        .store
        .messages_by_thread(thread_id)
        .await
        .map_err(|e| ctx.notifier.fail(CircleError::Read(e), "Failed to load messages"))?;

    let mut own_votes = HashMap::new();
    if let Some(user_id) = ctx.auth.current_user() {
        match ctx.store.votes_by_user(user_id).await {
            Ok(votes) => {
                own_votes.extend(votes.into_iter().map(|v| (v.message_id, v.vote_type)));
            }
            Err(e) => warn!("Could not load votes for {}: {}", user_id, e),
        }
    }

    Ok(OptimisticList::from_items(rows.into_iter().map(|row| {
        let mut message = ThreadMessage::from(row);
        message.user_vote = own_votes.get(&message.id).copied();
        message
    })))
}

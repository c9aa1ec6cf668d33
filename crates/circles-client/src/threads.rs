use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use circles_realtime::Subscription;
use circles_types::api::ThreadRow;
use circles_types::{ChangeEvent, ChangeKind, CircleError, Collection, Record, Thread};

use crate::chain;
use crate::config::MAX_THREAD_TTL_DAYS;
use crate::context::ClientContext;
use crate::list::OptimisticList;

/// The thread listing of one circle, newest first.
pub struct ThreadBoard {
    ctx: ClientContext,
    circle_id: Uuid,
    threads: OptimisticList<Thread>,
    subscription: Subscription,
    closed: bool,
}

impl ThreadBoard {
    pub async fn open(ctx: ClientContext, circle_id: Uuid) -> Result<Self, CircleError> {
        let subscription = ctx
            .feed
            .subscribe(Collection::DiscussionThreads, &[ChangeKind::Created])?;

        let rows = ctx
            .store
            .threads_by_circle(circle_id)
            .await
            .map_err(|e| ctx.notifier.fail(CircleError::Read(e), "Failed to load discussions"))?;
        let threads = OptimisticList::from_items(rows.into_iter().map(Thread::from));

        info!("Thread board for circle {} opened with {} threads", circle_id, threads.len());
        Ok(Self {
            ctx,
            circle_id,
            threads,
            subscription,
            closed: false,
        })
    }

    pub fn circle_id(&self) -> Uuid {
        self.circle_id
    }

    pub fn threads(&self) -> &[Thread] {
        self.threads.items()
    }

    pub fn active_threads(&self, now: DateTime<Utc>) -> impl Iterator<Item = &Thread> {
        self.threads.iter().filter(move |t| !t.is_expired(now))
    }

    /// This device's pseudonym in the circle.
    pub fn anonymous_id(&self) -> Result<String, CircleError> {
        self.ctx.identities.get(self.circle_id)
    }

    /// Start a thread. `ttl_days` defaults to the configured lifetime.
    pub async fn create_thread(
        &mut self,
        title: &str,
        ttl_days: Option<i64>,
    ) -> Result<Thread, CircleError> {
        self.validate_title(title)?;
        self.insert_thread(title, ttl_days).await
    }

    /// Record `content` on chain, then start a thread that references it.
    pub async fn create_chain_thread(
        &mut self,
        title: &str,
        content: &str,
        ttl_days: Option<i64>,
    ) -> Result<Thread, CircleError> {
        self.validate_title(title)?;
        if content.trim().is_empty() {
            return Err(self.ctx.notifier.fail(CircleError::EmptyContent, "Content cannot be empty"));
        }
        let Some(client) = self.ctx.chain.clone() else {
            return Err(self.ctx.notifier.fail(
                CircleError::Validation("no chain client configured".into()),
                "Blockchain is not available",
            ));
        };

        let index = chain::create_record(client.as_ref(), content)
            .await
            .map_err(|e| self.ctx.notifier.fail(e, "Failed to record thread on chain"))?;

        let thread = self.insert_thread(title, ttl_days).await?;
        let blockchain_id = index.to_string();
        self.ctx
            .store
            .set_thread_blockchain_id(thread.id, &blockchain_id)
            .await
            .map_err(|e| {
                self.ctx
                    .notifier
                    .fail(CircleError::Write(e), "Failed to link thread to chain record")
            })?;

        self.threads
            .update(thread.id, |t| t.blockchain_id = Some(blockchain_id.clone()));
        info!("Thread {} linked to chain record {}", thread.id, index);
        Ok(Thread {
            blockchain_id: Some(blockchain_id),
            ..thread
        })
    }

    fn validate_title(&self, title: &str) -> Result<(), CircleError> {
        if title.trim().is_empty() {
            return Err(self.ctx.notifier.fail(CircleError::EmptyTitle, "Title cannot be empty"));
        }
        Ok(())
    }

    async fn insert_thread(&mut self, title: &str, ttl_days: Option<i64>) -> Result<Thread, CircleError> {
        let notifier = &self.ctx.notifier;
        let ttl_days = ttl_days.unwrap_or(self.ctx.thread_ttl_days);
        if ttl_days <= 0 {
            return Err(notifier.fail(
                CircleError::Validation(format!("thread lifetime must be positive, got {} days", ttl_days)),
                "Failed to create discussion",
            ));
        }
        if ttl_days > MAX_THREAD_TTL_DAYS {
            return Err(notifier.fail(
                CircleError::Validation(format!(
                    "thread lifetime must be at most {} days, got {}",
                    MAX_THREAD_TTL_DAYS, ttl_days
                )),
                "Failed to create discussion",
            ));
        }

        let exists = self
            .ctx
            .store
            .circle_exists(self.circle_id)
            .await
            .map_err(|e| notifier.fail(CircleError::Read(e), "Failed to create discussion"))?;
        if !exists {
            return Err(notifier.fail(
                CircleError::Validation("Invalid support circle".into()),
                "Invalid support circle",
            ));
        }

        let anonymous_id = self
            .ctx
            .identities
            .get(self.circle_id)
            .map_err(|e| notifier.fail(e, "Failed to create discussion"))?;

        let now = Utc::now();
        let Some(expires_at) = Duration::try_days(ttl_days).and_then(|ttl| now.checked_add_signed(ttl))
        else {
            return Err(notifier.fail(
                CircleError::Validation(format!("thread lifetime of {} days is out of range", ttl_days)),
                "Failed to create discussion",
            ));
        };
        let row = ThreadRow {
            id: Uuid::new_v4(),
            circle_id: self.circle_id,
            title: title.to_string(),
            created_at: now,
            expires_at,
            anonymous_id,
            view_count: 0,
            blockchain_id: None,
        };
        let stored = self
            .ctx
            .store
            .insert_thread(&row)
            .await
            .map_err(|e| notifier.fail(CircleError::Write(e), "Failed to create discussion"))?;

        let thread = Thread::from(stored);
        self.threads.prepend(thread.clone());
        debug!("thread {} created in circle {}", thread.id, self.circle_id);
        Ok(thread)
    }

    /// Merge one change event. Returns whether the list changed.
    pub fn apply(&mut self, event: &ChangeEvent) -> bool {
        if self.closed {
            return false;
        }
        match self.subscription.accept(event) {
            Some((ChangeKind::Created, Record::Thread(thread))) if thread.circle_id == self.circle_id => {
                self.threads.prepend(thread)
            }
            _ => false,
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
            debug!("thread board for circle {} closed", self.circle_id);
        }
    }
}

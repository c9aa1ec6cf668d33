use anyhow::Result;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use circles_types::VoteDirection;
use circles_types::api::VoteRow;
use circles_types::store::DurableStore;

/// The single store write that moves a voter from their current vote to a
/// requested one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteWrite {
    Noop,
    Insert(VoteDirection),
    Update { vote_id: Uuid, direction: VoteDirection },
    Delete { vote_id: Uuid },
}

pub fn plan(existing: Option<&VoteRow>, next: Option<VoteDirection>) -> VoteWrite {
    match (existing, next) {
        (None, None) => VoteWrite::Noop,
        (None, Some(direction)) => VoteWrite::Insert(direction),
        (Some(vote), None) => VoteWrite::Delete { vote_id: vote.id },
        (Some(vote), Some(direction)) if vote.vote_type == direction => VoteWrite::Noop,
        (Some(vote), Some(direction)) => VoteWrite::Update {
            vote_id: vote.id,
            direction,
        },
    }
}

/// What `set_vote` found in the store and what it wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteOutcome {
    pub previous: Option<VoteDirection>,
    pub write: VoteWrite,
}

/// Read the voter's current vote on `message_id`, then issue the one write
/// that makes it `next`. The store keeps at most one vote per voter and
/// message and recomputes the message tally itself.
pub async fn set_vote(
    store: &dyn DurableStore,
    message_id: Uuid,
    voter_id: Uuid,
    next: Option<VoteDirection>,
) -> Result<VoteOutcome> {
    let existing = store.find_vote(message_id, voter_id).await?;
    let previous = existing.as_ref().map(|v| v.vote_type);
    let write = plan(existing.as_ref(), next);

    match write {
        VoteWrite::Noop => {}
        VoteWrite::Insert(direction) => {
            store
                .insert_vote(&VoteRow {
                    id: Uuid::new_v4(),
                    message_id,
                    user_id: voter_id,
                    vote_type: direction,
                    created_at: Utc::now(),
                })
                .await?;
        }
        VoteWrite::Update { vote_id, direction } => store.update_vote(vote_id, direction).await?,
        VoteWrite::Delete { vote_id } => store.delete_vote(vote_id).await?,
    }

    debug!("vote by {} on {}: {:?}", voter_id, message_id, write);
    Ok(VoteOutcome { previous, write })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn existing(direction: VoteDirection) -> VoteRow {
        VoteRow {
            id: Uuid::new_v4(),
            message_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            vote_type: direction,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn first_vote_inserts() {
        assert_eq!(plan(None, Some(VoteDirection::Up)), VoteWrite::Insert(VoteDirection::Up));
        assert_eq!(plan(None, None), VoteWrite::Noop);
    }

    #[test]
    fn switching_direction_updates_in_place() {
        let vote = existing(VoteDirection::Up);
        assert_eq!(
            plan(Some(&vote), Some(VoteDirection::Down)),
            VoteWrite::Update {
                vote_id: vote.id,
                direction: VoteDirection::Down
            }
        );
    }

    #[test]
    fn clearing_deletes_and_repeat_is_noop() {
        let vote = existing(VoteDirection::Down);
        assert_eq!(plan(Some(&vote), None), VoteWrite::Delete { vote_id: vote.id });
        assert_eq!(plan(Some(&vote), Some(VoteDirection::Down)), VoteWrite::Noop);
    }
}

//! The vote lifecycle engine.
//!
//! Every request reads the clock once, validates against that instant, and
//! then performs at most one mutating storage call. Validation never writes,
//! so a request abandoned before its final call leaves no trace.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use evlog::meta;
use tokio::time::timeout;

use crate::config::Config;
use crate::db::schema::{Ballot, Event, Upsert, Voter};
use crate::error::{Result, VoteError};
use crate::runtime::get_logger;
use crate::status::TimeStatus;
use crate::store::Storage;
use crate::support::clock::Clock;
use crate::tally::Results;

pub mod events;
pub mod history;

pub use events::{EditableFields, ListedEvent};
pub use history::{RecentVote, VoterStats};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Lets event creators vote on their own events.
    pub allow_self_voting: bool,
    /// Upper bound for each storage call made on behalf of a request.
    pub storage_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            allow_self_voting: false,
            storage_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            allow_self_voting: config.allow_self_voting,
            storage_timeout: config.storage_timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastReceipt {
    pub outcome: Upsert,
    pub ballot: Ballot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retraction {
    Removed,
    Absent,
}

pub struct VoteEngine<S> {
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
}

impl<S: Storage> VoteEngine<S> {
    pub fn new(storage: Arc<S>, clock: Arc<dyn Clock>, settings: EngineSettings) -> Self {
        Self {
            storage,
            clock,
            settings,
        }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub(crate) async fn bounded<T>(&self, op: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let r = match timeout(self.settings.storage_timeout, fut).await {
            Ok(r) => r,
            Err(elapsed) => Err(VoteError::from(elapsed)),
        };

        if let Err(VoteError::Transient(e) | VoteError::Internal(e)) = &r {
            get_logger().error("Storage call failed.", meta! {
                "Operation" => op,
                "Error" => e,
            });
        }

        r
    }

    pub(crate) async fn load_event(&self, id_event: i32) -> Result<Event> {
        match self.bounded("get_event", self.storage.get_event(id_event)).await? {
            Some(v) => Ok(v),
            None => {
                get_logger().info("Request referenced an unknown event.", meta! {
                    "EventID" => id_event,
                });
                Err(VoteError::NotFound(format!("event {}", id_event)))
            }
        }
    }

    fn reject(&self, msg: &'static str, voter: &Voter, id_event: i32, err: VoteError) -> VoteError {
        get_logger().info(msg, meta! {
            "UserID" => voter.id_user,
            "EventID" => id_event,
            "Reason" => err.kind(),
        });

        err
    }

    pub async fn status_of(&self, id_event: i32) -> Result<TimeStatus> {
        let now = self.clock.now();

        Ok(self.load_event(id_event).await?.status(now))
    }

    /// Creates the caller's ballot or replaces its option. The store decides
    /// which of the two happened, so double submits cannot race each other.
    pub async fn cast_or_update(&self, voter: &Voter, id_event: i32, id_option: i32) -> Result<CastReceipt> {
        let now = self.clock.now();

        if !voter.can_cast_vote() {
            return Err(self.reject("Administrator attempted to vote.", voter, id_event,
                VoteError::Forbidden("administrators cannot vote on events".to_owned())));
        }

        let event = self.load_event(id_event).await?;

        let status = event.status(now);
        if !status.is_votable() {
            return Err(self.reject("Vote attempted outside the voting window.", voter, id_event,
                VoteError::InvalidState(format!("event {} is {}", id_event, status))));
        }

        if !self.settings.allow_self_voting && event.is_created_by(voter.id_user) {
            return Err(self.reject("Event creator attempted to vote on own event.", voter, id_event,
                VoteError::Forbidden("event creators cannot vote on their own events".to_owned())));
        }

        if !self.bounded("belongs_to", self.storage.belongs_to(id_option, id_event)).await? {
            // An empty option set reports NotFound rather than a mismatch.
            self.bounded("options_of", self.storage.options_of(id_event)).await?;

            return Err(self.reject("Vote referenced an option from another event.", voter, id_event,
                VoteError::InvalidOption { id_event, id_option }));
        }

        let (ballot, outcome) = self.bounded("upsert", self.storage.upsert(voter.id_user, id_event, id_option, now)).await?;

        get_logger().info(match outcome {
            Upsert::Created => "Ballot cast.",
            Upsert::Updated => "Ballot updated.",
        }, meta! {
            "UserID" => voter.id_user,
            "EventID" => id_event,
            "OptionID" => id_option,
        });

        Ok(CastReceipt {
            outcome,
            ballot,
        })
    }

    /// Removes the caller's ballot while the event is open. A missing ballot is
    /// reported as `Absent`, which also makes a retried retraction harmless.
    pub async fn retract(&self, voter: &Voter, id_event: i32) -> Result<Retraction> {
        let now = self.clock.now();

        if !voter.can_cast_vote() {
            return Err(self.reject("Administrator attempted to retract a vote.", voter, id_event,
                VoteError::Forbidden("administrators cannot vote on events".to_owned())));
        }

        let event = self.load_event(id_event).await?;

        if !self.settings.allow_self_voting && event.is_created_by(voter.id_user) {
            return Err(self.reject("Event creator attempted to retract a vote on own event.", voter, id_event,
                VoteError::Forbidden("event creators cannot vote on their own events".to_owned())));
        }

        let status = event.status(now);
        if !status.is_votable() {
            return Err(self.reject("Retraction attempted outside the voting window.", voter, id_event,
                VoteError::InvalidState(format!("event {} is {}; votes cannot be retracted", id_event, status))));
        }

        let removed = self.bounded("delete", self.storage.delete(voter.id_user, id_event)).await?;

        get_logger().info("Ballot retraction processed.", meta! {
            "UserID" => voter.id_user,
            "EventID" => id_event,
            "Removed" => removed,
        });

        Ok(if removed { Retraction::Removed } else { Retraction::Absent })
    }

    async fn load_closed_event(&self, id_event: i32) -> Result<Event> {
        let now = self.clock.now();
        let event = self.load_event(id_event).await?;

        let status = event.status(now);
        if status != TimeStatus::Closed {
            get_logger().info("Results requested before event closed.", meta! {
                "EventID" => id_event,
                "Status" => status,
            });
            return Err(VoteError::InvalidState(format!(
                "results for event {} are available once it closes; it is {}", id_event, status
            )));
        }

        Ok(event)
    }

    /// Raw per-option counts. Only served once the event is closed.
    pub async fn count_by_option(&self, id_event: i32) -> Result<HashMap<i32, i64>> {
        self.load_closed_event(id_event).await?;

        self.bounded("count_by_option", self.storage.count_by_option(id_event)).await
    }

    pub async fn results(&self, id_event: i32) -> Result<Results> {
        let event = self.load_closed_event(id_event).await?;

        let options = self.bounded("options_of", self.storage.options_of(id_event)).await?;
        let counts = self.bounded("count_by_option", self.storage.count_by_option(id_event)).await?;

        Ok(Results::new(id_event, &event.title, &options, &counts))
    }
}

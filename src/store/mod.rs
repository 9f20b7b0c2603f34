//! Storage seams used by the vote engine.
//!
//! The engine is the only writer of ballots and never takes a lock of its own:
//! `BallotStore::upsert` and `BallotStore::delete` must each be a single atomic
//! operation keyed on `(id_user, id_event)`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::schema::{Ballot, Event, EventEdit, EventOption, NewEvent, OptionEdit, Upsert};
use crate::error::Result;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

#[async_trait]
pub trait EventDirectory: Send + Sync {
    async fn get_event(&self, id_event: i32) -> Result<Option<Event>>;

    /// `now` becomes the event's `time_created`.
    async fn add_event(&self, id_created_by: u64, event: &NewEvent, now: DateTime<Utc>) -> Result<(Event, Vec<EventOption>)>;

    async fn update_event(&self, id_event: i32, edit: &EventEdit) -> Result<bool>;

    /// Removes the event together with its options and ballots.
    async fn delete_event(&self, id_event: i32) -> Result<bool>;

    /// Events whose end lies before `now` and that `id_user` did not create.
    async fn count_closed_events_excluding(&self, id_user: u64, now: DateTime<Utc>) -> Result<i64>;

    /// Every event ranked by its status at `now` (Open, Waiting, Closed, then
    /// undated), then by start time with unscheduled starts last.
    async fn list_events(&self, now: DateTime<Utc>) -> Result<Vec<Event>>;

    /// Events starting after `now`, soonest first. `None` means no limit.
    async fn upcoming(&self, now: DateTime<Utc>, limit: Option<usize>) -> Result<Vec<Event>>;

    /// Events other than `id_event` that have a start time, soonest first.
    async fn recommendations(&self, id_event: i32, limit: usize) -> Result<Vec<Event>>;
}

#[async_trait]
pub trait OptionRegistry: Send + Sync {
    /// Options ordered by id. Fails with `NotFound` when the event has none.
    async fn options_of(&self, id_event: i32) -> Result<Vec<EventOption>>;

    async fn belongs_to(&self, id_option: i32, id_event: i32) -> Result<bool>;

    /// Rewrites the option set. Fails with `InvalidState` once a ballot exists.
    async fn replace_options(&self, id_event: i32, edits: &[OptionEdit]) -> Result<Vec<EventOption>>;
}

#[async_trait]
pub trait BallotStore: Send + Sync {
    async fn get(&self, id_user: u64, id_event: i32) -> Result<Option<Ballot>>;

    /// Inserts the ballot or replaces its option in place, as one atomic step.
    /// Fails with `NotFound` if the event or the option is gone by then.
    async fn upsert(&self, id_user: u64, id_event: i32, id_option: i32, now: DateTime<Utc>) -> Result<(Ballot, Upsert)>;

    /// Returns whether a row was removed. Deleting an absent ballot is not an error.
    async fn delete(&self, id_user: u64, id_event: i32) -> Result<bool>;

    /// Every option of the event mapped to its ballot count, zeros included.
    async fn count_by_option(&self, id_event: i32) -> Result<HashMap<i32, i64>>;

    async fn has_ballots(&self, id_event: i32) -> Result<bool>;

    /// Newest `time_modified` first.
    async fn list_for_user(&self, id_user: u64) -> Result<Vec<Ballot>>;
}

pub trait Storage: EventDirectory + OptionRegistry + BallotStore {}

impl<T: EventDirectory + OptionRegistry + BallotStore> Storage for T {}

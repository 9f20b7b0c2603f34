use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::dbclient::DBClient;
use crate::db::model;
use crate::db::schema::{Ballot, Event, EventEdit, EventOption, NewEvent, OptionEdit, Upsert};
use crate::error::{Result, VoteError};
use crate::store::{BallotStore, EventDirectory, OptionRegistry};

pub struct PgStorage {
    db_client: DBClient,
}

impl PgStorage {
    pub fn new(db_client: DBClient) -> Self {
        Self {
            db_client,
        }
    }
}

#[async_trait]
impl EventDirectory for PgStorage {
    async fn get_event(&self, id_event: i32) -> Result<Option<Event>> {
        model::get_event(self.db_client.conn(), id_event).await
    }

    async fn add_event(&self, id_created_by: u64, event: &NewEvent, now: DateTime<Utc>) -> Result<(Event, Vec<EventOption>)> {
        model::add_event(self.db_client.conn(), id_created_by, event, now).await
    }

    async fn update_event(&self, id_event: i32, edit: &EventEdit) -> Result<bool> {
        model::update_event(self.db_client.conn(), id_event, edit).await
    }

    async fn delete_event(&self, id_event: i32) -> Result<bool> {
        model::delete_event(self.db_client.conn(), id_event).await
    }

    async fn count_closed_events_excluding(&self, id_user: u64, now: DateTime<Utc>) -> Result<i64> {
        model::count_closed_events_excluding(self.db_client.conn(), id_user, now).await
    }

    async fn list_events(&self, now: DateTime<Utc>) -> Result<Vec<Event>> {
        model::list_events(self.db_client.conn(), now).await
    }

    async fn upcoming(&self, now: DateTime<Utc>, limit: Option<usize>) -> Result<Vec<Event>> {
        model::list_upcoming_events(self.db_client.conn(), now, limit).await
    }

    async fn recommendations(&self, id_event: i32, limit: usize) -> Result<Vec<Event>> {
        model::list_other_scheduled_events(self.db_client.conn(), id_event, limit).await
    }
}

#[async_trait]
impl OptionRegistry for PgStorage {
    async fn options_of(&self, id_event: i32) -> Result<Vec<EventOption>> {
        let options = model::list_options(self.db_client.conn(), id_event).await?;

        if options.is_empty() {
            return Err(VoteError::NotFound(format!("options for event {}", id_event)));
        }

        Ok(options)
    }

    async fn belongs_to(&self, id_option: i32, id_event: i32) -> Result<bool> {
        model::option_belongs_to(self.db_client.conn(), id_option, id_event).await
    }

    async fn replace_options(&self, id_event: i32, edits: &[OptionEdit]) -> Result<Vec<EventOption>> {
        model::replace_options(self.db_client.conn(), id_event, edits).await
    }
}

#[async_trait]
impl BallotStore for PgStorage {
    async fn get(&self, id_user: u64, id_event: i32) -> Result<Option<Ballot>> {
        model::get_ballot(self.db_client.conn(), id_user, id_event).await
    }

    async fn upsert(&self, id_user: u64, id_event: i32, id_option: i32, now: DateTime<Utc>) -> Result<(Ballot, Upsert)> {
        model::upsert_ballot(self.db_client.conn(), id_user, id_event, id_option, now).await
    }

    async fn delete(&self, id_user: u64, id_event: i32) -> Result<bool> {
        model::delete_ballot(self.db_client.conn(), id_user, id_event).await
    }

    async fn count_by_option(&self, id_event: i32) -> Result<HashMap<i32, i64>> {
        model::count_by_option(self.db_client.conn(), id_event).await
    }

    async fn has_ballots(&self, id_event: i32) -> Result<bool> {
        model::has_ballots(self.db_client.conn(), id_event).await
    }

    async fn list_for_user(&self, id_user: u64) -> Result<Vec<Ballot>> {
        model::list_ballots_for_user(self.db_client.conn(), id_user).await
    }
}

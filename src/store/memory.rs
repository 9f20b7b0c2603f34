use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::db::schema::{Ballot, Event, EventEdit, EventOption, NewEvent, OptionEdit, Upsert};
use crate::error::{Result, VoteError};
use crate::store::{BallotStore, EventDirectory, OptionRegistry};

/// In-process storage. Ballot writes go through the dashmap entry API, which
/// holds the shard lock for the key across the read and the write.
#[derive(Default)]
pub struct MemoryStorage {
    events: DashMap<i32, Event>,
    options: DashMap<i32, Vec<EventOption>>,
    ballots: DashMap<(i32, u64), Ballot>,
    next_event: AtomicI32,
    next_option: AtomicI32,
    write_delay: Option<Duration>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every ballot write wait before touching the map, to simulate a slow backend.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// Seeds an event with explicit bounds, bypassing the schedule rules applied on creation.
    pub fn insert_event(&self, event: Event, options: &[&str]) -> Vec<EventOption> {
        let id_event = event.id;
        self.next_event.fetch_max(id_event, Ordering::SeqCst);

        let opts = options.iter()
            .map(|v| EventOption {
                id_event,
                id: self.option_id(),
                option: (*v).to_owned(),
            })
            .collect::<Vec<_>>();

        self.events.insert(id_event, event);
        self.options.insert(id_event, opts.clone());

        opts
    }

    pub fn ballot_count(&self) -> usize {
        self.ballots.len()
    }

    fn option_id(&self) -> i32 {
        self.next_option.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn delay_write(&self) {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl EventDirectory for MemoryStorage {
    async fn get_event(&self, id_event: i32) -> Result<Option<Event>> {
        Ok(self.events.get(&id_event).map(|v| v.value().clone()))
    }

    async fn add_event(&self, id_created_by: u64, event: &NewEvent, now: DateTime<Utc>) -> Result<(Event, Vec<EventOption>)> {
        let id_event = self.next_event.fetch_add(1, Ordering::SeqCst) + 1;

        let created = Event {
            id: id_event,
            time_created: now,
            id_created_by,
            title: event.title.clone(),
            description: event.description.clone(),
            time_start: event.time_start,
            time_end: event.time_end,
        };

        let opts = event.options.iter()
            .map(|v| EventOption {
                id_event,
                id: self.option_id(),
                option: v.clone(),
            })
            .collect::<Vec<_>>();

        self.options.insert(id_event, opts.clone());
        self.events.insert(id_event, created.clone());

        Ok((created, opts))
    }

    async fn update_event(&self, id_event: i32, edit: &EventEdit) -> Result<bool> {
        match self.events.get_mut(&id_event) {
            None => Ok(false),
            Some(mut e) => {
                e.title = edit.title.clone();
                e.description = edit.description.clone();
                e.time_start = edit.time_start;
                e.time_end = edit.time_end;
                Ok(true)
            }
        }
    }

    /// Ballots are dropped while the event's option entry is held, so an
    /// `upsert` racing the delete either lands first and is swept, or fails.
    async fn delete_event(&self, id_event: i32) -> Result<bool> {
        let removed = self.events.remove(&id_event).is_some();

        match self.options.entry(id_event) {
            Entry::Occupied(o) => {
                self.ballots.retain(|(event, _), _| *event != id_event);
                o.remove();
            }
            Entry::Vacant(_) => self.ballots.retain(|(event, _), _| *event != id_event),
        }

        Ok(removed)
    }

    async fn count_closed_events_excluding(&self, id_user: u64, now: DateTime<Utc>) -> Result<i64> {
        let closed = self.events.iter()
            .filter(|e| !e.is_created_by(id_user))
            .filter(|e| matches!(e.time_end, Some(end) if end < now))
            .count();

        Ok(closed as i64)
    }

    async fn list_events(&self, now: DateTime<Utc>) -> Result<Vec<Event>> {
        let mut events = self.events.iter()
            .map(|e| e.value().clone())
            .collect::<Vec<_>>();

        events.sort_by_key(|e| (e.status(now).listing_rank(), e.time_start.is_none(), e.time_start, e.id));

        Ok(events)
    }

    async fn upcoming(&self, now: DateTime<Utc>, limit: Option<usize>) -> Result<Vec<Event>> {
        let mut events = self.events.iter()
            .filter(|e| matches!(e.time_start, Some(start) if start > now))
            .map(|e| e.value().clone())
            .collect::<Vec<_>>();

        events.sort_by_key(|e| (e.time_start, e.id));
        events.truncate(limit.unwrap_or(usize::MAX));

        Ok(events)
    }

    async fn recommendations(&self, id_event: i32, limit: usize) -> Result<Vec<Event>> {
        let mut events = self.events.iter()
            .filter(|e| e.id != id_event && e.time_start.is_some())
            .map(|e| e.value().clone())
            .collect::<Vec<_>>();

        events.sort_by_key(|e| (e.time_start, e.id));
        events.truncate(limit);

        Ok(events)
    }
}

#[async_trait]
impl OptionRegistry for MemoryStorage {
    async fn options_of(&self, id_event: i32) -> Result<Vec<EventOption>> {
        let options = self.options.get(&id_event)
            .map(|v| v.value().clone())
            .unwrap_or_default();

        if options.is_empty() {
            return Err(VoteError::NotFound(format!("options for event {}", id_event)));
        }

        Ok(options)
    }

    async fn belongs_to(&self, id_option: i32, id_event: i32) -> Result<bool> {
        Ok(self.options.get(&id_event)
            .map(|v| v.iter().any(|o| o.id == id_option))
            .unwrap_or(false))
    }

    async fn replace_options(&self, id_event: i32, edits: &[OptionEdit]) -> Result<Vec<EventOption>> {
        if !self.events.contains_key(&id_event) {
            return Err(VoteError::NotFound(format!("event {}", id_event)));
        }

        let mut current = self.options.entry(id_event).or_insert_with(Vec::new);

        if self.ballots.iter().any(|b| b.key().0 == id_event) {
            return Err(VoteError::InvalidState(format!("event {} already has ballots; its options are locked", id_event)));
        }

        let existing = current.iter().map(|o| o.id).collect::<HashSet<_>>();

        let mut next = Vec::new();
        for edit in edits {
            let id = match edit.id.filter(|id| existing.contains(id)) {
                Some(id) => id,
                None => self.option_id(),
            };

            next.push(EventOption {
                id_event,
                id,
                option: edit.option.clone(),
            });
        }
        next.sort_by_key(|o| o.id);

        *current = next.clone();

        Ok(next)
    }
}

#[async_trait]
impl BallotStore for MemoryStorage {
    async fn get(&self, id_user: u64, id_event: i32) -> Result<Option<Ballot>> {
        Ok(self.ballots.get(&(id_event, id_user)).map(|v| v.value().clone()))
    }

    async fn upsert(&self, id_user: u64, id_event: i32, id_option: i32, now: DateTime<Utc>) -> Result<(Ballot, Upsert)> {
        self.delay_write().await;

        // Held until the write is done; `delete_event` and `replace_options`
        // take the same entry.
        let options = match self.options.get(&id_event) {
            Some(v) if self.events.contains_key(&id_event) => v,
            _ => return Err(VoteError::NotFound(format!("event {}", id_event))),
        };
        if !options.iter().any(|o| o.id == id_option) {
            return Err(VoteError::NotFound(format!("option {} of event {}", id_option, id_event)));
        }

        match self.ballots.entry((id_event, id_user)) {
            Entry::Occupied(mut o) => {
                let ballot = o.get_mut();
                ballot.id_option = id_option;
                ballot.time_modified = now;

                Ok((ballot.clone(), Upsert::Updated))
            }
            Entry::Vacant(v) => {
                let ballot = Ballot {
                    id_event,
                    id_user,
                    id_option,
                    time_created: now,
                    time_modified: now,
                };
                v.insert(ballot.clone());

                Ok((ballot, Upsert::Created))
            }
        }
    }

    async fn delete(&self, id_user: u64, id_event: i32) -> Result<bool> {
        self.delay_write().await;

        Ok(self.ballots.remove(&(id_event, id_user)).is_some())
    }

    async fn count_by_option(&self, id_event: i32) -> Result<HashMap<i32, i64>> {
        let mut counts = self.options.get(&id_event)
            .map(|v| v.iter().map(|o| (o.id, 0)).collect::<HashMap<_, _>>())
            .unwrap_or_default();

        for ballot in self.ballots.iter().filter(|b| b.key().0 == id_event) {
            *counts.entry(ballot.id_option).or_insert(0) += 1;
        }

        Ok(counts)
    }

    async fn has_ballots(&self, id_event: i32) -> Result<bool> {
        Ok(self.ballots.iter().any(|b| b.key().0 == id_event))
    }

    async fn list_for_user(&self, id_user: u64) -> Result<Vec<Ballot>> {
        let mut ballots = self.ballots.iter()
            .filter(|b| b.key().1 == id_user)
            .map(|b| b.value().clone())
            .collect::<Vec<_>>();

        ballots.sort_by(|a, b| b.time_modified.cmp(&a.time_modified).then(b.id_event.cmp(&a.id_event)));

        Ok(ballots)
    }
}

use chrono::{DateTime, Utc};

use crate::status::{self, TimeStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: i32,
    pub time_created: DateTime<Utc>,
    pub id_created_by: u64,
    pub title: String,
    pub description: Option<String>,
    pub time_start: Option<DateTime<Utc>>,
    pub time_end: Option<DateTime<Utc>>,
}

impl Event {
    pub fn status(&self, now: DateTime<Utc>) -> TimeStatus {
        status::resolve(self.time_start, self.time_end, now)
    }

    pub fn is_created_by(&self, id_user: u64) -> bool {
        self.id_created_by == id_user
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventOption {
    pub id_event: i32,
    pub id: i32,
    pub option: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ballot {
    pub id_event: i32,
    pub id_user: u64,
    pub id_option: i32,
    pub time_created: DateTime<Utc>,
    pub time_modified: DateTime<Utc>,
}

/// Which storage operation an upsert ended up performing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub time_start: Option<DateTime<Utc>>,
    pub time_end: Option<DateTime<Utc>>,
    pub options: Vec<String>,
}

/// Desired state of an event's editable columns.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEdit {
    pub title: String,
    pub description: Option<String>,
    pub time_start: Option<DateTime<Utc>>,
    pub time_end: Option<DateTime<Utc>>,
}

impl From<&Event> for EventEdit {
    fn from(e: &Event) -> Self {
        Self {
            title: e.title.clone(),
            description: e.description.clone(),
            time_start: e.time_start,
            time_end: e.time_end,
        }
    }
}

/// One entry of a candidate edit. `id: None` adds a new option; options of the
/// event missing from the edit list are deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionEdit {
    pub id: Option<i32>,
    pub option: String,
}

impl OptionEdit {
    pub fn keep(id: i32, option: impl Into<String>) -> Self {
        Self { id: Some(id), option: option.into() }
    }

    pub fn add(option: impl Into<String>) -> Self {
        Self { id: None, option: option.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Voter,
    Admin,
}

/// The caller as resolved by the authentication layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voter {
    pub id_user: u64,
    pub role: Role,
}

impl Voter {
    pub fn voter(id_user: u64) -> Self {
        Self { id_user, role: Role::Voter }
    }

    pub fn admin(id_user: u64) -> Self {
        Self { id_user, role: Role::Admin }
    }

    pub fn can_cast_vote(&self) -> bool {
        self.role == Role::Voter
    }

    pub fn can_manage(&self, event: &Event) -> bool {
        self.role == Role::Admin || event.is_created_by(self.id_user)
    }
}

use chrono::{DateTime, Utc};
use evlog::meta;

use crate::db::schema::{Event, EventEdit, EventOption, NewEvent, OptionEdit, Voter};
use crate::engine::VoteEngine;
use crate::error::{Result, VoteError};
use crate::runtime::get_logger;
use crate::status::TimeStatus;
use crate::store::Storage;
use crate::support::validate;

/// Which columns of an event may still change, given its current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditableFields {
    pub status: TimeStatus,
    pub title: bool,
    pub description: bool,
    pub time_start: bool,
    pub time_end: bool,
}

impl EditableFields {
    pub fn for_status(status: TimeStatus) -> Self {
        let (title, time_start, time_end) = match status {
            TimeStatus::Waiting => (true, true, true),
            TimeStatus::Open => (true, false, true),
            TimeStatus::Closed => (false, false, false),
            TimeStatus::Unknown => (true, false, false),
        };

        Self {
            status,
            title,
            description: true,
            time_start,
            time_end,
        }
    }

    /// Candidates can only be edited before voting starts.
    pub fn options(&self) -> bool {
        self.status == TimeStatus::Waiting
    }
}

/// An event with its status as of the request that listed it.
#[derive(Debug, Clone, PartialEq)]
pub struct ListedEvent {
    pub event: Event,
    pub status: TimeStatus,
}

const RECOMMENDATIONS: usize = 3;

fn listed(events: Vec<Event>, now: DateTime<Utc>) -> Vec<ListedEvent> {
    events.into_iter()
        .map(|event| ListedEvent {
            status: event.status(now),
            event,
        })
        .collect()
}

fn check_new_event(event: NewEvent, now: DateTime<Utc>) -> Result<NewEvent> {
    let title = validate::title(&event.title)?;
    let description = validate::description(event.description.as_deref())?;
    validate::schedule(event.time_start, event.time_end, now)?;
    let options = validate::option_set(event.options.iter().map(String::as_str))?;

    Ok(NewEvent {
        title,
        description,
        time_start: event.time_start,
        time_end: event.time_end,
        options,
    })
}

impl<S: Storage> VoteEngine<S> {
    fn require_manager(&self, voter: &Voter, event: &Event) -> Result<()> {
        if voter.can_manage(event) {
            return Ok(());
        }

        get_logger().info("Non-manager attempted to modify event.", meta! {
            "UserID" => voter.id_user,
            "EventID" => event.id,
        });

        Err(VoteError::Forbidden("only the event creator or an administrator may manage this event".to_owned()))
    }

    pub async fn create_event(&self, voter: &Voter, event: NewEvent) -> Result<(Event, Vec<EventOption>)> {
        let now = self.clock.now();

        let checked = match check_new_event(event, now) {
            Ok(v) => v,
            Err(e) => {
                get_logger().info("Rejected event creation.", meta! {
                    "UserID" => voter.id_user,
                    "Error" => e.to_string(),
                });
                return Err(e);
            }
        };

        let (created, options) = self.bounded("add_event", self.storage.add_event(voter.id_user, &checked, now)).await?;

        get_logger().info("Event created.", meta! {
            "UserID" => voter.id_user,
            "EventID" => created.id,
            "Options" => options.len(),
        });

        Ok((created, options))
    }

    /// Every event, open ones first.
    pub async fn list_events(&self) -> Result<Vec<ListedEvent>> {
        let now = self.clock.now();
        let events = self.bounded("list_events", self.storage.list_events(now)).await?;

        Ok(listed(events, now))
    }

    pub async fn upcoming(&self, limit: Option<usize>) -> Result<Vec<ListedEvent>> {
        let now = self.clock.now();
        let events = self.bounded("upcoming", self.storage.upcoming(now, limit)).await?;

        Ok(listed(events, now))
    }

    /// A few other scheduled events to show next to `id_event`.
    pub async fn recommendations(&self, id_event: i32) -> Result<Vec<ListedEvent>> {
        let now = self.clock.now();
        let events = self.bounded("recommendations", self.storage.recommendations(id_event, RECOMMENDATIONS)).await?;

        Ok(listed(events, now))
    }

    pub async fn editable_fields(&self, id_event: i32) -> Result<EditableFields> {
        Ok(EditableFields::for_status(self.status_of(id_event).await?))
    }

    /// Applies `edit` as the new state of the event. Columns that are locked in
    /// the current status must come back unchanged.
    pub async fn edit_event(&self, voter: &Voter, id_event: i32, edit: EventEdit) -> Result<Event> {
        let now = self.clock.now();
        let event = self.load_event(id_event).await?;
        self.require_manager(voter, &event)?;

        let fields = EditableFields::for_status(event.status(now));

        let title = validate::title(&edit.title)?;
        let description = validate::description(edit.description.as_deref())?;

        let locked = [
            ("title", !fields.title && title != event.title),
            ("description", !fields.description && description != event.description),
            ("start time", !fields.time_start && edit.time_start != event.time_start),
            ("end time", !fields.time_end && edit.time_end != event.time_end),
        ];
        if let Some((field, _)) = locked.iter().find(|(_, changed)| *changed) {
            get_logger().info("Attempted to edit a locked event field.", meta! {
                "UserID" => voter.id_user,
                "EventID" => id_event,
                "Field" => field,
                "Status" => fields.status,
            });
            return Err(VoteError::InvalidState(format!(
                "the {} of a {} event cannot be changed", field, fields.status
            )));
        }

        if fields.time_start && edit.time_start.is_none() {
            return Err(VoteError::Invalid("Please select a start date".to_owned()));
        }
        if fields.time_end && edit.time_end.is_none() {
            return Err(VoteError::Invalid("Please select an end date".to_owned()));
        }
        if let (Some(start), Some(end)) = (edit.time_start, edit.time_end) {
            if end <= start {
                return Err(VoteError::Invalid("End time cannot be before or equal to start time".to_owned()));
            }
        }

        match fields.status {
            TimeStatus::Waiting => {
                if edit.time_start != event.time_start && matches!(edit.time_start, Some(start) if start < now) {
                    return Err(VoteError::Invalid("Start time cannot be in the past".to_owned()));
                }
            }
            TimeStatus::Open => {
                if edit.time_end != event.time_end && matches!(edit.time_end, Some(end) if end <= now) {
                    return Err(VoteError::Invalid("End time must be in the future for an open event".to_owned()));
                }
            }
            _ => {}
        }

        let edit = EventEdit {
            title,
            description,
            time_start: edit.time_start,
            time_end: edit.time_end,
        };

        if !self.bounded("update_event", self.storage.update_event(id_event, &edit)).await? {
            return Err(VoteError::NotFound(format!("event {}", id_event)));
        }

        get_logger().info("Event updated.", meta! {
            "UserID" => voter.id_user,
            "EventID" => id_event,
        });

        Ok(Event {
            title: edit.title,
            description: edit.description,
            time_start: edit.time_start,
            time_end: edit.time_end,
            ..event
        })
    }

    /// Rewrites the candidate list. Allowed only while the event is waiting
    /// and nobody has voted, so a ballot never points at a changed option.
    pub async fn replace_options(&self, voter: &Voter, id_event: i32, edits: Vec<OptionEdit>) -> Result<Vec<EventOption>> {
        let now = self.clock.now();
        let event = self.load_event(id_event).await?;
        self.require_manager(voter, &event)?;

        let status = event.status(now);
        if !EditableFields::for_status(status).options() {
            return Err(VoteError::InvalidState(format!(
                "candidates of event {} can only change before voting starts; it is {}", id_event, status
            )));
        }

        if self.bounded("has_ballots", self.storage.has_ballots(id_event)).await? {
            return Err(VoteError::InvalidState(format!("event {} already has ballots; its options are locked", id_event)));
        }

        let edits = edits.into_iter()
            .filter(|e| !e.option.trim().is_empty())
            .collect::<Vec<_>>();
        let texts = validate::option_set(edits.iter().map(|e| e.option.as_str()))?;
        let edits = edits.into_iter()
            .zip(texts)
            .map(|(e, option)| OptionEdit { id: e.id, option })
            .collect::<Vec<_>>();

        let options = self.bounded("replace_options", self.storage.replace_options(id_event, &edits)).await?;

        get_logger().info("Event options replaced.", meta! {
            "UserID" => voter.id_user,
            "EventID" => id_event,
            "Options" => options.len(),
        });

        Ok(options)
    }

    pub async fn delete_event(&self, voter: &Voter, id_event: i32) -> Result<()> {
        let event = self.load_event(id_event).await?;
        self.require_manager(voter, &event)?;

        if !self.bounded("delete_event", self.storage.delete_event(id_event)).await? {
            return Err(VoteError::NotFound(format!("event {}", id_event)));
        }

        get_logger().info("Event deleted.", meta! {
            "UserID" => voter.id_user,
            "EventID" => id_event,
        });

        Ok(())
    }
}

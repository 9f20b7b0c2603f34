use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{query, PgPool, Row};
use tokio_stream::StreamExt;

use crate::db::schema::{Ballot, Event, EventEdit, EventOption, NewEvent, OptionEdit, Upsert};
use crate::error::{Result, VoteError};

const EVENT_COLUMNS: &str = "id, time_created, id_created_by, title, description, time_start, time_end";
const BALLOT_COLUMNS: &str = "id_event, id_user, id_option, time_created, time_modified";

fn parse_user(raw: &str) -> Result<u64, sqlx::Error> {
    raw.parse::<u64>().map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn event_row(r: PgRow) -> Result<Event, sqlx::Error> {
    Ok(Event {
        id: r.try_get("id")?,
        time_created: r.try_get("time_created")?,
        id_created_by: parse_user(r.try_get("id_created_by")?)?,
        title: r.try_get("title")?,
        description: r.try_get("description")?,
        time_start: r.try_get("time_start")?,
        time_end: r.try_get("time_end")?,
    })
}

fn option_row(r: PgRow) -> Result<EventOption, sqlx::Error> {
    Ok(EventOption {
        id_event: r.try_get("id_event")?,
        id: r.try_get("id")?,
        option: r.try_get("option")?,
    })
}

fn ballot_row(r: &PgRow) -> Result<Ballot, sqlx::Error> {
    Ok(Ballot {
        id_event: r.try_get("id_event")?,
        id_user: parse_user(r.try_get("id_user")?)?,
        id_option: r.try_get("id_option")?,
        time_created: r.try_get("time_created")?,
        time_modified: r.try_get("time_modified")?,
    })
}

// Events

pub async fn get_event(conn: &PgPool, id_event: i32) -> Result<Option<Event>> {
    let sql = format!("SELECT {} FROM event WHERE id=$1;", EVENT_COLUMNS);

    let r = query(&sql)
        .bind(id_event)
        .try_map(event_row)
        .fetch_optional(conn)
        .await?;

    Ok(r)
}

pub async fn add_event(conn: &PgPool, id_created_by: u64, event: &NewEvent, now: DateTime<Utc>) -> Result<(Event, Vec<EventOption>)> {
    let mut tx = conn.begin().await?;

    let r = query(
        "INSERT INTO event (time_created, id_created_by, title, description, time_start, time_end)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING id, time_created;")
        .bind(now)
        .bind(id_created_by.to_string())
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.time_start)
        .bind(event.time_end)
        .fetch_one(&mut tx)
        .await?;

    let id_event: i32 = r.try_get("id")?;
    let time_created: DateTime<Utc> = r.try_get("time_created")?;

    let mut opt_result = Vec::new();

    for option in &event.options {
        let option_r = query(
            "INSERT INTO event_option (id_event, option)
             VALUES ($1, $2)
             RETURNING id;")
            .bind(id_event)
            .bind(option)
            .fetch_one(&mut tx)
            .await?;

        opt_result.push(EventOption {
            id_event,
            id: option_r.try_get("id")?,
            option: option.to_owned(),
        });
    }

    tx.commit().await?;

    Ok((Event {
        id: id_event,
        time_created,
        id_created_by,
        title: event.title.clone(),
        description: event.description.clone(),
        time_start: event.time_start,
        time_end: event.time_end,
    }, opt_result))
}

pub async fn update_event(conn: &PgPool, id_event: i32, edit: &EventEdit) -> Result<bool> {
    let r = query("UPDATE event SET title=$2, description=$3, time_start=$4, time_end=$5 WHERE id=$1;")
        .bind(id_event)
        .bind(&edit.title)
        .bind(&edit.description)
        .bind(edit.time_start)
        .bind(edit.time_end)
        .execute(conn)
        .await?;

    Ok(r.rows_affected() > 0)
}

/// Options and ballots go with the event through `ON DELETE CASCADE`.
pub async fn delete_event(conn: &PgPool, id_event: i32) -> Result<bool> {
    let r = query("DELETE FROM event WHERE id=$1;")
        .bind(id_event)
        .execute(conn)
        .await?;

    Ok(r.rows_affected() > 0)
}

pub async fn count_closed_events_excluding(conn: &PgPool, id_user: u64, now: DateTime<Utc>) -> Result<i64> {
    let r = query("SELECT COUNT(*) AS closed FROM event WHERE time_end < $1 AND id_created_by <> $2;")
        .bind(now)
        .bind(id_user.to_string())
        .fetch_one(conn)
        .await?;

    Ok(r.try_get("closed")?)
}

pub async fn list_events(conn: &PgPool, now: DateTime<Utc>) -> Result<Vec<Event>> {
    let sql = format!(
        "SELECT {} FROM event
         ORDER BY
             CASE
                 WHEN time_start IS NULL AND time_end IS NULL THEN 3
                 WHEN $1 < time_start THEN 1
                 WHEN $1 > time_end THEN 2
                 ELSE 0
             END,
             time_start ASC NULLS LAST,
             id;",
        EVENT_COLUMNS);

    let mut stream = query(&sql)
        .bind(now)
        .try_map(event_row)
        .fetch(conn);

    let mut result = Vec::new();
    while let Some(row) = stream.try_next().await? {
        result.push(row);
    }

    Ok(result)
}

/// `LIMIT NULL` places no limit.
pub async fn list_upcoming_events(conn: &PgPool, now: DateTime<Utc>, limit: Option<usize>) -> Result<Vec<Event>> {
    let sql = format!("SELECT {} FROM event WHERE time_start > $1 ORDER BY time_start, id LIMIT $2;", EVENT_COLUMNS);

    let mut stream = query(&sql)
        .bind(now)
        .bind(limit.map(|v| v as i64))
        .try_map(event_row)
        .fetch(conn);

    let mut result = Vec::new();
    while let Some(row) = stream.try_next().await? {
        result.push(row);
    }

    Ok(result)
}

pub async fn list_other_scheduled_events(conn: &PgPool, id_event: i32, limit: usize) -> Result<Vec<Event>> {
    let sql = format!(
        "SELECT {} FROM event WHERE id <> $1 AND time_start IS NOT NULL ORDER BY time_start, id LIMIT $2;",
        EVENT_COLUMNS);

    let mut stream = query(&sql)
        .bind(id_event)
        .bind(limit as i64)
        .try_map(event_row)
        .fetch(conn);

    let mut result = Vec::new();
    while let Some(row) = stream.try_next().await? {
        result.push(row);
    }

    Ok(result)
}

// Options

pub async fn list_options(conn: &PgPool, id_event: i32) -> Result<Vec<EventOption>> {
    let mut stream = query("SELECT id, id_event, option FROM event_option WHERE id_event=$1 ORDER BY id;")
        .bind(id_event)
        .try_map(option_row)
        .fetch(conn);

    let mut result = Vec::new();
    while let Some(row) = stream.try_next().await? {
        result.push(row);
    }

    Ok(result)
}

pub async fn option_belongs_to(conn: &PgPool, id_option: i32, id_event: i32) -> Result<bool> {
    let r = query("SELECT EXISTS(SELECT 1 FROM event_option WHERE id=$1 AND id_event=$2) AS known;")
        .bind(id_option)
        .bind(id_event)
        .fetch_one(conn)
        .await?;

    Ok(r.try_get("known")?)
}

/// Applies a candidate edit list in one transaction. The event row is locked
/// first so the ballot check and the rewrite see the same state.
pub async fn replace_options(conn: &PgPool, id_event: i32, edits: &[OptionEdit]) -> Result<Vec<EventOption>> {
    let mut tx = conn.begin().await?;

    let locked = query("SELECT id FROM event WHERE id=$1 FOR UPDATE;")
        .bind(id_event)
        .fetch_optional(&mut tx)
        .await?;
    if locked.is_none() {
        return Err(VoteError::NotFound(format!("event {}", id_event)));
    }

    let voted = query("SELECT EXISTS(SELECT 1 FROM ballot WHERE id_event=$1) AS voted;")
        .bind(id_event)
        .fetch_one(&mut tx)
        .await?;
    if voted.try_get::<bool, _>("voted")? {
        return Err(VoteError::InvalidState(format!("event {} already has ballots; its options are locked", id_event)));
    }

    let existing = query("SELECT id, id_event, option FROM event_option WHERE id_event=$1;")
        .bind(id_event)
        .try_map(option_row)
        .fetch_all(&mut tx)
        .await?
        .into_iter()
        .map(|o| (o.id, o.option))
        .collect::<HashMap<_, _>>();

    let mut kept = HashSet::new();

    for edit in edits {
        match edit.id.filter(|id| existing.contains_key(id)) {
            Some(id) => {
                kept.insert(id);
                if existing[&id] != edit.option {
                    query("UPDATE event_option SET option=$2 WHERE id=$1;")
                        .bind(id)
                        .bind(&edit.option)
                        .execute(&mut tx)
                        .await?;
                }
            }
            None => {
                query("INSERT INTO event_option (id_event, option) VALUES ($1, $2);")
                    .bind(id_event)
                    .bind(&edit.option)
                    .execute(&mut tx)
                    .await?;
            }
        }
    }

    for id in existing.keys().filter(|id| !kept.contains(*id)) {
        query("DELETE FROM event_option WHERE id=$1;")
            .bind(*id)
            .execute(&mut tx)
            .await?;
    }

    let result = query("SELECT id, id_event, option FROM event_option WHERE id_event=$1 ORDER BY id;")
        .bind(id_event)
        .try_map(option_row)
        .fetch_all(&mut tx)
        .await?;

    tx.commit().await?;

    Ok(result)
}

// Ballots

pub async fn get_ballot(conn: &PgPool, id_user: u64, id_event: i32) -> Result<Option<Ballot>> {
    let sql = format!("SELECT {} FROM ballot WHERE id_event=$1 AND id_user=$2;", BALLOT_COLUMNS);

    let r = query(&sql)
        .bind(id_event)
        .bind(id_user.to_string())
        .try_map(|r: PgRow| ballot_row(&r))
        .fetch_optional(conn)
        .await?;

    Ok(r)
}

/// Insert-or-replace as one statement; the `(id_event, id_user)` unique key
/// arbitrates concurrent casts. `xmax = 0` only holds for freshly inserted rows.
pub async fn upsert_ballot(conn: &PgPool, id_user: u64, id_event: i32, id_option: i32, now: DateTime<Utc>) -> Result<(Ballot, Upsert)> {
    let sql = format!(
        "INSERT INTO ballot (id_event, id_user, id_option, time_created, time_modified)
         VALUES ($1, $2, $3, $4, $4)
         ON CONFLICT (id_event, id_user)
         DO UPDATE SET id_option=EXCLUDED.id_option, time_modified=EXCLUDED.time_modified
         RETURNING {}, (xmax = 0) AS inserted;",
        BALLOT_COLUMNS);

    let r = query(&sql)
        .bind(id_event)
        .bind(id_user.to_string())
        .bind(id_option)
        .bind(now)
        .try_map(|r: PgRow| {
            let inserted: bool = r.try_get("inserted")?;
            Ok((ballot_row(&r)?, if inserted { Upsert::Created } else { Upsert::Updated }))
        })
        .fetch_one(conn)
        .await?;

    Ok(r)
}

pub async fn delete_ballot(conn: &PgPool, id_user: u64, id_event: i32) -> Result<bool> {
    let r = query("DELETE FROM ballot WHERE id_event=$1 AND id_user=$2;")
        .bind(id_event)
        .bind(id_user.to_string())
        .execute(conn)
        .await?;

    Ok(r.rows_affected() > 0)
}

pub async fn count_by_option(conn: &PgPool, id_event: i32) -> Result<HashMap<i32, i64>> {
    let mut stream = query(
        "SELECT o.id, COUNT(b.id_user) AS votes
         FROM event_option o
         LEFT JOIN ballot b ON b.id_option = o.id
         WHERE o.id_event=$1
         GROUP BY o.id;")
        .bind(id_event)
        .try_map(|r: PgRow| Ok((r.try_get::<i32, _>("id")?, r.try_get::<i64, _>("votes")?)))
        .fetch(conn);

    let mut result = HashMap::new();
    while let Some((id, votes)) = stream.try_next().await? {
        result.insert(id, votes);
    }

    Ok(result)
}

pub async fn has_ballots(conn: &PgPool, id_event: i32) -> Result<bool> {
    let r = query("SELECT EXISTS(SELECT 1 FROM ballot WHERE id_event=$1) AS voted;")
        .bind(id_event)
        .fetch_one(conn)
        .await?;

    Ok(r.try_get("voted")?)
}

pub async fn list_ballots_for_user(conn: &PgPool, id_user: u64) -> Result<Vec<Ballot>> {
    let sql = format!("SELECT {} FROM ballot WHERE id_user=$1 ORDER BY time_modified DESC;", BALLOT_COLUMNS);

    let r = query(&sql)
        .bind(id_user.to_string())
        .try_map(|r: PgRow| ballot_row(&r))
        .fetch_all(conn)
        .await?;

    Ok(r)
}

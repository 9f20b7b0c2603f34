use std::collections::HashSet;

use chrono::{DateTime, Datelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, VoteError};

pub const MAX_TITLE_LEN: usize = 45;
pub const MAX_DESCRIPTION_LEN: usize = 255;
pub const MAX_OPTION_LEN: usize = 45;
pub const MIN_OPTIONS: usize = 2;
pub const MAX_YEARS_AHEAD: i32 = 10;

static PRINTABLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\p{Cc}]*$").unwrap());

fn invalid<T>(msg: impl Into<String>) -> Result<T> {
    Err(VoteError::Invalid(msg.into()))
}

pub fn title(raw: &str) -> Result<String> {
    let title = raw.trim();

    if title.is_empty() {
        return invalid("Please enter an event name");
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return invalid(format!("Event name is too long (maximum {} characters)", MAX_TITLE_LEN));
    }
    if !PRINTABLE.is_match(title) {
        return invalid("Event name may not contain control characters");
    }

    Ok(title.to_owned())
}

pub fn description(raw: Option<&str>) -> Result<Option<String>> {
    let description = match raw.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(v) => v,
    };

    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return invalid(format!("Event description is too long (maximum {} characters)", MAX_DESCRIPTION_LEN));
    }

    Ok(Some(description.to_owned()))
}

pub fn option_text(raw: &str) -> Result<String> {
    let text = raw.trim();

    if text.is_empty() {
        return invalid("Candidate name cannot be empty");
    }
    if text.chars().count() > MAX_OPTION_LEN {
        return invalid(format!("Candidate name '{}' is too long (maximum {} characters)", text, MAX_OPTION_LEN));
    }
    if !PRINTABLE.is_match(text) {
        return invalid("Candidate names may not contain control characters");
    }

    Ok(text.to_owned())
}

/// Checks a full candidate list. Blank entries are dropped before counting.
pub fn option_set<'a>(raw: impl IntoIterator<Item = &'a str>) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut result = Vec::new();

    for text in raw.into_iter().filter(|v| !v.trim().is_empty()) {
        let text = option_text(text)?;

        if !seen.insert(text.to_lowercase()) {
            return invalid(format!(
                "Duplicate candidate \"{}\" is not allowed. Each candidate must have a unique name.", text
            ));
        }

        result.push(text);
    }

    if result.len() < MIN_OPTIONS {
        return invalid(format!("Please add at least {} candidates", MIN_OPTIONS));
    }

    Ok(result)
}

/// Schedule rules for a brand new event.
pub fn schedule(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Result<()> {
    let start = match start {
        None => return invalid("Please select a start date"),
        Some(v) => v,
    };
    let end = match end {
        None => return invalid("Please select an end date"),
        Some(v) => v,
    };

    if start < now {
        return invalid("Start time cannot be in the past");
    }
    if end <= start {
        return invalid("End time cannot be before or equal to start time");
    }
    if start.year() > now.year() + MAX_YEARS_AHEAD || end.year() > now.year() + MAX_YEARS_AHEAD {
        return invalid(format!("Event dates cannot be more than {} years in the future", MAX_YEARS_AHEAD));
    }

    Ok(())
}

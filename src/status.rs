use std::fmt;

use chrono::{DateTime, Utc};

/// Lifecycle state of an event at one instant. Always computed, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeStatus {
    Waiting,
    Open,
    Closed,
    Unknown,
}

impl TimeStatus {
    /// `Unknown` fails closed: an event without any bounds never accepts ballots.
    pub fn is_votable(self) -> bool {
        self == TimeStatus::Open
    }

    /// Position in event listings: open events first, undated ones last.
    pub fn listing_rank(self) -> u8 {
        match self {
            TimeStatus::Open => 0,
            TimeStatus::Waiting => 1,
            TimeStatus::Closed => 2,
            TimeStatus::Unknown => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeStatus::Waiting => "Waiting",
            TimeStatus::Open => "Open",
            TimeStatus::Closed => "Closed",
            TimeStatus::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for TimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn resolve(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>, now: DateTime<Utc>) -> TimeStatus {
    match (start, end) {
        (None, None) => TimeStatus::Unknown,
        (Some(start), _) if now < start => TimeStatus::Waiting,
        (_, Some(end)) if now > end => TimeStatus::Closed,
        _ => TimeStatus::Open,
    }
}

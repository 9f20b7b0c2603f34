use chrono::{DateTime, Utc};

use crate::engine::VoteEngine;
use crate::error::Result;
use crate::status::TimeStatus;
use crate::store::Storage;
use crate::support::numbers::percentage;

#[derive(Debug, Clone, PartialEq)]
pub struct RecentVote {
    pub id_event: i32,
    pub event_title: String,
    pub id_option: i32,
    pub option: String,
    pub time_modified: DateTime<Utc>,
    pub status: TimeStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoterStats {
    pub total_votes: usize,
    pub closed_events_voted: usize,
    /// Closed events voted in, over closed events the user could vote in.
    pub participation_rate: f64,
    pub last_vote: Option<DateTime<Utc>>,
}

impl<S: Storage> VoteEngine<S> {
    pub async fn recent_votes(&self, id_user: u64, limit: usize) -> Result<Vec<RecentVote>> {
        let now = self.clock.now();
        let ballots = self.bounded("list_for_user", self.storage.list_for_user(id_user)).await?;

        let mut result = Vec::new();
        for ballot in ballots.into_iter().take(limit) {
            // Skip events deleted between the two reads.
            let event = match self.bounded("get_event", self.storage.get_event(ballot.id_event)).await? {
                None => continue,
                Some(v) => v,
            };

            let option = self.bounded("options_of", self.storage.options_of(ballot.id_event)).await?
                .into_iter()
                .find(|o| o.id == ballot.id_option)
                .map(|o| o.option)
                .unwrap_or_default();

            result.push(RecentVote {
                id_event: event.id,
                status: event.status(now),
                event_title: event.title,
                id_option: ballot.id_option,
                option,
                time_modified: ballot.time_modified,
            });
        }

        Ok(result)
    }

    pub async fn voter_stats(&self, id_user: u64) -> Result<VoterStats> {
        let now = self.clock.now();
        let ballots = self.bounded("list_for_user", self.storage.list_for_user(id_user)).await?;

        let mut closed_events_voted = 0;
        for ballot in &ballots {
            if let Some(event) = self.bounded("get_event", self.storage.get_event(ballot.id_event)).await? {
                // Own events are outside the denominator too.
                if event.status(now) == TimeStatus::Closed && !event.is_created_by(id_user) {
                    closed_events_voted += 1;
                }
            }
        }

        let closed = self.bounded(
            "count_closed_events_excluding",
            self.storage.count_closed_events_excluding(id_user, now),
        ).await?;

        Ok(VoterStats {
            total_votes: ballots.len(),
            closed_events_voted,
            participation_rate: percentage(closed_events_voted as i64, closed),
            last_vote: ballots.iter().map(|b| b.time_modified).max(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone};

    use crate::db::schema::{Event, Voter};
    use crate::engine::EngineSettings;
    use crate::store::MemoryStorage;
    use crate::support::clock::FixedClock;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 1, 8, 0, 0).unwrap()
    }

    fn event(id: i32, id_created_by: u64, start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
        Event {
            id,
            time_created: start - Duration::days(1),
            id_created_by,
            title: format!("event-{}", id),
            description: None,
            time_start: Some(start),
            time_end: Some(end),
        }
    }

    #[tokio::test]
    async fn history_and_participation() {
        let storage = MemoryStorage::new();
        let h = Duration::hours(1);
        let first = storage.insert_event(event(1, 1, now() - h, now() + h * 2), &["A", "B"]);
        let second = storage.insert_event(event(2, 1, now() - h, now() + h * 4), &["C", "D"]);
        storage.insert_event(event(3, 1, now() - h, now() + h * 4), &["E", "F"]);
        storage.insert_event(event(4, 9, now() - h, now() + h * 4), &["G", "H"]);

        let clock = Arc::new(FixedClock::new(now()));
        let engine = VoteEngine::new(Arc::new(storage), clock.clone(), EngineSettings::default());
        let voter = Voter::voter(9);

        engine.cast_or_update(&voter, 1, first[1].id).await.unwrap();
        clock.advance(Duration::minutes(10));
        engine.cast_or_update(&voter, 2, second[0].id).await.unwrap();

        let recent = engine.recent_votes(9, 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id_event, 2);
        assert_eq!(recent[0].option, "C");
        assert_eq!(recent[1].option, "B");
        assert_eq!(recent[1].status, TimeStatus::Open);
        assert_eq!(engine.recent_votes(9, 1).await.unwrap().len(), 1);

        // Event 1 closes; 2 and 3 stay open; 4 is the voter's own.
        clock.advance(h * 2);
        let stats = engine.voter_stats(9).await.unwrap();
        assert_eq!(stats.total_votes, 2);
        assert_eq!(stats.closed_events_voted, 1);
        assert_eq!(stats.participation_rate, 100.0);
        assert_eq!(stats.last_vote, Some(now() + Duration::minutes(10)));

        // Everything closed now: two of the three eligible events were voted in.
        clock.advance(h * 3);
        let stats = engine.voter_stats(9).await.unwrap();
        assert_eq!(stats.closed_events_voted, 2);
        assert_eq!(stats.participation_rate, 66.7);
    }

    #[tokio::test]
    async fn no_votes_no_rate() {
        let engine = VoteEngine::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(FixedClock::new(now())),
            EngineSettings::default(),
        );

        let stats = engine.voter_stats(5).await.unwrap();
        assert_eq!(stats.total_votes, 0);
        assert_eq!(stats.participation_rate, 0.0);
        assert_eq!(stats.last_vote, None);
    }

    #[tokio::test]
    async fn own_events_do_not_count_toward_participation() {
        let storage = MemoryStorage::new();
        let h = Duration::hours(1);
        let own = storage.insert_event(event(1, 9, now() - h, now() + h), &["A", "B"]);
        let other = storage.insert_event(event(2, 1, now() - h, now() + h), &["C", "D"]);

        let clock = Arc::new(FixedClock::new(now()));
        let settings = EngineSettings {
            allow_self_voting: true,
            ..EngineSettings::default()
        };
        let engine = VoteEngine::new(Arc::new(storage), clock.clone(), settings);
        let voter = Voter::voter(9);

        engine.cast_or_update(&voter, 1, own[0].id).await.unwrap();
        engine.cast_or_update(&voter, 2, other[0].id).await.unwrap();
        clock.advance(h * 2);

        let stats = engine.voter_stats(9).await.unwrap();
        assert_eq!(stats.total_votes, 2);
        assert_eq!(stats.closed_events_voted, 1);
        assert_eq!(stats.participation_rate, 100.0);
    }
}

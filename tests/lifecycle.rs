use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use futures::future::join_all;
use rand::seq::SliceRandom;
use rand::Rng;

use easyvote_events::db::schema::{Event, Upsert, Voter};
use easyvote_events::store::{BallotStore, EventDirectory, MemoryStorage};
use easyvote_events::support::clock::FixedClock;
use easyvote_events::{EngineSettings, Retraction, VoteEngine, VoteError};

const E: i32 = 1;
const U1: u64 = 100;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 11, 5, 15, 0, 0).unwrap()
}

fn event(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Event {
    Event {
        id: E,
        time_created: now() - Duration::days(7),
        id_created_by: 1,
        title: "Budget vote".to_owned(),
        description: None,
        time_start: start,
        time_end: end,
    }
}

fn engine_with(event: Event) -> (VoteEngine<MemoryStorage>, Arc<FixedClock>, i32, i32) {
    let storage = MemoryStorage::new();
    let opts = storage.insert_event(event, &["A", "B"]);
    let clock = Arc::new(FixedClock::new(now()));
    let engine = VoteEngine::new(Arc::new(storage), clock.clone(), EngineSettings::default());

    (engine, clock, opts[0].id, opts[1].id)
}

#[tokio::test]
async fn cast_change_and_retract_while_open() {
    let (engine, _, a, b) = engine_with(event(Some(now() - Duration::hours(1)), Some(now() + Duration::hours(1))));
    let u1 = Voter::voter(U1);

    let receipt = engine.cast_or_update(&u1, E, a).await.unwrap();
    assert_eq!(receipt.outcome, Upsert::Created);
    assert_eq!(receipt.ballot.id_option, a);

    let receipt = engine.cast_or_update(&u1, E, b).await.unwrap();
    assert_eq!(receipt.outcome, Upsert::Updated);
    assert_eq!(receipt.ballot.id_option, b);
    assert_eq!(engine.storage().list_for_user(U1).await.unwrap().len(), 1);

    assert_eq!(engine.retract(&u1, E).await.unwrap(), Retraction::Removed);
    assert_eq!(engine.retract(&u1, E).await.unwrap(), Retraction::Absent);
    assert!(engine.storage().get(U1, E).await.unwrap().is_none());
}

#[tokio::test]
async fn closed_event_rejects_casts_but_reports_counts() {
    let (engine, clock, a, b) = engine_with(event(Some(now() - Duration::hours(3)), Some(now() + Duration::hours(1))));

    engine.cast_or_update(&Voter::voter(U1), E, a).await.unwrap();
    engine.cast_or_update(&Voter::voter(U1 + 1), E, b).await.unwrap();
    engine.cast_or_update(&Voter::voter(U1 + 2), E, b).await.unwrap();

    clock.advance(Duration::hours(2));

    let err = engine.cast_or_update(&Voter::voter(U1), E, b).await.unwrap_err();
    assert!(matches!(err, VoteError::InvalidState(_)));
    assert!(!err.is_retryable());

    let err = engine.retract(&Voter::voter(U1), E).await.unwrap_err();
    assert!(matches!(err, VoteError::InvalidState(_)));

    let counts = engine.count_by_option(E).await.unwrap();
    assert_eq!(counts[&a], 1);
    assert_eq!(counts[&b], 2);

    // The closed event kept U1's original choice.
    assert_eq!(engine.storage().get(U1, E).await.unwrap().unwrap().id_option, a);
}

#[tokio::test]
async fn event_without_bounds_never_opens() {
    let (engine, clock, a, _) = engine_with(event(None, None));

    for _ in 0..3 {
        let err = engine.cast_or_update(&Voter::voter(U1), E, a).await.unwrap_err();
        assert!(matches!(err, VoteError::InvalidState(_)));
        clock.advance(Duration::days(365));
    }
}

#[tokio::test]
async fn concurrent_requests_keep_one_ballot_per_voter() {
    let (engine, _, a, b) = engine_with(event(Some(now() - Duration::hours(1)), Some(now() + Duration::hours(1))));
    let engine = Arc::new(engine);
    let voters = (0..8).map(|i| Voter::voter(U1 + i)).collect::<Vec<_>>();

    let mut requests = Vec::new();
    {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let voter = *voters.choose(&mut rng).unwrap();
            let option = if rng.gen_bool(0.5) { a } else { b };
            let retract = rng.gen_ratio(1, 5);
            requests.push((voter, option, retract));
        }
    }

    let outcomes = join_all(requests.into_iter().map(|(voter, option, retract)| {
        let engine = engine.clone();
        async move {
            if retract {
                engine.retract(&voter, E).await.map(|_| ())
            } else {
                engine.cast_or_update(&voter, E, option).await.map(|_| ())
            }
        }
    })).await;

    assert!(outcomes.iter().all(|r| r.is_ok()));

    for voter in &voters {
        let ballots = engine.storage().list_for_user(voter.id_user).await.unwrap();
        assert!(ballots.len() <= 1);
    }
    assert!(engine.storage().ballot_count() <= voters.len());
}

#[tokio::test]
async fn double_submit_creates_once() {
    let (engine, _, a, _) = engine_with(event(Some(now() - Duration::hours(1)), Some(now() + Duration::hours(1))));
    let engine = Arc::new(engine);
    let u1 = Voter::voter(U1);

    let handles = (0..16).map(|_| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.cast_or_update(&u1, E, a).await })
    }).collect::<Vec<_>>();

    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().outcome == Upsert::Created {
            created += 1;
        }
    }

    assert_eq!(created, 1);
    assert_eq!(engine.storage().ballot_count(), 1);
}

#[tokio::test]
async fn deleting_event_during_slow_cast_leaves_no_ballot() {
    let storage = MemoryStorage::new().with_write_delay(std::time::Duration::from_millis(50));
    let opts = storage.insert_event(event(Some(now() - Duration::hours(1)), Some(now() + Duration::hours(1))), &["A", "B"]);
    let engine = Arc::new(VoteEngine::new(Arc::new(storage), Arc::new(FixedClock::new(now())), EngineSettings::default()));
    let id_option = opts[0].id;

    let cast = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.cast_or_update(&Voter::voter(U1), E, id_option).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    engine.delete_event(&Voter::voter(1), E).await.unwrap();

    let err = cast.await.unwrap().unwrap_err();
    assert!(matches!(err, VoteError::NotFound(_)));
    assert!(engine.storage().get_event(E).await.unwrap().is_none());
    assert_eq!(engine.storage().ballot_count(), 0);
    assert!(engine.storage().list_for_user(U1).await.unwrap().is_empty());
}

//! Property tests for the feed store and the backoff scheduler.

use chrono::{DateTime, TimeZone, Utc};
use livefeed_engine::{Backoff, BackoffConfig, EventRecord, FeedStore};
use proptest::prelude::*;
use std::collections::HashSet;
use std::time::Duration;

fn instant(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_735_689_600 + seconds, 0).unwrap()
}

fn arb_record() -> impl Strategy<Value = EventRecord> {
    (0u8..24, 0i64..40).prop_map(|(id, at)| EventRecord::new(format!("r{id}"), instant(at)))
}

fn check_invariants(store: &FeedStore) -> Result<(), TestCaseError> {
    prop_assert!(store.len() <= store.capacity());

    let mut ids = HashSet::new();
    for record in store.records() {
        prop_assert!(ids.insert(record.id.clone()), "duplicate id {}", record.id);
        prop_assert!(store.contains(&record.id));
    }

    for pair in store.records().windows(2) {
        prop_assert!(pair[0].created_at >= pair[1].created_at);
    }

    let newest = store.records().iter().map(|record| record.created_at).max();
    prop_assert_eq!(store.latest_timestamp(), newest);
    Ok(())
}

proptest! {
    #[test]
    fn merges_preserve_invariants(
        capacity in 1usize..12,
        records in prop::collection::vec(arb_record(), 0..80),
    ) {
        let mut store = FeedStore::new(capacity);
        for record in records {
            store.merge(record);
            check_invariants(&store)?;
        }
    }

    #[test]
    fn seed_preserves_invariants(
        capacity in 1usize..12,
        batch in prop::collection::vec(arb_record(), 0..60),
    ) {
        let mut store = FeedStore::new(capacity);
        store.seed(batch);
        check_invariants(&store)?;
    }

    #[test]
    fn merging_twice_changes_nothing(
        capacity in 1usize..12,
        records in prop::collection::vec(arb_record(), 0..40),
        extra in arb_record(),
    ) {
        let mut store = FeedStore::new(capacity);
        store.seed(records);
        store.merge(extra.clone());
        let before = store.records().to_vec();

        prop_assert!(!store.merge(extra));
        prop_assert_eq!(store.records(), before.as_slice());
    }

    #[test]
    fn held_id_is_never_replaced(
        records in prop::collection::vec(arb_record(), 1..40),
        shift in 1i64..100,
    ) {
        let mut store = FeedStore::new(64);
        store.seed(records);
        let held = store.records()[0].clone();
        let moved = EventRecord::new(held.id.clone(), held.created_at + chrono::Duration::seconds(shift));

        prop_assert!(!store.merge(moved));
        let found: Vec<_> = store.records().iter().filter(|r| r.id == held.id).collect();
        prop_assert_eq!(found.len(), 1);
        prop_assert_eq!(found[0].created_at, held.created_at);
    }

    #[test]
    fn backoff_is_monotonic_until_reset(
        base_ms in 1u64..500,
        extra_ms in 0u64..5_000,
        factor in 1.0f64..4.0,
        calls in 1usize..30,
    ) {
        let base = Duration::from_millis(base_ms);
        let max = base + Duration::from_millis(extra_ms);
        let mut backoff = Backoff::new(
            BackoffConfig::new(base, max).with_factor(factor).with_jitter(0.0),
        );

        let mut previous = Duration::ZERO;
        for _ in 0..calls {
            let delay = backoff.next_delay();
            prop_assert!(delay >= previous);
            prop_assert!(delay <= max);
            prop_assert!(delay > Duration::ZERO);
            previous = delay;
        }

        backoff.reset();
        prop_assert_eq!(backoff.next_delay(), base);
    }

    #[test]
    fn jittered_backoff_stays_in_band(
        base_ms in 10u64..500,
        jitter in 0.0f64..0.9,
        calls in 1usize..20,
    ) {
        let base = Duration::from_millis(base_ms);
        let max = base * 8;
        let mut backoff = Backoff::new(BackoffConfig::new(base, max).with_jitter(jitter));

        for attempt in 0..calls {
            let nominal = backoff.delay_for_attempt(attempt as u32).as_secs_f64();
            let delay = backoff.next_delay().as_secs_f64();
            prop_assert!(delay >= nominal * (1.0 - jitter) - 1e-6);
            prop_assert!(delay <= nominal * (1.0 + jitter) + 1e-6);
        }
    }
}

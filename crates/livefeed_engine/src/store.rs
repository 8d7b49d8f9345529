//! Bounded, de-duplicated, newest-first record store.

use chrono::{DateTime, Utc};
use livefeed_protocol::EventRecord;
use std::collections::HashSet;

/// Ordered record collection rendered by the view.
///
/// Invariants after every call:
/// - `len() <= capacity()`
/// - no two records share an id
/// - records are sorted by `created_at`, newest first; ties keep merge order
///
/// The seen-set only tracks retained records. An id pushed out by the
/// capacity bound can be merged again later.
#[derive(Debug, Clone)]
pub struct FeedStore {
    capacity: usize,
    entries: Vec<EventRecord>,
    seen: HashSet<String>,
}

impl FeedStore {
    /// Creates an empty store holding at most `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity.min(1024)),
            seen: HashSet::new(),
        }
    }

    /// Merges a batch, returning how many records were new.
    pub fn seed<I>(&mut self, records: I) -> usize
    where
        I: IntoIterator<Item = EventRecord>,
    {
        let mut inserted = 0;
        for record in records {
            if self.seen.insert(record.id.clone()) {
                self.entries.push(record);
                inserted += 1;
            }
        }
        if inserted > 0 {
            self.settle();
        }
        inserted
    }

    /// Inserts `record` unless its id is already held.
    ///
    /// Returns true if the record is held afterwards. Duplicates leave the
    /// store untouched; a record older than everything in a full store is
    /// inserted and cut again straight away.
    pub fn merge(&mut self, record: EventRecord) -> bool {
        if self.seen.contains(&record.id) {
            return false;
        }
        let id = record.id.clone();
        self.seen.insert(id.clone());
        self.entries.push(record);
        self.settle();
        self.seen.contains(&id)
    }

    /// Returns the newest timestamp held, used as the catch-up cursor.
    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.entries.first().map(|record| record.created_at)
    }

    /// Returns true if a record with this id is held.
    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Returns the records, newest first.
    pub fn records(&self) -> &[EventRecord] {
        &self.entries
    }

    /// Returns the number of records held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no records are held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the maximum number of records held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn settle(&mut self) {
        // Stable sort: equal timestamps keep the order they were merged in.
        self.entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if self.entries.len() > self.capacity {
            self.entries.truncate(self.capacity);
            self.seen = self.entries.iter().map(|record| record.id.clone()).collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(id: &str, day: u32) -> EventRecord {
        EventRecord::new(id, Utc.with_ymd_and_hms(2025, 1, day, 0, 0, 0).unwrap())
    }

    fn ids(store: &FeedStore) -> Vec<&str> {
        store.records().iter().map(|record| record.id.as_str()).collect()
    }

    #[test]
    fn duplicate_is_rejected_whatever_its_payload() {
        let mut store = FeedStore::new(10);
        assert_eq!(store.seed(vec![at("a", 1)]), 1);
        assert!(!store.merge(at("a", 2).with_message("edited")));

        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0].created_at, at("a", 1).created_at);
        assert_eq!(store.records()[0].message, None);
    }

    #[test]
    fn capacity_keeps_newest() {
        let mut store = FeedStore::new(2);
        assert!(store.merge(at("t1", 1)));
        assert!(store.merge(at("t2", 2)));
        assert!(store.merge(at("t3", 3)));
        assert_eq!(ids(&store), vec!["t3", "t2"]);
        assert!(!store.contains("t1"));
    }

    #[test]
    fn truncated_id_can_return() {
        let mut store = FeedStore::new(1);
        store.merge(at("old", 1));
        store.merge(at("new", 2));
        assert!(!store.contains("old"));

        // Not a duplicate any more, but still older than everything held.
        assert!(!store.merge(at("old", 1)));
        assert_eq!(ids(&store), vec!["new"]);

        let mut bigger = FeedStore::new(3);
        bigger.seed(store.records().to_vec());
        assert!(bigger.merge(at("old", 1)));
        assert_eq!(ids(&bigger), vec!["new", "old"]);
    }

    #[test]
    fn out_of_order_arrivals_are_sorted() {
        let mut store = FeedStore::new(10);
        store.merge(at("b", 2));
        store.merge(at("c", 3));
        store.merge(at("a", 1));
        assert_eq!(ids(&store), vec!["c", "b", "a"]);
        assert_eq!(store.latest_timestamp(), Some(at("c", 3).created_at));
    }

    #[test]
    fn ties_keep_merge_order() {
        let mut store = FeedStore::new(10);
        store.merge(at("first", 5));
        store.merge(at("second", 5));
        store.merge(at("third", 5));
        assert_eq!(ids(&store), vec!["first", "second", "third"]);
    }

    #[test]
    fn seed_is_idempotent() {
        let batch = vec![at("a", 1), at("b", 2), at("a", 1)];
        let mut store = FeedStore::new(10);
        assert_eq!(store.seed(batch.clone()), 2);
        assert_eq!(store.seed(batch), 0);
        assert_eq!(ids(&store), vec!["b", "a"]);
    }

    #[test]
    fn empty_store() {
        let store = FeedStore::new(5);
        assert!(store.is_empty());
        assert_eq!(store.latest_timestamp(), None);
        assert_eq!(store.capacity(), 5);
    }
}

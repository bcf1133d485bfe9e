//! Set-based snapshot diff.
//!
//! [`Diff::new`] classifies a `before` (stored) and an `after` (sourced)
//! snapshot into four disjoint collections keyed by [`Diffable::diff_key`]:
//!
//! | Class        | Condition                                   | Order     |
//! |--------------|---------------------------------------------|-----------|
//! | `added`      | key only in `after`                         | `after`   |
//! | `modified`   | key in both, change predicate true          | `after`   |
//! | `unmodified` | key in both, change predicate false         | `after`   |
//! | `deleted`    | key only in `before`                        | `before`  |
//!
//! Runs in `O(|before| + |after|)` using hash indexes.
//!
//! Duplicate keys inside one snapshot: the last occurrence wins and earlier
//! occurrences are dropped, so every key lands in exactly one collection.

use std::collections::HashMap;
use std::hash::Hash;

use serde::Serialize;

/// An entity that can be matched across two snapshots.
pub trait Diffable {
    type Key: Eq + Hash + Clone;

    fn diff_key(&self) -> Self::Key;

    /// Called on a matched `after` item with its `before` counterpart, after
    /// the change predicate ran. Lets the sourced record keep state the
    /// stored side owns. Default: no-op.
    fn inherit(&mut self, _before: &Self) {}
}

/// Classification of two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diff<T> {
    pub added: Vec<T>,
    pub deleted: Vec<T>,
    pub modified: Vec<T>,
    pub unmodified: Vec<T>,
}

impl<T> Default for Diff<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            deleted: Vec::new(),
            modified: Vec::new(),
            unmodified: Vec::new(),
        }
    }
}

impl<T: Diffable> Diff<T> {
    /// Diff `before` against `after`. `is_modified(before, after)` is only
    /// consulted for keys present in both.
    pub fn new<F>(before: Vec<T>, after: Vec<T>, mut is_modified: F) -> Self
    where
        F: FnMut(&T, &T) -> bool,
    {
        let before_index = last_positions(&before);
        let after_index = last_positions(&after);

        let mut matched = vec![false; before.len()];
        let mut diff = Diff::default();

        for (pos, mut item) in after.into_iter().enumerate() {
            let key = item.diff_key();
            if after_index.get(&key) != Some(&pos) {
                continue;
            }
            match before_index.get(&key) {
                None => diff.added.push(item),
                Some(&stored_pos) => {
                    matched[stored_pos] = true;
                    let stored = &before[stored_pos];
                    let changed = is_modified(stored, &item);
                    item.inherit(stored);
                    if changed {
                        diff.modified.push(item);
                    } else {
                        diff.unmodified.push(item);
                    }
                }
            }
        }

        for (pos, item) in before.into_iter().enumerate() {
            if matched[pos] || before_index.get(&item.diff_key()) != Some(&pos) {
                continue;
            }
            diff.deleted.push(item);
        }

        diff
    }
}

impl<T> Diff<T> {
    /// True when nothing needs to be written.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Number of records that need writing (added + modified + deleted).
    pub fn changes(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }

    /// Total number of classified records.
    pub fn len(&self) -> usize {
        self.changes() + self.unmodified.len()
    }

    /// Added, then modified, then deleted: the write batch for this diff.
    pub fn upserts(&self) -> impl Iterator<Item = &T> {
        self.added
            .iter()
            .chain(self.modified.iter())
            .chain(self.deleted.iter())
    }
}

fn last_positions<T: Diffable>(items: &[T]) -> HashMap<T::Key, usize> {
    let mut index = HashMap::with_capacity(items.len());
    for (pos, item) in items.iter().enumerate() {
        index.insert(item.diff_key(), pos);
    }
    index
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Item {
        key: u8,
        value: u8,
        note: &'static str,
    }

    impl Item {
        fn new(key: u8, value: u8) -> Self {
            Self {
                key,
                value,
                note: "",
            }
        }
    }

    impl Diffable for Item {
        type Key = u8;

        fn diff_key(&self) -> u8 {
            self.key
        }
    }

    fn by_value(a: &Item, b: &Item) -> bool {
        a.value != b.value
    }

    fn keys(items: &[Item]) -> Vec<u8> {
        items.iter().map(|i| i.key).collect()
    }

    #[test]
    fn classifies_each_case() {
        let before = vec![Item::new(1, 0), Item::new(2, 0), Item::new(3, 0)];
        let after = vec![Item::new(4, 0), Item::new(2, 9), Item::new(3, 0)];

        let diff = Diff::new(before, after, by_value);

        assert_eq!(keys(&diff.added), vec![4]);
        assert_eq!(keys(&diff.modified), vec![2]);
        assert_eq!(keys(&diff.unmodified), vec![3]);
        assert_eq!(keys(&diff.deleted), vec![1]);
        assert_eq!(diff.changes(), 3);
        assert_eq!(diff.len(), 4);
    }

    #[test]
    fn preserves_snapshot_order() {
        let before = vec![Item::new(9, 0), Item::new(1, 0), Item::new(5, 0)];
        let after = vec![Item::new(7, 0), Item::new(3, 0), Item::new(8, 0)];

        let diff = Diff::new(before, after, by_value);

        assert_eq!(keys(&diff.added), vec![7, 3, 8]);
        assert_eq!(keys(&diff.deleted), vec![9, 1, 5]);
    }

    #[test]
    fn modified_entries_come_from_after() {
        let diff = Diff::new(vec![Item::new(1, 0)], vec![Item::new(1, 5)], by_value);
        assert_eq!(diff.modified, vec![Item::new(1, 5)]);
    }

    #[test]
    fn predicate_ignores_non_authoritative_changes() {
        let before = vec![Item::new(1, 3)];
        let mut changed = Item::new(1, 3);
        changed.note = "bookkeeping only";

        let diff = Diff::new(before, vec![changed], by_value);
        assert!(diff.is_empty());
        assert_eq!(keys(&diff.unmodified), vec![1]);
    }

    #[test]
    fn duplicate_keys_last_occurrence_wins() {
        let before = vec![Item::new(1, 0), Item::new(1, 5)];
        let after = vec![Item::new(2, 1), Item::new(1, 5), Item::new(2, 2)];

        let diff = Diff::new(before, after, by_value);

        assert_eq!(diff.added, vec![Item::new(2, 2)]);
        assert_eq!(diff.unmodified, vec![Item::new(1, 5)]);
        assert!(diff.deleted.is_empty());
        assert!(diff.modified.is_empty());
    }

    #[test]
    fn empty_inputs_yield_empty_diff() {
        let diff: Diff<Item> = Diff::new(vec![], vec![], by_value);
        assert_eq!(diff, Diff::default());
        assert!(diff.is_empty());
    }

    #[test]
    fn upserts_orders_added_modified_deleted() {
        let before = vec![Item::new(1, 0), Item::new(2, 0)];
        let after = vec![Item::new(2, 1), Item::new(3, 0)];
        let diff = Diff::new(before, after, by_value);
        let order: Vec<u8> = diff.upserts().map(|i| i.key).collect();
        assert_eq!(order, vec![3, 2, 1]);
    }

    proptest! {
        #[test]
        fn every_key_lands_in_exactly_one_class(
            before in prop::collection::vec((0u8..24, 0u8..3), 0..40),
            after in prop::collection::vec((0u8..24, 0u8..3), 0..40),
        ) {
            let before: Vec<Item> = before.into_iter().map(|(k, v)| Item::new(k, v)).collect();
            let after: Vec<Item> = after.into_iter().map(|(k, v)| Item::new(k, v)).collect();

            let expected: HashSet<u8> =
                before.iter().chain(after.iter()).map(|i| i.key).collect();

            let diff = Diff::new(before, after, by_value);

            let mut seen = HashSet::new();
            for item in diff
                .added
                .iter()
                .chain(&diff.deleted)
                .chain(&diff.modified)
                .chain(&diff.unmodified)
            {
                prop_assert!(seen.insert(item.key), "key {} classified twice", item.key);
            }
            prop_assert_eq!(seen, expected);
        }
    }
}

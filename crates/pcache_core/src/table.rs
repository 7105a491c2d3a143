//! In-memory table behind a [`crate::LocalStore`].
//!
//! Rows are kept in primary-key order. Four secondary indexes (name, phone,
//! handle, updatedAt) are maintained on every write; prefix search does not
//! use them and walks the rows instead.

use crate::record::LocalRecord;
use std::collections::{BTreeMap, BTreeSet};

/// Which fields a prefix query is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixKind {
    /// All ASCII digits: phone (literal) or handle (case-insensitive).
    Numeric,
    /// Anything else: display name or handle, both case-insensitive.
    Alphabetic,
}

impl PrefixKind {
    /// Classifies a query prefix. The empty prefix is alphabetic.
    pub fn classify(prefix: &str) -> Self {
        if !prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_digit()) {
            PrefixKind::Numeric
        } else {
            PrefixKind::Alphabetic
        }
    }
}

/// Secondary indexes kept on the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexName {
    /// Lowercased display name.
    Name,
    /// Phone number.
    Phone,
    /// Lowercased handle.
    Handle,
    /// Update timestamp.
    UpdatedAt,
}

impl IndexName {
    /// All indexes, in a stable order.
    pub const ALL: [IndexName; 4] = [
        IndexName::Name,
        IndexName::Phone,
        IndexName::Handle,
        IndexName::UpdatedAt,
    ];

    /// Short name used in stats output.
    pub fn as_str(self) -> &'static str {
        match self {
            IndexName::Name => "name",
            IndexName::Phone => "phone",
            IndexName::Handle => "handle",
            IndexName::UpdatedAt => "updatedAt",
        }
    }
}

/// Key → primary keys mapping.
#[derive(Debug)]
struct SecondaryIndex<K: Ord> {
    entries: BTreeMap<K, BTreeSet<String>>,
}

impl<K: Ord> SecondaryIndex<K> {
    fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    fn insert(&mut self, key: Option<K>, id: &str) {
        if let Some(key) = key {
            self.entries.entry(key).or_default().insert(id.to_string());
        }
    }

    fn remove(&mut self, key: Option<K>, id: &str) {
        let Some(key) = key else { return };
        if let Some(ids) = self.entries.get_mut(&key) {
            ids.remove(id);
            if ids.is_empty() {
                self.entries.remove(&key);
            }
        }
    }

    fn last_key(&self) -> Option<&K> {
        self.entries.keys().next_back()
    }

    fn len(&self) -> usize {
        self.entries.values().map(BTreeSet::len).sum()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

fn lowered(value: &Option<String>) -> Option<String> {
    value.as_ref().map(|v| v.to_lowercase())
}

fn starts_with_ci(field: &Option<String>, lowered_prefix: &str) -> bool {
    field
        .as_deref()
        .is_some_and(|value| value.to_lowercase().starts_with(lowered_prefix))
}

/// Rows of one workspace partition plus their secondary indexes.
#[derive(Debug)]
pub(crate) struct RecordTable {
    rows: BTreeMap<String, LocalRecord>,
    by_name: SecondaryIndex<String>,
    by_phone: SecondaryIndex<String>,
    by_handle: SecondaryIndex<String>,
    by_updated: SecondaryIndex<i64>,
}

impl RecordTable {
    pub(crate) fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            by_name: SecondaryIndex::new(),
            by_phone: SecondaryIndex::new(),
            by_handle: SecondaryIndex::new(),
            by_updated: SecondaryIndex::new(),
        }
    }

    /// Inserts or replaces a row, keeping every index in step.
    pub(crate) fn upsert(&mut self, record: LocalRecord) {
        if let Some(old) = self.rows.remove(&record.id) {
            self.unindex(&old);
        }
        self.index(&record);
        self.rows.insert(record.id.clone(), record);
    }

    pub(crate) fn upsert_all(&mut self, records: Vec<LocalRecord>) {
        for record in records {
            self.upsert(record);
        }
    }

    fn index(&mut self, record: &LocalRecord) {
        let id = record.id.as_str();
        self.by_name.insert(lowered(&record.display_name), id);
        self.by_phone.insert(record.phone.clone(), id);
        self.by_handle.insert(lowered(&record.handle), id);
        self.by_updated.insert(Some(record.updated_at), id);
    }

    fn unindex(&mut self, record: &LocalRecord) {
        let id = record.id.as_str();
        self.by_name.remove(lowered(&record.display_name), id);
        self.by_phone.remove(record.phone.clone(), id);
        self.by_handle.remove(lowered(&record.handle), id);
        self.by_updated.remove(Some(record.updated_at), id);
    }

    pub(crate) fn get(&self, id: &str) -> Option<&LocalRecord> {
        self.rows.get(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub(crate) fn rows(&self) -> impl Iterator<Item = &LocalRecord> {
        self.rows.values()
    }

    pub(crate) fn latest_updated_at(&self) -> i64 {
        self.by_updated.last_key().copied().unwrap_or(0)
    }

    pub(crate) fn index_len(&self, index: IndexName) -> usize {
        match index {
            IndexName::Name => self.by_name.len(),
            IndexName::Phone => self.by_phone.len(),
            IndexName::Handle => self.by_handle.len(),
            IndexName::UpdatedAt => self.by_updated.len(),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.rows.clear();
        self.by_name.clear();
        self.by_phone.clear();
        self.by_handle.clear();
        self.by_updated.clear();
    }

    /// Linear scan in primary-key order, stopping at `limit` matches.
    pub(crate) fn scan_prefix(&self, prefix: &str, limit: usize) -> Vec<LocalRecord> {
        let mut matches = Vec::new();
        if limit == 0 {
            return matches;
        }

        let kind = PrefixKind::classify(prefix);
        let lowered_prefix = prefix.to_lowercase();

        for record in self.rows.values() {
            let hit = match kind {
                PrefixKind::Numeric => {
                    record
                        .phone
                        .as_deref()
                        .is_some_and(|phone| phone.starts_with(prefix))
                        || starts_with_ci(&record.handle, &lowered_prefix)
                }
                PrefixKind::Alphabetic => {
                    starts_with_ci(&record.display_name, &lowered_prefix)
                        || starts_with_ci(&record.handle, &lowered_prefix)
                }
            };

            if hit {
                matches.push(record.clone());
                if matches.len() == limit {
                    break;
                }
            }
        }

        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn patient(id: &str, name: &str, phone: &str) -> LocalRecord {
        LocalRecord::new(id).with_display_name(name).with_phone(phone)
    }

    fn ids(records: &[LocalRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn classify_prefixes() {
        assert_eq!(PrefixKind::classify("98"), PrefixKind::Numeric);
        assert_eq!(PrefixKind::classify("john"), PrefixKind::Alphabetic);
        assert_eq!(PrefixKind::classify("98a"), PrefixKind::Alphabetic);
        assert_eq!(PrefixKind::classify(""), PrefixKind::Alphabetic);
    }

    #[test]
    fn numeric_prefix_matches_phone_only() {
        let mut table = RecordTable::new();
        table.upsert(patient("1", "John Doe", "9812345"));
        table.upsert(patient("2", "Johnny", "1112223"));

        assert_eq!(ids(&table.scan_prefix("98", 10)), vec!["1"]);
        assert_eq!(ids(&table.scan_prefix("john", 10)), vec!["1", "2"]);
    }

    #[test]
    fn alphabetic_prefix_never_matches_phone() {
        let mut table = RecordTable::new();
        table.upsert(patient("1", "Zed", "98x"));
        assert!(table.scan_prefix("98x", 10).is_empty());
    }

    #[test]
    fn handle_matches_both_kinds_case_insensitively() {
        let mut table = RecordTable::new();
        table.upsert(LocalRecord::new("1").with_handle("JDoe77"));
        table.upsert(LocalRecord::new("2").with_handle("4242bob"));

        assert_eq!(ids(&table.scan_prefix("jdo", 10)), vec!["1"]);
        assert_eq!(ids(&table.scan_prefix("4242", 10)), vec!["2"]);
    }

    #[test]
    fn scan_stops_at_limit_in_key_order() {
        let mut table = RecordTable::new();
        for id in ["c", "a", "b"] {
            table.upsert(patient(id, "Anna", "1"));
        }
        assert_eq!(ids(&table.scan_prefix("an", 2)), vec!["a", "b"]);
        assert!(table.scan_prefix("an", 0).is_empty());
    }

    #[test]
    fn upsert_reindexes_old_values() {
        let mut table = RecordTable::new();
        table.upsert(patient("1", "Anna", "1").with_updated_at(50));
        table.upsert(patient("1", "Bella", "2").with_updated_at(10));

        assert_eq!(table.len(), 1);
        assert_eq!(table.index_len(IndexName::Name), 1);
        assert_eq!(table.index_len(IndexName::Phone), 1);
        assert_eq!(table.latest_updated_at(), 10);
        assert!(table.scan_prefix("anna", 10).is_empty());
    }

    #[test]
    fn clear_empties_rows_and_indexes() {
        let mut table = RecordTable::new();
        table.upsert(patient("1", "Anna", "1"));
        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.latest_updated_at(), 0);
        for index in IndexName::ALL {
            assert_eq!(table.index_len(index), 0);
        }
    }

    fn record_strategy() -> impl Strategy<Value = LocalRecord> {
        (
            "[a-z0-9]{1,6}",
            proptest::option::of("[A-Za-z0-9 ]{0,8}"),
            proptest::option::of("[0-9]{0,8}"),
            proptest::option::of("[A-Za-z0-9]{0,8}"),
        )
            .prop_map(|(id, name, phone, handle)| LocalRecord {
                id,
                display_name: name,
                phone,
                handle,
                ..LocalRecord::default()
            })
    }

    proptest! {
        #[test]
        fn scan_respects_field_policy(
            records in proptest::collection::vec(record_strategy(), 0..40),
            prefix in "[A-Za-z0-9]{1,3}",
            limit in 0usize..20,
        ) {
            let mut table = RecordTable::new();
            table.upsert_all(records);
            let found = table.scan_prefix(&prefix, limit);
            prop_assert!(found.len() <= limit);

            let lower = prefix.to_lowercase();
            let ci = |f: &Option<String>| {
                f.as_deref().is_some_and(|v| v.to_lowercase().starts_with(&lower))
            };
            for record in &found {
                match PrefixKind::classify(&prefix) {
                    PrefixKind::Numeric => prop_assert!(
                        record.phone.as_deref().is_some_and(|p| p.starts_with(&prefix))
                            || ci(&record.handle)
                    ),
                    PrefixKind::Alphabetic => prop_assert!(
                        ci(&record.display_name) || ci(&record.handle)
                    ),
                }
            }

            let mut sorted = found.iter().map(|r| r.id.clone()).collect::<Vec<_>>();
            sorted.sort();
            prop_assert_eq!(sorted, found.iter().map(|r| r.id.clone()).collect::<Vec<_>>());
        }
    }
}

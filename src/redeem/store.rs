//! Code store contract and the in-memory store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::StoreError;

/// A single-use code as persisted by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeRecord {
    pub id: String,
    pub redeemed: bool,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CodeRecord {
    /// A fresh, unredeemed record
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            redeemed: false,
            redeemed_at: None,
            created_at: Utc::now(),
        }
    }

    /// Compare-and-set on `redeemed`. Callers must hold exclusive access to
    /// the record for the whole call.
    ///
    /// Once `redeemed` is true it never reverts and `redeemed_at` is never
    /// rewritten.
    pub fn redeem_at(&mut self, now: DateTime<Utc>) -> Redemption {
        if self.redeemed {
            // a redeemed record always carries its timestamp; fall back to
            // creation time for hand-edited data
            return Redemption::AlreadyRedeemed {
                at: self.redeemed_at.unwrap_or(self.created_at),
            };
        }
        self.redeemed = true;
        self.redeemed_at = Some(now);
        Redemption::Redeemed { at: now }
    }
}

/// Result of the store's atomic redeem-if-unredeemed primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redemption {
    /// No record with that id
    NotFound,
    /// Record was already redeemed; `at` is the original redemption time
    AlreadyRedeemed { at: DateTime<Utc> },
    /// This call flipped the record to redeemed
    Redeemed { at: DateTime<Utc> },
}

impl Redemption {
    pub fn found(&self) -> bool {
        !matches!(self, Redemption::NotFound)
    }

    pub fn was_already_redeemed(&self) -> bool {
        matches!(self, Redemption::AlreadyRedeemed { .. })
    }

    pub fn redeemed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Redemption::NotFound => None,
            Redemption::AlreadyRedeemed { at } | Redemption::Redeemed { at } => Some(*at),
        }
    }
}

/// Record store the redemption coordinator depends on
///
/// `redeem_if_unredeemed` is the serialization point for concurrent scans of
/// the same code, across sessions and devices: it must be a single atomic
/// read-modify-write, never a read followed by a separate write.
#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Read-only lookup
    async fn find_code(&self, id: &str) -> Result<Option<CodeRecord>, StoreError>;

    /// Atomically set `redeemed = true, redeemed_at = now` if the record
    /// exists and is unredeemed.
    async fn redeem_if_unredeemed(&self, id: &str) -> Result<Redemption, StoreError>;

    /// All records, newest first
    async fn list_codes(&self) -> Result<Vec<CodeRecord>, StoreError>;
}

pub(crate) fn newest_first(mut records: Vec<CodeRecord>) -> Vec<CodeRecord> {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    records
}

/// Process-local store; the record map lock makes every redemption atomic
#[derive(Debug, Default)]
pub struct MemoryCodeStore {
    records: Mutex<HashMap<String, CodeRecord>>,
}

impl MemoryCodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with fresh records for the given ids
    pub fn with_codes<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        for id in ids {
            store.insert(CodeRecord::new(id));
        }
        store
    }

    /// Add a record; returns false (and keeps the existing one) if the id is taken.
    pub fn insert(&self, record: CodeRecord) -> bool {
        let mut records = self.records.lock();
        if records.contains_key(&record.id) {
            return false;
        }
        records.insert(record.id.clone(), record);
        true
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl CodeStore for MemoryCodeStore {
    async fn find_code(&self, id: &str) -> Result<Option<CodeRecord>, StoreError> {
        Ok(self.records.lock().get(id).cloned())
    }

    async fn redeem_if_unredeemed(&self, id: &str) -> Result<Redemption, StoreError> {
        let mut records = self.records.lock();
        Ok(match records.get_mut(id) {
            Some(record) => record.redeem_at(Utc::now()),
            None => Redemption::NotFound,
        })
    }

    async fn list_codes(&self) -> Result<Vec<CodeRecord>, StoreError> {
        let records = self.records.lock().values().cloned().collect();
        Ok(newest_first(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_record_compare_and_set() {
        let mut record = CodeRecord::new("abc");
        let t1 = Utc::now();
        let t2 = t1 + Duration::seconds(5);

        assert_eq!(record.redeem_at(t1), Redemption::Redeemed { at: t1 });
        assert_eq!(record.redeem_at(t2), Redemption::AlreadyRedeemed { at: t1 });
        assert!(record.redeemed);
        assert_eq!(record.redeemed_at, Some(t1));
    }

    #[tokio::test]
    async fn test_redeem_twice() {
        let store = MemoryCodeStore::with_codes(["abc"]);

        let first = store.redeem_if_unredeemed("abc").await.unwrap();
        let second = store.redeem_if_unredeemed("abc").await.unwrap();

        assert!(matches!(first, Redemption::Redeemed { .. }));
        assert!(second.was_already_redeemed());
        assert_eq!(first.redeemed_at(), second.redeemed_at());
    }

    #[tokio::test]
    async fn test_unknown_code_is_not_created() {
        let store = MemoryCodeStore::with_codes(["abc"]);

        let result = store.redeem_if_unredeemed("nope").await.unwrap();
        assert_eq!(result, Redemption::NotFound);
        assert!(!result.found());
        assert_eq!(store.len(), 1);
        assert!(store.find_code("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_keeps_existing_record() {
        let store = MemoryCodeStore::new();
        assert!(store.insert(CodeRecord::new("a")));
        store.redeem_if_unredeemed("a").await.unwrap();
        assert!(!store.insert(CodeRecord::new("a")));
        assert!(store.find_code("a").await.unwrap().unwrap().redeemed);
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let store = MemoryCodeStore::new();
        let mut old = CodeRecord::new("old");
        old.created_at = Utc::now() - Duration::days(1);
        store.insert(old);
        store.insert(CodeRecord::new("new"));

        let ids: Vec<_> = store
            .list_codes()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["new", "old"]);
    }
}

//! Key-value store abstraction behind the single table
//!
//! A store keeps rows addressed by `(pk, sk)`, answers ordered range reads on
//! the primary key and on four secondary key pairs, and applies bounded
//! all-or-nothing transactions. It knows nothing about entities.

pub mod memory;
pub mod postgres;

use std::collections::HashSet;

use async_trait::async_trait;
use cataloguer_core::AppError;
use serde_json::{Map, Value};
use thiserror::Error;

use super::table::layout::PhysicalIndex;
use super::table::record::{Position, PrimaryKey, StoredRecord};

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Store operation errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Condition check failed for {pk}/{sk}")]
    ConditionFailed { pk: String, sk: String },

    #[error("Key {pk}/{sk} appears more than once in one transaction")]
    DuplicateKey { pk: String, sk: String },

    #[error("Transaction has {count} items; the store accepts at most {max}")]
    TooManyItems { count: usize, max: usize },

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConditionFailed { .. } | StoreError::DuplicateKey { .. } => {
                AppError::TransactionFailed(err.to_string())
            }
            StoreError::TooManyItems { count, max } => AppError::TooManyOperations { count, max },
            StoreError::Corrupt(msg) => AppError::Internal(msg),
            StoreError::Backend(msg) => AppError::Database(msg),
        }
    }
}

/// Condition on the sort key of an index.
///
/// Bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortCondition {
    BeginsWith(String),
    Between(String, String),
    Gte(String),
    Lte(String),
}

impl SortCondition {
    pub fn matches(&self, sort_key: &str) -> bool {
        match self {
            SortCondition::BeginsWith(prefix) => sort_key.starts_with(prefix.as_str()),
            SortCondition::Between(low, high) => {
                sort_key >= low.as_str() && sort_key <= high.as_str()
            }
            SortCondition::Gte(low) => sort_key >= low.as_str(),
            SortCondition::Lte(high) => sort_key <= high.as_str(),
        }
    }
}

/// One ordered read of a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeQuery {
    pub index: PhysicalIndex,
    pub partition: String,
    pub condition: Option<SortCondition>,
    pub ascending: bool,
    /// Exclusive start: resume strictly after this position in read order.
    pub start_after: Option<Position>,
    pub limit: usize,
}

impl RangeQuery {
    /// Whether `position` lies strictly after the resume point in read order.
    pub fn is_after_start(&self, position: &Position) -> bool {
        match &self.start_after {
            None => true,
            Some(start) if self.ascending => position > start,
            Some(start) => position < start,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RangePage {
    pub records: Vec<StoredRecord>,
    /// Position of the last returned row; `None` when the range is exhausted.
    pub last_evaluated: Option<Position>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteCondition {
    None,
    MustNotExist,
    MustExist,
}

/// One write inside an atomic transaction.
#[derive(Debug, Clone)]
pub enum TransactItem {
    Put {
        record: StoredRecord,
        condition: WriteCondition,
    },
    /// Merge non-key attributes into an existing row.
    Patch {
        key: PrimaryKey,
        set: Map<String, Value>,
    },
    Delete {
        key: PrimaryKey,
        condition: WriteCondition,
    },
}

impl TransactItem {
    pub fn key(&self) -> PrimaryKey {
        match self {
            TransactItem::Put { record, .. } => record.primary_key(),
            TransactItem::Patch { key, .. } | TransactItem::Delete { key, .. } => key.clone(),
        }
    }
}

/// Merge attributes into a live row, outside any transaction.
///
/// Applies only when the row exists and `unless_present` is absent from its
/// attributes. Secondary sort keys listed in `sort_keys` are rewritten in the
/// same row write; partition keys never change.
#[derive(Debug, Clone)]
pub struct ConditionalPatch {
    pub key: PrimaryKey,
    pub set: Map<String, Value>,
    pub sort_keys: Vec<(PhysicalIndex, String)>,
    pub unless_present: String,
}

impl ConditionalPatch {
    /// Patch carrying `fields` of `after`, plus every secondary sort key that
    /// differs between `before` and `after`.
    pub fn between(
        before: &StoredRecord,
        after: &StoredRecord,
        fields: &[&str],
        unless_present: &str,
    ) -> Self {
        let set = after
            .attributes()
            .map(|attrs| {
                fields
                    .iter()
                    .filter_map(|field| {
                        attrs
                            .get(*field)
                            .map(|value| (field.to_string(), value.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default();
        let sort_keys = PhysicalIndex::SECONDARY
            .into_iter()
            .filter_map(|index| {
                let (_, old_sk) = before.index_key(index)?;
                let (_, new_sk) = after.index_key(index)?;
                (old_sk != new_sk).then(|| (index, new_sk.to_string()))
            })
            .collect();
        Self {
            key: after.primary_key(),
            set,
            sort_keys,
            unless_present: unless_present.to_string(),
        }
    }

    /// Whether `record` may take this patch.
    pub fn applies_to(&self, record: &StoredRecord) -> bool {
        record
            .attributes()
            .is_some_and(|attrs| !attrs.contains_key(&self.unless_present))
    }
}

/// Reject oversized transactions and transactions touching a key twice.
pub fn check_transaction(items: &[TransactItem], max: usize) -> StoreResult<()> {
    if items.len() > max {
        return Err(StoreError::TooManyItems {
            count: items.len(),
            max,
        });
    }
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        let key = item.key();
        if !seen.insert(key.clone()) {
            return Err(StoreError::DuplicateKey {
                pk: key.pk,
                sk: key.sk,
            });
        }
    }
    Ok(())
}

/// Key-value store abstraction trait
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    /// Largest number of items accepted by `transact_write`
    fn max_transaction_items(&self) -> usize;

    async fn get(&self, key: &PrimaryKey) -> StoreResult<Option<StoredRecord>>;

    /// Fetch many rows by key; missing keys are skipped, order is not kept.
    async fn batch_get(&self, keys: &[PrimaryKey]) -> StoreResult<Vec<StoredRecord>>;

    async fn query(&self, query: &RangeQuery) -> StoreResult<RangePage>;

    /// Apply every item or none.
    async fn transact_write(&self, items: Vec<TransactItem>) -> StoreResult<()>;

    /// Unconditional upserts with no atomicity across rows.
    async fn batch_put(&self, records: Vec<StoredRecord>) -> StoreResult<()>;

    /// Apply each patch on its own; returns the keys of rows that took it.
    async fn patch_live(&self, patches: Vec<ConditionalPatch>) -> StoreResult<Vec<PrimaryKey>>;

    /// Release connections; further calls may fail.
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::table::layout::EntityKind;

    fn put(pk: &str, sk: &str) -> TransactItem {
        TransactItem::Put {
            record: StoredRecord {
                pk: pk.to_string(),
                sk: sk.to_string(),
                entity: EntityKind::User,
                indexes: Default::default(),
                data: Value::Null,
            },
            condition: WriteCondition::None,
        }
    }

    #[test]
    fn test_check_transaction_rejects_duplicates() {
        let items = vec![
            put("A", "1"),
            TransactItem::Delete {
                key: PrimaryKey::new("A", "1"),
                condition: WriteCondition::None,
            },
        ];
        assert!(matches!(
            check_transaction(&items, 10),
            Err(StoreError::DuplicateKey { .. })
        ));
    }

    #[test]
    fn test_check_transaction_rejects_oversized() {
        let items: Vec<_> = (0..3).map(|i| put("A", &i.to_string())).collect();
        assert!(matches!(
            check_transaction(&items, 2),
            Err(StoreError::TooManyItems { count: 3, max: 2 })
        ));
        assert!(check_transaction(&items, 3).is_ok());
    }

    #[test]
    fn test_sort_condition_bounds_are_inclusive() {
        let between = SortCondition::Between("B".to_string(), "D".to_string());
        assert!(between.matches("B"));
        assert!(between.matches("C#1"));
        assert!(between.matches("D"));
        assert!(!between.matches("D#1"));
        assert!(SortCondition::BeginsWith("IMAGE#".to_string()).matches("IMAGE#x"));
    }

    #[test]
    fn test_conditional_patch_carries_changed_sort_keys_only() {
        use crate::db::table::record::IndexKey;

        let record = |price: &str, sort: &str, extra: Value| {
            let mut indexes: [Option<IndexKey>; 4] = Default::default();
            indexes[0] = Some(IndexKey {
                pk: "CATALOGUE#c".to_string(),
                sk: "ITEM#i".to_string(),
            });
            indexes[1] = Some(IndexKey {
                pk: "CATALOGUE#c".to_string(),
                sk: sort.to_string(),
            });
            let mut data = serde_json::json!({"name": "Lamp", "price": price});
            if let (Some(map), Value::Object(more)) = (data.as_object_mut(), extra) {
                map.extend(more);
            }
            StoredRecord {
                pk: "ITEM#i".to_string(),
                sk: "ITEM#i".to_string(),
                entity: EntityKind::CatalogueItem,
                indexes,
                data,
            }
        };
        let before = record("10", "PRICE#0000001000", Value::Null);
        let after = record("11", "PRICE#0000001100", Value::Null);

        let patch = ConditionalPatch::between(&before, &after, &["price", "missing"], "deletedAt");
        assert_eq!(patch.set.len(), 1);
        assert_eq!(patch.set["price"], Value::from("11"));
        assert_eq!(
            patch.sort_keys,
            vec![(PhysicalIndex::Gsi2, "PRICE#0000001100".to_string())]
        );
        assert!(patch.applies_to(&before));
        let deleted = record("10", "PRICE#0000001000", serde_json::json!({"deletedAt": 1}));
        assert!(!patch.applies_to(&deleted));
    }

    #[test]
    fn test_store_error_maps_to_app_error() {
        let err: AppError = StoreError::ConditionFailed {
            pk: "A".to_string(),
            sk: "B".to_string(),
        }
        .into();
        assert!(matches!(err, AppError::TransactionFailed(_)));
        let err: AppError = StoreError::TooManyItems { count: 101, max: 100 }.into();
        assert!(matches!(
            err,
            AppError::TooManyOperations { count: 101, max: 100 }
        ));
    }
}

//! In-process store used by tests and development hosts.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    check_transaction, ConditionalPatch, KvStore, RangePage, RangeQuery, StoreError, StoreResult,
    TransactItem, WriteCondition,
};
use crate::db::table::record::{Position, PrimaryKey, StoredRecord};

/// Rows in a `BTreeMap` behind a tokio `RwLock`.
///
/// The lock is held for the duration of one store call only. Transactions
/// check every condition under the write lock before applying anything.
pub struct MemoryStore {
    rows: RwLock<BTreeMap<PrimaryKey, StoredRecord>>,
    max_transaction_items: usize,
}

impl MemoryStore {
    pub fn new(max_transaction_items: usize) -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            max_transaction_items,
        }
    }

    /// Number of stored rows, soft-deleted ones included.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

fn check_condition(
    rows: &BTreeMap<PrimaryKey, StoredRecord>,
    key: &PrimaryKey,
    condition: WriteCondition,
) -> StoreResult<()> {
    let exists = rows.contains_key(key);
    let ok = match condition {
        WriteCondition::None => true,
        WriteCondition::MustExist => exists,
        WriteCondition::MustNotExist => !exists,
    };
    if ok {
        Ok(())
    } else {
        Err(StoreError::ConditionFailed {
            pk: key.pk.clone(),
            sk: key.sk.clone(),
        })
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn max_transaction_items(&self) -> usize {
        self.max_transaction_items
    }

    async fn get(&self, key: &PrimaryKey) -> StoreResult<Option<StoredRecord>> {
        Ok(self.rows.read().await.get(key).cloned())
    }

    async fn batch_get(&self, keys: &[PrimaryKey]) -> StoreResult<Vec<StoredRecord>> {
        let rows = self.rows.read().await;
        Ok(keys.iter().filter_map(|key| rows.get(key).cloned()).collect())
    }

    async fn query(&self, query: &RangeQuery) -> StoreResult<RangePage> {
        let rows = self.rows.read().await;

        let mut candidates: Vec<(Position, &StoredRecord)> = rows
            .values()
            .filter_map(|record| {
                let (pk, sk) = record.index_key(query.index)?;
                if pk != query.partition {
                    return None;
                }
                if let Some(condition) = &query.condition {
                    if !condition.matches(sk) {
                        return None;
                    }
                }
                let position = record.position(query.index)?;
                query.is_after_start(&position).then_some((position, record))
            })
            .collect();

        candidates.sort_by(|a, b| a.0.cmp(&b.0));
        if !query.ascending {
            candidates.reverse();
        }

        let has_more = candidates.len() > query.limit;
        candidates.truncate(query.limit);

        let last_evaluated = if has_more {
            candidates.last().map(|(position, _)| position.clone())
        } else {
            None
        };

        Ok(RangePage {
            records: candidates
                .into_iter()
                .map(|(_, record)| record.clone())
                .collect(),
            last_evaluated,
        })
    }

    async fn transact_write(&self, items: Vec<TransactItem>) -> StoreResult<()> {
        check_transaction(&items, self.max_transaction_items)?;

        let mut rows = self.rows.write().await;

        for item in &items {
            match item {
                TransactItem::Put { record, condition } => {
                    check_condition(&rows, &record.primary_key(), *condition)?
                }
                TransactItem::Patch { key, .. } => {
                    check_condition(&rows, key, WriteCondition::MustExist)?
                }
                TransactItem::Delete { key, condition } => {
                    check_condition(&rows, key, *condition)?
                }
            }
        }

        for item in items {
            match item {
                TransactItem::Put { record, .. } => {
                    rows.insert(record.primary_key(), record);
                }
                TransactItem::Patch { key, set } => {
                    let row = rows.get_mut(&key).ok_or_else(|| StoreError::ConditionFailed {
                        pk: key.pk.clone(),
                        sk: key.sk.clone(),
                    })?;
                    let data = row.data.as_object_mut().ok_or_else(|| {
                        StoreError::Corrupt(format!("{}/{} has no attribute map", key.pk, key.sk))
                    })?;
                    data.extend(set);
                }
                TransactItem::Delete { key, .. } => {
                    rows.remove(&key);
                }
            }
        }

        Ok(())
    }

    async fn batch_put(&self, records: Vec<StoredRecord>) -> StoreResult<()> {
        let mut rows = self.rows.write().await;
        for record in records {
            rows.insert(record.primary_key(), record);
        }
        Ok(())
    }

    async fn patch_live(&self, patches: Vec<ConditionalPatch>) -> StoreResult<Vec<PrimaryKey>> {
        let mut rows = self.rows.write().await;
        let mut applied = Vec::with_capacity(patches.len());
        for patch in patches {
            let Some(row) = rows.get_mut(&patch.key) else {
                continue;
            };
            if !patch.applies_to(row) {
                continue;
            }
            let ConditionalPatch {
                key,
                set,
                sort_keys,
                ..
            } = patch;
            let data = row.data.as_object_mut().ok_or_else(|| {
                StoreError::Corrupt(format!("{}/{} has no attribute map", key.pk, key.sk))
            })?;
            data.extend(set);
            for (index, sort_key) in sort_keys {
                if let Some(entry) = index.slot().and_then(|slot| row.indexes[slot].as_mut()) {
                    entry.sk = sort_key;
                }
            }
            applied.push(key);
        }
        Ok(applied)
    }

    async fn close(&self) {
        let rows = self.len().await;
        tracing::debug!(rows, "Closing memory store");
    }
}

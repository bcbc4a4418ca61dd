//! Transactional write coordinator
//!
//! Repositories describe a multi-record change as a `WriteBatch` of logical
//! operations and hand it to `Table::commit`, which translates them into one
//! conditional store transaction. Either every operation applies or none does.

use cataloguer_core::AppError;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::query::DELETED_AT;
use super::store::{TransactItem, WriteCondition};
use super::table::layout::EntityKind;
use super::table::record::{Entity, PrimaryKey, StoredRecord};
use super::table::Table;

/// One logical write
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Insert; fails if the key already exists.
    Create(StoredRecord),
    /// Replace an existing record; fails if it is missing.
    Update(StoredRecord),
    /// Set `deletedAt` (and `updatedAt` where the entity has it); fails if missing.
    SoftDelete {
        key: PrimaryKey,
        set: Map<String, Value>,
    },
    /// Physical removal; fails if missing.
    Delete(PrimaryKey),
}

impl WriteOp {
    fn into_item(self) -> TransactItem {
        match self {
            WriteOp::Create(record) => TransactItem::Put {
                record,
                condition: WriteCondition::MustNotExist,
            },
            WriteOp::Update(record) => TransactItem::Put {
                record,
                condition: WriteCondition::MustExist,
            },
            WriteOp::SoftDelete { key, set } => TransactItem::Patch { key, set },
            WriteOp::Delete(key) => TransactItem::Delete {
                key,
                condition: WriteCondition::MustExist,
            },
        }
    }
}

/// Ordered set of writes committed together
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
    kinds: Vec<EntityKind>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    fn push(&mut self, kind: EntityKind, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self.kinds.push(kind);
        self
    }

    pub fn create<E: Entity>(&mut self, entity: &E) -> Result<&mut Self, AppError> {
        let record = entity.to_record()?;
        Ok(self.push(E::KIND, WriteOp::Create(record)))
    }

    pub fn update<E: Entity>(&mut self, entity: &E) -> Result<&mut Self, AppError> {
        let record = entity.to_record()?;
        Ok(self.push(E::KIND, WriteOp::Update(record)))
    }

    /// Mark `entity` deleted at `at`; keys and other attributes stay untouched.
    pub fn soft_delete<E: Entity>(
        &mut self,
        entity: &E,
        at: DateTime<Utc>,
    ) -> Result<&mut Self, AppError> {
        let record = entity.to_record()?;
        let millis = Value::from(at.timestamp_millis());
        let mut set = Map::new();
        set.insert(DELETED_AT.to_string(), millis.clone());
        if record.data.get("updatedAt").is_some() {
            set.insert("updatedAt".to_string(), millis);
        }
        Ok(self.push(
            E::KIND,
            WriteOp::SoftDelete {
                key: record.primary_key(),
                set,
            },
        ))
    }

    pub fn delete<E: Entity>(&mut self, key: PrimaryKey) -> &mut Self {
        self.push(E::KIND, WriteOp::Delete(key))
    }

    fn summary(&self) -> String {
        let mut counts: Vec<(EntityKind, usize)> = Vec::new();
        for kind in &self.kinds {
            match counts.iter_mut().find(|(k, _)| k == kind) {
                Some((_, n)) => *n += 1,
                None => counts.push((*kind, 1)),
            }
        }
        counts
            .iter()
            .map(|(kind, n)| format!("{}={}", kind, n))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Table {
    /// Apply every operation of `batch` atomically.
    ///
    /// Batches above the store's atomic bound are rejected before anything is
    /// sent; they are never split.
    pub async fn commit(&self, batch: WriteBatch) -> Result<(), AppError> {
        if batch.is_empty() {
            return Ok(());
        }
        let max = self
            .limits()
            .max_transaction_items
            .min(self.store().max_transaction_items());
        if batch.len() > max {
            return Err(AppError::TooManyOperations {
                count: batch.len(),
                max,
            });
        }

        let summary = batch.summary();
        let count = batch.len();
        let items: Vec<TransactItem> = batch.ops.into_iter().map(WriteOp::into_item).collect();

        match self.store().transact_write(items).await {
            Ok(()) => {
                tracing::debug!(operations = count, entities = %summary, "Committed write batch");
                Ok(())
            }
            Err(e) => {
                let error = AppError::from(e);
                error.report(&format!("Write batch of {} rejected ({})", count, summary));
                Err(error)
            }
        }
    }
}

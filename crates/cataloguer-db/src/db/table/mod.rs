//! The single logical table
//!
//! `Table` binds a store to the layout and record codec. Point reads live
//! here; range queries are in `db::query` and atomic writes in
//! `db::transaction`.

pub mod layout;
pub mod record;

use std::sync::Arc;

use cataloguer_core::{AppError, Clock, TableLimits};
use chrono::{DateTime, Utc};

use super::query::DELETED_AT;
use super::store::{ConditionalPatch, KvStore};
use record::{Entity, PrimaryKey};

pub use layout::{EntityKind, PhysicalIndex};
pub use record::{Position, StoredRecord};

/// Shared handle to the table; cheap to clone.
#[derive(Clone)]
pub struct Table {
    store: Arc<dyn KvStore>,
    limits: TableLimits,
    clock: Arc<dyn Clock>,
}

impl Table {
    pub fn new(store: Arc<dyn KvStore>, limits: TableLimits, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            limits,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn limits(&self) -> &TableLimits {
        &self.limits
    }

    /// Current time from the injected clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Direct lookup by primary key; soft-deleted records are returned too.
    pub async fn get<E: Entity>(&self, key: &PrimaryKey) -> Result<Option<E>, AppError> {
        match self.store.get(key).await? {
            Some(record) => Ok(Some(E::from_record(record)?)),
            None => Ok(None),
        }
    }

    /// Lookup many keys at once, in the order of `keys`; missing keys are skipped.
    pub async fn get_many<E: Entity>(&self, keys: &[PrimaryKey]) -> Result<Vec<E>, AppError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut records = self.store.batch_get(keys).await?;
        records.sort_by_key(|record| {
            keys.iter()
                .position(|key| key.pk == record.pk && key.sk == record.sk)
                .unwrap_or(usize::MAX)
        });
        records.into_iter().map(E::from_record).collect()
    }

    /// Non-transactional field update in chunks of `batch_write_size`.
    ///
    /// Each `(before, after)` pair writes `fields` of `after`, plus the
    /// secondary sort keys that changed, onto the stored row. Rows that are
    /// gone or soft-deleted by then are left alone. A failure part-way leaves
    /// earlier chunks written. Returns the keys that were updated.
    pub async fn patch_live<E: Entity>(
        &self,
        changes: &[(E, E)],
        fields: &[&str],
    ) -> Result<Vec<PrimaryKey>, AppError> {
        let patches = changes
            .iter()
            .map(|(before, after)| {
                Ok(ConditionalPatch::between(
                    &before.to_record()?,
                    &after.to_record()?,
                    fields,
                    DELETED_AT,
                ))
            })
            .collect::<Result<Vec<_>, AppError>>()?;
        let chunk_size = self.limits.batch_write_size.max(1);
        let mut applied = Vec::with_capacity(patches.len());
        for chunk in patches.chunks(chunk_size) {
            applied.extend(self.store.patch_live(chunk.to_vec()).await?);
        }
        tracing::debug!(
            entity = %E::KIND,
            requested = patches.len(),
            applied = applied.len(),
            chunks = patches.len().div_ceil(chunk_size),
            "Live patch complete"
        );
        Ok(applied)
    }

    pub async fn close(&self) {
        self.store.close().await;
    }
}

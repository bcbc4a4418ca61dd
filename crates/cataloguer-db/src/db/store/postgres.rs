//! PostgreSQL-backed store
//!
//! The whole table lives in one relation. Key columns use the `C` collation so
//! that SQL ordering is plain byte order, which is what composite sort keys
//! rely on.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};

use super::{
    check_transaction, ConditionalPatch, KvStore, RangePage, RangeQuery, SortCondition,
    StoreError, StoreResult, TransactItem, WriteCondition,
};
use crate::db::table::layout::{EntityKind, PhysicalIndex};
use crate::db::table::record::{IndexKey, PrimaryKey, StoredRecord};
use cataloguer_core::config::{is_valid_table_name, StoreConfig};

const SELECT_COLUMNS: &str = "pk, sk, entity, gsi1_pk, gsi1_sk, gsi2_pk, gsi2_sk, gsi3_pk, gsi3_sk, gsi4_pk, gsi4_sk, data";

/// Store over a sqlx Postgres pool
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    table: String,
    max_transaction_items: usize,
}

fn key_columns(index: PhysicalIndex) -> (&'static str, &'static str) {
    match index {
        PhysicalIndex::Primary => ("pk", "sk"),
        PhysicalIndex::Gsi1 => ("gsi1_pk", "gsi1_sk"),
        PhysicalIndex::Gsi2 => ("gsi2_pk", "gsi2_sk"),
        PhysicalIndex::Gsi3 => ("gsi3_pk", "gsi3_sk"),
        PhysicalIndex::Gsi4 => ("gsi4_pk", "gsi4_sk"),
    }
}

impl PostgresStore {
    /// Connect a pool using the store settings.
    pub async fn connect(config: &StoreConfig, max_transaction_items: usize) -> StoreResult<Self> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| StoreError::Backend("DATABASE_URL is not set".to_string()))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_secs(config.db_timeout_seconds))
            .connect(url)
            .await?;

        tracing::info!(
            max_connections = config.db_max_connections,
            table = %config.table_name,
            "Connected to PostgreSQL"
        );

        Self::new(pool, &config.table_name, max_transaction_items)
    }

    pub fn new(pool: PgPool, table: &str, max_transaction_items: usize) -> StoreResult<Self> {
        if !is_valid_table_name(table) {
            return Err(StoreError::Backend(format!(
                "Invalid table name '{}'",
                table
            )));
        }
        Ok(Self {
            pool,
            table: table.to_string(),
            max_transaction_items,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the table and its secondary indexes if they do not exist.
    #[tracing::instrument(skip(self), fields(db.table = %self.table, db.operation = "create"))]
    pub async fn ensure_table(&self) -> StoreResult<()> {
        let create = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {t} (
                pk TEXT COLLATE "C" NOT NULL,
                sk TEXT COLLATE "C" NOT NULL,
                entity TEXT NOT NULL,
                gsi1_pk TEXT COLLATE "C",
                gsi1_sk TEXT COLLATE "C",
                gsi2_pk TEXT COLLATE "C",
                gsi2_sk TEXT COLLATE "C",
                gsi3_pk TEXT COLLATE "C",
                gsi3_sk TEXT COLLATE "C",
                gsi4_pk TEXT COLLATE "C",
                gsi4_sk TEXT COLLATE "C",
                data JSONB NOT NULL,
                PRIMARY KEY (pk, sk)
            )
            "#,
            t = self.table
        );
        sqlx::query(&create).execute(&self.pool).await?;

        for index in PhysicalIndex::SECONDARY {
            let (pk_col, sk_col) = key_columns(index);
            let statement = format!(
                "CREATE INDEX IF NOT EXISTS {t}_{name} ON {t} ({pk_col}, {sk_col}, pk, sk) WHERE {pk_col} IS NOT NULL",
                t = self.table,
                name = index.as_str(),
            );
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    fn decode_row(row: &PgRow) -> StoreResult<StoredRecord> {
        let entity: String = row.try_get("entity")?;
        let entity = EntityKind::parse(&entity)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown entity '{}'", entity)))?;

        let mut indexes: [Option<IndexKey>; 4] = Default::default();
        for index in PhysicalIndex::SECONDARY {
            let (pk_col, sk_col) = key_columns(index);
            let pk: Option<String> = row.try_get(pk_col)?;
            let sk: Option<String> = row.try_get(sk_col)?;
            if let (Some(pk), Some(sk), Some(slot)) = (pk, sk, index.slot()) {
                indexes[slot] = Some(IndexKey { pk, sk });
            }
        }

        Ok(StoredRecord {
            pk: row.try_get("pk")?,
            sk: row.try_get("sk")?,
            entity,
            indexes,
            data: row.try_get::<Value, _>("data")?,
        })
    }

    fn push_index_values<'a>(
        builder: &mut QueryBuilder<'a, Postgres>,
        record: &'a StoredRecord,
    ) {
        for slot in 0..4 {
            let key = record.indexes[slot].as_ref();
            builder.push(", ");
            builder.push_bind(key.map(|k| k.pk.as_str()));
            builder.push(", ");
            builder.push_bind(key.map(|k| k.sk.as_str()));
        }
    }

    fn insert_statement<'a>(&self, record: &'a StoredRecord) -> QueryBuilder<'a, Postgres> {
        let mut builder = QueryBuilder::new(format!("INSERT INTO {} ({}) VALUES (", self.table, SELECT_COLUMNS));
        builder.push_bind(record.pk.as_str());
        builder.push(", ");
        builder.push_bind(record.sk.as_str());
        builder.push(", ");
        builder.push_bind(record.entity.as_str());
        Self::push_index_values(&mut builder, record);
        builder.push(", ");
        builder.push_bind(&record.data);
        builder.push(")");
        builder
    }

    fn upsert_statement<'a>(&self, record: &'a StoredRecord) -> QueryBuilder<'a, Postgres> {
        let mut builder = self.insert_statement(record);
        builder.push(
            " ON CONFLICT (pk, sk) DO UPDATE SET entity = EXCLUDED.entity, \
             gsi1_pk = EXCLUDED.gsi1_pk, gsi1_sk = EXCLUDED.gsi1_sk, \
             gsi2_pk = EXCLUDED.gsi2_pk, gsi2_sk = EXCLUDED.gsi2_sk, \
             gsi3_pk = EXCLUDED.gsi3_pk, gsi3_sk = EXCLUDED.gsi3_sk, \
             gsi4_pk = EXCLUDED.gsi4_pk, gsi4_sk = EXCLUDED.gsi4_sk, \
             data = EXCLUDED.data",
        );
        builder
    }

    fn write_statement<'a>(&self, item: &'a TransactItem) -> QueryBuilder<'a, Postgres> {
        match item {
            TransactItem::Put {
                record,
                condition: WriteCondition::None,
            } => self.upsert_statement(record),
            TransactItem::Put {
                record,
                condition: WriteCondition::MustNotExist,
            } => {
                let mut builder = self.insert_statement(record);
                builder.push(" ON CONFLICT (pk, sk) DO NOTHING");
                builder
            }
            TransactItem::Put {
                record,
                condition: WriteCondition::MustExist,
            } => {
                let mut builder = QueryBuilder::new(format!("UPDATE {} SET entity = ", self.table));
                builder.push_bind(record.entity.as_str());
                for index in PhysicalIndex::SECONDARY {
                    let (pk_col, sk_col) = key_columns(index);
                    let key = index.slot().and_then(|slot| record.indexes[slot].as_ref());
                    builder.push(format!(", {} = ", pk_col));
                    builder.push_bind(key.map(|k| k.pk.as_str()));
                    builder.push(format!(", {} = ", sk_col));
                    builder.push_bind(key.map(|k| k.sk.as_str()));
                }
                builder.push(", data = ");
                builder.push_bind(&record.data);
                builder.push(" WHERE pk = ");
                builder.push_bind(record.pk.as_str());
                builder.push(" AND sk = ");
                builder.push_bind(record.sk.as_str());
                builder
            }
            TransactItem::Patch { key, set } => {
                let mut builder =
                    QueryBuilder::new(format!("UPDATE {} SET data = data || ", self.table));
                builder.push_bind(Value::Object(set.clone()));
                builder.push(" WHERE pk = ");
                builder.push_bind(key.pk.as_str());
                builder.push(" AND sk = ");
                builder.push_bind(key.sk.as_str());
                builder
            }
            TransactItem::Delete { key, .. } => {
                let mut builder = QueryBuilder::new(format!("DELETE FROM {} WHERE pk = ", self.table));
                builder.push_bind(key.pk.as_str());
                builder.push(" AND sk = ");
                builder.push_bind(key.sk.as_str());
                builder
            }
        }
    }
}

impl PostgresStore {
    fn patch_statement<'a>(&self, patch: &'a ConditionalPatch) -> QueryBuilder<'a, Postgres> {
        let mut builder = QueryBuilder::new(format!("UPDATE {} SET data = data || ", self.table));
        builder.push_bind(Value::Object(patch.set.clone()));
        for (index, sort_key) in &patch.sort_keys {
            let (_, sk_col) = key_columns(*index);
            builder.push(format!(", {} = ", sk_col));
            builder.push_bind(sort_key.as_str());
        }
        builder.push(" WHERE pk = ");
        builder.push_bind(patch.key.pk.as_str());
        builder.push(" AND sk = ");
        builder.push_bind(patch.key.sk.as_str());
        builder.push(" AND NOT (data ? ");
        builder.push_bind(patch.unless_present.as_str());
        builder.push(")");
        builder
    }
}

/// Whether a write affecting `rows` rows satisfied its condition.
fn condition_held(item: &TransactItem, rows: u64) -> bool {
    match item {
        TransactItem::Put {
            condition: WriteCondition::None,
            ..
        }
        | TransactItem::Delete {
            condition: WriteCondition::None,
            ..
        } => true,
        TransactItem::Delete {
            condition: WriteCondition::MustNotExist,
            ..
        } => rows == 0,
        _ => rows == 1,
    }
}

#[async_trait]
impl KvStore for PostgresStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    fn max_transaction_items(&self) -> usize {
        self.max_transaction_items
    }

    #[tracing::instrument(skip(self), fields(db.table = %self.table, db.operation = "select"))]
    async fn get(&self, key: &PrimaryKey) -> StoreResult<Option<StoredRecord>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE pk = $1 AND sk = $2",
            SELECT_COLUMNS, self.table
        );
        let row = sqlx::query(&sql)
            .bind(&key.pk)
            .bind(&key.sk)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::decode_row).transpose()
    }

    #[tracing::instrument(skip(self, keys), fields(db.table = %self.table, db.operation = "select", keys = keys.len()))]
    async fn batch_get(&self, keys: &[PrimaryKey]) -> StoreResult<Vec<StoredRecord>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let pks: Vec<String> = keys.iter().map(|k| k.pk.clone()).collect();
        let sks: Vec<String> = keys.iter().map(|k| k.sk.clone()).collect();
        let sql = format!(
            "SELECT {} FROM {} WHERE (pk, sk) IN (SELECT * FROM UNNEST($1::text[], $2::text[]))",
            SELECT_COLUMNS, self.table
        );
        let rows = sqlx::query(&sql)
            .bind(pks)
            .bind(sks)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::decode_row).collect()
    }

    #[tracing::instrument(skip(self, query), fields(db.table = %self.table, db.operation = "select", db.index = query.index.as_str()))]
    async fn query(&self, query: &RangeQuery) -> StoreResult<RangePage> {
        let (pk_col, sk_col) = key_columns(query.index);
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM {} WHERE {} = ",
            SELECT_COLUMNS, self.table, pk_col
        ));
        builder.push_bind(query.partition.as_str());

        match &query.condition {
            Some(SortCondition::BeginsWith(prefix)) => {
                builder.push(format!(" AND starts_with({}, ", sk_col));
                builder.push_bind(prefix.as_str());
                builder.push(")");
            }
            Some(SortCondition::Between(low, high)) => {
                builder.push(format!(" AND {} BETWEEN ", sk_col));
                builder.push_bind(low.as_str());
                builder.push(" AND ");
                builder.push_bind(high.as_str());
            }
            Some(SortCondition::Gte(low)) => {
                builder.push(format!(" AND {} >= ", sk_col));
                builder.push_bind(low.as_str());
            }
            Some(SortCondition::Lte(high)) => {
                builder.push(format!(" AND {} <= ", sk_col));
                builder.push_bind(high.as_str());
            }
            None => {}
        }

        if let Some(start) = &query.start_after {
            let op = if query.ascending { ">" } else { "<" };
            builder.push(format!(" AND ({}, pk, sk) {} (", sk_col, op));
            builder.push_bind(start.index_sk.as_str());
            builder.push(", ");
            builder.push_bind(start.pk.as_str());
            builder.push(", ");
            builder.push_bind(start.sk.as_str());
            builder.push(")");
        }

        let direction = if query.ascending { "ASC" } else { "DESC" };
        builder.push(format!(
            " ORDER BY {sk} {d}, pk {d}, sk {d} LIMIT ",
            sk = sk_col,
            d = direction
        ));
        // One extra row tells whether the range continues.
        builder.push_bind((query.limit + 1) as i64);

        let rows = builder.build().fetch_all(&self.pool).await?;
        let mut records = rows
            .iter()
            .map(Self::decode_row)
            .collect::<StoreResult<Vec<_>>>()?;

        let has_more = records.len() > query.limit;
        records.truncate(query.limit);
        let last_evaluated = if has_more {
            records.last().and_then(|record| record.position(query.index))
        } else {
            None
        };

        Ok(RangePage {
            records,
            last_evaluated,
        })
    }

    #[tracing::instrument(skip(self, items), fields(db.table = %self.table, db.operation = "transaction", items = items.len()))]
    async fn transact_write(&self, items: Vec<TransactItem>) -> StoreResult<()> {
        check_transaction(&items, self.max_transaction_items)?;

        let mut tx = self.pool.begin().await?;
        for item in &items {
            let result = self.write_statement(item).build().execute(&mut *tx).await;
            let rows = match result {
                Ok(done) => done.rows_affected(),
                Err(e) => {
                    tx.rollback().await.ok();
                    return Err(e.into());
                }
            };
            if !condition_held(item, rows) {
                tx.rollback().await.ok();
                let key = item.key();
                return Err(StoreError::ConditionFailed {
                    pk: key.pk,
                    sk: key.sk,
                });
            }
        }
        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, records), fields(db.table = %self.table, db.operation = "upsert", items = records.len()))]
    async fn batch_put(&self, records: Vec<StoredRecord>) -> StoreResult<()> {
        for record in &records {
            self.upsert_statement(record).build().execute(&self.pool).await?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, patches), fields(db.table = %self.table, db.operation = "patch", items = patches.len()))]
    async fn patch_live(&self, patches: Vec<ConditionalPatch>) -> StoreResult<Vec<PrimaryKey>> {
        let mut applied = Vec::with_capacity(patches.len());
        for patch in &patches {
            let done = self.patch_statement(patch).build().execute(&self.pool).await?;
            if done.rows_affected() == 1 {
                applied.push(patch.key.clone());
            }
        }
        Ok(applied)
    }

    async fn close(&self) {
        tracing::info!("Closing PostgreSQL pool");
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_held() {
        let key = PrimaryKey::new("A", "B");
        let delete = TransactItem::Delete {
            key: key.clone(),
            condition: WriteCondition::MustExist,
        };
        assert!(condition_held(&delete, 1));
        assert!(!condition_held(&delete, 0));

        let patch = TransactItem::Patch {
            key,
            set: serde_json::Map::new(),
        };
        assert!(!condition_held(&patch, 0));
    }

    #[test]
    fn test_key_columns() {
        assert_eq!(key_columns(PhysicalIndex::Primary), ("pk", "sk"));
        assert_eq!(key_columns(PhysicalIndex::Gsi3), ("gsi3_pk", "gsi3_sk"));
    }
}

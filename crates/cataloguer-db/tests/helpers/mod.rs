#![allow(dead_code)]

pub mod fixtures;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cataloguer_core::models::{CreateOrganizationRequest, CreateUserRequest, Organization, User};
use cataloguer_core::{CallerIdentity, ManualClock, Role, TableLimits};
use cataloguer_db::store::{
    ConditionalPatch, KvStore, RangePage, RangeQuery, StoreResult, TransactItem,
};
use cataloguer_db::table::record::{PrimaryKey, StoredRecord};
use cataloguer_db::{Database, MemoryStore};
use chrono::{TimeZone, Utc};
use serde_json::{Map, Value};

/// Test application backed by an isolated in-memory store
pub struct TestApp {
    pub db: Database,
    pub store: Arc<MemoryStore>,
    pub clock: ManualClock,
}

impl TestApp {
    /// Number of rows currently held by the store.
    pub async fn row_count(&self) -> usize {
        self.store.len().await
    }
}

/// Setup a test application with default limits
pub fn setup_test_app() -> TestApp {
    setup_test_app_with_limits(TableLimits::default())
}

pub fn setup_test_app_with_limits(limits: TableLimits) -> TestApp {
    let store = Arc::new(MemoryStore::new(limits.max_transaction_items));
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
    let db = Database::with_store(store.clone(), limits, Arc::new(clock.clone()));
    TestApp { db, store, clock }
}

/// Memory store that lets another writer slip in right after a read.
///
/// The queued change is merged into the matching item by a separate
/// transaction as soon as the next `batch_get` has returned its rows.
pub struct InterleavedStore {
    inner: Arc<MemoryStore>,
    pending: Mutex<Option<(String, Map<String, Value>)>>,
}

impl InterleavedStore {
    /// Queue `set` for the item `item_id`; it lands after the next batch read.
    pub fn after_next_read(&self, item_id: &str, set: Value) {
        let set = match set {
            Value::Object(map) => map,
            other => panic!("expected an attribute map, got {}", other),
        };
        *self.pending.lock().unwrap() = Some((item_id.to_string(), set));
    }
}

#[async_trait]
impl KvStore for InterleavedStore {
    fn backend(&self) -> &'static str {
        "interleaved"
    }

    fn max_transaction_items(&self) -> usize {
        self.inner.max_transaction_items()
    }

    async fn get(&self, key: &PrimaryKey) -> StoreResult<Option<StoredRecord>> {
        self.inner.get(key).await
    }

    async fn batch_get(&self, keys: &[PrimaryKey]) -> StoreResult<Vec<StoredRecord>> {
        let records = self.inner.batch_get(keys).await?;
        let pending = self.pending.lock().unwrap().take();
        if let Some((item_id, set)) = pending {
            let target = records
                .iter()
                .find(|record| record.data["itemId"] == Value::from(item_id.as_str()));
            if let Some(record) = target {
                let key = record.primary_key();
                self.inner
                    .transact_write(vec![TransactItem::Patch { key, set }])
                    .await?;
            }
        }
        Ok(records)
    }

    async fn query(&self, query: &RangeQuery) -> StoreResult<RangePage> {
        self.inner.query(query).await
    }

    async fn transact_write(&self, items: Vec<TransactItem>) -> StoreResult<()> {
        self.inner.transact_write(items).await
    }

    async fn batch_put(&self, records: Vec<StoredRecord>) -> StoreResult<()> {
        self.inner.batch_put(records).await
    }

    async fn patch_live(&self, patches: Vec<ConditionalPatch>) -> StoreResult<Vec<PrimaryKey>> {
        self.inner.patch_live(patches).await
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}

/// Test application whose store can interleave a concurrent write.
pub fn setup_interleaved_app() -> (TestApp, Arc<InterleavedStore>) {
    let limits = TableLimits::default();
    let store = Arc::new(MemoryStore::new(limits.max_transaction_items));
    let interleaved = Arc::new(InterleavedStore {
        inner: store.clone(),
        pending: Mutex::new(None),
    });
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
    let db = Database::with_store(interleaved.clone(), limits, Arc::new(clock.clone()));
    (TestApp { db, store, clock }, interleaved)
}

/// A signed-in user with their own organisation, acting as its admin
pub struct TestTenant {
    pub user: User,
    pub organization: Organization,
    pub admin: CallerIdentity,
}

impl TestTenant {
    /// The same user acting with a different role.
    pub fn as_role(&self, role: Role) -> CallerIdentity {
        CallerIdentity::member(
            self.user.user_id.clone(),
            self.organization.org_id.clone(),
            role,
        )
    }
}

/// Register a user and an organisation they administer.
pub async fn register_test_tenant(app: &TestApp, email: &str) -> TestTenant {
    let user = app
        .db
        .users()
        .get_or_create_by_email(CreateUserRequest {
            email: email.to_string(),
            name: email.split('@').next().unwrap_or("user").to_string(),
        })
        .await
        .expect("Failed to create user");

    let (organization, membership) = app
        .db
        .organizations()
        .create_organization(
            &CallerIdentity::user(user.user_id.clone()),
            CreateOrganizationRequest {
                name: format!("Org of {}", email),
                description: None,
            },
        )
        .await
        .expect("Failed to create organisation");
    assert_eq!(membership.role, Role::Admin);

    let admin = CallerIdentity::member(
        user.user_id.clone(),
        organization.org_id.clone(),
        Role::Admin,
    );
    TestTenant {
        user,
        organization,
        admin,
    }
}

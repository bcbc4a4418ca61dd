//! Single-table data access
//!
//! Organised bottom-up: `store` holds raw keyed rows, `table` maps entities
//! onto the key layout, `query` and `transaction` read and write through it,
//! and the repositories under control/ (users, organisations, invitations)
//! and catalogue/ (catalogues, items, bulk mutations) implement the use cases.
//
// Stores and the table layout
pub mod store;
pub mod table;
//
// Query engine and write coordinator
pub mod query;
pub mod transaction;
//
// Repositories
pub mod catalogue;
pub mod control;
//
// Startup wiring
pub mod database;

pub use catalogue::{
    BulkRepository, CatalogueItemRepository, CatalogueRepository, CloneOutcome, ItemListQuery,
    PriceRange, TransferOutcome,
};
pub use control::{InvitationRepository, OrganizationRepository, UserRepository};
pub use database::Database;
pub use query::{Filter, Page, QueryMode, QueryRequest, SearchMode, SortOrder, SortRange};
pub use store::{KvStore, MemoryStore, PostgresStore, StoreError};
pub use table::Table;
pub use transaction::WriteBatch;

//! Cataloguer Storage Library
//!
//! Object-storage collaborator used when catalogue item images are uploaded.
//! Backends return a durable URL (and optionally a placeholder hash) which the
//! catalogue layer stores without interpreting.
//!
//! # Storage key format
//!
//! Keys are organisation-scoped: `catalogue/{org_id}/{object_id}.{extension}`.
//! Keys must not contain `..` or a leading `/`.

pub mod local;
pub mod traits;

pub use local::LocalStorage;
pub use traits::{ImageUpload, ObjectStorage, StorageError, StorageResult, StoredObject};

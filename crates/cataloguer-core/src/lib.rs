//! Cataloguer Core Library
//!
//! Domain models, derivation rules, error types, configuration and caller
//! identity shared by the catalogue data-access layer and its hosts.

pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod ids;
pub mod models;
pub mod pricing;
pub mod telemetry;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CataloguerConfig, StoreBackend, StoreConfig, TableLimits};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use identity::{CallerIdentity, Permission, Role};
pub use pricing::{AdjustmentDirection, AdjustmentMode, PriceAdjustment};

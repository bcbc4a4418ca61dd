//! Configuration module
//!
//! Process configuration is read once at startup from the environment (with
//! `.env` support) and handed to the store and repositories explicitly.

use std::env;
use std::fmt;
use std::str::FromStr;

use crate::models::INVITATION_TTL_DAYS;

// Common constants
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const TABLE_NAME: &str = "app_data";
/// Atomic write bound of the underlying store.
const MAX_TRANSACTION_ITEMS: usize = 100;
const BATCH_WRITE_SIZE: usize = 25;
const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

/// Which `KvStore` backs the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            other => Err(anyhow::anyhow!(
                "Unsupported STORE_BACKEND '{}'. Use 'memory' or 'postgres'.",
                other
            )),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Memory => write!(f, "memory"),
            StoreBackend::Postgres => write!(f, "postgres"),
        }
    }
}

/// Limits applied by the table layer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableLimits {
    pub max_transaction_items: usize,
    pub batch_write_size: usize,
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for TableLimits {
    fn default() -> Self {
        Self {
            max_transaction_items: MAX_TRANSACTION_ITEMS,
            batch_write_size: BATCH_WRITE_SIZE,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

/// Store connection settings
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub table_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            database_url: None,
            db_max_connections: MAX_CONNECTIONS,
            db_timeout_seconds: CONNECTION_TIMEOUT_SECS,
            table_name: TABLE_NAME.to_string(),
        }
    }
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct CataloguerConfig {
    pub environment: String,
    pub store: StoreConfig,
    pub limits: TableLimits,
    pub invitation_ttl_days: i64,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
}

impl Default for CataloguerConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            store: StoreConfig::default(),
            limits: TableLimits::default(),
            invitation_ttl_days: INVITATION_TTL_DAYS,
            local_storage_path: None,
            local_storage_base_url: None,
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

impl CataloguerConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let backend = env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .parse::<StoreBackend>()?;

        let store = StoreConfig {
            backend,
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            db_timeout_seconds: env_parse("DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
            table_name: env::var("TABLE_NAME").unwrap_or_else(|_| TABLE_NAME.to_string()),
        };

        let limits = TableLimits {
            max_transaction_items: env_parse("MAX_TRANSACTION_ITEMS", MAX_TRANSACTION_ITEMS),
            batch_write_size: env_parse("BATCH_WRITE_SIZE", BATCH_WRITE_SIZE),
            default_page_size: env_parse("DEFAULT_PAGE_SIZE", DEFAULT_PAGE_SIZE),
            max_page_size: env_parse("MAX_PAGE_SIZE", MAX_PAGE_SIZE),
        };

        let config = Self {
            environment,
            store,
            limits,
            invitation_ttl_days: env_parse("INVITATION_TTL_DAYS", INVITATION_TTL_DAYS),
            local_storage_path: env::var("LOCAL_STORAGE_PATH").ok(),
            local_storage_base_url: env::var("LOCAL_STORAGE_BASE_URL").ok(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.store.backend == StoreBackend::Postgres && self.store.database_url.is_none() {
            return Err(anyhow::anyhow!(
                "DATABASE_URL is required when STORE_BACKEND=postgres"
            ));
        }
        if self.is_production() && self.store.backend == StoreBackend::Memory {
            return Err(anyhow::anyhow!(
                "STORE_BACKEND=memory is not allowed in production"
            ));
        }
        if !is_valid_table_name(&self.store.table_name) {
            return Err(anyhow::anyhow!(
                "TABLE_NAME '{}' must start with a letter and contain only letters, digits and underscores",
                self.store.table_name
            ));
        }
        if self.limits.max_transaction_items == 0 || self.limits.batch_write_size == 0 {
            return Err(anyhow::anyhow!(
                "MAX_TRANSACTION_ITEMS and BATCH_WRITE_SIZE must be positive"
            ));
        }
        if self.limits.default_page_size == 0
            || self.limits.default_page_size > self.limits.max_page_size
        {
            return Err(anyhow::anyhow!(
                "DEFAULT_PAGE_SIZE must be between 1 and MAX_PAGE_SIZE ({})",
                self.limits.max_page_size
            ));
        }
        if self.invitation_ttl_days <= 0 {
            return Err(anyhow::anyhow!("INVITATION_TTL_DAYS must be positive"));
        }
        Ok(())
    }

    pub fn invitation_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.invitation_ttl_days)
    }
}

/// Table names are interpolated into SQL, so only plain identifiers are accepted.
pub fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.len() <= 63
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CataloguerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.limits.max_transaction_items, 100);
        assert_eq!(config.invitation_ttl(), chrono::Duration::days(7));
    }

    #[test]
    fn test_postgres_requires_database_url() {
        let mut config = CataloguerConfig::default();
        config.store.backend = StoreBackend::Postgres;
        assert!(config.validate().is_err());
        config.store.database_url = Some("postgres://localhost/catalogue".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_memory_store_rejected_in_production() {
        let config = CataloguerConfig {
            environment: "Production".to_string(),
            ..Default::default()
        };
        assert!(config.is_production());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_table_name_validation() {
        assert!(is_valid_table_name("app_data"));
        assert!(!is_valid_table_name("1data"));
        assert!(!is_valid_table_name("app-data; drop"));
        assert!(!is_valid_table_name(""));
    }

    #[test]
    fn test_page_size_bounds() {
        let mut config = CataloguerConfig::default();
        config.limits.default_page_size = 500;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_store_backend_parse() {
        assert_eq!(
            "PostgreSQL".parse::<StoreBackend>().unwrap(),
            StoreBackend::Postgres
        );
        assert!("dynamo".parse::<StoreBackend>().is_err());
    }
}

//! Storage abstraction trait

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use uuid::Uuid;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Raw image bytes handed over by the routing layer
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

/// A stored object as reported back by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
    /// Low-resolution preview string, when the backend generates one.
    pub placeholder_hash: Option<String>,
}

/// Storage abstraction trait
///
/// Implemented by every object-storage backend. The catalogue layer never
/// retries a failed upload; it surfaces the failure to its caller.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload image bytes for an organisation and return where they live
    async fn upload(&self, org_id: &str, upload: &ImageUpload) -> StorageResult<StoredObject>;

    /// Delete an object by its storage key
    async fn delete(&self, storage_key: &str) -> StorageResult<()>;

    /// Check if an object exists
    async fn exists(&self, storage_key: &str) -> StorageResult<bool>;
}

/// File extension for an image content type, e.g. `image/png` -> `png`.
pub fn extension_for(content_type: &str) -> StorageResult<&str> {
    let (kind, subtype) = content_type
        .split_once('/')
        .ok_or_else(|| StorageError::UnsupportedContentType(content_type.to_string()))?;
    let subtype = subtype.split(';').next().unwrap_or_default().trim();
    if kind != "image" || subtype.is_empty() || !subtype.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-') {
        return Err(StorageError::UnsupportedContentType(content_type.to_string()));
    }
    Ok(subtype)
}

/// Build an organisation-scoped key for a new object.
pub fn generate_key(org_id: &str, content_type: &str) -> StorageResult<String> {
    if org_id.is_empty() || org_id.contains('/') || org_id.contains("..") {
        return Err(StorageError::InvalidKey(format!(
            "Organisation id '{}' cannot be used in a storage key",
            org_id
        )));
    }
    let extension = extension_for(content_type)?;
    Ok(format!(
        "catalogue/{}/{}.{}",
        org_id,
        Uuid::new_v4().simple(),
        extension
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_for_image_types() {
        assert_eq!(extension_for("image/png").unwrap(), "png");
        assert_eq!(extension_for("image/svg+xml").unwrap(), "svg+xml");
        assert_eq!(extension_for("image/jpeg; charset=binary").unwrap(), "jpeg");
        assert!(extension_for("application/pdf").is_err());
        assert!(extension_for("png").is_err());
    }

    #[test]
    fn test_generate_key_is_org_scoped() {
        let key = generate_key("org1", "image/webp").unwrap();
        assert!(key.starts_with("catalogue/org1/"));
        assert!(key.ends_with(".webp"));
        assert!(generate_key("../etc", "image/png").is_err());
    }
}

use std::path::{Component, Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::traits::{generate_key, ImageUpload, ObjectStorage, StorageError, StorageResult, StoredObject};

/// Image storage on the local filesystem.
///
/// Serves development hosts and tests. Objects are written below `root`
/// and addressed publicly as `{public_url}/{key}`.
#[derive(Clone)]
pub struct LocalStorage {
    root: PathBuf,
    public_url: String,
}

impl LocalStorage {
    /// Open (creating if needed) the directory objects are kept in.
    ///
    /// `public_url` is the prefix the host serves that directory under, for
    /// example `http://localhost:3000/images`.
    pub async fn new(root: impl Into<PathBuf>, public_url: String) -> StorageResult<Self> {
        let root = root.into();
        if let Err(e) = fs::create_dir_all(&root).await {
            return Err(StorageError::ConfigError(format!(
                "cannot prepare image directory {}: {}",
                root.display(),
                e
            )));
        }
        let public_url = public_url.trim_end_matches('/').to_string();
        Ok(Self { root, public_url })
    }

    /// Map a key to a file below `root`. Keys are relative and made of
    /// plain path segments only.
    fn resolve(&self, key: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(key);
        let plain = !key.is_empty()
            && relative
                .components()
                .all(|part| matches!(part, Component::Normal(_)));
        if !plain {
            return Err(StorageError::InvalidKey(format!(
                "'{}' is not a relative object key",
                key
            )));
        }
        Ok(self.root.join(relative))
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_url, key)
    }

    async fn write_object(path: &Path, data: &[u8]) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let mut file = fs::File::create(path).await?;
        file.write_all(data).await?;
        file.sync_all().await
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn upload(&self, org_id: &str, upload: &ImageUpload) -> StorageResult<StoredObject> {
        if upload.data.is_empty() {
            return Err(StorageError::UploadFailed(format!(
                "Image '{}' is empty",
                upload.filename
            )));
        }

        let key = generate_key(org_id, &upload.content_type)?;
        let path = self.resolve(&key)?;
        let started = Instant::now();

        if let Err(e) = Self::write_object(&path, &upload.data).await {
            // A partially written file must not outlive the failed upload.
            let _ = fs::remove_file(&path).await;
            return Err(StorageError::UploadFailed(format!(
                "writing {} failed: {}",
                path.display(),
                e
            )));
        }

        tracing::info!(
            org_id = %org_id,
            key = %key,
            filename = %upload.filename,
            size_bytes = upload.data.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Stored image on local disk"
        );

        Ok(StoredObject {
            url: self.url_for(&key),
            key,
            placeholder_hash: None,
        })
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(key = %key, "Removed image from local disk");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "removing {} failed: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.resolve(key)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }
}

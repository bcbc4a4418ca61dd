use chrono::serde::{ts_milliseconds, ts_milliseconds_option};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CatalogueItem;
use crate::error::AppError;
use crate::ids::new_id;

/// An image belonging to a catalogue item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogueItemImage {
    pub image_id: String,
    pub item_id: String,
    pub catalogue_id: String,
    pub org_id: String,
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder_hash: Option<String>,
    #[serde(with = "ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "ts_milliseconds_option"
    )]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Result of handing image bytes to object storage.
///
/// The URL and placeholder hash are stored as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedImage {
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder_hash: Option<String>,
}

impl CatalogueItemImage {
    pub fn create(
        item: &CatalogueItem,
        upload: &UploadedImage,
        now: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        if upload.image_url.trim().is_empty() {
            return Err(AppError::Validation("imageUrl is required".to_string()));
        }
        Ok(Self {
            image_id: new_id(),
            item_id: item.item_id.clone(),
            catalogue_id: item.catalogue_id.clone(),
            org_id: item.org_id.clone(),
            image_url: upload.image_url.clone(),
            placeholder_hash: upload.placeholder_hash.clone(),
            created_at: now,
            deleted_at: None,
        })
    }

    /// Copy this image onto a cloned item under a fresh id.
    pub fn clone_for(&self, item: &CatalogueItem, now: DateTime<Utc>) -> Self {
        Self {
            image_id: new_id(),
            item_id: item.item_id.clone(),
            catalogue_id: item.catalogue_id.clone(),
            org_id: item.org_id.clone(),
            image_url: self.image_url.clone(),
            placeholder_hash: self.placeholder_hash.clone(),
            created_at: now,
            deleted_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

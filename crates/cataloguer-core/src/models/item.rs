use chrono::serde::{ts_milliseconds, ts_milliseconds_option};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use validator::Validate;

use super::{optional_text, required_text, Catalogue, UploadedImage};
use crate::error::AppError;
use crate::ids::new_id;
use crate::pricing::{price_sort_key, round_to_cents, serde_price, PriceAdjustment};

/// Point-in-time copy of an item's first image, taken when the item is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemImageSnapshot {
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder_hash: Option<String>,
    #[serde(with = "ts_milliseconds")]
    pub uploaded_at: DateTime<Utc>,
}

/// A priced item inside a catalogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogueItem {
    pub item_id: String,
    pub catalogue_id: String,
    pub org_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(with = "serde_price")]
    pub price: Decimal,
    /// Derived from `price`; never set directly.
    pub price_sort_key: String,
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub metadata: JsonValue,
    pub image: ItemImageSnapshot,
    #[serde(with = "ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "ts_milliseconds_option"
    )]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Request DTO for creating an item
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateItemRequest {
    #[validate(length(
        min = 1,
        max = 255,
        message = "Item name must be between 1 and 255 characters"
    ))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub metadata: Option<JsonValue>,
}

/// Request DTO for updating an item
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateItemRequest {
    #[serde(default)]
    #[validate(length(
        min = 1,
        max = 255,
        message = "Item name must be between 1 and 255 characters"
    ))]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub metadata: Option<JsonValue>,
}

impl CatalogueItem {
    /// Build a new item under `catalogue`, snapshotting `first_image`.
    pub fn create(
        request: &CreateItemRequest,
        catalogue: &Catalogue,
        first_image: &UploadedImage,
        now: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        request.validate()?;
        if first_image.image_url.trim().is_empty() {
            return Err(AppError::Validation("imageUrl is required".to_string()));
        }
        let mut item = Self {
            item_id: new_id(),
            catalogue_id: catalogue.catalogue_id.clone(),
            org_id: catalogue.org_id.clone(),
            name: required_text("name", &request.name)?,
            description: optional_text("description", request.description.as_deref())?,
            price: request.price,
            price_sort_key: String::new(),
            metadata: request.metadata.clone().unwrap_or(JsonValue::Null),
            image: ItemImageSnapshot {
                image_url: first_image.image_url.clone(),
                placeholder_hash: first_image.placeholder_hash.clone(),
                uploaded_at: now,
            },
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        item.derive_price_fields()?;
        Ok(item)
    }

    /// Recompute the fields derived from `price`.
    pub fn derive_price_fields(&mut self) -> Result<(), AppError> {
        self.price_sort_key = price_sort_key(self.price)?;
        self.price = round_to_cents(self.price);
        Ok(())
    }

    /// Apply a patch, re-deriving the sort key when the price changes.
    pub fn apply_patch(
        &mut self,
        patch: &UpdateItemRequest,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        patch.validate()?;
        if let Some(name) = &patch.name {
            self.name = required_text("name", name)?;
        }
        if let Some(description) = &patch.description {
            self.description = optional_text("description", Some(description))?;
        }
        if let Some(metadata) = &patch.metadata {
            self.metadata = metadata.clone();
        }
        if let Some(price) = patch.price {
            self.price = price;
            self.derive_price_fields()?;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Return a copy of this item with its price adjusted in place.
    pub fn with_adjusted_price(
        &self,
        adjustment: &PriceAdjustment,
        now: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        let mut adjusted = self.clone();
        adjusted.price = adjustment.apply(self.price)?;
        adjusted.derive_price_fields()?;
        adjusted.updated_at = now;
        Ok(adjusted)
    }

    /// Copy this item into `catalogue_id` under a fresh id.
    ///
    /// The image snapshot is carried over unchanged; `price` replaces the
    /// source price and its sort key is re-derived.
    pub fn clone_to(
        &self,
        catalogue_id: &str,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        let mut clone = Self {
            item_id: new_id(),
            catalogue_id: catalogue_id.to_string(),
            org_id: self.org_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            price,
            price_sort_key: String::new(),
            metadata: self.metadata.clone(),
            image: self.image.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        clone.derive_price_fields()?;
        Ok(clone)
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

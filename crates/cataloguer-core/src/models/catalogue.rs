use chrono::serde::{ts_milliseconds, ts_milliseconds_option};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{optional_text, required_text, CatalogueItemImage};
use crate::error::AppError;
use crate::ids::new_id;

/// Catalogue: a soft-deletable collection of priced items owned by an organisation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalogue {
    pub catalogue_id: String,
    pub org_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_by: String,
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

/// Request DTO for creating a catalogue
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCatalogueRequest {
    #[validate(length(
        min = 1,
        max = 255,
        message = "Catalogue name must be between 1 and 255 characters"
    ))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Request DTO for updating a catalogue
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateCatalogueRequest {
    #[serde(default)]
    #[validate(length(
        min = 1,
        max = 255,
        message = "Catalogue name must be between 1 and 255 characters"
    ))]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Catalogue with its most recent active images, for overview listings
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogueWithPreview {
    #[serde(flatten)]
    pub catalogue: Catalogue,
    pub images: Vec<CatalogueItemImage>,
}

impl Catalogue {
    pub fn create(
        request: &CreateCatalogueRequest,
        org_id: &str,
        created_by: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        request.validate()?;
        Ok(Self {
            catalogue_id: new_id(),
            org_id: required_text("orgId", org_id)?,
            name: required_text("name", &request.name)?,
            description: optional_text("description", request.description.as_deref())?,
            created_by: required_text("createdBy", created_by)?,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Apply a patch; an empty description clears it.
    pub fn apply_patch(
        &mut self,
        patch: &UpdateCatalogueRequest,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        patch.validate()?;
        if let Some(name) = &patch.name {
            self.name = required_text("name", name)?;
        }
        if let Some(description) = &patch.description {
            self.description = optional_text("description", Some(description))?;
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

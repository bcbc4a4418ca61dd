use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{optional_text, required_text};
use crate::error::AppError;
use crate::ids::new_id;

/// Organisation: the root tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub org_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_by: String,
    #[serde(with = "ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

/// Request DTO for creating an organisation
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOrganizationRequest {
    #[validate(length(
        min = 1,
        max = 255,
        message = "Organisation name must be between 1 and 255 characters"
    ))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Organization {
    pub fn create(
        request: &CreateOrganizationRequest,
        created_by: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        request.validate()?;
        Ok(Self {
            org_id: new_id(),
            name: required_text("name", &request.name)?,
            description: optional_text("description", request.description.as_deref())?,
            created_by: required_text("createdBy", created_by)?,
            created_at: now,
            updated_at: now,
        })
    }
}

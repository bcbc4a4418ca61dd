use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{required_text, Organization, User};
use crate::error::AppError;
use crate::identity::Role;

/// Many-to-many link between users and organisations.
///
/// The organisation name and description are copied at join time so a user's
/// organisation list can be served from the membership index alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub org_id: String,
    pub user_id: String,
    pub role: Role,
    #[serde(with = "ts_milliseconds")]
    pub joined_at: DateTime<Utc>,
    pub org_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_description: Option<String>,
}

impl Membership {
    pub fn create(
        organization: &Organization,
        user_id: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        Ok(Self {
            org_id: organization.org_id.clone(),
            user_id: required_text("userId", user_id)?,
            role,
            joined_at: now,
            org_name: organization.name.clone(),
            org_description: organization.description.clone(),
        })
    }
}

/// A membership joined with the member's user profile
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationMember {
    #[serde(flatten)]
    pub membership: Membership,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl OrganizationMember {
    /// `user` is absent when the profile record could not be found.
    pub fn new(membership: Membership, user: Option<&User>) -> Self {
        Self {
            membership,
            email: user.map(|u| u.email.clone()),
            name: user.map(|u| u.name.clone()),
        }
    }
}

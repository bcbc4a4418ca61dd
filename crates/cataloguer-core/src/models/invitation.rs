use chrono::serde::{ts_milliseconds, ts_milliseconds_option};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::required_text;
use crate::error::AppError;
use crate::identity::Role;
use crate::ids::new_id;

/// Default lifetime of an invitation code.
pub const INVITATION_TTL_DAYS: i64 = 7;

/// A redeemable code granting membership of an organisation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    pub invitation_id: String,
    pub org_id: String,
    pub code: String,
    pub created_by: String,
    pub role: Role,
    #[serde(with = "ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_by: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "ts_milliseconds_option"
    )]
    pub used_at: Option<DateTime<Utc>>,
    #[serde(with = "ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Invitation {
    pub fn create(
        org_id: &str,
        created_by: &str,
        role: Role,
        code: String,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        if ttl <= Duration::zero() {
            return Err(AppError::Validation(
                "Invitation lifetime must be positive".to_string(),
            ));
        }
        Ok(Self {
            invitation_id: new_id(),
            org_id: required_text("orgId", org_id)?,
            code: required_text("code", &code)?,
            created_by: required_text("createdBy", created_by)?,
            role,
            expires_at: now + ttl,
            used_by: None,
            used_at: None,
            created_at: now,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn mark_used(&mut self, user_id: &str, now: DateTime<Utc>) {
        self.used_by = Some(user_id.to_string());
        self.used_at = Some(now);
    }
}

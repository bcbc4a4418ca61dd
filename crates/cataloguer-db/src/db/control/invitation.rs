use cataloguer_core::identity::{CallerIdentity, Permission, Role};
use cataloguer_core::ids::new_invitation_code;
use cataloguer_core::models::{Invitation, Membership, Organization, INVITATION_TTL_DAYS};
use cataloguer_core::AppError;
use chrono::Duration;

use super::organization::{membership_key, organization_key};
use crate::db::query::{Page, QueryMode, QueryRequest, SortOrder};
use crate::db::table::Table;
use crate::db::transaction::WriteBatch;

/// Attempts at drawing an unused invitation code.
const MAX_CODE_ATTEMPTS: usize = 5;

/// Repository for invitation issuance and redemption
#[derive(Clone)]
pub struct InvitationRepository {
    table: Table,
    ttl: Duration,
}

impl InvitationRepository {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            ttl: Duration::days(INVITATION_TTL_DAYS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Look up an invitation by its code.
    #[tracing::instrument(skip(self, code), fields(db.table = "invitation", db.operation = "select"))]
    pub async fn find_by_code(&self, code: &str) -> Result<Option<Invitation>, AppError> {
        let code = code.trim();
        if code.is_empty() {
            return Ok(None);
        }
        let page = self
            .table
            .query::<Invitation>(
                QueryRequest::new("byCode")
                    .partition("code", code)
                    .limit(Some(1))
                    .mode(QueryMode::SinglePage),
            )
            .await?;
        Ok(page.items.into_iter().next())
    }

    async fn unused_code(&self) -> Result<String, AppError> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = new_invitation_code();
            if self.find_by_code(&code).await?.is_none() {
                return Ok(code);
            }
            tracing::debug!("Invitation code collision, drawing again");
        }
        Err(AppError::Internal(
            "Could not draw an unused invitation code".to_string(),
        ))
    }

    /// Issue an invitation into the caller's organisation.
    #[tracing::instrument(skip(self, caller), fields(db.table = "invitation", db.operation = "insert"))]
    pub async fn create_invitation(
        &self,
        caller: &CallerIdentity,
        role: Role,
    ) -> Result<Invitation, AppError> {
        let org_id = caller.require(Permission::InviteUser)?;
        if self
            .table
            .get::<Organization>(&organization_key(org_id)?)
            .await?
            .is_none()
        {
            return Err(AppError::NotFound(format!("Organisation {}", org_id)));
        }

        let code = self.unused_code().await?;
        let invitation = Invitation::create(
            org_id,
            &caller.user_id,
            role,
            code,
            self.ttl,
            self.table.now(),
        )?;

        let mut batch = WriteBatch::new();
        batch.create(&invitation)?;
        self.table.commit(batch).await?;

        tracing::info!(
            org_id = %org_id,
            invitation_id = %invitation.invitation_id,
            role = %role,
            "Invitation created"
        );
        Ok(invitation)
    }

    /// Invitations of the caller's organisation, newest first.
    #[tracing::instrument(skip(self, caller, cursor), fields(db.table = "invitation", db.operation = "select"))]
    pub async fn list_invitations(
        &self,
        caller: &CallerIdentity,
        limit: Option<usize>,
        cursor: Option<String>,
    ) -> Result<Page<Invitation>, AppError> {
        let org_id = caller.require(Permission::InviteUser)?;
        self.table
            .query(
                QueryRequest::new("primary")
                    .partition("orgId", org_id)
                    .order(SortOrder::Desc)
                    .limit(limit)
                    .cursor(cursor),
            )
            .await
    }

    /// Redeem `code` for `user_id`.
    ///
    /// Marks the invitation used and creates the membership in one commit.
    /// The code stays valid for other users until it expires.
    #[tracing::instrument(skip(self, code), fields(db.table = "invitation", db.operation = "update"))]
    pub async fn accept_invitation(
        &self,
        code: &str,
        user_id: &str,
    ) -> Result<Membership, AppError> {
        let mut invitation = self
            .find_by_code(code)
            .await?
            .ok_or_else(|| AppError::NotFound("Invitation not found".to_string()))?;

        let now = self.table.now();
        if invitation.is_expired(now) {
            return Err(AppError::InvitationExpired(format!(
                "Invitation expired at {}",
                invitation.expires_at.to_rfc3339()
            )));
        }

        let organization: Organization = self
            .table
            .get(&organization_key(&invitation.org_id)?)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Organisation {}", invitation.org_id))
            })?;

        if self
            .table
            .get::<Membership>(&membership_key(&organization.org_id, user_id)?)
            .await?
            .is_some()
        {
            return Err(AppError::AlreadyMember {
                org_id: organization.org_id,
            });
        }

        invitation.mark_used(user_id, now);
        let membership = Membership::create(&organization, user_id, invitation.role, now)?;

        let mut batch = WriteBatch::new();
        batch.update(&invitation)?;
        batch.create(&membership)?;
        self.table.commit(batch).await?;

        tracing::info!(
            org_id = %membership.org_id,
            user_id = %user_id,
            role = %membership.role,
            "Invitation accepted"
        );
        Ok(membership)
    }
}

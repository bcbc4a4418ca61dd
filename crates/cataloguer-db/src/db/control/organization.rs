use cataloguer_core::identity::{CallerIdentity, Permission, Role};
use cataloguer_core::models::{
    CreateOrganizationRequest, Membership, Organization, OrganizationMember, User,
};
use cataloguer_core::AppError;

use crate::db::query::{Page, QueryRequest, SortOrder};
use crate::db::table::record::PrimaryKey;
use crate::db::table::{EntityKind, Table};
use crate::db::transaction::WriteBatch;

/// Repository for organisations and their memberships
#[derive(Clone)]
pub struct OrganizationRepository {
    table: Table,
}

pub(crate) fn membership_key(org_id: &str, user_id: &str) -> Result<PrimaryKey, AppError> {
    PrimaryKey::of(
        EntityKind::Membership,
        &[("orgId", org_id), ("userId", user_id)],
    )
}

pub(crate) fn organization_key(org_id: &str) -> Result<PrimaryKey, AppError> {
    PrimaryKey::of(EntityKind::Organization, &[("orgId", org_id)])
}

impl OrganizationRepository {
    pub fn new(table: Table) -> Self {
        Self { table }
    }

    /// Create an organisation with the creator as its admin, in one commit.
    #[tracing::instrument(skip(self, request), fields(db.table = "organization", db.operation = "insert"))]
    pub async fn create_organization(
        &self,
        caller: &CallerIdentity,
        request: CreateOrganizationRequest,
    ) -> Result<(Organization, Membership), AppError> {
        let now = self.table.now();
        let organization = Organization::create(&request, &caller.user_id, now)?;
        let membership = Membership::create(&organization, &caller.user_id, Role::Admin, now)?;

        let mut batch = WriteBatch::new();
        batch.create(&organization)?;
        batch.create(&membership)?;
        self.table.commit(batch).await?;

        tracing::info!(org_id = %organization.org_id, "Organisation created");
        Ok((organization, membership))
    }

    #[tracing::instrument(skip(self), fields(db.table = "organization", db.operation = "select", db.record_id = %org_id))]
    pub async fn get_organization(&self, org_id: &str) -> Result<Option<Organization>, AppError> {
        self.table.get(&organization_key(org_id)?).await
    }

    #[tracing::instrument(skip(self), fields(db.table = "membership", db.operation = "select"))]
    pub async fn get_membership(
        &self,
        org_id: &str,
        user_id: &str,
    ) -> Result<Option<Membership>, AppError> {
        self.table.get(&membership_key(org_id, user_id)?).await
    }

    /// Organisations the user belongs to, read from the membership index.
    #[tracing::instrument(skip(self, cursor), fields(db.table = "membership", db.operation = "select"))]
    pub async fn list_for_user(
        &self,
        user_id: &str,
        limit: Option<usize>,
        cursor: Option<String>,
    ) -> Result<Page<Membership>, AppError> {
        self.table
            .query(
                QueryRequest::new("byUser")
                    .partition("userId", user_id)
                    .limit(limit)
                    .cursor(cursor),
            )
            .await
    }

    /// Members of the caller's organisation with their profiles.
    #[tracing::instrument(skip(self, caller, cursor), fields(db.table = "membership", db.operation = "select"))]
    pub async fn list_members(
        &self,
        caller: &CallerIdentity,
        limit: Option<usize>,
        cursor: Option<String>,
    ) -> Result<Page<OrganizationMember>, AppError> {
        let org_id = caller.require(Permission::RemoveUser)?;
        let memberships: Page<Membership> = self
            .table
            .query(
                QueryRequest::new("primary")
                    .partition("orgId", org_id)
                    .order(SortOrder::Asc)
                    .limit(limit)
                    .cursor(cursor),
            )
            .await?;

        let keys = memberships
            .items
            .iter()
            .map(|m| PrimaryKey::of(EntityKind::User, &[("userId", m.user_id.as_str())]))
            .collect::<Result<Vec<_>, _>>()?;
        let users: Vec<User> = self.table.get_many(&keys).await?;

        Ok(memberships.map(|membership| {
            let user = users.iter().find(|u| u.user_id == membership.user_id);
            OrganizationMember::new(membership, user)
        }))
    }

    /// Physically remove a membership from the caller's organisation.
    #[tracing::instrument(skip(self, caller), fields(db.table = "membership", db.operation = "delete"))]
    pub async fn remove_member(
        &self,
        caller: &CallerIdentity,
        user_id: &str,
    ) -> Result<(), AppError> {
        let org_id = caller.require(Permission::RemoveUser)?;
        if user_id == caller.user_id {
            return Err(AppError::Validation(
                "Admins cannot remove themselves from an organisation".to_string(),
            ));
        }
        let key = membership_key(org_id, user_id)?;
        if self.table.get::<Membership>(&key).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "User {} is not a member of this organisation",
                user_id
            )));
        }

        let mut batch = WriteBatch::new();
        batch.delete::<Membership>(key);
        self.table.commit(batch).await?;

        tracing::info!(org_id = %org_id, user_id = %user_id, "Member removed");
        Ok(())
    }
}

use cataloguer_core::models::{normalize_email, CreateUserRequest, User};
use cataloguer_core::AppError;
use validator::Validate;

use crate::db::query::{QueryMode, QueryRequest};
use crate::db::table::record::PrimaryKey;
use crate::db::table::{EntityKind, Table};
use crate::db::transaction::WriteBatch;

/// Repository for user profiles
#[derive(Clone)]
pub struct UserRepository {
    table: Table,
}

impl UserRepository {
    pub fn new(table: Table) -> Self {
        Self { table }
    }

    #[tracing::instrument(skip(self), fields(db.table = "user", db.operation = "select", db.record_id = %user_id))]
    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        let key = PrimaryKey::of(EntityKind::User, &[("userId", user_id)])?;
        self.table.get(&key).await
    }

    /// Find a user by email, case-insensitively.
    #[tracing::instrument(skip(self), fields(db.table = "user", db.operation = "select"))]
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Ok(None);
        }
        let page = self
            .table
            .query::<User>(
                QueryRequest::new("byEmail")
                    .partition("email", email)
                    .limit(Some(1))
                    .mode(QueryMode::SinglePage),
            )
            .await?;
        Ok(page.items.into_iter().next())
    }

    /// Return the user registered under the email, creating one on first sign-in.
    ///
    /// Two concurrent first sign-ins may both create a user; the earliest one
    /// (by id) wins on later lookups.
    #[tracing::instrument(skip(self, request), fields(db.table = "user", db.operation = "upsert"))]
    pub async fn get_or_create_by_email(
        &self,
        request: CreateUserRequest,
    ) -> Result<User, AppError> {
        request.validate()?;
        if let Some(existing) = self.find_by_email(&request.email).await? {
            return Ok(existing);
        }

        let user = User::create(&request, self.table.now())?;
        let mut batch = WriteBatch::new();
        batch.create(&user)?;
        self.table.commit(batch).await?;

        tracing::info!(user_id = %user.user_id, "Created user on first sign-in");
        Ok(user)
    }
}

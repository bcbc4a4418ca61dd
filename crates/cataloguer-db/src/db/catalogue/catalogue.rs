use cataloguer_core::identity::{CallerIdentity, Permission};
use cataloguer_core::models::{
    Catalogue, CatalogueItem, CatalogueItemImage, CatalogueWithPreview, CreateCatalogueRequest,
    UpdateCatalogueRequest,
};
use cataloguer_core::AppError;

use super::load_active_catalogue;
use crate::db::query::{Filter, Page, QueryMode, QueryRequest, SearchMode, SortOrder};
use crate::db::table::Table;
use crate::db::transaction::WriteBatch;

/// Images shown per catalogue in overview listings.
pub const PREVIEW_IMAGE_COUNT: usize = 5;

/// Repository for catalogues
#[derive(Clone)]
pub struct CatalogueRepository {
    table: Table,
}

impl CatalogueRepository {
    pub fn new(table: Table) -> Self {
        Self { table }
    }

    #[tracing::instrument(skip(self, caller, request), fields(db.table = "catalogue", db.operation = "insert"))]
    pub async fn create_catalogue(
        &self,
        caller: &CallerIdentity,
        request: CreateCatalogueRequest,
    ) -> Result<Catalogue, AppError> {
        let org_id = caller.require(Permission::CreateCatalogue)?;
        let catalogue = Catalogue::create(&request, org_id, &caller.user_id, self.table.now())?;

        let mut batch = WriteBatch::new();
        batch.create(&catalogue)?;
        self.table.commit(batch).await?;

        tracing::info!(catalogue_id = %catalogue.catalogue_id, org_id = %org_id, "Catalogue created");
        Ok(catalogue)
    }

    /// An active catalogue of the caller's organisation.
    #[tracing::instrument(skip(self, caller), fields(db.table = "catalogue", db.operation = "select", db.record_id = %catalogue_id))]
    pub async fn get_catalogue(
        &self,
        caller: &CallerIdentity,
        catalogue_id: &str,
    ) -> Result<Catalogue, AppError> {
        let org_id = caller.require(Permission::ViewCatalogue)?;
        load_active_catalogue(&self.table, org_id, catalogue_id).await
    }

    #[tracing::instrument(skip(self, caller, patch), fields(db.table = "catalogue", db.operation = "update", db.record_id = %catalogue_id))]
    pub async fn update_catalogue(
        &self,
        caller: &CallerIdentity,
        catalogue_id: &str,
        patch: UpdateCatalogueRequest,
    ) -> Result<Catalogue, AppError> {
        let org_id = caller.require(Permission::UpdateCatalogue)?;
        let mut catalogue = load_active_catalogue(&self.table, org_id, catalogue_id).await?;
        catalogue.apply_patch(&patch, self.table.now())?;

        let mut batch = WriteBatch::new();
        batch.update(&catalogue)?;
        self.table.commit(batch).await?;
        Ok(catalogue)
    }

    /// Active catalogues of the caller's organisation, newest first.
    #[tracing::instrument(skip(self, caller, cursor), fields(db.table = "catalogue", db.operation = "select"))]
    pub async fn list_catalogues(
        &self,
        caller: &CallerIdentity,
        search: Option<&str>,
        limit: Option<usize>,
        cursor: Option<String>,
    ) -> Result<Page<Catalogue>, AppError> {
        let org_id = caller.require(Permission::ViewCatalogue)?;
        let mut request = QueryRequest::new("byOrg")
            .partition("orgId", org_id)
            .filter(Filter::active())
            .order(SortOrder::Desc)
            .limit(limit)
            .cursor(cursor);
        if let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) {
            request = request.filter(Filter::search(term, SearchMode::Substring));
        }
        self.table.query(request).await
    }

    /// Like `list_catalogues`, each with its most recent active images.
    #[tracing::instrument(skip(self, caller, cursor), fields(db.table = "catalogue", db.operation = "select"))]
    pub async fn list_catalogues_with_previews(
        &self,
        caller: &CallerIdentity,
        search: Option<&str>,
        limit: Option<usize>,
        cursor: Option<String>,
    ) -> Result<Page<CatalogueWithPreview>, AppError> {
        let page = self.list_catalogues(caller, search, limit, cursor).await?;

        let mut previews = Vec::with_capacity(page.items.len());
        for catalogue in page.items {
            let images: Page<CatalogueItemImage> = self
                .table
                .query(
                    QueryRequest::new("byCatalogue")
                        .partition("catalogueId", catalogue.catalogue_id.as_str())
                        .filter(Filter::active())
                        .order(SortOrder::Desc)
                        .limit(Some(PREVIEW_IMAGE_COUNT)),
                )
                .await?;
            previews.push(CatalogueWithPreview {
                catalogue,
                images: images.items,
            });
        }

        Ok(Page {
            items: previews,
            next_cursor: page.next_cursor,
        })
    }

    /// Soft-delete a catalogue that holds no active items.
    #[tracing::instrument(skip(self, caller), fields(db.table = "catalogue", db.operation = "delete", db.record_id = %catalogue_id))]
    pub async fn delete_catalogue(
        &self,
        caller: &CallerIdentity,
        catalogue_id: &str,
    ) -> Result<Catalogue, AppError> {
        let org_id = caller.require(Permission::DeleteCatalogue)?;
        let mut catalogue = load_active_catalogue(&self.table, org_id, catalogue_id).await?;

        let remaining: Page<CatalogueItem> = self
            .table
            .query(
                QueryRequest::new("byCatalogue")
                    .partition("catalogueId", catalogue_id)
                    .filter(Filter::active())
                    .limit(Some(1))
                    .mode(QueryMode::Exhaustive),
            )
            .await?;
        if !remaining.items.is_empty() {
            return Err(AppError::Conflict(format!(
                "Catalogue {} still contains active items",
                catalogue_id
            )));
        }

        let now = self.table.now();
        let mut batch = WriteBatch::new();
        batch.soft_delete(&catalogue, now)?;
        self.table.commit(batch).await?;

        catalogue.deleted_at = Some(now);
        catalogue.updated_at = now;
        tracing::info!(catalogue_id = %catalogue_id, "Catalogue deleted");
        Ok(catalogue)
    }
}

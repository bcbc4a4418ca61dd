#[cfg(feature = "storage")]
use std::sync::Arc;

use cataloguer_core::identity::{CallerIdentity, Permission};
use cataloguer_core::models::{
    CatalogueItem, CatalogueItemImage, CreateItemRequest, UpdateItemRequest, UploadedImage,
};
use cataloguer_core::pricing::{
    price_sort_key, round_to_cents, MAX_PRICE, MIN_PRICE, PRICE_SORT_KEY_WIDTH,
};
use cataloguer_core::AppError;
#[cfg(feature = "storage")]
use cataloguer_storage::{ImageUpload, ObjectStorage};
use rust_decimal::Decimal;
use validator::Validate;

use super::{item_key, load_active_catalogue, load_active_images};
use crate::db::query::{Filter, Page, QueryRequest, SearchMode, SortOrder, SortRange};
use crate::db::table::Table;
use crate::db::transaction::WriteBatch;

/// Inclusive price bounds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriceRange {
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
}

impl PriceRange {
    fn to_sort_range(self) -> Result<Option<SortRange>, AppError> {
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(AppError::Validation(format!(
                    "Minimum price {} is above maximum price {}",
                    min, max
                )));
            }
        }
        let min = self
            .min
            .map(|min| {
                reject_negative(min, "Minimum")?;
                price_sort_key(min.max(MIN_PRICE))
            })
            .transpose()?;
        let max = self
            .max
            .map(|max| {
                reject_negative(max, "Maximum")?;
                if round_to_cents(max) < MIN_PRICE {
                    // Below every storable price.
                    Ok("0".repeat(PRICE_SORT_KEY_WIDTH))
                } else {
                    price_sort_key(max.min(MAX_PRICE))
                }
            })
            .transpose()?;
        Ok(match (min, max) {
            (Some(min), Some(max)) => Some(SortRange::Between(vec![min], vec![max])),
            (Some(min), None) => Some(SortRange::Gte(vec![min])),
            (None, Some(max)) => Some(SortRange::Lte(vec![max])),
            (None, None) => None,
        })
    }
}

fn reject_negative(bound: Decimal, which: &str) -> Result<(), AppError> {
    if bound < Decimal::ZERO {
        return Err(AppError::Validation(format!(
            "{} price must not be negative, got {}",
            which, bound
        )));
    }
    Ok(())
}

/// Options for listing items of an organisation or one of its catalogues
#[derive(Debug, Clone, Default)]
pub struct ItemListQuery {
    /// Restrict to one catalogue; the whole organisation otherwise.
    pub catalogue_id: Option<String>,
    /// Order by price instead of by creation.
    pub price_order: Option<SortOrder>,
    pub price_range: PriceRange,
    pub search: Option<String>,
    pub search_mode: SearchMode,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

/// Repository for catalogue items and their images
#[derive(Clone)]
pub struct CatalogueItemRepository {
    table: Table,
    #[cfg(feature = "storage")]
    storage: Option<Arc<dyn ObjectStorage>>,
}

impl CatalogueItemRepository {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            #[cfg(feature = "storage")]
            storage: None,
        }
    }

    #[cfg(feature = "storage")]
    pub fn with_storage(mut self, storage: Arc<dyn ObjectStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Create an item and its images in one commit.
    ///
    /// The first image becomes the item's snapshot.
    #[tracing::instrument(skip(self, caller, request, images), fields(db.table = "catalogue_item", db.operation = "insert", images = images.len()))]
    pub async fn create_item(
        &self,
        caller: &CallerIdentity,
        catalogue_id: &str,
        request: CreateItemRequest,
        images: Vec<UploadedImage>,
    ) -> Result<(CatalogueItem, Vec<CatalogueItemImage>), AppError> {
        let org_id = caller.require(Permission::CreateCatalogue)?;
        let first = images
            .first()
            .ok_or_else(|| AppError::Validation("At least one image is required".to_string()))?;
        let catalogue = load_active_catalogue(&self.table, org_id, catalogue_id).await?;

        let now = self.table.now();
        let item = CatalogueItem::create(&request, &catalogue, first, now)?;
        let images = images
            .iter()
            .map(|upload| CatalogueItemImage::create(&item, upload, now))
            .collect::<Result<Vec<_>, _>>()?;

        let mut batch = WriteBatch::new();
        batch.create(&item)?;
        for image in &images {
            batch.create(image)?;
        }
        self.table.commit(batch).await?;

        tracing::info!(
            item_id = %item.item_id,
            catalogue_id = %catalogue_id,
            images = images.len(),
            "Catalogue item created"
        );
        Ok((item, images))
    }

    /// Upload raw images through object storage, then create the item.
    ///
    /// Objects already uploaded are deleted again if the item cannot be created.
    #[cfg(feature = "storage")]
    #[tracing::instrument(skip(self, caller, request, uploads), fields(db.table = "catalogue_item", db.operation = "insert", uploads = uploads.len()))]
    pub async fn create_item_with_uploads(
        &self,
        caller: &CallerIdentity,
        catalogue_id: &str,
        request: CreateItemRequest,
        uploads: Vec<ImageUpload>,
    ) -> Result<(CatalogueItem, Vec<CatalogueItemImage>), AppError> {
        let storage = self
            .storage
            .as_ref()
            .ok_or_else(|| AppError::Internal("Object storage is not configured".to_string()))?;
        let org_id = caller.require(Permission::CreateCatalogue)?;
        if uploads.is_empty() {
            return Err(AppError::Validation(
                "At least one image is required".to_string(),
            ));
        }
        request.validate()?;
        load_active_catalogue(&self.table, org_id, catalogue_id).await?;

        let mut stored = Vec::with_capacity(uploads.len());
        for upload in &uploads {
            match storage.upload(org_id, upload).await {
                Ok(object) => stored.push(object),
                Err(e) => {
                    self.discard_objects(storage.as_ref(), &stored).await;
                    return Err(AppError::Upstream(format!(
                        "Failed to upload image '{}': {}",
                        upload.filename, e
                    )));
                }
            }
        }

        let images = stored
            .iter()
            .map(|object| UploadedImage {
                image_url: object.url.clone(),
                placeholder_hash: object.placeholder_hash.clone(),
            })
            .collect();

        match self.create_item(caller, catalogue_id, request, images).await {
            Ok(created) => Ok(created),
            Err(e) => {
                self.discard_objects(storage.as_ref(), &stored).await;
                Err(e)
            }
        }
    }

    #[cfg(feature = "storage")]
    async fn discard_objects(
        &self,
        storage: &dyn ObjectStorage,
        objects: &[cataloguer_storage::StoredObject],
    ) {
        for object in objects {
            if let Err(e) = storage.delete(&object.key).await {
                tracing::warn!(key = %object.key, error = %e, "Failed to delete orphaned image");
            }
        }
    }

    /// Raw lookup by id; soft-deleted items and other organisations included.
    #[tracing::instrument(skip(self), fields(db.table = "catalogue_item", db.operation = "select", db.record_id = %item_id))]
    pub async fn find_item(&self, item_id: &str) -> Result<Option<CatalogueItem>, AppError> {
        self.table.get(&item_key(item_id)?).await
    }

    /// An active item of the caller's organisation.
    #[tracing::instrument(skip(self, caller), fields(db.table = "catalogue_item", db.operation = "select", db.record_id = %item_id))]
    pub async fn get_item(
        &self,
        caller: &CallerIdentity,
        item_id: &str,
    ) -> Result<CatalogueItem, AppError> {
        let org_id = caller.require(Permission::ViewCatalogue)?;
        self.load_active_item(org_id, item_id).await
    }

    async fn load_active_item(&self, org_id: &str, item_id: &str) -> Result<CatalogueItem, AppError> {
        self.find_item(item_id)
            .await?
            .filter(|item| item.org_id == org_id && item.is_active())
            .ok_or_else(|| AppError::NotFound(format!("Catalogue item {}", item_id)))
    }

    /// Patch an item; a price change re-derives its sort key.
    #[tracing::instrument(skip(self, caller, patch), fields(db.table = "catalogue_item", db.operation = "update", db.record_id = %item_id))]
    pub async fn update_item(
        &self,
        caller: &CallerIdentity,
        item_id: &str,
        patch: UpdateItemRequest,
    ) -> Result<CatalogueItem, AppError> {
        let org_id = caller.require(Permission::UpdateCatalogue)?;
        let mut item = self.load_active_item(org_id, item_id).await?;
        item.apply_patch(&patch, self.table.now())?;

        let mut batch = WriteBatch::new();
        batch.update(&item)?;
        self.table.commit(batch).await?;
        Ok(item)
    }

    /// Active items, newest first unless ordered by price.
    #[tracing::instrument(skip(self, caller, query), fields(db.table = "catalogue_item", db.operation = "select"))]
    pub async fn list_items(
        &self,
        caller: &CallerIdentity,
        query: ItemListQuery,
    ) -> Result<Page<CatalogueItem>, AppError> {
        let org_id = caller.require(Permission::ViewCatalogue)?;
        let range = query.price_range.to_sort_range()?;
        let by_price = query.price_order.is_some() || range.is_some();

        let mut request = match &query.catalogue_id {
            Some(catalogue_id) => {
                load_active_catalogue(&self.table, org_id, catalogue_id).await?;
                let index = if by_price { "byCataloguePrice" } else { "byCatalogue" };
                QueryRequest::new(index).partition("catalogueId", catalogue_id.as_str())
            }
            None => {
                let index = if by_price { "byOrgPrice" } else { "byOrg" };
                QueryRequest::new(index).partition("orgId", org_id)
            }
        };

        let order = match query.price_order {
            Some(order) => order,
            None if by_price => SortOrder::Asc,
            None => SortOrder::Desc,
        };
        request = request
            .filter(Filter::active())
            .order(order)
            .limit(query.limit)
            .cursor(query.cursor);
        if let Some(range) = range {
            request = request.range(range);
        }
        if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            request = request.filter(Filter::search(term, query.search_mode));
        }

        self.table.query(request).await
    }

    /// Active images of an active item.
    #[tracing::instrument(skip(self, caller), fields(db.table = "catalogue_item_image", db.operation = "select"))]
    pub async fn list_item_images(
        &self,
        caller: &CallerIdentity,
        item_id: &str,
    ) -> Result<Vec<CatalogueItemImage>, AppError> {
        let org_id = caller.require(Permission::ViewCatalogue)?;
        self.load_active_item(org_id, item_id).await?;
        load_active_images(&self.table, item_id).await
    }

    /// Active images of a catalogue, most recent first.
    #[tracing::instrument(skip(self, caller, cursor), fields(db.table = "catalogue_item_image", db.operation = "select"))]
    pub async fn list_catalogue_images(
        &self,
        caller: &CallerIdentity,
        catalogue_id: &str,
        limit: Option<usize>,
        cursor: Option<String>,
    ) -> Result<Page<CatalogueItemImage>, AppError> {
        let org_id = caller.require(Permission::ViewCatalogue)?;
        load_active_catalogue(&self.table, org_id, catalogue_id).await?;
        self.table
            .query(
                QueryRequest::new("byCatalogue")
                    .partition("catalogueId", catalogue_id)
                    .filter(Filter::active())
                    .order(SortOrder::Desc)
                    .limit(limit)
                    .cursor(cursor),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    #[test]
    fn test_zero_minimum_starts_at_smallest_price() {
        let range = PriceRange {
            min: Some(Decimal::ZERO),
            max: Some(price("20")),
        };
        assert_eq!(
            range.to_sort_range().unwrap(),
            Some(SortRange::Between(
                vec!["0000000001".to_string()],
                vec!["0000002000".to_string()]
            ))
        );
    }

    #[test]
    fn test_zero_maximum_matches_nothing_storable() {
        let range = PriceRange {
            min: None,
            max: Some(Decimal::ZERO),
        };
        assert_eq!(
            range.to_sort_range().unwrap(),
            Some(SortRange::Lte(vec!["0000000000".to_string()]))
        );
    }

    #[test]
    fn test_negative_bounds_are_rejected() {
        for range in [
            PriceRange {
                min: Some(price("-1")),
                max: None,
            },
            PriceRange {
                min: None,
                max: Some(price("-0.01")),
            },
        ] {
            assert!(matches!(
                range.to_sort_range(),
                Err(AppError::Validation(_))
            ));
        }
    }
}

//! Multi-item mutations
//!
//! Every operation first resolves the requested ids against the caller's
//! organisation. A single foreign, missing or deleted id rejects the whole
//! request before anything is written.

use std::collections::HashSet;

use cataloguer_core::identity::{CallerIdentity, Permission};
use cataloguer_core::models::{
    AdjustPricesRequest, Catalogue, CatalogueItem, CatalogueItemImage, CloneItemsRequest,
    CreateCatalogueRequest, DeleteItemsRequest, TransferItemsRequest,
};
use cataloguer_core::{AppError, PriceAdjustment};
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use validator::Validate;

use super::{item_key, load_active_catalogue, load_active_images};
use crate::db::table::record::PrimaryKey;
use crate::db::table::Table;
use crate::db::transaction::WriteBatch;

/// Attributes an in-place price adjustment writes.
const REPRICED_FIELDS: &[&str] = &["price", "priceSortKey", "updatedAt"];

/// Result of a clone
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneOutcome {
    pub catalogue: Catalogue,
    /// Whether `catalogue` was created by this clone.
    pub created_catalogue: bool,
    pub items: Vec<CatalogueItem>,
    pub images: Vec<CatalogueItemImage>,
}

/// Result of a transfer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOutcome {
    pub destination: Catalogue,
    pub items: Vec<CatalogueItem>,
    pub images: Vec<CatalogueItemImage>,
    /// Ids of the soft-deleted source items.
    pub transferred_from: Vec<String>,
}

/// Reject empty and duplicate id lists.
fn check_item_ids(item_ids: &[String]) -> Result<(), AppError> {
    if item_ids.is_empty() {
        return Err(AppError::Validation(
            "At least one item id is required".to_string(),
        ));
    }
    let mut seen = HashSet::with_capacity(item_ids.len());
    for id in item_ids {
        if id.trim().is_empty() {
            return Err(AppError::Validation("Item ids must not be empty".to_string()));
        }
        if !seen.insert(id.as_str()) {
            return Err(AppError::Validation(format!("Duplicate item id {}", id)));
        }
    }
    Ok(())
}

fn default_clone_catalogue_name(now: DateTime<Utc>) -> String {
    format!(
        "Cloned items {}",
        now.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// Repository for bulk clone, transfer, delete and price adjustment
#[derive(Clone)]
pub struct BulkRepository {
    table: Table,
}

impl BulkRepository {
    pub fn new(table: Table) -> Self {
        Self { table }
    }

    /// Resolve `item_ids` to active items of `org_id`, in request order.
    #[tracing::instrument(skip(self, item_ids), fields(db.table = "catalogue_item", db.operation = "select", requested = item_ids.len()))]
    pub async fn validate_ownership(
        &self,
        org_id: &str,
        item_ids: &[String],
    ) -> Result<Vec<CatalogueItem>, AppError> {
        check_item_ids(item_ids)?;
        let keys = item_ids
            .iter()
            .map(|id| item_key(id))
            .collect::<Result<Vec<_>, _>>()?;

        let items: Vec<CatalogueItem> = self
            .table
            .get_many::<CatalogueItem>(&keys)
            .await?
            .into_iter()
            .filter(|item| item.org_id == org_id && item.is_active())
            .collect();

        if items.len() != item_ids.len() {
            tracing::warn!(
                org_id = %org_id,
                requested = item_ids.len(),
                resolved = items.len(),
                "Ownership validation failed"
            );
            return Err(AppError::OwnershipMismatch {
                requested: item_ids.len(),
                resolved: items.len(),
            });
        }
        Ok(items)
    }

    async fn images_of(
        &self,
        items: &[CatalogueItem],
    ) -> Result<Vec<Vec<CatalogueItemImage>>, AppError> {
        let mut images = Vec::with_capacity(items.len());
        for item in items {
            images.push(load_active_images(&self.table, &item.item_id).await?);
        }
        Ok(images)
    }

    /// Queue creation of a copy of every source item and its images.
    fn queue_clones(
        batch: &mut WriteBatch,
        sources: &[CatalogueItem],
        source_images: &[Vec<CatalogueItemImage>],
        prices: &[Decimal],
        catalogue_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(Vec<CatalogueItem>, Vec<CatalogueItemImage>), AppError> {
        let mut items = Vec::with_capacity(sources.len());
        let mut images = Vec::new();
        for ((source, originals), price) in sources.iter().zip(source_images).zip(prices) {
            let clone = source.clone_to(catalogue_id, *price, now)?;
            batch.create(&clone)?;
            for original in originals {
                let image = original.clone_for(&clone, now);
                batch.create(&image)?;
                images.push(image);
            }
            items.push(clone);
        }
        Ok((items, images))
    }

    /// Copy items, optionally re-priced, into an existing or a new catalogue.
    ///
    /// A new catalogue is created in the same commit as the copies.
    #[tracing::instrument(skip(self, caller, request), fields(db.table = "catalogue_item", db.operation = "clone", requested = request.item_ids.len()))]
    pub async fn clone_items(
        &self,
        caller: &CallerIdentity,
        request: CloneItemsRequest,
    ) -> Result<CloneOutcome, AppError> {
        let org_id = caller.require(Permission::CreateCatalogue)?;
        request.validate()?;
        if let Some(adjustment) = &request.price_adjustment {
            adjustment.validate()?;
        }

        let sources = self.validate_ownership(org_id, &request.item_ids).await?;
        let prices = sources
            .iter()
            .map(|item| match &request.price_adjustment {
                Some(adjustment) => adjustment.apply(item.price),
                None => Ok(item.price),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let now = self.table.now();
        let (catalogue, created_catalogue) = match request.destination_catalogue_id.as_deref() {
            Some(destination) => (
                load_active_catalogue(&self.table, org_id, destination).await?,
                false,
            ),
            None => {
                let name = request
                    .catalogue_name
                    .clone()
                    .unwrap_or_else(|| default_clone_catalogue_name(now));
                let catalogue = Catalogue::create(
                    &CreateCatalogueRequest {
                        name,
                        description: Some(format!("Created from {} item(s)", sources.len())),
                    },
                    org_id,
                    &caller.user_id,
                    now,
                )?;
                (catalogue, true)
            }
        };

        let source_images = self.images_of(&sources).await?;
        let mut batch = WriteBatch::new();
        if created_catalogue {
            batch.create(&catalogue)?;
        }
        let (items, images) = Self::queue_clones(
            &mut batch,
            &sources,
            &source_images,
            &prices,
            &catalogue.catalogue_id,
            now,
        )?;
        self.table.commit(batch).await?;

        tracing::info!(
            catalogue_id = %catalogue.catalogue_id,
            created_catalogue,
            items = items.len(),
            images = images.len(),
            "Items cloned"
        );
        Ok(CloneOutcome {
            catalogue,
            created_catalogue,
            items,
            images,
        })
    }

    /// Move items into another catalogue.
    ///
    /// Originals and their images are soft-deleted and copies created at the
    /// destination, all in one commit with one timestamp.
    #[tracing::instrument(skip(self, caller, request), fields(db.table = "catalogue_item", db.operation = "transfer", requested = request.item_ids.len()))]
    pub async fn transfer_items(
        &self,
        caller: &CallerIdentity,
        request: TransferItemsRequest,
    ) -> Result<TransferOutcome, AppError> {
        let org_id = caller.require(Permission::UpdateCatalogue)?;
        request.validate()?;

        let sources = self.validate_ownership(org_id, &request.item_ids).await?;
        let destination =
            load_active_catalogue(&self.table, org_id, &request.destination_catalogue_id).await?;
        if let Some(item) = sources
            .iter()
            .find(|item| item.catalogue_id == destination.catalogue_id)
        {
            return Err(AppError::Validation(format!(
                "Item {} is already in catalogue {}",
                item.item_id, destination.catalogue_id
            )));
        }

        let now = self.table.now();
        let source_images = self.images_of(&sources).await?;
        let prices: Vec<Decimal> = sources.iter().map(|item| item.price).collect();

        let mut batch = WriteBatch::new();
        for (item, images) in sources.iter().zip(&source_images) {
            batch.soft_delete(item, now)?;
            for image in images {
                batch.soft_delete(image, now)?;
            }
        }
        let (items, images) = Self::queue_clones(
            &mut batch,
            &sources,
            &source_images,
            &prices,
            &destination.catalogue_id,
            now,
        )?;
        self.table.commit(batch).await?;

        tracing::info!(
            destination = %destination.catalogue_id,
            items = items.len(),
            "Items transferred"
        );
        Ok(TransferOutcome {
            destination,
            items,
            images,
            transferred_from: sources.into_iter().map(|item| item.item_id).collect(),
        })
    }

    /// Soft-delete items and their active images; returns the number of items.
    #[tracing::instrument(skip(self, caller, request), fields(db.table = "catalogue_item", db.operation = "delete", requested = request.item_ids.len()))]
    pub async fn delete_items(
        &self,
        caller: &CallerIdentity,
        request: DeleteItemsRequest,
    ) -> Result<usize, AppError> {
        let org_id = caller.require(Permission::DeleteCatalogue)?;
        request.validate()?;

        let items = self.validate_ownership(org_id, &request.item_ids).await?;
        let source_images = self.images_of(&items).await?;

        let now = self.table.now();
        let mut batch = WriteBatch::new();
        for (item, images) in items.iter().zip(&source_images) {
            batch.soft_delete(item, now)?;
            for image in images {
                batch.soft_delete(image, now)?;
            }
        }
        self.table.commit(batch).await?;

        tracing::info!(org_id = %org_id, items = items.len(), "Items deleted");
        Ok(items.len())
    }

    /// Re-price items in place.
    ///
    /// Every new price is validated first; the writes then go through the
    /// non-transactional patch path and are not atomic across chunks. Only
    /// the price fields are written, and an item deleted after validation
    /// stays deleted and is left out of the result.
    #[tracing::instrument(skip(self, caller, request), fields(db.table = "catalogue_item", db.operation = "update", requested = request.item_ids.len()))]
    pub async fn adjust_prices(
        &self,
        caller: &CallerIdentity,
        request: AdjustPricesRequest,
    ) -> Result<Vec<CatalogueItem>, AppError> {
        let org_id = caller.require(Permission::UpdateCatalogue)?;
        request.validate()?;
        request.adjustment.validate()?;

        let items = self.validate_ownership(org_id, &request.item_ids).await?;
        let changes = self.reprice(items, &request.adjustment)?;
        let applied: HashSet<PrimaryKey> = self
            .table
            .patch_live(&changes, REPRICED_FIELDS)
            .await?
            .into_iter()
            .collect();

        let mut adjusted = Vec::with_capacity(applied.len());
        for (_, item) in changes {
            if applied.contains(&item_key(&item.item_id)?) {
                adjusted.push(item);
            }
        }
        if adjusted.len() < request.item_ids.len() {
            tracing::warn!(
                org_id = %org_id,
                skipped = request.item_ids.len() - adjusted.len(),
                "Items removed during price adjustment were not re-priced"
            );
        }
        tracing::info!(org_id = %org_id, items = adjusted.len(), "Item prices adjusted");
        Ok(adjusted)
    }

    fn reprice(
        &self,
        items: Vec<CatalogueItem>,
        adjustment: &PriceAdjustment,
    ) -> Result<Vec<(CatalogueItem, CatalogueItem)>, AppError> {
        let now = self.table.now();
        items
            .into_iter()
            .map(|item| {
                let adjusted = item.with_adjusted_price(adjustment, now)?;
                Ok((item, adjusted))
            })
            .collect()
    }
}

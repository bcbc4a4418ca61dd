pub mod bulk;
#[allow(clippy::module_inception)]
pub mod catalogue;
pub mod item;

pub use bulk::{BulkRepository, CloneOutcome, TransferOutcome};
pub use catalogue::CatalogueRepository;
pub use item::{CatalogueItemRepository, ItemListQuery, PriceRange};

use cataloguer_core::models::{Catalogue, CatalogueItemImage};
use cataloguer_core::AppError;

use crate::db::query::{Filter, QueryRequest};
use crate::db::table::record::PrimaryKey;
use crate::db::table::{EntityKind, Table};

pub(crate) fn catalogue_key(catalogue_id: &str) -> Result<PrimaryKey, AppError> {
    PrimaryKey::of(EntityKind::Catalogue, &[("catalogueId", catalogue_id)])
}

pub(crate) fn item_key(item_id: &str) -> Result<PrimaryKey, AppError> {
    PrimaryKey::of(EntityKind::CatalogueItem, &[("itemId", item_id)])
}

/// An active catalogue of `org_id`, or `NotFound`.
///
/// Catalogues of other organisations are reported as missing.
pub(crate) async fn load_active_catalogue(
    table: &Table,
    org_id: &str,
    catalogue_id: &str,
) -> Result<Catalogue, AppError> {
    table
        .get::<Catalogue>(&catalogue_key(catalogue_id)?)
        .await?
        .filter(|catalogue| catalogue.org_id == org_id && catalogue.is_active())
        .ok_or_else(|| AppError::NotFound(format!("Catalogue {}", catalogue_id)))
}

/// Every active image of an item.
pub(crate) async fn load_active_images(
    table: &Table,
    item_id: &str,
) -> Result<Vec<CatalogueItemImage>, AppError> {
    let mut images = Vec::new();
    let mut cursor = None;
    loop {
        let page = table
            .query::<CatalogueItemImage>(
                QueryRequest::new("primary")
                    .partition("itemId", item_id)
                    .filter(Filter::active())
                    .limit(Some(table.limits().max_page_size))
                    .cursor(cursor),
            )
            .await?;
        images.extend(page.items);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    Ok(images)
}

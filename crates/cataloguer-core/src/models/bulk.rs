use serde::Deserialize;
use validator::Validate;

use crate::pricing::PriceAdjustment;

/// Copy items into a new or existing catalogue
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CloneItemsRequest {
    #[validate(length(min = 1, message = "At least one item id is required"))]
    pub item_ids: Vec<String>,
    /// Existing destination; a new catalogue is created when absent.
    #[serde(default)]
    pub destination_catalogue_id: Option<String>,
    /// Name for the created catalogue; ignored with a destination.
    #[serde(default)]
    #[validate(length(
        min = 1,
        max = 255,
        message = "Catalogue name must be between 1 and 255 characters"
    ))]
    pub catalogue_name: Option<String>,
    #[serde(default)]
    pub price_adjustment: Option<PriceAdjustment>,
}

/// Move items into another catalogue of the same organisation
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TransferItemsRequest {
    #[validate(length(min = 1, message = "At least one item id is required"))]
    pub item_ids: Vec<String>,
    #[validate(length(min = 1, message = "destinationCatalogueId is required"))]
    pub destination_catalogue_id: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DeleteItemsRequest {
    #[validate(length(min = 1, message = "At least one item id is required"))]
    pub item_ids: Vec<String>,
}

/// Adjust prices of existing items without cloning them
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AdjustPricesRequest {
    #[validate(length(min = 1, message = "At least one item id is required"))]
    pub item_ids: Vec<String>,
    pub adjustment: PriceAdjustment,
}

use std::str::FromStr;

use cataloguer_core::models::{
    Catalogue, CatalogueItem, CatalogueItemImage, CreateCatalogueRequest, CreateItemRequest,
    UploadedImage,
};
use cataloguer_core::CallerIdentity;
use rust_decimal::Decimal;

use super::TestApp;

pub fn price(value: &str) -> Decimal {
    Decimal::from_str(value).expect("Invalid decimal literal")
}

/// An already-uploaded image reference.
pub fn uploaded_image(n: usize) -> UploadedImage {
    UploadedImage {
        image_url: format!("https://cdn.example.com/catalogue/{}.png", n),
        placeholder_hash: Some(format!("LEHV6nWB2yk8pyo{}", n)),
    }
}

pub async fn create_catalogue(app: &TestApp, caller: &CallerIdentity, name: &str) -> Catalogue {
    app.db
        .catalogues()
        .create_catalogue(
            caller,
            CreateCatalogueRequest {
                name: name.to_string(),
                description: Some(format!("{} description", name)),
            },
        )
        .await
        .expect("Failed to create catalogue")
}

/// Create an item with `images` uploaded images.
pub async fn create_item(
    app: &TestApp,
    caller: &CallerIdentity,
    catalogue_id: &str,
    name: &str,
    item_price: &str,
    images: usize,
) -> (CatalogueItem, Vec<CatalogueItemImage>) {
    app.db
        .items()
        .create_item(
            caller,
            catalogue_id,
            CreateItemRequest {
                name: name.to_string(),
                description: None,
                price: price(item_price),
                metadata: None,
            },
            (0..images).map(uploaded_image).collect(),
        )
        .await
        .expect("Failed to create item")
}

mod helpers;

use std::sync::Arc;

use bytes::Bytes;
use cataloguer_core::models::{
    CreateItemRequest, DeleteItemsRequest, UpdateCatalogueRequest, UpdateItemRequest,
};
use cataloguer_core::{AppError, Role};
use cataloguer_db::ItemListQuery;
use cataloguer_storage::{ImageUpload, LocalStorage};
use chrono::Duration;
use helpers::fixtures::{create_catalogue, create_item, price};
use helpers::{register_test_tenant, setup_test_app};
use tempfile::TempDir;

#[tokio::test]
async fn test_catalogue_lifecycle() {
    let app = setup_test_app();
    let tenant = register_test_tenant(&app, "owner@example.com").await;
    let catalogue = create_catalogue(&app, &tenant.admin, "Spring").await;
    assert_eq!(catalogue.org_id, tenant.organization.org_id);
    assert_eq!(catalogue.created_by, tenant.user.user_id);

    app.clock.advance(Duration::minutes(1));
    let updated = app
        .db
        .catalogues()
        .update_catalogue(
            &tenant.admin,
            &catalogue.catalogue_id,
            UpdateCatalogueRequest {
                name: Some("Summer".to_string()),
                description: Some(String::new()),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Summer");
    assert_eq!(updated.description, None);
    assert!(updated.updated_at > catalogue.updated_at);
    assert_eq!(updated.created_at, catalogue.created_at);

    let fetched = app
        .db
        .catalogues()
        .get_catalogue(&tenant.admin, &catalogue.catalogue_id)
        .await
        .unwrap();
    assert_eq!(fetched, updated);

    let deleted = app
        .db
        .catalogues()
        .delete_catalogue(&tenant.admin, &catalogue.catalogue_id)
        .await
        .unwrap();
    assert!(deleted.deleted_at.is_some());

    let result = app
        .db
        .catalogues()
        .get_catalogue(&tenant.admin, &catalogue.catalogue_id)
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    let listed = app
        .db
        .catalogues()
        .list_catalogues(&tenant.admin, None, None, None)
        .await
        .unwrap();
    assert!(listed.items.is_empty());
    assert!(listed.next_cursor.is_none());
}

#[tokio::test]
async fn test_delete_catalogue_with_active_items_conflicts() {
    let app = setup_test_app();
    let tenant = register_test_tenant(&app, "owner@example.com").await;
    let catalogue = create_catalogue(&app, &tenant.admin, "Busy").await;
    let (item, _) = create_item(&app, &tenant.admin, &catalogue.catalogue_id, "Lamp", "10", 1).await;

    let result = app
        .db
        .catalogues()
        .delete_catalogue(&tenant.admin, &catalogue.catalogue_id)
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    app.db
        .bulk()
        .delete_items(
            &tenant.admin,
            DeleteItemsRequest {
                item_ids: vec![item.item_id],
            },
        )
        .await
        .unwrap();
    assert!(app
        .db
        .catalogues()
        .delete_catalogue(&tenant.admin, &catalogue.catalogue_id)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_list_catalogues_newest_first_with_search() {
    let app = setup_test_app();
    let tenant = register_test_tenant(&app, "owner@example.com").await;
    let mut ids = Vec::new();
    for name in ["Winter coats", "Summer hats", "Winter boots"] {
        ids.push(create_catalogue(&app, &tenant.admin, name).await.catalogue_id);
    }

    let all = app
        .db
        .catalogues()
        .list_catalogues(&tenant.admin, None, None, None)
        .await
        .unwrap();
    let listed: Vec<String> = all.items.iter().map(|c| c.catalogue_id.clone()).collect();
    let mut expected = ids.clone();
    expected.sort();
    expected.reverse();
    assert_eq!(listed, expected);

    let winter = app
        .db
        .catalogues()
        .list_catalogues(&tenant.admin, Some("Winter"), None, None)
        .await
        .unwrap();
    assert_eq!(winter.items.len(), 2);
    assert!(winter.items.iter().all(|c| c.name.starts_with("Winter")));
}

#[tokio::test]
async fn test_catalogue_previews_hold_latest_five_images() {
    let app = setup_test_app();
    let tenant = register_test_tenant(&app, "owner@example.com").await;
    let catalogue = create_catalogue(&app, &tenant.admin, "Gallery").await;
    let empty = create_catalogue(&app, &tenant.admin, "Empty").await;

    let mut latest = Vec::new();
    for n in 0..4 {
        app.clock.advance(Duration::seconds(1));
        let (_, images) =
            create_item(&app, &tenant.admin, &catalogue.catalogue_id, &format!("item {}", n), "10", 2)
                .await;
        latest.extend(images);
    }
    latest.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.image_id.cmp(&a.image_id))
    });

    let page = app
        .db
        .catalogues()
        .list_catalogues_with_previews(&tenant.admin, None, None, None)
        .await
        .unwrap();
    assert_eq!(page.items.len(), 2);

    let gallery = page
        .items
        .iter()
        .find(|p| p.catalogue.catalogue_id == catalogue.catalogue_id)
        .unwrap();
    let preview_ids: Vec<&str> = gallery.images.iter().map(|i| i.image_id.as_str()).collect();
    let expected: Vec<&str> = latest.iter().take(5).map(|i| i.image_id.as_str()).collect();
    assert_eq!(preview_ids, expected);

    let empty = page
        .items
        .iter()
        .find(|p| p.catalogue.catalogue_id == empty.catalogue_id)
        .unwrap();
    assert!(empty.images.is_empty());
}

#[tokio::test]
async fn test_create_item_requires_an_image() {
    let app = setup_test_app();
    let tenant = register_test_tenant(&app, "owner@example.com").await;
    let catalogue = create_catalogue(&app, &tenant.admin, "Lamps").await;

    let result = app
        .db
        .items()
        .create_item(
            &tenant.admin,
            &catalogue.catalogue_id,
            CreateItemRequest {
                name: "Lamp".to_string(),
                description: None,
                price: price("10"),
                metadata: None,
            },
            Vec::new(),
        )
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_create_item_snapshots_first_image() {
    let app = setup_test_app();
    let tenant = register_test_tenant(&app, "owner@example.com").await;
    let catalogue = create_catalogue(&app, &tenant.admin, "Lamps").await;
    let (item, images) = create_item(&app, &tenant.admin, &catalogue.catalogue_id, "Lamp", "19.99", 3).await;

    assert_eq!(images.len(), 3);
    assert_eq!(item.image.image_url, images[0].image_url);
    assert_eq!(item.image.placeholder_hash, images[0].placeholder_hash);
    assert_eq!(item.price_sort_key, "0000001999");

    let listed = app
        .db
        .items()
        .list_item_images(&tenant.admin, &item.item_id)
        .await
        .unwrap();
    assert_eq!(listed.len(), 3);
    assert!(listed.iter().all(|image| image.item_id == item.item_id));
}

#[tokio::test]
async fn test_update_item_rederives_sort_key() {
    let app = setup_test_app();
    let tenant = register_test_tenant(&app, "owner@example.com").await;
    let catalogue = create_catalogue(&app, &tenant.admin, "Lamps").await;
    let (item, _) = create_item(&app, &tenant.admin, &catalogue.catalogue_id, "Lamp", "19.99", 1).await;

    let updated = app
        .db
        .items()
        .update_item(
            &tenant.as_role(Role::Editor),
            &item.item_id,
            UpdateItemRequest {
                price: Some(price("7.5")),
                metadata: Some(serde_json::json!({"colour": "green"})),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.price, price("7.50"));
    assert_eq!(updated.price_sort_key, "0000000750");

    let cheapest = app
        .db
        .items()
        .list_items(
            &tenant.admin,
            ItemListQuery {
                catalogue_id: Some(catalogue.catalogue_id.clone()),
                price_order: Some(cataloguer_db::SortOrder::Asc),
                limit: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(cheapest.items[0].metadata["colour"], "green");
}

#[tokio::test]
async fn test_viewer_cannot_create_catalogue() {
    let app = setup_test_app();
    let tenant = register_test_tenant(&app, "owner@example.com").await;
    let result = app
        .db
        .catalogues()
        .create_catalogue(
            &tenant.as_role(Role::Viewer),
            cataloguer_core::models::CreateCatalogueRequest {
                name: "Nope".to_string(),
                description: None,
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn test_items_of_other_tenants_are_not_found() {
    let app = setup_test_app();
    let tenant_a = register_test_tenant(&app, "a@example.com").await;
    let tenant_b = register_test_tenant(&app, "b@example.com").await;
    let catalogue = create_catalogue(&app, &tenant_a.admin, "Private").await;
    let (item, _) = create_item(&app, &tenant_a.admin, &catalogue.catalogue_id, "Secret", "10", 1).await;

    let get = app.db.items().get_item(&tenant_b.admin, &item.item_id).await;
    assert!(matches!(get, Err(AppError::NotFound(_))));

    let catalogue_lookup = app
        .db
        .catalogues()
        .get_catalogue(&tenant_b.admin, &catalogue.catalogue_id)
        .await;
    assert!(matches!(catalogue_lookup, Err(AppError::NotFound(_))));

    let listed = app
        .db
        .items()
        .list_items(&tenant_b.admin, ItemListQuery::default())
        .await
        .unwrap();
    assert!(listed.items.is_empty());
}

#[tokio::test]
async fn test_create_item_with_uploads_stores_objects() {
    let temp_dir = TempDir::new().unwrap();
    let storage = LocalStorage::new(temp_dir.path(), "http://localhost/images".to_string())
        .await
        .unwrap();
    let mut app = setup_test_app();
    app.db = app.db.clone().with_storage(Arc::new(storage));

    let tenant = register_test_tenant(&app, "owner@example.com").await;
    let catalogue = create_catalogue(&app, &tenant.admin, "Uploads").await;

    let (item, images) = app
        .db
        .items()
        .create_item_with_uploads(
            &tenant.admin,
            &catalogue.catalogue_id,
            CreateItemRequest {
                name: "Photo".to_string(),
                description: None,
                price: price("3.20"),
                metadata: None,
            },
            vec![ImageUpload {
                filename: "photo.png".to_string(),
                content_type: "image/png".to_string(),
                data: Bytes::from_static(b"\x89PNG\r\n\x1a\n"),
            }],
        )
        .await
        .unwrap();

    assert_eq!(images.len(), 1);
    assert!(item.image.image_url.starts_with("http://localhost/images/catalogue/"));
    let key = item
        .image
        .image_url
        .trim_start_matches("http://localhost/images/");
    assert!(temp_dir.path().join(key).exists());
}

#[tokio::test]
async fn test_create_item_with_rejected_upload_is_upstream_error() {
    let temp_dir = TempDir::new().unwrap();
    let storage = LocalStorage::new(temp_dir.path(), "http://localhost/images".to_string())
        .await
        .unwrap();
    let mut app = setup_test_app();
    app.db = app.db.clone().with_storage(Arc::new(storage));

    let tenant = register_test_tenant(&app, "owner@example.com").await;
    let catalogue = create_catalogue(&app, &tenant.admin, "Uploads").await;
    let rows_before = app.row_count().await;

    let result = app
        .db
        .items()
        .create_item_with_uploads(
            &tenant.admin,
            &catalogue.catalogue_id,
            CreateItemRequest {
                name: "Notes".to_string(),
                description: None,
                price: price("1"),
                metadata: None,
            },
            vec![
                ImageUpload {
                    filename: "photo.png".to_string(),
                    content_type: "image/png".to_string(),
                    data: Bytes::from_static(b"png"),
                },
                ImageUpload {
                    filename: "notes.txt".to_string(),
                    content_type: "text/plain".to_string(),
                    data: Bytes::from_static(b"hello"),
                },
            ],
        )
        .await;

    assert!(matches!(result, Err(AppError::Upstream(_))));
    assert_eq!(app.row_count().await, rows_before);
    // The object uploaded before the failure was removed again.
    let catalogue_dir = temp_dir
        .path()
        .join("catalogue")
        .join(&tenant.organization.org_id);
    let leftover = std::fs::read_dir(&catalogue_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftover, 0);
}

#[tokio::test]
async fn test_create_item_with_uploads_without_storage_fails() {
    let app = setup_test_app();
    let tenant = register_test_tenant(&app, "owner@example.com").await;
    let catalogue = create_catalogue(&app, &tenant.admin, "Uploads").await;

    let result = app
        .db
        .items()
        .create_item_with_uploads(
            &tenant.admin,
            &catalogue.catalogue_id,
            CreateItemRequest {
                name: "Photo".to_string(),
                description: None,
                price: price("3.20"),
                metadata: None,
            },
            vec![ImageUpload {
                filename: "photo.png".to_string(),
                content_type: "image/png".to_string(),
                data: Bytes::from_static(b"png"),
            }],
        )
        .await;
    assert!(matches!(result, Err(AppError::Internal(_))));
}

mod helpers;

use std::collections::HashSet;

use cataloguer_core::models::{CatalogueItem, DeleteItemsRequest};
use cataloguer_core::AppError;
use cataloguer_db::{
    Filter, ItemListQuery, Page, PriceRange, QueryMode, QueryRequest, SearchMode, SortOrder,
};
use helpers::fixtures::{create_catalogue, create_item, price};
use helpers::{register_test_tenant, setup_test_app, TestApp, TestTenant};

async fn collect_pages(
    app: &TestApp,
    tenant: &TestTenant,
    query: ItemListQuery,
) -> Vec<Page<CatalogueItem>> {
    let mut pages = Vec::new();
    let mut cursor = None;
    loop {
        let page = app
            .db
            .items()
            .list_items(
                &tenant.admin,
                ItemListQuery {
                    cursor: cursor.clone(),
                    ..query.clone()
                },
            )
            .await
            .unwrap();
        cursor = page.next_cursor.clone();
        pages.push(page);
        if cursor.is_none() {
            break;
        }
        assert!(pages.len() < 100, "pagination did not terminate");
    }
    pages
}

#[tokio::test]
async fn test_descending_pages_of_twenty() {
    let app = setup_test_app();
    let tenant = register_test_tenant(&app, "owner@example.com").await;
    let catalogue = create_catalogue(&app, &tenant.admin, "Big").await;
    let mut created = Vec::new();
    for n in 0..45 {
        let (item, _) =
            create_item(&app, &tenant.admin, &catalogue.catalogue_id, &format!("item {}", n), "10", 1)
                .await;
        created.push(item.item_id);
    }

    let pages = collect_pages(
        &app,
        &tenant,
        ItemListQuery {
            catalogue_id: Some(catalogue.catalogue_id.clone()),
            limit: Some(20),
            ..Default::default()
        },
    )
    .await;

    let sizes: Vec<usize> = pages.iter().map(|p| p.items.len()).collect();
    assert_eq!(sizes, vec![20, 20, 5]);
    assert!(pages[2].next_cursor.is_none());

    let listed: Vec<String> = pages
        .into_iter()
        .flat_map(|p| p.items)
        .map(|item| item.item_id)
        .collect();
    let mut expected = created.clone();
    expected.sort();
    expected.reverse();
    assert_eq!(listed, expected);
}

#[tokio::test]
async fn test_ascending_pages_have_no_gaps_or_duplicates() {
    let app = setup_test_app();
    let tenant = register_test_tenant(&app, "owner@example.com").await;
    let first = create_catalogue(&app, &tenant.admin, "First").await;
    let second = create_catalogue(&app, &tenant.admin, "Second").await;
    let mut created = HashSet::new();
    for n in 0..13 {
        let catalogue = if n % 2 == 0 { &first } else { &second };
        let (item, _) =
            create_item(&app, &tenant.admin, &catalogue.catalogue_id, &format!("item {}", n), "10", 2)
                .await;
        created.insert(item.item_id);
    }

    // Organisation-wide, by price so the order is explicit.
    let pages = collect_pages(
        &app,
        &tenant,
        ItemListQuery {
            price_order: Some(SortOrder::Asc),
            limit: Some(4),
            ..Default::default()
        },
    )
    .await;
    assert_eq!(pages.len(), 4);
    assert_eq!(pages.last().map(|p| p.items.len()), Some(1));

    let listed: Vec<String> = pages
        .into_iter()
        .flat_map(|p| p.items)
        .map(|item| item.item_id)
        .collect();
    assert_eq!(listed.len(), 13);
    let unique: HashSet<String> = listed.iter().cloned().collect();
    assert_eq!(unique, created);
    let mut sorted = listed.clone();
    sorted.sort();
    assert_eq!(listed, sorted, "equal prices fall back to id order");
}

#[tokio::test]
async fn test_exact_multiple_of_limit_ends_with_null_cursor() {
    let app = setup_test_app();
    let tenant = register_test_tenant(&app, "owner@example.com").await;
    let catalogue = create_catalogue(&app, &tenant.admin, "Even").await;
    for n in 0..10 {
        create_item(&app, &tenant.admin, &catalogue.catalogue_id, &format!("item {}", n), "10", 1).await;
    }

    let pages = collect_pages(
        &app,
        &tenant,
        ItemListQuery {
            catalogue_id: Some(catalogue.catalogue_id.clone()),
            limit: Some(5),
            ..Default::default()
        },
    )
    .await;
    let sizes: Vec<usize> = pages.iter().map(|p| p.items.len()).collect();
    assert_eq!(sizes, vec![5, 5]);
}

#[tokio::test]
async fn test_soft_deleted_items_are_skipped_across_pages() {
    let app = setup_test_app();
    let tenant = register_test_tenant(&app, "owner@example.com").await;
    let catalogue = create_catalogue(&app, &tenant.admin, "Mixed").await;
    let mut ids = Vec::new();
    for n in 0..12 {
        let (item, _) =
            create_item(&app, &tenant.admin, &catalogue.catalogue_id, &format!("item {}", n), "10", 1)
                .await;
        ids.push(item.item_id);
    }
    let deleted: Vec<String> = ids.iter().step_by(3).cloned().collect();
    app.db
        .bulk()
        .delete_items(
            &tenant.admin,
            DeleteItemsRequest {
                item_ids: deleted.clone(),
            },
        )
        .await
        .unwrap();

    let pages = collect_pages(
        &app,
        &tenant,
        ItemListQuery {
            catalogue_id: Some(catalogue.catalogue_id.clone()),
            limit: Some(4),
            ..Default::default()
        },
    )
    .await;
    let sizes: Vec<usize> = pages.iter().map(|p| p.items.len()).collect();
    assert_eq!(sizes, vec![4, 4]);

    let listed: HashSet<String> = pages
        .into_iter()
        .flat_map(|p| p.items)
        .map(|item| item.item_id)
        .collect();
    assert_eq!(listed.len(), 8);
    assert!(deleted.iter().all(|id| !listed.contains(id)));

    for id in &deleted {
        let raw = app.db.items().find_item(id).await.unwrap();
        assert!(raw.is_some_and(|item| !item.is_active()));
    }
}

#[tokio::test]
async fn test_price_range_is_inclusive() {
    let app = setup_test_app();
    let tenant = register_test_tenant(&app, "owner@example.com").await;
    let catalogue = create_catalogue(&app, &tenant.admin, "Priced").await;
    for value in ["5.00", "9.99", "10.00", "15.50", "20.00", "20.01", "150.00"] {
        create_item(&app, &tenant.admin, &catalogue.catalogue_id, value, value, 1).await;
    }

    let page = app
        .db
        .items()
        .list_items(
            &tenant.admin,
            ItemListQuery {
                catalogue_id: Some(catalogue.catalogue_id.clone()),
                price_range: PriceRange {
                    min: Some(price("10")),
                    max: Some(price("20")),
                },
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let prices: Vec<_> = page.items.iter().map(|item| item.price).collect();
    assert_eq!(prices, vec![price("10.00"), price("15.50"), price("20.00")]);
    assert!(page.next_cursor.is_none());

    let descending = app
        .db
        .items()
        .list_items(
            &tenant.admin,
            ItemListQuery {
                price_order: Some(SortOrder::Desc),
                price_range: PriceRange {
                    min: Some(price("20.00")),
                    max: None,
                },
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let prices: Vec<_> = descending.items.iter().map(|item| item.price).collect();
    assert_eq!(prices, vec![price("150.00"), price("20.01"), price("20.00")]);
}

#[tokio::test]
async fn test_inverted_price_range_is_rejected() {
    let app = setup_test_app();
    let tenant = register_test_tenant(&app, "owner@example.com").await;
    let result = app
        .db
        .items()
        .list_items(
            &tenant.admin,
            ItemListQuery {
                price_range: PriceRange {
                    min: Some(price("20")),
                    max: Some(price("10")),
                },
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_search_filters_by_name() {
    let app = setup_test_app();
    let tenant = register_test_tenant(&app, "owner@example.com").await;
    let catalogue = create_catalogue(&app, &tenant.admin, "Furniture").await;
    for name in ["Oak table", "Oak chair", "Pine table", "Lamp"] {
        create_item(&app, &tenant.admin, &catalogue.catalogue_id, name, "10", 1).await;
    }

    let substring = collect_pages(
        &app,
        &tenant,
        ItemListQuery {
            search: Some("table".to_string()),
            limit: Some(1),
            ..Default::default()
        },
    )
    .await;
    let mut names: Vec<String> = substring
        .into_iter()
        .flat_map(|p| p.items)
        .map(|item| item.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["Oak table", "Pine table"]);

    let prefix = app
        .db
        .items()
        .list_items(
            &tenant.admin,
            ItemListQuery {
                search: Some("Oak".to_string()),
                search_mode: SearchMode::Prefix,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(prefix.items.len(), 2);
    assert!(prefix.items.iter().all(|item| item.name.starts_with("Oak")));
}

#[tokio::test]
async fn test_invalid_limit_and_foreign_cursor_are_rejected() {
    let app = setup_test_app();
    let tenant = register_test_tenant(&app, "owner@example.com").await;
    let first = create_catalogue(&app, &tenant.admin, "First").await;
    let second = create_catalogue(&app, &tenant.admin, "Second").await;
    for n in 0..3 {
        create_item(&app, &tenant.admin, &first.catalogue_id, &format!("item {}", n), "10", 1).await;
    }

    let zero = app
        .db
        .items()
        .list_items(
            &tenant.admin,
            ItemListQuery {
                limit: Some(0),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(zero, Err(AppError::Validation(_))));

    let page = app
        .db
        .items()
        .list_items(
            &tenant.admin,
            ItemListQuery {
                catalogue_id: Some(first.catalogue_id.clone()),
                limit: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let cursor = page.next_cursor.expect("more items remain");

    let foreign = app
        .db
        .items()
        .list_items(
            &tenant.admin,
            ItemListQuery {
                catalogue_id: Some(second.catalogue_id.clone()),
                cursor: Some(cursor),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(foreign, Err(AppError::Validation(_))));

    let garbage = app
        .db
        .items()
        .list_items(
            &tenant.admin,
            ItemListQuery {
                cursor: Some("not a cursor".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(garbage, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_single_page_mode_returns_short_pages_without_gaps() {
    let app = setup_test_app();
    let tenant = register_test_tenant(&app, "owner@example.com").await;
    let catalogue = create_catalogue(&app, &tenant.admin, "Sparse").await;
    let mut ids = Vec::new();
    for n in 0..10 {
        let (item, _) =
            create_item(&app, &tenant.admin, &catalogue.catalogue_id, &format!("item {}", n), "10", 1)
                .await;
        ids.push(item.item_id);
    }
    ids.sort();

    // The lowest ids fill most of the first store page but are filtered out.
    let deleted: Vec<String> = ids[..3].to_vec();
    app.db
        .bulk()
        .delete_items(
            &tenant.admin,
            DeleteItemsRequest {
                item_ids: deleted.clone(),
            },
        )
        .await
        .unwrap();

    let request = |cursor: Option<String>| {
        QueryRequest::new("byCatalogue")
            .partition("catalogueId", catalogue.catalogue_id.clone())
            .filter(Filter::active())
            .order(SortOrder::Asc)
            .limit(Some(4))
            .mode(QueryMode::SinglePage)
            .cursor(cursor)
    };

    let first = app
        .db
        .table()
        .query::<CatalogueItem>(request(None))
        .await
        .unwrap();
    assert_eq!(first.items.len(), 1);
    assert_eq!(first.items[0].item_id, ids[3]);
    assert!(first.next_cursor.is_some());

    let mut listed: Vec<String> = first.items.into_iter().map(|item| item.item_id).collect();
    let mut cursor = first.next_cursor;
    while let Some(next) = cursor {
        let page = app
            .db
            .table()
            .query::<CatalogueItem>(request(Some(next)))
            .await
            .unwrap();
        assert!(page.items.len() <= 4);
        listed.extend(page.items.into_iter().map(|item| item.item_id));
        cursor = page.next_cursor;
        assert!(listed.len() <= 7, "pages overlap");
    }

    assert_eq!(listed, ids[3..].to_vec());
}

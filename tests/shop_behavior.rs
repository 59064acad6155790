//! Behavior-driven tests against the mock shop server.
//!
//! These tests verify WHAT a caller observes when driving the `products`
//! resource over real HTTP: validated pages, cache reuse, and mutations that
//! make cached reads refetch.

mod support;

use std::time::Duration;

use restkit_core::{CallArgs, ErrorKind, Page, ParamMap, QueryStatus};
use serde::Deserialize;
use serde_json::{json, Value};

use support::{products, Shop};

#[derive(Debug, Deserialize)]
struct Product {
    id: u64,
    name: String,
    price: f64,
    tags: Vec<String>,
}

// =============================================================================
// Pagination
// =============================================================================

#[tokio::test]
async fn second_page_decodes_with_next_page_and_full_results() {
    // Given: a shop with 25 products
    let shop = Shop::start().await;
    let list = products().fetcher("list").expect("list is declared");

    // When: the caller asks for page 2 of size 10
    let page: Page<Product> = list
        .fetch_page(json!({"page": 2, "page_size": 10}), Some(&shop.client))
        .await
        .expect("page 2 should validate");

    // Then: the envelope says there is more and carries exactly 10 items
    assert_eq!(page.count, 25);
    assert_eq!(page.pages, 3);
    assert!(page.has_next);
    assert!(page.has_previous);
    assert_eq!(page.next_page, Some(3));
    assert_eq!(page.previous_page, Some(1));
    assert_eq!(page.results.len(), 10);
    assert_eq!(page.results[0].id, 11);
    assert_eq!(page.results[1].tags, vec![String::from("even")]);
}

#[tokio::test]
async fn walking_next_page_args_visits_every_product_once() {
    // Given: a shop with 25 products and an empty starting parameter set
    let shop = Shop::start().await;
    let list = products().fetcher("list").expect("list is declared");
    let mut params = ParamMap::new();
    let mut ids = Vec::new();
    let mut pages_seen = 0;

    // When: the caller follows next_page_args until it runs out
    loop {
        let page: Page<Product> = list
            .fetch_page(CallArgs::options(params.clone()), Some(&shop.client))
            .await
            .expect("every page should validate");
        pages_seen += 1;
        ids.extend(page.results.iter().map(|product| product.id));

        match page.next_page_args(&params) {
            Some(next) => params = next,
            None => break,
        }
    }

    // Then: three pages were read and every id appears in order
    assert_eq!(pages_seen, 3);
    assert_eq!(ids, (1..=25).collect::<Vec<u64>>());
}

#[tokio::test]
async fn raw_call_unwraps_list_results() {
    // Given: a shop with 25 products
    let shop = Shop::start().await;

    // When: the unvalidated namespace call lists the last page
    let results = products()
        .call("list", json!({"page": 3}), Some(&shop.client))
        .await
        .expect("raw list should succeed");

    // Then: only the results array comes back
    let items = results.as_array().expect("results is an array");
    assert_eq!(items.len(), 5);
    assert_eq!(items[0]["id"], json!(21));
}

// =============================================================================
// Cache reuse and deduplication
// =============================================================================

#[tokio::test]
async fn concurrent_identical_fetches_issue_one_request() {
    // Given: a slow shop so both calls overlap
    let shop = Shop::start_slow(Duration::from_millis(100)).await;
    let retrieve = products().fetcher("retrieve").expect("retrieve is declared");

    // When: the same product is fetched twice at once in different call forms
    let (a, b) = tokio::join!(
        retrieve.fetch(json!(4), Some(&shop.client)),
        retrieve.fetch(json!({"id": 4}), Some(&shop.client)),
    );

    // Then: both callers see the same product from a single request
    let a = a.expect("first caller");
    let b = b.expect("second caller");
    assert_eq!(a, b);
    assert_eq!(a["name"], json!("Product 4"));
    assert_eq!(shop.server.request_count(), 1);
}

#[tokio::test]
async fn subscribed_query_serves_cached_value_without_refetch() {
    // Given: a subscribed handle on product 5 that has loaded once
    let shop = Shop::start().await;
    let retrieve = products().fetcher("retrieve").expect("retrieve is declared");
    let handle = retrieve.query(json!(5), Some(&shop.client));
    assert_eq!(handle.load().await.status, QueryStatus::Resolved);

    // When: the handle loads again and a second handle on the same key loads
    let again = handle.load().await;
    let twin = retrieve.query(json!({"id": 5}), Some(&shop.client));
    let twin_state = twin.load().await;

    // Then: both read the cached product and the server saw one request
    assert_eq!(again.data, twin_state.data);
    assert_eq!(twin.key(), handle.key());
    assert_eq!(shop.server.request_count(), 1);
}

#[tokio::test]
async fn revalidate_forces_a_new_request() {
    // Given: a loaded handle
    let shop = Shop::start().await;
    let retrieve = products().fetcher("retrieve").expect("retrieve is declared");
    let handle = retrieve.query(json!(2), Some(&shop.client));
    handle.load().await;

    // When: the caller revalidates
    let state = handle.revalidate().await;

    // Then: the value is refreshed from the server
    assert_eq!(state.status, QueryStatus::Resolved);
    assert!(!state.is_stale);
    assert_eq!(shop.server.request_count(), 2);
}

// =============================================================================
// Mutations invalidate cached reads
// =============================================================================

#[tokio::test]
async fn delete_makes_cached_list_refetch() {
    // Given: a subscribed list handle holding the first page
    let shop = Shop::start().await;
    let ns = products();
    let list = ns.fetcher("list").expect("list is declared");
    let handle = list.query(json!({"page": 1}), Some(&shop.client));
    let before = handle.load().await.data.expect("first page loaded");
    assert_eq!(before["count"], json!(25));

    // When: product 1 is deleted through the delete operation
    ns.fetcher("delete")
        .expect("delete is declared")
        .fetch(json!(1), Some(&shop.client))
        .await
        .expect("delete should succeed");

    // Then: the list is stale and the next read goes back to the server
    assert!(handle.state().is_stale);
    let after = handle.load().await.data.expect("list reloaded");
    assert_eq!(after["count"], json!(24));
    assert_eq!(after["results"][0]["id"], json!(2));
    assert_eq!(shop.server.request_count(), 3);
}

#[tokio::test]
async fn create_invalidates_every_cached_list_page() {
    // Given: two subscribed list pages
    let shop = Shop::start().await;
    let ns = products();
    let list = ns.fetcher("list").expect("list is declared");
    let first = list.query(json!({"page": 1}), Some(&shop.client));
    let last = list.query(json!({"page": 3}), Some(&shop.client));
    first.load().await;
    last.load().await;

    // When: a product is created
    let created = ns
        .fetcher("create")
        .expect("create is declared")
        .fetch(json!({"name": "Desk Lamp", "price": 42.0}), Some(&shop.client))
        .await
        .expect("create should succeed");

    // Then: the created product validates and both pages are stale
    assert_eq!(created["id"], json!(26));
    assert_eq!(created["slug"], json!("desk-lamp"));
    assert!(first.state().is_stale);
    assert!(last.state().is_stale);

    let reloaded = last.load().await.data.expect("last page reloaded");
    assert_eq!(reloaded["count"], json!(26));
    assert_eq!(reloaded["results"].as_array().map(Vec::len), Some(6));
}

#[tokio::test]
async fn update_invalidates_only_the_matching_product() {
    // Given: subscribed handles on products 3 and 4
    let shop = Shop::start().await;
    let ns = products();
    let retrieve = ns.fetcher("retrieve").expect("retrieve is declared");
    let three = retrieve.query(json!(3), Some(&shop.client));
    let four = retrieve.query(json!(4), Some(&shop.client));
    three.load().await;
    four.load().await;

    // When: product 3 is patched with positional arguments
    let updated = ns
        .fetcher("update")
        .expect("update is declared")
        .fetch(vec![json!(3), json!({"price": 9.5})], Some(&shop.client))
        .await
        .expect("update should succeed");

    // Then: only product 3 is stale and reloading it shows the new price
    assert_eq!(updated["price"], json!(9.5));
    assert!(three.state().is_stale);
    assert!(!four.state().is_stale);

    let product: Product = serde_json::from_value(three.load().await.data.expect("reloaded"))
        .expect("product deserializes");
    assert_eq!(product.price, 9.5);
    assert_eq!(product.name, "Product 3");
}

#[tokio::test]
async fn local_mutate_replaces_cached_value_without_request() {
    // Given: a loaded handle on product 6
    let shop = Shop::start().await;
    let retrieve = products().fetcher("retrieve").expect("retrieve is declared");
    let handle = retrieve.query(json!(6), Some(&shop.client));
    let loaded = handle.load().await.data.expect("loaded");

    // When: the caller writes an optimistic value
    let mut optimistic: Value = loaded.clone();
    optimistic["name"] = json!("Renamed locally");
    let state = handle.mutate(optimistic.clone());

    // Then: the cache serves it and no request was made for it
    assert_eq!(state.data, Some(optimistic.clone()));
    assert_eq!(handle.load().await.data, Some(optimistic));
    assert_eq!(shop.server.request_count(), 1);
}

// =============================================================================
// Hook error surface
// =============================================================================

#[tokio::test]
async fn missing_product_surfaces_in_handle_error_field() {
    // Given: a handle on a product id that does not exist
    let shop = Shop::start().await;
    let retrieve = products().fetcher("retrieve").expect("retrieve is declared");
    let handle = retrieve.query(json!(999), Some(&shop.client));

    // When: it loads
    let state = handle.load().await;

    // Then: the state is errored with a not-found transport error and no data
    assert_eq!(state.status, QueryStatus::Errored);
    assert!(state.data.is_none());
    assert!(!state.is_loading);
    let error = state.error.expect("error is populated");
    assert_eq!(error.kind(), ErrorKind::Transport);
    let transport = error.as_transport().expect("transport error");
    assert!(transport.is_not_found());
    assert_eq!(transport.parsed_body(), Some(&json!({"detail": "Not found."})));
}

#[tokio::test]
async fn server_side_validation_error_keeps_status_and_body() {
    // Given: a create request with a blank name
    let shop = Shop::start().await;
    let create = products().fetcher("create").expect("create is declared");

    // When: it is sent
    let error = create
        .fetch(json!({"name": " ", "price": 1.0}), Some(&shop.client))
        .await
        .expect_err("server rejects blank names");

    // Then: the 400 body is available to the caller
    let transport = error.as_transport().expect("transport error");
    assert_eq!(transport.status_code(), Some(400));
    assert_eq!(
        transport.parsed_body().map(|body| body["name"].clone()),
        Some(json!(["This field may not be blank."]))
    );
}

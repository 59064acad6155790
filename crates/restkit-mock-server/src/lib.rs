//! In-memory shop API speaking the paginated envelope format.
//!
//! Routes:
//!
//! | Method | Path | Behavior |
//! |--------|------|----------|
//! | GET | `/shop/products/` | Paginated list (`page`, `page_size`, `search`, `status`) |
//! | POST | `/shop/products/` | Create, `201` |
//! | GET | `/shop/products/{id}/` | Retrieve |
//! | PUT | `/shop/products/{id}/` | Replace |
//! | PATCH | `/shop/products/{id}/` | Partial update |
//! | DELETE | `/shop/products/{id}/` | Delete, `204` |

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};

pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 100;
pub const SEEDED_PRODUCTS: u64 = 25;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    #[default]
    Draft,
    Active,
    Archived,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub name: String,
    pub slug: String,
    pub price: f64,
    pub status: ProductStatus,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProductInput {
    pub name: String,
    pub slug: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub status: ProductStatus,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub price: Option<f64>,
    pub status: Option<ProductStatus>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub search: Option<String>,
    pub status: Option<ProductStatus>,
}

#[derive(Debug, Default)]
pub struct Shop {
    products: BTreeMap<u64, Product>,
    next_id: u64,
}

impl Shop {
    pub fn empty() -> Self {
        Self {
            products: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// `count` active products with ids `1..=count`.
    pub fn seeded(count: u64) -> Self {
        let mut shop = Self::empty();
        for n in 1..=count {
            shop.insert(ProductInput {
                name: format!("Product {n}"),
                slug: None,
                price: n as f64 * 2.5,
                status: ProductStatus::Active,
                description: (n % 3 != 0).then(|| format!("Description of product {n}")),
                tags: if n % 2 == 0 {
                    vec![String::from("even")]
                } else {
                    Vec::new()
                },
            });
        }
        shop
    }

    fn insert(&mut self, input: ProductInput) -> Product {
        let id = self.next_id;
        self.next_id += 1;
        let product = build_product(id, input);
        self.products.insert(id, product.clone());
        product
    }
}

fn build_product(id: u64, input: ProductInput) -> Product {
    let slug = input.slug.unwrap_or_else(|| slugify(&input.name));
    Product {
        id,
        name: input.name,
        slug,
        price: input.price,
        status: input.status,
        description: input.description,
        tags: input.tags,
    }
}

fn slugify(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Shared server state: the shop plus a request counter and an artificial
/// per-request latency.
#[derive(Clone, Debug)]
pub struct AppState {
    shop: Arc<RwLock<Shop>>,
    requests: Arc<AtomicUsize>,
    latency: Duration,
}

impl AppState {
    pub fn new(shop: Shop) -> Self {
        Self {
            shop: Arc::new(RwLock::new(shop)),
            requests: Arc::new(AtomicUsize::new(0)),
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Shop::seeded(SEEDED_PRODUCTS))
    }
}

pub fn app() -> Router {
    app_with_state(AppState::default())
}

pub fn app_with_state(state: AppState) -> Router {
    Router::new()
        .route("/shop/products/", get(list_products).post(create_product))
        .route(
            "/shop/products/{id}/",
            get(get_product)
                .put(replace_product)
                .patch(update_product)
                .delete(delete_product),
        )
        .layer(middleware::from_fn_with_state(state.clone(), track_request))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Handle to a server running on a background task.
#[derive(Debug)]
pub struct MockServer {
    addr: SocketAddr,
    state: AppState,
}

impl MockServer {
    /// Seeded shop on an ephemeral local port.
    pub async fn spawn() -> Result<Self, std::io::Error> {
        Self::spawn_with(AppState::default()).await
    }

    pub async fn spawn_with(state: AppState) -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let router = app_with_state(state.clone());
        tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, router).await {
                tracing::error!(%error, "mock server stopped");
            }
        });
        tracing::debug!(%addr, "mock server listening");
        Ok(Self { addr, state })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn request_count(&self) -> usize {
        self.state.request_count()
    }
}

async fn track_request(State(state): State<AppState>, request: Request, next: Next) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    tracing::debug!(method = %request.method(), uri = %request.uri(), "request");
    if !state.latency.is_zero() {
        tokio::time::sleep(state.latency).await;
    }
    next.run(request).await
}

fn error_response(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, json!({"detail": "Not found."}))
}

fn check_input(name: &str, price: f64) -> Result<(), Response> {
    let mut errors = serde_json::Map::new();
    if name.trim().is_empty() {
        errors.insert(String::from("name"), json!(["This field may not be blank."]));
    }
    if price < 0.0 {
        errors.insert(
            String::from("price"),
            json!(["Ensure this value is greater than or equal to 0."]),
        );
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(error_response(StatusCode::BAD_REQUEST, Value::Object(errors)))
    }
}

async fn list_products(State(state): State<AppState>, Query(params): Query<ListParams>) -> Response {
    let page = params.page.unwrap_or(1);
    let page_size = params
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    if page == 0 {
        return error_response(StatusCode::NOT_FOUND, json!({"detail": "Invalid page."}));
    }

    let shop = state.shop.read().await;
    let search = params.search.as_deref().map(str::to_ascii_lowercase);
    let matching: Vec<&Product> = shop
        .products
        .values()
        .filter(|product| params.status.is_none_or(|status| product.status == status))
        .filter(|product| {
            search
                .as_deref()
                .is_none_or(|needle| product.name.to_ascii_lowercase().contains(needle))
        })
        .collect();

    let count = matching.len() as u64;
    let pages = count.div_ceil(page_size).max(1);
    if page > pages {
        return error_response(StatusCode::NOT_FOUND, json!({"detail": "Invalid page."}));
    }

    let results: Vec<&Product> = matching
        .into_iter()
        .skip(((page - 1) * page_size) as usize)
        .take(page_size as usize)
        .collect();

    Json(json!({
        "count": count,
        "page": page,
        "pages": pages,
        "page_size": page_size,
        "has_next": page < pages,
        "has_previous": page > 1,
        "next_page": (page < pages).then_some(page + 1),
        "previous_page": (page > 1).then(|| page - 1),
        "results": results,
    }))
    .into_response()
}

async fn create_product(State(state): State<AppState>, Json(input): Json<ProductInput>) -> Response {
    if let Err(response) = check_input(&input.name, input.price) {
        return response;
    }
    let product = state.shop.write().await.insert(input);
    (StatusCode::CREATED, Json(product)).into_response()
}

async fn get_product(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    let shop = state.shop.read().await;
    match shop.products.get(&id) {
        Some(product) => Json(product).into_response(),
        None => not_found(),
    }
}

async fn replace_product(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(input): Json<ProductInput>,
) -> Response {
    if let Err(response) = check_input(&input.name, input.price) {
        return response;
    }
    let mut shop = state.shop.write().await;
    let Some(existing) = shop.products.get_mut(&id) else {
        return not_found();
    };
    *existing = build_product(id, input);
    Json(existing.clone()).into_response()
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(patch): Json<ProductPatch>,
) -> Response {
    let mut shop = state.shop.write().await;
    let Some(product) = shop.products.get_mut(&id) else {
        return not_found();
    };

    let name = patch.name.unwrap_or_else(|| product.name.clone());
    let price = patch.price.unwrap_or(product.price);
    if let Err(response) = check_input(&name, price) {
        return response;
    }

    product.name = name;
    product.price = price;
    if let Some(slug) = patch.slug {
        product.slug = slug;
    }
    if let Some(status) = patch.status {
        product.status = status;
    }
    if let Some(description) = patch.description {
        product.description = Some(description);
    }
    if let Some(tags) = patch.tags {
        product.tags = tags;
    }
    Json(product.clone()).into_response()
}

async fn delete_product(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    let mut shop = state.shop.write().await;
    match shop.products.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => not_found(),
    }
}

//! Shared fixtures: the `products` namespace wired against the mock shop.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use restkit_core::{
    ApiClient, ClientConfig, CollectingSink, Field, HttpMethod, InvalidationTarget,
    OperationDescriptor, ParamSpec, ResourceNamespace, Shape,
};
use restkit_mock_server::{AppState, MockServer};

pub fn product_shape() -> Shape {
    Shape::object([
        Field::required("id", Shape::integer().min(1.0)),
        Field::required("name", Shape::string().min_length(1)),
        Field::required("slug", Shape::string()),
        Field::required("price", Shape::number().min(0.0)),
        Field::required("status", Shape::enumeration(["draft", "active", "archived"])),
        Field::optional("description", Shape::string().nullable()),
        Field::required("tags", Shape::array(Shape::string())),
    ])
}

fn product_input_shape() -> Shape {
    Shape::object([
        Field::required("name", Shape::string()),
        Field::optional("slug", Shape::string()),
        Field::required("price", Shape::number()),
        Field::optional("status", Shape::enumeration(["draft", "active", "archived"])),
        Field::optional("description", Shape::string().nullable()),
        Field::optional("tags", Shape::array(Shape::string())),
    ])
}

fn product_patch_shape() -> Shape {
    Shape::object([
        Field::optional("name", Shape::string()),
        Field::optional("slug", Shape::string()),
        Field::optional("price", Shape::number()),
        Field::optional("status", Shape::enumeration(["draft", "active", "archived"])),
        Field::optional("description", Shape::string().nullable()),
        Field::optional("tags", Shape::array(Shape::string())),
    ])
}

const ITEM_PATH: &str = "/shop/products/{id}/";
const LIST_PATH: &str = "/shop/products/";

pub fn products() -> ResourceNamespace {
    ResourceNamespace::new("products")
        .operation(
            OperationDescriptor::new("products", "list", HttpMethod::Get, LIST_PATH)
                .param(ParamSpec::query("page", Shape::integer().min(1.0)))
                .param(ParamSpec::query("page_size", Shape::integer().min(1.0)))
                .param(ParamSpec::query("search", Shape::string()))
                .param(ParamSpec::query(
                    "status",
                    Shape::enumeration(["draft", "active", "archived"]),
                ))
                .paginated(product_shape()),
        )
        .operation(
            OperationDescriptor::new("products", "retrieve", HttpMethod::Get, ITEM_PATH)
                .param(ParamSpec::path("id", Shape::integer()))
                .response(product_shape()),
        )
        .operation(
            OperationDescriptor::new("products", "create", HttpMethod::Post, LIST_PATH)
                .param(ParamSpec::body(product_input_shape()))
                .response(product_shape())
                .invalidates(InvalidationTarget::all("products", "list")),
        )
        .operation(
            OperationDescriptor::new("products", "update", HttpMethod::Patch, ITEM_PATH)
                .param(ParamSpec::path("id", Shape::integer()))
                .param(ParamSpec::body(product_patch_shape()))
                .response(product_shape())
                .invalidates(InvalidationTarget::all("products", "list"))
                .invalidates(InvalidationTarget::matching("products", "retrieve", ["id"])),
        )
        .operation(
            OperationDescriptor::new("products", "delete", HttpMethod::Delete, ITEM_PATH)
                .param(ParamSpec::path("id", Shape::integer()))
                .invalidates(InvalidationTarget::all("products", "list"))
                .invalidates(InvalidationTarget::matching("products", "retrieve", ["id"])),
        )
}

/// A mock shop seeded with 25 products and a client pointed at it.
pub struct Shop {
    pub server: MockServer,
    pub client: ApiClient,
    pub sink: Arc<CollectingSink>,
}

impl Shop {
    pub async fn start() -> Self {
        Self::start_with(AppState::default()).await
    }

    pub async fn start_slow(latency: Duration) -> Self {
        Self::start_with(AppState::default().with_latency(latency)).await
    }

    async fn start_with(state: AppState) -> Self {
        let server = MockServer::spawn_with(state)
            .await
            .expect("mock server should bind a local port");
        let config = ClientConfig::new(server.base_url()).expect("mock base url is valid");
        let sink = Arc::new(CollectingSink::new());
        let client = ApiClient::new(&config).with_sink(sink.clone());
        Self {
            server,
            client,
            sink,
        }
    }
}

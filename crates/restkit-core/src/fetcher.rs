//! Schema-validated operation entry points.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::args::CallArgs;
use crate::cache::QueryHandle;
use crate::client::{resolve_client, ApiClient};
use crate::config::CallOptions;
use crate::diagnostics::ValidationDiagnostic;
use crate::error::{ApiError, ValidationError, ValidationIssue};
use crate::namespace::PreparedCall;
use crate::operation::{OperationDescriptor, OperationKind};
use crate::pagination::{self, Page};
use crate::schema::{self, Shape};

/// Validated, directly callable wrapper around one operation.
///
/// Query operations go through the client's cache, so concurrent identical
/// calls share one request. Mutations run directly and, on success, mark
/// their declared invalidation targets stale.
#[derive(Debug, Clone)]
pub struct Fetcher {
    descriptor: Arc<OperationDescriptor>,
}

impl Fetcher {
    pub fn new(descriptor: Arc<OperationDescriptor>) -> Self {
        Self { descriptor }
    }

    pub fn descriptor(&self) -> &Arc<OperationDescriptor> {
        &self.descriptor
    }

    pub async fn fetch(
        &self,
        args: impl Into<CallArgs>,
        client: Option<&ApiClient>,
    ) -> Result<Value, ApiError> {
        self.fetch_with(args, client, CallOptions::default()).await
    }

    pub async fn fetch_with(
        &self,
        args: impl Into<CallArgs>,
        client: Option<&ApiClient>,
        options: CallOptions,
    ) -> Result<Value, ApiError> {
        let client = resolve_client(client)?;
        let call = PreparedCall::new(Arc::clone(&self.descriptor), args.into())?;
        self.run(client, call, options).await
    }

    /// Fetches and deserializes the validated value into `T`.
    pub async fn fetch_as<T: DeserializeOwned>(
        &self,
        args: impl Into<CallArgs>,
        client: Option<&ApiClient>,
    ) -> Result<T, ApiError> {
        let client = resolve_client(client)?;
        let call = PreparedCall::new(Arc::clone(&self.descriptor), args.into())?;
        let meta = call.operation_meta();
        let value = self.run(client, call, CallOptions::default()).await?;

        serde_json::from_value(value).map_err(|error| {
            ValidationError::single(
                ValidationIssue::new(Vec::new(), error.to_string())
                    .with_expected(std::any::type_name::<T>()),
            )
            .with_operation(meta)
            .into()
        })
    }

    /// Fetches one page of a list operation with typed items.
    pub async fn fetch_page<T: DeserializeOwned>(
        &self,
        args: impl Into<CallArgs>,
        client: Option<&ApiClient>,
    ) -> Result<Page<T>, ApiError> {
        let client = resolve_client(client)?;
        let call = PreparedCall::new(Arc::clone(&self.descriptor), args.into())?;
        let meta = call.operation_meta();
        let value = self.run(client, call, CallOptions::default()).await?;

        let item = self.descriptor.page_item().cloned().unwrap_or(Shape::Any);
        Page::decode_as(&value, &item).map_err(|error| error.with_operation(meta).into())
    }

    /// Subscribed hook handle. Never fails here; setup errors surface in the
    /// handle's state.
    pub fn query(&self, args: impl Into<CallArgs>, client: Option<&ApiClient>) -> QueryHandle {
        QueryHandle::new(self.clone(), args.into(), client)
    }

    async fn run(
        &self,
        client: ApiClient,
        call: PreparedCall,
        options: CallOptions,
    ) -> Result<Value, ApiError> {
        match self.descriptor.operation_kind() {
            OperationKind::Query => {
                let key = call.cache_key();
                let params = call.params().clone();
                let cache = client.cache().clone();
                cache
                    .load(&key, &params, false, move || async move {
                        execute(&client, &call, options).await
                    })
                    .await
            }
            OperationKind::Mutation => {
                let value = execute(&client, &call, options).await?;
                let targets = self.descriptor.invalidation_targets();
                if !targets.is_empty() {
                    client.cache().invalidate(targets, call.params());
                }
                Ok(value)
            }
        }
    }
}

/// Sends `call` and validates the payload against the declared response
/// shape. Rejected payloads are reported to the client's sink.
pub(crate) async fn execute(
    client: &ApiClient,
    call: &PreparedCall,
    options: CallOptions,
) -> Result<Value, ApiError> {
    let raw = call.send(client.transport(), options).await?;
    let descriptor = call.descriptor();

    let validated = match descriptor.page_item() {
        Some(item) => pagination::validate_envelope(&raw, item),
        None => schema::parse(descriptor.response_shape(), &raw),
    };

    validated.map_err(|error| {
        let meta = call.operation_meta();
        client
            .sink()
            .validation_failed(&ValidationDiagnostic::new(&meta, &error, raw));
        ApiError::Validation(error.with_operation(meta))
    })
}

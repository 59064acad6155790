//! Resource namespaces: the operations of one API resource, keyed by name.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::args::{self, CallArgs, ParamMap};
use crate::cache::CacheKey;
use crate::client::{resolve_client, ApiClient};
use crate::config::CallOptions;
use crate::error::{
    ApiError, ArgumentError, OperationMeta, PathSegment, TransportError, ValidationError,
    ValidationIssue,
};
use crate::fetcher::Fetcher;
use crate::operation::{OperationDescriptor, ParamLocation};
use crate::schema;
use crate::transport::{self, SendOptions, Transport};

/// Named bundle of operation descriptors for one resource.
#[derive(Debug, Clone)]
pub struct ResourceNamespace {
    name: String,
    operations: BTreeMap<String, Arc<OperationDescriptor>>,
}

impl ResourceNamespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operations: BTreeMap::new(),
        }
    }

    /// Registers `descriptor` under its operation name, replacing any
    /// previous descriptor with the same name.
    pub fn operation(mut self, descriptor: OperationDescriptor) -> Self {
        if descriptor.resource() != self.name {
            tracing::debug!(
                namespace = %self.name,
                operation = %descriptor.qualified_name(),
                "registering operation declared for another resource"
            );
        }
        self.operations
            .insert(descriptor.name().to_owned(), Arc::new(descriptor));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operation_names(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }

    pub fn descriptor(&self, operation: &str) -> Result<&Arc<OperationDescriptor>, ArgumentError> {
        self.operations
            .get(operation)
            .ok_or_else(|| ArgumentError::UnknownOperation {
                resource: self.name.clone(),
                operation: operation.to_owned(),
            })
    }

    /// Schema-validated entry point for `operation`.
    pub fn fetcher(&self, operation: &str) -> Result<Fetcher, ArgumentError> {
        self.descriptor(operation)
            .map(|descriptor| Fetcher::new(Arc::clone(descriptor)))
    }

    /// Unvalidated call. List operations are unwrapped to their `results`
    /// array; every other payload is returned as received.
    pub async fn call(
        &self,
        operation: &str,
        args: impl Into<CallArgs>,
        client: Option<&ApiClient>,
    ) -> Result<Value, ApiError> {
        let descriptor = Arc::clone(self.descriptor(operation)?);
        let client = resolve_client(client)?;
        let call = PreparedCall::new(descriptor, args.into())?;
        let payload = call.send(client.transport(), CallOptions::default()).await?;

        if !call.descriptor().is_paginated() {
            return Ok(payload);
        }

        match payload {
            Value::Object(mut envelope) => envelope.remove("results").ok_or_else(|| {
                envelope_issue(
                    &call,
                    ValidationIssue::new(vec![PathSegment::from("results")], "field is required")
                        .with_expected("array")
                        .with_received("undefined"),
                )
            }),
            other => Err(envelope_issue(
                &call,
                ValidationIssue::new(Vec::new(), "expected object")
                    .with_expected("object")
                    .with_received(schema::value_kind(&other)),
            )),
        }
    }
}

fn envelope_issue(call: &PreparedCall, issue: ValidationIssue) -> ApiError {
    ValidationError::single(issue)
        .with_operation(call.operation_meta())
        .into()
}

/// One call with arguments normalized and the request fully resolved.
#[derive(Debug, Clone)]
pub struct PreparedCall {
    descriptor: Arc<OperationDescriptor>,
    params: ParamMap,
    path: String,
    query: ParamMap,
    body: Option<Value>,
}

impl PreparedCall {
    pub fn new(descriptor: Arc<OperationDescriptor>, args: CallArgs) -> Result<Self, ArgumentError> {
        let params = args::normalize(&descriptor, args)?;
        let path = transport::render_path(
            &descriptor.qualified_name(),
            descriptor.path_template(),
            &params,
        )?;

        let mut query = ParamMap::new();
        let mut body = None;
        for spec in descriptor.params() {
            let Some(value) = params.get(spec.name()) else {
                continue;
            };
            match spec.location() {
                ParamLocation::Path => {}
                ParamLocation::Query => {
                    query.insert(spec.name().to_owned(), value.clone());
                }
                ParamLocation::Body => body = Some(value.clone()),
            }
        }

        Ok(Self {
            descriptor,
            params,
            path,
            query,
            body,
        })
    }

    pub fn descriptor(&self) -> &Arc<OperationDescriptor> {
        &self.descriptor
    }

    pub fn params(&self) -> &ParamMap {
        &self.params
    }

    /// Rendered request path, placeholders substituted.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &ParamMap {
        &self.query
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(self.descriptor.qualified_name(), &self.params)
    }

    pub fn operation_meta(&self) -> OperationMeta {
        OperationMeta {
            operation: self.descriptor.qualified_name(),
            method: self.descriptor.method(),
            path: self.path.clone(),
        }
    }

    pub async fn send(&self, transport: &Transport, options: CallOptions) -> Result<Value, TransportError> {
        let mut send_options = SendOptions::default()
            .with_query(self.query.clone())
            .with_timeout_ms(options.timeout_ms);
        if let Some(body) = &self.body {
            send_options = send_options.with_body(body.clone());
        }
        transport
            .send(self.descriptor.method(), &self.path, send_options)
            .await
    }
}

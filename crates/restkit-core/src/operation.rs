//! Operation descriptors: one immutable record per HTTP endpoint.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::http_client::HttpMethod;
use crate::pagination;
use crate::schema::Shape;

/// Where a declared parameter travels in the HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamLocation {
    Path,
    Query,
    Body,
}

/// One declared operation parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    name: String,
    location: ParamLocation,
    required: bool,
    shape: Shape,
}

impl ParamSpec {
    /// Path parameters are always required.
    pub fn path(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            location: ParamLocation::Path,
            required: true,
            shape,
        }
    }

    pub fn query(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            location: ParamLocation::Query,
            required: false,
            shape,
        }
    }

    /// JSON request body, declared under the parameter name `body`.
    pub fn body(shape: Shape) -> Self {
        Self {
            name: String::from("body"),
            location: ParamLocation::Body,
            required: true,
            shape,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn optional(mut self) -> Self {
        if self.location != ParamLocation::Path {
            self.required = false;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn location(&self) -> ParamLocation {
        self.location
    }

    pub const fn is_required(&self) -> bool {
        self.required
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// A value for this parameter may itself be a JSON object.
    pub fn is_object_typed(&self) -> bool {
        self.location == ParamLocation::Body || self.shape.is_object()
    }
}

/// Read operations are cached; mutations invalidate cached reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Query,
    Mutation,
}

/// Which cached entries of a target operation a mutation makes stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamMatch {
    /// Every cached entry of the target operation.
    Any,
    /// Entries whose parameters equal the mutation's parameters on these names.
    SameValues(Vec<String>),
}

/// Typed reference to cache entries a mutation invalidates on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationTarget {
    pub resource: String,
    pub operation: String,
    pub params: ParamMatch,
}

impl InvalidationTarget {
    pub fn all(resource: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            operation: operation.into(),
            params: ParamMatch::Any,
        }
    }

    pub fn matching<I, S>(resource: impl Into<String>, operation: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resource: resource.into(),
            operation: operation.into(),
            params: ParamMatch::SameValues(names.into_iter().map(Into::into).collect()),
        }
    }

    /// Scope string of the target, as used in cache keys.
    pub fn scope(&self) -> String {
        format!("{}.{}", self.resource, self.operation)
    }
}

/// Immutable description of one HTTP operation.
#[derive(Debug, Clone)]
pub struct OperationDescriptor {
    resource: String,
    name: String,
    method: HttpMethod,
    path_template: String,
    params: Vec<ParamSpec>,
    response_shape: Shape,
    page_item: Option<Shape>,
    kind: OperationKind,
    invalidates: Vec<InvalidationTarget>,
}

impl OperationDescriptor {
    /// GET operations default to [`OperationKind::Query`], everything else to mutation.
    pub fn new(
        resource: impl Into<String>,
        name: impl Into<String>,
        method: HttpMethod,
        path_template: impl Into<String>,
    ) -> Self {
        Self {
            resource: resource.into(),
            name: name.into(),
            method,
            path_template: path_template.into(),
            params: Vec::new(),
            response_shape: Shape::Any,
            page_item: None,
            kind: if method.is_read_only() {
                OperationKind::Query
            } else {
                OperationKind::Mutation
            },
            invalidates: Vec::new(),
        }
    }

    /// Builds a descriptor from generator output: `param_names` become path
    /// parameters when they appear as `{name}` in the template and optional
    /// query parameters otherwise.
    pub fn from_param_names(
        resource: impl Into<String>,
        name: impl Into<String>,
        method: HttpMethod,
        path_template: impl Into<String>,
        param_names: &[&str],
        body_shape: Option<Shape>,
        response_shape: Shape,
    ) -> Self {
        let mut descriptor = Self::new(resource, name, method, path_template);
        let placeholders: BTreeSet<String> = placeholders(&descriptor.path_template)
            .into_iter()
            .map(str::to_owned)
            .collect();
        for param_name in param_names {
            let spec = if placeholders.contains(*param_name) {
                ParamSpec::path(*param_name, Shape::Any)
            } else {
                ParamSpec::query(*param_name, Shape::Any)
            };
            descriptor.params.push(spec);
        }
        if let Some(body_shape) = body_shape {
            descriptor.params.push(ParamSpec::body(body_shape));
        }
        descriptor.response(response_shape)
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn response(mut self, shape: Shape) -> Self {
        self.response_shape = shape;
        self.page_item = None;
        self
    }

    /// Declares a list endpoint returning the pagination envelope of `item`.
    pub fn paginated(mut self, item: Shape) -> Self {
        self.response_shape = pagination::envelope_shape(item.clone());
        self.page_item = Some(item);
        self
    }

    pub fn kind(mut self, kind: OperationKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn invalidates(mut self, target: InvalidationTarget) -> Self {
        self.invalidates.push(target);
        self
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `resource.name`, the scope under which query results are cached.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.resource, self.name)
    }

    pub const fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path_template(&self) -> &str {
        &self.path_template
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn param_spec(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|spec| spec.name == name)
    }

    pub fn response_shape(&self) -> &Shape {
        &self.response_shape
    }

    pub fn page_item(&self) -> Option<&Shape> {
        self.page_item.as_ref()
    }

    pub const fn is_paginated(&self) -> bool {
        self.page_item.is_some()
    }

    pub const fn operation_kind(&self) -> OperationKind {
        self.kind
    }

    pub fn invalidation_targets(&self) -> &[InvalidationTarget] {
        &self.invalidates
    }
}

/// Placeholder names (`{id}`) appearing in a path template.
pub fn placeholders(template: &str) -> BTreeSet<&str> {
    let mut names = BTreeSet::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            break;
        };
        names.insert(&after[..end]);
        rest = &after[end + 1..];
    }
    names
}

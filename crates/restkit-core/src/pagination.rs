//! Pagination envelope shared by every list endpoint.
//!
//! Wire shape (field names are case-sensitive):
//!
//! ```text
//! { "count": 25, "page": 2, "pages": 3, "page_size": 10,
//!   "has_next": true, "has_previous": true,
//!   "next_page": 3, "previous_page": 1, "results": [...] }
//! ```
//!
//! Decoding is all-or-nothing: a single malformed item fails the whole page.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::args::ParamMap;
use crate::error::{PathSegment, ValidationError, ValidationIssue};
use crate::schema::{self, Field, Shape};

/// One page of a list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: u64,
    pub page: u64,
    pub pages: u64,
    pub page_size: u64,
    pub has_next: bool,
    pub has_previous: bool,
    pub next_page: Option<u64>,
    pub previous_page: Option<u64>,
    pub results: Vec<T>,
}

/// Schema of the envelope around items of shape `item`.
pub fn envelope_shape(item: Shape) -> Shape {
    Shape::object([
        Field::required("count", Shape::integer().min(0.0)),
        Field::required("page", Shape::integer().min(1.0)),
        Field::required("pages", Shape::integer().min(0.0)),
        Field::required("page_size", Shape::integer().min(1.0)),
        Field::required("has_next", Shape::boolean()),
        Field::required("has_previous", Shape::boolean()),
        Field::required("next_page", Shape::integer().min(1.0).nullable()),
        Field::required("previous_page", Shape::integer().min(1.0).nullable()),
        Field::required("results", Shape::array(item)),
    ])
}

/// Same checks as [`Page::decode`], returning the normalized JSON envelope.
pub fn validate_envelope(raw: &Value, item_shape: &Shape) -> Result<Value, ValidationError> {
    decode_parts(raw, item_shape).map(|(normalized, _)| normalized)
}

fn decode_parts(raw: &Value, item_shape: &Shape) -> Result<(Value, Page<Value>), ValidationError> {
    let normalized = schema::parse(&envelope_shape(item_shape.clone()), raw)?;
    let page: Page<Value> = serde_json::from_value(normalized.clone()).map_err(|error| {
        ValidationError::single(ValidationIssue::new(Vec::new(), error.to_string()))
    })?;

    let issues = page.invariant_issues();
    if issues.is_empty() {
        Ok((normalized, page))
    } else {
        Err(ValidationError::new(issues))
    }
}

impl Page<Value> {
    /// Validates `raw` against the envelope schema, every item against
    /// `item_shape`, and the envelope invariants.
    pub fn decode(raw: &Value, item_shape: &Shape) -> Result<Self, ValidationError> {
        decode_parts(raw, item_shape).map(|(_, page)| page)
    }

    /// Decodes and then deserializes every item into `T`.
    pub fn decode_as<T: DeserializeOwned>(
        raw: &Value,
        item_shape: &Shape,
    ) -> Result<Page<T>, ValidationError> {
        let page = Self::decode(raw, item_shape)?;
        page.try_map_indexed(|index, item| {
            serde_json::from_value(item).map_err(|error| {
                ValidationIssue::new(
                    vec![PathSegment::from("results"), PathSegment::Index(index)],
                    error.to_string(),
                )
            })
        })
    }
}

impl<T> Page<T> {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Parameters for the following page, or `None` on the last page.
    pub fn next_page_args(&self, current: &ParamMap) -> Option<ParamMap> {
        if !self.has_next {
            return None;
        }
        let next = self.next_page.unwrap_or(self.page + 1);
        let mut params = current.clone();
        params.insert(String::from("page"), Value::from(next));
        params
            .entry(String::from("page_size"))
            .or_insert_with(|| Value::from(self.page_size));
        Some(params)
    }

    /// Envelope invariants, reported as issues on the offending field.
    pub fn invariant_issues(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        let expected_has_next = self.page < self.pages;
        if self.has_next != expected_has_next {
            issues.push(
                ValidationIssue::new(
                    vec![PathSegment::from("has_next")],
                    format!(
                        "has_next must equal page < pages (page {}, pages {})",
                        self.page, self.pages
                    ),
                )
                .with_expected(expected_has_next.to_string())
                .with_received(self.has_next.to_string()),
            );
        }

        let expected_has_previous = self.page > 1;
        if self.has_previous != expected_has_previous {
            issues.push(
                ValidationIssue::new(
                    vec![PathSegment::from("has_previous")],
                    format!("has_previous must equal page > 1 (page {})", self.page),
                )
                .with_expected(expected_has_previous.to_string())
                .with_received(self.has_previous.to_string()),
            );
        }

        if self.results.len() as u64 > self.page_size {
            issues.push(ValidationIssue::new(
                vec![PathSegment::from("results")],
                format!(
                    "page holds {} result(s) but page_size is {}",
                    self.results.len(),
                    self.page_size
                ),
            ));
        }

        issues
    }

    fn try_map_indexed<U, F>(self, mut f: F) -> Result<Page<U>, ValidationError>
    where
        F: FnMut(usize, T) -> Result<U, ValidationIssue>,
    {
        let mut issues = Vec::new();
        let mut results = Vec::with_capacity(self.results.len());
        for (index, item) in self.results.into_iter().enumerate() {
            match f(index, item) {
                Ok(mapped) => results.push(mapped),
                Err(issue) => issues.push(issue),
            }
        }

        if !issues.is_empty() {
            return Err(ValidationError::new(issues));
        }

        Ok(Page {
            count: self.count,
            page: self.page,
            pages: self.pages,
            page_size: self.page_size,
            has_next: self.has_next,
            has_previous: self.has_previous,
            next_page: self.next_page,
            previous_page: self.previous_page,
            results,
        })
    }
}

//! Runtime schema validation for raw JSON payloads.
//!
//! A [`Shape`] declares what a payload must look like. [`parse`] walks the
//! shape and the payload together, collecting every violated constraint as a
//! [`ValidationIssue`] in traversal order (object fields in declared order,
//! array items by index) instead of stopping at the first one.
//!
//! The value returned on success contains only declared fields: unknown keys
//! are dropped, optional fields absent from the input stay absent, and an
//! explicit `null` on a nullable field is preserved.

use regex::Regex;
use serde_json::{Map, Number, Value};

use crate::error::{PathSegment, ValidationError, ValidationIssue};

/// Declared structure of a JSON value.
#[derive(Debug, Clone)]
pub enum Shape {
    Any,
    Boolean,
    Integer(NumberRules),
    Number(NumberRules),
    String(StringRules),
    Array(ArrayShape),
    Object(ObjectShape),
    Nullable(Box<Shape>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumberRules {
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct StringRules {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<Regex>,
    pub allowed: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct ArrayShape {
    pub item: Box<Shape>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectShape {
    fields: Vec<Field>,
}

impl ObjectShape {
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// Named member of an object shape.
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    shape: Shape,
    required: bool,
}

impl Field {
    pub fn required(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            shape,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            shape,
            required: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub const fn is_required(&self) -> bool {
        self.required
    }
}

impl Shape {
    pub const fn any() -> Self {
        Self::Any
    }

    pub const fn boolean() -> Self {
        Self::Boolean
    }

    pub const fn integer() -> Self {
        Self::Integer(NumberRules {
            minimum: None,
            maximum: None,
        })
    }

    pub const fn number() -> Self {
        Self::Number(NumberRules {
            minimum: None,
            maximum: None,
        })
    }

    pub fn string() -> Self {
        Self::String(StringRules::default())
    }

    /// String restricted to a fixed set of values.
    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::String(StringRules {
            allowed: Some(values.into_iter().map(Into::into).collect()),
            ..StringRules::default()
        })
    }

    pub fn array(item: Shape) -> Self {
        Self::Array(ArrayShape {
            item: Box::new(item),
            min_items: None,
            max_items: None,
        })
    }

    pub fn object<I>(fields: I) -> Self
    where
        I: IntoIterator<Item = Field>,
    {
        Self::Object(ObjectShape {
            fields: fields.into_iter().collect(),
        })
    }

    pub fn nullable(self) -> Self {
        match self {
            Self::Nullable(_) | Self::Any => self,
            other => Self::Nullable(Box::new(other)),
        }
    }

    /// Inclusive lower bound. Only meaningful on numeric shapes.
    pub fn min(self, minimum: f64) -> Self {
        self.map_number_rules(|rules| rules.minimum = Some(minimum))
    }

    /// Inclusive upper bound. Only meaningful on numeric shapes.
    pub fn max(self, maximum: f64) -> Self {
        self.map_number_rules(|rules| rules.maximum = Some(maximum))
    }

    pub fn min_length(self, min_length: usize) -> Self {
        self.map_string_rules(|rules| rules.min_length = Some(min_length))
    }

    pub fn max_length(self, max_length: usize) -> Self {
        self.map_string_rules(|rules| rules.max_length = Some(max_length))
    }

    pub fn pattern(self, pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(pattern)?;
        Ok(self.map_string_rules(|rules| rules.pattern = Some(regex)))
    }

    pub fn min_items(self, min_items: usize) -> Self {
        self.map_array(|array| array.min_items = Some(min_items))
    }

    pub fn max_items(self, max_items: usize) -> Self {
        self.map_array(|array| array.max_items = Some(max_items))
    }

    /// Name reported as `expected` in validation issues.
    pub fn expected_name(&self) -> String {
        match self {
            Self::Any => String::from("any"),
            Self::Boolean => String::from("boolean"),
            Self::Integer(_) => String::from("integer"),
            Self::Number(_) => String::from("number"),
            Self::String(_) => String::from("string"),
            Self::Array(_) => String::from("array"),
            Self::Object(_) => String::from("object"),
            Self::Nullable(inner) => format!("{} | null", inner.expected_name()),
        }
    }

    /// True for object shapes, nullable or not.
    pub fn is_object(&self) -> bool {
        match self {
            Self::Object(_) => true,
            Self::Nullable(inner) => inner.is_object(),
            _ => false,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectShape> {
        match self {
            Self::Object(object) => Some(object),
            Self::Nullable(inner) => inner.as_object(),
            _ => None,
        }
    }

    fn map_number_rules(mut self, apply: impl FnOnce(&mut NumberRules)) -> Self {
        match &mut self {
            Self::Integer(rules) | Self::Number(rules) => apply(rules),
            Self::Nullable(inner) => {
                let updated = std::mem::replace(inner.as_mut(), Self::Any).map_number_rules(apply);
                **inner = updated;
            }
            _ => {}
        }
        self
    }

    fn map_string_rules(mut self, apply: impl FnOnce(&mut StringRules)) -> Self {
        match &mut self {
            Self::String(rules) => apply(rules),
            Self::Nullable(inner) => {
                let updated = std::mem::replace(inner.as_mut(), Self::Any).map_string_rules(apply);
                **inner = updated;
            }
            _ => {}
        }
        self
    }

    fn map_array(mut self, apply: impl FnOnce(&mut ArrayShape)) -> Self {
        match &mut self {
            Self::Array(array) => apply(array),
            Self::Nullable(inner) => {
                let updated = std::mem::replace(inner.as_mut(), Self::Any).map_array(apply);
                **inner = updated;
            }
            _ => {}
        }
        self
    }
}

/// Validates `value` against `shape`, returning the normalized value or every issue found.
pub fn parse(shape: &Shape, value: &Value) -> Result<Value, ValidationError> {
    let mut issues = Vec::new();
    let mut path = Vec::new();
    let parsed = check(shape, value, &mut path, &mut issues);

    if issues.is_empty() {
        Ok(parsed)
    } else {
        Err(ValidationError::new(issues))
    }
}

/// JSON kind name used as `received` in validation issues.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(number) if is_integer(number) => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check(
    shape: &Shape,
    value: &Value,
    path: &mut Vec<PathSegment>,
    issues: &mut Vec<ValidationIssue>,
) -> Value {
    match (shape, value) {
        (Shape::Any, _) => value.clone(),
        (Shape::Nullable(_), Value::Null) => Value::Null,
        (Shape::Nullable(inner), _) => check(inner, value, path, issues),
        (Shape::Boolean, Value::Bool(_)) => value.clone(),
        (Shape::Integer(rules), Value::Number(number)) if is_integer(number) => {
            check_range(rules, number, path, issues);
            value.clone()
        }
        (Shape::Number(rules), Value::Number(number)) => {
            check_range(rules, number, path, issues);
            value.clone()
        }
        (Shape::String(rules), Value::String(text)) => {
            check_string(rules, text, path, issues);
            value.clone()
        }
        (Shape::Array(array), Value::Array(items)) => check_array(array, items, path, issues),
        (Shape::Object(object), Value::Object(map)) => check_object(object, map, path, issues),
        _ => {
            issues.push(type_mismatch(shape, value, path));
            value.clone()
        }
    }
}

fn check_object(
    object: &ObjectShape,
    map: &Map<String, Value>,
    path: &mut Vec<PathSegment>,
    issues: &mut Vec<ValidationIssue>,
) -> Value {
    let mut output = Map::new();

    for field in &object.fields {
        path.push(PathSegment::Key(field.name.clone()));
        match map.get(&field.name) {
            Some(value) => {
                let parsed = check(&field.shape, value, path, issues);
                output.insert(field.name.clone(), parsed);
            }
            None if field.required => {
                issues.push(
                    ValidationIssue::new(path.clone(), "field is required")
                        .with_expected(field.shape.expected_name())
                        .with_received("undefined"),
                );
            }
            None => {}
        }
        path.pop();
    }

    Value::Object(output)
}

fn check_array(
    array: &ArrayShape,
    items: &[Value],
    path: &mut Vec<PathSegment>,
    issues: &mut Vec<ValidationIssue>,
) -> Value {
    if let Some(min_items) = array.min_items {
        if items.len() < min_items {
            issues.push(ValidationIssue::new(
                path.clone(),
                format!("must contain at least {min_items} item(s), received {}", items.len()),
            ));
        }
    }
    if let Some(max_items) = array.max_items {
        if items.len() > max_items {
            issues.push(ValidationIssue::new(
                path.clone(),
                format!("must contain at most {max_items} item(s), received {}", items.len()),
            ));
        }
    }

    let parsed = items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            path.push(PathSegment::Index(index));
            let parsed = check(&array.item, item, path, issues);
            path.pop();
            parsed
        })
        .collect();

    Value::Array(parsed)
}

fn check_range(
    rules: &NumberRules,
    number: &Number,
    path: &[PathSegment],
    issues: &mut Vec<ValidationIssue>,
) {
    let Some(value) = number.as_f64() else {
        return;
    };

    if let Some(minimum) = rules.minimum {
        if value < minimum {
            issues.push(
                ValidationIssue::new(
                    path.to_vec(),
                    format!("must be greater than or equal to {minimum}"),
                )
                .with_received(number.to_string()),
            );
        }
    }
    if let Some(maximum) = rules.maximum {
        if value > maximum {
            issues.push(
                ValidationIssue::new(
                    path.to_vec(),
                    format!("must be less than or equal to {maximum}"),
                )
                .with_received(number.to_string()),
            );
        }
    }
}

fn check_string(
    rules: &StringRules,
    text: &str,
    path: &[PathSegment],
    issues: &mut Vec<ValidationIssue>,
) {
    if let Some(allowed) = &rules.allowed {
        if !allowed.iter().any(|candidate| candidate == text) {
            issues.push(
                ValidationIssue::new(
                    path.to_vec(),
                    format!("must be one of: {}", allowed.join(", ")),
                )
                .with_expected(allowed.join(" | "))
                .with_received(text),
            );
        }
    }

    let length = text.chars().count();
    if let Some(min_length) = rules.min_length {
        if length < min_length {
            issues.push(ValidationIssue::new(
                path.to_vec(),
                format!("must be at least {min_length} character(s) long"),
            ));
        }
    }
    if let Some(max_length) = rules.max_length {
        if length > max_length {
            issues.push(ValidationIssue::new(
                path.to_vec(),
                format!("must be at most {max_length} character(s) long"),
            ));
        }
    }

    if let Some(pattern) = &rules.pattern {
        if !pattern.is_match(text) {
            issues.push(
                ValidationIssue::new(
                    path.to_vec(),
                    format!("does not match pattern {}", pattern.as_str()),
                )
                .with_received(text),
            );
        }
    }
}

fn type_mismatch(shape: &Shape, value: &Value, path: &[PathSegment]) -> ValidationIssue {
    let expected = shape.expected_name();
    let received = value_kind(value);
    ValidationIssue::new(path.to_vec(), format!("expected {expected}, received {received}"))
        .with_expected(expected)
        .with_received(received)
}

/// Whole floats such as `2.0` count as integers.
fn is_integer(number: &Number) -> bool {
    number.is_i64()
        || number.is_u64()
        || number
            .as_f64()
            .is_some_and(|value| value.is_finite() && value.fract() == 0.0)
}

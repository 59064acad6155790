//! Call-argument normalization.
//!
//! Every operation accepts either positional arguments in declared order or a
//! single options object keyed by parameter name. [`CallArgs::infer`] applies
//! the disambiguation rule: exactly one argument that is a JSON object means
//! options form; anything else is positional. Both forms normalize to the
//! same [`ParamMap`].
//!
//! Known limitation: an operation whose only parameter is itself an object
//! (typically a request body) cannot be told apart from the options form by
//! shape alone. For such operations the options reading is kept only when the
//! object is non-empty and every key names a declared parameter; otherwise the
//! object becomes the positional value. Callers that need the positional
//! reading unconditionally wrap the value in [`CallArgs::Positional`].
//!
//! `null` stands for an omitted argument in both forms and is never sent.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::ArgumentError;
use crate::operation::{OperationDescriptor, ParamLocation, ParamSpec};
use crate::schema;

/// Normalized parameters keyed by declared name. Ordered, so two maps with
/// the same entries serialize identically.
pub type ParamMap = BTreeMap<String, Value>;

/// Arguments as supplied by a caller, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum CallArgs {
    Positional(Vec<Value>),
    Options(Map<String, Value>),
}

impl CallArgs {
    pub fn none() -> Self {
        Self::Positional(Vec::new())
    }

    /// Applies the disambiguation rule to a raw argument list.
    pub fn infer(mut args: Vec<Value>) -> Self {
        if args.len() == 1 && args[0].is_object() {
            if let Some(Value::Object(map)) = args.pop() {
                return Self::Options(map);
            }
        }
        Self::Positional(args)
    }

    pub fn options<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self::Options(pairs.into_iter().map(|(key, value)| (key.into(), value)).collect())
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Positional(values) => values.len(),
            Self::Options(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CallArgs {
    fn default() -> Self {
        Self::none()
    }
}

impl From<Vec<Value>> for CallArgs {
    fn from(args: Vec<Value>) -> Self {
        Self::infer(args)
    }
}

impl From<Value> for CallArgs {
    fn from(arg: Value) -> Self {
        Self::infer(vec![arg])
    }
}

impl From<()> for CallArgs {
    fn from(_: ()) -> Self {
        Self::none()
    }
}

/// Resolves `args` against the descriptor's declared parameters.
pub fn normalize(descriptor: &OperationDescriptor, args: CallArgs) -> Result<ParamMap, ArgumentError> {
    let operation = descriptor.qualified_name();
    let specs = descriptor.params();

    let supplied: Vec<(String, Value)> = match args {
        CallArgs::Positional(values) => {
            if values.len() > specs.len() {
                return Err(ArgumentError::TooManyArguments {
                    operation,
                    expected: specs.len(),
                    received: values.len(),
                });
            }
            specs
                .iter()
                .zip(values)
                .map(|(spec, value)| (spec.name().to_owned(), value))
                .collect()
        }
        CallArgs::Options(map) => options_to_pairs(descriptor, map)?,
    };

    let mut params = ParamMap::new();
    for (name, value) in supplied {
        if value.is_null() {
            continue;
        }
        let Some(spec) = descriptor.param_spec(&name) else {
            return Err(ArgumentError::UnknownParameter { operation, name });
        };
        let checked = check_value(&operation, spec, value)?;
        params.insert(name, checked);
    }

    if let Some(missing) = specs
        .iter()
        .find(|spec| spec.is_required() && !params.contains_key(spec.name()))
    {
        return Err(ArgumentError::MissingParameter {
            operation,
            name: missing.name().to_owned(),
        });
    }

    Ok(params)
}

fn options_to_pairs(
    descriptor: &OperationDescriptor,
    map: Map<String, Value>,
) -> Result<Vec<(String, Value)>, ArgumentError> {
    let all_declared = map.keys().all(|key| descriptor.param_spec(key).is_some());

    if let [only] = descriptor.params() {
        if only.is_object_typed() && (map.is_empty() || !all_declared) {
            tracing::debug!(
                operation = %descriptor.qualified_name(),
                param = only.name(),
                "object argument does not name declared parameters; using it as the positional value"
            );
            return Ok(vec![(only.name().to_owned(), Value::Object(map))]);
        }
    }

    if !all_declared {
        let name = map
            .keys()
            .find(|key| descriptor.param_spec(key).is_none())
            .cloned()
            .unwrap_or_default();
        return Err(ArgumentError::UnknownParameter {
            operation: descriptor.qualified_name(),
            name,
        });
    }

    Ok(map.into_iter().collect())
}

fn check_value(operation: &str, spec: &ParamSpec, value: Value) -> Result<Value, ArgumentError> {
    if spec.location() == ParamLocation::Path && (value.is_object() || value.is_array()) {
        return Err(ArgumentError::InvalidParameterType {
            operation: operation.to_owned(),
            name: spec.name().to_owned(),
            detail: format!("path parameters must be scalar, received {}", schema::value_kind(&value)),
        });
    }

    schema::parse(spec.shape(), &value).map_err(|error| match spec.location() {
        ParamLocation::Body => ArgumentError::InvalidBody {
            operation: operation.to_owned(),
            issues: error.into_issues(),
        },
        ParamLocation::Path | ParamLocation::Query => ArgumentError::InvalidParameterType {
            operation: operation.to_owned(),
            name: spec.name().to_owned(),
            detail: error
                .issues()
                .first()
                .map(ToString::to_string)
                .unwrap_or_else(|| String::from("invalid value")),
        },
    })
}

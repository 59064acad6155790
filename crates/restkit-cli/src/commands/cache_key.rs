use restkit_core::{CacheKey, ParamMap};
use serde_json::{json, Value};

use crate::cli::CacheKeyArgs;
use crate::error::CliError;

pub fn run(args: &CacheKeyArgs) -> Result<Value, CliError> {
    let params = match args.params.as_deref() {
        Some(raw) => parse_params(raw)?,
        None => ParamMap::new(),
    };

    let key = CacheKey::new(format!("{}.{}", args.resource, args.operation), &params);
    Ok(json!({
        "key": key.to_string(),
        "scope": key.scope(),
        "params": key.params(),
    }))
}

fn parse_params(raw: &str) -> Result<ParamMap, CliError> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map.into_iter().filter(|(_, value)| !value.is_null()).collect()),
        other => Err(CliError::Command(format!(
            "parameters must be a JSON object, received {other}"
        ))),
    }
}

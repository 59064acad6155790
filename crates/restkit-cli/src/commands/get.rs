use restkit_core::{ClientConfig, HttpMethod, Page, ParamMap, SendOptions, Shape, Transport};
use serde_json::Value;

use crate::cli::GetArgs;
use crate::error::CliError;

pub async fn run(args: &GetArgs, config: &ClientConfig) -> Result<Value, CliError> {
    let query = parse_query(&args.query)?;
    let transport = Transport::new(config);

    tracing::debug!(path = %args.path, params = query.len(), "sending GET");
    let payload = transport
        .send(HttpMethod::Get, &args.path, SendOptions::default().with_query(query))
        .await?;

    if !args.page {
        return Ok(payload);
    }

    let page = Page::decode(&payload, &Shape::Any)?;
    Ok(serde_json::to_value(page)?)
}

/// `name=value` pairs; repeated names collect into an array.
fn parse_query(pairs: &[String]) -> Result<ParamMap, CliError> {
    let mut query = ParamMap::new();
    for pair in pairs {
        let Some((name, value)) = pair.split_once('=') else {
            return Err(CliError::Command(format!(
                "query parameter '{pair}' must have the form name=value"
            )));
        };
        if name.is_empty() {
            return Err(CliError::Command(format!(
                "query parameter '{pair}' has an empty name"
            )));
        }

        let value = Value::String(value.to_owned());
        match query.get_mut(name) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                query.insert(name.to_owned(), value);
            }
        }
    }
    Ok(query)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn repeated_names_collect_into_array() {
        let query = parse_query(&[
            String::from("page=2"),
            String::from("tag=a"),
            String::from("tag=b"),
            String::from("search=a=b"),
        ])
        .expect("valid pairs");

        assert_eq!(query.get("page"), Some(&json!("2")));
        assert_eq!(query.get("tag"), Some(&json!(["a", "b"])));
        assert_eq!(query.get("search"), Some(&json!("a=b")));
    }

    #[test]
    fn rejects_pair_without_separator() {
        let err = parse_query(&[String::from("page")]).expect_err("missing '='");
        assert_eq!(err.exit_code(), 2);
    }
}

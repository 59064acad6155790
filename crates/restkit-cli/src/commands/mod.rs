mod cache_key;
mod get;

use restkit_core::ClientConfig;
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub async fn run(cli: &Cli) -> Result<Value, CliError> {
    match &cli.command {
        Command::Get(args) => get::run(args, &client_config(cli)?).await,
        Command::CacheKey(args) => cache_key::run(args),
    }
}

/// Global flags layered over the `RESTKIT_*` environment.
fn client_config(cli: &Cli) -> Result<ClientConfig, CliError> {
    let mut config = match &cli.base_url {
        Some(base_url) => ClientConfig::from_env_with_base_url(base_url)?,
        None => ClientConfig::from_env()?,
    };
    if let Some(timeout_ms) = cli.timeout_ms {
        config = config.with_timeout_ms(timeout_ms)?;
    }
    Ok(config)
}

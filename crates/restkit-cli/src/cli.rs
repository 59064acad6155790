//! CLI argument definitions for restkit.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `get` | Raw GET against the configured API, optionally decoded as a page |
//! | `cache-key` | Print the cache key derived for an operation call |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--base-url` | `$RESTKIT_BASE_URL` | API base URL |
//! | `--timeout-ms` | `10000` | Request timeout in ms |
//! | `--pretty` | `false` | Pretty-print JSON output |
//!
//! # Examples
//!
//! ```bash
//! restkit --base-url http://127.0.0.1:8000 get /shop/products/ --query page=2 --page
//! restkit cache-key products list '{"page_size":10,"page":2}'
//! ```

use clap::{Args, Parser, Subcommand};

/// restkit - inspect REST APIs through the typed client runtime.
#[derive(Debug, Parser)]
#[command(
    name = "restkit",
    author,
    version,
    about = "Inspect REST APIs through the restkit client runtime"
)]
pub struct Cli {
    /// API base URL. Falls back to RESTKIT_BASE_URL.
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Request timeout in milliseconds.
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send a GET request and print the JSON payload.
    ///
    /// # Examples
    ///
    ///   restkit get /shop/products/7/
    ///   restkit get /shop/products/ --query page=2 --query page_size=10 --page
    Get(GetArgs),

    /// Print the cache key for an operation and its parameters.
    ///
    /// # Examples
    ///
    ///   restkit cache-key products list
    ///   restkit cache-key products retrieve '{"id":7}'
    CacheKey(CacheKeyArgs),
}

/// Arguments for the `get` command.
#[derive(Debug, Args)]
pub struct GetArgs {
    /// Request path, e.g. /shop/products/.
    pub path: String,

    /// Query parameter as name=value. Repeat for several parameters.
    #[arg(long = "query", short = 'q', value_name = "NAME=VALUE")]
    pub query: Vec<String>,

    /// Decode and validate the response as a pagination envelope.
    #[arg(long, default_value_t = false)]
    pub page: bool,
}

/// Arguments for the `cache-key` command.
#[derive(Debug, Args)]
pub struct CacheKeyArgs {
    /// Resource name, e.g. products.
    pub resource: String,

    /// Operation name, e.g. list.
    pub operation: String,

    /// Parameters as a JSON object.
    pub params: Option<String>,
}

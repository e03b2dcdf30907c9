use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "squadline")]
#[command(about = "Squadline cache CLI: inspect and manage the shared cache")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to ./squadline.toml when present)
    #[arg(short, long, global = true, env = "SQUADLINE_CONFIG")]
    pub config: Option<String>,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check that the cache store responds
    Health,
    /// Show hit/miss counters, key count and memory usage
    Stats,
    /// Read a cached JSON value
    Get(KeyArgs),
    /// Delete a cached key
    Delete(KeyArgs),
    /// Delete every key matching a glob pattern (e.g. "user:42:*")
    Invalidate(InvalidateArgs),
    /// Delete cached data for a user (also drops every session)
    InvalidateUser(InvalidateUserArgs),
    /// Count one request against a rate-limit key and show the decision
    RateLimit(RateLimitArgs),
    /// Remove every key in the cache database
    Clear(ClearArgs),
}

#[derive(clap::Args)]
pub struct KeyArgs {
    /// Logical key
    pub key: String,
    /// Key prefix (e.g. "session:")
    #[arg(long)]
    pub prefix: Option<String>,
}

#[derive(clap::Args)]
pub struct InvalidateArgs {
    /// Glob pattern
    pub pattern: String,
}

#[derive(clap::Args)]
pub struct InvalidateUserArgs {
    /// User id
    pub user_id: String,
}

#[derive(clap::Args)]
pub struct RateLimitArgs {
    /// Rate-limit key (e.g. "rl:login:10.0.0.1")
    pub key: String,
    /// Requests allowed per window
    #[arg(long, default_value_t = 100)]
    pub limit: u64,
    /// Window length in seconds
    #[arg(long, default_value_t = 60)]
    pub window: u64,
}

#[derive(clap::Args)]
pub struct ClearArgs {
    /// Skip the confirmation check
    #[arg(long)]
    pub yes: bool,
}

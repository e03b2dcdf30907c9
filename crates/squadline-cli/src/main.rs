mod cli;
mod commands;
mod output;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Commands};
use output::print_error;
use squadline_cache::config::loader;

#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            print_error(&format!("{e:#}"));
            std::process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when the command ran but the cache is unhealthy.
async fn run() -> Result<bool> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let format = cli.format.unwrap_or_default();

    squadline_cache::init_tracing_with_level("warn");
    let config = loader::load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    if std::env::var_os("RUST_LOG").is_none() {
        squadline_cache::apply_logging_level(&config.logging.level);
    }
    tracing::debug!(backend = %config.cache.backend, url = %config.redis.url, "configuration loaded");

    let cache = squadline_cache::create_cache_service(&config)
        .await
        .context("Failed to create cache service")?;

    let result = match &cli.command {
        Commands::Health => commands::server::health(&cache, format).await,
        Commands::Stats => commands::server::stats(&cache, format).await.map(|_| true),
        Commands::Get(args) => commands::keys::get(&cache, &args.key, args.prefix.as_deref())
            .await
            .map(|_| true),
        Commands::Delete(args) => commands::keys::delete(&cache, &args.key, args.prefix.as_deref())
            .await
            .map(|_| true),
        Commands::Invalidate(args) => commands::keys::invalidate(&cache, &args.pattern)
            .await
            .map(|_| true),
        Commands::InvalidateUser(args) => commands::keys::invalidate_user(&cache, &args.user_id)
            .await
            .map(|_| true),
        Commands::RateLimit(args) => commands::keys::rate_limit(&cache, args, format)
            .await
            .map(|_| true),
        Commands::Clear(args) => commands::keys::clear(&cache, args.yes).await.map(|_| true),
    };

    cache.close().await;
    result
}

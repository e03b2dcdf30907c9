use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::Value;
use squadline_cache::{CacheService, build_key};

use crate::cli::{OutputFormat, RateLimitArgs};
use crate::output::{print_json, print_success};

pub async fn get(cache: &CacheService, key: &str, prefix: Option<&str>) -> Result<()> {
    let full = build_key(key, prefix);
    let value = cache
        .get::<Value>(key, prefix)
        .await
        .with_context(|| format!("Cached value for {full} is not JSON"))?;
    match value {
        Some(value) => {
            let ttl = cache.get_ttl(key, prefix).await;
            println!("{} {} (ttl: {})", "Key:".cyan(), full.cyan(), describe_ttl(ttl));
            print_json(&value)
        }
        None => anyhow::bail!("Key not found: {full}"),
    }
}

pub async fn delete(cache: &CacheService, key: &str, prefix: Option<&str>) -> Result<()> {
    let full = build_key(key, prefix);
    if cache.delete(key, prefix).await {
        print_success(&format!("Deleted {full}"));
    } else {
        println!("{} {} did not exist", "-".yellow(), full);
    }
    Ok(())
}

pub async fn invalidate(cache: &CacheService, pattern: &str) -> Result<()> {
    let removed = cache.invalidate_pattern(pattern).await;
    print_success(&format!("Removed {removed} key(s) matching {pattern}"));
    Ok(())
}

pub async fn invalidate_user(cache: &CacheService, user_id: &str) -> Result<()> {
    let removed = cache.invalidate_user_data(user_id).await;
    print_success(&format!("Removed {removed} key(s) for user {user_id}"));
    println!(
        "  {}",
        "Note: all sessions are invalidated, not only this user's.".yellow()
    );
    Ok(())
}

pub async fn rate_limit(cache: &CacheService, args: &RateLimitArgs, format: OutputFormat) -> Result<()> {
    let decision = cache.check_rate_limit(&args.key, args.limit, args.window).await;
    if matches!(format, OutputFormat::Json) {
        return print_json(&decision);
    }
    let verdict = if decision.allowed {
        "allowed".green()
    } else {
        "rejected".red()
    };
    println!("{}: {}", "Decision".cyan(), verdict);
    println!("{}: {}/{}", "Remaining".cyan(), decision.remaining, decision.limit);
    println!("{}: {}", "Resets at".cyan(), decision.reset_time);
    Ok(())
}

pub async fn clear(cache: &CacheService, confirmed: bool) -> Result<()> {
    if !confirmed {
        anyhow::bail!("Refusing to clear the cache without --yes");
    }
    if !cache.is_ready() {
        anyhow::bail!("Cache store is not connected");
    }
    cache.clear_all().await;
    print_success("Cache cleared");
    Ok(())
}

fn describe_ttl(ttl: i64) -> String {
    match ttl {
        -2 => "expired".to_string(),
        t if t < 0 => "none".to_string(),
        t => format!("{t}s"),
    }
}

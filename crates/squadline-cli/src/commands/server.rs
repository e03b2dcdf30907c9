use anyhow::Result;
use colored::Colorize;
use squadline_cache::CacheService;

use crate::cli::OutputFormat;
use crate::output::{print_json, print_stats};

pub async fn health(cache: &CacheService, format: OutputFormat) -> Result<bool> {
    let report = cache.health_check().await;
    if matches!(format, OutputFormat::Json) {
        print_json(&report)?;
    } else if report.is_healthy() {
        println!(
            "{} {} store is {}",
            "✓".green(),
            report.backend.cyan(),
            "healthy".green()
        );
        println!("  {}", report.details);
    } else {
        println!(
            "{} {} store is {} ({})",
            "✗".red(),
            report.backend.cyan(),
            "unhealthy".red(),
            report.state
        );
        println!("  {}", report.details);
    }
    Ok(report.is_healthy())
}

pub async fn stats(cache: &CacheService, format: OutputFormat) -> Result<()> {
    let stats = cache.get_stats().await;
    print_stats(&stats, format)
}

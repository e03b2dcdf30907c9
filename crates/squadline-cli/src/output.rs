use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use squadline_cache::CacheStats;
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::cli::OutputFormat;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_stats(stats: &CacheStats, format: OutputFormat) -> Result<()> {
    if matches!(format, OutputFormat::Json) {
        return print_json(stats);
    }
    let mut builder = Builder::default();
    builder.push_record(["Metric", "Value"]);
    builder.push_record(["Hits".to_string(), stats.hits.to_string()]);
    builder.push_record(["Misses".to_string(), stats.misses.to_string()]);
    builder.push_record(["Hit rate".to_string(), format!("{:.1}%", stats.hit_rate())]);
    builder.push_record(["Keys".to_string(), stats.key_count.to_string()]);
    builder.push_record(["Memory".to_string(), format_bytes(stats.memory_usage)]);
    builder.push_record(["Uptime".to_string(), format!("{}s", stats.uptime_secs)]);
    println!("{}", builder.build().with(Style::rounded()));
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }
}

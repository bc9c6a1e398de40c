// crates/host/src/log.rs

//! Subscriber setup plus colored console output for human-facing results.
//!
//! Events from the search go through `tracing`. The helpers below only
//! print summaries the user asked for (reports, tables) to stdout.

use anyhow::{anyhow, Result};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use toolpref_core::sink::SearchReport;

use crate::config::{LogFormat, LoggingConfig};

// ANSI color codes
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const MAGENTA: &str = "\x1b[35m";

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let level = parse_level(&config.level)?;
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = match config.format {
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
        LogFormat::Pretty => builder.compact().try_init(),
    };
    installed.map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))
}

pub fn parse_level(level: &str) -> Result<Level> {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(anyhow!(
            "invalid log level '{}': expected trace, debug, info, warn or error",
            other
        )),
    }
}

pub fn section(title: &str) {
    println!("\n{}{}{}{}", BOLD, CYAN, title, RESET);
}

pub fn row(label: &str, value: &str) {
    println!("  {}{:<24}{} {}", DIM, label, RESET, value);
}

pub fn done(msg: &str) {
    println!("{}{}✓ {}{}", BOLD, GREEN, msg, RESET);
}

pub fn warn(msg: &str) {
    println!("{}⚠ {}{}", YELLOW, msg, RESET);
}

/// Print the final report of a search.
pub fn report(report: &SearchReport) {
    section("Search report");
    row("generations", &format!("{} ({} complete)", report.generations, report.complete_generations));
    match &report.termination {
        Some(t) => row("terminated", &format!("{} at generation {}", t.reason, t.generation)),
        None => row("terminated", "did not finish"),
    }
    row("seed", &report.seed.to_string());
    row("queries", &report.query_fingerprint);
    if let Some(baseline) = &report.baseline {
        row("baseline rate", &format_rate(baseline.rate()));
    }

    if report.best.is_empty() {
        warn("no complete generation, nothing to rank");
        return;
    }

    section("Best candidates");
    for (i, ranked) in report.best.iter().enumerate() {
        let c = &ranked.candidate;
        println!(
            "  {}{}. {}{} {}{}{} gen {} [{}] {}",
            BOLD,
            i + 1,
            c.id(),
            RESET,
            MAGENTA,
            format_rate(ranked.rate()),
            RESET,
            c.generation(),
            c.strategy(),
            c.name()
        );
        println!("     {}{}{}", DIM, truncate(c.description(), 160), RESET);
    }

    section("Best rate per strategy");
    for (strategy, rate) in &report.strategy_best {
        row(strategy.as_str(), &format_rate(*rate));
    }
}

pub fn format_rate(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}

/// Truncate on a char boundary.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("INFO").unwrap(), Level::INFO);
        assert!(parse_level("verbose").is_err());
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("héllo", 10), "héllo");
        assert_eq!(truncate("héllo wörld", 5), "héllo...");
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(0.25), "25.0%");
    }
}

//! dvdrw CLI

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context};
use dvdrw::{CassetteLoader, Config, MatcherSet};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("dvdrw v{}", env!("CARGO_PKG_VERSION"));
        eprintln!();
        eprintln!("Usage: dvdrw <command> [options]");
        eprintln!();
        eprintln!("Commands:");
        eprintln!("  stats <cassette.json> [config.toml]   Show cassette statistics");
        eprintln!("  check <config.toml>                   Validate a configuration file");
        process::exit(1);
    }

    let command = &args[1];

    let result = match command.as_str() {
        "stats" => {
            if args.len() < 3 {
                eprintln!("Usage: dvdrw stats <cassette.json> [config.toml]");
                process::exit(1);
            }
            show_stats(&PathBuf::from(&args[2]), args.get(3).map(Path::new))
        }
        "check" => {
            if args.len() < 3 {
                eprintln!("Usage: dvdrw check <config.toml>");
                process::exit(1);
            }
            check_config(Path::new(&args[2]))
        }
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'dvdrw' for usage information.");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn show_stats(path: &Path, config: Option<&Path>) -> anyhow::Result<()> {
    if !path.is_file() {
        bail!("Cassette not found: {}", path.display());
    }

    let matchers = match config {
        Some(config) => Config::from_file(config)
            .with_context(|| format!("loading {}", config.display()))?
            .matcher_set(),
        None => MatcherSet::default(),
    };

    let cassette = CassetteLoader::new(path, matchers.clone())
        .load()
        .with_context(|| format!("loading {}", path.display()))?;
    let stats = cassette.stats();

    println!("Cassette: {}", path.display());
    println!(
        "Matchers: {}",
        matchers
            .features()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!();
    println!("Entries:      {}", stats.entries);
    println!("  responses:  {}", stats.responses);
    println!("  exceptions: {}", stats.exceptions);
    println!("Buckets:      {}", stats.buckets);
    println!("Largest:      {}", stats.largest_bucket);

    Ok(())
}

fn check_config(path: &Path) -> anyhow::Result<()> {
    let config = Config::from_file(path).with_context(|| format!("loading {}", path.display()))?;

    println!("Configuration OK: {}", path.display());
    println!("  cassette_dir:   {}", config.cassette_dir.display());
    println!("  match_on:       {:?}", config.matching.match_on);
    println!("  filter_headers: {:?}", config.redaction.filter_headers);
    println!("  max_cassettes:  {}", config.limits.max_cassettes);
    println!("  timeout:        {:?}", config.request_timeout());

    Ok(())
}

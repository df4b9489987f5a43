//! Command implementations.

use std::io;
use std::time::Duration;

use anyhow::Context;
use clap::CommandFactory;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::client::CacheClient;
use crate::config::{format_duration, parse_duration, DepotConfig};
use crate::error::{DepotError, Result};
use crate::store::EntryStore;

use super::args::{Cli, ClearArgs, Commands, GetArgs, ListArgs};

/// Dispatch the parsed CLI to its command implementation.
pub fn dispatch(cli: &Cli) -> Result<()> {
    let config = resolve_config(cli)?;

    match &cli.command {
        Commands::Get(args) => get(args, &config, cli.quiet),
        Commands::List(args) => list(args, &config),
        Commands::Stats => stats(&config),
        Commands::Clear(args) => clear(args, &config),
        Commands::Completions(args) => {
            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "depot", &mut io::stdout());
            Ok(())
        }
    }
}

/// Merge environment configuration with CLI overrides.
///
/// Flags are env-bound through clap, so a flag that was left unset still
/// carries the environment value; explicit flags win either way.
fn resolve_config(cli: &Cli) -> Result<DepotConfig> {
    let mut config = DepotConfig::from_env()?;

    if let Some(root) = &cli.cache_root {
        config.cache_root = root.clone();
    }
    if let Some(root) = &cli.offline_root {
        config.offline_root = Some(root.clone());
    }
    if let Some(host) = &cli.insecure_host {
        config.insecure_host = Some(host.clone());
    }
    if let Some(value) = &cli.fresh_for {
        config.fresh_for = parse_duration(value).ok_or_else(|| DepotError::ConfigInvalid {
            message: format!("--fresh-for is not a duration: '{}'", value),
        })?;
    }

    config.validate()?;
    Ok(config)
}

fn get(args: &GetArgs, config: &DepotConfig, quiet: bool) -> Result<()> {
    let client = CacheClient::create(config)?;

    let spinner = if quiet || !console::user_attended_stderr() {
        ProgressBar::hidden()
    } else {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner.set_message(format!("Resolving {}", args.uri));
        spinner
    };

    let result = if args.refresh {
        client.refresh(&args.uri)
    } else {
        client.get(&args.uri)
    };
    spinner.finish_and_clear();

    let path = result?;

    // The path is the contract: keep stdout clean for scripts.
    println!("{}", path.display());
    Ok(())
}

fn list(args: &ListArgs, config: &DepotConfig) -> Result<()> {
    let store = EntryStore::new(&config.cache_root, config.lock_wait);
    let entries = store.list()?;

    if args.json {
        let json = serde_json::to_string_pretty(&entries).context("serializing cache entries")?;
        println!("{}", json);
        return Ok(());
    }

    if entries.is_empty() {
        println!("Cache is empty");
        return Ok(());
    }

    println!("{} cached entries:\n", entries.len());
    for entry in entries {
        let age = chrono::Utc::now().signed_duration_since(entry.cached_at);
        let age = format_duration(Duration::from_secs(age.num_seconds().max(0) as u64));

        if args.verbose {
            println!("  {}", style(&entry.uri).bold());
            println!("    Age: {}", age);
            println!("    Size: {} bytes", entry.size_bytes);
            println!("    sha256: {}", entry.sha256);
            if let Some(etag) = &entry.validator.etag {
                println!("    ETag: {}", etag);
            }
            if let Some(last_modified) = &entry.validator.last_modified {
                println!("    Last-Modified: {}", last_modified);
            }
            println!();
        } else {
            println!("  {} [{}] {} bytes", entry.uri, age, entry.size_bytes);
        }
    }

    Ok(())
}

fn stats(config: &DepotConfig) -> Result<()> {
    let store = EntryStore::new(&config.cache_root, config.lock_wait);
    let entries = store.list()?;
    let total_size = store.total_size()?;

    let backend = match &config.offline_root {
        Some(root) if crate::offline::OfflineCache::available(root) => "offline",
        _ => "online",
    };

    println!("Cache statistics:\n");
    println!("  Backend: {}", backend);
    println!("  Entries: {}", entries.len());
    println!("  Total size: {} bytes", total_size);
    println!("  Location: {}", store.root().display());
    if let Some(root) = &config.offline_root {
        println!("  Offline root: {}", root.display());
    }

    Ok(())
}

fn clear(args: &ClearArgs, config: &DepotConfig) -> Result<()> {
    let store = EntryStore::new(&config.cache_root, config.lock_wait);
    let entries = store.list()?;

    if entries.is_empty() {
        println!("Cache is already empty");
        return Ok(());
    }

    if !args.force && console::user_attended() {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!("Clear {} cached entries?", entries.len()))
            .default(false)
            .interact()
            .map_err(|e| DepotError::Other(anyhow::Error::new(e).context("confirmation prompt")))?;

        if !confirmed {
            println!("Cancelled");
            return Ok(());
        }
    }

    let cleared = store.clear()?;
    println!(
        "{} Cleared {} entries",
        style("✓").green(),
        cleared
    );

    Ok(())
}

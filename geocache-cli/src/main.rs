//! geocache CLI
//!
//! Command-line interface for the address-to-coordinate cache.

mod config;
mod input;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use geocache_batch::{BatchResolver, BatchSummary, PersistMode};
use geocache_cache::{CacheHandle, CoordinateCache};
use geocache_core::traits::{CacheStore, LoadedCache};
use geocache_core::types::Address;
use geocache_kakao::KakaoGeocoder;
use geocache_resolver::{Resolution, Resolver, Source};
use geocache_store::{CorruptPolicy, FileStore, MemoryStore};

use crate::config::{parse_fallback, AppConfig};

/// geocache - address to coordinate resolution cache
#[derive(Parser)]
#[command(name = "geocache")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Cache file (overrides GEOCACHE_FILE)
    #[arg(long, global = true)]
    cache_file: Option<PathBuf>,

    /// What to do with a corrupt cache file: abort or start-empty
    #[arg(long, global = true)]
    on_corrupt: Option<CorruptPolicy>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a single address
    Resolve {
        /// Full address
        #[arg(conflicts_with = "region", required_unless_present = "region")]
        address: Option<String>,
        /// Region column (province or metropolitan city)
        #[arg(long)]
        region: Option<String>,
        /// Sub-region column
        #[arg(long, requires = "region")]
        subregion: Option<String>,
        /// Kakao REST API key (overrides KAKAO_API_KEY)
        #[arg(long)]
        api_key: Option<String>,
        /// Fallback coordinate: none, korea-center, or lat,lon
        #[arg(long)]
        fallback: Option<String>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve every address in a file
    Batch {
        /// Input file: one address per line, or region<TAB>subregion
        input: PathBuf,
        /// Maximum concurrent lookups
        #[arg(short, long)]
        workers: Option<usize>,
        /// Pause after each submitted lookup, in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,
        /// When to save: batch or every-write
        #[arg(long)]
        persist: Option<PersistMode>,
        /// Kakao REST API key (overrides KAKAO_API_KEY)
        #[arg(long)]
        api_key: Option<String>,
        /// Fallback coordinate: none, korea-center, or lat,lon
        #[arg(long)]
        fallback: Option<String>,
        /// Resolve without writing the cache file
        #[arg(long)]
        dry_run: bool,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show cache statistics
    Stats {
        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove entries so they are looked up again
    Prune {
        /// Remove every unresolved entry
        #[arg(long, conflicts_with = "address", required_unless_present = "address")]
        unresolved: bool,
        /// Remove a single address
        address: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json);

    let mut config = AppConfig::from_env().context("Invalid environment configuration")?;
    if let Some(path) = cli.cache_file {
        config.cache_file = path;
    }
    if let Some(policy) = cli.on_corrupt {
        config.on_corrupt = policy;
    }

    match cli.command {
        Commands::Resolve {
            address,
            region,
            subregion,
            api_key,
            fallback,
            json,
        } => {
            apply_lookup_overrides(&mut config, api_key, fallback)?;
            let address = match (address, region) {
                (Some(raw), _) => Address::parse(&raw)?,
                (None, Some(region)) => Address::from_parts(&region, subregion.as_deref().unwrap_or(""))?,
                (None, None) => bail!("Provide an ADDRESS or --region"),
            };
            cmd_resolve(&config, address, json).await
        }
        Commands::Batch {
            input,
            workers,
            delay_ms,
            persist,
            api_key,
            fallback,
            dry_run,
            json,
        } => {
            apply_lookup_overrides(&mut config, api_key, fallback)?;
            if let Some(workers) = workers {
                config.max_workers = workers;
            }
            if let Some(delay_ms) = delay_ms {
                config.delay_ms = delay_ms;
            }
            if let Some(persist) = persist {
                config.persist = persist;
            }
            cmd_batch(&config, &input, dry_run, json).await
        }
        Commands::Stats { json } => cmd_stats(&config, json).await,
        Commands::Prune { unresolved, address } => cmd_prune(&config, unresolved, address).await,
    }
}

fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        "geocache=debug,info"
    } else {
        "geocache=info,warn"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    // Logs go to stderr so --json output stays machine-readable.
    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn apply_lookup_overrides(config: &mut AppConfig, api_key: Option<String>, fallback: Option<String>) -> Result<()> {
    if let Some(key) = api_key {
        config.api_key = Some(key);
    }
    if let Some(raw) = fallback {
        config.fallback = parse_fallback(&raw).context("--fallback")?;
    }
    Ok(())
}

/// Loads the cache file, applying the configured corrupt-file policy.
async fn open_store(config: &AppConfig) -> Result<(FileStore, LoadedCache)> {
    let store = FileStore::new(&config.cache_file);
    let loaded = store
        .load_with_policy(config.on_corrupt)
        .await
        .with_context(|| format!("Failed to load cache from {}", config.cache_file.display()))?;

    if !loaded.quarantined.is_empty() {
        eprintln!(
            "{} {} malformed entr{} skipped (they will be dropped on the next save)",
            "⚠️ ".yellow(),
            loaded.quarantined.len(),
            if loaded.quarantined.len() == 1 { "y" } else { "ies" }
        );
    }

    Ok((store, loaded))
}

fn build_resolver(config: &AppConfig) -> Result<Resolver> {
    let kakao = KakaoGeocoder::with_config(config.kakao()?).context("Failed to create Kakao client")?;
    Ok(Resolver::with_config(Arc::new(kakao), config.resolver()))
}

fn source_label(source: &Source) -> String {
    match source {
        Source::Cache => "cache".into(),
        Source::Remote => "remote".into(),
        Source::Fallback(reason) => format!("fallback ({})", reason.kind()),
    }
}

/// Resolve a single address
async fn cmd_resolve(config: &AppConfig, address: Address, json: bool) -> Result<()> {
    let (store, loaded) = open_store(config).await?;
    let cache = CoordinateCache::from_entries(loaded.entries);

    // Cached answers need no API key.
    let resolution = match cache.get(address.as_str()) {
        Some(coordinate) => Resolution {
            address,
            coordinate,
            source: Source::Cache,
        },
        None => {
            let resolver = build_resolver(config)?;
            let resolution = resolver.resolve_detailed(&address, &cache).await;
            if cache.is_dirty() {
                store
                    .save(&cache.snapshot())
                    .await
                    .with_context(|| format!("Failed to save cache to {}", store.path().display()))?;
            }
            resolution
        }
    };

    if json {
        let out = json!({
            "address": resolution.address,
            "coordinate": resolution.coordinate,
            "source": source_label(&resolution.source),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{} {}", "📍 Address:".cyan().bold(), resolution.address);
    match resolution.coordinate.point() {
        Some(point) => println!("   {} {}", "Coordinate:".green(), point),
        None => println!("   {} {}", "Coordinate:".yellow(), "unresolved".yellow()),
    }
    println!("   {} {}", "Source:".green(), source_label(&resolution.source));

    Ok(())
}

/// Resolve every address in an input file
async fn cmd_batch(config: &AppConfig, input: &Path, dry_run: bool, json: bool) -> Result<()> {
    let text = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let parsed = input::parse_lines(&text);

    for rejected in &parsed.rejected {
        warn!(line = rejected.line, reason = %rejected.reason, "Skipping input line");
    }
    if parsed.addresses.is_empty() {
        println!("{}", "⚠️  No addresses in input.".yellow());
        return Ok(());
    }

    let (file_store, loaded) = open_store(config).await?;
    let store: Arc<dyn CacheStore> = if dry_run {
        Arc::new(MemoryStore::with_entries(loaded.entries.clone()))
    } else {
        Arc::new(file_store)
    };
    let cache: CacheHandle = CoordinateCache::from_entries(loaded.entries).into_handle();

    let resolver = Arc::new(build_resolver(config)?);
    let batch = BatchResolver::with_config(resolver, store, config.batch().progress_interval(1));

    let cancel = batch.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; finishing in-flight lookups and saving");
            cancel.cancel();
        }
    });

    if !json {
        println!(
            "{} {} address(es) from {}",
            "🔎 Resolving".cyan().bold(),
            parsed.addresses.len(),
            input.display()
        );
    }

    let pb = if json { ProgressBar::hidden() } else { ProgressBar::new(0) };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("#>-"),
    );

    let bar = pb.clone();
    let summary = batch
        .resolve_batch_with_progress(
            &parsed.addresses,
            &cache,
            Box::new(move |progress| {
                bar.set_length(progress.total);
                bar.set_position(progress.completed);
                bar.set_message(format!("{} fallback", progress.fallbacks));
            }),
        )
        .await
        .context("Batch failed; newly fetched coordinates were not saved")?;

    pb.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary, config, dry_run, parsed.rejected.len());
    }

    Ok(())
}

fn print_summary(summary: &BatchSummary, config: &AppConfig, dry_run: bool, rejected: usize) {
    if summary.cancelled {
        println!("\n{}", "⚠️  Batch cancelled".yellow().bold());
    } else {
        println!("\n{}", "✅ Batch complete".green().bold());
    }

    println!("   {} {}", "Requested:".green(), summary.requested);
    println!("   {} {}", "Already cached:".green(), summary.already_cached);
    println!(
        "   {} {} ({} resolved, {} fallback)",
        "Fetched:".green(),
        summary.fetched,
        summary.resolved,
        summary.fallbacks
    );
    for (reason, count) in &summary.fallback_reasons {
        println!("      {} {}", format!("{}:", reason).yellow(), count);
    }
    if summary.skipped > 0 {
        println!("   {} {}", "Skipped:".yellow(), summary.skipped);
    }
    if rejected > 0 {
        println!("   {} {}", "Invalid input lines:".yellow(), rejected);
    }
    println!(
        "   {} {:.1}s ({:.2}/s)",
        "Duration:".green(),
        summary.duration_ms as f64 / 1000.0,
        summary.rate()
    );

    if dry_run {
        println!("   {}", "Dry run: cache file not written".yellow());
    } else if summary.saves > 0 {
        println!("   {} {}", "Saved to:".green(), config.cache_file.display());
    }
}

/// Show cache statistics
async fn cmd_stats(config: &AppConfig, json: bool) -> Result<()> {
    let (_, loaded) = open_store(config).await?;
    let quarantined = loaded.quarantined.len();
    let stats = CoordinateCache::from_entries(loaded.entries).stats();

    if json {
        let out = json!({
            "path": config.cache_file.display().to_string(),
            "total_entries": stats.total_entries,
            "resolved_entries": stats.resolved_entries,
            "unresolved_entries": stats.unresolved_entries,
            "quarantined_entries": quarantined,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{} {}", "📊 Cache:".cyan().bold(), config.cache_file.display());
    println!("   {} {}", "Entries:".green(), stats.total_entries);
    println!("   {} {}", "Resolved:".green(), stats.resolved_entries);
    println!("   {} {}", "Unresolved:".yellow(), stats.unresolved_entries);
    if quarantined > 0 {
        println!("   {} {}", "Malformed:".red(), quarantined);
    }

    Ok(())
}

/// Remove entries from the cache
async fn cmd_prune(config: &AppConfig, unresolved: bool, address: Option<String>) -> Result<()> {
    let (store, loaded) = open_store(config).await?;
    let cache = CoordinateCache::from_entries(loaded.entries);

    let removed = match address {
        Some(raw) if !unresolved => {
            let address = Address::parse(&raw)?;
            usize::from(cache.remove(address.as_str()).is_some())
        }
        _ => cache.prune_unresolved(),
    };

    if removed == 0 {
        println!("{}", "Nothing to prune.".yellow());
        return Ok(());
    }

    store
        .save(&cache.snapshot())
        .await
        .with_context(|| format!("Failed to save cache to {}", store.path().display()))?;

    println!(
        "{} {} entr{} removed from {}",
        "✅".green(),
        removed,
        if removed == 1 { "y" } else { "ies" },
        config.cache_file.display()
    );

    Ok(())
}

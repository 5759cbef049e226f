use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use door_core::{cache::CacheDb, config::Config, paths};
use door_server::lifecycle;
use std::path::Path;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum CacheSubcommand {
    /// Fetch every manifest asset into a new cache generation
    Install {
        /// Generation to install (default: cache.generation from config)
        #[arg(long)]
        generation: Option<u64>,
    },

    /// Serve the newest installed generation and purge older ones
    Activate,

    /// Show installed generations
    Status,
}

pub fn run(root: &Path, subcmd: CacheSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        CacheSubcommand::Install { generation } => install(root, generation, json),
        CacheSubcommand::Activate => activate(root, json),
        CacheSubcommand::Status => status(root, json),
    }
}

fn open(root: &Path) -> anyhow::Result<Arc<CacheDb>> {
    let path = paths::cache_db_path(root);
    let db = CacheDb::open(&path)
        .with_context(|| format!("failed to open cache store {}", path.display()))?;
    Ok(Arc::new(db))
}

// ---------------------------------------------------------------------------
// install
// ---------------------------------------------------------------------------

fn install(root: &Path, generation: Option<u64>, json: bool) -> anyhow::Result<()> {
    let mut config = Config::load_valid(root).context("failed to load config")?;
    if let Some(g) = generation {
        config.cache.generation = g;
    }
    let cache = open(root)?;
    let base = lifecycle::parse_base_url(&config.server.base_url)?;
    let client = reqwest::Client::builder()
        .timeout(config.server.request_timeout())
        .build()?;

    let rt = tokio::runtime::Runtime::new()?;
    let info = rt.block_on(lifecycle::install(&cache, &client, &base, &config.cache))?;

    if json {
        return print_json(&info);
    }
    println!("Installed {} ({} assets).", info.tag, info.entries);
    println!("Run `door cache activate` to start serving it.");
    Ok(())
}

// ---------------------------------------------------------------------------
// activate
// ---------------------------------------------------------------------------

fn activate(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let cache = open(root)?;
    let report = cache.activate()?;

    if json {
        return print_json(&report);
    }
    println!("Active: {}", report.active.tag(&config.cache.name));
    for g in &report.purged {
        println!("  purged: {}", g.tag(&config.cache.name));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

fn status(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let cache = open(root)?;
    let status = cache.status()?;

    if json {
        return print_json(&status);
    }
    match status.active {
        Some(g) => println!("Active: {}", g.tag(&config.cache.name)),
        None => println!("Active: (none)"),
    }
    if status.generations.is_empty() {
        println!("No generations installed.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = status
        .generations
        .iter()
        .map(|g| {
            vec![
                g.tag.clone(),
                g.entries.to_string(),
                g.installed_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            ]
        })
        .collect();
    print_table(&["GENERATION", "ASSETS", "INSTALLED"], &rows);
    Ok(())
}

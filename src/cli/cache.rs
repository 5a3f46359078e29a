//! Cache maintenance commands.

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::cache::CacheStore;
use crate::config::Settings;

#[derive(Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    action: CacheAction,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show entry count and size
    Stats,
    /// Delete every cached response
    Clear,
}

pub fn run(args: CacheArgs, settings: &Settings) -> Result<()> {
    let store = CacheStore::open(&settings.cache_dir, settings.cache_backend)?;
    match args.action {
        CacheAction::Stats => {
            let stats = store.stats()?;
            println!("Cache: {}", stats.location.display());
            println!("  Backend: {:?}", settings.cache_backend);
            println!("  Entries: {}", stats.entries);
            println!("  Bytes: {}", stats.bytes);
        }
        CacheAction::Clear => {
            let removed = store.clear()?;
            println!("Removed {} cache entries from {}", removed, store.location().display());
        }
    }
    Ok(())
}

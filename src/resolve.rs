//! `invr resolve <name>`: run the resolver cascade against the current
//! registry and show which stage matched.

use anyhow::Result;

use inventory_reconcile_core::log::TracingSink;
use inventory_reconcile_core::normalize::normalize;
use inventory_reconcile_core::store::Store;
use inventory_reconcile_core::{IdentityIndex, ResolutionResult, Resolver};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

pub async fn run_resolve(config: &Config, name: &str) -> Result<()> {
    let store = SqliteStore::new(db::connect(config).await?);
    let users = store.fetch_users().await?;
    let index = IdentityIndex::build(&users, &TracingSink);
    let resolution = Resolver::new(&index)
        .with_tie_break(config.matching.token_tiebreak)
        .resolve(Some(name));

    println!("input: {}", name);
    println!("normalized: {}", normalize(name));
    match &resolution.result {
        ResolutionResult::Resolved(id) => {
            println!(
                "resolved: {} ({})",
                id,
                index.display_name(*id).unwrap_or_default()
            );
        }
        ResolutionResult::Unresolved => println!("unresolved"),
        ResolutionResult::Ambiguous(ids) => {
            println!("ambiguous:");
            for id in ids {
                println!("  {} ({})", id, index.display_name(*id).unwrap_or_default());
            }
        }
    }
    if let Some(stage) = resolution.stage {
        println!("stage: {}", stage.as_str());
    }
    if let Some(score) = resolution.score {
        println!("score: {:.2}", score);
    }
    store.pool().close().await;
    Ok(())
}

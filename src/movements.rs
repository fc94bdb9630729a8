//! `invr lend | transfer | write-off | return | trace | history`.

use anyhow::Result;
use chrono::NaiveDate;

use inventory_reconcile_core::log::TracingSink;
use inventory_reconcile_core::models::{ItemId, TraceEntry, UserId};
use inventory_reconcile_core::movements::{MovementReceipt, Movements};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// One movement request from the command line.
pub enum MovementCommand {
    Lend {
        to: i64,
        until: NaiveDate,
    },
    Transfer {
        to: i64,
    },
    WriteOff {
        reason: String,
    },
    Return,
}

pub async fn run_movement(
    config: &Config,
    item: i64,
    as_user: i64,
    command: MovementCommand,
    notes: Option<String>,
) -> Result<()> {
    let store = SqliteStore::new(db::connect(config).await?);
    let movements = Movements::new(&store, &TracingSink);
    let (item, actor, notes) = (ItemId(item), UserId(as_user), notes.as_deref());

    let receipt = match command {
        MovementCommand::Lend { to, until } => {
            movements.lend(item, actor, UserId(to), until, notes).await?
        }
        MovementCommand::Transfer { to } => {
            movements.transfer(item, actor, UserId(to), notes).await?
        }
        MovementCommand::WriteOff { reason } => {
            movements.write_off(item, actor, &reason, notes).await?
        }
        MovementCommand::Return => movements.return_loan(item, actor, notes).await?,
    };

    print_receipt(&receipt);
    store.pool().close().await;
    Ok(())
}

fn print_receipt(receipt: &MovementReceipt) {
    println!("{} {}", receipt.action.as_str(), receipt.inventory_code);
    if let Some(description) = &receipt.description {
        println!("  item: {}", description);
    }
    println!("  {}", receipt.detail);
    println!("  owner: {}", receipt.owner);
    println!("ok");
}

pub async fn run_trace(config: &Config, item: i64, as_user: i64) -> Result<()> {
    let store = SqliteStore::new(db::connect(config).await?);
    let entries = Movements::new(&store, &TracingSink)
        .item_history(ItemId(item), UserId(as_user))
        .await?;

    println!("trace of item {} ({} entries)", item, entries.len());
    print_entries(&entries);
    store.pool().close().await;
    Ok(())
}

pub async fn run_history(config: &Config, as_user: i64) -> Result<()> {
    let store = SqliteStore::new(db::connect(config).await?);
    let entries = Movements::new(&store, &TracingSink)
        .user_history(UserId(as_user))
        .await?;

    println!("movements by user {} ({} entries)", as_user, entries.len());
    print_entries(&entries);
    store.pool().close().await;
    Ok(())
}

fn print_entries(entries: &[TraceEntry]) {
    for entry in entries {
        println!(
            "{}  {:<11} {:<10} {}",
            entry.at.format("%Y-%m-%d %H:%M"),
            entry.action,
            entry.inventory_code.as_deref().unwrap_or("-"),
            entry.detail.as_deref().unwrap_or_default()
        );
        if let Some(name) = &entry.acting_user_name {
            println!("{:>18} {}", "by", name);
        }
    }
}

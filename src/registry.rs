//! `invr users add | users list | locations add`.

use anyhow::{bail, Result};

use inventory_reconcile_core::log::TracingSink;
use inventory_reconcile_core::models::{NewUser, Role};
use inventory_reconcile_core::registry;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

pub async fn run_add_user(
    config: &Config,
    code: String,
    name: String,
    email: String,
    role: &str,
    school: Option<i64>,
) -> Result<()> {
    let Some(role) = Role::parse(role) else {
        bail!("Unknown role: '{}'. Must be director or profesor.", role);
    };

    let store = SqliteStore::new(db::connect(config).await?);
    let user = NewUser {
        code,
        name,
        email,
        role,
        school_id: school.or(config.import.school_id),
    };
    let id = registry::add_user(&store, user, &TracingSink).await?;
    println!("user {} added", id);
    store.pool().close().await;
    Ok(())
}

pub async fn run_list_users(config: &Config) -> Result<()> {
    let store = SqliteStore::new(db::connect(config).await?);
    let users = store.list_users().await?;

    if users.is_empty() {
        println!("No users registered.");
    } else {
        println!(
            "{:<6} {:<10} {:<32} {:<10} {}",
            "ID", "CODE", "NAME", "ROLE", "EMAIL"
        );
        for u in &users {
            println!(
                "{:<6} {:<10} {:<32} {:<10} {}{}",
                u.id,
                u.code,
                u.name,
                u.role,
                u.email,
                if u.active { "" } else { "  (inactive)" }
            );
        }
    }
    store.pool().close().await;
    Ok(())
}

pub async fn run_add_location(config: &Config, name: &str) -> Result<()> {
    let store = SqliteStore::new(db::connect(config).await?);
    let id = registry::add_location(&store, name, &TracingSink).await?;
    println!("location {} added: {}", id, name.trim());
    store.pool().close().await;
    Ok(())
}

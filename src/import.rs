//! `invr import`: read a sheet, reconcile it against the registry, and
//! upsert it with an import trace entry per item.
//!
//! Output is one JSON document on stdout, success or failure:
//!
//! ```json
//! {"status":"ok","processedCount":12,"unresolvedLocations":[],"unresolvedUsers":["..."],"rejected":1}
//! {"status":"error","kind":"conflict","message":"...","names":["...","..."]}
//! ```

use std::path::Path;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use inventory_reconcile_core::error::{LedgerError, LedgerResult};
use inventory_reconcile_core::log::TracingSink;
use inventory_reconcile_core::models::{ImportRecord, UserId};
use inventory_reconcile_core::reconcile::{ImportSummary, Reconciler};

use crate::config::Config;
use crate::db;
use crate::sheet;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Serialize)]
pub struct ErrorOutput<'a> {
    status: &'static str,
    kind: &'static str,
    message: String,
    names: &'a [String],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DryRunOutput {
    status: &'static str,
    dry_run: bool,
    processed_count: usize,
    rejected: usize,
    unresolved_locations: Vec<String>,
    unresolved_users: Vec<String>,
    records: Vec<ImportRecord>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ImportOutput {
    Imported(ImportSummary),
    DryRun(DryRunOutput),
}

/// The error half of the output contract.
pub fn error_output(err: &LedgerError) -> ErrorOutput<'_> {
    ErrorOutput {
        status: "error",
        kind: err.kind(),
        message: err.to_string(),
        names: err.names(),
    }
}

pub async fn run_import(config: &Config, file: &Path, as_user: i64, dry_run: bool) -> Result<()> {
    match import_file(config, file, UserId(as_user), dry_run).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(err) => {
            println!("{}", serde_json::to_string_pretty(&error_output(&err))?);
            Err(err.into())
        }
    }
}

async fn import_file(
    config: &Config,
    file: &Path,
    requester: UserId,
    dry_run: bool,
) -> LedgerResult<ImportOutput> {
    let reconcile_config = config
        .reconcile()
        .map_err(|e| LedgerError::validation(format!("{:#}", e)))?;

    let loaded = sheet::load_sheet(file, config.import.header_row)?;
    tracing::info!(
        file = %file.display(),
        rows = loaded.batch.rows.len(),
        sha256 = %loaded.sha256,
        "sheet loaded"
    );

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let reconciler = Reconciler::new(&store, &reconcile_config, &TracingSink);

    let output = if dry_run {
        let report = reconciler.reconcile(&loaded.batch, requester).await?;
        ImportOutput::DryRun(DryRunOutput {
            status: "ok",
            dry_run: true,
            processed_count: report.records.len(),
            rejected: report.rejected,
            unresolved_locations: report.unresolved_locations.into_iter().collect(),
            unresolved_users: report.unresolved_users.into_iter().collect(),
            records: report.records,
        })
    } else {
        let provenance = json!({
            "batch_id": Uuid::new_v4().to_string(),
            "sha256": loaded.sha256,
            "imported_at": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        });
        let summary = reconciler
            .import(&loaded.batch, requester, provenance)
            .await?;
        ImportOutput::Imported(summary)
    };

    store.pool().close().await;
    Ok(output)
}

//! Import reconciliation: cleansed spreadsheet rows in, upsert-ready
//! records plus an unresolved-entity report out.
//!
//! One call works against one fresh registry snapshot: the requester is
//! checked first, then all users are fetched once and indexed, and every
//! row is resolved in memory against that index. Location names hit the
//! store at most once per distinct name.
//!
//! The batch is rejected wholesale when the resolved receivers are not a
//! single user equal to the requester. Per-row misses never fail the
//! batch; they are dropped or reported.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;

use crate::cleanse::{self, CategoryTable};
use crate::error::{LedgerError, LedgerResult};
use crate::index::IdentityIndex;
use crate::log::LogSink;
use crate::models::{
    CanonicalUser, ImportBatch, ImportRecord, RawRow, TraceAction, TraceDraft, UserId,
};
use crate::resolve::{Resolution, ResolutionResult, Resolver, TieBreak};
use crate::store::Store;

/// Policy knobs for one import, taken from configuration.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub categories: CategoryTable,
    /// Used when a received-date cell does not parse.
    pub default_date: NaiveDate,
    /// Stamped on every record.
    pub school_id: Option<i64>,
    pub tie_break: TieBreak,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub records: Vec<ImportRecord>,
    pub unresolved_locations: BTreeSet<String>,
    pub unresolved_users: BTreeSet<String>,
    /// Rows dropped: bad inventory code, unresolved receiver, or
    /// superseded by a later row with the same code.
    pub rejected: usize,
    /// Source line of each record, parallel to `records`.
    #[serde(skip)]
    pub lines: Vec<usize>,
}

/// The success half of the import output contract.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub status: &'static str,
    pub processed_count: usize,
    pub unresolved_locations: Vec<String>,
    pub unresolved_users: Vec<String>,
    pub rejected: usize,
}

struct KeptRow {
    record: ImportRecord,
    receiver_raw: String,
    line: usize,
}

pub struct Reconciler<'a> {
    store: &'a dyn Store,
    config: &'a ReconcileConfig,
    log: &'a dyn LogSink,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn Store, config: &'a ReconcileConfig, log: &'a dyn LogSink) -> Self {
        Self { store, config, log }
    }

    /// Resolve and cleanse `batch` for `requester` without writing anything.
    pub async fn reconcile(
        &self,
        batch: &ImportBatch,
        requester: UserId,
    ) -> LedgerResult<ReconcileReport> {
        let requester = self
            .store
            .fetch_user(requester)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("user {} not found", requester)))?;

        let users = self.store.fetch_users().await?;
        let index = IdentityIndex::build(&users, self.log);
        let resolver = Resolver::new(&index).with_tie_break(self.config.tie_break);

        self.log.info(
            "import_started",
            &[
                ("source", batch.source_name.clone()),
                ("rows", batch.rows.len().to_string()),
                ("registry_users", index.len().to_string()),
                ("requester", requester.id.to_string()),
            ],
        );

        let mut report = ReconcileReport::default();
        let mut locations: HashMap<String, Option<i64>> = HashMap::new();
        let mut kept: Vec<KeptRow> = Vec::new();

        for row in &batch.rows {
            let Some(inventory_code) = cleanse::inventory_code(row.inventory_code.as_deref())
            else {
                self.log.warn(
                    "row_rejected",
                    &[
                        ("line", row.line.to_string()),
                        ("reason", "invalid inventory code".to_string()),
                        ("value", row.inventory_code.clone().unwrap_or_default()),
                    ],
                );
                report.rejected += 1;
                continue;
            };

            let receiver_raw = cleanse::clean_text(row.received_by.as_deref());
            let receiver = resolver.resolve(receiver_raw.as_deref());
            self.trace_resolution("received_by", receiver_raw.as_deref(), &receiver, row);
            let Some(received_by) = receiver.result.user() else {
                self.log.warn(
                    "receiver_unresolved",
                    &[
                        ("line", row.line.to_string()),
                        ("name", receiver_raw.clone().unwrap_or_default()),
                    ],
                );
                if let Some(raw) = receiver_raw {
                    report.unresolved_users.insert(raw);
                }
                report.rejected += 1;
                continue;
            };

            let deliverer_raw = cleanse::clean_text(row.delivered_by.as_deref());
            let deliverer = resolver.resolve(deliverer_raw.as_deref());
            self.trace_resolution("delivered_by", deliverer_raw.as_deref(), &deliverer, row);
            let delivered_by = deliverer.result.user();
            if delivered_by.is_none() {
                if let Some(raw) = &deliverer_raw {
                    report.unresolved_users.insert(raw.clone());
                }
            }

            let location_id = match cleanse::clean_text(row.location.as_deref()) {
                Some(name) => {
                    let key = name.to_lowercase();
                    let id = match locations.get(&key) {
                        Some(cached) => *cached,
                        None => {
                            let found = self.store.find_location_id(&name).await?;
                            locations.insert(key, found);
                            found
                        }
                    };
                    if id.is_none() {
                        report.unresolved_locations.insert(name);
                    }
                    id
                }
                None => None,
            };

            kept.push(KeptRow {
                record: self.build_record(
                    batch,
                    row,
                    inventory_code,
                    received_by,
                    delivered_by,
                    location_id,
                ),
                receiver_raw: receiver_raw.unwrap_or_default(),
                line: row.line,
            });
        }

        if let Err(err) = check_single_uploader(&kept, &requester) {
            self.log.warn(
                "uploader_conflict",
                &[
                    ("requester", requester.id.to_string()),
                    ("names", err.names().join(" | ")),
                ],
            );
            return Err(err);
        }

        let mut positions: HashMap<String, usize> = HashMap::new();
        for row in kept {
            match positions.get(&row.record.inventory_code) {
                Some(&pos) => {
                    self.log.warn(
                        "duplicate_inventory_code",
                        &[
                            ("code", row.record.inventory_code.clone()),
                            ("line", row.line.to_string()),
                            ("replaces_line", report.lines[pos].to_string()),
                        ],
                    );
                    report.records[pos] = row.record;
                    report.lines[pos] = row.line;
                    report.rejected += 1;
                }
                None => {
                    positions.insert(row.record.inventory_code.clone(), report.records.len());
                    report.records.push(row.record);
                    report.lines.push(row.line);
                }
            }
        }

        self.log.info(
            "import_reconciled",
            &[
                ("records", report.records.len().to_string()),
                ("rejected", report.rejected.to_string()),
                ("unresolved_users", report.unresolved_users.len().to_string()),
                (
                    "unresolved_locations",
                    report.unresolved_locations.len().to_string(),
                ),
            ],
        );

        Ok(report)
    }

    /// Reconcile `batch` and persist it as one all-or-nothing upsert with
    /// an import trace entry per item. `provenance` is attached to every
    /// trace entry's metadata (batch id, file digest, ...).
    pub async fn import(
        &self,
        batch: &ImportBatch,
        requester: UserId,
        provenance: serde_json::Value,
    ) -> LedgerResult<ImportSummary> {
        let report = self.reconcile(batch, requester).await?;

        if !report.records.is_empty() {
            let writes: Vec<(ImportRecord, TraceDraft)> = report
                .records
                .iter()
                .zip(&report.lines)
                .map(|(record, line)| {
                    let draft = TraceDraft::now(
                        TraceAction::Import,
                        format!(
                            "Importación del activo {} desde {}",
                            record.inventory_code, batch.source_name
                        ),
                        requester,
                        json!({
                            "source": batch.source_name,
                            "line": line,
                            "provenance": provenance,
                        }),
                    );
                    (record.clone(), draft)
                })
                .collect();

            self.store
                .upsert_inventory(&writes)
                .await
                .map_err(LedgerError::Persistence)?;

            self.log.info(
                "import_persisted",
                &[
                    ("source", batch.source_name.clone()),
                    ("records", writes.len().to_string()),
                ],
            );
        }

        Ok(ImportSummary {
            status: "ok",
            processed_count: report.records.len(),
            unresolved_locations: report.unresolved_locations.into_iter().collect(),
            unresolved_users: report.unresolved_users.into_iter().collect(),
            rejected: report.rejected,
        })
    }

    fn build_record(
        &self,
        batch: &ImportBatch,
        row: &RawRow,
        inventory_code: String,
        received_by: UserId,
        delivered_by: Option<UserId>,
        location_id: Option<i64>,
    ) -> ImportRecord {
        let (received_date, defaulted) =
            cleanse::parse_date_or(row.received_date.as_deref(), self.config.default_date);
        if defaulted {
            self.log.debug(
                "date_defaulted",
                &[
                    ("line", row.line.to_string()),
                    ("value", row.received_date.clone().unwrap_or_default()),
                ],
            );
        }

        let category_id = if batch.has_category_column {
            self.config.categories.from_label(row.category.as_deref())
        } else {
            self.config.categories.from_file_name(&batch.source_name)
        };

        ImportRecord {
            inventory_code,
            description: cleanse::clean_text(row.description.as_deref()),
            brand: cleanse::clean_text(row.brand.as_deref()),
            value: cleanse::parse_value(row.value.as_deref()),
            received_date,
            category_id,
            location_id,
            delivered_by,
            received_by,
            school_id: self.config.school_id,
        }
    }

    fn trace_resolution(
        &self,
        field: &'static str,
        raw: Option<&str>,
        resolution: &Resolution,
        row: &RawRow,
    ) {
        let Some(raw) = raw else { return };
        let outcome = match &resolution.result {
            ResolutionResult::Resolved(id) => id.to_string(),
            ResolutionResult::Unresolved => "unresolved".to_string(),
            ResolutionResult::Ambiguous(ids) => format!(
                "ambiguous:{}",
                ids.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(",")
            ),
        };
        self.log.debug(
            "name_resolution",
            &[
                ("line", row.line.to_string()),
                ("field", field.to_string()),
                ("name", raw.to_string()),
                (
                    "stage",
                    resolution.stage.map(|s| s.as_str()).unwrap_or("-").to_string(),
                ),
                ("outcome", outcome),
            ],
        );
    }
}

/// Every kept row must name the same receiver, and that receiver must be
/// the requester. Violations carry the offending raw names.
fn check_single_uploader(kept: &[KeptRow], requester: &CanonicalUser) -> LedgerResult<()> {
    let mut receivers: BTreeMap<UserId, String> = BTreeMap::new();
    for row in kept {
        receivers
            .entry(row.record.received_by)
            .or_insert_with(|| row.receiver_raw.clone());
    }

    if receivers.len() > 1 {
        return Err(LedgerError::Conflict {
            message: format!(
                "the file declares {} different receivers; a batch must have a single receiver",
                receivers.len()
            ),
            names: receivers.into_values().collect(),
        });
    }

    match receivers.into_iter().next() {
        Some((id, raw)) if id != requester.id => Err(LedgerError::Conflict {
            message: format!(
                "receiver '{}' in the file does not match the uploading user '{}'",
                raw, requester.display_name
            ),
            names: vec![raw, requester.display_name.clone()],
        }),
        _ => Ok(()),
    }
}

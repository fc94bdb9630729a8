//! Core data models shared by the reconciler, the movement operations,
//! and every [`Store`](crate::store::Store) backend.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Registry identity of a user (`usuarios.id`).
///
/// Values only ever come from the registry; there is no "zero means no
/// match" convention anywhere in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Primary key of a stored inventory item (`inventario_items.id`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub i64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user as seen by name resolution: an id and the display name the
/// registry holds for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalUser {
    pub id: UserId,
    pub display_name: String,
}

impl CanonicalUser {
    pub fn new(id: i64, display_name: impl Into<String>) -> Self {
        Self {
            id: UserId(id),
            display_name: display_name.into(),
        }
    }
}

/// Registry roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Director,
    Profesor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Director => "director",
            Role::Profesor => "profesor",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "director" => Some(Role::Director),
            "profesor" => Some(Role::Profesor),
            _ => None,
        }
    }
}

/// A user to be inserted into the registry.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub code: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub school_id: Option<i64>,
}

/// One spreadsheet row after the parsing boundary has mapped columns to
/// fields. Every field is optional; the reconciler decides what is
/// required.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based line in the source file, for diagnostics.
    pub line: usize,
    pub inventory_code: Option<String>,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub value: Option<String>,
    pub received_date: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub delivered_by: Option<String>,
    pub received_by: Option<String>,
}

/// A parsed sheet handed to the reconciler.
#[derive(Debug, Clone, Default)]
pub struct ImportBatch {
    /// File name the rows came from. Used for category inference and
    /// recorded in trace metadata.
    pub source_name: String,
    /// Whether the sheet carried a category column at all.
    pub has_category_column: bool,
    pub rows: Vec<RawRow>,
}

/// One cleaned, resolved row ready for upsert keyed by `inventory_code`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRecord {
    pub inventory_code: String,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub value: Decimal,
    pub received_date: NaiveDate,
    pub category_id: i64,
    pub location_id: Option<i64>,
    pub delivered_by: Option<UserId>,
    pub received_by: UserId,
    pub school_id: Option<i64>,
}

/// An inventory item as stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub id: ItemId,
    pub inventory_code: String,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub value: Decimal,
    pub received_date: NaiveDate,
    pub category_id: Option<i64>,
    pub location_id: Option<i64>,
    pub delivered_by: Option<UserId>,
    pub received_by: Option<UserId>,
    pub school_id: Option<i64>,
}

/// Lifecycle actions recorded in the trace log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceAction {
    Import,
    Loan,
    Transfer,
    WriteOff,
    Return,
}

impl TraceAction {
    /// Stored label (`inventario_trazabilidad.accion`).
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceAction::Import => "importacion",
            TraceAction::Loan => "prestamo",
            TraceAction::Transfer => "traslado",
            TraceAction::WriteOff => "baja",
            TraceAction::Return => "devolucion",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "importacion" => Some(TraceAction::Import),
            "prestamo" => Some(TraceAction::Loan),
            "traslado" => Some(TraceAction::Transfer),
            "baja" => Some(TraceAction::WriteOff),
            "devolucion" => Some(TraceAction::Return),
            _ => None,
        }
    }
}

impl fmt::Display for TraceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trace entry before the store assigns it an id and an item.
#[derive(Debug, Clone)]
pub struct TraceDraft {
    pub at: DateTime<Utc>,
    pub action: TraceAction,
    pub detail: String,
    pub acting_user: UserId,
    pub metadata: serde_json::Value,
}

impl TraceDraft {
    pub fn now(
        action: TraceAction,
        detail: impl Into<String>,
        acting_user: UserId,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            at: Utc::now(),
            action,
            detail: detail.into(),
            acting_user,
            metadata,
        }
    }
}

/// An append-only audit row, as returned by trace queries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEntry {
    pub id: i64,
    pub inventory_id: ItemId,
    pub at: DateTime<Utc>,
    pub action: String,
    pub detail: Option<String>,
    pub acting_user: Option<UserId>,
    pub metadata: Option<serde_json::Value>,
    /// Display name of the acting user, when the query joins it.
    pub acting_user_name: Option<String>,
    /// Inventory code of the item, when the query joins it.
    pub inventory_code: Option<String>,
    pub description: Option<String>,
}

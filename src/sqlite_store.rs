//! SQLite-backed [`Store`] implementation.
//!
//! Multi-statement writes (the import upsert, transfers) run inside one
//! transaction; dropping the transaction on an early `?` rolls it back.
//! Dates are stored as `YYYY-MM-DD` text, timestamps as RFC 3339 with
//! microseconds so that text order equals time order, and money as the
//! decimal's canonical string.

use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use inventory_reconcile_core::models::{
    CanonicalUser, ImportRecord, InventoryItem, ItemId, NewUser, TraceDraft, TraceEntry, UserId,
};
use inventory_reconcile_core::store::Store;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite implementation of the [`Store`] trait over the `usuarios`,
/// `edificios`, `inventario_items` and `inventario_trazabilidad` tables.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Every user, active or not, for `invr users list`.
    pub async fn list_users(&self) -> Result<Vec<UserRow>> {
        let rows = sqlx::query(
            "SELECT id, codigo, nombre, email, rol, escuela_id, activo FROM usuarios ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<UserRow> {
                Ok(UserRow {
                    id: UserId(row.try_get("id")?),
                    code: row.try_get("codigo")?,
                    name: row.try_get("nombre")?,
                    email: row.try_get("email")?,
                    role: row.try_get("rol")?,
                    school_id: row.try_get("escuela_id")?,
                    active: row.try_get::<i64, _>("activo")? != 0,
                })
            })
            .collect()
    }
}

/// A registry row as listed by the CLI.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRow {
    pub id: UserId,
    pub code: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub school_id: Option<i64>,
    pub active: bool,
}

fn format_ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("bad timestamp in store: {}", s))?
        .with_timezone(&Utc))
}

fn canonical_from_row(row: &SqliteRow) -> Result<CanonicalUser> {
    Ok(CanonicalUser::new(
        row.try_get::<i64, _>("id")?,
        row.try_get::<String, _>("nombre")?,
    ))
}

fn item_from_row(row: &SqliteRow) -> Result<InventoryItem> {
    let value: String = row.try_get("valor")?;
    let received: String = row.try_get("fecha_recibido")?;
    Ok(InventoryItem {
        id: ItemId(row.try_get("id")?),
        inventory_code: row.try_get("inventario")?,
        description: row.try_get("descripcion")?,
        brand: row.try_get("marca")?,
        value: Decimal::from_str(&value).with_context(|| format!("bad value in store: {}", value))?,
        received_date: NaiveDate::parse_from_str(&received, DATE_FORMAT)
            .with_context(|| format!("bad date in store: {}", received))?,
        category_id: row.try_get("categoria_id")?,
        location_id: row.try_get("ubicacion_id")?,
        delivered_by: row.try_get::<Option<i64>, _>("entregado_por_id")?.map(UserId),
        received_by: row.try_get::<Option<i64>, _>("recibido_por_id")?.map(UserId),
        school_id: row.try_get("escuela_id")?,
    })
}

fn trace_from_row(row: &SqliteRow) -> Result<TraceEntry> {
    let at: String = row.try_get("fecha")?;
    let meta: Option<String> = row.try_get("meta")?;
    Ok(TraceEntry {
        id: row.try_get("id")?,
        inventory_id: ItemId(row.try_get("inventario_id")?),
        at: parse_ts(&at)?,
        action: row.try_get("accion")?,
        detail: row.try_get("detalle")?,
        acting_user: row.try_get::<Option<i64>, _>("usuario_id")?.map(UserId),
        metadata: meta.map(|m| serde_json::from_str(&m)).transpose()?,
        acting_user_name: row.try_get("usuario_nombre")?,
        inventory_code: row.try_get("inventario")?,
        description: row.try_get("descripcion")?,
    })
}

const TRACE_SELECT: &str = r#"
    SELECT t.id, t.inventario_id, t.fecha, t.accion, t.detalle, t.usuario_id, t.meta,
           u.nombre AS usuario_nombre, i.inventario, i.descripcion
    FROM inventario_trazabilidad t
    JOIN inventario_items i ON i.id = t.inventario_id
    LEFT JOIN usuarios u ON u.id = t.usuario_id
"#;

async fn insert_trace(
    tx: &mut Transaction<'_, Sqlite>,
    item: ItemId,
    draft: &TraceDraft,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO inventario_trazabilidad (inventario_id, fecha, accion, detalle, usuario_id, meta)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(item.0)
    .bind(format_ts(&draft.at))
    .bind(draft.action.as_str())
    .bind(&draft.detail)
    .bind(draft.acting_user.0)
    .bind(serde_json::to_string(&draft.metadata)?)
    .execute(&mut **tx)
    .await?;
    Ok(result.last_insert_rowid())
}

#[async_trait]
impl Store for SqliteStore {
    async fn fetch_users(&self) -> Result<Vec<CanonicalUser>> {
        let rows = sqlx::query("SELECT id, nombre FROM usuarios WHERE activo = 1 ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(canonical_from_row).collect()
    }

    async fn fetch_user(&self, id: UserId) -> Result<Option<CanonicalUser>> {
        let row = sqlx::query("SELECT id, nombre FROM usuarios WHERE id = ? AND activo = 1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(canonical_from_row).transpose()
    }

    async fn find_location_id(&self, name: &str) -> Result<Option<i64>> {
        let id: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM edificios WHERE lower(trim(nombre)) = lower(trim(?)) ORDER BY id LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    async fn upsert_inventory(&self, batch: &[(ImportRecord, TraceDraft)]) -> Result<Vec<ItemId>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(batch.len());

        for (record, draft) in batch {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO inventario_items (inventario, descripcion, marca, valor, fecha_recibido,
                                              categoria_id, ubicacion_id, entregado_por_id,
                                              recibido_por_id, escuela_id)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(inventario) DO UPDATE SET
                    descripcion = excluded.descripcion,
                    marca = excluded.marca,
                    valor = excluded.valor,
                    fecha_recibido = excluded.fecha_recibido,
                    categoria_id = excluded.categoria_id,
                    ubicacion_id = excluded.ubicacion_id,
                    entregado_por_id = excluded.entregado_por_id,
                    recibido_por_id = excluded.recibido_por_id,
                    escuela_id = excluded.escuela_id
                RETURNING id
                "#,
            )
            .bind(&record.inventory_code)
            .bind(&record.description)
            .bind(&record.brand)
            .bind(record.value.to_string())
            .bind(record.received_date.format(DATE_FORMAT).to_string())
            .bind(record.category_id)
            .bind(record.location_id)
            .bind(record.delivered_by.map(|u| u.0))
            .bind(record.received_by.0)
            .bind(record.school_id)
            .fetch_one(&mut *tx)
            .await
            .with_context(|| format!("upsert of inventory code {}", record.inventory_code))?;

            let item = ItemId(id);
            insert_trace(&mut tx, item, draft).await?;
            ids.push(item);
        }

        tx.commit().await?;
        Ok(ids)
    }

    async fn append_trace(&self, item: ItemId, draft: &TraceDraft) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let id = insert_trace(&mut tx, item, draft).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn get_item(&self, id: ItemId) -> Result<Option<InventoryItem>> {
        let row = sqlx::query("SELECT * FROM inventario_items WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(item_from_row).transpose()
    }

    async fn transfer_item(
        &self,
        id: ItemId,
        new_owner: UserId,
        delivered_by: UserId,
        draft: &TraceDraft,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE inventario_items SET recibido_por_id = ?, entregado_por_id = ? \
             WHERE id = ? AND recibido_por_id = ?",
        )
        .bind(new_owner.0)
        .bind(delivered_by.0)
        .bind(id.0)
        .bind(delivered_by.0)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        insert_trace(&mut tx, id, draft).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn item_trace(&self, id: ItemId) -> Result<Vec<TraceEntry>> {
        let rows = sqlx::query(&format!(
            "{} WHERE t.inventario_id = ? ORDER BY t.fecha DESC, t.id DESC",
            TRACE_SELECT
        ))
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(trace_from_row).collect()
    }

    async fn user_trace(&self, user: UserId, limit: usize) -> Result<Vec<TraceEntry>> {
        let limit = i64::try_from(limit).map_err(|_| anyhow!("history limit too large"))?;
        let rows = sqlx::query(&format!(
            "{} WHERE t.usuario_id = ? ORDER BY t.fecha DESC, t.id DESC LIMIT ?",
            TRACE_SELECT
        ))
        .bind(user.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(trace_from_row).collect()
    }

    async fn insert_user(&self, user: &NewUser) -> Result<UserId> {
        let result = sqlx::query(
            r#"
            INSERT INTO usuarios (codigo, nombre, email, rol, escuela_id, activo, creado_en)
            VALUES (?, ?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(&user.code)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.school_id)
        .bind(format_ts(&Utc::now()))
        .execute(&self.pool)
        .await
        .with_context(|| format!("insert of user {} <{}>", user.code, user.email))?;
        Ok(UserId(result.last_insert_rowid()))
    }

    async fn insert_location(&self, name: &str) -> Result<i64> {
        let result = sqlx::query("INSERT INTO edificios (nombre) VALUES (?)")
            .bind(name.trim())
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }
}

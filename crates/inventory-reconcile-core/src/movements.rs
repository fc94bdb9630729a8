//! Asset movements after import: loans, transfers, write-offs, returns,
//! and the trace queries over them.
//!
//! Only the current owner (`received_by`) of an item may move it or read
//! its history. A transfer is the only movement that changes ownership;
//! the others are recorded in the trace log and nothing else.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;

use crate::error::{LedgerError, LedgerResult};
use crate::log::LogSink;
use crate::models::{InventoryItem, ItemId, TraceAction, TraceDraft, TraceEntry, UserId};
use crate::store::Store;

/// Maximum entries returned by [`Movements::user_history`].
pub const HISTORY_LIMIT: usize = 100;

const UNKNOWN_USER: &str = "Usuario desconocido";

/// What a movement wrote, for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementReceipt {
    pub item: ItemId,
    pub inventory_code: String,
    pub description: Option<String>,
    pub action: TraceAction,
    pub detail: String,
    pub owner: UserId,
}

pub struct Movements<'a> {
    store: &'a dyn Store,
    log: &'a dyn LogSink,
}

impl<'a> Movements<'a> {
    pub fn new(store: &'a dyn Store, log: &'a dyn LogSink) -> Self {
        Self { store, log }
    }

    /// Lend `item` to `borrower` until `until`. Ownership does not change.
    pub async fn lend(
        &self,
        item: ItemId,
        actor: UserId,
        borrower: UserId,
        until: NaiveDate,
        notes: Option<&str>,
    ) -> LedgerResult<MovementReceipt> {
        let stored = self.owned_item(item, actor, "lend").await?;
        let borrower_name = self
            .store
            .fetch_user(borrower)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("borrower {} not found", borrower)))?
            .display_name;
        let lender_name = self.user_name(actor).await?;

        let detail = format!(
            "Préstamo de {} a {}. Devolución esperada: {}",
            lender_name, borrower_name, until
        );
        let draft = TraceDraft::now(
            TraceAction::Loan,
            detail,
            actor,
            json!({
                "usuario_prestatario_id": borrower,
                "usuario_prestatario_nombre": borrower_name,
                "usuario_prestador_id": actor,
                "usuario_prestador_nombre": lender_name,
                "fecha_devolucion_esperada": until.to_string(),
                "estado": "prestado",
                "observaciones": notes.unwrap_or_default(),
            }),
        );
        self.store.append_trace(item, &draft).await?;
        Ok(self.receipt(stored, draft, actor))
    }

    /// Hand `item` over to `new_owner`. The acting user becomes the
    /// deliverer.
    pub async fn transfer(
        &self,
        item: ItemId,
        actor: UserId,
        new_owner: UserId,
        notes: Option<&str>,
    ) -> LedgerResult<MovementReceipt> {
        let stored = self.owned_item(item, actor, "transfer").await?;
        let new_owner_name = self
            .store
            .fetch_user(new_owner)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("new owner {} not found", new_owner)))?
            .display_name;
        let previous_name = self.user_name(actor).await?;

        let draft = TraceDraft::now(
            TraceAction::Transfer,
            format!(
                "Transferencia completa de {} a {}",
                previous_name, new_owner_name
            ),
            actor,
            json!({
                "nuevo_propietario_id": new_owner,
                "nuevo_propietario_nombre": new_owner_name,
                "propietario_anterior_id": actor,
                "propietario_anterior_nombre": previous_name,
                "estado": "transferido",
                "observaciones": notes.unwrap_or_default(),
            }),
        );
        let transferred = self
            .store
            .transfer_item(item, new_owner, actor, &draft)
            .await?;
        if !transferred {
            self.log.warn(
                "transfer_lost_ownership",
                &[("item", item.to_string()), ("actor", actor.to_string())],
            );
            return Err(LedgerError::forbidden(format!(
                "user {} no longer owns item {}; transfer not applied",
                actor, item
            )));
        }
        Ok(self.receipt(stored, draft, new_owner))
    }

    pub async fn write_off(
        &self,
        item: ItemId,
        actor: UserId,
        reason: &str,
        notes: Option<&str>,
    ) -> LedgerResult<MovementReceipt> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LedgerError::validation("a write-off needs a reason"));
        }
        let stored = self.owned_item(item, actor, "write off").await?;

        let draft = TraceDraft::now(
            TraceAction::WriteOff,
            format!("Baja del activo. Motivo: {}", reason),
            actor,
            json!({
                "motivo_baja": reason,
                "estado": "completado",
                "fecha_baja": Utc::now().to_rfc3339(),
                "observaciones": notes.unwrap_or_default(),
            }),
        );
        self.store.append_trace(item, &draft).await?;
        Ok(self.receipt(stored, draft, actor))
    }

    /// Record that a lent item came back to its owner.
    pub async fn return_loan(
        &self,
        item: ItemId,
        actor: UserId,
        notes: Option<&str>,
    ) -> LedgerResult<MovementReceipt> {
        let stored = self.owned_item(item, actor, "return").await?;
        let owner_name = self.user_name(actor).await?;
        let notes = notes.unwrap_or_default();

        let draft = TraceDraft::now(
            TraceAction::Return,
            format!("Devolución registrada por {}. {}", owner_name, notes)
                .trim_end()
                .to_string(),
            actor,
            json!({
                "estado": "devuelto",
                "fecha_devolucion": Utc::now().to_rfc3339(),
                "dueño_id": actor,
                "dueño_nombre": owner_name,
                "observaciones": notes,
            }),
        );
        self.store.append_trace(item, &draft).await?;
        Ok(self.receipt(stored, draft, actor))
    }

    /// Full history of one item, newest first. Owner only.
    pub async fn item_history(&self, item: ItemId, actor: UserId) -> LedgerResult<Vec<TraceEntry>> {
        self.owned_item(item, actor, "read the history of").await?;
        Ok(self.store.item_trace(item).await?)
    }

    /// The latest [`HISTORY_LIMIT`] entries acted by `actor`, newest first.
    pub async fn user_history(&self, actor: UserId) -> LedgerResult<Vec<TraceEntry>> {
        Ok(self.store.user_trace(actor, HISTORY_LIMIT).await?)
    }

    async fn owned_item(
        &self,
        item: ItemId,
        actor: UserId,
        verb: &str,
    ) -> LedgerResult<InventoryItem> {
        let stored = self
            .store
            .get_item(item)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("inventory item {} not found", item)))?;
        if stored.received_by != Some(actor) {
            self.log.warn(
                "movement_forbidden",
                &[
                    ("item", item.to_string()),
                    ("actor", actor.to_string()),
                    ("verb", verb.to_string()),
                ],
            );
            return Err(LedgerError::forbidden(format!(
                "user {} may not {} item {}: only its owner can",
                actor, verb, item
            )));
        }
        Ok(stored)
    }

    async fn user_name(&self, id: UserId) -> LedgerResult<String> {
        Ok(self
            .store
            .fetch_user(id)
            .await?
            .map(|u| u.display_name)
            .unwrap_or_else(|| UNKNOWN_USER.to_string()))
    }

    fn receipt(&self, item: InventoryItem, draft: TraceDraft, owner: UserId) -> MovementReceipt {
        self.log.info(
            "movement_recorded",
            &[
                ("item", item.id.to_string()),
                ("action", draft.action.as_str().to_string()),
                ("actor", draft.acting_user.to_string()),
            ],
        );
        MovementReceipt {
            item: item.id,
            inventory_code: item.inventory_code,
            description: item.description,
            action: draft.action,
            detail: draft.detail,
            owner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{MemorySink, NoopSink};
    use crate::models::{CanonicalUser, ImportRecord, NewUser};
    use crate::store::memory::InMemoryStore;
    use rust_decimal::Decimal;

    const OWNER: UserId = UserId(1);
    const OTHER: UserId = UserId(2);

    async fn seeded() -> (InMemoryStore, ItemId) {
        let store = InMemoryStore::with_users(&[
            CanonicalUser::new(1, "Juan Pérez"),
            CanonicalUser::new(2, "Laura Gómez"),
            CanonicalUser::new(3, "Pedro Salazar"),
        ]);
        let record = ImportRecord {
            inventory_code: "1001".into(),
            description: Some("Portátil".into()),
            brand: None,
            value: Decimal::ZERO,
            received_date: NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
            category_id: 1,
            location_id: None,
            delivered_by: None,
            received_by: OWNER,
            school_id: None,
        };
        let draft = TraceDraft::now(TraceAction::Import, "import", OWNER, json!({}));
        let ids = store.upsert_inventory(&[(record, draft)]).await.unwrap();
        (store, ids[0])
    }

    fn until() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 6, 30).unwrap()
    }

    #[tokio::test]
    async fn loan_keeps_owner_and_records_borrower() {
        let (store, item) = seeded().await;
        let m = Movements::new(&store, &NoopSink);

        let receipt = m
            .lend(item, OWNER, OTHER, until(), Some("para clase"))
            .await
            .unwrap();
        assert_eq!(receipt.owner, OWNER);
        assert!(receipt.detail.contains("Juan Pérez a Laura Gómez"));

        let stored = store.get_item(item).await.unwrap().unwrap();
        assert_eq!(stored.received_by, Some(OWNER));

        let history = m.item_history(item, OWNER).await.unwrap();
        assert_eq!(history[0].action, "prestamo");
        let meta = history[0].metadata.as_ref().unwrap();
        assert_eq!(meta["usuario_prestatario_id"], 2);
        assert_eq!(meta["fecha_devolucion_esperada"], "2030-06-30");
        assert_eq!(meta["estado"], "prestado");
    }

    #[tokio::test]
    async fn loan_to_unknown_or_inactive_user_is_not_found() {
        let (store, item) = seeded().await;
        let m = Movements::new(&store, &NoopSink);

        let err = m.lend(item, OWNER, UserId(99), until(), None).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");

        store.deactivate_user(UserId(3));
        let err = m.lend(item, OWNER, UserId(3), until(), None).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn transfer_moves_ownership() {
        let (store, item) = seeded().await;
        let m = Movements::new(&store, &NoopSink);

        let receipt = m.transfer(item, OWNER, OTHER, None).await.unwrap();
        assert_eq!(receipt.owner, OTHER);

        let stored = store.get_item(item).await.unwrap().unwrap();
        assert_eq!(stored.received_by, Some(OTHER));
        assert_eq!(stored.delivered_by, Some(OWNER));

        // The previous owner lost every right over the item.
        let err = m.transfer(item, OWNER, OTHER, None).await.unwrap_err();
        assert_eq!(err.kind(), "forbidden");
        assert!(m.item_history(item, OTHER).await.is_ok());
    }

    #[tokio::test]
    async fn store_transfer_checks_owner_at_write_time() {
        let (store, item) = seeded().await;
        let draft = TraceDraft::now(TraceAction::Transfer, "t", OWNER, json!({}));

        assert!(store.transfer_item(item, OTHER, OWNER, &draft).await.unwrap());
        // OWNER read the item before the first transfer committed.
        let stale = store
            .transfer_item(item, UserId(3), OWNER, &draft)
            .await
            .unwrap();
        assert!(!stale);

        let stored = store.get_item(item).await.unwrap().unwrap();
        assert_eq!(stored.received_by, Some(OTHER));
        assert_eq!(store.traces().len(), 2);
        assert!(!store
            .transfer_item(ItemId(404), OTHER, OWNER, &draft)
            .await
            .unwrap());
    }

    /// Serves one item as it was read before another transfer committed.
    struct StaleReads<'a> {
        inner: &'a InMemoryStore,
        snapshot: InventoryItem,
    }

    #[async_trait::async_trait]
    impl Store for StaleReads<'_> {
        async fn fetch_users(&self) -> anyhow::Result<Vec<CanonicalUser>> {
            self.inner.fetch_users().await
        }

        async fn fetch_user(&self, id: UserId) -> anyhow::Result<Option<CanonicalUser>> {
            self.inner.fetch_user(id).await
        }

        async fn find_location_id(&self, name: &str) -> anyhow::Result<Option<i64>> {
            self.inner.find_location_id(name).await
        }

        async fn upsert_inventory(
            &self,
            batch: &[(ImportRecord, TraceDraft)],
        ) -> anyhow::Result<Vec<ItemId>> {
            self.inner.upsert_inventory(batch).await
        }

        async fn append_trace(&self, item: ItemId, draft: &TraceDraft) -> anyhow::Result<i64> {
            self.inner.append_trace(item, draft).await
        }

        async fn get_item(&self, _id: ItemId) -> anyhow::Result<Option<InventoryItem>> {
            Ok(Some(self.snapshot.clone()))
        }

        async fn transfer_item(
            &self,
            id: ItemId,
            new_owner: UserId,
            delivered_by: UserId,
            draft: &TraceDraft,
        ) -> anyhow::Result<bool> {
            self.inner
                .transfer_item(id, new_owner, delivered_by, draft)
                .await
        }

        async fn item_trace(&self, id: ItemId) -> anyhow::Result<Vec<TraceEntry>> {
            self.inner.item_trace(id).await
        }

        async fn user_trace(&self, user: UserId, limit: usize) -> anyhow::Result<Vec<TraceEntry>> {
            self.inner.user_trace(user, limit).await
        }

        async fn insert_user(&self, user: &NewUser) -> anyhow::Result<UserId> {
            self.inner.insert_user(user).await
        }

        async fn insert_location(&self, name: &str) -> anyhow::Result<i64> {
            self.inner.insert_location(name).await
        }
    }

    #[tokio::test]
    async fn transfer_that_loses_ownership_is_forbidden() {
        let (store, item) = seeded().await;
        let snapshot = store.get_item(item).await.unwrap().unwrap();
        Movements::new(&store, &NoopSink)
            .transfer(item, OWNER, OTHER, None)
            .await
            .unwrap();

        let stale = StaleReads {
            inner: &store,
            snapshot,
        };
        let sink = MemorySink::new();
        let err = Movements::new(&stale, &sink)
            .transfer(item, OWNER, UserId(3), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "forbidden");
        assert_eq!(sink.events("transfer_lost_ownership").len(), 1);

        let stored = store.get_item(item).await.unwrap().unwrap();
        assert_eq!(stored.received_by, Some(OTHER));
        assert_eq!(store.traces().len(), 2);
    }

    #[tokio::test]
    async fn only_the_owner_may_move() {
        let (store, item) = seeded().await;
        let m = Movements::new(&store, &NoopSink);

        for err in [
            m.lend(item, OTHER, OWNER, until(), None).await.unwrap_err(),
            m.write_off(item, OTHER, "roto", None).await.unwrap_err(),
            m.return_loan(item, OTHER, None).await.unwrap_err(),
        ] {
            assert_eq!(err.kind(), "forbidden");
        }
        assert_eq!(
            m.item_history(item, OTHER).await.unwrap_err().kind(),
            "forbidden"
        );
        // Only the import entry exists.
        assert_eq!(store.traces().len(), 1);
    }

    #[tokio::test]
    async fn missing_item_is_not_found() {
        let (store, _) = seeded().await;
        let m = Movements::new(&store, &NoopSink);
        let err = m.return_loan(ItemId(404), OWNER, None).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn write_off_requires_reason() {
        let (store, item) = seeded().await;
        let m = Movements::new(&store, &NoopSink);

        let err = m.write_off(item, OWNER, "  ", None).await.unwrap_err();
        assert_eq!(err.kind(), "validation");

        let receipt = m.write_off(item, OWNER, "Obsoleto", None).await.unwrap();
        assert_eq!(receipt.detail, "Baja del activo. Motivo: Obsoleto");
    }

    #[tokio::test]
    async fn histories_are_newest_first() {
        let (store, item) = seeded().await;
        let m = Movements::new(&store, &NoopSink);

        m.lend(item, OWNER, OTHER, until(), None).await.unwrap();
        m.return_loan(item, OWNER, Some("sin daños")).await.unwrap();

        let history = m.item_history(item, OWNER).await.unwrap();
        let actions: Vec<&str> = history.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["devolucion", "prestamo", "importacion"]);
        assert_eq!(history[0].acting_user_name.as_deref(), Some("Juan Pérez"));

        let mine = m.user_history(OWNER).await.unwrap();
        assert_eq!(mine.len(), 3);
        assert_eq!(mine[0].inventory_code.as_deref(), Some("1001"));
        assert!(m.user_history(OTHER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_write_surfaces_as_persistence() {
        let (store, item) = seeded().await;
        let m = Movements::new(&store, &NoopSink);
        store.set_fail_writes(true);
        let err = m.transfer(item, OWNER, OTHER, None).await.unwrap_err();
        assert_eq!(err.kind(), "persistence");
        store.set_fail_writes(false);
        assert_eq!(
            store.get_item(item).await.unwrap().unwrap().received_by,
            Some(OWNER)
        );
    }
}

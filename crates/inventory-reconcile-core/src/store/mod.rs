//! Storage abstraction for the inventory registry.
//!
//! The [`Store`] trait covers everything the reconciler and the movement
//! operations need from the relational store: the user registry, location
//! lookup, the atomic inventory upsert, and the append-only trace log.
//! Backends: SQLite in the application crate, [`memory::InMemoryStore`]
//! here for tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//! Every call is awaited to completion before the caller proceeds, so from
//! the pipeline's point of view the contract is synchronous.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    CanonicalUser, ImportRecord, InventoryItem, ItemId, NewUser, TraceDraft, TraceEntry, UserId,
};

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`fetch_users`](Store::fetch_users) | Snapshot of all active users |
/// | [`fetch_user`](Store::fetch_user) | One active user by id |
/// | [`find_location_id`](Store::find_location_id) | Case-insensitive location lookup |
/// | [`upsert_inventory`](Store::upsert_inventory) | All-or-nothing batch upsert with trace |
/// | [`append_trace`](Store::append_trace) | Append one trace entry |
/// | [`get_item`](Store::get_item) | Stored item by id |
/// | [`transfer_item`](Store::transfer_item) | Owner change with trace, conditional on the current owner |
/// | [`item_trace`](Store::item_trace) | History of one item, newest first |
/// | [`user_trace`](Store::user_trace) | Entries acted by one user, newest first |
/// | [`insert_user`](Store::insert_user) | Add a user to the registry |
/// | [`insert_location`](Store::insert_location) | Add a location |
#[async_trait]
pub trait Store: Send + Sync {
    async fn fetch_users(&self) -> Result<Vec<CanonicalUser>>;

    async fn fetch_user(&self, id: UserId) -> Result<Option<CanonicalUser>>;

    async fn find_location_id(&self, name: &str) -> Result<Option<i64>>;

    /// Insert or update every record keyed by inventory code and append
    /// its trace entry, in one transaction. Returns the item ids in input
    /// order. On error nothing is written.
    async fn upsert_inventory(&self, batch: &[(ImportRecord, TraceDraft)]) -> Result<Vec<ItemId>>;

    async fn append_trace(&self, item: ItemId, draft: &TraceDraft) -> Result<i64>;

    async fn get_item(&self, id: ItemId) -> Result<Option<InventoryItem>>;

    /// Set `received_by = new_owner`, `delivered_by = delivered_by` and
    /// append `draft`, in one transaction, provided `delivered_by` still
    /// owns the item at write time. Returns `false` and writes nothing when
    /// the item is gone or has another owner.
    async fn transfer_item(
        &self,
        id: ItemId,
        new_owner: UserId,
        delivered_by: UserId,
        draft: &TraceDraft,
    ) -> Result<bool>;

    async fn item_trace(&self, id: ItemId) -> Result<Vec<TraceEntry>>;

    async fn user_trace(&self, user: UserId, limit: usize) -> Result<Vec<TraceEntry>>;

    async fn insert_user(&self, user: &NewUser) -> Result<UserId>;

    async fn insert_location(&self, name: &str) -> Result<i64>;
}

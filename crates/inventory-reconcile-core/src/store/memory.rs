//! In-memory [`Store`] implementation for tests.
//!
//! Uses `Vec` and `HashMap` behind a single `std::sync::RwLock`, so every
//! write operation is trivially atomic. Writes can be made to fail on
//! demand to exercise the all-or-nothing paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::models::{
    CanonicalUser, ImportRecord, InventoryItem, ItemId, NewUser, TraceDraft, TraceEntry, UserId,
};

use super::Store;

struct StoredUser {
    id: UserId,
    code: String,
    name: String,
    email: String,
    active: bool,
}

#[derive(Default)]
struct State {
    users: Vec<StoredUser>,
    locations: Vec<(i64, String)>,
    items: Vec<InventoryItem>,
    traces: Vec<TraceEntry>,
}

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose registry holds `users` (all active), ids as given.
    pub fn with_users(users: &[CanonicalUser]) -> Self {
        let store = Self::new();
        if let Ok(mut state) = store.state.write() {
            for u in users {
                state.users.push(StoredUser {
                    id: u.id,
                    code: format!("U{}", u.id),
                    name: u.display_name.clone(),
                    email: format!("u{}@example.org", u.id),
                    active: true,
                });
            }
        }
        store
    }

    /// Make every subsequent write fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn deactivate_user(&self, id: UserId) {
        if let Ok(mut state) = self.state.write() {
            for u in state.users.iter_mut().filter(|u| u.id == id) {
                u.active = false;
            }
        }
    }

    pub fn items(&self) -> Vec<InventoryItem> {
        self.state
            .read()
            .map(|s| s.items.clone())
            .unwrap_or_default()
    }

    pub fn traces(&self) -> Vec<TraceEntry> {
        self.state
            .read()
            .map(|s| s.traces.clone())
            .unwrap_or_default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| anyhow!("store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("simulated write failure");
        }
        self.state.write().map_err(|_| anyhow!("store lock poisoned"))
    }
}

impl State {
    fn user_name(&self, id: UserId) -> Option<String> {
        self.users
            .iter()
            .find(|u| u.id == id)
            .map(|u| u.name.clone())
    }

    fn push_trace(&mut self, item: ItemId, draft: &TraceDraft) -> i64 {
        let id = self.traces.len() as i64 + 1;
        self.traces.push(TraceEntry {
            id,
            inventory_id: item,
            at: draft.at,
            action: draft.action.as_str().to_string(),
            detail: Some(draft.detail.clone()),
            acting_user: Some(draft.acting_user),
            metadata: Some(draft.metadata.clone()),
            acting_user_name: None,
            inventory_code: None,
            description: None,
        });
        id
    }

    fn joined(&self, entry: &TraceEntry) -> TraceEntry {
        let item = self.items.iter().find(|i| i.id == entry.inventory_id);
        TraceEntry {
            acting_user_name: entry.acting_user.and_then(|u| self.user_name(u)),
            inventory_code: item.map(|i| i.inventory_code.clone()),
            description: item.and_then(|i| i.description.clone()),
            ..entry.clone()
        }
    }
}

fn newest_first(entries: &mut [TraceEntry]) {
    entries.sort_by(|a, b| b.at.cmp(&a.at).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl Store for InMemoryStore {
    async fn fetch_users(&self) -> Result<Vec<CanonicalUser>> {
        let state = self.read()?;
        Ok(state
            .users
            .iter()
            .filter(|u| u.active)
            .map(|u| CanonicalUser {
                id: u.id,
                display_name: u.name.clone(),
            })
            .collect())
    }

    async fn fetch_user(&self, id: UserId) -> Result<Option<CanonicalUser>> {
        let state = self.read()?;
        Ok(state
            .users
            .iter()
            .find(|u| u.id == id && u.active)
            .map(|u| CanonicalUser {
                id: u.id,
                display_name: u.name.clone(),
            }))
    }

    async fn find_location_id(&self, name: &str) -> Result<Option<i64>> {
        let wanted = name.trim().to_lowercase();
        let state = self.read()?;
        Ok(state
            .locations
            .iter()
            .find(|(_, n)| n.to_lowercase() == wanted)
            .map(|(id, _)| *id))
    }

    async fn upsert_inventory(&self, batch: &[(ImportRecord, TraceDraft)]) -> Result<Vec<ItemId>> {
        let mut state = self.write()?;
        let mut by_code: HashMap<String, usize> = state
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.inventory_code.clone(), i))
            .collect();

        let mut ids = Vec::with_capacity(batch.len());
        for (record, draft) in batch {
            let existing = by_code.get(&record.inventory_code).copied();
            let id = match existing {
                Some(i) => state.items[i].id,
                None => ItemId(state.items.len() as i64 + 1),
            };
            let item = InventoryItem {
                id,
                inventory_code: record.inventory_code.clone(),
                description: record.description.clone(),
                brand: record.brand.clone(),
                value: record.value,
                received_date: record.received_date,
                category_id: Some(record.category_id),
                location_id: record.location_id,
                delivered_by: record.delivered_by,
                received_by: Some(record.received_by),
                school_id: record.school_id,
            };
            match existing {
                Some(i) => state.items[i] = item,
                None => {
                    by_code.insert(record.inventory_code.clone(), state.items.len());
                    state.items.push(item);
                }
            }
            state.push_trace(id, draft);
            ids.push(id);
        }
        Ok(ids)
    }

    async fn append_trace(&self, item: ItemId, draft: &TraceDraft) -> Result<i64> {
        let mut state = self.write()?;
        Ok(state.push_trace(item, draft))
    }

    async fn get_item(&self, id: ItemId) -> Result<Option<InventoryItem>> {
        let state = self.read()?;
        Ok(state.items.iter().find(|i| i.id == id).cloned())
    }

    async fn transfer_item(
        &self,
        id: ItemId,
        new_owner: UserId,
        delivered_by: UserId,
        draft: &TraceDraft,
    ) -> Result<bool> {
        let mut state = self.write()?;
        let Some(item) = state
            .items
            .iter_mut()
            .find(|i| i.id == id && i.received_by == Some(delivered_by))
        else {
            return Ok(false);
        };
        item.received_by = Some(new_owner);
        item.delivered_by = Some(delivered_by);
        state.push_trace(id, draft);
        Ok(true)
    }

    async fn item_trace(&self, id: ItemId) -> Result<Vec<TraceEntry>> {
        let state = self.read()?;
        let mut entries: Vec<TraceEntry> = state
            .traces
            .iter()
            .filter(|t| t.inventory_id == id)
            .map(|t| state.joined(t))
            .collect();
        newest_first(&mut entries);
        Ok(entries)
    }

    async fn user_trace(&self, user: UserId, limit: usize) -> Result<Vec<TraceEntry>> {
        let state = self.read()?;
        let mut entries: Vec<TraceEntry> = state
            .traces
            .iter()
            .filter(|t| t.acting_user == Some(user))
            .map(|t| state.joined(t))
            .collect();
        newest_first(&mut entries);
        entries.truncate(limit);
        Ok(entries)
    }

    async fn insert_user(&self, user: &NewUser) -> Result<UserId> {
        let mut state = self.write()?;
        if state.users.iter().any(|u| u.email == user.email) {
            bail!("email already registered: {}", user.email);
        }
        if state.users.iter().any(|u| u.code == user.code) {
            bail!("user code already exists: {}", user.code);
        }
        let id = UserId(state.users.iter().map(|u| u.id.0).max().unwrap_or(0) + 1);
        state.users.push(StoredUser {
            id,
            code: user.code.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            active: true,
        });
        Ok(id)
    }

    async fn insert_location(&self, name: &str) -> Result<i64> {
        let mut state = self.write()?;
        let id = state.locations.len() as i64 + 1;
        state.locations.push((id, name.trim().to_string()));
        Ok(id)
    }
}

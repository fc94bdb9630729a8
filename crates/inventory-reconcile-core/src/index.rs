//! Batch-scoped in-memory index over the canonical user registry.
//!
//! Built once from a fresh registry snapshot at the start of an import
//! and dropped when the import ends. There are no mutation methods.

use std::collections::{BTreeSet, HashMap};

use crate::log::LogSink;
use crate::models::{CanonicalUser, UserId};
use crate::normalize::{normalize, NormalizedName};

/// A registry user together with its precomputed normalized name.
#[derive(Debug, Clone)]
pub struct IndexedUser {
    pub id: UserId,
    pub display_name: String,
    pub name: NormalizedName,
}

#[derive(Debug, Default)]
pub struct IdentityIndex {
    by_exact_key: HashMap<String, UserId>,
    by_reversed_key: HashMap<String, UserId>,
    /// token → (user id, full normalized key), ordered by id.
    by_token: HashMap<String, BTreeSet<(UserId, String)>>,
    users: Vec<IndexedUser>,
}

impl IdentityIndex {
    /// Index `users` in iteration order.
    ///
    /// When two users share a normalized (or reversed) key, the later one
    /// replaces the earlier in the exact and reversed maps. Both remain
    /// reachable through the token map and the fuzzy scan.
    pub fn build(users: &[CanonicalUser], log: &dyn LogSink) -> Self {
        let mut index = IdentityIndex::default();

        for user in users {
            let name = normalize(&user.display_name);
            if name.is_empty() {
                log.debug(
                    "index_skip_blank_name",
                    &[("user_id", user.id.to_string())],
                );
                continue;
            }

            let key = name.key();
            let reversed_key = name.reversed().key();

            if let Some(previous) = index.by_exact_key.insert(key.clone(), user.id) {
                log.debug(
                    "index_key_collision",
                    &[
                        ("key", key.clone()),
                        ("replaced", previous.to_string()),
                        ("by", user.id.to_string()),
                    ],
                );
            }
            index.by_reversed_key.insert(reversed_key, user.id);

            for token in name.significant_tokens() {
                index
                    .by_token
                    .entry(token.to_string())
                    .or_default()
                    .insert((user.id, key.clone()));
            }

            index.users.push(IndexedUser {
                id: user.id,
                display_name: user.display_name.clone(),
                name,
            });
        }

        log.debug(
            "index_built",
            &[
                ("users", index.users.len().to_string()),
                ("keys", index.by_exact_key.len().to_string()),
                ("tokens", index.by_token.len().to_string()),
            ],
        );

        index
    }

    pub fn exact(&self, key: &str) -> Option<UserId> {
        self.by_exact_key.get(key).copied()
    }

    pub fn reversed(&self, key: &str) -> Option<UserId> {
        self.by_reversed_key.get(key).copied()
    }

    /// Users having `token` among their significant tokens, ordered by id.
    pub fn token_candidates(&self, token: &str) -> impl Iterator<Item = &(UserId, String)> {
        self.by_token.get(token).into_iter().flatten()
    }

    pub fn users(&self) -> &[IndexedUser] {
        &self.users
    }

    pub fn display_name(&self, id: UserId) -> Option<&str> {
        self.users
            .iter()
            .find(|u| u.id == id)
            .map(|u| u.display_name.as_str())
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

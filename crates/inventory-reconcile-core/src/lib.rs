//! # Inventory Reconcile Core
//!
//! Pure reconciliation logic for inventory imports: name normalization,
//! weighted fuzzy comparison, the per-batch identity index, the resolver
//! cascade, the import reconciler, asset movements, and the store
//! abstraction they all run against.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! runtime-specific dependencies. Storage is reached only through the
//! [`store::Store`] trait.
//!
//! ## Pipeline
//!
//! ```text
//! raw rows ──▶ cleanse ──▶ resolve names ──▶ uploader check ──▶ upsert + trace
//!                              │
//!                     IdentityIndex (built once per batch)
//! ```

pub mod cleanse;
pub mod compare;
pub mod error;
pub mod index;
pub mod log;
pub mod models;
pub mod movements;
pub mod normalize;
pub mod reconcile;
pub mod registry;
pub mod resolve;
pub mod store;

pub use error::LedgerError;
pub use index::IdentityIndex;
pub use models::{CanonicalUser, ImportRecord, ItemId, RawRow, UserId};
pub use resolve::{resolve, Resolution, ResolutionResult, Resolver, TieBreak};

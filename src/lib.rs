//! # Inventory Reconcile
//!
//! Imports inventory spreadsheets into a school's asset registry, matching
//! the free-text staff names in each sheet to registered users, and
//! records every later movement of an asset in an append-only trace log.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────────────┐   ┌───────────┐
//! │ CSV / xlsx │──▶│  Reconciler (core)   │──▶│  SQLite   │
//! │  (sheet)   │   │ cleanse+resolve+check│   │ items+log │
//! └────────────┘   └──────────┬───────────┘   └─────┬─────┘
//!                             │                     │
//!                    IdentityIndex per batch        ▼
//!                                             ┌───────────┐
//!                                             │ Movements │
//!                                             └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! invr init
//! invr users add --code P001 --name "Juan Pérez" --email juan@colegio.edu.co
//! invr import ./Activos_Mayores.csv --as 1
//! invr lend 3 --as 1 --to 2 --until 2025-06-30
//! invr trace 3 --as 1
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations and category seeding |
//! | [`sqlite_store`] | SQLite implementation of the core `Store` trait |
//! | [`sheet`] | CSV and xlsx parsing into import batches |
//! | [`workbook`] | First-worksheet reader for `.xlsx` files |
//! | [`import`] | `invr import` and its JSON output contract |
//! | [`movements`] | Loans, transfers, write-offs, returns, trace queries |
//! | [`registry`] | User and location administration |
//! | [`resolve`] | Name resolution diagnostics |

pub mod config;
pub mod db;
pub mod import;
pub mod migrate;
pub mod movements;
pub mod registry;
pub mod resolve;
pub mod sheet;
pub mod sqlite_store;
pub mod workbook;

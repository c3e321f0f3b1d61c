//! Category hierarchy engine for an inventory console.
//!
//! The crate turns a flat list of category records into a sorted, searchable
//! tree and keeps that list in sync with a remote store:
//!
//! - [`category`] - pure tree building, sorting, filtering and expansion
//! - [`store`] - the [`RecordStore`](store::RecordStore) boundary and its REST and SQLite adapters
//! - [`sync`] - the [`SyncController`](sync::SyncController) owning one list view
//! - [`ui`] - plain-text rendering of the visible tree
//! - [`config`] - the TOML configuration file

pub mod category;
pub mod config;
pub mod error;
pub mod store;
pub mod sync;
pub mod ui;
pub mod util;

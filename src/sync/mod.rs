//! Synchronization between the local record list and a [`RecordStore`].
//!
//! [`SyncController`] owns one list view's state: the flat records, search
//! and sort parameters, expansion, and the in-flight requests. Store calls run
//! on spawned tasks and report back through an event channel; the owner drives
//! the controller by calling [`SyncController::pump`] (or `settle`).
//!
//! [`RecordStore`]: crate::store::RecordStore

mod controller;
mod pending;

use std::time::Duration;

use tokio::sync::oneshot;

use crate::category::{CategoryId, CategoryRecord, SortKey, SortOrder};
use crate::config::Config;
use crate::error::CategoryError;

pub use controller::SyncController;
pub use pending::{PendingKind, PendingOperation};

/// Lifecycle of a list subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Not mounted, or mounted with nothing loaded yet and no request running.
    Idle,
    Loading,
    Ready,
    /// The latest fetch failed. Previously loaded records stay visible.
    Error,
}

/// Tunables for a controller, usually derived from [`Config`].
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub search_debounce: Duration,
    pub refresh_after_mutation: bool,
    pub forward_search: bool,
    pub sort: SortKey,
    pub order: SortOrder,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SyncSettings {
    fn from(config: &Config) -> Self {
        Self {
            search_debounce: config.search_debounce(),
            refresh_after_mutation: config.refresh_after_mutation,
            forward_search: config.forward_search,
            sort: config.default_sort,
            order: config.default_order,
        }
    }
}

/// Events from background store calls.
#[derive(Debug)]
pub enum SyncEvent {
    /// A `list` call finished.
    ///
    /// Fields:
    /// - `generation`: the fetch generation when the call was issued
    /// - `result`: the records or the failure
    FetchCompleted {
        generation: u64,
        result: Result<Vec<CategoryRecord>, CategoryError>,
    },
    /// A create/update/delete finished.
    ///
    /// Fields:
    /// - `correlation`: id of the matching [`PendingOperation`]
    /// - `outcome`: what the store confirmed, or the failure
    MutationSettled {
        correlation: u64,
        outcome: Result<Settled, CategoryError>,
    },
}

/// Store confirmation of a mutation.
#[derive(Debug, Clone)]
pub enum Settled {
    Created(CategoryRecord),
    Updated(CategoryRecord),
    Removed(Vec<CategoryId>),
}

/// Handle to an in-flight mutation.
///
/// The optimistic change is already visible when the ticket is returned.
/// Awaiting [`wait`](MutationTicket::wait) yields the store's answer; dropping
/// the ticket does not cancel the remote call.
#[derive(Debug)]
pub struct MutationTicket<T> {
    correlation: u64,
    reply: oneshot::Receiver<Result<T, CategoryError>>,
}

impl<T> MutationTicket<T> {
    pub fn correlation(&self) -> u64 {
        self.correlation
    }

    pub async fn wait(self) -> Result<T, CategoryError> {
        self.reply.await.unwrap_or(Err(CategoryError::Cancelled))
    }
}

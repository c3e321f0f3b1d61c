//! Record store adapters.
//!
//! [`RecordStore`] is the only boundary where the engine suspends. Two
//! implementations ship with the crate: [`RestStore`] for the inventory API and
//! [`SqliteStore`] as a local store for offline use and tests.

mod rest;
mod sqlite;

use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::category::{CategoryId, CategoryPatch, CategoryRecord, NewCategory, SortKey, SortOrder};
use crate::error::CategoryError;

pub use rest::{EndpointError, RestStore};
pub use sqlite::SqliteStore;

/// Query parameters for [`RecordStore::list`]. Unset fields are omitted from
/// the request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<SortOrder>,
}

/// Remote collection of category records.
///
/// Implementations report transport problems as [`CategoryError::Network`] and
/// server-side rejections as [`CategoryError::Conflict`]. `list` must return
/// [`CategoryError::Cancelled`] promptly once `cancel` fires.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list(
        &self,
        params: ListParams,
        cancel: CancellationToken,
    ) -> Result<Vec<CategoryRecord>, CategoryError>;

    async fn create(&self, draft: NewCategory) -> Result<CategoryRecord, CategoryError>;

    async fn update(
        &self,
        id: CategoryId,
        patch: CategoryPatch,
    ) -> Result<CategoryRecord, CategoryError>;

    async fn remove(&self, id: CategoryId) -> Result<(), CategoryError>;
}

/// Run `fut` unless `cancel` fires first, in which case the future is dropped
/// and `Cancelled` is returned.
pub async fn until_cancelled<F, T>(cancel: &CancellationToken, fut: F) -> Result<T, CategoryError>
where
    F: Future<Output = Result<T, CategoryError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CategoryError::Cancelled),
        result = fut => result,
    }
}

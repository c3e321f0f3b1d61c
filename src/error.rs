use crate::category::CategoryId;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Local rejections raised before any store call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Category name cannot be empty or whitespace-only")]
    EmptyName,

    #[error("Category '{name}' still holds {count} product(s) and cannot be deleted")]
    HasProducts {
        id: CategoryId,
        name: String,
        count: u64,
    },

    /// Bulk delete is all-or-nothing; every blocking id is reported.
    #[error("Bulk delete rejected: {}", describe_blocked(.blocked))]
    BulkBlocked { blocked: Vec<CategoryId> },

    #[error("Nothing selected to delete")]
    EmptySelection,

    #[error("Unknown category: {0}")]
    UnknownCategory(CategoryId),

    /// The category (or the parent it refers to) was created optimistically and
    /// the store has not assigned it a real id yet.
    #[error("Category {0} has not been saved yet")]
    Unsaved(CategoryId),

    #[error("A category cannot be its own parent")]
    SelfParent,

    #[error("Moving {id} under {parent} would make it its own ancestor")]
    CyclicParent { id: CategoryId, parent: CategoryId },
}

/// Failures surfaced by the synchronization layer and store adapters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CategoryError {
    /// Transport failure, timeout or server-side fault. Recoverable by refresh.
    #[error("Network error: {0}")]
    Network(String),

    /// A request superseded by a newer one. Never shown to the user.
    #[error("Request cancelled")]
    Cancelled,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Remote rejection (duplicate name, category in use, ...), passed through verbatim.
    #[error("{0}")]
    Conflict(String),
}

fn describe_blocked(blocked: &[CategoryId]) -> String {
    match blocked.len() {
        1 => "1 selected category still holds products".to_string(),
        n => format!("{} selected categories still hold products", n),
    }
}

impl CategoryError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CategoryError::Cancelled)
    }

    /// True when retrying or refreshing may succeed without user changes.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CategoryError::Network(_))
    }

    /// Message for an error banner, or `None` for errors that must stay silent.
    pub fn user_message(&self) -> Option<String> {
        match self {
            CategoryError::Cancelled => None,
            other => Some(other.to_string()),
        }
    }
}

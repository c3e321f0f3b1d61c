use crate::error::CategoryError;
use crate::sync::SyncState;

/// One-line summary shown under the tree.
///
/// A failed refresh is reported alongside the rows still on screen, since
/// the records from the last successful load stay visible.
pub fn status_line(
    state: SyncState,
    error: Option<&CategoryError>,
    shown: usize,
    total: usize,
    search: &str,
) -> String {
    let counts = if search.trim().is_empty() {
        format!("{} categories", total)
    } else {
        format!("{} of {} categories match '{}'", shown, total, search.trim())
    };

    match state {
        SyncState::Loading => format!("Loading... ({})", counts),
        SyncState::Error => {
            let reason = error
                .and_then(CategoryError::user_message)
                .unwrap_or_else(|| "Refresh failed".to_string());
            format!("{} | {}", reason, counts)
        }
        SyncState::Idle | SyncState::Ready => counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_shows_total() {
        assert_eq!(status_line(SyncState::Ready, None, 4, 4, ""), "4 categories");
    }

    #[test]
    fn test_search_shows_matches() {
        assert_eq!(
            status_line(SyncState::Ready, None, 2, 4, " phone "),
            "2 of 4 categories match 'phone'"
        );
    }

    #[test]
    fn test_error_keeps_counts() {
        let err = CategoryError::Network("connection refused".to_string());
        let line = status_line(SyncState::Error, Some(&err), 4, 4, "");
        assert!(line.ends_with("| 4 categories"));
    }
}

//! Local checks run by the synchronization controller before a store call.
use std::collections::HashMap;

use super::types::{CategoryId, CategoryRecord};
use crate::error::ValidationError;
use crate::util::strip_control_chars;

/// Strip control characters (ANSI escape injection) and surrounding
/// whitespace, rejecting names that end up empty.
pub fn sanitize_name(name: &str) -> Result<String, ValidationError> {
    let stripped = strip_control_chars(name);
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(trimmed.to_owned())
}

/// Check that placing `id` (or a new record, when `id` is `None`) under
/// `parent` keeps the hierarchy acyclic.
///
/// Parents missing from `records` are allowed: the tree builder shows the
/// record as a root until the parent arrives.
pub fn check_parent(
    records: &[CategoryRecord],
    id: Option<&CategoryId>,
    parent: Option<&CategoryId>,
) -> Result<(), ValidationError> {
    let Some(parent) = parent else {
        return Ok(());
    };
    if parent.is_provisional() {
        return Err(ValidationError::Unsaved(parent.clone()));
    }
    let Some(id) = id else {
        return Ok(());
    };
    if id == parent {
        return Err(ValidationError::SelfParent);
    }

    let parents: HashMap<&CategoryId, Option<&CategoryId>> = records
        .iter()
        .map(|r| (&r.id, r.parent_id.as_ref()))
        .collect();

    // Walk up from the proposed parent. Bounded by the record count so corrupt
    // data that already contains a cycle cannot loop forever.
    let mut cursor = Some(parent);
    for _ in 0..=records.len() {
        match cursor {
            Some(current) if current == id => {
                return Err(ValidationError::CyclicParent {
                    id: id.clone(),
                    parent: parent.clone(),
                });
            }
            Some(current) => cursor = parents.get(current).copied().flatten(),
            None => break,
        }
    }
    Ok(())
}

/// Refuse to delete a category that still holds products.
pub fn check_deletable(record: &CategoryRecord) -> Result<(), ValidationError> {
    if record.id.is_provisional() {
        return Err(ValidationError::Unsaved(record.id.clone()));
    }
    match record.products() {
        0 => Ok(()),
        count => Err(ValidationError::HasProducts {
            id: record.id.clone(),
            name: record.name.clone(),
            count,
        }),
    }
}

/// All-or-nothing check for a bulk delete. Returns the matching records in
/// request order when every target may be deleted.
pub fn check_bulk_deletable<'a>(
    records: &'a [CategoryRecord],
    ids: &[CategoryId],
) -> Result<Vec<&'a CategoryRecord>, ValidationError> {
    if ids.is_empty() {
        return Err(ValidationError::EmptySelection);
    }

    let mut targets = Vec::with_capacity(ids.len());
    for id in ids {
        let record = records
            .iter()
            .find(|r| &r.id == id)
            .ok_or_else(|| ValidationError::UnknownCategory(id.clone()))?;
        if record.id.is_provisional() {
            return Err(ValidationError::Unsaved(id.clone()));
        }
        targets.push(record);
    }

    let blocked: Vec<CategoryId> = targets
        .iter()
        .filter(|r| r.products() > 0)
        .map(|r| r.id.clone())
        .collect();
    if !blocked.is_empty() {
        return Err(ValidationError::BulkBlocked { blocked });
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: i64) -> CategoryId {
        CategoryId::Int(n)
    }

    fn chain() -> Vec<CategoryRecord> {
        vec![
            CategoryRecord::new(1, "Root"),
            CategoryRecord::new(2, "Child").with_parent(1),
            CategoryRecord::new(3, "Grandchild").with_parent(2),
        ]
    }

    #[test]
    fn test_sanitize_strips_escapes_and_trims() {
        assert_eq!(sanitize_name("  \x1b[31mTools\x1b[0m ").unwrap(), "Tools");
    }

    #[test]
    fn test_sanitize_rejects_empty() {
        assert_eq!(sanitize_name("   "), Err(ValidationError::EmptyName));
        assert_eq!(sanitize_name("\x1b[31m\x1b[0m"), Err(ValidationError::EmptyName));
    }

    #[test]
    fn test_parent_cannot_be_self() {
        assert_eq!(
            check_parent(&chain(), Some(&id(2)), Some(&id(2))),
            Err(ValidationError::SelfParent)
        );
    }

    #[test]
    fn test_parent_cannot_be_descendant() {
        let err = check_parent(&chain(), Some(&id(1)), Some(&id(3))).unwrap_err();
        assert!(matches!(err, ValidationError::CyclicParent { .. }));
    }

    #[test]
    fn test_moving_to_unrelated_or_missing_parent_is_allowed() {
        assert!(check_parent(&chain(), Some(&id(3)), Some(&id(1))).is_ok());
        assert!(check_parent(&chain(), Some(&id(3)), Some(&id(77))).is_ok());
        assert!(check_parent(&chain(), None, Some(&id(3))).is_ok());
        assert!(check_parent(&chain(), Some(&id(3)), None).is_ok());
    }

    #[test]
    fn test_unsaved_parent_rejected() {
        let pending = CategoryId::Provisional(4);
        assert_eq!(
            check_parent(&chain(), None, Some(&pending)),
            Err(ValidationError::Unsaved(pending))
        );
    }

    #[test]
    fn test_walk_terminates_on_corrupt_cycle() {
        let records = vec![
            CategoryRecord::new(1, "A").with_parent(2),
            CategoryRecord::new(2, "B").with_parent(1),
        ];
        assert!(check_parent(&records, Some(&id(9)), Some(&id(1))).is_ok());
    }

    #[test]
    fn test_delete_blocked_by_products() {
        let record = CategoryRecord::new(1, "Electronics").with_products(5);
        let err = check_deletable(&record).unwrap_err();
        assert_eq!(
            err,
            ValidationError::HasProducts {
                id: id(1),
                name: "Electronics".to_string(),
                count: 5,
            }
        );
    }

    #[test]
    fn test_bulk_delete_reports_every_blocked_id() {
        let records = vec![
            CategoryRecord::new(1, "A").with_products(2),
            CategoryRecord::new(2, "B"),
            CategoryRecord::new(3, "C").with_products(1),
        ];
        let err = check_bulk_deletable(&records, &[id(1), id(2), id(3)]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::BulkBlocked {
                blocked: vec![id(1), id(3)]
            }
        );
        assert_eq!(check_bulk_deletable(&records, &[id(2)]).unwrap().len(), 1);
    }

    #[test]
    fn test_bulk_delete_rejects_unknown_and_empty() {
        let records = chain();
        assert_eq!(
            check_bulk_deletable(&records, &[id(1), id(8)]),
            Err(ValidationError::UnknownCategory(id(8)))
        );
        assert_eq!(
            check_bulk_deletable(&records, &[]),
            Err(ValidationError::EmptySelection)
        );
    }
}

use std::cmp::Ordering;

use super::types::{CategoryNode, CategoryRecord, SortKey, SortOrder};

/// Sort every level of the forest by `key`.
///
/// Siblings are compared only with each other, so children are ordered
/// independently of their parents. The sort is stable in both directions:
/// `Desc` reverses the comparator, not the result, so tied nodes keep their
/// input order either way.
pub fn sort(mut forest: Vec<CategoryNode>, key: SortKey, order: SortOrder) -> Vec<CategoryNode> {
    let mut pending: Vec<&mut Vec<CategoryNode>> = vec![&mut forest];
    while let Some(level) = pending.pop() {
        level.sort_by(|a, b| {
            let ord = compare(&a.record, &b.record, key);
            match order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });
        pending.extend(level.iter_mut().map(|node| &mut node.children));
    }
    forest
}

/// Ascending comparison of two records by `key`.
pub fn compare(a: &CategoryRecord, b: &CategoryRecord, key: SortKey) -> Ordering {
    match key {
        SortKey::Name => compare_names(&a.name, &b.name),
        SortKey::ProductCount => a.products().cmp(&b.products()),
        SortKey::Revenue => a
            .revenue
            .unwrap_or(0.0)
            .total_cmp(&b.revenue.unwrap_or(0.0)),
        SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
    }
}

/// Letters compare case-insensitively first; names that differ only in case
/// fall back to a case-sensitive comparison so they never tie.
fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

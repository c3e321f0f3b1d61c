use std::collections::HashSet;
use std::sync::Arc;

use super::types::{CategoryId, CategoryNode};

/// Ids of the nodes the user has expanded.
///
/// Every operation returns a new set and leaves `self` untouched, so a caller
/// can detect changes with a plain equality check. Keyed by id, which keeps
/// expansion stable across tree rebuilds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionSet {
    ids: Arc<HashSet<CategoryId>>,
}

impl ExpansionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip one id.
    #[must_use]
    pub fn toggle(&self, id: &CategoryId) -> Self {
        let mut ids = (*self.ids).clone();
        if !ids.remove(id) {
            ids.insert(id.clone());
        }
        Self { ids: Arc::new(ids) }
    }

    /// Expand `id`, leaving it expanded if it already was.
    #[must_use]
    pub fn with(&self, id: CategoryId) -> Self {
        if self.ids.contains(&id) {
            return self.clone();
        }
        let mut ids = (*self.ids).clone();
        ids.insert(id);
        Self { ids: Arc::new(ids) }
    }

    /// Collapse `id`, leaving it collapsed if it already was.
    #[must_use]
    pub fn without(&self, id: &CategoryId) -> Self {
        if !self.ids.contains(id) {
            return self.clone();
        }
        let mut ids = (*self.ids).clone();
        ids.remove(id);
        Self { ids: Arc::new(ids) }
    }

    /// A set holding exactly `ids`. Callers pass the root ids of the current
    /// forest; nested nodes are only tracked once expanded individually.
    pub fn expand_all<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = CategoryId>,
    {
        Self {
            ids: Arc::new(ids.into_iter().collect()),
        }
    }

    pub fn collapse_all() -> Self {
        Self::default()
    }

    pub fn is_expanded(&self, id: &CategoryId) -> bool {
        self.ids.contains(id)
    }

    /// True when every id in `ids` is expanded. An empty `ids` is never "all expanded".
    pub fn all_expanded<'a, I>(&self, ids: I) -> bool
    where
        I: IntoIterator<Item = &'a CategoryId>,
    {
        let mut any = false;
        for id in ids {
            if !self.ids.contains(id) {
                return false;
            }
            any = true;
        }
        any
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Drop ids not in `present`, e.g. categories deleted since they were expanded.
    #[must_use]
    pub fn retain_present<'a, I>(&self, present: I) -> Self
    where
        I: IntoIterator<Item = &'a CategoryId>,
    {
        let present: HashSet<&CategoryId> = present.into_iter().collect();
        Self {
            ids: Arc::new(
                self.ids
                    .iter()
                    .filter(|id| present.contains(id))
                    .cloned()
                    .collect(),
            ),
        }
    }
}

// ============================================================================
// Visible Rows
// ============================================================================

/// A single row of the flattened tree, in display order.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeRow {
    pub id: CategoryId,
    pub name: String,
    pub level: usize,
    pub product_count: u64,
    pub has_children: bool,
    pub is_expanded: bool,
}

/// Flatten the forest into display rows, descending only into expanded nodes.
///
/// With `reveal_all` every node is treated as expanded; used while a search
/// is active so matches are never hidden behind a collapsed ancestor.
pub fn visible_rows(
    forest: &[CategoryNode],
    expansion: &ExpansionSet,
    reveal_all: bool,
) -> Vec<TreeRow> {
    let mut rows = Vec::new();
    let mut pending: Vec<&CategoryNode> = forest.iter().rev().collect();

    while let Some(node) = pending.pop() {
        let has_children = !node.children.is_empty();
        let is_expanded = has_children && (reveal_all || expansion.is_expanded(node.id()));

        rows.push(TreeRow {
            id: node.id().clone(),
            name: node.record.name.clone(),
            level: node.level,
            product_count: node.record.products(),
            has_children,
            is_expanded,
        });

        if is_expanded {
            pending.extend(node.children.iter().rev());
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::tree::{build, root_ids};
    use crate::category::types::CategoryRecord;

    fn id(n: i64) -> CategoryId {
        CategoryId::Int(n)
    }

    fn forest() -> Vec<CategoryNode> {
        build(&[
            CategoryRecord::new(1, "Electronics"),
            CategoryRecord::new(2, "Phones").with_parent(1),
            CategoryRecord::new(5, "Cases").with_parent(2),
            CategoryRecord::new(3, "Garden"),
        ])
    }

    #[test]
    fn test_toggle_returns_new_set() {
        let original = ExpansionSet::new();
        let toggled = original.toggle(&id(1));
        assert!(original.is_empty());
        assert!(toggled.is_expanded(&id(1)));
    }

    #[test]
    fn test_double_toggle_restores_set() {
        let original = ExpansionSet::expand_all([id(3)]);
        let restored = original.toggle(&id(1)).toggle(&id(1));
        assert_eq!(restored, original);
    }

    #[test]
    fn test_expand_all_tracks_roots_only() {
        let forest = forest();
        let set = ExpansionSet::expand_all(root_ids(&forest));
        assert!(set.is_expanded(&id(1)));
        assert!(!set.is_expanded(&id(2)));
        assert!(set.all_expanded(&root_ids(&forest)));
        assert!(!ExpansionSet::collapse_all().all_expanded(&root_ids(&forest)));
    }

    #[test]
    fn test_all_expanded_is_false_for_empty_ids() {
        let set = ExpansionSet::expand_all([id(1)]);
        assert!(!set.all_expanded(&[]));
    }

    #[test]
    fn test_visible_rows_respect_expansion() {
        let forest = forest();
        let collapsed = visible_rows(&forest, &ExpansionSet::new(), false);
        let names: Vec<&str> = collapsed.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Electronics", "Garden"]);
        assert!(collapsed[0].has_children);
        assert!(!collapsed[0].is_expanded);

        let expanded = visible_rows(&forest, &ExpansionSet::expand_all([id(1)]), false);
        let names: Vec<&str> = expanded.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Electronics", "Phones", "Garden"]);
        assert_eq!(expanded[1].level, 1);
    }

    #[test]
    fn test_reveal_all_shows_every_node() {
        let rows = visible_rows(&forest(), &ExpansionSet::new(), true);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[2].name, "Cases");
        assert_eq!(rows[2].level, 2);
    }

    #[test]
    fn test_retain_present_drops_stale_ids() {
        let set = ExpansionSet::expand_all([id(1), id(42)]);
        let records = [CategoryRecord::new(1, "Electronics")];
        let pruned = set.retain_present(records.iter().map(|r| &r.id));
        assert!(pruned.is_expanded(&id(1)));
        assert!(!pruned.is_expanded(&id(42)));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_with_and_without_are_idempotent() {
        let set = ExpansionSet::expand_all([id(1)]);
        assert_eq!(set.with(id(1)), set);
        assert_eq!(set.without(&id(9)), set);

        let moved = set.without(&id(1)).with(id(2));
        assert!(!moved.is_expanded(&id(1)));
        assert!(moved.is_expanded(&id(2)));
        assert_eq!(moved.len(), 1);
    }

    #[test]
    fn test_visible_rows_on_long_chain() {
        let records: Vec<CategoryRecord> = (0..50_000i64)
            .map(|i| CategoryRecord::new(i, "Link").with_parent(i - 1))
            .collect();
        let rows = visible_rows(&build(&records), &ExpansionSet::new(), true);
        assert_eq!(rows.len(), 50_000);
        assert_eq!(rows[49_999].level, 49_999);
    }
}

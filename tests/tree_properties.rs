//! Property tests for the pure tree pipeline over arbitrary record lists,
//! including dangling parents and parent cycles.

use std::cmp::Ordering;
use std::collections::HashSet;

use proptest::prelude::*;
use stockroom::category::{
    build, compare, filter, forest_len, matches, sort, CategoryId, CategoryNode, CategoryRecord,
    ExpansionSet, SortKey, SortOrder,
};

fn records_strategy() -> impl Strategy<Value = Vec<CategoryRecord>> {
    proptest::collection::vec(
        (
            "[a-dA-D ]{1,5}",
            proptest::option::of(0..40i64),
            0..5u64,
        ),
        0..30,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (name, parent, products))| {
                let mut record = CategoryRecord::new(i as i64, name).with_products(products);
                record.parent_id = parent.map(CategoryId::Int);
                record
            })
            .collect()
    })
}

fn key_strategy() -> impl Strategy<Value = SortKey> {
    prop_oneof![
        Just(SortKey::Name),
        Just(SortKey::ProductCount),
        Just(SortKey::Revenue),
        Just(SortKey::CreatedAt),
    ]
}

fn order_strategy() -> impl Strategy<Value = SortOrder> {
    prop_oneof![Just(SortOrder::Asc), Just(SortOrder::Desc)]
}

/// Pre-order walk as (id, level) pairs.
fn flatten(forest: &[CategoryNode]) -> Vec<(CategoryId, usize)> {
    let mut out = Vec::new();
    fn walk(nodes: &[CategoryNode], out: &mut Vec<(CategoryId, usize)>) {
        for node in nodes {
            out.push((node.id().clone(), node.level));
            walk(&node.children, out);
        }
    }
    walk(forest, &mut out);
    out
}

fn levels_are_consistent(nodes: &[CategoryNode], level: usize) -> bool {
    nodes
        .iter()
        .all(|n| n.level == level && levels_are_consistent(&n.children, level + 1))
}

fn siblings_are_ordered(nodes: &[CategoryNode], key: SortKey, order: SortOrder) -> bool {
    let expected = match order {
        SortOrder::Asc => Ordering::Greater,
        SortOrder::Desc => Ordering::Less,
    };
    nodes
        .windows(2)
        .all(|pair| compare(&pair[0].record, &pair[1].record, key) != expected)
        && nodes
            .iter()
            .all(|n| siblings_are_ordered(&n.children, key, order))
}

fn every_node_leads_to_a_match(nodes: &[CategoryNode], term: &str) -> bool {
    nodes.iter().all(|n| {
        (matches(&n.record, term) || !n.children.is_empty())
            && every_node_leads_to_a_match(&n.children, term)
    })
}

proptest! {
    #[test]
    fn prop_build_places_every_record_once(records in records_strategy()) {
        let forest = build(&records);
        let ids: Vec<CategoryId> = flatten(&forest).into_iter().map(|(id, _)| id).collect();
        let unique: HashSet<&CategoryId> = ids.iter().collect();
        prop_assert_eq!(ids.len(), records.len());
        prop_assert_eq!(unique.len(), records.len());
        prop_assert_eq!(forest_len(&forest), records.len());
    }

    #[test]
    fn prop_levels_follow_depth(records in records_strategy()) {
        prop_assert!(levels_are_consistent(&build(&records), 0));
    }

    #[test]
    fn prop_dangling_parents_become_roots(records in records_strategy()) {
        let present: HashSet<&CategoryId> = records.iter().map(|r| &r.id).collect();
        let roots: HashSet<CategoryId> = build(&records).iter().map(|n| n.id().clone()).collect();
        for record in &records {
            let dangling = record.parent_id.as_ref().map_or(true, |p| !present.contains(p));
            if dangling {
                prop_assert!(roots.contains(&record.id));
            }
        }
    }

    #[test]
    fn prop_sort_orders_siblings_and_keeps_nodes(
        records in records_strategy(),
        key in key_strategy(),
        order in order_strategy(),
    ) {
        let built = build(&records);
        let mut before: Vec<CategoryId> = flatten(&built).into_iter().map(|(id, _)| id).collect();
        let sorted = sort(built, key, order);
        let mut after: Vec<CategoryId> = flatten(&sorted).into_iter().map(|(id, _)| id).collect();

        prop_assert!(siblings_are_ordered(&sorted, key, order));
        prop_assert!(levels_are_consistent(&sorted, 0));
        before.sort();
        after.sort();
        prop_assert_eq!(before, after);
    }

    #[test]
    fn prop_sort_is_idempotent(
        records in records_strategy(),
        key in key_strategy(),
        order in order_strategy(),
    ) {
        let once = sort(build(&records), key, order);
        let twice = sort(once.clone(), key, order);
        prop_assert_eq!(flatten(&once), flatten(&twice));
    }

    #[test]
    fn prop_filter_keeps_matches_and_their_ancestors(
        records in records_strategy(),
        term in "[a-d]{1,2}",
    ) {
        let filtered = filter(build(&records), &term);
        let kept: HashSet<CategoryId> = flatten(&filtered).into_iter().map(|(id, _)| id).collect();

        for record in &records {
            if matches(record, &term) {
                prop_assert!(kept.contains(&record.id));
            }
        }
        prop_assert!(every_node_leads_to_a_match(&filtered, &term));
        prop_assert!(levels_are_consistent(&filtered, 0));
    }

    #[test]
    fn prop_blank_filter_is_identity(records in records_strategy(), term in " {0,3}") {
        let forest = build(&records);
        let filtered = filter(forest.clone(), &term);
        prop_assert_eq!(flatten(&forest), flatten(&filtered));
    }

    #[test]
    fn prop_double_toggle_restores_expansion(
        expanded in proptest::collection::hash_set(0..20i64, 0..10),
        target in 0..20i64,
    ) {
        let set = ExpansionSet::expand_all(expanded.into_iter().map(CategoryId::Int));
        let id = CategoryId::Int(target);
        let toggled = set.toggle(&id);
        prop_assert_ne!(toggled.is_expanded(&id), set.is_expanded(&id));
        prop_assert_eq!(toggled.toggle(&id), set);
    }
}

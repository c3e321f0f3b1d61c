use std::collections::HashMap;

use super::types::{CategoryId, CategoryNode, CategoryRecord};

/// Build a forest from flat records.
///
/// Children are attached to the record their `parent_id` names. A record whose
/// parent is absent, or names an id not in `records`, becomes a root. Roots and
/// siblings keep input order.
///
/// Records caught in a parent cycle are unreachable from any root. They are
/// promoted to roots in input order, with the edge back into the already placed
/// part of the cycle ignored, so every record appears exactly once and the
/// builder always terminates.
pub fn build(records: &[CategoryRecord]) -> Vec<CategoryNode> {
    let index: HashMap<&CategoryId, usize> = records
        .iter()
        .enumerate()
        .map(|(i, record)| (&record.id, i))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); records.len()];
    let mut roots = Vec::new();

    for (i, record) in records.iter().enumerate() {
        let parent = record
            .parent_id
            .as_ref()
            .and_then(|pid| index.get(pid))
            .copied();
        match parent {
            Some(p) if p != i => children[p].push(i),
            _ => roots.push(i),
        }
    }

    // Placement walks an explicit stack so chain depth is bounded by the heap,
    // not the thread stack. `order` ends up in pre-order.
    let mut placed = vec![false; records.len()];
    let mut levels = vec![0usize; records.len()];
    let mut placed_children: Vec<Vec<usize>> = vec![Vec::new(); records.len()];
    let mut order = Vec::with_capacity(records.len());
    let mut forest_roots = Vec::new();

    for i in roots {
        place(i, &children, &mut placed, &mut levels, &mut placed_children, &mut order);
        forest_roots.push(i);
    }

    for i in 0..records.len() {
        if !placed[i] {
            tracing::warn!(
                id = %records[i].id,
                parent = ?records[i].parent_id,
                "Category is part of a parent cycle, promoting to root"
            );
            place(i, &children, &mut placed, &mut levels, &mut placed_children, &mut order);
            forest_roots.push(i);
        }
    }

    // Reverse pre-order visits every descendant before its ancestor, so each
    // node's children are finished by the time the node itself is built.
    let mut slots: Vec<Option<CategoryNode>> = (0..records.len()).map(|_| None).collect();
    for &i in order.iter().rev() {
        let kids = placed_children[i]
            .iter()
            .filter_map(|&child| slots[child].take())
            .collect();
        slots[i] = Some(CategoryNode {
            record: records[i].clone(),
            children: kids,
            level: levels[i],
        });
    }

    forest_roots
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect()
}

/// Place `root` and every not-yet-placed descendant. A node claimed earlier
/// (the back edge of a cycle) is skipped.
fn place(
    root: usize,
    children: &[Vec<usize>],
    placed: &mut [bool],
    levels: &mut [usize],
    placed_children: &mut [Vec<usize>],
    order: &mut Vec<usize>,
) {
    let mut stack: Vec<(usize, usize, Option<usize>)> = vec![(root, 0, None)];
    while let Some((i, level, parent)) = stack.pop() {
        if placed[i] {
            continue;
        }
        placed[i] = true;
        levels[i] = level;
        order.push(i);
        if let Some(p) = parent {
            placed_children[p].push(i);
        }
        stack.extend(children[i].iter().rev().map(|&child| (child, level + 1, Some(i))));
    }
}

/// Ids of the top-level nodes, in forest order.
pub fn root_ids(forest: &[CategoryNode]) -> Vec<CategoryId> {
    forest.iter().map(|node| node.id().clone()).collect()
}

/// Depth-first search for a node by id.
pub fn find<'a>(forest: &'a [CategoryNode], id: &CategoryId) -> Option<&'a CategoryNode> {
    let mut pending: Vec<&CategoryNode> = forest.iter().rev().collect();
    while let Some(node) = pending.pop() {
        if node.id() == id {
            return Some(node);
        }
        pending.extend(node.children.iter().rev());
    }
    None
}

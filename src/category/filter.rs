use super::types::{CategoryNode, CategoryRecord};
use crate::util::slugify;

/// Prune the forest to the branches that contain a match for `term`.
///
/// A node survives if it matches or if any descendant does. Surviving nodes
/// keep only surviving children, so every leaf in the result matches and every
/// internal node sits on a path to a match. A blank term returns the forest
/// untouched.
pub fn filter(forest: Vec<CategoryNode>, term: &str) -> Vec<CategoryNode> {
    let needle = term.trim();
    if needle.is_empty() {
        return forest;
    }
    let needle = needle.to_lowercase();
    filter_by(forest, |record| matches_lowercase(record, &needle))
}

/// Prune the forest to the branches that contain a record accepted by `keep`,
/// with the same ancestor rules as [`filter`].
pub fn filter_by<F>(mut forest: Vec<CategoryNode>, keep: F) -> Vec<CategoryNode>
where
    F: Fn(&CategoryRecord) -> bool,
{
    // Pass one numbers nodes in pre-order and records subtree sizes, so the
    // second pass can find a child's number without visiting pruned branches.
    let mut parents: Vec<Option<usize>> = Vec::new();
    let mut survives: Vec<bool> = Vec::new();
    let mut pending: Vec<(&CategoryNode, Option<usize>)> =
        forest.iter().rev().map(|node| (node, None)).collect();
    while let Some((node, parent)) = pending.pop() {
        let index = parents.len();
        parents.push(parent);
        survives.push(keep(&node.record));
        pending.extend(node.children.iter().rev().map(|child| (child, Some(index))));
    }

    let mut sizes = vec![1usize; parents.len()];
    for index in (0..parents.len()).rev() {
        if let Some(parent) = parents[index] {
            sizes[parent] += sizes[index];
            survives[parent] |= survives[index];
        }
    }

    let mut levels: Vec<(&mut Vec<CategoryNode>, usize)> = vec![(&mut forest, 0)];
    while let Some((level, first)) = levels.pop() {
        let mut numbers = Vec::with_capacity(level.len());
        let mut next = first;
        for _ in level.iter() {
            numbers.push(next);
            next += sizes[next];
        }

        let mut position = 0;
        let mut kept = Vec::new();
        level.retain(|_| {
            let number = numbers[position];
            position += 1;
            if survives[number] {
                kept.push(number + 1);
            }
            survives[number]
        });
        levels.extend(level.iter_mut().map(|node| &mut node.children).zip(kept));
    }

    forest
}

/// Case-insensitive substring match on name, description and derived slug.
pub fn matches(record: &CategoryRecord, term: &str) -> bool {
    let needle = term.trim();
    if needle.is_empty() {
        return true;
    }
    matches_lowercase(record, &needle.to_lowercase())
}

fn matches_lowercase(record: &CategoryRecord, needle: &str) -> bool {
    record.name.to_lowercase().contains(needle)
        || record
            .description
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains(needle))
        || slugify(&record.name).contains(needle)
}

use crate::category::{CategoryId, CategoryPatch, CategoryRecord};

/// A mutation the store has not answered yet.
#[derive(Debug, Clone)]
pub struct PendingOperation {
    /// Client-generated, unique per controller.
    pub correlation: u64,
    pub kind: PendingKind,
}

#[derive(Debug, Clone)]
pub enum PendingKind {
    /// Holds the provisional record shown while the create is in flight.
    Create(CategoryRecord),
    Update { id: CategoryId, patch: CategoryPatch },
    Remove(Vec<CategoryId>),
}

impl PendingOperation {
    /// Apply the optimistic effect of this operation to `records`.
    ///
    /// Idempotent, so it can be replayed over a fetch result that may or may
    /// not already include the change.
    pub fn apply_to(&self, records: &mut Vec<CategoryRecord>) {
        match &self.kind {
            PendingKind::Create(record) => {
                if !records.iter().any(|r| r.id == record.id) {
                    records.push(record.clone());
                }
            }
            PendingKind::Update { id, patch } => {
                if let Some(record) = records.iter_mut().find(|r| &r.id == id) {
                    record.apply(patch);
                }
            }
            PendingKind::Remove(ids) => records.retain(|r| !ids.contains(&r.id)),
        }
    }
}

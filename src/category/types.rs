use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque category identifier.
///
/// Backends hand out either integer or string ids; both round-trip through
/// serde untouched. `Provisional` ids are minted locally for optimistic
/// creates and are never sent to a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategoryId {
    Int(i64),
    Text(String),
    #[serde(skip)]
    Provisional(u64),
}

impl CategoryId {
    /// True for ids minted locally that the store has not confirmed yet.
    pub fn is_provisional(&self) -> bool {
        matches!(self, CategoryId::Provisional(_))
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryId::Int(id) => write!(f, "{}", id),
            CategoryId::Text(id) => f.write_str(id),
            CategoryId::Provisional(n) => write!(f, "pending-{}", n),
        }
    }
}

impl From<i64> for CategoryId {
    fn from(id: i64) -> Self {
        CategoryId::Int(id)
    }
}

impl From<&str> for CategoryId {
    fn from(id: &str) -> Self {
        CategoryId::Text(id.to_owned())
    }
}

/// Parses integers as `Int`, anything else as `Text`. Never fails.
impl FromStr for CategoryId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<i64>() {
            Ok(id) => CategoryId::Int(id),
            Err(_) => CategoryId::Text(s.to_owned()),
        })
    }
}

// ============================================================================
// Records
// ============================================================================

/// Business status of a category. Opaque to the tree engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryStatus {
    #[default]
    Active,
    Inactive,
    Archived,
}

impl CategoryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CategoryStatus::Active => "active",
            CategoryStatus::Inactive => "inactive",
            CategoryStatus::Archived => "archived",
        }
    }
}

impl FromStr for CategoryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(CategoryStatus::Active),
            "inactive" => Ok(CategoryStatus::Inactive),
            "archived" => Ok(CategoryStatus::Archived),
            other => Err(format!("unknown category status '{}'", other)),
        }
    }
}

/// A category exactly as the store returns it: flat, with an optional parent link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRecord {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<CategoryId>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub status: CategoryStatus,
    /// Missing counts are treated as 0 everywhere.
    #[serde(default)]
    pub product_count: Option<u64>,
    #[serde(default)]
    pub revenue: Option<f64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl CategoryRecord {
    /// Minimal record with only an id and a name; the rest is defaulted.
    pub fn new(id: impl Into<CategoryId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent_id: None,
            description: None,
            color: None,
            icon: None,
            status: CategoryStatus::Active,
            product_count: None,
            revenue: None,
            created_at: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<CategoryId>) -> Self {
        self.parent_id = Some(parent.into());
        self
    }

    pub fn with_products(mut self, count: u64) -> Self {
        self.product_count = Some(count);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn products(&self) -> u64 {
        self.product_count.unwrap_or(0)
    }

    /// Apply a partial update in place. Only the fields set on the patch change.
    pub fn apply(&mut self, patch: &CategoryPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(parent) = &patch.parent_id {
            self.parent_id = parent.clone();
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
        if let Some(color) = &patch.color {
            self.color = Some(color.clone());
        }
        if let Some(icon) = &patch.icon {
            self.icon = Some(icon.clone());
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
    }
}

/// Payload for creating a category. The store assigns the id and owns the
/// product count, revenue and creation timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCategory {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CategoryId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub status: CategoryStatus,
}

impl NewCategory {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn under(mut self, parent: impl Into<CategoryId>) -> Self {
        self.parent_id = Some(parent.into());
        self
    }

    /// The record shown locally while the create is in flight.
    pub(crate) fn to_provisional(&self, id: CategoryId, now: DateTime<Utc>) -> CategoryRecord {
        CategoryRecord {
            id,
            name: self.name.clone(),
            parent_id: self.parent_id.clone(),
            description: self.description.clone(),
            color: self.color.clone(),
            icon: self.icon.clone(),
            status: self.status,
            product_count: Some(0),
            revenue: Some(0.0),
            created_at: Some(now),
        }
    }
}

/// Partial update. `None` leaves a field untouched.
///
/// `parent_id` is doubly optional: `Some(None)` moves the category to the
/// root level and serializes as an explicit `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Option<CategoryId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CategoryStatus>,
}

impl CategoryPatch {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn move_to(parent: Option<CategoryId>) -> Self {
        Self {
            parent_id: Some(parent),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ============================================================================
// Tree Nodes
// ============================================================================

/// A record placed in the forest. Rebuilt from flat records on every change.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryNode {
    pub record: CategoryRecord,
    pub children: Vec<CategoryNode>,
    /// Roots are level 0; each generation adds one.
    pub level: usize,
}

impl CategoryNode {
    pub fn id(&self) -> &CategoryId {
        &self.record.id
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn subtree_len(&self) -> usize {
        forest_len(std::slice::from_ref(self))
    }
}

// Hierarchies can be arbitrarily deep, so the default recursive drop glue
// would overflow the stack on long parent chains. Detach children onto a
// heap-allocated work list instead.
impl Drop for CategoryNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// Total node count across a forest.
pub fn forest_len(forest: &[CategoryNode]) -> usize {
    let mut count = 0;
    let mut pending: Vec<&CategoryNode> = forest.iter().collect();
    while let Some(node) = pending.pop() {
        count += 1;
        pending.extend(node.children.iter());
    }
    count
}

// ============================================================================
// Sorting Parameters
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    #[default]
    Name,
    ProductCount,
    Revenue,
    CreatedAt,
}

impl SortKey {
    /// Wire name used in store query strings.
    pub fn as_param(self) -> &'static str {
        match self {
            SortKey::Name => "name",
            SortKey::ProductCount => "productCount",
            SortKey::Revenue => "revenue",
            SortKey::CreatedAt => "createdAt",
        }
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "name" => Ok(SortKey::Name),
            "productcount" | "products" => Ok(SortKey::ProductCount),
            "revenue" => Ok(SortKey::Revenue),
            "createdat" | "created" => Ok(SortKey::CreatedAt),
            _ => Err(format!("unknown sort key '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_param(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(format!("unknown sort order '{}'", s)),
        }
    }
}

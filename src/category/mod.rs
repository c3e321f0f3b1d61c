//! Category hierarchy engine.
//!
//! Pure functions over flat category records:
//!
//! - [`build`] turns records into a forest
//! - [`sort`] orders every level of a forest
//! - [`filter`] prunes a forest to search matches and their ancestors
//! - [`ExpansionSet`] tracks expanded nodes by id
//!
//! None of these perform I/O or hold state between calls. The usual pipeline
//! is [`derive_forest`].
//!
//! ```
//! use stockroom::category::{derive_forest, CategoryRecord, SortKey, SortOrder};
//!
//! let records = vec![
//!     CategoryRecord::new(1, "Electronics"),
//!     CategoryRecord::new(2, "Phones").with_parent(1),
//! ];
//! let forest = derive_forest(&records, SortKey::Name, SortOrder::Asc, "phone");
//! assert_eq!(forest[0].children[0].name(), "Phones");
//! ```

mod expansion;
mod filter;
mod sort;
mod tree;
mod types;
pub mod validate;

pub use expansion::{visible_rows, ExpansionSet, TreeRow};
pub use filter::{filter, filter_by, matches};
pub use sort::{compare, sort};
pub use tree::{build, find, root_ids};
pub use types::{
    forest_len, CategoryId, CategoryNode, CategoryPatch, CategoryRecord, CategoryStatus,
    NewCategory, SortKey, SortOrder,
};

/// Build, sort, then filter.
pub fn derive_forest(
    records: &[CategoryRecord],
    key: SortKey,
    order: SortOrder,
    term: &str,
) -> Vec<CategoryNode> {
    filter(sort(build(records), key, order), term)
}

//! Plain-text rendering for the command-line front end.
//!
//! - `tree` - one line per visible row, indented by level
//! - `status` - the summary line under the tree

mod status;
mod tree;

pub use status::status_line;
pub use tree::{render_row, render_rows};

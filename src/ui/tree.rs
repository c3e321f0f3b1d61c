use std::borrow::Cow;

use crate::category::TreeRow;
use crate::util::{display_width, pad_to_width, strip_control_chars};

/// Spaces per tree level.
const INDENT: usize = 2;

/// Width of the product count column.
const COUNT_WIDTH: usize = 7;

/// Render one row: indentation, expansion marker, name, product count.
///
/// The name is padded so counts line up in a column `width` characters wide.
/// Names wider than the space left are not truncated.
pub fn render_row(row: &TreeRow, width: usize) -> String {
    let indent = " ".repeat(row.level * INDENT);
    let marker = if row.has_children {
        if row.is_expanded {
            "v "
        } else {
            "> "
        }
    } else {
        "  "
    };

    // Names come from the store; never let them drive the terminal.
    let name: Cow<'_, str> = strip_control_chars(&row.name);
    let prefix_width = indent.len() + marker.len();
    let name_width = width.saturating_sub(prefix_width + COUNT_WIDTH + 1);

    let mut line = String::with_capacity(width);
    line.push_str(&indent);
    line.push_str(marker);
    if display_width(&name) >= name_width {
        line.push_str(&name);
    } else {
        line.push_str(&pad_to_width(&name, name_width));
    }
    line.push(' ');
    line.push_str(&format!("{:>width$}", row.product_count, width = COUNT_WIDTH));
    line
}

pub fn render_rows(rows: &[TreeRow], width: usize) -> Vec<String> {
    rows.iter().map(|row| render_row(row, width)).collect()
}

//! Text utilities shared by the engine and the command-line front end.
//!
//! - **Sanitizing**: stripping control characters from user-supplied names
//! - **Slugs**: the derived slug the search filter matches against
//! - **Width**: Unicode-aware padding for terminal output
//!
//! ```
//! use stockroom::util::{slugify, strip_control_chars};
//!
//! assert_eq!(slugify("Home & Garden"), "home-garden");
//! assert_eq!(strip_control_chars("\x1b[1mBold\x1b[0m"), "Bold");
//! ```

mod text;

pub use text::{display_width, pad_to_width, slugify, strip_control_chars};

/// Maximum accepted search term length, in bytes.
pub const MAX_SEARCH_TERM_LENGTH: usize = 256;

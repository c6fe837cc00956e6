//! Path utilities.
//!
//! Pure functions for path manipulation. No side effects beyond
//! `normalize_path`'s canonicalization.
//!
//! - [`fs`]: Filesystem path normalization and root-relative names
//! - [`url`]: Remote reference detection

pub mod fs;
pub mod url;

pub use fs::{clean_path, normalize_path, relative_to, to_slash};
pub use url::{is_remote, parse_remote};

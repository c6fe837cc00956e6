//! Shared helpers with no pipeline knowledge.

pub mod path;
mod plural;

pub use plural::{plural_count, plural_s};

//! Configuration section definitions.
//!
//! Each module corresponds to a section in `kiln.toml`:
//!
//! | Module        | TOML Section     | Purpose                              |
//! |---------------|------------------|--------------------------------------|
//! | `build`       | `[build]`        | Source/destination paths, includes   |
//! | `source_maps` | `[source_maps]`  | Source map emission                  |
//! | `css`         | `[css]`          | Built-in lightningcss stage          |
//! | `js`          | `[js]`           | Built-in oxc minify stage            |
//! | `fetch`       | `[fetch]`        | Remote include fetching              |

/// Declare the `FIELDS` constant of a section: one [`FieldPath`] per key.
///
/// [`FieldPath`]: crate::config::FieldPath
macro_rules! config_fields {
    ($config:ident => $fields:ident, $section:literal { $($field:ident),* $(,)? }) => {
        #[derive(Debug, Clone, Copy)]
        pub struct $fields {
            $(pub $field: $crate::config::FieldPath,)*
        }

        impl $config {
            pub const FIELDS: $fields = $fields {
                $($field: $crate::config::FieldPath::new(concat!($section, ".", stringify!($field))),)*
            };
        }
    };
}

mod build;
mod css;
mod fetch;
mod js;
mod source_maps;

pub use build::BuildConfig;
pub use css::CssConfig;
pub use fetch::FetchConfig;
pub use js::JsConfig;
pub use source_maps::SourceMapsConfig;

use crate::config::{ConfigDiagnostics, FieldPath};

/// Check a list of file extensions (`.css`, `.tmpl.ts`).
fn validate_extensions(field: FieldPath, extensions: &[String], diag: &mut ConfigDiagnostics) {
    if extensions.is_empty() {
        diag.error(field, "at least one extension is required");
        return;
    }
    for ext in extensions {
        if !ext.starts_with('.') || ext.len() < 2 {
            diag.error_with_hint(
                field,
                format!("invalid extension `{ext}`"),
                "extensions start with a dot, e.g. `.css`",
            );
        }
    }
}

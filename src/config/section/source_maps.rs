//! `[source_maps]` section configuration.
//!
//! ```toml
//! [source_maps]
//! enable = true           # Write a map for every transformed file
//! inline = false          # Embed as a `data:` URL instead of a `.map` file
//! sources_content = true  # Include the original sources in the map
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceMapsConfig {
    pub enable: bool,
    pub inline: bool,
    pub sources_content: bool,
}

config_fields!(SourceMapsConfig => SourceMapsConfigFields, "source_maps" { enable, inline, sources_content });

impl Default for SourceMapsConfig {
    fn default() -> Self {
        Self {
            enable: true,
            inline: false,
            sources_content: true,
        }
    }
}

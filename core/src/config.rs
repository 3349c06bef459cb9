//! Environment-driven configuration, read once at process startup.
//!
//! Every control-plane process reads the same `CP_*` family; each binary
//! picks the subset it cares about. Kept here so the state store and task
//! broker can use the reserved-slug list and data directory without every
//! downstream crate re-parsing environment variables.

use std::path::PathBuf;

const DEFAULT_RESERVED_SLUGS: &[&str] = &[
    "app", "api", "www", "mail", "admin", "portal", "static", "assets", "sandbox",
];

#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Directory holding `state.json` (the C1 state store) and task broker
    /// persistence, if any is configured.
    pub data_dir: PathBuf,
    /// Slugs that may never be claimed by a workspace or sandbox.
    pub reserved_slugs: Vec<String>,
}

impl CoreConfig {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("CP_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".cp-data"));

        let reserved_slugs = std::env::var("CP_RESERVED_SLUGS")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|list| !list.is_empty())
            .unwrap_or_else(|| {
                DEFAULT_RESERVED_SLUGS
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            });

        Self {
            data_dir,
            reserved_slugs,
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

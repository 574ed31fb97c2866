//! Installer configuration (labkit.toml).
//!
//! Names the directory layout, signature markers, user-content allow-list,
//! managed processes, shared runtime locations and the component list.

pub mod parser;
pub mod schema;
pub mod store;

pub use parser::{parse_lab_toml, parse_lab_toml_str, to_toml};
pub use schema::{
    ComponentConfig, DiscoveryConfig, LabConfig, LayoutConfig, SharedRuntimeConfig,
    SignatureConfig, UninstallConfig,
};
pub use store::{CONFIG_FILE_NAME, ConfigStore};

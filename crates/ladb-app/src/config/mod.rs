//! Configuration and persisted state for LADB
//!
//! Supports:
//! - `<config_dir>/ladb/config.toml` - Global settings
//! - `<data_dir>/state.toml` - Last connected port and pairing memory

pub mod preferences;
pub mod settings;
pub mod types;

pub use preferences::{load_preferences, save_preferences};
pub use settings::{default_config_path, default_data_dir, init_config, load_settings};
pub use types::*;

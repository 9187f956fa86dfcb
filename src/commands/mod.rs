//! Command handlers for micmon.
//!
//! # Commands
//! - `record`: the recorder screen (default)
//! - `list_devices`: list audio devices
//! - `logs`: show recent log entries
//! - `config`: open the configuration file in an editor

pub mod config;
pub mod list_devices;
pub mod logs;
pub mod record;

pub use config::handle_config;
pub use list_devices::handle_list_devices;
pub use logs::handle_logs;
pub use record::handle_record;

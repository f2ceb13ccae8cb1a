//! CLI command implementations.

pub mod config_cmd;
pub mod memory;
pub mod pool_file;
pub mod run;
pub mod setup;

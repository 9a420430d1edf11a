//! Command handlers.

pub mod config_cmd;

//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML configuration from the
//! platform-appropriate directory (or an explicit `--config` path), validates
//! the switching rules, and writes generated configurations back to disk.

pub mod config;

//! Infrastructure layer: adapters to the operating system and the file system.
//!
//! - [`display_api`]: monitor enumeration and DDC/CI.
//! - [`device_notifications`]: trigger-device arrival and removal.
//! - [`storage`]: TOML configuration.
//!
//! OS-facing modules expose a trait, a Windows implementation re-exported as
//! `Native…`, and an always-compiled fake for tests.

pub mod device_notifications;
pub mod display_api;
pub mod storage;

//! # monswitch
//!
//! Switches monitor inputs over DDC/CI when a trigger USB device (usually a
//! keyboard on a USB switch) connects or disconnects.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  main.rs (CLI)                                            │
//! ├───────────────────────────────────────────────────────────┤
//! │  application   load_monitors · monitor_inputs · dispatch  │
//! │                generate_config                            │
//! ├───────────────────────────────────────────────────────────┤
//! │  infrastructure display_api · device_notifications ·      │
//! │                 storage                                   │
//! ├───────────────────────────────────────────────────────────┤
//! │  monswitch-core  capabilities parser · identities · rules │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! OS access goes through the `DisplayApi` and `DeviceNotificationSource`
//! traits.  Windows implementations are compiled on Windows only; fakes are
//! always available so the application layer is tested on every platform.

pub mod application;
pub mod infrastructure;

//! Application layer: the use cases built on the infrastructure traits.
//!
//! - [`load_monitors`]: find the physical monitors and their identities.
//! - [`monitor_inputs`]: read a monitor's valid and selected inputs.
//! - [`dispatch`]: the background worker applying rules on device changes.
//! - [`generate_config`]: suggest a configuration from the live monitors.

pub mod dispatch;
pub mod generate_config;
pub mod load_monitors;
pub mod monitor_inputs;

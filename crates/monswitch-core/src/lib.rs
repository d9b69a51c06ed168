//! # monswitch-core
//!
//! Shared library for monswitch containing the DDC/CI capabilities parser,
//! the monitor identity model, and the rule matching used to decide which
//! monitors switch input when a trigger device comes or goes.
//!
//! It has zero dependencies on OS APIs, async runtimes, or UI frameworks.
//!
//! # Architecture overview (for beginners)
//!
//! monswitch is a software companion to a hardware USB switch.  When the USB
//! switch moves your keyboard (or mouse) to another computer, monswitch sees
//! the device disappear and tells each configured monitor, over the video
//! cable, to show a different input.  When the keyboard comes back, it
//! switches the monitors back.
//!
//! The "telling the monitor" part uses DDC/CI: small commands that read or
//! write a *VCP code* (a one-byte control identifier such as `0x60`, input
//! select).  This crate (`monswitch-core`) is the pure foundation.  It defines:
//!
//! - **`capabilities`** – A recursive-descent parser for the MCCS
//!   capabilities string a monitor reports about itself, e.g.
//!   `(prot(monitor)type(LCD)vcp(02 04 60(0F 11 12))mccs_ver(2.1))`.
//!
//! - **`domain`** – Monitor identities, the device-id patterns used to
//!   correlate OS enumerations, switching rules, and device actions.

pub mod capabilities;
pub mod domain;

// Re-export the most-used types at the crate root so callers can write
// `monswitch_core::MonitorRule` instead of `monswitch_core::domain::rules::MonitorRule`.
pub use capabilities::{parse_vcp_component, try_parse_vcp_component, CapabilitiesError, VcpComponent};
pub use domain::action::DeviceAction;
pub use domain::device_id::{decode_serial_number, DeviceKey};
pub use domain::monitor::{MonitorIdentity, MonitorInputs, INPUT_SELECT_VCP_CODE};
pub use domain::rules::{matching_monitors, MonitorRule, VcpSetting};

//! Domain entities for monswitch.
//!
//! This module contains pure business logic with no infrastructure dependencies.
//!
//! # What lives here? (for beginners)
//!
//! - **`action`** – The two things a trigger device can do: arrive or leave.
//! - **`monitor`** – What we know about one physical monitor once the three
//!   OS enumerations have been joined, and a snapshot of its inputs.
//! - **`device_id`** – The fixed-format device-id patterns that let us prove
//!   a display device and a WMI record describe the same monitor.
//! - **`rules`** – User rules: which monitors to match and which VCP value to
//!   write when the trigger device arrives or leaves.

pub mod action;
pub mod device_id;
pub mod monitor;
pub mod rules;

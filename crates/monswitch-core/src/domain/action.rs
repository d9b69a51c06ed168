//! Trigger device actions delivered by the OS device-change notifications.

use std::fmt;

/// What happened to a device of the trigger class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceAction {
    /// A device of the trigger class was connected.
    Arrival,
    /// A device of the trigger class was disconnected.
    Removal,
}

impl fmt::Display for DeviceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceAction::Arrival => f.write_str("arrival"),
            DeviceAction::Removal => f.write_str("removal"),
        }
    }
}

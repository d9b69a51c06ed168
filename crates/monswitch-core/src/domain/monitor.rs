//! Monitor identity and input snapshots.

use std::fmt;

/// VCP code for input source selection (MCCS `0x60`).
pub const INPUT_SELECT_VCP_CODE: u8 = 0x60;

/// Everything monswitch knows about one physical monitor, minus its OS handle.
///
/// `device` and `description` always come from the physical-monitor
/// enumeration.  `adapter` is only present when the monitor could be joined to
/// a display device record, and `serial_number` only when that display device
/// could further be correlated with a WMI monitor-id record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorIdentity {
    /// OS output identifier, e.g. `\\.\DISPLAY1`.
    pub device: String,
    /// Human-readable monitor name reported with the physical monitor.
    pub description: String,
    /// Human-readable adapter name, e.g. `NVIDIA GeForce RTX 3080`.
    pub adapter: Option<String>,
    /// Serial number from the monitor's EDID, as reported by WMI.
    pub serial_number: Option<String>,
}

impl AsRef<MonitorIdentity> for MonitorIdentity {
    fn as_ref(&self) -> &MonitorIdentity {
        self
    }
}

impl fmt::Display for MonitorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} on {}", self.description, self.device)?;
        if let Some(adapter) = &self.adapter {
            write!(f, ", adapter {adapter:?}")?;
        }
        if let Some(serial) = &self.serial_number {
            write!(f, ", serial {serial:?}")?;
        }
        Ok(())
    }
}

/// Snapshot of a monitor's input-selection capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorInputs {
    /// Input codes declared for VCP `0x60`, in declaration order.
    pub valid_inputs: Vec<u8>,
    /// The input currently shown by the monitor.
    pub selected_input: u8,
}

impl MonitorInputs {
    /// Returns the first declared input that is not the selected one.
    pub fn alternative_input(&self) -> Option<u8> {
        self.valid_inputs
            .iter()
            .copied()
            .find(|input| *input != self.selected_input)
    }
}

//! Monitor switching rules and wildcard matching.
//!
//! A rule names a monitor by up to three identity fields and says which VCP
//! value to write when the trigger device arrives (`attach`) or leaves
//! (`detach`).  Absent identity fields are wildcards; present ones must equal
//! the monitor's field exactly (case-sensitive).
//!
//! ```toml
//! [[monitors]]
//! description = "DELL U2720Q"
//! serial_number = "ABC123"
//! attach = { code = 0x60, value = 0x0F }   # DisplayPort 1
//! detach = { code = 0x60, value = 0x11 }   # HDMI 1
//! ```
//!
//! One monitor may match several rules and one rule may match several
//! monitors; the dispatcher writes the setting once per (rule, monitor) match.

use serde::{Deserialize, Serialize};

use super::action::DeviceAction;
use super::monitor::MonitorIdentity;

/// A single VCP write: `code` is set to `value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcpSetting {
    /// VCP code, e.g. `0x60` for input select.
    pub code: u8,
    /// New value for the code.
    pub value: u32,
}

/// A user rule: which monitors to match and what to write to them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorRule {
    /// Required monitor description, or any when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Required adapter string, or any when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,
    /// Required serial number, or any when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    /// Setting applied when the trigger device arrives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attach: Option<VcpSetting>,
    /// Setting applied when the trigger device is removed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detach: Option<VcpSetting>,
}

impl MonitorRule {
    /// Returns the setting this rule applies for `action`, if any.
    pub fn setting_for(&self, action: DeviceAction) -> Option<VcpSetting> {
        match action {
            DeviceAction::Arrival => self.attach,
            DeviceAction::Removal => self.detach,
        }
    }

    /// Returns `true` if the rule carries at least one action.
    pub fn has_action(&self) -> bool {
        self.attach.is_some() || self.detach.is_some()
    }

    /// Returns `true` when every identity field set on the rule equals the
    /// monitor's corresponding field.
    pub fn matches(&self, monitor: &MonitorIdentity) -> bool {
        field_matches(self.adapter.as_deref(), monitor.adapter.as_deref())
            && field_matches(self.description.as_deref(), Some(&monitor.description))
            && field_matches(self.serial_number.as_deref(), monitor.serial_number.as_deref())
    }
}

fn field_matches(expected: Option<&str>, actual: Option<&str>) -> bool {
    match expected {
        None => true,
        Some(expected) => actual == Some(expected),
    }
}

/// Returns the monitors matched by `rule`, in their original order.
pub fn matching_monitors<'a, T>(rule: &'a MonitorRule, monitors: &'a [T]) -> impl Iterator<Item = &'a T> + 'a
where
    T: AsRef<MonitorIdentity>,
{
    monitors
        .iter()
        .filter(move |monitor| rule.matches(monitor.as_ref()))
}

//! Device-id patterns used to correlate display devices with WMI records.
//!
//! Windows reports the same monitor under two differently formatted names:
//!
//! ```text
//! display device id:  \\?\DISPLAY#DEL4321#5&2a3b4c5d&0&UID4353#{e6f07b5f-ee97-4a90-b076-33f57bf4eaa7}
//! WMI instance name:  DISPLAY\DEL4321\5&2a3b4c5d&0&UID4353_0
//! ```
//!
//! Both embed the same *adapter code* (`DEL4321`, the EDID manufacturer and
//! product) and *uid code* (`5&2a3b4c5d&0&UID4353`, the connection instance).
//! When both segments are equal the two records describe the same physical
//! monitor.

use std::sync::OnceLock;

use regex::Regex;

static DISPLAY_DEVICE_ID: OnceLock<Regex> = OnceLock::new();
static WMI_INSTANCE_NAME: OnceLock<Regex> = OnceLock::new();

fn display_device_id_pattern() -> &'static Regex {
    DISPLAY_DEVICE_ID.get_or_init(|| {
        Regex::new(r"(?i)^\\\\\?\\DISPLAY#([^#]+)#([^#]+)#\{[^}]+\}$")
            .expect("display device id pattern is valid")
    })
}

fn wmi_instance_name_pattern() -> &'static Regex {
    WMI_INSTANCE_NAME.get_or_init(|| {
        Regex::new(r"(?i)^DISPLAY\\([^\\]+)\\([^\\]+)_(\d+)$")
            .expect("WMI instance name pattern is valid")
    })
}

/// The two segments shared by a display device id and a WMI instance name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceKey {
    /// Manufacturer + product code, e.g. `DEL4321`.
    pub adapter_code: String,
    /// Connection instance code, e.g. `5&2a3b4c5d&0&UID4353`.
    pub uid_code: String,
}

impl DeviceKey {
    /// Parses a display device interface name
    /// (`\\?\DISPLAY#<adapterCode>#<uidCode>#{guid}`, case-insensitive).
    ///
    /// Returns `None` when `device_id` does not have that shape.
    pub fn from_display_device_id(device_id: &str) -> Option<Self> {
        let captures = display_device_id_pattern().captures(device_id)?;
        Some(Self {
            adapter_code: captures[1].to_string(),
            uid_code: captures[2].to_string(),
        })
    }

    /// Parses a WMI monitor instance name
    /// (`DISPLAY\<adapterCode>\<uidCode>_<index>`, case-insensitive).
    ///
    /// Returns `None` when `instance_name` does not have that shape.
    pub fn from_wmi_instance_name(instance_name: &str) -> Option<Self> {
        let captures = wmi_instance_name_pattern().captures(instance_name)?;
        Some(Self {
            adapter_code: captures[1].to_string(),
            uid_code: captures[2].to_string(),
        })
    }
}

/// Decodes a WMI `SerialNumberID` array.
///
/// The array is a fixed-size, NUL-padded buffer of character codes.  Trailing
/// NULs are trimmed.  An empty result and the literal `"0"` (which many
/// monitors report when no serial was programmed) both mean "no serial".
pub fn decode_serial_number(raw: &[u16]) -> Option<String> {
    let end = raw.iter().rposition(|&c| c != 0).map_or(0, |last| last + 1);
    let serial = String::from_utf16_lossy(&raw[..end]);

    if serial.is_empty() || serial == "0" {
        None
    } else {
        Some(serial)
    }
}

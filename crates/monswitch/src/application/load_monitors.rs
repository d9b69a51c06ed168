//! Use case: discover the physical monitors and work out who they are.
//!
//! Windows spreads a monitor's identity over three unrelated APIs, so
//! [`load_monitors`] makes three passes and then joins the results:
//!
//! ```text
//! 1. physical pass   HMONITOR ──► device name (\\.\DISPLAY1) + physical handle + description
//! 2. device pass     adapter  ──► device name (\\.\DISPLAY1) + adapter string + device id
//! 3. serial pass     WMI      ──► instance name + serial number
//!
//! join:  1 ⋈ 2 on device name           → adapter
//!        2 ⋈ 3 on (adapterCode, uidCode) → serial number
//! ```
//!
//! Each pass tolerates "nothing found"; only a failing OS call aborts the load.
//! A missing join simply leaves the optional identity fields empty, so rules
//! that match on description alone keep working on machines where WMI or the
//! display-device records are unhelpful.
//!
//! Display monitors driven by more than one physical monitor, and adapters
//! with more than one monitor device, are skipped with a warning because
//! their records cannot be paired reliably.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use monswitch_core::{decode_serial_number, DeviceKey, MonitorIdentity};

use crate::infrastructure::display_api::{
    DisplayApi, DisplayApiError, PhysicalMonitorHandle, RawMonitorHandle,
};

/// A physical monitor together with its owned DDC/CI handle.
///
/// Dropping the monitor releases the handle.
#[derive(Debug)]
pub struct Monitor {
    identity: MonitorIdentity,
    handle: PhysicalMonitorHandle,
}

impl Monitor {
    pub fn identity(&self) -> &MonitorIdentity {
        &self.identity
    }

    /// Raw handle for DDC/CI calls; valid while `self` is alive.
    pub fn handle(&self) -> RawMonitorHandle {
        self.handle.raw()
    }
}

impl AsRef<MonitorIdentity> for Monitor {
    fn as_ref(&self) -> &MonitorIdentity {
        &self.identity
    }
}

impl fmt::Display for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [handle {}]", self.identity, self.handle.raw())
    }
}

/// Result of the physical monitor pass.
#[derive(Debug)]
pub struct PhysicalMonitorEntry {
    pub device: String,
    pub description: String,
    pub handle: PhysicalMonitorHandle,
}

/// Result of the display device pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayDeviceEntry {
    /// Adapter device name, e.g. `\\.\DISPLAY1`.
    pub device: String,
    /// Adapter description, e.g. `NVIDIA GeForce RTX 3080`.
    pub adapter: String,
    /// Monitor device interface name, `\\?\DISPLAY#…`.
    pub device_id: String,
}

/// Result of the serial pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialNumberEntry {
    pub key: DeviceKey,
    pub serial_number: String,
}

/// Discovers every addressable physical monitor.
///
/// # Errors
///
/// Returns the first [`DisplayApiError`] raised by an OS call.  Handles
/// opened before the failure are released.
pub fn load_monitors(api: &Arc<dyn DisplayApi>) -> Result<Vec<Monitor>, DisplayApiError> {
    let physical = load_physical_monitors(api)?;
    let devices = load_display_devices(api.as_ref())?;
    let serials = load_serial_numbers(api.as_ref())?;

    let monitors = connect_monitor_data(physical, &devices, &serials);
    debug!(
        monitors = monitors.len(),
        display_devices = devices.len(),
        serial_numbers = serials.len(),
        "monitors loaded"
    );
    Ok(monitors)
}

fn load_physical_monitors(api: &Arc<dyn DisplayApi>) -> Result<Vec<PhysicalMonitorEntry>, DisplayApiError> {
    let mut entries = Vec::new();

    for display_monitor in api.enumerate_display_monitors()? {
        let device = api.monitor_device_name(display_monitor)?;
        let count = api.physical_monitor_count(display_monitor)?;
        if count > 1 {
            warn!("{device} is driven by {count} physical monitors; skipping it");
            continue;
        }

        for info in api.physical_monitors(display_monitor)? {
            entries.push(PhysicalMonitorEntry {
                device: device.clone(),
                description: info.description,
                handle: PhysicalMonitorHandle::new(info.handle, Arc::clone(api)),
            });
        }
    }

    Ok(entries)
}

fn load_display_devices(api: &dyn DisplayApi) -> Result<Vec<DisplayDeviceEntry>, DisplayApiError> {
    let mut entries = Vec::new();

    for index in 0u32.. {
        let Some(adapter) = api.display_adapter(index)? else {
            break;
        };
        let Some(monitor) = api.display_monitor(&adapter.device_name, 0)? else {
            debug!("adapter {} has no monitor", adapter.device_name);
            continue;
        };
        if api.display_monitor(&adapter.device_name, 1)?.is_some() {
            warn!("adapter {} drives more than one monitor; skipping it", adapter.device_name);
            continue;
        }

        entries.push(DisplayDeviceEntry {
            device: adapter.device_name,
            adapter: adapter.device_string,
            device_id: monitor.device_id,
        });
    }

    Ok(entries)
}

fn load_serial_numbers(api: &dyn DisplayApi) -> Result<Vec<SerialNumberEntry>, DisplayApiError> {
    let mut entries = Vec::new();

    for record in api.monitor_id_records()? {
        let Some(key) = DeviceKey::from_wmi_instance_name(&record.instance_name) else {
            warn!("unexpected WMI monitor instance name {:?}", record.instance_name);
            continue;
        };
        match decode_serial_number(&record.serial_number_id) {
            Some(serial_number) => entries.push(SerialNumberEntry { key, serial_number }),
            None => debug!("monitor {} reports no serial number", record.instance_name),
        }
    }

    Ok(entries)
}

/// Joins the three passes into identified monitors.
///
/// Every physical monitor yields exactly one [`Monitor`], whatever the join
/// outcome.
pub fn connect_monitor_data(
    physical: Vec<PhysicalMonitorEntry>,
    devices: &[DisplayDeviceEntry],
    serials: &[SerialNumberEntry],
) -> Vec<Monitor> {
    physical
        .into_iter()
        .map(|entry| {
            let device = devices.iter().find(|d| d.device == entry.device);
            let identity = MonitorIdentity {
                adapter: device.map(|d| d.adapter.clone()),
                serial_number: device.and_then(|d| correlate_serial_number(d, serials)),
                device: entry.device,
                description: entry.description,
            };
            Monitor {
                identity,
                handle: entry.handle,
            }
        })
        .collect()
}

fn correlate_serial_number(device: &DisplayDeviceEntry, serials: &[SerialNumberEntry]) -> Option<String> {
    let Some(key) = DeviceKey::from_display_device_id(&device.device_id) else {
        warn!("unexpected display device id {:?}", device.device_id);
        return None;
    };
    serials
        .iter()
        .find(|s| s.key == key)
        .map(|s| s.serial_number.clone())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

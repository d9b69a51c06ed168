//! OS-facing display and DDC/CI API.
//!
//! Everything monswitch needs from the operating system to find monitors and
//! talk to them goes through the [`DisplayApi`] trait:
//!
//! | Concern                    | Windows API                                         |
//! |----------------------------|-----------------------------------------------------|
//! | display monitors           | `EnumDisplayMonitors` + `GetMonitorInfoW`           |
//! | physical monitors          | `GetPhysicalMonitorsFromHMONITOR` (dxva2)           |
//! | adapters / monitor devices | `EnumDisplayDevicesW`                               |
//! | serial numbers             | WMI `root\WMI` → `WmiMonitorID`                     |
//! | DDC/CI                     | capabilities, `GetVCPFeature…`, `SetVCPFeature`     |
//!
//! The Windows implementation is selected at compile time and re-exported as
//! `NativeDisplayApi`.  A [`fake::FakeDisplayApi`] is always compiled so tests
//! on any platform can script a monitor setup without real hardware.
//!
//! # Handle ownership
//!
//! Physical-monitor handles are a limited OS resource.  The raw value returned
//! by [`DisplayApi::physical_monitors`] must be wrapped in a
//! [`PhysicalMonitorHandle`] straight away; dropping that wrapper calls
//! [`DisplayApi::destroy_physical_monitor`] exactly once, on every exit path.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{trace, warn};

pub mod fake;

/// Win32 call names used in [`DisplayApiError::Api`].
pub mod calls {
    pub const ENUM_DISPLAY_MONITORS: &str = "EnumDisplayMonitors";
    pub const GET_MONITOR_INFO: &str = "GetMonitorInfoW";
    pub const GET_PHYSICAL_MONITOR_COUNT: &str = "GetNumberOfPhysicalMonitorsFromHMONITOR";
    pub const GET_PHYSICAL_MONITORS: &str = "GetPhysicalMonitorsFromHMONITOR";
    pub const DESTROY_PHYSICAL_MONITOR: &str = "DestroyPhysicalMonitor";
    pub const ENUM_DISPLAY_DEVICES: &str = "EnumDisplayDevicesW";
    pub const QUERY_MONITOR_IDS: &str = "WmiMonitorID";
    pub const GET_CAPABILITIES_STRING_LENGTH: &str = "GetCapabilitiesStringLength";
    pub const GET_CAPABILITIES_STRING: &str = "CapabilitiesRequestAndCapabilitiesReply";
    pub const GET_VCP_FEATURE: &str = "GetVCPFeatureAndVCPFeatureReply";
    pub const SET_VCP_FEATURE: &str = "SetVCPFeature";
}

/// Error type for display API calls.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DisplayApiError {
    /// An OS call reported failure.
    #[error("{call} failed: {message}")]
    Api {
        /// Name of the failing OS call (see [`calls`]).
        call: &'static str,
        /// Human-readable OS error description.
        message: String,
    },
}

impl DisplayApiError {
    /// Convenience constructor for [`DisplayApiError::Api`].
    pub fn api(call: &'static str, message: impl Into<String>) -> Self {
        Self::Api {
            call,
            message: message.into(),
        }
    }
}

/// Opaque display-monitor handle (`HMONITOR`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DisplayMonitorHandle(pub isize);

/// Opaque physical-monitor handle used for DDC/CI calls.
///
/// This is the raw value only; ownership lives in [`PhysicalMonitorHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawMonitorHandle(pub isize);

impl fmt::Display for RawMonitorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// One physical monitor attached to a display monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalMonitorInfo {
    pub handle: RawMonitorHandle,
    pub description: String,
}

/// A display adapter or monitor device record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DisplayDevice {
    /// e.g. `\\.\DISPLAY1` for an adapter, `\\.\DISPLAY1\Monitor0` for a monitor.
    pub device_name: String,
    /// e.g. `NVIDIA GeForce RTX 3080` or `Generic PnP Monitor`.
    pub device_string: String,
    /// For monitors: the device interface name, `\\?\DISPLAY#…#{guid}`.
    pub device_id: String,
}

/// One WMI `WmiMonitorID` instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorIdRecord {
    /// e.g. `DISPLAY\DEL4321\5&2a3b4c5d&0&UID4353_0`.
    pub instance_name: String,
    /// NUL-padded character codes of the EDID serial number.
    pub serial_number_id: Vec<u16>,
}

/// How a monitor classifies a VCP code in a get reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcpCodeType {
    /// The code triggers an action and has no persistent value.
    Momentary,
    /// The code holds a value that can be read and written.
    SetParameter,
}

/// Reply to a VCP get request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VcpFeatureReply {
    pub code_type: VcpCodeType,
    pub current_value: u32,
    pub maximum_value: u32,
}

/// Abstraction over the OS monitor enumeration and DDC/CI calls.
///
/// Every method maps onto a single OS call (or, for
/// [`monitor_id_records`](Self::monitor_id_records), a single WMI query) so a
/// test double can reproduce any partial-failure scenario.
#[cfg_attr(test, mockall::automock)]
pub trait DisplayApi: Send + Sync {
    /// Enumerates all display-monitor handles on the virtual desktop.
    fn enumerate_display_monitors(&self) -> Result<Vec<DisplayMonitorHandle>, DisplayApiError>;

    /// Returns the device name (`\\.\DISPLAYn`) of a display monitor.
    fn monitor_device_name(&self, monitor: DisplayMonitorHandle) -> Result<String, DisplayApiError>;

    /// Returns how many physical monitors drive a display monitor.
    fn physical_monitor_count(&self, monitor: DisplayMonitorHandle) -> Result<u32, DisplayApiError>;

    /// Opens the physical monitors of a display monitor.
    ///
    /// Every returned handle must be released with
    /// [`destroy_physical_monitor`](Self::destroy_physical_monitor); wrap it in
    /// a [`PhysicalMonitorHandle`].
    fn physical_monitors(
        &self,
        monitor: DisplayMonitorHandle,
    ) -> Result<Vec<PhysicalMonitorInfo>, DisplayApiError>;

    /// Releases a physical-monitor handle.
    fn destroy_physical_monitor(&self, handle: RawMonitorHandle) -> Result<(), DisplayApiError>;

    /// Returns the display adapter at `index`, or `None` past the last one.
    fn display_adapter(&self, index: u32) -> Result<Option<DisplayDevice>, DisplayApiError>;

    /// Returns the monitor device at `index` on the named adapter, or `None`
    /// past the last one.
    fn display_monitor(
        &self,
        adapter_name: &str,
        index: u32,
    ) -> Result<Option<DisplayDevice>, DisplayApiError>;

    /// Returns every WMI monitor identification record.
    fn monitor_id_records(&self) -> Result<Vec<MonitorIdRecord>, DisplayApiError>;

    /// Returns the length of the monitor's capabilities string in bytes.
    fn capabilities_string_length(&self, handle: RawMonitorHandle) -> Result<u32, DisplayApiError>;

    /// Requests the monitor's capabilities string (`length` from
    /// [`capabilities_string_length`](Self::capabilities_string_length)).
    fn capabilities_string(
        &self,
        handle: RawMonitorHandle,
        length: u32,
    ) -> Result<String, DisplayApiError>;

    /// Reads a VCP code.
    fn vcp_feature(&self, handle: RawMonitorHandle, code: u8) -> Result<VcpFeatureReply, DisplayApiError>;

    /// Writes a VCP code.
    fn set_vcp_feature(&self, handle: RawMonitorHandle, code: u8, value: u32) -> Result<(), DisplayApiError>;
}

/// Owned physical-monitor handle, released exactly once on drop.
pub struct PhysicalMonitorHandle {
    raw: RawMonitorHandle,
    api: Arc<dyn DisplayApi>,
}

impl PhysicalMonitorHandle {
    /// Takes ownership of `raw`, which must have come from `api`.
    pub fn new(raw: RawMonitorHandle, api: Arc<dyn DisplayApi>) -> Self {
        Self { raw, api }
    }

    /// The raw handle for DDC/CI calls.  Valid only while `self` is alive.
    pub fn raw(&self) -> RawMonitorHandle {
        self.raw
    }
}

impl fmt::Debug for PhysicalMonitorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PhysicalMonitorHandle").field(&self.raw).finish()
    }
}

impl Drop for PhysicalMonitorHandle {
    fn drop(&mut self) {
        match self.api.destroy_physical_monitor(self.raw) {
            Ok(()) => trace!("released physical monitor handle {}", self.raw),
            Err(e) => warn!("could not release physical monitor handle {}: {e}", self.raw),
        }
    }
}

// ── Windows implementation ────────────────────────────────────────────────────

#[cfg(target_os = "windows")]
pub mod windows;

/// Re-export the Windows implementation as `NativeDisplayApi` on Windows.
#[cfg(target_os = "windows")]
pub use self::windows::WindowsDisplayApi as NativeDisplayApi;

// ── Tests ─────────────────────────────────────────────────────────────────────

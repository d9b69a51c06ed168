//! Windows display API via GDI, dxva2 (DDC/CI) and WMI.
//!
//! All calls are synchronous and may block for tens of milliseconds while the
//! monitor answers over DDC/CI; callers run them on a blocking thread.

use std::ffi::c_void;
use std::mem;

use serde::Deserialize;
use tracing::debug;
use windows::core::PCWSTR;
use windows::Win32::Devices::Display::{
    CapabilitiesRequestAndCapabilitiesReply, DestroyPhysicalMonitor, GetCapabilitiesStringLength,
    GetNumberOfPhysicalMonitorsFromHMONITOR, GetPhysicalMonitorsFromHMONITOR,
    GetVCPFeatureAndVCPFeatureReply, SetVCPFeature, MC_MOMENTARY, MC_VCP_CODE_TYPE, PHYSICAL_MONITOR,
};
use windows::Win32::Foundation::{BOOL, HANDLE, LPARAM, RECT, TRUE};
use windows::Win32::Graphics::Gdi::{
    EnumDisplayDevicesW, EnumDisplayMonitors, GetMonitorInfoW, DISPLAY_DEVICEW, HDC, HMONITOR,
    MONITORINFOEXW,
};
use wmi::{COMLibrary, WMIConnection, WMIError};

use super::{
    calls, DisplayApi, DisplayApiError, DisplayDevice, DisplayMonitorHandle, MonitorIdRecord,
    PhysicalMonitorInfo, RawMonitorHandle, VcpCodeType, VcpFeatureReply,
};

/// `EnumDisplayDevicesW` flag returning the device interface name in `DeviceID`.
const EDD_GET_DEVICE_INTERFACE_NAME: u32 = 0x0000_0001;

/// Windows implementation of [`DisplayApi`].
pub struct WindowsDisplayApi;

impl WindowsDisplayApi {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WindowsDisplayApi {
    fn default() -> Self {
        Self::new()
    }
}

fn hmonitor(monitor: DisplayMonitorHandle) -> HMONITOR {
    HMONITOR(monitor.0 as *mut c_void)
}

fn physical_handle(handle: RawMonitorHandle) -> HANDLE {
    HANDLE(handle.0 as *mut c_void)
}

fn from_wide(buffer: &[u16]) -> String {
    let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
    String::from_utf16_lossy(&buffer[..len])
}

fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn os_error(call: &'static str, error: windows::core::Error) -> DisplayApiError {
    DisplayApiError::api(call, error.message())
}

fn last_os_error(call: &'static str) -> DisplayApiError {
    os_error(call, windows::core::Error::from_win32())
}

fn enum_display_device(adapter: PCWSTR, index: u32, flags: u32) -> Option<DisplayDevice> {
    let mut device = DISPLAY_DEVICEW {
        cb: mem::size_of::<DISPLAY_DEVICEW>() as u32,
        ..Default::default()
    };

    // SAFETY: `device` is a correctly sized, writable DISPLAY_DEVICEW and
    // `adapter` is either null or a NUL-terminated string that outlives the call.
    let found = unsafe { EnumDisplayDevicesW(adapter, index, &mut device, flags) };
    found.as_bool().then(|| DisplayDevice {
        device_name: from_wide(&device.DeviceName),
        device_string: from_wide(&device.DeviceString),
        device_id: from_wide(&device.DeviceID),
    })
}

impl DisplayApi for WindowsDisplayApi {
    fn enumerate_display_monitors(&self) -> Result<Vec<DisplayMonitorHandle>, DisplayApiError> {
        let mut monitors: Vec<DisplayMonitorHandle> = Vec::new();

        // SAFETY: the callback only runs inside this call and `lparam` points
        // at `monitors`, which outlives it.
        unsafe {
            EnumDisplayMonitors(
                HDC::default(),
                None,
                Some(monitor_enum_proc),
                LPARAM(&mut monitors as *mut Vec<DisplayMonitorHandle> as isize),
            )
        }
        .ok()
        .map_err(|e| os_error(calls::ENUM_DISPLAY_MONITORS, e))?;

        Ok(monitors)
    }

    fn monitor_device_name(&self, monitor: DisplayMonitorHandle) -> Result<String, DisplayApiError> {
        let mut info = MONITORINFOEXW::default();
        info.monitorInfo.cbSize = mem::size_of::<MONITORINFOEXW>() as u32;

        // SAFETY: `info` is a MONITORINFOEXW with cbSize set, so Win32 may
        // write the extended fields.
        unsafe { GetMonitorInfoW(hmonitor(monitor), &mut info.monitorInfo) }
            .ok()
            .map_err(|e| os_error(calls::GET_MONITOR_INFO, e))?;

        Ok(from_wide(&info.szDevice))
    }

    fn physical_monitor_count(&self, monitor: DisplayMonitorHandle) -> Result<u32, DisplayApiError> {
        let mut count = 0u32;
        // SAFETY: `count` is a valid out pointer.
        unsafe { GetNumberOfPhysicalMonitorsFromHMONITOR(hmonitor(monitor), &mut count) }
            .map_err(|e| os_error(calls::GET_PHYSICAL_MONITOR_COUNT, e))?;
        Ok(count)
    }

    fn physical_monitors(
        &self,
        monitor: DisplayMonitorHandle,
    ) -> Result<Vec<PhysicalMonitorInfo>, DisplayApiError> {
        let count = self.physical_monitor_count(monitor)?;
        let mut physical = vec![PHYSICAL_MONITOR::default(); count as usize];
        if physical.is_empty() {
            return Ok(Vec::new());
        }

        // SAFETY: `physical` has exactly `count` writable entries.
        unsafe { GetPhysicalMonitorsFromHMONITOR(hmonitor(monitor), &mut physical) }
            .map_err(|e| os_error(calls::GET_PHYSICAL_MONITORS, e))?;

        Ok(physical
            .iter()
            .map(|p| PhysicalMonitorInfo {
                handle: RawMonitorHandle(p.hPhysicalMonitor.0 as isize),
                description: from_wide(&p.szPhysicalMonitorDescription),
            })
            .collect())
    }

    fn destroy_physical_monitor(&self, handle: RawMonitorHandle) -> Result<(), DisplayApiError> {
        // SAFETY: `handle` came from GetPhysicalMonitorsFromHMONITOR and is
        // released only once by its owning PhysicalMonitorHandle.
        unsafe { DestroyPhysicalMonitor(physical_handle(handle)) }
            .map_err(|e| os_error(calls::DESTROY_PHYSICAL_MONITOR, e))
    }

    fn display_adapter(&self, index: u32) -> Result<Option<DisplayDevice>, DisplayApiError> {
        Ok(enum_display_device(PCWSTR::null(), index, 0))
    }

    fn display_monitor(
        &self,
        adapter_name: &str,
        index: u32,
    ) -> Result<Option<DisplayDevice>, DisplayApiError> {
        let adapter = to_wide(adapter_name);
        Ok(enum_display_device(
            PCWSTR(adapter.as_ptr()),
            index,
            EDD_GET_DEVICE_INTERFACE_NAME,
        ))
    }

    fn monitor_id_records(&self) -> Result<Vec<MonitorIdRecord>, DisplayApiError> {
        query_monitor_ids().map_err(|e| DisplayApiError::api(calls::QUERY_MONITOR_IDS, e.to_string()))
    }

    fn capabilities_string_length(&self, handle: RawMonitorHandle) -> Result<u32, DisplayApiError> {
        let mut length = 0u32;
        // SAFETY: `length` is a valid out pointer.
        if unsafe { GetCapabilitiesStringLength(physical_handle(handle), &mut length) } == 0 {
            return Err(last_os_error(calls::GET_CAPABILITIES_STRING_LENGTH));
        }
        Ok(length)
    }

    fn capabilities_string(
        &self,
        handle: RawMonitorHandle,
        length: u32,
    ) -> Result<String, DisplayApiError> {
        let mut buffer = vec![0u8; length as usize];
        // SAFETY: `buffer` holds `length` writable bytes.
        if unsafe { CapabilitiesRequestAndCapabilitiesReply(physical_handle(handle), &mut buffer) } == 0 {
            return Err(last_os_error(calls::GET_CAPABILITIES_STRING));
        }

        let end = buffer.iter().position(|&b| b == 0).unwrap_or(buffer.len());
        Ok(String::from_utf8_lossy(&buffer[..end]).into_owned())
    }

    fn vcp_feature(&self, handle: RawMonitorHandle, code: u8) -> Result<VcpFeatureReply, DisplayApiError> {
        let mut code_type = MC_VCP_CODE_TYPE::default();
        let mut current_value = 0u32;
        let mut maximum_value = 0u32;

        // SAFETY: all out pointers reference live locals.
        let ok = unsafe {
            GetVCPFeatureAndVCPFeatureReply(
                physical_handle(handle),
                code,
                Some(&mut code_type as *mut MC_VCP_CODE_TYPE),
                &mut current_value,
                Some(&mut maximum_value as *mut u32),
            )
        };
        if ok == 0 {
            return Err(last_os_error(calls::GET_VCP_FEATURE));
        }

        Ok(VcpFeatureReply {
            code_type: if code_type == MC_MOMENTARY {
                VcpCodeType::Momentary
            } else {
                VcpCodeType::SetParameter
            },
            current_value,
            maximum_value,
        })
    }

    fn set_vcp_feature(&self, handle: RawMonitorHandle, code: u8, value: u32) -> Result<(), DisplayApiError> {
        // SAFETY: plain value call on a live physical-monitor handle.
        if unsafe { SetVCPFeature(physical_handle(handle), code, value) } == 0 {
            return Err(last_os_error(calls::SET_VCP_FEATURE));
        }
        Ok(())
    }
}

/// Win32 monitor enumeration callback.
///
/// # Safety
///
/// `lparam` must point at a `Vec<DisplayMonitorHandle>` that outlives the
/// enclosing `EnumDisplayMonitors` call.
unsafe extern "system" fn monitor_enum_proc(
    monitor: HMONITOR,
    _hdc: HDC,
    _clip: *mut RECT,
    lparam: LPARAM,
) -> BOOL {
    let monitors = &mut *(lparam.0 as *mut Vec<DisplayMonitorHandle>);
    monitors.push(DisplayMonitorHandle(monitor.0 as isize));
    TRUE
}

// ── WMI ───────────────────────────────────────────────────────────────────────

/// One row of `root\WMI:WmiMonitorID`.
#[derive(Debug, Deserialize)]
#[serde(rename = "WmiMonitorID")]
struct WmiMonitorId {
    #[serde(rename = "InstanceName")]
    instance_name: Option<String>,
    #[serde(rename = "SerialNumberID")]
    serial_number_id: Option<Vec<u16>>,
}

fn query_monitor_ids() -> Result<Vec<MonitorIdRecord>, WMIError> {
    // Process-wide COM security is left at its default; WmiMonitorID is
    // readable without impersonation and the query runs many times per run.
    let com = COMLibrary::without_security()?;
    let connection = WMIConnection::with_namespace_path(r"root\WMI", com)?;
    let rows: Vec<WmiMonitorId> =
        connection.raw_query("SELECT InstanceName, SerialNumberID FROM WmiMonitorID")?;

    Ok(rows
        .into_iter()
        .filter_map(|row| match row.instance_name {
            Some(instance_name) => Some(MonitorIdRecord {
                instance_name,
                serial_number_id: row.serial_number_id.unwrap_or_default(),
            }),
            None => {
                debug!("skipping WmiMonitorID row without InstanceName");
                None
            }
        })
        .collect())
}

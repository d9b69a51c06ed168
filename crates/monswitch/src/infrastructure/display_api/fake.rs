//! Scriptable in-memory [`DisplayApi`] for tests.
//!
//! Build a monitor setup with the `with_*` methods, share it as
//! `Arc<dyn DisplayApi>`, and afterwards inspect what the code under test did
//! through [`set_calls`](FakeDisplayApi::set_calls) and
//! [`destroyed`](FakeDisplayApi::destroyed).
//!
//! ```
//! use std::sync::Arc;
//! use monswitch::infrastructure::display_api::fake::FakeDisplayApi;
//! use monswitch::infrastructure::display_api::DisplayApi;
//!
//! let fake = Arc::new(
//!     FakeDisplayApi::new().with_display_monitor(r"\\.\DISPLAY1", &[(0x12345, "DELL U2720Q")]),
//! );
//! let api: Arc<dyn DisplayApi> = fake.clone();
//! assert_eq!(api.enumerate_display_monitors().unwrap().len(), 1);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::{
    calls, DisplayApi, DisplayApiError, DisplayDevice, DisplayMonitorHandle, MonitorIdRecord,
    PhysicalMonitorInfo, RawMonitorHandle, VcpCodeType, VcpFeatureReply,
};

/// Width of the WMI `SerialNumberID` buffer.
const SERIAL_NUMBER_LEN: usize = 16;

/// One recorded [`DisplayApi::set_vcp_feature`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VcpSetCall {
    pub handle: RawMonitorHandle,
    pub code: u8,
    pub value: u32,
}

#[derive(Debug)]
struct FakeDisplayMonitor {
    device_name: String,
    physical: Vec<PhysicalMonitorInfo>,
}

#[derive(Debug)]
struct FakeAdapter {
    device: DisplayDevice,
    monitors: Vec<DisplayDevice>,
}

#[derive(Debug, Default)]
struct FakeState {
    display_monitors: Vec<FakeDisplayMonitor>,
    adapters: Vec<FakeAdapter>,
    monitor_ids: Vec<MonitorIdRecord>,
    capabilities: HashMap<RawMonitorHandle, String>,
    vcp_replies: HashMap<(RawMonitorHandle, u8), VcpFeatureReply>,
    failing: HashSet<&'static str>,
    set_calls: Vec<VcpSetCall>,
    destroyed: Vec<RawMonitorHandle>,
    enumerations: usize,
}

/// In-memory display API with recorded side effects.
#[derive(Debug, Default)]
pub struct FakeDisplayApi {
    state: Mutex<FakeState>,
}

impl FakeDisplayApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a display monitor (`\\.\DISPLAYn`) driven by the given physical
    /// monitors, each given as `(raw handle, description)`.
    pub fn with_display_monitor(self, device_name: &str, physical: &[(isize, &str)]) -> Self {
        self.lock().display_monitors.push(FakeDisplayMonitor {
            device_name: device_name.to_string(),
            physical: physical
                .iter()
                .map(|(handle, description)| PhysicalMonitorInfo {
                    handle: RawMonitorHandle(*handle),
                    description: description.to_string(),
                })
                .collect(),
        });
        self
    }

    /// Adds a display adapter whose monitor devices carry the given device
    /// interface names.
    pub fn with_adapter(self, device_name: &str, device_string: &str, monitor_device_ids: &[&str]) -> Self {
        let monitors = monitor_device_ids
            .iter()
            .enumerate()
            .map(|(index, device_id)| DisplayDevice {
                device_name: format!(r"{device_name}\Monitor{index}"),
                device_string: "Generic PnP Monitor".to_string(),
                device_id: device_id.to_string(),
            })
            .collect();
        self.lock().adapters.push(FakeAdapter {
            device: DisplayDevice {
                device_name: device_name.to_string(),
                device_string: device_string.to_string(),
                device_id: String::new(),
            },
            monitors,
        });
        self
    }

    /// Adds a WMI monitor-id record; `serial` is NUL-padded like the real
    /// `SerialNumberID` buffer.
    pub fn with_monitor_id(self, instance_name: &str, serial: &str) -> Self {
        let mut serial_number_id: Vec<u16> = serial.encode_utf16().collect();
        serial_number_id.resize(serial_number_id.len().max(SERIAL_NUMBER_LEN), 0);
        self.lock().monitor_ids.push(MonitorIdRecord {
            instance_name: instance_name.to_string(),
            serial_number_id,
        });
        self
    }

    /// Sets the capabilities string reported by a physical monitor.
    pub fn with_capabilities(self, handle: isize, capabilities: &str) -> Self {
        self.lock()
            .capabilities
            .insert(RawMonitorHandle(handle), capabilities.to_string());
        self
    }

    /// Sets the current value of a read/write VCP code.
    pub fn with_vcp_value(self, handle: isize, code: u8, current_value: u32) -> Self {
        self.with_vcp_reply(
            handle,
            code,
            VcpFeatureReply {
                code_type: VcpCodeType::SetParameter,
                current_value,
                maximum_value: u32::from(u8::MAX),
            },
        )
    }

    /// Sets the full reply returned for a VCP get request.
    pub fn with_vcp_reply(self, handle: isize, code: u8, reply: VcpFeatureReply) -> Self {
        self.lock()
            .vcp_replies
            .insert((RawMonitorHandle(handle), code), reply);
        self
    }

    /// Makes every call to the named OS function (see [`calls`]) fail.
    pub fn failing(self, call: &'static str) -> Self {
        self.lock().failing.insert(call);
        self
    }

    /// Every `set_vcp_feature` call so far, in call order.
    pub fn set_calls(&self) -> Vec<VcpSetCall> {
        self.lock().set_calls.clone()
    }

    /// Every handle released so far, in release order.
    pub fn destroyed(&self) -> Vec<RawMonitorHandle> {
        self.lock().destroyed.clone()
    }

    /// How many times the display monitors were enumerated.
    pub fn enumeration_count(&self) -> usize {
        self.lock().enumerations
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        // A panicking test thread must not hide the recorded calls from others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(state: &FakeState, call: &'static str) -> Result<(), DisplayApiError> {
        if state.failing.contains(call) {
            Err(DisplayApiError::api(call, "injected failure"))
        } else {
            Ok(())
        }
    }

    fn display_monitor_index(monitor: DisplayMonitorHandle) -> usize {
        // Handles are 1-based so a zero handle is never valid.
        (monitor.0 as usize).wrapping_sub(1)
    }
}

impl DisplayApi for FakeDisplayApi {
    fn enumerate_display_monitors(&self) -> Result<Vec<DisplayMonitorHandle>, DisplayApiError> {
        let mut state = self.lock();
        state.enumerations += 1;
        Self::check(&state, calls::ENUM_DISPLAY_MONITORS)?;
        Ok((1..=state.display_monitors.len())
            .map(|index| DisplayMonitorHandle(index as isize))
            .collect())
    }

    fn monitor_device_name(&self, monitor: DisplayMonitorHandle) -> Result<String, DisplayApiError> {
        let state = self.lock();
        Self::check(&state, calls::GET_MONITOR_INFO)?;
        state
            .display_monitors
            .get(Self::display_monitor_index(monitor))
            .map(|m| m.device_name.clone())
            .ok_or_else(|| DisplayApiError::api(calls::GET_MONITOR_INFO, "invalid monitor handle"))
    }

    fn physical_monitor_count(&self, monitor: DisplayMonitorHandle) -> Result<u32, DisplayApiError> {
        let state = self.lock();
        Self::check(&state, calls::GET_PHYSICAL_MONITOR_COUNT)?;
        state
            .display_monitors
            .get(Self::display_monitor_index(monitor))
            .map(|m| m.physical.len() as u32)
            .ok_or_else(|| DisplayApiError::api(calls::GET_PHYSICAL_MONITOR_COUNT, "invalid monitor handle"))
    }

    fn physical_monitors(
        &self,
        monitor: DisplayMonitorHandle,
    ) -> Result<Vec<PhysicalMonitorInfo>, DisplayApiError> {
        let state = self.lock();
        Self::check(&state, calls::GET_PHYSICAL_MONITORS)?;
        state
            .display_monitors
            .get(Self::display_monitor_index(monitor))
            .map(|m| m.physical.clone())
            .ok_or_else(|| DisplayApiError::api(calls::GET_PHYSICAL_MONITORS, "invalid monitor handle"))
    }

    fn destroy_physical_monitor(&self, handle: RawMonitorHandle) -> Result<(), DisplayApiError> {
        let mut state = self.lock();
        state.destroyed.push(handle);
        Self::check(&state, calls::DESTROY_PHYSICAL_MONITOR)
    }

    fn display_adapter(&self, index: u32) -> Result<Option<DisplayDevice>, DisplayApiError> {
        let state = self.lock();
        Self::check(&state, calls::ENUM_DISPLAY_DEVICES)?;
        Ok(state.adapters.get(index as usize).map(|a| a.device.clone()))
    }

    fn display_monitor(
        &self,
        adapter_name: &str,
        index: u32,
    ) -> Result<Option<DisplayDevice>, DisplayApiError> {
        let state = self.lock();
        Self::check(&state, calls::ENUM_DISPLAY_DEVICES)?;
        Ok(state
            .adapters
            .iter()
            .find(|a| a.device.device_name == adapter_name)
            .and_then(|a| a.monitors.get(index as usize))
            .cloned())
    }

    fn monitor_id_records(&self) -> Result<Vec<MonitorIdRecord>, DisplayApiError> {
        let state = self.lock();
        Self::check(&state, calls::QUERY_MONITOR_IDS)?;
        Ok(state.monitor_ids.clone())
    }

    fn capabilities_string_length(&self, handle: RawMonitorHandle) -> Result<u32, DisplayApiError> {
        let state = self.lock();
        Self::check(&state, calls::GET_CAPABILITIES_STRING_LENGTH)?;
        // The OS length includes the terminating NUL.
        Ok(state
            .capabilities
            .get(&handle)
            .map_or(0, |caps| caps.len() as u32 + 1))
    }

    fn capabilities_string(
        &self,
        handle: RawMonitorHandle,
        _length: u32,
    ) -> Result<String, DisplayApiError> {
        let state = self.lock();
        Self::check(&state, calls::GET_CAPABILITIES_STRING)?;
        state
            .capabilities
            .get(&handle)
            .cloned()
            .ok_or_else(|| DisplayApiError::api(calls::GET_CAPABILITIES_STRING, "no DDC/CI reply"))
    }

    fn vcp_feature(&self, handle: RawMonitorHandle, code: u8) -> Result<VcpFeatureReply, DisplayApiError> {
        let state = self.lock();
        Self::check(&state, calls::GET_VCP_FEATURE)?;
        state
            .vcp_replies
            .get(&(handle, code))
            .copied()
            .ok_or_else(|| DisplayApiError::api(calls::GET_VCP_FEATURE, "unsupported VCP code"))
    }

    fn set_vcp_feature(&self, handle: RawMonitorHandle, code: u8, value: u32) -> Result<(), DisplayApiError> {
        let mut state = self.lock();
        state.set_calls.push(VcpSetCall { handle, code, value });
        Self::check(&state, calls::SET_VCP_FEATURE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failing_call_returns_api_error_naming_the_call() {
        let api = FakeDisplayApi::new().failing(calls::ENUM_DISPLAY_MONITORS);

        let err = api.enumerate_display_monitors().unwrap_err();

        assert_eq!(err, DisplayApiError::api(calls::ENUM_DISPLAY_MONITORS, "injected failure"));
        assert_eq!(api.enumeration_count(), 1);
    }

    #[test]
    fn test_set_calls_are_recorded_even_when_failing() {
        let api = FakeDisplayApi::new().failing(calls::SET_VCP_FEATURE);

        assert!(api.set_vcp_feature(RawMonitorHandle(1), 0x60, 0x11).is_err());

        assert_eq!(
            api.set_calls(),
            vec![VcpSetCall { handle: RawMonitorHandle(1), code: 0x60, value: 0x11 }]
        );
    }

    #[test]
    fn test_adapter_monitors_are_looked_up_by_adapter_name() {
        let api = FakeDisplayApi::new().with_adapter(r"\\.\DISPLAY1", "Intel UHD", &["id-0", "id-1"]);

        let second = api.display_monitor(r"\\.\DISPLAY1", 1).unwrap().unwrap();

        assert_eq!(second.device_id, "id-1");
        assert_eq!(api.display_monitor(r"\\.\DISPLAY1", 2).unwrap(), None);
        assert_eq!(api.display_monitor(r"\\.\DISPLAY2", 0).unwrap(), None);
        assert_eq!(api.display_adapter(1).unwrap(), None);
    }

    #[test]
    fn test_monitor_id_serial_is_nul_padded() {
        let api = FakeDisplayApi::new().with_monitor_id(r"DISPLAY\DEL4321\x_0", "AB");

        let records = api.monitor_id_records().unwrap();

        assert_eq!(records[0].serial_number_id.len(), SERIAL_NUMBER_LEN);
        assert_eq!(&records[0].serial_number_id[..3], &[u16::from(b'A'), u16::from(b'B'), 0]);
    }

    #[test]
    fn test_missing_capabilities_report_zero_length() {
        let api = FakeDisplayApi::new();
        assert_eq!(api.capabilities_string_length(RawMonitorHandle(9)).unwrap(), 0);
    }
}

//! Use case: read which inputs a monitor offers and which one it shows.
//!
//! Best effort by nature: DDC/CI is flaky on many monitors, so every failure
//! is logged and turned into `None` rather than an error.

use tracing::{debug, warn};

use monswitch_core::{parse_vcp_component, MonitorInputs, INPUT_SELECT_VCP_CODE};

use crate::infrastructure::display_api::{DisplayApi, RawMonitorHandle, VcpCodeType};

/// Reads the valid and currently selected inputs of the monitor behind
/// `handle`.
///
/// Returns `None` when the capabilities string cannot be read or parsed, when
/// it does not enumerate any value for VCP `0x60`, or when the current input
/// cannot be read.
pub fn try_load_monitor_inputs(api: &dyn DisplayApi, handle: RawMonitorHandle) -> Option<MonitorInputs> {
    let length = match api.capabilities_string_length(handle) {
        Ok(0) => {
            warn!("monitor {handle} reported an empty capabilities string");
            return None;
        }
        Ok(length) => length,
        Err(e) => {
            warn!("could not read capabilities length of monitor {handle}: {e}");
            return None;
        }
    };

    let capabilities = match api.capabilities_string(handle, length) {
        Ok(capabilities) => capabilities,
        Err(e) => {
            warn!("could not read capabilities of monitor {handle}: {e}");
            return None;
        }
    };
    debug!("monitor {handle} capabilities: {capabilities}");

    let vcp = parse_vcp_component(&capabilities)?;
    let valid_inputs = match vcp.values(INPUT_SELECT_VCP_CODE) {
        Some(values) if !values.is_empty() => values.to_vec(),
        _ => {
            warn!("monitor {handle} does not list its inputs (VCP {INPUT_SELECT_VCP_CODE:#04x})");
            return None;
        }
    };

    let selected_input = read_selected_input(api, handle)?;

    Some(MonitorInputs {
        valid_inputs,
        selected_input,
    })
}

fn read_selected_input(api: &dyn DisplayApi, handle: RawMonitorHandle) -> Option<u8> {
    match api.vcp_feature(handle, INPUT_SELECT_VCP_CODE) {
        Ok(reply) if reply.code_type == VcpCodeType::SetParameter => {
            Some((reply.current_value & 0xFF) as u8)
        }
        Ok(reply) => {
            warn!(
                "monitor {handle} answered VCP {INPUT_SELECT_VCP_CODE:#04x} with a {:?} reply",
                reply.code_type
            );
            None
        }
        Err(e) => {
            warn!("could not read the current input of monitor {handle}: {e}");
            None
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

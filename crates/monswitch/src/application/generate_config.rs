//! Use case: inspect the connected monitors and suggest a configuration.
//!
//! The suggested rule for each monitor pins all known identity fields,
//! switches back to the input shown right now when the trigger device
//! arrives, and to the first other declared input when it leaves.

use std::sync::Arc;

use tracing::info;

use monswitch_core::{MonitorIdentity, MonitorInputs, MonitorRule, VcpSetting, INPUT_SELECT_VCP_CODE};

use crate::application::load_monitors::load_monitors;
use crate::application::monitor_inputs::try_load_monitor_inputs;
use crate::infrastructure::display_api::{DisplayApi, DisplayApiError};
use crate::infrastructure::storage::config::{SwitchConfig, TriggerDevice};

/// What is known about one connected monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorReport {
    pub identity: MonitorIdentity,
    /// `None` when the monitor did not answer the DDC/CI input queries.
    pub inputs: Option<MonitorInputs>,
}

/// Loads every monitor and reads its input data.
///
/// # Errors
///
/// Propagates monitor enumeration failures; per-monitor DDC/CI failures only
/// leave [`MonitorReport::inputs`] empty.
pub fn inspect_monitors(api: &Arc<dyn DisplayApi>) -> Result<Vec<MonitorReport>, DisplayApiError> {
    let monitors = load_monitors(api)?;
    Ok(monitors
        .iter()
        .map(|monitor| MonitorReport {
            identity: monitor.identity().clone(),
            inputs: try_load_monitor_inputs(api.as_ref(), monitor.handle()),
        })
        .collect())
}

/// Builds the rule suggested for a monitor showing `inputs.selected_input`.
pub fn suggested_rule(identity: &MonitorIdentity, inputs: &MonitorInputs) -> MonitorRule {
    let input = |value: u8| VcpSetting {
        code: INPUT_SELECT_VCP_CODE,
        value: u32::from(value),
    };

    MonitorRule {
        description: Some(identity.description.clone()),
        adapter: identity.adapter.clone(),
        serial_number: identity.serial_number.clone(),
        attach: Some(input(inputs.selected_input)),
        detach: inputs.alternative_input().map(input),
    }
}

/// Suggests a configuration for the connected monitors.
///
/// Monitors without input data are left out.
///
/// # Errors
///
/// Propagates monitor enumeration failures.
pub fn generate_config(api: &Arc<dyn DisplayApi>, trigger_device: TriggerDevice) -> Result<SwitchConfig, DisplayApiError> {
    let monitors = inspect_monitors(api)?
        .into_iter()
        .filter_map(|report| match &report.inputs {
            Some(inputs) => Some(suggested_rule(&report.identity, inputs)),
            None => {
                info!("leaving {} out of the generated config: no input data", report.identity);
                None
            }
        })
        .collect();

    Ok(SwitchConfig {
        trigger_device,
        monitors,
        ..SwitchConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::display_api::calls;
    use crate::infrastructure::display_api::fake::FakeDisplayApi;

    const DEVICE_ID: &str =
        r"\\?\DISPLAY#DEL4321#5&2a3b4c5d&0&UID4353#{e6f07b5f-ee97-4a90-b076-33f57bf4eaa7}";
    const INSTANCE: &str = r"DISPLAY\DEL4321\5&2a3b4c5d&0&UID4353_0";

    fn desk() -> Arc<dyn DisplayApi> {
        Arc::new(
            FakeDisplayApi::new()
                .with_display_monitor(r"\\.\DISPLAY1", &[(0x100, "DELL U2720Q")])
                .with_display_monitor(r"\\.\DISPLAY2", &[(0x200, "Projector")])
                .with_adapter(r"\\.\DISPLAY1", "NVIDIA GeForce RTX 3080", &[DEVICE_ID])
                .with_monitor_id(INSTANCE, "ABC123")
                .with_capabilities(0x100, "(prot(monitor)vcp(10 12 60(0F 11 12)))")
                .with_vcp_value(0x100, INPUT_SELECT_VCP_CODE, 0x11),
        )
    }

    #[test]
    fn test_generate_config_builds_rule_per_answering_monitor() {
        // Arrange
        let api = desk();

        // Act
        let config = generate_config(&api, TriggerDevice::Mouse).expect("generate");

        // Assert: the projector has no DDC/CI data and is left out.
        assert_eq!(config.trigger_device, TriggerDevice::Mouse);
        assert_eq!(
            config.monitors,
            vec![MonitorRule {
                description: Some("DELL U2720Q".to_string()),
                adapter: Some("NVIDIA GeForce RTX 3080".to_string()),
                serial_number: Some("ABC123".to_string()),
                attach: Some(VcpSetting { code: 0x60, value: 0x11 }),
                detach: Some(VcpSetting { code: 0x60, value: 0x0F }),
            }]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inspect_monitors_reports_missing_inputs() {
        let reports = inspect_monitors(&desk()).expect("inspect");

        assert_eq!(reports.len(), 2);
        assert!(reports[0].inputs.is_some());
        assert_eq!(reports[1].identity.description, "Projector");
        assert_eq!(reports[1].inputs, None);
    }

    #[test]
    fn test_single_input_monitor_gets_no_detach() {
        let identity = MonitorIdentity {
            description: "TV".to_string(),
            ..Default::default()
        };
        let inputs = MonitorInputs {
            valid_inputs: vec![0x11],
            selected_input: 0x11,
        };

        let rule = suggested_rule(&identity, &inputs);

        assert_eq!(rule.attach, Some(VcpSetting { code: 0x60, value: 0x11 }));
        assert_eq!(rule.detach, None);
        assert_eq!(rule.adapter, None);
    }

    #[test]
    fn test_enumeration_failure_is_propagated() {
        let api: Arc<dyn DisplayApi> = Arc::new(FakeDisplayApi::new().failing(calls::ENUM_DISPLAY_MONITORS));
        assert!(generate_config(&api, TriggerDevice::Keyboard).is_err());
    }
}

//! Background dispatcher: turns trigger-device notifications into VCP writes.
//!
//! # Lifecycle
//!
//! [`BackgroundTask`] owns at most one worker task at a time:
//!
//! ```text
//!            restart()                     restart()
//!  Stopped ────────────► Running ──cancel+join──► Stopped ──spawn──► Running
//!     ▲                     │
//!     └──── shutdown() ─────┘   (idempotent; Drop cancels without joining)
//! ```
//!
//! # Worker loop
//!
//! The worker registers for notifications of the configured trigger device
//! class and then waits for actions.  That wait is the only cancellation
//! point: a dispatch already handed to the blocking pool always runs to
//! completion, so a monitor is never left half-switched by a restart.
//!
//! For every action the worker
//!
//! 1. drops it if it equals the previous action (keyboards often report one
//!    physical plug as several interface arrivals),
//! 2. drops it if switching is disabled,
//! 3. otherwise loads the monitors, applies every rule that has a setting for
//!    the action, and releases the monitor handles again.
//!
//! Progress is published as [`WorkerEvent`]s for anyone who
//! [subscribes](BackgroundTask::subscribe), and logged with `tracing`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use monswitch_core::{matching_monitors, DeviceAction, MonitorIdentity, MonitorRule, VcpSetting};

use crate::application::load_monitors::{load_monitors, Monitor};
use crate::infrastructure::device_notifications::{DeviceNotificationSource, DeviceSubscription};
use crate::infrastructure::display_api::{DisplayApi, DisplayApiError, RawMonitorHandle};
use crate::infrastructure::storage::config::SwitchConfig;

/// How long [`BackgroundTask::restart`] and [`BackgroundTask::shutdown`] wait
/// for the old worker to stop.
pub const WORKER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Error that ends a worker period.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to load monitors: {0}")]
    LoadMonitors(#[from] DisplayApiError),
    #[error("dispatch task panicked: {0}")]
    WorkerPanicked(String),
}

/// Configuration shared between the owner and the running worker.
///
/// Readers take a cheap snapshot; a replaced config is picked up by the next
/// dispatch (rules) or the next restart (trigger device).
#[derive(Debug, Clone, Default)]
pub struct SharedConfig(Arc<RwLock<Arc<SwitchConfig>>>);

impl SharedConfig {
    pub fn new(config: SwitchConfig) -> Self {
        Self(Arc::new(RwLock::new(Arc::new(config))))
    }

    /// The current config.
    pub fn snapshot(&self) -> Arc<SwitchConfig> {
        let guard = self.0.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    /// Replaces the config for subsequent snapshots.
    pub fn replace(&self, config: SwitchConfig) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
    }
}

/// One VCP write issued for a (rule, monitor) match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcpCommand {
    pub monitor: MonitorIdentity,
    pub handle: RawMonitorHandle,
    pub setting: VcpSetting,
}

/// Outcome of dispatching one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub action: DeviceAction,
    /// Number of monitors found by the load.
    pub monitors_loaded: usize,
    /// Writes issued, in rule order.
    pub commands: Vec<VcpCommand>,
    /// Rules with a setting for the action that matched no monitor.
    pub unmatched_rules: usize,
}

/// Why an action was not dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Same as the previous action.
    Duplicate,
    /// Switching is disabled.
    Disabled,
}

/// Progress of the worker, published to every [`BackgroundTask::subscribe`] receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Started,
    /// Registered for the given device interface class.
    Listening(Uuid),
    Ignored { action: DeviceAction, reason: IgnoreReason },
    Processed(DispatchReport),
    Failed { reason: String },
    Stopped,
}

/// Whether a worker is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Stopped,
    Running,
}

struct WorkerContext {
    display_api: Arc<dyn DisplayApi>,
    notifications: Arc<dyn DeviceNotificationSource>,
    config: SharedConfig,
    enabled: Arc<AtomicBool>,
    events: broadcast::Sender<WorkerEvent>,
}

impl WorkerContext {
    fn publish(&self, event: WorkerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

struct Worker {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// Owner of the notification worker.
pub struct BackgroundTask {
    context: Arc<WorkerContext>,
    worker: Option<Worker>,
}

impl BackgroundTask {
    /// Creates a stopped task.  Call [`restart`](Self::restart) to start it.
    pub fn new(
        display_api: Arc<dyn DisplayApi>,
        notifications: Arc<dyn DeviceNotificationSource>,
        config: SharedConfig,
        enabled: Arc<AtomicBool>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            context: Arc::new(WorkerContext {
                display_api,
                notifications,
                config,
                enabled,
                events,
            }),
            worker: None,
        }
    }

    /// A worker that ended on its own (failure, closed stream) counts as
    /// stopped until the next [`restart`](Self::restart).
    pub fn state(&self) -> DispatcherState {
        if self.worker.as_ref().is_some_and(|w| !w.join.is_finished()) {
            DispatcherState::Running
        } else {
            DispatcherState::Stopped
        }
    }

    /// Receives every [`WorkerEvent`] published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.context.events.subscribe()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.context.enabled.store(enabled, Ordering::SeqCst);
        info!(enabled, "monitor switching toggled");
    }

    pub fn is_enabled(&self) -> bool {
        self.context.enabled.load(Ordering::SeqCst)
    }

    /// Stops the current worker (if any) and starts a fresh one.
    ///
    /// The previous worker has observed its cancellation before the new one
    /// is spawned, unless it failed to stop within [`WORKER_STOP_TIMEOUT`].
    pub async fn restart(&mut self) {
        self.stop_worker().await;

        let cancel = CancellationToken::new();
        let join = tokio::spawn(run_worker(Arc::clone(&self.context), cancel.clone()));
        self.worker = Some(Worker { cancel, join });
    }

    /// Stops the worker if one is running.  Safe to call repeatedly.
    pub async fn shutdown(&mut self) {
        self.stop_worker().await;
    }

    async fn stop_worker(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        worker.cancel.cancel();
        match tokio::time::timeout(WORKER_STOP_TIMEOUT, worker.join).await {
            Ok(Ok(())) => debug!("worker joined"),
            Ok(Err(e)) => error!("worker ended abnormally: {e}"),
            Err(_) => warn!("worker did not stop within {WORKER_STOP_TIMEOUT:?}; detaching it"),
        }
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        if let Some(worker) = &self.worker {
            worker.cancel.cancel();
        }
    }
}

async fn run_worker(context: Arc<WorkerContext>, cancel: CancellationToken) {
    info!("notification worker started");
    context.publish(WorkerEvent::Started);

    if let Err(e) = process_notifications(&context, &cancel).await {
        error!("notification worker failed: {e}");
        context.publish(WorkerEvent::Failed { reason: e.to_string() });
    }

    info!("notification worker stopped");
    context.publish(WorkerEvent::Stopped);
}

async fn process_notifications(
    context: &Arc<WorkerContext>,
    cancel: &CancellationToken,
) -> Result<(), DispatchError> {
    let trigger = context.config.snapshot().trigger_device;
    let device_class = trigger.interface_class();

    // Registering and unregistering may wait on an OS thread; keep both off
    // the async worker.
    let notifications = Arc::clone(&context.notifications);
    let registered = tokio::task::spawn_blocking(move || notifications.register(device_class))
        .await
        .map_err(|e| DispatchError::WorkerPanicked(e.to_string()))?;
    let mut subscription = match registered {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!("could not listen for {trigger} notifications: {e}");
            return Ok(());
        }
    };
    info!(%device_class, "listening for {trigger} notifications");
    context.publish(WorkerEvent::Listening(device_class));

    let result = watch_subscription(context, cancel, &mut subscription).await;

    tokio::task::spawn_blocking(move || drop(subscription))
        .await
        .map_err(|e| DispatchError::WorkerPanicked(e.to_string()))?;
    result
}

async fn watch_subscription(
    context: &WorkerContext,
    cancel: &CancellationToken,
    subscription: &mut DeviceSubscription,
) -> Result<(), DispatchError> {
    let mut last_action: Option<DeviceAction> = None;
    loop {
        let action = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("worker cancellation requested");
                return Ok(());
            }
            next = subscription.next() => match next {
                Some(action) => action,
                None => {
                    info!("device notification stream closed");
                    return Ok(());
                }
            },
        };

        if last_action == Some(action) {
            debug!(%action, "ignoring repeated notification");
            context.publish(WorkerEvent::Ignored { action, reason: IgnoreReason::Duplicate });
            continue;
        }
        last_action = Some(action);

        if !context.enabled.load(Ordering::SeqCst) {
            info!(%action, "switching disabled; ignoring notification");
            context.publish(WorkerEvent::Ignored { action, reason: IgnoreReason::Disabled });
            continue;
        }

        let report = dispatch_in_background(context, action).await?;
        info!(
            %action,
            monitors = report.monitors_loaded,
            commands = report.commands.len(),
            "notification processed"
        );
        context.publish(WorkerEvent::Processed(report));
    }
}

async fn dispatch_in_background(
    context: &WorkerContext,
    action: DeviceAction,
) -> Result<DispatchReport, DispatchError> {
    let display_api = Arc::clone(&context.display_api);
    let config = context.config.snapshot();

    tokio::task::spawn_blocking(move || dispatch_action(&display_api, &config.monitors, action))
        .await
        .map_err(|e| DispatchError::WorkerPanicked(e.to_string()))?
}

/// Loads the monitors and applies every rule that has a setting for `action`.
///
/// Blocking; monitor handles are released before returning.
///
/// # Errors
///
/// [`DispatchError::LoadMonitors`] when the monitors cannot be enumerated.
pub fn dispatch_action(
    api: &Arc<dyn DisplayApi>,
    rules: &[MonitorRule],
    action: DeviceAction,
) -> Result<DispatchReport, DispatchError> {
    let monitors = load_monitors(api)?;
    let mut commands = Vec::new();
    let mut unmatched_rules = 0;

    for (index, rule) in rules.iter().enumerate() {
        let Some(setting) = rule.setting_for(action) else {
            continue;
        };

        let matched: Vec<&Monitor> = matching_monitors(rule, &monitors).collect();
        if matched.is_empty() {
            unmatched_rules += 1;
            warn!(
                "rule #{index} matched no monitor on {action}; known monitors: [{}]",
                describe(&monitors)
            );
            continue;
        }

        for monitor in matched {
            info!(
                "setting VCP {:#04x} to {:#x} on {monitor} (rule #{index})",
                setting.code, setting.value
            );
            // TODO: surface a failed SetVCPFeature in the report once callers can act on it.
            if let Err(e) = api.set_vcp_feature(monitor.handle(), setting.code, setting.value) {
                debug!("SetVCPFeature on {monitor}: {e}");
            }
            commands.push(VcpCommand {
                monitor: monitor.identity().clone(),
                handle: monitor.handle(),
                setting,
            });
        }
    }

    Ok(DispatchReport {
        action,
        monitors_loaded: monitors.len(),
        commands,
        unmatched_rules,
    })
}

fn describe(monitors: &[Monitor]) -> String {
    monitors
        .iter()
        .map(|m| m.identity().to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::display_api::calls;
    use crate::infrastructure::device_notifications::NotificationError;
    use crate::infrastructure::display_api::fake::{FakeDisplayApi, VcpSetCall};

    fn rule(description: Option<&str>, attach: Option<(u8, u32)>, detach: Option<(u8, u32)>) -> MonitorRule {
        let setting = |(code, value): (u8, u32)| VcpSetting { code, value };
        MonitorRule {
            description: description.map(str::to_string),
            attach: attach.map(setting),
            detach: detach.map(setting),
            ..Default::default()
        }
    }

    fn desk() -> (Arc<FakeDisplayApi>, Arc<dyn DisplayApi>) {
        let fake = Arc::new(
            FakeDisplayApi::new()
                .with_display_monitor(r"\\.\DISPLAY1", &[(0x100, "DELL U2720Q")])
                .with_display_monitor(r"\\.\DISPLAY2", &[(0x200, "LG 27GL850")]),
        );
        let api: Arc<dyn DisplayApi> = fake.clone();
        (fake, api)
    }

    #[test]
    fn test_dispatch_applies_matching_rule_for_action() {
        // Arrange
        let (fake, api) = desk();
        let rules = vec![rule(Some("LG 27GL850"), Some((0x60, 0x0F)), Some((0x60, 0x11)))];

        // Act
        let report = dispatch_action(&api, &rules, DeviceAction::Removal).expect("dispatch");

        // Assert
        assert_eq!(
            fake.set_calls(),
            vec![VcpSetCall { handle: RawMonitorHandle(0x200), code: 0x60, value: 0x11 }]
        );
        assert_eq!(report.monitors_loaded, 2);
        assert_eq!(report.commands.len(), 1);
        assert_eq!(report.unmatched_rules, 0);
    }

    #[test]
    fn test_wildcard_rule_writes_every_monitor() {
        let (fake, api) = desk();
        let rules = vec![rule(None, Some((0x10, 50)), None)];

        dispatch_action(&api, &rules, DeviceAction::Arrival).expect("dispatch");

        assert_eq!(fake.set_calls().len(), 2);
    }

    #[test]
    fn test_rules_without_setting_for_action_are_skipped() {
        let (fake, api) = desk();
        let rules = vec![rule(None, Some((0x60, 0x0F)), None)];

        let report = dispatch_action(&api, &rules, DeviceAction::Removal).expect("dispatch");

        assert!(fake.set_calls().is_empty());
        assert_eq!(report.unmatched_rules, 0);
    }

    #[test]
    fn test_unmatched_rule_is_counted() {
        let (fake, api) = desk();
        let rules = vec![rule(Some("unknown"), Some((0x60, 0x0F)), None)];

        let report = dispatch_action(&api, &rules, DeviceAction::Arrival).expect("dispatch");

        assert!(fake.set_calls().is_empty());
        assert_eq!(report.unmatched_rules, 1);
    }

    #[test]
    fn test_overlapping_rules_each_write() {
        let (fake, api) = desk();
        let rules = vec![
            rule(Some("DELL U2720Q"), Some((0x60, 0x0F)), None),
            rule(None, Some((0x10, 80)), None),
        ];

        dispatch_action(&api, &rules, DeviceAction::Arrival).expect("dispatch");

        assert_eq!(
            fake.set_calls(),
            vec![
                VcpSetCall { handle: RawMonitorHandle(0x100), code: 0x60, value: 0x0F },
                VcpSetCall { handle: RawMonitorHandle(0x100), code: 0x10, value: 80 },
                VcpSetCall { handle: RawMonitorHandle(0x200), code: 0x10, value: 80 },
            ]
        );
    }

    #[test]
    fn test_failed_vcp_write_does_not_fail_the_dispatch() {
        // Known gap: the write status is only logged.
        let fake = Arc::new(
            FakeDisplayApi::new()
                .with_display_monitor(r"\\.\DISPLAY1", &[(0x100, "DELL U2720Q")])
                .failing(calls::SET_VCP_FEATURE),
        );
        let api: Arc<dyn DisplayApi> = fake.clone();
        let rules = vec![rule(None, Some((0x60, 0x0F)), None)];

        let report = dispatch_action(&api, &rules, DeviceAction::Arrival).expect("dispatch");

        assert_eq!(report.commands.len(), 1);
        assert_eq!(fake.set_calls().len(), 1);
    }

    #[test]
    fn test_handles_are_released_after_dispatch() {
        let (fake, api) = desk();

        dispatch_action(&api, &[], DeviceAction::Arrival).expect("dispatch");

        assert_eq!(fake.destroyed().len(), 2);
    }

    #[test]
    fn test_load_failure_is_reported() {
        let fake = FakeDisplayApi::new().failing(calls::ENUM_DISPLAY_MONITORS);
        let api: Arc<dyn DisplayApi> = Arc::new(fake);

        let err = dispatch_action(&api, &[], DeviceAction::Arrival).unwrap_err();

        assert!(matches!(err, DispatchError::LoadMonitors(_)));
    }

    #[test]
    fn test_shared_config_replace_is_seen_by_new_snapshots() {
        // Arrange
        let shared = SharedConfig::new(SwitchConfig::default());
        let before = shared.snapshot();

        // Act
        shared.replace(SwitchConfig {
            log_level: "debug".to_string(),
            ..Default::default()
        });

        // Assert
        assert_eq!(before.log_level, "info");
        assert_eq!(shared.snapshot().log_level, "debug");
    }

    /// Records which threads register and unregister.
    #[derive(Default)]
    struct ThreadRecordingSource {
        threads: Arc<std::sync::Mutex<Vec<std::thread::ThreadId>>>,
    }

    struct RecordOnDrop(Arc<std::sync::Mutex<Vec<std::thread::ThreadId>>>);

    impl Drop for RecordOnDrop {
        fn drop(&mut self) {
            if let Ok(mut threads) = self.0.lock() {
                threads.push(std::thread::current().id());
            }
        }
    }

    impl DeviceNotificationSource for ThreadRecordingSource {
        fn register(&self, _device_class: Uuid) -> Result<DeviceSubscription, NotificationError> {
            self.threads.lock().expect("lock").push(std::thread::current().id());
            let (sender, subscription) = DeviceSubscription::channel(RecordOnDrop(Arc::clone(&self.threads)));
            // Keep the stream open until the subscription is dropped.
            std::mem::forget(sender);
            Ok(subscription)
        }
    }

    #[tokio::test]
    async fn test_worker_registers_and_unregisters_off_the_runtime_thread() {
        // Arrange: a current-thread runtime runs the worker on this thread.
        let source = ThreadRecordingSource::default();
        let threads = Arc::clone(&source.threads);
        let (_, api) = desk();
        let mut task = BackgroundTask::new(
            api,
            Arc::new(source),
            SharedConfig::default(),
            Arc::new(AtomicBool::new(true)),
        );
        let mut events = task.subscribe();

        // Act
        task.restart().await;
        assert_eq!(events.recv().await.expect("event"), WorkerEvent::Started);
        assert!(matches!(events.recv().await.expect("event"), WorkerEvent::Listening(_)));
        task.shutdown().await;

        // Assert
        let recorded = threads.lock().expect("lock").clone();
        let runtime_thread = std::thread::current().id();
        assert_eq!(recorded.len(), 2);
        assert!(recorded.iter().all(|id| *id != runtime_thread));
    }
}

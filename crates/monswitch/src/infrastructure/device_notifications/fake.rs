//! Test notification source driven by hand.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use monswitch_core::DeviceAction;

use super::{DeviceNotificationSource, DeviceSubscription, NotificationError, NotificationSender};

#[derive(Debug, Default)]
struct FakeState {
    sender: Option<NotificationSender>,
    registrations: Vec<Uuid>,
    fail_registration: bool,
}

/// A [`DeviceNotificationSource`] whose notifications are raised by the test.
///
/// Only the most recent registration receives notifications, mirroring how a
/// restarted worker replaces its predecessor.
#[derive(Debug, Default)]
pub struct FakeDeviceNotifications {
    state: Mutex<FakeState>,
    active: Arc<AtomicUsize>,
}

/// Counts live subscriptions.
struct ActiveRegistration(Arc<AtomicUsize>);

impl Drop for ActiveRegistration {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeDeviceNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source whose registrations always fail.
    pub fn failing() -> Self {
        let fake = Self::default();
        fake.lock().fail_registration = true;
        fake
    }

    /// Raises `action` on the current subscription.
    ///
    /// Returns `false` when nothing is subscribed.
    pub fn notify(&self, action: DeviceAction) -> bool {
        self.lock()
            .sender
            .as_ref()
            .is_some_and(|sender| sender.notify(action))
    }

    /// Ends the current subscription's stream.
    pub fn close(&self) {
        self.lock().sender = None;
    }

    /// Device classes registered so far, in order.
    pub fn registrations(&self) -> Vec<Uuid> {
        self.lock().registrations.clone()
    }

    /// Number of subscriptions not yet dropped.
    pub fn active_subscriptions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DeviceNotificationSource for FakeDeviceNotifications {
    fn register(&self, device_class: Uuid) -> Result<DeviceSubscription, NotificationError> {
        let mut state = self.lock();
        state.registrations.push(device_class);
        if state.fail_registration {
            return Err(NotificationError::RegistrationFailed(format!(
                "no such device class {device_class}"
            )));
        }

        self.active.fetch_add(1, Ordering::SeqCst);
        let (sender, subscription) =
            DeviceSubscription::channel(ActiveRegistration(Arc::clone(&self.active)));
        state.sender = Some(sender);
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_reaches_latest_subscription() {
        let fake = FakeDeviceNotifications::new();
        let mut subscription = fake.register(Uuid::nil()).unwrap();

        assert!(fake.notify(DeviceAction::Removal));

        assert_eq!(subscription.next().await, Some(DeviceAction::Removal));
        assert_eq!(fake.registrations(), vec![Uuid::nil()]);
    }

    #[test]
    fn test_notify_without_subscription_is_not_delivered() {
        assert!(!FakeDeviceNotifications::new().notify(DeviceAction::Arrival));
    }

    #[test]
    fn test_failing_source_records_the_attempt() {
        let fake = FakeDeviceNotifications::failing();

        let result = fake.register(Uuid::nil());

        assert!(matches!(result, Err(NotificationError::RegistrationFailed(_))));
        assert_eq!(fake.registrations().len(), 1);
        assert_eq!(fake.active_subscriptions(), 0);
    }

    #[test]
    fn test_dropping_subscription_updates_active_count() {
        let fake = FakeDeviceNotifications::new();
        let subscription = fake.register(Uuid::nil()).unwrap();
        assert_eq!(fake.active_subscriptions(), 1);

        drop(subscription);

        assert_eq!(fake.active_subscriptions(), 0);
    }
}

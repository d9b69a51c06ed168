//! Device arrival/removal notifications for one device interface class.
//!
//! [`DeviceNotificationSource::register`] starts listening for a device class
//! (keyboards, mice, or any custom interface GUID) and hands back a
//! [`DeviceSubscription`].  The OS side pushes actions into a small bounded
//! queue without ever blocking; when the consumer falls behind the *oldest*
//! queued actions are dropped, so the consumer always sees the most recent
//! state of the device.
//!
//! ```text
//!   OS message thread ──notify()──► broadcast (capacity 4) ──next()──► worker
//! ```
//!
//! Dropping the subscription unregisters from the OS.

use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;
use uuid::Uuid;

use monswitch_core::DeviceAction;

pub mod fake;

/// Queue capacity between the OS callback and the consumer.
pub const NOTIFICATION_QUEUE_CAPACITY: usize = 4;

/// Error type for notification registration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotificationError {
    /// The OS refused the registration.
    #[error("device notification registration failed: {0}")]
    RegistrationFailed(String),
}

/// Source of device arrival/removal notifications.
pub trait DeviceNotificationSource: Send + Sync {
    /// Starts listening for devices of interface class `device_class`.
    ///
    /// Blocking: implementations may wait for an OS thread to come up, and
    /// dropping the returned subscription may wait for it to exit.  Call both
    /// from a blocking context.
    fn register(&self, device_class: Uuid) -> Result<DeviceSubscription, NotificationError>;
}

/// Producer side of a notification queue.  Never blocks.
#[derive(Debug, Clone)]
pub struct NotificationSender(broadcast::Sender<DeviceAction>);

impl NotificationSender {
    /// Queues `action`, displacing the oldest entry when the queue is full.
    ///
    /// Returns `false` when the subscription has already been dropped.
    pub fn notify(&self, action: DeviceAction) -> bool {
        self.0.send(action).is_ok()
    }
}

/// Live registration for one device class.
pub struct DeviceSubscription {
    receiver: broadcast::Receiver<DeviceAction>,
    _registration: Box<dyn Send>,
}

impl DeviceSubscription {
    /// Creates a subscription and its producer.  `registration` is kept alive
    /// until the subscription is dropped; its `Drop` should undo the OS
    /// registration.
    pub fn channel(registration: impl Send + 'static) -> (NotificationSender, Self) {
        let (sender, receiver) = broadcast::channel(NOTIFICATION_QUEUE_CAPACITY);
        (
            NotificationSender(sender),
            Self {
                receiver,
                _registration: Box::new(registration),
            },
        )
    }

    /// Waits for the next action.  Returns `None` once every producer is gone.
    ///
    /// Cancel-safe: dropping the future never loses a queued action.
    pub async fn next(&mut self) -> Option<DeviceAction> {
        loop {
            match self.receiver.recv().await {
                Ok(action) => return Some(action),
                Err(RecvError::Lagged(skipped)) => {
                    debug!("dropped {skipped} stale device notification(s)");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl std::fmt::Debug for DeviceSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSubscription").finish_non_exhaustive()
    }
}

// ── Windows implementation ────────────────────────────────────────────────────

#[cfg(target_os = "windows")]
pub mod windows;

/// Re-export the Windows implementation as `NativeDeviceNotifications`.
#[cfg(target_os = "windows")]
pub use self::windows::WindowsDeviceNotifications as NativeDeviceNotifications;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscription_delivers_actions_in_order() {
        // Arrange
        let (sender, mut subscription) = DeviceSubscription::channel(());

        // Act
        sender.notify(DeviceAction::Arrival);
        sender.notify(DeviceAction::Removal);

        // Assert
        assert_eq!(subscription.next().await, Some(DeviceAction::Arrival));
        assert_eq!(subscription.next().await, Some(DeviceAction::Removal));
    }

    #[tokio::test]
    async fn test_full_queue_drops_oldest_actions() {
        // Arrange
        let (sender, mut subscription) = DeviceSubscription::channel(());
        let burst = [
            DeviceAction::Arrival,
            DeviceAction::Removal,
            DeviceAction::Arrival,
            DeviceAction::Removal,
            DeviceAction::Arrival,
            DeviceAction::Removal,
        ];

        // Act: the producer never blocks, even past capacity.
        for action in burst {
            assert!(sender.notify(action));
        }
        drop(sender);

        // Assert: only the newest NOTIFICATION_QUEUE_CAPACITY actions survive.
        let mut received = Vec::new();
        while let Some(action) = subscription.next().await {
            received.push(action);
        }
        assert_eq!(received, burst[burst.len() - NOTIFICATION_QUEUE_CAPACITY..]);
    }

    #[tokio::test]
    async fn test_stream_ends_when_sender_is_dropped() {
        let (sender, mut subscription) = DeviceSubscription::channel(());
        drop(sender);
        assert_eq!(subscription.next().await, None);
    }

    #[test]
    fn test_notify_after_subscription_drop_reports_false() {
        let (sender, subscription) = DeviceSubscription::channel(());
        drop(subscription);
        assert!(!sender.notify(DeviceAction::Arrival));
    }

    #[test]
    fn test_registration_guard_is_dropped_with_subscription() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        struct Guard(Arc<AtomicBool>);
        impl Drop for Guard {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let released = Arc::new(AtomicBool::new(false));
        let (_sender, subscription) = DeviceSubscription::channel(Guard(Arc::clone(&released)));

        drop(subscription);

        assert!(released.load(Ordering::SeqCst));
    }
}

//! Windows device notifications via `RegisterDeviceNotificationW`.
//!
//! Each registration owns a dedicated thread running a message-only window.
//! `WM_DEVICECHANGE` messages for the registered interface class are turned
//! into [`DeviceAction`]s and pushed into the subscription queue.  Dropping the
//! subscription posts `WM_QUIT` to that thread, which unregisters, destroys the
//! window and exits.
//!
//! # Safety
//!
//! This module uses `unsafe` code exclusively for Windows API FFI calls.
//! All `unsafe` blocks are annotated with `// SAFETY:` comments.

#![cfg(target_os = "windows")]

use std::cell::RefCell;
use std::ffi::c_void;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};
use uuid::Uuid;
use windows::core::{w, GUID};
use windows::Win32::Foundation::{HANDLE, HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetMessageW,
    PostThreadMessageW, RegisterClassW, RegisterDeviceNotificationW, UnregisterDeviceNotification,
    DBT_DEVICEARRIVAL, DBT_DEVICEREMOVECOMPLETE, DBT_DEVTYP_DEVICEINTERFACE,
    DEVICE_NOTIFY_WINDOW_HANDLE, DEV_BROADCAST_DEVICEINTERFACE_W, HWND_MESSAGE, MSG,
    WINDOW_EX_STYLE, WINDOW_STYLE, WM_DEVICECHANGE, WM_QUIT, WNDCLASSW,
};

use monswitch_core::DeviceAction;

use super::{DeviceNotificationSource, DeviceSubscription, NotificationError, NotificationSender};

thread_local! {
    /// Sender for the registration owned by the current message thread.
    static SENDER: RefCell<Option<NotificationSender>> = const { RefCell::new(None) };
}

/// Windows implementation of [`DeviceNotificationSource`].
pub struct WindowsDeviceNotifications;

impl WindowsDeviceNotifications {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WindowsDeviceNotifications {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceNotificationSource for WindowsDeviceNotifications {
    fn register(&self, device_class: Uuid) -> Result<DeviceSubscription, NotificationError> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<u32, String>>();
        let (sender_tx, sender_rx) = mpsc::channel::<NotificationSender>();

        let thread = thread::Builder::new()
            .name("monswitch-device-notify".to_string())
            .spawn(move || run_message_loop(device_class, sender_rx, ready_tx))
            .map_err(|e| NotificationError::RegistrationFailed(e.to_string()))?;

        let thread_id = match ready_rx.recv() {
            Ok(Ok(thread_id)) => thread_id,
            Ok(Err(reason)) => {
                let _ = thread.join();
                return Err(NotificationError::RegistrationFailed(reason));
            }
            Err(_) => {
                let _ = thread.join();
                return Err(NotificationError::RegistrationFailed(
                    "notification thread exited during registration".to_string(),
                ));
            }
        };

        let (sender, subscription) = DeviceSubscription::channel(MessageThread {
            thread_id,
            thread: Some(thread),
        });
        // The thread is parked on this channel until it owns the sender.
        sender_tx
            .send(sender)
            .map_err(|_| NotificationError::RegistrationFailed("notification thread exited".to_string()))?;
        Ok(subscription)
    }
}

/// Owns the message thread; stops and joins it on drop.
struct MessageThread {
    thread_id: u32,
    thread: Option<JoinHandle<()>>,
}

impl Drop for MessageThread {
    fn drop(&mut self) {
        // SAFETY: posting to a thread id is safe even if the thread has exited.
        if let Err(e) = unsafe { PostThreadMessageW(self.thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) } {
            debug!("could not post WM_QUIT to notification thread: {e}");
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("device notification thread panicked");
            }
        }
    }
}

fn run_message_loop(
    device_class: Uuid,
    sender_rx: mpsc::Receiver<NotificationSender>,
    ready: mpsc::Sender<Result<u32, String>>,
) {
    let window = match create_message_window() {
        Ok(window) => window,
        Err(e) => {
            let _ = ready.send(Err(format!("CreateWindowExW failed: {e}")));
            return;
        }
    };

    let mut filter = DEV_BROADCAST_DEVICEINTERFACE_W {
        dbcc_size: std::mem::size_of::<DEV_BROADCAST_DEVICEINTERFACE_W>() as u32,
        dbcc_devicetype: DBT_DEVTYP_DEVICEINTERFACE.0,
        dbcc_classguid: GUID::from_u128(device_class.as_u128()),
        ..Default::default()
    };

    // SAFETY: `filter` is a valid DEV_BROADCAST_DEVICEINTERFACE_W for the
    // duration of the call and `window` is a live window owned by this thread.
    let registration = unsafe {
        RegisterDeviceNotificationW(
            HANDLE(window.0),
            &mut filter as *mut DEV_BROADCAST_DEVICEINTERFACE_W as *const c_void,
            DEVICE_NOTIFY_WINDOW_HANDLE,
        )
    };
    let registration = match registration {
        Ok(registration) => registration,
        Err(e) => {
            let _ = ready.send(Err(format!("RegisterDeviceNotificationW failed: {e}")));
            // SAFETY: `window` was created on this thread.
            let _ = unsafe { DestroyWindow(window) };
            return;
        }
    };

    // SAFETY: trivially safe.
    let thread_id = unsafe { GetCurrentThreadId() };
    let _ = ready.send(Ok(thread_id));

    if let Ok(sender) = sender_rx.recv() {
        SENDER.with(|slot| *slot.borrow_mut() = Some(sender));
        debug!("listening for device class {device_class} on thread {thread_id}");

        let mut msg = MSG::default();
        // SAFETY: standard GetMessage/DispatchMessage loop; exits on WM_QUIT.
        unsafe {
            while GetMessageW(&mut msg, None, 0, 0).as_bool() {
                DispatchMessageW(&msg);
            }
        }
        SENDER.with(|slot| slot.borrow_mut().take());
    }

    // SAFETY: both handles were created on this thread and are released once.
    unsafe {
        if let Err(e) = UnregisterDeviceNotification(registration) {
            debug!("UnregisterDeviceNotification failed: {e}");
        }
        let _ = DestroyWindow(window);
    }
}

fn create_message_window() -> windows::core::Result<HWND> {
    let class_name = w!("MonswitchDeviceNotifications");

    // SAFETY: the class name is a static wide string and `window_proc` has
    // the WNDPROC signature.
    unsafe {
        let instance = GetModuleHandleW(None)?;
        let class = WNDCLASSW {
            lpfnWndProc: Some(window_proc),
            hInstance: instance.into(),
            lpszClassName: class_name,
            ..Default::default()
        };
        // Fails harmlessly with ERROR_CLASS_ALREADY_EXISTS after the first registration.
        RegisterClassW(&class);

        CreateWindowExW(
            WINDOW_EX_STYLE::default(),
            class_name,
            w!(""),
            WINDOW_STYLE::default(),
            0,
            0,
            0,
            0,
            HWND_MESSAGE,
            None,
            instance,
            None,
        )
    }
}

/// Message-only window procedure.
///
/// # Safety
///
/// Called by Windows on the message thread from `DispatchMessageW`.
unsafe extern "system" fn window_proc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if msg == WM_DEVICECHANGE {
        let action = match wparam.0 as u32 {
            DBT_DEVICEARRIVAL => Some(DeviceAction::Arrival),
            DBT_DEVICEREMOVECOMPLETE => Some(DeviceAction::Removal),
            _ => None,
        };
        if let Some(action) = action {
            SENDER.with(|slot| {
                if let Some(sender) = slot.borrow().as_ref() {
                    sender.notify(action);
                }
            });
        }
        return LRESULT(1);
    }
    DefWindowProcW(hwnd, msg, wparam, lparam)
}

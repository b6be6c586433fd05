//! Notification gate.
//!
//! [`should_notify`] decides whether a `notification` event is surfaced;
//! a [`Notifier`] shows it. The two are kept apart so the policy can be
//! tested without a browser.

use bubble_shared::{NotificationPayload, RoomId};

/// Inputs of the gate decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateInput<'a> {
    pub event_room: &'a RoomId,
    pub active_room: Option<&'a RoomId>,
    /// Whether the client window has input focus.
    pub focused: bool,
    /// The sender's identity field, if the event carries one.
    pub sender_identity: Option<&'a str>,
}

/// Suppress when the user is already looking at the room, or when the event
/// cannot be attributed to a sender. Surface otherwise.
pub fn should_notify(input: &GateInput<'_>) -> bool {
    let has_sender = input
        .sender_identity
        .is_some_and(|identity| !identity.is_empty());
    if !has_sender {
        return false;
    }
    let viewing = input.focused && input.active_room == Some(input.event_room);
    !viewing
}

/// A notification ready to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    pub room: RoomId,
}

impl Notice {
    pub fn from_payload(payload: &NotificationPayload) -> Self {
        Self {
            title: format!("Message from {}", payload.sender.display_name),
            body: payload.sender.message.clone(),
            icon: payload.sender.picture.clone().filter(|p| !p.is_empty()),
            room: payload.room_id.clone(),
        }
    }

    /// Route the click-through action navigates to.
    pub fn target_path(&self) -> String {
        format!("/bubble/server/{}", self.room)
    }
}

/// Run the gate over an inbound payload.
pub fn decide(
    payload: &NotificationPayload,
    active_room: Option<&RoomId>,
    focused: bool,
) -> Option<Notice> {
    let input = GateInput {
        event_room: &payload.room_id,
        active_room,
        focused,
        sender_identity: payload.sender.token.as_deref(),
    };
    should_notify(&input).then(|| Notice::from_payload(payload))
}

/// Side-effecting half: puts a notice in front of the user.
pub trait Notifier {
    fn show(&self, notice: Notice);
}

/// Writes notices to the log. Used by the headless binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show(&self, notice: Notice) {
        crate::log_info!("{}: {} ({})", notice.title, notice.body, notice.target_path());
    }
}

#[cfg(target_arch = "wasm32")]
mod wasm {
    use std::rc::Rc;

    use wasm_bindgen::prelude::*;
    use web_sys::{Notification, NotificationOptions, NotificationPermission};

    use super::{Notice, Notifier};

    type Navigate = Rc<dyn Fn(&str)>;

    /// Shows notices with the browser Notification API. Clicking one runs
    /// the navigate callback with the notice's room path.
    #[derive(Clone)]
    pub struct BrowserNotifier {
        navigate: Navigate,
    }

    impl Default for BrowserNotifier {
        fn default() -> Self {
            Self::new(|path| {
                if let Some(window) = web_sys::window() {
                    let _ = window.location().set_href(path);
                }
            })
        }
    }

    impl BrowserNotifier {
        pub fn new(navigate: impl Fn(&str) + 'static) -> Self {
            Self {
                navigate: Rc::new(navigate),
            }
        }

        /// Ask for permission if the user has not decided yet.
        pub fn request_permission() {
            if Notification::permission() == NotificationPermission::Default {
                if let Err(e) = Notification::request_permission() {
                    crate::log_warn!("Notification permission request failed: {:?}", e);
                }
            }
        }
    }

    impl Notifier for BrowserNotifier {
        fn show(&self, notice: Notice) {
            if Notification::permission() != NotificationPermission::Granted {
                crate::log_debug!("Notifications not permitted, dropping: {}", notice.title);
                return;
            }

            let options = NotificationOptions::new();
            options.set_body(&notice.body);
            if let Some(icon) = &notice.icon {
                options.set_icon(icon);
            }

            let notification = match Notification::new_with_options(&notice.title, &options) {
                Ok(n) => n,
                Err(e) => {
                    crate::log_error!("Failed to show notification: {:?}", e);
                    return;
                }
            };

            let navigate = self.navigate.clone();
            let path = notice.target_path();
            let onclick = Closure::wrap(Box::new(move || {
                navigate(&path);
            }) as Box<dyn FnMut()>);
            notification.set_onclick(Some(onclick.as_ref().unchecked_ref()));
            onclick.forget();
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use wasm::BrowserNotifier;

/// Default notifier for the current platform.
#[cfg(target_arch = "wasm32")]
pub type PlatformNotifier = BrowserNotifier;
#[cfg(not(target_arch = "wasm32"))]
pub type PlatformNotifier = LogNotifier;

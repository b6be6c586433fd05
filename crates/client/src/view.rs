//! Dioxus bindings: a provider component that owns the sync client and
//! hooks for components below it.
//!
//! Components read snapshots from the client during render. The provider
//! bumps a revision signal whenever an event that changes visible state is
//! dispatched, which re-renders readers.

use std::rc::Rc;

use bubble_shared::event_names as events;
use dioxus::prelude::*;

use crate::client::SyncClient;
use crate::config::SyncConfig;
use crate::ws::Subscription;

/// Events after which readers re-render.
const WATCHED: &[&str] = &[
    events::MESSAGE,
    events::MESSAGE_EDITED,
    events::MESSAGE_DELETED,
    events::UPDATE,
    events::RETURN_USER,
    events::INVITE,
    events::CREATION_RESPONSE,
    events::SERVER_RESPONSE,
    events::ERROR,
];

/// Context provided by [`SyncProvider`].
#[derive(Clone)]
pub struct SyncContext {
    pub client: Rc<SyncClient>,
    pub revision: Signal<u64>,
}

/// Owns the session's [`SyncClient`] and drives its connection.
#[component]
pub fn SyncProvider(children: Element) -> Element {
    let revision = use_signal(|| 0u64);
    let client = use_hook(|| Rc::new(SyncClient::for_platform(SyncConfig::from_env())));

    // Keep the subscriptions alive as long as the provider.
    let _subscriptions = use_hook({
        let client = client.clone();
        move || {
            let subs: Vec<Subscription> = WATCHED
                .iter()
                .map(|event| {
                    client.bus().subscribe(event, move |_| {
                        let mut revision = revision;
                        *revision.write() += 1;
                    })
                })
                .collect();
            Rc::new(subs)
        }
    });

    use_hook({
        let client = client.clone();
        move || {
            #[cfg(target_arch = "wasm32")]
            {
                crate::notify::BrowserNotifier::request_permission();
                browser::watch_window(client.clone());
            }
            spawn(async move {
                client.run().await;
            });
        }
    });

    use_context_provider(|| SyncContext {
        client: client.clone(),
        revision,
    });

    rsx! {
        {children}
    }
}

/// The sync client of the enclosing [`SyncProvider`]. Components calling
/// this re-render when visible state changes.
pub fn use_sync_client() -> Rc<SyncClient> {
    let ctx = use_context::<SyncContext>();
    let _ = ctx.revision.read();
    ctx.client
}

#[cfg(target_arch = "wasm32")]
mod browser {
    use std::rc::Rc;

    use wasm_bindgen::prelude::*;
    use wasm_bindgen_futures::spawn_local;

    use crate::client::SyncClient;

    /// Report focus changes as presence, and go offline on unload.
    pub fn watch_window(client: Rc<SyncClient>) {
        let Some(window) = web_sys::window() else {
            return;
        };

        for (name, focused) in [("focus", true), ("blur", false)] {
            let client = client.clone();
            let callback = Closure::wrap(Box::new(move |_: web_sys::Event| {
                let client = client.clone();
                spawn_local(async move {
                    if let Err(e) = client.report_focus(focused).await {
                        crate::log_debug!("Focus change not reported: {}", e);
                    }
                });
            }) as Box<dyn FnMut(web_sys::Event)>);
            if let Err(e) = window.add_event_listener_with_callback(name, callback.as_ref().unchecked_ref()) {
                crate::log_warn!("Failed to watch {}: {:?}", name, e);
            }
            callback.forget();
        }

        let unload = Closure::wrap(Box::new(move |_: web_sys::Event| {
            client.shutdown();
        }) as Box<dyn FnMut(web_sys::Event)>);
        if let Err(e) = window.add_event_listener_with_callback("beforeunload", unload.as_ref().unchecked_ref()) {
            crate::log_warn!("Failed to watch unload: {:?}", e);
        }
        unload.forget();
    }
}

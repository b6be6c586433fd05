//! WASM/Web-specific transport using web_sys::WebSocket.

use futures_util::StreamExt;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{js_sys, CloseEvent, ErrorEvent, Event, MessageEvent, WebSocket};

use super::{Connector, TransportLink};

/// Opens connections with the browser's WebSocket API.
#[derive(Debug, Clone, Copy, Default)]
pub struct WasmConnector;

impl Connector for WasmConnector {
    fn connect(&self, link: TransportLink) {
        let TransportLink { url, mut outbound, events } = link;
        let id = events.id();

        let ws = match WebSocket::new(&url) {
            Ok(ws) => ws,
            Err(e) => {
                crate::log_error!("Failed to create WebSocket #{}: {:?}", id, e);
                events.closed(format!("{:?}", e));
                return;
            }
        };

        // Set up open handler
        let events_open = events.clone();
        let onopen_callback = Closure::wrap(Box::new(move |_: Event| {
            crate::log_info!("WebSocket #{} connected", events_open.id());
            events_open.opened();
        }) as Box<dyn FnMut(Event)>);
        ws.set_onopen(Some(onopen_callback.as_ref().unchecked_ref()));
        onopen_callback.forget();

        // Set up message handler
        let events_message = events.clone();
        let onmessage_callback = Closure::wrap(Box::new(move |e: MessageEvent| {
            if let Ok(text) = e.data().dyn_into::<js_sys::JsString>() {
                events_message.frame(text.into());
            }
        }) as Box<dyn FnMut(MessageEvent)>);
        ws.set_onmessage(Some(onmessage_callback.as_ref().unchecked_ref()));
        onmessage_callback.forget();

        // Set up error handler
        let onerror_callback = Closure::wrap(Box::new(move |_: ErrorEvent| {
            crate::log_error!("WebSocket #{} onerror fired", id);
        }) as Box<dyn FnMut(ErrorEvent)>);
        ws.set_onerror(Some(onerror_callback.as_ref().unchecked_ref()));
        onerror_callback.forget();

        // Set up close handler
        let events_close = events.clone();
        let onclose_callback = Closure::wrap(Box::new(move |e: CloseEvent| {
            let reason = if e.reason().is_empty() {
                format!("Code {}", e.code())
            } else {
                e.reason()
            };
            crate::log_info!("WebSocket #{} onclose: {}", events_close.id(), reason);
            events_close.closed(reason);
        }) as Box<dyn FnMut(CloseEvent)>);
        ws.set_onclose(Some(onclose_callback.as_ref().unchecked_ref()));
        onclose_callback.forget();

        // Send task: drains queued frames while the socket is open
        spawn_local(async move {
            while let Some(text) = outbound.next().await {
                if ws.ready_state() != WebSocket::OPEN {
                    crate::log_info!("WebSocket #{} no longer open, stopping send task", id);
                    break;
                }
                if let Err(e) = ws.send_with_str(&text) {
                    crate::log_error!("Send failed: {:?}", e);
                }
            }
            // Sender closed by the client, or socket gone
            let _ = ws.close();
            events.closed("closed by client");
        });
    }
}

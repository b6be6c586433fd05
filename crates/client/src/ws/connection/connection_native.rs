//! Native/Desktop transport using tokio-tungstenite.

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{Connector, TransportLink};

/// Opens connections on the ambient tokio runtime. `connect` must be called
/// from within a runtime context.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeConnector;

impl Connector for NativeConnector {
    fn connect(&self, link: TransportLink) {
        tokio::spawn(run_connection(link));
    }
}

/// Drive one connection until either side closes it.
async fn run_connection(link: TransportLink) {
    let TransportLink { url, mut outbound, events } = link;
    let id = events.id();

    let ws_stream = match connect_async(url.as_str()).await {
        Ok((ws_stream, _response)) => ws_stream,
        Err(e) => {
            crate::log_error!("WebSocket #{} to {} failed: {}", id, url, e);
            events.closed(e.to_string());
            return;
        }
    };

    events.opened();
    crate::log_info!("WebSocket #{} connected to {}", id, url);

    let (mut write, mut read) = ws_stream.split();

    let reason = loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => events.frame(text.as_str().to_owned()),
                Some(Ok(Message::Close(_))) | None => break "closed by server".to_string(),
                Some(Ok(Message::Ping(data))) => {
                    // Pong is handled automatically by tungstenite
                    crate::log_debug!("Received ping: {:?}", data);
                }
                Some(Ok(_)) => {
                    // Ignore binary, pong, etc.
                }
                Some(Err(e)) => {
                    crate::log_error!("WebSocket #{} read error: {}", id, e);
                    break e.to_string();
                }
            },
            frame = outbound.next() => match frame {
                Some(text) => {
                    crate::log_debug!("Sending on #{}: {}", id, text);
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        crate::log_error!("Send failed: {}", e);
                        break e.to_string();
                    }
                }
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    break "closed by client".to_string();
                }
            },
        }
    };

    crate::log_info!("WebSocket #{} to {} closed: {}", id, url, reason);
    events.closed(reason);
}

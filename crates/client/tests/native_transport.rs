//! The native transport against a loopback WebSocket server.

#![cfg(not(target_arch = "wasm32"))]

use std::rc::Rc;
use std::time::Duration;

use bubble_client::ws::PlatformConnector;
use bubble_client::{Endpoint, LogNotifier, MemoryTokenStore, Scheme, SyncClient, SyncConfig};
use bubble_shared::{ClientCommand, PresenceStatus};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

/// Pump the client until `done` holds, or fail after a few seconds.
async fn wait_for(client: &SyncClient, mut done: impl FnMut(&SyncClient) -> bool) {
    for _ in 0..500 {
        client.pump();
        if done(client) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn commands_and_events_cross_a_real_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let mut received = Vec::new();
        while received.len() < 2 {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => received.push(text.as_str().to_owned()),
                Some(Ok(_)) => {}
                other => panic!("unexpected: {other:?}"),
            }
        }

        let frame = r#"{"event":"message","data":{"id":1,"displayName":"bo","serverID":"r1","content":"hi"}}"#;
        ws.send(Message::Text(frame.into())).await.unwrap();

        // Wait for the client to go away.
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                break;
            }
        }
        received
    });

    let config = SyncConfig {
        endpoint: Endpoint {
            scheme: Scheme::Http,
            host: "127.0.0.1".into(),
            port: Some(port),
        },
        ..SyncConfig::default()
    };
    let client = SyncClient::new(
        config,
        PlatformConnector::default(),
        Rc::new(MemoryTokenStore::with_token("tok")),
        Rc::new(LogNotifier),
    );

    client.connect();
    wait_for(&client, |c| c.connection_state().is_open()).await;

    client.activate_room("r1".into());
    wait_for(&client, |c| c.with_active(|a| a.timeline.len()) == Some(1)).await;

    client.shutdown();
    let received = server.await.unwrap();
    let commands: Vec<ClientCommand> = received
        .iter()
        .map(|text| serde_json::from_str(text).unwrap())
        .collect();
    assert_eq!(
        commands,
        vec![
            ClientCommand::UpdateStatus { auth: "tok".into(), status: PresenceStatus::Online },
            ClientCommand::GetUser { token: "tok".into() },
        ]
    );
}

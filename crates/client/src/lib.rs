//! Bubble client - realtime sync core of the bubble chat client.
//!
//! One persistent connection is shared by every room and screen. The
//! [`SyncClient`] multiplexes it through an event bus and keeps the presence
//! roster and message timeline of the active room in sync with the server.

#[macro_use]
pub mod logging;

pub mod api_client;
pub mod client;
pub mod composer;
pub mod config;
pub mod error;
pub mod notify;
pub mod storage;
pub mod stores;
pub mod ws;

#[cfg(feature = "dioxus")]
pub mod view;

pub use api_client::ApiClient;
pub use client::{Activation, SyncClient};
pub use composer::{detect_link, Composer, ComposerMode};
pub use config::{Endpoint, ReconnectConfig, Scheme, SyncConfig};
pub use error::SyncError;
pub use notify::{should_notify, GateInput, LogNotifier, Notice, Notifier};
pub use storage::{LocalTokenStore, MemoryTokenStore, TokenStore};
pub use stores::{ActiveRoom, AppendOutcome, PresenceChange, Roster, Timeline};
pub use ws::{ConnectionManager, ConnectionState, EventBus, Subscription};

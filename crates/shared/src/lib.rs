//! Shared types for the bubble chat client: wire protocol, data model and errors.

pub mod error;
pub mod models;
pub mod protocol;

pub use error::*;
pub use models::*;
pub use protocol::*;

//! Live log streaming
//!
//! WebSocket fan-out of newly ingested entries to filtered subscribers.
//!
//! - [`hub`]: subscriber registry and bounded non-blocking dispatcher
//! - [`handler`]: axum WebSocket endpoint
//! - [`messages`]: wire frames

pub mod handler;
pub mod hub;
pub mod messages;

pub use handler::stream_handler;
pub use hub::{HubConfig, HubError, StreamHub, Subscription};
pub use messages::{ClientFrame, LogEvent, ServerFrame};

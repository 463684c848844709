//! WebSocket layer: per-client connections, subscription registry, event
//! fan-out, and session lifecycle.

pub mod broadcast;
pub mod connection;
pub mod messages;
pub mod registry;
pub mod session;

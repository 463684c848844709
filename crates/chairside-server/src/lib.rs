//! # chairside-server
//!
//! Axum `WebSocket` gateway for the Chairside clinic dashboard:
//!
//! - Subscription registry: channel and per-conversation membership per client
//! - Event fan-out: serialize-once broadcast with dead/slow client pruning
//! - Agent status tracking with snapshot seeding for late-joining clients
//! - Heartbeat, `/health`, graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod emit;
pub mod health;
pub mod server;
pub mod shutdown;
pub mod status;
pub mod websocket;

pub use server::{AppState, ChairsideServer};

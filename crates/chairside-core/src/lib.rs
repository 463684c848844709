//! # chairside-core
//!
//! Foundation types for the Chairside realtime layer:
//!
//! - **Wire events** ([`events`]): the envelope broadcast to dashboard
//!   clients, plus agent status vocabulary
//! - **Rate limiting** ([`ratelimit`]): token-bucket admission over
//!   caller-owned counters
//! - **Retry** ([`retry`]): bounded exponential backoff for model calls
//! - **Failure taxonomy** ([`failure`]): classification of agent failures
//!   into operator records and patient-facing replies

#![deny(unsafe_code)]

pub mod events;
pub mod failure;
pub mod ratelimit;
pub mod retry;

//! Signaling relay server library.
//!
//! Exposes the relay server for use in tests and embedding.
//! Clients join named rooms over a WebSocket and exchange offers, answers
//! and candidates addressed to a peer in the same room; the relay routes
//! them without looking inside.

pub mod client;
pub mod config;
pub mod hub;
pub mod origin;
pub mod relay;

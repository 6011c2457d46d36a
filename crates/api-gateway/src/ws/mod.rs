//! Streaming endpoint (`GET /streaming`).
//!
//! One WebSocket session can carry several concurrent subscriptions, each
//! opened by sending a `subscribe` request envelope.

pub mod handler;

pub use handler::WebSocketHandler;

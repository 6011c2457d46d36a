//! End-to-end tests against a running gateway.

pub mod harness;

mod flows;
mod registry;
mod streaming;

//! # capgate Test Suite
//!
//! ```text
//! tests/
//! ├── benches/          # criterion benchmarks (codec, descriptors, registry)
//! └── src/integration/  # a real gateway on ephemeral ports
//!     ├── harness.rs    # start / stop / register helpers
//!     ├── flows.rs      # /call and admin flows over HTTP
//!     ├── streaming.rs  # /streaming over WebSocket
//!     └── registry.rs   # restart and concurrent lookups
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p gateway-tests
//! cargo bench -p gateway-tests
//! ```

pub mod integration;

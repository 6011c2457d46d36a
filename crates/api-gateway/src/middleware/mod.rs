//! HTTP middleware.
//!
//! Public server: Request → Tracing → CORS → BodyLimit → Handler
//! Admin server:  Request → Tracing → AdminAuth → BodyLimit → Handler

pub mod auth;
pub mod cors;
pub mod metrics;
pub mod tracing;

pub use auth::{constant_time_compare, AdminAuthConfig, AdminAuthLayer};
pub use cors::create_cors_layer;
pub use metrics::{GatewayMetrics, RequestTimer};
pub use tracing::TracingLayer;

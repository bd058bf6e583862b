//! # Middleware
//!
//! Middleware wrap the terminal handler of a pipeline. Each one receives the
//! request and a [`Next`] for the inner layers and returns a response; the
//! pipeline builder catches any failure a middleware returns (or panic it
//! raises) and translates it into a response at that layer, so outer
//! middleware always get a response back from [`Next::run`].
//!
//! [`MiddlewareRegistry`] holds middleware by scope and produces the ordered
//! list for a segment, app, controller and route.
//!
//! Bundled middleware:
//!
//! - [`TracingMiddleware`] - per-request span with status and latency
//! - [`MetricsMiddleware`] - counters for requests, latency and status classes
//! - [`StaticGuardMiddleware`] - dot-file guard and cross-origin headers for
//!   public assets

mod core;
mod metrics;
mod registry;
mod static_guard;
mod tracing;

pub use core::{Layer, Middleware, MiddlewareRef, Next};
pub use metrics::MetricsMiddleware;
pub use registry::{MiddlewareRegistry, GLOBAL};
pub use static_guard::StaticGuardMiddleware;
pub use tracing::TracingMiddleware;

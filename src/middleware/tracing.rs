use std::time::Instant;

use tracing::{field, info_span};

use super::{Middleware, Next};
use crate::error::DispatchError;
use crate::request::Request;
use crate::response::Response;

/// Wraps the inner pipeline in a `request` span carrying the resolved
/// context and, once the response is back, its status and latency.
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    fn process(&self, req: &mut Request, next: Next<'_>) -> Result<Response, DispatchError> {
        let span = info_span!(
            "request",
            request_id = %req.request_id,
            method = %req.method,
            path = %req.path,
            segment = %req.segment,
            app = %req.app,
            controller = %req.controller,
            action = %req.action,
            status = field::Empty,
            latency_ms = field::Empty,
        );
        let start = Instant::now();
        let response = span.in_scope(|| next.run(req));
        span.record("status", response.status);
        span.record("latency_ms", start.elapsed().as_millis() as u64);
        Ok(response)
    }
}

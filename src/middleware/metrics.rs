use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use super::{Middleware, Next};
use crate::error::DispatchError;
use crate::request::Request;
use crate::response::Response;

/// Request counters, kept with relaxed atomics.
///
/// Tracks the request count, total latency, responses per status class and
/// the stack size of the coroutine that served the last request.
#[derive(Default)]
pub struct MetricsMiddleware {
    request_count: AtomicUsize,
    total_latency_ns: AtomicU64,
    /// Indexed by `status / 100 - 1`, i.e. 1xx through 5xx.
    status_classes: [AtomicUsize; 5],
    failures: AtomicUsize,
    stack_size: AtomicUsize,
}

impl MetricsMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Mean latency, zero before the first request.
    pub fn average_latency(&self) -> Duration {
        let count = self.request_count.load(Ordering::Relaxed) as u64;
        if count == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / count)
        }
    }

    /// Responses seen with a status in `class * 100 ..= class * 100 + 99`.
    pub fn status_class_count(&self, class: u16) -> usize {
        match class {
            1..=5 => self.status_classes[usize::from(class - 1)].load(Ordering::Relaxed),
            _ => 0,
        }
    }

    /// Responses that carried a translated failure.
    pub fn failure_count(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn stack_size(&self) -> usize {
        self.stack_size.load(Ordering::Relaxed)
    }

    fn record(&self, response: &Response, latency: Duration) {
        self.total_latency_ns
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);
        if let 100..=599 = response.status {
            self.status_classes[usize::from(response.status / 100 - 1)]
                .fetch_add(1, Ordering::Relaxed);
        }
        if response.exception().is_some() {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        let size = if may::coroutine::is_coroutine() {
            may::coroutine::current().stack_size()
        } else {
            may::config().get_stack_size()
        };
        self.stack_size.store(size, Ordering::Relaxed);
    }
}

impl Middleware for MetricsMiddleware {
    fn process(&self, req: &mut Request, next: Next<'_>) -> Result<Response, DispatchError> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();
        let response = next.run(req);
        self.record(&response, start.elapsed());
        Ok(response)
    }
}

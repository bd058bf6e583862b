use super::{Middleware, Next};
use crate::error::DispatchError;
use crate::request::Request;
use crate::response::Response;

/// Guard for public assets: hidden files are forbidden and, when an origin
/// is configured, cross-origin headers are added on the way out.
#[derive(Debug, Clone, Default)]
pub struct StaticGuardMiddleware {
    allow_origin: Option<String>,
}

impl StaticGuardMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn allow_origin(mut self, origin: &str) -> Self {
        self.allow_origin = Some(origin.to_string());
        self
    }
}

impl Middleware for StaticGuardMiddleware {
    fn process(&self, req: &mut Request, next: Next<'_>) -> Result<Response, DispatchError> {
        if req.path.contains("/.") {
            return Ok(Response::text(403, "<h1>403 forbidden</h1>"));
        }
        let mut response = next.run(req);
        if let Some(origin) = &self.allow_origin {
            response.set_header("access-control-allow-origin", origin.clone());
            response.set_header("access-control-allow-credentials", "true".to_string());
        }
        Ok(response)
    }
}

use std::fmt;
use std::sync::Arc;

use crate::container::{downcast, Container};
use crate::error::DispatchError;
use crate::request::Request;
use crate::response::Response;

/// One fully built pipeline layer. Layers never fail: any failure inside
/// them has already been translated into a response.
pub type Layer = dyn Fn(&mut Request) -> Response + Send + Sync;

/// The rest of the pipeline, handed to each middleware.
pub struct Next<'a> {
    inner: &'a Layer,
}

impl<'a> Next<'a> {
    pub(crate) fn new(inner: &'a Layer) -> Self {
        Next { inner }
    }

    /// Run the inner layers. The result is always a response, including
    /// when an inner middleware or the handler failed.
    pub fn run(self, req: &mut Request) -> Response {
        (self.inner)(req)
    }
}

pub trait Middleware: Send + Sync {
    fn process(&self, req: &mut Request, next: Next<'_>) -> Result<Response, DispatchError>;
}

impl<F> Middleware for F
where
    F: Fn(&mut Request, Next<'_>) -> Result<Response, DispatchError> + Send + Sync,
{
    fn process(&self, req: &mut Request, next: Next<'_>) -> Result<Response, DispatchError> {
        self(req, next)
    }
}

type MiddlewareFactory =
    dyn Fn(&dyn Container) -> Result<Arc<dyn Middleware>, DispatchError> + Send + Sync;

/// A middleware as registered, materialized once per pipeline build.
#[derive(Clone)]
pub enum MiddlewareRef {
    Instance(Arc<dyn Middleware>),
    /// Container id; the binding must hold an `Arc<dyn Middleware>`.
    Named(String),
    Factory(Arc<MiddlewareFactory>),
}

impl MiddlewareRef {
    pub fn new(middleware: impl Middleware + 'static) -> Self {
        MiddlewareRef::Instance(Arc::new(middleware))
    }

    /// Middleware from a closure.
    pub fn from_fn<F>(func: F) -> Self
    where
        F: Fn(&mut Request, Next<'_>) -> Result<Response, DispatchError> + Send + Sync + 'static,
    {
        MiddlewareRef::Instance(Arc::new(func))
    }

    pub fn named(id: &str) -> Self {
        MiddlewareRef::Named(id.to_string())
    }

    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn(&dyn Container) -> Result<Arc<dyn Middleware>, DispatchError> + Send + Sync + 'static,
    {
        MiddlewareRef::Factory(Arc::new(factory))
    }

    pub fn resolve(&self, container: &dyn Container) -> Result<Arc<dyn Middleware>, DispatchError> {
        match self {
            MiddlewareRef::Instance(m) => Ok(Arc::clone(m)),
            MiddlewareRef::Named(id) => {
                let instance = container.get(id)?;
                let boxed = downcast::<Arc<dyn Middleware>>(instance, id)?;
                Ok(Arc::clone(&*boxed))
            }
            MiddlewareRef::Factory(f) => f(container),
        }
    }
}

impl fmt::Debug for MiddlewareRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MiddlewareRef::Instance(_) => f.write_str("MiddlewareRef::Instance"),
            MiddlewareRef::Named(id) => write!(f, "MiddlewareRef::Named({id})"),
            MiddlewareRef::Factory(_) => f.write_str("MiddlewareRef::Factory"),
        }
    }
}

impl<M: Middleware + 'static> From<Arc<M>> for MiddlewareRef {
    fn from(m: Arc<M>) -> Self {
        MiddlewareRef::Instance(m)
    }
}

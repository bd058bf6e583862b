//! Callable handler with its parameter descriptor.

use std::fmt;
use std::sync::Arc;

use crate::error::DispatchError;
use crate::inject::{Args, ParamSpec};
use crate::request::Request;
use crate::response::Reply;

pub type HandlerFn = dyn Fn(&mut Request, &Args) -> Result<Reply, DispatchError> + Send + Sync;

/// A route or action body plus the parameter list the resolver binds against.
///
/// Handlers always receive the live request; `Args` holds the values bound to
/// `params` in declaration order.
#[derive(Clone)]
pub struct Handler {
    params: Arc<[ParamSpec]>,
    func: Arc<HandlerFn>,
}

impl Handler {
    pub fn new<F, R>(params: Vec<ParamSpec>, func: F) -> Self
    where
        F: Fn(&mut Request, &Args) -> Result<R, DispatchError> + Send + Sync + 'static,
        R: Into<Reply>,
    {
        Handler {
            params: params.into(),
            func: Arc::new(move |req: &mut Request, args: &Args| func(req, args).map(Into::into)),
        }
    }

    /// Handler that only takes the conventional `request` parameter.
    pub fn from_fn<F, R>(func: F) -> Self
    where
        F: Fn(&mut Request) -> Result<R, DispatchError> + Send + Sync + 'static,
        R: Into<Reply>,
    {
        Handler::new(vec![ParamSpec::request()], move |req, _| func(req))
    }

    pub(crate) fn from_parts(params: Arc<[ParamSpec]>, func: Arc<HandlerFn>) -> Self {
        Handler { params, func }
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn call(&self, request: &mut Request, args: &Args) -> Result<Reply, DispatchError> {
        (self.func)(request, args)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.params.iter().map(|p| p.name.as_str()).collect();
        f.debug_struct("Handler").field("params", &names).finish()
    }
}

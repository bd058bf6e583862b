//! # Middleware Pipeline Builder
//!
//! Turns a handler (or a controller action) plus the middleware that apply
//! to its segment, app, controller and route into one callable that always
//! yields a [`Response`].
//!
//! The builder decides once, at build time, whether the terminal handler
//! needs full dependency resolution or can be called with the caller's
//! arguments as they are. Controllers are instantiated once when
//! `app.controller_reuse` is on (the default) and per call otherwise.
//!
//! Every layer, the terminal one included, runs under its own failure
//! boundary: returned errors and panics are translated into a response right
//! there, so an outer middleware's [`Next::run`] always gets a response back
//! and can still post-process it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::Config;
use crate::container::{Container, Containers};
use crate::controller::ControllerClass;
use crate::error::DispatchError;
use crate::exception::ExceptionTranslator;
use crate::handler::Handler;
use crate::inject::{bind_supplied, needs_injection, resolve, Args, ParamSpec};
use crate::middleware::{Layer, Middleware, MiddlewareRegistry, Next};
use crate::request::Request;
use crate::response::{Reply, Response};
use crate::router::Route;

/// A fully built pipeline.
pub type Pipeline = Arc<Layer>;

/// What a pipeline terminates in.
#[derive(Clone, Debug)]
pub enum Target {
    Handler(Handler),
    Controller {
        class: Arc<ControllerClass>,
        action: String,
    },
}

/// Memoized resolution of one method and path.
#[derive(Clone)]
pub struct CacheEntry {
    pub callback: Pipeline,
    pub segment: String,
    pub app: String,
    pub controller: String,
    pub action: String,
    pub route: Option<Arc<Route>>,
}

impl CacheEntry {
    /// Populate the request's context fields and run the pipeline.
    pub fn invoke(&self, req: &mut Request) -> Response {
        req.segment.clone_from(&self.segment);
        req.app.clone_from(&self.app);
        req.controller.clone_from(&self.controller);
        req.action.clone_from(&self.action);
        req.route = self.route.clone();
        crate::context::enter(req);
        (self.callback)(req)
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("segment", &self.segment)
            .field("app", &self.app)
            .field("controller", &self.controller)
            .field("action", &self.action)
            .finish()
    }
}

/// Run `layer` and translate any failure or panic into a response.
fn contain<F>(translator: &ExceptionTranslator, req: &mut Request, layer: F) -> Response
where
    F: FnOnce(&mut Request) -> Result<Response, DispatchError>,
{
    let outcome = catch_unwind(AssertUnwindSafe(|| layer(&mut *req)));
    match outcome {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => translator.respond(err, req),
        Err(payload) => translator.respond(DispatchError::from_panic(payload), req),
    }
}

/// How the terminal handler gets its arguments.
enum Binding {
    /// Caller arguments, already coerced.
    Supplied(Map<String, Value>),
    /// Full resolution against request input merged with caller arguments.
    Resolve {
        container: Arc<dyn Container>,
        extra: Map<String, Value>,
        debug: bool,
    },
}

impl Binding {
    fn new(
        params: &[ParamSpec],
        extra: Map<String, Value>,
        container: &Arc<dyn Container>,
        debug: bool,
    ) -> Self {
        let mut supplied = extra.clone();
        if needs_injection(params, &mut supplied) {
            Binding::Resolve {
                container: Arc::clone(container),
                extra,
                debug,
            }
        } else {
            Binding::Supplied(supplied)
        }
    }

    fn args(&self, handler: &Handler, req: &Request) -> Result<Args, DispatchError> {
        match self {
            Binding::Supplied(map) => Ok(bind_supplied(handler.params(), map)),
            Binding::Resolve {
                container,
                extra,
                debug,
            } => {
                let mut inputs = req.all();
                inputs.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
                resolve(container.as_ref(), &inputs, handler.params(), *debug)
            }
        }
    }

    fn is_resolving(&self) -> bool {
        matches!(self, Binding::Resolve { .. })
    }
}

pub struct PipelineBuilder {
    config: Arc<Config>,
    containers: Containers,
    middleware: Arc<MiddlewareRegistry>,
    translator: Arc<ExceptionTranslator>,
}

impl PipelineBuilder {
    pub fn new(
        config: Arc<Config>,
        containers: Containers,
        middleware: Arc<MiddlewareRegistry>,
        translator: Arc<ExceptionTranslator>,
    ) -> Self {
        PipelineBuilder {
            config,
            containers,
            middleware,
            translator,
        }
    }

    pub fn translator(&self) -> &Arc<ExceptionTranslator> {
        &self.translator
    }

    /// Build the pipeline for `target` in `segment`/`app`.
    ///
    /// Fails only while materializing middleware or the controller; those
    /// failures surface at the dispatcher's outer boundary.
    pub fn build(
        &self,
        segment: &str,
        app: &str,
        target: Target,
        extra_args: Map<String, Value>,
        with_global: bool,
        route: Option<&Route>,
    ) -> Result<Pipeline, DispatchError> {
        let container = self.containers.for_segment(segment);
        let controller = match &target {
            Target::Controller { class, .. } => Some(class.as_ref()),
            Target::Handler(_) => None,
        };
        let refs = self
            .middleware
            .collect(segment, app, controller, route, with_global);
        let middleware = refs
            .iter()
            .map(|m| m.resolve(container.as_ref()))
            .collect::<Result<Vec<Arc<dyn Middleware>>, _>>()?;

        let debug = self.config.bool(segment, "app.debug", false);
        let terminal = self.terminal(segment, target, extra_args, &container, debug)?;

        let mut chain = terminal;
        for mw in middleware.into_iter().rev() {
            let inner = chain;
            let translator = Arc::clone(&self.translator);
            chain = Arc::new(move |req: &mut Request| {
                contain(&translator, req, |req| mw.process(req, Next::new(inner.as_ref())))
            });
        }
        Ok(chain)
    }

    fn terminal(
        &self,
        segment: &str,
        target: Target,
        extra_args: Map<String, Value>,
        container: &Arc<dyn Container>,
        debug: bool,
    ) -> Result<Pipeline, DispatchError> {
        let translator = Arc::clone(&self.translator);
        match target {
            Target::Handler(handler) => {
                let binding = Binding::new(handler.params(), extra_args, container, debug);
                debug!(injection = binding.is_resolving(), "Handler pipeline built");
                Ok(Arc::new(move |req: &mut Request| {
                    contain(&translator, req, |req| {
                        let args = binding.args(&handler, req)?;
                        handler.call(req, &args).map(Reply::into_response)
                    })
                }))
            }
            Target::Controller { class, action } => {
                let method = class.action_for(&action).cloned().ok_or_else(|| {
                    DispatchError::container(
                        format!("{}@{}", class.name, action),
                        "action is not declared",
                    )
                })?;
                let binding = Binding::new(method.params(), extra_args, container, debug);
                let reuse = self.config.bool(segment, "app.controller_reuse", true);
                debug!(
                    controller = %class.name,
                    action = %action,
                    reuse,
                    injection = binding.is_resolving(),
                    "Controller pipeline built"
                );

                if reuse {
                    let handler = method.bind(class.instance(container.as_ref(), true)?);
                    return Ok(Arc::new(move |req: &mut Request| {
                        contain(&translator, req, |req| {
                            let args = binding.args(&handler, req)?;
                            handler.call(req, &args).map(Reply::into_response)
                        })
                    }));
                }

                let container = Arc::clone(container);
                Ok(Arc::new(move |req: &mut Request| {
                    contain(&translator, req, |req| {
                        let handler = method.bind(class.instance(container.as_ref(), false)?);
                        let args = binding.args(&handler, req)?;
                        handler.call(req, &args).map(Reply::into_response)
                    })
                }))
            }
        }
    }
}

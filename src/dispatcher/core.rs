use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::cache::ResolutionCache;
use crate::config::Config;
use crate::container::Containers;
use crate::context;
use crate::controller::{app_of_class, segment_of_class, ControllerRegistry};
use crate::convention::ConventionResolver;
use crate::error::DispatchError;
use crate::exception::{ExceptionHandlers, ExceptionTranslator};
use crate::handler::Handler;
use crate::middleware::MiddlewareRegistry;
use crate::path;
use crate::pipeline::{CacheEntry, PipelineBuilder, Target};
use crate::request::Request;
use crate::response::Response;
use crate::router::{Callback, Route, RouteMatcher, RouteTable, RouteVerdict};
use crate::runtime_config::RuntimeConfig;
use crate::static_files::{self, ScriptRunner};
use crate::transport::Connection;

/// App id of pipelines that serve public files.
pub const STATIC_APP: &str = "__static__";

/// Request dispatcher.
///
/// Owns both caches, the route table and the pipeline builder. Shared by
/// reference across coroutines; all interior state is synchronized.
pub struct Dispatcher {
    config: Arc<Config>,
    routes: ArcSwap<RouteTable>,
    registry: Arc<ControllerRegistry>,
    resolver: ConventionResolver,
    pipeline: PipelineBuilder,
    translator: Arc<ExceptionTranslator>,
    cache: ResolutionCache,
    public_path: PathBuf,
    scripts: Option<Arc<dyn ScriptRunner>>,
}

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    config: Config,
    app_root: PathBuf,
    public_path: PathBuf,
    routes: RouteTable,
    registry: Arc<ControllerRegistry>,
    containers: Containers,
    middleware: MiddlewareRegistry,
    exception_handlers: ExceptionHandlers,
    scripts: Option<Arc<dyn ScriptRunner>>,
    runtime: RuntimeConfig,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        DispatcherBuilder {
            config: Config::new(),
            app_root: PathBuf::from("."),
            public_path: PathBuf::from("public"),
            routes: RouteTable::new(),
            registry: Arc::new(ControllerRegistry::new()),
            containers: Containers::default(),
            middleware: MiddlewareRegistry::new(),
            exception_handlers: ExceptionHandlers::new(),
            scripts: None,
            runtime: RuntimeConfig::default(),
        }
    }
}

impl DispatcherBuilder {
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Directory the default application tree lives in.
    #[must_use]
    pub fn app_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.app_root = path.into();
        self
    }

    #[must_use]
    pub fn public_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.public_path = path.into();
        self
    }

    #[must_use]
    pub fn routes(mut self, routes: RouteTable) -> Self {
        self.routes = routes;
        self
    }

    #[must_use]
    pub fn controllers(mut self, registry: Arc<ControllerRegistry>) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn containers(mut self, containers: Containers) -> Self {
        self.containers = containers;
        self
    }

    #[must_use]
    pub fn middleware(mut self, middleware: MiddlewareRegistry) -> Self {
        self.middleware = middleware;
        self
    }

    #[must_use]
    pub fn exception_handlers(mut self, handlers: ExceptionHandlers) -> Self {
        self.exception_handlers = handlers;
        self
    }

    #[must_use]
    pub fn script_runner(mut self, runner: Arc<dyn ScriptRunner>) -> Self {
        self.scripts = Some(runner);
        self
    }

    #[must_use]
    pub fn runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn build(self) -> Dispatcher {
        let config = Arc::new(self.config);
        let translator = Arc::new(ExceptionTranslator::new(
            Arc::clone(&config),
            self.exception_handlers,
        ));
        let pipeline = PipelineBuilder::new(
            Arc::clone(&config),
            self.containers,
            Arc::new(self.middleware),
            Arc::clone(&translator),
        );
        let resolver = ConventionResolver::new(
            Arc::clone(&self.registry),
            Arc::clone(&config),
            self.app_root,
            self.runtime.convention_cache_size,
        );
        info!(
            routes = self.routes.len(),
            controllers = self.registry.len(),
            resolution_cache = self.runtime.resolution_cache_size,
            convention_cache = self.runtime.convention_cache_size,
            "Dispatcher built"
        );
        Dispatcher {
            config,
            routes: ArcSwap::from_pointee(self.routes),
            registry: self.registry,
            resolver,
            pipeline,
            translator,
            cache: ResolutionCache::new(self.runtime.resolution_cache_size),
            public_path: self.public_path,
            scripts: self.scripts,
        }
    }
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Handle one request and hand the response to `conn`.
    ///
    /// The request context is torn down before the transport sees the
    /// response. The connection stays open when the request asked for
    /// keep-alive or the response is chunked.
    pub fn dispatch(&self, conn: &mut dyn Connection, mut req: Request) -> std::io::Result<()> {
        let keep_alive = req.wants_keep_alive();
        let response = self.handle(&mut req);
        context::destroy();
        req.clear_context();
        if keep_alive || response.is_chunked() {
            conn.send(response)
        } else {
            conn.close(response)
        }
    }

    /// Produce the response for `req`. Never fails: anything escaping the
    /// resolution states is rendered by the exception translator.
    pub fn handle(&self, req: &mut Request) -> Response {
        context::reset(req);
        let outcome = catch_unwind(AssertUnwindSafe(|| self.run(&mut *req)));
        match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                warn!(request_id = %req.request_id, error = %err, "Dispatch failed outside the pipeline");
                self.translator.respond(err, req)
            }
            Err(payload) => self.translator.respond(DispatchError::from_panic(payload), req),
        }
    }

    /// Replace the route table. Both caches are dropped since cached
    /// resolutions may point at removed routes.
    pub fn reload_routes(&self, routes: RouteTable) {
        info!(routes = routes.len(), "Reloading routes");
        self.routes.store(Arc::new(routes));
        self.cache.clear();
        self.resolver.clear_cache();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn convention_cache_len(&self) -> usize {
        self.resolver.cache_len()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn run(&self, req: &mut Request) -> Result<Response, DispatchError> {
        let key = format!("{}{}", req.method, req.path);

        if let Some(entry) = self.cache.get(&key) {
            debug!(request_id = %req.request_id, key = %key, state = "cache_hit", "Dispatch");
            return Ok(entry.invoke(req));
        }

        if path::is_unsafe(&req.path) {
            warn!(request_id = %req.request_id, path = %req.path, state = "unsafe_path", "Rejected request path");
            return self.fallback(req, "", 400, Vec::new());
        }

        if let Some(response) = self.serve_file(&key, req)? {
            return Ok(response);
        }

        let mut status = 404;
        let mut allowed = Vec::new();
        let routes = self.routes.load_full();
        match routes.dispatch(&req.method, &req.path) {
            RouteVerdict::Found { route, params } => {
                debug!(request_id = %req.request_id, route = %route.path, state = "route_match", "Dispatch");
                let extra: Map<String, Value> = params
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                let route = Arc::new(route.with_params(params));
                let entry = self.route_entry(req, route, extra)?;
                return Ok(self.remember(key, entry, req));
            }
            RouteVerdict::MethodNotAllowed { allowed: methods } => {
                status = 405;
                allowed = methods.iter().map(|m| m.as_str().to_string()).collect();
            }
            RouteVerdict::NotFound => {}
        }

        if let Some(target) = self.resolver.resolve(&req.path) {
            let vetoed = routes.is_default_route_disabled(&target.segment, &target.app)
                || routes.is_controller_disabled(target.controller())
                || routes.is_action_disabled(target.controller(), &target.action);
            if vetoed {
                debug!(
                    request_id = %req.request_id,
                    controller = %target.controller(),
                    action = %target.action,
                    state = "convention_disabled",
                    "Dispatch"
                );
            } else {
                debug!(request_id = %req.request_id, state = "convention_match", "Dispatch");
                let callback = self.pipeline.build(
                    &target.segment,
                    &target.app,
                    Target::Controller {
                        class: Arc::clone(&target.class),
                        action: target.action.clone(),
                    },
                    Map::new(),
                    true,
                    None,
                )?;
                let entry = CacheEntry {
                    callback,
                    segment: target.segment.clone(),
                    app: target.app.clone(),
                    controller: target.controller().to_string(),
                    action: target.action.clone(),
                    route: None,
                };
                return Ok(self.remember(key, entry, req));
            }
        }

        let segment = self.segment_of_path(&req.path);
        self.fallback(req, &segment, status, allowed)
    }

    /// Insert before invoking so concurrent requests only ever see complete
    /// entries.
    fn remember(&self, key: String, entry: CacheEntry, req: &mut Request) -> Response {
        let entry = Arc::new(entry);
        if self.cache.put(key, Arc::clone(&entry)) {
            debug!(capacity = self.cache.capacity(), "Resolution cache evicted oldest entry");
        }
        entry.invoke(req)
    }

    fn route_entry(
        &self,
        req: &Request,
        route: Arc<Route>,
        extra: Map<String, Value>,
    ) -> Result<CacheEntry, DispatchError> {
        let (segment, app, controller, action, target) = match &route.callback {
            Callback::Handler(handler) => (
                self.segment_of_path(&req.path),
                String::new(),
                String::new(),
                String::new(),
                Target::Handler(handler.clone()),
            ),
            Callback::Controller { class, action } => {
                let found = self
                    .registry
                    .find(class)
                    .ok_or_else(|| DispatchError::container(class.as_str(), "controller class not found"))?;
                let marker = self.config.alternate_root();
                (
                    segment_of_class(&found.name, marker),
                    app_of_class(&found.name),
                    found.name.clone(),
                    found.real_action_name(action),
                    Target::Controller {
                        class: Arc::clone(&found),
                        action: action.clone(),
                    },
                )
            }
        };
        let callback = self
            .pipeline
            .build(&segment, &app, target, extra, true, Some(&route))?;
        Ok(CacheEntry {
            callback,
            segment,
            app,
            controller,
            action,
            route: Some(route),
        })
    }

    /// Static and script files under the resolved public directory.
    fn serve_file(&self, key: &str, req: &mut Request) -> Result<Option<Response>, DispatchError> {
        let Some(decoded) = path::decode(&req.path) else {
            return Ok(None);
        };
        let (segment, public, relative) =
            static_files::locate(&self.config, &self.public_path, &decoded);
        let Some(file) = public.file(&relative) else {
            return Ok(None);
        };

        let script_ext = self.config.str(&segment, "app.script_extension", "php");
        let is_script = file
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(script_ext));
        if is_script {
            if !self.config.bool(&segment, "app.support_script_files", false) {
                return Ok(None);
            }
            let Some(runner) = &self.scripts else {
                warn!(file = %file.display(), "Script file requested but no script runner is configured");
                return Ok(None);
            };
            debug!(request_id = %req.request_id, file = %file.display(), state = "script_file", "Dispatch");
            req.segment = segment;
            let output = runner.run(&file, req)?;
            return Ok(Some(Response::new(200, output)));
        }

        if !self.config.bool(&segment, "static.enable", false) {
            return Ok(None);
        }
        debug!(request_id = %req.request_id, file = %file.display(), state = "static_file", "Dispatch");

        let fallback = match self.routes.load().get_fallback(&segment) {
            Some(h) => {
                let mut extra = Map::new();
                extra.insert("status".to_string(), Value::from(404));
                Some(self.pipeline.build(&segment, "", Target::Handler(h.clone()), extra, false, None)?)
            }
            None => None,
        };
        let handler = Handler::from_fn(move |req: &mut Request| {
            if !file.is_file() {
                debug!(file = %file.display(), "Cached static file is gone");
                return match &fallback {
                    Some(pipeline) => Ok(pipeline(req)),
                    None => Err(DispatchError::not_found()),
                };
            }
            Response::file(&file, req).map_err(|e| DispatchError::Handler(e.into()))
        });
        let callback = self.pipeline.build(
            &segment,
            STATIC_APP,
            Target::Handler(handler),
            Map::new(),
            false,
            None,
        )?;
        let entry = CacheEntry {
            callback,
            segment,
            app: String::new(),
            controller: String::new(),
            action: String::new(),
            route: None,
        };
        Ok(Some(self.remember(key.to_string(), entry, req)))
    }

    /// Registered fallback for `segment`, or a built-in one that fails with
    /// the error matching `status`. Fallbacks are not cached.
    fn fallback(
        &self,
        req: &mut Request,
        segment: &str,
        status: u16,
        allowed: Vec<String>,
    ) -> Result<Response, DispatchError> {
        debug!(request_id = %req.request_id, status, state = "fallback", "Dispatch");
        let handler = match self.routes.load().get_fallback(segment) {
            Some(h) => h.clone(),
            None => Handler::from_fn(move |req: &mut Request| -> Result<Response, DispatchError> {
                Err(match status {
                    400 => DispatchError::UnsafePath {
                        path: req.path.clone(),
                    },
                    405 => DispatchError::MethodNotAllowed {
                        allowed: allowed.clone(),
                    },
                    _ => DispatchError::not_found(),
                })
            }),
        };
        let mut extra = Map::new();
        extra.insert("status".to_string(), Value::from(status));
        let callback = self
            .pipeline
            .build(segment, "", Target::Handler(handler), extra, true, None)?;
        let entry = CacheEntry {
            callback,
            segment: segment.to_string(),
            app: String::new(),
            controller: String::new(),
            action: String::new(),
            route: None,
        };
        Ok(entry.invoke(req))
    }

    /// Segment owning a request path: the alternate-root marker when the
    /// path lives under it, else the default segment.
    fn segment_of_path(&self, path: &str) -> String {
        let first = path.trim_start_matches('/').split('/').next().unwrap_or("");
        match self.config.alternate_root() {
            Some(marker) if marker == first => marker.to_string(),
            _ => String::new(),
        }
    }
}

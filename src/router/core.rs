use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use http::Method;
use once_cell::sync::OnceCell;
use tracing::{debug, info};

use super::radix::{RadixMatch, RadixRouter};
use crate::handler::Handler;
use crate::middleware::MiddlewareRef;

/// What a route invokes.
#[derive(Clone)]
pub enum Callback {
    Handler(Handler),
    /// A controller method, by fully-qualified class name and action.
    Controller { class: String, action: String },
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::Handler(h) => write!(f, "{h:?}"),
            Callback::Controller { class, action } => write!(f, "{class}@{action}"),
        }
    }
}

impl From<Handler> for Callback {
    fn from(h: Handler) -> Self {
        Callback::Handler(h)
    }
}

impl From<(&str, &str)> for Callback {
    fn from((class, action): (&str, &str)) -> Self {
        Callback::Controller {
            class: class.to_string(),
            action: action.to_string(),
        }
    }
}

/// A registered route. The table holds the template; each dispatch works on
/// a clone carrying that request's captured parameters.
#[derive(Clone, Debug)]
pub struct Route {
    pub name: Option<String>,
    pub methods: Vec<Method>,
    pub path: String,
    pub callback: Callback,
    pub middleware: Vec<MiddlewareRef>,
    pub params: HashMap<String, String>,
}

impl Route {
    pub fn new(methods: Vec<Method>, path: &str, callback: Callback) -> Self {
        Route {
            name: None,
            methods,
            path: path.to_string(),
            callback,
            middleware: Vec::new(),
            params: HashMap::new(),
        }
    }

    pub fn name(&mut self, name: &str) -> &mut Self {
        self.name = Some(name.to_string());
        self
    }

    /// Append route-level middleware.
    pub fn middleware(&mut self, middleware: MiddlewareRef) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    /// Per-dispatch copy with `params` merged in.
    #[must_use]
    pub fn with_params(&self, params: HashMap<String, String>) -> Route {
        let mut route = self.clone();
        route.params.extend(params);
        route
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Fill `{name}` / `{name:regex}` placeholders; leftovers become the query.
    pub fn url(&self, params: &[(&str, &str)]) -> String {
        if params.is_empty() {
            return self.path.clone();
        }
        let mut unused: Vec<(&str, &str)> = params.to_vec();
        let mut out = String::with_capacity(self.path.len());
        let mut rest = self.path.as_str();
        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            out.push_str(&rest[..start]);
            let placeholder = &rest[start..=start + len];
            let name = placeholder[1..placeholder.len() - 1]
                .split(':')
                .next()
                .unwrap_or("");
            match unused.iter().position(|(k, _)| *k == name) {
                Some(i) => out.push_str(unused.remove(i).1),
                None => out.push_str(placeholder),
            }
            rest = &rest[start + len + 1..];
        }
        out.push_str(rest);

        if !unused.is_empty() {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(unused)
                .finish();
            out.push('?');
            out.push_str(&query);
        }
        out
    }
}

/// Outcome of matching a method and path against the table.
#[derive(Debug, Clone)]
pub enum RouteVerdict {
    Found {
        route: Arc<Route>,
        params: HashMap<String, String>,
    },
    MethodNotAllowed {
        allowed: Vec<Method>,
    },
    NotFound,
}

/// Explicit-route matcher consumed by the dispatcher.
pub trait RouteMatcher: Send + Sync {
    fn dispatch(&self, method: &Method, path: &str) -> RouteVerdict;
}

/// Registered routes plus the per-segment policies the dispatcher consults
/// when no route matches.
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<Route>,
    compiled: OnceCell<(RadixRouter, Vec<Arc<Route>>)>,
    fallbacks: HashMap<String, Handler>,
    disabled_apps: HashSet<(String, String)>,
    disabled_controllers: HashSet<String>,
    disabled_actions: HashSet<(String, String)>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, methods: &[Method], path: &str, callback: impl Into<Callback>) -> &mut Route {
        self.compiled = OnceCell::new();
        let route = Route::new(methods.to_vec(), path, callback.into());
        info!(path = %path, methods = ?methods, callback = ?route.callback, "Route registered");
        self.routes.push(route);
        let last = self.routes.len() - 1;
        &mut self.routes[last]
    }

    pub fn get(&mut self, path: &str, callback: impl Into<Callback>) -> &mut Route {
        self.add(&[Method::GET], path, callback)
    }

    pub fn post(&mut self, path: &str, callback: impl Into<Callback>) -> &mut Route {
        self.add(&[Method::POST], path, callback)
    }

    pub fn put(&mut self, path: &str, callback: impl Into<Callback>) -> &mut Route {
        self.add(&[Method::PUT], path, callback)
    }

    pub fn delete(&mut self, path: &str, callback: impl Into<Callback>) -> &mut Route {
        self.add(&[Method::DELETE], path, callback)
    }

    pub fn patch(&mut self, path: &str, callback: impl Into<Callback>) -> &mut Route {
        self.add(&[Method::PATCH], path, callback)
    }

    pub fn any(&mut self, path: &str, callback: impl Into<Callback>) -> &mut Route {
        self.add(
            &[
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::PATCH,
                Method::HEAD,
                Method::OPTIONS,
            ],
            path,
            callback,
        )
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Route registered under `name`.
    pub fn named(&self, name: &str) -> Option<&Route> {
        self.routes
            .iter()
            .find(|r| r.name.as_deref() == Some(name))
    }

    /// Reverse routing for a named route.
    pub fn url(&self, name: &str, params: &[(&str, &str)]) -> Option<String> {
        self.named(name).map(|r| r.url(params))
    }

    /// Fallback for the default segment.
    pub fn fallback(&mut self, handler: Handler) -> &mut Self {
        self.fallback_for("", handler)
    }

    pub fn fallback_for(&mut self, segment: &str, handler: Handler) -> &mut Self {
        self.fallbacks.insert(segment.to_string(), handler);
        self
    }

    /// Segment fallback, else the default segment's.
    pub fn get_fallback(&self, segment: &str) -> Option<&Handler> {
        self.fallbacks
            .get(segment)
            .or_else(|| self.fallbacks.get(""))
    }

    /// Disable convention routing for a whole segment (`app = None`) or one
    /// app within it.
    pub fn disable_default_route(&mut self, segment: &str, app: Option<&str>) -> &mut Self {
        self.disabled_apps
            .insert((segment.to_string(), app.unwrap_or("*").to_string()));
        self
    }

    pub fn disable_default_route_for_controller(&mut self, class: &str) -> &mut Self {
        self.disabled_controllers.insert(class.to_lowercase());
        self
    }

    pub fn disable_default_route_for_action(&mut self, class: &str, action: &str) -> &mut Self {
        self.disabled_actions
            .insert((class.to_lowercase(), action.to_lowercase()));
        self
    }

    pub fn is_default_route_disabled(&self, segment: &str, app: &str) -> bool {
        let seg = segment.to_string();
        self.disabled_apps.contains(&(seg.clone(), "*".to_string()))
            || (!app.is_empty() && self.disabled_apps.contains(&(seg, app.to_string())))
    }

    pub fn is_controller_disabled(&self, class: &str) -> bool {
        self.disabled_controllers.contains(&class.to_lowercase())
    }

    pub fn is_action_disabled(&self, class: &str, action: &str) -> bool {
        self.disabled_actions
            .contains(&(class.to_lowercase(), action.to_lowercase()))
    }

    fn compiled(&self) -> &(RadixRouter, Vec<Arc<Route>>) {
        self.compiled.get_or_init(|| {
            let routes: Vec<Arc<Route>> = self.routes.iter().cloned().map(Arc::new).collect();
            debug!(count = routes.len(), "Compiling route tree");
            (RadixRouter::new(&routes), routes)
        })
    }
}

impl RouteMatcher for RouteTable {
    fn dispatch(&self, method: &Method, path: &str) -> RouteVerdict {
        match self.compiled().0.route(method, path) {
            RadixMatch::Found(route, params) => RouteVerdict::Found { route, params },
            RadixMatch::MethodNotAllowed(allowed) => RouteVerdict::MethodNotAllowed { allowed },
            RadixMatch::NotFound => RouteVerdict::NotFound,
        }
    }
}

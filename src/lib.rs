//! # t2engine
//!
//! **t2engine** is the request-dispatch core of a coroutine-powered web
//! framework: it turns one inbound HTTP request into exactly one response,
//! whatever the handler, middleware or resolution step does along the way.
//!
//! ## Overview
//!
//! A request is resolved in a fixed order. A cached resolution wins, then
//! unsafe paths are rejected, then files under a public directory are served
//! or executed, then explicit routes are matched, and finally the path is
//! mapped by convention onto a controller class and action. Every resolution
//! is wrapped in a middleware pipeline, cached by `method ⧺ path`, and
//! invoked with arguments bound from the request.
//!
//! ## Architecture
//!
//! - **[`dispatcher`]** - The resolution state machine and outer failure boundary
//! - **[`router`]** - Explicit route table backed by a radix tree
//! - **[`convention`]** - URL to controller class and action mapping
//! - **[`pipeline`]** - Onion-model middleware composition with per-layer containment
//! - **[`middleware`]** - Middleware contract, registry and stock middleware
//! - **[`inject`]** - Handler argument binding and type coercion
//! - **[`exception`]** - Failure reporting and rendering, selected per segment and app
//! - **[`context`]** - Per-coroutine request context
//! - **[`static_files`]** - Public directory lookup and script execution
//! - **[`config`]** - Layered configuration with per-segment overrides
//!
//! ## Runtime
//!
//! Handlers are plain synchronous closures. Concurrency comes from the `may`
//! coroutine runtime: a dispatcher is shared across coroutines and each
//! request keeps its context in coroutine-local storage.
//!
//! ```rust,ignore
//! use t2engine::{Dispatcher, Handler, Request, RouteTable};
//! use t2engine::transport::RecordingConnection;
//! use http::Method;
//!
//! let mut routes = RouteTable::new();
//! routes.get("/ping", Handler::from_fn(|_req| Ok("pong")));
//! let dispatcher = Dispatcher::builder().routes(routes).build();
//!
//! let mut conn = RecordingConnection::new();
//! dispatcher.dispatch(&mut conn, Request::new(Method::GET, "/ping"))?;
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod container;
pub mod context;
pub mod controller;
pub mod convention;
pub mod dispatcher;
pub mod error;
pub mod exception;
pub mod handler;
pub mod ids;
pub mod inject;
pub mod middleware;
pub mod path;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod router;
pub mod runtime_config;
pub mod static_files;
pub mod telemetry;
pub mod transport;

pub use config::Config;
pub use container::{Container, Containers, ServiceContainer};
pub use controller::{ControllerClass, ControllerRegistry};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{DispatchError, ErrorKind};
pub use handler::Handler;
pub use inject::{Arg, Args, ParamSpec};
pub use middleware::{Middleware, MiddlewareRef, MiddlewareRegistry, Next};
pub use request::Request;
pub use response::{Reply, Response};
pub use router::{Route, RouteTable};

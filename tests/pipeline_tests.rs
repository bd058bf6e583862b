//! Middleware and exception handling as seen through the dispatcher
//!
//! # Test Coverage
//!
//! - Layer order: global, segment, app, controller-declared, route
//! - Middleware resolved by name from the segment container
//! - Static pipelines skip global middleware and honour the static guard
//! - Stock metrics and tracing middleware
//! - Exception handler selection per segment and app
//! - Controller instance reuse

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::app_tree::{blog_tree, touch, PostController};
use common::requests::{get, json_get};
use t2engine::container::{Containers, ServiceContainer};
use t2engine::dispatcher::STATIC_APP;
use t2engine::error::DispatchError;
use t2engine::exception::{ExceptionHandler, ExceptionHandlers};
use t2engine::middleware::{
    Middleware, MiddlewareRef, MiddlewareRegistry, MetricsMiddleware, StaticGuardMiddleware,
    TracingMiddleware,
};
use t2engine::{Config, ControllerClass, ControllerRegistry, Dispatcher, Handler, Request, Response, RouteTable};

fn trail(name: &'static str) -> MiddlewareRef {
    MiddlewareRef::from_fn(move |req, next| {
        let mut resp = next.run(req);
        let seen = resp.header("x-trail").unwrap_or("").to_string();
        resp.set_header("x-trail", format!("{name}{seen}"));
        Ok(resp)
    })
}

#[test]
fn test_layers_run_outermost_first() {
    let (tmp, _) = blog_tree();
    let registry = Arc::new(ControllerRegistry::new());
    registry.declare(
        ControllerClass::new("app\\blog\\controller\\post", || PostController)
            .middleware(trail("c"))
            .action("index", vec![], |_: &PostController, _req, _args| Ok("ok")),
    );

    let mut middleware = MiddlewareRegistry::new();
    middleware.global(trail("g"));
    middleware.segment("", trail("s"));
    middleware.app("", "blog", trail("a"));
    middleware.app("", "other", trail("x"));

    let mut routes = RouteTable::new();
    routes
        .get("/posts", ("app\\blog\\controller\\post", "index"))
        .middleware(trail("r"));

    let dispatcher = Dispatcher::builder()
        .app_root(tmp.path())
        .controllers(registry)
        .middleware(middleware)
        .routes(routes)
        .build();

    let resp = dispatcher.handle(&mut get("/posts"));
    assert_eq!(resp.header("x-trail"), Some("gsacr"));

    let resp = dispatcher.handle(&mut get("/blog/post"));
    assert_eq!(resp.header("x-trail"), Some("gsac"));
}

#[test]
fn test_named_middleware_comes_from_container() {
    struct Stamp;
    impl Middleware for Stamp {
        fn process(&self, req: &mut Request, next: t2engine::Next<'_>) -> Result<Response, DispatchError> {
            Ok(next.run(req).with_header("x-stamp", "yes"))
        }
    }

    let container = ServiceContainer::new();
    container.bind_middleware("stamp", Arc::new(Stamp));
    let mut routes = RouteTable::new();
    routes.get("/a", Handler::from_fn(|_req| Ok("a"))).middleware(MiddlewareRef::named("stamp"));
    routes.get("/b", Handler::from_fn(|_req| Ok("b"))).middleware(MiddlewareRef::named("missing"));

    let tmp = tempfile::tempdir().unwrap();
    let dispatcher = Dispatcher::builder()
        .app_root(tmp.path())
        .containers(Containers::new(Arc::new(container)))
        .routes(routes)
        .build();

    assert_eq!(dispatcher.handle(&mut get("/a")).header("x-stamp"), Some("yes"));

    let resp = dispatcher.handle(&mut get("/b"));
    assert_eq!(resp.status, 500);
    assert!(matches!(
        resp.exception().map(|e| e.as_ref()),
        Some(DispatchError::Container { .. })
    ));
    assert_eq!(dispatcher.cache_len(), 1);
}

#[test]
fn test_static_pipeline_skips_global_middleware() {
    let tmp = tempfile::tempdir().unwrap();
    touch(tmp.path(), "public/app.js");
    touch(tmp.path(), "public/.env");

    let mut middleware = MiddlewareRegistry::new();
    middleware.global(trail("g"));
    middleware.app(
        "",
        STATIC_APP,
        MiddlewareRef::new(StaticGuardMiddleware::new().allow_origin("https://example.test")),
    );

    let dispatcher = Dispatcher::builder()
        .config(Config::new().with("static.enable", true))
        .public_path(tmp.path().join("public"))
        .app_root(tmp.path())
        .middleware(middleware)
        .build();

    let resp = dispatcher.handle(&mut get("/app.js"));
    assert_eq!(resp.status, 200);
    assert_eq!(resp.header("x-trail"), None);
    assert_eq!(resp.header("access-control-allow-origin"), Some("https://example.test"));
    assert_eq!(resp.header("content-type"), Some("application/javascript"));

    assert_eq!(dispatcher.handle(&mut get("/.env")).status, 403);
}

#[test]
fn test_metrics_and_tracing_middleware() {
    let metrics = Arc::new(MetricsMiddleware::new());
    let mut middleware = MiddlewareRegistry::new();
    middleware.global(MiddlewareRef::from(Arc::clone(&metrics)));
    middleware.global(MiddlewareRef::new(TracingMiddleware));

    let mut routes = RouteTable::new();
    routes.get("/ok", Handler::from_fn(|_req| Ok("fine")));
    routes.get("/bad", Handler::from_fn(|_req| -> Result<String, DispatchError> {
        Err(DispatchError::Handler(anyhow::anyhow!("database down")))
    }));

    let tmp = tempfile::tempdir().unwrap();
    let dispatcher = Dispatcher::builder()
        .app_root(tmp.path())
        .middleware(middleware)
        .routes(routes)
        .build();

    for _ in 0..3 {
        assert_eq!(dispatcher.handle(&mut get("/ok")).status, 200);
    }
    assert_eq!(dispatcher.handle(&mut get("/bad")).status, 500);
    assert_eq!(dispatcher.handle(&mut get("/missing")).status, 404);

    assert_eq!(metrics.request_count(), 5);
    assert_eq!(metrics.status_class_count(2), 3);
    assert_eq!(metrics.status_class_count(4), 1);
    assert_eq!(metrics.status_class_count(5), 1);
}

struct PlainHandler(&'static str);

impl ExceptionHandler for PlainHandler {
    fn report(&self, _err: &DispatchError, _req: &Request) {}

    fn render(&self, _req: &Request, err: &DispatchError) -> Response {
        Response::text(err.status().max(500), format!("{}: {}", self.0, err))
    }
}

fn handlers() -> ExceptionHandlers {
    let mut handlers = ExceptionHandlers::new();
    handlers.register("global", |_| Box::new(PlainHandler("global")));
    handlers.register("blog", |_| Box::new(PlainHandler("blog")));
    handlers.register("panicky", |_| -> Box<dyn ExceptionHandler> { panic!("broken handler") });
    handlers
}

#[test]
fn test_exception_handler_selection() {
    let (tmp, _) = blog_tree();
    let registry = Arc::new(ControllerRegistry::new());
    registry.declare(
        ControllerClass::new("app\\blog\\controller\\post", || PostController).action(
            "index",
            vec![],
            |_: &PostController, _req, _args| -> Result<String, DispatchError> {
                Err(DispatchError::Handler(anyhow::anyhow!("no posts")))
            },
        ),
    );
    let mut routes = RouteTable::new();
    routes.get("/fail", Handler::from_fn(|_req| -> Result<String, DispatchError> {
        Err(DispatchError::Handler(anyhow::anyhow!("plain failure")))
    }));

    let config = Config::new()
        .with("exception.@", "global")
        .with("exception.blog", "blog");
    let dispatcher = Dispatcher::builder()
        .config(config)
        .app_root(tmp.path())
        .controllers(registry)
        .exception_handlers(handlers())
        .routes(routes)
        .build();

    let resp = dispatcher.handle(&mut get("/fail"));
    assert_eq!(resp.text_body(), "global: plain failure");

    let resp = dispatcher.handle(&mut get("/blog/post"));
    assert_eq!(resp.text_body(), "blog: no posts");
}

#[test]
fn test_broken_exception_handler_still_answers() {
    let mut routes = RouteTable::new();
    routes.get("/fail", Handler::from_fn(|_req| -> Result<String, DispatchError> {
        Err(DispatchError::business(7, "nope"))
    }));
    let tmp = tempfile::tempdir().unwrap();
    let dispatcher = Dispatcher::builder()
        .config(Config::new().with("exception.@", "panicky"))
        .app_root(tmp.path())
        .exception_handlers(handlers())
        .routes(routes)
        .build();

    let resp = dispatcher.handle(&mut json_get("/fail"));
    assert_eq!(resp.status, 500);
    assert_eq!(resp.text_body(), "nope");
}

#[test]
fn test_controller_reuse_can_be_disabled() {
    static BUILT: AtomicUsize = AtomicUsize::new(0);
    struct Counted;

    let build = |reuse: bool| {
        BUILT.store(0, Ordering::SeqCst);
        let registry = Arc::new(ControllerRegistry::new());
        registry.declare(
            ControllerClass::new("app\\controller\\counter", || {
                BUILT.fetch_add(1, Ordering::SeqCst);
                Counted
            })
            .action("index", vec![], |_: &Counted, _req, _args| Ok("counted")),
        );
        let tmp = tempfile::tempdir().unwrap();
        let dispatcher = Dispatcher::builder()
            .config(Config::new().with("app.controller_reuse", reuse))
            .app_root(tmp.path())
            .controllers(registry)
            .build();
        for _ in 0..3 {
            assert_eq!(dispatcher.handle(&mut get("/counter")).text_body(), "counted");
        }
        BUILT.load(Ordering::SeqCst)
    };

    assert_eq!(build(true), 1);
    assert_eq!(build(false), 3);
}

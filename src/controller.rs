//! Controller classes and the registry the convention resolver probes.
//!
//! A class is a named set of actions sharing one instance type. Classes
//! become visible to lookups either immediately ([`ControllerRegistry::declare`])
//! or once the file that defines them is loaded
//! ([`ControllerRegistry::autoload`] + [`ControllerRegistry::load_file`]),
//! which is what filesystem probing triggers.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use once_cell::sync::OnceCell;
use tracing::{debug, info};

use crate::container::{Container, Instance};
use crate::error::DispatchError;
use crate::handler::{Handler, HandlerFn};
use crate::inject::{Args, ParamSpec};
use crate::middleware::MiddlewareRef;
use crate::request::Request;
use crate::response::Reply;

type ActionFn =
    dyn Fn(&Instance, &mut Request, &Args) -> Result<Reply, DispatchError> + Send + Sync;
type Constructor = dyn Fn() -> Instance + Send + Sync;

/// One callable method of a controller class.
#[derive(Clone)]
pub struct Action {
    pub name: String,
    params: Arc<[ParamSpec]>,
    func: Arc<ActionFn>,
}

impl Action {
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Bind this action to a controller instance.
    pub fn bind(&self, instance: Instance) -> Handler {
        let func = Arc::clone(&self.func);
        let bound: Arc<HandlerFn> =
            Arc::new(move |req: &mut Request, args: &Args| func(&instance, req, args));
        Handler::from_parts(Arc::clone(&self.params), bound)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action").field("name", &self.name).finish()
    }
}

pub struct ControllerClass {
    pub name: String,
    actions: Vec<Action>,
    private_methods: Vec<String>,
    catch_all: Option<Action>,
    middleware: Vec<MiddlewareRef>,
    construct: Arc<Constructor>,
    shared: OnceCell<Instance>,
}

impl fmt::Debug for ControllerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerClass")
            .field("name", &self.name)
            .field("actions", &self.actions)
            .field("catch_all", &self.catch_all.is_some())
            .finish()
    }
}

fn wrap<T, F, R>(func: F) -> Arc<ActionFn>
where
    T: Any + Send + Sync,
    F: Fn(&T, &mut Request, &Args) -> Result<R, DispatchError> + Send + Sync + 'static,
    R: Into<Reply>,
{
    Arc::new(move |instance: &Instance, req: &mut Request, args: &Args| {
        let this = instance.downcast_ref::<T>().ok_or_else(|| {
            DispatchError::container(std::any::type_name::<T>(), "controller instance has another type")
        })?;
        func(this, req, args).map(Into::into)
    })
}

impl ControllerClass {
    /// Declare a class whose instances are built by `construct`.
    pub fn new<T, C>(name: &str, construct: C) -> Self
    where
        T: Any + Send + Sync,
        C: Fn() -> T + Send + Sync + 'static,
    {
        ControllerClass {
            name: name.to_string(),
            actions: Vec::new(),
            private_methods: Vec::new(),
            catch_all: None,
            middleware: Vec::new(),
            construct: Arc::new(move || Arc::new(construct()) as Instance),
            shared: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn action<T, F, R>(mut self, name: &str, params: Vec<ParamSpec>, func: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T, &mut Request, &Args) -> Result<R, DispatchError> + Send + Sync + 'static,
        R: Into<Reply>,
    {
        self.actions.push(Action {
            name: name.to_string(),
            params: params.into(),
            func: wrap(func),
        });
        self
    }

    /// A method that exists but must never be reachable as an action.
    #[must_use]
    pub fn private_method(mut self, name: &str) -> Self {
        self.private_methods.push(name.to_string());
        self
    }

    /// Dynamic dispatch for names without a declared action. The requested
    /// name is available as `request.action`.
    #[must_use]
    pub fn catch_all<T, F, R>(mut self, params: Vec<ParamSpec>, func: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T, &mut Request, &Args) -> Result<R, DispatchError> + Send + Sync + 'static,
        R: Into<Reply>,
    {
        self.catch_all = Some(Action {
            name: "__call".to_string(),
            params: params.into(),
            func: wrap(func),
        });
        self
    }

    #[must_use]
    pub fn middleware(mut self, middleware: MiddlewareRef) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn declared_middleware(&self) -> &[MiddlewareRef] {
        &self.middleware
    }

    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }

    /// Case-insensitive lookup of a declared action.
    pub fn find_action(&self, name: &str) -> Option<&Action> {
        self.actions
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }

    /// The action that serves `name`: declared first, then the catch-all.
    pub fn action_for(&self, name: &str) -> Option<&Action> {
        self.find_action(name).or(self.catch_all.as_ref())
    }

    /// Declared spelling of `name`, or its lowercase form when undeclared.
    pub fn real_action_name(&self, name: &str) -> String {
        self.find_action(name)
            .map(|a| a.name.clone())
            .unwrap_or_else(|| name.to_lowercase())
    }

    /// Action name a request for `requested` may dispatch to, if any.
    ///
    /// Double-underscore names are never dispatchable. A private method of
    /// the same name blocks the catch-all.
    pub fn resolve_action(&self, requested: &str) -> Option<String> {
        if requested.starts_with("__") {
            return None;
        }
        if let Some(action) = self.find_action(requested) {
            return Some(action.name.clone());
        }
        if self
            .private_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(requested))
        {
            return None;
        }
        self.catch_all.as_ref().map(|_| requested.to_string())
    }

    /// Controller instance: shared when `reuse`, fresh otherwise.
    ///
    /// A container binding under the class name takes precedence over the
    /// class's own constructor.
    pub fn instance(&self, container: &dyn Container, reuse: bool) -> Result<Instance, DispatchError> {
        if container.has(&self.name) {
            return if reuse {
                container.get(&self.name)
            } else {
                container.make(&self.name, &Args::new())
            };
        }
        if reuse {
            Ok(Arc::clone(self.shared.get_or_init(|| (self.construct)())))
        } else {
            Ok((self.construct)())
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Known controller classes, loaded or waiting on their defining file.
#[derive(Default)]
pub struct ControllerRegistry {
    /// Lowercased class name to class.
    loaded: RwLock<HashMap<String, Arc<ControllerClass>>>,
    /// Defining file to the classes it declares.
    pending: RwLock<HashMap<PathBuf, Vec<Arc<ControllerClass>>>>,
    loaded_files: RwLock<HashSet<PathBuf>>,
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `class` visible immediately.
    pub fn declare(&self, class: ControllerClass) -> Arc<ControllerClass> {
        let class = Arc::new(class);
        write(&self.loaded).insert(class.name.to_lowercase(), Arc::clone(&class));
        info!(class = %class.name, "Controller declared");
        class
    }

    /// Make `class` visible once `file` is loaded.
    pub fn autoload(&self, file: impl AsRef<Path>, class: ControllerClass) {
        let file = canonical(file.as_ref());
        debug!(class = %class.name, file = %file.display(), "Controller registered for autoload");
        write(&self.pending)
            .entry(file)
            .or_default()
            .push(Arc::new(class));
    }

    /// Load a defining file. Returns `true` when it declared any class.
    pub fn load_file(&self, file: impl AsRef<Path>) -> bool {
        let file = canonical(file.as_ref());
        let classes = write(&self.pending).remove(&file);
        write(&self.loaded_files).insert(file.clone());
        let Some(classes) = classes else {
            return false;
        };
        let mut loaded = write(&self.loaded);
        for class in classes {
            info!(class = %class.name, file = %file.display(), "Controller loaded");
            loaded.insert(class.name.to_lowercase(), class);
        }
        true
    }

    pub fn is_file_loaded(&self, file: impl AsRef<Path>) -> bool {
        read(&self.loaded_files).contains(&canonical(file.as_ref()))
    }

    /// Loaded classes only, case-insensitive.
    pub fn find_loaded(&self, name: &str) -> Option<Arc<ControllerClass>> {
        read(&self.loaded)
            .get(&name.trim_start_matches('\\').to_lowercase())
            .map(Arc::clone)
    }

    /// Loaded lookup, then an exact-name autoload of the class's file.
    pub fn find(&self, name: &str) -> Option<Arc<ControllerClass>> {
        if let Some(found) = self.find_loaded(name) {
            return Some(found);
        }
        let name = name.trim_start_matches('\\');
        let file = read(&self.pending).iter().find_map(|(file, classes)| {
            classes
                .iter()
                .any(|c| c.name == name)
                .then(|| file.clone())
        })?;
        self.load_file(&file);
        self.find_loaded(name)
    }

    pub fn len(&self) -> usize {
        read(&self.loaded).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Segment a class belongs to: the alternate-root marker when the class
/// lives under it, otherwise the default segment.
pub fn segment_of_class(class: &str, marker: Option<&str>) -> String {
    let first = class.trim_matches('\\').split('\\').next().unwrap_or("");
    match marker {
        Some(m) if !m.is_empty() && first == m => m.to_string(),
        _ => String::new(),
    }
}

/// App a class belongs to: the namespace segment before `controller`, or
/// empty when the class sits directly under the root's `controller`.
pub fn app_of_class(class: &str) -> String {
    let mut parts = class.trim_matches('\\').split('\\');
    let _root = parts.next();
    match parts.next() {
        Some(second) if !second.eq_ignore_ascii_case("controller") => second.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ServiceContainer;
    use http::Method;

    struct Post {
        title: &'static str,
    }

    fn post_class() -> ControllerClass {
        ControllerClass::new("app\\blog\\controller\\Post", || Post { title: "hello" })
            .action("show", vec![ParamSpec::request()], |p: &Post, _req, _args| {
                Ok::<_, DispatchError>(p.title)
            })
            .private_method("secret")
            .action("__construct", vec![], |_: &Post, _req, _args| Ok::<_, DispatchError>(""))
    }

    #[test]
    fn test_action_resolution_rules() {
        let class = post_class();
        assert_eq!(class.resolve_action("SHOW").as_deref(), Some("show"));
        assert_eq!(class.resolve_action("missing"), None);
        assert_eq!(class.resolve_action("__construct"), None);

        let dynamic = post_class().catch_all(vec![], |_: &Post, req, _args| {
            Ok::<_, DispatchError>(req.action.clone())
        });
        assert_eq!(dynamic.resolve_action("anything").as_deref(), Some("anything"));
        assert_eq!(dynamic.resolve_action("secret"), None);
        assert_eq!(dynamic.resolve_action("__get"), None);
    }

    #[test]
    fn test_bound_action_runs_against_instance() {
        let class = post_class();
        let container = ServiceContainer::new();
        let instance = class.instance(&container, true).unwrap();
        let handler = class.find_action("show").unwrap().bind(instance);
        let mut req = Request::new(Method::GET, "/blog/post/show");
        let reply = handler.call(&mut req, &Args::new()).unwrap();
        assert_eq!(reply.into_response().text_body(), "hello");
    }

    #[test]
    fn test_reuse_shares_instance() {
        let class = post_class();
        let c = ServiceContainer::new();
        let a = class.instance(&c, true).unwrap();
        let b = class.instance(&c, true).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let fresh = class.instance(&c, false).unwrap();
        assert!(!Arc::ptr_eq(&a, &fresh));
    }

    #[test]
    fn test_registry_lookup_is_case_insensitive() {
        let registry = ControllerRegistry::new();
        registry.declare(post_class());
        let found = registry.find("APP\\Blog\\Controller\\post").unwrap();
        assert_eq!(found.name, "app\\blog\\controller\\Post");
    }

    #[test]
    fn test_autoload_waits_for_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("post.rs");
        std::fs::write(&file, "").unwrap();

        let registry = ControllerRegistry::new();
        registry.autoload(&file, post_class());
        assert!(registry.find_loaded("app\\blog\\controller\\post").is_none());
        assert!(registry.load_file(&file));
        assert!(registry.is_file_loaded(&file));
        assert!(registry.find_loaded("app\\blog\\controller\\post").is_some());
    }

    #[test]
    fn test_exact_name_autoload() {
        let registry = ControllerRegistry::new();
        registry.autoload("/nonexistent/post.rs", post_class());
        assert!(registry.find("app\\blog\\controller\\Post").is_some());
    }

    #[test]
    fn test_class_namespace_helpers() {
        assert_eq!(app_of_class("app\\blog\\controller\\Post"), "blog");
        assert_eq!(app_of_class("app\\controller\\Index"), "");
        assert_eq!(segment_of_class("web\\controller\\Index", Some("web")), "web");
        assert_eq!(segment_of_class("app\\controller\\Index", Some("web")), "");
    }
}

//! Service container consumed by the pipeline builder and the dependency
//! resolver.
//!
//! `get` hands out shared singletons; `make` always builds a fresh instance
//! from the registered factory, passing constructor arguments through.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::error::DispatchError;
use crate::inject::Args;
use crate::middleware::Middleware;

pub type Instance = Arc<dyn Any + Send + Sync>;

/// Builds an instance from constructor arguments.
pub type Factory = Arc<dyn Fn(&dyn Container, &Args) -> Result<Instance, DispatchError> + Send + Sync>;

pub trait Container: Send + Sync {
    /// Shared instance for `id`, built once on first use.
    fn get(&self, id: &str) -> Result<Instance, DispatchError>;

    /// Fresh instance for `id`.
    fn make(&self, id: &str, args: &Args) -> Result<Instance, DispatchError>;

    fn has(&self, id: &str) -> bool;
}

/// Downcast an [`Instance`] to a concrete type.
pub fn downcast<T: Any + Send + Sync>(instance: Instance, id: &str) -> Result<Arc<T>, DispatchError> {
    instance
        .downcast::<T>()
        .map_err(|_| DispatchError::container(id, format!("not a {}", std::any::type_name::<T>())))
}

/// Default container: a factory table plus a lazily populated singleton map.
#[derive(Default)]
pub struct ServiceContainer {
    factories: DashMap<String, Factory>,
    singletons: DashMap<String, Instance>,
}

impl ServiceContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for `id`.
    pub fn bind<F, T>(&self, id: &str, factory: F) -> &Self
    where
        F: Fn(&dyn Container, &Args) -> Result<T, DispatchError> + Send + Sync + 'static,
        T: Any + Send + Sync,
    {
        let factory: Factory = Arc::new(move |c: &dyn Container, args: &Args| {
            factory(c, args).map(|v| Arc::new(v) as Instance)
        });
        self.factories.insert(id.to_string(), factory);
        info!(id = %id, "Container binding registered");
        self
    }

    /// Register a ready-made shared instance for `id`.
    pub fn instance<T: Any + Send + Sync>(&self, id: &str, value: T) -> &Self {
        self.singletons.insert(id.to_string(), Arc::new(value));
        self
    }

    /// Register a middleware instance resolvable by name.
    pub fn bind_middleware(&self, id: &str, middleware: Arc<dyn Middleware>) -> &Self {
        self.singletons.insert(id.to_string(), Arc::new(middleware));
        self
    }

    fn factory(&self, id: &str) -> Option<Factory> {
        self.factories.get(id).map(|f| Arc::clone(f.value()))
    }
}

impl Container for ServiceContainer {
    fn get(&self, id: &str) -> Result<Instance, DispatchError> {
        if let Some(existing) = self.singletons.get(id) {
            return Ok(Arc::clone(existing.value()));
        }
        // The factory may resolve other ids, so no map guard is held while it runs.
        let factory = self
            .factory(id)
            .ok_or_else(|| DispatchError::container(id, "no binding registered"))?;
        let built = factory(self, &Args::new())?;
        let shared = {
            let entry = self.singletons.entry(id.to_string()).or_insert(built);
            Arc::clone(entry.value())
        };
        debug!(id = %id, "Container singleton created");
        Ok(shared)
    }

    fn make(&self, id: &str, args: &Args) -> Result<Instance, DispatchError> {
        let factory = self
            .factory(id)
            .ok_or_else(|| DispatchError::container(id, "no binding registered"))?;
        factory(self, args)
    }

    fn has(&self, id: &str) -> bool {
        self.singletons.contains_key(id) || self.factories.contains_key(id)
    }
}

/// Per-segment containers; unknown segments use the default one.
#[derive(Clone)]
pub struct Containers {
    default: Arc<dyn Container>,
    segments: HashMap<String, Arc<dyn Container>>,
}

impl Default for Containers {
    fn default() -> Self {
        Containers::new(Arc::new(ServiceContainer::new()))
    }
}

impl Containers {
    pub fn new(default: Arc<dyn Container>) -> Self {
        Containers {
            default,
            segments: HashMap::new(),
        }
    }

    pub fn with_segment(mut self, segment: &str, container: Arc<dyn Container>) -> Self {
        self.segments.insert(segment.to_string(), container);
        self
    }

    pub fn for_segment(&self, segment: &str) -> Arc<dyn Container> {
        self.segments
            .get(segment)
            .map(Arc::clone)
            .unwrap_or_else(|| Arc::clone(&self.default))
    }
}

use std::collections::HashMap;

use tracing::debug;

use super::MiddlewareRef;
use crate::controller::ControllerClass;
use crate::router::Route;

/// Scope key for middleware that applies everywhere.
pub const GLOBAL: &str = "@";

/// Middleware registered by scope: global, per segment, per app.
#[derive(Default, Clone, Debug)]
pub struct MiddlewareRegistry {
    scoped: HashMap<(String, String), Vec<MiddlewareRef>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global(&mut self, middleware: MiddlewareRef) -> &mut Self {
        self.push(GLOBAL, "", middleware)
    }

    pub fn segment(&mut self, segment: &str, middleware: MiddlewareRef) -> &mut Self {
        self.push(segment, "", middleware)
    }

    pub fn app(&mut self, segment: &str, app: &str, middleware: MiddlewareRef) -> &mut Self {
        self.push(segment, app, middleware)
    }

    fn push(&mut self, segment: &str, app: &str, middleware: MiddlewareRef) -> &mut Self {
        self.scoped
            .entry((segment.to_string(), app.to_string()))
            .or_default()
            .push(middleware);
        self
    }

    fn scope(&self, segment: &str, app: &str) -> &[MiddlewareRef] {
        self.scoped
            .get(&(segment.to_string(), app.to_string()))
            .map_or(&[], Vec::as_slice)
    }

    /// Outermost first: global, segment, app, controller-declared, route.
    pub fn collect(
        &self,
        segment: &str,
        app: &str,
        controller: Option<&ControllerClass>,
        route: Option<&Route>,
        with_global: bool,
    ) -> Vec<MiddlewareRef> {
        let mut out = Vec::new();
        if with_global {
            out.extend_from_slice(self.scope(GLOBAL, ""));
        }
        out.extend_from_slice(self.scope(segment, ""));
        if !app.is_empty() {
            out.extend_from_slice(self.scope(segment, app));
        }
        if let Some(class) = controller {
            out.extend_from_slice(class.declared_middleware());
        }
        if let Some(route) = route {
            out.extend_from_slice(&route.middleware);
        }
        debug!(segment = %segment, app = %app, count = out.len(), "Middleware collected");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[MiddlewareRef]) -> Vec<String> {
        list.iter()
            .map(|m| match m {
                MiddlewareRef::Named(n) => n.clone(),
                _ => "?".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_collect_order() {
        let mut reg = MiddlewareRegistry::new();
        reg.app("", "blog", MiddlewareRef::named("app"))
            .segment("", MiddlewareRef::named("segment"))
            .global(MiddlewareRef::named("global"))
            .segment("web", MiddlewareRef::named("other"));

        let got = reg.collect("", "blog", None, None, true);
        assert_eq!(names(&got), vec!["global", "segment", "app"]);

        let got = reg.collect("", "blog", None, None, false);
        assert_eq!(names(&got), vec!["segment", "app"]);
    }

    #[test]
    fn test_controller_and_route_come_last() {
        let reg = MiddlewareRegistry::new();
        let class = ControllerClass::new("app\\controller\\Index", || ())
            .middleware(MiddlewareRef::named("controller"));
        let mut route = Route::new(
            vec![http::Method::GET],
            "/",
            crate::router::Callback::from(("app\\controller\\Index", "index")),
        );
        route.middleware(MiddlewareRef::named("route"));
        let got = reg.collect("", "", Some(&class), Some(&route), true);
        assert_eq!(names(&got), vec!["controller", "route"]);
    }
}

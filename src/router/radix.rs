//! Radix tree for explicit route matching
//!
//! Paths are split on `/` and each segment becomes a node. Static segments
//! match exactly; `{name}` segments match any single segment and
//! `{name:regex}` segments match when the regex accepts the whole segment.
//! Terminal nodes hold one route per HTTP method.
//!
//! Lookup is O(k) in the number of path segments. Static children are tried
//! before parameter children, and a failed branch backtracks its captured
//! parameter.

use http::Method;
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use super::core::Route;

#[derive(Clone)]
struct ParamMatcher {
    name: Cow<'static, str>,
    /// Source text of the constraint, used to merge identical parameters.
    pattern: Option<String>,
    regex: Option<Regex>,
    /// Set when the constraint failed to compile; such a node never matches.
    broken: bool,
}

impl ParamMatcher {
    fn parse(segment: &str) -> Self {
        let inner = segment.trim_start_matches('{').trim_end_matches('}');
        match inner.split_once(':') {
            None => ParamMatcher {
                name: Cow::Owned(inner.to_string()),
                pattern: None,
                regex: None,
                broken: false,
            },
            Some((name, pattern)) => {
                let compiled = Regex::new(&format!("^(?:{pattern})$"));
                if let Err(e) = &compiled {
                    warn!(param = %name, pattern = %pattern, error = %e, "Invalid route parameter pattern");
                }
                ParamMatcher {
                    name: Cow::Owned(name.to_string()),
                    pattern: Some(pattern.to_string()),
                    broken: compiled.is_err(),
                    regex: compiled.ok(),
                }
            }
        }
    }

    fn same_as(&self, other: &ParamMatcher) -> bool {
        self.name == other.name && self.pattern == other.pattern
    }

    fn accepts(&self, segment: &str) -> bool {
        if self.broken {
            return false;
        }
        self.regex.as_ref().map_or(true, |r| r.is_match(segment))
    }
}

#[derive(Clone)]
struct RadixNode {
    segment: Cow<'static, str>,
    routes: HashMap<Method, Arc<Route>>,
    param: Option<ParamMatcher>,
    children: Vec<RadixNode>,
    param_children: Vec<RadixNode>,
}

impl RadixNode {
    fn new(segment: Cow<'static, str>) -> Self {
        Self {
            segment,
            routes: HashMap::new(),
            param: None,
            children: Vec::new(),
            param_children: Vec::new(),
        }
    }

    fn new_param(param: ParamMatcher) -> Self {
        Self {
            segment: Cow::Borrowed(""),
            routes: HashMap::new(),
            param: Some(param),
            children: Vec::new(),
            param_children: Vec::new(),
        }
    }

    fn insert(&mut self, segments: &[&str], method: Method, route: Arc<Route>) {
        let Some((&segment, remaining)) = segments.split_first() else {
            self.routes.insert(method, route);
            return;
        };

        if segment.starts_with('{') && segment.ends_with('}') {
            let param = ParamMatcher::parse(segment);
            for child in &mut self.param_children {
                if child.param.as_ref().is_some_and(|p| p.same_as(&param)) {
                    child.insert(remaining, method, route);
                    return;
                }
            }
            let mut child = RadixNode::new_param(param);
            child.insert(remaining, method, route);
            self.param_children.push(child);
            return;
        }

        for child in &mut self.children {
            if child.segment == segment {
                child.insert(remaining, method, route);
                return;
            }
        }
        let mut child = RadixNode::new(Cow::Owned(segment.to_string()));
        child.insert(remaining, method, route);
        self.children.push(child);
    }

    /// Walk to a terminal node accepted by `accept`, capturing parameters.
    fn search<'a, F>(
        &'a self,
        segments: &[&str],
        params: &mut HashMap<String, String>,
        accept: &F,
    ) -> Option<&'a RadixNode>
    where
        F: Fn(&RadixNode) -> bool,
    {
        let Some((&segment, remaining)) = segments.split_first() else {
            return accept(self).then_some(self);
        };

        for child in &self.children {
            if child.segment == segment {
                if let Some(found) = child.search(remaining, params, accept) {
                    return Some(found);
                }
            }
        }

        for child in &self.param_children {
            let Some(param) = &child.param else {
                continue;
            };
            if !param.accepts(segment) {
                continue;
            }
            params.insert(param.name.to_string(), segment.to_string());
            if let Some(found) = child.search(remaining, params, accept) {
                return Some(found);
            }
            params.remove(param.name.as_ref());
        }
        None
    }
}

pub(crate) enum RadixMatch {
    Found(Arc<Route>, HashMap<String, String>),
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

#[derive(Clone)]
pub(crate) struct RadixRouter {
    root: RadixNode,
}

fn split(path: &str) -> Vec<&str> {
    path.trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect()
}

impl RadixRouter {
    pub(crate) fn new(routes: &[Arc<Route>]) -> Self {
        let mut root = RadixNode::new(Cow::Borrowed(""));
        for route in routes {
            let segments = split(&route.path);
            for method in &route.methods {
                root.insert(&segments, method.clone(), Arc::clone(route));
            }
        }
        Self { root }
    }

    pub(crate) fn route(&self, method: &Method, path: &str) -> RadixMatch {
        let segments = split(path);

        let mut params = HashMap::new();
        let by_method = |n: &RadixNode| n.routes.contains_key(method);
        if let Some(node) = self.root.search(&segments, &mut params, &by_method) {
            if let Some(route) = node.routes.get(method) {
                return RadixMatch::Found(Arc::clone(route), params);
            }
        }

        // HEAD falls back to GET.
        if *method == Method::HEAD {
            let mut params = HashMap::new();
            let by_get = |n: &RadixNode| n.routes.contains_key(&Method::GET);
            if let Some(node) = self.root.search(&segments, &mut params, &by_get) {
                if let Some(route) = node.routes.get(&Method::GET) {
                    return RadixMatch::Found(Arc::clone(route), params);
                }
            }
        }

        let mut scratch = HashMap::new();
        let any = |n: &RadixNode| !n.routes.is_empty();
        match self.root.search(&segments, &mut scratch, &any) {
            Some(node) => {
                let mut allowed: Vec<Method> = node.routes.keys().cloned().collect();
                allowed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
                RadixMatch::MethodNotAllowed(allowed)
            }
            None => RadixMatch::NotFound,
        }
    }
}

//! # Convention Resolver
//!
//! Maps a URL path to a controller class and action when no explicit route
//! matches. Resolution is split in two:
//!
//! - a pure planning step ([`plan`], [`candidates`]) that turns the path and
//!   configuration into an ordered list of fully-qualified class names, and
//! - a probing step ([`ConventionResolver::resolve`]) that checks each
//!   candidate against the [`ControllerRegistry`], walking the application
//!   tree on disk to load the defining file when the class is not known yet.
//!
//! ## Candidate order
//!
//! For root namespace `app` and segments `[blog, post]`:
//!
//! ```text
//! app\controller\blog\post
//! app\blog\controller\post
//! app\blog\post\controller        (dropped: ends in controller)
//! app\controller\blog\post\index
//! app\blog\controller\post\index
//! app\blog\post\controller\index
//! ```
//!
//! The configured class suffix is appended to every surviving candidate.
//! When the whole path fails as a class, the last segment is retried as the
//! action name, provided at least two segments remain.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::ConventionCache;
use crate::config::Config;
use crate::controller::{app_of_class, segment_of_class, ControllerClass, ControllerRegistry};

/// Namespace root of the default application tree.
pub const DEFAULT_ROOT: &str = "app";

/// Paths longer than this are resolved but never cached.
pub const MAX_CACHED_PATH: usize = 256;

/// Planning inputs derived from a path and the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConventionPlan {
    pub normalized: String,
    pub segment: String,
    pub root_ns: String,
    pub segments: Vec<String>,
    pub suffix: String,
}

/// A resolved convention match.
#[derive(Debug, Clone)]
pub struct ConventionTarget {
    pub segment: String,
    pub app: String,
    pub class: Arc<ControllerClass>,
    pub action: String,
}

impl ConventionTarget {
    pub fn controller(&self) -> &str {
        &self.class.name
    }
}

/// Drop hyphens and collapse runs of slashes.
pub fn normalize(path: &str) -> String {
    let stripped = path.replace('-', "");
    let mut out = String::with_capacity(stripped.len());
    for c in stripped.chars() {
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    out
}

pub fn plan(path: &str, config: &Config) -> ConventionPlan {
    let normalized = normalize(path);
    let parts: Vec<String> = normalized
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let (segment, root_ns, segments) = match config.alternate_root() {
        Some(marker) if parts.len() >= 2 && parts[0] == marker => {
            (marker.to_string(), marker.to_string(), parts[1..].to_vec())
        }
        _ => (String::new(), DEFAULT_ROOT.to_string(), parts),
    };
    let suffix = config.str(&segment, "app.controller_suffix", "").to_string();

    ConventionPlan {
        normalized,
        segment,
        root_ns,
        segments,
        suffix,
    }
}

/// Ordered candidate class names for `segments` under `root_ns`.
pub fn candidates(root_ns: &str, segments: &[String], suffix: &str) -> Vec<String> {
    let join = |parts: &[&str]| {
        parts
            .iter()
            .filter(|p| !p.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("\\")
    };
    let segs: Vec<&str> = segments.iter().map(String::as_str).collect();

    let mut map = Vec::with_capacity(2 * (segs.len() + 1));
    let mut direct = vec![root_ns, "controller"];
    direct.extend(&segs);
    map.push(join(&direct));

    for i in 0..segs.len() {
        let mut parts = vec![root_ns];
        parts.extend(&segs[..=i]);
        parts.push("controller");
        parts.extend(&segs[i + 1..]);
        map.push(join(&parts));
    }

    let with_index: Vec<String> = map.iter().map(|c| format!("{c}\\index")).collect();
    map.extend(with_index);

    map.into_iter()
        .filter(|c| !c.ends_with("\\controller"))
        .map(|c| c + suffix)
        .collect()
}

/// Walk `base` case-insensitively for the file that should define `class`.
///
/// The first namespace segment is the tree root and is skipped; middle
/// segments are directories and the last is `<name>.<extension>`.
pub fn probe_file(base: &Path, class: &str, extension: &str) -> Option<PathBuf> {
    let lowered = class.trim_start_matches('\\').to_lowercase();
    let mut parts: Vec<&str> = lowered.split('\\').skip(1).collect();
    let file_name = format!("{}.{}", parts.pop()?, extension.to_lowercase());

    let mut dir = base.to_path_buf();
    for section in parts {
        dir = find_entry(&dir, section, true)?;
    }
    find_entry(&dir, &file_name, false)
}

fn find_entry(dir: &Path, lowered_name: &str, want_dir: bool) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    entries.flatten().map(|e| e.path()).find(|p| {
        let matches_kind = if want_dir { p.is_dir() } else { p.is_file() };
        matches_kind
            && p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.to_lowercase() == lowered_name)
    })
}

pub struct ConventionResolver {
    registry: Arc<ControllerRegistry>,
    config: Arc<Config>,
    app_root: PathBuf,
    cache: ConventionCache,
}

impl ConventionResolver {
    pub fn new(
        registry: Arc<ControllerRegistry>,
        config: Arc<Config>,
        app_root: impl Into<PathBuf>,
        cache_size: usize,
    ) -> Self {
        ConventionResolver {
            registry,
            config,
            app_root: app_root.into(),
            cache: ConventionCache::new(cache_size),
        }
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Resolve `path` to a controller class and action.
    pub fn resolve(&self, path: &str) -> Option<Arc<ConventionTarget>> {
        let plan = plan(path, &self.config);
        if let Some(hit) = self.cache.get(&plan.normalized) {
            return Some(hit);
        }

        let target = match self.guess(&plan, &plan.segments, "index") {
            Some(t) => t,
            None => {
                if plan.segments.len() <= 1 {
                    return None;
                }
                let (action, rest) = plan.segments.split_last()?;
                self.guess(&plan, rest, action)?
            }
        };
        let target = Arc::new(target);
        info!(
            path = %path,
            controller = %target.controller(),
            action = %target.action,
            app = %target.app,
            segment = %target.segment,
            "Convention resolved"
        );
        if plan.normalized.len() <= MAX_CACHED_PATH {
            self.cache.put(plan.normalized.clone(), Arc::clone(&target));
        }
        Some(target)
    }

    fn guess(&self, plan: &ConventionPlan, segments: &[String], action: &str) -> Option<ConventionTarget> {
        if action.starts_with("__") {
            return None;
        }
        for candidate in candidates(&plan.root_ns, segments, &plan.suffix) {
            let Some(class) = self.locate(&candidate, &plan.segment) else {
                continue;
            };
            let Some(action) = class.resolve_action(action) else {
                debug!(controller = %class.name, action = %action, "Action not dispatchable");
                continue;
            };
            let marker = self.config.alternate_root();
            return Some(ConventionTarget {
                segment: segment_of_class(&class.name, marker),
                app: app_of_class(&class.name),
                class,
                action,
            });
        }
        None
    }

    fn locate(&self, candidate: &str, segment: &str) -> Option<Arc<ControllerClass>> {
        if let Some(class) = self.registry.find(candidate) {
            return Some(class);
        }
        let base = self.tree_root(candidate);
        let extension = self.config.str(segment, "app.controller_extension", "rs");
        let file = probe_file(&base, candidate, extension)?;
        debug!(candidate = %candidate, file = %file.display(), "Loading controller file");
        self.registry.load_file(&file);
        self.registry.find_loaded(candidate)
    }

    fn tree_root(&self, class: &str) -> PathBuf {
        let first = class.trim_start_matches('\\').split('\\').next().unwrap_or("");
        match (self.config.alternate_root(), self.config.alternate_root_path()) {
            (Some(marker), Some(path)) if first == marker => PathBuf::from(path),
            _ => self.app_root.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DispatchError;

    fn segs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/user-profile//edit"), "/userprofile/edit");
        assert_eq!(normalize("///a////b"), "/a/b");
    }

    #[test]
    fn test_candidate_order() {
        let got = candidates("app", &segs(&["blog", "post"]), "");
        assert_eq!(
            got,
            vec![
                "app\\controller\\blog\\post",
                "app\\blog\\controller\\post",
                "app\\controller\\blog\\post\\index",
                "app\\blog\\controller\\post\\index",
                "app\\blog\\post\\controller\\index",
            ]
        );
    }

    #[test]
    fn test_candidates_for_root_path() {
        let got = candidates("app", &[], "Controller");
        assert_eq!(got, vec!["app\\controller\\indexController"]);
    }

    #[test]
    fn test_suffix_applies_to_every_candidate() {
        let got = candidates("app", &segs(&["user"]), "Controller");
        assert!(got.iter().all(|c| c.ends_with("Controller")));
        assert!(got.iter().all(|c| !c.ends_with("\\controllerController")));
    }

    #[test]
    fn test_plan_alternate_root() {
        let cfg = Config::new()
            .with("alternate_root.name", "web")
            .with_segment("web", "app.controller_suffix", "Controller");
        let p = plan("/web/shop/cart", &cfg);
        assert_eq!(p.segment, "web");
        assert_eq!(p.root_ns, "web");
        assert_eq!(p.segments, segs(&["shop", "cart"]));
        assert_eq!(p.suffix, "Controller");

        // A lone marker segment is not an alternate-root path.
        let lone = plan("/web", &cfg);
        assert_eq!(lone.root_ns, "app");
        assert_eq!(lone.segments, segs(&["web"]));
    }

    #[test]
    fn test_probe_file_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Blog/Controller")).unwrap();
        std::fs::write(dir.path().join("Blog/Controller/Post.rs"), "").unwrap();
        let found = probe_file(dir.path(), "app\\blog\\controller\\post", "rs").unwrap();
        assert!(found.ends_with("Blog/Controller/Post.rs"));
        assert!(probe_file(dir.path(), "app\\blog\\controller\\missing", "rs").is_none());
    }

    fn resolver_with(class: ControllerClass) -> (tempfile::TempDir, ConventionResolver) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ControllerRegistry::new());
        registry.declare(class);
        let resolver = ConventionResolver::new(registry, Arc::new(Config::new()), dir.path(), 16);
        (dir, resolver)
    }

    fn dynamic(name: &str) -> ControllerClass {
        ControllerClass::new(name, || ()).catch_all(vec![], |_: &(), req, _args| {
            Ok::<_, DispatchError>(req.action.clone())
        })
    }

    #[test]
    fn test_single_segment_gets_no_action_retry() {
        // A retry would land on the index controller's catch-all with action "x".
        let (_dir, resolver) = resolver_with(dynamic("app\\controller\\index"));
        assert!(resolver.resolve("/x").is_none());
        assert_eq!(resolver.cache_len(), 0);

        let two = resolver.resolve("/index/x").unwrap();
        assert_eq!(two.controller(), "app\\controller\\index");
        assert_eq!(two.action, "x");
    }

    #[test]
    fn test_long_paths_resolve_without_caching() {
        let (_dir, resolver) = resolver_with(dynamic("app\\controller\\post"));
        let long = format!("/post/{}", "a".repeat(MAX_CACHED_PATH));
        assert!(long.len() > MAX_CACHED_PATH);

        let target = resolver.resolve(&long).unwrap();
        assert_eq!(target.controller(), "app\\controller\\post");
        assert_eq!(resolver.cache_len(), 0);

        resolver.resolve("/post/short").unwrap();
        assert_eq!(resolver.cache_len(), 1);
    }
}

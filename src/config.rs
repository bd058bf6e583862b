//! Hierarchical configuration source.
//!
//! Configuration is a single JSON-shaped tree loaded from YAML or TOML. Keys
//! are dotted paths. Segment-scoped lookups resolve `segments.<name>.<key>`
//! for a named segment and `<key>` for the default (empty) segment; there is
//! no implicit fallback from a segment to the root.
//!
//! ```yaml
//! app:
//!   debug: true
//!   controller_suffix: Controller
//! static:
//!   enable: true
//! exception:
//!   "": default
//! alternate_root:
//!   name: web
//!   path: ./web
//! segments:
//!   web:
//!     app:
//!       controller_reuse: false
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context};
use serde_json::{Map, Value};

#[derive(Debug, Clone)]
pub struct Config {
    root: Value,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    pub fn from_yaml_str(source: &str) -> anyhow::Result<Self> {
        let root: Value = serde_yaml::from_str(source).context("invalid YAML configuration")?;
        Ok(Self::from_value(normalize_root(root)))
    }

    pub fn from_toml_str(source: &str) -> anyhow::Result<Self> {
        let root: Value = toml::from_str(source).context("invalid TOML configuration")?;
        Ok(Self::from_value(normalize_root(root)))
    }

    /// Load a `.yaml`/`.yml` or `.toml` file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&source),
            Some("toml") => Self::from_toml_str(&source),
            other => bail!("unsupported config extension {:?} for {}", other, path.display()),
        }
    }

    /// Set a root-level dotted key, creating intermediate objects.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        let mut node = &mut self.root;
        let parts: Vec<&str> = key.split('.').collect();
        for (i, part) in parts.iter().enumerate() {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            let Value::Object(map) = node else {
                break;
            };
            if i + 1 == parts.len() {
                map.insert((*part).to_string(), value.into());
                break;
            }
            node = map
                .entry((*part).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        self
    }

    /// Builder-style [`Config::set`].
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Builder-style segment-scoped set.
    pub fn with_segment(self, segment: &str, key: &str, value: impl Into<Value>) -> Self {
        let scoped = scoped_key(segment, key);
        self.with(&scoped, value)
    }

    /// Raw lookup of a root-level dotted key.
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        if key.is_empty() {
            return Some(&self.root);
        }
        key.split('.').try_fold(&self.root, |node, part| node.get(part))
    }

    /// Segment-scoped lookup.
    pub fn get(&self, segment: &str, key: &str) -> Option<&Value> {
        self.lookup(&scoped_key(segment, key))
    }

    pub fn bool(&self, segment: &str, key: &str, default: bool) -> bool {
        self.get(segment, key)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    pub fn str<'a>(&'a self, segment: &str, key: &str, default: &'a str) -> &'a str {
        self.get(segment, key)
            .and_then(Value::as_str)
            .unwrap_or(default)
    }

    /// A string-to-string table such as the `exception` map.
    pub fn string_map(&self, segment: &str, key: &str) -> HashMap<String, String> {
        self.get(segment, key)
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// True when the named segment has any configuration at all.
    pub fn has_segment(&self, segment: &str) -> bool {
        !segment.is_empty() && self.lookup(&format!("segments.{segment}")).is_some()
    }

    /// Marker of the secondary site tree, if configured.
    pub fn alternate_root(&self) -> Option<&str> {
        self.lookup("alternate_root.name")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Directory of the secondary site tree, if configured.
    pub fn alternate_root_path(&self) -> Option<&str> {
        self.lookup("alternate_root.path").and_then(Value::as_str)
    }
}

fn scoped_key(segment: &str, key: &str) -> String {
    if segment.is_empty() {
        key.to_string()
    } else {
        format!("segments.{segment}.{key}")
    }
}

// An empty YAML document deserializes as null.
fn normalize_root(root: Value) -> Value {
    match root {
        Value::Null => Value::Object(Map::new()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
app:
  debug: true
  controller_suffix: Controller
exception:
  "": default
  "@": global
alternate_root:
  name: web
  path: ./web
segments:
  web:
    app:
      debug: false
    exception:
      admin: admin_handler
"#;

    #[test]
    fn test_root_and_segment_lookups_are_independent() {
        let cfg = Config::from_yaml_str(YAML).unwrap();
        assert!(cfg.bool("", "app.debug", false));
        assert!(!cfg.bool("web", "app.debug", true));
        assert_eq!(cfg.str("", "app.controller_suffix", ""), "Controller");
        // No fallback from segment to root.
        assert_eq!(cfg.str("web", "app.controller_suffix", "none"), "none");
    }

    #[test]
    fn test_string_map_and_alternate_root() {
        let cfg = Config::from_yaml_str(YAML).unwrap();
        let root = cfg.string_map("", "exception");
        assert_eq!(root.get("@").map(String::as_str), Some("global"));
        let web = cfg.string_map("web", "exception");
        assert_eq!(web.get("admin").map(String::as_str), Some("admin_handler"));
        assert_eq!(cfg.alternate_root(), Some("web"));
        assert!(cfg.has_segment("web"));
        assert!(!cfg.has_segment("shop"));
    }

    #[test]
    fn test_set_creates_intermediate_tables() {
        let cfg = Config::new()
            .with("static.enable", true)
            .with_segment("shop", "app.controller_reuse", false);
        assert!(cfg.bool("", "static.enable", false));
        assert!(!cfg.bool("shop", "app.controller_reuse", true));
    }

    #[test]
    fn test_toml_source() {
        let cfg = Config::from_toml_str("[app]\ndebug = true\n").unwrap();
        assert!(cfg.bool("", "app.debug", false));
    }

    #[test]
    fn test_empty_yaml_is_empty_config() {
        let cfg = Config::from_yaml_str("").unwrap();
        assert!(!cfg.bool("", "app.debug", false));
    }
}

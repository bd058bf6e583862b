//! Public asset lookup and script execution for the static-file state of
//! the dispatcher.

use std::path::{Component, Path, PathBuf};
use std::process::Command;

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::DispatchError;
use crate::request::Request;

/// A public directory that URL paths map into.
#[derive(Debug, Clone)]
pub struct PublicDir {
    base_dir: PathBuf,
}

impl PublicDir {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self { base_dir: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base_dir
    }

    /// Map a URL path below this directory; anything but plain components
    /// is refused.
    pub fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        let mut pb = self.base_dir.clone();
        for comp in Path::new(url_path.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(s) => pb.push(s),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(pb)
    }

    /// Existing regular file for `url_path`, if any.
    pub fn file(&self, url_path: &str) -> Option<PathBuf> {
        self.map_path(url_path).filter(|p| p.is_file())
    }
}

/// Public directory and the path relative to it for a decoded request path.
///
/// `/<segment>/rest` selects a segment's own `app.public_path` when that
/// segment is configured with one; everything else maps into `default`.
pub fn locate(config: &Config, default: &Path, path: &str) -> (String, PublicDir, String) {
    let trimmed = path.trim_start_matches('/');
    if let Some((first, rest)) = trimmed.split_once('/') {
        if config.has_segment(first) {
            if let Some(public) = config.get(first, "app.public_path").and_then(|v| v.as_str()) {
                return (first.to_string(), PublicDir::new(public), rest.to_string());
            }
        }
    }
    let public = config.str("", "app.public_path", "");
    let dir = if public.is_empty() {
        PublicDir::new(default)
    } else {
        PublicDir::new(public)
    };
    (String::new(), dir, trimmed.to_string())
}

/// Executes server-side script files found in a public directory.
pub trait ScriptRunner: Send + Sync {
    /// Run `file` for `req` and return everything it printed.
    fn run(&self, file: &Path, req: &Request) -> Result<String, DispatchError>;
}

/// Runs scripts through an external interpreter, CGI style.
#[derive(Debug, Clone)]
pub struct CommandScriptRunner {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandScriptRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        CommandScriptRunner {
            program: program.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: &str) -> Self {
        self.args.push(arg.to_string());
        self
    }
}

impl ScriptRunner for CommandScriptRunner {
    fn run(&self, file: &Path, req: &Request) -> Result<String, DispatchError> {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(req.query.iter().map(|(k, v)| {
                (k.clone(), v.as_str().map_or_else(|| v.to_string(), str::to_string))
            }))
            .finish();
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(file)
            .env("REQUEST_METHOD", req.method.as_str())
            .env("REQUEST_URI", &req.path)
            .env("QUERY_STRING", query)
            .env("SCRIPT_FILENAME", file)
            .output()
            .map_err(|e| {
                DispatchError::Handler(anyhow::Error::new(e).context(format!(
                    "failed to start {}",
                    self.program.display()
                )))
            })?;

        let mut out = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            debug!(file = %file.display(), bytes = out.len(), "Script executed");
        } else {
            warn!(file = %file.display(), status = %output.status, "Script failed");
            out.push_str(&String::from_utf8_lossy(&output.stderr));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_path_prevents_traversal() {
        let dir = PublicDir::new("public");
        assert!(dir.map_path("../Cargo.toml").is_none());
        assert!(dir.map_path("a/../../Cargo.toml").is_none());
        assert_eq!(dir.map_path("/css/site.css").unwrap(), PathBuf::from("public/css/site.css"));
    }

    #[test]
    fn test_file_requires_regular_file() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("css")).unwrap();
        std::fs::write(tmp.path().join("css/site.css"), "body{}").unwrap();
        let dir = PublicDir::new(tmp.path());
        assert!(dir.file("/css/site.css").is_some());
        assert!(dir.file("/css").is_none());
        assert!(dir.file("/missing.css").is_none());
    }

    #[test]
    fn test_locate_segment_public_dir() {
        let cfg = Config::new().with_segment("shop", "app.public_path", "/srv/shop/public");
        let (segment, dir, rel) = locate(&cfg, Path::new("/srv/public"), "/shop/img/logo.png");
        assert_eq!(segment, "shop");
        assert_eq!(dir.base(), Path::new("/srv/shop/public"));
        assert_eq!(rel, "img/logo.png");

        let (segment, dir, rel) = locate(&cfg, Path::new("/srv/public"), "/img/logo.png");
        assert_eq!(segment, "");
        assert_eq!(dir.base(), Path::new("/srv/public"));
        assert_eq!(rel, "img/logo.png");
    }

    #[cfg(unix)]
    #[test]
    fn test_command_runner_captures_output() {
        let tmp = tempfile::tempdir().unwrap();
        let script = tmp.path().join("hello.sh");
        std::fs::write(&script, "echo \"hello $REQUEST_METHOD\"\necho oops >&2\nexit 3\n").unwrap();
        let runner = CommandScriptRunner::new("sh");
        let req = Request::new(http::Method::GET, "/hello.sh");
        let out = runner.run(&script, &req).unwrap();
        assert!(out.starts_with("hello GET"));
        assert!(out.contains("oops"));
    }
}

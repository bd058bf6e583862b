//! Outbound response and handler return values.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::DispatchError;
use crate::request::{HeaderVec, Request};

const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Bytes(Vec<u8>),
    Json(Value),
    /// Streamed from disk by the transport.
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderVec,
    pub body: Body,
    exception: Option<Arc<DispatchError>>,
}

impl Default for Response {
    fn default() -> Self {
        Response::empty(200)
    }
}

impl Response {
    pub fn empty(status: u16) -> Self {
        Response {
            status,
            headers: HeaderVec::new(),
            body: Body::Empty,
            exception: None,
        }
    }

    /// HTML body with the default content type.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self::html(status, body)
    }

    #[must_use]
    pub fn json(status: u16, body: Value) -> Self {
        let mut resp = Response::empty(status);
        resp.headers
            .push((Arc::from("content-type"), "application/json".to_string()));
        resp.body = Body::Json(body);
        resp
    }

    #[must_use]
    pub fn html(status: u16, body: impl Into<String>) -> Self {
        let mut resp = Response::empty(status);
        resp.headers
            .push((Arc::from("content-type"), "text/html; charset=utf-8".to_string()));
        resp.body = Body::Bytes(body.into().into_bytes());
        resp
    }

    #[must_use]
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        let mut resp = Response::empty(status);
        resp.headers
            .push((Arc::from("content-type"), "text/plain; charset=utf-8".to_string()));
        resp.body = Body::Bytes(body.into().into_bytes());
        resp
    }

    /// Serve a file from disk, honouring `If-Modified-Since`.
    ///
    /// Answers `304` with no body when the header equals the file's
    /// modification time rendered as an HTTP date.
    pub fn file(path: impl AsRef<Path>, request: &Request) -> std::io::Result<Self> {
        let path = path.as_ref();
        let meta = std::fs::metadata(path)?;
        let modified: DateTime<Utc> = meta.modified()?.into();
        let last_modified = modified.format(HTTP_DATE).to_string();

        if request.header("if-modified-since") == Some(last_modified.as_str()) {
            let mut resp = Response::empty(304);
            resp.set_header("last-modified", last_modified);
            return Ok(resp);
        }

        let mut resp = Response::empty(200);
        resp.set_header("content-type", content_type(path).to_string());
        resp.set_header("content-length", meta.len().to_string());
        resp.set_header("last-modified", last_modified);
        resp.body = Body::File(path.to_path_buf());
        Ok(resp)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add or replace a header.
    pub fn set_header(&mut self, name: &str, value: String) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value));
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value.into());
        self
    }

    pub fn is_chunked(&self) -> bool {
        self.header("transfer-encoding")
            .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"))
    }

    /// The failure this response was rendered from, if any.
    pub fn exception(&self) -> Option<&Arc<DispatchError>> {
        self.exception.as_ref()
    }

    pub(crate) fn stamp(&mut self, err: Arc<DispatchError>) {
        self.exception = Some(err);
    }

    /// JSON body, parsing byte bodies when they hold JSON.
    pub fn json_body(&self) -> Option<Value> {
        match &self.body {
            Body::Json(v) => Some(v.clone()),
            Body::Bytes(b) => serde_json::from_slice(b).ok(),
            _ => None,
        }
    }

    /// Body as UTF-8 text, reading file bodies from disk.
    pub fn text_body(&self) -> String {
        match &self.body {
            Body::Empty => String::new(),
            Body::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            Body::Json(v) => v.to_string(),
            Body::File(p) => std::fs::read(p)
                .map(|b| String::from_utf8_lossy(&b).into_owned())
                .unwrap_or_default(),
        }
    }
}

pub(crate) fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase()
        .as_str()
    {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "txt" => "text/plain",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

/// What a handler hands back: a finished response or a plain value that
/// gets stringified into a 200.
#[derive(Debug, Clone)]
pub enum Reply {
    Response(Response),
    Value(Value),
}

impl Reply {
    pub fn into_response(self) -> Response {
        match self {
            Reply::Response(r) => r,
            Reply::Value(v) => Response::new(200, stringify(&v)),
        }
    }
}

/// String form of a non-response return value.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) => "false".to_string(),
        Value::Null => "NULL".to_string(),
        Value::Array(_) => "Array".to_string(),
        Value::Object(_) => "Object".to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
    }
}

impl From<Response> for Reply {
    fn from(r: Response) -> Self {
        Reply::Response(r)
    }
}

impl From<Value> for Reply {
    fn from(v: Value) -> Self {
        Reply::Value(v)
    }
}

impl From<String> for Reply {
    fn from(s: String) -> Self {
        Reply::Value(Value::String(s))
    }
}

impl From<&str> for Reply {
    fn from(s: &str) -> Self {
        Reply::Value(Value::String(s.to_string()))
    }
}

impl From<bool> for Reply {
    fn from(b: bool) -> Self {
        Reply::Value(Value::Bool(b))
    }
}

impl From<i64> for Reply {
    fn from(n: i64) -> Self {
        Reply::Value(Value::from(n))
    }
}

impl From<()> for Reply {
    fn from(_: ()) -> Self {
        Reply::Value(Value::Null)
    }
}

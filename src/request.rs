//! Inbound request record and per-request context fields.
//!
//! A [`Request`] is owned by exactly one in-flight dispatch. The dispatcher
//! fills in `segment`, `app`, `controller`, `action` and `route` before any
//! handler runs so views and loggers can read them.

use std::net::SocketAddr;
use std::sync::Arc;

use http::{Method, Version};
use serde_json::{Map, Value};
use smallvec::SmallVec;
use tracing::debug;

use crate::ids::RequestId;
use crate::router::Route;

/// Inline capacity for request headers before spilling to the heap.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Header storage: lowercase names, original values.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

#[derive(Debug, Clone)]
pub struct Request {
    pub request_id: RequestId,
    pub method: Method,
    /// Raw path without the query string, exactly as received.
    pub path: String,
    pub query: Map<String, Value>,
    pub version: Version,
    pub headers: HeaderVec,
    pub body: Option<Value>,
    pub remote_addr: Option<SocketAddr>,

    pub segment: String,
    pub app: String,
    pub controller: String,
    pub action: String,
    pub route: Option<Arc<Route>>,
}

impl Request {
    /// Build a request from a method and a request target such as
    /// `/users/7?expand=true`.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p, parse_query(q)),
            None => (target, Map::new()),
        };
        Request {
            request_id: RequestId::new(),
            method,
            path: path.to_string(),
            query,
            version: Version::HTTP_11,
            headers: HeaderVec::new(),
            body: None,
            remote_addr: None,
            segment: String::new(),
            app: String::new(),
            controller: String::new(),
            action: String::new(),
            route: None,
        }
    }

    /// Append a header; an `x-request-id` header also replaces the id.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        if name == "x-request-id" {
            self.request_id = RequestId::from_header_or_new(Some(&value));
        }
        self.headers.push((Arc::from(name), value));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Case-insensitive header lookup; first occurrence wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Query fields merged with body-object fields; body wins on conflict.
    pub fn all(&self) -> Map<String, Value> {
        let mut merged = self.query.clone();
        if let Some(Value::Object(body)) = &self.body {
            for (k, v) in body {
                merged.insert(k.clone(), v.clone());
            }
        }
        merged
    }

    /// Single input field, body first.
    pub fn input(&self, name: &str) -> Option<&Value> {
        self.body
            .as_ref()
            .and_then(|b| b.get(name))
            .or_else(|| self.query.get(name))
    }

    /// XHR without PJAX, or an `Accept` header mentioning json.
    pub fn expects_json(&self) -> bool {
        let xhr = self
            .header("x-requested-with")
            .is_some_and(|v| v.eq_ignore_ascii_case("xmlhttprequest"));
        if xhr && self.header("x-pjax").is_none() {
            return true;
        }
        self.header("accept")
            .is_some_and(|v| v.to_ascii_lowercase().contains("json"))
    }

    /// HTTP/1.1 without a `Connection` header, or an explicit keep-alive.
    pub fn wants_keep_alive(&self) -> bool {
        match self.header("connection") {
            None => self.version == Version::HTTP_11,
            Some(v) => v.eq_ignore_ascii_case("keep-alive"),
        }
    }

    /// `remote_addr method path` summary used in failure reports.
    pub fn summary(&self) -> String {
        let addr = self
            .remote_addr
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!("{} {} {}", addr, self.method, self.path)
    }

    /// Clear the dispatch-populated context fields.
    pub(crate) fn clear_context(&mut self) {
        self.segment.clear();
        self.app.clear();
        self.controller.clear();
        self.action.clear();
        self.route = None;
        debug!(request_id = %self.request_id, "Request context cleared");
    }
}

fn parse_query(query: &str) -> Map<String, Value> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_is_split_from_path() {
        let req = Request::new(Method::GET, "/users/7?expand=true&name=a%20b");
        assert_eq!(req.path, "/users/7");
        assert_eq!(req.query["expand"], "true");
        assert_eq!(req.query["name"], "a b");
    }

    #[test]
    fn test_body_wins_over_query() {
        let req = Request::new(Method::POST, "/x?id=1&page=2").with_body(json!({"id": 9}));
        let all = req.all();
        assert_eq!(all["id"], 9);
        assert_eq!(all["page"], "2");
        assert_eq!(req.input("id"), Some(&json!(9)));
    }

    #[test]
    fn test_expects_json() {
        let plain = Request::new(Method::GET, "/");
        assert!(!plain.expects_json());
        let xhr = Request::new(Method::GET, "/").with_header("X-Requested-With", "XMLHttpRequest");
        assert!(xhr.expects_json());
        let pjax = xhr.clone().with_header("X-PJAX", "true");
        assert!(!pjax.expects_json());
        let accept = Request::new(Method::GET, "/").with_header("Accept", "application/json");
        assert!(accept.expects_json());
    }

    #[test]
    fn test_keep_alive_rules() {
        let h11 = Request::new(Method::GET, "/");
        assert!(h11.wants_keep_alive());
        let closed = Request::new(Method::GET, "/").with_header("Connection", "close");
        assert!(!closed.wants_keep_alive());
        let h10 = Request::new(Method::GET, "/").with_version(Version::HTTP_10);
        assert!(!h10.wants_keep_alive());
        let h10_ka = h10.with_header("Connection", "Keep-Alive");
        assert!(h10_ka.wants_keep_alive());
    }

    #[test]
    fn test_inbound_request_id_is_honoured() {
        let id = RequestId::new();
        let req = Request::new(Method::GET, "/").with_header("X-Request-Id", id.to_string());
        assert_eq!(req.request_id, id);
    }
}

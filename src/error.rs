//! Failure taxonomy for the dispatch core.
//!
//! Every failure that can happen while resolving or running a handler is a
//! [`DispatchError`]. Failures split into two families:
//!
//! - **Renderable** failures know how to turn themselves into a response
//!   (input errors, not-found, method-not-allowed, unsafe paths, business
//!   errors). [`DispatchError::render`] returns `Some` for them.
//! - **Plain** failures (container errors, panics, arbitrary handler errors)
//!   return `None` and are rendered generically by the exception handler.

use std::path::Path;

use minijinja::{context, Environment};
use serde_json::{json, Value};
use thiserror::Error;

use crate::request::Request;
use crate::response::Response;

/// Discriminant of a [`DispatchError`], used by "do not report" lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnsafePath,
    MissingInput,
    WrongType,
    InvalidEnum,
    PageNotFound,
    MethodNotAllowed,
    Business,
    Container,
    Panic,
    Handler,
}

impl ErrorKind {
    /// Kinds that describe a client mistake rather than a server fault.
    pub const BUSINESS: [ErrorKind; 7] = [
        ErrorKind::UnsafePath,
        ErrorKind::MissingInput,
        ErrorKind::WrongType,
        ErrorKind::InvalidEnum,
        ErrorKind::PageNotFound,
        ErrorKind::MethodNotAllowed,
        ErrorKind::Business,
    ];
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("400 Bad Request")]
    UnsafePath { path: String },

    #[error("Missing input parameter {parameter}")]
    MissingInput { parameter: String, debug: bool },

    #[error("Input {parameter} must be of type {expected}, {actual} given")]
    WrongType {
        parameter: String,
        expected: &'static str,
        actual: &'static str,
        debug: bool,
    },

    #[error("Input {parameter} is not a valid {enum_name} value")]
    InvalidEnum {
        parameter: String,
        enum_name: String,
        debug: bool,
    },

    #[error("{message}")]
    PageNotFound { message: String },

    #[error("405 Method Not Allowed")]
    MethodNotAllowed { allowed: Vec<String> },

    /// Application-level failure with a caller-facing code and payload.
    #[error("{message}")]
    Business {
        code: i64,
        message: String,
        data: Value,
    },

    #[error("container could not provide `{id}`: {reason}")]
    Container { id: String, reason: String },

    #[error("handler panicked: {0}")]
    Panic(String),

    #[error(transparent)]
    Handler(#[from] anyhow::Error),
}

/// Knobs the renderable variants consult when building their response.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions<'a> {
    pub debug: bool,
    pub not_found_template: Option<&'a Path>,
}

const NOT_FOUND_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{{ message }}</title>
    <style>.center { text-align: center; }</style>
</head>
<body>
    <h1 class="center">{{ message }}</h1>
    <hr>
    <div class="center">t2engine</div>
</body>
</html>"#;

impl DispatchError {
    pub fn not_found() -> Self {
        DispatchError::PageNotFound {
            message: "404 Not Found".to_string(),
        }
    }

    pub fn business(code: i64, message: impl Into<String>) -> Self {
        DispatchError::Business {
            code,
            message: message.into(),
            data: Value::Null,
        }
    }

    pub fn container(id: impl Into<String>, reason: impl Into<String>) -> Self {
        DispatchError::Container {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Build a [`DispatchError::Panic`] from a `catch_unwind` payload.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        DispatchError::Panic(message)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::UnsafePath { .. } => ErrorKind::UnsafePath,
            DispatchError::MissingInput { .. } => ErrorKind::MissingInput,
            DispatchError::WrongType { .. } => ErrorKind::WrongType,
            DispatchError::InvalidEnum { .. } => ErrorKind::InvalidEnum,
            DispatchError::PageNotFound { .. } => ErrorKind::PageNotFound,
            DispatchError::MethodNotAllowed { .. } => ErrorKind::MethodNotAllowed,
            DispatchError::Business { .. } => ErrorKind::Business,
            DispatchError::Container { .. } => ErrorKind::Container,
            DispatchError::Panic(_) => ErrorKind::Panic,
            DispatchError::Handler(_) => ErrorKind::Handler,
        }
    }

    /// Caller-facing code placed in the `code` field of JSON bodies.
    pub fn code(&self) -> i64 {
        match self {
            DispatchError::Business { code, .. } => *code,
            other => i64::from(other.status()),
        }
    }

    /// HTTP status used when this failure renders itself.
    pub fn status(&self) -> u16 {
        match self {
            DispatchError::UnsafePath { .. }
            | DispatchError::MissingInput { .. }
            | DispatchError::WrongType { .. }
            | DispatchError::InvalidEnum { .. } => 400,
            DispatchError::PageNotFound { .. } => 404,
            DispatchError::MethodNotAllowed { .. } => 405,
            DispatchError::Business { .. } => 200,
            DispatchError::Container { .. }
            | DispatchError::Panic(_)
            | DispatchError::Handler(_) => 500,
        }
    }

    /// Structured payload for the `data` field of JSON bodies.
    pub fn data(&self) -> Value {
        match self {
            DispatchError::UnsafePath { path } => json!({ "path": path }),
            DispatchError::MissingInput { parameter, .. } => json!({ "parameter": parameter }),
            DispatchError::WrongType {
                parameter,
                expected,
                actual,
                ..
            } => json!({
                "parameter": parameter,
                "expected": expected,
                "actual": actual,
            }),
            DispatchError::InvalidEnum {
                parameter,
                enum_name,
                ..
            } => json!({ "parameter": parameter, "enum": enum_name }),
            DispatchError::MethodNotAllowed { allowed } => json!({ "allowed": allowed }),
            DispatchError::Business { data, .. } => data.clone(),
            _ => json!({}),
        }
    }

    /// Input errors carry their own debug flag, captured at resolution time.
    fn exposes_trace(&self, debug: bool) -> bool {
        match self {
            DispatchError::MissingInput { debug: d, .. }
            | DispatchError::WrongType { debug: d, .. }
            | DispatchError::InvalidEnum { debug: d, .. } => *d,
            _ => debug,
        }
    }

    /// Self-rendering for renderable failures; `None` for plain ones.
    pub fn render(&self, request: &Request, opts: &RenderOptions<'_>) -> Option<Response> {
        let message = match self {
            DispatchError::Container { .. } | DispatchError::Panic(_) | DispatchError::Handler(_) => {
                return None;
            }
            other => other.to_string(),
        };
        let status = self.status();

        if request.expects_json() {
            let mut body = json!({
                "code": self.code(),
                "msg": message,
                "data": self.data(),
            });
            if self.exposes_trace(opts.debug) {
                body["traces"] = Value::String(format!("{self:?}"));
            }
            return Some(Response::json(status, body));
        }

        let mut response = match self {
            DispatchError::PageNotFound { .. } | DispatchError::MethodNotAllowed { .. } => {
                Response::html(status, not_found_page(&message, opts.not_found_template))
            }
            _ => Response::text(status, message),
        };
        if let DispatchError::MethodNotAllowed { allowed } = self {
            if !allowed.is_empty() {
                response.set_header("allow", allowed.join(", "));
            }
        }
        Some(response)
    }
}

/// Render the not-found page, preferring a user template when one exists.
pub(crate) fn not_found_page(message: &str, template: Option<&Path>) -> String {
    let source = template
        .filter(|p| p.is_file())
        .and_then(|p| std::fs::read_to_string(p).ok());
    let source = source.as_deref().unwrap_or(NOT_FOUND_PAGE);

    let mut env = Environment::new();
    let rendered = env
        .add_template("404.html", source)
        .and_then(|()| env.get_template("404.html"))
        .and_then(|tpl| tpl.render(context! { message => message }));
    match rendered {
        Ok(html) => html,
        Err(e) => {
            tracing::warn!(error = %e, "not-found template failed to render");
            message.to_string()
        }
    }
}

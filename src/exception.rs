//! # Exception-to-Response Translation
//!
//! Every failure that reaches a pipeline layer or the dispatcher's outer
//! boundary ends up in [`ExceptionTranslator::respond`], which picks an
//! [`ExceptionHandler`] for the request's segment and app, reports the
//! failure, renders it and stamps the response with the failure.
//!
//! ## Handler selection
//!
//! The `exception` table maps app ids to handler names. For a request in
//! segment `s` and app `a` the first hit wins:
//!
//! 1. `exception.<a>` in segment `s`
//! 2. `exception.""` in segment `s`
//! 3. `exception."@"` in the root configuration
//! 4. the built-in `"default"` handler
//!
//! ## Failure isolation
//!
//! Reporting runs under its own panic boundary, so a broken reporter never
//! blocks rendering. If rendering itself fails, a bare 500 carrying either
//! the debug trace or the failure message is returned.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use minijinja::{context, Environment};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, warn};

use crate::config::Config;
use crate::error::{DispatchError, ErrorKind, RenderOptions};
use crate::request::Request;
use crate::response::Response;

/// Name of the built-in handler.
pub const DEFAULT_HANDLER: &str = "default";

/// Key of the global catch-all entry in the root `exception` table.
pub const GLOBAL_HANDLER_KEY: &str = "@";

pub trait ExceptionHandler: Send + Sync {
    fn report(&self, err: &DispatchError, req: &Request);
    fn render(&self, req: &Request, err: &DispatchError) -> Response;
}

/// Settings a handler is instantiated with.
#[derive(Debug, Clone, Default)]
pub struct HandlerSettings {
    pub debug: bool,
    pub not_found_template: Option<PathBuf>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: i64,
    msg: &'a str,
    data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    traces: Option<String>,
}

const TRACE_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"><title>{{ message }}</title></head>
<body>
<h1>{{ message }}</h1>
<pre>{{ trace }}</pre>
</body>
</html>"#;

pub struct DefaultExceptionHandler {
    settings: HandlerSettings,
    dont_report: Vec<ErrorKind>,
}

impl DefaultExceptionHandler {
    pub fn new(settings: HandlerSettings) -> Self {
        DefaultExceptionHandler {
            settings,
            dont_report: ErrorKind::BUSINESS.to_vec(),
        }
    }

    #[must_use]
    pub fn with_dont_report(mut self, kinds: Vec<ErrorKind>) -> Self {
        self.dont_report = kinds;
        self
    }

    fn trace_page(message: &str, trace: &str) -> String {
        let mut env = Environment::new();
        let rendered = env
            .add_template("trace.html", TRACE_PAGE)
            .and_then(|()| env.get_template("trace.html"))
            .and_then(|tpl| tpl.render(context! { message => message, trace => trace }));
        rendered.unwrap_or_else(|_| trace.to_string())
    }
}

impl ExceptionHandler for DefaultExceptionHandler {
    fn report(&self, err: &DispatchError, req: &Request) {
        if self.dont_report.contains(&err.kind()) {
            return;
        }
        error!(
            request_id = %req.request_id,
            request = %req.summary(),
            kind = ?err.kind(),
            error = %format!("{err:#}"),
            "Request failed"
        );
    }

    fn render(&self, req: &Request, err: &DispatchError) -> Response {
        let opts = RenderOptions {
            debug: self.settings.debug,
            not_found_template: self.settings.not_found_template.as_deref(),
        };
        if let Some(response) = err.render(req, &opts) {
            return response;
        }

        let debug = self.settings.debug;
        let message = if debug {
            err.to_string()
        } else {
            "Server internal error".to_string()
        };
        if req.expects_json() {
            let body = ErrorBody {
                code: err.code(),
                msg: &message,
                data: err.data(),
                traces: debug.then(|| format!("{err:?}")),
            };
            let body = serde_json::to_value(&body).unwrap_or(Value::Null);
            return Response::json(500, body);
        }
        if debug {
            Response::html(500, Self::trace_page(&message, &format!("{err:?}")))
        } else {
            Response::text(500, message)
        }
    }
}

type HandlerFactory = Arc<dyn Fn(&HandlerSettings) -> Box<dyn ExceptionHandler> + Send + Sync>;

/// Named exception handler factories. `"default"` is always present.
#[derive(Clone)]
pub struct ExceptionHandlers {
    factories: HashMap<String, HandlerFactory>,
}

impl Default for ExceptionHandlers {
    fn default() -> Self {
        let mut handlers = ExceptionHandlers {
            factories: HashMap::new(),
        };
        handlers.register(DEFAULT_HANDLER, |settings| {
            Box::new(DefaultExceptionHandler::new(settings.clone()))
        });
        handlers
    }
}

impl ExceptionHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&HandlerSettings) -> Box<dyn ExceptionHandler> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
        self
    }

    fn instantiate(&self, name: &str, settings: &HandlerSettings) -> Box<dyn ExceptionHandler> {
        match self.factories.get(name) {
            Some(factory) => factory(settings),
            None => {
                warn!(handler = %name, "Unknown exception handler, using default");
                Box::new(DefaultExceptionHandler::new(settings.clone()))
            }
        }
    }
}

pub struct ExceptionTranslator {
    config: Arc<Config>,
    handlers: ExceptionHandlers,
}

impl ExceptionTranslator {
    pub fn new(config: Arc<Config>, handlers: ExceptionHandlers) -> Self {
        ExceptionTranslator { config, handlers }
    }

    /// Handler name for a segment and app.
    pub fn handler_name(&self, segment: &str, app: &str) -> String {
        let table = self.config.string_map(segment, "exception");
        if !app.is_empty() {
            if let Some(name) = table.get(app) {
                return name.clone();
            }
        }
        if let Some(name) = table.get("") {
            return name.clone();
        }
        self.config
            .string_map("", "exception")
            .remove(GLOBAL_HANDLER_KEY)
            .unwrap_or_else(|| DEFAULT_HANDLER.to_string())
    }

    pub fn settings(&self, segment: &str) -> HandlerSettings {
        let template = self.config.str(segment, "app.not_found_template", "");
        HandlerSettings {
            debug: self.config.bool(segment, "app.debug", false),
            not_found_template: (!template.is_empty()).then(|| PathBuf::from(template)),
        }
    }

    /// Turn `err` into a response. Never fails.
    pub fn respond(&self, err: DispatchError, req: &Request) -> Response {
        let err = Arc::new(err);
        let settings = self.settings(&req.segment);

        let rendered = catch_unwind(AssertUnwindSafe(|| {
            let name = self.handler_name(&req.segment, &req.app);
            let handler = self.handlers.instantiate(&name, &settings);
            let reported = catch_unwind(AssertUnwindSafe(|| handler.report(&err, req)));
            if reported.is_err() {
                warn!(request_id = %req.request_id, "Exception reporter panicked");
            }
            handler.render(req, &err)
        }));

        let mut response = match rendered {
            Ok(response) => response,
            Err(_) => {
                error!(request_id = %req.request_id, error = %err, "Exception handler failed");
                let body = if settings.debug {
                    format!("{err:?}")
                } else {
                    err.to_string()
                };
                Response::text(500, body)
            }
        };
        response.stamp(err);
        response
    }
}

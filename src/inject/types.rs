use std::any::Any;
use std::sync::Arc;

use serde_json::Value;

use crate::container::Instance;

/// Declared type of a handler or constructor parameter.
#[derive(Debug, Clone)]
pub enum ParamKind {
    Untyped,
    Int,
    Float,
    Bool,
    Str,
    Array,
    Object,
    Mixed,
    Resource,
    /// The live request.
    Request,
    /// Active-record model, built from `{attributes, data}`.
    Model(String),
    Enum(Arc<EnumType>),
    Class(Arc<ClassType>),
}

impl ParamKind {
    /// Primitive kinds that can be satisfied from raw input without the container.
    pub fn is_adapter(&self) -> bool {
        matches!(
            self,
            ParamKind::Untyped
                | ParamKind::Int
                | ParamKind::Float
                | ParamKind::Bool
                | ParamKind::Str
                | ParamKind::Array
                | ParamKind::Object
                | ParamKind::Mixed
                | ParamKind::Resource
        )
    }

    /// Name used in type-mismatch errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamKind::Untyped => "untyped",
            ParamKind::Int => "int",
            ParamKind::Float => "float",
            ParamKind::Bool => "bool",
            ParamKind::Str => "string",
            ParamKind::Array => "array",
            ParamKind::Object => "object",
            ParamKind::Mixed => "mixed",
            ParamKind::Resource => "resource",
            ParamKind::Request => "request",
            ParamKind::Model(_) => "model",
            ParamKind::Enum(_) => "enum",
            ParamKind::Class(_) => "class",
        }
    }
}

/// One parameter of a handler, built once at registration time.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn new(name: &str, kind: ParamKind) -> Self {
        ParamSpec {
            name: name.to_string(),
            kind,
            default: None,
        }
    }

    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// The conventional first parameter: an untyped `request`.
    pub fn request() -> Self {
        ParamSpec::new("request", ParamKind::Untyped)
    }

    pub fn int(name: &str) -> Self {
        ParamSpec::new(name, ParamKind::Int)
    }

    pub fn float(name: &str) -> Self {
        ParamSpec::new(name, ParamKind::Float)
    }

    pub fn bool(name: &str) -> Self {
        ParamSpec::new(name, ParamKind::Bool)
    }

    pub fn str(name: &str) -> Self {
        ParamSpec::new(name, ParamKind::Str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumCase {
    pub name: String,
    /// Backing value for value-backed enumerations.
    pub value: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct EnumType {
    pub name: String,
    pub cases: Vec<EnumCase>,
}

impl EnumType {
    /// Pure enumeration: cases have names only.
    pub fn pure(name: &str, cases: &[&str]) -> Self {
        EnumType {
            name: name.to_string(),
            cases: cases
                .iter()
                .map(|c| EnumCase {
                    name: (*c).to_string(),
                    value: None,
                })
                .collect(),
        }
    }

    pub fn backed(name: &str, cases: &[(&str, Value)]) -> Self {
        EnumType {
            name: name.to_string(),
            cases: cases
                .iter()
                .map(|(c, v)| EnumCase {
                    name: (*c).to_string(),
                    value: Some(v.clone()),
                })
                .collect(),
        }
    }

    pub fn is_backed(&self) -> bool {
        self.cases.iter().any(|c| c.value.is_some())
    }

    pub fn case(&self, name: &str) -> Option<&EnumCase> {
        self.cases.iter().find(|c| c.name == name)
    }
}

/// A class the container can build, with its constructor signature when it
/// declares one.
#[derive(Debug, Clone)]
pub struct ClassType {
    pub name: String,
    pub constructor: Option<Vec<ParamSpec>>,
}

impl ClassType {
    pub fn new(name: &str) -> Self {
        ClassType {
            name: name.to_string(),
            constructor: None,
        }
    }

    #[must_use]
    pub fn with_constructor(mut self, params: Vec<ParamSpec>) -> Self {
        self.constructor = Some(params);
        self
    }
}

/// A bound argument value.
#[derive(Clone)]
pub enum Arg {
    /// Stands for the live request, which handlers receive separately.
    Request,
    Value(Value),
    Instance(Instance),
    Enum(EnumCase),
}

impl std::fmt::Debug for Arg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arg::Request => f.write_str("Request"),
            Arg::Value(v) => write!(f, "Value({v})"),
            Arg::Instance(_) => f.write_str("Instance(..)"),
            Arg::Enum(c) => write!(f, "Enum({})", c.name),
        }
    }
}

/// Ordered, named argument list.
#[derive(Debug, Clone, Default)]
pub struct Args(Vec<(String, Arg)>);

impl Args {
    pub fn new() -> Self {
        Args(Vec::new())
    }

    pub fn push(&mut self, name: impl Into<String>, arg: Arg) {
        self.0.push((name.into(), arg));
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, arg: Arg) -> Self {
        self.push(name, arg);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arg> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, a)| a)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.get(name)? {
            Arg::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.value(name).and_then(Value::as_i64)
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        self.value(name).and_then(Value::as_f64)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.value(name).and_then(Value::as_bool)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.value(name).and_then(Value::as_str)
    }

    pub fn instance<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        match self.get(name)? {
            Arg::Instance(i) => Arc::clone(i).downcast::<T>().ok(),
            _ => None,
        }
    }

    pub fn enum_case(&self, name: &str) -> Option<&EnumCase> {
        match self.get(name)? {
            Arg::Enum(c) => Some(c),
            _ => None,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Arg)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

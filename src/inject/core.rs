use std::collections::HashSet;

use serde_json::{json, Map, Value};
use tracing::debug;

use super::coerce::{
    actual_kind, float_value, is_numeric, is_structured, loosely_equal, to_float, to_int, to_object,
    truthy,
};
use super::types::{Arg, Args, ClassType, EnumType, ParamKind, ParamSpec};
use crate::container::Container;
use crate::error::DispatchError;

/// Cheap test run once at pipeline build time.
///
/// Returns `false` only when the handler can be called with the request plus
/// the caller-supplied `args` as they are. Supplied primitives are coerced in
/// place along the way.
pub fn needs_injection(params: &[ParamSpec], args: &mut Map<String, Value>) -> bool {
    let Some((first, rest)) = params.split_first() else {
        return false;
    };

    let mut inject = false;
    for param in rest {
        if matches!(param.kind, ParamKind::Untyped) {
            continue;
        }
        if !param.kind.is_adapter() {
            inject = true;
            continue;
        }
        let Some(value) = args.get_mut(&param.name) else {
            inject = true;
            continue;
        };
        match param.kind {
            ParamKind::Int | ParamKind::Float => {
                if !is_numeric(value) {
                    return true;
                }
                *value = match param.kind {
                    ParamKind::Int => to_int(value).map(Value::from).unwrap_or(Value::Null),
                    _ => to_float(value).map(float_value).unwrap_or(Value::Null),
                };
            }
            ParamKind::Bool => *value = Value::Bool(truthy(value)),
            ParamKind::Array | ParamKind::Object => {
                if !is_structured(value) {
                    return true;
                }
                if matches!(param.kind, ParamKind::Object) {
                    *value = Value::Object(to_object(value.take()));
                }
            }
            _ => {}
        }
    }

    let expected: HashSet<&str> = rest.iter().map(|p| p.name.as_str()).collect();
    let supplied: HashSet<&str> = args.keys().map(String::as_str).collect();
    if expected != supplied {
        return true;
    }

    match first.kind {
        ParamKind::Untyped => first.name != "request" || inject,
        ParamKind::Request => inject,
        _ => true,
    }
}

/// Bind the request and already-coerced caller arguments by name.
pub fn bind_supplied(params: &[ParamSpec], args: &Map<String, Value>) -> Args {
    let mut bound = Args::new();
    let Some((first, rest)) = params.split_first() else {
        return bound;
    };
    bound.push(first.name.clone(), Arg::Request);
    for param in rest {
        let value = args.get(&param.name).cloned().unwrap_or(Value::Null);
        bound.push(param.name.clone(), Arg::Value(value));
    }
    bound
}

/// Full resolution of `params` against `inputs`, in declaration order.
///
/// A leading untyped `request` parameter receives the request, the same as
/// on the supplied-arguments path.
pub fn resolve(
    container: &dyn Container,
    inputs: &Map<String, Value>,
    params: &[ParamSpec],
    debug: bool,
) -> Result<Args, DispatchError> {
    let mut bound = Args::new();
    for (i, param) in params.iter().enumerate() {
        let arg = if i == 0 && matches!(param.kind, ParamKind::Untyped) && param.name == "request" {
            Arg::Request
        } else {
            resolve_one(container, inputs, param, debug)?
        };
        bound.push(param.name.clone(), arg);
    }
    Ok(bound)
}

fn resolve_one(
    container: &dyn Container,
    inputs: &Map<String, Value>,
    param: &ParamSpec,
    debug: bool,
) -> Result<Arg, DispatchError> {
    let name = param.name.as_str();
    if matches!(param.kind, ParamKind::Request) {
        return Ok(Arg::Request);
    }

    let raw = match inputs.get(name) {
        Some(v) => v.clone(),
        None => {
            if let Some(default) = &param.default {
                return Ok(Arg::Value(default.clone()));
            }
            if !matches!(param.kind, ParamKind::Model(_) | ParamKind::Class(_)) {
                return Err(DispatchError::MissingInput {
                    parameter: name.to_string(),
                    debug,
                });
            }
            Value::Null
        }
    };

    let wrong_type = |expected: &'static str, raw: &Value| DispatchError::WrongType {
        parameter: name.to_string(),
        expected,
        actual: actual_kind(raw),
        debug,
    };

    match &param.kind {
        ParamKind::Int | ParamKind::Float => {
            if !is_numeric(&raw) {
                return Err(wrong_type(param.kind.type_name(), &raw));
            }
            let coerced = match param.kind {
                ParamKind::Int => to_int(&raw).map(Value::from),
                _ => to_float(&raw).map(float_value),
            };
            Ok(Arg::Value(coerced.unwrap_or(Value::Null)))
        }
        ParamKind::Bool => Ok(Arg::Value(Value::Bool(truthy(&raw)))),
        ParamKind::Array | ParamKind::Object => {
            if !is_structured(&raw) {
                return Err(wrong_type(param.kind.type_name(), &raw));
            }
            Ok(Arg::Value(match param.kind {
                ParamKind::Object => Value::Object(to_object(raw)),
                _ => raw,
            }))
        }
        ParamKind::Str | ParamKind::Mixed | ParamKind::Resource | ParamKind::Untyped => {
            Ok(Arg::Value(raw))
        }
        ParamKind::Model(model) => {
            let sub = if is_structured(&raw) { raw } else { json!({}) };
            let args = Args::new()
                .with("attributes", Arg::Value(sub.clone()))
                .with("data", Arg::Value(sub));
            Ok(Arg::Instance(container.make(model, &args)?))
        }
        ParamKind::Enum(enum_type) => resolve_enum(enum_type, &raw, name, debug),
        ParamKind::Class(class) => resolve_class(container, class, raw, debug),
        ParamKind::Request => Ok(Arg::Request),
    }
}

fn resolve_enum(
    enum_type: &EnumType,
    raw: &Value,
    name: &str,
    debug: bool,
) -> Result<Arg, DispatchError> {
    if let Some(case) = raw.as_str().and_then(|s| enum_type.case(s)) {
        return Ok(Arg::Enum(case.clone()));
    }
    if enum_type.is_backed() {
        let found = enum_type
            .cases
            .iter()
            .find(|c| c.value.as_ref().is_some_and(|v| loosely_equal(v, raw)));
        if let Some(case) = found {
            return Ok(Arg::Enum(case.clone()));
        }
    }
    Err(DispatchError::InvalidEnum {
        parameter: name.to_string(),
        enum_name: enum_type.name.clone(),
        debug,
    })
}

/// Scalar sub-input yields a plain instance: `make` with no constructor args.
fn resolve_class(
    container: &dyn Container,
    class: &ClassType,
    raw: Value,
    debug: bool,
) -> Result<Arg, DispatchError> {
    // Absent input behaves like an empty structured value.
    let sub = match raw {
        Value::Null => Some(Map::new()),
        v if is_structured(&v) => Some(to_object(v)),
        _ => None,
    };
    let args = match (&class.constructor, sub) {
        (Some(ctor), Some(sub)) => {
            debug!(class = %class.name, "Resolving constructor dependencies");
            resolve(container, &sub, ctor, debug)?
        }
        _ => Args::new(),
    };
    Ok(Arg::Instance(container.make(&class.name, &args)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ServiceContainer;
    use serde_json::json;
    use std::sync::Arc;

    fn map(v: Value) -> Map<String, Value> {
        to_object(v)
    }

    #[test]
    fn test_zero_params_never_inject() {
        let mut args = map(json!({"anything": 1}));
        assert!(!needs_injection(&[], &mut args));
    }

    #[test]
    fn test_conventional_request_param_with_matching_args_skips() {
        let params = [ParamSpec::request(), ParamSpec::int("id")];
        let mut args = map(json!({"id": "42"}));
        assert!(!needs_injection(&params, &mut args));
        assert_eq!(args["id"], 42);
    }

    #[test]
    fn test_non_numeric_int_forces_injection() {
        let params = [ParamSpec::request(), ParamSpec::int("id")];
        let mut args = map(json!({"id": "abc"}));
        assert!(needs_injection(&params, &mut args));
    }

    #[test]
    fn test_key_set_mismatch_forces_injection() {
        let params = [ParamSpec::request(), ParamSpec::str("name")];
        let mut extra = map(json!({"name": "a", "other": 1}));
        assert!(needs_injection(&params, &mut extra));
        let mut missing = Map::new();
        assert!(needs_injection(&params, &mut missing));
    }

    #[test]
    fn test_first_param_rules() {
        let mut none = Map::new();
        assert!(needs_injection(&[ParamSpec::new("req", ParamKind::Untyped)], &mut none));
        assert!(!needs_injection(&[ParamSpec::new("r", ParamKind::Request)], &mut none));
        assert!(needs_injection(&[ParamSpec::int("id")], &mut none));
    }

    #[test]
    fn test_class_param_forces_injection() {
        let class = Arc::new(ClassType::new("Mailer"));
        let params = [ParamSpec::request(), ParamSpec::new("m", ParamKind::Class(class))];
        let mut args = map(json!({"m": {}}));
        assert!(needs_injection(&params, &mut args));
    }

    #[test]
    fn test_model_param_after_request_forces_injection() {
        let params = [ParamSpec::request(), ParamSpec::new("user", ParamKind::Model("User".into()))];
        let mut args = map(json!({"user": "5"}));
        assert!(needs_injection(&params, &mut args));

        let typed = [
            ParamSpec::new("r", ParamKind::Request),
            ParamSpec::new("user", ParamKind::Model("User".into())),
        ];
        assert!(needs_injection(&typed, &mut args));
    }

    #[test]
    fn test_order_insensitive_key_comparison() {
        let params = [ParamSpec::request(), ParamSpec::str("a"), ParamSpec::str("b")];
        let mut args = map(json!({"b": "2", "a": "1"}));
        assert!(!needs_injection(&params, &mut args));
        let bound = bind_supplied(&params, &args);
        let names: Vec<&str> = bound.names().collect();
        assert_eq!(names, ["request", "a", "b"]);
    }

    #[test]
    fn test_resolve_coerces_int() {
        let c = ServiceContainer::new();
        let params = [ParamSpec::new("r", ParamKind::Request), ParamSpec::int("id")];
        let args = resolve(&c, &map(json!({"id": "42"})), &params, false).unwrap();
        assert!(matches!(args.get("r"), Some(Arg::Request)));
        assert_eq!(args.int("id"), Some(42));
    }

    #[test]
    fn test_resolve_binds_conventional_request() {
        let c = ServiceContainer::new();
        let params = [ParamSpec::request(), ParamSpec::str("name")];
        let args = resolve(&c, &map(json!({"name": "x"})), &params, false).unwrap();
        assert!(matches!(args.get("request"), Some(Arg::Request)));
        assert_eq!(args.str("name"), Some("x"));
    }

    #[test]
    fn test_resolve_wrong_type_names_parameter_and_kinds() {
        let c = ServiceContainer::new();
        let params = [ParamSpec::int("id")];
        let err = resolve(&c, &map(json!({"id": "abc"})), &params, true).unwrap_err();
        match err {
            DispatchError::WrongType {
                parameter,
                expected,
                actual,
                debug,
            } => {
                assert_eq!(parameter, "id");
                assert_eq!(expected, "int");
                assert_eq!(actual, "string");
                assert!(debug);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_missing_input_and_defaults() {
        let c = ServiceContainer::new();
        let err = resolve(&c, &Map::new(), &[ParamSpec::str("q")], false).unwrap_err();
        assert!(matches!(err, DispatchError::MissingInput { ref parameter, .. } if parameter == "q"));

        let with_default = [ParamSpec::int("page").with_default(json!(1))];
        let args = resolve(&c, &Map::new(), &with_default, false).unwrap();
        assert_eq!(args.int("page"), Some(1));
    }

    #[test]
    fn test_array_and_object_require_structured_input() {
        let c = ServiceContainer::new();
        let params = [ParamSpec::new("tags", ParamKind::Array)];
        let err = resolve(&c, &map(json!({"tags": "a,b"})), &params, false).unwrap_err();
        assert!(matches!(err, DispatchError::WrongType { expected: "array", .. }));

        let params = [ParamSpec::new("opts", ParamKind::Object)];
        let args = resolve(&c, &map(json!({"opts": ["x"]})), &params, false).unwrap();
        assert_eq!(args.value("opts").unwrap()["0"], "x");
    }

    #[test]
    fn test_enum_by_name_and_backing_value() {
        let c = ServiceContainer::new();
        let status = Arc::new(EnumType::backed(
            "Status",
            &[("Draft", json!(1)), ("Published", json!(2))],
        ));
        let params = [ParamSpec::new("s", ParamKind::Enum(Arc::clone(&status)))];

        let by_name = resolve(&c, &map(json!({"s": "Draft"})), &params, false).unwrap();
        assert_eq!(by_name.enum_case("s").unwrap().name, "Draft");

        let by_value = resolve(&c, &map(json!({"s": "2"})), &params, false).unwrap();
        assert_eq!(by_value.enum_case("s").unwrap().name, "Published");

        let err = resolve(&c, &map(json!({"s": "9"})), &params, false).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidEnum { ref enum_name, .. } if enum_name == "Status"));
    }

    #[test]
    fn test_missing_enum_input_is_missing_not_injected() {
        let c = ServiceContainer::new();
        let e = Arc::new(EnumType::pure("Color", &["Red"]));
        let err = resolve(&c, &Map::new(), &[ParamSpec::new("c", ParamKind::Enum(e))], false)
            .unwrap_err();
        assert!(matches!(err, DispatchError::MissingInput { .. }));
    }

    #[derive(Debug)]
    struct Address {
        city: String,
        zip: i64,
    }

    #[test]
    fn test_class_constructor_is_resolved_recursively() {
        let c = ServiceContainer::new();
        c.bind("Address", |_, args| {
            Ok(Address {
                city: args.str("city").unwrap_or_default().to_string(),
                zip: args.int("zip").unwrap_or_default(),
            })
        });
        let class = Arc::new(
            ClassType::new("Address").with_constructor(vec![ParamSpec::str("city"), ParamSpec::int("zip")]),
        );
        let params = [ParamSpec::new("address", ParamKind::Class(class))];
        let inputs = map(json!({"address": {"city": "Oslo", "zip": "150"}}));
        let args = resolve(&c, &inputs, &params, false).unwrap();
        let addr = args.instance::<Address>("address").unwrap();
        assert_eq!(addr.city, "Oslo");
        assert_eq!(addr.zip, 150);
    }

    #[test]
    fn test_model_receives_attributes_and_data() {
        let c = ServiceContainer::new();
        c.bind("User", |_, args| Ok(args.value("attributes").cloned().unwrap_or_default()));
        let params = [ParamSpec::new("user", ParamKind::Model("User".into()))];
        let args = resolve(&c, &map(json!({"user": {"name": "ada"}})), &params, false).unwrap();
        let attrs = args.instance::<Value>("user").unwrap();
        assert_eq!(attrs["name"], "ada");
    }
}

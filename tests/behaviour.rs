//! End-to-end behaviour through the public API.
use std::cell::Cell;

use serde_json::json;

use typeshape::connection::{self, DriverFactory};
use typeshape::names::{array_of, bounded_int, function_type, optional_property, variant_of};
use typeshape::{
    Descriptor, Match, SchemaError, TypeRegistry, construct_error, enforce, get_errors, get_errors_at, when,
    when_with,
};

#[test]
fn composite_names_render_canonically() {
    let inner = variant_of(["a", "b"]).unwrap();
    assert_eq!(array_of(Some(inner.as_str())).unwrap(), "array<variant<a; b>>");
    assert_eq!(function_type(["int", "[string]"], "boolean").unwrap(), "int, [string] => boolean");
    assert_eq!(bounded_int(0, None).unwrap(), "boundedInt<0;Infinity>");
}

#[test]
fn builtin_predicates() {
    let registry = TypeRegistry::bootstrap().unwrap();
    let untyped = registry.is_type_of("array").unwrap();
    assert!(untyped.test_value(&json!([1, "x", true])));

    let either = registry.is_type_of(&variant_of(["int", "string"]).unwrap()).unwrap();
    assert!(either.test_value(&json!(1)));
    assert!(either.test_value(&json!("x")));
    assert!(!either.test_value(&json!(true)));

    let byte = registry.is_type_of(&bounded_int(0, Some(255)).unwrap()).unwrap();
    assert!(!byte.test_value(&json!(256)));
    assert!(byte.test_value(&json!(0)));
    assert!(byte.test_value(&json!(255)));

    let natural = registry.is_type_of(&bounded_int(0, None).unwrap()).unwrap();
    assert!(!natural.test_value(&json!(-1)));
    assert!(natural.test_value(&json!(1_000_000)));
}

#[test]
fn duck_types_ignore_extra_fields() {
    let mut registry = TypeRegistry::bootstrap().unwrap();
    registry.register_duck_type("Conn", [("host", "string"), ("user", "string")]).unwrap();
    let conn = registry.is_type_of("Conn").unwrap();
    assert!(conn.test_value(&json!({"host": "a", "user": "b", "extra": 1})));
    assert!(!conn.test_value(&json!({"host": "a"})));

    assert_eq!(
        registry.register_duck_type("Conn", [("host", "string")]).unwrap_err(),
        SchemaError::DuplicateType("Conn".into())
    );
}

#[test]
fn validator_reports_leaves_in_order() {
    let registry = TypeRegistry::bootstrap().unwrap();
    let descriptor = Descriptor::shape([
        ("a", Descriptor::from("boolean")),
        ("b", Descriptor::shape([("c", "int")])),
    ]);
    let errors = get_errors_at(&registry, "root", &descriptor, Some(&json!({"a": "x", "b": {"c": "y"}}))).unwrap();
    assert_eq!(
        errors,
        vec![
            construct_error("root.a", "boolean", Some(&json!("x"))),
            construct_error("root.b.c", "int", Some(&json!("y"))),
        ]
    );

    assert!(get_errors_at(&registry, "p", &"int".into(), Some(&json!(5))).unwrap().is_empty());
    assert!(get_errors_at(&registry, "p", &"boolean".into(), Some(&json!(true))).unwrap().is_empty());
}

#[test]
fn optional_properties_accept_absence_only() {
    let registry = TypeRegistry::bootstrap().unwrap();
    let descriptor = Descriptor::shape([("port", optional_property("int").unwrap())]);
    assert!(get_errors(&registry, &descriptor, Some(&json!({}))).unwrap().is_empty());
    assert_eq!(get_errors(&registry, &descriptor, Some(&json!({"port": null}))).unwrap().len(), 1);
}

#[test]
fn dispatch_first_match_and_isolation() {
    let second_calls = Cell::new(0);
    let dispatcher = when::<String, &str>()
        .cond(|_: &String| true, |_: &String| "first")
        .cond(|_: &String| true, |_: &String| {
            second_calls.set(second_calls.get() + 1);
            "second"
        });
    assert_eq!(dispatcher.match_value(&"x".to_string()), Match::Matched("first"));
    assert_eq!(second_calls.get(), 0);

    let by_length = when_with(|v: &str| v.len()).cond(|n: &usize| *n == 3, |v: &str| v.to_string());
    assert_eq!(by_length.match_value("abc"), Match::Matched("abc".to_string()));
    assert_eq!(by_length.match_value("abcd"), Match::NoMatch);
}

#[test]
fn enforced_functions_check_their_contract() {
    let registry = TypeRegistry::bootstrap().unwrap();
    let signature = function_type(["string"], "int").unwrap();
    let length = enforce(&registry, &signature, |args| json!(args[0].as_str().map_or(0, str::len))).unwrap();
    assert_eq!(length.call(&[json!("abc")]).unwrap(), json!(3));
    assert!(length.call(&[json!(3)]).is_err());
    assert!(length.call(&[]).is_err());
}

struct Echo;

impl DriverFactory for Echo {
    type Handle = serde_json::Value;
    type Error = std::io::Error;

    fn create(&self, config: &serde_json::Value) -> Result<Self::Handle, Self::Error> {
        Ok(config.clone())
    }
}

#[test]
fn connection_configs_are_checked_before_the_driver() {
    let mut registry = TypeRegistry::bootstrap().unwrap();
    connection::register(&mut registry).unwrap();

    let good = json!({"client": "sqlite3", "connection": {"filename": "./data/db.sqlite"}});
    assert_eq!(connection::connect(&registry, &Echo, &good).unwrap(), good);

    let bad = json!({"client": "nosql", "connection": "postgres://localhost/db"});
    match connection::connect(&registry, &Echo, &bad).unwrap_err() {
        connection::ConfigError::Invalid { errors, message } => {
            assert_eq!(errors, vec![construct_error("constructorParameter.client", "knexClients", Some(&json!("nosql")))]);
            assert!(message.starts_with("constructor parameter was not the correct type"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

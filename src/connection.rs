//! Database connection parameters, described with the core vocabulary.
//!
//! The driver is opaque: [`connect`] validates a configuration and hands it,
//! untouched, to a [`DriverFactory`]. Which of the three accepted connection
//! shapes a value was meant to be is decided with a [`when`] dispatcher, so
//! the report talks about the shape the caller was most likely aiming for.
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::SchemaError;
use crate::names::{bounded_int, optional_property, variant_of};
use crate::registry::TypeRegistry;
use crate::validate::{Descriptor, ValidationError, construct_error, display_slot, get_errors_at};
use crate::vocabulary::{IP4_STRING, PATH, REQUIRED_STRING};
use crate::when::when;

pub const ALLOWED_CLIENTS: &[&str] = &["postgres", "mssql", "mysql", "mariadb", "sqlite3", "oracle"];

pub const CLIENTS: &str = "knexClients";
pub const CONNECTION_OBJECT: &str = "knexConnectionObject";
pub const CONNECTION_FILE_OBJECT: &str = "knexConnectionFileObject";
pub const CONNECTION_STRING: &str = "knexConnectionString";
pub const POOL_MIN_MAX: &str = "connectionPoolMinMax";
pub const CONSTRUCTOR: &str = "knexConstructorType";

const PARAMETER: &str = "constructorParameter";

/// Keys that mark an object as an attempted connection object.
const CONNECTION_OBJECT_KEYS: &[&str] = &["host", "socketPath", "user", "password", "database"];

// ————————————————————————————————————————————————————————————————————————————
// DEFINITIONS
// ————————————————————————————————————————————————————————————————————————————

type Fields = Vec<(&'static str, String)>;

fn connection_object_fields() -> Result<Fields, SchemaError> {
    Ok(vec![
        ("host", optional_property(IP4_STRING)?),
        ("socketPath", optional_property(PATH)?),
        ("user", REQUIRED_STRING.to_string()),
        ("password", optional_property(REQUIRED_STRING)?),
        ("database", REQUIRED_STRING.to_string()),
    ])
}

fn connection_file_fields() -> Fields {
    vec![("filename", PATH.to_string())]
}

fn pool_fields() -> Result<Fields, SchemaError> {
    let count = bounded_int(0, None)?;
    Ok(vec![("min", count.clone()), ("max", count)])
}

/// Constructor fields other than `connection` and `pool`, which get their
/// own reports.
fn constructor_fields() -> Result<Fields, SchemaError> {
    Ok(vec![
        ("client", CLIENTS.to_string()),
        ("searchPath", optional_property(REQUIRED_STRING)?),
        ("debug", optional_property("boolean")?),
        ("acquireConnectionTimeout", optional_property(&bounded_int(0, None)?)?),
    ])
}

pub fn connection_variant() -> Result<String, SchemaError> {
    variant_of([CONNECTION_OBJECT, CONNECTION_FILE_OBJECT, CONNECTION_STRING])
}

pub fn connection_object_shape() -> Result<Descriptor, SchemaError> {
    Ok(Descriptor::shape(connection_object_fields()?))
}

pub fn connection_file_shape() -> Descriptor {
    Descriptor::shape(connection_file_fields())
}

pub fn pool_shape() -> Result<Descriptor, SchemaError> {
    Ok(Descriptor::shape(pool_fields()?))
}

pub fn constructor_shape() -> Result<Descriptor, SchemaError> {
    Ok(Descriptor::shape(constructor_fields()?))
}

/// Needs the vocabulary from [`TypeRegistry::bootstrap`].
pub fn register(registry: &mut TypeRegistry) -> Result<(), SchemaError> {
    registry.register_primitive_subtype(REQUIRED_STRING, CLIENTS, |v| {
        v.as_str().is_some_and(|s| ALLOWED_CLIENTS.contains(&s))
    })?;
    registry.register_duck_type(CONNECTION_OBJECT, connection_object_fields()?)?;
    registry.register_duck_type(CONNECTION_FILE_OBJECT, connection_file_fields())?;
    registry.register_alias(CONNECTION_STRING, REQUIRED_STRING)?;
    registry.register_duck_type(POOL_MIN_MAX, pool_fields()?)?;

    let mut constructor = constructor_fields()?;
    constructor.push(("connection", connection_variant()?));
    constructor.push(("pool", optional_property(POOL_MIN_MAX)?));
    registry.register_duck_type(CONSTRUCTOR, constructor)
}

// ————————————————————————————————————————————————————————————————————————————
// REPORTS
// ————————————————————————————————————————————————————————————————————————————

/// Empty when `value` is a valid constructor parameter. Otherwise: field
/// errors, then pool errors, then connection errors.
pub fn constructor_errors(
    registry: &TypeRegistry,
    value: &Value,
) -> Result<Vec<ValidationError>, SchemaError> {
    if registry.is_type_of(CONSTRUCTOR)?.test_value(value) {
        return Ok(Vec::new());
    }
    let prefix = format!("{PARAMETER}.");
    let mut errors = get_errors_at(registry, PARAMETER, &constructor_shape()?, Some(value))?;
    errors.extend(pool_errors(registry, &prefix, value.get("pool"))?);
    errors.extend(connection_errors(registry, &prefix, value.get("connection"))?);
    Ok(errors)
}

pub fn pool_errors(
    registry: &TypeRegistry,
    prefix: &str,
    pool: Option<&Value>,
) -> Result<Vec<ValidationError>, SchemaError> {
    match pool {
        None => Ok(Vec::new()),
        Some(pool) => get_errors_at(registry, &format!("{prefix}pool"), &pool_shape()?, Some(pool)),
    }
}

pub fn connection_errors(
    registry: &TypeRegistry,
    prefix: &str,
    connection: Option<&Value>,
) -> Result<Vec<ValidationError>, SchemaError> {
    let variant = connection_variant()?;
    if registry.is_type_of(&variant)?.test(connection) {
        return Ok(Vec::new());
    }

    let path = format!("{prefix}connection");
    let object_shape = connection_object_shape()?;
    let file_shape = connection_file_shape();
    let variant = Descriptor::from(variant);

    let report = when::<Option<&Value>, Result<Vec<ValidationError>, SchemaError>>()
        .cond(might_be_connection_object, |v| {
            let mut errors = get_errors_at(registry, &path, &object_shape, *v)?;
            let object = v.and_then(Value::as_object);
            let addressed = object.is_some_and(|o| o.contains_key("host") || o.contains_key("socketPath"));
            // One of the two must be present; both are reported with their
            // declared field types.
            if !addressed {
                errors.push(construct_error(&format!("{path}.host"), optional_property(IP4_STRING)?, None));
                errors.push(construct_error(&format!("{path}.socketPath"), optional_property(PATH)?, None));
            }
            Ok(errors)
        })
        .cond(
            |v: &Option<&Value>| matches!(v, Some(Value::Object(_))),
            |v| get_errors_at(registry, &path, &file_shape, *v),
        )
        .cond(|_: &Option<&Value>| true, |v| get_errors_at(registry, &path, &variant, *v));

    report.match_value(&connection).unwrap_or_else(|| Ok(Vec::new()))
}

fn might_be_connection_object(value: &Option<&Value>) -> bool {
    value
        .and_then(Value::as_object)
        .is_some_and(|o| CONNECTION_OBJECT_KEYS.iter().any(|k| o.contains_key(*k)))
}

/// Human-readable report; empty when the value is valid.
pub fn error_message(registry: &TypeRegistry, value: &Value) -> Result<String, SchemaError> {
    let errors = constructor_errors(registry, value)?;
    if errors.is_empty() {
        return Ok(String::new());
    }
    Ok(format_message(value, &errors))
}

fn format_message(value: &Value, errors: &[ValidationError]) -> String {
    let received = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    let mut lines = vec![
        "constructor parameter was not the correct type".to_string(),
        String::new(),
        "object received:".to_string(),
        received,
        String::new(),
        "Below is a list of properties that failed validation.".to_string(),
        String::new(),
    ];
    for error in errors {
        lines.push(format!(
            "{}: {}",
            error.property_path,
            display_slot(error.actual_value.as_ref())
        ));
        lines.push(format!("Expected type: {}", error.expected_type));
    }
    lines.join("\n")
}

// ————————————————————————————————————————————————————————————————————————————
// DRIVER SEAM
// ————————————————————————————————————————————————————————————————————————————

/// The external driver constructor. It receives the configuration exactly as
/// the caller supplied it.
pub trait DriverFactory {
    type Handle;
    type Error: std::error::Error + Send + Sync + 'static;

    fn create(&self, config: &Value) -> Result<Self::Handle, Self::Error>;
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{message}")]
    Invalid { message: String, errors: Vec<ValidationError> },
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("driver rejected the configuration")]
    Driver(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub fn connect<F: DriverFactory>(
    registry: &TypeRegistry,
    factory: &F,
    config: &Value,
) -> Result<F::Handle, ConfigError> {
    let errors = constructor_errors(registry, config)?;
    if !errors.is_empty() {
        warn!(errors = errors.len(), "rejected connection configuration");
        return Err(ConfigError::Invalid { message: format_message(config, &errors), errors });
    }
    debug!("forwarding connection configuration to driver");
    factory.create(config).map_err(|err| ConfigError::Driver(Box::new(err)))
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use serde_json::json;

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::bootstrap().unwrap();
        register(&mut registry).unwrap();
        registry
    }

    fn paths(errors: &[ValidationError]) -> Vec<&str> {
        errors.iter().map(|e| e.property_path.as_str()).collect()
    }

    #[test]
    fn clients() {
        let r = registry();
        let is_client = r.is_type_of(CLIENTS).unwrap();
        for client in ALLOWED_CLIENTS {
            assert!(is_client.test_value(&json!(client)), "{client}");
        }
        assert!(!is_client.test_value(&json!("access")));
    }

    #[test]
    fn accepts_complete_parameters() {
        let r = registry();
        let param = json!({
            "client": "mysql",
            "connection": "some connection string",
            "searchPath": "some,path",
            "debug": false,
            "pool": {"min": 0, "max": 1000},
            "acquireConnectionTimeout": 100
        });
        assert!(constructor_errors(&r, &param).unwrap().is_empty());
        assert_eq!(error_message(&r, &param).unwrap(), "");
    }

    #[test]
    fn optional_fields_may_be_left_out() {
        let r = registry();
        let param = json!({"client": "oracle", "connection": "some connection string", "database": "x"});
        assert!(constructor_errors(&r, &param).unwrap().is_empty());

        let file = json!({"client": "sqlite3", "connection": {"filename": "./mydb.sqlite"}});
        assert!(constructor_errors(&r, &file).unwrap().is_empty());

        let object = json!({
            "client": "postgres",
            "connection": {"host": "127.0.0.1", "user": "app", "database": "main"}
        });
        assert!(constructor_errors(&r, &object).unwrap().is_empty());
    }

    #[test]
    fn reports_wrong_client() {
        let r = registry();
        let param = json!({"client": "access", "connection": "some connection string", "searchPath": "some,path"});
        let errors = constructor_errors(&r, &param).unwrap();
        assert_eq!(errors, vec![construct_error("constructorParameter.client", CLIENTS, Some(&json!("access")))]);

        let message = error_message(&r, &param).unwrap();
        assert!(message.starts_with("constructor parameter was not the correct type"));
        assert!(message.ends_with("constructorParameter.client: access\nExpected type: knexClients"));
    }

    #[test]
    fn reports_missing_connection() {
        let r = registry();
        let errors = constructor_errors(&r, &json!({"client": "mssql", "searchPath": "some,path"})).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].property_path, "constructorParameter.connection");
        assert_eq!(errors[0].expected_type, Descriptor::from(connection_variant().unwrap()));
        assert_eq!(errors[0].actual_value, None);
    }

    #[test]
    fn reports_empty_connection_string() {
        let r = registry();
        let errors = constructor_errors(&r, &json!({"client": "mssql", "connection": ""})).unwrap();
        assert_eq!(paths(&errors), vec!["constructorParameter.connection"]);
        assert_eq!(errors[0].actual_value, Some(json!("")));
    }

    #[test]
    fn reports_incomplete_connection_object() {
        let r = registry();
        let param = json!({"client": "mysql", "connection": {"user": "root"}});
        let errors = constructor_errors(&r, &param).unwrap();
        assert_eq!(
            paths(&errors),
            vec![
                "constructorParameter.connection.database",
                "constructorParameter.connection.host",
                "constructorParameter.connection.socketPath",
            ]
        );
        assert_eq!(errors[1].expected_type, Descriptor::from("variant<undefined; ip4String>"));
        assert_eq!(errors[2].expected_type, Descriptor::from("variant<undefined; path>"));
        assert_eq!(errors[1].actual_value, None);
    }

    #[test]
    fn reports_bad_host_and_file_objects() {
        let r = registry();
        let param = json!({
            "client": "mysql",
            "connection": {"host": "10.12.13", "user": "u", "password": "12345", "database": "d"}
        });
        let errors = constructor_errors(&r, &param).unwrap();
        assert_eq!(paths(&errors), vec!["constructorParameter.connection.host"]);

        let file = json!({"client": "sqlite3", "connection": {"filename": "mydb"}});
        let errors = constructor_errors(&r, &file).unwrap();
        assert_eq!(paths(&errors), vec!["constructorParameter.connection.filename"]);
    }

    #[test]
    fn reports_pool_after_fields() {
        let r = registry();
        let param = json!({"client": "db2", "connection": "x", "pool": {"min": -1, "max": 3}});
        let errors = constructor_errors(&r, &param).unwrap();
        assert_eq!(paths(&errors), vec!["constructorParameter.client", "constructorParameter.pool.min"]);
    }

    #[derive(Debug, Error)]
    #[error("refused")]
    struct Refused;

    struct Recording {
        seen: RefCell<Vec<Value>>,
        refuse: bool,
    }

    impl DriverFactory for Recording {
        type Handle = usize;
        type Error = Refused;

        fn create(&self, config: &Value) -> Result<usize, Refused> {
            if self.refuse {
                return Err(Refused);
            }
            self.seen.borrow_mut().push(config.clone());
            Ok(self.seen.borrow().len())
        }
    }

    #[test]
    fn connect_forwards_valid_configuration_untouched() {
        let r = registry();
        let factory = Recording { seen: RefCell::new(Vec::new()), refuse: false };
        let config = json!({"client": "postgres", "connection": "postgres://db", "extra": [1, 2]});
        assert_eq!(connect(&r, &factory, &config).unwrap(), 1);
        assert_eq!(factory.seen.borrow()[0], config);
    }

    #[test]
    fn connect_rejects_before_the_driver_sees_anything() {
        let r = registry();
        let factory = Recording { seen: RefCell::new(Vec::new()), refuse: false };
        let err = connect(&r, &factory, &json!({"client": "access", "connection": "x"})).unwrap_err();
        match err {
            ConfigError::Invalid { errors, message } => {
                assert_eq!(errors.len(), 1);
                assert!(message.contains("Expected type: knexClients"));
            }
            other => panic!("expected invalid config, got {other:?}"),
        }
        assert!(factory.seen.borrow().is_empty());

        let refusing = Recording { seen: RefCell::new(Vec::new()), refuse: true };
        let err = connect(&r, &refusing, &json!({"client": "mysql", "connection": "x"})).unwrap_err();
        assert!(matches!(err, ConfigError::Driver(_)));
    }
}

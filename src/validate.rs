//! Structural validation: walk a value against a descriptor and collect one
//! [`ValidationError`] per mismatching leaf.
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::SchemaError;
use crate::registry::TypeRegistry;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// Either a type name or an inline object shape.
///
/// Deserializes from a JSON string or a JSON object, keeping field order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Descriptor {
    Type(String),
    Shape(IndexMap<String, Descriptor>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    pub property_path: String,
    pub expected_type: Descriptor,
    #[serde(serialize_with = "serialize_slot")]
    pub actual_value: Option<Value>,
}

// ————————————————————————————————————————————————————————————————————————————
// DESCRIPTORS
// ————————————————————————————————————————————————————————————————————————————

impl Descriptor {
    pub fn shape<I, K, D>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, D)>,
        K: Into<String>,
        D: Into<Descriptor>,
    {
        Descriptor::Shape(fields.into_iter().map(|(k, d)| (k.into(), d.into())).collect())
    }
}

impl From<&str> for Descriptor {
    fn from(name: &str) -> Self {
        Descriptor::Type(name.to_string())
    }
}

impl From<String> for Descriptor {
    fn from(name: String) -> Self {
        Descriptor::Type(name)
    }
}

impl From<&String> for Descriptor {
    fn from(name: &String) -> Self {
        Descriptor::Type(name.clone())
    }
}

impl From<IndexMap<String, Descriptor>> for Descriptor {
    fn from(fields: IndexMap<String, Descriptor>) -> Self {
        Descriptor::Shape(fields)
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Descriptor::Type(name) => f.write_str(name),
            Descriptor::Shape(_) => {
                let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// VALIDATION
// ————————————————————————————————————————————————————————————————————————————

/// Two-argument form: the property path starts out empty.
pub fn get_errors(
    registry: &TypeRegistry,
    descriptor: &Descriptor,
    value: Option<&Value>,
) -> Result<Vec<ValidationError>, SchemaError> {
    get_errors_at(registry, "", descriptor, value)
}

/// Mismatches come back as records, in the descriptor's field order. Only a
/// descriptor naming an unknown type is an `Err`.
pub fn get_errors_at(
    registry: &TypeRegistry,
    property_path: &str,
    descriptor: &Descriptor,
    value: Option<&Value>,
) -> Result<Vec<ValidationError>, SchemaError> {
    let mut errors = Vec::new();
    collect_errors(registry, property_path, descriptor, value, &mut errors)?;
    Ok(errors)
}

fn collect_errors(
    registry: &TypeRegistry,
    property_path: &str,
    descriptor: &Descriptor,
    value: Option<&Value>,
    errors: &mut Vec<ValidationError>,
) -> Result<(), SchemaError> {
    match descriptor {
        Descriptor::Shape(fields) => {
            for (key, field) in fields {
                let child_path = format!("{property_path}.{key}");
                // Non-objects and absent parents read as undefined children.
                let child = value.and_then(|v| v.get(key));
                collect_errors(registry, &child_path, field, child, errors)?;
            }
        }
        Descriptor::Type(name) => {
            if !registry.is_type_of(name)?.test(value) {
                errors.push(construct_error(property_path, descriptor.clone(), value));
            }
        }
    }
    Ok(())
}

pub fn construct_error(
    property_path: &str,
    expected_type: impl Into<Descriptor>,
    value: Option<&Value>,
) -> ValidationError {
    ValidationError {
        property_path: property_path.to_string(),
        expected_type: expected_type.into(),
        actual_value: value.cloned(),
    }
}

/// Registry-bound convenience wrapper.
#[derive(Debug, Clone, Copy)]
pub struct Validator<'r> {
    registry: &'r TypeRegistry,
}

impl<'r> Validator<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self { registry }
    }

    pub fn errors(
        &self,
        descriptor: &Descriptor,
        value: Option<&Value>,
    ) -> Result<Vec<ValidationError>, SchemaError> {
        get_errors(self.registry, descriptor, value)
    }

    pub fn errors_at(
        &self,
        property_path: &str,
        descriptor: &Descriptor,
        value: Option<&Value>,
    ) -> Result<Vec<ValidationError>, SchemaError> {
        get_errors_at(self.registry, property_path, descriptor, value)
    }

    pub fn is_valid(&self, descriptor: &Descriptor, value: Option<&Value>) -> Result<bool, SchemaError> {
        Ok(self.errors(descriptor, value)?.is_empty())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// RENDERING
// ————————————————————————————————————————————————————————————————————————————

/// Display form of a slot: strings bare, absent as `undefined`, anything
/// else as compact JSON.
pub fn display_slot(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn serialize_slot<S: Serializer>(value: &Option<Value>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(value) => value.serialize(serializer),
        None => serializer.serialize_str("undefined"),
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: expected {} but got {}",
            self.property_path,
            self.expected_type,
            display_slot(self.actual_value.as_ref())
        )
    }
}

impl std::error::Error for ValidationError {}

/// One line per error.
pub fn render_errors(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n")
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————

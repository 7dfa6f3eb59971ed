//! Shared named types registered by [`TypeRegistry::bootstrap`].
use serde_json::Value;

use crate::error::SchemaError;
use crate::names::{array_of, formatted_string};
use crate::registry::TypeRegistry;

pub const REQUIRED_STRING: &str = "requiredString";
pub const PATH: &str = "path";
pub const DISTINCT_ITEM_ARRAY: &str = "distinctItemArray";
pub const IP4_FORMAT: &str = "ip4Format";
pub const OCTET: &str = "octet";
pub const IP4_STRING: &str = "ip4String";

/// Relative, drive-letter, scheme-prefixed or bare-prefix paths with at
/// least one `/segment`.
pub const PATH_PATTERN: &str = r"^((\.{0,2})|(\w:)|(\w{2,}:/)|([\w.]+))?(/[\w.]+)+/?$";

/// Rough shape only; octet ranges are checked separately.
pub const IP4_PATTERN: &str = r"(localhost)|(([0-2]?\d?\d)\.([0-2]?\d?\d)\.(\d?\d?\d)\.([0-2]?\d?\d))";

pub fn register(registry: &mut TypeRegistry) -> Result<(), SchemaError> {
    registry.register_primitive_subtype("string", REQUIRED_STRING, |v| {
        v.as_str().is_some_and(|s| !s.trim().is_empty())
    })?;
    registry.register_alias(PATH, &formatted_string(PATH_PATTERN)?)?;
    registry.register_primitive_subtype(&array_of(None)?, DISTINCT_ITEM_ARRAY, |v| {
        v.as_array().is_some_and(|items| !has_duplicates(items))
    })?;

    registry.register_alias(IP4_FORMAT, &formatted_string(IP4_PATTERN)?)?;
    registry.register_primitive_subtype("int", OCTET, |v| {
        v.as_f64().is_some_and(|n| (0.0..=255.0).contains(&n))
    })?;
    registry.register_primitive_subtype(IP4_FORMAT, IP4_STRING, |v| v.as_str().is_some_and(is_ip4))?;
    Ok(())
}

pub fn has_duplicates(items: &[Value]) -> bool {
    items.iter().enumerate().any(|(i, item)| items[..i].contains(item))
}

/// `localhost` or four dot-separated octets.
pub fn is_ip4(value: &str) -> bool {
    if value == "localhost" {
        return true;
    }
    let octets: Vec<&str> = value.split('.').collect();
    octets.len() == 4 && octets.iter().all(|o| o.parse::<u8>().is_ok())
}

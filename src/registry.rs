//! The type registry: names → predicates.
//!
//! Registration takes `&mut self` and happens while the schema is being
//! declared; afterwards the registry is shared as `&TypeRegistry` and only
//! read. Composite names (`array<..>`, `variant<..>`, ...) are never stored;
//! [`TypeRegistry::is_type_of`] derives their predicate from the parts.
//!
//! A value slot is `Option<&Value>`: `None` is the *undefined* value of an
//! absent field, which is not the same thing as JSON `null`.
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::SchemaError;
use crate::names::{CONSTRUCTORS, TypeExpr};
use crate::validate::{ValidationError, construct_error};

pub type SlotPredicate = Arc<dyn Fn(Option<&Value>) -> bool + Send + Sync>;
pub type Refinement = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// A type expression with its names checked and its patterns compiled.
#[derive(Debug, Clone)]
enum Compiled {
    Any,
    Named(String),
    Array(Option<Box<Compiled>>),
    Variant(Vec<Compiled>),
    Tuple(Vec<Compiled>),
    BoundedInt { min: i64, max: Option<i64> },
    Formatted(Regex),
    Optional(Box<Compiled>),
}

struct DuckField {
    expected: String,
    compiled: Compiled,
}

enum Entry {
    Primitive(SlotPredicate),
    /// The built-in `type`: a string naming a resolvable type.
    TypeExpression,
    Subtype { base: Compiled, refinement: Refinement },
    Alias(Compiled),
    Duck(IndexMap<String, DuckField>),
}

impl Entry {
    fn kind(&self) -> &'static str {
        match self {
            Entry::Primitive(_) | Entry::TypeExpression => "primitive",
            Entry::Subtype { .. } => "subtype",
            Entry::Alias(_) => "alias",
            Entry::Duck(_) => "duck type",
        }
    }
}

#[derive(Default)]
pub struct TypeRegistry {
    entries: IndexMap<String, Entry>,
}

/// The resolved predicate for one type name.
#[derive(Clone)]
pub struct TypePredicate<'r> {
    registry: &'r TypeRegistry,
    name: String,
    compiled: Compiled,
}

// ————————————————————————————————————————————————————————————————————————————
// REGISTRATION
// ————————————————————————————————————————————————————————————————————————————

impl TypeRegistry {
    /// An empty registry; not even the primitives are known.
    pub fn new() -> Self {
        Self::default()
    }

    /// Primitives plus the shared vocabulary (`requiredString`, `path`, ...).
    pub fn bootstrap() -> Result<Self, SchemaError> {
        let mut registry = Self::new();
        registry.register_builtins()?;
        crate::vocabulary::register(&mut registry)?;
        Ok(registry)
    }

    fn register_builtins(&mut self) -> Result<(), SchemaError> {
        self.register_primitive("undefined", |v| v.is_none())?;
        self.register_primitive("null", |v| matches!(v, Some(Value::Null)))?;
        self.register_primitive("string", |v| matches!(v, Some(Value::String(_))))?;
        self.register_primitive("number", |v| matches!(v, Some(Value::Number(_))))?;
        self.register_primitive("int", |v| v.and_then(as_integer).is_some())?;
        self.register_primitive("boolean", |v| matches!(v, Some(Value::Bool(_))))?;
        self.register_primitive("object", |v| matches!(v, Some(Value::Object(_))))?;
        // JSON data never carries callables.
        self.register_primitive("function", |_| false)?;
        self.insert("type".to_string(), Entry::TypeExpression)
    }

    /// Rejects reserved words, composite syntax and names already taken.
    fn claim(&self, name: &str) -> Result<(), SchemaError> {
        match TypeExpr::parse(name)? {
            TypeExpr::Named(parsed) if parsed == name && !CONSTRUCTORS.contains(&name) => {}
            _ => {
                return Err(SchemaError::argument(format!(
                    "`{name}` cannot be registered: it is reserved or composite"
                )));
            }
        }
        if self.entries.contains_key(name) {
            return Err(SchemaError::DuplicateType(name.to_string()));
        }
        Ok(())
    }

    fn insert(&mut self, name: String, entry: Entry) -> Result<(), SchemaError> {
        self.claim(&name)?;
        debug!(name = %name, kind = entry.kind(), "registered type");
        self.entries.insert(name, entry);
        Ok(())
    }

    pub fn register_primitive<F>(&mut self, name: &str, predicate: F) -> Result<(), SchemaError>
    where
        F: Fn(Option<&Value>) -> bool + Send + Sync + 'static,
    {
        self.insert(name.to_string(), Entry::Primitive(Arc::new(predicate)))
    }

    /// `name` holds when `base` holds and `refinement` accepts the value.
    /// The refinement only ever sees present values.
    pub fn register_primitive_subtype<F>(
        &mut self,
        base: &str,
        name: &str,
        refinement: F,
    ) -> Result<(), SchemaError>
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.claim(name)?;
        let base = TypeExpr::parse(base)
            .and_then(|expr| self.compile(&expr))
            .map_err(|err| match err {
                SchemaError::UnknownType(base) => SchemaError::UnknownBaseType {
                    base,
                    name: name.to_string(),
                },
                other => other,
            })?;
        self.insert(name.to_string(), Entry::Subtype { base, refinement: Arc::new(refinement) })
    }

    /// `name` becomes a pure rename of `expression`.
    pub fn register_alias(&mut self, name: &str, expression: &str) -> Result<(), SchemaError> {
        self.claim(name)?;
        let compiled = self.compile(&TypeExpr::parse(expression)?)?;
        self.insert(name.to_string(), Entry::Alias(compiled))
    }

    /// Structural record type. Every listed field must pass; extra fields on
    /// the value are ignored.
    pub fn register_duck_type<I, K, T>(&mut self, name: &str, shape: I) -> Result<(), SchemaError>
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: AsRef<str>,
    {
        self.claim(name)?;
        let mut fields = IndexMap::new();
        for (key, ty) in shape {
            let expr = TypeExpr::parse(ty.as_ref())?;
            let compiled = self.compile(&expr)?;
            fields.insert(key.into(), DuckField { expected: expr.to_string(), compiled });
        }
        self.insert(name.to_string(), Entry::Duck(fields))
    }

    // ————————————————————————————————————————————————————————————————————————
    // RESOLUTION
    // ————————————————————————————————————————————————————————————————————————

    pub fn is_type_of(&self, name: &str) -> Result<TypePredicate<'_>, SchemaError> {
        let expr = TypeExpr::parse(name)?;
        let compiled = self.compile(&expr)?;
        trace!(name, "resolved type");
        Ok(TypePredicate { registry: self, name: name.to_string(), compiled })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names with their kind, in registration order.
    pub fn names(&self) -> impl Iterator<Item = (&str, &'static str)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry.kind()))
    }

    /// Per-field errors of `value` against the duck type `name`, paths being
    /// the bare field names.
    pub fn report_duck_type_errors(
        &self,
        name: &str,
        value: Option<&Value>,
    ) -> Result<Vec<ValidationError>, SchemaError> {
        let fields = match self.entries.get(name) {
            Some(Entry::Duck(fields)) => fields,
            Some(_) => return Err(SchemaError::argument(format!("`{name}` is not a duck type"))),
            None => return Err(SchemaError::UnknownType(name.to_string())),
        };
        let object = value.and_then(Value::as_object);
        let errors = fields
            .iter()
            .filter_map(|(key, field)| {
                let slot = object.and_then(|o| o.get(key));
                (!self.eval(&field.compiled, slot))
                    .then(|| construct_error(key, field.expected.as_str(), slot))
            })
            .collect();
        Ok(errors)
    }

    fn compile(&self, expr: &TypeExpr) -> Result<Compiled, SchemaError> {
        let compiled = match expr {
            TypeExpr::Any => Compiled::Any,
            TypeExpr::Named(name) if self.entries.contains_key(name) => Compiled::Named(name.clone()),
            TypeExpr::Named(name) => return Err(SchemaError::UnknownType(name.clone())),
            TypeExpr::Array(None) => Compiled::Array(None),
            TypeExpr::Array(Some(inner)) => Compiled::Array(Some(Box::new(self.compile(inner)?))),
            TypeExpr::Variant(items) => Compiled::Variant(self.compile_all(items)?),
            TypeExpr::Tuple(items) => Compiled::Tuple(self.compile_all(items)?),
            TypeExpr::BoundedInt { min, max } => Compiled::BoundedInt { min: *min, max: *max },
            TypeExpr::FormattedString(pattern) => {
                let regex = Regex::new(pattern).map_err(|err| SchemaError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: err.to_string(),
                })?;
                Compiled::Formatted(regex)
            }
            TypeExpr::Optional(inner) => Compiled::Optional(Box::new(self.compile(inner)?)),
            // Function types name a contract; the value itself only has to be
            // a function.
            TypeExpr::Function { inputs, output } => {
                self.compile_all(inputs)?;
                self.compile(output)?;
                self.compile(&TypeExpr::Named("function".to_string()))?
            }
        };
        Ok(compiled)
    }

    fn compile_all(&self, items: &[TypeExpr]) -> Result<Vec<Compiled>, SchemaError> {
        items.iter().map(|item| self.compile(item)).collect()
    }

    // ————————————————————————————————————————————————————————————————————————
    // EVALUATION
    // ————————————————————————————————————————————————————————————————————————

    fn eval(&self, compiled: &Compiled, value: Option<&Value>) -> bool {
        match compiled {
            Compiled::Any => true,
            // Entries are never removed, so a compiled name always resolves.
            Compiled::Named(name) => self
                .entries
                .get(name)
                .is_some_and(|entry| self.eval_entry(entry, value)),
            Compiled::Array(item) => match value {
                Some(Value::Array(items)) => match item {
                    None => true,
                    Some(item) => items.iter().all(|v| self.eval(item, Some(v))),
                },
                _ => false,
            },
            Compiled::Variant(branches) => branches.iter().any(|b| self.eval(b, value)),
            Compiled::Tuple(slots) => match value {
                Some(Value::Array(items)) => {
                    items.len() == slots.len()
                        && slots.iter().zip(items).all(|(slot, v)| self.eval(slot, Some(v)))
                }
                _ => false,
            },
            Compiled::BoundedInt { min, max } => value.and_then(as_integer).is_some_and(|i| {
                i >= i128::from(*min) && max.is_none_or(|max| i <= i128::from(max))
            }),
            Compiled::Formatted(regex) => match value {
                Some(Value::String(s)) => regex.is_match(s),
                _ => false,
            },
            Compiled::Optional(inner) => value.is_none() || self.eval(inner, value),
        }
    }

    fn eval_entry(&self, entry: &Entry, value: Option<&Value>) -> bool {
        match entry {
            Entry::Primitive(predicate) => predicate(value),
            Entry::TypeExpression => match value {
                Some(Value::String(s)) => TypeExpr::parse(s).and_then(|e| self.compile(&e)).is_ok(),
                _ => false,
            },
            Entry::Subtype { base, refinement } => {
                self.eval(base, value) && value.is_some_and(|v| refinement(v))
            }
            Entry::Alias(target) => self.eval(target, value),
            Entry::Duck(fields) => match value {
                Some(Value::Object(object)) => fields
                    .iter()
                    .all(|(key, field)| self.eval(&field.compiled, object.get(key))),
                _ => false,
            },
        }
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.names()).finish()
    }
}

impl<'r> TypePredicate<'r> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn test(&self, value: Option<&Value>) -> bool {
        self.registry.eval(&self.compiled, value)
    }

    pub fn test_value(&self, value: &Value) -> bool {
        self.test(Some(value))
    }
}

impl fmt::Debug for TypePredicate<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypePredicate").field(&self.name).finish()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

/// Integral JSON numbers, including floats with no fractional part.
fn as_integer(value: &Value) -> Option<i128> {
    let Value::Number(n) = value else { return None };
    if let Some(i) = n.as_i64() {
        return Some(i.into());
    }
    if let Some(u) = n.as_u64() {
        return Some(u.into());
    }
    let f = n.as_f64()?;
    (f.is_finite() && f.fract() == 0.0).then(|| f as i128)
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————

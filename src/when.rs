//! Ordered first-match dispatch.
//!
//! ```
//! use typeshape::when::{Match, when_with};
//!
//! let by_length = when_with(|s: &str| s.len())
//!     .cond(|n: &usize| *n == 3, |s: &str| format!("three: {s}"))
//!     .cond(|_: &usize| true, |s: &str| format!("other: {s}"));
//!
//! assert_eq!(by_length.match_value("abc"), Match::Matched("three: abc".to_string()));
//! ```
//!
//! Conditions see the transformed input; handlers get the original. When no
//! condition holds the result is [`Match::NoMatch`], which is an ordinary
//! outcome rather than an error.
use std::fmt;

use serde_json::Value;
use tracing::{debug, trace};

use crate::error::SchemaError;
use crate::registry::{TypePredicate, TypeRegistry};

pub const NO_MATCH_WARNING: &str = "no condition was successful";

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Match<R> {
    Matched(R),
    NoMatch,
}

/// Something that can decide whether a (transformed) input is handled.
pub trait Condition<X: ?Sized> {
    fn holds(&self, value: &X) -> bool;
}

impl<X: ?Sized, F> Condition<X> for F
where
    F: Fn(&X) -> bool,
{
    fn holds(&self, value: &X) -> bool {
        self(value)
    }
}

/// Inputs a type-name condition can look at.
pub trait AsSlot {
    fn as_slot(&self) -> Option<&Value>;
}

impl AsSlot for Value {
    fn as_slot(&self) -> Option<&Value> {
        Some(self)
    }
}

impl AsSlot for Option<Value> {
    fn as_slot(&self) -> Option<&Value> {
        self.as_ref()
    }
}

impl AsSlot for Option<&Value> {
    fn as_slot(&self) -> Option<&Value> {
        *self
    }
}

impl<X: AsSlot + ?Sized> Condition<X> for TypePredicate<'_> {
    fn holds(&self, value: &X) -> bool {
        self.test(value.as_slot())
    }
}

struct ConditionEntry<'a, I: ?Sized, X, R> {
    condition: Box<dyn Condition<X> + 'a>,
    handler: Box<dyn Fn(&I) -> R + 'a>,
}

pub struct When<'a, I: ?Sized, X, R> {
    transform: Box<dyn Fn(&I) -> X + 'a>,
    conditions: Vec<ConditionEntry<'a, I, X, R>>,
}

// ————————————————————————————————————————————————————————————————————————————
// CONSTRUCTION
// ————————————————————————————————————————————————————————————————————————————

/// A dispatcher that matches on the input itself.
pub fn when<'a, I, R>() -> When<'a, I, I, R>
where
    I: Clone + 'a,
{
    when_with(I::clone)
}

/// A dispatcher whose conditions see `transform(input)`.
pub fn when_with<'a, I, X, R>(transform: impl Fn(&I) -> X + 'a) -> When<'a, I, X, R>
where
    I: ?Sized,
{
    When { transform: Box::new(transform), conditions: Vec::new() }
}

impl<'a, I: ?Sized, X, R> When<'a, I, X, R> {
    pub fn cond<C, H>(mut self, condition: C, handler: H) -> Self
    where
        C: Condition<X> + 'a,
        H: Fn(&I) -> R + 'a,
    {
        self.conditions.push(ConditionEntry {
            condition: Box::new(condition),
            handler: Box::new(handler),
        });
        self
    }

    /// Condition given as a type name, resolved through `registry` now.
    pub fn cond_type<H>(self, registry: &'a TypeRegistry, name: &str, handler: H) -> Result<Self, SchemaError>
    where
        X: AsSlot,
        H: Fn(&I) -> R + 'a,
    {
        let predicate = registry.is_type_of(name)?;
        Ok(self.cond(predicate, handler))
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Transform once, then run the handler of the first condition that holds.
    pub fn match_value(&self, input: &I) -> Match<R> {
        let transformed = (self.transform)(input);
        for (index, entry) in self.conditions.iter().enumerate() {
            if entry.condition.holds(&transformed) {
                trace!(index, "condition matched");
                return Match::Matched((entry.handler)(input));
            }
        }
        debug!(conditions = self.conditions.len(), "{NO_MATCH_WARNING}");
        Match::NoMatch
    }
}

impl<I: ?Sized, X, R> fmt::Debug for When<'_, I, X, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("When").field("conditions", &self.conditions.len()).finish()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// OUTCOMES
// ————————————————————————————————————————————————————————————————————————————

impl<R> Match<R> {
    pub fn is_matched(&self) -> bool {
        matches!(self, Match::Matched(_))
    }

    pub fn into_option(self) -> Option<R> {
        match self {
            Match::Matched(r) => Some(r),
            Match::NoMatch => None,
        }
    }

    pub fn unwrap_or_else(self, fallback: impl FnOnce() -> R) -> R {
        self.into_option().unwrap_or_else(fallback)
    }

    pub fn map<T>(self, f: impl FnOnce(R) -> T) -> Match<T> {
        match self {
            Match::Matched(r) => Match::Matched(f(r)),
            Match::NoMatch => Match::NoMatch,
        }
    }
}

impl<R: fmt::Display> fmt::Display for Match<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Match::Matched(r) => r.fmt(f),
            Match::NoMatch => f.write_str(NO_MATCH_WARNING),
        }
    }
}

/// Loose truthiness, for conditions derived from a computed value.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————

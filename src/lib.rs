//! Runtime structural types for JSON data.
//!
//! Types are named by strings (`int`, `array<string>`, `boundedInt<0;10>`,
//! ...). A [`TypeRegistry`] turns names into predicates, [`validate`] walks
//! values against nested descriptors and reports every mismatching leaf, and
//! [`when`] offers ordered first-match dispatch on top of both.
pub mod connection;
pub mod enforce;
pub mod error;
pub mod names;
pub mod registry;
pub mod validate;
pub mod vocabulary;
pub mod when;

pub use enforce::{EnforceError, Enforced, enforce};
pub use error::SchemaError;
pub use names::TypeExpr;
pub use registry::{TypePredicate, TypeRegistry};
pub use validate::{Descriptor, ValidationError, Validator, construct_error, get_errors, get_errors_at};
pub use when::{Match, when, when_with};

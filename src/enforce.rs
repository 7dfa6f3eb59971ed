//! Checked calls against a function type name.
//!
//! A name such as `int, [string] => boolean` only documents a contract.
//! [`enforce`] wraps a closure so that every call checks the arguments and the
//! return value against it.
use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::error::SchemaError;
use crate::names::TypeExpr;
use crate::registry::{TypePredicate, TypeRegistry};
use crate::validate::{ValidationError, construct_error, render_errors};

#[derive(Debug, Error)]
pub enum EnforceError {
    #[error("`{signature}` takes {required} to {accepted} arguments, got {given}")]
    Arity { signature: String, required: usize, accepted: usize, given: usize },
    #[error("arguments do not match `{signature}`:\n{}", render_errors(.errors))]
    Input { signature: String, errors: Vec<ValidationError> },
    #[error("return value does not match `{signature}`: {error}")]
    Output { signature: String, error: ValidationError },
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

pub struct Enforced<'r, F> {
    signature: String,
    inputs: Vec<TypePredicate<'r>>,
    required: usize,
    output: TypePredicate<'r>,
    f: F,
}

pub fn enforce<'r, F>(registry: &'r TypeRegistry, signature: &str, f: F) -> Result<Enforced<'r, F>, SchemaError>
where
    F: Fn(&[Value]) -> Value,
{
    let TypeExpr::Function { inputs, output } = TypeExpr::parse(signature)? else {
        return Err(SchemaError::argument(format!("`{signature}` is not a function type")));
    };
    // Trailing `[T]` parameters may be left out.
    let required = inputs
        .iter()
        .rposition(|input| !matches!(input, TypeExpr::Optional(_)))
        .map_or(0, |last| last + 1);
    let inputs = inputs
        .iter()
        .map(|input| registry.is_type_of(&input.to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    let output = registry.is_type_of(&output.to_string())?;
    Ok(Enforced { signature: signature.to_string(), inputs, required, output, f })
}

impl<F> Enforced<'_, F>
where
    F: Fn(&[Value]) -> Value,
{
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, EnforceError> {
        let given = args.len();
        if given < self.required || given > self.inputs.len() {
            return Err(EnforceError::Arity {
                signature: self.signature.clone(),
                required: self.required,
                accepted: self.inputs.len(),
                given,
            });
        }

        let errors: Vec<ValidationError> = self
            .inputs
            .iter()
            .enumerate()
            .filter_map(|(i, input)| {
                let slot = args.get(i);
                (!input.test(slot)).then(|| construct_error(&format!("arguments[{i}]"), input.name(), slot))
            })
            .collect();
        if !errors.is_empty() {
            return Err(EnforceError::Input { signature: self.signature.clone(), errors });
        }

        let result = (self.f)(args);
        if !self.output.test_value(&result) {
            return Err(EnforceError::Output {
                signature: self.signature.clone(),
                error: construct_error("return", self.output.name(), Some(&result)),
            });
        }
        Ok(result)
    }
}

impl<F> fmt::Debug for Enforced<'_, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Enforced").field("signature", &self.signature).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> TypeRegistry {
        TypeRegistry::bootstrap().unwrap()
    }

    #[test]
    fn checks_arguments_and_result() {
        let r = registry();
        let add = enforce(&r, "int, int => int", |args| {
            json!(args[0].as_i64().unwrap_or(0) + args[1].as_i64().unwrap_or(0))
        })
        .unwrap();
        assert_eq!(add.call(&[json!(2), json!(3)]).unwrap(), json!(5));

        match add.call(&[json!(2), json!("3")]).unwrap_err() {
            EnforceError::Input { errors, .. } => {
                assert_eq!(errors, vec![construct_error("arguments[1]", "int", Some(&json!("3")))]);
            }
            other => panic!("expected input error, got {other:?}"),
        }
        assert!(matches!(add.call(&[json!(1)]), Err(EnforceError::Arity { given: 1, .. })));
        assert!(matches!(add.call(&[json!(1), json!(2), json!(3)]), Err(EnforceError::Arity { .. })));
    }

    #[test]
    fn trailing_optional_parameters() {
        let r = registry();
        let bounded = enforce(&r, "int, [int] => string", |args| json!(format!("{}", args.len()))).unwrap();
        assert_eq!(bounded.call(&[json!(0)]).unwrap(), json!("1"));
        assert_eq!(bounded.call(&[json!(0), json!(100)]).unwrap(), json!("2"));
        assert!(bounded.call(&[json!(0), json!("x")]).is_err());
    }

    #[test]
    fn checks_the_return_value() {
        let r = registry();
        let liar = enforce(&r, "* => string", |_| json!(42)).unwrap();
        let err = liar.call(&[json!(null)]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "return value does not match `* => string`: return: expected string but got 42"
        );
    }

    #[test]
    fn nullary_signatures() {
        let r = registry();
        let answer = enforce(&r, "=> int", |_| json!(42)).unwrap();
        assert_eq!(answer.call(&[]).unwrap(), json!(42));
        assert!(matches!(answer.call(&[json!(1)]), Err(EnforceError::Arity { given: 1, accepted: 0, .. })));
    }

    #[test]
    fn rejects_non_function_signatures() {
        let r = registry();
        assert!(matches!(enforce(&r, "int", |_| Value::Null), Err(SchemaError::Argument(_))));
        assert!(matches!(enforce(&r, "nope => int", |_| Value::Null), Err(SchemaError::UnknownType(_))));
    }
}

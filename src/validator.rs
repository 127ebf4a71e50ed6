//! The optional AST-validation gate (component H, validator half).

use crate::ast::Program;
use crate::error::InterpreterError;

/// `(Program) -> bool`. `Ok(false)` rejects the program with
/// `ValidationError` before any evaluation runs; `Err` bubbles the
/// validator's own error out directly, matching "a validator that throws
/// bubbles its error out directly" — a validator that panics is simply
/// allowed to panic, since Rust has no catch/throw duality to preserve
/// here.
pub type Validator = dyn Fn(&Program) -> Result<bool, InterpreterError>;

/// Runs `validator` (if present) against `program`, turning a `false`
/// result into `ValidationError`.
pub fn validate(validator: Option<&Validator>, program: &Program) -> Result<(), InterpreterError> {
    let Some(validator) = validator else {
        return Ok(());
    };
    if validator(program)? {
        Ok(())
    } else {
        Err(InterpreterError::Validation(crate::error::ValidationError {
            message: "program rejected by validator".to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn false_result_becomes_validation_error() {
        let always_false: &Validator = &|_program| Ok(false);
        let err = validate(Some(always_false), &Program::default()).unwrap_err();
        assert_eq!(err.kind_name(), "ValidationError");
    }

    #[test]
    fn no_validator_passes() {
        assert!(validate(None, &Program::default()).is_ok());
    }
}

//! Pure `Value`-level operator semantics shared by `Binary`/`Logical`/
//! `Unary`/`Update` expressions and their compound-assignment counterparts.
//!
//! Nothing here touches scope, the host boundary, or control flow — every
//! function is a total function from operands to a `Value` or a `TypeError`,
//! which is why this lives apart from `mod.rs`'s dispatch.

use crate::ast::{BinaryOp, UnaryOp, UpdateOp};
use crate::error::{CodeLoc, InterpreterError};
use crate::value::Value;

/// `+ - * / % **` plus the relational/equality/bitwise operators. `In` and
/// `Instanceof` are handled by `evaluator::mod` directly since they need
/// object/class lookups this module has no access to.
pub fn apply_binary(op: BinaryOp, left: &Value, right: &Value, loc: CodeLoc) -> Result<Value, InterpreterError> {
    use BinaryOp as B;
    Ok(match op {
        B::Add => {
            if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
                Value::string(format!("{}{}", left.to_js_string(), right.to_js_string()))
            } else {
                Value::Number(left.to_number() + right.to_number())
            }
        }
        B::Sub => Value::Number(left.to_number() - right.to_number()),
        B::Mul => Value::Number(left.to_number() * right.to_number()),
        B::Div => Value::Number(left.to_number() / right.to_number()),
        B::Mod => Value::Number(left.to_number() % right.to_number()),
        B::Pow => Value::Number(left.to_number().powf(right.to_number())),
        B::Eq => Value::Boolean(left.loose_equals(right)),
        B::NotEq => Value::Boolean(!left.loose_equals(right)),
        B::StrictEq => Value::Boolean(left.strict_equals(right)),
        B::StrictNotEq => Value::Boolean(!left.strict_equals(right)),
        B::Lt => relational(left, right, |o| o == std::cmp::Ordering::Less),
        B::Gt => relational(left, right, |o| o == std::cmp::Ordering::Greater),
        B::Le => relational(left, right, |o| o != std::cmp::Ordering::Greater),
        B::Ge => relational(left, right, |o| o != std::cmp::Ordering::Less),
        B::BitAnd => Value::Number(f64::from(left.to_int32() & right.to_int32())),
        B::BitOr => Value::Number(f64::from(left.to_int32() | right.to_int32())),
        B::BitXor => Value::Number(f64::from(left.to_int32() ^ right.to_int32())),
        B::Shl => Value::Number(f64::from(left.to_int32().wrapping_shl(right.to_uint32() & 31))),
        B::Shr => Value::Number(f64::from(left.to_int32().wrapping_shr(right.to_uint32() & 31))),
        B::UShr => Value::Number(f64::from(left.to_uint32().wrapping_shr(right.to_uint32() & 31))),
        B::In | B::Instanceof => {
            let _ = loc;
            unreachable!("In/Instanceof are dispatched by evaluator::mod, not operators::apply_binary")
        }
    })
}

/// `<`/`>`/`<=`/`>=`: string-vs-string compares lexicographically, anything
/// else coerces both sides with `ToNumber` (`NaN` makes every relational
/// comparison `false`, matching the abstract relational comparison
/// algorithm's "undefined" result).
fn relational(left: &Value, right: &Value, accept: impl Fn(std::cmp::Ordering) -> bool) -> Value {
    if let (Value::String(a), Value::String(b)) = (left, right) {
        return Value::Boolean(accept(a.as_ref().cmp(b.as_ref())));
    }
    let (a, b) = (left.to_number(), right.to_number());
    match a.partial_cmp(&b) {
        Some(ord) => Value::Boolean(accept(ord)),
        None => Value::Boolean(false),
    }
}

/// `! ~ + - typeof void`. `delete` is handled by `evaluator::mod` since it
/// needs the argument's member-expression shape, not just its value.
pub fn apply_unary(op: UnaryOp, value: &Value, loc: CodeLoc) -> Result<Value, InterpreterError> {
    Ok(match op {
        UnaryOp::Plus => Value::Number(value.to_number()),
        UnaryOp::Minus => Value::Number(-value.to_number()),
        UnaryOp::Not => Value::Boolean(!value.is_truthy()),
        UnaryOp::BitNot => Value::Number(f64::from(!value.to_int32())),
        UnaryOp::Typeof => Value::string(value.typeof_str()),
        UnaryOp::Void => Value::Undefined,
        UnaryOp::Delete => {
            let _ = loc;
            unreachable!("delete is dispatched by evaluator::mod, not operators::apply_unary")
        }
    })
}

/// `++`/`--`: always numeric, regardless of the operand's static type.
#[must_use]
pub fn apply_update(op: UpdateOp, old_value: &Value) -> Value {
    let n = old_value.to_number();
    Value::Number(match op {
        UpdateOp::Increment => n + 1.0,
        UpdateOp::Decrement => n - 1.0,
    })
}

/// The binary operator a compound-assignment operator (`+=`, `&&=`, ...)
/// reduces to, or `None` for the three logical-assignment forms and plain
/// `=`, which short-circuit and so can't be expressed as "compute a binary
/// op, then assign" (`evaluator::mod` handles those directly).
#[must_use]
pub fn as_binary_op(op: crate::ast::AssignOp) -> Option<BinaryOp> {
    use crate::ast::AssignOp as A;
    Some(match op {
        A::Add => BinaryOp::Add,
        A::Sub => BinaryOp::Sub,
        A::Mul => BinaryOp::Mul,
        A::Div => BinaryOp::Div,
        A::Mod => BinaryOp::Mod,
        A::Pow => BinaryOp::Pow,
        A::Shl => BinaryOp::Shl,
        A::Shr => BinaryOp::Shr,
        A::UShr => BinaryOp::UShr,
        A::BitAnd => BinaryOp::BitAnd,
        A::BitOr => BinaryOp::BitOr,
        A::BitXor => BinaryOp::BitXor,
        A::Assign | A::And | A::Or | A::Nullish => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_concatenates_when_either_side_is_string() {
        let result = apply_binary(BinaryOp::Add, &Value::Number(1.0), &Value::string("x"), CodeLoc::UNKNOWN).unwrap();
        assert_eq!(result.to_js_string().as_ref(), "1x");
    }

    #[test]
    fn shr_is_arithmetic_shift() {
        let result = apply_binary(BinaryOp::Shr, &Value::Number(-8.0), &Value::Number(1.0), CodeLoc::UNKNOWN).unwrap();
        assert_eq!(result.to_number(), -4.0);
    }

    #[test]
    fn relational_with_nan_is_always_false() {
        let result = apply_binary(BinaryOp::Lt, &Value::Number(f64::NAN), &Value::Number(1.0), CodeLoc::UNKNOWN).unwrap();
        assert!(!result.is_truthy());
    }
}

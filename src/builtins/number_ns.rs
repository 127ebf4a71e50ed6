//! `Number` as both a conversion function (`Number(value)`) and a namespace
//! (`Number.isInteger`/`parseInt`/... plus its constant properties), the same
//! `call` + `static_methods`/`get_own` split `builtins::promise` uses for
//! `Promise`.

use std::rc::Rc;

use crate::security::{CallableKind, CallableTarget, HostCallCtx, HostKind, HostObject, HostResult};
use crate::value::Value;

/// `radix` of `None` means "unspecified" — JS then auto-detects a `0x`/`0X`
/// prefix as hex and otherwise falls back to 10, matching `Number.parseInt`'s
/// `R` handling (an *explicit* non-16 radix never strips a `0x` prefix).
fn parse_int(text: &str, radix: Option<u32>) -> f64 {
    let trimmed = text.trim();
    let (sign, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let auto_hex = matches!(radix, None | Some(16));
    let (digits, radix) = if auto_hex {
        rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")).map_or((rest, radix.unwrap_or(10)), |hex| (hex, 16))
    } else {
        (rest, radix.unwrap_or(10))
    };
    let end = digits.find(|c: char| !c.is_digit(radix)).unwrap_or(digits.len());
    if end == 0 {
        return f64::NAN;
    }
    i64::from_str_radix(&digits[..end], radix).map_or(f64::NAN, |n| sign * n as f64)
}

fn parse_float(text: &str) -> f64 {
    let trimmed = text.trim();
    let end = {
        let mut seen_dot = false;
        let mut seen_e = false;
        let mut idx = 0;
        for (i, c) in trimmed.char_indices() {
            let ok = c.is_ascii_digit()
                || (i == 0 && (c == '-' || c == '+'))
                || (c == '.' && !seen_dot && !seen_e)
                || (c == 'e' || c == 'E') && !seen_e && i > 0
                || ((c == '-' || c == '+') && i > 0 && matches!(trimmed.as_bytes().get(i - 1), Some(b'e' | b'E')));
            if !ok {
                break;
            }
            if c == '.' {
                seen_dot = true;
            }
            if c == 'e' || c == 'E' {
                seen_e = true;
            }
            idx = i + c.len_utf8();
        }
        idx
    };
    trimmed[..end].parse::<f64>().unwrap_or(f64::NAN)
}

struct NumberConstructor;

impl NumberConstructor {
    const STATICS: &'static [&'static str] = &["isInteger", "isFinite", "isNaN", "isSafeInteger", "parseInt", "parseFloat"];
}

impl HostObject for NumberConstructor {
    fn kind(&self) -> HostKind {
        HostKind::Function
    }

    fn get_own(&self, name: &str) -> Option<HostResult> {
        let value = match name {
            "MAX_SAFE_INTEGER" => 9_007_199_254_740_991.0,
            "MIN_SAFE_INTEGER" => -9_007_199_254_740_991.0,
            "MAX_VALUE" => f64::MAX,
            "MIN_VALUE" => f64::MIN_POSITIVE,
            "EPSILON" => f64::EPSILON,
            "POSITIVE_INFINITY" => f64::INFINITY,
            "NEGATIVE_INFINITY" => f64::NEG_INFINITY,
            "NaN" => f64::NAN,
            _ => return None,
        };
        Some(HostResult::Scalar(Value::Number(value)))
    }

    fn static_methods(&self) -> &'static [&'static str] {
        Self::STATICS
    }

    fn invoke(&self, name: &str, args: Vec<Value>, ctx: &dyn HostCallCtx) -> Result<HostResult, String> {
        let _ = ctx;
        match name {
            "isInteger" => Ok(HostResult::Scalar(Value::Boolean(matches!(args.first(), Some(Value::Number(n)) if n.is_finite() && n.fract() == 0.0)))),
            "isFinite" => Ok(HostResult::Scalar(Value::Boolean(matches!(args.first(), Some(Value::Number(n)) if n.is_finite())))),
            "isNaN" => Ok(HostResult::Scalar(Value::Boolean(matches!(args.first(), Some(Value::Number(n)) if n.is_nan())))),
            "isSafeInteger" => {
                let safe = matches!(args.first(), Some(Value::Number(n)) if n.is_finite() && n.fract() == 0.0 && n.abs() <= 9_007_199_254_740_991.0);
                Ok(HostResult::Scalar(Value::Boolean(safe)))
            }
            "parseInt" => {
                let text = args.first().map(Value::to_js_string).unwrap_or_else(|| "".into());
                let radix = args.get(1).map(Value::to_number).filter(|r| *r >= 2.0 && *r <= 36.0).map(|r| r as u32);
                Ok(HostResult::Scalar(Value::Number(parse_int(&text, radix))))
            }
            "parseFloat" => {
                let text = args.first().map(Value::to_js_string).unwrap_or_else(|| "".into());
                Ok(HostResult::Scalar(Value::Number(parse_float(&text))))
            }
            _ => Err(format!("'{name}' is not a function")),
        }
    }

    fn call(&self, args: Vec<Value>, ctx: &dyn HostCallCtx) -> Result<HostResult, String> {
        let _ = ctx;
        Ok(HostResult::Scalar(Value::Number(args.first().map_or(0.0, Value::to_number))))
    }
}

#[must_use]
pub fn namespace() -> Value {
    Value::HostCallable(Rc::new(crate::security::HostCallable {
        kind: CallableKind::Function,
        name: "Number".to_string(),
        arity: Some(1),
        target: CallableTarget::Standalone(Rc::new(NumberConstructor)),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_int_handles_hex_prefix() {
        assert_eq!(parse_int("0x1F", None), 31.0);
        assert_eq!(parse_int("  -42abc", None), -42.0);
        assert!(parse_int("xyz", None).is_nan());
        assert_eq!(parse_int("10", Some(2)), 2.0);
    }
}

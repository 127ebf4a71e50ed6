//! In-engine implementations of the native array/string methods reachable on
//! **sandbox-authored** arrays and strings.
//!
//! Sandbox objects have no prototype chain (see `class.rs`'s module doc), so
//! there is no `Array.prototype`/`String.prototype` to dispatch through —
//! these methods are implemented directly against `Value::Array`/
//! `Value::String`, using the same name vocabulary as
//! `security::allow_list_for` for the host-proxied equivalents, since both
//! describe "what a reasonable JS array/string can do" rather than two
//! independent designs.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{CodeLoc, InterpreterError};
use crate::value::Value;

use super::{EvalContext, EvalResult, Flow};

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

fn type_err<T>(message: impl Into<String>, loc: CodeLoc) -> EvalResult<T> {
    Err(Flow::Error(InterpreterError::type_error(message, loc)))
}

/// `true` if `name` is one of the methods this module knows how to dispatch
/// for the given value kind — used by `evaluator::mod`'s call-expression
/// handling to decide whether a `Member` callee should go through here
/// instead of through ordinary property read + call.
#[must_use]
pub fn is_array_method(name: &str) -> bool {
    matches!(
        name,
        "push" | "pop" | "shift" | "unshift" | "slice" | "concat" | "join" | "indexOf" | "lastIndexOf" | "includes"
            | "reverse" | "sort" | "map" | "filter" | "reduce" | "reduceRight" | "forEach" | "every" | "some" | "find"
            | "findIndex" | "findLast" | "findLastIndex" | "flat" | "flatMap" | "at" | "fill" | "splice"
            | "copyWithin" | "toReversed" | "toSorted" | "toSpliced" | "with"
    )
}

#[must_use]
pub fn is_string_method(name: &str) -> bool {
    matches!(
        name,
        "at" | "charAt" | "charCodeAt" | "codePointAt" | "concat" | "includes" | "indexOf" | "lastIndexOf" | "slice"
            | "substring" | "substr" | "toLowerCase" | "toUpperCase" | "trim" | "trimStart" | "trimEnd" | "split"
            | "replace" | "replaceAll" | "startsWith" | "endsWith" | "padStart" | "padEnd" | "repeat" | "localeCompare"
    )
}

fn normalize_index(i: f64, len: usize) -> usize {
    if i < 0.0 {
        (len as f64 + i).max(0.0) as usize
    } else {
        (i as usize).min(len)
    }
}

pub fn call_array_method(
    arr: &Rc<RefCell<Vec<Value>>>,
    name: &str,
    args: &[Value],
    loc: CodeLoc,
    ctx: &EvalContext,
) -> EvalResult<Value> {
    let this = Value::Array(arr.clone());
    match name {
        "push" => {
            arr.borrow_mut().extend(args.iter().cloned());
            Ok(Value::Number(arr.borrow().len() as f64))
        }
        "pop" => Ok(arr.borrow_mut().pop().unwrap_or(Value::Undefined)),
        "shift" => {
            let mut a = arr.borrow_mut();
            if a.is_empty() { Ok(Value::Undefined) } else { Ok(a.remove(0)) }
        }
        "unshift" => {
            let mut a = arr.borrow_mut();
            for (offset, v) in args.iter().cloned().enumerate() {
                a.insert(offset, v);
            }
            Ok(Value::Number(a.len() as f64))
        }
        "slice" => {
            let a = arr.borrow();
            let len = a.len();
            let start = normalize_index(arg(args, 0).to_number_or(0.0), len);
            let end = if matches!(arg(args, 1), Value::Undefined) { len } else { normalize_index(arg(args, 1).to_number_or(0.0), len) };
            Ok(Value::array(if start < end { a[start..end].to_vec() } else { Vec::new() }))
        }
        "concat" => {
            let mut out = arr.borrow().clone();
            for a in args {
                match a {
                    Value::Array(other) => out.extend(other.borrow().iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Ok(Value::array(out))
        }
        "join" => {
            let sep = if matches!(arg(args, 0), Value::Undefined) { ",".to_string() } else { arg(args, 0).to_js_string().to_string() };
            let parts: Vec<String> = arr
                .borrow()
                .iter()
                .map(|v| if matches!(v, Value::Undefined | Value::Null) { String::new() } else { v.to_js_string().to_string() })
                .collect();
            Ok(Value::string(parts.join(&sep)))
        }
        "indexOf" => {
            let needle = arg(args, 0);
            Ok(Value::Number(arr.borrow().iter().position(|v| v.strict_equals(&needle)).map_or(-1.0, |i| i as f64)))
        }
        "lastIndexOf" => {
            let needle = arg(args, 0);
            Ok(Value::Number(arr.borrow().iter().rposition(|v| v.strict_equals(&needle)).map_or(-1.0, |i| i as f64)))
        }
        "includes" => {
            let needle = arg(args, 0);
            Ok(Value::Boolean(arr.borrow().iter().any(|v| v.strict_equals(&needle) || (v.to_number().is_nan() && needle.to_number().is_nan() && matches!((v, &needle), (Value::Number(_), Value::Number(_)))))))
        }
        "reverse" => {
            arr.borrow_mut().reverse();
            Ok(this)
        }
        "at" => {
            let a = arr.borrow();
            let i = arg(args, 0).to_number_or(0.0);
            let idx = if i < 0.0 { a.len() as f64 + i } else { i };
            Ok(if idx >= 0.0 && (idx as usize) < a.len() { a[idx as usize].clone() } else { Value::Undefined })
        }
        "fill" => {
            let mut a = arr.borrow_mut();
            let len = a.len();
            let value = arg(args, 0);
            let start = if args.len() > 1 { normalize_index(arg(args, 1).to_number_or(0.0), len) } else { 0 };
            let end = if args.len() > 2 { normalize_index(arg(args, 2).to_number_or(0.0), len) } else { len };
            for slot in a.iter_mut().take(end).skip(start) {
                *slot = value.clone();
            }
            drop(a);
            Ok(this)
        }
        "splice" => {
            let mut a = arr.borrow_mut();
            let len = a.len();
            let start = normalize_index(arg(args, 0).to_number_or(0.0), len);
            let delete_count = if args.len() > 1 { (arg(args, 1).to_number_or(0.0).max(0.0) as usize).min(len - start) } else { len - start };
            let removed: Vec<Value> = a.splice(start..start + delete_count, args.iter().skip(2).cloned()).collect();
            Ok(Value::array(removed))
        }
        "copyWithin" => {
            let mut a = arr.borrow_mut();
            let len = a.len();
            let target = normalize_index(arg(args, 0).to_number_or(0.0), len);
            let start = if args.len() > 1 { normalize_index(arg(args, 1).to_number_or(0.0), len) } else { 0 };
            let end = if args.len() > 2 { normalize_index(arg(args, 2).to_number_or(0.0), len) } else { len };
            let slice: Vec<Value> = a[start..end].to_vec();
            for (offset, v) in slice.into_iter().enumerate() {
                if target + offset >= len {
                    break;
                }
                a[target + offset] = v;
            }
            drop(a);
            Ok(this)
        }
        "toReversed" => {
            let mut copy = arr.borrow().clone();
            copy.reverse();
            Ok(Value::array(copy))
        }
        "with" => {
            let mut copy = arr.borrow().clone();
            let len = copy.len();
            let i = arg(args, 0).to_number_or(0.0);
            let idx = if i < 0.0 { len as f64 + i } else { i };
            if idx < 0.0 || idx as usize >= len {
                return type_err("invalid index", loc);
            }
            copy[idx as usize] = arg(args, 1);
            Ok(Value::array(copy))
        }
        "flat" => {
            let depth = if matches!(arg(args, 0), Value::Undefined) { 1 } else { arg(args, 0).to_number_or(1.0) as i64 };
            Ok(Value::array(flatten(&arr.borrow(), depth)))
        }
        "sort" | "map" | "filter" | "reduce" | "reduceRight" | "forEach" | "every" | "some" | "find" | "findIndex"
        | "findLast" | "findLastIndex" | "flatMap" | "toSorted" | "toSpliced" => call_array_callback_method(arr, name, args, loc, ctx),
        other => type_err(format!("'{other}' is not a function"), loc),
    }
}

fn flatten(items: &[Value], depth: i64) -> Vec<Value> {
    let mut out = Vec::new();
    for item in items {
        match item {
            Value::Array(inner) if depth > 0 => out.extend(flatten(&inner.borrow(), depth - 1)),
            other => out.push(other.clone()),
        }
    }
    out
}

/// The subset of array methods that invoke a sandbox callback, split out so
/// the straight-line data-manipulation methods above stay easy to scan.
fn call_array_callback_method(arr: &Rc<RefCell<Vec<Value>>>, name: &str, args: &[Value], loc: CodeLoc, ctx: &EvalContext) -> EvalResult<Value> {
    let this_arr = Value::Array(arr.clone());
    let callback = arg(args, 0);
    let callback_this = arg(args, 1);
    let call = |value: Value, index: usize, ctx: &EvalContext| -> EvalResult<Value> {
        super::call_value(&callback, callback_this.clone(), vec![value, Value::Number(index as f64), this_arr.clone()], loc, ctx)
    };
    match name {
        "forEach" => {
            let items = arr.borrow().clone();
            for (i, v) in items.into_iter().enumerate() {
                call(v, i, ctx)?;
            }
            Ok(Value::Undefined)
        }
        "map" => {
            let items = arr.borrow().clone();
            let mut out = Vec::with_capacity(items.len());
            for (i, v) in items.into_iter().enumerate() {
                out.push(call(v, i, ctx)?);
            }
            Ok(Value::array(out))
        }
        "filter" => {
            let items = arr.borrow().clone();
            let mut out = Vec::new();
            for (i, v) in items.into_iter().enumerate() {
                if call(v.clone(), i, ctx)?.is_truthy() {
                    out.push(v);
                }
            }
            Ok(Value::array(out))
        }
        "every" => {
            let items = arr.borrow().clone();
            for (i, v) in items.into_iter().enumerate() {
                if !call(v, i, ctx)?.is_truthy() {
                    return Ok(Value::Boolean(false));
                }
            }
            Ok(Value::Boolean(true))
        }
        "some" => {
            let items = arr.borrow().clone();
            for (i, v) in items.into_iter().enumerate() {
                if call(v, i, ctx)?.is_truthy() {
                    return Ok(Value::Boolean(true));
                }
            }
            Ok(Value::Boolean(false))
        }
        "find" => {
            let items = arr.borrow().clone();
            for (i, v) in items.into_iter().enumerate() {
                if call(v.clone(), i, ctx)?.is_truthy() {
                    return Ok(v);
                }
            }
            Ok(Value::Undefined)
        }
        "findIndex" => {
            let items = arr.borrow().clone();
            for (i, v) in items.into_iter().enumerate() {
                if call(v, i, ctx)?.is_truthy() {
                    return Ok(Value::Number(i as f64));
                }
            }
            Ok(Value::Number(-1.0))
        }
        "findLast" => {
            let items = arr.borrow().clone();
            for (i, v) in items.into_iter().enumerate().rev() {
                if call(v.clone(), i, ctx)?.is_truthy() {
                    return Ok(v);
                }
            }
            Ok(Value::Undefined)
        }
        "findLastIndex" => {
            let items = arr.borrow().clone();
            for (i, v) in items.into_iter().enumerate().rev() {
                if call(v, i, ctx)?.is_truthy() {
                    return Ok(Value::Number(i as f64));
                }
            }
            Ok(Value::Number(-1.0))
        }
        "flatMap" => {
            let items = arr.borrow().clone();
            let mut out = Vec::new();
            for (i, v) in items.into_iter().enumerate() {
                match call(v, i, ctx)? {
                    Value::Array(inner) => out.extend(inner.borrow().iter().cloned()),
                    other => out.push(other),
                }
            }
            Ok(Value::array(out))
        }
        "reduce" => reduce(arr.borrow().clone().into_iter().enumerate(), &callback, args.get(1).cloned(), this_arr, loc, ctx),
        "reduceRight" => reduce(arr.borrow().clone().into_iter().enumerate().rev(), &callback, args.get(1).cloned(), this_arr, loc, ctx),
        "sort" | "toSorted" => {
            let mut copy = arr.borrow().clone();
            let mut err = None;
            copy.sort_by(|a, b| {
                if err.is_some() {
                    return std::cmp::Ordering::Equal;
                }
                if matches!(callback, Value::Undefined) {
                    return a.to_js_string().cmp(&b.to_js_string());
                }
                match super::call_value(&callback, Value::Undefined, vec![a.clone(), b.clone()], loc, ctx) {
                    Ok(result) => result.to_number().partial_cmp(&0.0).unwrap_or(std::cmp::Ordering::Equal),
                    Err(e) => {
                        err = Some(e);
                        std::cmp::Ordering::Equal
                    }
                }
            });
            if let Some(e) = err {
                return Err(e);
            }
            if name == "sort" {
                *arr.borrow_mut() = copy;
                Ok(this_arr)
            } else {
                Ok(Value::array(copy))
            }
        }
        "toSpliced" => {
            let mut copy = arr.borrow().clone();
            let len = copy.len();
            let start = normalize_index(arg(args, 0).to_number_or(0.0), len);
            let delete_count = if args.len() > 1 { (arg(args, 1).to_number_or(0.0).max(0.0) as usize).min(len - start) } else { len - start };
            copy.splice(start..start + delete_count, args.iter().skip(2).cloned());
            Ok(Value::array(copy))
        }
        other => type_err(format!("'{other}' is not a function"), loc),
    }
}

fn reduce(
    mut iter: impl Iterator<Item = (usize, Value)>,
    callback: &Value,
    initial: Option<Value>,
    this_arr: Value,
    loc: CodeLoc,
    ctx: &EvalContext,
) -> EvalResult<Value> {
    let mut acc = match initial {
        Some(v) => v,
        None => match iter.next() {
            Some((_, v)) => v,
            None => return type_err("Reduce of empty array with no initial value", loc),
        },
    };
    for (i, v) in iter {
        acc = super::call_value(callback, Value::Undefined, vec![acc, v, Value::Number(i as f64), this_arr.clone()], loc, ctx)?;
    }
    Ok(acc)
}

pub fn call_string_method(s: &Rc<str>, name: &str, args: &[Value], loc: CodeLoc, _ctx: &EvalContext) -> EvalResult<Value> {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();
    match name {
        "charAt" => {
            let i = arg(args, 0).to_number_or(0.0) as i64;
            Ok(Value::string(if i >= 0 && (i as usize) < len { chars[i as usize].to_string() } else { String::new() }))
        }
        "at" => {
            let i = arg(args, 0).to_number_or(0.0);
            let idx = if i < 0.0 { len as f64 + i } else { i };
            Ok(if idx >= 0.0 && (idx as usize) < len { Value::string(chars[idx as usize].to_string()) } else { Value::Undefined })
        }
        "charCodeAt" | "codePointAt" => {
            let i = arg(args, 0).to_number_or(0.0) as i64;
            Ok(if i >= 0 && (i as usize) < len { Value::Number(chars[i as usize] as u32 as f64) } else { Value::Number(f64::NAN) })
        }
        "concat" => Ok(Value::string(format!("{s}{}", args.iter().map(|a| a.to_js_string().to_string()).collect::<String>()))),
        "includes" => Ok(Value::Boolean(s.contains(arg(args, 0).to_js_string().as_ref()))),
        "indexOf" => Ok(Value::Number(char_index(&chars, s.find(arg(args, 0).to_js_string().as_ref())).map_or(-1.0, |i| i as f64))),
        "lastIndexOf" => Ok(Value::Number(char_index(&chars, s.rfind(arg(args, 0).to_js_string().as_ref())).map_or(-1.0, |i| i as f64))),
        "slice" => {
            let start = normalize_index(arg(args, 0).to_number_or(0.0), len);
            let end = if matches!(arg(args, 1), Value::Undefined) { len } else { normalize_index(arg(args, 1).to_number_or(0.0), len) };
            Ok(Value::string(if start < end { chars[start..end].iter().collect::<String>() } else { String::new() }))
        }
        "substring" => {
            let mut a = (arg(args, 0).to_number_or(0.0).max(0.0) as usize).min(len);
            let mut b = if matches!(arg(args, 1), Value::Undefined) { len } else { (arg(args, 1).to_number_or(0.0).max(0.0) as usize).min(len) };
            if a > b {
                std::mem::swap(&mut a, &mut b);
            }
            Ok(Value::string(chars[a..b].iter().collect::<String>()))
        }
        "substr" => {
            let start = normalize_index(arg(args, 0).to_number_or(0.0), len);
            let count = if matches!(arg(args, 1), Value::Undefined) { len - start } else { (arg(args, 1).to_number_or(0.0).max(0.0) as usize).min(len - start) };
            Ok(Value::string(chars[start..start + count].iter().collect::<String>()))
        }
        "toLowerCase" => Ok(Value::string(s.to_lowercase())),
        "toUpperCase" => Ok(Value::string(s.to_uppercase())),
        "trim" => Ok(Value::string(s.trim().to_string())),
        "trimStart" => Ok(Value::string(s.trim_start().to_string())),
        "trimEnd" => Ok(Value::string(s.trim_end().to_string())),
        "startsWith" => Ok(Value::Boolean(s.starts_with(arg(args, 0).to_js_string().as_ref()))),
        "endsWith" => Ok(Value::Boolean(s.ends_with(arg(args, 0).to_js_string().as_ref()))),
        "repeat" => {
            let count = arg(args, 0).to_number_or(0.0);
            if count < 0.0 || !count.is_finite() {
                return type_err("Invalid count value", loc);
            }
            Ok(Value::string(s.repeat(count as usize)))
        }
        "padStart" => Ok(Value::string(pad(s, arg(args, 0).to_number_or(0.0) as usize, &pad_string(args), true))),
        "padEnd" => Ok(Value::string(pad(s, arg(args, 0).to_number_or(0.0) as usize, &pad_string(args), false))),
        "split" => {
            let sep = arg(args, 0);
            if matches!(sep, Value::Undefined) {
                return Ok(Value::array(vec![Value::string(s.clone())]));
            }
            let sep = sep.to_js_string();
            let parts: Vec<Value> = if sep.is_empty() {
                s.chars().map(|c| Value::string(c.to_string())).collect()
            } else {
                s.split(sep.as_ref()).map(Value::string).collect()
            };
            Ok(Value::array(parts))
        }
        "replace" => Ok(Value::string(s.replacen(arg(args, 0).to_js_string().as_ref(), arg(args, 1).to_js_string().as_ref(), 1))),
        "replaceAll" => Ok(Value::string(s.replace(arg(args, 0).to_js_string().as_ref(), arg(args, 1).to_js_string().as_ref()))),
        "localeCompare" => {
            let other = arg(args, 0).to_js_string();
            Ok(Value::Number(match s.as_ref().cmp(other.as_ref()) {
                std::cmp::Ordering::Less => -1.0,
                std::cmp::Ordering::Equal => 0.0,
                std::cmp::Ordering::Greater => 1.0,
            }))
        }
        other => type_err(format!("'{other}' is not a function"), loc),
    }
}

fn char_index(chars: &[char], byte_index: Option<usize>) -> Option<usize> {
    let byte_index = byte_index?;
    let mut seen_bytes = 0;
    for (i, c) in chars.iter().enumerate() {
        if seen_bytes == byte_index {
            return Some(i);
        }
        seen_bytes += c.len_utf8();
    }
    None
}

fn pad_string(args: &[Value]) -> String {
    if matches!(arg(args, 1), Value::Undefined) { " ".to_string() } else { arg(args, 1).to_js_string().to_string() }
}

fn pad(s: &str, target_len: usize, filler: &str, at_start: bool) -> String {
    let current_len = s.chars().count();
    if current_len >= target_len || filler.is_empty() {
        return s.to_string();
    }
    let needed = target_len - current_len;
    let filler_chars: Vec<char> = filler.chars().collect();
    let padding: String = (0..needed).map(|i| filler_chars[i % filler_chars.len()]).collect();
    if at_start { format!("{padding}{s}") } else { format!("{s}{padding}") }
}

trait ToNumberOr {
    fn to_number_or(&self, default: f64) -> f64;
}

impl ToNumberOr for Value {
    fn to_number_or(&self, default: f64) -> f64 {
        if matches!(self, Value::Undefined) { default } else { self.to_number() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn arr(items: Vec<Value>) -> Rc<RefCell<Vec<Value>>> {
        Rc::new(RefCell::new(items))
    }

    #[test]
    fn push_and_pop_mutate_in_place() {
        let a = arr(vec![Value::Number(1.0)]);
        let ctx = EvalContext::new(&crate::security::SecurityOptions { hide_host_error_messages: true }, &crate::resource::NoLimitTracker, &crate::tracer::NoopTracer);
        call_array_method(&a, "push", &[Value::Number(2.0)], CodeLoc::UNKNOWN, &ctx).unwrap();
        assert_eq!(a.borrow().len(), 2);
        let popped = call_array_method(&a, "pop", &[], CodeLoc::UNKNOWN, &ctx).unwrap();
        assert_eq!(popped.to_number(), 2.0);
    }

    #[test]
    fn string_slice_handles_unicode_scalars() {
        let ctx = EvalContext::new(&crate::security::SecurityOptions { hide_host_error_messages: true }, &crate::resource::NoLimitTracker, &crate::tracer::NoopTracer);
        let s: Rc<str> = Rc::from("héllo");
        let result = call_string_method(&s, "slice", &[Value::Number(0.0), Value::Number(2.0)], CodeLoc::UNKNOWN, &ctx).unwrap();
        assert_eq!(result.to_js_string().as_ref(), "hé");
    }
}

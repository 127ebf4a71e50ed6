//! `JSON.parse` / `JSON.stringify`, built on `serde_json`'s `Value` as the
//! intermediate form — the same crate the teacher already depends on for its
//! own config/wire serialization, reused here instead of hand-rolling a
//! second JSON reader. Exposed as a read-only `Value::Host` proxy, like
//! `Math` — see `super::host_namespace`.

use serde_json::Value as Json;

use crate::security::HostResult;
use crate::value::{JsObject, Value};

fn to_json(value: &Value) -> Json {
    match value {
        Value::Undefined => Json::Null,
        Value::Null => Json::Null,
        Value::Boolean(b) => Json::Bool(*b),
        Value::Number(n) => serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number),
        Value::String(s) => Json::String(s.to_string()),
        Value::Array(items) => Json::Array(items.borrow().iter().map(to_json).collect()),
        Value::Object(obj) => {
            let mut map = serde_json::Map::new();
            for (key, descriptor) in &obj.borrow().properties {
                if let crate::value::PropertyDescriptor::Data { value, .. } = descriptor {
                    map.insert(key.to_string(), to_json(value));
                }
            }
            Json::Object(map)
        }
        // Functions, classes, instances, host values and promises have no
        // JSON representation and are dropped, matching `JSON.stringify`
        // turning them into `undefined` wherever that is legal.
        _ => Json::Null,
    }
}

fn from_json(value: &Json) -> Value {
    match value {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Boolean(*b),
        Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        Json::String(s) => Value::string(s.clone()),
        Json::Array(items) => Value::array(items.iter().map(from_json).collect()),
        Json::Object(map) => {
            let mut obj = JsObject::new();
            for (key, value) in map {
                obj.set_data(key.clone(), from_json(value));
            }
            Value::object(obj)
        }
    }
}

pub fn namespace() -> Value {
    let entries: super::Entries = vec![
        (
            "parse",
            1,
            Box::new(|args, _ctx| {
                let text = args.first().map(Value::to_js_string).unwrap_or_else(|| "undefined".into());
                let parsed: Json = serde_json::from_str(&text).map_err(|e| format!("Unexpected token in JSON: {e}"))?;
                Ok(HostResult::Scalar(from_json(&parsed)))
            }),
        ),
        (
            "stringify",
            1,
            Box::new(|args, _ctx| {
                let Some(value) = args.first() else {
                    return Ok(HostResult::Scalar(Value::Undefined));
                };
                let json = to_json(value);
                let indent = args.get(2).map(Value::to_number).filter(|n| *n > 0.0);
                let text = if let Some(width) = indent {
                    let spaces = " ".repeat(width as usize);
                    let formatter = serde_json::ser::PrettyFormatter::with_indent(spaces.as_bytes());
                    let mut buf = Vec::new();
                    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
                    serde::Serialize::serialize(&json, &mut ser).map_err(|e| e.to_string())?;
                    String::from_utf8(buf).map_err(|e| e.to_string())?
                } else {
                    serde_json::to_string(&json).map_err(|e| e.to_string())?
                };
                Ok(HostResult::Scalar(Value::string(text)))
            }),
        ),
    ];
    super::host_namespace("JSON", Vec::new(), entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_json_value() {
        let mut obj = JsObject::new();
        obj.set_data("a", Value::Number(1.0));
        let original = Value::object(obj);
        let json = to_json(&original);
        let back = from_json(&json);
        let Value::Object(cell) = back else { panic!("expected object") };
        assert_eq!(cell.borrow().get("a").is_some(), true);
    }
}

//! `Object.keys/values/entries/assign/freeze/fromEntries`. Exposed as a
//! read-only `Value::Host` proxy, like `Math` — see `super::host_namespace`.

use crate::security::HostResult;
use crate::value::{JsObject, PropertyDescriptor, Value};

fn own_data_pairs(value: &Value) -> Vec<(String, Value)> {
    match value {
        Value::Object(obj) => obj
            .borrow()
            .properties
            .iter()
            .filter_map(|(k, d)| match d {
                PropertyDescriptor::Data { value, .. } => Some((k.to_string(), value.clone())),
                PropertyDescriptor::Accessor { .. } => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

pub fn namespace() -> Value {
    let entries: super::Entries = vec![
        (
            "keys",
            1,
            Box::new(|args, _ctx| {
                let keys = own_data_pairs(args.first().unwrap_or(&Value::Undefined)).into_iter().map(|(k, _)| Value::string(k)).collect();
                Ok(HostResult::Scalar(Value::array(keys)))
            }),
        ),
        (
            "values",
            1,
            Box::new(|args, _ctx| {
                let values = own_data_pairs(args.first().unwrap_or(&Value::Undefined)).into_iter().map(|(_, v)| v).collect();
                Ok(HostResult::Scalar(Value::array(values)))
            }),
        ),
        (
            "entries",
            1,
            Box::new(|args, _ctx| {
                let pairs = own_data_pairs(args.first().unwrap_or(&Value::Undefined))
                    .into_iter()
                    .map(|(k, v)| Value::array(vec![Value::string(k), v]))
                    .collect();
                Ok(HostResult::Scalar(Value::array(pairs)))
            }),
        ),
        (
            "assign",
            2,
            Box::new(|args, _ctx| {
                let Some(Value::Object(target)) = args.first() else {
                    return Err("Object.assign target must be an object".to_string());
                };
                for source in &args[1..] {
                    for (k, v) in own_data_pairs(source) {
                        target.borrow_mut().set_data(k, v);
                    }
                }
                Ok(HostResult::Scalar(Value::Object(target.clone())))
            }),
        ),
        (
            "freeze",
            1,
            Box::new(|args, _ctx| {
                if let Some(Value::Object(obj)) = args.first() {
                    let mut obj = obj.borrow_mut();
                    obj.extensible = false;
                    for descriptor in obj.properties.values_mut() {
                        if let PropertyDescriptor::Data { writable, .. } = descriptor {
                            *writable = false;
                        }
                    }
                }
                Ok(HostResult::Scalar(args.first().cloned().unwrap_or(Value::Undefined)))
            }),
        ),
        (
            "isFrozen",
            1,
            Box::new(|args, _ctx| {
                let frozen = match args.first() {
                    Some(Value::Object(obj)) => {
                        let obj = obj.borrow();
                        !obj.extensible && obj.properties.values().all(|d| matches!(d, PropertyDescriptor::Data { writable: false, .. } | PropertyDescriptor::Accessor { .. }))
                    }
                    _ => true,
                };
                Ok(HostResult::Scalar(Value::Boolean(frozen)))
            }),
        ),
        (
            "fromEntries",
            1,
            Box::new(|args, _ctx| {
                let Some(Value::Array(items)) = args.first() else {
                    return Err("Object.fromEntries requires an iterable of entries".to_string());
                };
                let mut obj = JsObject::new();
                for item in items.borrow().iter() {
                    let Value::Array(pair) = item else {
                        return Err("iterable for fromEntries should have entry-like objects".to_string());
                    };
                    let pair = pair.borrow();
                    let key = pair.first().map(Value::to_js_string).unwrap_or_else(|| "undefined".into());
                    let value = pair.get(1).cloned().unwrap_or(Value::Undefined);
                    obj.set_data(key.to_string(), value);
                }
                Ok(HostResult::Scalar(Value::object(obj)))
            }),
        ),
    ];
    super::host_namespace("Object", Vec::new(), entries)
}

//! `Array.isArray/from/of`. The full instance-method surface (`map`,
//! `filter`, `reduce`, ...) already lives in `evaluator::native_methods` —
//! this namespace only covers the static side. Exposed as a read-only
//! `Value::Host` proxy, like `Math` — see `super::host_namespace`.

use crate::evaluator::destructure::iterate_for_destructure;
use crate::security::{HostCallCtx, HostResult};
use crate::value::Value;

pub fn namespace() -> Value {
    let entries: super::Entries = vec![
        (
            "isArray",
            1,
            Box::new(|args, _ctx| Ok(HostResult::Scalar(Value::Boolean(matches!(args.first(), Some(Value::Array(_))))))),
        ),
        (
            "of",
            0,
            Box::new(|args, _ctx| Ok(HostResult::Scalar(Value::array(args.to_vec())))),
        ),
        (
            "from",
            1,
            Box::new(|args, ctx: &dyn HostCallCtx| {
                let Some(source) = args.first() else {
                    return Ok(HostResult::Scalar(Value::array(Vec::new())));
                };
                let items = iterate_for_destructure(source, crate::error::CodeLoc::UNKNOWN).map_err(|_| "value is not iterable".to_string())?;
                let mapped = match args.get(1) {
                    Some(Value::Function(f)) => items
                        .into_iter()
                        .enumerate()
                        .map(|(i, item)| ctx.call_sandbox_function(f, vec![item, Value::Number(i as f64)]).map_err(|e| e.message()))
                        .collect::<Result<Vec<_>, _>>()?,
                    _ => items,
                };
                Ok(HostResult::Scalar(Value::array(mapped)))
            }),
        ),
    ];
    super::host_namespace("Array", Vec::new(), entries)
}

//! `Math`: a pure-function namespace, no instances, no mutable state —
//! each entry forwards straight to the matching `f64` method. Exposed as a
//! read-only `Value::Host` proxy (see `super::host_namespace`) rather than a
//! plain sandbox object, so `Math.PI = 3` is rejected the same way writing
//! to any other host-proxied value is.

use rand::Rng;

use crate::security::HostResult;
use crate::value::Value;

fn arg(args: &[Value], i: usize) -> f64 {
    args.get(i).map_or(f64::NAN, Value::to_number)
}

/// `Math.sign`, which rust's `f64::signum` gets wrong for `0.0`/`NaN`
/// (signum never returns `0.0` or `NaN`).
trait SignJs {
    fn signum_js(self) -> f64;
}

impl SignJs for f64 {
    fn signum_js(self) -> f64 {
        if self.is_nan() || self == 0.0 {
            self
        } else if self > 0.0 {
            1.0
        } else {
            -1.0
        }
    }
}

fn next_f64() -> f64 {
    rand::thread_rng().gen_range(0.0..1.0)
}

pub fn namespace() -> Value {
    macro_rules! unary {
        ($f:expr) => {
            Box::new(move |args: &[Value], _ctx: &dyn crate::security::HostCallCtx| Ok(HostResult::Scalar(Value::Number($f(arg(args, 0))))))
        };
    }

    let entries: super::Entries = vec![
        ("abs", 1, unary!(f64::abs)),
        ("floor", 1, unary!(f64::floor)),
        ("ceil", 1, unary!(f64::ceil)),
        ("trunc", 1, unary!(f64::trunc)),
        ("sign", 1, unary!(f64::signum_js)),
        ("sqrt", 1, unary!(f64::sqrt)),
        ("cbrt", 1, unary!(f64::cbrt)),
        ("sin", 1, unary!(f64::sin)),
        ("cos", 1, unary!(f64::cos)),
        ("tan", 1, unary!(f64::tan)),
        ("log", 1, unary!(f64::ln)),
        ("log2", 1, unary!(f64::log2)),
        ("log10", 1, unary!(f64::log10)),
        ("exp", 1, unary!(f64::exp)),
        (
            "round",
            1,
            Box::new(|args, _ctx| {
                let n = arg(args, 0);
                Ok(HostResult::Scalar(Value::Number((n + 0.5).floor())))
            }),
        ),
        (
            "pow",
            2,
            Box::new(|args, _ctx| Ok(HostResult::Scalar(Value::Number(arg(args, 0).powf(arg(args, 1)))))),
        ),
        (
            "max",
            2,
            Box::new(|args, _ctx| Ok(HostResult::Scalar(Value::Number(args.iter().map(Value::to_number).fold(f64::NEG_INFINITY, f64::max))))),
        ),
        (
            "min",
            2,
            Box::new(|args, _ctx| Ok(HostResult::Scalar(Value::Number(args.iter().map(Value::to_number).fold(f64::INFINITY, f64::min))))),
        ),
        ("random", 0, Box::new(|_args, _ctx| Ok(HostResult::Scalar(Value::Number(next_f64()))))),
        (
            "hypot",
            2,
            Box::new(|args, _ctx| Ok(HostResult::Scalar(Value::Number(args.iter().map(|v| v.to_number().powi(2)).sum::<f64>().sqrt())))),
        ),
    ];

    let consts = vec![
        ("PI", Value::Number(std::f64::consts::PI)),
        ("E", Value::Number(std::f64::consts::E)),
        ("LN2", Value::Number(std::f64::consts::LN_2)),
        ("LN10", Value::Number(std::f64::consts::LN_10)),
        ("SQRT2", Value::Number(std::f64::consts::SQRT_2)),
    ];
    super::host_namespace("Math", consts, entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_handles_zero_and_nan() {
        assert_eq!(0.0_f64.signum_js(), 0.0);
        assert!((-0.0_f64).signum_js().is_sign_negative());
        assert!(f64::NAN.signum_js().is_nan());
    }

    #[test]
    fn random_stays_in_unit_range() {
        for _ in 0..100 {
            let v = next_f64();
            assert!((0.0..1.0).contains(&v));
        }
    }
}

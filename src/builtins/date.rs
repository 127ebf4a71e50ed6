//! `Date`, reduced to UTC wall-clock math — no locale/timezone database,
//! matching the spec's choice not to model `Intl`. Calendar math goes
//! through `chrono`'s `NaiveDate`/`DateTime<Utc>`, the same crate the
//! teacher depends on for its own date handling.

use std::cell::Cell;
use std::rc::Rc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};

use crate::security::{CallableKind, CallableTarget, HostCallCtx, HostKind, HostObject, HostResult};
use crate::value::Value;

struct Fields {
    year: i64,
    month0: i64,
    day: i64,
    hour: i64,
    minute: i64,
    second: i64,
    milli: i64,
    weekday: i64,
}

fn fields_of(epoch_ms: f64) -> Option<Fields> {
    let ms = epoch_ms.floor() as i64;
    let dt = DateTime::<Utc>::from_timestamp_millis(ms)?;
    Some(Fields {
        year: i64::from(dt.year()),
        month0: i64::from(dt.month0()),
        day: i64::from(dt.day()),
        hour: i64::from(dt.hour()),
        minute: i64::from(dt.minute()),
        second: i64::from(dt.second()),
        milli: i64::from(dt.timestamp_subsec_millis()),
        weekday: i64::from(dt.weekday().num_days_from_sunday()),
    })
}

/// Builds an epoch-ms timestamp from possibly out-of-range components,
/// folding month overflow into the year up front (so `month0` can be
/// negative or exceed 11) and letting `chrono::Duration` addition carry
/// day/hour/minute/second/millisecond overflow across the boundary the
/// way `new Date(y, m, d, ...)` does in real JS.
fn epoch_of(year: i64, month0: i64, day: i64, hour: i64, minute: i64, second: i64, milli: i64) -> f64 {
    let year = year + month0.div_euclid(12);
    let month0 = month0.rem_euclid(12);
    let Ok(year) = i32::try_from(year) else {
        return f64::NAN;
    };
    let Some(first_of_month) = NaiveDate::from_ymd_opt(year, (month0 + 1) as u32, 1) else {
        return f64::NAN;
    };
    let Some(midnight) = first_of_month.and_hms_opt(0, 0, 0) else {
        return f64::NAN;
    };
    let naive = midnight + Duration::days(day - 1) + Duration::hours(hour) + Duration::minutes(minute) + Duration::seconds(second) + Duration::milliseconds(milli);
    Utc.from_utc_datetime(&naive).timestamp_millis() as f64
}

fn now_ms() -> f64 {
    Utc::now().timestamp_millis() as f64
}

struct SandboxDate {
    epoch_ms: Cell<f64>,
}

impl HostObject for SandboxDate {
    fn kind(&self) -> HostKind {
        HostKind::Date
    }

    fn get_own(&self, _name: &str) -> Option<HostResult> {
        None
    }

    fn invoke(&self, name: &str, _args: Vec<Value>, _ctx: &dyn HostCallCtx) -> Result<HostResult, String> {
        let ms = self.epoch_ms.get();
        if matches!(name, "getTime" | "valueOf") {
            return Ok(HostResult::Scalar(Value::Number(ms)));
        }
        let Some(f) = (!ms.is_nan()).then(|| fields_of(ms)).flatten() else {
            return if matches!(name, "toISOString" | "toJSON") { Err("Invalid time value".to_string()) } else { Ok(HostResult::Scalar(Value::Number(f64::NAN))) };
        };
        let num = |n: i64| Ok(HostResult::Scalar(Value::Number(n as f64)));
        match name {
            "getFullYear" | "getUTCFullYear" => num(f.year),
            "getMonth" | "getUTCMonth" => num(f.month0),
            "getDate" | "getUTCDate" => num(f.day),
            "getDay" | "getUTCDay" => num(f.weekday),
            "getHours" | "getUTCHours" => num(f.hour),
            "getMinutes" | "getUTCMinutes" => num(f.minute),
            "getSeconds" | "getUTCSeconds" => num(f.second),
            "getMilliseconds" | "getUTCMilliseconds" => num(f.milli),
            "getTimezoneOffset" => num(0),
            "toISOString" | "toJSON" => Ok(HostResult::Scalar(Value::string(format!(
                "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
                f.year, f.month0 + 1, f.day, f.hour, f.minute, f.second, f.milli
            )))),
            "toDateString" => Ok(HostResult::Scalar(Value::string(format!("{:04}-{:02}-{:02}", f.year, f.month0 + 1, f.day)))),
            "toTimeString" => Ok(HostResult::Scalar(Value::string(format!("{:02}:{:02}:{:02}", f.hour, f.minute, f.second)))),
            _ => Err(format!("'{name}' is not a function")),
        }
    }
}

struct DateConstructor;

impl DateConstructor {
    fn build(&self, args: Vec<Value>) -> Rc<dyn HostObject> {
        let epoch_ms = match args.len() {
            0 => now_ms(),
            1 => match &args[0] {
                Value::String(s) => parse_iso(s).unwrap_or(f64::NAN),
                other => other.to_number(),
            },
            _ => {
                let n = |i: usize, default: i64| args.get(i).map_or(default as f64, Value::to_number) as i64;
                epoch_of(n(0, 1970), n(1, 0), n(2, 1), n(3, 0), n(4, 0), n(5, 0), n(6, 0))
            }
        };
        Rc::new(SandboxDate { epoch_ms: Cell::new(epoch_ms) })
    }
}

fn parse_iso(s: &str) -> Option<f64> {
    let s = s.trim();
    let (date, time) = s.split_once('T').unwrap_or((s, "00:00:00"));
    let mut parts = date.split('-');
    let year: i64 = parts.next()?.parse().ok()?;
    let month: i64 = parts.next()?.parse().ok()?;
    let day: i64 = parts.next()?.parse().ok()?;
    let time = time.trim_end_matches('Z');
    let mut time_parts = time.splitn(3, ':');
    let hour: i64 = time_parts.next().unwrap_or("0").parse().ok()?;
    let minute: i64 = time_parts.next().unwrap_or("0").parse().ok()?;
    let sec_part = time_parts.next().unwrap_or("0");
    let (sec, milli) = sec_part.split_once('.').unwrap_or((sec_part, "0"));
    let second: i64 = sec.parse().ok()?;
    let milli: i64 = format!("{milli:0<3}").get(..3)?.parse().ok()?;
    let ms = epoch_of(year, month - 1, day, hour, minute, second, milli);
    (!ms.is_nan()).then_some(ms)
}

impl HostObject for DateConstructor {
    fn kind(&self) -> HostKind {
        HostKind::Function
    }

    fn get_own(&self, _name: &str) -> Option<HostResult> {
        None
    }

    fn call(&self, _args: Vec<Value>, _ctx: &dyn HostCallCtx) -> Result<HostResult, String> {
        // `Date()` without `new` returns a string in real JS; this sandbox
        // only needs the constructor form, so calling it bare is rejected.
        Err("Date must be called with 'new'".to_string())
    }

    fn construct(&self, args: Vec<Value>, _ctx: &dyn HostCallCtx) -> Result<Rc<dyn HostObject>, String> {
        Ok(self.build(args))
    }
}

pub fn constructor() -> Value {
    Value::HostCallable(Rc::new(crate::security::HostCallable {
        kind: CallableKind::Constructor,
        name: "Date".to_string(),
        arity: Some(7),
        target: CallableTarget::Standalone(Rc::new(DateConstructor)),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_roundtrips_through_civil_fields() {
        let ms = epoch_of(2024, 0, 1, 0, 0, 0, 0);
        let f = fields_of(ms).unwrap();
        assert_eq!((f.year, f.month0, f.day), (2024, 0, 1));
    }

    #[test]
    fn parses_iso_date_only() {
        let ms = parse_iso("2024-03-05").unwrap();
        let f = fields_of(ms).unwrap();
        assert_eq!((f.year, f.month0 + 1, f.day), (2024, 3, 5));
    }

    #[test]
    fn month_overflow_carries_into_the_next_year() {
        let ms = epoch_of(2024, 12, 1, 0, 0, 0, 0);
        let f = fields_of(ms).unwrap();
        assert_eq!((f.year, f.month0 + 1, f.day), (2025, 1, 1));
    }
}

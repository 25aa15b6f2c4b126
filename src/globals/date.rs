use super::{install_ctor, install_method};
use crate::interp::{Abort, Interpreter, NativeCall};
use crate::value::{BackingData, ClassTag, Value};

const MS_PER_DAY: f64 = 86_400_000.0;

/// Days since the epoch for a civil date (proleptic Gregorian).
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = if month <= 2 { y + 1 } else { y };
    (year, month, day)
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct DateParts {
    pub(crate) year: i64,
    pub(crate) month: u32,
    pub(crate) day: u32,
    pub(crate) hour: u32,
    pub(crate) minute: u32,
    pub(crate) second: u32,
    pub(crate) millisecond: u32,
    pub(crate) weekday: u32,
}

pub(crate) fn split_ms(ms: f64) -> Option<DateParts> {
    if !ms.is_finite() {
        return None;
    }
    let days = (ms / MS_PER_DAY).floor() as i64;
    let mut remainder = (ms - days as f64 * MS_PER_DAY) as i64;
    let (year, month, day) = civil_from_days(days);
    let millisecond = (remainder % 1000) as u32;
    remainder /= 1000;
    let second = (remainder % 60) as u32;
    remainder /= 60;
    let minute = (remainder % 60) as u32;
    remainder /= 60;
    let hour = remainder as u32;
    // 1970-01-01 was a Thursday.
    let weekday = (days.rem_euclid(7) + 4) as u32 % 7;
    Some(DateParts {
        year,
        month,
        day,
        hour,
        minute,
        second,
        millisecond,
        weekday,
    })
}

pub(crate) fn ms_from_parts(
    year: f64,
    month: f64,
    day: f64,
    hour: f64,
    minute: f64,
    second: f64,
    millisecond: f64,
) -> f64 {
    if !(year.is_finite()
        && month.is_finite()
        && day.is_finite()
        && hour.is_finite()
        && minute.is_finite()
        && second.is_finite()
        && millisecond.is_finite())
    {
        return f64::NAN;
    }
    // Overflowing months and days carry, like setMonth(13) does.
    let mut y = year.trunc() as i64;
    let mut m = month.trunc() as i64;
    y += m.div_euclid(12);
    m = m.rem_euclid(12);
    let days = days_from_civil(y, m + 1, 1) as f64 + (day.trunc() - 1.0);
    days * MS_PER_DAY
        + hour.trunc() * 3_600_000.0
        + minute.trunc() * 60_000.0
        + second.trunc() * 1000.0
        + millisecond.trunc()
}

fn now_ms() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as f64)
        .unwrap_or(0.0)
}

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub(crate) fn date_to_string(ms: f64) -> String {
    let Some(p) = split_ms(ms) else {
        return "Invalid Date".to_string();
    };
    format!(
        "{} {} {:02} {} {:02}:{:02}:{:02} GMT+0000 (UTC)",
        WEEKDAYS[p.weekday as usize],
        MONTHS[(p.month - 1) as usize],
        p.day,
        p.year,
        p.hour,
        p.minute,
        p.second
    )
}

fn date_to_utc_string(ms: f64) -> String {
    let Some(p) = split_ms(ms) else {
        return "Invalid Date".to_string();
    };
    format!(
        "{}, {:02} {} {} {:02}:{:02}:{:02} GMT",
        WEEKDAYS[p.weekday as usize],
        p.day,
        MONTHS[(p.month - 1) as usize],
        p.year,
        p.hour,
        p.minute,
        p.second
    )
}

pub(crate) fn date_to_iso(ms: f64) -> Option<String> {
    let p = split_ms(ms)?;
    Some(format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        p.year, p.month, p.day, p.hour, p.minute, p.second, p.millisecond
    ))
}

/// Accepts ISO dates (`2024-01-02`, `2024-01-02T03:04:05.678Z`, offset
/// forms) and nothing else.
pub(crate) fn parse_date(text: &str) -> f64 {
    let text = text.trim();
    let (date_part, time_part) = match text.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (text, None),
    };
    let mut date_pieces = date_part.splitn(3, '-');
    let year: i64 = match date_pieces.next().and_then(|v| v.parse().ok()) {
        Some(y) => y,
        None => return f64::NAN,
    };
    let month: u32 = date_pieces
        .next()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);
    let day: u32 = date_pieces.next().and_then(|v| v.parse().ok()).unwrap_or(1);
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return f64::NAN;
    }
    let mut ms = days_from_civil(year, month as i64, day as i64) as f64 * MS_PER_DAY;
    let Some(time_part) = time_part else {
        return ms;
    };

    let (clock, offset_ms) = if let Some(stripped) = time_part.strip_suffix('Z') {
        (stripped, 0.0)
    } else if let Some(pos) = time_part.rfind(['+', '-']) {
        let (clock, offset) = time_part.split_at(pos);
        let sign = if offset.starts_with('-') { -1.0 } else { 1.0 };
        let body = &offset[1..];
        let (oh, om) = match body.split_once(':') {
            Some((h, m)) => (h.parse::<f64>().ok(), m.parse::<f64>().ok()),
            None if body.len() == 4 => (
                body[..2].parse::<f64>().ok(),
                body[2..].parse::<f64>().ok(),
            ),
            _ => (None, None),
        };
        match (oh, om) {
            (Some(h), Some(m)) => (clock, sign * (h * 3_600_000.0 + m * 60_000.0)),
            _ => return f64::NAN,
        }
    } else {
        (time_part, 0.0)
    };

    let mut clock_pieces = clock.splitn(3, ':');
    let hour: f64 = match clock_pieces.next().and_then(|v| v.parse().ok()) {
        Some(h) => h,
        None => return f64::NAN,
    };
    let minute: f64 = clock_pieces
        .next()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.0);
    let second: f64 = clock_pieces
        .next()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.0);
    ms += hour * 3_600_000.0 + minute * 60_000.0 + second * 1000.0 - offset_ms;
    ms
}

fn date_ms(interp: &mut Interpreter, call: &NativeCall, method: &str) -> Result<f64, Abort> {
    if let Some(obj) = call.this.as_object() {
        if let Some(BackingData::Date(ms)) = interp.heap.get(obj).data {
            return Ok(ms);
        }
    }
    Err(interp.throw_type_error(format!(
        "Date.prototype.{} requires that 'this' be a Date",
        method
    )))
}

fn store_ms(interp: &mut Interpreter, call: &NativeCall, ms: f64) {
    if let Some(obj) = call.this.as_object() {
        interp.heap.get_mut(obj).data = Some(BackingData::Date(ms));
    }
}

pub(crate) fn init(interp: &mut Interpreter) {
    let date_proto = interp.protos.date_proto;

    let ctor = install_ctor(interp, "Date", date_proto, 7, |interp, call| {
        if !call.called_with_new {
            // Called as a function: the current time as a string.
            return Ok(Value::string(date_to_string(now_ms())));
        }
        let ms = match call.args.len() {
            0 => now_ms(),
            1 => match &call.args[0] {
                Value::String(s) => parse_date(s),
                other => interp.to_number(other),
            },
            _ => {
                let pick = |interp: &mut Interpreter, i: usize, default: f64| {
                    call.args
                        .get(i)
                        .filter(|v| !matches!(v, Value::Undefined))
                        .map(|v| interp.to_number(v))
                        .unwrap_or(default)
                };
                let mut year = pick(interp, 0, f64::NAN);
                if (0.0..=99.0).contains(&year) {
                    year += 1900.0;
                }
                ms_from_parts(
                    year,
                    pick(interp, 1, 0.0),
                    pick(interp, 2, 1.0),
                    pick(interp, 3, 0.0),
                    pick(interp, 4, 0.0),
                    pick(interp, 5, 0.0),
                    pick(interp, 6, 0.0),
                )
            }
        };
        if let Some(this) = call.this.as_object() {
            let object = interp.heap.get_mut(this);
            object.class = ClassTag::Date;
            object.data = Some(BackingData::Date(ms));
        }
        Ok(call.this.clone())
    });

    install_method(interp, ctor, "now", 0, |_, _| Ok(Value::Number(now_ms())));
    install_method(interp, ctor, "parse", 1, |interp, call| {
        let text = interp.to_display(&call.arg(0));
        Ok(Value::Number(parse_date(&text)))
    });
    install_method(interp, ctor, "UTC", 7, |interp, call| {
        let pick = |interp: &mut Interpreter, i: usize, default: f64| {
            call.args
                .get(i)
                .filter(|v| !matches!(v, Value::Undefined))
                .map(|v| interp.to_number(v))
                .unwrap_or(default)
        };
        let mut year = pick(interp, 0, f64::NAN);
        if (0.0..=99.0).contains(&year) {
            year += 1900.0;
        }
        Ok(Value::Number(ms_from_parts(
            year,
            pick(interp, 1, 0.0),
            pick(interp, 2, 1.0),
            pick(interp, 3, 0.0),
            pick(interp, 4, 0.0),
            pick(interp, 5, 0.0),
            pick(interp, 6, 0.0),
        )))
    });

    macro_rules! getter {
        ($name:expr, $field:ident, $map:expr) => {
            install_method(interp, date_proto, $name, 0, move |interp, call| {
                let ms = date_ms(interp, &call, $name)?;
                Ok(match split_ms(ms) {
                    Some(parts) => {
                        let raw = parts.$field as f64;
                        Value::Number($map(raw))
                    }
                    None => Value::Number(f64::NAN),
                })
            });
        };
    }

    let identity = |v: f64| v;
    let month_zero_based = |v: f64| v - 1.0;
    getter!("getFullYear", year, identity);
    getter!("getUTCFullYear", year, identity);
    getter!("getMonth", month, month_zero_based);
    getter!("getUTCMonth", month, month_zero_based);
    getter!("getDate", day, identity);
    getter!("getUTCDate", day, identity);
    getter!("getDay", weekday, identity);
    getter!("getUTCDay", weekday, identity);
    getter!("getHours", hour, identity);
    getter!("getUTCHours", hour, identity);
    getter!("getMinutes", minute, identity);
    getter!("getUTCMinutes", minute, identity);
    getter!("getSeconds", second, identity);
    getter!("getUTCSeconds", second, identity);
    getter!("getMilliseconds", millisecond, identity);
    getter!("getUTCMilliseconds", millisecond, identity);

    install_method(interp, date_proto, "getTime", 0, |interp, call| {
        Ok(Value::Number(date_ms(interp, &call, "getTime")?))
    });
    install_method(interp, date_proto, "valueOf", 0, |interp, call| {
        Ok(Value::Number(date_ms(interp, &call, "valueOf")?))
    });
    install_method(interp, date_proto, "getTimezoneOffset", 0, |interp, call| {
        date_ms(interp, &call, "getTimezoneOffset")?;
        Ok(Value::Number(0.0))
    });

    install_method(interp, date_proto, "setTime", 1, |interp, call| {
        date_ms(interp, &call, "setTime")?;
        let ms = interp.to_number(&call.arg(0));
        store_ms(interp, &call, ms);
        Ok(Value::Number(ms))
    });

    // Component setters rebuild the timestamp from the split parts.
    macro_rules! setter {
        ($name:expr, $apply:expr) => {
            install_method(interp, date_proto, $name, 1, move |interp, call| {
                let ms = date_ms(interp, &call, $name)?;
                let updated = match split_ms(ms) {
                    Some(parts) => {
                        let argv: Vec<f64> =
                            call.args.iter().map(|v| interp.to_number(v)).collect();
                        let mut fields = [
                            parts.year as f64,
                            parts.month as f64 - 1.0,
                            parts.day as f64,
                            parts.hour as f64,
                            parts.minute as f64,
                            parts.second as f64,
                            parts.millisecond as f64,
                        ];
                        let apply: (usize, usize) = $apply;
                        let (first, count) = apply;
                        for (slot, value) in argv.iter().take(count).enumerate() {
                            fields[first + slot] = *value;
                        }
                        ms_from_parts(
                            fields[0], fields[1], fields[2], fields[3], fields[4], fields[5],
                            fields[6],
                        )
                    }
                    None => f64::NAN,
                };
                store_ms(interp, &call, updated);
                Ok(Value::Number(updated))
            });
        };
    }

    setter!("setFullYear", (0, 3));
    setter!("setUTCFullYear", (0, 3));
    setter!("setMonth", (1, 2));
    setter!("setUTCMonth", (1, 2));
    setter!("setDate", (2, 1));
    setter!("setUTCDate", (2, 1));
    setter!("setHours", (3, 4));
    setter!("setUTCHours", (3, 4));
    setter!("setMinutes", (4, 3));
    setter!("setUTCMinutes", (4, 3));
    setter!("setSeconds", (5, 2));
    setter!("setUTCSeconds", (5, 2));
    setter!("setMilliseconds", (6, 1));
    setter!("setUTCMilliseconds", (6, 1));

    install_method(interp, date_proto, "toString", 0, |interp, call| {
        let ms = date_ms(interp, &call, "toString")?;
        Ok(Value::string(date_to_string(ms)))
    });
    install_method(interp, date_proto, "toLocaleString", 0, |interp, call| {
        let ms = date_ms(interp, &call, "toLocaleString")?;
        Ok(Value::string(date_to_string(ms)))
    });
    install_method(interp, date_proto, "toUTCString", 0, |interp, call| {
        let ms = date_ms(interp, &call, "toUTCString")?;
        Ok(Value::string(date_to_utc_string(ms)))
    });
    install_method(interp, date_proto, "toDateString", 0, |interp, call| {
        let ms = date_ms(interp, &call, "toDateString")?;
        Ok(match split_ms(ms) {
            Some(p) => Value::string(format!(
                "{} {} {:02} {}",
                WEEKDAYS[p.weekday as usize],
                MONTHS[(p.month - 1) as usize],
                p.day,
                p.year
            )),
            None => Value::string("Invalid Date"),
        })
    });
    install_method(interp, date_proto, "toISOString", 0, |interp, call| {
        let ms = date_ms(interp, &call, "toISOString")?;
        match date_to_iso(ms) {
            Some(text) => Ok(Value::string(text)),
            None => Err(interp.throw_range_error("Invalid time value")),
        }
    });
    install_method(interp, date_proto, "toJSON", 1, |interp, call| {
        let ms = date_ms(interp, &call, "toJSON")?;
        match date_to_iso(ms) {
            Some(text) => Ok(Value::string(text)),
            None => Ok(Value::Null),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn civil_round_trip() {
        for days in [-1_000_000, -1, 0, 1, 365, 20_000, 1_000_000] {
            let (y, m, d) = civil_from_days(days);
            assert_eq!(days_from_civil(y, m as i64, d as i64), days);
        }
    }

    #[test]
    fn epoch_is_thursday() {
        let parts = split_ms(0.0).unwrap();
        assert_eq!(parts.year, 1970);
        assert_eq!(parts.month, 1);
        assert_eq!(parts.day, 1);
        assert_eq!(parts.weekday, 4);
    }

    #[test]
    fn iso_round_trip() {
        let ms = parse_date("2024-02-29T12:30:45.123Z");
        assert_eq!(
            date_to_iso(ms).unwrap(),
            "2024-02-29T12:30:45.123Z".to_string()
        );
    }

    #[test]
    fn offset_parsing() {
        let utc = parse_date("2024-01-01T10:00:00Z");
        let plus_two = parse_date("2024-01-01T12:00:00+02:00");
        assert_eq!(utc, plus_two);
    }

    #[test]
    fn month_overflow_carries() {
        let january = ms_from_parts(2024.0, 12.0, 1.0, 0.0, 0.0, 0.0, 0.0);
        let next_year = ms_from_parts(2025.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0);
        assert_eq!(january, next_year);
    }

    #[test]
    fn invalid_dates_stringify() {
        assert_eq!(date_to_string(f64::NAN), "Invalid Date");
        assert!(parse_date("not a date").is_nan());
    }
}

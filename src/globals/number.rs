use super::{install_ctor, install_method, install_value};
use crate::interp::convert::{format_number, parse_js_number, to_integer};
use crate::interp::{Abort, Interpreter, NativeCall};
use crate::value::{BackingData, ClassTag, Value, READONLY_NONENUMERABLE};

fn number_of_this(interp: &mut Interpreter, call: &NativeCall) -> Result<f64, Abort> {
    match &call.this {
        Value::Number(n) => Ok(*n),
        Value::Object(obj) => match interp.heap.get(*obj).data {
            Some(BackingData::Number(n)) => Ok(n),
            _ => Err(interp.throw_type_error(
                "Number.prototype.valueOf requires that 'this' be a Number",
            )),
        },
        _ => Err(interp.throw_type_error(
            "Number.prototype.valueOf requires that 'this' be a Number",
        )),
    }
}

pub(crate) fn init(interp: &mut Interpreter) {
    let number_proto = interp.protos.number_proto;
    let boolean_proto = interp.protos.boolean_proto;

    let number_ctor = install_ctor(interp, "Number", number_proto, 1, |interp, call| {
        let n = if call.args.is_empty() {
            0.0
        } else {
            interp.to_number(&call.arg(0))
        };
        if call.called_with_new {
            if let Some(this) = call.this.as_object() {
                let object = interp.heap.get_mut(this);
                object.class = ClassTag::Number;
                object.data = Some(BackingData::Number(n));
                return Ok(call.this.clone());
            }
        }
        Ok(Value::Number(n))
    });

    install_value(
        interp,
        number_ctor,
        "MAX_VALUE",
        Value::Number(f64::MAX),
        READONLY_NONENUMERABLE,
    );
    install_value(
        interp,
        number_ctor,
        "MIN_VALUE",
        Value::Number(f64::MIN_POSITIVE),
        READONLY_NONENUMERABLE,
    );
    install_value(
        interp,
        number_ctor,
        "NaN",
        Value::Number(f64::NAN),
        READONLY_NONENUMERABLE,
    );
    install_value(
        interp,
        number_ctor,
        "POSITIVE_INFINITY",
        Value::Number(f64::INFINITY),
        READONLY_NONENUMERABLE,
    );
    install_value(
        interp,
        number_ctor,
        "NEGATIVE_INFINITY",
        Value::Number(f64::NEG_INFINITY),
        READONLY_NONENUMERABLE,
    );

    install_method(interp, number_proto, "toString", 1, |interp, call| {
        let n = number_of_this(interp, &call)?;
        let radix = match call.args.first() {
            None | Some(Value::Undefined) => 10,
            Some(value) => {
                let r = to_integer(interp.to_number(value));
                if !(2.0..=36.0).contains(&r) {
                    return Err(
                        interp.throw_range_error("toString() radix must be between 2 and 36")
                    );
                }
                r as u32
            }
        };
        if radix == 10 {
            return Ok(Value::string(format_number(n)));
        }
        Ok(Value::string(number_to_radix(n, radix)))
    });

    install_method(interp, number_proto, "toLocaleString", 0, |interp, call| {
        let n = number_of_this(interp, &call)?;
        Ok(Value::string(format_number(n)))
    });

    install_method(interp, number_proto, "valueOf", 0, |interp, call| {
        Ok(Value::Number(number_of_this(interp, &call)?))
    });

    install_method(interp, number_proto, "toFixed", 1, |interp, call| {
        let n = number_of_this(interp, &call)?;
        let digits = to_integer(interp.to_number(&call.arg(0)));
        if !(0.0..=100.0).contains(&digits) {
            return Err(interp.throw_range_error("toFixed() digits argument must be between 0 and 100"));
        }
        if n.is_nan() {
            return Ok(Value::string("NaN"));
        }
        if n.abs() >= 1e21 {
            return Ok(Value::string(format_number(n)));
        }
        Ok(Value::string(format!("{:.*}", digits as usize, n)))
    });

    install_method(interp, number_proto, "toExponential", 1, |interp, call| {
        let n = number_of_this(interp, &call)?;
        if n.is_nan() || n.is_infinite() {
            return Ok(Value::string(format_number(n)));
        }
        let text = match call.args.first() {
            None | Some(Value::Undefined) => format!("{:e}", n),
            Some(value) => {
                let digits = to_integer(interp.to_number(value));
                if !(0.0..=100.0).contains(&digits) {
                    return Err(interp.throw_range_error(
                        "toExponential() argument must be between 0 and 100",
                    ));
                }
                format!("{:.*e}", digits as usize, n)
            }
        };
        Ok(Value::string(exponent_with_sign(&text)))
    });

    install_method(interp, number_proto, "toPrecision", 1, |interp, call| {
        let n = number_of_this(interp, &call)?;
        let Some(arg) = call.args.first().filter(|v| !matches!(v, Value::Undefined)) else {
            return Ok(Value::string(format_number(n)));
        };
        let precision = to_integer(interp.to_number(arg));
        if !(1.0..=100.0).contains(&precision) {
            return Err(
                interp.throw_range_error("toPrecision() argument must be between 1 and 100")
            );
        }
        if n.is_nan() || n.is_infinite() {
            return Ok(Value::string(format_number(n)));
        }
        let precision = precision as usize;
        let magnitude = if n == 0.0 { 0 } else { n.abs().log10().floor() as i64 };
        let text = if magnitude < -6 || magnitude >= precision as i64 {
            exponent_with_sign(&format!("{:.*e}", precision - 1, n))
        } else {
            let decimals = (precision as i64 - 1 - magnitude).max(0) as usize;
            format!("{:.*}", decimals, n)
        };
        Ok(Value::string(text))
    });

    install_ctor(interp, "Boolean", boolean_proto, 1, |interp, call| {
        let b = crate::interp::convert::to_boolean(&call.arg(0));
        if call.called_with_new {
            if let Some(this) = call.this.as_object() {
                let object = interp.heap.get_mut(this);
                object.class = ClassTag::Boolean;
                object.data = Some(BackingData::Boolean(b));
                return Ok(call.this.clone());
            }
        }
        Ok(Value::Boolean(b))
    });

    install_method(interp, boolean_proto, "toString", 0, |interp, call| {
        Ok(Value::string(boolean_of_this(interp, &call)?.to_string()))
    });
    install_method(interp, boolean_proto, "valueOf", 0, |interp, call| {
        Ok(Value::Boolean(boolean_of_this(interp, &call)?))
    });

    // Global numeric functions.
    let global = interp.global_object;
    install_method(interp, global, "parseInt", 2, |interp, call| {
        let text = interp.to_display(&call.arg(0));
        let radix = to_integer(interp.to_number(&call.arg(1))) as i64;
        Ok(Value::Number(parse_int(&text, radix)))
    });
    install_method(interp, global, "parseFloat", 1, |interp, call| {
        let text = interp.to_display(&call.arg(0));
        Ok(Value::Number(parse_float_prefix(&text)))
    });
    install_method(interp, global, "isNaN", 1, |interp, call| {
        Ok(Value::Boolean(interp.to_number(&call.arg(0)).is_nan()))
    });
    install_method(interp, global, "isFinite", 1, |interp, call| {
        Ok(Value::Boolean(interp.to_number(&call.arg(0)).is_finite()))
    });
}

fn boolean_of_this(interp: &mut Interpreter, call: &NativeCall) -> Result<bool, Abort> {
    match &call.this {
        Value::Boolean(b) => Ok(*b),
        Value::Object(obj) => match interp.heap.get(*obj).data {
            Some(BackingData::Boolean(b)) => Ok(b),
            _ => Err(interp.throw_type_error(
                "Boolean.prototype.valueOf requires that 'this' be a Boolean",
            )),
        },
        _ => Err(interp.throw_type_error(
            "Boolean.prototype.valueOf requires that 'this' be a Boolean",
        )),
    }
}

/// Rust renders `1.5e2`; the language wants `1.5e+2`.
fn exponent_with_sign(text: &str) -> String {
    match text.find('e') {
        Some(pos) if !text[pos + 1..].starts_with('-') => {
            format!("{}e+{}", &text[..pos], &text[pos + 1..])
        }
        _ => text.to_string(),
    }
}

fn number_to_radix(n: f64, radix: u32) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let negative = n < 0.0;
    let mut integral = n.abs().trunc();
    let mut fraction = n.abs().fract();
    let digit = |d: u32| std::char::from_digit(d, radix).unwrap_or('0');

    let mut int_digits = Vec::new();
    if integral == 0.0 {
        int_digits.push('0');
    }
    while integral >= 1.0 {
        let d = (integral % radix as f64) as u32;
        int_digits.push(digit(d));
        integral = (integral / radix as f64).trunc();
    }
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.extend(int_digits.iter().rev());
    if fraction > 0.0 {
        out.push('.');
        // Twenty fractional digits is plenty for a debugging radix dump.
        for _ in 0..20 {
            fraction *= radix as f64;
            let d = fraction.trunc() as u32;
            out.push(digit(d));
            fraction -= fraction.trunc();
            if fraction == 0.0 {
                break;
            }
        }
    }
    out
}

fn parse_int(text: &str, radix: i64) -> f64 {
    let trimmed = text.trim_matches(|c: char| c.is_whitespace());
    let (sign, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let (radix, rest) = match radix {
        0 => {
            if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
                (16, hex)
            } else {
                (10, rest)
            }
        }
        16 => {
            let stripped = rest
                .strip_prefix("0x")
                .or_else(|| rest.strip_prefix("0X"))
                .unwrap_or(rest);
            (16, stripped)
        }
        r if (2..=36).contains(&r) => (r as u32, rest),
        _ => return f64::NAN,
    };
    let mut value = 0.0f64;
    let mut any = false;
    for ch in rest.chars() {
        let Some(d) = ch.to_digit(radix) else { break };
        value = value * radix as f64 + d as f64;
        any = true;
    }
    if any {
        sign * value
    } else {
        f64::NAN
    }
}

fn parse_float_prefix(text: &str) -> f64 {
    let trimmed = text.trim_start_matches(|c: char| c.is_whitespace());
    let bytes = trimmed.as_bytes();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exp = false;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    if trimmed[end..].starts_with("Infinity") {
        return parse_js_number(&trimmed[..end + "Infinity".len()]);
    }
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => {
                seen_digit = true;
                end += 1;
            }
            b'.' if !seen_dot && !seen_exp => {
                seen_dot = true;
                end += 1;
            }
            b'e' | b'E' if seen_digit && !seen_exp => {
                let mut probe = end + 1;
                if probe < bytes.len() && (bytes[probe] == b'+' || bytes[probe] == b'-') {
                    probe += 1;
                }
                if probe < bytes.len() && bytes[probe].is_ascii_digit() {
                    seen_exp = true;
                    end = probe;
                } else {
                    break;
                }
            }
            _ => break,
        }
    }
    if !seen_digit {
        return f64::NAN;
    }
    trimmed[..end].parse().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_int_forms() {
        assert_eq!(parse_int("42", 0), 42.0);
        assert_eq!(parse_int("  -17px", 0), -17.0);
        assert_eq!(parse_int("0x1f", 0), 31.0);
        assert_eq!(parse_int("ff", 16), 255.0);
        assert_eq!(parse_int("101", 2), 5.0);
        assert!(parse_int("zz", 10).is_nan());
        assert!(parse_int("5", 1).is_nan());
    }

    #[test]
    fn parse_float_prefix_forms() {
        assert_eq!(parse_float_prefix("3.14abc"), 3.14);
        assert_eq!(parse_float_prefix("  2.5e2xyz"), 250.0);
        assert_eq!(parse_float_prefix("-Infinity"), f64::NEG_INFINITY);
        assert!(parse_float_prefix("px12").is_nan());
    }

    #[test]
    fn radix_rendering() {
        assert_eq!(number_to_radix(255.0, 16), "ff");
        assert_eq!(number_to_radix(-8.0, 2), "-1000");
        assert_eq!(number_to_radix(0.5, 2), "0.1");
    }
}

use std::rc::Rc;

use super::{install_ctor, install_method};
use crate::interp::convert::to_integer;
use crate::interp::{Abort, Interpreter, NativeCall};
use crate::value::{BackingData, ClassTag, Value};

fn this_string(interp: &mut Interpreter, call: &NativeCall) -> String {
    interp.to_display(&call.this)
}

/// Char-indexed view used by the slicing methods.
fn chars_of(s: &str) -> Vec<char> {
    s.chars().collect()
}

fn clamp_index(n: f64, length: usize) -> usize {
    if n.is_nan() || n < 0.0 {
        0
    } else if n > length as f64 {
        length
    } else {
        n.trunc() as usize
    }
}

fn relative_clamp(n: f64, length: usize) -> usize {
    if n < 0.0 {
        let back = (-n).trunc() as usize;
        length.saturating_sub(back)
    } else {
        clamp_index(n, length)
    }
}

pub(crate) fn init(interp: &mut Interpreter) {
    let string_proto = interp.protos.string_proto;

    let ctor = install_ctor(interp, "String", string_proto, 1, |interp, call| {
        let text = if call.args.is_empty() {
            String::new()
        } else {
            interp.to_display(&call.arg(0))
        };
        if call.called_with_new {
            let Some(this) = call.this.as_object() else {
                return Ok(Value::string(text));
            };
            let object = interp.heap.get_mut(this);
            object.class = ClassTag::String;
            object.data = Some(BackingData::String(Rc::from(text.as_str())));
            return Ok(call.this.clone());
        }
        Ok(Value::string(text))
    });

    install_method(interp, ctor, "fromCharCode", 1, |interp, call| {
        let mut out = String::with_capacity(call.args.len());
        for arg in &call.args {
            let code = crate::interp::convert::to_uint32(interp.to_number(arg)) as u32 & 0xffff;
            out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
        }
        Ok(Value::string(out))
    });

    install_method(interp, string_proto, "toString", 0, string_value);
    install_method(interp, string_proto, "valueOf", 0, string_value);

    install_method(interp, string_proto, "charAt", 1, |interp, call| {
        let s = this_string(interp, &call);
        let index = to_integer(interp.to_number(&call.arg(0)));
        if index < 0.0 {
            return Ok(Value::string(""));
        }
        Ok(match s.chars().nth(index as usize) {
            Some(c) => Value::string(c.to_string()),
            None => Value::string(""),
        })
    });

    install_method(interp, string_proto, "charCodeAt", 1, |interp, call| {
        let s = this_string(interp, &call);
        let index = to_integer(interp.to_number(&call.arg(0)));
        if index < 0.0 {
            return Ok(Value::Number(f64::NAN));
        }
        Ok(match s.chars().nth(index as usize) {
            Some(c) => Value::Number(c as u32 as f64),
            None => Value::Number(f64::NAN),
        })
    });

    install_method(interp, string_proto, "indexOf", 1, |interp, call| {
        let s = chars_of(&this_string(interp, &call));
        let search = chars_of(&interp.to_display(&call.arg(0)));
        let from = clamp_index(interp.to_number(&call.arg(1)), s.len());
        Ok(Value::Number(find_chars(&s, &search, from, false)))
    });

    install_method(interp, string_proto, "lastIndexOf", 1, |interp, call| {
        let s = chars_of(&this_string(interp, &call));
        let search = chars_of(&interp.to_display(&call.arg(0)));
        let from = match call.args.get(1) {
            Some(Value::Undefined) | None => s.len(),
            Some(value) => {
                let n = interp.to_number(value);
                if n.is_nan() {
                    s.len()
                } else {
                    clamp_index(n, s.len())
                }
            }
        };
        Ok(Value::Number(find_chars(&s, &search, from, true)))
    });

    install_method(interp, string_proto, "slice", 2, |interp, call| {
        let s = chars_of(&this_string(interp, &call));
        let start = match call.args.first() {
            None | Some(Value::Undefined) => 0,
            Some(value) => {
                let n = interp.to_number(value);
                relative_clamp(to_integer(n), s.len())
            }
        };
        let end = match call.args.get(1) {
            None | Some(Value::Undefined) => s.len(),
            Some(value) => {
                let n = interp.to_number(value);
                relative_clamp(to_integer(n), s.len())
            }
        };
        let out: String = if start < end {
            s[start..end].iter().collect()
        } else {
            String::new()
        };
        Ok(Value::string(out))
    });

    install_method(interp, string_proto, "substring", 2, |interp, call| {
        let s = chars_of(&this_string(interp, &call));
        let a = match call.args.first() {
            None | Some(Value::Undefined) => 0,
            Some(value) => clamp_index(to_integer(interp.to_number(value)), s.len()),
        };
        let b = match call.args.get(1) {
            None | Some(Value::Undefined) => s.len(),
            Some(value) => clamp_index(to_integer(interp.to_number(value)), s.len()),
        };
        let (start, end) = if a <= b { (a, b) } else { (b, a) };
        Ok(Value::string(s[start..end].iter().collect::<String>()))
    });

    install_method(interp, string_proto, "substr", 2, |interp, call| {
        let s = chars_of(&this_string(interp, &call));
        let start = match call.args.first() {
            None | Some(Value::Undefined) => 0,
            Some(value) => relative_clamp(to_integer(interp.to_number(value)), s.len()),
        };
        let count = match call.args.get(1) {
            None | Some(Value::Undefined) => s.len().saturating_sub(start),
            Some(value) => {
                let n = to_integer(interp.to_number(value));
                if n < 0.0 {
                    0
                } else {
                    n as usize
                }
            }
        };
        let end = (start + count).min(s.len());
        Ok(Value::string(s[start..end].iter().collect::<String>()))
    });

    install_method(interp, string_proto, "toLowerCase", 0, |interp, call| {
        Ok(Value::string(this_string(interp, &call).to_lowercase()))
    });

    install_method(interp, string_proto, "toUpperCase", 0, |interp, call| {
        Ok(Value::string(this_string(interp, &call).to_uppercase()))
    });

    install_method(interp, string_proto, "trim", 0, |interp, call| {
        Ok(Value::string(this_string(interp, &call).trim().to_string()))
    });

    install_method(interp, string_proto, "concat", 1, |interp, call| {
        let mut out = this_string(interp, &call);
        for arg in &call.args {
            out.push_str(&interp.to_display(arg));
        }
        Ok(Value::string(out))
    });

    install_method(interp, string_proto, "localeCompare", 1, |interp, call| {
        let s = this_string(interp, &call);
        let other = interp.to_display(&call.arg(0));
        Ok(Value::Number(match s.cmp(&other) {
            std::cmp::Ordering::Less => -1.0,
            std::cmp::Ordering::Equal => 0.0,
            std::cmp::Ordering::Greater => 1.0,
        }))
    });

    // split / match / search / replace / exec live with the regex backend
    // wiring.
    super::regexp::install_string_methods(interp, string_proto);
}

fn string_value(interp: &mut Interpreter, call: NativeCall) -> Result<Value, Abort> {
    match &call.this {
        Value::String(s) => Ok(Value::String(Rc::clone(s))),
        Value::Object(obj) => match &interp.heap.get(*obj).data {
            Some(BackingData::String(s)) => Ok(Value::String(Rc::clone(s))),
            _ => Err(interp.throw_type_error(
                "String.prototype.valueOf requires that 'this' be a String",
            )),
        },
        _ => Err(interp.throw_type_error(
            "String.prototype.valueOf requires that 'this' be a String",
        )),
    }
}

/// Char-vector substring search; `backwards` finds the last occurrence at
/// or before `from`.
fn find_chars(haystack: &[char], needle: &[char], from: usize, backwards: bool) -> f64 {
    if needle.len() > haystack.len() {
        return -1.0;
    }
    let last_start = haystack.len() - needle.len();
    if backwards {
        let mut i = from.min(last_start);
        loop {
            if haystack[i..i + needle.len()] == *needle {
                return i as f64;
            }
            if i == 0 {
                return -1.0;
            }
            i -= 1;
        }
    } else {
        for i in from..=last_start {
            if haystack[i..i + needle.len()] == *needle {
                return i as f64;
            }
        }
        -1.0
    }
}

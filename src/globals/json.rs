use std::rc::Rc;

use super::install_method;
use crate::interp::convert::{format_number, to_integer};
use crate::interp::{Abort, Interpreter};
use crate::value::{BackingData, ClassTag, JsStr, ObjectRef, Value, NONENUMERABLE};

pub(crate) fn init(interp: &mut Interpreter) {
    let json = interp.create_plain_object();
    let global = interp.global_object;
    interp.define_property(global, Rc::from("JSON"), Value::Object(json), NONENUMERABLE);

    install_method(interp, json, "parse", 2, |interp, call| {
        let text = interp.to_display(&call.arg(0));
        let mut parser = JsonParser {
            bytes: text.as_bytes(),
            pos: 0,
        };
        parser.skip_ws();
        let value = parser.parse_value(interp)?;
        parser.skip_ws();
        if parser.pos != parser.bytes.len() {
            return Err(interp.throw_syntax_error("Unexpected token in JSON"));
        }
        Ok(value)
    });

    install_method(interp, json, "stringify", 3, |interp, call| {
        let indent = match call.arg(2) {
            Value::Number(n) => " ".repeat(to_integer(n).clamp(0.0, 10.0) as usize),
            Value::String(s) => s.chars().take(10).collect(),
            _ => String::new(),
        };
        let mut writer = JsonWriter {
            indent,
            seen: Vec::new(),
        };
        let mut out = String::new();
        let wrote = writer.write(interp, &call.arg(0), &mut out, 0)?;
        if wrote {
            Ok(Value::string(out))
        } else {
            Ok(Value::Undefined)
        }
    });
}

struct JsonParser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> JsonParser<'a> {
    fn skip_ws(&mut self) {
        while self.pos < self.bytes.len()
            && matches!(self.bytes[self.pos], b' ' | b'\t' | b'\n' | b'\r')
        {
            self.pos += 1;
        }
    }

    fn error(&self, interp: &mut Interpreter) -> Abort {
        interp.throw_syntax_error(format!("Unexpected token in JSON at position {}", self.pos))
    }

    fn eat(&mut self, literal: &str) -> bool {
        if self.bytes[self.pos..].starts_with(literal.as_bytes()) {
            self.pos += literal.len();
            true
        } else {
            false
        }
    }

    fn parse_value(&mut self, interp: &mut Interpreter) -> Result<Value, Abort> {
        self.skip_ws();
        let Some(&b) = self.bytes.get(self.pos) else {
            return Err(self.error(interp));
        };
        match b {
            b'n' => {
                if self.eat("null") {
                    Ok(Value::Null)
                } else {
                    Err(self.error(interp))
                }
            }
            b't' => {
                if self.eat("true") {
                    Ok(Value::Boolean(true))
                } else {
                    Err(self.error(interp))
                }
            }
            b'f' => {
                if self.eat("false") {
                    Ok(Value::Boolean(false))
                } else {
                    Err(self.error(interp))
                }
            }
            b'"' => Ok(Value::string(self.parse_string(interp)?)),
            b'[' => {
                self.pos += 1;
                let array = interp.create_array();
                self.skip_ws();
                if self.bytes.get(self.pos) == Some(&b']') {
                    self.pos += 1;
                    return Ok(Value::Object(array));
                }
                let mut index = 0usize;
                loop {
                    let element = self.parse_value(interp)?;
                    let key: JsStr = Rc::from(index.to_string().as_str());
                    interp.define_data_property(array, key, element);
                    index += 1;
                    self.skip_ws();
                    match self.bytes.get(self.pos) {
                        Some(&b',') => {
                            self.pos += 1;
                        }
                        Some(&b']') => {
                            self.pos += 1;
                            return Ok(Value::Object(array));
                        }
                        _ => return Err(self.error(interp)),
                    }
                }
            }
            b'{' => {
                self.pos += 1;
                let object = interp.create_plain_object();
                self.skip_ws();
                if self.bytes.get(self.pos) == Some(&b'}') {
                    self.pos += 1;
                    return Ok(Value::Object(object));
                }
                loop {
                    self.skip_ws();
                    if self.bytes.get(self.pos) != Some(&b'"') {
                        return Err(self.error(interp));
                    }
                    let key = self.parse_string(interp)?;
                    self.skip_ws();
                    if self.bytes.get(self.pos) != Some(&b':') {
                        return Err(self.error(interp));
                    }
                    self.pos += 1;
                    let value = self.parse_value(interp)?;
                    interp.define_data_property(object, Rc::from(key.as_str()), value);
                    self.skip_ws();
                    match self.bytes.get(self.pos) {
                        Some(&b',') => {
                            self.pos += 1;
                        }
                        Some(&b'}') => {
                            self.pos += 1;
                            return Ok(Value::Object(object));
                        }
                        _ => return Err(self.error(interp)),
                    }
                }
            }
            b'-' | b'0'..=b'9' => self.parse_number(interp),
            _ => Err(self.error(interp)),
        }
    }

    fn parse_number(&mut self, interp: &mut Interpreter) -> Result<Value, Abort> {
        let start = self.pos;
        if self.bytes.get(self.pos) == Some(&b'-') {
            self.pos += 1;
        }
        while self
            .bytes
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_digit())
        {
            self.pos += 1;
        }
        if self.bytes.get(self.pos) == Some(&b'.') {
            self.pos += 1;
            while self
                .bytes
                .get(self.pos)
                .is_some_and(|b| b.is_ascii_digit())
            {
                self.pos += 1;
            }
        }
        if matches!(self.bytes.get(self.pos), Some(b'e') | Some(b'E')) {
            self.pos += 1;
            if matches!(self.bytes.get(self.pos), Some(b'+') | Some(b'-')) {
                self.pos += 1;
            }
            while self
                .bytes
                .get(self.pos)
                .is_some_and(|b| b.is_ascii_digit())
            {
                self.pos += 1;
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap_or("");
        match text.parse::<f64>() {
            Ok(n) => Ok(Value::Number(n)),
            Err(_) => Err(self.error(interp)),
        }
    }

    fn parse_string(&mut self, interp: &mut Interpreter) -> Result<String, Abort> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            let Some(&b) = self.bytes.get(self.pos) else {
                return Err(self.error(interp));
            };
            match b {
                b'"' => {
                    self.pos += 1;
                    return Ok(out);
                }
                b'\\' => {
                    self.pos += 1;
                    let Some(&esc) = self.bytes.get(self.pos) else {
                        return Err(self.error(interp));
                    };
                    self.pos += 1;
                    match esc {
                        b'"' => out.push('"'),
                        b'\\' => out.push('\\'),
                        b'/' => out.push('/'),
                        b'b' => out.push('\u{8}'),
                        b'f' => out.push('\u{c}'),
                        b'n' => out.push('\n'),
                        b'r' => out.push('\r'),
                        b't' => out.push('\t'),
                        b'u' => {
                            if self.pos + 4 > self.bytes.len() {
                                return Err(self.error(interp));
                            }
                            let hex =
                                std::str::from_utf8(&self.bytes[self.pos..self.pos + 4])
                                    .unwrap_or("");
                            let Ok(code) = u32::from_str_radix(hex, 16) else {
                                return Err(self.error(interp));
                            };
                            self.pos += 4;
                            out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                        }
                        _ => return Err(self.error(interp)),
                    }
                }
                _ => {
                    let rest = std::str::from_utf8(&self.bytes[self.pos..]).unwrap_or("");
                    let ch = rest.chars().next().unwrap_or('\u{fffd}');
                    out.push(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }
    }
}

struct JsonWriter {
    indent: String,
    seen: Vec<ObjectRef>,
}

impl JsonWriter {
    fn newline(&self, out: &mut String, depth: usize) {
        if !self.indent.is_empty() {
            out.push('\n');
            for _ in 0..depth {
                out.push_str(&self.indent);
            }
        }
    }

    /// Returns false for values JSON leaves out entirely (undefined and
    /// functions).
    fn write(
        &mut self,
        interp: &mut Interpreter,
        value: &Value,
        out: &mut String,
        depth: usize,
    ) -> Result<bool, Abort> {
        match value {
            Value::Undefined => Ok(false),
            Value::Null => {
                out.push_str("null");
                Ok(true)
            }
            Value::Boolean(b) => {
                out.push_str(if *b { "true" } else { "false" });
                Ok(true)
            }
            Value::Number(n) => {
                if n.is_finite() {
                    out.push_str(&format_number(*n));
                } else {
                    out.push_str("null");
                }
                Ok(true)
            }
            Value::String(s) => {
                write_json_string(s, out);
                Ok(true)
            }
            Value::Object(obj) => self.write_object(interp, *obj, out, depth),
        }
    }

    fn write_object(
        &mut self,
        interp: &mut Interpreter,
        obj: ObjectRef,
        out: &mut String,
        depth: usize,
    ) -> Result<bool, Abort> {
        let object = interp.heap.get(obj);
        if object.is_callable() {
            return Ok(false);
        }
        match &object.data {
            Some(BackingData::Date(ms)) => {
                match super::date::date_to_iso(*ms) {
                    Some(text) => write_json_string(&text, out),
                    None => out.push_str("null"),
                }
                return Ok(true);
            }
            Some(BackingData::String(s)) => {
                let s = s.to_string();
                write_json_string(&s, out);
                return Ok(true);
            }
            Some(BackingData::Number(n)) => {
                let n = *n;
                if n.is_finite() {
                    out.push_str(&format_number(n));
                } else {
                    out.push_str("null");
                }
                return Ok(true);
            }
            Some(BackingData::Boolean(b)) => {
                out.push_str(if *b { "true" } else { "false" });
                return Ok(true);
            }
            _ => {}
        }
        if self.seen.contains(&obj) {
            return Err(interp.throw_type_error("Converting circular structure to JSON"));
        }
        self.seen.push(obj);

        let result = if interp.heap.get(obj).class == ClassTag::Array {
            let length = interp.array_length(obj);
            out.push('[');
            for i in 0..length {
                if i > 0 {
                    out.push(',');
                }
                self.newline(out, depth + 1);
                let element = interp.array_get(obj, i).unwrap_or(Value::Undefined);
                if !self.write(interp, &element, out, depth + 1)? {
                    out.push_str("null");
                }
            }
            if length > 0 {
                self.newline(out, depth);
            }
            out.push(']');
            Ok(true)
        } else {
            let entries: Vec<(JsStr, Value)> = interp
                .heap
                .get(obj)
                .properties
                .iter()
                .filter(|(_, property)| property.enumerable && !property.is_accessor())
                .map(|(key, property)| (Rc::clone(key), property.value.clone()))
                .collect();
            out.push('{');
            let mut wrote_any = false;
            for (key, value) in entries {
                let mut piece = String::new();
                if self.write(interp, &value, &mut piece, depth + 1)? {
                    if wrote_any {
                        out.push(',');
                    }
                    self.newline(out, depth + 1);
                    write_json_string(&key, out);
                    out.push(':');
                    if !self.indent.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(&piece);
                    wrote_any = true;
                }
            }
            if wrote_any {
                self.newline(out, depth);
            }
            out.push('}');
            Ok(true)
        };
        self.seen.pop();
        result
    }
}

fn write_json_string(s: &str, out: &mut String) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

use std::rc::Rc;
use std::time::Instant;

use super::{install_async_method, install_ctor, install_method};
use crate::interp::convert::to_integer;
use crate::interp::{Abort, Interpreter, NativeCall, PendingRegexJob};
use crate::regex_backend::{
    self, ExecCapture, RegexRequest, RegexResponse, RegexpMode,
};
use crate::value::{
    BackingData, ClassTag, ObjectRef, RegExpData, RegexFlags, Value, NONENUMERABLE,
    READONLY_NONENUMERABLE,
};

/// Post-processing applied to a backend response on the evaluator thread.
#[derive(Debug)]
pub(crate) enum RegexFinish {
    Exec { regex: ObjectRef, subject: String },
    MatchOne { subject: String },
    MatchAll,
    Search,
    Split,
    Replace,
}

enum Prepared {
    Immediate(Value),
    Job(RegexRequest, RegexFinish),
}

impl Interpreter {
    pub(crate) fn create_regexp_object(
        &mut self,
        source: &str,
        flags: &str,
    ) -> Result<ObjectRef, Abort> {
        let Some(parsed_flags) = RegexFlags::parse(flags) else {
            return Err(self.throw_syntax_error(format!(
                "Invalid regular expression flags: {}",
                flags
            )));
        };
        if self.config.regexp_mode != RegexpMode::Disabled {
            if let Err(message) = regex_backend::compile_check(source, parsed_flags) {
                return Err(self.throw_syntax_error(format!(
                    "Invalid regular expression: {}",
                    message
                )));
            }
        }
        Ok(self.create_regexp_raw(source, parsed_flags))
    }

    /// Allocation half of regex construction; the caller has already
    /// validated the pattern.
    pub(crate) fn create_regexp_raw(&mut self, source: &str, flags: RegexFlags) -> ObjectRef {
        let proto = self.protos.regexp_proto;
        let obj = self.create_object(Some(proto));
        {
            let object = self.heap.get_mut(obj);
            object.class = ClassTag::RegExp;
            object.data = Some(BackingData::RegExp(RegExpData {
                source: Rc::from(source),
                flags,
            }));
        }
        self.define_property(
            obj,
            Rc::from("source"),
            Value::string(source),
            READONLY_NONENUMERABLE,
        );
        self.define_property(
            obj,
            Rc::from("global"),
            Value::Boolean(flags.global),
            READONLY_NONENUMERABLE,
        );
        self.define_property(
            obj,
            Rc::from("ignoreCase"),
            Value::Boolean(flags.ignore_case),
            READONLY_NONENUMERABLE,
        );
        self.define_property(
            obj,
            Rc::from("multiline"),
            Value::Boolean(flags.multiline),
            READONLY_NONENUMERABLE,
        );
        self.define_property(obj, Rc::from("lastIndex"), Value::Number(0.0), NONENUMERABLE);
        obj
    }

    fn regex_data(&self, value: &Value) -> Option<RegExpData> {
        let obj = value.as_object()?;
        match &self.heap.get(obj).data {
            Some(BackingData::RegExp(data)) => Some(data.clone()),
            _ => None,
        }
    }
}

pub(crate) fn init(interp: &mut Interpreter) {
    let regexp_proto = interp.protos.regexp_proto;

    install_ctor(interp, "RegExp", regexp_proto, 2, |interp, call| {
        if let Some(data) = interp.regex_data(&call.arg(0)) {
            if !matches!(call.arg(1), Value::Undefined) {
                return Err(interp.throw_type_error(
                    "Cannot supply flags when constructing one RegExp from another",
                ));
            }
            let obj = interp.create_regexp_object(&data.source, &data.flags.text())?;
            return Ok(Value::Object(obj));
        }
        let source = match call.arg(0) {
            Value::Undefined => String::new(),
            other => interp.to_display(&other),
        };
        let flags = match call.arg(1) {
            Value::Undefined => String::new(),
            other => interp.to_display(&other),
        };
        let obj = interp.create_regexp_object(&source, &flags)?;
        Ok(Value::Object(obj))
    });

    install_method(interp, regexp_proto, "toString", 0, |interp, call| {
        match interp.regex_data(&call.this) {
            Some(data) => Ok(Value::string(format!(
                "/{}/{}",
                data.source,
                data.flags.text()
            ))),
            None => Err(interp.throw_type_error(
                "RegExp.prototype.toString requires that 'this' be a RegExp",
            )),
        }
    });

    install_regex_op(interp, regexp_proto, "exec", 1, prepare_exec);
}

pub(crate) fn install_string_methods(interp: &mut Interpreter, string_proto: ObjectRef) {
    install_regex_op(interp, string_proto, "split", 2, prepare_split);
    install_regex_op(interp, string_proto, "match", 1, prepare_match);
    install_regex_op(interp, string_proto, "search", 1, prepare_search);
    install_regex_op(interp, string_proto, "replace", 2, prepare_replace);
}

/// Wires one regex-consuming operation according to the configured mode:
/// inline natives for disabled/native, a pausing async native for the
/// sandboxed worker.
fn install_regex_op(
    interp: &mut Interpreter,
    target: ObjectRef,
    name: &str,
    length: u32,
    prepare: fn(&mut Interpreter, &NativeCall) -> Result<Prepared, Abort>,
) {
    match interp.config.regexp_mode {
        RegexpMode::Disabled | RegexpMode::Native => {
            install_method(interp, target, name, length, move |interp, call| {
                match prepare(interp, &call)? {
                    Prepared::Immediate(value) => Ok(value),
                    Prepared::Job(request, finish_kind) => {
                        if interp.config.regexp_mode == RegexpMode::Disabled {
                            return Err(
                                interp.throw_plain_error("Regular expressions not supported")
                            );
                        }
                        match regex_backend::run_request(request) {
                            RegexResponse::Budget => {
                                Err(interp.throw_plain_error("RegExp Timeout"))
                            }
                            RegexResponse::Error(message) => {
                                Err(interp.throw_plain_error(message))
                            }
                            response => Ok(finish(interp, finish_kind, response)),
                        }
                    }
                }
            });
        }
        RegexpMode::Sandboxed => {
            install_async_method(interp, target, name, length, move |interp, call, handle| {
                match prepare(interp, &call)? {
                    Prepared::Immediate(value) => {
                        interp.resolve_async(handle, value);
                        Ok(())
                    }
                    Prepared::Job(request, finish_kind) => {
                        let rx = regex_backend::spawn_worker(request);
                        let deadline = Instant::now() + interp.config.regexp_thread_timeout;
                        interp.pending_regex = Some(PendingRegexJob {
                            task_id: handle.id,
                            deadline,
                            rx,
                            finish: finish_kind,
                        });
                        Ok(())
                    }
                }
            });
        }
    }
}

fn prepare_exec(interp: &mut Interpreter, call: &NativeCall) -> Result<Prepared, Abort> {
    let Some(data) = interp.regex_data(&call.this) else {
        return Err(
            interp.throw_type_error("RegExp.prototype.exec requires that 'this' be a RegExp")
        );
    };
    let subject = interp.to_display(&call.arg(0));
    let regex = call.this.as_object().expect("checked regex object");
    let start = if data.flags.global {
        let last_index = interp
            .heap
            .get(regex)
            .peek("lastIndex")
            .cloned()
            .map(|v| to_integer(interp.to_number(&v)))
            .unwrap_or(0.0);
        if last_index < 0.0 {
            0
        } else {
            last_index as usize
        }
    } else {
        0
    };
    Ok(Prepared::Job(
        RegexRequest::Exec {
            source: data.source.to_string(),
            flags: data.flags,
            subject: subject.clone(),
            start,
        },
        RegexFinish::Exec { regex, subject },
    ))
}

/// Accepts a RegExp or a pattern source; strings compile with no flags.
fn argument_regex(
    interp: &mut Interpreter,
    value: &Value,
) -> Result<(String, RegexFlags), Abort> {
    if let Some(data) = interp.regex_data(value) {
        return Ok((data.source.to_string(), data.flags));
    }
    let source = match value {
        Value::Undefined => String::new(),
        other => interp.to_display(other),
    };
    let flags = RegexFlags::parse("").expect("empty flags");
    if interp.config.regexp_mode != RegexpMode::Disabled {
        if let Err(message) = regex_backend::compile_check(&source, flags) {
            return Err(interp.throw_syntax_error(format!(
                "Invalid regular expression: {}",
                message
            )));
        }
    }
    Ok((source, flags))
}

fn prepare_match(interp: &mut Interpreter, call: &NativeCall) -> Result<Prepared, Abort> {
    let subject = interp.to_display(&call.this);
    let (source, flags) = argument_regex(interp, &call.arg(0))?;
    if let Some(regex) = call.arg(0).as_object() {
        if flags.global && interp.regex_data(&call.arg(0)).is_some() {
            // A global match restarts from the beginning regardless of
            // prior exec state.
            interp.define_data_property(regex, Rc::from("lastIndex"), Value::Number(0.0));
        }
    }
    if flags.global {
        Ok(Prepared::Job(
            RegexRequest::MatchGlobal {
                source,
                flags,
                subject,
            },
            RegexFinish::MatchAll,
        ))
    } else {
        Ok(Prepared::Job(
            RegexRequest::Exec {
                source,
                flags,
                subject: subject.clone(),
                start: 0,
            },
            RegexFinish::MatchOne { subject },
        ))
    }
}

fn prepare_search(interp: &mut Interpreter, call: &NativeCall) -> Result<Prepared, Abort> {
    let subject = interp.to_display(&call.this);
    let (source, flags) = argument_regex(interp, &call.arg(0))?;
    Ok(Prepared::Job(
        RegexRequest::Search {
            source,
            flags,
            subject,
        },
        RegexFinish::Search,
    ))
}

fn prepare_split(interp: &mut Interpreter, call: &NativeCall) -> Result<Prepared, Abort> {
    let subject = interp.to_display(&call.this);
    let limit = match call.args.get(1) {
        None | Some(Value::Undefined) => None,
        Some(value) => Some(crate::interp::convert::to_uint32(interp.to_number(value)) as usize),
    };
    let separator = call.arg(0);
    if interp.regex_data(&separator).is_some() {
        let (source, flags) = argument_regex(interp, &separator)?;
        return Ok(Prepared::Job(
            RegexRequest::Split {
                source,
                flags,
                subject,
                limit,
            },
            RegexFinish::Split,
        ));
    }
    // String separators never touch the backend.
    let parts: Vec<String> = match &separator {
        Value::Undefined => vec![subject],
        other => {
            let sep = interp.to_display(other);
            if sep.is_empty() {
                subject.chars().map(|c| c.to_string()).collect()
            } else {
                subject.split(&sep).map(|s| s.to_string()).collect()
            }
        }
    };
    let mut values: Vec<Value> = parts.into_iter().map(Value::string).collect();
    if let Some(limit) = limit {
        values.truncate(limit);
    }
    let array = interp.vec_to_array(values);
    Ok(Prepared::Immediate(Value::Object(array)))
}

fn prepare_replace(interp: &mut Interpreter, call: &NativeCall) -> Result<Prepared, Abort> {
    let subject = interp.to_display(&call.this);
    let replacement = interp.to_display(&call.arg(1));
    let pattern = call.arg(0);
    if interp.regex_data(&pattern).is_some() {
        let (source, flags) = argument_regex(interp, &pattern)?;
        return Ok(Prepared::Job(
            RegexRequest::Replace {
                source,
                flags,
                subject,
                replacement,
            },
            RegexFinish::Replace,
        ));
    }
    // Plain-string pattern: first occurrence, `$&`-style expansion only.
    let needle = interp.to_display(&pattern);
    let replaced = match subject.find(&needle) {
        Some(at) => {
            let mut out = String::with_capacity(subject.len());
            out.push_str(&subject[..at]);
            out.push_str(&expand_plain(&replacement, &subject, at, &needle));
            out.push_str(&subject[at + needle.len()..]);
            out
        }
        None => subject,
    };
    Ok(Prepared::Immediate(Value::string(replaced)))
}

fn expand_plain(template: &str, subject: &str, at: usize, matched: &str) -> String {
    let mut out = String::new();
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() {
            match bytes[i + 1] {
                b'$' => {
                    out.push('$');
                    i += 2;
                    continue;
                }
                b'&' => {
                    out.push_str(matched);
                    i += 2;
                    continue;
                }
                b'`' => {
                    out.push_str(&subject[..at]);
                    i += 2;
                    continue;
                }
                b'\'' => {
                    out.push_str(&subject[at + matched.len()..]);
                    i += 2;
                    continue;
                }
                _ => {}
            }
        }
        let ch = template[i..].chars().next().unwrap_or('$');
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

fn build_exec_array(interp: &mut Interpreter, capture: &ExecCapture, subject: &str) -> ObjectRef {
    let values: Vec<Value> = capture
        .groups
        .iter()
        .map(|group| match group {
            Some(text) => Value::string(text.clone()),
            None => Value::Undefined,
        })
        .collect();
    let array = interp.vec_to_array(values);
    interp.define_data_property(array, Rc::from("index"), Value::Number(capture.index as f64));
    interp.define_data_property(array, Rc::from("input"), Value::string(subject));
    array
}

/// Turns a backend response into an interpreted value, round-tripping
/// `lastIndex` for exec.
pub(crate) fn finish(
    interp: &mut Interpreter,
    finish: RegexFinish,
    response: RegexResponse,
) -> Value {
    match (finish, response) {
        (RegexFinish::Exec { regex, subject }, RegexResponse::Exec(capture)) => {
            let global = interp
                .regex_data(&Value::Object(regex))
                .map(|data| data.flags.global)
                .unwrap_or(false);
            match capture {
                Some(capture) => {
                    if global {
                        interp.define_data_property(
                            regex,
                            Rc::from("lastIndex"),
                            Value::Number(capture.end as f64),
                        );
                    }
                    Value::Object(build_exec_array(interp, &capture, &subject))
                }
                None => {
                    if global {
                        interp.define_data_property(
                            regex,
                            Rc::from("lastIndex"),
                            Value::Number(0.0),
                        );
                    }
                    Value::Null
                }
            }
        }
        (RegexFinish::MatchOne { subject }, RegexResponse::Exec(capture)) => match capture {
            Some(capture) => Value::Object(build_exec_array(interp, &capture, &subject)),
            None => Value::Null,
        },
        (RegexFinish::MatchAll, RegexResponse::MatchGlobal(matches)) => match matches {
            Some(matches) => {
                let values: Vec<Value> = matches.into_iter().map(Value::string).collect();
                Value::Object(interp.vec_to_array(values))
            }
            None => Value::Null,
        },
        (RegexFinish::Search, RegexResponse::Search(found)) => {
            Value::Number(found.map(|i| i as f64).unwrap_or(-1.0))
        }
        (RegexFinish::Split, RegexResponse::Split(parts)) => {
            let values: Vec<Value> = parts
                .into_iter()
                .map(|part| match part {
                    Some(text) => Value::string(text),
                    None => Value::Undefined,
                })
                .collect();
            Value::Object(interp.vec_to_array(values))
        }
        (RegexFinish::Replace, RegexResponse::Replace(text)) => Value::string(text),
        // A mismatched response shape can only come from a backend bug;
        // surface it as null rather than corrupting the program.
        _ => Value::Null,
    }
}

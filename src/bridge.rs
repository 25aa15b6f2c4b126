use std::fmt;
use std::rc::Rc;

use crate::interp::{Abort, AsyncHandle, Interpreter, NativeCall};
use crate::value::{BackingData, ClassTag, JsStr, ObjectRef, RegexFlags, Value};
use crate::{Error, Result};

const BRIDGE_STACK_RED_ZONE: usize = 64 * 1024;
const BRIDGE_STACK_SIZE: usize = 8 * 1024 * 1024;

pub type HostFn = Rc<dyn Fn(&mut Interpreter, Vec<NativeValue>) -> NativeValue>;

/// Host-side exchange value for copy-conversion across the sandbox
/// boundary.
#[derive(Clone)]
pub enum NativeValue {
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    /// `None` entries are holes.
    Array(Vec<Option<NativeValue>>),
    Object(Vec<(String, NativeValue)>),
    Date(f64),
    RegExp {
        source: String,
        flags: String,
        last_index: f64,
    },
    Function(HostFn),
}

impl fmt::Debug for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeValue::Undefined => write!(f, "Undefined"),
            NativeValue::Null => write!(f, "Null"),
            NativeValue::Bool(b) => write!(f, "Bool({})", b),
            NativeValue::Num(n) => write!(f, "Num({})", n),
            NativeValue::Str(s) => write!(f, "Str({:?})", s),
            NativeValue::Array(items) => f.debug_tuple("Array").field(items).finish(),
            NativeValue::Object(entries) => f.debug_tuple("Object").field(entries).finish(),
            NativeValue::Date(ms) => write!(f, "Date({})", ms),
            NativeValue::RegExp {
                source,
                flags,
                last_index,
            } => write!(f, "RegExp(/{}/{} @{})", source, flags, last_index),
            NativeValue::Function(_) => write!(f, "Function"),
        }
    }
}

impl PartialEq for NativeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (NativeValue::Undefined, NativeValue::Undefined) => true,
            (NativeValue::Null, NativeValue::Null) => true,
            (NativeValue::Bool(a), NativeValue::Bool(b)) => a == b,
            (NativeValue::Num(a), NativeValue::Num(b)) => {
                a == b || (a.is_nan() && b.is_nan())
            }
            (NativeValue::Str(a), NativeValue::Str(b)) => a == b,
            (NativeValue::Array(a), NativeValue::Array(b)) => a == b,
            (NativeValue::Object(a), NativeValue::Object(b)) => a == b,
            (NativeValue::Date(a), NativeValue::Date(b)) => {
                a == b || (a.is_nan() && b.is_nan())
            }
            (
                NativeValue::RegExp {
                    source: sa,
                    flags: fa,
                    last_index: la,
                },
                NativeValue::RegExp {
                    source: sb,
                    flags: fb,
                    last_index: lb,
                },
            ) => sa == sb && fa == fb && la == lb,
            (NativeValue::Function(a), NativeValue::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Interpreter {
    /// Copies a host value into the interpreted world. Host cycles are the
    /// caller's responsibility; depth is bounded only by the input.
    pub fn native_to_pseudo(&mut self, value: &NativeValue) -> Result<Value> {
        stacker::maybe_grow(BRIDGE_STACK_RED_ZONE, BRIDGE_STACK_SIZE, || {
            self.native_to_pseudo_inner(value)
        })
    }

    fn native_to_pseudo_inner(&mut self, value: &NativeValue) -> Result<Value> {
        Ok(match value {
            NativeValue::Undefined => Value::Undefined,
            NativeValue::Null => Value::Null,
            NativeValue::Bool(b) => Value::Boolean(*b),
            NativeValue::Num(n) => Value::Number(*n),
            NativeValue::Str(s) => Value::string(s),
            NativeValue::Array(items) => {
                let array = self.create_array();
                for (i, item) in items.iter().enumerate() {
                    if let Some(item) = item {
                        let converted = self.native_to_pseudo_inner(item)?;
                        let key: JsStr = Rc::from(i.to_string().as_str());
                        self.define_data_property(array, key, converted);
                    }
                }
                self.set_raw_length(array, items.len());
                Value::Object(array)
            }
            NativeValue::Object(entries) => {
                let object = self.create_plain_object();
                for (key, entry) in entries {
                    let converted = self.native_to_pseudo_inner(entry)?;
                    self.define_data_property(object, Rc::from(key.as_str()), converted);
                }
                Value::Object(object)
            }
            NativeValue::Date(ms) => {
                let proto = self.protos.date_proto;
                let obj = self.create_object(Some(proto));
                let object = self.heap.get_mut(obj);
                object.class = ClassTag::Date;
                object.data = Some(BackingData::Date(*ms));
                Value::Object(obj)
            }
            NativeValue::RegExp {
                source,
                flags,
                last_index,
            } => {
                let Some(parsed) = RegexFlags::parse(flags) else {
                    return Err(Error::Syntax(format!(
                        "invalid regular expression flags: {}",
                        flags
                    )));
                };
                if let Err(message) = crate::regex_backend::compile_check(source, parsed) {
                    return Err(Error::Syntax(message));
                }
                let obj = self.create_regexp_raw(source, parsed);
                self.define_data_property(
                    obj,
                    Rc::from("lastIndex"),
                    Value::Number(*last_index),
                );
                Value::Object(obj)
            }
            NativeValue::Function(host_fn) => {
                let host_fn = Rc::clone(host_fn);
                let func = self.create_native_function("", move |interp, call| {
                    let mut args = Vec::with_capacity(call.args.len());
                    for arg in &call.args {
                        args.push(interp.pseudo_to_native(arg));
                    }
                    let result = host_fn(interp, args);
                    interp
                        .native_to_pseudo(&result)
                        .map_err(|_| interp.throw_type_error("host conversion failed"))
                });
                Value::Object(func)
            }
        })
    }

    /// Copies an interpreted value out to the host. Cycle-safe: revisited
    /// objects reuse the translation recorded in the parallel lists, so a
    /// cyclic edge collapses to whatever was recorded at entry.
    pub fn pseudo_to_native(&mut self, value: &Value) -> NativeValue {
        let mut visited: Vec<(ObjectRef, NativeValue)> = Vec::new();
        stacker::maybe_grow(BRIDGE_STACK_RED_ZONE, BRIDGE_STACK_SIZE, || {
            self.pseudo_to_native_inner(value, &mut visited)
        })
    }

    fn pseudo_to_native_inner(
        &mut self,
        value: &Value,
        visited: &mut Vec<(ObjectRef, NativeValue)>,
    ) -> NativeValue {
        match value {
            Value::Undefined => NativeValue::Undefined,
            Value::Null => NativeValue::Null,
            Value::Boolean(b) => NativeValue::Bool(*b),
            Value::Number(n) => NativeValue::Num(*n),
            Value::String(s) => NativeValue::Str(s.to_string()),
            Value::Object(obj) => {
                if let Some((_, prior)) = visited.iter().find(|(seen, _)| seen == obj) {
                    return prior.clone();
                }
                match self.heap.get(*obj).data.clone() {
                    Some(BackingData::Date(ms)) => return NativeValue::Date(ms),
                    Some(BackingData::RegExp(data)) => {
                        let last_index = self
                            .heap
                            .get(*obj)
                            .peek("lastIndex")
                            .cloned()
                            .map(|v| self.to_number(&v))
                            .unwrap_or(0.0);
                        return NativeValue::RegExp {
                            source: data.source.to_string(),
                            flags: data.flags.text(),
                            last_index,
                        };
                    }
                    _ => {}
                }
                if self.heap.get(*obj).class == ClassTag::Array {
                    visited.push((*obj, NativeValue::Array(Vec::new())));
                    let length = self.array_length(*obj);
                    let mut out = Vec::with_capacity(length);
                    for i in 0..length {
                        match self.array_get(*obj, i) {
                            Some(element) => {
                                let converted = self.pseudo_to_native_inner(&element, visited);
                                out.push(Some(converted));
                            }
                            // Sparse holes survive the crossing.
                            None => out.push(None),
                        }
                    }
                    NativeValue::Array(out)
                } else {
                    visited.push((*obj, NativeValue::Object(Vec::new())));
                    let keys: Vec<JsStr> = self
                        .heap
                        .get(*obj)
                        .properties
                        .iter()
                        .filter(|(_, property)| property.enumerable && !property.is_accessor())
                        .map(|(key, _)| Rc::clone(key))
                        .collect();
                    let mut out = Vec::with_capacity(keys.len());
                    for key in keys {
                        let entry = self
                            .heap
                            .get(*obj)
                            .peek(&key)
                            .cloned()
                            .unwrap_or(Value::Undefined);
                        let converted = self.pseudo_to_native_inner(&entry, visited);
                        out.push((key.to_string(), converted));
                    }
                    NativeValue::Object(out)
                }
            }
        }
    }

    /// Wraps a host callable as an interpreted function with a stable
    /// wrapper identity.
    pub fn create_native_function(
        &mut self,
        name: &str,
        func: impl Fn(&mut Interpreter, NativeCall) -> std::result::Result<Value, Abort> + 'static,
    ) -> ObjectRef {
        crate::globals::native_fn(self, name, 0, false, func)
    }

    /// Like `create_native_function`, but the callable completes
    /// out-of-band through the handle while the interpreter stays paused.
    pub fn create_async_function(
        &mut self,
        name: &str,
        func: impl Fn(&mut Interpreter, NativeCall, AsyncHandle) -> std::result::Result<(), Abort>
            + 'static,
    ) -> ObjectRef {
        let id = self.allocate_wrapper_id();
        let proto = self.protos.function_proto;
        let obj = self.heap.alloc(crate::value::JsObject::with_proto(Some(proto)));
        {
            let object = self.heap.get_mut(obj);
            object.class = ClassTag::Function;
            object.illegal_constructor = true;
            object.callable = Some(crate::value::Callable::Async {
                id,
                func: Rc::new(func),
            });
        }
        self.define_property(
            obj,
            Rc::from("length"),
            Value::Number(0.0),
            crate::value::READONLY_NONENUMERABLE,
        );
        self.define_property(
            obj,
            Rc::from("name"),
            Value::string(name),
            crate::value::READONLY_NONENUMERABLE,
        );
        obj
    }
}

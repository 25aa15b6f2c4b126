use std::rc::Rc;

use super::{install_ctor, install_method};
use crate::interp::convert::to_uint32;
use crate::interp::{Abort, Interpreter, NativeCall};
use crate::value::{ClassTag, JsStr, ObjectRef, Value};

fn index_key(i: usize) -> JsStr {
    Rc::from(i.to_string().as_str())
}

impl Interpreter {
    pub(crate) fn array_length(&mut self, obj: ObjectRef) -> usize {
        let length = self.heap.get(obj).peek("length").cloned();
        match length {
            Some(value) => {
                let n = self.to_number(&value);
                if n.is_finite() && n > 0.0 {
                    n.trunc() as usize
                } else {
                    0
                }
            }
            None => 0,
        }
    }

    pub(crate) fn array_get(&self, obj: ObjectRef, index: usize) -> Option<Value> {
        self.heap.get(obj).peek(&index.to_string()).cloned()
    }

    pub(crate) fn array_set(&mut self, obj: ObjectRef, index: usize, value: Value) {
        self.define_data_property(obj, index_key(index), value);
    }

    pub(crate) fn array_delete(&mut self, obj: ObjectRef, index: usize) {
        self.heap
            .get_mut(obj)
            .properties
            .remove(&index.to_string());
    }

    pub(crate) fn set_raw_length(&mut self, obj: ObjectRef, length: usize) {
        let present = self.heap.get(obj).properties.contains("length");
        if present {
            if let Some(slot) = self.heap.get_mut(obj).properties.get_mut("length") {
                slot.value = Value::Number(length as f64);
            }
        } else {
            self.define_data_property(obj, Rc::from("length"), Value::Number(length as f64));
        }
    }

    /// Builds an interpreted array out of host values.
    pub(crate) fn vec_to_array(&mut self, values: Vec<Value>) -> ObjectRef {
        let array = self.create_array();
        for (i, value) in values.into_iter().enumerate() {
            self.define_data_property(array, index_key(i), value);
        }
        array
    }
}

fn this_array(interp: &mut Interpreter, call: &NativeCall, name: &str) -> Result<ObjectRef, Abort> {
    match call.this.as_object() {
        Some(obj) => Ok(obj),
        None => Err(interp.throw_type_error(format!(
            "Array.prototype.{} called on non-object",
            name
        ))),
    }
}

pub(crate) fn init(interp: &mut Interpreter) {
    let array_proto = interp.protos.array_proto;

    let ctor = install_ctor(interp, "Array", array_proto, 1, |interp, call| {
        let array = interp.create_array();
        if call.args.len() == 1 {
            if let Value::Number(n) = call.args[0] {
                let length = to_uint32(n);
                if length as f64 != n {
                    return Err(interp.throw_range_error("Invalid array length"));
                }
                interp.set_raw_length(array, length as usize);
                return Ok(Value::Object(array));
            }
        }
        for (i, value) in call.args.iter().enumerate() {
            interp.array_set(array, i, value.clone());
        }
        Ok(Value::Object(array))
    });

    install_method(interp, ctor, "isArray", 1, |interp, call| {
        Ok(Value::Boolean(match call.arg(0).as_object() {
            Some(obj) => interp.heap.get(obj).class == ClassTag::Array,
            None => false,
        }))
    });

    install_method(interp, array_proto, "pop", 0, |interp, call| {
        let this = this_array(interp, &call, "pop")?;
        let length = interp.array_length(this);
        if length == 0 {
            interp.set_raw_length(this, 0);
            return Ok(Value::Undefined);
        }
        let value = interp.array_get(this, length - 1).unwrap_or(Value::Undefined);
        interp.array_delete(this, length - 1);
        interp.set_raw_length(this, length - 1);
        Ok(value)
    });

    install_method(interp, array_proto, "push", 1, |interp, call| {
        let this = this_array(interp, &call, "push")?;
        let mut length = interp.array_length(this);
        for value in &call.args {
            interp.array_set(this, length, value.clone());
            length += 1;
        }
        interp.set_raw_length(this, length);
        Ok(Value::Number(length as f64))
    });

    install_method(interp, array_proto, "shift", 0, |interp, call| {
        let this = this_array(interp, &call, "shift")?;
        let length = interp.array_length(this);
        if length == 0 {
            interp.set_raw_length(this, 0);
            return Ok(Value::Undefined);
        }
        let first = interp.array_get(this, 0).unwrap_or(Value::Undefined);
        for i in 1..length {
            match interp.array_get(this, i) {
                Some(value) => interp.array_set(this, i - 1, value),
                None => interp.array_delete(this, i - 1),
            }
        }
        interp.array_delete(this, length - 1);
        interp.set_raw_length(this, length - 1);
        Ok(first)
    });

    install_method(interp, array_proto, "unshift", 1, |interp, call| {
        let this = this_array(interp, &call, "unshift")?;
        let length = interp.array_length(this);
        let added = call.args.len();
        for i in (0..length).rev() {
            match interp.array_get(this, i) {
                Some(value) => interp.array_set(this, i + added, value),
                None => interp.array_delete(this, i + added),
            }
        }
        for (i, value) in call.args.iter().enumerate() {
            interp.array_set(this, i, value.clone());
        }
        interp.set_raw_length(this, length + added);
        Ok(Value::Number((length + added) as f64))
    });

    install_method(interp, array_proto, "reverse", 0, |interp, call| {
        let this = this_array(interp, &call, "reverse")?;
        let length = interp.array_length(this);
        for i in 0..length / 2 {
            let j = length - 1 - i;
            let a = interp.array_get(this, i);
            let b = interp.array_get(this, j);
            match b {
                Some(value) => interp.array_set(this, i, value),
                None => interp.array_delete(this, i),
            }
            match a {
                Some(value) => interp.array_set(this, j, value),
                None => interp.array_delete(this, j),
            }
        }
        Ok(call.this.clone())
    });

    install_method(interp, array_proto, "splice", 2, |interp, call| {
        let this = this_array(interp, &call, "splice")?;
        let length = interp.array_length(this);
        let start = relative_index(interp, call.args.first(), length, 0);
        let delete_count = if call.args.is_empty() {
            0
        } else {
            match call.args.get(1) {
                Some(value) => {
                    let n = interp.to_number(value);
                    if n.is_nan() || n < 0.0 {
                        0
                    } else {
                        (n.trunc() as usize).min(length - start)
                    }
                }
                None => length - start,
            }
        };
        let inserted: Vec<Value> = call.args.iter().skip(2).cloned().collect();

        let removed = interp.create_array();
        for i in 0..delete_count {
            if let Some(value) = interp.array_get(this, start + i) {
                interp.array_set(removed, i, value);
            }
        }
        interp.set_raw_length(removed, delete_count);

        let tail: Vec<Option<Value>> = (start + delete_count..length)
            .map(|i| interp.array_get(this, i))
            .collect();
        let new_length = length - delete_count + inserted.len();
        for (offset, value) in inserted.iter().enumerate() {
            interp.array_set(this, start + offset, value.clone());
        }
        for (offset, value) in tail.into_iter().enumerate() {
            let index = start + inserted.len() + offset;
            match value {
                Some(value) => interp.array_set(this, index, value),
                None => interp.array_delete(this, index),
            }
        }
        for i in new_length..length {
            interp.array_delete(this, i);
        }
        interp.set_raw_length(this, new_length);
        Ok(Value::Object(removed))
    });

    install_method(interp, array_proto, "slice", 2, |interp, call| {
        let this = this_array(interp, &call, "slice")?;
        let length = interp.array_length(this);
        let start = relative_index(interp, call.args.first(), length, 0);
        let end = relative_index(interp, call.args.get(1), length, length);
        let out = interp.create_array();
        let mut n = 0;
        for i in start..end.max(start) {
            if let Some(value) = interp.array_get(this, i) {
                interp.array_set(out, n, value);
            }
            n += 1;
        }
        interp.set_raw_length(out, n);
        Ok(Value::Object(out))
    });

    install_method(interp, array_proto, "concat", 1, |interp, call| {
        let this = this_array(interp, &call, "concat")?;
        let out = interp.create_array();
        let mut n = 0;
        let append = |interp: &mut Interpreter, value: &Value, n: &mut usize| {
            match value.as_object() {
                Some(obj) if interp.heap.get(obj).class == ClassTag::Array => {
                    let length = interp.array_length(obj);
                    for i in 0..length {
                        if let Some(element) = interp.array_get(obj, i) {
                            interp.array_set(out, *n, element);
                        }
                        *n += 1;
                    }
                }
                _ => {
                    interp.array_set(out, *n, value.clone());
                    *n += 1;
                }
            }
        };
        let this_value = Value::Object(this);
        append(interp, &this_value, &mut n);
        for value in &call.args {
            append(interp, value, &mut n);
        }
        interp.set_raw_length(out, n);
        Ok(Value::Object(out))
    });

    install_method(interp, array_proto, "join", 1, |interp, call| {
        let this = this_array(interp, &call, "join")?;
        let separator = match call.args.first() {
            None | Some(Value::Undefined) => ",".to_string(),
            Some(value) => interp.to_display(value),
        };
        let length = interp.array_length(this);
        let mut parts = Vec::with_capacity(length);
        for i in 0..length {
            let text = match interp.array_get(this, i) {
                None | Some(Value::Undefined) | Some(Value::Null) => String::new(),
                Some(value) => interp.to_display(&value),
            };
            parts.push(text);
        }
        Ok(Value::string(parts.join(&separator)))
    });
}

/// Resolves a possibly-negative index argument against `length`.
fn relative_index(
    interp: &mut Interpreter,
    value: Option<&Value>,
    length: usize,
    default: usize,
) -> usize {
    let Some(value) = value else {
        return default;
    };
    if matches!(value, Value::Undefined) {
        return default;
    }
    let n = interp.to_number(value);
    if n.is_nan() {
        return 0;
    }
    if n < 0.0 {
        let back = (-n).trunc() as usize;
        length.saturating_sub(back)
    } else {
        (n.trunc() as usize).min(length)
    }
}

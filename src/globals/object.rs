use std::rc::Rc;

use super::{install_method, install_ctor};
use crate::interp::convert::array_index;
use crate::interp::Interpreter;
use crate::value::{BackingData, ClassTag, Descriptor, JsStr, ObjectRef, Value};

pub(crate) fn init(interp: &mut Interpreter) {
    let object_proto = interp.protos.object_proto;

    let ctor = install_ctor(interp, "Object", object_proto, 1, |interp, call| {
        let value = call.arg(0);
        match value {
            Value::Undefined | Value::Null => {
                if call.called_with_new {
                    Ok(call.this)
                } else {
                    Ok(Value::Object(interp.create_plain_object()))
                }
            }
            Value::Object(_) => Ok(value),
            primitive => Ok(Value::Object(box_primitive(interp, &primitive))),
        }
    });

    install_method(interp, ctor, "getPrototypeOf", 1, |interp, call| {
        match call.arg(0) {
            Value::Object(obj) => Ok(match interp.heap.get(obj).proto {
                Some(proto) => Value::Object(proto),
                None => Value::Null,
            }),
            Value::String(_) => Ok(Value::Object(interp.protos.string_proto)),
            Value::Number(_) => Ok(Value::Object(interp.protos.number_proto)),
            Value::Boolean(_) => Ok(Value::Object(interp.protos.boolean_proto)),
            _ => Err(interp.throw_type_error("Cannot convert undefined or null to object")),
        }
    });

    install_method(interp, ctor, "getOwnPropertyNames", 1, |interp, call| {
        let Some(obj) = call.arg(0).as_object() else {
            return Err(interp.throw_type_error("Object.getOwnPropertyNames called on non-object"));
        };
        let names: Vec<JsStr> = interp.heap.get(obj).properties.keys().cloned().collect();
        Ok(Value::Object(string_list(interp, names)))
    });

    install_method(interp, ctor, "keys", 1, |interp, call| {
        let Some(obj) = call.arg(0).as_object() else {
            return Err(interp.throw_type_error("Object.keys called on non-object"));
        };
        let names: Vec<JsStr> = interp
            .heap
            .get(obj)
            .properties
            .iter()
            .filter(|(_, property)| property.enumerable)
            .map(|(key, _)| Rc::clone(key))
            .collect();
        Ok(Value::Object(string_list(interp, names)))
    });

    install_method(interp, ctor, "create", 2, |interp, call| {
        let proto = match call.arg(0) {
            Value::Object(proto) => Some(proto),
            Value::Null => None,
            _ => {
                return Err(interp.throw_type_error(
                    "Object prototype may only be an Object or null",
                ))
            }
        };
        Ok(Value::Object(interp.create_object(proto)))
    });

    install_method(interp, ctor, "defineProperty", 3, |interp, call| {
        let Some(obj) = call.arg(0).as_object() else {
            return Err(interp.throw_type_error("Object.defineProperty called on non-object"));
        };
        let name = interp.to_display(&call.arg(1));
        let Some(desc_obj) = call.arg(2).as_object() else {
            return Err(interp.throw_type_error("Property description must be an object"));
        };
        let descriptor = read_descriptor(interp, desc_obj);
        interp.prop_set(
            &Value::Object(obj),
            &name,
            Value::Undefined,
            Some(descriptor),
            true,
        )?;
        Ok(Value::Object(obj))
    });

    install_method(interp, ctor, "getOwnPropertyDescriptor", 2, |interp, call| {
        let Some(obj) = call.arg(0).as_object() else {
            return Err(interp.throw_type_error(
                "Object.getOwnPropertyDescriptor called on non-object",
            ));
        };
        let name = interp.to_display(&call.arg(1));
        let Some(property) = interp.heap.get(obj).properties.get(&name).cloned() else {
            return Ok(Value::Undefined);
        };
        let out = interp.create_plain_object();
        if property.is_accessor() {
            let getter = property
                .getter
                .map(Value::Object)
                .unwrap_or(Value::Undefined);
            let setter = property
                .setter
                .map(Value::Object)
                .unwrap_or(Value::Undefined);
            interp.define_data_property(out, Rc::from("get"), getter);
            interp.define_data_property(out, Rc::from("set"), setter);
        } else {
            interp.define_data_property(out, Rc::from("value"), property.value.clone());
            interp.define_data_property(out, Rc::from("writable"), Value::Boolean(property.writable));
        }
        interp.define_data_property(out, Rc::from("enumerable"), Value::Boolean(property.enumerable));
        interp.define_data_property(
            out,
            Rc::from("configurable"),
            Value::Boolean(property.configurable),
        );
        Ok(Value::Object(out))
    });

    install_method(interp, ctor, "preventExtensions", 1, |interp, call| {
        if let Some(obj) = call.arg(0).as_object() {
            interp.heap.get_mut(obj).prevent_extensions = true;
        }
        Ok(call.arg(0))
    });

    install_method(interp, ctor, "isExtensible", 1, |interp, call| {
        Ok(Value::Boolean(match call.arg(0).as_object() {
            Some(obj) => !interp.heap.get(obj).prevent_extensions,
            None => false,
        }))
    });

    // Prototype methods.
    install_method(interp, object_proto, "toString", 0, |interp, call| {
        Ok(Value::string(interp.to_display(&call.this)))
    });
    install_method(interp, object_proto, "toLocaleString", 0, |interp, call| {
        Ok(Value::string(interp.to_display(&call.this)))
    });
    install_method(interp, object_proto, "valueOf", 0, |interp, call| {
        if let Value::Object(obj) = &call.this {
            match &interp.heap.get(*obj).data {
                Some(BackingData::Boolean(b)) => return Ok(Value::Boolean(*b)),
                Some(BackingData::Number(n)) => return Ok(Value::Number(*n)),
                Some(BackingData::String(s)) => return Ok(Value::String(Rc::clone(s))),
                Some(BackingData::Date(ms)) => return Ok(Value::Number(*ms)),
                _ => {}
            }
        }
        Ok(call.this.clone())
    });
    install_method(interp, object_proto, "hasOwnProperty", 1, |interp, call| {
        let name = interp.to_display(&call.arg(0));
        Ok(Value::Boolean(has_own(interp, &call.this, &name)))
    });
    install_method(
        interp,
        object_proto,
        "propertyIsEnumerable",
        1,
        |interp, call| {
            let name = interp.to_display(&call.arg(0));
            let Some(obj) = call.this.as_object() else {
                return Ok(Value::Boolean(false));
            };
            Ok(Value::Boolean(
                interp
                    .heap
                    .get(obj)
                    .properties
                    .get(&name)
                    .map(|p| p.enumerable)
                    .unwrap_or(false),
            ))
        },
    );
    install_method(interp, object_proto, "isPrototypeOf", 1, |interp, call| {
        let Some(this_obj) = call.this.as_object() else {
            return Ok(Value::Boolean(false));
        };
        let Some(start) = call.arg(0).as_object() else {
            return Ok(Value::Boolean(false));
        };
        let mut cursor = interp.heap.get(start).proto;
        while let Some(link) = cursor {
            if link == this_obj {
                return Ok(Value::Boolean(true));
            }
            cursor = interp.heap.get(link).proto;
        }
        Ok(Value::Boolean(false))
    });
}

fn has_own(interp: &Interpreter, value: &Value, name: &str) -> bool {
    match value {
        Value::Object(obj) => {
            if interp.heap.get(*obj).properties.contains(name) {
                return true;
            }
            if let Some(BackingData::String(s)) = &interp.heap.get(*obj).data {
                if interp.heap.get(*obj).class == ClassTag::String {
                    if name == "length" {
                        return true;
                    }
                    if let Some(index) = array_index(name) {
                        return (index as usize) < s.chars().count();
                    }
                }
            }
            false
        }
        Value::String(s) => {
            name == "length"
                || array_index(name)
                    .map(|i| (i as usize) < s.chars().count())
                    .unwrap_or(false)
        }
        _ => false,
    }
}

/// Reads an interpreted descriptor object into the internal shape; fields
/// count as present when the object has them anywhere on its chain.
pub(crate) fn read_descriptor(interp: &mut Interpreter, desc: ObjectRef) -> Descriptor {
    let fetch = |interp: &Interpreter, name: &str| interp.peek_through_proto(desc, name);
    let truthy = |value: &Value| crate::interp::convert::to_boolean(value);
    Descriptor {
        value: fetch(interp, "value"),
        writable: fetch(interp, "writable").map(|v| truthy(&v)),
        enumerable: fetch(interp, "enumerable").map(|v| truthy(&v)),
        configurable: fetch(interp, "configurable").map(|v| truthy(&v)),
        getter: fetch(interp, "get"),
        setter: fetch(interp, "set"),
    }
}

/// Boxes a primitive into the matching wrapper object.
pub(crate) fn box_primitive(interp: &mut Interpreter, value: &Value) -> ObjectRef {
    match value {
        Value::String(s) => {
            let proto = interp.protos.string_proto;
            let obj = interp.create_object(Some(proto));
            let object = interp.heap.get_mut(obj);
            object.class = ClassTag::String;
            object.data = Some(BackingData::String(Rc::clone(s)));
            obj
        }
        Value::Number(n) => {
            let proto = interp.protos.number_proto;
            let obj = interp.create_object(Some(proto));
            let object = interp.heap.get_mut(obj);
            object.class = ClassTag::Number;
            object.data = Some(BackingData::Number(*n));
            obj
        }
        Value::Boolean(b) => {
            let proto = interp.protos.boolean_proto;
            let obj = interp.create_object(Some(proto));
            let object = interp.heap.get_mut(obj);
            object.class = ClassTag::Boolean;
            object.data = Some(BackingData::Boolean(*b));
            obj
        }
        _ => interp.create_plain_object(),
    }
}

/// Builds an interpreted array of strings.
pub(crate) fn string_list(interp: &mut Interpreter, values: Vec<JsStr>) -> ObjectRef {
    let array = interp.create_array();
    for (i, value) in values.into_iter().enumerate() {
        let key: JsStr = Rc::from(i.to_string().as_str());
        interp.define_data_property(array, key, Value::String(value));
    }
    array
}

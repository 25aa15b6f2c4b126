pub(crate) mod array;
pub(crate) mod date;
pub(crate) mod error;
pub(crate) mod function;
pub(crate) mod json;
pub(crate) mod math;
pub(crate) mod number;
pub(crate) mod object;
pub(crate) mod polyfills;
pub(crate) mod regexp;
pub(crate) mod string;

use std::rc::Rc;

use crate::interp::{Abort, Interpreter, NativeCall};
use crate::scope::ScopeData;
use crate::value::{
    Attributes, Callable, ClassTag, JsObject, ObjectRef, Value, NONCONFIGURABLE_READONLY_NONENUMERABLE,
    NONENUMERABLE, READONLY_NONENUMERABLE,
};

/// Root prototype objects, resolved once at construction.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Protos {
    pub(crate) object_proto: ObjectRef,
    pub(crate) function_proto: ObjectRef,
    pub(crate) array_proto: ObjectRef,
    pub(crate) string_proto: ObjectRef,
    pub(crate) number_proto: ObjectRef,
    pub(crate) boolean_proto: ObjectRef,
    pub(crate) date_proto: ObjectRef,
    pub(crate) regexp_proto: ObjectRef,
    pub(crate) error_proto: ObjectRef,
    pub(crate) eval_error_proto: ObjectRef,
    pub(crate) range_error_proto: ObjectRef,
    pub(crate) reference_error_proto: ObjectRef,
    pub(crate) syntax_error_proto: ObjectRef,
    pub(crate) type_error_proto: ObjectRef,
    pub(crate) uri_error_proto: ObjectRef,
}

impl Protos {
    /// Filled in by `init`; only exists so the interpreter struct can be
    /// assembled before the heap is seeded.
    pub(crate) fn placeholder() -> Protos {
        let zero = ObjectRef(0);
        Protos {
            object_proto: zero,
            function_proto: zero,
            array_proto: zero,
            string_proto: zero,
            number_proto: zero,
            boolean_proto: zero,
            date_proto: zero,
            regexp_proto: zero,
            error_proto: zero,
            eval_error_proto: zero,
            range_error_proto: zero,
            reference_error_proto: zero,
            syntax_error_proto: zero,
            type_error_proto: zero,
            uri_error_proto: zero,
        }
    }
}

/// Builds the interpreted world: root prototypes, the global object and
/// scope, every built-in constructor and method, and the global functions.
pub(crate) fn init(interp: &mut Interpreter) {
    let object_proto = interp.create_object(None);
    let function_proto = interp.create_object(Some(object_proto));
    {
        let proto = interp.heap.get_mut(function_proto);
        proto.class = ClassTag::Function;
        proto.illegal_constructor = true;
        proto.callable = Some(Callable::Native {
            id: 0,
            func: Rc::new(|_, _| Ok(Value::Undefined)),
        });
    }

    let error_proto = interp.create_object(Some(object_proto));
    interp.heap.get_mut(error_proto).class = ClassTag::Error;
    let sub_error = |interp: &mut Interpreter| {
        let proto = interp.create_object(Some(error_proto));
        interp.heap.get_mut(proto).class = ClassTag::Error;
        proto
    };
    let eval_error_proto = sub_error(interp);
    let range_error_proto = sub_error(interp);
    let reference_error_proto = sub_error(interp);
    let syntax_error_proto = sub_error(interp);
    let type_error_proto = sub_error(interp);
    let uri_error_proto = sub_error(interp);

    interp.protos = Protos {
        object_proto,
        function_proto,
        array_proto: interp.create_object(Some(object_proto)),
        string_proto: interp.create_object(Some(object_proto)),
        number_proto: interp.create_object(Some(object_proto)),
        boolean_proto: interp.create_object(Some(object_proto)),
        date_proto: interp.create_object(Some(object_proto)),
        regexp_proto: interp.create_object(Some(object_proto)),
        error_proto,
        eval_error_proto,
        range_error_proto,
        reference_error_proto,
        syntax_error_proto,
        type_error_proto,
        uri_error_proto,
    };
    interp.heap.get_mut(interp.protos.array_proto).class = ClassTag::Array;
    {
        // Array.prototype carries its own length slot like any array.
        let proto = interp.protos.array_proto;
        interp.heap.get_mut(proto).properties.set(
            Rc::from("length"),
            crate::value::Property {
                value: Value::Number(0.0),
                writable: true,
                enumerable: false,
                configurable: false,
                getter: None,
                setter: None,
            },
        );
    }

    let global = interp.create_object(Some(object_proto));
    interp.global_object = global;
    interp.global_scope = interp.scopes.alloc(ScopeData {
        parent: None,
        strict: false,
        object: global,
        with_scope: false,
    });

    // The global object names itself three ways.
    interp.define_property(global, Rc::from("window"), Value::Object(global), READONLY_NONENUMERABLE);
    interp.define_property(global, Rc::from("self"), Value::Object(global), NONENUMERABLE);
    interp.define_property(global, Rc::from("this"), Value::Object(global), READONLY_NONENUMERABLE);

    interp.define_property(
        global,
        Rc::from("NaN"),
        Value::Number(f64::NAN),
        NONCONFIGURABLE_READONLY_NONENUMERABLE,
    );
    interp.define_property(
        global,
        Rc::from("Infinity"),
        Value::Number(f64::INFINITY),
        NONCONFIGURABLE_READONLY_NONENUMERABLE,
    );
    interp.define_property(
        global,
        Rc::from("undefined"),
        Value::Undefined,
        NONCONFIGURABLE_READONLY_NONENUMERABLE,
    );

    function::init(interp);
    object::init(interp);
    array::init(interp);
    string::init(interp);
    number::init(interp);
    date::init(interp);
    regexp::init(interp);
    error::init(interp);
    math::init(interp);
    json::init(interp);
    init_global_functions(interp);
}

/// Allocates a native function object.
pub(crate) fn native_fn(
    interp: &mut Interpreter,
    name: &str,
    length: u32,
    is_constructor: bool,
    func: impl Fn(&mut Interpreter, NativeCall) -> Result<Value, Abort> + 'static,
) -> ObjectRef {
    let id = interp.allocate_wrapper_id();
    let proto = interp.protos.function_proto;
    let obj = interp.heap.alloc(JsObject::with_proto(Some(proto)));
    {
        let object = interp.heap.get_mut(obj);
        object.class = ClassTag::Function;
        object.illegal_constructor = !is_constructor;
        object.callable = Some(Callable::Native {
            id,
            func: Rc::new(func),
        });
    }
    interp.define_property(
        obj,
        Rc::from("length"),
        Value::Number(length as f64),
        READONLY_NONENUMERABLE,
    );
    interp.define_property(obj, Rc::from("name"), Value::string(name), READONLY_NONENUMERABLE);
    obj
}

pub(crate) fn install_method(
    interp: &mut Interpreter,
    target: ObjectRef,
    name: &str,
    length: u32,
    func: impl Fn(&mut Interpreter, NativeCall) -> Result<Value, Abort> + 'static,
) {
    let fobj = native_fn(interp, name, length, false, func);
    interp.define_property(target, Rc::from(name), Value::Object(fobj), NONENUMERABLE);
}

/// Installs an async native: the interpreter pauses until the handle is
/// resolved.
pub(crate) fn install_async_method(
    interp: &mut Interpreter,
    target: ObjectRef,
    name: &str,
    length: u32,
    func: impl Fn(&mut Interpreter, NativeCall, crate::interp::AsyncHandle) -> Result<(), Abort>
        + 'static,
) {
    let id = interp.allocate_wrapper_id();
    let proto = interp.protos.function_proto;
    let obj = interp.heap.alloc(JsObject::with_proto(Some(proto)));
    {
        let object = interp.heap.get_mut(obj);
        object.class = ClassTag::Function;
        object.illegal_constructor = true;
        object.callable = Some(Callable::Async {
            id,
            func: Rc::new(func),
        });
    }
    interp.define_property(
        obj,
        Rc::from("length"),
        Value::Number(length as f64),
        READONLY_NONENUMERABLE,
    );
    interp.define_property(obj, Rc::from("name"), Value::string(name), READONLY_NONENUMERABLE);
    interp.define_property(target, Rc::from(name), Value::Object(obj), NONENUMERABLE);
}

pub(crate) fn install_value(
    interp: &mut Interpreter,
    target: ObjectRef,
    name: &str,
    value: Value,
    attributes: Attributes,
) {
    interp.define_property(target, Rc::from(name), value, attributes);
}

/// Creates a constructor function, wires `prototype`/`constructor`, and
/// hangs it off the global object.
pub(crate) fn install_ctor(
    interp: &mut Interpreter,
    name: &str,
    proto: ObjectRef,
    length: u32,
    func: impl Fn(&mut Interpreter, NativeCall) -> Result<Value, Abort> + 'static,
) -> ObjectRef {
    let ctor = native_fn(interp, name, length, true, func);
    interp.define_property(
        ctor,
        Rc::from("prototype"),
        Value::Object(proto),
        NONCONFIGURABLE_READONLY_NONENUMERABLE,
    );
    interp.define_property(proto, Rc::from("constructor"), Value::Object(ctor), NONENUMERABLE);
    let global = interp.global_object;
    interp.define_property(global, Rc::from(name), Value::Object(ctor), NONENUMERABLE);
    ctor
}

fn init_global_functions(interp: &mut Interpreter) {
    let global = interp.global_object;

    // eval is not a regular native: the call machinery special-cases it so
    // direct calls can see the caller scope.
    let eval_obj = {
        let proto = interp.protos.function_proto;
        let obj = interp.heap.alloc(JsObject::with_proto(Some(proto)));
        let object = interp.heap.get_mut(obj);
        object.class = ClassTag::Function;
        object.is_eval = true;
        object.illegal_constructor = true;
        obj
    };
    interp.define_property(
        eval_obj,
        Rc::from("length"),
        Value::Number(1.0),
        READONLY_NONENUMERABLE,
    );
    interp.define_property(
        eval_obj,
        Rc::from("name"),
        Value::string("eval"),
        READONLY_NONENUMERABLE,
    );
    interp.define_property(global, Rc::from("eval"), Value::Object(eval_obj), NONENUMERABLE);

    install_method(interp, global, "decodeURI", 1, |interp, call| {
        let text = interp.to_display(&call.arg(0));
        decode_uri(interp, &text)
    });
    install_method(interp, global, "decodeURIComponent", 1, |interp, call| {
        let text = interp.to_display(&call.arg(0));
        decode_uri(interp, &text)
    });
    install_method(interp, global, "encodeURI", 1, |interp, call| {
        let text = interp.to_display(&call.arg(0));
        Ok(Value::string(encode_uri(&text, true)))
    });
    install_method(interp, global, "encodeURIComponent", 1, |interp, call| {
        let text = interp.to_display(&call.arg(0));
        Ok(Value::string(encode_uri(&text, false)))
    });
}

fn encode_uri(text: &str, keep_reserved: bool) -> String {
    const UNRESERVED: &str = "-_.!~*'()";
    const RESERVED: &str = "#$&+,/:;=?@";
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        let keep = ch.is_ascii_alphanumeric()
            || UNRESERVED.contains(ch)
            || (keep_reserved && RESERVED.contains(ch));
        if keep {
            out.push(ch);
        } else {
            let mut buffer = [0u8; 4];
            for byte in ch.encode_utf8(&mut buffer).bytes() {
                out.push('%');
                out.push_str(&format!("{:02X}", byte));
            }
        }
    }
    out
}

fn decode_uri(interp: &mut Interpreter, text: &str) -> Result<Value, Abort> {
    let bytes = text.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 3 > bytes.len() {
                return Err(interp.throw_uri_error("URI malformed"));
            }
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
            let Ok(byte) = u8::from_str_radix(hex, 16) else {
                return Err(interp.throw_uri_error("URI malformed"));
            };
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    match String::from_utf8(out) {
        Ok(decoded) => Ok(Value::string(decoded)),
        Err(_) => Err(interp.throw_uri_error("URI malformed")),
    }
}

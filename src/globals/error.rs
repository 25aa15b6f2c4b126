use std::rc::Rc;

use super::{install_ctor, install_method, install_value};
use crate::interp::Interpreter;
use crate::value::{ClassTag, ObjectRef, Value, NONENUMERABLE};

fn init_error_class(interp: &mut Interpreter, name: &'static str, proto: ObjectRef) {
    install_value(
        interp,
        proto,
        "name",
        Value::string(name),
        NONENUMERABLE,
    );
    install_value(interp, proto, "message", Value::string(""), NONENUMERABLE);
    install_ctor(interp, name, proto, 1, move |interp, call| {
        let target = if call.called_with_new {
            match call.this.as_object() {
                Some(this) => {
                    interp.heap.get_mut(this).class = ClassTag::Error;
                    this
                }
                None => interp.create_error(proto, ""),
            }
        } else {
            interp.create_error(proto, "")
        };
        if let Some(message) = call.args.first().filter(|v| !matches!(v, Value::Undefined)) {
            let text = interp.to_display(message);
            interp.define_property(
                target,
                Rc::from("message"),
                Value::string(text),
                NONENUMERABLE,
            );
        }
        Ok(Value::Object(target))
    });
}

pub(crate) fn init(interp: &mut Interpreter) {
    let error_proto = interp.protos.error_proto;
    init_error_class(interp, "Error", error_proto);
    init_error_class(interp, "EvalError", interp.protos.eval_error_proto);
    init_error_class(interp, "RangeError", interp.protos.range_error_proto);
    init_error_class(interp, "ReferenceError", interp.protos.reference_error_proto);
    init_error_class(interp, "SyntaxError", interp.protos.syntax_error_proto);
    init_error_class(interp, "TypeError", interp.protos.type_error_proto);
    init_error_class(interp, "URIError", interp.protos.uri_error_proto);

    install_method(interp, error_proto, "toString", 0, |interp, call| {
        Ok(Value::string(interp.to_display(&call.this)))
    });
}

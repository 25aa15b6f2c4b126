use super::{install_ctor, install_method};
use crate::ast::{NodeKind, SourceKind};
use crate::interp::{Interpreter, Reinvoke};
use crate::parser::parse_program;
use crate::value::Value;

pub(crate) fn init(interp: &mut Interpreter) {
    let function_proto = interp.protos.function_proto;

    install_ctor(interp, "Function", function_proto, 1, |interp, call| {
        // The last argument is the body; the rest are parameter names.
        let mut params = Vec::new();
        let mut body = String::new();
        if let Some((last, rest)) = call.args.split_last() {
            body = interp.to_display(last);
            for arg in rest {
                params.push(interp.to_display(arg));
            }
        }
        let source = format!("(function({}) {{\n{}\n}})", params.join(", "), body);
        let program = match parse_program(&source, SourceKind::User) {
            Ok(program) => program,
            Err(err) => {
                return Err(
                    interp.throw_syntax_error(format!("Invalid function body: {}", err))
                );
            }
        };
        let NodeKind::Program { body } = &program.kind else {
            unreachable!();
        };
        let Some(stmt) = body.first() else {
            return Err(interp.throw_syntax_error("Invalid function body"));
        };
        let NodeKind::ExpressionStatement { expression } = &stmt.kind else {
            return Err(interp.throw_syntax_error("Invalid function body"));
        };
        if !matches!(expression.kind, NodeKind::FunctionExpression { .. }) {
            return Err(interp.throw_syntax_error("Invalid function body"));
        }
        // Functions built from source close over the global scope only.
        let scope = interp.global_scope();
        let func = interp.create_function(expression, scope, None);
        Ok(Value::Object(func))
    });

    install_method(interp, function_proto, "apply", 2, |interp, call| {
        let args = match call.arg(1) {
            Value::Undefined | Value::Null => Vec::new(),
            Value::Object(list) => interp.array_like_to_vec(list),
            _ => {
                return Err(
                    interp.throw_type_error("CreateListFromArrayLike called on non-object")
                );
            }
        };
        interp.pending_reinvoke = Some(Reinvoke {
            func: call.this.clone(),
            this: call.arg(0),
            args,
        });
        Ok(Value::Undefined)
    });

    install_method(interp, function_proto, "call", 1, |interp, call| {
        let args = if call.args.len() > 1 {
            call.args[1..].to_vec()
        } else {
            Vec::new()
        };
        interp.pending_reinvoke = Some(Reinvoke {
            func: call.this.clone(),
            this: call.arg(0),
            args,
        });
        Ok(Value::Undefined)
    });

    install_method(interp, function_proto, "toString", 0, |interp, call| {
        let Some(obj) = call.this.as_object() else {
            return Err(
                interp.throw_type_error("Function.prototype.toString requires a function")
            );
        };
        if !interp.heap.get(obj).is_callable() {
            return Err(
                interp.throw_type_error("Function.prototype.toString requires a function")
            );
        }
        Ok(Value::string(interp.function_to_display(obj)))
    });
}

impl Interpreter {
    /// Reads `0..length` off an array-like object, holes becoming
    /// `undefined`.
    pub(crate) fn array_like_to_vec(&mut self, obj: crate::value::ObjectRef) -> Vec<Value> {
        let length = self
            .heap
            .get(obj)
            .peek("length")
            .cloned()
            .map(|v| {
                let n = self.to_number(&v);
                if n.is_finite() && n > 0.0 {
                    n.trunc() as usize
                } else {
                    0
                }
            })
            .unwrap_or(0);
        let mut out = Vec::with_capacity(length.min(4096));
        for i in 0..length {
            let value = self
                .heap
                .get(obj)
                .peek(&i.to_string())
                .cloned()
                .unwrap_or(Value::Undefined);
            out.push(value);
        }
        out
    }
}

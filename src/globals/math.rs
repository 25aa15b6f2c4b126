use std::rc::Rc;

use super::{install_method, install_value};
use crate::interp::Interpreter;
use crate::value::{Value, NONENUMERABLE, READONLY_NONENUMERABLE};

pub(crate) fn init(interp: &mut Interpreter) {
    let math = interp.create_plain_object();
    let global = interp.global_object;
    interp.define_property(global, Rc::from("Math"), Value::Object(math), NONENUMERABLE);

    install_value(interp, math, "E", Value::Number(std::f64::consts::E), READONLY_NONENUMERABLE);
    install_value(
        interp,
        math,
        "LN2",
        Value::Number(std::f64::consts::LN_2),
        READONLY_NONENUMERABLE,
    );
    install_value(
        interp,
        math,
        "LN10",
        Value::Number(std::f64::consts::LN_10),
        READONLY_NONENUMERABLE,
    );
    install_value(
        interp,
        math,
        "LOG2E",
        Value::Number(std::f64::consts::LOG2_E),
        READONLY_NONENUMERABLE,
    );
    install_value(
        interp,
        math,
        "LOG10E",
        Value::Number(std::f64::consts::LOG10_E),
        READONLY_NONENUMERABLE,
    );
    install_value(interp, math, "PI", Value::Number(std::f64::consts::PI), READONLY_NONENUMERABLE);
    install_value(
        interp,
        math,
        "SQRT1_2",
        Value::Number(std::f64::consts::FRAC_1_SQRT_2),
        READONLY_NONENUMERABLE,
    );
    install_value(
        interp,
        math,
        "SQRT2",
        Value::Number(std::f64::consts::SQRT_2),
        READONLY_NONENUMERABLE,
    );

    macro_rules! unary {
        ($name:expr, $op:expr) => {
            install_method(interp, math, $name, 1, move |interp, call| {
                let x = interp.to_number(&call.arg(0));
                let f: fn(f64) -> f64 = $op;
                Ok(Value::Number(f(x)))
            });
        };
    }

    unary!("abs", f64::abs);
    unary!("acos", f64::acos);
    unary!("asin", f64::asin);
    unary!("atan", f64::atan);
    unary!("ceil", f64::ceil);
    unary!("cos", f64::cos);
    unary!("exp", f64::exp);
    unary!("floor", f64::floor);
    unary!("log", f64::ln);
    unary!("sin", f64::sin);
    unary!("sqrt", f64::sqrt);
    unary!("tan", f64::tan);

    install_method(interp, math, "round", 1, |interp, call| {
        let x = interp.to_number(&call.arg(0));
        // Half-up toward positive infinity: round(-0.5) is 0.
        Ok(Value::Number(if x.is_finite() {
            (x + 0.5).floor()
        } else {
            x
        }))
    });

    install_method(interp, math, "atan2", 2, |interp, call| {
        let y = interp.to_number(&call.arg(0));
        let x = interp.to_number(&call.arg(1));
        Ok(Value::Number(y.atan2(x)))
    });

    install_method(interp, math, "pow", 2, |interp, call| {
        let base = interp.to_number(&call.arg(0));
        let exponent = interp.to_number(&call.arg(1));
        Ok(Value::Number(base.powf(exponent)))
    });

    install_method(interp, math, "max", 2, |interp, call| {
        let mut best = f64::NEG_INFINITY;
        for arg in &call.args {
            let x = interp.to_number(arg);
            if x.is_nan() {
                return Ok(Value::Number(f64::NAN));
            }
            if x > best {
                best = x;
            }
        }
        Ok(Value::Number(best))
    });

    install_method(interp, math, "min", 2, |interp, call| {
        let mut best = f64::INFINITY;
        for arg in &call.args {
            let x = interp.to_number(arg);
            if x.is_nan() {
                return Ok(Value::Number(f64::NAN));
            }
            if x < best {
                best = x;
            }
        }
        Ok(Value::Number(best))
    });

    install_method(interp, math, "random", 0, |interp, _| {
        Ok(Value::Number(interp.next_random()))
    });
}

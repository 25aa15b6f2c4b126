use sandscript::{Config, Interpreter, NativeValue, Status, Value};

fn run_to_value(code: &str) -> Value {
    let mut interp = Interpreter::new(code).expect("parse failure");
    let paused = interp.run().expect("runtime failure");
    assert!(!paused, "program should finish without pausing");
    interp.value()
}

fn expect_number(code: &str, expected: f64) {
    match run_to_value(code) {
        Value::Number(n) => assert_eq!(n, expected, "program: {}", code),
        other => panic!("expected number from {}, got {:?}", code, other),
    }
}

fn expect_string(code: &str, expected: &str) {
    match run_to_value(code) {
        Value::String(s) => assert_eq!(&*s, expected, "program: {}", code),
        other => panic!("expected string from {}, got {:?}", code, other),
    }
}

fn expect_bool(code: &str, expected: bool) {
    match run_to_value(code) {
        Value::Boolean(b) => assert_eq!(b, expected, "program: {}", code),
        other => panic!("expected boolean from {}, got {:?}", code, other),
    }
}

#[test]
fn simple_variable_and_observation() {
    let mut interp = Interpreter::new("var x=1; x;").unwrap();
    let paused = interp.run().unwrap();
    assert!(!paused);
    assert!(matches!(interp.value(), Value::Number(n) if n == 1.0));
}

#[test]
fn function_call_returns_value() {
    expect_number("function f(n){return n+1} f(1)", 2.0);
}

#[test]
fn object_property_round_trip() {
    expect_string("var o={}; o.p='hi'; o.p", "hi");
}

#[test]
fn host_seeded_object_is_mutable_from_inside() {
    let mut interp = Interpreter::new_with_init(
        "inputObject.b = 2; this.inputObject;",
        Box::new(|interp, global| {
            let seeded = interp
                .native_to_pseudo(&NativeValue::Object(vec![(
                    "a".to_string(),
                    NativeValue::Num(1.0),
                )]))
                .unwrap();
            interp.set_property(global, "inputObject", seeded);
        }),
    )
    .unwrap();
    interp.run().unwrap();
    let value = interp.value();
    let out = interp.pseudo_to_native(&value);
    assert_eq!(
        out,
        NativeValue::Object(vec![
            ("a".to_string(), NativeValue::Num(1.0)),
            ("b".to_string(), NativeValue::Num(2.0)),
        ])
    );
}

#[test]
fn null_member_read_is_a_catchable_type_error() {
    match run_to_value("try { null.x } catch (e) { e.name + ':' + e.message }") {
        Value::String(s) => assert!(s.starts_with("TypeError:"), "got {}", s),
        other => panic!("expected string, got {:?}", other),
    }
}

#[test]
fn sort_and_join_through_the_polyfill() {
    expect_string("var a=[3,1,2]; a.sort(); a.join(',')", "1,2,3");
}

#[test]
fn stepping_terminates_and_is_idempotent() {
    let mut interp = Interpreter::new("var x=1; x;").unwrap();
    let mut steps = 0;
    while interp.step().unwrap() {
        steps += 1;
        assert!(steps < 1000, "runaway step loop");
    }
    assert!(steps >= 2, "user statements take separate steps");
    assert_eq!(interp.status(), Status::Done);
    // Termination is stable.
    assert!(!interp.run().unwrap());
    assert!(!interp.step().unwrap());
    assert!(matches!(interp.value(), Value::Number(n) if n == 1.0));
    assert!(!interp.run().unwrap());
    assert!(matches!(interp.value(), Value::Number(n) if n == 1.0));
}

#[test]
fn append_code_extends_a_finished_program() {
    let mut interp = Interpreter::new("var x = 40;").unwrap();
    assert!(!interp.run().unwrap());
    interp.append_code("x + 2;").unwrap();
    assert_eq!(interp.status(), Status::Runnable);
    assert!(!interp.run().unwrap());
    assert!(matches!(interp.value(), Value::Number(n) if n == 42.0));
}

#[test]
fn closures_capture_environments() {
    expect_number(
        "function counter(){var n=0; return function(){n=n+1; return n}}\
         var c = counter(); c(); c(); c()",
        3.0,
    );
}

#[test]
fn constructor_returns_this_for_primitive_returns() {
    expect_number(
        "function Point(x){this.x=x; return 5} var p = new Point(7); p.x",
        7.0,
    );
    expect_number(
        "function Box(){ } Box.prototype.size = function(){return 1};\
         new Box().size()",
        1.0,
    );
}

#[test]
fn accessors_in_object_literals() {
    expect_number("var o = { get x() { return 42; } }; o.x", 42.0);
    expect_number(
        "var captured; var o = { set x(v) { captured = v * 2; } }; o.x = 21; captured",
        42.0,
    );
}

#[test]
fn getter_runs_exactly_once_per_access() {
    expect_number(
        "var count = 0;\
         var o = { get x() { count = count + 1; return 1; } };\
         o.x; o.x; count",
        2.0,
    );
}

#[test]
fn define_property_accessors_and_flags() {
    expect_number(
        "var o = {};\
         Object.defineProperty(o, 'x', { get: function() { return 11; } });\
         o.x",
        11.0,
    );
    expect_bool(
        "var o = {};\
         Object.defineProperty(o, 'p', { value: 1, enumerable: false });\
         o.propertyIsEnumerable('p')",
        false,
    );
}

#[test]
fn labeled_loops_and_switch_fallthrough() {
    expect_number(
        "var total = 0;\
         outer: for (var i = 0; i < 3; i++) {\
           for (var j = 0; j < 3; j++) {\
             if (j === 1) continue outer;\
             total = total + 1;\
           }\
         }\
         total",
        3.0,
    );
    expect_string(
        "var r = '';\
         switch (2) {\
           case 1: r += 'a';\
           case 2: r += 'b';\
           case 3: r += 'c'; break;\
           default: r += 'd';\
         }\
         r",
        "bc",
    );
    expect_string(
        "var r = '';\
         switch (9) {\
           case 1: r += 'a'; break;\
           default: r += 'd';\
         }\
         r",
        "d",
    );
}

#[test]
fn with_statement_reads_object_properties_first() {
    expect_number("var o = { x: 5 }; var r; with (o) { r = x; } r", 5.0);
}

#[test]
fn direct_eval_sees_caller_scope() {
    expect_number("var a = 1; eval('a + 1')", 2.0);
    expect_number(
        "function f() { var local = 10; return eval('local * 2'); } f()",
        20.0,
    );
}

#[test]
fn eval_parse_errors_become_interpreted_syntax_errors() {
    expect_string("try { eval('var }'); 'no' } catch (e) { e.name }", "SyntaxError");
}

#[test]
fn new_function_compiles_source() {
    expect_number("var f = new Function('a', 'b', 'return a + b'); f(2, 3)", 5.0);
}

#[test]
fn bind_call_apply() {
    expect_number("function add(a,b){return a+b} add.bind(null, 2)(3)", 5.0);
    expect_number("function f(){return this.x} f.call({x: 9})", 9.0);
    expect_number("function f(a,b){return this.x+a+b} f.apply({x:1},[2,3])", 6.0);
}

#[test]
fn array_iteration_polyfills() {
    expect_string("[1,2,3].map(function(x){return x*2}).join('-')", "2-4-6");
    expect_number("[1,2,3,4].filter(function(x){return x%2===0}).length", 2.0);
    expect_number("[1,2,3].reduce(function(a,b){return a+b}, 10)", 16.0);
    expect_bool("[1,2,3].some(function(x){return x>2})", true);
    expect_bool("[1,2,3].every(function(x){return x>2})", false);
    expect_number("[5,6,7].indexOf(6)", 1.0);
}

#[test]
fn json_stringify_and_parse() {
    expect_string(
        "JSON.stringify({a:[1,2],b:'x'})",
        r#"{"a":[1,2],"b":"x"}"#,
    );
    expect_number("JSON.parse('{\"a\": 41.5}').a + 0.5", 42.0);
    expect_string(
        "try { var a = []; a[0] = a; JSON.stringify(a); 'no' } catch (e) { e.name }",
        "TypeError",
    );
}

#[test]
fn math_and_number_formatting() {
    expect_number("Math.max(1, 5, 3)", 5.0);
    expect_number("Math.floor(1.9) + Math.ceil(0.1)", 2.0);
    expect_string("(255).toString(16)", "ff");
    expect_string("(1.005).toFixed(1)", "1.0");
    expect_string("String(1e21)", "1e+21");
}

#[test]
fn date_arithmetic_is_utc() {
    expect_number("new Date(86400000).getUTCDate()", 2.0);
    expect_string("new Date(0).toISOString()", "1970-01-01T00:00:00.000Z");
    expect_number("Date.UTC(1970, 0, 2)", 86400000.0);
    expect_number("new Date('1970-01-02T00:00:00Z').getTime()", 86400000.0);
}

#[test]
fn boxed_string_indices_are_readonly() {
    expect_number("new String('ab').length", 2.0);
    expect_string("var s = new String('ab'); s[0]", "a");
    expect_string("var s = new String('ab'); s[0] = 'z'; s[0]", "a");
}

#[test]
fn string_methods() {
    expect_string("'abc'.charAt(1)", "b");
    expect_number("'hello'.indexOf('lo')", 3.0);
    expect_string("'  pad  '.trim()", "pad");
    expect_string("'a-b-c'.split('-').join('+')", "a+b+c");
    expect_string("'abc'.substring(2, 0)", "ab");
    expect_number("'abc'.charCodeAt(0)", 97.0);
}

#[test]
fn async_function_pauses_and_resumes() {
    use std::cell::RefCell;
    use std::rc::Rc;

    let handle_slot = Rc::new(RefCell::new(None));
    let slot = Rc::clone(&handle_slot);
    let mut interp = Interpreter::new_with_init(
        "fetchValue() + 1;",
        Box::new(move |interp, global| {
            let slot = Rc::clone(&slot);
            let func = interp.create_async_function("fetchValue", move |_, _, handle| {
                *slot.borrow_mut() = Some(handle);
                Ok(())
            });
            interp.set_property(global, "fetchValue", Value::Object(func));
        }),
    )
    .unwrap();

    let paused = interp.run().unwrap();
    assert!(paused);
    assert_eq!(interp.status(), Status::Paused);

    let handle = handle_slot.borrow_mut().take().expect("async call reached host");
    assert!(interp.resolve_async(handle, Value::Number(41.0)));
    let paused = interp.run().unwrap();
    assert!(!paused);
    assert!(matches!(interp.value(), Value::Number(n) if n == 42.0));
}

#[test]
fn rejected_async_call_throws_into_the_program() {
    use std::cell::RefCell;
    use std::rc::Rc;

    let handle_slot = Rc::new(RefCell::new(None));
    let slot = Rc::clone(&handle_slot);
    let mut interp = Interpreter::new_with_init(
        "var r; try { risky(); r = 'ok'; } catch (e) { r = 'caught:' + e; } r;",
        Box::new(move |interp, global| {
            let slot = Rc::clone(&slot);
            let func = interp.create_async_function("risky", move |_, _, handle| {
                *slot.borrow_mut() = Some(handle);
                Ok(())
            });
            interp.set_property(global, "risky", Value::Object(func));
        }),
    )
    .unwrap();

    assert!(interp.run().unwrap());
    let handle = handle_slot.borrow_mut().take().unwrap();
    assert!(interp.reject_async(handle, Value::string("boom")));
    assert!(!interp.run().unwrap());
    assert!(matches!(interp.value(), Value::String(s) if &*s == "caught:boom"));
}

#[test]
fn native_function_wrapping() {
    let mut interp = Interpreter::new_with_init(
        "triple(14);",
        Box::new(|interp, global| {
            let func = interp.create_native_function("triple", |_, call| {
                let n = match call.arg(0) {
                    Value::Number(n) => n,
                    other => panic!("unexpected argument {:?}", other),
                };
                Ok(Value::Number(n * 3.0))
            });
            interp.set_property(global, "triple", Value::Object(func));
        }),
    )
    .unwrap();
    assert!(!interp.run().unwrap());
    assert!(matches!(interp.value(), Value::Number(n) if n == 42.0));
}

#[test]
fn from_ast_runs_pre_parsed_programs() {
    let program = sandscript::parse_program("6 * 7;", sandscript::ast::SourceKind::User).unwrap();
    let mut interp = Interpreter::from_ast(program, Config::default()).unwrap();
    assert!(!interp.run().unwrap());
    assert!(matches!(interp.value(), Value::Number(n) if n == 42.0));
}

#[test]
fn construction_rejects_bad_source() {
    assert!(matches!(
        Interpreter::new("var = ;"),
        Err(sandscript::Error::Syntax(_))
    ));
}

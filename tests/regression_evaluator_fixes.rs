use sandscript::{Error, Interpreter, Value};

fn run_to_value(code: &str) -> Value {
    let mut interp = Interpreter::new(code).expect("parse failure");
    assert!(!interp.run().expect("runtime failure"));
    interp.value()
}

fn run_to_error(code: &str) -> Error {
    let mut interp = Interpreter::new(code).expect("parse failure");
    interp.run().expect_err("program should fail")
}

#[test]
fn implicit_global_assignment_is_mode_dependent() {
    match run_to_value("y = 7; y") {
        Value::Number(n) => assert_eq!(n, 7.0),
        other => panic!("expected 7, got {:?}", other),
    }
    match run_to_error("'use strict'; y = 7;") {
        Error::Reference(msg) => assert!(msg.contains("not defined"), "got {}", msg),
        other => panic!("expected ReferenceError, got {:?}", other),
    }
}

#[test]
fn reading_unbound_names_throws_except_under_typeof() {
    match run_to_error("missing;") {
        Error::Reference(_) => {}
        other => panic!("expected ReferenceError, got {:?}", other),
    }
    match run_to_value("typeof missing") {
        Value::String(s) => assert_eq!(&*s, "undefined"),
        other => panic!("expected string, got {:?}", other),
    }
}

#[test]
fn delete_honors_configurability() {
    match run_to_value(
        "var o = {};\
         Object.defineProperty(o, 'p', { value: 1, configurable: false });\
         delete o.p",
    ) {
        Value::Boolean(deleted) => assert!(!deleted),
        other => panic!("expected boolean, got {:?}", other),
    }
    match run_to_error(
        "'use strict';\
         var o = {};\
         Object.defineProperty(o, 'p', { value: 1, configurable: false });\
         delete o.p;",
    ) {
        Error::Type(_) => {}
        other => panic!("expected TypeError, got {:?}", other),
    }
    match run_to_value("var o = { p: 1 }; delete o.p") {
        Value::Boolean(deleted) => assert!(deleted),
        other => panic!("expected boolean, got {:?}", other),
    }
    // Deleting a non-reference is trivially true; variables are not
    // configurable.
    match run_to_value("delete 1") {
        Value::Boolean(b) => assert!(b),
        other => panic!("expected boolean, got {:?}", other),
    }
    match run_to_value("var x = 5; delete x") {
        Value::Boolean(b) => assert!(!b),
        other => panic!("expected boolean, got {:?}", other),
    }
}

#[test]
fn for_in_sees_indices_in_order_and_observes_deletion() {
    match run_to_value("var a=[3,1,2]; var r=''; for (var k in a) { r += k; } r") {
        Value::String(s) => assert_eq!(&*s, "012"),
        other => panic!("expected string, got {:?}", other),
    }
    match run_to_value(
        "var o = {a:1, b:2, c:3};\
         var r = '';\
         for (var k in o) { r += k; if (k === 'a') { delete o.c; } }\
         r",
    ) {
        Value::String(s) => assert_eq!(&*s, "ab"),
        other => panic!("expected string, got {:?}", other),
    }
}

#[test]
fn for_in_skips_shadowed_prototype_names() {
    match run_to_value(
        "function T() { this.x = 1; }\
         T.prototype.x = 9;\
         T.prototype.y = 2;\
         var r = '';\
         for (var k in new T()) { r += k; }\
         r",
    ) {
        Value::String(s) => assert_eq!(&*s, "xy"),
        other => panic!("expected string, got {:?}", other),
    }
}

#[test]
fn catch_binding_is_scoped_to_the_handler() {
    match run_to_value("var r; try { throw 1 } catch (e) { r = e; } r") {
        Value::Number(n) => assert_eq!(n, 1.0),
        other => panic!("expected 1, got {:?}", other),
    }
    match run_to_value("try { throw 1 } catch (e) { } typeof e") {
        Value::String(s) => assert_eq!(&*s, "undefined"),
        other => panic!("expected string, got {:?}", other),
    }
}

#[test]
fn finally_runs_and_completions_re_raise() {
    match run_to_value(
        "var r = '';\
         try { r += 'a'; throw 2; } catch (e) { r += 'b'; } finally { r += 'c'; }\
         r",
    ) {
        Value::String(s) => assert_eq!(&*s, "abc"),
        other => panic!("expected string, got {:?}", other),
    }
    match run_to_value(
        "var r = '';\
         function f() {\
           try { throw 'x'; } finally { r += 'f'; }\
         }\
         try { f(); } catch (e) { r += e; }\
         r",
    ) {
        Value::String(s) => assert_eq!(&*s, "fx"),
        other => panic!("expected string, got {:?}", other),
    }
}

#[test]
fn arguments_object_reports_call_arity() {
    match run_to_value("(function () { return arguments.length })(1,2,3)") {
        Value::Number(n) => assert_eq!(n, 3.0),
        other => panic!("expected 3, got {:?}", other),
    }
    match run_to_value("(function (a) { return arguments[1] })(1, 'second')") {
        Value::String(s) => assert_eq!(&*s, "second"),
        other => panic!("expected string, got {:?}", other),
    }
}

#[test]
fn array_length_invariant_holds_both_directions() {
    match run_to_value("var a = []; a[4] = 1; a.length") {
        Value::Number(n) => assert_eq!(n, 5.0),
        other => panic!("expected 5, got {:?}", other),
    }
    match run_to_value("var a = [1,2,3,4]; a.length = 2; a.join(',')") {
        Value::String(s) => assert_eq!(&*s, "1,2"),
        other => panic!("expected string, got {:?}", other),
    }
    match run_to_value("var a = [1,2,3]; a.length = 2; typeof a[2]") {
        Value::String(s) => assert_eq!(&*s, "undefined"),
        other => panic!("expected string, got {:?}", other),
    }
    match run_to_error("var a = []; a.length = 1.5;") {
        Error::Range(_) => {}
        other => panic!("expected RangeError, got {:?}", other),
    }
}

#[test]
fn non_extensible_objects_reject_new_keys() {
    match run_to_value(
        "var o = { a: 1 };\
         Object.preventExtensions(o);\
         o.b = 2;\
         typeof o.b",
    ) {
        Value::String(s) => assert_eq!(&*s, "undefined"),
        other => panic!("expected string, got {:?}", other),
    }
    match run_to_error(
        "'use strict';\
         var o = {};\
         Object.preventExtensions(o);\
         o.b = 2;",
    ) {
        Error::Type(_) => {}
        other => panic!("expected TypeError, got {:?}", other),
    }
    match run_to_value(
        "var o = { a: 1 };\
         Object.preventExtensions(o);\
         o.a = 5;\
         o.a",
    ) {
        Value::Number(n) => assert_eq!(n, 5.0),
        other => panic!("expected 5, got {:?}", other),
    }
}

#[test]
fn setter_only_properties_reject_reads_and_strict_writes_of_getters() {
    match run_to_value(
        "var o = { set x(v) {} };\
         typeof o.x",
    ) {
        Value::String(s) => assert_eq!(&*s, "undefined"),
        other => panic!("expected string, got {:?}", other),
    }
    match run_to_error(
        "'use strict';\
         var o = { get x() { return 1; } };\
         o.x = 2;",
    ) {
        Error::Type(_) => {}
        other => panic!("expected TypeError, got {:?}", other),
    }
}

#[test]
fn compound_assignment_reads_through_getters_and_writes_through_setters() {
    match run_to_value(
        "var backing = 10;\
         var o = {\
           get x() { return backing; },\
           set x(v) { backing = v; }\
         };\
         o.x += 5;\
         backing",
    ) {
        Value::Number(n) => assert_eq!(n, 15.0),
        other => panic!("expected 15, got {:?}", other),
    }
}

#[test]
fn update_expressions_produce_old_or_new_values() {
    match run_to_value("var i = 5; var a = i++; a * 10 + i") {
        Value::Number(n) => assert_eq!(n, 56.0),
        other => panic!("expected 56, got {:?}", other),
    }
    match run_to_value("var i = 5; var a = ++i; a * 10 + i") {
        Value::Number(n) => assert_eq!(n, 66.0),
        other => panic!("expected 66, got {:?}", other),
    }
}

#[test]
fn equality_and_coercion_corners() {
    let checks = [
        ("null == undefined", true),
        ("null === undefined", false),
        ("'1' == 1", true),
        ("'1' === 1", false),
        ("NaN === NaN", false),
        ("1/0 === Infinity", true),
        ("'a' + 1 === 'a1'", true),
        ("'3' * '2' === 6", true),
        ("1 < 2 === true", true),
        ("'b' > 'a'", true),
        ("'x' in {x: 1}", true),
        ("0 in [7]", true),
        ("[] instanceof Array", true),
        ("({}) instanceof Array", false),
        ("typeof null === 'object'", true),
        ("-0 === 0", true),
        ("~5 === -6", true),
        ("(8 >>> 1) === 4", true),
        ("(-1 >>> 0) === 4294967295", true),
        ("void 0 === undefined", true),
    ];
    for (code, expected) in checks {
        match run_to_value(&format!("{};", code)) {
            Value::Boolean(b) => assert_eq!(b, expected, "program: {}", code),
            other => panic!("expected boolean from {}, got {:?}", code, other),
        }
    }
}

#[test]
fn operators_invoke_interpreted_value_of() {
    let numeric_cases = [
        ("var o = { valueOf: function () { return 42; } }; o + 1", 43.0),
        ("var o = { valueOf: function () { return 42; } }; o - 2", 40.0),
        ("var o = { valueOf: function () { return 42; } }; o * 2", 84.0),
        ("var o = { valueOf: function () { return 42; } }; o / 2", 21.0),
        ("var o = { valueOf: function () { return 42; } }; o % 5", 2.0),
        ("var o = { valueOf: function () { return 42; } }; -o", -42.0),
        ("var o = { valueOf: function () { return 6; } }; o | 1", 7.0),
        ("var o = { valueOf: function () { return 7; } }; ~o", -8.0),
    ];
    for (code, expected) in numeric_cases {
        match run_to_value(code) {
            Value::Number(n) => assert_eq!(n, expected, "program: {}", code),
            other => panic!("expected number from {}, got {:?}", code, other),
        }
    }
    let boolean_cases = [
        ("var o = { valueOf: function () { return 42; } }; o > 40", true),
        ("var o = { valueOf: function () { return 42; } }; o < 40", false),
        ("var o = { valueOf: function () { return 42; } }; o == 42", true),
        ("var o = { valueOf: function () { return 42; } }; o != 42", false),
        // Strict equality never coerces.
        ("var o = { valueOf: function () { return 42; } }; o === 42", false),
    ];
    for (code, expected) in boolean_cases {
        match run_to_value(code) {
            Value::Boolean(b) => assert_eq!(b, expected, "program: {}", code),
            other => panic!("expected boolean from {}, got {:?}", code, other),
        }
    }
    // Each operand converts exactly once.
    match run_to_value(
        "var calls = 0;\
         var o = { valueOf: function () { calls++; return 7; } };\
         o + o;\
         calls",
    ) {
        Value::Number(n) => assert_eq!(n, 2.0),
        other => panic!("expected 2, got {:?}", other),
    }
}

#[test]
fn to_primitive_falls_back_from_value_of_to_to_string() {
    match run_to_value("var o = { toString: function () { return 'S'; } }; o + '!'") {
        Value::String(s) => assert_eq!(&*s, "S!"),
        other => panic!("expected string, got {:?}", other),
    }
    match run_to_value(
        "var o = {\
           valueOf: function () { return {}; },\
           toString: function () { return 'T'; }\
         };\
         o + ''",
    ) {
        Value::String(s) => assert_eq!(&*s, "T"),
        other => panic!("expected string, got {:?}", other),
    }
    match run_to_value(
        "var o = {\
           valueOf: function () { return {}; },\
           toString: function () { return {}; }\
         };\
         try { o + 1; 'no' } catch (e) { e.name }",
    ) {
        Value::String(s) => assert_eq!(&*s, "TypeError"),
        other => panic!("expected string, got {:?}", other),
    }
}

#[test]
fn default_hint_is_string_for_dates_only() {
    // Addition uses the string probe order for dates.
    match run_to_value("(new Date(0) + '').indexOf('Thu Jan 01 1970')") {
        Value::Number(n) => assert_eq!(n, 0.0),
        other => panic!("expected 0, got {:?}", other),
    }
    // Relational comparison forces the number hint even for dates.
    match run_to_value("new Date(100) > new Date(50)") {
        Value::Boolean(b) => assert!(b),
        other => panic!("expected boolean, got {:?}", other),
    }
    // Boxed numbers unwrap through the native valueOf.
    match run_to_value("new Number(5) + 1") {
        Value::Number(n) => assert_eq!(n, 6.0),
        other => panic!("expected 6, got {:?}", other),
    }
}

#[test]
fn with_scope_resolves_through_the_prototype_chain() {
    match run_to_value(
        "var proto = { y: 10 };\
         var o = Object.create(proto);\
         var y = 'outer';\
         var r;\
         with (o) { r = y; }\
         r",
    ) {
        Value::Number(n) => assert_eq!(n, 10.0),
        other => panic!("expected 10, got {:?}", other),
    }
    // A miss anywhere on the target's chain still falls outward.
    match run_to_value("var z = 5; var r; with ({ a: 1 }) { r = z; } r") {
        Value::Number(n) => assert_eq!(n, 5.0),
        other => panic!("expected 5, got {:?}", other),
    }
    // Writes land on the target when it owns the name, not the outer var.
    match run_to_value("var o = { x: 1 }; var x = 2; with (o) { x = 9; } o.x + ',' + x") {
        Value::String(s) => assert_eq!(&*s, "9,2"),
        other => panic!("expected string, got {:?}", other),
    }
}

#[test]
fn with_scope_write_honors_inherited_accessors() {
    match run_to_value(
        "var proto = {};\
         Object.defineProperty(proto, 'x', {\
           get: function () { return 0; },\
           set: function (v) { this.captured = v; }\
         });\
         var o = Object.create(proto);\
         with (o) { x = 7; }\
         o.captured",
    ) {
        Value::Number(n) => assert_eq!(n, 7.0),
        other => panic!("expected 7, got {:?}", other),
    }
}

#[test]
fn do_while_runs_body_before_test() {
    match run_to_value("var n = 0; do { n++; } while (false); n") {
        Value::Number(n) => assert_eq!(n, 1.0),
        other => panic!("expected 1, got {:?}", other),
    }
}

#[test]
fn hoisting_of_vars_and_functions() {
    match run_to_value("typeof hoisted; function hoisted() {} 'ok'") {
        Value::String(s) => assert_eq!(&*s, "ok"),
        other => panic!("expected string, got {:?}", other),
    }
    match run_to_value("var r = typeof later; var later = 1; r") {
        Value::String(s) => assert_eq!(&*s, "undefined"),
        other => panic!("expected string, got {:?}", other),
    }
    match run_to_value("var r = before(); function before() { return 'early'; } r") {
        Value::String(s) => assert_eq!(&*s, "early"),
        other => panic!("expected string, got {:?}", other),
    }
}

#[test]
fn uncaught_throws_map_to_host_error_classes() {
    match run_to_error("undefinedFunction();") {
        Error::Reference(_) => {}
        other => panic!("expected ReferenceError, got {:?}", other),
    }
    match run_to_error("null.x;") {
        Error::Type(_) => {}
        other => panic!("expected TypeError, got {:?}", other),
    }
    match run_to_error("throw new RangeError('too big');") {
        Error::Range(msg) => assert_eq!(msg, "too big"),
        other => panic!("expected RangeError, got {:?}", other),
    }
    match run_to_error("throw 'plain';") {
        Error::Runtime(msg) => assert_eq!(msg, "plain"),
        other => panic!("expected Runtime, got {:?}", other),
    }
}

#[test]
fn function_display_names_flow_from_declarations() {
    match run_to_value("var named = function () {}; named.name") {
        Value::String(s) => assert_eq!(&*s, "named"),
        other => panic!("expected string, got {:?}", other),
    }
    match run_to_value("function decl() {} decl.name") {
        Value::String(s) => assert_eq!(&*s, "decl"),
        other => panic!("expected string, got {:?}", other),
    }
}

#[test]
fn this_binding_rules() {
    match run_to_value("function f() { return this === window; } f()") {
        Value::Boolean(b) => assert!(b, "loose-mode plain call binds the global object"),
        other => panic!("expected boolean, got {:?}", other),
    }
    match run_to_value(
        "'use strict'; function f() { return this === undefined; } f()",
    ) {
        Value::Boolean(b) => assert!(b, "strict plain call leaves this undefined"),
        other => panic!("expected boolean, got {:?}", other),
    }
    match run_to_value("var o = { v: 3, m: function () { return this.v; } }; o.m()") {
        Value::Number(n) => assert_eq!(n, 3.0),
        other => panic!("expected 3, got {:?}", other),
    }
}

#[test]
fn global_constants_resist_overwrites() {
    match run_to_value("NaN = 5; typeof NaN") {
        Value::String(s) => assert_eq!(&*s, "number"),
        other => panic!("expected string, got {:?}", other),
    }
    match run_to_value("undefined = 5; typeof undefined") {
        Value::String(s) => assert_eq!(&*s, "undefined"),
        other => panic!("expected string, got {:?}", other),
    }
}

#[test]
fn sequence_and_conditional_expressions() {
    match run_to_value("var x = (1, 2, 3); x") {
        Value::Number(n) => assert_eq!(n, 3.0),
        other => panic!("expected 3, got {:?}", other),
    }
    match run_to_value("true ? 'y' : 'n'") {
        Value::String(s) => assert_eq!(&*s, "y"),
        other => panic!("expected string, got {:?}", other),
    }
    match run_to_value("var r = 0 || 'fallback'; r") {
        Value::String(s) => assert_eq!(&*s, "fallback"),
        other => panic!("expected string, got {:?}", other),
    }
    match run_to_value("var r = 0 && 'never'; r") {
        Value::Number(n) => assert_eq!(n, 0.0),
        other => panic!("expected 0, got {:?}", other),
    }
}

use std::time::Duration;

use sandscript::{Config, Interpreter, RegexpMode, Value};

fn config(mode: RegexpMode) -> Config {
    Config {
        regexp_mode: mode,
        ..Config::default()
    }
}

fn run_with_mode(code: &str, mode: RegexpMode) -> Value {
    let mut interp = Interpreter::with_config(code, config(mode)).expect("parse failure");
    assert!(!interp.run().expect("runtime failure"));
    interp.value()
}

fn expect_string(code: &str, mode: RegexpMode, expected: &str) {
    match run_with_mode(code, mode) {
        Value::String(s) => assert_eq!(&*s, expected, "program: {}", code),
        other => panic!("expected string from {}, got {:?}", code, other),
    }
}

fn expect_number(code: &str, mode: RegexpMode, expected: f64) {
    match run_with_mode(code, mode) {
        Value::Number(n) => assert_eq!(n, expected, "program: {}", code),
        other => panic!("expected number from {}, got {:?}", code, other),
    }
}

fn both_executing_modes() -> [RegexpMode; 2] {
    [RegexpMode::Native, RegexpMode::Sandboxed]
}

#[test]
fn replace_with_string_template() {
    for mode in both_executing_modes() {
        expect_string("'hello'.replace(/l+/, '[$&]')", mode, "he[ll]o");
        expect_string("'hello'.replace(/l/g, 'L')", mode, "heLLo");
        expect_string("'a-b'.replace(/(a)-(b)/, '$2-$1')", mode, "b-a");
    }
}

#[test]
fn replace_with_function_goes_through_the_polyfill() {
    for mode in both_executing_modes() {
        expect_string(
            "'a1b2'.replace(/\\d/g, function (d) { return '<' + d + '>'; })",
            mode,
            "a<1>b<2>",
        );
        expect_string(
            "'xy'.replace('y', function (m, at) { return m + at; })",
            mode,
            "xy1",
        );
    }
}

#[test]
fn match_search_split() {
    for mode in both_executing_modes() {
        expect_number("'aa b aaa'.match(/a+/g).length", mode, 2.0);
        expect_string("'aa b aaa'.match(/a+/g).join('|')", mode, "aa|aaa");
        expect_string("String('x'.match(/z/))", mode, "null");
        expect_number("'hello'.search(/l/)", mode, 2.0);
        expect_number("'hello'.search(/z/)", mode, -1.0);
        expect_string("'a1b2c'.split(/(\\d)/).join('|')", mode, "a|1|b|2|c");
        expect_number("'a,b,c'.split(/,/ , 2).length", mode, 2.0);
    }
}

#[test]
fn exec_round_trips_last_index() {
    for mode in both_executing_modes() {
        expect_number("var re = /a/g; re.exec('banana'); re.lastIndex", mode, 2.0);
        expect_number(
            "var re = /a/g; re.exec('banana'); re.exec('banana'); re.lastIndex",
            mode,
            4.0,
        );
        expect_number(
            "var re = /z/g; re.lastIndex = 1; re.exec('aaa'); re.lastIndex",
            mode,
            0.0,
        );
        expect_string(
            "var m = /(b)(z)?/.exec('abc'); m[1] + ':' + typeof m[2] + ':' + m.index",
            mode,
            "b:undefined:1",
        );
        expect_string("var m = /b/.exec('abc'); m.input", mode, "abc");
    }
}

#[test]
fn test_method_delegates_to_exec() {
    for mode in both_executing_modes() {
        expect_string(
            "/^[0-9]+$/.test('123') ? 'numeric' : 'other'",
            mode,
            "numeric",
        );
        expect_string(
            "/^[0-9]+$/.test('12a') ? 'numeric' : 'other'",
            mode,
            "other",
        );
    }
}

#[test]
fn lookahead_and_backreferences_work() {
    for mode in both_executing_modes() {
        expect_number("'aba'.search(/(a)b\\1/)", mode, 0.0);
        expect_string("'price: 5' .replace(/(?=5)/, '$') ", mode, "price: $5");
    }
}

#[test]
fn string_separator_split_never_needs_the_backend() {
    // Works even with the backend disabled.
    expect_string("'a-b-c'.split('-').join('+')", RegexpMode::Disabled, "a+b+c");
    expect_number("'abc'.split('').length", RegexpMode::Disabled, 3.0);
}

#[test]
fn disabled_mode_rejects_regex_operations_but_not_literals() {
    expect_string("var re = /abc/i; re.source", RegexpMode::Disabled, "abc");
    expect_string(
        "try { 'a'.match(/a/); 'no' } catch (e) { e.message }",
        RegexpMode::Disabled,
        "Regular expressions not supported",
    );
    expect_string(
        "try { /a/.exec('a'); 'no' } catch (e) { e.message }",
        RegexpMode::Disabled,
        "Regular expressions not supported",
    );
}

#[test]
fn invalid_patterns_surface_as_syntax_errors() {
    for mode in both_executing_modes() {
        expect_string(
            "try { new RegExp('('); 'no' } catch (e) { e.name }",
            mode,
            "SyntaxError",
        );
    }
}

#[test]
fn runaway_patterns_are_bounded() {
    // Exponential backtracking against a non-matching tail; the budget (or
    // wall clock) cuts it off in either executing mode.
    let program = "var r;\
        try {\
          /(a+)+$/.test('aaaaaaaaaaaaaaaaaaaaaaaaaaaab');\
          r = 'finished';\
        } catch (e) {\
          r = e.message;\
        }\
        r;";
    for mode in both_executing_modes() {
        let mut interp = Interpreter::with_config(
            program,
            Config {
                regexp_mode: mode,
                regexp_thread_timeout: Duration::from_millis(2000),
                ..Config::default()
            },
        )
        .unwrap();
        assert!(!interp.run().unwrap());
        match interp.value() {
            Value::String(s) => assert_eq!(&*s, "RegExp Timeout"),
            other => panic!("expected string, got {:?}", other),
        }
    }
}

#[test]
fn sandboxed_mode_services_suspensions_inside_run() {
    // The pause/resume dance is internal: a simple run() call completes.
    let mut interp = Interpreter::with_config(
        "'sandboxed'.replace(/box/, 'BOX')",
        config(RegexpMode::Sandboxed),
    )
    .unwrap();
    assert!(!interp.run().unwrap());
    assert!(matches!(interp.value(), Value::String(s) if &*s == "sandBOXed"));
}

#[test]
fn sandboxed_mode_services_suspensions_inside_step() {
    let mut interp = Interpreter::with_config(
        "var r = 'ab'.replace(/b/, 'c'); r;",
        config(RegexpMode::Sandboxed),
    )
    .unwrap();
    let mut steps = 0;
    while interp.step().unwrap() {
        steps += 1;
        assert!(steps < 10_000, "runaway step loop");
    }
    assert!(matches!(interp.value(), Value::String(s) if &*s == "ac"));
}

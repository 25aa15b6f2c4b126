use proptest::collection::btree_map;
use proptest::prelude::*;
use sandscript::{Interpreter, NativeValue, Value};

const DEFAULT_ROUNDTRIP_CASES: u32 = 128;

fn roundtrip_cases() -> u32 {
    std::env::var("SANDSCRIPT_ROUNDTRIP_CASES")
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_ROUNDTRIP_CASES)
}

fn fresh_interpreter() -> Interpreter {
    Interpreter::new("").expect("empty program")
}

fn round_trip(interp: &mut Interpreter, value: &NativeValue) -> NativeValue {
    let pseudo = interp.native_to_pseudo(value).expect("conversion in");
    interp.pseudo_to_native(&pseudo)
}

#[test]
fn scalar_values_survive_the_crossing() {
    let mut interp = fresh_interpreter();
    let cases = [
        NativeValue::Undefined,
        NativeValue::Null,
        NativeValue::Bool(true),
        NativeValue::Bool(false),
        NativeValue::Num(0.0),
        NativeValue::Num(-1.5),
        NativeValue::Num(f64::NAN),
        NativeValue::Num(f64::INFINITY),
        NativeValue::Str(String::new()),
        NativeValue::Str("hello world".to_string()),
    ];
    for case in &cases {
        assert_eq!(&round_trip(&mut interp, case), case);
    }
}

#[test]
fn structured_values_survive_the_crossing() {
    let mut interp = fresh_interpreter();
    let value = NativeValue::Object(vec![
        (
            "list".to_string(),
            NativeValue::Array(vec![
                Some(NativeValue::Num(1.0)),
                None,
                Some(NativeValue::Str("x".to_string())),
            ]),
        ),
        (
            "nested".to_string(),
            NativeValue::Object(vec![("deep".to_string(), NativeValue::Bool(true))]),
        ),
    ]);
    assert_eq!(round_trip(&mut interp, &value), value);
}

#[test]
fn array_holes_remain_holes() {
    let mut interp = fresh_interpreter();
    let value = NativeValue::Array(vec![None, Some(NativeValue::Num(2.0)), None]);
    let out = round_trip(&mut interp, &value);
    assert_eq!(out, value);
    // A hole is not the same as a stored undefined.
    let with_undefined = NativeValue::Array(vec![Some(NativeValue::Undefined)]);
    assert_eq!(round_trip(&mut interp, &with_undefined), with_undefined);
}

#[test]
fn regexes_round_trip_source_flags_and_last_index() {
    let mut interp = fresh_interpreter();
    let cases = [
        NativeValue::RegExp {
            source: "a+b".to_string(),
            flags: "g".to_string(),
            last_index: 3.0,
        },
        NativeValue::RegExp {
            source: "(x)(y)?".to_string(),
            flags: "im".to_string(),
            last_index: 0.0,
        },
    ];
    for case in &cases {
        assert_eq!(&round_trip(&mut interp, case), case);
    }
}

#[test]
fn dates_round_trip_epoch_millis() {
    let mut interp = fresh_interpreter();
    for ms in [0.0, 86_400_000.0, -1.0, 1_700_000_000_123.0, f64::NAN] {
        let case = NativeValue::Date(ms);
        assert_eq!(round_trip(&mut interp, &case), case);
    }
}

#[test]
fn cyclic_pseudo_structures_do_not_hang() {
    let mut interp = Interpreter::new("var a = []; a[0] = a; a;").unwrap();
    assert!(!interp.run().unwrap());
    let value = interp.value();
    // The cyclic edge collapses instead of recursing forever.
    let out = interp.pseudo_to_native(&value);
    match out {
        NativeValue::Array(items) => assert_eq!(items.len(), 1),
        other => panic!("expected array, got {:?}", other),
    }
}

#[test]
fn host_functions_are_callable_from_inside() {
    use std::rc::Rc;
    let mut interp = Interpreter::new_with_init(
        "double(21);",
        Box::new(|interp, global| {
            let host: sandscript::HostFn = Rc::new(|_, args| match args.first() {
                Some(NativeValue::Num(n)) => NativeValue::Num(n * 2.0),
                _ => NativeValue::Undefined,
            });
            let func = interp
                .native_to_pseudo(&NativeValue::Function(host))
                .unwrap();
            interp.set_property(global, "double", func);
        }),
    )
    .unwrap();
    assert!(!interp.run().unwrap());
    assert!(matches!(interp.value(), Value::Number(n) if n == 42.0));
}

fn native_value_strategy() -> impl Strategy<Value = NativeValue> {
    let leaf = prop_oneof![
        Just(NativeValue::Null),
        Just(NativeValue::Undefined),
        any::<bool>().prop_map(NativeValue::Bool),
        (-1.0e15..1.0e15f64).prop_map(NativeValue::Num),
        "[a-z0-9 ]{0,8}".prop_map(NativeValue::Str),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(proptest::option::of(inner.clone()), 0..4)
                .prop_map(NativeValue::Array),
            btree_map("[a-z]{1,4}", inner, 0..4)
                .prop_map(|entries| NativeValue::Object(entries.into_iter().collect())),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: roundtrip_cases(),
        .. ProptestConfig::default()
    })]

    #[test]
    fn json_like_values_round_trip(value in native_value_strategy()) {
        let mut interp = fresh_interpreter();
        prop_assert_eq!(round_trip(&mut interp, &value), value);
    }
}

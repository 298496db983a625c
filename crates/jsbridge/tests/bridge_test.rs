//! Integration tests for value marshaling, identity and dynamic objects

use jsbridge::{
    ArrayKey, BridgeError, DynamicObject, HostArray, HostError, HostFunction, HostObject, HostValue,
    JsContext, PropertyAttributes, ScriptObjectProxy,
};
use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

fn context() -> JsContext {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    JsContext::new().unwrap()
}

fn calculator() -> HostValue {
    DynamicObject::builder("Calculator")
        .method("add", |_, args| {
            let sum = args.iter().filter_map(HostValue::as_int).sum::<i64>();
            Ok(HostValue::Int(sum))
        })
        .method("fail", |_, _| Err(HostError::new("boom")))
        .property("name", "calc")
        .build_value()
}

#[test]
fn test_primitives_roundtrip() {
    let context = context();
    assert_eq!(context.evaluate("null").unwrap(), HostValue::Null);
    assert_eq!(context.evaluate("undefined").unwrap(), HostValue::Null);
    assert_eq!(context.evaluate("true").unwrap(), HostValue::Bool(true));
    assert_eq!(context.evaluate("40 + 2").unwrap(), HostValue::Int(42));
    assert_eq!(context.evaluate("1.5").unwrap(), HostValue::Float(1.5));
    assert_eq!(context.evaluate("Symbol('s')").unwrap(), HostValue::Null);
}

#[test]
fn test_utf8_strings_roundtrip() {
    let context = context();
    context.assign("s", "héllo ✓").unwrap();
    assert_eq!(context.evaluate("s + '!'").unwrap(), HostValue::from("héllo ✓!"));
    assert_eq!(context.evaluate("s.length").unwrap(), HostValue::Int(7));
    assert_eq!(context.evaluate("'日本'").unwrap(), HostValue::from("日本"));
}

#[test]
fn test_large_integers_come_back_as_ints() {
    let context = context();
    let big = 1_i64 << 40;
    context.assign("big", big).unwrap();
    assert_eq!(context.evaluate("big").unwrap(), HostValue::Int(big));
    assert_eq!(context.evaluate("big + 1").unwrap(), HostValue::Int(big + 1));
    assert_eq!(context.evaluate("big / 3 > 0").unwrap(), HostValue::Bool(true));
}

#[test]
fn test_boxed_primitives_unwrap() {
    let context = context();
    assert_eq!(
        context.evaluate("new String('boxed')").unwrap(),
        HostValue::from("boxed")
    );
    assert_eq!(context.evaluate("new Number(7)").unwrap(), HostValue::Int(7));
    assert_eq!(context.evaluate("new Boolean(false)").unwrap(), HostValue::Bool(false));
    assert_eq!(context.evaluate("/ab+c/g").unwrap(), HostValue::from("/ab+c/g"));
}

#[test]
fn test_host_object_identity_preserved() {
    let context = context();
    let calc = calculator();
    context.assign("calc", calc.clone()).unwrap();

    let back = context.evaluate("calc").unwrap();
    assert!(back.same(&calc));

    let echo = HostFunction::new(|args| Ok(args.into_iter().next().unwrap_or(HostValue::Null)));
    context.assign("echo", echo).unwrap();
    let echoed = context.evaluate("echo(calc)").unwrap();
    assert!(echoed.same(&calc));
    assert_eq!(context.evaluate("calc === calc").unwrap(), HostValue::Bool(true));
}

#[test]
fn test_sparse_array_length() {
    let context = context();
    let array = HostArray::from_entries([
        (0_i64, HostValue::from("a")),
        (1_i64, HostValue::from("b")),
        (5_i64, HostValue::from("c")),
    ]);
    context.assign("arr", array.clone()).unwrap();

    assert_eq!(context.evaluate("arr.length").unwrap(), HostValue::Int(6));
    assert_eq!(context.evaluate("arr[5]").unwrap(), HostValue::from("c"));
    assert_eq!(context.evaluate("arr[3]").unwrap(), HostValue::Null);
    assert_eq!(context.evaluate("Array.isArray(arr)").unwrap(), HostValue::Bool(true));
    assert_eq!(context.evaluate("3 in arr").unwrap(), HostValue::Bool(false));
    assert_eq!(context.evaluate("5 in arr").unwrap(), HostValue::Bool(true));
}

#[test]
fn test_integer_key_enumeration() {
    let context = context();
    let array = HostArray::from_entries([
        (0_i64, HostValue::from("a")),
        (1_i64, HostValue::from("b")),
        (5_i64, HostValue::from("c")),
    ]);
    context.assign("arr", array).unwrap();
    assert_eq!(
        context.evaluate("Object.keys(arr)").unwrap().to_json(),
        serde_json::json!(["0", "1", "5"])
    );

    let object = DynamicObject::builder("Mixed")
        .property("7", "seven")
        .property("label", "x")
        .build_value();
    context.assign("mixed", object).unwrap();
    assert_eq!(
        context
            .evaluate("const seen = []; for (const k in mixed) seen.push(k); seen")
            .unwrap()
            .to_json(),
        serde_json::json!(["7", "label"])
    );
}

#[test]
fn test_array_writes_reach_host() {
    let context = context();
    let array = HostArray::from_values([1, 2, 3].map(HostValue::from));
    context.assign("arr", array.clone()).unwrap();

    context.evaluate("arr[3] = 'four'; arr[0] = arr[0] * 10;").unwrap();
    assert_eq!(array.get(3_i64), Some(HostValue::from("four")));
    assert_eq!(array.get(0_i64), Some(HostValue::Int(10)));

    context.evaluate("arr.length = 2").unwrap();
    assert_eq!(array.len(), 2);

    context.evaluate("delete arr[1]").unwrap();
    assert!(!array.contains_key(1_i64));
}

#[test]
fn test_array_comes_back_as_copy() {
    let context = context();
    let array = HostArray::from_entries([(0_i64, HostValue::from(1)), (4_i64, HostValue::from(5))]);
    context.assign("arr", array.clone()).unwrap();

    let copy = context.evaluate("arr").unwrap();
    let copy = copy.as_array().unwrap();
    assert_eq!(copy.len(), 2);
    assert_eq!(copy.get(4_i64), Some(HostValue::Int(5)));

    copy.push(HostValue::Null);
    assert_eq!(array.len(), 2);
}

#[test]
fn test_sparse_array_copies_only_present_keys() {
    let context = context();
    let array = HostArray::from_entries([
        (0_i64, HostValue::from("first")),
        (20_000_000_i64, HostValue::from("last")),
    ]);
    context.assign("arr", array).unwrap();

    let started = Instant::now();
    let copy = context.evaluate("arr").unwrap();
    let copy = copy.as_array().unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(copy.len(), 2);
    assert_eq!(copy.get(20_000_000_i64), Some(HostValue::from("last")));

    let script = context.evaluate("var a = []; a[50000000] = 1; a").unwrap();
    let script = script.as_array().unwrap();
    assert_eq!(script.keys(), vec![ArrayKey::Int(50_000_000)]);
}

#[test]
fn test_associative_array_keeps_string_keys() {
    let context = context();
    let array = HostArray::from_entries([
        ("name", HostValue::from("x")),
        ("id", HostValue::from(7)),
    ]);
    context.assign("record", array).unwrap();

    let copy = context.evaluate("record").unwrap();
    let copy = copy.as_array().unwrap();
    assert_eq!(copy.len(), 2);
    assert_eq!(copy.get("name"), Some(HostValue::from("x")));
    assert_eq!(copy.get("id"), Some(HostValue::Int(7)));
    assert!(!copy.contains_key("length"));

    let mixed = context.evaluate("var m = [1, 2]; m.tag = 't'; m").unwrap();
    assert_eq!(mixed.to_json(), serde_json::json!({"0": 1, "1": 2, "tag": "t"}));
}

#[test]
fn test_integral_floats_roundtrip_by_value() {
    let context = context();
    context.assign("two", 2.0_f64).unwrap();
    assert_eq!(context.global("two").unwrap(), HostValue::Float(2.0));

    context.assign("wide", 4_294_967_296.0_f64).unwrap();
    assert_eq!(context.global("wide").unwrap(), HostValue::Float(4_294_967_296.0));
    assert_eq!(context.evaluate("two === 2").unwrap(), HostValue::Bool(true));
}

#[test]
fn test_script_array_to_host() {
    let context = context();
    let value = context.evaluate("[1, 'two', [3]]").unwrap();
    assert_eq!(
        value.to_json(),
        serde_json::json!([1, "two", [3]])
    );
}

#[test]
fn test_bound_method_forwards_arguments() {
    let context = context();
    let seen = Rc::new(Cell::new(0usize));
    let counter = Rc::clone(&seen);
    let object = DynamicObject::builder("Recorder")
        .method("record", move |_, args| {
            counter.set(args.len());
            Ok(HostValue::from(args.len() as i64))
        })
        .build_value();
    context.assign("recorder", object).unwrap();

    assert_eq!(context.evaluate("recorder.record(1, 'x')").unwrap(), HostValue::Int(2));
    assert_eq!(seen.get(), 2);

    context.assign("calc", calculator()).unwrap();
    assert_eq!(context.evaluate("calc.add(2, 3)").unwrap(), HostValue::Int(5));
    assert_eq!(
        context.evaluate("const add = calc.add; add(4, 5)").unwrap(),
        HostValue::Int(9)
    );
    assert_eq!(context.evaluate("typeof calc.add").unwrap(), HostValue::from("function"));
}

#[test]
fn test_host_exception_is_catchable() {
    let context = context();
    context.assign("calc", calculator()).unwrap();

    let caught = context
        .evaluate("try { calc.fail(); 'not thrown' } catch (e) { e.message }")
        .unwrap();
    assert_eq!(caught, HostValue::from("boom"));

    let err = context.evaluate("calc.fail()").unwrap_err();
    assert!(err.is_script_error());
    assert!(err.to_string().contains("boom"));
}

#[test]
fn test_property_reads_and_writes() {
    let context = context();
    let calc = calculator();
    context.assign("calc", calc.clone()).unwrap();

    assert_eq!(context.evaluate("calc.name").unwrap(), HostValue::from("calc"));
    assert_eq!(context.evaluate("'name' in calc").unwrap(), HostValue::Bool(true));
    assert_eq!(context.evaluate("'add' in calc").unwrap(), HostValue::Bool(true));
    assert_eq!(context.evaluate("calc.missing").unwrap(), HostValue::Null);

    context.evaluate("calc.name = 'renamed'").unwrap();
    let object = calc.downcast_ref::<DynamicObject>().unwrap();
    assert_eq!(object.property("name"), Some(HostValue::from("renamed")));
    assert_eq!(
        context.evaluate("Object.keys(calc)").unwrap().to_json(),
        serde_json::json!(["name"])
    );
}

#[test]
fn test_method_shadows_property_in_descriptor() {
    let context = context();
    let object = DynamicObject::builder("Task")
        .property("run", "data")
        .property("label", "task")
        .method("run", |_, _| Ok(HostValue::from("ran")))
        .build_value();
    context.assign("task", object).unwrap();

    assert_eq!(context.evaluate("typeof task.run").unwrap(), HostValue::from("function"));
    assert_eq!(context.evaluate("task.run()").unwrap(), HostValue::from("ran"));
    assert_eq!(
        context
            .evaluate("Object.getOwnPropertyDescriptor(task, 'run') === undefined")
            .unwrap(),
        HostValue::Bool(true)
    );
    assert_eq!(
        context
            .evaluate("Object.getOwnPropertyDescriptor(task, 'label').value")
            .unwrap(),
        HostValue::from("task")
    );
}

#[test]
fn test_magic_getter_and_call_handler() {
    let context = context();
    let object = DynamicObject::builder("Magic")
        .getter(|_, name| name.starts_with("dyn").then(|| HostValue::from(name.len() as i64)))
        .call_handler(|_, name, args| Ok(HostValue::from(format!("{name}/{}", args.len()))))
        .build_value();
    context.assign("magic", object).unwrap();

    assert_eq!(context.evaluate("magic.dynamic").unwrap(), HostValue::Int(7));
    assert_eq!(context.evaluate("magic.anything(1, 2)").unwrap(), HostValue::from("anything/2"));
}

#[test]
fn test_offset_set_routing() {
    let context = context();
    let bag = DynamicObject::builder("Bag")
        .property("name", "bag")
        .array_access()
        .countable()
        .build_value();
    context.assign("bag", bag.clone()).unwrap();

    context
        .evaluate("bag.name = 'renamed'; bag.extra = 1; bag[0] = 'zero';")
        .unwrap();

    let object = bag.downcast_ref::<DynamicObject>().unwrap();
    let offsets = object.offsets().unwrap();
    assert_eq!(object.property("name"), Some(HostValue::from("renamed")));
    assert_eq!(offsets.get("extra"), Some(HostValue::Int(1)));
    assert_eq!(offsets.get(0_i64), Some(HostValue::from("zero")));
    assert!(object.property("extra").is_none());

    assert_eq!(context.evaluate("bag[0]").unwrap(), HostValue::from("zero"));
    assert_eq!(context.evaluate("bag.extra").unwrap(), HostValue::Int(1));
    assert_eq!(context.evaluate("bag.length").unwrap(), HostValue::Int(2));

    context.evaluate("delete bag[0]").unwrap();
    assert!(!offsets.contains_key(0_i64));
}

#[test]
fn test_invokable_object() {
    let context = context();
    let doubler = DynamicObject::builder("Doubler")
        .invokable(|_, args| {
            let value = args.first().and_then(HostValue::as_int).unwrap_or(0);
            Ok(HostValue::Int(value * 2))
        })
        .build_value();
    context.assign("double", doubler).unwrap();

    assert_eq!(context.evaluate("double(21)").unwrap(), HostValue::Int(42));
    assert_eq!(context.evaluate("typeof double").unwrap(), HostValue::from("function"));
}

#[test]
fn test_string_conversion() {
    let context = context();
    let object = DynamicObject::builder("Label")
        .to_string_with(|_| Ok("label text".to_string()))
        .build_value();
    context.assign("label", object).unwrap();

    assert_eq!(context.evaluate("String(label)").unwrap(), HostValue::from("label text"));
    assert_eq!(context.evaluate("`${label}!`").unwrap(), HostValue::from("label text!"));
    assert_eq!(context.evaluate("label.toString()").unwrap(), HostValue::from("label text"));
}

#[test]
fn test_assign_with_attributes() {
    let context = context();
    let attributes = PropertyAttributes::data().read_only().dont_enum().dont_delete();
    context.assign_with("fixed", 1i64, attributes).unwrap();

    assert_eq!(context.evaluate("fixed = 2; fixed").unwrap(), HostValue::Int(1));
    assert_eq!(
        context.evaluate("Object.keys(globalThis).includes('fixed')").unwrap(),
        HostValue::Bool(false)
    );
    assert_eq!(context.evaluate("delete globalThis.fixed").unwrap(), HostValue::Bool(false));
}

#[test]
fn test_syntax_error() {
    let context = context();
    let err = context.compile("var = ;").unwrap_err();
    assert!(matches!(err, BridgeError::SyntaxError { .. }), "got {err:?}");
    assert!(err.to_string().starts_with("Syntax error"));
}

#[test]
fn test_uncaught_script_error_carries_type() {
    let context = context();
    let err = context.evaluate("null.boom").unwrap_err();
    assert_eq!(err.error_type(), "TypeError");
    assert!(err.is_script_error());
}

#[test]
fn test_script_object_proxy() {
    let context = context();
    let value = context
        .evaluate("var o = { n: 2, twice(x) { return x * this.n; } }; o")
        .unwrap();
    let proxy = value.downcast_ref::<ScriptObjectProxy>().unwrap();

    assert_eq!(proxy.get("n").unwrap(), HostValue::Int(2));
    assert_eq!(proxy.call("twice", vec![HostValue::Int(21)]).unwrap(), HostValue::Int(42));
    assert!(proxy.has_method("twice"));
    assert!(!proxy.has_method("n"));

    let err = proxy.call("nope", Vec::new()).unwrap_err();
    assert_eq!(err.to_string(), "No such method: nope");

    proxy.set("n", &HostValue::Int(5)).unwrap();
    assert_eq!(context.evaluate("o.n").unwrap(), HostValue::Int(5));
    assert!(proxy.isset("n").unwrap());
    proxy.unset("n").unwrap();
    assert!(!proxy.isset("n").unwrap());
}

#[test]
fn test_script_object_identity() {
    let context = context();
    let first = context.evaluate("var o = {}; o").unwrap();
    let second = context.evaluate("o").unwrap();
    assert!(first.same(&second));

    context.assign("back", first).unwrap();
    assert_eq!(context.evaluate("back === o").unwrap(), HostValue::Bool(true));
}

#[test]
fn test_script_method_error_is_captured() {
    let context = context();
    let value = context
        .evaluate("({ explode() { throw new RangeError('bad range'); } })")
        .unwrap();
    let proxy = value.downcast_ref::<ScriptObjectProxy>().unwrap();
    let err = proxy.call("explode", Vec::new()).unwrap_err();
    assert_eq!(err.error_type(), "RangeError");
    assert!(err.to_string().contains("bad range"));
}

#[test]
fn test_script_function_roundtrip() {
    let context = context();
    let value = context
        .evaluate("var sub = function (a, b) { return a - b; }; sub")
        .unwrap();
    let function = value.as_callable().unwrap();
    assert_eq!(
        function.call(vec![HostValue::Int(10), HostValue::Int(4)]).unwrap(),
        HostValue::Int(6)
    );

    context.assign("again", value.clone()).unwrap();
    assert_eq!(context.evaluate("again === sub").unwrap(), HostValue::Bool(true));
}

#[test]
fn test_host_function_callable_from_script() {
    let context = context();
    let join = HostFunction::new(|args| {
        let parts: Vec<String> = args.iter().map(HostValue::to_display_string).collect();
        Ok(HostValue::from(parts.join("-")))
    });
    context.assign("join", join).unwrap();
    assert_eq!(context.evaluate("join('a', 1, true)").unwrap(), HostValue::from("a-1-1"));
}

#[test]
fn test_nested_host_calls_reenter_scope() {
    let context = context();
    let value = context.evaluate("({ base: 40 })").unwrap();
    let reader = HostFunction::new(move |_| {
        let proxy = value.downcast_ref::<ScriptObjectProxy>().unwrap();
        let base = proxy.get("base").map_err(HostError::from)?;
        Ok(HostValue::Int(base.as_int().unwrap_or(0) + 2))
    });
    context.assign("read", reader).unwrap();
    assert_eq!(context.evaluate("read()").unwrap(), HostValue::Int(42));
}

//! Integration tests for iteration across the bridge

use jsbridge::{
    DynamicObject, HostArray, HostIterator, HostObject, HostResult, HostValue, JsContext,
    ScriptObjectProxy,
};
use jsbridge_host::collect_entries;
use serde_json::json;
use std::cell::Cell;
use std::rc::Rc;

/// Iterator over fixed values that records how it is driven
struct CountingIterator {
    values: Vec<i64>,
    position: usize,
    valid_calls: Rc<Cell<usize>>,
    dropped: Rc<Cell<bool>>,
}

impl HostIterator for CountingIterator {
    fn rewind(&mut self) -> HostResult<()> {
        self.position = 0;
        Ok(())
    }

    fn valid(&mut self) -> HostResult<bool> {
        self.valid_calls.set(self.valid_calls.get() + 1);
        Ok(self.position < self.values.len())
    }

    fn current(&mut self) -> HostResult<HostValue> {
        Ok(HostValue::Int(self.values[self.position]))
    }

    fn key(&mut self) -> HostResult<HostValue> {
        Ok(HostValue::Int(self.position as i64))
    }

    fn next(&mut self) -> HostResult<()> {
        self.position += 1;
        Ok(())
    }
}

impl Drop for CountingIterator {
    fn drop(&mut self) {
        self.dropped.set(true);
    }
}

struct Probe {
    valid_calls: Rc<Cell<usize>>,
    dropped: Rc<Cell<bool>>,
}

fn sequence() -> (HostValue, Probe) {
    let valid_calls = Rc::new(Cell::new(0));
    let dropped = Rc::new(Cell::new(false));
    let probe = Probe {
        valid_calls: Rc::clone(&valid_calls),
        dropped: Rc::clone(&dropped),
    };
    let object = DynamicObject::builder("Sequence")
        .iterator(move |_| {
            Ok(Box::new(CountingIterator {
                values: vec![10, 20, 30],
                position: 0,
                valid_calls: Rc::clone(&valid_calls),
                dropped: Rc::clone(&dropped),
            }))
        })
        .build_value();
    (object, probe)
}

#[test]
fn test_next_sequence() {
    let context = JsContext::new().unwrap();
    let (seq, probe) = sequence();
    context.assign("seq", seq).unwrap();

    let steps = context
        .evaluate("const it = seq[Symbol.iterator](); [it.next(), it.next(), it.next(), it.next()]")
        .unwrap();
    assert_eq!(
        steps.to_json(),
        json!([
            {"value": 10, "done": false},
            {"value": 20, "done": false},
            {"value": 30, "done": false},
            {"value": null, "done": true},
        ])
    );
    assert_eq!(probe.valid_calls.get(), 4);
    assert!(probe.dropped.get());

    let after = context.evaluate("it.next()").unwrap();
    assert_eq!(after.to_json(), json!({"value": null, "done": true}));
    assert_eq!(probe.valid_calls.get(), 4);
}

#[test]
fn test_early_return_disposes() {
    let context = JsContext::new().unwrap();
    let (seq, probe) = sequence();
    context.assign("seq", seq).unwrap();

    let result = context
        .evaluate(
            "const it = seq[Symbol.iterator](); \
             const first = it.next().value; \
             const closed = it.return(99); \
             [first, closed.value, closed.done, it.next().done]",
        )
        .unwrap();
    assert_eq!(result.to_json(), json!([10, 99, true, true]));
    assert_eq!(probe.valid_calls.get(), 1);
    assert!(probe.dropped.get());
}

#[test]
fn test_for_of_over_host_iterable() {
    let context = JsContext::new().unwrap();
    let (seq, probe) = sequence();
    context.assign("seq", seq).unwrap();

    let doubled = context
        .evaluate("const out = []; for (const v of seq) out.push(v * 2); out")
        .unwrap();
    assert_eq!(doubled.to_json(), json!([20, 40, 60]));
    assert!(probe.dropped.get());
}

#[test]
fn test_break_in_for_of_returns_iterator() {
    let context = JsContext::new().unwrap();
    let (seq, probe) = sequence();
    context.assign("seq", seq).unwrap();

    let last = context
        .evaluate("let last = 0; for (const v of seq) { last = v; if (v === 20) break; } last")
        .unwrap();
    assert_eq!(last, HostValue::Int(20));
    assert_eq!(probe.valid_calls.get(), 2);
    assert!(probe.dropped.get());
}

#[test]
fn test_host_array_is_iterable() {
    let context = JsContext::new().unwrap();
    let array = HostArray::from_values(["a", "b", "c"].map(HostValue::from));
    context.assign("letters", array).unwrap();

    assert_eq!(
        context.evaluate("[...letters].join('')").unwrap(),
        HostValue::from("abc")
    );
    assert_eq!(
        context.evaluate("Array.from(letters, (l) => l.toUpperCase())").unwrap().to_json(),
        json!(["A", "B", "C"])
    );
}

#[test]
fn test_plain_object_is_not_iterable() {
    let context = JsContext::new().unwrap();
    context
        .assign("plain", DynamicObject::builder("Plain").build_value())
        .unwrap();
    let err = context.evaluate("for (const v of plain) {}").unwrap_err();
    assert_eq!(err.error_type(), "TypeError");

    let err = context
        .with_converter(|converter| converter.iterator(&HostValue::Int(1)).map(|_| ()))
        .unwrap_err();
    assert!(err.to_string().contains("is not iterable"));
}

#[test]
fn test_script_object_key_iterator() {
    let context = JsContext::new().unwrap();
    let value = context.evaluate("({ a: 1, b: 'two' })").unwrap();
    let proxy = value.downcast_ref::<ScriptObjectProxy>().unwrap();

    let mut keys = proxy.keys().unwrap();
    assert_eq!(keys.len(), 2);
    proxy.set("c", &HostValue::Int(3)).unwrap();

    let entries = collect_entries(&mut keys).unwrap();
    assert_eq!(
        entries,
        vec![
            (HostValue::from("a"), HostValue::Int(1)),
            (HostValue::from("b"), HostValue::from("two")),
        ]
    );
}

#[test]
fn test_script_object_traversal_through_host_protocol() {
    let context = JsContext::new().unwrap();
    let value = context.evaluate("({ x: 1, y: 2 })").unwrap();
    let object = value.as_object().unwrap();
    assert!(object.is_traversable());

    let mut iter = object.iterate().unwrap();
    let entries = collect_entries(iter.as_mut()).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1], (HostValue::from("y"), HostValue::Int(2)));
}

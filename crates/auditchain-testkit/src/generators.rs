//! Proptest generators for property-based testing.

use auditchain_core::canonical::{MAX_SAFE_INTEGER, RESERVED_KEYS};
use auditchain_core::EventDraft;
use proptest::prelude::*;
use serde_json::{Map, Number, Value};

const SAFE: i64 = MAX_SAFE_INTEGER as i64;

/// An object key the canonicalizer accepts, including non-BMP characters.
pub fn json_key() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z_][a-zA-Z0-9_]{0,11}",
        any::<String>(),
    ]
    .prop_filter("reserved key", |k| !RESERVED_KEYS.contains(&k.as_str()))
}

/// A finite float well inside the safe range.
pub fn json_float() -> impl Strategy<Value = Value> {
    (-1.0e9f64..1.0e9f64).prop_map(|f| Number::from_f64(f).map_or(Value::Null, Value::Number))
}

/// Any finite float, including magnitudes past the safe integer range.
pub fn wide_float() -> impl Strategy<Value = f64> {
    prop_oneof![
        prop::num::f64::NORMAL | prop::num::f64::SUBNORMAL | prop::num::f64::ZERO,
        (-1.0e22f64..1.0e22f64),
        (-2.0e16f64..2.0e16f64).prop_map(f64::trunc),
    ]
}

/// A scalar the canonicalizer accepts.
pub fn json_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-SAFE..=SAFE).prop_map(Value::from),
        json_float(),
        any::<String>().prop_map(Value::String),
    ]
}

/// Any canonicalizable JSON document.
pub fn json_value() -> impl Strategy<Value = Value> {
    json_leaf().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map(json_key(), inner, 0..6)
                .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// A JSON object, as event payloads are.
pub fn json_object() -> impl Strategy<Value = Value> {
    prop::collection::btree_map(json_key(), json_value(), 0..6)
        .prop_map(|entries| Value::Object(entries.into_iter().collect()))
}

pub fn action() -> impl Strategy<Value = String> {
    "[a-z]{1,10}\\.[a-z]{1,10}"
}

/// Non-blank text, possibly with surrounding whitespace and non-ASCII.
pub fn actor() -> impl Strategy<Value = String> {
    " ?[a-z0-9é☕-]{1,16} ?"
}

/// An event draft with every optional field independently present.
pub fn event_draft() -> impl Strategy<Value = EventDraft> {
    (
        action(),
        actor(),
        proptest::option::of("[a-z0-9-]{1,12}"),
        proptest::option::of("[a-z0-9-]{1,12}"),
        proptest::option::of("[a-z0-9-]{1,12}"),
        json_object(),
        proptest::option::of("[0-9]{1,3}(\\.[0-9]{1,3}){3}"),
        proptest::option::of(any::<String>()),
    )
        .prop_map(
            |(action, actor, receipt_id, export_id, saved_view_id, payload, ip, user_agent)| {
                EventDraft {
                    action,
                    actor,
                    receipt_id,
                    export_id,
                    saved_view_id,
                    payload,
                    ip,
                    user_agent,
                }
            },
        )
}

//! Array Variable Tests
//!
//! Points store their coordinates in a one-dimensional array; point lists
//! expose a two-dimensional array whose rows come from their children.

mod common;

use trellis_core::{ArrayKey, CoreError, SerializedComponent, Value};

use common::{build, float, numbers};

fn point(name: &str, coords: &str) -> SerializedComponent {
    SerializedComponent::new("point")
        .named(name)
        .attribute("numDimensions", coords.split_whitespace().count() as i64)
        .attribute("coords", coords)
}

/// Test that entries, sizes and derived values of an array resolve.
#[test]
fn point_entries_resolve() {
    let mut engine = build([point("p", "1 2 3")]);
    let p = engine.lookup("p").unwrap();

    assert_eq!(engine.resolve(p, "xs").unwrap(), Value::List(numbers(&[1.0, 2.0, 3.0])));
    assert_eq!(engine.resolve(p, "x2").unwrap(), Value::Number(2.0));
    assert_eq!(engine.array_size(p, "xs").unwrap(), vec![3]);
    assert_eq!(engine.resolve(p, "numDimensions").unwrap(), Value::Integer(3));
    assert!((float(&mut engine, p, "norm") - 14f64.sqrt()).abs() < 1e-12);
}

/// Test that missing coordinates fall back to the default entry.
#[test]
fn point_defaults_to_origin() {
    let mut engine = build([SerializedComponent::new("point").named("p")]);
    let p = engine.lookup("p").unwrap();

    assert_eq!(engine.array_size(p, "xs").unwrap(), vec![2]);
    assert_eq!(engine.resolve(p, "xs").unwrap(), Value::List(numbers(&[0.0, 0.0])));
}

/// Test that editing one entry leaves its siblings alone.
#[test]
fn entry_edit_changes_one_coordinate() {
    let mut engine = build([point("p", "1 2 3")]);
    let p = engine.lookup("p").unwrap();
    engine.resolve(p, "norm").unwrap();

    let outcome = engine.request_change(p, "x2", Value::Number(5.0)).unwrap();
    assert!(outcome.is_applied());
    assert_eq!(engine.resolve(p, "xs").unwrap(), Value::List(numbers(&[1.0, 5.0, 3.0])));
    assert!((float(&mut engine, p, "norm") - 35f64.sqrt()).abs() < 1e-12);

    // Same edit addressed by key
    engine
        .request_array_change(p, "xs", &ArrayKey::single(0), Value::Number(-1.0))
        .unwrap();
    assert_eq!(engine.resolve_entry(p, "xs", &ArrayKey::single(0)).unwrap(), Value::Number(-1.0));
}

/// Test that editing one entry re-evaluates only that entry.
#[test]
fn entry_edit_leaves_siblings_fresh() {
    let mut engine = build([point("p", "1 2 3")]);
    let p = engine.lookup("p").unwrap();
    engine.resolve(p, "xs").unwrap();
    let counts = |engine: &trellis_core::Engine| {
        (0..3)
            .map(|i| engine.entry_evaluations(p, "xs", &ArrayKey::single(i)))
            .collect::<Vec<_>>()
    };
    let before = counts(&engine);
    assert!(before.iter().all(|&n| n >= 1), "{before:?}");

    engine.request_change(p, "x2", Value::Number(9.0)).unwrap();
    assert_eq!(engine.resolve(p, "xs").unwrap(), Value::List(numbers(&[1.0, 9.0, 3.0])));
    assert_eq!(counts(&engine), vec![before[0], before[1] + 1, before[2]]);
}

/// Test that keys outside the current size are rejected.
#[test]
fn out_of_bounds_keys_are_errors() {
    let mut engine = build([point("p", "1 2")]);
    let p = engine.lookup("p").unwrap();

    let read = engine.resolve_entry(p, "xs", &ArrayKey::single(2));
    assert!(matches!(read, Err(CoreError::InvalidArrayKey { ref size, .. }) if size == &vec![2]));

    let write = engine.request_array_change(p, "xs", &ArrayKey::single(5), Value::Number(1.0));
    assert!(matches!(write, Err(CoreError::InvalidArrayKey { .. })));

    // An unaddressable entry name is not a variable
    assert!(matches!(
        engine.resolve(p, "x0"),
        Err(CoreError::UnknownStateVariable { .. })
    ));
}

/// Test that a whole-array edit naming a missing entry changes nothing.
#[test]
fn whole_array_edit_out_of_bounds_is_rejected() {
    let mut engine = build([point("p", "1 2")]);
    let p = engine.lookup("p").unwrap();

    let outcome = engine
        .request_change(p, "xs", Value::List(numbers(&[7.0, 8.0, 9.0])))
        .unwrap();
    assert!(!outcome.is_applied());
    assert_eq!(engine.resolve(p, "xs").unwrap(), Value::List(numbers(&[1.0, 2.0])));
}

/// Test that editing the norm rescales every coordinate.
#[test]
fn norm_inverse_scales_coordinates() {
    let mut engine = build([point("p", "3 4"), point("zero", "0 0")]);
    let p = engine.lookup("p").unwrap();
    assert_eq!(float(&mut engine, p, "norm"), 5.0);

    let outcome = engine.request_change(p, "norm", Value::Number(10.0)).unwrap();
    assert!(outcome.is_applied());
    assert_eq!(engine.resolve(p, "xs").unwrap(), Value::List(numbers(&[6.0, 8.0])));

    let zero = engine.lookup("zero").unwrap();
    let outcome = engine.request_change(zero, "norm", Value::Number(1.0)).unwrap();
    assert_eq!(
        outcome,
        trellis_core::ChangeOutcome::Rejected {
            reason: "cannot scale a zero vector".to_string()
        }
    );

    let outcome = engine.request_change(p, "norm", Value::Number(-1.0)).unwrap();
    assert!(!outcome.is_applied());
}

fn point_list() -> SerializedComponent {
    SerializedComponent::new("pointList")
        .named("list")
        .child(point("a", "1 2"))
        .child(point("b", "3 4 5"))
}

/// Test that a point list is shaped by its children.
#[test]
fn point_list_shape_follows_children() {
    let mut engine = build([point_list()]);
    let list = engine.lookup("list").unwrap();

    assert_eq!(engine.array_size(list, "points").unwrap(), vec![2, 3]);
    assert_eq!(engine.resolve(list, "numPoints").unwrap(), Value::Integer(2));
    assert_eq!(
        engine.resolve(list, "points").unwrap(),
        Value::List(vec![
            Value::List(vec![Value::Number(1.0), Value::Number(2.0), Value::Null]),
            Value::List(numbers(&[3.0, 4.0, 5.0])),
        ])
    );
    assert_eq!(engine.resolve(list, "point2_3").unwrap(), Value::Number(5.0));
    assert_eq!(engine.resolve(list, "point2").unwrap(), Value::List(numbers(&[3.0, 4.0, 5.0])));
}

/// Test that child edits flow into the list and list edits flow back.
#[test]
fn point_list_entries_track_children() {
    let mut engine = build([point_list()]);
    let list = engine.lookup("list").unwrap();
    let a = engine.lookup("a").unwrap();
    let b = engine.lookup("b").unwrap();
    engine.resolve(list, "points").unwrap();

    engine.request_change(a, "x1", Value::Number(10.0)).unwrap();
    assert_eq!(engine.resolve(list, "point1_1").unwrap(), Value::Number(10.0));

    // An entry edit forwards to the child's coordinate
    let outcome = engine.request_change(list, "point2_1", Value::Number(-3.0)).unwrap();
    assert!(outcome.is_applied());
    assert_eq!(engine.resolve(b, "x1").unwrap(), Value::Number(-3.0));

    // So does a row edit
    let outcome = engine
        .request_change(list, "point1", Value::List(numbers(&[7.0, 8.0])))
        .unwrap();
    assert!(outcome.is_applied());
    assert_eq!(engine.resolve(a, "xs").unwrap(), Value::List(numbers(&[7.0, 8.0])));
}

/// Test that padding entries cannot be edited.
#[test]
fn point_list_padding_is_read_only() {
    let mut engine = build([point_list()]);
    let list = engine.lookup("list").unwrap();

    let outcome = engine.request_change(list, "point1_3", Value::Number(1.0)).unwrap();
    assert!(!outcome.is_applied());
    assert_eq!(engine.resolve(list, "point1_3").unwrap(), Value::Null);
}

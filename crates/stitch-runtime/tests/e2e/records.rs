//! Records copied between managed values and native memory

use pretty_assertions::assert_eq;
use stitch_bytecode::TypeSig;
use stitch_runtime::{Interpreter, NativeTypeBuilder, Scalar, Shape, Value};
use stitch_sdk::{NativeKind, NativeTypeDesc};

use super::harness::*;

fn vec3_native() -> NativeTypeDesc {
    NativeTypeBuilder::structure("Vec3")
        .property("x", Shape::Scalar(NativeKind::F64))
        .property("y", Shape::Scalar(NativeKind::F64))
        .property("z", Shape::Scalar(NativeKind::F64))
        .build()
}

fn vec3(x: f64, y: f64, z: f64) -> Value {
    record_value(
        "Game.Vec3",
        vec![("x", Value::Float(x)), ("y", Value::Float(y)), ("z", Value::Float(z))],
    )
}

fn world() -> Interpreter {
    let point = || TypeSig::Struct("Game.Vec3".into());
    let vec3 = record("Game.Vec3", &[("x", TypeSig::F64), ("y", TypeSig::F64), ("z", TypeSig::F64)]);
    let segment = record("Game.Segment", &[("start", point()), ("end", point())]);
    let badge = record("Game.Badge", &[("label", TypeSig::String), ("rank", TypeSig::I32)]);

    let mut body = exposed_class("Game.Body");
    auto_property(&mut body, "Position", point());
    auto_property(&mut body, "Path", TypeSig::Struct("Game.Segment".into()));
    auto_property(&mut body, "Badge", TypeSig::Struct("Game.Badge".into()));
    constructor(&mut body, vec![]);

    let vec3_native = vec3_native();
    let segment_native = NativeTypeBuilder::structure("Segment")
        .property("start", Shape::record(&vec3_native))
        .property("end", Shape::record(&vec3_native))
        .build();
    let badge_native = NativeTypeBuilder::structure("Badge")
        .property("label", Shape::String)
        .property("rank", Shape::Scalar(NativeKind::I32))
        .build();
    let body_native = NativeTypeBuilder::class("Body")
        .property("Position", Shape::record(&vec3_native))
        .property("Path", Shape::record(&segment_native))
        .property("Badge", Shape::record(&badge_native))
        .build();

    load(
        module_of(vec![vec3, segment, badge, body]),
        vec![vec3_native, segment_native, badge_native, body_native],
    )
}

#[test]
fn test_blittable_record_round_trip() {
    let mut vm = world();
    let body = vm.construct("Game.Body", vec![]).unwrap();
    assert_eq!(vm.get(&body, "Position").unwrap(), vec3(0.0, 0.0, 0.0));

    vm.set(&body, "Position", vec3(1.5, -2.0, 1e9)).unwrap();
    assert_eq!(vm.get(&body, "Position").unwrap(), vec3(1.5, -2.0, 1e9));

    // Laid out exactly like the native struct
    let object = vm.native_object(&body).unwrap();
    let at = vm.host().property_addr(object, "Position").unwrap();
    assert_eq!(
        vm.host().memory().read_kind(at + 8, NativeKind::F64).unwrap(),
        Scalar::Float(-2.0)
    );
    assert_eq!(vm.static_field("Game.Vec3", "NativeDataSize").unwrap(), Value::Int(24));
}

#[test]
fn test_records_have_value_semantics() {
    let mut vm = world();
    let body = vm.construct("Game.Body", vec![]).unwrap();
    let position = vec3(1.0, 2.0, 3.0);
    vm.set(&body, "Position", position.clone()).unwrap();

    // Changing the managed copy does not reach native memory
    position
        .as_object()
        .unwrap()
        .borrow_mut()
        .fields
        .insert("x".into(), Value::Float(100.0));
    assert_eq!(vm.get(&body, "Position").unwrap(), vec3(1.0, 2.0, 3.0));
}

#[test]
fn test_nested_blittable_records() {
    let mut vm = world();
    let body = vm.construct("Game.Body", vec![]).unwrap();
    let path = record_value(
        "Game.Segment",
        vec![("start", vec3(0.0, 0.0, 0.0)), ("end", vec3(4.0, 5.0, 6.0))],
    );
    vm.set(&body, "Path", path).unwrap();

    let read = vm.get(&body, "Path").unwrap();
    assert_eq!(field(&read, "end"), vec3(4.0, 5.0, 6.0));
    assert_eq!(field(&read, "start"), vec3(0.0, 0.0, 0.0));
}

#[test]
fn test_record_with_string_is_copied_field_by_field() {
    let mut vm = world();
    let body = vm.construct("Game.Body", vec![]).unwrap();
    let badge = record_value("Game.Badge", vec![("label", Value::string("Veteran")), ("rank", Value::Int(3))]);
    vm.set(&body, "Badge", badge).unwrap();

    let read = vm.get(&body, "Badge").unwrap();
    assert_eq!(field(&read, "label"), Value::string("Veteran"));
    assert_eq!(field(&read, "rank"), Value::Int(3));

    // The mirror copy gets an element converter for containers
    assert!(vm.type_def("Game.BadgeMarshaller").is_some());
    assert!(vm.type_def("Game.Vec3Marshaller").is_none());
}

#[test]
fn test_integer_and_array_record_round_trips_through_a_buffer() {
    let stats = record(
        "Game.Stats",
        &[("Count", TypeSig::I64), ("Values", TypeSig::Array(Box::new(TypeSig::I32)))],
    );
    let native = NativeTypeBuilder::structure("Stats")
        .property("Count", Shape::Scalar(NativeKind::I64))
        .property("Values", Shape::array(Shape::Scalar(NativeKind::I32)))
        .build();
    let mut vm = load(module_of(vec![stats]), vec![native]);

    // 8 bytes of integer plus the 16-byte array header
    let size = vm.static_field("Game.Stats", "NativeDataSize").unwrap();
    assert_eq!(size, Value::Int(24));

    let buffer = vm.host_mut().memory_mut().alloc(24);
    let original = record_value("Game.Stats", vec![("Count", Value::Int(42)), ("Values", ints(&[3, 5, 6]))]);
    vm.call_method(&original, "ToNative", vec![Value::Ptr(buffer)]).unwrap();
    let copy = vm.construct("Game.Stats", vec![Value::Ptr(buffer)]).unwrap();

    assert_eq!(field(&copy, "Count"), Value::Int(42));
    assert_eq!(field(&copy, "Values"), ints(&[3, 5, 6]));

    // Releasing the array storage and the buffer leaves nothing behind
    let before = vm.host().memory().live_blocks();
    vm.host_mut().free_array(buffer + 8).unwrap();
    vm.host_mut().memory_mut().free(buffer).unwrap();
    assert_eq!(vm.host().memory().live_blocks(), before - 2);
}

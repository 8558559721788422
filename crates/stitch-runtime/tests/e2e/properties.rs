//! Native-backed properties of exposed classes

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use stitch_bytecode::{Attribute, Instr, TypeDef, TypeKind, TypeSig};
use stitch_runtime::{Interpreter, NativeTypeBuilder, Scalar, Shape, Value};
use stitch_sdk::{NativeKind, NativeTypeDesc};
use stitch_weaver::markers;

use super::harness::*;

fn sensor() -> (TypeDef, NativeTypeDesc) {
    let mut ty = exposed_class("Game.Sensor");
    auto_property(&mut ty, "Tiny", TypeSig::I8);
    auto_property(&mut ty, "Port", TypeSig::U16);
    auto_property(&mut ty, "Count", TypeSig::I32);
    auto_property(&mut ty, "Serial", TypeSig::I64);
    auto_property(&mut ty, "Ratio", TypeSig::F32);
    auto_property(&mut ty, "Precise", TypeSig::F64);
    auto_property(&mut ty, "Enabled", TypeSig::Bool);
    constructor(&mut ty, vec![]);

    let native = NativeTypeBuilder::class("Sensor")
        .property("Tiny", Shape::Scalar(NativeKind::I8))
        .property("Port", Shape::Scalar(NativeKind::U16))
        .property("Count", Shape::Scalar(NativeKind::I32))
        .property("Serial", Shape::Scalar(NativeKind::I64))
        .property("Ratio", Shape::Scalar(NativeKind::F32))
        .property("Precise", Shape::Scalar(NativeKind::F64))
        .property("Enabled", Shape::Scalar(NativeKind::Bool))
        .build();
    (ty, native)
}

fn sensor_vm() -> (Interpreter, Value) {
    let (ty, native) = sensor();
    let mut vm = load(module_of(vec![ty]), vec![native]);
    let sensor = vm.construct("Game.Sensor", vec![]).unwrap();
    (vm, sensor)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_blittable_values_round_trip(
        tiny in any::<i8>(),
        port in any::<u16>(),
        count in any::<i32>(),
        serial in any::<i64>(),
        ratio in any::<f32>().prop_filter("finite", |f| f.is_finite()),
        precise in any::<f64>().prop_filter("finite", |f| f.is_finite()),
        enabled in any::<bool>(),
    ) {
        let (mut vm, sensor) = sensor_vm();
        vm.set(&sensor, "Tiny", Value::Int(i64::from(tiny))).unwrap();
        vm.set(&sensor, "Port", Value::Int(i64::from(port))).unwrap();
        vm.set(&sensor, "Count", Value::Int(i64::from(count))).unwrap();
        vm.set(&sensor, "Serial", Value::Int(serial)).unwrap();
        vm.set(&sensor, "Ratio", Value::Float(f64::from(ratio))).unwrap();
        vm.set(&sensor, "Precise", Value::Float(precise)).unwrap();
        vm.set(&sensor, "Enabled", Value::Bool(enabled)).unwrap();

        prop_assert_eq!(vm.get(&sensor, "Tiny").unwrap(), Value::Int(i64::from(tiny)));
        prop_assert_eq!(vm.get(&sensor, "Port").unwrap(), Value::Int(i64::from(port)));
        prop_assert_eq!(vm.get(&sensor, "Count").unwrap(), Value::Int(i64::from(count)));
        prop_assert_eq!(vm.get(&sensor, "Serial").unwrap(), Value::Int(serial));
        prop_assert_eq!(vm.get(&sensor, "Ratio").unwrap(), Value::Float(f64::from(ratio)));
        prop_assert_eq!(vm.get(&sensor, "Precise").unwrap(), Value::Float(precise));
        prop_assert_eq!(vm.get(&sensor, "Enabled").unwrap(), Value::Bool(enabled));
    }
}

#[test]
fn test_values_live_in_native_memory() {
    let (mut vm, sensor) = sensor_vm();
    vm.set(&sensor, "Count", Value::Int(41)).unwrap();

    let native = vm.native_object(&sensor).unwrap();
    assert_ne!(native, 0);
    assert_eq!(
        vm.host().read_property(native, "Count", NativeKind::I32).unwrap(),
        Scalar::Int(41)
    );

    // A write on the native side is visible through the getter
    vm.host_mut()
        .write_property(native, "Count", NativeKind::I32, Scalar::Int(-7))
        .unwrap();
    assert_eq!(vm.get(&sensor, "Count").unwrap(), Value::Int(-7));
}

#[test]
fn test_each_object_has_its_own_storage() {
    let (mut vm, first) = sensor_vm();
    let second = vm.construct("Game.Sensor", vec![]).unwrap();
    vm.set(&first, "Serial", Value::Int(1)).unwrap();
    vm.set(&second, "Serial", Value::Int(2)).unwrap();
    assert_eq!(vm.get(&first, "Serial").unwrap(), Value::Int(1));
    assert_eq!(vm.get(&second, "Serial").unwrap(), Value::Int(2));
    assert_ne!(vm.native_object(&first).unwrap(), vm.native_object(&second).unwrap());
}

#[test]
fn test_bitfield_writes_touch_only_their_bit() {
    let mut ty = exposed_class("Game.Switches");
    bitfield_property(&mut ty, "Lit");
    bitfield_property(&mut ty, "Locked");
    bitfield_property(&mut ty, "Hidden");
    constructor(&mut ty, vec![]);
    let native = NativeTypeBuilder::class("Switches")
        .bitfield("Lit")
        .bitfield("Locked")
        .bitfield("Hidden")
        .build();
    let mut vm = load(module_of(vec![ty]), vec![native]);
    let switches = vm.construct("Game.Switches", vec![]).unwrap();
    let object = vm.native_object(&switches).unwrap();
    let byte = |vm: &Interpreter| vm.host().read_property(object, "Lit", NativeKind::U8).unwrap();

    vm.set(&switches, "Locked", Value::Bool(true)).unwrap();
    assert_eq!(byte(&vm), Scalar::Int(0b010));
    vm.set(&switches, "Lit", Value::Bool(true)).unwrap();
    vm.set(&switches, "Hidden", Value::Bool(true)).unwrap();
    assert_eq!(byte(&vm), Scalar::Int(0b111));

    vm.set(&switches, "Locked", Value::Bool(false)).unwrap();
    assert_eq!(byte(&vm), Scalar::Int(0b101));
    assert_eq!(vm.get(&switches, "Lit").unwrap(), Value::Bool(true));
    assert_eq!(vm.get(&switches, "Locked").unwrap(), Value::Bool(false));
    assert_eq!(vm.get(&switches, "Hidden").unwrap(), Value::Bool(true));
}

#[test]
fn test_constructor_initializers_run_once_after_the_base_call() {
    let mut ty = exposed_class("Game.Actor");
    auto_property(&mut ty, "Health", TypeSig::I32);
    auto_property(&mut ty, "Title", TypeSig::String);
    let mut init = initializer(&ty, "Health", Instr::ConstI32(100));
    init.extend(initializer(&ty, "Title", Instr::ConstNull));
    constructor(&mut ty, init);

    let native = NativeTypeBuilder::class("Actor")
        .property("Health", Shape::Scalar(NativeKind::I32))
        .property("Title", Shape::String)
        .build();
    let mut vm = load(module_of(vec![ty]), vec![native]);
    let actor = vm.construct("Game.Actor", vec![]).unwrap();

    assert_eq!(vm.call_count("Game.Actor::set_Health"), 1);
    assert_eq!(vm.call_count("Game.Actor::set_Title"), 0);
    let object = vm.native_object(&actor).unwrap();
    assert_eq!(
        vm.host().read_property(object, "Health", NativeKind::I32).unwrap(),
        Scalar::Int(100)
    );
    assert_eq!(vm.get(&actor, "Title").unwrap(), Value::string(""));
}

#[test]
fn test_strings_and_names_round_trip() {
    let mut ty = exposed_class("Game.Sign");
    auto_property(&mut ty, "Caption", TypeSig::String);
    auto_property(&mut ty, "Tag", TypeSig::Name);
    auto_property(&mut ty, "Label", TypeSig::Text);
    constructor(&mut ty, vec![]);
    let native = NativeTypeBuilder::class("Sign")
        .property("Caption", Shape::String)
        .property("Tag", Shape::Name)
        .property("Label", Shape::Text)
        .build();
    let mut vm = load(module_of(vec![ty]), vec![native]);
    let sign = vm.construct("Game.Sign", vec![]).unwrap();

    assert_eq!(vm.get(&sign, "Tag").unwrap(), Value::string("None"));
    vm.set(&sign, "Caption", Value::string("Welcome, traveller")).unwrap();
    vm.set(&sign, "Tag", Value::string("Entrance")).unwrap();
    vm.set(&sign, "Label", Value::string("Über")).unwrap();
    assert_eq!(vm.get(&sign, "Caption").unwrap(), Value::string("Welcome, traveller"));
    assert_eq!(vm.get(&sign, "Tag").unwrap(), Value::string("Entrance"));
    assert_eq!(vm.get(&sign, "Label").unwrap(), Value::string("Über"));

    // Replacing a string releases the previous buffer
    let blocks = vm.host().memory().live_blocks();
    vm.set(&sign, "Caption", Value::string("Closed")).unwrap();
    assert_eq!(vm.host().memory().live_blocks(), blocks);
}

#[test]
fn test_enum_property_uses_its_underlying_kind() {
    let mut mode = TypeDef::new("Game.Mode", TypeKind::Enum);
    mode.underlying = Some(TypeSig::U8);
    mode.attributes.push(Attribute::new(markers::EXPOSED_ENUM));

    let mut ty = exposed_class("Game.Machine");
    auto_property(&mut ty, "Mode", TypeSig::Enum("Game.Mode".into()));
    constructor(&mut ty, vec![]);
    let native = NativeTypeBuilder::class("Machine")
        .property("Mode", Shape::Scalar(NativeKind::U8))
        .build();
    let mut vm = load(module_of(vec![mode, ty]), vec![native]);
    let machine = vm.construct("Game.Machine", vec![]).unwrap();
    vm.set(&machine, "Mode", Value::Int(3)).unwrap();
    assert_eq!(vm.get(&machine, "Mode").unwrap(), Value::Int(3));
}

#[test]
fn test_object_references_resolve_to_the_same_wrapper() {
    let mut ty = exposed_class("Game.Unit");
    auto_property(&mut ty, "Leader", TypeSig::Object("Game.Unit".into()));
    constructor(&mut ty, vec![]);
    let native = NativeTypeBuilder::class("Unit").property("Leader", Shape::Object).build();
    let mut vm = load(module_of(vec![ty]), vec![native]);

    let leader = vm.construct("Game.Unit", vec![]).unwrap();
    let follower = vm.construct("Game.Unit", vec![]).unwrap();
    assert_eq!(vm.get(&follower, "Leader").unwrap(), Value::Null);

    vm.set(&follower, "Leader", leader.clone()).unwrap();
    let read = vm.get(&follower, "Leader").unwrap();
    assert_eq!(read, leader);

    // A native object created on the native side gets a fresh wrapper
    let stranger = vm.host_mut().new_object("Unit").unwrap();
    let object = vm.native_object(&follower).unwrap();
    let slot = vm.host().property_addr(object, "Leader").unwrap();
    vm.host_mut().memory_mut().write_ptr(slot, stranger).unwrap();
    let wrapped = vm.get(&follower, "Leader").unwrap();
    assert_eq!(vm.native_object(&wrapped).unwrap(), stranger);
    assert_eq!(vm.get(&follower, "Leader").unwrap(), wrapped);
}

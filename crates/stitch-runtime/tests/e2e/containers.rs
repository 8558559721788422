//! Container properties: arrays, sets, maps, optionals and fixed arrays

use pretty_assertions::assert_eq;
use stitch_bytecode::TypeSig;
use stitch_runtime::{Interpreter, NativeTypeBuilder, Shape, Value};
use stitch_sdk::NativeKind;

use super::harness::*;

fn boxed(sig: TypeSig) -> Box<TypeSig> {
    Box::new(sig)
}

fn inventory() -> (Interpreter, Value) {
    let badge = record("Game.Badge", &[("label", TypeSig::String), ("rank", TypeSig::I32)]);
    let mut ty = exposed_class("Game.Inventory");
    auto_property(&mut ty, "Scores", TypeSig::Array(boxed(TypeSig::I32)));
    auto_property(&mut ty, "Tags", TypeSig::Array(boxed(TypeSig::String)));
    auto_property(&mut ty, "Ids", TypeSig::Set(boxed(TypeSig::I32)));
    auto_property(&mut ty, "Stock", TypeSig::Map(boxed(TypeSig::String), boxed(TypeSig::I32)));
    auto_property(&mut ty, "Bonus", TypeSig::Optional(boxed(TypeSig::I32)));
    auto_property(&mut ty, "Slots", TypeSig::FixedArray(boxed(TypeSig::I16), 4));
    auto_property(&mut ty, "Badges", TypeSig::Array(boxed(TypeSig::Struct("Game.Badge".into()))));
    constructor(&mut ty, vec![]);

    let i32_shape = || Shape::Scalar(NativeKind::I32);
    let badge_native = NativeTypeBuilder::structure("Badge")
        .property("label", Shape::String)
        .property("rank", i32_shape())
        .build();
    let native = NativeTypeBuilder::class("Inventory")
        .property("Scores", Shape::array(i32_shape()))
        .property("Tags", Shape::array(Shape::String))
        .property("Ids", Shape::set(i32_shape()))
        .property("Stock", Shape::map(Shape::String, i32_shape()))
        .property("Bonus", Shape::optional(i32_shape()))
        .property("Slots", Shape::fixed_array(Shape::Scalar(NativeKind::I16), 4))
        .property("Badges", Shape::array(Shape::record(&badge_native)))
        .build();

    let mut vm = load(module_of(vec![badge, ty]), vec![badge_native, native]);
    let inventory = vm.construct("Game.Inventory", vec![]).unwrap();
    (vm, inventory)
}

fn strings(values: &[&str]) -> Value {
    Value::list(values.iter().map(|s| Value::string(s)).collect())
}

#[test]
fn test_array_round_trip() {
    let (mut vm, inventory) = inventory();
    assert_eq!(vm.get(&inventory, "Scores").unwrap(), ints(&[]));

    vm.set(&inventory, "Scores", ints(&[10, -20, 30])).unwrap();
    assert_eq!(vm.get(&inventory, "Scores").unwrap(), ints(&[10, -20, 30]));

    vm.set(&inventory, "Scores", ints(&[7])).unwrap();
    assert_eq!(vm.get(&inventory, "Scores").unwrap(), ints(&[7]));
}

#[test]
fn test_reads_are_copies() {
    let (mut vm, inventory) = inventory();
    vm.set(&inventory, "Scores", ints(&[1, 2])).unwrap();

    let Value::List(read) = vm.get(&inventory, "Scores").unwrap() else {
        panic!("expected a list");
    };
    read.borrow_mut().push(Value::Int(3));
    assert_eq!(vm.get(&inventory, "Scores").unwrap(), ints(&[1, 2]));
}

#[test]
fn test_string_elements_are_released_on_replace() {
    let (mut vm, inventory) = inventory();
    vm.set(&inventory, "Tags", strings(&["iron", "oak", "flint"])).unwrap();
    assert_eq!(vm.get(&inventory, "Tags").unwrap(), strings(&["iron", "oak", "flint"]));

    // Element storage plus one buffer per non-empty string
    let blocks = vm.host().memory().live_blocks();
    vm.set(&inventory, "Tags", strings(&["gold", "pine", "ash"])).unwrap();
    assert_eq!(vm.host().memory().live_blocks(), blocks);

    vm.set(&inventory, "Tags", Value::Null).unwrap();
    assert_eq!(vm.host().memory().live_blocks(), blocks - 4);
    assert_eq!(vm.get(&inventory, "Tags").unwrap(), strings(&[]));
}

#[test]
fn test_set_drops_duplicates() {
    let (mut vm, inventory) = inventory();
    vm.set(&inventory, "Ids", ints(&[3, 1, 3, 2, 1])).unwrap();
    let Value::List(ids) = vm.get(&inventory, "Ids").unwrap() else {
        panic!("expected a list");
    };
    let ids = ids.borrow();
    assert_eq!(ids.len(), 3);
    for id in [1, 2, 3] {
        assert!(ids.contains(&Value::Int(id)));
    }
}

#[test]
fn test_map_round_trip() {
    let (mut vm, inventory) = inventory();
    let stock = Value::map(vec![
        (Value::string("arrows"), Value::Int(40)),
        (Value::string("potions"), Value::Int(3)),
    ]);
    vm.set(&inventory, "Stock", stock.clone()).unwrap();
    assert_eq!(vm.get(&inventory, "Stock").unwrap(), stock);
}

#[test]
fn test_optional_presence() {
    let (mut vm, inventory) = inventory();
    assert_eq!(vm.get(&inventory, "Bonus").unwrap(), Value::Null);

    vm.set(&inventory, "Bonus", Value::Int(5)).unwrap();
    assert_eq!(vm.get(&inventory, "Bonus").unwrap(), Value::Int(5));

    // Zero is a present value, not an absent one
    vm.set(&inventory, "Bonus", Value::Int(0)).unwrap();
    assert_eq!(vm.get(&inventory, "Bonus").unwrap(), Value::Int(0));

    vm.set(&inventory, "Bonus", Value::Null).unwrap();
    assert_eq!(vm.get(&inventory, "Bonus").unwrap(), Value::Null);
}

#[test]
fn test_fixed_array_is_stored_inline() {
    let (mut vm, inventory) = inventory();
    assert_eq!(vm.get(&inventory, "Slots").unwrap(), ints(&[0, 0, 0, 0]));

    let blocks = vm.host().memory().live_blocks();
    vm.set(&inventory, "Slots", ints(&[1, -2, 3, 4])).unwrap();
    assert_eq!(vm.get(&inventory, "Slots").unwrap(), ints(&[1, -2, 3, 4]));
    assert_eq!(vm.host().memory().live_blocks(), blocks);
}

#[test]
fn test_array_of_records() {
    let (mut vm, inventory) = inventory();
    let badges = Value::list(vec![
        record_value("Game.Badge", vec![("label", Value::string("Scout")), ("rank", Value::Int(1))]),
        record_value("Game.Badge", vec![("label", Value::string("Ranger")), ("rank", Value::Int(4))]),
    ]);
    vm.set(&inventory, "Badges", badges).unwrap();

    let Value::List(read) = vm.get(&inventory, "Badges").unwrap() else {
        panic!("expected a list");
    };
    let read = read.borrow();
    assert_eq!(read.len(), 2);
    assert_eq!(field(&read[1], "label"), Value::string("Ranger"));
    assert_eq!(field(&read[1], "rank"), Value::Int(4));
    assert_eq!(field(&read[0], "label"), Value::string("Scout"));
}

//! Delegates and interface proxies

use pretty_assertions::assert_eq;
use stitch_bytecode::{MethodDef, ParamDef, TypeSig};
use stitch_runtime::{
    FunctionBuilder, Interpreter, NativeCall, NativeHost, NativeTypeBuilder, RuntimeError, RuntimeResult, Scalar, Shape,
    Value,
};
use stitch_sdk::{NativeKind, NativeTypeDesc};

use super::harness::*;

fn damage_param() -> Vec<ParamDef> {
    vec![ParamDef::new("damage", TypeSig::I32)]
}

fn signature(name: &str) -> NativeTypeDesc {
    NativeTypeBuilder::delegate(
        name,
        FunctionBuilder::new(name)
            .param("damage", Shape::Scalar(NativeKind::I32))
            .build(),
    )
}

/// Turret with a single-cast and a multi-cast callable property, plus a
/// native listener class that accumulates damage
fn turret_vm() -> Interpreter {
    let mut turret = exposed_class("Game.Turret");
    auto_property(&mut turret, "OnHit", TypeSig::Delegate("Game.HitHandler".into()));
    auto_property(&mut turret, "OnDamaged", TypeSig::Delegate("Game.DamageEvent".into()));
    auto_property(&mut turret, "Target", TypeSig::Interface("Game.IDamageable".into()));
    constructor(&mut turret, vec![]);

    let damageable = interface(
        "Game.IDamageable",
        vec![
            MethodDef::new("Damage", damage_param(), TypeSig::Void),
            MethodDef::new("Repair", vec![], TypeSig::Void),
        ],
    );
    let module = module_of(vec![
        callable("Game.HitHandler", damage_param(), false),
        callable("Game.DamageEvent", damage_param(), true),
        damageable,
        turret,
    ]);

    let absorb = FunctionBuilder::new("Absorb")
        .param("damage", Shape::Scalar(NativeKind::I32))
        .build();
    let native = vec![
        signature("HitHandler"),
        signature("DamageEvent"),
        NativeTypeBuilder::interface("IDamageable")
            .function(
                FunctionBuilder::new("Damage")
                    .param("damage", Shape::Scalar(NativeKind::I32))
                    .build(),
            )
            .build(),
        NativeTypeBuilder::class("Turret")
            .property("OnHit", Shape::Delegate)
            .property("OnDamaged", Shape::MulticastDelegate)
            .property("Target", Shape::Object)
            .build(),
        NativeTypeBuilder::class("Listener")
            .property("Total", Shape::Scalar(NativeKind::I32))
            .function(absorb)
            .build(),
        NativeTypeBuilder::class("Wall")
            .property("HitPoints", Shape::Scalar(NativeKind::I32))
            .build(),
    ];

    let mut vm = load(module, native);
    let add_damage = |host: &mut NativeHost, call: &NativeCall, field: &str, sign: i64| -> RuntimeResult<()> {
        let damage = call.read(host, "damage", NativeKind::I32)?.as_i64();
        let total = host.read_property(call.object, field, NativeKind::I32)?.as_i64() + sign * damage;
        host.write_property(call.object, field, NativeKind::I32, Scalar::Int(total))
    };
    vm.host_mut()
        .register_function("Listener", "Absorb", move |host, call| add_damage(host, call, "Total", 1));
    vm.host_mut()
        .register_function("Wall", "Damage", move |host, call| add_damage(host, call, "HitPoints", -1));
    vm
}

fn total(vm: &Interpreter, listener: u64) -> i64 {
    vm.host()
        .read_property(listener, "Total", NativeKind::I32)
        .unwrap()
        .as_i64()
}

#[test]
fn test_single_delegate_invokes_its_binding() {
    let mut vm = turret_vm();
    let turret = vm.construct("Game.Turret", vec![]).unwrap();
    let object = vm.native_object(&turret).unwrap();
    let listener = vm.host_mut().new_object("Listener").unwrap();
    let slot = vm.host().property_addr(object, "OnHit").unwrap();
    vm.host_mut().bind_delegate(slot, listener, "Absorb").unwrap();

    let handler = vm.get(&turret, "OnHit").unwrap();
    vm.call_method(&handler, "Invoke", vec![Value::Int(4)]).unwrap();
    vm.call_method(&handler, "Invoke", vec![Value::Int(6)]).unwrap();
    assert_eq!(total(&vm, listener), 10);
    assert_eq!(vm.host().call_count("Absorb"), 2);
}

#[test]
fn test_single_delegate_assignment_copies_and_clears() {
    let mut vm = turret_vm();
    let first = vm.construct("Game.Turret", vec![]).unwrap();
    let second = vm.construct("Game.Turret", vec![]).unwrap();
    let listener = vm.host_mut().new_object("Listener").unwrap();
    let object = vm.native_object(&first).unwrap();
    let slot = vm.host().property_addr(object, "OnHit").unwrap();
    vm.host_mut().bind_delegate(slot, listener, "Absorb").unwrap();

    let handler = vm.get(&first, "OnHit").unwrap();
    vm.set(&second, "OnHit", handler).unwrap();
    let copied = vm.get(&second, "OnHit").unwrap();
    vm.call_method(&copied, "Invoke", vec![Value::Int(3)]).unwrap();
    assert_eq!(total(&vm, listener), 3);

    // An unbound callable does nothing when invoked
    vm.set(&second, "OnHit", Value::Null).unwrap();
    let cleared = vm.get(&second, "OnHit").unwrap();
    vm.call_method(&cleared, "Invoke", vec![Value::Int(3)]).unwrap();
    assert_eq!(total(&vm, listener), 3);
}

#[test]
fn test_multicast_delegate_calls_every_binding_in_order() {
    let mut vm = turret_vm();
    let turret = vm.construct("Game.Turret", vec![]).unwrap();
    let object = vm.native_object(&turret).unwrap();
    let slot = vm.host().property_addr(object, "OnDamaged").unwrap();
    let first = vm.host_mut().new_object("Listener").unwrap();
    let second = vm.host_mut().new_object("Listener").unwrap();
    vm.host_mut().add_binding(slot, first, "Absorb").unwrap();
    vm.host_mut().add_binding(slot, second, "Absorb").unwrap();
    vm.host_mut().add_binding(slot, first, "Absorb").unwrap();

    let event = vm.get(&turret, "OnDamaged").unwrap();
    vm.call_method(&event, "Invoke", vec![Value::Int(5)]).unwrap();
    assert_eq!(total(&vm, first), 10);
    assert_eq!(total(&vm, second), 5);

    // Assigning to another turret copies the whole invocation list
    let other = vm.construct("Game.Turret", vec![]).unwrap();
    vm.set(&other, "OnDamaged", event).unwrap();
    let other_object = vm.native_object(&other).unwrap();
    let other_slot = vm.host().property_addr(other_object, "OnDamaged").unwrap();
    assert_eq!(vm.host().bindings(other_slot).unwrap().len(), 3);
}

#[test]
fn test_interface_proxy_forwards_to_the_native_object() {
    let mut vm = turret_vm();
    let turret = vm.construct("Game.Turret", vec![]).unwrap();
    let wall = vm.host_mut().new_object("Wall").unwrap();
    vm.host_mut()
        .write_property(wall, "HitPoints", NativeKind::I32, Scalar::Int(100))
        .unwrap();
    let object = vm.native_object(&turret).unwrap();
    let slot = vm.host().property_addr(object, "Target").unwrap();
    vm.host_mut().memory_mut().write_ptr(slot, wall).unwrap();

    let target = vm.get(&turret, "Target").unwrap();
    assert_eq!(
        target.as_object().unwrap().borrow().class,
        "Game.IDamageableProxy"
    );
    vm.call_method(&target, "Damage", vec![Value::Int(30)]).unwrap();
    assert_eq!(
        vm.host().read_property(wall, "HitPoints", NativeKind::I32).unwrap(),
        Scalar::Int(70)
    );
}

#[test]
fn test_interface_method_missing_natively_throws() {
    let mut vm = turret_vm();
    let wall = vm.host_mut().new_object("Wall").unwrap();
    let proxy = vm.wrap("Game.IDamageableProxy", wall).unwrap();

    let err = vm.call_method(&proxy, "Repair", vec![]).unwrap_err();
    match err {
        RuntimeError::Thrown(message) => assert_eq!(message, "Repair is not available on the native object"),
        other => panic!("unexpected error: {}", other),
    }
}

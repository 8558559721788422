//! Exposed functions calling into native code

use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use stitch_bytecode::{Instr, MethodBody, MethodRef, ParamDef, TypeDef, TypeSig};
use stitch_runtime::{FunctionBuilder, Interpreter, NativeTypeBuilder, RuntimeError, Scalar, Shape, Value};
use stitch_sdk::metadata::{FUNC_EVENT, FUNC_STATIC, RETURN_VALUE};
use stitch_sdk::{NativeKind, NativeTypeDesc};
use stitch_weaver::markers;

use super::harness::*;

fn i32_shape() -> Shape {
    Shape::Scalar(NativeKind::I32)
}

fn actor() -> (TypeDef, NativeTypeDesc) {
    let mut ty = exposed_class("Game.Actor");
    auto_property(&mut ty, "Health", TypeSig::I32);
    constructor(&mut ty, vec![]);

    ty.methods.push(exposed_function(
        "Heal",
        vec![ParamDef::new("amount", TypeSig::I32)],
        TypeSig::I32,
        &[],
    ));
    ty.methods.push(exposed_function(
        "Greet",
        vec![ParamDef::new("visitor", TypeSig::String)],
        TypeSig::String,
        &[],
    ));
    ty.methods.push(exposed_function(
        "TryGetLevel",
        vec![ParamDef::out("level", TypeSig::I32)],
        TypeSig::Bool,
        &[],
    ));
    let mut total = exposed_function(
        "Total",
        vec![
            ParamDef::new("base", TypeSig::I64),
            ParamDef::new("values", TypeSig::Array(Box::new(TypeSig::I32))),
        ],
        TypeSig::I64,
        &[],
    );
    total.is_static = true;
    ty.methods.push(total);

    // Managed fallback: heals by five when the native side does not react
    let mut spawned = exposed_function("OnSpawned", vec![], TypeSig::Void, &[markers::FUNCTION_EVENT]);
    spawned.body = Some(MethodBody::new(vec![
        Instr::LoadArg(0),
        Instr::ConstI32(5),
        Instr::Call(MethodRef::new("Game.Actor", "set_Health", 1)),
        Instr::Ret,
    ]));
    ty.methods.push(spawned);

    let mut taunt = exposed_function("Taunt", vec![], TypeSig::Void, &[]);
    taunt.is_virtual = true;
    ty.methods.push(taunt);

    let native = NativeTypeBuilder::class("Actor")
        .property("Health", i32_shape())
        .function(FunctionBuilder::new("Heal").param("amount", i32_shape()).returns(i32_shape()).build())
        .function(
            FunctionBuilder::new("Greet")
                .param("visitor", Shape::String)
                .returns(Shape::String)
                .build(),
        )
        .function(
            FunctionBuilder::new("TryGetLevel")
                .param("level", i32_shape())
                .returns(Shape::Scalar(NativeKind::Bool))
                .build(),
        )
        .function(
            FunctionBuilder::new("Total")
                .param("base", Shape::Scalar(NativeKind::I64))
                .param("values", Shape::array(i32_shape()))
                .returns(Shape::Scalar(NativeKind::I64))
                .flags(FUNC_STATIC)
                .build(),
        )
        .function(FunctionBuilder::new("OnSpawned").flags(FUNC_EVENT).build())
        .function(FunctionBuilder::new("Taunt").build())
        .build();
    (ty, native)
}

fn actor_vm() -> Interpreter {
    let (ty, actor) = actor();
    let boss = NativeTypeBuilder::class("Boss").extends(&actor).build();
    let mut vm = load(module_of(vec![ty]), vec![actor, boss]);

    vm.host_mut().register_function("Actor", "Heal", |host, call| {
        let object = call.object;
        let amount = call.read(host, "amount", NativeKind::I32)?.as_i64();
        let health = host.read_property(object, "Health", NativeKind::I32)?.as_i64() + amount;
        host.write_property(object, "Health", NativeKind::I32, Scalar::Int(health))?;
        call.ret(host, NativeKind::I32, Scalar::Int(health))
    });
    vm.host_mut().register_function("Actor", "Greet", |host, call| {
        let visitor = host.read_string(call.param_addr("visitor")?)?;
        let greeting = format!("Hello, {}!", visitor);
        host.write_string(call.param_addr(RETURN_VALUE)?, &greeting)
    });
    vm.host_mut().register_function("Actor", "TryGetLevel", |host, call| {
        call.write(host, "level", NativeKind::I32, Scalar::Int(7))?;
        call.ret(host, NativeKind::Bool, Scalar::Bool(true))
    });
    vm.host_mut().register_function("Actor", "Total", |host, call| {
        let base = call.read(host, "base", NativeKind::I64)?.as_i64();
        let values = host.read_array(call.param_addr("values")?, NativeKind::I32)?;
        let sum = values.iter().fold(base, |acc, v| acc + v.as_i64());
        call.ret(host, NativeKind::I64, Scalar::Int(sum))
    });
    vm
}

#[test]
fn test_function_marshals_arguments_and_return_value() {
    let mut vm = actor_vm();
    let actor = vm.construct("Game.Actor", vec![]).unwrap();
    vm.set(&actor, "Health", Value::Int(10)).unwrap();

    let healed = vm.call_method(&actor, "Heal", vec![Value::Int(15)]).unwrap();
    assert_eq!(healed, Value::Int(25));
    assert_eq!(vm.get(&actor, "Health").unwrap(), Value::Int(25));
    assert_eq!(vm.host().call_count("Heal"), 1);
}

#[test]
fn test_string_parameters_leave_no_native_garbage() {
    let mut vm = actor_vm();
    let actor = vm.construct("Game.Actor", vec![]).unwrap();
    let blocks = vm.host().memory().live_blocks();

    let greeting = vm.call_method(&actor, "Greet", vec![Value::string("Ada")]).unwrap();
    assert_eq!(greeting, Value::string("Hello, Ada!"));
    assert_eq!(vm.host().memory().live_blocks(), blocks);
}

#[test]
fn test_out_parameter_is_written_back() {
    let mut vm = actor_vm();
    let actor = vm.construct("Game.Actor", vec![]).unwrap();
    let level = Rc::new(RefCell::new(Value::Null));

    let found = vm
        .call_method(&actor, "TryGetLevel", vec![Value::Ref(level.clone())])
        .unwrap();
    assert_eq!(found, Value::Bool(true));
    assert_eq!(*level.borrow(), Value::Int(7));
}

#[test]
fn test_static_function_sums_base_and_array() {
    let mut vm = actor_vm();
    let blocks = vm.host().memory().live_blocks();
    let total = vm
        .call_static("Game.Actor", "Total", vec![Value::Int(10), ints(&[3, 5, 6])])
        .unwrap();
    assert_eq!(total, Value::Int(24));
    assert_eq!(vm.host().memory().live_blocks(), blocks);
}

#[test]
fn test_event_runs_managed_fallback_without_native_override() {
    let mut vm = actor_vm();
    let actor = vm.construct("Game.Actor", vec![]).unwrap();

    vm.call_method(&actor, "OnSpawned", vec![]).unwrap();
    assert_eq!(vm.host().call_count("OnSpawned"), 1);
    assert_eq!(vm.call_count("Game.Actor::OnSpawned_Implementation"), 1);
    assert_eq!(vm.get(&actor, "Health").unwrap(), Value::Int(5));
}

#[test]
fn test_event_skips_managed_fallback_when_native_overrides() {
    let mut vm = actor_vm();
    vm.host_mut().register_function("Actor", "OnSpawned", |host, call| {
        host.write_property(call.object, "Health", NativeKind::I32, Scalar::Int(99))
    });
    let actor = vm.construct("Game.Actor", vec![]).unwrap();

    vm.call_method(&actor, "OnSpawned", vec![]).unwrap();
    assert_eq!(vm.call_count("Game.Actor::OnSpawned_Implementation"), 0);
    assert_eq!(vm.get(&actor, "Health").unwrap(), Value::Int(99));
}

#[test]
fn test_virtual_function_dispatches_on_the_native_class() {
    let mut vm = actor_vm();
    vm.host_mut().register_function("Actor", "Taunt", |host, call| {
        host.write_property(call.object, "Health", NativeKind::I32, Scalar::Int(1))
    });
    vm.host_mut().register_function("Boss", "Taunt", |host, call| {
        host.write_property(call.object, "Health", NativeKind::I32, Scalar::Int(1000))
    });

    let boss = vm.host_mut().new_object("Boss").unwrap();
    let wrapped = vm.wrap("Game.Actor", boss).unwrap();
    vm.call_method(&wrapped, "Taunt", vec![]).unwrap();
    assert_eq!(vm.get(&wrapped, "Health").unwrap(), Value::Int(1000));

    let actor = vm.construct("Game.Actor", vec![]).unwrap();
    vm.call_method(&actor, "Taunt", vec![]).unwrap();
    assert_eq!(vm.get(&actor, "Health").unwrap(), Value::Int(1));
    assert_eq!(vm.host().call_count("Taunt"), 2);
}

#[test]
fn test_native_errors_propagate_to_the_caller() {
    let mut vm = actor_vm();
    vm.host_mut().register_function("Actor", "Heal", |_, _| {
        Err(RuntimeError::Thrown("out of mana".into()))
    });
    let actor = vm.construct("Game.Actor", vec![]).unwrap();
    let err = vm.call_method(&actor, "Heal", vec![Value::Int(1)]).unwrap_err();
    assert!(matches!(err, RuntimeError::Thrown(ref m) if m == "out of mana"));

    // The failed call's parameter buffer was released with its frame
    let blocks = vm.host().memory().live_blocks();
    vm.host_mut().register_function("Actor", "Heal", |_, _| Ok(()));
    vm.call_method(&actor, "Heal", vec![Value::Int(1)]).unwrap();
    assert_eq!(vm.host().memory().live_blocks(), blocks);
}

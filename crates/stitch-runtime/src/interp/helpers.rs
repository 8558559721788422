//! Native implementation of the helper library
//!
//! Woven code calls the helper types by name; the interpreter routes those
//! calls here instead of looking for managed bodies. Descriptor lookups
//! accept a null owner handle and answer with null, so a type whose native
//! counterpart lacks a function still initializes and only fails when the
//! function is called.

use std::rc::Rc;

use stitch_bytecode::MethodRef;
use stitch_sdk::helpers::{
    HelperType, CTOR, DESTRUCT_INSTANCE, FROM_NATIVE, GET_BOOL_PROPERTY_FIELD_MASK, GET_NATIVE_DELEGATE_SIGNATURE,
    GET_NATIVE_FUNCTION, GET_NATIVE_FUNCTION_FROM_INSTANCE_AND_NAME, GET_NATIVE_FUNCTION_PARAMS_SIZE,
    GET_NATIVE_PROPERTY, GET_NATIVE_STRUCT_SIZE, GET_NATIVE_TYPE, GET_PROPERTY_OFFSET, GET_PROPERTY_OFFSET_FROM_NAME,
    INVOKE_NATIVE_STATIC_FUNCTION, IS_NATIVE_OVERRIDE, NATIVE_DELEGATE_FIELD, PROCESS_DELEGATE,
    PROCESS_MULTICAST_DELEGATE, TO_NATIVE,
};
use stitch_sdk::NativeKind;
use tracing::trace;

use super::marshal::{ContainerKind, Marshaller};
use super::Interpreter;
use crate::error::{RuntimeError, RuntimeResult};
use crate::host::layout::BINDING_SIZE;
use crate::memory::Scalar;
use crate::value::Value;

/// Bit mask answered for booleans the host does not pack
const FULL_MASK: i64 = 0xFF;

/// A helper-library owner of a method reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperOwner {
    /// The managed root of native-backed classes
    CoreObject,
    /// A helper type
    Library(HelperType),
}

/// Stack values consumed by a call to helper method `method`
pub fn arg_count(owner: HelperOwner, method: &MethodRef) -> usize {
    let arity = method.arity as usize;
    match owner {
        HelperOwner::CoreObject => arity + 1,
        HelperOwner::Library(ty) => {
            let is_static = ty
                .methods()
                .iter()
                .find(|m| m.name == method.name && m.arity == method.arity)
                .map_or(!ty.is_instance_marshaller(), |m| m.is_static);
            if is_static {
                arity
            } else {
                arity + 1
            }
        }
    }
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

fn unknown(method: &MethodRef) -> RuntimeError {
    RuntimeError::UnknownMethod {
        owner: method.owner.clone(),
        name: method.name.clone(),
        arity: method.arity,
    }
}

fn type_arg(method: &MethodRef) -> RuntimeResult<&str> {
    method
        .type_arg
        .as_deref()
        .ok_or_else(|| RuntimeError::mismatch("generic type argument", method))
}

/// Kind named by a `FromNative<Kind>` / `ToNative<Kind>` method
fn blittable_kind(name: &str) -> Option<(bool, NativeKind)> {
    let (from, suffix) = match name.strip_prefix(FROM_NATIVE) {
        Some(suffix) => (true, suffix),
        None => (false, name.strip_prefix(TO_NATIVE)?),
    };
    NativeKind::ALL
        .iter()
        .copied()
        .find(|k| k.suffix() == suffix)
        .map(|k| (from, k))
}

/// Serve a call to helper method `method`
pub fn call(
    interp: &mut Interpreter,
    owner: HelperOwner,
    method: &MethodRef,
    args: Vec<Value>,
) -> RuntimeResult<Option<Value>> {
    trace!(helper = %method, "helper call");
    match owner {
        HelperOwner::CoreObject => core_object(interp, method, &args).map(|()| None),
        HelperOwner::Library(ty) => library(interp, ty, method, &args),
    }
}

/// `newobj` of a helper type: container marshallers only
pub fn construct(
    interp: &mut Interpreter,
    owner: HelperOwner,
    ctor: &MethodRef,
    args: Vec<Value>,
) -> RuntimeResult<Value> {
    let HelperOwner::Library(ty) = owner else {
        return Err(unknown(ctor));
    };
    let Some((kind, copying)) = ContainerKind::of(ty) else {
        return Err(unknown(ctor));
    };
    let (property, rest) = args
        .split_first()
        .ok_or_else(|| RuntimeError::mismatch("property descriptor", &args))?;
    let property = interp.host.property(property.as_ptr()?)?.clone();
    let marshaller = Marshaller::new(kind, copying, property, rest)?;
    Ok(Value::Marshaller(Rc::new(marshaller)))
}

fn core_object(interp: &mut Interpreter, method: &MethodRef, args: &[Value]) -> RuntimeResult<()> {
    if method.name != CTOR {
        return Err(unknown(method));
    }
    let this = arg(args, 0);
    let object = this.as_object()?.clone();
    match method.arity {
        0 => {
            if interp.native_object(&this)? != 0 {
                return Ok(());
            }
            let class = object.borrow().class.clone();
            let handle = interp.native_class_of(&class)?;
            let native_class = interp.host.type_of_handle(handle)?.name.clone();
            let native = interp.host.new_object(&native_class)?;
            interp.bind_native(&object, native);
        }
        1 => {
            let native = arg(args, 1).as_ptr()?;
            interp.bind_native(&object, native);
        }
        _ => return Err(unknown(method)),
    }
    Ok(())
}

fn library(
    interp: &mut Interpreter,
    ty: HelperType,
    method: &MethodRef,
    args: &[Value],
) -> RuntimeResult<Option<Value>> {
    let name = method.name.as_str();
    let ptr = |i: usize| arg(args, i).as_ptr();
    let host = &mut interp.host;

    let value = match ty {
        // ===== Registries =====
        HelperType::TypeRegistry => match name {
            GET_NATIVE_TYPE => Value::Ptr(host.type_handle(arg(args, 0).as_str()?)?),
            GET_NATIVE_STRUCT_SIZE => Value::Int(i64::from(host.struct_size(ptr(0)?)?)),
            GET_NATIVE_DELEGATE_SIGNATURE => Value::Ptr(host.delegate_signature(arg(args, 0).as_str()?)?),
            _ => return Err(unknown(method)),
        },
        HelperType::PropertyRegistry => match name {
            GET_NATIVE_PROPERTY => match ptr(0)? {
                0 => Value::Ptr(0),
                owner => Value::Ptr(host.property_handle(owner, arg(args, 1).as_str()?)?),
            },
            GET_PROPERTY_OFFSET => match ptr(0)? {
                0 => Value::Int(0),
                property => Value::Int(i64::from(host.property(property)?.offset)),
            },
            GET_PROPERTY_OFFSET_FROM_NAME => match ptr(0)? {
                0 => Value::Int(0),
                owner => Value::Int(i64::from(host.property_offset(owner, arg(args, 1).as_str()?)?)),
            },
            GET_BOOL_PROPERTY_FIELD_MASK => match ptr(0)? {
                0 => Value::Int(FULL_MASK),
                property => Value::Int(host.property(property)?.bit_mask.map_or(FULL_MASK, i64::from)),
            },
            _ => return Err(unknown(method)),
        },
        HelperType::FunctionRegistry => match name {
            GET_NATIVE_FUNCTION => match ptr(0)? {
                0 => Value::Ptr(0),
                owner => Value::Ptr(host.function_handle(owner, arg(args, 1).as_str()?)?),
            },
            GET_NATIVE_FUNCTION_FROM_INSTANCE_AND_NAME => {
                Value::Ptr(host.function_of_instance(ptr(0)?, arg(args, 1).as_str()?)?)
            }
            GET_NATIVE_FUNCTION_PARAMS_SIZE => match ptr(0)? {
                0 => Value::Int(0),
                function => Value::Int(i64::from(host.params_size(function)?)),
            },
            IS_NATIVE_OVERRIDE => Value::Bool(host.is_native_override(ptr(0)?, arg(args, 1).as_str()?)),
            _ => return Err(unknown(method)),
        },

        // ===== Invokers =====
        HelperType::FunctionInvoker => {
            let object = if name == INVOKE_NATIVE_STATIC_FUNCTION { 0 } else { ptr(0)? };
            host.invoke(object, ptr(1)?, ptr(2)?)?;
            return Ok(None);
        }
        HelperType::DelegateInvoker => {
            match name {
                PROCESS_DELEGATE => host.process_delegate(ptr(0)?, ptr(1)?)?,
                PROCESS_MULTICAST_DELEGATE => host.process_multicast(ptr(0)?, ptr(1)?)?,
                _ => return Err(unknown(method)),
            }
            return Ok(None);
        }
        HelperType::DelegateBase if name == CTOR => return Ok(None),

        // ===== Primitives =====
        HelperType::BlittableMarshaller => match blittable_kind(name) {
            Some((true, kind)) => Value::from_scalar(host.memory().read_kind(ptr(0)?, kind)?),
            Some((false, kind)) => {
                host.memory_mut().write_kind(ptr(0)?, kind, arg(args, 1).to_scalar()?)?;
                return Ok(None);
            }
            None => return Err(unknown(method)),
        },
        HelperType::BoolMarshaller => match name {
            FROM_NATIVE => Value::from_scalar(host.memory().read_kind(ptr(0)?, NativeKind::Bool)?),
            TO_NATIVE => {
                let value = Scalar::Bool(arg(args, 1).is_truthy());
                host.memory_mut().write_kind(ptr(0)?, NativeKind::Bool, value)?;
                return Ok(None);
            }
            _ => return Err(unknown(method)),
        },
        HelperType::BitfieldBoolMarshaller => {
            let addr = ptr(0)?;
            let mask = arg(args, 1).as_i64()?;
            let byte = host.memory().read_kind(addr, NativeKind::U8)?.as_i64();
            match name {
                FROM_NATIVE => Value::Bool(byte & mask != 0),
                TO_NATIVE => {
                    let byte = if arg(args, 2).is_truthy() { byte | mask } else { byte & !mask };
                    host.memory_mut().write_kind(addr, NativeKind::U8, Scalar::Int(byte))?;
                    return Ok(None);
                }
                _ => return Err(unknown(method)),
            }
        }

        // ===== Text =====
        HelperType::StringMarshaller | HelperType::TextMarshaller => match name {
            FROM_NATIVE => Value::string(&host.read_string(ptr(0)?)?),
            TO_NATIVE => {
                let value = arg(args, 1);
                let text = match &value {
                    Value::Null => "",
                    other => other.as_str()?,
                };
                host.write_string(ptr(0)?, text)?;
                return Ok(None);
            }
            DESTRUCT_INSTANCE => {
                host.free_array(ptr(0)?)?;
                return Ok(None);
            }
            _ => return Err(unknown(method)),
        },
        HelperType::NameMarshaller => match name {
            FROM_NATIVE => {
                let id = host.memory().read_kind(ptr(0)?, NativeKind::U64)?.as_i64() as u64;
                Value::string(host.name(id)?)
            }
            TO_NATIVE => {
                let value = arg(args, 1);
                let id = match &value {
                    Value::Null => 0,
                    other => host.name_id(other.as_str()?),
                };
                host.memory_mut().write_kind(ptr(0)?, NativeKind::U64, Scalar::Int(id as i64))?;
                return Ok(None);
            }
            _ => return Err(unknown(method)),
        },

        // ===== References =====
        HelperType::ObjectMarshaller
        | HelperType::StrongObjectMarshaller
        | HelperType::WeakObjectMarshaller
        | HelperType::SoftObjectMarshaller
        | HelperType::ScriptInterfaceMarshaller => match name {
            FROM_NATIVE => {
                let native = host.memory().read_ptr(ptr(0)?)?;
                let class = if ty == HelperType::ScriptInterfaceMarshaller {
                    format!("{}Proxy", type_arg(method)?)
                } else {
                    type_arg(method)?.to_string()
                };
                interp.wrap(&class, native)?
            }
            TO_NATIVE => {
                let value = arg(args, 1);
                let native = match value {
                    Value::Null => 0,
                    other => interp.native_object(&other)?,
                };
                interp.host.memory_mut().write_ptr(ptr(0)?, native)?;
                return Ok(None);
            }
            _ => return Err(unknown(method)),
        },
        HelperType::SubclassOfMarshaller | HelperType::SoftClassMarshaller => match name {
            FROM_NATIVE => match host.memory().read_ptr(ptr(0)?)? {
                0 => Value::Null,
                handle => Value::string(&host.type_of_handle(handle)?.name),
            },
            TO_NATIVE => {
                let handle = match arg(args, 1) {
                    Value::Null => 0,
                    other => host.type_handle(other.as_str()?)?,
                };
                host.memory_mut().write_ptr(ptr(0)?, handle)?;
                return Ok(None);
            }
            _ => return Err(unknown(method)),
        },

        // ===== Records =====
        HelperType::BlittableStructMarshaller => {
            let record = type_arg(method)?.to_string();
            match name {
                FROM_NATIVE => {
                    let ctor = MethodRef::new(record, CTOR, 1);
                    interp.new_object(&ctor, vec![Value::Ptr(ptr(0)?)])?
                }
                TO_NATIVE => {
                    let to_native = MethodRef::new(record, TO_NATIVE, 1);
                    interp.call(&to_native, vec![arg(args, 1), Value::Ptr(ptr(0)?)], false)?;
                    return Ok(None);
                }
                _ => return Err(unknown(method)),
            }
        }
        HelperType::OpaqueMarshaller => {
            let addr = ptr(0)?;
            let size = host.property(ptr(1)?)?.size as usize;
            match name {
                FROM_NATIVE => Value::Bytes(Rc::new(host.memory().read(addr, size)?.to_vec())),
                TO_NATIVE => {
                    let mut bytes = match arg(args, 2) {
                        Value::Null => Vec::new(),
                        Value::Bytes(b) => b.as_ref().clone(),
                        other => return Err(RuntimeError::mismatch("opaque bytes", other)),
                    };
                    bytes.resize(size, 0);
                    host.memory_mut().write(addr, &bytes)?;
                    return Ok(None);
                }
                _ => return Err(unknown(method)),
            }
        }

        // ===== Callables =====
        HelperType::SingleDelegateMarshaller | HelperType::MulticastDelegateMarshaller => {
            let multicast = ty == HelperType::MulticastDelegateMarshaller;
            match name {
                FROM_NATIVE => {
                    let target = type_arg(method)?.to_string();
                    interp.ensure_init(&target)?;
                    let delegate = interp.instantiate(&target)?;
                    delegate
                        .borrow_mut()
                        .fields
                        .insert(NATIVE_DELEGATE_FIELD.to_string(), Value::Ptr(ptr(0)?));
                    Value::Object(delegate)
                }
                TO_NATIVE => {
                    let addr = ptr(0)?;
                    let source = match arg(args, 1) {
                        Value::Null => 0,
                        other => other.as_object()?.borrow().get(NATIVE_DELEGATE_FIELD).as_ptr()?,
                    };
                    let host = &mut interp.host;
                    if multicast {
                        let bindings = if source == 0 { Vec::new() } else { host.bindings(source)? };
                        host.write_bindings(addr, &bindings)?;
                    } else if source == 0 {
                        host.memory_mut().zero(addr, BINDING_SIZE as usize)?;
                    } else if source != addr {
                        host.memory_mut().copy(addr, source, BINDING_SIZE as usize)?;
                    }
                    return Ok(None);
                }
                _ => return Err(unknown(method)),
            }
        }

        // ===== Containers =====
        ty if ty.is_instance_marshaller() => {
            let marshaller = match arg(args, 0) {
                Value::Marshaller(m) => m,
                other => return Err(RuntimeError::mismatch("container marshaller", other)),
            };
            let addr = ptr(1)?;
            match name {
                FROM_NATIVE => interp.container_from_native(&marshaller, addr)?,
                TO_NATIVE => {
                    interp.container_to_native(&marshaller, addr, &arg(args, 2))?;
                    return Ok(None);
                }
                DESTRUCT_INSTANCE => {
                    interp.container_destruct(&marshaller, addr)?;
                    return Ok(None);
                }
                _ => return Err(unknown(method)),
            }
        }

        _ => return Err(unknown(method)),
    };
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blittable_names_resolve_to_kinds() {
        assert_eq!(blittable_kind("FromNativeI32"), Some((true, NativeKind::I32)));
        assert_eq!(blittable_kind("ToNativePtr"), Some((false, NativeKind::Ptr)));
        assert_eq!(blittable_kind("ToNativeI128"), None);
        assert_eq!(blittable_kind("Invoke"), None);
    }

    #[test]
    fn test_arg_counts_follow_catalog() {
        let lib = HelperOwner::Library;
        let m = |owner: &str, name: &str, arity| MethodRef::new(owner, name, arity);
        assert_eq!(arg_count(lib(HelperType::StringMarshaller), &m("S", TO_NATIVE, 2)), 2);
        assert_eq!(arg_count(lib(HelperType::ArrayMarshaller), &m("A", FROM_NATIVE, 1)), 2);
        assert_eq!(arg_count(lib(HelperType::DelegateBase), &m("D", CTOR, 0)), 1);
        assert_eq!(arg_count(HelperOwner::CoreObject, &m("C", CTOR, 1)), 2);
        assert_eq!(arg_count(lib(HelperType::FunctionInvoker), &m("F", "InvokeNativeFunction", 3)), 3);
    }
}

//! Simulated native host
//!
//! Owns the native address space, the reflection descriptor table and the
//! native objects allocated from it. Descriptor lookups hand out opaque
//! handles that woven code keeps in static fields and passes back.
//! Native functions are Rust closures registered per (type, function) and
//! dispatched on the receiver's native class, walking super types.

pub mod builder;
pub mod layout;

use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use stitch_sdk::{NativeFunctionDesc, NativeKind, NativeMetadata, NativePropertyDesc, NativeTypeDesc, NativeTypeKind};
use tracing::trace;

use crate::error::{RuntimeError, RuntimeResult};
use crate::memory::{NativeMemory, Scalar};

/// First handle value; far above any heap address
const HANDLE_BASE: u64 = 0x7F00_0000_0000;
const HANDLE_STRIDE: u64 = 16;

/// A native function implementation
pub type NativeFn = Rc<dyn Fn(&mut NativeHost, &NativeCall) -> RuntimeResult<()>>;

/// One invocation of a native function
#[derive(Debug, Clone)]
pub struct NativeCall {
    /// Receiver, 0 for static calls
    pub object: u64,
    /// Type declaring the function
    pub owner: String,
    /// Function descriptor
    pub function: NativeFunctionDesc,
    /// Parameter buffer, 0 when the function takes nothing
    pub params: u64,
}

impl NativeCall {
    /// Address of parameter `name` in the buffer
    pub fn param_addr(&self, name: &str) -> RuntimeResult<u64> {
        let param = self.function.param(name).ok_or_else(|| RuntimeError::UnknownProperty {
            owner: self.function.name.clone(),
            name: name.to_string(),
        })?;
        Ok(self.params + param.offset as u64)
    }

    /// Read a primitive parameter
    pub fn read(&self, host: &NativeHost, name: &str, kind: NativeKind) -> RuntimeResult<Scalar> {
        host.memory.read_kind(self.param_addr(name)?, kind)
    }

    /// Write a primitive parameter (out parameters, return value)
    pub fn write(&self, host: &mut NativeHost, name: &str, kind: NativeKind, value: Scalar) -> RuntimeResult<()> {
        let addr = self.param_addr(name)?;
        host.memory.write_kind(addr, kind, value)
    }

    /// Write the primitive return value
    pub fn ret(&self, host: &mut NativeHost, kind: NativeKind, value: Scalar) -> RuntimeResult<()> {
        self.write(host, stitch_sdk::metadata::RETURN_VALUE, kind, value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum HandleKey {
    Type(String),
    Function(String, String),
    Property(u64, String),
}

#[derive(Debug, Clone)]
enum Handle {
    Type(String),
    Function { owner: String, name: String },
    Property(NativePropertyDesc),
}

/// The native side of the bridge
pub struct NativeHost {
    memory: NativeMemory,
    metadata: NativeMetadata,
    handles: Vec<Handle>,
    interned: FxHashMap<HandleKey, u64>,
    objects: FxHashMap<u64, String>,
    functions: FxHashMap<(String, String), NativeFn>,
    names: Vec<String>,
    name_ids: FxHashMap<String, u64>,
    calls: FxHashMap<String, usize>,
}

impl fmt::Debug for NativeHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeHost")
            .field("types", &self.metadata.len())
            .field("objects", &self.objects.len())
            .field("functions", &self.functions.len())
            .field("live_blocks", &self.memory.live_blocks())
            .finish()
    }
}

impl NativeHost {
    /// Host describing the types of `metadata`
    pub fn new(metadata: NativeMetadata) -> Self {
        let mut host = Self {
            memory: NativeMemory::new(),
            metadata,
            handles: Vec::new(),
            interned: FxHashMap::default(),
            objects: FxHashMap::default(),
            functions: FxHashMap::default(),
            names: Vec::new(),
            name_ids: FxHashMap::default(),
            calls: FxHashMap::default(),
        };
        host.name_id("None");
        host
    }

    /// Native address space
    pub fn memory(&self) -> &NativeMemory {
        &self.memory
    }

    /// Mutable native address space
    pub fn memory_mut(&mut self) -> &mut NativeMemory {
        &mut self.memory
    }

    /// Descriptor table
    pub fn metadata(&self) -> &NativeMetadata {
        &self.metadata
    }

    // ========================================================================
    // Handles
    // ========================================================================

    fn intern(&mut self, key: HandleKey, handle: Handle) -> u64 {
        if let Some(&value) = self.interned.get(&key) {
            return value;
        }
        let value = HANDLE_BASE + self.handles.len() as u64 * HANDLE_STRIDE;
        self.handles.push(handle);
        self.interned.insert(key, value);
        value
    }

    fn handle(&self, value: u64, expected: &'static str) -> RuntimeResult<&Handle> {
        let invalid = RuntimeError::InvalidHandle { handle: value, expected };
        if value < HANDLE_BASE || (value - HANDLE_BASE) % HANDLE_STRIDE != 0 {
            return Err(invalid);
        }
        self.handles
            .get(((value - HANDLE_BASE) / HANDLE_STRIDE) as usize)
            .ok_or(invalid)
    }

    fn describe(&self, name: &str) -> RuntimeResult<&NativeTypeDesc> {
        self.metadata
            .find(name)
            .ok_or_else(|| RuntimeError::UnknownNativeType(name.to_string()))
    }

    /// `name` followed by its super types
    fn lineage(&self, name: &str) -> Vec<&NativeTypeDesc> {
        let mut out: Vec<&NativeTypeDesc> = Vec::new();
        let mut next = self.metadata.find(name);
        while let Some(desc) = next {
            if out.iter().any(|d| d.name == desc.name) {
                break;
            }
            out.push(desc);
            next = desc.super_name.as_deref().and_then(|s| self.metadata.find(s));
        }
        out
    }

    /// Handle of native type `name`
    pub fn type_handle(&mut self, name: &str) -> RuntimeResult<u64> {
        self.describe(name)?;
        Ok(self.intern(HandleKey::Type(name.to_string()), Handle::Type(name.to_string())))
    }

    /// Native type behind a type handle
    pub fn type_of_handle(&self, handle: u64) -> RuntimeResult<&NativeTypeDesc> {
        match self.handle(handle, "type")? {
            Handle::Type(name) => self.describe(name),
            _ => Err(RuntimeError::InvalidHandle { handle, expected: "type" }),
        }
    }

    /// Instance size of a native type
    pub fn struct_size(&self, handle: u64) -> RuntimeResult<u32> {
        Ok(self.type_of_handle(handle)?.size)
    }

    /// Signature function of callable type `name`
    pub fn delegate_signature(&mut self, name: &str) -> RuntimeResult<u64> {
        let desc = self.describe(name)?;
        let function = match (desc.kind, desc.functions.first()) {
            (NativeTypeKind::Delegate, Some(f)) => f.name.clone(),
            _ => return Err(RuntimeError::mismatch("callable signature", name)),
        };
        Ok(self.function_handle_of(name, &function))
    }

    fn function_handle_of(&mut self, owner: &str, function: &str) -> u64 {
        self.intern(
            HandleKey::Function(owner.to_string(), function.to_string()),
            Handle::Function {
                owner: owner.to_string(),
                name: function.to_string(),
            },
        )
    }

    /// Function `name` of the type behind `type_handle` or one of its super
    /// types; 0 when none declares it
    pub fn function_handle(&mut self, type_handle: u64, name: &str) -> RuntimeResult<u64> {
        let ty = self.type_of_handle(type_handle)?.name.clone();
        Ok(self.find_function(&ty, name).map_or(0, |owner| self.function_handle_of(&owner, name)))
    }

    /// Function `name` resolved against the native class of `object`
    pub fn function_of_instance(&mut self, object: u64, name: &str) -> RuntimeResult<u64> {
        let class = self.class_of(object)?.to_string();
        Ok(self.find_function(&class, name).map_or(0, |owner| self.function_handle_of(&owner, name)))
    }

    fn find_function(&self, ty: &str, name: &str) -> Option<String> {
        self.lineage(ty)
            .into_iter()
            .find(|d| d.function(name).is_some())
            .map(|d| d.name.clone())
    }

    /// Declaring type and descriptor of a function handle
    pub fn function(&self, handle: u64) -> RuntimeResult<(&str, &NativeFunctionDesc)> {
        match self.handle(handle, "function")? {
            Handle::Function { owner, name } => {
                let desc = self.describe(owner)?;
                let function = desc.function(name).ok_or_else(|| RuntimeError::UnknownProperty {
                    owner: owner.clone(),
                    name: name.clone(),
                })?;
                Ok((owner.as_str(), function))
            }
            _ => Err(RuntimeError::InvalidHandle { handle, expected: "function" }),
        }
    }

    /// Parameter buffer size of a function
    pub fn params_size(&self, handle: u64) -> RuntimeResult<u32> {
        Ok(self.function(handle)?.1.params_size)
    }

    /// Property (or parameter) `name` of a type or function handle
    pub fn property_handle(&mut self, owner: u64, name: &str) -> RuntimeResult<u64> {
        let key = HandleKey::Property(owner, name.to_string());
        if let Some(&value) = self.interned.get(&key) {
            return Ok(value);
        }
        let desc = self.lookup_property(owner, name)?;
        Ok(self.intern(key, Handle::Property(desc)))
    }

    fn lookup_property(&self, owner: u64, name: &str) -> RuntimeResult<NativePropertyDesc> {
        let unknown = |owner: &str| RuntimeError::UnknownProperty {
            owner: owner.to_string(),
            name: name.to_string(),
        };
        match self.handle(owner, "type or function")? {
            Handle::Type(ty) => self
                .lineage(ty)
                .into_iter()
                .find_map(|d| d.property(name))
                .cloned()
                .ok_or_else(|| unknown(ty.as_str())),
            Handle::Function { .. } => {
                let (_, function) = self.function(owner)?;
                function.param(name).cloned().ok_or_else(|| unknown(function.name.as_str()))
            }
            Handle::Property(_) => Err(RuntimeError::InvalidHandle {
                handle: owner,
                expected: "type or function",
            }),
        }
    }

    /// Descriptor behind a property handle
    pub fn property(&self, handle: u64) -> RuntimeResult<&NativePropertyDesc> {
        match self.handle(handle, "property")? {
            Handle::Property(desc) => Ok(desc),
            _ => Err(RuntimeError::InvalidHandle { handle, expected: "property" }),
        }
    }

    /// Offset of property `name` without handing out its descriptor
    pub fn property_offset(&self, owner: u64, name: &str) -> RuntimeResult<u32> {
        Ok(self.lookup_property(owner, name)?.offset)
    }

    // ========================================================================
    // Objects
    // ========================================================================

    /// Allocate a zeroed instance of native class `class`
    pub fn new_object(&mut self, class: &str) -> RuntimeResult<u64> {
        let size = self.describe(class)?.size;
        let object = self.memory.alloc(size as usize);
        self.objects.insert(object, class.to_string());
        trace!(class, object, "allocated native object");
        Ok(object)
    }

    /// Destroy a native object
    pub fn destroy_object(&mut self, object: u64) -> RuntimeResult<()> {
        self.objects.remove(&object).ok_or(RuntimeError::UnknownObject(object))?;
        self.memory.free(object)
    }

    /// Native class of a live object
    pub fn class_of(&self, object: u64) -> RuntimeResult<&str> {
        self.objects
            .get(&object)
            .map(String::as_str)
            .ok_or(RuntimeError::UnknownObject(object))
    }

    /// Whether `class` is `ancestor` or derives from it
    pub fn is_a(&self, class: &str, ancestor: &str) -> bool {
        self.lineage(class).iter().any(|d| d.name == ancestor)
    }

    /// Address of property `name` of `object`
    pub fn property_addr(&self, object: u64, name: &str) -> RuntimeResult<u64> {
        let class = self.class_of(object)?;
        let property = self
            .lineage(class)
            .into_iter()
            .find_map(|d| d.property(name))
            .ok_or_else(|| RuntimeError::UnknownProperty {
                owner: class.to_string(),
                name: name.to_string(),
            })?;
        Ok(object + property.offset as u64)
    }

    /// Read a primitive property of `object`
    pub fn read_property(&self, object: u64, name: &str, kind: NativeKind) -> RuntimeResult<Scalar> {
        self.memory.read_kind(self.property_addr(object, name)?, kind)
    }

    /// Write a primitive property of `object`
    pub fn write_property(&mut self, object: u64, name: &str, kind: NativeKind, value: Scalar) -> RuntimeResult<()> {
        let addr = self.property_addr(object, name)?;
        self.memory.write_kind(addr, kind, value)
    }

    // ========================================================================
    // Native functions
    // ========================================================================

    /// Implement function `function` of native type `ty`
    pub fn register_function<F>(&mut self, ty: &str, function: &str, f: F)
    where
        F: Fn(&mut NativeHost, &NativeCall) -> RuntimeResult<()> + 'static,
    {
        self.functions
            .insert((ty.to_string(), function.to_string()), Rc::new(f));
    }

    fn implementation(&self, class: &str, function: &str) -> Option<NativeFn> {
        self.lineage(class)
            .into_iter()
            .find_map(|d| self.functions.get(&(d.name.clone(), function.to_string())))
            .cloned()
    }

    /// Whether the native class of `object` implements `function`
    pub fn is_native_override(&self, object: u64, function: &str) -> bool {
        self.class_of(object)
            .ok()
            .is_some_and(|class| self.implementation(class, function).is_some())
    }

    /// Invoke a function on `object` (0 for static calls) with the
    /// parameter buffer at `params`
    ///
    /// Dispatch starts at the receiver's native class; a function with no
    /// registered implementation does nothing.
    pub fn invoke(&mut self, object: u64, function: u64, params: u64) -> RuntimeResult<()> {
        let (owner, desc) = self.function(function)?;
        let (owner, desc) = (owner.to_string(), desc.clone());
        let dispatch = match self.objects.get(&object) {
            Some(class) => class.clone(),
            None => owner.clone(),
        };
        *self.calls.entry(desc.name.clone()).or_default() += 1;
        trace!(function = %desc.name, owner = %owner, object, "native call");

        let Some(f) = self.implementation(&dispatch, &desc.name) else {
            return Ok(());
        };
        let call = NativeCall {
            object,
            owner,
            function: desc,
            params,
        };
        f(self, &call)
    }

    /// How often native function `function` was invoked
    pub fn call_count(&self, function: &str) -> usize {
        self.calls.get(function).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::builder::{FunctionBuilder, NativeTypeBuilder, Shape};
    use super::*;

    fn host() -> NativeHost {
        let actor = NativeTypeBuilder::class("Actor")
            .property("Health", Shape::Scalar(NativeKind::I32))
            .function(
                FunctionBuilder::new("Heal")
                    .param("amount", Shape::Scalar(NativeKind::I32))
                    .returns(Shape::Scalar(NativeKind::I32))
                    .build(),
            )
            .build();
        let pawn = NativeTypeBuilder::class("Pawn")
            .extends(&actor)
            .property("Speed", Shape::Scalar(NativeKind::F32))
            .build();
        NativeHost::new(NativeMetadata::from_types(vec![actor, pawn]).unwrap())
    }

    #[test]
    fn test_handles_are_stable() {
        let mut host = host();
        let a = host.type_handle("Actor").unwrap();
        assert_eq!(host.type_handle("Actor").unwrap(), a);
        assert!(matches!(host.type_handle("Missing"), Err(RuntimeError::UnknownNativeType(_))));
        assert!(host.property(a).is_err());
    }

    #[test]
    fn test_inherited_members_resolve() {
        let mut host = host();
        let pawn = host.type_handle("Pawn").unwrap();
        let health = host.property_handle(pawn, "Health").unwrap();
        assert_eq!(host.property(health).unwrap().offset, 0);
        assert_eq!(host.property_offset(pawn, "Speed").unwrap(), 4);

        let heal = host.function_handle(pawn, "Heal").unwrap();
        assert_eq!(host.function(heal).unwrap().0, "Actor");
        assert_eq!(host.params_size(heal).unwrap(), 8);
        assert_eq!(host.function_handle(pawn, "Missing").unwrap(), 0);
    }

    #[test]
    fn test_dispatch_follows_the_receiver() {
        let mut host = host();
        host.register_function("Actor", "Heal", |host, call| {
            let amount = call.read(host, "amount", NativeKind::I32)?.as_i64();
            call.ret(host, NativeKind::I32, Scalar::Int(amount + 1))
        });
        host.register_function("Pawn", "Heal", |host, call| {
            let amount = call.read(host, "amount", NativeKind::I32)?.as_i64();
            call.ret(host, NativeKind::I32, Scalar::Int(amount * 10))
        });

        let actor_ty = host.type_handle("Actor").unwrap();
        let heal = host.function_handle(actor_ty, "Heal").unwrap();
        let pawn = host.new_object("Pawn").unwrap();
        let params = host.memory_mut().alloc(8);
        host.memory_mut().write_kind(params, NativeKind::I32, Scalar::Int(4)).unwrap();
        host.invoke(pawn, heal, params).unwrap();
        assert_eq!(host.memory().read_kind(params + 4, NativeKind::I32).unwrap(), Scalar::Int(40));
        assert_eq!(host.call_count("Heal"), 1);
        assert!(host.is_native_override(pawn, "Heal"));
        assert!(host.is_a("Pawn", "Actor"));
    }

    #[test]
    fn test_unimplemented_function_is_a_no_op() {
        let mut host = host();
        let actor = host.new_object("Actor").unwrap();
        let ty = host.type_handle("Actor").unwrap();
        let heal = host.function_handle(ty, "Heal").unwrap();
        host.invoke(actor, heal, 0).unwrap();
        assert_eq!(host.call_count("Heal"), 1);
        assert!(!host.is_native_override(actor, "Heal"));
    }
}

//! Interpreter for woven modules
//!
//! Runs method bodies of one module against a [`NativeHost`]. Calls to the
//! helper library are served natively (see [`helpers`]); everything else
//! executes the module's own instructions.
//!
//! Static initializers run lazily, on the first static field access, static
//! call or construction of their type, after the base type's initializer.

pub mod helpers;
pub mod marshal;

mod exec;
mod record;

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};
use stitch_bytecode::{MethodRef, Module, TypeDef, TypeKind, TypeSig};
use stitch_sdk::helpers::{
    HelperType, CTOR, DEFAULT_CORE_OBJECT, DEFAULT_NAMESPACE, NATIVE_DELEGATE_FIELD, NATIVE_OBJECT_FIELD,
};
use tracing::{debug, trace};

use crate::error::{RuntimeError, RuntimeResult};
use crate::host::NativeHost;
use crate::value::{ObjRef, Object, Value};
use helpers::HelperOwner;

/// Static field the native type descriptor is cached in
pub const NATIVE_CLASS_PTR: &str = "NativeClassPtr";

/// Maximum call nesting
const MAX_DEPTH: usize = 256;

/// Executes a module's methods against a native host
pub struct Interpreter {
    types: FxHashMap<String, Rc<TypeDef>>,
    strings: Vec<Rc<str>>,
    host: NativeHost,
    namespace: String,
    core_object: String,
    statics: FxHashMap<(String, String), Value>,
    initialized: FxHashSet<String>,
    wrappers: FxHashMap<u64, ObjRef>,
    calls: FxHashMap<String, usize>,
    depth: usize,
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("types", &self.types.len())
            .field("initialized", &self.initialized.len())
            .field("host", &self.host)
            .finish()
    }
}

impl Interpreter {
    /// Load `module` with the default helper namespace
    pub fn new(module: Module, host: NativeHost) -> Self {
        Self::with_helpers(module, host, DEFAULT_NAMESPACE, DEFAULT_CORE_OBJECT)
    }

    /// Load `module` with the helper library under `namespace` and
    /// `core_object` as the managed root of native-backed classes
    pub fn with_helpers(module: Module, host: NativeHost, namespace: &str, core_object: &str) -> Self {
        let strings = module.constants.strings.iter().map(|s| Rc::from(s.as_str())).collect();
        let types = module
            .types
            .into_iter()
            .map(|ty| (ty.name.clone(), Rc::new(ty)))
            .collect();
        Self {
            types,
            strings,
            host,
            namespace: namespace.to_string(),
            core_object: core_object.to_string(),
            statics: FxHashMap::default(),
            initialized: FxHashSet::default(),
            wrappers: FxHashMap::default(),
            calls: FxHashMap::default(),
            depth: 0,
        }
    }

    /// The native host
    pub fn host(&self) -> &NativeHost {
        &self.host
    }

    /// The native host, mutably
    pub fn host_mut(&mut self) -> &mut NativeHost {
        &mut self.host
    }

    /// A loaded type
    pub fn type_def(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name).map(|t| t.as_ref())
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Construct `class` with the constructor taking `args`
    pub fn construct(&mut self, class: &str, args: Vec<Value>) -> RuntimeResult<Value> {
        let ctor = MethodRef::new(class, CTOR, args.len() as u16);
        self.new_object(&ctor, args)
    }

    /// Call static method `name` of `owner`
    pub fn call_static(&mut self, owner: &str, name: &str, args: Vec<Value>) -> RuntimeResult<Value> {
        let method = MethodRef::new(owner, name, args.len() as u16);
        Ok(self.call(&method, args, false)?.unwrap_or_default())
    }

    /// Virtual call of instance method `name` on `target`
    pub fn call_method(&mut self, target: &Value, name: &str, args: Vec<Value>) -> RuntimeResult<Value> {
        let class = target.as_object()?.borrow().class.clone();
        let method = MethodRef::new(class, name, args.len() as u16);
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(target.clone());
        full.extend(args);
        Ok(self.call(&method, full, true)?.unwrap_or_default())
    }

    /// Read property `property` through its getter
    pub fn get(&mut self, target: &Value, property: &str) -> RuntimeResult<Value> {
        self.call_method(target, &format!("get_{}", property), Vec::new())
    }

    /// Write property `property` through its setter
    pub fn set(&mut self, target: &Value, property: &str, value: Value) -> RuntimeResult<()> {
        self.call_method(target, &format!("set_{}", property), vec![value])?;
        Ok(())
    }

    /// Value of a static field, running the owner's initializer first
    pub fn static_field(&mut self, owner: &str, field: &str) -> RuntimeResult<Value> {
        self.ensure_init(owner)?;
        Ok(self.static_value(owner, field))
    }

    /// How often `Owner::method` was executed
    pub fn call_count(&self, method: &str) -> usize {
        self.calls.get(method).copied().unwrap_or(0)
    }

    /// Native object pointer of a native-backed managed object
    pub fn native_object(&self, target: &Value) -> RuntimeResult<u64> {
        target.as_object()?.borrow().get(NATIVE_OBJECT_FIELD).as_ptr()
    }

    /// Managed wrapper of native object `native`, created as `class` when
    /// the object has none yet
    pub fn wrap(&mut self, class: &str, native: u64) -> RuntimeResult<Value> {
        if native == 0 {
            return Ok(Value::Null);
        }
        if let Some(existing) = self.wrappers.get(&native) {
            return Ok(Value::Object(existing.clone()));
        }
        self.host.class_of(native)?;
        self.ensure_init(class)?;
        let object = self.instantiate(class)?;
        object
            .borrow_mut()
            .fields
            .insert(NATIVE_OBJECT_FIELD.to_string(), Value::Ptr(native));
        self.wrappers.insert(native, object.clone());
        Ok(Value::Object(object))
    }

    // ========================================================================
    // Calls
    // ========================================================================

    pub(crate) fn helper_owner(&self, owner: &str) -> Option<HelperOwner> {
        if owner == self.core_object {
            return Some(HelperOwner::CoreObject);
        }
        owner
            .strip_prefix(self.namespace.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .and_then(HelperType::from_simple_name)
            .map(HelperOwner::Library)
    }

    /// Declaring type and index of `name/arity`, searching `owner` and its
    /// bases
    fn resolve(&self, owner: &str, name: &str, arity: u16) -> Option<(Rc<TypeDef>, usize)> {
        let mut next = Some(owner.to_string());
        let mut seen = 0;
        while let Some(current) = next {
            let ty = self.types.get(&current)?;
            if let Some(index) = ty.methods.iter().position(|m| m.name == name && m.arity() == arity) {
                return Some((ty.clone(), index));
            }
            seen += 1;
            if seen > self.types.len() {
                return None;
            }
            next = ty.base.clone();
        }
        None
    }

    /// Number of stack values a call to `method` consumes
    pub(crate) fn arg_count(&self, method: &MethodRef) -> RuntimeResult<usize> {
        if let Some(owner) = self.helper_owner(&method.owner) {
            return Ok(helpers::arg_count(owner, method));
        }
        match self.resolve(&method.owner, &method.name, method.arity) {
            Some((ty, index)) => Ok(ty.methods[index].arg_count()),
            // Implicit parameterless constructor
            None if method.name == CTOR => Ok(method.arity as usize + 1),
            None => Err(unknown_method(method)),
        }
    }

    /// Call `method` with `args` (`this` first for instance methods);
    /// `None` for void methods
    pub(crate) fn call(
        &mut self,
        method: &MethodRef,
        args: Vec<Value>,
        virtual_call: bool,
    ) -> RuntimeResult<Option<Value>> {
        if let Some(owner) = self.helper_owner(&method.owner) {
            return helpers::call(self, owner, method, args);
        }

        let receiver = match (virtual_call, args.first()) {
            (true, Some(Value::Object(o))) => Some(o.borrow().class.clone()),
            _ => None,
        };
        let found = receiver
            .and_then(|class| self.resolve(&class, &method.name, method.arity))
            .or_else(|| self.resolve(&method.owner, &method.name, method.arity));
        let Some((ty, index)) = found else {
            if method.name == CTOR && method.arity == 0 {
                return self.implicit_ctor(&method.owner, args);
            }
            return Err(unknown_method(method));
        };

        let def = &ty.methods[index];
        if def.is_static {
            self.ensure_init(&ty.name)?;
        }
        let returns = !def.ret.is_void();
        *self.calls.entry(format!("{}::{}", ty.name, def.name)).or_default() += 1;
        trace!(method = %method, "call");
        let result = self.execute(&ty, index, args)?;
        Ok(returns.then_some(result))
    }

    /// Parameterless constructor a type does not declare: chains to the
    /// helper root of its hierarchy, if any
    fn implicit_ctor(&mut self, owner: &str, args: Vec<Value>) -> RuntimeResult<Option<Value>> {
        let root = self
            .lineage(owner)
            .last()
            .and_then(|t| t.base.clone())
            .or_else(|| self.types.get(owner).is_none().then(|| owner.to_string()));
        match root {
            Some(root) if self.helper_owner(&root).is_some() => {
                let ctor = MethodRef::new(root, CTOR, 0);
                self.call(&ctor, args, false)
            }
            _ => Ok(None),
        }
    }

    /// `newobj`: allocate and run the constructor
    pub(crate) fn new_object(&mut self, ctor: &MethodRef, args: Vec<Value>) -> RuntimeResult<Value> {
        if let Some(owner) = self.helper_owner(&ctor.owner) {
            return helpers::construct(self, owner, ctor, args);
        }
        self.ensure_init(&ctor.owner)?;
        let object = Value::Object(self.instantiate(&ctor.owner)?);
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(object.clone());
        full.extend(args);
        self.call(ctor, full, false)?;
        Ok(object)
    }

    // ========================================================================
    // Objects and statics
    // ========================================================================

    /// Types from `class` up its base chain, module types only
    fn lineage(&self, class: &str) -> Vec<Rc<TypeDef>> {
        let mut out: Vec<Rc<TypeDef>> = Vec::new();
        let mut next = self.types.get(class).cloned();
        while let Some(ty) = next {
            if out.iter().any(|t| t.name == ty.name) {
                break;
            }
            next = ty.base.as_deref().and_then(|b| self.types.get(b)).cloned();
            out.push(ty);
        }
        out
    }

    /// Fresh object of `class` with every instance field at its default
    pub(crate) fn instantiate(&mut self, class: &str) -> RuntimeResult<ObjRef> {
        let lineage = self.lineage(class);
        let first = lineage
            .first()
            .ok_or_else(|| RuntimeError::UnknownType(class.to_string()))?;
        let is_record = first.kind == TypeKind::Struct;

        let mut fields = FxHashMap::default();
        for ty in &lineage {
            for field in ty.fields.iter().filter(|f| !f.is_static) {
                let value = self.default_value(&field.ty)?;
                fields.entry(field.name.clone()).or_insert(value);
            }
        }
        // Helper types may be declared in the module as stubs
        let chain = lineage
            .iter()
            .map(|t| t.name.as_str())
            .chain(lineage.last().and_then(|t| t.base.as_deref()));
        for name in chain {
            match self.helper_owner(name) {
                Some(HelperOwner::CoreObject) => {
                    fields.insert(NATIVE_OBJECT_FIELD.to_string(), Value::Ptr(0));
                }
                Some(HelperOwner::Library(HelperType::DelegateBase)) => {
                    fields.insert(NATIVE_DELEGATE_FIELD.to_string(), Value::Ptr(0));
                }
                _ => {}
            }
        }
        Ok(Rc::new(RefCell::new(Object {
            class: class.to_string(),
            is_record,
            fields,
        })))
    }

    fn default_value(&mut self, sig: &TypeSig) -> RuntimeResult<Value> {
        Ok(match sig {
            TypeSig::Bool => Value::Bool(false),
            TypeSig::F32 | TypeSig::F64 => Value::Float(0.0),
            TypeSig::IntPtr => Value::Ptr(0),
            TypeSig::Struct(name) if self.types.get(name).is_some_and(|t| t.kind == TypeKind::Struct) => {
                Value::Object(self.instantiate(name)?)
            }
            TypeSig::Enum(_) => Value::Int(0),
            sig if sig.native_kind().is_some() => Value::Int(0),
            _ => Value::Null,
        })
    }

    fn static_value(&self, owner: &str, field: &str) -> Value {
        self.statics
            .get(&(owner.to_string(), field.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn set_static(&mut self, owner: &str, field: &str, value: Value) {
        self.statics.insert((owner.to_string(), field.to_string()), value);
    }

    /// Run the static initializer of `name` (and its bases) once
    pub(crate) fn ensure_init(&mut self, name: &str) -> RuntimeResult<()> {
        if self.initialized.contains(name) {
            return Ok(());
        }
        let Some(ty) = self.types.get(name).cloned() else {
            return Ok(());
        };
        self.initialized.insert(name.to_string());
        for field in ty.fields.iter().filter(|f| f.is_static) {
            let value = self.default_value(&field.ty)?;
            self.statics
                .entry((ty.name.clone(), field.name.clone()))
                .or_insert(value);
        }
        if let Some(base) = &ty.base {
            self.ensure_init(base)?;
        }
        if let Some(index) = ty.methods.iter().position(|m| m.is_static_initializer()) {
            debug!(type_name = %name, "running static initializer");
            self.execute(&ty, index, Vec::new())?;
        }
        Ok(())
    }

    /// Nearest native type descriptor along `class`'s base chain
    pub(crate) fn native_class_of(&mut self, class: &str) -> RuntimeResult<u64> {
        for ty in self.lineage(class) {
            if ty.field(NATIVE_CLASS_PTR).is_some() {
                self.ensure_init(&ty.name)?;
                let ptr = self.static_value(&ty.name, NATIVE_CLASS_PTR).as_ptr()?;
                if ptr != 0 {
                    return Ok(ptr);
                }
            }
        }
        Err(RuntimeError::UnknownNativeType(class.to_string()))
    }

    /// Bind `object` to native object `native`
    pub(crate) fn bind_native(&mut self, object: &ObjRef, native: u64) {
        object
            .borrow_mut()
            .fields
            .insert(NATIVE_OBJECT_FIELD.to_string(), Value::Ptr(native));
        if native != 0 {
            self.wrappers.insert(native, object.clone());
        }
    }

    fn string(&self, index: u32) -> RuntimeResult<Value> {
        self.strings
            .get(index as usize)
            .map(|s| Value::Str(s.clone()))
            .ok_or_else(|| RuntimeError::mismatch("string constant", index))
    }
}

fn unknown_method(method: &MethodRef) -> RuntimeError {
    RuntimeError::UnknownMethod {
        owner: method.owner.clone(),
        name: method.name.clone(),
        arity: method.arity,
    }
}

//! Type-level static initializer builder
//!
//! Collects the one-time lookups of a type (native type descriptor, member
//! offsets, property descriptors, function descriptors and buffer sizes)
//! and installs them at the top of the type's static initializer.
//!
//! The builder is append-only and keyed by target field: asking twice for
//! the same slot emits nothing the second time, and nothing already emitted
//! is ever reordered. The native type descriptor is always the first step,
//! since every other lookup is keyed off it.

use rustc_hash::FxHashSet;
use stitch_bytecode::{FieldRef, Instr, MethodBody, MethodDef, TypeDef, TypeSig};
use stitch_sdk::helpers::{
    CCTOR, GET_BOOL_PROPERTY_FIELD_MASK, GET_NATIVE_DELEGATE_SIGNATURE, GET_NATIVE_FUNCTION,
    GET_NATIVE_FUNCTION_PARAMS_SIZE, GET_NATIVE_PROPERTY, GET_NATIVE_STRUCT_SIZE, GET_NATIVE_TYPE,
    GET_PROPERTY_OFFSET, GET_PROPERTY_OFFSET_FROM_NAME,
};

use crate::emit::StringTable;
use crate::error::{WeaveError, WeaveResult};
use crate::helpers::HelperLibrary;
use crate::naming;
use crate::strategy::MemberSlots;

/// Pending static initializer of one type
#[derive(Debug, Clone)]
pub struct StaticInit {
    owner: String,
    assigned: FxHashSet<String>,
    instrs: Vec<Instr>,
}

impl StaticInit {
    /// Empty initializer for `owner`
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            assigned: FxHashSet::default(),
            instrs: Vec::new(),
        }
    }

    /// Owning type
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Instructions collected so far
    pub fn instrs(&self) -> &[Instr] {
        &self.instrs
    }

    /// Mutable access for the unit's final string commit
    pub fn instrs_mut(&mut self) -> &mut Vec<Instr> {
        &mut self.instrs
    }

    /// Whether nothing was collected
    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// Whether `field` is already assigned by this initializer
    pub fn assigns(&self, field: &str) -> bool {
        self.assigned.contains(field)
    }

    fn field(&self, name: &str) -> FieldRef {
        FieldRef::new(self.owner.as_str(), name)
    }

    fn claim(&mut self, field: &str) -> bool {
        self.assigned.insert(field.to_string())
    }

    fn require_root(&self, root: &FieldRef) -> WeaveResult<()> {
        if root.owner == self.owner && !self.assigns(&root.name) {
            return Err(WeaveError::invariant(
                &self.owner,
                format!("{} is used before it is resolved", root.name),
            ));
        }
        Ok(())
    }

    /// `NativeClassPtr = TypeRegistry.GetNativeType("<native>")`
    pub fn native_class(
        &mut self,
        strings: &mut StringTable,
        helpers: &HelperLibrary,
        native_name: &str,
    ) -> WeaveResult<FieldRef> {
        let target = self.field(naming::NATIVE_CLASS_PTR);
        if self.claim(naming::NATIVE_CLASS_PTR) {
            if !self.instrs.is_empty() {
                return Err(WeaveError::invariant(
                    &self.owner,
                    "native type descriptor must be the first lookup",
                ));
            }
            self.instrs.push(Instr::ConstStr(strings.intern(native_name)));
            self.instrs.push(Instr::Call(helpers.type_registry(GET_NATIVE_TYPE, 1)?));
            self.instrs.push(Instr::StoreStatic(target.clone()));
        }
        Ok(target)
    }

    /// `NativeDataSize = TypeRegistry.GetNativeStructSize(NativeClassPtr)`
    pub fn record_size(&mut self, helpers: &HelperLibrary, class_ptr: &FieldRef) -> WeaveResult<FieldRef> {
        self.require_root(class_ptr)?;
        let target = self.field(naming::NATIVE_DATA_SIZE);
        if self.claim(naming::NATIVE_DATA_SIZE) {
            self.instrs.push(Instr::LoadStatic(class_ptr.clone()));
            self.instrs.push(Instr::Call(helpers.type_registry(GET_NATIVE_STRUCT_SIZE, 1)?));
            self.instrs.push(Instr::StoreStatic(target.clone()));
        }
        Ok(target)
    }

    /// Resolve a native function and its parameter buffer size
    ///
    /// Returns the `F_NativeFunction` and `F_ParamsSize` fields.
    pub fn native_function(
        &mut self,
        strings: &mut StringTable,
        helpers: &HelperLibrary,
        class_ptr: &FieldRef,
        function: &str,
        native_name: &str,
    ) -> WeaveResult<(FieldRef, FieldRef)> {
        self.require_root(class_ptr)?;
        let function_field = naming::native_function(function);
        if self.claim(&function_field) {
            self.instrs.push(Instr::LoadStatic(class_ptr.clone()));
            self.instrs.push(Instr::ConstStr(strings.intern(native_name)));
            self.instrs.push(Instr::Call(helpers.function_registry(GET_NATIVE_FUNCTION, 2)?));
            self.instrs.push(Instr::StoreStatic(self.field(&function_field)));
        }
        let native = self.field(&function_field);
        let size = self.params_size(helpers, function, &native)?;
        Ok((native, size))
    }

    /// Resolve a callable signature's descriptor in place of a function
    /// (`Invoke_NativeFunction`, `Invoke_ParamsSize`)
    pub fn delegate_signature(
        &mut self,
        strings: &mut StringTable,
        helpers: &HelperLibrary,
        native_name: &str,
    ) -> WeaveResult<(FieldRef, FieldRef)> {
        let function_field = naming::native_function(naming::INVOKE);
        if self.claim(&function_field) {
            if !self.instrs.is_empty() {
                return Err(WeaveError::invariant(
                    &self.owner,
                    "signature descriptor must be the first lookup",
                ));
            }
            // Functions of a signature are keyed off the signature itself
            self.assigned.insert(naming::NATIVE_CLASS_PTR.to_string());
            self.instrs.push(Instr::ConstStr(strings.intern(native_name)));
            self.instrs
                .push(Instr::Call(helpers.type_registry(GET_NATIVE_DELEGATE_SIGNATURE, 1)?));
            self.instrs.push(Instr::StoreStatic(self.field(&function_field)));
        }
        let native = self.field(&function_field);
        let size = self.params_size(helpers, naming::INVOKE, &native)?;
        Ok((native, size))
    }

    fn params_size(&mut self, helpers: &HelperLibrary, function: &str, native: &FieldRef) -> WeaveResult<FieldRef> {
        let size_field = naming::params_size(function);
        if self.claim(&size_field) {
            self.instrs.push(Instr::LoadStatic(native.clone()));
            self.instrs
                .push(Instr::Call(helpers.function_registry(GET_NATIVE_FUNCTION_PARAMS_SIZE, 1)?));
            self.instrs.push(Instr::StoreStatic(self.field(&size_field)));
        }
        Ok(self.field(&size_field))
    }

    /// Resolve a member's offset, and its property descriptor and bit mask
    /// when the slots carry them
    ///
    /// `root` is the descriptor the member belongs to: the native type for
    /// properties and record fields, the native function for parameters.
    pub fn member(
        &mut self,
        strings: &mut StringTable,
        helpers: &HelperLibrary,
        root: &FieldRef,
        native_name: &str,
        slots: &MemberSlots,
    ) -> WeaveResult<()> {
        self.require_root(root)?;
        if self.assigns(&slots.offset.name) {
            return Ok(());
        }

        match &slots.native_property {
            Some(property) => {
                self.claim(&property.name);
                self.instrs.push(Instr::LoadStatic(root.clone()));
                self.instrs.push(Instr::ConstStr(strings.intern(native_name)));
                self.instrs.push(Instr::Call(helpers.property_registry(GET_NATIVE_PROPERTY, 2)?));
                self.instrs.push(Instr::StoreStatic(property.clone()));

                self.claim(&slots.offset.name);
                self.instrs.push(Instr::LoadStatic(property.clone()));
                self.instrs.push(Instr::Call(helpers.property_registry(GET_PROPERTY_OFFSET, 1)?));
                self.instrs.push(Instr::StoreStatic(slots.offset.clone()));

                if let Some(mask) = &slots.field_mask {
                    self.claim(&mask.name);
                    self.instrs.push(Instr::LoadStatic(property.clone()));
                    self.instrs
                        .push(Instr::Call(helpers.property_registry(GET_BOOL_PROPERTY_FIELD_MASK, 1)?));
                    self.instrs.push(Instr::StoreStatic(mask.clone()));
                }
            }
            None => {
                self.claim(&slots.offset.name);
                self.instrs.push(Instr::LoadStatic(root.clone()));
                self.instrs.push(Instr::ConstStr(strings.intern(native_name)));
                self.instrs
                    .push(Instr::Call(helpers.property_registry(GET_PROPERTY_OFFSET_FROM_NAME, 2)?));
                self.instrs.push(Instr::StoreStatic(slots.offset.clone()));
            }
        }
        Ok(())
    }

    /// Install the collected lookups as a prologue of the type's static
    /// initializer, creating one if the type has none
    pub fn install(self, ty: &mut TypeDef) {
        if self.instrs.is_empty() {
            return;
        }
        match ty
            .methods
            .iter_mut()
            .find(|m| m.is_static_initializer())
        {
            Some(cctor) => {
                let body = cctor.body.get_or_insert_with(|| MethodBody::new(vec![Instr::Ret]));
                let mut instrs = self.instrs;
                instrs.append(&mut body.instrs);
                body.instrs = instrs;
            }
            None => {
                let mut instrs = self.instrs;
                instrs.push(Instr::Ret);
                let mut cctor = MethodDef::new(CCTOR, Vec::new(), TypeSig::Void).with_body(MethodBody::new(instrs));
                cctor.is_static = true;
                cctor.is_private = true;
                ty.methods.push(cctor);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WeaveConfig;
    use stitch_bytecode::{ConstantPool, TypeKind};

    fn slots(owner: &str, member: &str, with_property: bool) -> MemberSlots {
        MemberSlots {
            member: member.into(),
            offset: FieldRef::new(owner, naming::offset(member)),
            native_property: with_property.then(|| FieldRef::new(owner, naming::native_property(member))),
            field_mask: None,
            marshaller: None,
        }
    }

    #[test]
    fn test_repeated_requests_emit_once() {
        let helpers = HelperLibrary::standard(&WeaveConfig::default());
        let mut strings = StringTable::new(&ConstantPool::new());
        let mut init = StaticInit::new("Game.Actor");

        let root = init.native_class(&mut strings, &helpers, "Actor").unwrap();
        init.member(&mut strings, &helpers, &root, "Health", &slots("Game.Actor", "Health", false))
            .unwrap();
        let len = init.instrs().len();

        init.native_class(&mut strings, &helpers, "Actor").unwrap();
        init.member(&mut strings, &helpers, &root, "Health", &slots("Game.Actor", "Health", false))
            .unwrap();
        assert_eq!(init.instrs().len(), len);
    }

    #[test]
    fn test_member_before_root_is_rejected() {
        let helpers = HelperLibrary::standard(&WeaveConfig::default());
        let mut strings = StringTable::new(&ConstantPool::new());
        let mut init = StaticInit::new("Game.Actor");
        let root = FieldRef::new("Game.Actor", naming::NATIVE_CLASS_PTR);
        let err = init
            .member(&mut strings, &helpers, &root, "Health", &slots("Game.Actor", "Health", false))
            .unwrap_err();
        assert_eq!(err.category, crate::error::ErrorCategory::InvariantViolation);
    }

    #[test]
    fn test_property_descriptor_precedes_offset() {
        let helpers = HelperLibrary::standard(&WeaveConfig::default());
        let mut strings = StringTable::new(&ConstantPool::new());
        let mut init = StaticInit::new("Game.Actor");
        let root = init.native_class(&mut strings, &helpers, "Actor").unwrap();
        init.member(&mut strings, &helpers, &root, "Items", &slots("Game.Actor", "Items", true))
            .unwrap();

        let stores: Vec<_> = init
            .instrs()
            .iter()
            .filter_map(|i| match i {
                Instr::StoreStatic(f) => Some(f.name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(stores, ["NativeClassPtr", "Items_NativeProperty", "Items_Offset"]);
    }

    #[test]
    fn test_install_prepends_to_existing_initializer() {
        let helpers = HelperLibrary::standard(&WeaveConfig::default());
        let mut strings = StringTable::new(&ConstantPool::new());
        let mut ty = TypeDef::new("Game.Actor", TypeKind::Class);
        let mut cctor = MethodDef::new(CCTOR, vec![], TypeSig::Void)
            .with_body(MethodBody::new(vec![Instr::Nop, Instr::Ret]));
        cctor.is_static = true;
        ty.methods.push(cctor);

        let mut init = StaticInit::new("Game.Actor");
        init.native_class(&mut strings, &helpers, "Actor").unwrap();
        init.install(&mut ty);

        let body = ty.static_initializer().unwrap().body.as_ref().unwrap();
        assert!(matches!(body.instrs[0], Instr::ConstStr(_)));
        assert_eq!(&body.instrs[body.instrs.len() - 2..], &[Instr::Nop, Instr::Ret]);
    }
}

//! Type-kind strategies
//!
//! A strategy decides how values of one managed type move between a native
//! buffer and the managed world. Strategies are resolved once per
//! (type, usage) pair and shared: resolution picks the [`MarshalKind`] and
//! looks up every helper method the kind will call, so emission never fails
//! on a missing helper.
//!
//! Emission takes the buffer address and the managed value as instruction
//! sequences supplied by the caller ([`Push`]), which lets the same strategy
//! serve property accessors, function parameter buffers and record fields.

mod container;
mod delegate;
mod primitive;
mod record;
mod reference;
mod text;

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use stitch_bytecode::{FieldRef, Instr, MethodRef, TypeKind, TypeSig};
use stitch_sdk::NativeKind;

use crate::emit::{Emitter, Push};
use crate::error::{WeaveError, WeaveResult};
use crate::helpers::HelperLibrary;
use crate::index::TypeIndex;

pub use container::ContainerOps;

/// Where a strategy's values live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Usage {
    /// Property of a native-backed object; composite marshallers are cached
    /// per instance and alias native storage
    Instance,
    /// Function parameter, return value, record field or delegate parameter;
    /// composite marshallers are cached statically and copy
    Static,
    /// Element of a container; marshaled through a static converter pair
    Element,
}

/// Marshaling taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MarshalKind {
    /// Primitive read and written in place
    Blittable(NativeKind),
    /// One-byte boolean
    Bool,
    /// Boolean packed into one bit of a shared byte
    BitfieldBool,
    /// Native string, heap allocated
    String,
    /// Native localized text, heap allocated
    Text,
    /// Native interned name
    Name,
    /// Enumeration stored as its underlying integer
    Enum(NativeKind),
    /// Record whose managed layout equals its native layout
    BlittableRecord(String),
    /// Record copied field by field
    MirrorRecord(String),
    /// Inline fixed-size array
    FixedArray(u32),
    /// Dynamic array
    Array,
    /// Map
    Map,
    /// Set
    Set,
    /// Optional value
    Optional,
    /// Native object handle
    Object(String),
    /// Owning object reference
    StrongObject(String),
    /// Weak object reference
    WeakObject(String),
    /// Soft object reference
    SoftObject(String),
    /// Class reference
    ClassRef(String),
    /// Soft class reference
    SoftClassRef(String),
    /// Interface reference, wrapped in a proxy on the managed side
    Interface(String),
    /// Single-cast callable
    SingleDelegate(String),
    /// Multi-cast callable
    MulticastDelegate(String),
    /// Record carried as raw native bytes
    Opaque(String),
}

impl MarshalKind {
    /// Whether values are copied in place with no helper
    pub fn is_blittable(&self) -> bool {
        matches!(self, Self::Blittable(_) | Self::Enum(_) | Self::BlittableRecord(_))
    }

    /// Whether the kind needs a per-member marshaller object
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Self::FixedArray(_) | Self::Array | Self::Map | Self::Set | Self::Optional
        )
    }
}

impl fmt::Display for MarshalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blittable(k) => write!(f, "blittable {}", k),
            Self::Enum(k) => write!(f, "enum {}", k),
            Self::FixedArray(n) => write!(f, "fixed array [{}]", n),
            other => write!(f, "{:?}", other),
        }
    }
}

/// A pair of static converters `FromNative(addr)` / `ToNative(addr, value)`,
/// plus the cleanup some kinds need
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converter {
    /// Native to managed
    pub from_native: MethodRef,
    /// Managed to native
    pub to_native: MethodRef,
    /// Release native storage written by `to_native`
    pub destruct: Option<MethodRef>,
}

/// Generated fields a member's marshaling code reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberSlots {
    /// Member name the slots were allocated for
    pub member: String,
    /// Byte offset within the owning layout
    pub offset: FieldRef,
    /// Native property descriptor
    pub native_property: Option<FieldRef>,
    /// Bit mask of a packed boolean
    pub field_mask: Option<FieldRef>,
    /// Cached marshaller object of a container
    pub marshaller: Option<FieldRef>,
}

impl MemberSlots {
    fn require<'a>(&self, slot: &'a Option<FieldRef>, what: &str) -> WeaveResult<&'a FieldRef> {
        slot.as_ref().ok_or_else(|| {
            WeaveError::invariant(&self.offset.owner, format!("{} slot was not allocated", what))
                .with_member(&self.member)
        })
    }
}

/// A resolved strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strategy {
    /// Managed type
    pub sig: TypeSig,
    /// Usage context
    pub usage: Usage,
    /// Kind
    pub kind: MarshalKind,
    /// Direct converter of helper-backed kinds
    pub converter: Option<Converter>,
    /// Marshaller object operations of container kinds
    pub container: Option<ContainerOps>,
    /// Element strategies of container kinds, in constructor order
    pub elements: Vec<Arc<Strategy>>,
}

impl Strategy {
    /// Whether the host must hand out the member's property descriptor
    pub fn needs_native_property(&self) -> bool {
        self.kind.is_container() || matches!(self.kind, MarshalKind::BitfieldBool | MarshalKind::Opaque(_))
    }

    /// Whether a value marshaled to native must be released afterwards
    pub fn needs_cleanup(&self) -> bool {
        matches!(self.kind, MarshalKind::String | MarshalKind::Text) || self.kind.is_container()
    }

    /// Whether the member carries a bit mask
    pub fn is_bitfield(&self) -> bool {
        self.kind == MarshalKind::BitfieldBool
    }

    /// Managed type of the member's marshaller field
    pub fn marshaller_type(&self) -> Option<&str> {
        self.container.as_ref().map(|c| c.marshaller_type.as_str())
    }

    /// Static converter pair used when this strategy is a container element
    pub fn element_converter(&self) -> Option<&Converter> {
        if self.usage == Usage::Element {
            self.converter.as_ref()
        } else {
            None
        }
    }

    // ========================================================================
    // Emission
    // ========================================================================

    /// Push the managed value read from `addr`
    pub fn emit_from_native(&self, em: &mut Emitter<'_>, slots: &MemberSlots, addr: Push<'_>) -> WeaveResult<()> {
        match &self.kind {
            MarshalKind::Blittable(k) | MarshalKind::Enum(k) => primitive::load(em, *k, addr),
            MarshalKind::Bool => primitive::load(em, NativeKind::Bool, addr),
            MarshalKind::BitfieldBool => {
                let mask = slots.require(&slots.field_mask, "field mask")?;
                primitive::bitfield_load(em, self.direct()?, mask, addr)
            }
            MarshalKind::BlittableRecord(record) | MarshalKind::MirrorRecord(record) => {
                record::construct(em, record, addr)
            }
            MarshalKind::Opaque(_) => {
                let property = slots.require(&slots.native_property, "native property")?;
                record::opaque_load(em, self.direct()?, property, addr)
            }
            kind if kind.is_container() => {
                container::push_marshaller(em, self, slots)?;
                addr(em);
                em.emit(Instr::CallVirt(self.container_ops()?.from_native.clone()));
            }
            _ => call_from(em, self.direct()?, addr),
        }
        Ok(())
    }

    /// Write the managed value pushed by `value` to `addr`
    pub fn emit_to_native(
        &self,
        em: &mut Emitter<'_>,
        slots: &MemberSlots,
        addr: Push<'_>,
        value: Push<'_>,
    ) -> WeaveResult<()> {
        match &self.kind {
            MarshalKind::Blittable(k) | MarshalKind::Enum(k) => primitive::store(em, *k, addr, value),
            MarshalKind::Bool => primitive::store(em, NativeKind::Bool, addr, value),
            MarshalKind::BitfieldBool => {
                let mask = slots.require(&slots.field_mask, "field mask")?;
                primitive::bitfield_store(em, self.direct()?, mask, addr, value)
            }
            MarshalKind::BlittableRecord(record) | MarshalKind::MirrorRecord(record) => {
                record::copy_out(em, record, addr, value)
            }
            MarshalKind::Opaque(_) => {
                let property = slots.require(&slots.native_property, "native property")?;
                record::opaque_store(em, self.direct()?, property, addr, value)
            }
            kind if kind.is_container() => {
                container::push_marshaller(em, self, slots)?;
                addr(em);
                value(em);
                em.emit(Instr::CallVirt(self.container_ops()?.to_native.clone()));
            }
            _ => call_to(em, self.direct()?, addr, value),
        }
        Ok(())
    }

    /// Release native storage at `addr`; no-op for kinds without cleanup
    pub fn emit_destruct(&self, em: &mut Emitter<'_>, slots: &MemberSlots, addr: Push<'_>) -> WeaveResult<()> {
        if self.kind.is_container() {
            container::push_marshaller(em, self, slots)?;
            addr(em);
            em.emit(Instr::CallVirt(self.container_ops()?.destruct.clone()));
        } else if let Some(destruct) = self.converter.as_ref().and_then(|c| c.destruct.clone()) {
            addr(em);
            em.call(destruct);
        }
        Ok(())
    }

    /// Push the value stored at `buffer + offset`
    pub fn emit_load(&self, em: &mut Emitter<'_>, slots: &MemberSlots, buffer: Push<'_>) -> WeaveResult<()> {
        let addr = member_address(buffer, &slots.offset);
        self.emit_from_native(em, slots, &addr)
    }

    /// Store `value` at `buffer + offset`
    pub fn emit_store(
        &self,
        em: &mut Emitter<'_>,
        slots: &MemberSlots,
        buffer: Push<'_>,
        value: Push<'_>,
    ) -> WeaveResult<()> {
        let addr = member_address(buffer, &slots.offset);
        self.emit_to_native(em, slots, &addr, value)
    }

    /// Release the native storage at `buffer + offset`
    pub fn emit_cleanup(&self, em: &mut Emitter<'_>, slots: &MemberSlots, buffer: Push<'_>) -> WeaveResult<()> {
        let addr = member_address(buffer, &slots.offset);
        self.emit_destruct(em, slots, &addr)
    }

    /// Property getter body reading from `buffer`
    pub fn emit_getter(&self, em: &mut Emitter<'_>, slots: &MemberSlots, buffer: Push<'_>) -> WeaveResult<()> {
        self.emit_load(em, slots, buffer)?;
        em.emit(Instr::Ret);
        Ok(())
    }

    /// Property setter body writing argument 1 to `buffer`
    pub fn emit_setter(&self, em: &mut Emitter<'_>, slots: &MemberSlots, buffer: Push<'_>) -> WeaveResult<()> {
        self.emit_store(em, slots, buffer, &|em: &mut Emitter<'_>| {
            em.emit(Instr::LoadArg(1));
        })?;
        em.emit(Instr::Ret);
        Ok(())
    }

    fn direct(&self) -> WeaveResult<&Converter> {
        self.converter.as_ref().ok_or_else(|| {
            WeaveError::invariant(&self.sig.to_string(), format!("{} has no converter", self.kind))
        })
    }

    fn container_ops(&self) -> WeaveResult<&ContainerOps> {
        self.container.as_ref().ok_or_else(|| {
            WeaveError::invariant(&self.sig.to_string(), format!("{} has no marshaller", self.kind))
        })
    }
}

/// `buffer; ldsfld offset; ptradd`
pub fn member_address<'a>(buffer: Push<'a>, offset: &'a FieldRef) -> impl Fn(&mut Emitter<'_>) + 'a {
    move |em: &mut Emitter<'_>| {
        buffer(em);
        em.load_static(offset);
        em.emit(Instr::PtrAdd);
    }
}

fn call_from(em: &mut Emitter<'_>, conv: &Converter, addr: Push<'_>) {
    addr(em);
    em.call(conv.from_native.clone());
}

fn call_to(em: &mut Emitter<'_>, conv: &Converter, addr: Push<'_>, value: Push<'_>) {
    addr(em);
    value(em);
    em.call(conv.to_native.clone());
}

// ============================================================================
// Resolution
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StrategyKey {
    sig: TypeSig,
    usage: Usage,
    bitfield: bool,
}

/// Strategies shared by every unit of a weave
#[derive(Debug, Default)]
pub struct StrategyCache {
    map: Mutex<FxHashMap<StrategyKey, Arc<Strategy>>>,
}

impl StrategyCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct strategies resolved so far
    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    /// Whether nothing was resolved yet
    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }
}

/// Resolves strategies against one weave's index and helper library
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    /// Declared types
    pub index: &'a TypeIndex,
    /// Helper library
    pub helpers: &'a HelperLibrary,
    /// Shared cache
    pub cache: &'a StrategyCache,
}

impl<'a> Resolver<'a> {
    /// Create a resolver
    pub fn new(index: &'a TypeIndex, helpers: &'a HelperLibrary, cache: &'a StrategyCache) -> Self {
        Self { index, helpers, cache }
    }

    /// Strategy of a member declared `sig`, used as `usage`
    ///
    /// `bitfield` selects the packed-boolean strategy for `Bool` members.
    pub fn resolve(&self, sig: &TypeSig, usage: Usage, bitfield: bool) -> WeaveResult<Arc<Strategy>> {
        let key = StrategyKey {
            sig: sig.clone(),
            usage,
            bitfield: bitfield && *sig == TypeSig::Bool,
        };
        if let Some(found) = self.cache.map.lock().get(&key) {
            return Ok(found.clone());
        }

        let strategy = Arc::new(self.prepare(&key)?);
        Ok(self.cache.map.lock().entry(key).or_insert(strategy).clone())
    }

    fn prepare(&self, key: &StrategyKey) -> WeaveResult<Strategy> {
        let sig = &key.sig;
        let usage = key.usage;
        let kind = self.classify(sig, key.bitfield)?;

        if usage == Usage::Element {
            let converter = self.element_converter(sig, &kind)?;
            return Ok(Strategy {
                sig: sig.clone(),
                usage,
                kind,
                converter: Some(converter),
                container: None,
                elements: Vec::new(),
            });
        }

        let mut strategy = Strategy {
            sig: sig.clone(),
            usage,
            kind: kind.clone(),
            converter: None,
            container: None,
            elements: Vec::new(),
        };
        match &kind {
            MarshalKind::Blittable(_)
            | MarshalKind::Enum(_)
            | MarshalKind::Bool
            | MarshalKind::BlittableRecord(_)
            | MarshalKind::MirrorRecord(_) => {}
            MarshalKind::BitfieldBool => {
                strategy.converter = Some(primitive::bitfield_converter(self.helpers)?);
            }
            MarshalKind::String | MarshalKind::Text | MarshalKind::Name => {
                strategy.converter = Some(text::converter(self.helpers, &kind)?);
            }
            MarshalKind::Opaque(_) => {
                strategy.converter = Some(record::opaque_converter(self.helpers)?);
            }
            MarshalKind::SingleDelegate(target) | MarshalKind::MulticastDelegate(target) => {
                let multicast = matches!(kind, MarshalKind::MulticastDelegate(_));
                strategy.converter = Some(delegate::converter(self.helpers, multicast, target)?);
            }
            k if k.is_container() => {
                for element in sig.elements() {
                    strategy.elements.push(self.resolve(element, Usage::Element, false)?);
                }
                strategy.container = Some(container::ops(self.helpers, &kind, usage)?);
            }
            _ => {
                strategy.converter = Some(reference::converter(self.helpers, &kind)?);
            }
        }
        Ok(strategy)
    }

    fn classify(&self, sig: &TypeSig, bitfield: bool) -> WeaveResult<MarshalKind> {
        let unsupported = |msg: &str| WeaveError::unsupported(&sig.to_string(), msg);
        Ok(match sig {
            TypeSig::Void => return Err(unsupported("void has no native representation")),
            TypeSig::Bool if bitfield => MarshalKind::BitfieldBool,
            TypeSig::Bool => MarshalKind::Bool,
            TypeSig::String => MarshalKind::String,
            TypeSig::Text => MarshalKind::Text,
            TypeSig::Name => MarshalKind::Name,
            TypeSig::Struct(name) => {
                let info = self.lookup(name, TypeKind::Struct)?;
                if info.opaque {
                    MarshalKind::Opaque(name.clone())
                } else if !info.exposed {
                    return Err(unsupported("record is not exposed"));
                } else if info.blittable {
                    MarshalKind::BlittableRecord(name.clone())
                } else {
                    MarshalKind::MirrorRecord(name.clone())
                }
            }
            TypeSig::Enum(name) => {
                let info = self.lookup(name, TypeKind::Enum)?;
                match info.underlying {
                    Some(k) if k.is_integral() => MarshalKind::Enum(k),
                    _ => return Err(unsupported("enum has no integral underlying type")),
                }
            }
            TypeSig::Delegate(name) => {
                let info = self.lookup(name, TypeKind::Delegate)?;
                if info.multicast {
                    MarshalKind::MulticastDelegate(name.clone())
                } else {
                    MarshalKind::SingleDelegate(name.clone())
                }
            }
            TypeSig::Object(name) => MarshalKind::Object(name.clone()),
            TypeSig::StrongRef(name) => MarshalKind::StrongObject(name.clone()),
            TypeSig::WeakRef(name) => MarshalKind::WeakObject(name.clone()),
            TypeSig::SoftRef(name) => MarshalKind::SoftObject(name.clone()),
            TypeSig::ClassRef(name) => MarshalKind::ClassRef(name.clone()),
            TypeSig::SoftClassRef(name) => MarshalKind::SoftClassRef(name.clone()),
            TypeSig::Interface(name) => MarshalKind::Interface(name.clone()),
            TypeSig::Array(_) => MarshalKind::Array,
            TypeSig::FixedArray(_, len) => MarshalKind::FixedArray(*len),
            TypeSig::Map(_, _) => MarshalKind::Map,
            TypeSig::Set(_) => MarshalKind::Set,
            TypeSig::Optional(_) => MarshalKind::Optional,
            primitive => match primitive.native_kind() {
                Some(k) => MarshalKind::Blittable(k),
                None => return Err(unsupported("no strategy for this type")),
            },
        })
    }

    fn lookup(&self, name: &str, kind: TypeKind) -> WeaveResult<&'a crate::index::TypeInfo> {
        match self.index.get(name) {
            Some(info) if info.kind == kind => Ok(info),
            Some(info) => Err(WeaveError::metadata(
                name,
                format!("declared as {} but used as {}", info.kind.keyword(), kind.keyword()),
            )),
            None => Err(WeaveError::metadata(name, format!("{} is not known", kind.keyword()))),
        }
    }

    fn element_converter(&self, sig: &TypeSig, kind: &MarshalKind) -> WeaveResult<Converter> {
        match kind {
            MarshalKind::Blittable(k) | MarshalKind::Enum(k) => primitive::element_converter(self.helpers, *k),
            MarshalKind::Bool => primitive::bool_converter(self.helpers),
            MarshalKind::String | MarshalKind::Text | MarshalKind::Name => text::converter(self.helpers, kind),
            MarshalKind::BlittableRecord(name) => record::blittable_element_converter(self.helpers, name),
            MarshalKind::MirrorRecord(name) => Ok(record::mirror_element_converter(name)),
            MarshalKind::Object(_)
            | MarshalKind::StrongObject(_)
            | MarshalKind::WeakObject(_)
            | MarshalKind::SoftObject(_)
            | MarshalKind::ClassRef(_)
            | MarshalKind::SoftClassRef(_)
            | MarshalKind::Interface(_) => reference::converter(self.helpers, kind),
            other => Err(WeaveError::unsupported(
                &sig.to_string(),
                format!("{} cannot be a container element", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WeaveConfig;
    use crate::emit::StringTable;
    use crate::error::ErrorCategory;
    use stitch_bytecode::{Attribute, ConstantPool, Module, TypeDef};

    fn fixture() -> (TypeIndex, HelperLibrary) {
        let mut module = Module::new("m");
        let mut vec2 = TypeDef::new("Game.Vec2", TypeKind::Struct);
        vec2.attributes.push(Attribute::new(crate::markers::EXPOSED_STRUCT));
        module.types.push(vec2);
        let mut team = TypeDef::new("Game.Team", TypeKind::Enum);
        team.underlying = Some(TypeSig::U8);
        module.types.push(team);
        let helpers = HelperLibrary::standard(&WeaveConfig::default());
        (TypeIndex::build(&module, &helpers).unwrap(), helpers)
    }

    fn slots() -> MemberSlots {
        MemberSlots {
            member: "P".into(),
            offset: FieldRef::new("T", "P_Offset"),
            native_property: Some(FieldRef::new("T", "P_NativeProperty")),
            field_mask: Some(FieldRef::new("T", "P_FieldMask")),
            marshaller: Some(FieldRef::new("T", "P_Marshaller")),
        }
    }

    #[test]
    fn test_classification() {
        let (index, helpers) = fixture();
        let cache = StrategyCache::new();
        let r = Resolver::new(&index, &helpers, &cache);

        let kind = |sig: TypeSig, bitfield| r.resolve(&sig, Usage::Instance, bitfield).unwrap().kind.clone();
        assert_eq!(kind(TypeSig::I32, false), MarshalKind::Blittable(NativeKind::I32));
        assert_eq!(kind(TypeSig::Bool, false), MarshalKind::Bool);
        assert_eq!(kind(TypeSig::Bool, true), MarshalKind::BitfieldBool);
        assert_eq!(kind(TypeSig::Enum("Game.Team".into()), false), MarshalKind::Enum(NativeKind::U8));
        assert_eq!(
            kind(TypeSig::Struct("Game.Vec2".into()), false),
            MarshalKind::MirrorRecord("Game.Vec2".into())
        );
        assert!(kind(TypeSig::Array(Box::new(TypeSig::I32)), false).is_container());
    }

    #[test]
    fn test_strategies_are_shared_per_type_and_usage() {
        let (index, helpers) = fixture();
        let cache = StrategyCache::new();
        let r = Resolver::new(&index, &helpers, &cache);
        let sig = TypeSig::Array(Box::new(TypeSig::String));

        let a = r.resolve(&sig, Usage::Instance, false).unwrap();
        let b = r.resolve(&sig, Usage::Instance, false).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let c = r.resolve(&sig, Usage::Static, false).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(a.marshaller_type(), Some("Host.Interop.ArrayMarshaller"));
        assert_eq!(c.marshaller_type(), Some("Host.Interop.ArrayCopyMarshaller"));
        // array, array-copy, string element
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_nested_container_is_unsupported() {
        let (index, helpers) = fixture();
        let cache = StrategyCache::new();
        let r = Resolver::new(&index, &helpers, &cache);
        let sig = TypeSig::Array(Box::new(TypeSig::Array(Box::new(TypeSig::I32))));
        let err = r.resolve(&sig, Usage::Instance, false).unwrap_err();
        assert_eq!(err.category, ErrorCategory::UnsupportedPattern);
    }

    #[test]
    fn test_unknown_record_is_metadata_error() {
        let (index, helpers) = fixture();
        let cache = StrategyCache::new();
        let r = Resolver::new(&index, &helpers, &cache);
        let err = r
            .resolve(&TypeSig::Struct("Game.Missing".into()), Usage::Static, false)
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_missing_helper_fails_resolution() {
        let (index, _) = fixture();
        let helpers = HelperLibrary::from_module(&Module::new("empty"), &WeaveConfig::default());
        let cache = StrategyCache::new();
        let r = Resolver::new(&index, &helpers, &cache);
        let err = r.resolve(&TypeSig::String, Usage::Static, false).unwrap_err();
        assert!(err.is_fatal());
        assert!(r.resolve(&TypeSig::I64, Usage::Static, false).is_ok());
    }

    #[test]
    fn test_blittable_getter_reads_in_place() {
        let (index, helpers) = fixture();
        let cache = StrategyCache::new();
        let r = Resolver::new(&index, &helpers, &cache);
        let s = r.resolve(&TypeSig::F32, Usage::Instance, false).unwrap();

        let mut strings = StringTable::new(&ConstantPool::new());
        let mut em = Emitter::new(&mut strings);
        s.emit_getter(&mut em, &slots(), &|em: &mut Emitter<'_>| {
            em.emit(Instr::LoadArg(0));
        })
        .unwrap();
        assert_eq!(
            em.instrs(),
            &[
                Instr::LoadArg(0),
                Instr::LoadStatic(FieldRef::new("T", "P_Offset")),
                Instr::PtrAdd,
                Instr::LoadNative(NativeKind::F32),
                Instr::Ret,
            ]
        );
    }

    #[test]
    fn test_string_cleanup_calls_destruct() {
        let (index, helpers) = fixture();
        let cache = StrategyCache::new();
        let r = Resolver::new(&index, &helpers, &cache);
        let s = r.resolve(&TypeSig::String, Usage::Static, false).unwrap();
        assert!(s.needs_cleanup());

        let mut strings = StringTable::new(&ConstantPool::new());
        let mut em = Emitter::new(&mut strings);
        s.emit_cleanup(&mut em, &slots(), &|em: &mut Emitter<'_>| {
            em.emit(Instr::LoadLocal(0));
        })
        .unwrap();
        assert!(matches!(
            em.instrs().last(),
            Some(Instr::Call(m)) if m.name == "DestructInstance"
        ));
    }
}

//! Declared type index
//!
//! A flat table of every type the weave can see: declared types, imported
//! types and the helper roots. Strategies consult it to classify member
//! types; the record pass updates it as record layouts become known.

use rustc_hash::{FxHashMap, FxHashSet};
use stitch_bytecode::{Module, TypeKind, TypeSig};
use stitch_sdk::NativeKind;

use crate::error::{WeaveError, WeaveResult};
use crate::helpers::HelperLibrary;
use crate::markers;

/// Native layout of a blittable record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    /// Size in bytes
    pub size: u32,
    /// Alignment in bytes
    pub align: u32,
}

/// What the weave knows about one type
#[derive(Debug, Clone, PartialEq)]
pub struct TypeInfo {
    /// Qualified name
    pub name: String,
    /// Category
    pub kind: TypeKind,
    /// Base type
    pub base: Option<String>,
    /// Implemented interfaces
    pub interfaces: Vec<String>,
    /// Carries the exposure marker of its kind
    pub exposed: bool,
    /// Owned by another module
    pub imported: bool,
    /// Record carried as raw bytes
    pub opaque: bool,
    /// Multi-cast callable signature
    pub multicast: bool,
    /// Native kind of an enum's underlying type
    pub underlying: Option<NativeKind>,
    /// Whether a record is bit-for-bit compatible with its native layout
    pub blittable: bool,
    /// Layout of a blittable record, when known
    pub layout: Option<RecordLayout>,
}

impl TypeInfo {
    fn new(name: &str, kind: TypeKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            base: None,
            interfaces: Vec::new(),
            exposed: false,
            imported: false,
            opaque: false,
            multicast: false,
            underlying: None,
            blittable: false,
            layout: None,
        }
    }
}

/// Every type visible to the weave
#[derive(Debug, Clone, Default)]
pub struct TypeIndex {
    types: FxHashMap<String, TypeInfo>,
}

impl TypeIndex {
    /// Index a module, its imports and the helper roots
    ///
    /// Two non-record declarations with the same name are a metadata error;
    /// duplicate records are left for the record planner to report.
    pub fn build(module: &Module, helpers: &HelperLibrary) -> WeaveResult<Self> {
        let mut types: FxHashMap<String, TypeInfo> = FxHashMap::default();

        for import in &module.imports {
            let mut info = TypeInfo::new(&import.name, import.kind);
            info.base = import.base.clone();
            info.exposed = true;
            info.imported = true;
            info.blittable = import.blittable;
            info.multicast = import.multicast;
            info.underlying = import.underlying.as_ref().and_then(TypeSig::native_kind);
            types.insert(import.name.clone(), info);
        }

        let mut seen = FxHashSet::default();
        for ty in &module.types {
            if !seen.insert(ty.name.as_str()) && ty.kind != TypeKind::Struct {
                return Err(WeaveError::metadata(&ty.name, "duplicate metadata for type"));
            }
            // First declaration wins; later ones are reported by the record planner
            if types.get(&ty.name).is_some_and(|t| !t.imported) {
                continue;
            }
            let mut info = TypeInfo::new(&ty.name, ty.kind);
            info.base = ty.base.clone();
            info.interfaces = ty.interfaces.clone();
            info.exposed = markers::is_exposed(ty);
            info.opaque = ty.kind == TypeKind::Struct && ty.has_attribute(markers::NATIVE_OPAQUE);
            info.multicast = ty.has_attribute(markers::EXPOSED_MULTICAST_DELEGATE);
            info.underlying = ty.underlying.as_ref().and_then(TypeSig::native_kind);
            types.insert(ty.name.clone(), info);
        }

        // Roots the helper library provides
        let core = helpers.core_object().to_string();
        types.entry(core.clone()).or_insert_with(|| {
            let mut info = TypeInfo::new(&core, TypeKind::Class);
            info.imported = true;
            info
        });
        if let Ok(base) = helpers.delegate_base() {
            types.entry(base.clone()).or_insert_with(|| {
                let mut info = TypeInfo::new(&base, TypeKind::Class);
                info.imported = true;
                info
            });
        }

        Ok(Self { types })
    }

    /// Look a type up
    pub fn get(&self, name: &str) -> Option<&TypeInfo> {
        self.types.get(name)
    }

    /// Number of indexed types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether nothing is indexed
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Record the outcome of a record's layout decision
    pub fn set_record_layout(&mut self, name: &str, layout: Option<RecordLayout>) {
        if let Some(info) = self.types.get_mut(name) {
            info.blittable = layout.is_some();
            info.layout = layout;
        }
    }

    /// Register a type synthesized during the weave
    pub fn insert(&mut self, info: TypeInfo) {
        self.types.insert(info.name.clone(), info);
    }

    /// Whether `name` derives (directly or transitively) from `root`
    ///
    /// A base that is not indexed is a metadata error naming `name`.
    pub fn derives_from(&self, name: &str, root: &str) -> WeaveResult<bool> {
        let mut current = name;
        let mut visited = FxHashSet::default();
        loop {
            if current == root {
                return Ok(true);
            }
            if !visited.insert(current) {
                return Err(WeaveError::invariant(name, "inheritance cycle"));
            }
            let info = self.types.get(current).ok_or_else(|| {
                WeaveError::metadata(name, format!("base type {} is not known", current))
            })?;
            match &info.base {
                Some(base) => current = base,
                None => return Ok(false),
            }
        }
    }

    /// Whether `name` is an interface
    pub fn is_interface(&self, name: &str) -> bool {
        self.types
            .get(name)
            .is_some_and(|t| t.kind == TypeKind::Interface)
    }
}

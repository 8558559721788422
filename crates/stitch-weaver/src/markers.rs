//! Custom markers recognized on types and members

use stitch_bytecode::{Attribute, TypeDef, TypeKind};

/// Class backed by a native object
pub const EXPOSED_CLASS: &str = "ExposedClass";
/// Value record with a native counterpart
pub const EXPOSED_STRUCT: &str = "ExposedStruct";
/// Enumeration shared with the native side
pub const EXPOSED_ENUM: &str = "ExposedEnum";
/// Interface implemented by native objects
pub const EXPOSED_INTERFACE: &str = "ExposedInterface";
/// Single-cast callable signature
pub const EXPOSED_DELEGATE: &str = "ExposedDelegate";
/// Multi-cast callable signature
pub const EXPOSED_MULTICAST_DELEGATE: &str = "ExposedMulticastDelegate";
/// Field or property stored in native memory
pub const EXPOSED_PROPERTY: &str = "ExposedProperty";
/// Method forwarded to a native function
pub const EXPOSED_FUNCTION: &str = "ExposedFunction";
/// Boolean packed into a bit of a shared byte
pub const NATIVE_BITFIELD: &str = "NativeBitfield";
/// Record carried as raw native bytes
pub const NATIVE_OPAQUE: &str = "NativeOpaque";
/// Native name differing from the managed one
pub const NATIVE_NAME: &str = "NativeName";
/// Static method registered in the package's extension table
pub const EXTENSION_METHOD: &str = "ExtensionMethod";

/// `ExposedFunction` argument: event that native code may override
pub const FUNCTION_EVENT: &str = "Event";
/// `ExposedFunction` arguments selecting the replicated invocation
pub const FUNCTION_NET: [&str; 3] = ["NetMulticast", "Server", "Client"];

/// Exposure marker matching a declared type kind
pub fn exposure_marker(kind: TypeKind) -> &'static [&'static str] {
    match kind {
        TypeKind::Class => &[EXPOSED_CLASS],
        TypeKind::Struct => &[EXPOSED_STRUCT],
        TypeKind::Enum => &[EXPOSED_ENUM],
        TypeKind::Interface => &[EXPOSED_INTERFACE],
        TypeKind::Delegate => &[EXPOSED_DELEGATE, EXPOSED_MULTICAST_DELEGATE],
    }
}

/// Every type-level exposure marker with the kind it belongs on
pub const TYPE_MARKERS: [(&str, TypeKind); 6] = [
    (EXPOSED_CLASS, TypeKind::Class),
    (EXPOSED_STRUCT, TypeKind::Struct),
    (EXPOSED_ENUM, TypeKind::Enum),
    (EXPOSED_INTERFACE, TypeKind::Interface),
    (EXPOSED_DELEGATE, TypeKind::Delegate),
    (EXPOSED_MULTICAST_DELEGATE, TypeKind::Delegate),
];

/// Whether the type carries the exposure marker of its own kind
pub fn is_exposed(ty: &TypeDef) -> bool {
    exposure_marker(ty.kind)
        .iter()
        .any(|marker| ty.has_attribute(marker))
}

/// Native name of a type: the exposure marker's string argument, or the
/// unqualified managed name
pub fn type_native_name(ty: &TypeDef) -> String {
    if let Some(name) = explicit_native_name(&ty.attributes) {
        return name.to_string();
    }
    exposure_marker(ty.kind)
        .iter()
        .filter_map(|marker| ty.attribute(marker))
        .find_map(Attribute::first_str)
        .unwrap_or_else(|| ty.simple_name())
        .to_string()
}

/// Native name of a member: a `NativeName` marker, or the managed name
pub fn member_native_name(attributes: &[Attribute], managed: &str) -> String {
    explicit_native_name(attributes)
        .unwrap_or(managed)
        .to_string()
}

fn explicit_native_name(attributes: &[Attribute]) -> Option<&str> {
    stitch_bytecode::module::find_attribute(attributes, NATIVE_NAME).and_then(Attribute::first_str)
}

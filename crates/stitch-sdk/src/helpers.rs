//! Helper library catalog
//!
//! Woven code never touches the native host directly: it calls static and
//! instance methods on a fixed set of helper types. This module is the single
//! list of those types and methods, shared by the weaver (which emits calls
//! to them) and the host (which implements them).

use crate::kind::NativeKind;

/// Namespace the helper types live in unless configured otherwise
pub const DEFAULT_NAMESPACE: &str = "Host.Interop";
/// Managed root of every native-backed class unless configured otherwise
pub const DEFAULT_CORE_OBJECT: &str = "Host.CoreObject";
/// Field of the core object holding the native object pointer
pub const NATIVE_OBJECT_FIELD: &str = "NativeObject";
/// Field of `DelegateBase` holding the native delegate storage pointer
pub const NATIVE_DELEGATE_FIELD: &str = "NativeDelegate";

/// Instance constructor name
pub const CTOR: &str = ".ctor";
/// Static initializer name
pub const CCTOR: &str = ".cctor";

/// `FromNative` method name shared by every marshaller
pub const FROM_NATIVE: &str = "FromNative";
/// `ToNative` method name shared by every marshaller
pub const TO_NATIVE: &str = "ToNative";
/// Cleanup method name for marshallers that allocate on the native side
pub const DESTRUCT_INSTANCE: &str = "DestructInstance";

// ============================================================================
// Registry and invoker methods
// ============================================================================

/// `TypeRegistry.GetNativeType(string name) -> IntPtr`
pub const GET_NATIVE_TYPE: &str = "GetNativeType";
/// `TypeRegistry.GetNativeStructSize(IntPtr type) -> int`
pub const GET_NATIVE_STRUCT_SIZE: &str = "GetNativeStructSize";
/// `TypeRegistry.GetNativeDelegateSignature(string name) -> IntPtr`
pub const GET_NATIVE_DELEGATE_SIGNATURE: &str = "GetNativeDelegateSignature";
/// `PropertyRegistry.GetNativeProperty(IntPtr owner, string name) -> IntPtr`
pub const GET_NATIVE_PROPERTY: &str = "GetNativeProperty";
/// `PropertyRegistry.GetPropertyOffset(IntPtr property) -> int`
pub const GET_PROPERTY_OFFSET: &str = "GetPropertyOffset";
/// `PropertyRegistry.GetPropertyOffsetFromName(IntPtr owner, string name) -> int`
pub const GET_PROPERTY_OFFSET_FROM_NAME: &str = "GetPropertyOffsetFromName";
/// `PropertyRegistry.GetBoolPropertyFieldMask(IntPtr property) -> byte`
pub const GET_BOOL_PROPERTY_FIELD_MASK: &str = "GetBoolPropertyFieldMask";
/// `FunctionRegistry.GetNativeFunction(IntPtr type, string name) -> IntPtr`
pub const GET_NATIVE_FUNCTION: &str = "GetNativeFunction";
/// `FunctionRegistry.GetNativeFunctionFromInstanceAndName(IntPtr object, string name) -> IntPtr`
pub const GET_NATIVE_FUNCTION_FROM_INSTANCE_AND_NAME: &str = "GetNativeFunctionFromInstanceAndName";
/// `FunctionRegistry.GetNativeFunctionParamsSize(IntPtr function) -> int`
pub const GET_NATIVE_FUNCTION_PARAMS_SIZE: &str = "GetNativeFunctionParamsSize";
/// `FunctionRegistry.IsNativeOverride(IntPtr object, IntPtr function) -> bool`
pub const IS_NATIVE_OVERRIDE: &str = "IsNativeOverride";
/// `FunctionInvoker.InvokeNativeFunction(IntPtr object, IntPtr function, IntPtr params)`
pub const INVOKE_NATIVE_FUNCTION: &str = "InvokeNativeFunction";
/// `FunctionInvoker.InvokeNativeStaticFunction(IntPtr type, IntPtr function, IntPtr params)`
pub const INVOKE_NATIVE_STATIC_FUNCTION: &str = "InvokeNativeStaticFunction";
/// `FunctionInvoker.InvokeNativeNetFunction(IntPtr object, IntPtr function, IntPtr params)`
pub const INVOKE_NATIVE_NET_FUNCTION: &str = "InvokeNativeNetFunction";
/// `FunctionInvoker.InvokeNativeFunctionOutParms(IntPtr object, IntPtr function, IntPtr params)`
pub const INVOKE_NATIVE_FUNCTION_OUT_PARMS: &str = "InvokeNativeFunctionOutParms";
/// `DelegateInvoker.ProcessDelegate(IntPtr delegate, IntPtr params)`
pub const PROCESS_DELEGATE: &str = "ProcessDelegate";
/// `DelegateInvoker.ProcessMulticastDelegate(IntPtr delegate, IntPtr params)`
pub const PROCESS_MULTICAST_DELEGATE: &str = "ProcessMulticastDelegate";

/// A method offered by a helper type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HelperMethod {
    /// Method name
    pub name: String,
    /// Parameter count, `this` excluded
    pub arity: u16,
    /// Whether the method is static
    pub is_static: bool,
}

impl HelperMethod {
    fn new(name: impl Into<String>, arity: u16, is_static: bool) -> Self {
        Self {
            name: name.into(),
            arity,
            is_static,
        }
    }
}

/// Every helper type woven code may reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HelperType {
    /// Native type descriptor lookups
    TypeRegistry,
    /// Native property descriptor and offset lookups
    PropertyRegistry,
    /// Native function descriptor lookups
    FunctionRegistry,
    /// Native function invocation conventions
    FunctionInvoker,
    /// Native delegate invocation
    DelegateInvoker,
    /// Base type of every exposed delegate
    DelegateBase,
    /// Per-kind primitive converters, used as element converters
    BlittableMarshaller,
    /// One-byte boolean converter
    BoolMarshaller,
    /// Bit-packed boolean accessor
    BitfieldBoolMarshaller,
    /// Native string
    StringMarshaller,
    /// Native localized text
    TextMarshaller,
    /// Native interned name
    NameMarshaller,
    /// Object handle
    ObjectMarshaller,
    /// Owning object reference
    StrongObjectMarshaller,
    /// Weak object reference
    WeakObjectMarshaller,
    /// Soft (lazily loaded) object reference
    SoftObjectMarshaller,
    /// Class reference
    SubclassOfMarshaller,
    /// Soft class reference
    SoftClassMarshaller,
    /// Interface reference
    ScriptInterfaceMarshaller,
    /// Blittable record as a container element
    BlittableStructMarshaller,
    /// Single-cast delegate
    SingleDelegateMarshaller,
    /// Multi-cast delegate
    MulticastDelegateMarshaller,
    /// Raw blob of native bytes
    OpaqueMarshaller,
    /// Aliasing dynamic array
    ArrayMarshaller,
    /// Copying dynamic array, for stack-scoped buffers
    ArrayCopyMarshaller,
    /// Aliasing map
    MapMarshaller,
    /// Copying map
    MapCopyMarshaller,
    /// Aliasing set
    SetMarshaller,
    /// Copying set
    SetCopyMarshaller,
    /// Aliasing optional
    OptionalMarshaller,
    /// Copying optional
    OptionalCopyMarshaller,
    /// Inline fixed-size array
    FixedArrayMarshaller,
}

impl HelperType {
    /// Every helper type
    pub const ALL: [HelperType; 32] = [
        HelperType::TypeRegistry,
        HelperType::PropertyRegistry,
        HelperType::FunctionRegistry,
        HelperType::FunctionInvoker,
        HelperType::DelegateInvoker,
        HelperType::DelegateBase,
        HelperType::BlittableMarshaller,
        HelperType::BoolMarshaller,
        HelperType::BitfieldBoolMarshaller,
        HelperType::StringMarshaller,
        HelperType::TextMarshaller,
        HelperType::NameMarshaller,
        HelperType::ObjectMarshaller,
        HelperType::StrongObjectMarshaller,
        HelperType::WeakObjectMarshaller,
        HelperType::SoftObjectMarshaller,
        HelperType::SubclassOfMarshaller,
        HelperType::SoftClassMarshaller,
        HelperType::ScriptInterfaceMarshaller,
        HelperType::BlittableStructMarshaller,
        HelperType::SingleDelegateMarshaller,
        HelperType::MulticastDelegateMarshaller,
        HelperType::OpaqueMarshaller,
        HelperType::ArrayMarshaller,
        HelperType::ArrayCopyMarshaller,
        HelperType::MapMarshaller,
        HelperType::MapCopyMarshaller,
        HelperType::SetMarshaller,
        HelperType::SetCopyMarshaller,
        HelperType::OptionalMarshaller,
        HelperType::OptionalCopyMarshaller,
        HelperType::FixedArrayMarshaller,
    ];

    /// Unqualified type name
    pub fn simple_name(self) -> &'static str {
        match self {
            Self::TypeRegistry => "TypeRegistry",
            Self::PropertyRegistry => "PropertyRegistry",
            Self::FunctionRegistry => "FunctionRegistry",
            Self::FunctionInvoker => "FunctionInvoker",
            Self::DelegateInvoker => "DelegateInvoker",
            Self::DelegateBase => "DelegateBase",
            Self::BlittableMarshaller => "BlittableMarshaller",
            Self::BoolMarshaller => "BoolMarshaller",
            Self::BitfieldBoolMarshaller => "BitfieldBoolMarshaller",
            Self::StringMarshaller => "StringMarshaller",
            Self::TextMarshaller => "TextMarshaller",
            Self::NameMarshaller => "NameMarshaller",
            Self::ObjectMarshaller => "ObjectMarshaller",
            Self::StrongObjectMarshaller => "StrongObjectMarshaller",
            Self::WeakObjectMarshaller => "WeakObjectMarshaller",
            Self::SoftObjectMarshaller => "SoftObjectMarshaller",
            Self::SubclassOfMarshaller => "SubclassOfMarshaller",
            Self::SoftClassMarshaller => "SoftClassMarshaller",
            Self::ScriptInterfaceMarshaller => "ScriptInterfaceMarshaller",
            Self::BlittableStructMarshaller => "BlittableStructMarshaller",
            Self::SingleDelegateMarshaller => "SingleDelegateMarshaller",
            Self::MulticastDelegateMarshaller => "MulticastDelegateMarshaller",
            Self::OpaqueMarshaller => "OpaqueMarshaller",
            Self::ArrayMarshaller => "ArrayMarshaller",
            Self::ArrayCopyMarshaller => "ArrayCopyMarshaller",
            Self::MapMarshaller => "MapMarshaller",
            Self::MapCopyMarshaller => "MapCopyMarshaller",
            Self::SetMarshaller => "SetMarshaller",
            Self::SetCopyMarshaller => "SetCopyMarshaller",
            Self::OptionalMarshaller => "OptionalMarshaller",
            Self::OptionalCopyMarshaller => "OptionalCopyMarshaller",
            Self::FixedArrayMarshaller => "FixedArrayMarshaller",
        }
    }

    /// Qualified name within `namespace`
    pub fn qualified(self, namespace: &str) -> String {
        format!("{}.{}", namespace, self.simple_name())
    }

    /// Resolve an unqualified name
    pub fn from_simple_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.simple_name() == name)
    }

    /// Whether the marshaller is instantiated per member (containers)
    pub fn is_instance_marshaller(self) -> bool {
        matches!(
            self,
            Self::ArrayMarshaller
                | Self::ArrayCopyMarshaller
                | Self::MapMarshaller
                | Self::MapCopyMarshaller
                | Self::SetMarshaller
                | Self::SetCopyMarshaller
                | Self::OptionalMarshaller
                | Self::OptionalCopyMarshaller
                | Self::FixedArrayMarshaller
        )
    }

    /// Every method the type offers
    pub fn methods(self) -> Vec<HelperMethod> {
        let s = |name: &str, arity| HelperMethod::new(name, arity, true);
        let i = |name: &str, arity| HelperMethod::new(name, arity, false);
        let converters = || vec![s(FROM_NATIVE, 1), s(TO_NATIVE, 2)];
        let allocating = || vec![s(FROM_NATIVE, 1), s(TO_NATIVE, 2), s(DESTRUCT_INSTANCE, 1)];
        let container = |ctor_arity| {
            vec![
                i(CTOR, ctor_arity),
                i(FROM_NATIVE, 1),
                i(TO_NATIVE, 2),
                i(DESTRUCT_INSTANCE, 1),
            ]
        };

        match self {
            Self::TypeRegistry => vec![
                s(GET_NATIVE_TYPE, 1),
                s(GET_NATIVE_STRUCT_SIZE, 1),
                s(GET_NATIVE_DELEGATE_SIGNATURE, 1),
            ],
            Self::PropertyRegistry => vec![
                s(GET_NATIVE_PROPERTY, 2),
                s(GET_PROPERTY_OFFSET, 1),
                s(GET_PROPERTY_OFFSET_FROM_NAME, 2),
                s(GET_BOOL_PROPERTY_FIELD_MASK, 1),
            ],
            Self::FunctionRegistry => vec![
                s(GET_NATIVE_FUNCTION, 2),
                s(GET_NATIVE_FUNCTION_FROM_INSTANCE_AND_NAME, 2),
                s(GET_NATIVE_FUNCTION_PARAMS_SIZE, 1),
                s(IS_NATIVE_OVERRIDE, 2),
            ],
            Self::FunctionInvoker => vec![
                s(INVOKE_NATIVE_FUNCTION, 3),
                s(INVOKE_NATIVE_STATIC_FUNCTION, 3),
                s(INVOKE_NATIVE_NET_FUNCTION, 3),
                s(INVOKE_NATIVE_FUNCTION_OUT_PARMS, 3),
            ],
            Self::DelegateInvoker => vec![s(PROCESS_DELEGATE, 2), s(PROCESS_MULTICAST_DELEGATE, 2)],
            Self::DelegateBase => vec![i(CTOR, 0)],
            Self::BlittableMarshaller => NativeKind::ALL
                .iter()
                .flat_map(|kind| {
                    [
                        s(&blittable_from_native(*kind), 1),
                        s(&blittable_to_native(*kind), 2),
                    ]
                })
                .collect(),
            Self::BitfieldBoolMarshaller => vec![s(FROM_NATIVE, 2), s(TO_NATIVE, 3)],
            Self::OpaqueMarshaller => vec![s(FROM_NATIVE, 2), s(TO_NATIVE, 3)],
            Self::StringMarshaller | Self::TextMarshaller => allocating(),
            Self::BoolMarshaller
            | Self::NameMarshaller
            | Self::ObjectMarshaller
            | Self::StrongObjectMarshaller
            | Self::WeakObjectMarshaller
            | Self::SoftObjectMarshaller
            | Self::SubclassOfMarshaller
            | Self::SoftClassMarshaller
            | Self::ScriptInterfaceMarshaller
            | Self::BlittableStructMarshaller
            | Self::SingleDelegateMarshaller
            | Self::MulticastDelegateMarshaller => converters(),
            Self::ArrayMarshaller
            | Self::ArrayCopyMarshaller
            | Self::SetMarshaller
            | Self::SetCopyMarshaller
            | Self::OptionalMarshaller
            | Self::OptionalCopyMarshaller => container(3),
            Self::MapMarshaller | Self::MapCopyMarshaller => container(5),
            Self::FixedArrayMarshaller => container(4),
        }
    }
}

/// `BlittableMarshaller.FromNative<Kind>` method name
pub fn blittable_from_native(kind: NativeKind) -> String {
    format!("{}{}", FROM_NATIVE, kind.suffix())
}

/// `BlittableMarshaller.ToNative<Kind>` method name
pub fn blittable_to_native(kind: NativeKind) -> String {
    format!("{}{}", TO_NATIVE, kind.suffix())
}

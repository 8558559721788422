//! Names of generated members
//!
//! The code generator and the weaver agree on these names; nothing else ties
//! a generated field to the member it belongs to. Every construction and
//! parse of such a name goes through this module.

/// Static field holding the native type descriptor
pub const NATIVE_CLASS_PTR: &str = "NativeClassPtr";
/// Static field holding a record's native size
pub const NATIVE_DATA_SIZE: &str = "NativeDataSize";
/// Return value slot of a function's parameter buffer
pub const RETURN_VALUE: &str = stitch_sdk::metadata::RETURN_VALUE;
/// Name of the single method of a callable signature
pub const INVOKE: &str = "Invoke";

const BACKING_PREFIX: &str = "<";
const BACKING_SUFFIX: &str = ">k__BackingField";

/// `<name>_Offset`
pub fn offset(member: &str) -> String {
    format!("{}_Offset", member)
}

/// `<name>_NativeProperty`
pub fn native_property(member: &str) -> String {
    format!("{}_NativeProperty", member)
}

/// `<name>_Marshaller`
pub fn marshaller(member: &str) -> String {
    format!("{}_Marshaller", member)
}

/// `<name>_FieldMask`
pub fn field_mask(member: &str) -> String {
    format!("{}_FieldMask", member)
}

/// `<name>_Delegate`
pub fn delegate_cache(member: &str) -> String {
    format!("{}_Delegate", member)
}

/// `<func>_NativeFunction`
pub fn native_function(function: &str) -> String {
    format!("{}_NativeFunction", function)
}

/// `<func>_InstanceFunction`
pub fn instance_function(function: &str) -> String {
    format!("{}_InstanceFunction", function)
}

/// `<func>_ParamsSize`
pub fn params_size(function: &str) -> String {
    format!("{}_ParamsSize", function)
}

/// `<func>_<param>`, the prefix of every function-scoped member field
pub fn function_member(function: &str, param: &str) -> String {
    format!("{}_{}", function, param)
}

/// `<func>_ReturnValue`
pub fn return_value(function: &str) -> String {
    function_member(function, RETURN_VALUE)
}

/// `<func>_Implementation`
pub fn implementation(function: &str) -> String {
    format!("{}_Implementation", function)
}

/// `<Record>Marshaller`
pub fn record_marshaller(record: &str) -> String {
    format!("{}Marshaller", record)
}

/// `<Interface>Proxy`
pub fn proxy(interface: &str) -> String {
    format!("{}Proxy", interface)
}

/// `<P>k__BackingField`
pub fn backing_field(property: &str) -> String {
    format!("{}{}{}", BACKING_PREFIX, property, BACKING_SUFFIX)
}

/// Property name of a backing field
pub fn parse_backing_field(field: &str) -> Option<&str> {
    field
        .strip_prefix(BACKING_PREFIX)?
        .strip_suffix(BACKING_SUFFIX)
        .filter(|name| !name.is_empty())
}

/// `get_<P>`
pub fn getter(property: &str) -> String {
    format!("get_{}", property)
}

/// `set_<P>`
pub fn setter(property: &str) -> String {
    format!("set_{}", property)
}

/// Member name of a generated `_Offset` field
pub fn parse_offset(field: &str) -> Option<&str> {
    field.strip_suffix("_Offset").filter(|name| !name.is_empty())
}

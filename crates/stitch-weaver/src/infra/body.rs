//! Method body analysis and field-access redirection

use rustc_hash::{FxHashMap, FxHashSet};
use stitch_bytecode::{FieldRef, Instr, MethodBody, MethodDef, MethodRef};

/// Whether a method body is a generator stub the weaver may replace
///
/// Stubs are bodies the generator emits in place of native code: no body,
/// a bare return, or a throw of a fixed message or a freshly constructed
/// exception. A body returning a constant is hand-written logic.
pub fn is_stub(method: &MethodDef) -> bool {
    let Some(body) = &method.body else {
        return true;
    };
    let code: Vec<&Instr> = body.executable().collect();
    match code.as_slice() {
        [Instr::Ret] => true,
        [Instr::ConstStr(_), Instr::Throw] => true,
        [Instr::NewObj(_), Instr::Throw] => true,
        _ => false,
    }
}

fn code(body: &MethodBody) -> Vec<&Instr> {
    body.executable().collect()
}

/// Backing field read by an auto getter `ldarg.0; ldfld F; ret`
pub fn auto_getter_field<'b>(method: &'b MethodDef, owner: &str) -> Option<&'b str> {
    let body = method.body.as_ref()?;
    match code(body).as_slice() {
        [Instr::LoadArg(0), Instr::LoadField(f), Instr::Ret] if f.owner == owner => Some(f.name.as_str()),
        _ => None,
    }
}

/// Backing field written by an auto setter `ldarg.0; ldarg.1; stfld F; ret`
pub fn auto_setter_field<'b>(method: &'b MethodDef, owner: &str) -> Option<&'b str> {
    let body = method.body.as_ref()?;
    match code(body).as_slice() {
        [Instr::LoadArg(0), Instr::LoadArg(1), Instr::StoreField(f), Instr::Ret] if f.owner == owner => {
            Some(f.name.as_str())
        }
        _ => None,
    }
}

/// Accessors replacing a backing field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accessors {
    /// Property the field backed
    pub property: String,
    /// Getter
    pub getter: MethodRef,
    /// Setter
    pub setter: MethodRef,
}

impl Accessors {
    /// `get_P` / `set_P` of `owner`
    pub fn new(owner: &str, property: &str) -> Self {
        Self {
            property: property.to_string(),
            getter: MethodRef::new(owner, crate::naming::getter(property), 0),
            setter: MethodRef::new(owner, crate::naming::setter(property), 1),
        }
    }
}

/// Backing fields being eliminated from one type, by field name
#[derive(Debug, Clone, Default)]
pub struct Redirects {
    owner: String,
    fields: FxHashMap<String, Accessors>,
    written: FxHashSet<String>,
}

impl Redirects {
    /// Empty set for `owner`
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            ..Self::default()
        }
    }

    /// Owning type
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Redirect accesses to `field` through `accessors`
    pub fn insert(&mut self, field: impl Into<String>, accessors: Accessors) {
        self.fields.insert(field.into(), accessors);
    }

    /// Whether nothing is redirected
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Accessors of a redirected field
    pub fn get(&self, field: &FieldRef) -> Option<&Accessors> {
        if field.owner == self.owner {
            self.fields.get(&field.name)
        } else {
            None
        }
    }

    /// Properties whose setter a redirected write now calls
    pub fn written(&self) -> &FxHashSet<String> {
        &self.written
    }

    pub(crate) fn mark_written(&mut self, property: &str) {
        self.written.insert(property.to_string());
    }

    /// Rewrite loads and stores of redirected fields into accessor calls
    pub fn apply(&mut self, instrs: &mut [Instr]) -> usize {
        let mut count = 0;
        for instr in instrs {
            let replacement = match instr {
                Instr::LoadField(f) => self.get(f).map(|a| Instr::Call(a.getter.clone())),
                Instr::StoreField(f) => match self.get(f) {
                    Some(a) => {
                        let call = Instr::Call(a.setter.clone());
                        let property = a.property.clone();
                        self.written.insert(property);
                        Some(call)
                    }
                    None => None,
                },
                _ => None,
            };
            if let Some(replacement) = replacement {
                *instr = replacement;
                count += 1;
            }
        }
        count
    }
}

/// Replace every access to `from` with `to` in place
pub fn rename_field(instrs: &mut [Instr], from: &FieldRef, to: &FieldRef) -> usize {
    let mut count = 0;
    for instr in instrs {
        match instr {
            Instr::LoadField(f) | Instr::StoreField(f) if f == from => {
                *f = to.clone();
                count += 1;
            }
            _ => {}
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use stitch_bytecode::TypeSig;

    fn method(instrs: Vec<Instr>) -> MethodDef {
        MethodDef::new("M", vec![], TypeSig::Void).with_body(MethodBody::new(instrs))
    }

    #[test]
    fn test_stub_shapes() {
        assert!(is_stub(&MethodDef::new("M", vec![], TypeSig::Void)));
        assert!(is_stub(&method(vec![Instr::SequencePoint { line: 3, column: 1 }, Instr::Ret])));
        assert!(is_stub(&method(vec![Instr::ConstStr(0), Instr::Throw])));
        assert!(!is_stub(&method(vec![Instr::ConstI32(0), Instr::Ret])));
        assert!(!is_stub(&method(vec![Instr::ConstNull, Instr::Ret])));
        assert!(!is_stub(&method(vec![Instr::LoadArg(0), Instr::Pop, Instr::Ret])));
    }

    #[test]
    fn test_auto_accessors() {
        let backing = FieldRef::new("T", "<P>k__BackingField");
        let getter = method(vec![Instr::LoadArg(0), Instr::LoadField(backing.clone()), Instr::Ret]);
        let setter = method(vec![
            Instr::LoadArg(0),
            Instr::LoadArg(1),
            Instr::StoreField(backing.clone()),
            Instr::Ret,
        ]);
        assert_eq!(auto_getter_field(&getter, "T"), Some("<P>k__BackingField"));
        assert_eq!(auto_setter_field(&setter, "T"), Some("<P>k__BackingField"));
        assert_eq!(auto_getter_field(&getter, "Other"), None);
        assert_eq!(auto_getter_field(&setter, "T"), None);
    }

    #[test]
    fn test_redirect_tracks_writes() {
        let backing = FieldRef::new("T", "<P>k__BackingField");
        let mut redirects = Redirects::new("T");
        redirects.insert(backing.name.clone(), Accessors::new("T", "P"));

        let mut code = vec![
            Instr::LoadArg(0),
            Instr::LoadField(backing.clone()),
            Instr::LoadArg(0),
            Instr::ConstI32(1),
            Instr::StoreField(backing),
            Instr::LoadField(FieldRef::new("Other", "<P>k__BackingField")),
        ];
        assert_eq!(redirects.apply(&mut code), 2);
        assert_eq!(code[1], Instr::Call(MethodRef::new("T", "get_P", 0)));
        assert_eq!(code[4], Instr::Call(MethodRef::new("T", "set_P", 1)));
        assert!(redirects.written().contains("P"));
    }
}

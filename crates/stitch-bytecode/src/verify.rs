//! Structural verification of method bodies

use rustc_hash::FxHashSet;

use crate::instr::{Instr, Label};
use crate::module::{MethodDef, Module, MAGIC, VERSION};

/// Structural verification errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// Module header is not the current format
    #[error("Module header is invalid (magic {magic:?}, version {version})")]
    InvalidHeader {
        /// Magic bytes
        magic: [u8; 4],
        /// Version
        version: u32,
    },

    /// A branch targets a label that is never placed
    #[error("{method}: branch to undefined label {label}")]
    UndefinedLabel {
        /// `Type::method`
        method: String,
        /// Missing label
        label: Label,
    },

    /// A label is placed twice
    #[error("{method}: label {label} defined more than once")]
    DuplicateLabel {
        /// `Type::method`
        method: String,
        /// Repeated label
        label: Label,
    },

    /// Argument index out of range
    #[error("{method}: argument {index} out of range (method has {count})")]
    InvalidArgRef {
        /// `Type::method`
        method: String,
        /// Offending index
        index: u16,
        /// Argument slots, `this` included
        count: usize,
    },

    /// Local index out of range
    #[error("{method}: local {index} out of range (method has {count})")]
    InvalidLocalRef {
        /// `Type::method`
        method: String,
        /// Offending index
        index: u16,
        /// Declared locals
        count: usize,
    },

    /// String constant index out of range
    #[error("{method}: constant pool index {index} out of range")]
    InvalidConstantRef {
        /// `Type::method`
        method: String,
        /// Offending index
        index: u32,
    },

    /// Execution can run past the last instruction
    #[error("{method}: execution falls off the end of the body")]
    FallOffEnd {
        /// `Type::method`
        method: String,
    },

    /// An abstract method carries a body
    #[error("{method}: abstract method has a body")]
    AbstractWithBody {
        /// `Type::method`
        method: String,
    },
}

/// Verify every method body of a module
pub fn verify_module(module: &Module) -> Result<(), VerifyError> {
    if module.magic != MAGIC || module.version != VERSION {
        return Err(VerifyError::InvalidHeader {
            magic: module.magic,
            version: module.version,
        });
    }

    for ty in &module.types {
        for method in &ty.methods {
            verify_method(module, &format!("{}::{}", ty.name, method.name), method)?;
        }
    }
    Ok(())
}

/// Verify a single method body
pub fn verify_method(module: &Module, qualified: &str, method: &MethodDef) -> Result<(), VerifyError> {
    let Some(body) = &method.body else {
        return Ok(());
    };
    if method.is_abstract {
        return Err(VerifyError::AbstractWithBody {
            method: qualified.to_string(),
        });
    }

    let mut defined = FxHashSet::default();
    for instr in &body.instrs {
        if let Instr::Label(label) = instr {
            if !defined.insert(*label) {
                return Err(VerifyError::DuplicateLabel {
                    method: qualified.to_string(),
                    label: *label,
                });
            }
        }
    }

    let arg_count = method.arg_count();
    for instr in &body.instrs {
        if let Some(label) = instr.branch_target() {
            if !defined.contains(&label) {
                return Err(VerifyError::UndefinedLabel {
                    method: qualified.to_string(),
                    label,
                });
            }
        }
        match instr {
            Instr::LoadArg(i) | Instr::StoreArg(i) if *i as usize >= arg_count => {
                return Err(VerifyError::InvalidArgRef {
                    method: qualified.to_string(),
                    index: *i,
                    count: arg_count,
                });
            }
            Instr::LoadLocal(i) | Instr::StoreLocal(i) if *i as usize >= body.locals.len() => {
                return Err(VerifyError::InvalidLocalRef {
                    method: qualified.to_string(),
                    index: *i,
                    count: body.locals.len(),
                });
            }
            Instr::ConstStr(i) if module.constants.get_string(*i).is_none() => {
                return Err(VerifyError::InvalidConstantRef {
                    method: qualified.to_string(),
                    index: *i,
                });
            }
            _ => {}
        }
    }

    // The last entry that is not a sequence point must be a terminator; a
    // trailing label would let a branch run past the end.
    let last = body
        .instrs
        .iter()
        .rev()
        .find(|i| !matches!(i, Instr::SequencePoint { .. }));
    let terminated = last
        .and_then(Instr::opcode)
        .is_some_and(|op| op.is_terminator());
    if !terminated {
        return Err(VerifyError::FallOffEnd {
            method: qualified.to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{MethodBody, TypeDef, TypeKind};
    use crate::sig::TypeSig;

    fn module_with(method: MethodDef) -> Module {
        let mut module = Module::new("m");
        let mut ty = TypeDef::new("T", TypeKind::Class);
        ty.methods.push(method);
        module.types.push(ty);
        module
    }

    fn method(instrs: Vec<Instr>) -> MethodDef {
        MethodDef::new("f", vec![], TypeSig::Void).with_body(MethodBody::new(instrs))
    }

    #[test]
    fn test_valid_body() {
        let module = module_with(method(vec![
            Instr::LoadArg(0),
            Instr::BrFalse(Label(1)),
            Instr::Label(Label(1)),
            Instr::Ret,
        ]));
        assert_eq!(verify_module(&module), Ok(()));
    }

    #[test]
    fn test_undefined_label() {
        let module = module_with(method(vec![Instr::Br(Label(2)), Instr::Ret]));
        assert!(matches!(
            verify_module(&module),
            Err(VerifyError::UndefinedLabel { label: Label(2), .. })
        ));
    }

    #[test]
    fn test_duplicate_label() {
        let module = module_with(method(vec![
            Instr::Label(Label(0)),
            Instr::Label(Label(0)),
            Instr::Ret,
        ]));
        assert!(matches!(
            verify_module(&module),
            Err(VerifyError::DuplicateLabel { .. })
        ));
    }

    #[test]
    fn test_argument_range() {
        let module = module_with(method(vec![Instr::LoadArg(1), Instr::Ret]));
        assert!(matches!(
            verify_module(&module),
            Err(VerifyError::InvalidArgRef { index: 1, count: 1, .. })
        ));
    }

    #[test]
    fn test_local_and_constant_range() {
        let module = module_with(method(vec![Instr::LoadLocal(0), Instr::Ret]));
        assert!(matches!(
            verify_module(&module),
            Err(VerifyError::InvalidLocalRef { .. })
        ));

        let module = module_with(method(vec![Instr::ConstStr(3), Instr::Throw]));
        assert!(matches!(
            verify_module(&module),
            Err(VerifyError::InvalidConstantRef { index: 3, .. })
        ));
    }

    #[test]
    fn test_fall_off_end() {
        let module = module_with(method(vec![Instr::Nop]));
        assert!(matches!(
            verify_module(&module),
            Err(VerifyError::FallOffEnd { .. })
        ));

        let module = module_with(method(vec![Instr::Ret, Instr::Label(Label(0))]));
        assert!(matches!(
            verify_module(&module),
            Err(VerifyError::FallOffEnd { .. })
        ));

        let module = module_with(method(vec![]));
        assert!(matches!(
            verify_module(&module),
            Err(VerifyError::FallOffEnd { .. })
        ));
    }

    #[test]
    fn test_stubs_are_skipped() {
        let module = module_with(MethodDef::new("stub", vec![], TypeSig::I32));
        assert_eq!(verify_module(&module), Ok(()));
    }
}

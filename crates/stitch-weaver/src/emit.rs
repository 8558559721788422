//! Instruction emission
//!
//! [`Emitter`] builds a method body. [`StringTable`] pools the string
//! constants a weave unit introduces; the pipeline folds each unit's table
//! back into the module pool in declaration order so indices are identical
//! across runs regardless of scheduling.

use stitch_bytecode::{ConstantPool, FieldRef, Instr, Label, MethodBody, MethodRef, TypeSig};

/// Unit-local view of the module's constant pool
#[derive(Debug, Clone)]
pub struct StringTable {
    pool: ConstantPool,
    base: u32,
}

impl StringTable {
    /// Start from a snapshot of the module pool
    pub fn new(module_pool: &ConstantPool) -> Self {
        Self {
            pool: module_pool.clone(),
            base: module_pool.len() as u32,
        }
    }

    /// Pool a string, returning its unit-local index
    pub fn intern(&mut self, value: &str) -> u32 {
        self.pool.intern_string(value)
    }

    /// Look a unit-local index up
    pub fn get(&self, index: u32) -> Option<&str> {
        self.pool.get_string(index)
    }

    /// Whether the unit introduced no strings
    pub fn is_unchanged(&self) -> bool {
        self.pool.len() as u32 == self.base
    }

    /// Move strings introduced by this unit into `target`, rewriting the
    /// `ConstStr` operands of `instrs` to the target's indices
    ///
    /// `target` must be the pool this table was snapshotted from, possibly
    /// grown by other units since.
    pub fn commit(&self, instrs: &mut [Instr], target: &mut ConstantPool) {
        for instr in instrs {
            if let Instr::ConstStr(index) = instr {
                if *index >= self.base {
                    if let Some(value) = self.pool.get_string(*index) {
                        *index = target.intern_string(value);
                    }
                }
            }
        }
    }
}

/// Builder for one method body
pub struct Emitter<'s> {
    instrs: Vec<Instr>,
    locals: Vec<TypeSig>,
    next_label: u32,
    strings: &'s mut StringTable,
}

impl<'s> Emitter<'s> {
    /// Empty body
    pub fn new(strings: &'s mut StringTable) -> Self {
        Self {
            instrs: Vec::new(),
            locals: Vec::new(),
            next_label: 0,
            strings,
        }
    }

    /// Append an instruction
    pub fn emit(&mut self, instr: Instr) -> &mut Self {
        self.instrs.push(instr);
        self
    }

    /// Append instructions
    pub fn extend(&mut self, instrs: impl IntoIterator<Item = Instr>) -> &mut Self {
        self.instrs.extend(instrs);
        self
    }

    /// Allocate a fresh label
    pub fn label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Place a label at the current position
    pub fn mark(&mut self, label: Label) -> &mut Self {
        self.emit(Instr::Label(label))
    }

    /// Allocate a local slot
    pub fn local(&mut self, ty: TypeSig) -> u16 {
        self.locals.push(ty);
        (self.locals.len() - 1) as u16
    }

    /// Push a pooled string
    pub fn string(&mut self, value: &str) -> &mut Self {
        let index = self.strings.intern(value);
        self.emit(Instr::ConstStr(index))
    }

    /// `call`
    pub fn call(&mut self, method: MethodRef) -> &mut Self {
        self.emit(Instr::Call(method))
    }

    /// `ldsfld`
    pub fn load_static(&mut self, field: &FieldRef) -> &mut Self {
        self.emit(Instr::LoadStatic(field.clone()))
    }

    /// `stsfld`
    pub fn store_static(&mut self, field: &FieldRef) -> &mut Self {
        self.emit(Instr::StoreStatic(field.clone()))
    }

    /// Instructions emitted so far
    pub fn instrs(&self) -> &[Instr] {
        &self.instrs
    }

    /// Finish the body
    pub fn finish(self) -> MethodBody {
        MethodBody {
            locals: self.locals,
            instrs: self.instrs,
        }
    }
}

/// An instruction sequence pushing one value, supplied by the caller of a
/// strategy (buffer address, managed value, ...)
pub type Push<'a> = &'a dyn Fn(&mut Emitter<'_>);

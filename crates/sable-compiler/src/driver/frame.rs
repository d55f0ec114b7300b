//! Per-instantiation walk state.

use rustc_hash::FxHashSet;
use sable_core::{DeclId, InstanceId, IrLocation, ModuleId, TypeKey, TypedChunk};

use crate::overload::CallArg;
use crate::ownership::ScopeStack;

/// A `Declare` whose emitted type is patched once the body is walked.
#[derive(Debug, Clone)]
pub(crate) struct PendingDeclare {
    /// Index of the emitted op in the chunk.
    pub index: usize,
    /// Offset of the generic instruction.
    pub pc: u32,
    pub reg: u32,
    pub name: Option<String>,
}

/// One body walk on the frame stack.
#[derive(Debug)]
pub(crate) struct Frame {
    pub decl: DeclId,
    pub instance: InstanceId,
    pub module: ModuleId,
    /// Offset of the instruction being processed.
    pub pc: u32,
    pub scopes: ScopeStack,
    /// Queued call arguments.
    pub args: Vec<CallArg>,
    pub chunk: TypedChunk,
    /// Declared, or inferred from the first return.
    pub return_type: Option<TypeKey>,
    pub return_declared: bool,
    /// A compilation error was reported in this body.
    pub failed: bool,
    /// An explicit return was processed.
    pub returned: bool,
    /// Registers whose value could not be typed.
    pub poisoned: FxHashSet<u32>,
    pub declares: Vec<PendingDeclare>,
    pub intrinsic: Option<String>,
    /// Register holding the receiver in methods.
    pub self_reg: Option<u32>,
    pub done: bool,
}

impl Frame {
    pub fn new(decl: DeclId, instance: InstanceId, module: ModuleId, pc: u32) -> Self {
        Self {
            decl,
            instance,
            module,
            pc,
            scopes: ScopeStack::new(),
            args: Vec::new(),
            chunk: TypedChunk::new(),
            return_type: None,
            return_declared: false,
            failed: false,
            returned: false,
            poisoned: FxHashSet::default(),
            declares: Vec::new(),
            intrinsic: None,
            self_reg: None,
            done: false,
        }
    }

    pub fn location(&self) -> IrLocation {
        IrLocation::new(self.decl, self.pc)
    }

    pub fn poison(&mut self, reg: u32) {
        self.poisoned.insert(reg);
    }

    pub fn is_poisoned(&self, reg: u32) -> bool {
        self.poisoned.contains(&reg)
    }
}

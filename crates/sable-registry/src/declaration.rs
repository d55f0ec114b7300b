//! Declarations - the nodes of the declaration graph.

use bitflags::bitflags;
use sable_core::{DeclId, ModuleId, SlotId};

use crate::instances::InstanceCache;

/// Name of a class's constructor.
pub const CTOR_NAME: &str = "new";
/// Name of a class's destructor.
pub const DTOR_NAME: &str = "drop";
/// Name of a class's clone method.
pub const CLONE_NAME: &str = "clone";
/// Prefix of operator overloads (`operator+`).
pub const OPERATOR_PREFIX: &str = "operator";
/// Prefix of hidden members holding captured values.
pub const CAPTURED_PREFIX: &str = "$";

/// What a declaration is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclKind {
    Namespace,
    Class,
    /// Functions, methods and operators.
    Function,
    Typedef,
    Variable,
    /// One source unit.
    Unit,
}

impl DeclKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            DeclKind::Namespace => "namespace",
            DeclKind::Class => "class",
            DeclKind::Function => "function",
            DeclKind::Typedef => "typedef",
            DeclKind::Variable => "variable",
            DeclKind::Unit => "unit",
        }
    }
}

bitflags! {
    /// Per-declaration state flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeclFlags: u8 {
        /// A body walk for this declaration is on the frame stack.
        const INSTANTIATING = 1 << 0;
        /// Observed calling itself while instantiating.
        const RECURSIVE = 1 << 1;
        /// The generic body faulted; never walked again.
        const ERROR = 1 << 2;
        /// A class whose body refers to enclosing locals.
        const CAPTURES = 1 << 3;
        /// Generated by the engine rather than declared in source.
        const SYNTHESIZED = 1 << 4;
        /// Body is a compiler intrinsic.
        const INTRINSIC = 1 << 5;
        /// Engine-made copy of a closure class; reached through its
        /// original's instance cache, never by name.
        const CLONE = 1 << 6;
    }
}

bitflags! {
    /// Categories derived from a declaration's name.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NameCategory: u8 {
        const CTOR = 1 << 0;
        const DTOR = 1 << 1;
        const CLONE = 1 << 2;
        const OPERATOR = 1 << 3;
        const PROPERTY = 1 << 4;
        const VIEW = 1 << 5;
        const CAPTURED = 1 << 6;
    }
}

impl NameCategory {
    /// Classify a name by convention.
    ///
    /// ```
    /// use sable_registry::NameCategory;
    ///
    /// assert_eq!(NameCategory::of("new"), NameCategory::CTOR);
    /// assert_eq!(NameCategory::of("operator=="), NameCategory::OPERATOR);
    /// assert_eq!(NameCategory::of("get:len"), NameCategory::PROPERTY);
    /// assert!(NameCategory::of("length").is_empty());
    /// ```
    pub fn of(name: &str) -> Self {
        match name {
            CTOR_NAME => return NameCategory::CTOR,
            DTOR_NAME => return NameCategory::DTOR,
            CLONE_NAME => return NameCategory::CLONE,
            _ => {}
        }
        if name.starts_with(OPERATOR_PREFIX) {
            NameCategory::OPERATOR
        } else if name.starts_with("get:") || name.starts_with("set:") {
            NameCategory::PROPERTY
        } else if name.starts_with("view:") {
            NameCategory::VIEW
        } else if name.starts_with(CAPTURED_PREFIX) {
            NameCategory::CAPTURED
        } else {
            NameCategory::empty()
        }
    }
}

/// A formal parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    /// Slot holding the declared type; also the parameter's register.
    pub slot: SlotId,
    pub has_default: bool,
}

impl Param {
    pub fn new(name: impl Into<String>, slot: SlotId) -> Self {
        Self {
            name: name.into(),
            slot,
            has_default: false,
        }
    }

    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }
}

/// A generic parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericParam {
    pub name: String,
    pub slot: SlotId,
}

impl GenericParam {
    pub fn new(name: impl Into<String>, slot: SlotId) -> Self {
        Self {
            name: name.into(),
            slot,
        }
    }
}

/// Where a declaration's generic body lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyRef {
    pub module: ModuleId,
    pub offset: u32,
}

impl BodyRef {
    pub const fn new(module: ModuleId, offset: u32) -> Self {
        Self { module, offset }
    }
}

/// A named entity in the declaration graph.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub id: DeclId,
    pub kind: DeclKind,
    pub name: String,
    pub category: NameCategory,
    pub parent: Option<DeclId>,
    pub params: Vec<Param>,
    pub generics: Vec<GenericParam>,
    pub body: Option<BodyRef>,
    pub flags: DeclFlags,
    /// Free identifiers awaiting closure capture.
    pub pending_captures: Vec<String>,
    pub instances: InstanceCache,
}

impl Declaration {
    pub fn new(id: DeclId, parent: Option<DeclId>, name: impl Into<String>, kind: DeclKind) -> Self {
        let name = name.into();
        Self {
            id,
            kind,
            category: NameCategory::of(&name),
            name,
            parent,
            params: Vec::new(),
            generics: Vec::new(),
            body: None,
            flags: DeclFlags::empty(),
            pending_captures: Vec::new(),
            instances: InstanceCache::new(),
        }
    }

    /// Slot of the return type (or declared type, for variables and typedefs).
    pub fn return_slot(&self) -> SlotId {
        self.id.return_slot()
    }

    pub fn is_function(&self) -> bool {
        self.kind == DeclKind::Function
    }

    pub fn is_class(&self) -> bool {
        self.kind == DeclKind::Class
    }

    pub fn is_variable(&self) -> bool {
        self.kind == DeclKind::Variable
    }

    pub fn has_flag(&self, flag: DeclFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Whether the name is a constructor, destructor or clone.
    pub fn is_special_member(&self) -> bool {
        self.category
            .intersects(NameCategory::CTOR | NameCategory::DTOR | NameCategory::CLONE)
    }

    /// Parameter by name.
    pub fn param(&self, name: &str) -> Option<(usize, &Param)> {
        self.params.iter().enumerate().find(|(_, p)| p.name == name)
    }
}

//! Identifier types for declarations, type slots and instances.
//!
//! All cross references inside a build session are plain integer ids into
//! index-stable stores. A stale id is a checked error at the point of use,
//! never undefined behaviour.

use std::fmt;

/// Identifies a declaration in the declaration graph.
///
/// Id 0 is reserved and never handed out, so a zeroed id can be used as a
/// sentinel in serialized IR.
///
/// # Example
///
/// ```
/// use sable_core::DeclId;
///
/// let decl = DeclId::new(3);
/// assert_eq!(decl.index(), 3);
/// assert!(!decl.is_reserved());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DeclId(u32);

impl DeclId {
    /// The reserved id.
    pub const RESERVED: DeclId = DeclId(0);

    /// Create a declaration id from its raw index.
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get the underlying index.
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Whether this is the reserved id 0.
    #[inline]
    pub const fn is_reserved(self) -> bool {
        self.0 == 0
    }

    /// Slot id of a local of this declaration.
    #[inline]
    pub const fn slot(self, local: u32) -> SlotId {
        SlotId::new(self, local)
    }

    /// Slot id of this declaration's return type.
    #[inline]
    pub const fn return_slot(self) -> SlotId {
        SlotId::new(self, SlotId::RETURN)
    }
}

impl fmt::Display for DeclId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "decl#{}", self.0)
    }
}

impl From<u32> for DeclId {
    fn from(index: u32) -> Self {
        Self::new(index)
    }
}

/// Identifies one type slot: a (declaration, local) pair.
///
/// Local 0 is invalid, local 1 is the declaration's return type and local 2
/// is the first register (or `self` for methods).
///
/// Ordering is by declaration first, then by local.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId {
    /// Owning declaration.
    pub decl: DeclId,
    /// Local index within the declaration.
    pub local: u32,
}

impl SlotId {
    /// The invalid local id.
    pub const INVALID: u32 = 0;
    /// The return-type local id.
    pub const RETURN: u32 = 1;
    /// The first register local id.
    pub const FIRST_REGISTER: u32 = 2;

    #[inline]
    pub const fn new(decl: DeclId, local: u32) -> Self {
        Self { decl, local }
    }

    /// Whether the local id is valid (non-zero).
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.local != Self::INVALID
    }

    /// Whether this is the return-type slot.
    #[inline]
    pub const fn is_return(self) -> bool {
        self.local == Self::RETURN
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.decl.0, self.local)
    }
}

/// Identifies a compiled instance.
///
/// Instance ids are handed out by a single counter per graph, so they are
/// stable and increase monotonically across all declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(u32);

impl InstanceId {
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inst#{}", self.0)
    }
}

/// Identifies a generic IR module (one per source unit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ModuleId(u32);

impl ModuleId {
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module_{}", self.0)
    }
}

/// Index into a module's string table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StringId(u32);

impl StringId {
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

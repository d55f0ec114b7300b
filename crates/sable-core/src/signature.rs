//! Signatures - the instance cache key.
//!
//! A signature is the ordered list of concrete types of a declaration's
//! formal parameters followed by its generic parameters. Two call sites with
//! equal signatures share one instance.

use std::fmt;

use xxhash_rust::xxh64::xxh64;

use crate::{TypeKey, TypeKind};

/// Ordered concrete parameter and generic types of one specialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Signature {
    entries: Vec<TypeKey>,
}

impl Signature {
    pub fn new(entries: Vec<TypeKey>) -> Self {
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[TypeKey] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether every entry is concrete (no `any` left).
    pub fn is_concrete(&self) -> bool {
        self.entries.iter().all(|entry| !entry.kind.is_any())
    }

    /// Stable 64-bit digest of the signature, used in symbol names.
    pub fn digest(&self) -> u64 {
        let mut bytes = Vec::with_capacity(self.entries.len() * 6);
        for entry in &self.entries {
            let (tag, payload) = match entry.kind {
                TypeKind::Void => (0u8, 0u32),
                TypeKind::Any => (1, 0),
                TypeKind::Builtin(kind) => (2, kind as u32),
                TypeKind::Linked(decl) => (3, decl.index()),
            };
            bytes.push(tag);
            bytes.extend_from_slice(&payload.to_le_bytes());
            bytes.push(entry.qualifiers.bits());
        }
        xxh64(&bytes, 0)
    }

    /// Printable symbol name for an instance of `qualified_name` with this signature.
    ///
    /// ```
    /// use sable_core::{BuiltinKind, Signature, TypeKey};
    ///
    /// let sig = Signature::new(vec![TypeKey::builtin(BuiltinKind::I32)]);
    /// let symbol = sig.symbol_name("math::id");
    /// assert!(symbol.starts_with("math::id$"));
    /// assert_eq!(symbol.len(), "math::id$".len() + 16);
    /// ```
    pub fn symbol_name(&self, qualified_name: &str) -> String {
        format!("{}${:016x}", qualified_name, self.digest())
    }
}

impl From<Vec<TypeKey>> for Signature {
    fn from(entries: Vec<TypeKey>) -> Self {
        Self::new(entries)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{entry}")?;
        }
        f.write_str(")")
    }
}

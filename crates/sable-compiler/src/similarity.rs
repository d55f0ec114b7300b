//! Type compatibility.
//!
//! [`is_similar`] answers "is a value of type `a` usable where `b` is
//! expected". The check is directional and yields a three-level
//! [`Similarity`] that overload ranking builds on:
//!
//! 1. the same slot (through aliasing) is `StrictEqual`
//! 2. an `any` expectation accepts everything strictly
//! 3. const never flows into non-const
//! 4. builtins and `void` compare by kind, then by the widening table
//! 5. everything else is compared structurally through declarations
//!
//! Structural comparison of recursive types is co-inductive: a pair of
//! declarations already under comparison is assumed to match.

use rustc_hash::FxHashSet;
use sable_core::{BuiltinKind, DeclId, InternalError, SlotId, TypeKey, TypeKind, TypeRecord};
use sable_registry::{DeclFlags, DeclKind, DeclarationGraph, TypeTable};

/// How well one type fits where another is expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Similarity {
    None,
    Equal,
    StrictEqual,
}

impl Similarity {
    pub fn is_match(self) -> bool {
        self != Similarity::None
    }
}

/// One side of a comparison: a live slot or a bare concrete key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRef {
    Slot(SlotId),
    Key(TypeKey),
}

/// Whether `from` implicitly widens to `to`.
///
/// ```
/// use sable_compiler::similarity::widens;
/// use sable_core::BuiltinKind;
///
/// assert!(widens(BuiltinKind::U8, BuiltinKind::U64));
/// assert!(widens(BuiltinKind::U16, BuiltinKind::Pointer));
/// assert!(!widens(BuiltinKind::I32, BuiltinKind::U32));
/// assert!(!widens(BuiltinKind::F64, BuiltinKind::F32));
/// ```
pub fn widens(from: BuiltinKind, to: BuiltinKind) -> bool {
    if from == to {
        return false;
    }
    if from.is_unsigned() && to == BuiltinKind::Pointer {
        return true;
    }
    let same_family = (from.is_unsigned() && to.is_unsigned())
        || (from.is_signed() && to.is_signed())
        || (from.is_float() && to.is_float());
    same_family && from.size() < to.size()
}

/// The wider of two builtin operand kinds, if one widens to the other.
pub fn wider(a: BuiltinKind, b: BuiltinKind) -> Option<BuiltinKind> {
    if a == b {
        Some(a)
    } else if widens(a, b) {
        Some(b)
    } else if widens(b, a) {
        Some(a)
    } else {
        None
    }
}

/// Compare `a` against the expectation `b`.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn is_similar(
    graph: &DeclarationGraph,
    types: &TypeTable,
    a: TypeRef,
    b: TypeRef,
) -> Result<Similarity, InternalError> {
    SimilarityCheck::new(graph, types).compare(a, b)
}

struct SimilarityCheck<'a> {
    graph: &'a DeclarationGraph,
    types: &'a TypeTable,
    assumed: FxHashSet<(DeclId, DeclId)>,
}

impl<'a> SimilarityCheck<'a> {
    fn new(graph: &'a DeclarationGraph, types: &'a TypeTable) -> Self {
        Self {
            graph,
            types,
            assumed: FxHashSet::default(),
        }
    }

    fn record(&self, side: TypeRef) -> Result<TypeRecord, InternalError> {
        match side {
            TypeRef::Slot(slot) => Ok(self.types.read(slot)?.clone()),
            TypeRef::Key(key) => Ok(TypeRecord::from_key(key)),
        }
    }

    fn compare(&mut self, a: TypeRef, b: TypeRef) -> Result<Similarity, InternalError> {
        if let (TypeRef::Slot(sa), TypeRef::Slot(sb)) = (a, b) {
            if self.types.resolve_alias(sa)? == self.types.resolve_alias(sb)? {
                return Ok(Similarity::StrictEqual);
            }
        }

        let ra = self.record(a)?;
        let rb = self.record(b)?;
        if rb.is_any() {
            return Ok(Similarity::StrictEqual);
        }
        if ra.is_const() && !rb.is_const() {
            return Ok(Similarity::None);
        }

        let scalar = |kind: TypeKind| matches!(kind, TypeKind::Builtin(_) | TypeKind::Void);
        if scalar(ra.kind) || scalar(rb.kind) {
            return Ok(match (ra.kind, rb.kind) {
                (ka, kb) if ka == kb => Similarity::StrictEqual,
                (TypeKind::Builtin(ka), TypeKind::Builtin(kb)) if widens(ka, kb) => {
                    Similarity::Equal
                }
                _ => Similarity::None,
            });
        }

        let Some(target) = self.types.resolve_decl(&rb) else {
            return Ok(Similarity::None);
        };

        let mut best = Similarity::None;
        if let TypeKind::Linked(source) = ra.kind {
            best = self.structural(source, target)?;
            if !best.is_match() {
                return Ok(Similarity::None);
            }
        }
        for &parent in &ra.extends {
            let branch = self.compare(TypeRef::Slot(parent), b)?;
            if !branch.is_match() {
                return Ok(Similarity::None);
            }
            best = best.max(branch);
        }
        Ok(best)
    }

    fn structural(&mut self, a: DeclId, b: DeclId) -> Result<Similarity, InternalError> {
        if a == b {
            return Ok(Similarity::StrictEqual);
        }
        if !self.assumed.insert((a, b)) {
            return Ok(Similarity::Equal);
        }
        let result = self.structural_inner(a, b);
        self.assumed.remove(&(a, b));
        result
    }

    fn structural_inner(&mut self, a: DeclId, b: DeclId) -> Result<Similarity, InternalError> {
        let da = self.graph.get(a)?;
        let db = self.graph.get(b)?;
        match (da.kind, db.kind) {
            (DeclKind::Function, DeclKind::Function) => {
                if da.params.len() != db.params.len() {
                    return Ok(Similarity::None);
                }
                let pairs: Vec<(SlotId, SlotId)> = da
                    .params
                    .iter()
                    .zip(&db.params)
                    .map(|(pa, pb)| (pa.slot, pb.slot))
                    .collect();
                let returns = (da.return_slot(), db.return_slot());
                for (pa, pb) in pairs {
                    if self.types.raw_read(pa)?.qualifiers != self.types.raw_read(pb)?.qualifiers {
                        return Ok(Similarity::None);
                    }
                    // Parameters are contravariant.
                    if !self.compare(TypeRef::Slot(pb), TypeRef::Slot(pa))?.is_match() {
                        return Ok(Similarity::None);
                    }
                }
                if !self
                    .compare(TypeRef::Slot(returns.0), TypeRef::Slot(returns.1))?
                    .is_match()
                {
                    return Ok(Similarity::None);
                }
                Ok(Similarity::Equal)
            }
            (DeclKind::Class, DeclKind::Class) => {
                for child in self.graph.children(a) {
                    let member = self.graph.get(child)?;
                    if member.has_flag(DeclFlags::SYNTHESIZED) {
                        continue;
                    }
                    let name = member.name.clone();
                    let mut matched = false;
                    for namesake in self.graph.lookup_children(b, &name) {
                        if self.member_matches(child, namesake)? {
                            matched = true;
                            break;
                        }
                    }
                    if !matched {
                        return Ok(Similarity::None);
                    }
                }
                Ok(Similarity::Equal)
            }
            _ => Ok(Similarity::None),
        }
    }

    fn member_matches(&mut self, a: DeclId, b: DeclId) -> Result<bool, InternalError> {
        let (ka, kb) = (self.graph.get(a)?.kind, self.graph.get(b)?.kind);
        if ka != kb {
            return Ok(false);
        }
        let result = match ka {
            DeclKind::Variable | DeclKind::Typedef => {
                self.compare(TypeRef::Slot(a.return_slot()), TypeRef::Slot(b.return_slot()))?
            }
            _ => self.structural(a, b)?,
        };
        Ok(result.is_match())
    }
}

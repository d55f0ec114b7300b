//! Overload resolution for calls.
//!
//! ## Algorithm
//!
//! 1. Validate every candidate against the call's arguments; drop rejections
//! 2. A unique strictly-equal candidate wins outright
//! 3. Otherwise the candidate with the most strictly-equal parameters wins
//! 4. Ties are broken by speculatively instantiating the tied candidates
//!
//! Validation binds positional then named arguments to parameters, fills
//! generic parameters from the first argument that reaches them and builds
//! the [`Signature`] the chosen candidate is instantiated with.

mod ranking;

pub use ranking::{Selection, select};

use rustc_hash::FxHashMap;
use sable_core::{DeclId, InternalError, Signature, SlotId, TypeKey, TypeKind, TypeRecord};
use sable_registry::{DeclarationGraph, TypeTable};
use thiserror::Error;

use crate::similarity::{Similarity, TypeRef, is_similar};

/// One queued call argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallArg {
    /// Register holding the value.
    pub reg: u32,
    /// Slot the register's type lives in.
    pub slot: SlotId,
    /// Parameter name for named arguments.
    pub name: Option<String>,
}

impl CallArg {
    pub fn positional(reg: u32, slot: SlotId) -> Self {
        Self {
            reg,
            slot,
            name: None,
        }
    }

    pub fn named(reg: u32, slot: SlotId, name: impl Into<String>) -> Self {
        Self {
            reg,
            slot,
            name: Some(name.into()),
        }
    }
}

/// A candidate that accepts the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateMatch {
    pub decl: DeclId,
    /// `StrictEqual` only if every comparison was strict.
    pub similarity: Similarity,
    /// One result per bound parameter, in parameter order.
    pub per_param: Vec<Similarity>,
    /// Signature to instantiate the candidate with.
    pub signature: Signature,
    /// Argument registers in parameter order.
    pub args: Vec<u32>,
}

impl CandidateMatch {
    /// Number of strictly-equal parameter matches.
    pub fn strict_count(&self) -> usize {
        self.per_param
            .iter()
            .filter(|s| **s == Similarity::StrictEqual)
            .count()
    }
}

/// Why a candidate does not accept a call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("not a function")]
    NotAFunction,

    #[error("takes at most {expected} arguments, {found} given")]
    TooManyArguments { expected: usize, found: usize },

    #[error("has no parameter named '{0}'")]
    UnknownParameter(String),

    #[error("parameter '{0}' is bound more than once")]
    DuplicateArgument(String),

    #[error("missing argument for parameter '{0}'")]
    MissingArgument(String),

    #[error("parameter '{param}' expects '{expected}', found '{found}'")]
    ArgumentType {
        param: String,
        expected: String,
        found: String,
    },

    #[error("returns '{found}' where '{expected}' is expected")]
    ReturnType { expected: String, found: String },

    #[error(transparent)]
    Internal(#[from] InternalError),
}

/// Printable name of a concrete type, using declaration names for links.
pub fn type_name(graph: &DeclarationGraph, key: TypeKey) -> String {
    match key.kind {
        TypeKind::Linked(decl) => format!("{}{}", key.qualifiers, graph.qualified_name(decl)),
        _ => key.to_string(),
    }
}

/// `name(T1, T2)` rendering of a candidate's declared parameters.
pub fn describe_candidate(graph: &DeclarationGraph, types: &TypeTable, decl: DeclId) -> String {
    let Ok(declaration) = graph.get(decl) else {
        return decl.to_string();
    };
    let params: Vec<String> = declaration
        .params
        .iter()
        .map(|param| match types.raw_read(param.slot) {
            Ok(record) => type_name(graph, record.key()),
            Err(_) => "?".to_string(),
        })
        .collect();
    format!("{}({})", graph.qualified_name(decl), params.join(", "))
}

/// Validates candidates against one call.
pub struct OverloadResolver<'a> {
    graph: &'a DeclarationGraph,
    types: &'a TypeTable,
}

impl<'a> OverloadResolver<'a> {
    pub fn new(graph: &'a DeclarationGraph, types: &'a TypeTable) -> Self {
        Self { graph, types }
    }

    fn similar(&self, a: TypeRef, b: TypeRef) -> Result<Similarity, InternalError> {
        is_similar(self.graph, self.types, a, b)
    }

    /// Check one candidate against the arguments and an optional return
    /// type constraint.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn validate(
        &self,
        candidate: DeclId,
        args: &[CallArg],
        expected: Option<TypeRef>,
    ) -> Result<CandidateMatch, Rejection> {
        let decl = self.graph.get(candidate)?;
        if !decl.is_function() {
            return Err(Rejection::NotAFunction);
        }
        let params = &decl.params;

        let positional = args.iter().filter(|arg| arg.name.is_none()).count();
        if positional > params.len() {
            return Err(Rejection::TooManyArguments {
                expected: params.len(),
                found: positional,
            });
        }

        let mut bound: Vec<Option<&CallArg>> = vec![None; params.len()];
        let mut next = 0;
        for arg in args {
            let index = match &arg.name {
                None => {
                    next += 1;
                    next - 1
                }
                Some(name) => decl
                    .param(name)
                    .map(|(index, _)| index)
                    .ok_or_else(|| Rejection::UnknownParameter(name.clone()))?,
            };
            if bound[index].is_some() {
                return Err(Rejection::DuplicateArgument(params[index].name.clone()));
            }
            bound[index] = Some(arg);
        }

        let mut generics: FxHashMap<SlotId, TypeKey> = FxHashMap::default();
        let mut per_param = Vec::with_capacity(params.len());
        let mut entries = Vec::with_capacity(params.len() + decl.generics.len());
        let mut ordered = Vec::with_capacity(args.len());

        for (param, arg) in params.iter().zip(&bound) {
            let declared = self.types.raw_read(param.slot)?.clone();
            let Some(arg) = arg else {
                if !param.has_default {
                    return Err(Rejection::MissingArgument(param.name.clone()));
                }
                entries.push(declared_entry(&declared));
                continue;
            };

            let actual = self.types.read(arg.slot)?.clone();
            let (similarity, entry) = if declared.is_any() {
                match declared.extends.first() {
                    Some(generic) => match generics.get(generic) {
                        Some(&bound_key) => (
                            self.similar(TypeRef::Slot(arg.slot), TypeRef::Key(bound_key))?,
                            bound_key,
                        ),
                        None => {
                            let key = TypeKey::new(actual.kind);
                            generics.insert(*generic, key);
                            (Similarity::StrictEqual, key)
                        }
                    },
                    None => (
                        Similarity::StrictEqual,
                        TypeKey::new(actual.kind).with_qualifiers(declared.qualifiers),
                    ),
                }
            } else {
                (
                    self.similar(TypeRef::Slot(arg.slot), TypeRef::Key(declared.key()))?,
                    declared.key(),
                )
            };

            if !similarity.is_match() {
                return Err(Rejection::ArgumentType {
                    param: param.name.clone(),
                    expected: type_name(self.graph, entry),
                    found: type_name(self.graph, actual.key()),
                });
            }
            per_param.push(similarity);
            entries.push(entry);
            ordered.push(arg.reg);
        }

        for generic in &decl.generics {
            let key = match generics.get(&generic.slot) {
                Some(&key) => key,
                None => declared_entry(self.types.raw_read(generic.slot)?),
            };
            entries.push(key);
        }

        let mut strict = per_param.iter().all(|s| *s == Similarity::StrictEqual);
        if let Some(expected) = expected {
            let declared = self.types.raw_read(decl.return_slot())?;
            let returns = if declared.is_concrete() {
                Some(declared.key())
            } else {
                declared
                    .extends
                    .first()
                    .and_then(|generic| generics.get(generic).copied())
            };
            if let Some(returns) = returns {
                let similarity = self.similar(TypeRef::Key(returns), expected)?;
                if !similarity.is_match() {
                    let expected = match expected {
                        TypeRef::Key(key) => key,
                        TypeRef::Slot(slot) => self.types.read(slot)?.key(),
                    };
                    return Err(Rejection::ReturnType {
                        expected: type_name(self.graph, expected),
                        found: type_name(self.graph, returns),
                    });
                }
                strict &= similarity == Similarity::StrictEqual;
            }
        }

        Ok(CandidateMatch {
            decl: candidate,
            similarity: if strict {
                Similarity::StrictEqual
            } else {
                Similarity::Equal
            },
            per_param,
            signature: Signature::new(entries),
            args: ordered,
        })
    }

    /// Validate every candidate, splitting survivors from rejections.
    ///
    /// Internal errors abort instead of counting as a rejection.
    pub fn validate_all(
        &self,
        candidates: &[DeclId],
        args: &[CallArg],
        expected: Option<TypeRef>,
    ) -> Result<(Vec<CandidateMatch>, Vec<(DeclId, Rejection)>), InternalError> {
        let mut survivors = Vec::new();
        let mut rejected = Vec::new();
        for &candidate in candidates {
            match self.validate(candidate, args, expected) {
                Ok(found) => survivors.push(found),
                Err(Rejection::Internal(error)) => return Err(error),
                Err(rejection) => rejected.push((candidate, rejection)),
            }
        }
        Ok((survivors, rejected))
    }
}

fn declared_entry(record: &TypeRecord) -> TypeKey {
    if record.is_concrete() {
        record.key()
    } else {
        TypeKey::ANY
    }
}

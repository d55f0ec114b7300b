//! Ranking of validated candidates.

use sable_core::DeclId;

use super::CandidateMatch;
use crate::similarity::Similarity;

/// Outcome of ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Chosen(CandidateMatch),
    /// No candidate survived validation.
    NoMatch,
    /// Several candidates remain equally good.
    Ambiguous(Vec<DeclId>),
    /// Every tied candidate failed to instantiate.
    NoneInstantiated(Vec<DeclId>),
}

/// Pick the best of the validated candidates.
///
/// `probe` speculatively instantiates one tied candidate and reports
/// whether it compiled; it is only called when `probe_ties` is set and
/// strictness and scoring could not decide.
pub fn select<E, P>(
    survivors: Vec<CandidateMatch>,
    probe_ties: bool,
    mut probe: P,
) -> Result<Selection, E>
where
    P: FnMut(&CandidateMatch) -> Result<bool, E>,
{
    if survivors.is_empty() {
        return Ok(Selection::NoMatch);
    }

    let strict: Vec<&CandidateMatch> = survivors
        .iter()
        .filter(|m| m.similarity == Similarity::StrictEqual)
        .collect();
    if let [only] = strict.as_slice() {
        return Ok(Selection::Chosen((*only).clone()));
    }

    let best = survivors
        .iter()
        .map(CandidateMatch::strict_count)
        .max()
        .unwrap_or(0);
    let mut top: Vec<CandidateMatch> = survivors
        .into_iter()
        .filter(|m| m.strict_count() == best)
        .collect();
    if top.len() == 1 {
        return Ok(Selection::Chosen(top.remove(0)));
    }
    if !probe_ties {
        return Ok(Selection::Ambiguous(top.iter().map(|m| m.decl).collect()));
    }

    let mut compiled = Vec::new();
    for candidate in &top {
        if probe(candidate)? {
            compiled.push(candidate.clone());
        }
    }
    Ok(match compiled.len() {
        0 => Selection::NoneInstantiated(top.iter().map(|m| m.decl).collect()),
        1 => Selection::Chosen(compiled.remove(0)),
        _ => Selection::Ambiguous(compiled.iter().map(|m| m.decl).collect()),
    })
}

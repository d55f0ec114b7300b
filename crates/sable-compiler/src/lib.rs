//! Sable Compiler
//!
//! Turns generic bodies into typed, per-signature instances.
//!
//! ## Architecture
//!
//! - **Resolution**: names are resolved against the walk's locals and the
//!   declaration graph; calls are resolved against their overload sets
//! - **Instantiation**: each resolved call is instantiated for its concrete
//!   signature, recursively, and cached on the callee
//!
//! ## Modules
//!
//! - [`driver`]: the body walker and its per-instance frames
//! - [`options`]: knobs for one session
//! - [`overload`]: candidate validation and ranking
//! - [`ownership`]: scope tracking and release order
//! - [`similarity`]: the directional type compatibility check
//! - [`suggest`]: "did you mean" hints
//! - [`synthesis`]: generated constructors, destructors and clones

mod capture;
pub mod driver;
pub mod options;
pub mod overload;
pub mod ownership;
pub mod similarity;
pub mod suggest;
pub mod synthesis;

pub use driver::{InstantiationState, InstantiationStats, Instantiator, Outcome};
pub use options::InstantiationOptions;
pub use overload::{CallArg, CandidateMatch, OverloadResolver, Rejection, Selection};
pub use ownership::{ScopeEntry, ScopeStack, release_order};
pub use similarity::{Similarity, TypeRef, is_similar};
pub use synthesis::SpecialMember;

// Re-export the error types callers match on
pub use sable_core::{CompilationError, Fault, InternalError};

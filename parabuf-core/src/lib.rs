#![forbid(unsafe_code)]

mod compile;
mod error;
pub mod kind;
pub mod mono;
pub mod subtype;
pub mod synonym;

pub use compile::{Compiled, compile};
pub use error::BuildError;
pub use kind::check;
pub use mono::{
    MAX_EXPANSION_DEPTH, MonoDef, MonoField, MonoKind, MonoProgram, MonoType, canonical_name,
    monomorphize,
};
pub use subtype::{Variance, infer_variance, is_subtype, is_subtype_applied};
pub use synonym::expand;

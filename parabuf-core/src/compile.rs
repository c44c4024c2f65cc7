#![forbid(unsafe_code)]

use parabuf_ast::Program;

use crate::error::BuildError;
use crate::mono::MonoProgram;

/// Result of the full build pipeline: the kind-checked, synonym-expanded
/// polymorphic program plus its monomorphized form.
#[derive(Clone, Debug)]
pub struct Compiled {
    pub program: Program,
    pub mono: MonoProgram,
}

/// Runs the whole pipeline: kind check, synonym expansion, monomorphization.
/// Any failure aborts the build; no partial output is produced.
pub fn compile(program: &Program) -> Result<Compiled, BuildError> {
    crate::kind::check(program)?;
    let expanded = crate::synonym::expand(program)?;
    let mono = crate::mono::monomorphize(&expanded)?;
    Ok(Compiled {
        program: expanded,
        mono,
    })
}

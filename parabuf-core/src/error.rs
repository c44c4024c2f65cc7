#![forbid(unsafe_code)]

use miette::Diagnostic;
use parabuf_ast::Span;
use thiserror::Error;

/// Static build errors. Any of these aborts the whole pipeline; no partial
/// codec set is produced downstream.
#[derive(Debug, Error, Diagnostic)]
pub enum BuildError {
    #[error("constructor `{ctor}` used where a type is required in `{def}`")]
    #[diagnostic(code(parabuf::kind::ctor_as_type))]
    ConstructorUsedAsType {
        def: String,
        ctor: String,
        #[label("in this definition")]
        span: Span,
    },

    #[error("`{ctor}` expects {expected} type argument(s) but is applied to {found} in `{def}`")]
    #[diagnostic(code(parabuf::kind::arity))]
    ArityMismatch {
        def: String,
        ctor: String,
        expected: usize,
        found: usize,
        #[label("in this definition")]
        span: Span,
    },

    #[error("unknown type `{ctor}` referenced from `{def}`")]
    #[diagnostic(code(parabuf::kind::unknown_type))]
    UnknownType {
        def: String,
        ctor: String,
        #[label("in this definition")]
        span: Span,
    },

    #[error("unbound type parameter `{param}` in `{def}`")]
    #[diagnostic(code(parabuf::kind::unbound_param))]
    UnboundParam {
        def: String,
        param: String,
        #[label("in this definition")]
        span: Span,
    },

    #[error("duplicate type parameter `{param}` in `{def}`")]
    #[diagnostic(code(parabuf::kind::duplicate_param))]
    DuplicateParam {
        def: String,
        param: String,
        #[label("in this definition")]
        span: Span,
    },

    #[error("duplicate definition `{name}`")]
    #[diagnostic(code(parabuf::kind::duplicate_def))]
    DuplicateDefinition {
        name: String,
        #[label("second definition here")]
        span: Span,
    },

    #[error("field number {number} used twice in `{def}` (`{first}` and `{second}`)")]
    #[diagnostic(code(parabuf::kind::field_number))]
    FieldNumberConflict {
        def: String,
        number: u32,
        first: String,
        second: String,
        #[label("conflicting field")]
        span: Span,
    },

    #[error("field number must be positive in `{def}.{field}`")]
    #[diagnostic(code(parabuf::kind::field_number))]
    InvalidFieldNumber {
        def: String,
        field: String,
        #[label("this field")]
        span: Span,
    },

    #[error("cyclic synonym: `{name}` expands through a chain back to itself")]
    #[diagnostic(code(parabuf::synonym::cycle))]
    CyclicSynonym {
        name: String,
        #[label("defined here")]
        span: Span,
    },

    #[error("synonym `{name}` was not expanded before monomorphization")]
    #[diagnostic(code(parabuf::mono::synonym))]
    UnexpandedSynonym {
        name: String,
        #[label("defined here")]
        span: Span,
    },

    #[error("canonical name `{name}` is produced by both `{first}` and `{second}`")]
    #[diagnostic(
        code(parabuf::mono::name_clash),
        help("rename one of the definitions so specialization names stay distinct")
    )]
    CanonicalNameClash {
        name: String,
        first: String,
        second: String,
    },

    #[error("unbounded generic expansion while instantiating `{ty}` (depth limit {limit})")]
    #[diagnostic(
        code(parabuf::mono::unbounded),
        help("a generic definition instantiates itself at ever-larger arguments")
    )]
    UnboundedExpansion { ty: String, limit: usize },
}

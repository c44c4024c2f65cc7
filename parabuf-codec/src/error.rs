#![forbid(unsafe_code)]

use miette::Diagnostic;
use thiserror::Error;

/// Low-level wire faults. Codecs propagate these unchanged; the one thing
/// that is deliberately *not* an error is an unknown field number during
/// decode, which is skipped for forward compatibility.
#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum WireError {
    #[error("varint ran past the end of input")]
    #[diagnostic(code(parabuf::wire::varint))]
    TruncatedVarint,

    #[error("input ended inside a length-delimited value")]
    #[diagnostic(code(parabuf::wire::truncated))]
    Truncated,

    #[error("length-delimited value overruns its enclosing object")]
    #[diagnostic(code(parabuf::wire::overrun))]
    LengthOverrun,

    #[error("field tag carries an out-of-range field number")]
    #[diagnostic(code(parabuf::wire::tag))]
    InvalidTag,

    #[error("unsupported wire type {0}")]
    #[diagnostic(code(parabuf::wire::wire_type))]
    UnsupportedWireType(u32),

    #[error("expected a {expected} value but found wire type {found}")]
    #[diagnostic(code(parabuf::wire::wire_type))]
    WireTypeMismatch { expected: &'static str, found: u32 },

    #[error("string field is not valid utf-8")]
    #[diagnostic(code(parabuf::wire::utf8))]
    InvalidUtf8,

    #[error("read outside of any object")]
    #[diagnostic(code(parabuf::wire::balance))]
    NotInObject,

    #[error("unbalanced object start/end")]
    #[diagnostic(code(parabuf::wire::balance))]
    UnbalancedObject,

    #[error("field {0} was started but no value was written")]
    #[diagnostic(code(parabuf::wire::balance))]
    EmptyField(u32),
}

/// Errors surfaced by codec `encode`/`decode`.
#[derive(Debug, Error, Diagnostic)]
pub enum CodecError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("codec for `{0}` expected a {1} value, got {2}")]
    #[diagnostic(code(parabuf::codec::value_shape))]
    ValueShape(String, &'static str, &'static str),

    #[error("message `{message}` has no field number {number}")]
    #[diagnostic(code(parabuf::codec::unknown_field))]
    UnknownField { message: String, number: u32 },

    #[error("union `{union}` has no variant number {number}")]
    #[diagnostic(code(parabuf::codec::unknown_variant))]
    UnknownVariant { union: String, number: u32 },

    #[error("decoded union `{0}` carried no recognized variant")]
    #[diagnostic(code(parabuf::codec::missing_variant))]
    MissingVariant(String),

    #[error("malformed embedded type representation: {0}")]
    #[diagnostic(code(parabuf::codec::type_rep))]
    MalformedTypeRep(String),

    #[error("codec for `{0}` was never linked")]
    #[diagnostic(code(parabuf::codec::unlinked))]
    Unlinked(String),
}

/// Runtime errors from the dynamic strategy. Recoverable by the caller
/// (register the missing constructor and retry); never silently ignored.
#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("no codec constructor registered for `{0}`")]
    #[diagnostic(
        code(parabuf::resolve::unknown),
        help("register the constructor before resolving it")
    )]
    UnknownConstructor(String),

    #[error("`{ctor}` expects {expected} argument(s), got {found}")]
    #[diagnostic(code(parabuf::resolve::arity))]
    ArityMismatch {
        ctor: String,
        expected: usize,
        found: usize,
    },

    #[error("layout of `{ctor}` refers to parameter `{param}` it does not declare")]
    #[diagnostic(code(parabuf::resolve::layout))]
    UnboundParameter { ctor: String, param: String },

    #[error("layout of `{ctor}` contains an unapplied constructor reference")]
    #[diagnostic(code(parabuf::resolve::layout))]
    InvalidLayout { ctor: String },

    #[error("unbounded expansion while resolving `{ty}` (depth limit {limit})")]
    #[diagnostic(code(parabuf::resolve::unbounded))]
    UnboundedExpansion { ty: String, limit: usize },
}

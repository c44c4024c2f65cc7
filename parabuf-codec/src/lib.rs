#![forbid(unsafe_code)]

mod codec;
mod error;
pub mod reflect;
pub mod registry;
pub mod static_set;
mod value;
pub mod wire;

pub use codec::{BaseCodec, Codec, FieldCodec, LateBound, MessageCodec, UnionCodec, base_codec};
pub use error::{CodecError, ResolutionError, WireError};
pub use reflect::{ReflectedCodec, TypeRep};
pub use registry::{MAX_RESOLVE_DEPTH, Registry};
pub use static_set::{CodecSet, DefArtifact, FieldArtifact, SchemaArtifact, emit_artifact};
pub use value::Value;
pub use wire::{BinarySink, BinarySource, MAX_FIELD_NUMBER, WireSink, WireSource};

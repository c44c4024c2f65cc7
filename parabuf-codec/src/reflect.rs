#![forbid(unsafe_code)]

use std::sync::Arc;

use parabuf_ast::{BaseType, TypeExpr};

use crate::codec::Codec;
use crate::error::CodecError;
use crate::registry::{MAX_RESOLVE_DEPTH, Registry};
use crate::value::Value;
use crate::wire::{BinarySink, BinarySource, WireSink, WireSource};

/// A monomorphic type carried as data: the runtime mirror of a fully
/// applied type expression, used as the resolution key of the dynamic
/// strategy and as the embedded tag of reflected values.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeRep {
    Base(BaseType),
    Applied { ctor: String, args: Vec<TypeRep> },
}

impl TypeRep {
    pub fn applied(ctor: impl Into<String>, args: Vec<TypeRep>) -> Self {
        TypeRep::Applied {
            ctor: ctor.into(),
            args,
        }
    }

    /// Converts a monomorphic type expression; `None` if the expression
    /// still contains parameters or unapplied constructors.
    pub fn from_type_expr(ty: &TypeExpr) -> Option<Self> {
        match ty {
            TypeExpr::Base(b) => Some(TypeRep::Base(*b)),
            TypeExpr::Applied { ctor, args } => {
                let args = args
                    .iter()
                    .map(Self::from_type_expr)
                    .collect::<Option<Vec<_>>>()?;
                Some(TypeRep::applied(ctor.clone(), args))
            }
            TypeExpr::Param(_) | TypeExpr::Ctor { .. } => None,
        }
    }

    pub fn display(&self) -> String {
        match self {
            TypeRep::Base(b) => b.name().to_string(),
            TypeRep::Applied { ctor, args } => {
                if args.is_empty() {
                    ctor.clone()
                } else {
                    let args_s = args
                        .iter()
                        .map(|a| a.display())
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("{ctor}<{args_s}>")
                }
            }
        }
    }
}

const REP_KIND: u32 = 1;
const REP_NAME: u32 = 2;
const REP_ARG: u32 = 3;

const KIND_BASE: u64 = 0;
const KIND_APPLIED: u64 = 1;

const REFLECTED_REP: u32 = 1;
const REFLECTED_PAYLOAD: u32 = 2;

/// Built-in codec for reflected values: a self-describing `TypeRep` (field
/// 1) next to an opaque encoded payload (field 2). Decode re-resolves the
/// payload codec from the embedded rep through the registry.
pub struct ReflectedCodec {
    registry: Arc<Registry>,
}

impl ReflectedCodec {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

impl Codec for ReflectedCodec {
    fn encode(&self, sink: &mut dyn WireSink, value: &Value) -> Result<(), CodecError> {
        let Value::Reflected { rep, value } = value else {
            return Err(CodecError::ValueShape(
                "Reflected".to_string(),
                "reflected",
                value.kind_name(),
            ));
        };
        let codec = self.registry.resolve(rep)?;
        let mut inner = BinarySink::new();
        codec.encode(&mut inner, value)?;
        let payload = inner.finish()?;

        sink.start_object()?;
        sink.start_field(REFLECTED_REP)?;
        encode_rep(sink, rep)?;
        sink.end_field()?;
        sink.start_field(REFLECTED_PAYLOAD)?;
        sink.write_bytes(&payload)?;
        sink.end_field()?;
        Ok(sink.end_object()?)
    }

    fn decode(&self, source: &mut dyn WireSource) -> Result<Value, CodecError> {
        source.start_object()?;
        let mut rep = None;
        let mut payload = None;
        while let Some(number) = source.next_field()? {
            match number {
                REFLECTED_REP => rep = Some(decode_rep(source, 0)?),
                REFLECTED_PAYLOAD => payload = Some(source.read_bytes()?),
                _ => source.skip_field()?,
            }
        }
        source.end_object()?;

        let rep = rep.ok_or_else(|| {
            CodecError::MalformedTypeRep("reflected value carries no type".to_string())
        })?;
        let payload = payload.ok_or_else(|| {
            CodecError::MalformedTypeRep("reflected value carries no payload".to_string())
        })?;
        let codec = self.registry.resolve(&rep)?;
        let mut inner = BinarySource::new(&payload);
        let value = codec.decode(&mut inner)?;
        Ok(Value::reflected(rep, value))
    }
}

fn encode_rep(sink: &mut dyn WireSink, rep: &TypeRep) -> Result<(), CodecError> {
    sink.start_object()?;
    match rep {
        TypeRep::Base(b) => {
            sink.start_field(REP_KIND)?;
            sink.write_varint(KIND_BASE)?;
            sink.end_field()?;
            sink.start_field(REP_NAME)?;
            sink.write_str(b.name())?;
            sink.end_field()?;
        }
        TypeRep::Applied { ctor, args } => {
            sink.start_field(REP_KIND)?;
            sink.write_varint(KIND_APPLIED)?;
            sink.end_field()?;
            sink.start_field(REP_NAME)?;
            sink.write_str(ctor)?;
            sink.end_field()?;
            for arg in args {
                sink.start_field(REP_ARG)?;
                encode_rep(sink, arg)?;
                sink.end_field()?;
            }
        }
    }
    Ok(sink.end_object()?)
}

fn decode_rep(source: &mut dyn WireSource, depth: usize) -> Result<TypeRep, CodecError> {
    // Hostile input could nest type nodes arbitrarily deep; anything past
    // the resolution limit could never resolve anyway.
    if depth > MAX_RESOLVE_DEPTH {
        return Err(CodecError::MalformedTypeRep(format!(
            "type tree deeper than {MAX_RESOLVE_DEPTH}"
        )));
    }
    source.start_object()?;
    let mut kind = KIND_APPLIED;
    let mut name = None;
    let mut args = Vec::new();
    while let Some(number) = source.next_field()? {
        match number {
            REP_KIND => kind = source.read_varint()?,
            REP_NAME => name = Some(source.read_str()?),
            REP_ARG => args.push(decode_rep(source, depth + 1)?),
            _ => source.skip_field()?,
        }
    }
    source.end_object()?;

    let name = name
        .ok_or_else(|| CodecError::MalformedTypeRep("type node carries no name".to_string()))?;
    match kind {
        KIND_BASE => BaseType::from_name(&name)
            .map(TypeRep::Base)
            .ok_or_else(|| CodecError::MalformedTypeRep(format!("unknown base type `{name}`"))),
        KIND_APPLIED => Ok(TypeRep::applied(name, args)),
        other => Err(CodecError::MalformedTypeRep(format!(
            "unknown type node kind {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parabuf_core::MonoKind;

    fn registry() -> Arc<Registry> {
        let registry = Registry::new();
        registry.register(
            "Option",
            vec!["A".into()],
            MonoKind::Union,
            vec![
                (1, "none".into(), TypeExpr::base(BaseType::Unit)),
                (2, "some".into(), TypeExpr::param("A")),
            ],
        );
        Arc::new(registry)
    }

    #[test]
    fn reflected_value_round_trips() {
        let codec = ReflectedCodec::new(registry());
        let rep = TypeRep::applied("Option", vec![TypeRep::Base(BaseType::Int32)]);
        let value = Value::reflected(rep, Value::union(2, Value::Int32(41)));

        let mut sink = BinarySink::new();
        codec.encode(&mut sink, &value).unwrap();
        let bytes = sink.finish().unwrap();
        let mut source = BinarySource::new(&bytes);
        assert_eq!(codec.decode(&mut source).unwrap(), value);
    }

    #[test]
    fn decoding_an_unregistered_rep_fails_with_resolution_error() {
        let codec = ReflectedCodec::new(registry());
        let rep = TypeRep::applied("Mystery", vec![]);
        let value = Value::reflected(rep, Value::Unit);
        let mut sink = BinarySink::new();
        assert!(matches!(
            codec.encode(&mut sink, &value),
            Err(CodecError::Resolution(_))
        ));
    }

    #[test]
    fn deeply_nested_type_reps_are_rejected_on_decode() {
        let mut rep = TypeRep::Base(BaseType::Unit);
        for _ in 0..(MAX_RESOLVE_DEPTH + 2) {
            rep = TypeRep::applied("L", vec![rep]);
        }
        let mut sink = BinarySink::new();
        sink.start_object().unwrap();
        sink.start_field(1).unwrap();
        encode_rep(&mut sink, &rep).unwrap();
        sink.end_field().unwrap();
        sink.end_object().unwrap();
        let bytes = sink.finish().unwrap();

        let mut source = BinarySource::new(&bytes);
        source.start_object().unwrap();
        assert_eq!(source.next_field().unwrap(), Some(1));
        assert!(matches!(
            decode_rep(&mut source, 0),
            Err(CodecError::MalformedTypeRep(_))
        ));
    }

    #[test]
    fn from_type_expr_rejects_open_types() {
        assert_eq!(
            TypeRep::from_type_expr(&TypeExpr::param("A")),
            None
        );
        let ty = TypeExpr::applied("Option", vec![TypeExpr::base(BaseType::Bool)]);
        assert_eq!(
            TypeRep::from_type_expr(&ty),
            Some(TypeRep::applied("Option", vec![TypeRep::Base(BaseType::Bool)]))
        );
    }
}

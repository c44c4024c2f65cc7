#![forbid(unsafe_code)]

use std::sync::{Arc, OnceLock};

use parabuf_ast::BaseType;

use crate::error::CodecError;
use crate::value::Value;
use crate::wire::{WireSink, WireSource};

/// One concrete encode/decode pair against the wire-primitive DSL.
///
/// A codec carries no per-call mutable state, so a single instance may be
/// used concurrently from independent encode/decode sites; all state lives
/// in the sink/source it is handed.
pub trait Codec: Send + Sync {
    fn encode(&self, sink: &mut dyn WireSink, value: &Value) -> Result<(), CodecError>;
    fn decode(&self, source: &mut dyn WireSource) -> Result<Value, CodecError>;
}

impl std::fmt::Debug for dyn Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Codec")
    }
}

/// Codec for one builtin scalar type.
pub struct BaseCodec(pub BaseType);

pub fn base_codec(b: BaseType) -> Arc<dyn Codec> {
    Arc::new(BaseCodec(b))
}

impl Codec for BaseCodec {
    fn encode(&self, sink: &mut dyn WireSink, value: &Value) -> Result<(), CodecError> {
        match (self.0, value) {
            (BaseType::Int32, Value::Int32(v)) => Ok(sink.write_i32(*v)?),
            (BaseType::Int64, Value::Int64(v)) => Ok(sink.write_i64(*v)?),
            (BaseType::Bool, Value::Bool(v)) => Ok(sink.write_bool(*v)?),
            (BaseType::Str, Value::Str(v)) => Ok(sink.write_str(v)?),
            (BaseType::Bytes, Value::Bytes(v)) => Ok(sink.write_bytes(v)?),
            (BaseType::Unit, Value::Unit) => {
                // Zero-length object: keeps every union variant tag-compatible.
                sink.start_object()?;
                Ok(sink.end_object()?)
            }
            (b, v) => Err(CodecError::ValueShape(
                b.name().to_string(),
                b.name(),
                v.kind_name(),
            )),
        }
    }

    fn decode(&self, source: &mut dyn WireSource) -> Result<Value, CodecError> {
        match self.0 {
            BaseType::Int32 => Ok(Value::Int32(source.read_i32()?)),
            BaseType::Int64 => Ok(Value::Int64(source.read_i64()?)),
            BaseType::Bool => Ok(Value::Bool(source.read_bool()?)),
            BaseType::Str => Ok(Value::Str(source.read_str()?)),
            BaseType::Bytes => Ok(Value::Bytes(source.read_bytes()?)),
            BaseType::Unit => {
                source.start_object()?;
                while source.next_field()?.is_some() {
                    source.skip_field()?;
                }
                source.end_object()?;
                Ok(Value::Unit)
            }
        }
    }
}

/// A field (or union variant) wired to the codec for its type. Field codecs
/// are shared, not owned: the same codec may back many enclosing codecs.
#[derive(Clone)]
pub struct FieldCodec {
    pub number: u32,
    pub name: String,
    pub codec: Arc<dyn Codec>,
}

pub struct MessageCodec {
    name: String,
    fields: Vec<FieldCodec>,
}

impl MessageCodec {
    pub fn new(name: impl Into<String>, fields: Vec<FieldCodec>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    fn field(&self, number: u32) -> Option<&FieldCodec> {
        self.fields.iter().find(|f| f.number == number)
    }
}

impl Codec for MessageCodec {
    fn encode(&self, sink: &mut dyn WireSink, value: &Value) -> Result<(), CodecError> {
        let Value::Message(entries) = value else {
            return Err(CodecError::ValueShape(
                self.name.clone(),
                "message",
                value.kind_name(),
            ));
        };
        for (number, _) in entries {
            if self.field(*number).is_none() {
                return Err(CodecError::UnknownField {
                    message: self.name.clone(),
                    number: *number,
                });
            }
        }
        sink.start_object()?;
        // Declared order, skipping fields absent from the value.
        for fc in &self.fields {
            if let Some(v) = entries.iter().find(|(n, _)| *n == fc.number).map(|(_, v)| v) {
                sink.start_field(fc.number)?;
                fc.codec.encode(sink, v)?;
                sink.end_field()?;
            }
        }
        Ok(sink.end_object()?)
    }

    fn decode(&self, source: &mut dyn WireSource) -> Result<Value, CodecError> {
        source.start_object()?;
        let mut got: Vec<(u32, Value)> = Vec::new();
        while let Some(number) = source.next_field()? {
            match self.field(number) {
                Some(fc) => {
                    let v = fc.codec.decode(source)?;
                    // Repeated occurrences: last one wins.
                    match got.iter_mut().find(|(n, _)| *n == number) {
                        Some(slot) => slot.1 = v,
                        None => got.push((number, v)),
                    }
                }
                // Unknown field numbers are skipped, not errors.
                None => source.skip_field()?,
            }
        }
        source.end_object()?;

        let mut ordered = Vec::with_capacity(got.len());
        for fc in &self.fields {
            if let Some(idx) = got.iter().position(|(n, _)| *n == fc.number) {
                ordered.push(got.swap_remove(idx));
            }
        }
        Ok(Value::Message(ordered))
    }
}

pub struct UnionCodec {
    name: String,
    variants: Vec<FieldCodec>,
}

impl UnionCodec {
    pub fn new(name: impl Into<String>, variants: Vec<FieldCodec>) -> Self {
        Self {
            name: name.into(),
            variants,
        }
    }

    fn variant(&self, number: u32) -> Option<&FieldCodec> {
        self.variants.iter().find(|f| f.number == number)
    }
}

impl Codec for UnionCodec {
    fn encode(&self, sink: &mut dyn WireSink, value: &Value) -> Result<(), CodecError> {
        let Value::Union { number, value } = value else {
            return Err(CodecError::ValueShape(
                self.name.clone(),
                "union",
                value.kind_name(),
            ));
        };
        let Some(fc) = self.variant(*number) else {
            return Err(CodecError::UnknownVariant {
                union: self.name.clone(),
                number: *number,
            });
        };
        sink.start_object()?;
        sink.start_field(fc.number)?;
        fc.codec.encode(sink, value)?;
        sink.end_field()?;
        Ok(sink.end_object()?)
    }

    fn decode(&self, source: &mut dyn WireSource) -> Result<Value, CodecError> {
        source.start_object()?;
        let mut found: Option<(u32, Value)> = None;
        while let Some(number) = source.next_field()? {
            match self.variant(number) {
                Some(fc) => found = Some((number, fc.codec.decode(source)?)),
                None => source.skip_field()?,
            }
        }
        source.end_object()?;
        match found {
            Some((number, value)) => Ok(Value::union(number, value)),
            None => Err(CodecError::MissingVariant(self.name.clone())),
        }
    }
}

/// Write-once indirection used to link recursive codec graphs.
///
/// Both strategies create the slot first, construct the codec, then bind it;
/// binding is first-writer-wins. An unbound slot reached at encode/decode
/// time reports `Unlinked` instead of panicking.
pub struct LateBound {
    name: String,
    slot: OnceLock<Arc<dyn Codec>>,
}

impl LateBound {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            slot: OnceLock::new(),
        })
    }

    pub fn bind(&self, codec: Arc<dyn Codec>) {
        let _ = self.slot.set(codec);
    }

    fn get(&self) -> Result<&Arc<dyn Codec>, CodecError> {
        self.slot
            .get()
            .ok_or_else(|| CodecError::Unlinked(self.name.clone()))
    }
}

impl Codec for LateBound {
    fn encode(&self, sink: &mut dyn WireSink, value: &Value) -> Result<(), CodecError> {
        self.get()?.encode(sink, value)
    }

    fn decode(&self, source: &mut dyn WireSource) -> Result<Value, CodecError> {
        self.get()?.decode(source)
    }
}

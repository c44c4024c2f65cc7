#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use parabuf_core::{MonoKind, MonoProgram, MonoType};

use crate::codec::{Codec, FieldCodec, LateBound, MessageCodec, UnionCodec, base_codec};

/// Static strategy: one specialized codec per canonical definition, wired to
/// its field codecs by canonical name when the set is built. No name lookup
/// happens on the encode/decode path.
pub struct CodecSet {
    by_name: BTreeMap<String, Arc<dyn Codec>>,
}

impl CodecSet {
    /// Builds the full codec set for a monomorphized program.
    ///
    /// Two-phase: a write-once slot is created per definition first, then
    /// every concrete codec is constructed against those slots, so mutually
    /// recursive definitions link up without special-casing.
    pub fn build(mono: &MonoProgram) -> Self {
        let slots: BTreeMap<&str, Arc<LateBound>> = mono
            .defs
            .iter()
            .map(|d| (d.name.as_str(), LateBound::new(d.name.clone())))
            .collect();

        let mut by_name = BTreeMap::new();
        for def in &mono.defs {
            let fields = def
                .fields
                .iter()
                .map(|f| FieldCodec {
                    number: f.number,
                    name: f.name.clone(),
                    codec: match &f.ty {
                        MonoType::Base(b) => base_codec(*b),
                        MonoType::Named(n) => match slots.get(n.as_str()) {
                            Some(slot) => {
                                let codec: Arc<dyn Codec> = slot.clone();
                                codec
                            }
                            // A dangling name surfaces as `Unlinked` at use.
                            None => {
                                let codec: Arc<dyn Codec> = LateBound::new(n.clone());
                                codec
                            }
                        },
                    },
                })
                .collect();
            let codec: Arc<dyn Codec> = match def.kind {
                MonoKind::Message => Arc::new(MessageCodec::new(&def.name, fields)),
                MonoKind::Union => Arc::new(UnionCodec::new(&def.name, fields)),
            };
            if let Some(slot) = slots.get(def.name.as_str()) {
                slot.bind(codec.clone());
            }
            by_name.insert(def.name.clone(), codec);
        }
        Self { by_name }
    }

    pub fn codec(&self, name: &str) -> Option<Arc<dyn Codec>> {
        self.by_name.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }
}

/// Deterministic codegen artifact: the canonical monomorphic schema plus the
/// per-codec wiring table, ready for a downstream emission backend. Ordering
/// is by canonical name, so the rendering is byte-stable across runs.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SchemaArtifact {
    pub defs: BTreeMap<String, DefArtifact>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct DefArtifact {
    pub kind: String,
    pub fields: Vec<FieldArtifact>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct FieldArtifact {
    pub number: u32,
    pub name: String,
    pub codec: String,
}

pub fn emit_artifact(mono: &MonoProgram) -> SchemaArtifact {
    let defs = mono
        .defs
        .iter()
        .map(|def| {
            let fields = def
                .fields
                .iter()
                .map(|f| FieldArtifact {
                    number: f.number,
                    name: f.name.clone(),
                    codec: f.ty.display(),
                })
                .collect();
            let kind = match def.kind {
                MonoKind::Message => "message".to_string(),
                MonoKind::Union => "union".to_string(),
            };
            (def.name.clone(), DefArtifact { kind, fields })
        })
        .collect();
    SchemaArtifact { defs }
}

impl SchemaArtifact {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use crate::wire::{BinarySink, BinarySource};
    use parabuf_ast::{BaseType, Definition, Field, Program, TypeExpr};
    use parabuf_core::compile;

    fn sample() -> MonoProgram {
        let program = Program::new(vec![
            Definition::union(
                "Option",
                vec!["A".into()],
                vec![
                    Field::new(1, "none", TypeExpr::base(BaseType::Unit)),
                    Field::new(2, "some", TypeExpr::param("A")),
                ],
            ),
            Definition::message(
                "Parent",
                vec![],
                vec![Field::new(
                    1,
                    "x",
                    TypeExpr::applied("Option", vec![TypeExpr::base(BaseType::Int32)]),
                )],
            ),
        ]);
        compile(&program).unwrap().mono
    }

    #[test]
    fn built_set_round_trips_values() {
        let set = CodecSet::build(&sample());
        let codec = set.codec("Parent").unwrap();
        let value = Value::message(vec![(1, Value::union(2, Value::Int32(7)))]);

        let mut sink = BinarySink::new();
        codec.encode(&mut sink, &value).unwrap();
        let bytes = sink.finish().unwrap();

        let mut source = BinarySource::new(&bytes);
        assert_eq!(codec.decode(&mut source).unwrap(), value);
    }

    #[test]
    fn recursive_definitions_link_up() {
        let program = Program::new(vec![
            Definition::message(
                "List",
                vec!["A".into()],
                vec![
                    Field::new(1, "item", TypeExpr::param("A")),
                    Field::new(
                        2,
                        "rest",
                        TypeExpr::applied("List", vec![TypeExpr::param("A")]),
                    ),
                ],
            ),
            Definition::message(
                "Holder",
                vec![],
                vec![Field::new(
                    1,
                    "l",
                    TypeExpr::applied("List", vec![TypeExpr::base(BaseType::Int32)]),
                )],
            ),
        ]);
        let mono = compile(&program).unwrap().mono;
        let set = CodecSet::build(&mono);
        let codec = set.codec("List_Int32").unwrap();

        let value = Value::message(vec![
            (1, Value::Int32(1)),
            (2, Value::message(vec![(1, Value::Int32(2))])),
        ]);
        let mut sink = BinarySink::new();
        codec.encode(&mut sink, &value).unwrap();
        let bytes = sink.finish().unwrap();
        let mut source = BinarySource::new(&bytes);
        assert_eq!(codec.decode(&mut source).unwrap(), value);
    }

    #[test]
    fn artifact_is_deterministic() {
        let mono = sample();
        let a = emit_artifact(&mono).to_json().unwrap();
        let b = emit_artifact(&mono).to_json().unwrap();
        assert_eq!(a, b);
        assert!(a.contains("Option_Int32"));
    }

    #[test]
    fn artifact_names_field_codecs() {
        let artifact = emit_artifact(&sample());
        let parent = &artifact.defs["Parent"];
        assert_eq!(parent.kind, "message");
        assert_eq!(parent.fields[0].codec, "Option_Int32");
        let option = &artifact.defs["Option_Int32"];
        assert_eq!(option.kind, "union");
        assert_eq!(option.fields[0].codec, "unit");
        assert_eq!(option.fields[1].codec, "int32");
    }
}

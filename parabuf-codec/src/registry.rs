#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use parabuf_ast::{Definition, Program, TypeExpr};
use parabuf_core::MonoKind;

use crate::codec::{Codec, FieldCodec, LateBound, MessageCodec, UnionCodec, base_codec};
use crate::error::ResolutionError;
use crate::reflect::TypeRep;

/// Resolution trees deeper than this are treated as unbounded expansion,
/// mirroring the build-time guard in monomorphization.
pub const MAX_RESOLVE_DEPTH: usize = 64;

/// The registered shape of one type constructor: its declared parameters
/// and its field layout, which may mention those parameters.
struct CtorEntry {
    params: Vec<String>,
    kind: MonoKind,
    fields: Vec<(u32, String, TypeExpr)>,
}

/// Dynamic strategy: an explicit, injectable registry of codec constructors.
///
/// `resolve` builds codecs on demand from registered constructor layouts and
/// memoizes them per structural `TypeRep`, so repeated requests for the same
/// instantiation return the same codec instance. The memoization cache only
/// ever holds fully constructed codecs: concurrent resolvers race to build
/// equal codecs and the first writer wins, the duplicate being discarded.
#[derive(Default)]
pub struct Registry {
    ctors: RwLock<HashMap<String, Arc<CtorEntry>>>,
    cache: RwLock<HashMap<TypeRep, Arc<LateBound>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a constructor for every message/union in a kind-checked,
    /// synonym-expanded program.
    pub fn from_program(program: &Program) -> Self {
        let registry = Self::new();
        for def in &program.defs {
            match def {
                Definition::Message(m) => registry.register(
                    &m.name,
                    m.params.clone(),
                    MonoKind::Message,
                    m.fields
                        .iter()
                        .map(|f| (f.number, f.name.clone(), f.ty.clone()))
                        .collect(),
                ),
                Definition::Union(u) => registry.register(
                    &u.name,
                    u.params.clone(),
                    MonoKind::Union,
                    u.variants
                        .iter()
                        .map(|f| (f.number, f.name.clone(), f.ty.clone()))
                        .collect(),
                ),
                // Synonyms are expanded away before codecs exist.
                Definition::Synonym(_) => {}
            }
        }
        registry
    }

    pub fn register(
        &self,
        name: &str,
        params: Vec<String>,
        kind: MonoKind,
        fields: Vec<(u32, String, TypeExpr)>,
    ) {
        let entry = Arc::new(CtorEntry {
            params,
            kind,
            fields,
        });
        self.ctors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), entry);
    }

    /// Clears the memoization cache, forcing re-resolution. Registered
    /// constructors stay installed.
    pub fn reset(&self) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn resolve(&self, rep: &TypeRep) -> Result<Arc<dyn Codec>, ResolutionError> {
        let mut in_progress = HashMap::new();
        let codec = self.build(rep, &mut in_progress, 0)?;

        // Commit only after the whole graph is linked, so cache readers
        // never see a partially constructed codec; on a race the first
        // writer wins and the duplicate is discarded.
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        for (key, slot) in in_progress {
            cache.entry(key).or_insert(slot);
        }
        if let Some(slot) = cache.get(rep) {
            let codec: Arc<dyn Codec> = slot.clone();
            return Ok(codec);
        }
        Ok(codec)
    }

    pub fn resolve_ctor(
        &self,
        ctor: &str,
        args: &[TypeRep],
    ) -> Result<Arc<dyn Codec>, ResolutionError> {
        self.resolve(&TypeRep::applied(ctor, args.to_vec()))
    }

    fn build(
        &self,
        rep: &TypeRep,
        in_progress: &mut HashMap<TypeRep, Arc<LateBound>>,
        depth: usize,
    ) -> Result<Arc<dyn Codec>, ResolutionError> {
        if depth > MAX_RESOLVE_DEPTH {
            return Err(ResolutionError::UnboundedExpansion {
                ty: rep.display(),
                limit: MAX_RESOLVE_DEPTH,
            });
        }
        let (ctor, args) = match rep {
            TypeRep::Base(b) => return Ok(base_codec(*b)),
            TypeRep::Applied { ctor, args } => (ctor, args),
        };

        if let Some(slot) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(rep)
        {
            let codec: Arc<dyn Codec> = slot.clone();
            return Ok(codec);
        }
        if let Some(slot) = in_progress.get(rep) {
            let codec: Arc<dyn Codec> = slot.clone();
            return Ok(codec);
        }

        let entry = self
            .ctors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(ctor)
            .cloned()
            .ok_or_else(|| ResolutionError::UnknownConstructor(ctor.clone()))?;
        if entry.params.len() != args.len() {
            return Err(ResolutionError::ArityMismatch {
                ctor: ctor.clone(),
                expected: entry.params.len(),
                found: args.len(),
            });
        }

        let slot = LateBound::new(rep.display());
        in_progress.insert(rep.clone(), slot.clone());

        let subst: HashMap<&str, &TypeRep> = entry
            .params
            .iter()
            .map(String::as_str)
            .zip(args.iter())
            .collect();
        let mut fields = Vec::with_capacity(entry.fields.len());
        for (number, name, ty) in &entry.fields {
            let field_rep = instantiate(ctor, ty, &subst)?;
            let codec = self.build(&field_rep, in_progress, depth + 1)?;
            fields.push(FieldCodec {
                number: *number,
                name: name.clone(),
                codec,
            });
        }
        let codec: Arc<dyn Codec> = match entry.kind {
            MonoKind::Message => Arc::new(MessageCodec::new(rep.display(), fields)),
            MonoKind::Union => Arc::new(UnionCodec::new(rep.display(), fields)),
        };
        slot.bind(codec);
        let codec: Arc<dyn Codec> = slot;
        Ok(codec)
    }
}

/// Substitutes argument reps into a constructor's field layout.
fn instantiate(
    ctor: &str,
    ty: &TypeExpr,
    subst: &HashMap<&str, &TypeRep>,
) -> Result<TypeRep, ResolutionError> {
    match ty {
        TypeExpr::Base(b) => Ok(TypeRep::Base(*b)),
        TypeExpr::Param(p) => subst.get(p.as_str()).map(|r| (*r).clone()).ok_or_else(|| {
            ResolutionError::UnboundParameter {
                ctor: ctor.to_string(),
                param: p.clone(),
            }
        }),
        TypeExpr::Applied { ctor: c, args } => {
            let args = args
                .iter()
                .map(|a| instantiate(ctor, a, subst))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(TypeRep::applied(c.clone(), args))
        }
        TypeExpr::Ctor { .. } => Err(ResolutionError::InvalidLayout {
            ctor: ctor.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use crate::wire::{BinarySink, BinarySource};
    use parabuf_ast::BaseType;

    fn option_registry() -> Registry {
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
        registry
    }

    fn int_option() -> TypeRep {
        TypeRep::applied("Option", vec![TypeRep::Base(BaseType::Int32)])
    }

    #[test]
    fn resolved_codec_round_trips() {
        let registry = option_registry();
        let codec = registry.resolve(&int_option()).unwrap();
        let value = Value::union(2, Value::Int32(7));

        let mut sink = BinarySink::new();
        codec.encode(&mut sink, &value).unwrap();
        let bytes = sink.finish().unwrap();
        let mut source = BinarySource::new(&bytes);
        assert_eq!(codec.decode(&mut source).unwrap(), value);
    }

    #[test]
    fn resolution_is_memoized_per_instantiation() {
        let registry = option_registry();
        let a = registry.resolve(&int_option()).unwrap();
        let b = registry.resolve(&int_option()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let other = registry
            .resolve(&TypeRep::applied("Option", vec![TypeRep::Base(BaseType::Bool)]))
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[test]
    fn reset_forces_reresolution() {
        let registry = option_registry();
        let a = registry.resolve(&int_option()).unwrap();
        registry.reset();
        let b = registry.resolve(&int_option()).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn unknown_constructor_is_reported() {
        let registry = Registry::new();
        assert_eq!(
            registry.resolve_ctor("Unregistered", &[]).unwrap_err(),
            ResolutionError::UnknownConstructor("Unregistered".into())
        );
    }

    #[test]
    fn arity_mismatch_is_reported() {
        let registry = option_registry();
        assert_eq!(
            registry.resolve_ctor("Option", &[]).unwrap_err(),
            ResolutionError::ArityMismatch {
                ctor: "Option".into(),
                expected: 1,
                found: 0
            }
        );
    }

    #[test]
    fn recursive_constructors_resolve_through_the_slot() {
        let registry = Registry::new();
        registry.register(
            "List",
            vec!["A".into()],
            MonoKind::Message,
            vec![
                (1, "item".into(), TypeExpr::param("A")),
                (
                    2,
                    "rest".into(),
                    TypeExpr::applied("List", vec![TypeExpr::param("A")]),
                ),
            ],
        );
        let codec = registry
            .resolve(&TypeRep::applied("List", vec![TypeRep::Base(BaseType::Int32)]))
            .unwrap();
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
    fn growing_instantiations_are_rejected_at_resolve_time() {
        let registry = Registry::new();
        registry.register(
            "Pair",
            vec!["A".into(), "B".into()],
            MonoKind::Message,
            vec![
                (1, "first".into(), TypeExpr::param("A")),
                (2, "second".into(), TypeExpr::param("B")),
            ],
        );
        registry.register(
            "Bad",
            vec!["A".into()],
            MonoKind::Message,
            vec![(
                1,
                "next".into(),
                TypeExpr::applied(
                    "Bad",
                    vec![TypeExpr::applied(
                        "Pair",
                        vec![TypeExpr::param("A"), TypeExpr::param("A")],
                    )],
                ),
            )],
        );
        assert!(matches!(
            registry.resolve_ctor("Bad", &[TypeRep::Base(BaseType::Int32)]),
            Err(ResolutionError::UnboundedExpansion { .. })
        ));
    }

    #[test]
    fn field_lookup_errors_name_the_offender() {
        let registry = Registry::new();
        registry.register(
            "Holder",
            vec![],
            MonoKind::Message,
            vec![(1, "x".into(), TypeExpr::param("Ghost"))],
        );
        assert_eq!(
            registry.resolve_ctor("Holder", &[]).unwrap_err(),
            ResolutionError::UnboundParameter {
                ctor: "Holder".into(),
                param: "Ghost".into()
            }
        );
    }
}

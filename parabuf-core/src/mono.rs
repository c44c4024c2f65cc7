#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet, VecDeque};

use parabuf_ast::{BaseType, Definition, Field, Program, TypeExpr, span};

use crate::error::BuildError;

/// Instantiation trees deeper than this are treated as unbounded expansion
/// (a generic definition instantiating itself at ever-larger arguments).
pub const MAX_EXPANSION_DEPTH: usize = 64;

/// A fully-monomorphic type: either a builtin scalar or a reference to a
/// canonical definition by name. No type parameters survive to this stage.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MonoType {
    Base(BaseType),
    Named(String),
}

impl MonoType {
    pub fn display(&self) -> String {
        match self {
            MonoType::Base(b) => b.name().to_string(),
            MonoType::Named(n) => n.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MonoKind {
    Message,
    Union,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MonoField {
    pub number: u32,
    pub name: String,
    pub ty: MonoType,
}

/// One canonical monomorphic definition: either a root definition that had
/// no parameters, or a specialized instantiation of a generic one.
#[derive(Clone, Debug, PartialEq)]
pub struct MonoDef {
    pub name: String,
    pub kind: MonoKind,
    pub fields: Vec<MonoField>,
}

/// Output of monomorphization: every canonical definition reachable from the
/// monomorphic roots, in deterministic discovery order, plus the mapping
/// from fully-applied instantiation trees to their canonical names.
#[derive(Clone, Debug, Default)]
pub struct MonoProgram {
    pub defs: Vec<MonoDef>,
    pub names: HashMap<TypeExpr, String>,
}

impl MonoProgram {
    pub fn get(&self, name: &str) -> Option<&MonoDef> {
        self.defs.iter().find(|d| d.name == name)
    }

    pub fn name_of(&self, ty: &TypeExpr) -> Option<&str> {
        self.names.get(ty).map(String::as_str)
    }
}

/// Canonical name for a monomorphic instantiation tree.
///
/// Prefix rendering: constructor name followed by the rendering of each
/// argument, joined with `_` (`Option_Int32`, `Pair_Option_Int32_Bool`).
/// Structurally equal trees always render equally; the converse can fail
/// when a source name itself contains `_`, so monomorphization claims each
/// rendered name for exactly one tree and rejects any clash.
pub fn canonical_name(ty: &TypeExpr) -> String {
    match ty {
        TypeExpr::Base(b) => mangle_base(*b).to_string(),
        TypeExpr::Param(p) => p.clone(),
        TypeExpr::Ctor { name, .. } => name.clone(),
        TypeExpr::Applied { ctor, args } => {
            if args.is_empty() {
                ctor.clone()
            } else {
                let mut out = ctor.clone();
                for arg in args {
                    out.push('_');
                    out.push_str(&canonical_name(arg));
                }
                out
            }
        }
    }
}

fn mangle_base(b: BaseType) -> &'static str {
    match b {
        BaseType::Int32 => "Int32",
        BaseType::Int64 => "Int64",
        BaseType::Bool => "Bool",
        BaseType::Unit => "Unit",
        BaseType::Str => "String",
        BaseType::Bytes => "Bytes",
    }
}

/// Monomorphizes a kind-checked, synonym-expanded program: discovers every
/// distinct fully-applied instantiation reachable from the zero-parameter
/// roots and emits one canonical definition per instantiation.
pub fn monomorphize(program: &Program) -> Result<MonoProgram, BuildError> {
    Monomorphizer::new(program).run()
}

struct Monomorphizer<'a> {
    program: &'a Program,
    by_name: HashMap<&'a str, &'a Definition>,
    names: HashMap<TypeExpr, String>,
    owners: HashMap<String, TypeExpr>,
    defs: Vec<MonoDef>,
    emitted: HashSet<String>,
    worklist: VecDeque<TypeExpr>,
}

impl<'a> Monomorphizer<'a> {
    fn new(program: &'a Program) -> Self {
        let by_name = program.defs.iter().map(|d| (d.name(), d)).collect();
        Self {
            program,
            by_name,
            names: HashMap::new(),
            owners: HashMap::new(),
            defs: Vec::new(),
            emitted: HashSet::new(),
            worklist: VecDeque::new(),
        }
    }

    fn run(mut self) -> Result<MonoProgram, BuildError> {
        // Seed with the zero-parameter roots, in program order, so the
        // output is deterministic across runs.
        let program = self.program;
        for def in &program.defs {
            if def.is_monomorphic() {
                let ty = TypeExpr::applied(def.name(), vec![]);
                self.claim(&ty, def.name())?;
                self.names.insert(ty, def.name().to_string());
                self.emit(def, &HashMap::new())?;
            }
        }

        while let Some(ty) = self.worklist.pop_front() {
            let name = self.names[&ty].clone();
            if self.emitted.contains(&name) {
                continue;
            }
            if ty_depth(&ty) > MAX_EXPANSION_DEPTH {
                return Err(BuildError::UnboundedExpansion {
                    ty: ty.display(),
                    limit: MAX_EXPANSION_DEPTH,
                });
            }
            let TypeExpr::Applied { ctor, args } = &ty else {
                continue;
            };
            let Some(def) = self.by_name.get(ctor.as_str()).copied() else {
                return Err(BuildError::UnknownType {
                    def: ty.display(),
                    ctor: ctor.clone(),
                    span: span(0, 0),
                });
            };
            let subst: HashMap<&str, &TypeExpr> = def
                .params()
                .iter()
                .map(String::as_str)
                .zip(args.iter())
                .collect();
            self.emit_named(def, &subst, name)?;
        }

        Ok(MonoProgram {
            defs: self.defs,
            names: self.names,
        })
    }

    /// Reserves a canonical name for one instantiation tree. Two distinct
    /// trees rendering to the same name (possible when a source identifier
    /// contains `_`) would silently merge into one definition otherwise.
    fn claim(&mut self, ty: &TypeExpr, name: &str) -> Result<(), BuildError> {
        match self.owners.get(name) {
            Some(prev) if prev != ty => Err(BuildError::CanonicalNameClash {
                name: name.to_string(),
                first: prev.display(),
                second: ty.display(),
            }),
            Some(_) => Ok(()),
            None => {
                self.owners.insert(name.to_string(), ty.clone());
                Ok(())
            }
        }
    }

    fn emit(&mut self, def: &Definition, subst: &HashMap<&str, &TypeExpr>) -> Result<(), BuildError> {
        self.emit_named(def, subst, def.name().to_string())
    }

    fn emit_named(
        &mut self,
        def: &Definition,
        subst: &HashMap<&str, &TypeExpr>,
        name: String,
    ) -> Result<(), BuildError> {
        if !self.emitted.insert(name.clone()) {
            return Ok(());
        }
        let (kind, fields) = match def {
            Definition::Message(m) => (MonoKind::Message, &m.fields),
            Definition::Union(u) => (MonoKind::Union, &u.variants),
            Definition::Synonym(s) => {
                return Err(BuildError::UnexpandedSynonym {
                    name: s.name.clone(),
                    span: s.span,
                });
            }
        };
        let fields = fields
            .iter()
            .map(|f| self.lower_field(def, f, subst))
            .collect::<Result<Vec<_>, _>>()?;
        self.defs.push(MonoDef { name, kind, fields });
        Ok(())
    }

    fn lower_field(
        &mut self,
        def: &Definition,
        field: &Field,
        subst: &HashMap<&str, &TypeExpr>,
    ) -> Result<MonoField, BuildError> {
        let ty = substitute(&field.ty, subst);
        let ty = self.lower_ty(def, field, &ty)?;
        Ok(MonoField {
            number: field.number,
            name: field.name.clone(),
            ty,
        })
    }

    fn lower_ty(
        &mut self,
        def: &Definition,
        field: &Field,
        ty: &TypeExpr,
    ) -> Result<MonoType, BuildError> {
        match ty {
            TypeExpr::Base(b) => Ok(MonoType::Base(*b)),
            TypeExpr::Applied { .. } => {
                let name = match self.names.get(ty) {
                    Some(name) => name.clone(),
                    None => {
                        let name = canonical_name(ty);
                        self.claim(ty, &name)?;
                        self.names.insert(ty.clone(), name.clone());
                        self.worklist.push_back(ty.clone());
                        name
                    }
                };
                Ok(MonoType::Named(name))
            }
            // Reaching a parameter here means the input was not kind-checked.
            TypeExpr::Param(p) => Err(BuildError::UnboundParam {
                def: def.name().to_string(),
                param: p.clone(),
                span: field.span,
            }),
            TypeExpr::Ctor { name, .. } => Err(BuildError::ConstructorUsedAsType {
                def: def.name().to_string(),
                ctor: name.clone(),
                span: field.span,
            }),
        }
    }
}

fn substitute(ty: &TypeExpr, subst: &HashMap<&str, &TypeExpr>) -> TypeExpr {
    match ty {
        TypeExpr::Param(p) => subst
            .get(p.as_str())
            .map(|t| (*t).clone())
            .unwrap_or_else(|| ty.clone()),
        TypeExpr::Applied { ctor, args } => TypeExpr::Applied {
            ctor: ctor.clone(),
            args: args.iter().map(|a| substitute(a, subst)).collect(),
        },
        TypeExpr::Base(_) | TypeExpr::Ctor { .. } => ty.clone(),
    }
}

fn ty_depth(ty: &TypeExpr) -> usize {
    match ty {
        TypeExpr::Applied { args, .. } => {
            1 + args.iter().map(ty_depth).max().unwrap_or(0)
        }
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parabuf_ast::{BaseType, Definition, Field};

    fn option_def() -> Definition {
        Definition::union(
            "Option",
            vec!["A".into()],
            vec![
                Field::new(1, "none", TypeExpr::base(BaseType::Unit)),
                Field::new(2, "some", TypeExpr::param("A")),
            ],
        )
    }

    fn option_of(ty: TypeExpr) -> TypeExpr {
        TypeExpr::applied("Option", vec![ty])
    }

    fn sample_program() -> Program {
        Program::new(vec![
            option_def(),
            Definition::message(
                "Parent",
                vec![],
                vec![Field::new(1, "x", option_of(TypeExpr::base(BaseType::Int32)))],
            ),
            Definition::message(
                "Parent2",
                vec![],
                vec![
                    Field::new(1, "x", option_of(TypeExpr::base(BaseType::Int32))),
                    Field::new(2, "y", TypeExpr::base(BaseType::Str)),
                ],
            ),
        ])
    }

    #[test]
    fn shared_instantiations_collapse_to_one_definition() {
        let mono = monomorphize(&sample_program()).unwrap();
        let option_defs: Vec<_> = mono
            .defs
            .iter()
            .filter(|d| d.name.starts_with("Option"))
            .collect();
        assert_eq!(option_defs.len(), 1);
        assert_eq!(option_defs[0].name, "Option_Int32");
        assert_eq!(option_defs[0].kind, MonoKind::Union);
    }

    #[test]
    fn monomorphization_is_deterministic() {
        let a = monomorphize(&sample_program()).unwrap();
        let b = monomorphize(&sample_program()).unwrap();
        assert_eq!(a.defs, b.defs);
        let mut an: Vec<_> = a.names.values().collect();
        let mut bn: Vec<_> = b.names.values().collect();
        an.sort();
        bn.sort();
        assert_eq!(an, bn);
    }

    #[test]
    fn nested_instantiations_are_discovered() {
        let program = Program::new(vec![
            option_def(),
            Definition::message(
                "Pair",
                vec!["A".into(), "B".into()],
                vec![
                    Field::new(1, "first", TypeExpr::param("A")),
                    Field::new(2, "second", TypeExpr::param("B")),
                ],
            ),
            Definition::message(
                "Holder",
                vec![],
                vec![Field::new(
                    1,
                    "p",
                    TypeExpr::applied(
                        "Pair",
                        vec![
                            option_of(TypeExpr::base(BaseType::Int32)),
                            TypeExpr::base(BaseType::Bool),
                        ],
                    ),
                )],
            ),
        ]);
        let mono = monomorphize(&program).unwrap();
        let names: Vec<_> = mono.defs.iter().map(|d| d.name.as_str()).collect();
        assert!(names.contains(&"Holder"));
        assert!(names.contains(&"Pair_Option_Int32_Bool"));
        assert!(names.contains(&"Option_Int32"));

        let pair = mono.get("Pair_Option_Int32_Bool").unwrap();
        assert_eq!(pair.fields[0].ty, MonoType::Named("Option_Int32".into()));
        assert_eq!(pair.fields[1].ty, MonoType::Base(BaseType::Bool));
    }

    #[test]
    fn recursion_at_fixed_arguments_is_finite() {
        let program = Program::new(vec![
            Definition::message(
                "List",
                vec!["A".into()],
                vec![
                    Field::new(1, "item", TypeExpr::param("A")),
                    Field::new(2, "rest", TypeExpr::applied("List", vec![TypeExpr::param("A")])),
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
        let mono = monomorphize(&program).unwrap();
        assert_eq!(mono.defs.len(), 2);
        let list = mono.get("List_Int32").unwrap();
        assert_eq!(list.fields[1].ty, MonoType::Named("List_Int32".into()));
    }

    #[test]
    fn growing_instantiations_are_rejected() {
        let program = Program::new(vec![
            Definition::message(
                "Pair",
                vec!["A".into(), "B".into()],
                vec![
                    Field::new(1, "first", TypeExpr::param("A")),
                    Field::new(2, "second", TypeExpr::param("B")),
                ],
            ),
            Definition::message(
                "Bad",
                vec!["A".into()],
                vec![Field::new(
                    1,
                    "next",
                    TypeExpr::applied(
                        "Bad",
                        vec![TypeExpr::applied(
                            "Pair",
                            vec![TypeExpr::param("A"), TypeExpr::param("A")],
                        )],
                    ),
                )],
            ),
            Definition::message(
                "Holder",
                vec![],
                vec![Field::new(
                    1,
                    "b",
                    TypeExpr::applied("Bad", vec![TypeExpr::base(BaseType::Int32)]),
                )],
            ),
        ]);
        assert!(matches!(
            monomorphize(&program),
            Err(BuildError::UnboundedExpansion { .. })
        ));
    }

    #[test]
    fn user_definition_clashing_with_a_generated_name_is_rejected() {
        // A monomorphic message named like a specialization of Option.
        let program = Program::new(vec![
            option_def(),
            Definition::message(
                "Option_Int32",
                vec![],
                vec![Field::new(1, "z", TypeExpr::base(BaseType::Str))],
            ),
            Definition::message(
                "Parent",
                vec![],
                vec![Field::new(1, "x", option_of(TypeExpr::base(BaseType::Int32)))],
            ),
        ]);
        assert!(matches!(
            monomorphize(&program),
            Err(BuildError::CanonicalNameClash { name, .. }) if name == "Option_Int32"
        ));
    }

    #[test]
    fn underscored_constructor_clashing_with_a_generated_name_is_rejected() {
        // Pair_Int32<bool> and Pair<int32, bool> render to the same name.
        let program = Program::new(vec![
            Definition::message(
                "Pair",
                vec!["A".into(), "B".into()],
                vec![
                    Field::new(1, "first", TypeExpr::param("A")),
                    Field::new(2, "second", TypeExpr::param("B")),
                ],
            ),
            Definition::message(
                "Pair_Int32",
                vec!["B".into()],
                vec![Field::new(1, "second", TypeExpr::param("B"))],
            ),
            Definition::message(
                "Holder",
                vec![],
                vec![
                    Field::new(
                        1,
                        "a",
                        TypeExpr::applied(
                            "Pair",
                            vec![
                                TypeExpr::base(BaseType::Int32),
                                TypeExpr::base(BaseType::Bool),
                            ],
                        ),
                    ),
                    Field::new(
                        2,
                        "b",
                        TypeExpr::applied("Pair_Int32", vec![TypeExpr::base(BaseType::Bool)]),
                    ),
                ],
            ),
        ]);
        assert!(matches!(
            monomorphize(&program),
            Err(BuildError::CanonicalNameClash { name, .. }) if name == "Pair_Int32_Bool"
        ));
    }

    #[test]
    fn distinct_names_without_clashes_still_build() {
        let program = Program::new(vec![
            option_def(),
            Definition::message(
                "Option_Int32",
                vec![],
                vec![Field::new(1, "z", TypeExpr::base(BaseType::Str))],
            ),
            Definition::message(
                "Parent",
                vec![],
                vec![Field::new(1, "x", option_of(TypeExpr::base(BaseType::Bool)))],
            ),
        ]);
        // Option is only instantiated at bool, so nothing collides.
        let mono = monomorphize(&program).unwrap();
        assert_eq!(mono.get("Option_Int32").unwrap().kind, MonoKind::Message);
        assert_eq!(mono.get("Option_Bool").unwrap().kind, MonoKind::Union);
    }

    #[test]
    fn canonical_names_render_prefix_style() {
        let ty = TypeExpr::applied(
            "Pair",
            vec![
                option_of(TypeExpr::base(BaseType::Int32)),
                TypeExpr::base(BaseType::Bool),
            ],
        );
        assert_eq!(canonical_name(&ty), "Pair_Option_Int32_Bool");
    }
}

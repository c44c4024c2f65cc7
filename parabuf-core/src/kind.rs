#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};

use parabuf_ast::{Definition, Field, Program, Span, TypeExpr};

use crate::error::BuildError;

/// Kind checker: rejects ill-kinded definitions before any later stage runs.
///
/// Rules enforced per definition body:
/// - every `Applied` node names a known definition and supplies exactly its
///   declared number of type arguments;
/// - no bare unapplied constructor reference appears where a type is
///   required (this is also what rejects higher-kinded parameters);
/// - every `Param` is bound by the enclosing definition's parameter list;
/// - parameter names are distinct;
/// - field numbers are positive and unique within one definition.
///
/// Nullary references (`Parent`) are represented as `Applied` with an empty
/// argument list; a `TypeExpr::Ctor` node is an error in any type position.
pub struct Checker<'a> {
    arities: HashMap<&'a str, usize>,
}

pub fn check(program: &Program) -> Result<(), BuildError> {
    Checker::new(program)?.check_program(program)
}

impl<'a> Checker<'a> {
    fn new(program: &'a Program) -> Result<Self, BuildError> {
        let mut arities = HashMap::new();
        for def in &program.defs {
            if arities.insert(def.name(), def.params().len()).is_some() {
                return Err(BuildError::DuplicateDefinition {
                    name: def.name().to_string(),
                    span: def.span(),
                });
            }
        }
        Ok(Self { arities })
    }

    fn check_program(&self, program: &Program) -> Result<(), BuildError> {
        for def in &program.defs {
            self.check_def(def)?;
        }
        Ok(())
    }

    fn check_def(&self, def: &Definition) -> Result<(), BuildError> {
        let mut seen = HashSet::new();
        for param in def.params() {
            if !seen.insert(param.as_str()) {
                return Err(BuildError::DuplicateParam {
                    def: def.name().to_string(),
                    param: param.clone(),
                    span: def.span(),
                });
            }
        }

        match def {
            Definition::Message(_) | Definition::Union(_) => {
                let fields = def.fields().unwrap_or_default();
                self.check_field_numbers(def.name(), fields)?;
                for field in fields {
                    self.check_type(&field.ty, def, field.span)?;
                }
            }
            Definition::Synonym(s) => {
                self.check_type(&s.body, def, s.span)?;
            }
        }
        Ok(())
    }

    fn check_field_numbers(&self, def: &str, fields: &[Field]) -> Result<(), BuildError> {
        let mut by_number: HashMap<u32, &str> = HashMap::new();
        for field in fields {
            if field.number == 0 {
                return Err(BuildError::InvalidFieldNumber {
                    def: def.to_string(),
                    field: field.name.clone(),
                    span: field.span,
                });
            }
            if let Some(first) = by_number.insert(field.number, &field.name) {
                return Err(BuildError::FieldNumberConflict {
                    def: def.to_string(),
                    number: field.number,
                    first: first.to_string(),
                    second: field.name.clone(),
                    span: field.span,
                });
            }
        }
        Ok(())
    }

    fn check_type(&self, ty: &TypeExpr, def: &Definition, span: Span) -> Result<(), BuildError> {
        match ty {
            TypeExpr::Base(_) => Ok(()),

            TypeExpr::Param(p) => {
                if def.params().iter().any(|q| q == p) {
                    Ok(())
                } else {
                    Err(BuildError::UnboundParam {
                        def: def.name().to_string(),
                        param: p.clone(),
                        span,
                    })
                }
            }

            TypeExpr::Ctor { name, .. } => Err(BuildError::ConstructorUsedAsType {
                def: def.name().to_string(),
                ctor: name.clone(),
                span,
            }),

            TypeExpr::Applied { ctor, args } => {
                let Some(expected) = self.arities.get(ctor.as_str()).copied() else {
                    return Err(BuildError::UnknownType {
                        def: def.name().to_string(),
                        ctor: ctor.clone(),
                        span,
                    });
                };
                if expected != args.len() {
                    return Err(BuildError::ArityMismatch {
                        def: def.name().to_string(),
                        ctor: ctor.clone(),
                        expected,
                        found: args.len(),
                        span,
                    });
                }
                for arg in args {
                    self.check_type(arg, def, span)?;
                }
                Ok(())
            }
        }
    }
}

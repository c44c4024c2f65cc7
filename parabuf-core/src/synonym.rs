#![forbid(unsafe_code)]

use std::collections::HashMap;

use parabuf_ast::{Definition, Field, Program, SynonymDef, TypeExpr};

use crate::error::BuildError;

/// Expands every synonym reference, including partial applications, until no
/// `SynonymDef` reference remains. Runs on a kind-checked program.
pub fn expand(program: &Program) -> Result<Program, BuildError> {
    let synonyms: HashMap<&str, &SynonymDef> = program
        .defs
        .iter()
        .filter_map(|d| match d {
            Definition::Synonym(s) => Some((s.name.as_str(), s)),
            _ => None,
        })
        .collect();

    detect_cycles(&synonyms)?;

    let defs = program
        .defs
        .iter()
        .filter_map(|def| match def {
            Definition::Synonym(_) => None,
            Definition::Message(m) => {
                let mut m = m.clone();
                expand_fields(&mut m.fields, &synonyms);
                Some(Definition::Message(m))
            }
            Definition::Union(u) => {
                let mut u = u.clone();
                expand_fields(&mut u.variants, &synonyms);
                Some(Definition::Union(u))
            }
        })
        .collect();

    Ok(Program::new(defs))
}

fn expand_fields(fields: &mut [Field], synonyms: &HashMap<&str, &SynonymDef>) {
    for field in fields {
        field.ty = expand_ty(&field.ty, synonyms);
    }
}

fn expand_ty(ty: &TypeExpr, synonyms: &HashMap<&str, &SynonymDef>) -> TypeExpr {
    match ty {
        TypeExpr::Base(_) | TypeExpr::Param(_) | TypeExpr::Ctor { .. } => ty.clone(),
        TypeExpr::Applied { ctor, args } => {
            let args: Vec<TypeExpr> = args.iter().map(|a| expand_ty(a, synonyms)).collect();
            match synonyms.get(ctor.as_str()) {
                Some(syn) => {
                    // Kind checking guarantees the argument count matches.
                    let subst: HashMap<&str, &TypeExpr> = syn
                        .params
                        .iter()
                        .map(String::as_str)
                        .zip(args.iter())
                        .collect();
                    let body = substitute(&syn.body, &subst);
                    expand_ty(&body, synonyms)
                }
                None => TypeExpr::Applied {
                    ctor: ctor.clone(),
                    args,
                },
            }
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

fn detect_cycles(synonyms: &HashMap<&str, &SynonymDef>) -> Result<(), BuildError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        name: &'a str,
        synonyms: &HashMap<&'a str, &'a SynonymDef>,
        marks: &mut HashMap<&'a str, Mark>,
    ) -> Result<(), BuildError> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let syn = synonyms[name];
                return Err(BuildError::CyclicSynonym {
                    name: syn.name.clone(),
                    span: syn.span,
                });
            }
            None => {}
        }
        marks.insert(name, Mark::Visiting);
        let mut refs = Vec::new();
        synonym_refs(&synonyms[name].body, synonyms, &mut refs);
        for r in refs {
            visit(r, synonyms, marks)?;
        }
        marks.insert(name, Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    let mut names: Vec<&str> = synonyms.keys().copied().collect();
    names.sort_unstable();
    for name in names {
        visit(name, synonyms, &mut marks)?;
    }
    Ok(())
}

fn synonym_refs<'a>(
    ty: &'a TypeExpr,
    synonyms: &HashMap<&'a str, &'a SynonymDef>,
    out: &mut Vec<&'a str>,
) {
    match ty {
        TypeExpr::Base(_) | TypeExpr::Param(_) => {}
        TypeExpr::Ctor { name, .. } => {
            if let Some((k, _)) = synonyms.get_key_value(name.as_str()) {
                out.push(k);
            }
        }
        TypeExpr::Applied { ctor, args } => {
            if let Some((k, _)) = synonyms.get_key_value(ctor.as_str()) {
                out.push(k);
            }
            for a in args {
                synonym_refs(a, synonyms, out);
            }
        }
    }
}

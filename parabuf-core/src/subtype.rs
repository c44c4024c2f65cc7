#![forbid(unsafe_code)]

use std::collections::HashSet;

use parabuf_ast::{Definition, Program, TypeExpr};

use crate::mono::{MonoProgram, MonoType};

/// Per-parameter variance of a type constructor.
///
/// The IDL has no input positions, so contravariance cannot arise: a
/// parameter either occurs in some field type (`Covariant`) or occurs
/// nowhere and never influences reading a value (`Phantom`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Variance {
    Covariant,
    Phantom,
}

/// Infers the variance of each declared parameter from the definition body.
pub fn infer_variance(def: &Definition) -> Vec<Variance> {
    def.params()
        .iter()
        .map(|p| {
            let used = match def {
                Definition::Message(m) => m.fields.iter().any(|f| occurs(p, &f.ty)),
                Definition::Union(u) => u.variants.iter().any(|f| occurs(p, &f.ty)),
                Definition::Synonym(s) => occurs(p, &s.body),
            };
            if used {
                Variance::Covariant
            } else {
                Variance::Phantom
            }
        })
        .collect()
}

fn occurs(param: &str, ty: &TypeExpr) -> bool {
    match ty {
        TypeExpr::Param(p) => p == param,
        TypeExpr::Applied { args, .. } => args.iter().any(|a| occurs(param, a)),
        TypeExpr::Base(_) | TypeExpr::Ctor { .. } => false,
    }
}

/// Structural record subtyping over canonical definitions.
///
/// `A <= B` means a reader expecting schema `B` can safely consume data
/// produced for schema `A`: every field of `B` (by number) must be present
/// in `A` at a subtype, and `A` may carry extra fields the reader skips.
/// Base types relate only reflexively. Recursive definitions are handled
/// coinductively (a pair under test is assumed to hold while its fields are
/// checked).
pub fn is_subtype(a: &str, b: &str, mono: &MonoProgram) -> bool {
    let mut assumed = HashSet::new();
    sub_named(a, b, mono, &mut assumed)
}

fn sub_named<'a>(
    a: &'a str,
    b: &'a str,
    mono: &'a MonoProgram,
    assumed: &mut HashSet<(&'a str, &'a str)>,
) -> bool {
    if a == b {
        return true;
    }
    let (Some(da), Some(db)) = (mono.get(a), mono.get(b)) else {
        return false;
    };
    if da.kind != db.kind {
        return false;
    }
    if !assumed.insert((a, b)) {
        return true;
    }
    db.fields.iter().all(|fb| {
        da.fields
            .iter()
            .find(|fa| fa.number == fb.number)
            .is_some_and(|fa| sub_ty(&fa.ty, &fb.ty, mono, assumed))
    })
}

fn sub_ty<'a>(
    a: &'a MonoType,
    b: &'a MonoType,
    mono: &'a MonoProgram,
    assumed: &mut HashSet<(&'a str, &'a str)>,
) -> bool {
    match (a, b) {
        (MonoType::Base(x), MonoType::Base(y)) => x == y,
        (MonoType::Named(x), MonoType::Named(y)) => sub_named(x, y, mono, assumed),
        _ => false,
    }
}

/// Parametric lifting: compares two fully-applied instantiation trees.
///
/// Two applications of the same constructor are compared per parameter
/// position using the constructor's inferred variance; anything else falls
/// back to the structural relation on canonical definitions when both trees
/// have one.
pub fn is_subtype_applied(
    a: &TypeExpr,
    b: &TypeExpr,
    program: &Program,
    mono: &MonoProgram,
) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (TypeExpr::Base(x), TypeExpr::Base(y)) => x == y,
        (
            TypeExpr::Applied { ctor: ca, args: aa },
            TypeExpr::Applied { ctor: cb, args: ab },
        ) if ca == cb && aa.len() == ab.len() => match program.get(ca) {
            Some(def) => infer_variance(def)
                .iter()
                .zip(aa.iter().zip(ab.iter()))
                .all(|(v, (ai, bi))| match v {
                    Variance::Phantom => true,
                    Variance::Covariant => is_subtype_applied(ai, bi, program, mono),
                }),
            None => structural_fallback(a, b, mono),
        },
        _ => structural_fallback(a, b, mono),
    }
}

fn structural_fallback(a: &TypeExpr, b: &TypeExpr, mono: &MonoProgram) -> bool {
    match (mono.name_of(a), mono.name_of(b)) {
        (Some(x), Some(y)) => is_subtype(x, y, mono),
        _ => false,
    }
}

#![forbid(unsafe_code)]

use miette::SourceSpan;

pub type Span = SourceSpan;

pub fn span(start: usize, len: usize) -> Span {
    SourceSpan::new(start.into(), len)
}

pub fn span_between(start: usize, end: usize) -> Span {
    debug_assert!(end >= start);
    span(start, end - start)
}

/// Builtin scalar types. All have kind `Type` and arity zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BaseType {
    Int32,
    Int64,
    Bool,
    Unit,
    Str,
    Bytes,
}

impl BaseType {
    pub fn name(self) -> &'static str {
        match self {
            BaseType::Int32 => "int32",
            BaseType::Int64 => "int64",
            BaseType::Bool => "bool",
            BaseType::Unit => "unit",
            BaseType::Str => "string",
            BaseType::Bytes => "bytes",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "int32" => Some(BaseType::Int32),
            "int64" => Some(BaseType::Int64),
            "bool" => Some(BaseType::Bool),
            "unit" => Some(BaseType::Unit),
            "string" => Some(BaseType::Str),
            "bytes" => Some(BaseType::Bytes),
            _ => None,
        }
    }
}

/// A type expression as it appears in a definition body.
///
/// `Ctor` is an *unapplied* constructor reference; it is only legal as the
/// head of an `Applied` node. The kind checker rejects it anywhere a type
/// is expected.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeExpr {
    Base(BaseType),

    /// Unapplied constructor reference (e.g. bare `Option`).
    Ctor { name: String, arity: usize },

    /// Fully-applied constructor (e.g. `Option<int32>`).
    Applied { ctor: String, args: Vec<TypeExpr> },

    /// A bound type-parameter placeholder, valid only inside the body of a
    /// polymorphic definition.
    Param(String),
}

impl TypeExpr {
    pub fn base(b: BaseType) -> Self {
        TypeExpr::Base(b)
    }

    pub fn applied(ctor: impl Into<String>, args: Vec<TypeExpr>) -> Self {
        TypeExpr::Applied {
            ctor: ctor.into(),
            args,
        }
    }

    pub fn param(name: impl Into<String>) -> Self {
        TypeExpr::Param(name.into())
    }

    /// True when the tree contains no `Param` and no bare `Ctor` node.
    pub fn is_monomorphic(&self) -> bool {
        match self {
            TypeExpr::Base(_) => true,
            TypeExpr::Ctor { .. } | TypeExpr::Param(_) => false,
            TypeExpr::Applied { args, .. } => args.iter().all(TypeExpr::is_monomorphic),
        }
    }

    pub fn display(&self) -> String {
        match self {
            TypeExpr::Base(b) => b.name().to_string(),
            TypeExpr::Ctor { name, .. } => name.clone(),
            TypeExpr::Param(p) => p.clone(),
            TypeExpr::Applied { ctor, args } => {
                if args.is_empty() {
                    ctor.clone()
                } else {
                    let args_s = args
                        .iter()
                        .map(|t| t.display())
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("{ctor}<{args_s}>")
                }
            }
        }
    }
}

/// A numbered field of a message, or a numbered variant of a union.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub number: u32,
    pub name: String,
    pub ty: TypeExpr,
    pub span: Span,
}

impl Field {
    pub fn new(number: u32, name: impl Into<String>, ty: TypeExpr) -> Self {
        Self {
            number,
            name: name.into(),
            ty,
            span: span(0, 0),
        }
    }

    pub fn with_span(mut self, sp: Span) -> Self {
        self.span = sp;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MessageDef {
    pub name: String,
    pub params: Vec<String>,
    pub fields: Vec<Field>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnionDef {
    pub name: String,
    pub params: Vec<String>,
    pub variants: Vec<Field>,
    pub span: Span,
}

/// A (possibly parameterized) type synonym; fully expanded away before
/// monomorphization.
#[derive(Clone, Debug, PartialEq)]
pub struct SynonymDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: TypeExpr,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Definition {
    Message(MessageDef),
    Union(UnionDef),
    Synonym(SynonymDef),
}

impl Definition {
    pub fn message(name: impl Into<String>, params: Vec<String>, fields: Vec<Field>) -> Self {
        Definition::Message(MessageDef {
            name: name.into(),
            params,
            fields,
            span: span(0, 0),
        })
    }

    pub fn union(name: impl Into<String>, params: Vec<String>, variants: Vec<Field>) -> Self {
        Definition::Union(UnionDef {
            name: name.into(),
            params,
            variants,
            span: span(0, 0),
        })
    }

    pub fn synonym(name: impl Into<String>, params: Vec<String>, body: TypeExpr) -> Self {
        Definition::Synonym(SynonymDef {
            name: name.into(),
            params,
            body,
            span: span(0, 0),
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Definition::Message(d) => &d.name,
            Definition::Union(d) => &d.name,
            Definition::Synonym(d) => &d.name,
        }
    }

    pub fn params(&self) -> &[String] {
        match self {
            Definition::Message(d) => &d.params,
            Definition::Union(d) => &d.params,
            Definition::Synonym(d) => &d.params,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Definition::Message(d) => d.span,
            Definition::Union(d) => d.span,
            Definition::Synonym(d) => d.span,
        }
    }

    /// Message and union fields/variants, if any.
    pub fn fields(&self) -> Option<&[Field]> {
        match self {
            Definition::Message(d) => Some(&d.fields),
            Definition::Union(d) => Some(&d.variants),
            Definition::Synonym(_) => None,
        }
    }

    pub fn is_monomorphic(&self) -> bool {
        self.params().is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    pub defs: Vec<Definition>,
}

impl Program {
    pub fn new(defs: Vec<Definition>) -> Self {
        Self { defs }
    }

    pub fn get(&self, name: &str) -> Option<&Definition> {
        self.defs.iter().find(|d| d.name() == name)
    }
}

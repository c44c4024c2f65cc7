use parabuf_ast::{BaseType, Definition, Field, Program, TypeExpr};

pub fn option_of(ty: TypeExpr) -> TypeExpr {
    TypeExpr::applied("Option", vec![ty])
}

pub fn option_def() -> Definition {
    Definition::union(
        "Option",
        vec!["A".into()],
        vec![
            Field::new(1, "none", TypeExpr::base(BaseType::Unit)),
            Field::new(2, "some", TypeExpr::param("A")),
        ],
    )
}

/// Schema-evolution fixture: `Parent2` extends `Parent` by one field.
pub fn evolution_program() -> Program {
    Program::new(vec![
        option_def(),
        Definition::message(
            "Parent",
            vec![],
            vec![Field::new(
                1,
                "x",
                option_of(TypeExpr::base(BaseType::Int32)),
            )],
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

/// One message exercising every base type plus a generic instantiation.
pub fn kitchen_sink_program() -> Program {
    Program::new(vec![
        option_def(),
        Definition::message(
            "Everything",
            vec![],
            vec![
                Field::new(1, "opt", option_of(TypeExpr::base(BaseType::Int32))),
                Field::new(2, "name", TypeExpr::base(BaseType::Str)),
                Field::new(3, "flag", TypeExpr::base(BaseType::Bool)),
                Field::new(4, "big", TypeExpr::base(BaseType::Int64)),
                Field::new(5, "blob", TypeExpr::base(BaseType::Bytes)),
            ],
        ),
    ])
}

//! Snapshot tests for `Env::debug_string` (spec §3 "Expressions"
//! `DebugString()`) and table-driven checks over the numeric conversion
//! ladder (spec §4.2), exercising the `insta`/`test-case` dev-dependencies
//! the way the teacher uses them for `Type` `Display` snapshots and
//! table-driven overload cases (SPEC_FULL §B "Test tooling").

use nudl_semantic::*;
use test_case::test_case;

fn ctx() -> CodeContext {
    CodeContext::default()
}

fn expr(kind: ExprKindAst) -> ExprAst {
    ExprAst { context: ctx(), kind }
}

fn lit_int(v: i64) -> ExprAst {
    expr(ExprKindAst::Literal(LiteralAst::Int(v)))
}

fn ident(name: &str) -> ExprAst {
    expr(ExprKindAst::Identifier {
        scope_prefix: Vec::new(),
        name: Name::new(name),
    })
}

fn op2(op: Operator, a: ExprAst, b: ExprAst) -> ExprAst {
    expr(ExprKindAst::Operator {
        op,
        operands: vec![a, b],
    })
}

fn named_type(name: &str) -> TypeAst {
    TypeAst::Named {
        name: Name::new(name),
        scope_prefix: Vec::new(),
        template_args: Vec::new(),
    }
}

fn param(name: &str, type_expr: Option<TypeAst>) -> ParameterAst {
    ParameterAst {
        name: Name::new(name),
        type_expr,
        default_value: None,
    }
}

fn func_def(name: &str, parameters: Vec<ParameterAst>, body: Vec<ExprAst>) -> FunctionDefAst {
    FunctionDefAst {
        name: Name::new(name),
        type_params: Vec::new(),
        parameters,
        result_type: None,
        result_kind: FunctionResultKindAst::Return,
        body: Some(body),
        native_impl: Vec::new(),
        is_main: false,
        is_method: false,
    }
}

fn element(kind: ModuleElementKind) -> ModuleElement {
    ModuleElement { context: ctx(), kind }
}

fn assign_element(name: &str, value: ExprAst) -> ModuleElement {
    element(ModuleElementKind::Assignment(AssignmentAst {
        name: Name::new(name),
        declared_type: None,
        value,
        is_param: false,
    }))
}

struct NoImports;

impl ModuleStore for NoImports {
    fn resolve_module(&mut self, _env: &mut Env, name: &Name) -> Result<ScopeId> {
        Err(AnalysisError::new(ErrorKind::NotFound, format!("no module named `{name}` in this test")))
    }
}

/// `a + b` lowers to a call on the left operand's `__add__` method; the
/// rendering reflects that desugaring rather than the infix surface form
/// (spec §6 "Operators": "maps to a reserved method name").
#[test]
fn debug_string_renders_an_operator_call_as_a_method_call() {
    let mut env = Env::new();
    let m = ModuleAst {
        elements: vec![
            element(ModuleElementKind::FunctionDefinition(func_def(
                "f",
                vec![param("y", Some(named_type("Int")))],
                vec![op2(Operator::Add, ident("y"), lit_int(1))],
            ))),
            assign_element("z", {
                expr(ExprKindAst::FunctionCall {
                    callee: FunctionCallCalleeAst::Identifier {
                        scope_prefix: Vec::new(),
                        name: Name::new("f"),
                    },
                    args: vec![CallArgAst { name: None, value: lit_int(5) }],
                })
            }),
        ],
    };
    let mut store = NoImports;
    env.process_module(ScopeName::module(vec![Name::new("render")]), &m, &mut store)
        .expect("module analyzes cleanly");

    let scope_name = ScopeName::module(vec![Name::new("render")]);
    let f_group = env
        .find_name(&scope_name, &ScopedName::unscoped("f"))
        .unwrap()
        .as_function_group()
        .unwrap();
    let spec_id = *env.function_group(f_group).specializations.values().next().unwrap();
    let last = *env.negotiated_body(spec_id).expect("body was negotiated").last().unwrap();
    insta::assert_snapshot!(env.debug_string(last), @"__add__(y, Int(1))");
}

#[test_case(0, 0, true ; "Int8 accepts Int8")]
#[test_case(0, 3, true ; "Int8 widens into Int")]
#[test_case(3, 0, false ; "Int never narrows into Int8")]
#[test_case(4, 7, true ; "UInt8 widens into UInt")]
#[test_case(7, 4, false ; "UInt never narrows into UInt8")]
#[test_case(3, 8, true ; "Int widens into Float32")]
#[test_case(8, 9, true ; "Float32 widens into Float64")]
#[test_case(9, 8, false ; "Float64 never narrows into Float32")]
fn numeric_convertibility_ladder(source_rung: u8, dest_rung: u8, expected: bool) {
    let env = Env::new();
    let b = env.builtin_types();
    let rungs = [
        b.int8, b.int16, b.int32, b.int, b.uint8, b.uint16, b.uint32, b.uint, b.float32, b.float64,
    ];
    let source = rungs[source_rung as usize];
    let dest = rungs[dest_rung as usize];
    assert_eq!(env.types().is_convertible_from(dest, source), expected);
}

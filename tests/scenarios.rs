//! End-to-end scenario tests exercising the full module driver: name
//! resolution, type negotiation, and on-demand specialization together,
//! against the six worked examples (one module-level assignment, a
//! two-specialization overload, a generic higher-order method, nullable
//! result widening, a failing result join, and a cross-module import).

use std::collections::HashMap;

use nudl_semantic::*;

fn ctx() -> CodeContext {
    CodeContext::default()
}

fn expr(kind: ExprKindAst) -> ExprAst {
    ExprAst { context: ctx(), kind }
}

fn lit_int(v: i64) -> ExprAst {
    expr(ExprKindAst::Literal(LiteralAst::Int(v)))
}

fn lit_float(v: f64) -> ExprAst {
    expr(ExprKindAst::Literal(LiteralAst::Float(v)))
}

fn lit_str(v: &str) -> ExprAst {
    expr(ExprKindAst::Literal(LiteralAst::Str(v.to_string())))
}

fn lit_null() -> ExprAst {
    expr(ExprKindAst::Literal(LiteralAst::Null))
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

fn call_args(args: Vec<ExprAst>) -> Vec<CallArgAst> {
    args.into_iter().map(|value| CallArgAst { name: None, value }).collect()
}

fn call(name: &str, args: Vec<ExprAst>) -> ExprAst {
    expr(ExprKindAst::FunctionCall {
        callee: FunctionCallCalleeAst::Identifier {
            scope_prefix: Vec::new(),
            name: Name::new(name),
        },
        args: call_args(args),
    })
}

fn scoped_call(scope_prefix: &[&str], name: &str, args: Vec<ExprAst>) -> ExprAst {
    expr(ExprKindAst::FunctionCall {
        callee: FunctionCallCalleeAst::Identifier {
            scope_prefix: scope_prefix.iter().map(|s| Name::new(*s)).collect(),
            name: Name::new(name),
        },
        args: call_args(args),
    })
}

fn method_call(receiver: ExprAst, name: &str, args: Vec<ExprAst>) -> ExprAst {
    expr(ExprKindAst::FunctionCall {
        callee: FunctionCallCalleeAst::Expr(Box::new(expr(ExprKindAst::DotAccess {
            object: Box::new(receiver),
            name: Name::new(name),
        }))),
        args: call_args(args),
    })
}

fn array_def(items: Vec<ExprAst>) -> ExprAst {
    expr(ExprKindAst::ArrayDef(items))
}

fn function_result(kind: FunctionResultKindAst, value: Option<ExprAst>) -> ExprAst {
    expr(ExprKindAst::FunctionResult {
        kind,
        value: value.map(Box::new),
    })
}

fn named_type(name: &str) -> TypeAst {
    TypeAst::Named {
        name: Name::new(name),
        scope_prefix: Vec::new(),
        template_args: Vec::new(),
    }
}

fn generic_type(name: &str, args: Vec<TypeAst>) -> TypeAst {
    TypeAst::Named {
        name: Name::new(name),
        scope_prefix: Vec::new(),
        template_args: args.into_iter().map(TemplateArgAst::Type).collect(),
    }
}

fn local_type(name: &str) -> TypeAst {
    TypeAst::Local {
        name: Name::new(name),
        bound: None,
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

fn lambda(parameters: Vec<ParameterAst>, body: Vec<ExprAst>) -> ExprAst {
    expr(ExprKindAst::Lambda(Box::new(func_def("__lambda", parameters, body))))
}

fn element(kind: ModuleElementKind) -> ModuleElement {
    ModuleElement { context: ctx(), kind }
}

fn assignment(name: &str, value: ExprAst) -> AssignmentAst {
    AssignmentAst {
        name: Name::new(name),
        declared_type: None,
        value,
        is_param: false,
    }
}

fn assign_element(name: &str, value: ExprAst) -> ModuleElement {
    element(ModuleElementKind::Assignment(assignment(name, value)))
}

fn module(elements: Vec<ModuleElement>) -> ModuleAst {
    ModuleAst { elements }
}

/// A `ModuleStore` that never resolves any import, for single-module
/// scenarios where no `import` statement appears.
struct NoImports;

impl ModuleStore for NoImports {
    fn resolve_module(&mut self, _env: &mut Env, name: &Name) -> Result<ScopeId> {
        Err(AnalysisError::new(ErrorKind::NotFound, format!("no module named `{name}` in this test")))
    }
}

/// A `ModuleStore` backed by a fixed table of already-analyzed module
/// scopes, standing in for whatever build-graph lookup a real embedder
/// would do (spec §4.7's `ModuleStore` collaborator).
struct FixedModules(HashMap<Name, ScopeId>);

impl ModuleStore for FixedModules {
    fn resolve_module(&mut self, _env: &mut Env, name: &Name) -> Result<ScopeId> {
        self.0
            .get(name)
            .copied()
            .ok_or_else(|| AnalysisError::new(ErrorKind::NotFound, format!("no module named `{name}`")))
    }
}

fn var_type(env: &Env, scope_name: &ScopeName, name: &str) -> TypeSpecId {
    let object = env.find_name(scope_name, &ScopedName::unscoped(name)).expect("name resolves");
    env.var(object.as_var().expect("is a variable")).type_spec
}

#[test]
fn scenario_1_declared_param_call_specializes_once() {
    let mut env = Env::new();
    let m = module(vec![
        assign_element("x", lit_int(3)),
        element(ModuleElementKind::FunctionDefinition(func_def(
            "f",
            vec![param("y", Some(named_type("Int")))],
            vec![op2(Operator::Add, ident("x"), ident("y"))],
        ))),
        assign_element("z", call("f", vec![lit_int(5)])),
    ]);
    let mut store = NoImports;
    env.process_module(ScopeName::module(vec![Name::new("scenario1")]), &m, &mut store)
        .expect("module analyzes cleanly");

    let scope_name = ScopeName::module(vec![Name::new("scenario1")]);
    let z_type = var_type(&env, &scope_name, "z");
    assert!(env.types().is_equal(z_type, env.builtin_types().int));

    let f_group = env
        .find_name(&scope_name, &ScopedName::unscoped("f"))
        .unwrap()
        .as_function_group()
        .unwrap();
    let group = env.function_group(f_group);
    assert_eq!(group.specializations.len(), 1);
    assert!(group.specializations.keys().next().unwrap().contains("Int"));
}

#[test]
fn scenario_2_untyped_params_specialize_per_call_site() {
    let mut env = Env::new();
    let m = module(vec![
        element(ModuleElementKind::FunctionDefinition(func_def(
            "f",
            vec![param("a", None), param("b", None)],
            vec![op2(Operator::Add, ident("a"), ident("b"))],
        ))),
        assign_element("u", call("f", vec![lit_int(1), lit_int(2)])),
        assign_element("v", call("f", vec![lit_float(1.0), lit_float(2.0)])),
    ]);
    let mut store = NoImports;
    env.process_module(ScopeName::module(vec![Name::new("scenario2")]), &m, &mut store)
        .expect("module analyzes cleanly");

    let scope_name = ScopeName::module(vec![Name::new("scenario2")]);
    let u_type = var_type(&env, &scope_name, "u");
    let v_type = var_type(&env, &scope_name, "v");
    assert!(env.types().is_equal(u_type, env.builtin_types().int));
    assert!(env.types().is_equal(v_type, env.builtin_types().float64));

    let f_group = env
        .find_name(&scope_name, &ScopedName::unscoped("f"))
        .unwrap()
        .as_function_group()
        .unwrap();
    assert_eq!(env.function_group(f_group).specializations.len(), 2);
}

#[test]
fn scenario_3_local_type_unifies_across_array_and_function_params() {
    let mut env = Env::new();
    let m = module(vec![
        element(ModuleElementKind::FunctionDefinition(func_def(
            "f",
            vec![
                param("a", Some(generic_type("Array", vec![local_type("T")]))),
                param("g", Some(generic_type("Function", vec![local_type("T"), local_type("T")]))),
            ],
            vec![method_call(ident("a"), "map", vec![ident("g")])],
        ))),
        assign_element(
            "r",
            call(
                "f",
                vec![
                    array_def(vec![lit_int(1), lit_int(2), lit_int(3)]),
                    lambda(vec![param("x", None)], vec![op2(Operator::Add, ident("x"), lit_int(1))]),
                ],
            ),
        ),
    ]);
    let mut store = NoImports;
    env.process_module(ScopeName::module(vec![Name::new("scenario3")]), &m, &mut store)
        .expect("module analyzes cleanly");

    let scope_name = ScopeName::module(vec![Name::new("scenario3")]);
    let r_type = var_type(&env, &scope_name, "r");
    let r_spec = env.types().get(r_type);
    assert!(r_spec.tag.is_array());
    let elem = r_spec.parameters[0].as_type().expect("Array's parameter is a type");
    assert!(env.types().is_equal(elem, env.builtin_types().int));

    let f_group = env
        .find_name(&scope_name, &ScopedName::unscoped("f"))
        .unwrap()
        .as_function_group()
        .unwrap();
    assert_eq!(
        env.function_group(f_group).specializations.len(),
        1,
        "the local type `T` must unify to a single Int specialization across `a` and `g`"
    );
}

#[test]
fn scenario_4_missing_else_widens_to_nullable() {
    let mut env = Env::new();
    let cond = op2(Operator::Eq, op2(Operator::Mod, ident("x"), lit_int(2)), lit_int(0));
    let if_expr = expr(ExprKindAst::If {
        branches: vec![(cond, vec![function_result(FunctionResultKindAst::Return, Some(ident("x")))])],
        else_branch: None,
    });
    let m = module(vec![
        element(ModuleElementKind::FunctionDefinition(func_def(
            "foo",
            vec![param("x", Some(named_type("Int")))],
            vec![if_expr, function_result(FunctionResultKindAst::Return, Some(lit_null()))],
        ))),
        assign_element("r", call("foo", vec![lit_int(4)])),
    ]);
    let mut store = NoImports;
    env.process_module(ScopeName::module(vec![Name::new("scenario4")]), &m, &mut store)
        .expect("module analyzes cleanly");

    let scope_name = ScopeName::module(vec![Name::new("scenario4")]);
    let r_type = var_type(&env, &scope_name, "r");
    let r_spec = env.types().get(r_type);
    assert!(r_spec.tag.is_nullable());
    let inner = r_spec.result_type.expect("Nullable carries its inner type");
    assert!(env.types().is_equal(inner, env.builtin_types().int));
}

#[test]
fn scenario_5_incompatible_returns_fail_the_module() {
    let mut env = Env::new();
    let cond = op2(Operator::Eq, op2(Operator::Mod, ident("x"), lit_int(2)), lit_int(0));
    let if_expr = expr(ExprKindAst::If {
        branches: vec![(
            cond,
            vec![function_result(
                FunctionResultKindAst::Return,
                Some(op2(Operator::Div, ident("x"), lit_int(2))),
            )],
        )],
        else_branch: None,
    });
    let m = module(vec![
        element(ModuleElementKind::FunctionDefinition(func_def(
            "foo",
            vec![param("x", Some(named_type("Int")))],
            vec![if_expr, function_result(FunctionResultKindAst::Return, Some(lit_str("Foo")))],
        ))),
        assign_element("r", call("foo", vec![lit_int(4)])),
    ]);
    let mut store = NoImports;
    let err = env
        .process_module(ScopeName::module(vec![Name::new("scenario5")]), &m, &mut store)
        .expect_err("a String return after an Int return must fail analysis");

    let message = err.to_string();
    assert!(message.contains("String"), "{message}");
    assert!(message.contains("Int"), "{message}");
    assert!(message.contains("incompatible"), "{message}");
}

#[test]
fn scenario_6_cross_module_import_reuses_the_callee_specialization() {
    let mut env = Env::new();
    let module_a = module(vec![element(ModuleElementKind::FunctionDefinition(func_def(
        "g",
        vec![param("x", Some(named_type("Int")))],
        vec![op2(Operator::Add, ident("x"), lit_int(1))],
    )))]);
    let mut no_imports = NoImports;
    let module_a_id = env
        .process_module(ScopeName::module(vec![Name::new("A")]), &module_a, &mut no_imports)
        .expect("module A analyzes cleanly");
    let scope_a = env.module(module_a_id).scope;

    let mut resolved = HashMap::new();
    resolved.insert(Name::new("A"), scope_a);
    let mut store_b = FixedModules(resolved);

    let module_b = module(vec![
        element(ModuleElementKind::Import(ImportAst {
            module_name: Name::new("A"),
            local_name: None,
        })),
        assign_element("y", scoped_call(&["A"], "g", vec![lit_int(10)])),
        assign_element("z", scoped_call(&["A"], "g", vec![lit_int(20)])),
    ]);
    env.process_module(ScopeName::module(vec![Name::new("B")]), &module_b, &mut store_b)
        .expect("module B analyzes cleanly");

    let b_scope_name = ScopeName::module(vec![Name::new("B")]);
    let y_type = var_type(&env, &b_scope_name, "y");
    let z_type = var_type(&env, &b_scope_name, "z");
    assert!(env.types().is_equal(y_type, env.builtin_types().int));
    assert!(env.types().is_equal(z_type, env.builtin_types().int));

    let a_in_b = env
        .find_name(&b_scope_name, &ScopedName::unscoped("A"))
        .unwrap()
        .as_scope()
        .expect("`A` is bound to the imported module's scope");
    assert_eq!(a_in_b, scope_a);

    let g_group = env
        .scope(scope_a)
        .defined_names()
        .find(|(name, _)| name.as_str() == "g")
        .and_then(|(_, object)| object.as_function_group())
        .expect("module A defines `g`");
    assert_eq!(
        env.function_group(g_group).specializations.len(),
        1,
        "both calls pass Int, so the second call must reuse the first specialization"
    );
}

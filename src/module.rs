//! The module driver (spec §3 "Modules", §4.7 "Module processing"),
//! expression lowering, and the collaborator interface a host embeds this
//! crate behind for cross-module imports. Grounded on
//! `nudl/analysis/module.h`'s `Module`/`ModuleStore`/`PathBasedFileReader`
//! trio, kept here as a single named-interface trait since parsing and
//! file resolution are explicitly out of scope (spec §1).

use tracing::{debug, instrument};

use crate::ast::{
    AssignmentAst, ExprAst, ExprKindAst, FieldAst, FunctionCallCalleeAst, FunctionDefAst,
    FunctionResultKindAst, LiteralAst, ModuleAst, ModuleElementKind, Operator, SchemaAst, TypeAst,
    TypeDefAst,
};
use crate::binding::{CallArgs, FunctionCallArgument};
use crate::error::{AnalysisError, CodeContext, ErrorKind, Result, StatusBuilder};
use crate::expr::{ExprId, ExprKind, LiteralValue};
use crate::function::{FunctionGroupId, FunctionId, ParameterSpec, TypeParamSpec};
use crate::index::newtype_index;
use crate::name::{Name, ScopeName, ScopedName};
use crate::object::{NamedObjectId, ObjectKind};
use crate::operator::{is_unary, operator_method_name};
use crate::pragma::PragmaHandler;
use crate::scope::ScopeId;
use crate::types::{TypeParam, TypeSpecId, TypeTag};
use crate::vars::VarBase;
use crate::Env;

newtype_index! {
    pub struct ModuleId;
}

#[derive(Debug)]
pub struct ModuleData {
    pub name: ScopeName,
    pub scope: ScopeId,
    pub pragma_handler: PragmaHandler,
    pub main_function: Option<FunctionGroupId>,
}

/// The single collaborator this crate asks its embedder for: given a
/// dotted module name, return the scope of that module's (already parsed
/// and analyzed) top level. How that scope came to exist, whether by
/// reading a file, querying a build graph, or recursive analysis, is
/// entirely the embedder's concern.
pub trait ModuleStore {
    fn resolve_module(&mut self, env: &mut Env, module_name: &Name) -> Result<ScopeId>;
}

impl Env {
    /// Processes one module's top-level elements in order, accumulating
    /// (rather than short-circuiting on) errors across elements, per spec
    /// §4.7 and §7.
    #[instrument(skip(self, ast, store))]
    pub fn process_module(
        &mut self,
        name: ScopeName,
        ast: &ModuleAst,
        store: &mut dyn ModuleStore,
    ) -> Result<ModuleId> {
        let top = self.top_scope(self.built_in_scope);
        let scope = self.add_sub_scope(top, name.clone(), ObjectKind::Module, true)?;
        let module_id = self.modules.push(ModuleData {
            name: name.clone(),
            scope,
            pragma_handler: PragmaHandler::new(),
            main_function: None,
        });

        // A `ModuleStore` may recurse back into `process_module` to analyze
        // an import, so the previous module's flags are restored on exit
        // rather than simply reset to the default.
        let outer_flags = self.active_pragma_flags;

        let mut status = StatusBuilder::new();
        for (index, element) in ast.elements.iter().enumerate() {
            self.active_pragma_flags = self.modules[module_id].pragma_handler.flags();
            if self.active_pragma_flags.log_bindings() {
                debug!(module = %name, index, "processing module element");
            }
            let outcome = match &element.kind {
                ModuleElementKind::Import(import) => self.process_import(module_id, import, store),
                ModuleElementKind::Schema(schema) => self.process_schema(scope, schema),
                ModuleElementKind::FunctionDefinition(def) => {
                    self.process_function_definition(module_id, def)
                }
                ModuleElementKind::Assignment(assignment) => {
                    self.process_assignment(scope, assignment)
                }
                ModuleElementKind::Pragma(pragma) => {
                    self.modules[module_id].pragma_handler.apply(pragma);
                    Ok(())
                }
                ModuleElementKind::TypeDefinition(type_def) => {
                    self.process_type_definition(scope, type_def)
                }
            };
            status.record(outcome.map_err(|e| {
                AnalysisError::at(e.kind, &element.context, e.to_string())
            }));
        }

        if self.modules[module_id].pragma_handler.flags().dump_types() {
            for (type_name, type_id) in self.type_store.names_in_scope(&name) {
                debug!(module = %name, %type_name, ?type_id, "declared type");
            }
        }

        self.active_pragma_flags = outer_flags;
        status.into_result()?;
        Ok(module_id)
    }

    fn process_import(
        &mut self,
        module_id: ModuleId,
        import: &crate::ast::ImportAst,
        store: &mut dyn ModuleStore,
    ) -> Result<()> {
        let imported_scope = store.resolve_module(self, &import.module_name)?;
        let local_name = import.local_name.clone().unwrap_or_else(|| import.module_name.clone());
        let scope = self.modules[module_id].scope;
        self.define_name(scope, local_name, NamedObjectId::Scope(imported_scope))
    }

    fn process_schema(&mut self, scope: ScopeId, schema: &SchemaAst) -> Result<()> {
        let scope_name = self.scopes[scope].scope_name.clone();
        let member_store = self.add_sub_scope(
            scope,
            scope_name.extend_module(schema.name.clone()),
            ObjectKind::TypeMemberStore,
            false,
        )?;

        let mut fields = Vec::with_capacity(schema.fields.len());
        for field in &schema.fields {
            let field_type = self.find_type(scope, &field.type_expr)?;
            fields.push((field.clone(), field_type));
        }

        let struct_type = self.types.alloc(crate::types::TypeSpec {
            tag: TypeTag::Struct,
            name: schema.name.clone(),
            scope_name: scope_name.clone(),
            result_type: None,
            parameters: fields.iter().map(|(_, t)| TypeParam::Type(*t)).collect(),
            type_member_store: Some(member_store),
            local: None,
        });
        // Spec §4.3 `AddRegistrationCallback`: registered before
        // `declare_type` so that call fires it, rather than this function
        // synthesizing the constructors directly.
        self.add_type_registration_callback(
            crate::type_store::TypeRegistrationCallback::SynthesizeStructConstructors {
                type_id: struct_type,
                member_store,
                fields: fields.clone(),
            },
        );
        self.declare_type(scope_name, schema.name.clone(), struct_type)?;

        for (field, field_type) in &fields {
            let var = self.vars.push(VarBase::new(
                field.name.clone(),
                ObjectKind::Field,
                *field_type,
                member_store,
            ));
            self.define_name(member_store, field.name.clone(), NamedObjectId::Var(var))?;
        }

        Ok(())
    }

    /// Emits the `__init__` (all-fields) and `__init__copy__` constructors
    /// onto a struct's member store (spec §4.5 "Constructor synthesis").
    /// Invoked through [`crate::type_store::TypeRegistrationCallback`], not
    /// called directly by module processing.
    pub(crate) fn synthesize_struct_constructors(
        &mut self,
        struct_type: TypeSpecId,
        member_store: ScopeId,
        fields: &[(FieldAst, TypeSpecId)],
    ) -> Result<()> {
        let group = self.add_function_group(
            member_store,
            Name::new(crate::function::CONSTRUCTOR_NAME),
            ObjectKind::MethodGroup,
        )?;

        let mut parameters = Vec::with_capacity(fields.len());
        for (field, field_type) in fields {
            let var = self.vars.push(VarBase::new(
                field.name.clone(),
                ObjectKind::Parameter,
                *field_type,
                member_store,
            ));
            parameters.push(ParameterSpec {
                name: field.name.clone(),
                var,
                type_spec: *field_type,
                default_value: None,
                skip_conversion: false,
            });
        }
        self.add_function(
            group,
            ObjectKind::Constructor,
            Vec::new(),
            parameters,
            FunctionResultKindAst::Return,
            Some(struct_type),
            crate::function::FunctionBody::Native(Vec::new()),
        )?;

        let copy_var = self.vars.push(VarBase::new(
            Name::new("other"),
            ObjectKind::Parameter,
            struct_type,
            member_store,
        ));
        self.add_function(
            group,
            ObjectKind::Constructor,
            Vec::new(),
            vec![ParameterSpec {
                name: Name::new("other"),
                var: copy_var,
                type_spec: struct_type,
                default_value: None,
                skip_conversion: false,
            }],
            FunctionResultKindAst::Return,
            Some(struct_type),
            crate::function::FunctionBody::Native(Vec::new()),
        )?;
        Ok(())
    }

    fn process_type_definition(&mut self, scope: ScopeId, type_def: &TypeDefAst) -> Result<()> {
        let resolved = self.find_type(scope, &type_def.type_expr)?;
        let scope_name = self.scopes[scope].scope_name.clone();
        self.declare_type(scope_name, type_def.name.clone(), resolved)
    }

    fn process_function_definition(&mut self, module_id: ModuleId, def: &FunctionDefAst) -> Result<()> {
        let scope = self.modules[module_id].scope;
        let kind = if def.is_main {
            ObjectKind::MainFunction
        } else if def.is_method {
            ObjectKind::Method
        } else {
            ObjectKind::Function
        };
        // Spec §4.5 "Validation rules": "A function declared `main` must
        // have no arguments and a non-native body."
        if def.is_main {
            if !def.parameters.is_empty() {
                return Err(AnalysisError::new(
                    ErrorKind::InvalidArgument,
                    "a `main` function must take no arguments",
                ));
            }
            if !def.native_impl.is_empty() {
                return Err(AnalysisError::new(
                    ErrorKind::InvalidArgument,
                    "a `main` function cannot have a native body",
                ));
            }
        }
        let group_kind = if def.is_method {
            ObjectKind::MethodGroup
        } else {
            ObjectKind::FunctionGroup
        };
        let group = self.add_function_group(scope, def.name.clone(), group_kind)?;
        let function = self.build_function_overload(scope, group, kind, def)?;
        if def.is_main {
            self.modules[module_id].main_function = Some(group);
        }
        // Spec §4.7: "If all argument types are concrete, the body is
        // analyzed immediately; otherwise body analysis is deferred until
        // the first specialization." A generic template's body still waits
        // for a call site to supply concrete types (`resolve_call`).
        if !self.functions[function].is_generic_template(&self.types.arena) {
            self.negotiate_function_body(function)?;
        }
        Ok(())
    }

    /// Parses one overload's signature (type parameters, parameter types,
    /// default values, declared result type) and registers it on `group`,
    /// leaving the body unprocessed until a call site specializes it
    /// (spec §4.5/§4.6 "on-demand specialization").
    fn build_function_overload(
        &mut self,
        parent_scope: ScopeId,
        group: FunctionGroupId,
        kind: ObjectKind,
        def: &FunctionDefAst,
    ) -> Result<FunctionId> {
        // One fresh local-type-site scope per signature: every `{T}` in
        // this function's parameter/result type expressions shares a site;
        // an unrelated function's `{T}` must not (spec §3, see
        // `Env::local_site_scratch`).
        self.local_site_scratch.clear();
        let overload_local_name = self.next_local_name(parent_scope, &def.name.to_string());
        let sig_scope_name = self.scopes[parent_scope]
            .scope_name
            .extend_function(overload_local_name);
        // `find_type` needs a scope to resolve names against for type
        // parameters before the function's own scope exists, so resolve
        // signature types against the group's parent scope.
        let type_params = def
            .type_params
            .iter()
            .map(|tp| {
                let bound = tp
                    .bound
                    .as_ref()
                    .map(|b| self.find_type(parent_scope, b))
                    .transpose()?;
                Ok(TypeParamSpec {
                    name: tp.name.clone(),
                    bound,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut parameters = Vec::with_capacity(def.parameters.len());
        for param in &def.parameters {
            let type_spec = match &param.type_expr {
                Some(t) => self.find_type(parent_scope, t)?,
                None => {
                    let site = self.types.next_local_site();
                    self.types.alloc(crate::types::TypeSpec {
                        tag: TypeTag::Unknown,
                        name: param.name.clone(),
                        scope_name: sig_scope_name.clone(),
                        result_type: None,
                        parameters: Vec::new(),
                        type_member_store: None,
                        local: Some(crate::types::LocalInfo {
                            name: param.name.clone(),
                            site,
                            bound: None,
                        }),
                    })
                }
            };
            let var = self.vars.push(VarBase::new(
                param.name.clone(),
                ObjectKind::Parameter,
                type_spec,
                parent_scope,
            ));
            parameters.push(ParameterSpec {
                name: param.name.clone(),
                var,
                type_spec,
                default_value: None,
                skip_conversion: false,
            });
        }

        let result_type = match &def.result_type {
            Some(t) => Some(self.find_type(parent_scope, t)?),
            // A lambda literal's result is almost never declared; give it a
            // local placeholder so the lambda has *some* (abstract)
            // function type the moment it is lowered, without waiting for
            // a call site to negotiate its body (spec §4.4 "Lambda": the
            // lambda negotiates against its hint only once one is
            // available). Named functions instead leave this `None` and
            // rely on `negotiate_function_body`'s inference, since they
            // are never referenced as bare identifier values before a call
            // resolves them (`lower_call` goes through the function group,
            // not through `Env::object_type`).
            None if kind == ObjectKind::Lambda => {
                let site = self.types.next_local_site();
                Some(self.types.alloc(crate::types::TypeSpec {
                    tag: TypeTag::Unknown,
                    name: Name::new("__lambda_result"),
                    scope_name: sig_scope_name.clone(),
                    result_type: None,
                    parameters: Vec::new(),
                    type_member_store: None,
                    local: Some(crate::types::LocalInfo {
                        name: Name::new("__lambda_result"),
                        site,
                        bound: None,
                    }),
                }))
            }
            None => None,
        };

        let body = if !def.native_impl.is_empty() {
            crate::function::FunctionBody::Native(def.native_impl.clone())
        } else {
            crate::function::FunctionBody::Unprocessed(def.body.clone().unwrap_or_default())
        };

        self.add_function(
            group,
            kind,
            type_params,
            parameters,
            def.result_kind,
            result_type,
            body,
        )
    }

    fn process_assignment(&mut self, scope: ScopeId, assignment: &AssignmentAst) -> Result<()> {
        let declared_type = assignment
            .declared_type
            .as_ref()
            .map(|t| self.find_type(scope, t))
            .transpose()?;
        let value = self.lower_expr_with_hint(scope, &assignment.value, declared_type)?;
        let value_type = self.expr_type(value);
        let type_spec = match declared_type {
            Some(declared) => {
                if !self.types.is_convertible_from(declared, value_type) {
                    return Err(AnalysisError::new(
                        ErrorKind::InvalidArgument,
                        format!("`{}`'s declared type does not accept its assigned value", assignment.name),
                    ));
                }
                declared
            }
            None => value_type,
        };

        // Module-level-parameter exception (spec §4.5): a `param`
        // assignment at module scope becomes a `Parameter`; everywhere
        // else, and for non-`param` module assignments, it's a plain
        // `Variable`.
        let is_module_scope = self.scopes[scope].is_module;
        let kind = if assignment.is_param && is_module_scope {
            ObjectKind::Parameter
        } else {
            ObjectKind::Variable
        };
        if assignment.is_param && !is_module_scope {
            return Err(AnalysisError::new(
                ErrorKind::InvalidArgument,
                "`param` assignments are only allowed at module scope",
            ));
        }

        let mut var = VarBase::new(assignment.name.clone(), kind, type_spec, scope);
        var.is_module_parameter = kind == ObjectKind::Parameter;
        let var_id = self.vars.push(var);
        self.define_name(scope, assignment.name.clone(), NamedObjectId::Var(var_id))
    }

    // -- Expression lowering -------------------------------------------

    pub fn lower_expr(&mut self, scope: ScopeId, ast: &ExprAst) -> Result<ExprId> {
        let context = ast.context.clone();
        match &ast.kind {
            ExprKindAst::Literal(lit) => {
                let kind = ExprKind::Literal(lower_literal(lit));
                self.build_expr(context, kind)
            }
            ExprKindAst::Identifier { scope_prefix, name } => {
                let lookup_scope = self.scopes[scope].scope_name.clone();
                let scoped = ScopedName::new(ScopeName::module(scope_prefix.clone()), name.clone());
                let object = self.find_name(&lookup_scope, &scoped)?;
                self.build_expr(context, ExprKind::Identifier(object))
            }
            ExprKindAst::EmptyStruct => self.build_expr(context, ExprKind::EmptyStruct),
            ExprKindAst::Operator { op, operands } => self.lower_operator(scope, context, *op, operands),
            ExprKindAst::Between { value, low, high } => {
                self.lower_between(scope, context, value, low, high)
            }
            ExprKindAst::ArrayDef(items) => {
                let ids = items
                    .iter()
                    .map(|i| self.lower_expr(scope, i))
                    .collect::<Result<Vec<_>>>()?;
                self.build_expr(context, ExprKind::ArrayDef(ids))
            }
            ExprKindAst::MapDef(entries) => {
                let ids = entries
                    .iter()
                    .map(|(k, v)| Ok((self.lower_expr(scope, k)?, self.lower_expr(scope, v)?)))
                    .collect::<Result<Vec<_>>>()?;
                self.build_expr(context, ExprKind::MapDef(ids))
            }
            ExprKindAst::TupleDef(fields) => {
                let ids = fields
                    .iter()
                    .map(|(n, e)| Ok((n.clone(), self.lower_expr(scope, e)?)))
                    .collect::<Result<Vec<_>>>()?;
                self.build_expr(context, ExprKind::TupleDef(ids))
            }
            ExprKindAst::Index { object, index } => {
                let object_id = self.lower_expr(scope, object)?;
                let index_id = self.lower_expr(scope, index)?;
                self.build_expr(
                    context,
                    ExprKind::Index {
                        object: object_id,
                        index: index_id,
                    },
                )
            }
            ExprKindAst::TupleIndex { object, index } => {
                let object_id = self.lower_expr(scope, object)?;
                self.build_expr(
                    context,
                    ExprKind::TupleIndex {
                        object: object_id,
                        index: *index,
                    },
                )
            }
            ExprKindAst::If { branches, else_branch } => {
                let mut lowered_branches = Vec::with_capacity(branches.len());
                for (cond, body) in branches {
                    let cond_id = self.lower_expr(scope, cond)?;
                    let body_ids = body
                        .iter()
                        .map(|e| self.lower_expr(scope, e))
                        .collect::<Result<Vec<_>>>()?;
                    lowered_branches.push((cond_id, body_ids));
                }
                let else_ids = else_branch
                    .as_ref()
                    .map(|body| body.iter().map(|e| self.lower_expr(scope, e)).collect::<Result<Vec<_>>>())
                    .transpose()?;
                self.build_expr(
                    context,
                    ExprKind::If {
                        branches: lowered_branches,
                        else_branch: else_ids,
                    },
                )
            }
            ExprKindAst::ExpressionBlock(body) => {
                let scope_name = self.scopes[scope].scope_name.clone();
                let block_name = self.next_local_name(scope, "__block");
                let block_scope =
                    self.add_sub_scope(scope, scope_name.extend_function(block_name), ObjectKind::Scope, false)?;
                let ids = body
                    .iter()
                    .map(|e| self.lower_expr(block_scope, e))
                    .collect::<Result<Vec<_>>>()?;
                self.build_expr(context, ExprKind::Block(ids))
            }
            ExprKindAst::Lambda(def) => self.lower_lambda(scope, context, def),
            ExprKindAst::DotAccess { object, name } => self.lower_dot_access(scope, context, object, name),
            ExprKindAst::FunctionCall { callee, args } => self.lower_call(scope, context, callee, args),
            ExprKindAst::Assignment {
                name,
                declared_type,
                value,
            } => self.lower_local_assignment(scope, context, name, declared_type, value),
            ExprKindAst::FunctionResult { kind, value } => {
                let value_id = value.as_ref().map(|v| self.lower_expr(scope, v)).transpose()?;
                self.build_expr(
                    context,
                    ExprKind::FunctionResult {
                        kind: *kind,
                        value: value_id,
                    },
                )
            }
            ExprKindAst::Pragma(pragma) => {
                debug!(pragma = pragma.name.as_str(), "pragma encountered inside expression body");
                self.build_expr(context, ExprKind::Nop)
            }
            ExprKindAst::Nop => self.build_expr(context, ExprKind::Nop),
        }
    }

    /// `NegotiateType(hint)` (spec §4.4): lowers `ast` with an expected
    /// type from its enclosing context. Only the expression kinds whose
    /// negotiated type actually depends on that context — literals, `[]`,
    /// and array/map literals choosing their container kind and widening
    /// their element types — consult `hint`; everything else negotiates
    /// independent of context and defers to [`Env::lower_expr`].
    pub fn lower_expr_with_hint(&mut self, scope: ScopeId, ast: &ExprAst, hint: Option<TypeSpecId>) -> Result<ExprId> {
        let context = ast.context.clone();
        match &ast.kind {
            ExprKindAst::Literal(lit) => {
                let kind = ExprKind::Literal(lower_literal(lit));
                self.build_expr_with_hint(context, kind, hint)
            }
            ExprKindAst::EmptyStruct => self.build_expr_with_hint(context, ExprKind::EmptyStruct, hint),
            ExprKindAst::ArrayDef(items) => {
                let elem_hint =
                    hint.and_then(|h| self.types.get(h).parameters.first().and_then(|p| p.as_type()));
                let ids = items
                    .iter()
                    .map(|i| self.lower_expr_with_hint(scope, i, elem_hint))
                    .collect::<Result<Vec<_>>>()?;
                self.build_expr_with_hint(context, ExprKind::ArrayDef(ids), hint)
            }
            ExprKindAst::MapDef(entries) => {
                let hint_params = hint.map(|h| self.types.get(h).parameters.clone());
                let key_hint = hint_params.as_ref().and_then(|p| p.first().and_then(|p| p.as_type()));
                let value_hint = hint_params.as_ref().and_then(|p| p.get(1).and_then(|p| p.as_type()));
                let ids = entries
                    .iter()
                    .map(|(k, v)| {
                        Ok((
                            self.lower_expr_with_hint(scope, k, key_hint)?,
                            self.lower_expr_with_hint(scope, v, value_hint)?,
                        ))
                    })
                    .collect::<Result<Vec<_>>>()?;
                self.build_expr_with_hint(context, ExprKind::MapDef(ids), hint)
            }
            _ => self.lower_expr(scope, ast),
        }
    }

    fn lower_operator(
        &mut self,
        scope: ScopeId,
        context: CodeContext,
        op: Operator,
        operands: &[ExprAst],
    ) -> Result<ExprId> {
        let operand_ids = operands
            .iter()
            .map(|o| self.lower_expr(scope, o))
            .collect::<Result<Vec<_>>>()?;
        let receiver = *operand_ids
            .first()
            .ok_or_else(|| AnalysisError::bug("operator expression with no operands"))?;
        let args: Vec<ExprId> = if is_unary(op) {
            Vec::new()
        } else {
            operand_ids[1..].to_vec()
        };
        self.build_method_call(scope, context, receiver, operator_method_name(op), args)
    }

    /// `a between b and c` desugars to `b <= a && a <= c` (SPEC_FULL §C).
    fn lower_between(
        &mut self,
        scope: ScopeId,
        context: CodeContext,
        value: &ExprAst,
        low: &ExprAst,
        high: &ExprAst,
    ) -> Result<ExprId> {
        let value_id = self.lower_expr(scope, value)?;
        let low_id = self.lower_expr(scope, low)?;
        let high_id = self.lower_expr(scope, high)?;
        let lower_bound = self.build_method_call(
            scope,
            context.clone(),
            low_id,
            operator_method_name(Operator::Le),
            vec![value_id],
        )?;
        let upper_bound = self.build_method_call(
            scope,
            context.clone(),
            value_id,
            operator_method_name(Operator::Le),
            vec![high_id],
        )?;
        self.build_method_call(scope, context, lower_bound, operator_method_name(Operator::And), vec![upper_bound])
    }

    fn build_method_call(
        &mut self,
        scope: ScopeId,
        context: CodeContext,
        receiver: ExprId,
        method_name: &str,
        args: Vec<ExprId>,
    ) -> Result<ExprId> {
        let receiver_type = self.expr_type(receiver);
        let member_store = self.types.get(receiver_type).type_member_store.ok_or_else(|| {
            AnalysisError::at(
                ErrorKind::InvalidArgument,
                &context,
                format!("`{}` has no method `{method_name}`", self.types.get(receiver_type).name),
            )
        })?;
        let group_object = self.scopes[member_store]
            .defined_names
            .get(&Name::new(method_name))
            .copied()
            .ok_or_else(|| {
                AnalysisError::at(
                    ErrorKind::NotFound,
                    &context,
                    format!("`{}` has no method `{method_name}`", self.types.get(receiver_type).name),
                )
            })?;
        let group = group_object.as_function_group().ok_or_else(|| {
            AnalysisError::bug(format!("`{method_name}` is registered but is not a function group"))
        })?;

        let mut call_args: CallArgs = smallvec::smallvec![FunctionCallArgument {
            name: None,
            value: receiver,
        }];
        call_args.extend(args.into_iter().map(|value| FunctionCallArgument { name: None, value }));

        let (function, arg_exprs) = self.resolve_call(group, &call_args)?;
        let _ = scope;
        self.build_expr(context, ExprKind::FunctionCall { function, args: arg_exprs })
    }

    fn lower_call(
        &mut self,
        scope: ScopeId,
        context: CodeContext,
        callee: &FunctionCallCalleeAst,
        args: &[crate::ast::CallArgAst],
    ) -> Result<ExprId> {
        // `a.map(g)`-style calls parse their callee as a `DotAccess` AST
        // node rather than a plain identifier; route those through method
        // dispatch instead of treating `a.map` as a first-class value.
        if let FunctionCallCalleeAst::Expr(expr) = callee {
            if let ExprKindAst::DotAccess { object, name } = &expr.kind {
                let receiver = self.lower_expr(scope, object)?;
                let arg_exprs = args
                    .iter()
                    .map(|a| self.lower_expr(scope, &a.value))
                    .collect::<Result<Vec<_>>>()?;
                return self.build_method_call(scope, context, receiver, name.as_str(), arg_exprs);
            }
        }

        let lowered_args = args
            .iter()
            .map(|a| {
                Ok(FunctionCallArgument {
                    name: a.name.clone(),
                    value: self.lower_expr(scope, &a.value)?,
                })
            })
            .collect::<Result<CallArgs>>()?;

        let group = match callee {
            FunctionCallCalleeAst::Identifier { scope_prefix, name } => {
                let lookup_scope = self.scopes[scope].scope_name.clone();
                let scoped = ScopedName::new(ScopeName::module(scope_prefix.clone()), name.clone());
                self.find_function_by_name(&lookup_scope, &scoped)?
            }
            FunctionCallCalleeAst::Type(type_ast) => {
                let type_id = self.find_type(scope, type_ast)?;
                let member_store = self.types.get(type_id).type_member_store.ok_or_else(|| {
                    AnalysisError::at(ErrorKind::InvalidArgument, &context, "type has no constructor")
                })?;
                self.scopes[member_store]
                    .defined_names
                    .get(&Name::new(crate::function::CONSTRUCTOR_NAME))
                    .and_then(|o| o.as_function_group())
                    .ok_or_else(|| AnalysisError::at(ErrorKind::NotFound, &context, "type has no constructor"))?
            }
            FunctionCallCalleeAst::Expr(expr) => {
                return Err(AnalysisError::at(
                    ErrorKind::Unimplemented,
                    &context,
                    format!("calling a first-class function value ({expr:?}) is not supported"),
                ))
            }
        };

        let (function, arg_exprs) = self.resolve_call(group, &lowered_args)?;
        self.build_expr(context, ExprKind::FunctionCall { function, args: arg_exprs })
    }

    fn lower_dot_access(
        &mut self,
        scope: ScopeId,
        context: CodeContext,
        object: &ExprAst,
        name: &Name,
    ) -> Result<ExprId> {
        let object_id = self.lower_expr(scope, object)?;
        let object_type = self.expr_type(object_id);
        let member_store = self
            .types
            .get(object_type)
            .type_member_store
            .ok_or_else(|| AnalysisError::at(ErrorKind::InvalidArgument, &context, format!("`{name}` has no members")))?;
        let member = self.scopes[member_store]
            .defined_names
            .get(name)
            .copied()
            .ok_or_else(|| AnalysisError::at(ErrorKind::NotFound, &context, format!("no member `{name}`")))?;
        match member {
            NamedObjectId::Var(_) => self.build_expr(context, ExprKind::Identifier(member)),
            NamedObjectId::FunctionGroup(group) => {
                let (function, arg_exprs) = self.resolve_call(group, &[FunctionCallArgument {
                    name: None,
                    value: object_id,
                }])?;
                self.build_expr(context, ExprKind::FunctionCall { function, args: arg_exprs })
            }
            _ => Err(AnalysisError::bug("dot-access resolved to an unsupported member kind")),
        }
    }

    fn lower_lambda(&mut self, scope: ScopeId, context: CodeContext, def: &FunctionDefAst) -> Result<ExprId> {
        let lambda_name = self.next_local_name(scope, "__lambda");
        let group = self.add_function_group(scope, lambda_name, ObjectKind::FunctionGroup)?;
        let function = self.build_function_overload(scope, group, ObjectKind::Lambda, def)?;
        self.build_expr(context, ExprKind::Lambda(function))
    }

    fn lower_local_assignment(
        &mut self,
        scope: ScopeId,
        context: CodeContext,
        name: &Name,
        declared_type: &Option<TypeAst>,
        value: &ExprAst,
    ) -> Result<ExprId> {
        let resolved_declared = declared_type.as_ref().map(|t| self.find_type(scope, t)).transpose()?;
        let value_id = self.lower_expr_with_hint(scope, value, resolved_declared)?;
        let value_type = self.expr_type(value_id);
        let type_spec = match resolved_declared {
            Some(declared) => {
                if !self.types.is_convertible_from(declared, value_type) {
                    return Err(AnalysisError::at(
                        ErrorKind::InvalidArgument,
                        &context,
                        format!("`{name}`'s declared type does not accept its assigned value"),
                    ));
                }
                declared
            }
            None => value_type,
        };
        let var = self.vars.push(VarBase::new(name.clone(), ObjectKind::Variable, type_spec, scope));
        self.define_name(scope, name.clone(), NamedObjectId::Var(var))?;
        self.build_expr(context, ExprKind::Assignment { var, value: value_id })
    }

    /// Negotiates a specialization's body once it has become fully
    /// concrete (spec §4.4 "Function result negotiation"). The module
    /// driver calls this after [`Env::resolve_call`] materializes a new
    /// specialization whose body is still [`crate::function::FunctionBody::Unprocessed`].
    pub fn negotiate_function_body(&mut self, function: FunctionId) -> Result<()> {
        let (scope, body_ast, declared_result, result_kind) = {
            let data = &self.functions[function];
            let crate::function::FunctionBody::Unprocessed(body) = &data.body else {
                return Ok(());
            };
            (data.scope, body.clone(), data.result_type, data.result_kind)
        };

        let body_ids = body_ast
            .iter()
            .map(|e| self.lower_expr(scope, e))
            .collect::<Result<Vec<_>>>()?;

        let exit_types = self.collect_function_exits(&body_ids, result_kind);
        let mut candidates = exit_types;
        if matches!(result_kind, FunctionResultKindAst::Return) {
            if let Some(&last) = body_ids.last() {
                if !self.contains_function_exit(&body_ids) {
                    candidates.push(self.expr_type(last));
                }
            }
        }

        let inferred = if candidates.is_empty() {
            self.builtin_types.null
        } else {
            self.join_candidates(&candidates)?
        };

        let result_type = match declared_result {
            Some(declared) => {
                if matches!(result_kind, FunctionResultKindAst::Return | FunctionResultKindAst::Yield)
                    && !self.types.is_convertible_from(declared, inferred)
                {
                    return Err(AnalysisError::new(
                        ErrorKind::InvalidArgument,
                        "function body does not produce its declared result type",
                    ));
                }
                Some(declared)
            }
            None => match result_kind {
                FunctionResultKindAst::Pass | FunctionResultKindAst::None => None,
                _ => Some(inferred),
            },
        };

        self.functions[function].result_type = result_type;
        self.functions[function].body = crate::function::FunctionBody::Negotiated(body_ids);
        Ok(())
    }

    fn collect_function_exits(&self, exprs: &[ExprId], kind: FunctionResultKindAst) -> Vec<TypeSpecId> {
        let mut out = Vec::new();
        for &id in exprs {
            match &self.exprs[id].kind {
                ExprKind::FunctionResult { kind: k, value } if *k == kind => {
                    if let Some(v) = value {
                        out.push(self.expr_type(*v));
                    } else {
                        out.push(self.builtin_types.null);
                    }
                }
                ExprKind::Block(body) => out.extend(self.collect_function_exits(body, kind)),
                ExprKind::If {
                    branches,
                    else_branch,
                } => {
                    for (_, body) in branches {
                        out.extend(self.collect_function_exits(body, kind));
                    }
                    if let Some(body) = else_branch {
                        out.extend(self.collect_function_exits(body, kind));
                    }
                }
                _ => {}
            }
        }
        out
    }

    /// Joins a function body's registered return/yield types into the most
    /// specific common type (spec §4.4): `Null` widens any non-null partner
    /// to `Nullable<T>`, and two otherwise-unrelated types (neither an
    /// ancestor nor numerically convertible) fail the analysis rather than
    /// silently collapsing to `Any`.
    fn join_candidates(&mut self, types: &[TypeSpecId]) -> Result<TypeSpecId> {
        let mut acc = types[0];
        for &t in &types[1..] {
            acc = self.join_pair(acc, t)?;
        }
        Ok(acc)
    }

    fn join_pair(&mut self, a: TypeSpecId, b: TypeSpecId) -> Result<TypeSpecId> {
        if self.types.is_equal(a, b) {
            return Ok(a);
        }
        let a_null = self.types.get(a).tag.is_null();
        let b_null = self.types.get(b).tag.is_null();
        if a_null && !b_null {
            return Ok(self.wrap_nullable(b));
        }
        if b_null && !a_null {
            return Ok(self.wrap_nullable(a));
        }
        if self.types.is_convertible_from(a, b) {
            return Ok(a);
        }
        if self.types.is_convertible_from(b, a) {
            return Ok(b);
        }
        Err(AnalysisError::new(
            ErrorKind::InvalidArgument,
            format!(
                "`{}` is incompatible with a previous `{}` return",
                self.types.get(b).name,
                self.types.get(a).name
            ),
        ))
    }
}

fn lower_literal(lit: &LiteralAst) -> LiteralValue {
    match lit {
        LiteralAst::Null => LiteralValue::Null,
        LiteralAst::Bool(v) => LiteralValue::Bool(*v),
        LiteralAst::Int(v) => LiteralValue::Int(*v),
        LiteralAst::Float(v) => LiteralValue::Float(*v),
        LiteralAst::Str(v) => LiteralValue::Str(v.clone()),
        LiteralAst::Bytes(v) => LiteralValue::Bytes(v.clone()),
    }
}

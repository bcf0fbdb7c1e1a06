//! The function binding engine (spec §3 "Function bindings", §4.6
//! "Binding engine"). Grounded on `nudl/analysis/function.h`'s
//! `FunctionBinding`/`FunctionCallArgument` and the
//! `BindArgument`/`BindDefaultValue` pair they document.
//!
//! Open Question (spec §9): binding a function-typed parameter against a
//! still-generic lambda argument can discover a more specific instance of
//! that lambda than the one the caller originally wrote. The original
//! rewrites the call argument's underlying object pointer in place. Since
//! expression nodes here are immutable once pushed into the arena, this
//! crate instead has [`Env::bind_call`] return the *substituted*
//! [`ExprId`] for such arguments in [`FunctionBinding::arg_exprs`], and
//! callers (the module driver) use that vector, not the caller's original
//! argument list, when assembling the final call expression. Recorded in
//! `DESIGN.md`.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::debug;

use crate::error::{AnalysisError, ErrorKind, Result};
use crate::expr::{ExprId, ExprKind};
use crate::function::{FunctionData, FunctionGroupId, FunctionId};
use crate::name::Name;
use crate::types::{LocalNamesRebinder, TypeSpecId};
use crate::Env;

#[derive(Debug, Clone)]
pub struct FunctionCallArgument {
    pub name: Option<Name>,
    pub value: ExprId,
}

/// Most calls pass a handful of arguments; inlining those up to 4 avoids a
/// heap allocation per call site lowered (spec §4.6 binding is on the hot
/// path of every function-body negotiation).
pub type CallArgs = SmallVec<[FunctionCallArgument; 4]>;

/// The outcome of successfully binding one overload template against a
/// concrete argument list.
#[derive(Debug, Clone)]
pub struct FunctionBinding {
    pub template: FunctionId,
    /// Concrete argument expressions, in parameter order; may differ from
    /// the caller's original expressions per the Open Question resolution
    /// documented on this module.
    pub arg_exprs: Vec<ExprId>,
    pub concrete_param_types: Vec<TypeSpecId>,
    /// `None` when the template itself declares no result type; callers
    /// must negotiate the template/specialization's body (spec §4.5
    /// "Result negotiation") before the call expression's own type can be
    /// read off [`crate::function::FunctionData::result_type`].
    pub result_type: Option<TypeSpecId>,
}

impl Env {
    /// Resolves a call against a function group: binds every overload
    /// candidate, requires exactly one success, and returns the concrete
    /// (possibly freshly specialized) [`FunctionId`] to invoke (spec §4.5
    /// "Group signature selection", §4.6 binding).
    pub fn resolve_call(
        &mut self,
        group_id: FunctionGroupId,
        args: &[FunctionCallArgument],
    ) -> Result<(FunctionId, Vec<ExprId>)> {
        let templates = self.function_groups[group_id].functions.clone();
        let mut successes = Vec::new();
        let mut failures = Vec::new();
        for template in templates {
            match self.bind_one(template, args) {
                Ok(binding) => successes.push(binding),
                Err(err) => {
                    let key = self.describe_template(template);
                    failures.push((key, err));
                }
            }
        }

        if successes.is_empty() {
            self.function_groups[group_id]
                .failed_instances
                .extend(failures.clone());
            let merged = failures
                .into_iter()
                .map(|(_, err)| err)
                .reduce(AnalysisError::merge)
                .unwrap_or_else(|| {
                    AnalysisError::new(ErrorKind::NotFound, "no overload accepts this call")
                });
            return Err(merged);
        }

        // Spec §4.5 "Group signature selection": a candidate dominated by a
        // strictly more specific one drops out first; only once no further
        // narrowing is possible does a remaining tie (or genuine mismatch)
        // become an ambiguity error.
        let winner = if successes.len() > 1 {
            let winners: Vec<usize> = (0..successes.len())
                .filter(|&i| {
                    !(0..successes.len()).any(|j| {
                        j != i
                            && self.signature_at_least_as_specific(
                                &successes[j].concrete_param_types,
                                &successes[i].concrete_param_types,
                            )
                            && !self.signature_at_least_as_specific(
                                &successes[i].concrete_param_types,
                                &successes[j].concrete_param_types,
                            )
                    })
                })
                .collect();
            if winners.len() > 1 {
                let base_name = self.functions[successes[0].template].name.clone();
                let keys: Vec<TypeSpecId> = successes[winners[0]].concrete_param_types.clone();
                let identical = winners
                    .iter()
                    .all(|&i| successes[i].concrete_param_types == keys);
                if !identical {
                    return Err(AnalysisError::new(
                        ErrorKind::Ambiguous,
                        format!("call to `{base_name}` matches more than one overload"),
                    ));
                }
            }
            winners[0]
        } else {
            0
        };

        let binding = successes.swap_remove(winner);
        let template = binding.template;

        // A template with no abstract parameter types needs no
        // specialization clone: it *is* its own single instance (spec
        // §4.7 "If all argument types are concrete, the body is analyzed
        // immediately"). `negotiate_function_body` is idempotent: it
        // no-ops once the body is no longer `Unprocessed`, so repeated
        // calls just reuse the already-negotiated template.
        if !self.functions[template].is_generic_template(&self.types.arena) {
            self.negotiate_function_body(template)?;
            return Ok((template, binding.arg_exprs));
        }

        let key = self.signature_key(&self.functions[template].name.clone(), &binding.concrete_param_types);
        if let Some(&cached) = self.function_groups[group_id].specializations.get(&key) {
            return Ok((cached, binding.arg_exprs));
        }

        let specialized = self.materialize_specialization(template, &binding, &key)?;
        self.negotiate_function_body(specialized)?;
        self.function_groups[group_id]
            .specializations
            .insert(key, specialized);
        Ok((specialized, binding.arg_exprs))
    }

    fn describe_template(&self, template: FunctionId) -> String {
        self.functions[template].name.to_string()
    }

    /// Whether every type in `a` is the same as, or a descendant of, the
    /// type at the same position in `b` (spec §4.5 "Group signature
    /// selection"). `a` dominates `b` when this holds for `a` against `b`
    /// but not for `b` against `a`.
    fn signature_at_least_as_specific(&self, a: &[TypeSpecId], b: &[TypeSpecId]) -> bool {
        a.iter()
            .zip(b)
            .all(|(&a_t, &b_t)| self.types.is_equal(a_t, b_t) || self.types.is_ancestor_of(b_t, a_t))
    }

    /// `BindArgument`/`BindDefaultValue` (spec §4.6): consumes positional
    /// and named arguments against one overload's parameter list,
    /// unifying any `{T}`-style local types along the way.
    fn bind_one(&mut self, template: FunctionId, args: &[FunctionCallArgument]) -> Result<FunctionBinding> {
        let parameters = self.functions[template].parameters.clone();

        let mut by_position: Vec<Option<ExprId>> = vec![None; parameters.len()];
        let mut named: FxHashMap<Name, ExprId> = FxHashMap::default();
        let mut next_positional = 0usize;
        for arg in args {
            match &arg.name {
                Some(name) => {
                    named.insert(name.clone(), arg.value);
                }
                None => {
                    if next_positional >= parameters.len() {
                        return Err(AnalysisError::new(
                            ErrorKind::Unimplemented,
                            "variable-length argument lists are not supported",
                        ));
                    }
                    by_position[next_positional] = Some(arg.value);
                    next_positional += 1;
                }
            }
        }

        let mut rebinder = LocalNamesRebinder::new();
        let mut resolved_exprs = Vec::with_capacity(parameters.len());
        let mut concrete_param_types = Vec::with_capacity(parameters.len());

        for (i, param) in parameters.iter().enumerate() {
            let expr = by_position[i]
                .or_else(|| named.get(&param.name).copied())
                .or(param.default_value)
                .ok_or_else(|| {
                    AnalysisError::new(
                        ErrorKind::InvalidArgument,
                        format!("missing argument for parameter `{}`", param.name),
                    )
                })?;

            let arg_type = self.expr_type(expr);
            // Function-typed parameters bound to a still-generic lambda are
            // the hard case from spec §4.6 step 1.c: the lambda's own
            // parameter/result types are independent local-type sites, not
            // occurrences of the *caller's* locals, so unifying them into
            // the outer rebinder (and checking raw convertibility against
            // them) would reject valid calls, e.g. scenario 3's
            // `g: Function<{T},{T}>` bound against an untyped `x => x+1`.
            // Instead, `concrete_param` is rebuilt from only the bindings
            // already captured from earlier positional parameters (spec's
            // `a: Array<{T}>` before `g`), and `specialize_lambda_argument`
            // does the lambda's own, independently-scoped unification.
            let arg_is_abstract_fn = self.types.get(param.type_spec).tag.is_function()
                && self.types.get(arg_type).is_abstract(&self.types.arena);
            let concrete_param = if arg_is_abstract_fn {
                rebinder.rebuild_type(&mut self.types, param.type_spec)?
            } else {
                self.unify_local_occurrences(&mut rebinder, param.type_spec, arg_type)?;
                let concrete_param = rebinder.rebuild_type(&mut self.types, param.type_spec)?;
                let ok = if param.skip_conversion {
                    self.types.is_equal(concrete_param, arg_type)
                } else {
                    self.types.is_convertible_from(concrete_param, arg_type)
                };
                if !ok {
                    return Err(AnalysisError::new(
                        ErrorKind::InvalidArgument,
                        format!("argument for `{}` has an incompatible type", param.name),
                    ));
                }
                concrete_param
            };

            resolved_exprs.push(self.specialize_lambda_argument(expr, concrete_param)?);
            concrete_param_types.push(concrete_param);
        }

        let result_type = match self.functions[template].result_type {
            Some(abstract_result) => Some(rebinder.rebuild_type(&mut self.types, abstract_result)?),
            None => None,
        };

        Ok(FunctionBinding {
            template,
            arg_exprs: resolved_exprs,
            concrete_param_types,
            result_type,
        })
    }

    /// Walks a (possibly local-typed) parameter type structurally against
    /// the argument's concrete type, recording every `{T}` occurrence
    /// encountered (spec §4.2/§4.6).
    fn unify_local_occurrences(
        &self,
        rebinder: &mut LocalNamesRebinder,
        param_type: TypeSpecId,
        arg_type: TypeSpecId,
    ) -> Result<()> {
        let param_spec = self.types.get(param_type).clone();
        if let Some(local) = &param_spec.local {
            return rebinder.record(&self.types, &local.name, local.site, arg_type);
        }
        let arg_spec = self.types.get(arg_type).clone();
        if param_spec.tag != arg_spec.tag {
            return Ok(());
        }
        for (p, a) in param_spec.parameters.iter().zip(arg_spec.parameters.iter()) {
            if let (crate::types::TypeParam::Type(p), crate::types::TypeParam::Type(a)) = (p, a) {
                self.unify_local_occurrences(rebinder, *p, *a)?;
            }
        }
        if let (Some(p), Some(a)) = (param_spec.result_type, arg_spec.result_type) {
            self.unify_local_occurrences(rebinder, p, a)?;
        }
        Ok(())
    }

    /// If `expr` is an as-yet-unbound lambda and `concrete_param` is a
    /// fully concrete function type, re-binds the lambda against it and
    /// returns the specialized expression instead of the original one,
    /// per the resolution documented on this module.
    fn specialize_lambda_argument(&mut self, expr: ExprId, concrete_param: TypeSpecId) -> Result<ExprId> {
        let ExprKind::Lambda(function) = self.exprs[expr].kind else {
            return Ok(expr);
        };
        if self.types.get(concrete_param).tag != crate::types::TypeTag::Function {
            return Ok(expr);
        }
        if !self.functions[function].is_generic_template(&self.types.arena) {
            // Already fully concrete (every parameter and the result type
            // declared): no rebinding needed, but the body is still
            // unanalyzed until some call site demands it (spec §4.7).
            self.negotiate_function_body(function)?;
            return Ok(expr);
        }
        // The lambda's own parameters are rebound structurally against the
        // destination function type's argument list.
        let dest = self.types.get(concrete_param).clone();
        let mut rebinder = LocalNamesRebinder::new();
        let param_types: Vec<TypeSpecId> = self.functions[function]
            .parameters
            .iter()
            .map(|p| p.type_spec)
            .collect();
        for (p, d) in param_types.iter().zip(dest.function_args()) {
            self.unify_local_occurrences(&mut rebinder, *p, d)?;
        }
        // The lambda's own result type (the local placeholder
        // `build_function_overload` gives every lambda, or an explicit
        // declaration) is unified against the hint's result too, so an
        // undeclared lambda result resolves to the destination's expected
        // return type (spec §4.4 "Lambda": "re-bound per the hint").
        if let (Some(p), Some(d)) = (self.functions[function].result_type, dest.result_type) {
            self.unify_local_occurrences(&mut rebinder, p, d)?;
        }
        let mut concrete_params = Vec::with_capacity(param_types.len());
        for p in &param_types {
            concrete_params.push(rebinder.rebuild_type(&mut self.types, *p)?);
        }
        let concrete_result = match self.functions[function].result_type {
            Some(r) => Some(rebinder.rebuild_type(&mut self.types, r)?),
            None => None,
        };

        let key = self.signature_key(&self.functions[function].name.clone(), &concrete_params);
        let specialized = self.materialize_function(function, concrete_params, concrete_result, &key)?;
        self.negotiate_function_body(specialized)?;
        self.build_expr(self.exprs[expr].context.clone(), ExprKind::Lambda(specialized))
    }

    /// Clones `template` into a new, fully concrete [`FunctionId`] with the
    /// given parameter/result types substituted, the "on-demand
    /// specialization" step of spec §4.5/§4.6. The body is carried over
    /// unprocessed; negotiating it against the concrete parameter types is
    /// the module driver's job once the specialization exists.
    fn materialize_specialization(
        &mut self,
        template: FunctionId,
        binding: &FunctionBinding,
        key: &str,
    ) -> Result<FunctionId> {
        if self.active_pragma_flags.log_bindings() {
            debug!(template = %self.functions[template].name, key, "synthesizing specialization");
        }
        self.materialize_function(template, binding.concrete_param_types.clone(), binding.result_type, key)
    }

    fn materialize_function(
        &mut self,
        template: FunctionId,
        concrete_param_types: Vec<TypeSpecId>,
        concrete_result: Option<TypeSpecId>,
        key: &str,
    ) -> Result<FunctionId> {
        let data: FunctionData = self.functions[template].clone();
        let group = data.group;
        let parent_scope = self.function_groups[group].parent_scope;
        let local_name = self.next_local_name(parent_scope, &format!("{}__spec", data.name));
        let scope_name = self.scopes[parent_scope].scope_name.extend_function(local_name);
        let fn_scope = self.add_sub_scope(parent_scope, scope_name, data.kind, false)?;

        let mut parameters = data.parameters.clone();
        for (param, &concrete) in parameters.iter_mut().zip(concrete_param_types.iter()) {
            // Each specialization gets its own `VarId`: the template's
            // parameter var is shared across every specialization derived
            // from it, so mutating it in place would corrupt sibling
            // specializations' parameter types.
            let fresh_var = self.vars.push(crate::vars::VarBase::new(
                param.name.clone(),
                crate::object::ObjectKind::Parameter,
                concrete,
                fn_scope,
            ));
            param.type_spec = concrete;
            param.var = fresh_var;
            self.define_name(fn_scope, param.name.clone(), crate::object::NamedObjectId::Var(fresh_var))?;
        }

        let id = self.functions.push(FunctionData {
            name: data.name,
            kind: data.kind,
            scope: fn_scope,
            group,
            type_params: Vec::new(),
            parameters,
            result_kind: data.result_kind,
            result_type: concrete_result,
            body: data.body,
            specialized_from: Some(template),
            signature_name: Some(key.to_string()),
        });
        if self.active_pragma_flags.log_bindings() {
            debug!(specialization = ?id, key, "specialization synthesized");
        }
        Ok(id)
    }
}

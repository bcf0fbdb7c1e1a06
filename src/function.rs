//! Functions, function groups, and overload selection (spec §3 "Functions
//! and function groups", §4.5). Grounded on `nudl/analysis/function.h`'s
//! `Function`/`FunctionGroup`, modeled here by composition (each holds a
//! [`ScopeId`]) rather than by the original's subclassing of `Scope`, per
//! the Design Notes' composition-over-inheritance guidance.

use rustc_hash::FxHashMap;

use crate::ast::FunctionResultKindAst;
use crate::error::{AnalysisError, ErrorKind, Result};
use crate::expr::ExprId;
use crate::index::newtype_index;
use crate::name::Name;
use crate::object::{NamedObjectId, ObjectKind};
use crate::scope::ScopeId;
use crate::types::TypeSpecId;
use crate::vars::VarId;
use crate::Env;

/// `__init__`, the reserved constructor method name every struct type gets
/// (spec §4.5 "Constructor synthesis").
pub const CONSTRUCTOR_NAME: &str = "__init__";
/// The synthesized all-fields constructor.
pub const STRUCT_OBJECT_CONSTRUCTOR: &str = "__init__";
/// The synthesized copy constructor, taking a single argument of the
/// struct's own type.
pub const STRUCT_COPY_CONSTRUCTOR: &str = "__init__copy__";
/// Pragma/attribute name that suppresses automatic argument conversion for
/// a parameter (SPEC_FULL §C).
pub const FUNCTION_SKIP_CONVERSION: &str = "skip_conversion";

newtype_index! {
    pub struct FunctionId;
}

newtype_index! {
    pub struct FunctionGroupId;
}

#[derive(Debug, Clone)]
pub struct ParameterSpec {
    pub name: Name,
    pub var: VarId,
    pub type_spec: TypeSpecId,
    pub default_value: Option<ExprId>,
    pub skip_conversion: bool,
}

#[derive(Debug, Clone)]
pub struct TypeParamSpec {
    pub name: Name,
    pub bound: Option<TypeSpecId>,
}

/// A function's body, either still an unprocessed AST block (before
/// negotiation) or a fully negotiated expression tree (spec §3).
#[derive(Debug, Clone)]
pub enum FunctionBody {
    Unprocessed(Vec<crate::ast::ExprAst>),
    Negotiated(Vec<ExprId>),
    /// `native python: ...` escape hatches (spec §6).
    Native(Vec<(String, String)>),
}

#[derive(Debug, Clone)]
pub struct FunctionData {
    pub name: Name,
    pub kind: ObjectKind,
    pub scope: ScopeId,
    pub group: FunctionGroupId,
    pub type_params: Vec<TypeParamSpec>,
    pub parameters: Vec<ParameterSpec>,
    pub result_kind: FunctionResultKindAst,
    pub result_type: Option<TypeSpecId>,
    pub body: FunctionBody,
    /// `None` for an unbound generic template; `Some` once every parameter
    /// and the result type are concrete (spec §4.5 "Specialization").
    pub specialized_from: Option<FunctionId>,
    pub signature_name: Option<String>,
}

impl FunctionData {
    /// True if calling this function can require binding a local (`{T}`)
    /// type occurrence to a concrete type: either an explicit `{T}`-bound
    /// signature parameter, or a parameter left without a type annotation
    /// (which `Env::build_function_overload` turns into an implicit local
    /// type, spec §4.5 scenario 2's `def f(a, b) => a + b`).
    pub fn is_generic_template(&self, types: &crate::types::TypeArena) -> bool {
        !self.type_params.is_empty()
            || self.parameters.iter().any(|p| types[p.type_spec].is_abstract(types))
            || self.result_type.map(|r| types[r].is_abstract(types)).unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct FunctionGroupData {
    pub name: Name,
    pub kind: ObjectKind,
    /// The scope this group lives in (the module, or a type's member
    /// store for method groups).
    pub parent_scope: ScopeId,
    /// Every declared overload template, in declaration order.
    pub functions: Vec<FunctionId>,
    /// Signature-string-keyed specializations, reused across call sites
    /// with the same concrete argument types (spec §8 "Specialization
    /// reuse").
    pub specializations: FxHashMap<String, FunctionId>,
    /// Failed binding attempts retained for diagnostics (SPEC_FULL §C,
    /// resolving spec §4.5's "errors ... are accumulated" without
    /// specifying retention).
    pub failed_instances: Vec<(String, AnalysisError)>,
}

impl Env {
    /// Adds (or reuses) a function group under `parent`, implementing the
    /// four group-addition rules from spec §4.5:
    /// 1. absent → create;
    /// 2. present as a matching-kind group → reuse;
    /// 3. present as something else → `AlreadyExists`;
    /// 4. method groups register onto the owning type's member store
    ///    rather than the lexical scope (handled by the caller passing
    ///    that store as `parent`).
    pub fn add_function_group(
        &mut self,
        parent: ScopeId,
        name: Name,
        kind: ObjectKind,
    ) -> Result<FunctionGroupId> {
        if let Some(&existing) = self.scopes[parent].defined_names.get(&name) {
            return match existing {
                NamedObjectId::FunctionGroup(id) if self.function_groups[id].kind == kind => Ok(id),
                _ => Err(AnalysisError::new(
                    ErrorKind::AlreadyExists,
                    format!("`{name}` is already defined and is not a compatible function group"),
                )),
            };
        }
        let id = self.function_groups.push(FunctionGroupData {
            name: name.clone(),
            kind,
            parent_scope: parent,
            functions: Vec::new(),
            specializations: FxHashMap::default(),
            failed_instances: Vec::new(),
        });
        self.define_name(parent, name, NamedObjectId::FunctionGroup(id))?;
        Ok(id)
    }

    /// Adds a new overload template to a group, under a freshly created
    /// function scope nested in the group's own scope (spec §4.5
    /// "Function addition").
    #[allow(clippy::too_many_arguments)]
    pub fn add_function(
        &mut self,
        group_id: FunctionGroupId,
        kind: ObjectKind,
        type_params: Vec<TypeParamSpec>,
        parameters: Vec<ParameterSpec>,
        result_kind: FunctionResultKindAst,
        result_type: Option<TypeSpecId>,
        body: FunctionBody,
    ) -> Result<FunctionId> {
        let group_name = self.function_groups[group_id].name.clone();

        // Spec §4.5 "Function group addition": reject a signature equal to
        // one already in the group, and a `MAIN_FUNCTION` can only join an
        // empty group (a module has exactly one `main`).
        let new_param_types: Vec<TypeSpecId> = parameters.iter().map(|p| p.type_spec).collect();
        for &existing in &self.function_groups[group_id].functions {
            let existing_types: Vec<TypeSpecId> =
                self.functions[existing].parameters.iter().map(|p| p.type_spec).collect();
            if existing_types.len() == new_param_types.len()
                && existing_types
                    .iter()
                    .zip(&new_param_types)
                    .all(|(&a, &b)| self.types.is_equal(a, b))
            {
                return Err(AnalysisError::new(
                    ErrorKind::AlreadyExists,
                    format!("`{group_name}` already has an overload with this signature"),
                ));
            }
        }
        if kind == ObjectKind::MainFunction && !self.function_groups[group_id].functions.is_empty() {
            return Err(AnalysisError::new(
                ErrorKind::InvalidArgument,
                "a module can declare only one `main` function",
            ));
        }

        let parent_scope = self.function_groups[group_id].parent_scope;
        let local_name = self.next_local_name(parent_scope, &format!("{group_name}__ovl"));
        let scope_name = self.scopes[parent_scope].scope_name.extend_function(local_name);
        let fn_scope = self.add_sub_scope(parent_scope, scope_name, kind, false)?;

        for p in &parameters {
            self.define_name(fn_scope, p.name.clone(), NamedObjectId::Var(p.var))?;
        }

        let id = self.functions.push(FunctionData {
            name: self.function_groups[group_id].name.clone(),
            kind,
            scope: fn_scope,
            group: group_id,
            type_params,
            parameters,
            result_kind,
            result_type,
            body,
            specialized_from: None,
            signature_name: None,
        });
        self.function_groups[group_id].functions.push(id);
        Ok(id)
    }

    /// Builds the cache key used for specialization reuse: the function's
    /// own name plus each concrete argument type's display form (spec §8
    /// "Specialization reuse" property: identical concrete argument
    /// types must hit the same cached specialization).
    pub fn signature_key(&self, base_name: &Name, arg_types: &[TypeSpecId]) -> String {
        let mut key = base_name.to_string();
        key.push('(');
        for (i, &t) in arg_types.iter().enumerate() {
            if i > 0 {
                key.push(',');
            }
            key.push_str(&self.describe_type(t));
        }
        key.push(')');
        key
    }

    fn describe_type(&self, id: TypeSpecId) -> String {
        let spec = self.types.get(id);
        if spec.parameters.is_empty() {
            return spec.name.to_string();
        }
        let mut out = spec.name.to_string();
        out.push('<');
        for (i, p) in spec.parameters.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            match p {
                crate::types::TypeParam::Type(t) => out.push_str(&self.describe_type(*t)),
                crate::types::TypeParam::Int(v) => out.push_str(&v.to_string()),
            }
        }
        out.push('>');
        out
    }

    /// The negotiated body of a function, once [`Env::negotiate_function_body`]
    /// has run; `None` for a still-unprocessed template or a native-backed
    /// function, which has no NuDL expression tree of its own.
    pub fn negotiated_body(&self, function: FunctionId) -> Option<&[ExprId]> {
        match &self.functions[function].body {
            FunctionBody::Negotiated(ids) => Some(ids),
            FunctionBody::Unprocessed(_) | FunctionBody::Native(_) => None,
        }
    }

    /// `FindFunctionByName` (SPEC_FULL §C): a thin wrapper over
    /// [`Env::find_name`] that requires the result to be a function group.
    pub fn find_function_by_name(
        &self,
        lookup_scope: &crate::name::ScopeName,
        scoped_name: &crate::name::ScopedName,
    ) -> Result<FunctionGroupId> {
        let object = self.find_name(lookup_scope, scoped_name)?;
        object.as_function_group().ok_or_else(|| {
            AnalysisError::new(
                ErrorKind::InvalidArgument,
                format!("`{scoped_name}` does not name a function"),
            )
        })
    }
}

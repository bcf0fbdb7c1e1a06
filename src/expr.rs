//! Expression nodes and type negotiation (spec §3 "Expressions", §4.4
//! "Expression type negotiation"). Grounded on `nudl/analysis/expression.h`
//! (referenced throughout `scope.h`'s `Build*` family; not itself
//! retrieved, but its node shapes are pinned down by every `Build*`
//! signature), encoded as a closed tagged-union `ExprKind` enum for the
//! expression-kind hierarchy.

use tracing::debug;

use crate::ast::FunctionResultKindAst;
use crate::error::{AnalysisError, CodeContext, ErrorKind, Result};
use crate::function::FunctionId;
use crate::index::newtype_index;
use crate::name::Name;
use crate::object::NamedObjectId;
use crate::types::{TypeParam, TypeSpec, TypeSpecId, TypeTag};
use crate::vars::VarId;
use crate::Env;

newtype_index! {
    pub struct ExprId;
}

#[derive(Debug, Clone)]
pub enum LiteralValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

/// A closed sum over negotiated expression kinds (spec §3 "Expressions").
/// Unlike [`crate::ast::ExprKindAst`], every reference here is resolved:
/// identifiers point at a [`NamedObjectId`], calls at the specific
/// [`FunctionId`] the binding engine selected.
#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(LiteralValue),
    Identifier(NamedObjectId),
    EmptyStruct,
    ArrayDef(Vec<ExprId>),
    MapDef(Vec<(ExprId, ExprId)>),
    TupleDef(Vec<(Option<Name>, ExprId)>),
    Index {
        object: ExprId,
        index: ExprId,
    },
    TupleIndex {
        object: ExprId,
        index: i64,
    },
    If {
        branches: Vec<(ExprId, Vec<ExprId>)>,
        else_branch: Option<Vec<ExprId>>,
    },
    Block(Vec<ExprId>),
    Lambda(FunctionId),
    DotAccess {
        object: ExprId,
        name: Name,
    },
    FunctionCall {
        function: FunctionId,
        args: Vec<ExprId>,
    },
    Assignment {
        var: VarId,
        value: ExprId,
    },
    FunctionResult {
        kind: FunctionResultKindAst,
        value: Option<ExprId>,
    },
    Nop,
}

#[derive(Debug, Clone)]
pub struct ExprNode {
    pub context: CodeContext,
    pub kind: ExprKind,
    pub type_spec: TypeSpecId,
}

pub type ExprArena = crate::index::Arena<ExprId, ExprNode>;

impl Env {
    /// Allocates an expression node, negotiating and caching its type with
    /// no expected-type hint (spec §4.4's `NegotiateType(hint)` with
    /// `hint = None`). Most expression kinds negotiate independent of
    /// context; see [`Env::build_expr_with_hint`] for the handful that
    /// don't.
    pub fn build_expr(&mut self, context: CodeContext, kind: ExprKind) -> Result<ExprId> {
        self.build_expr_with_hint(context, kind, None)
    }

    /// `NegotiateType(hint)` (spec §4.4): the hint is the expected type
    /// from the enclosing context (a declared variable's type, an array
    /// literal's running element-type candidate, …). Negotiation happens
    /// once, at construction, mirroring spec §8's "negotiated type is
    /// stable under repeated negotiation" property by never re-deriving it
    /// afterwards.
    pub fn build_expr_with_hint(
        &mut self,
        context: CodeContext,
        kind: ExprKind,
        hint: Option<TypeSpecId>,
    ) -> Result<ExprId> {
        let type_spec = self.negotiate_type(&kind, hint)?;
        Ok(self.exprs.push(ExprNode {
            context,
            kind,
            type_spec,
        }))
    }

    pub fn expr_type(&self, id: ExprId) -> TypeSpecId {
        self.exprs[id].type_spec
    }

    fn negotiate_type(&mut self, kind: &ExprKind, hint: Option<TypeSpecId>) -> Result<TypeSpecId> {
        let log = self.active_pragma_flags.log_bindings();
        if log {
            debug!(?hint, "entering NegotiateType");
        }
        let result = self.negotiate_type_inner(kind, hint);
        if log {
            debug!(?result, "leaving NegotiateType");
        }
        result
    }

    fn negotiate_type_inner(&mut self, kind: &ExprKind, hint: Option<TypeSpecId>) -> Result<TypeSpecId> {
        match kind {
            ExprKind::Literal(lit) => self.literal_type(lit, hint),
            ExprKind::Identifier(object) => self.object_type(*object),
            // Spec §4.4 "Empty struct `[]`": requires a hint; the hint
            // must be an `Iterable` subtype; the hint is returned as-is.
            ExprKind::EmptyStruct => {
                let hint = hint.ok_or_else(|| {
                    AnalysisError::new(ErrorKind::InvalidArgument, "`[]` requires a type hint to negotiate its type")
                })?;
                let tag = self.types.get(hint).tag;
                if tag.is_element_container() || tag == TypeTag::Map {
                    Ok(hint)
                } else {
                    Err(AnalysisError::new(
                        ErrorKind::InvalidArgument,
                        format!("`[]`'s hint `{}` is not an Iterable type", self.types.get(hint).name),
                    ))
                }
            }
            // Spec §4.4 "Array def": widens an element-type candidate
            // seeded from the hint's own element type (if any), then
            // binds `Set<E>` when the hint asks for a set rather than
            // defaulting to `Array<E>`.
            ExprKind::ArrayDef(elements) => {
                let hint_spec = hint.map(|h| self.types.get(h).clone());
                let seed = hint_spec.as_ref().and_then(|h| h.parameters.first().and_then(TypeParam::as_type));
                let elem = self.common_ancestor_of_exprs_seeded(elements, seed)?;
                let (tag, name) = match hint_spec.as_ref().map(|h| h.tag) {
                    Some(TypeTag::Set) => (TypeTag::Set, "Set"),
                    _ => (TypeTag::Array, "Array"),
                };
                Ok(self.types.alloc(TypeSpec::parametric(
                    tag,
                    name,
                    self.scopes[self.built_in_scope].scope_name.clone(),
                    vec![TypeParam::Type(elem)],
                )))
            }
            ExprKind::MapDef(entries) => {
                let hint_spec = hint.map(|h| self.types.get(h).clone());
                let key_seed = hint_spec.as_ref().and_then(|h| h.parameters.first().and_then(TypeParam::as_type));
                let value_seed = hint_spec.as_ref().and_then(|h| h.parameters.get(1).and_then(TypeParam::as_type));
                let keys: Vec<ExprId> = entries.iter().map(|(k, _)| *k).collect();
                let values: Vec<ExprId> = entries.iter().map(|(_, v)| *v).collect();
                let key_type = self.common_ancestor_of_exprs_seeded(&keys, key_seed)?;
                let value_type = self.common_ancestor_of_exprs_seeded(&values, value_seed)?;
                Ok(self.types.alloc(TypeSpec::parametric(
                    TypeTag::Map,
                    "Map",
                    self.scopes[self.built_in_scope].scope_name.clone(),
                    vec![TypeParam::Type(key_type), TypeParam::Type(value_type)],
                )))
            }
            ExprKind::TupleDef(fields) => {
                let params = fields
                    .iter()
                    .map(|(_, expr)| TypeParam::Type(self.expr_type(*expr)))
                    .collect();
                Ok(self.types.alloc(TypeSpec::parametric(
                    TypeTag::Tuple,
                    "Tuple",
                    self.scopes[self.built_in_scope].scope_name.clone(),
                    params,
                )))
            }
            ExprKind::Index { object, index } => self.negotiate_index(*object, *index),
            ExprKind::TupleIndex { object, index } => self.negotiate_tuple_index(*object, *index),
            ExprKind::If {
                branches,
                else_branch,
            } => self.negotiate_if(branches, else_branch.as_deref()),
            ExprKind::Block(exprs) => Ok(exprs
                .last()
                .map(|e| self.expr_type(*e))
                .unwrap_or(self.builtin_types.null)),
            ExprKind::Lambda(function) => self.function_type(*function),
            ExprKind::DotAccess { .. } => Err(AnalysisError::new(
                ErrorKind::Unimplemented,
                "dot-access must be rewritten into a method call or field read before negotiation",
            )),
            ExprKind::FunctionCall { function, .. } => self.call_result_type(*function),
            ExprKind::Assignment { value, .. } => Ok(self.expr_type(*value)),
            ExprKind::FunctionResult { .. } => Ok(self.builtin_types.null),
            ExprKind::Nop => Ok(self.builtin_types.unknown),
        }
    }

    /// Spec §4.4 "Literal": "returns the declared literal type, or the
    /// hint if the hint is an ancestor (or a convertible numeric), else
    /// error."
    fn literal_type(&self, literal: &LiteralValue, hint: Option<TypeSpecId>) -> Result<TypeSpecId> {
        let declared = match literal {
            LiteralValue::Null => self.builtin_types.null,
            LiteralValue::Bool(_) => self.builtin_types.bool_,
            LiteralValue::Int(_) => self.builtin_types.int,
            LiteralValue::Float(_) => self.builtin_types.float64,
            LiteralValue::Str(_) => self.builtin_types.string,
            LiteralValue::Bytes(_) => self.builtin_types.bytes,
        };
        match hint {
            None => Ok(declared),
            Some(h) if self.types.is_convertible_from(h, declared) => Ok(h),
            Some(h) => Err(AnalysisError::new(
                ErrorKind::InvalidArgument,
                format!(
                    "literal of type `{}` is not compatible with hint `{}`",
                    self.types.get(declared).name,
                    self.types.get(h).name
                ),
            )),
        }
    }

    fn object_type(&mut self, object: NamedObjectId) -> Result<TypeSpecId> {
        match object {
            NamedObjectId::Var(v) => Ok(self.vars[v].type_spec),
            NamedObjectId::Type(_) => Ok(self.builtin_types.any),
            NamedObjectId::Function(f) => self.function_type(f),
            NamedObjectId::FunctionGroup(_) => Err(AnalysisError::new(
                ErrorKind::InvalidArgument,
                "a function group has no value type until a call selects an overload",
            )),
            NamedObjectId::Scope(_) => Err(AnalysisError::new(
                ErrorKind::InvalidArgument,
                "a scope has no value type",
            )),
        }
    }

    fn function_type(&mut self, function: FunctionId) -> Result<TypeSpecId> {
        let data = &self.functions[function];
        let result = data
            .result_type
            .ok_or_else(|| AnalysisError::bug("function type requested before result type negotiated"))?;
        let arg_types = data.parameters.iter().map(|p| p.type_spec).collect();
        let name = data.name.clone();
        let scope_name = self.scopes[data.scope].scope_name.clone();
        Ok(self.types.alloc(TypeSpec::function(name, scope_name, arg_types, result)))
    }

    fn call_result_type(&mut self, function: FunctionId) -> Result<TypeSpecId> {
        let data = &self.functions[function];
        match data.result_kind {
            FunctionResultKindAst::Return => data
                .result_type
                .ok_or_else(|| AnalysisError::bug("return-kind function missing a result type")),
            FunctionResultKindAst::Pass | FunctionResultKindAst::None => Ok(self.builtin_types.null),
            FunctionResultKindAst::Yield => {
                let element = data
                    .result_type
                    .ok_or_else(|| AnalysisError::bug("yield-kind function missing an element type"))?;
                let scope_name = self.scopes[data.scope].scope_name.clone();
                Ok(self.types.alloc(TypeSpec::parametric(
                    TypeTag::Generator,
                    "Generator",
                    scope_name,
                    vec![TypeParam::Type(element)],
                )))
            }
        }
    }

    fn negotiate_index(&self, object: ExprId, index: ExprId) -> Result<TypeSpecId> {
        let object_type = self.expr_type(object);
        let spec = self.types.get(object_type);
        match spec.tag {
            TypeTag::Array | TypeTag::Set | TypeTag::Iterable | TypeTag::Container | TypeTag::Generator => spec
                .parameters
                .first()
                .and_then(TypeParam::as_type)
                .ok_or_else(|| AnalysisError::bug("element container missing its element parameter")),
            TypeTag::Map => spec
                .parameters
                .get(1)
                .and_then(TypeParam::as_type)
                .ok_or_else(|| AnalysisError::bug("map type missing its value parameter")),
            _ => {
                let _ = index;
                Err(AnalysisError::new(
                    ErrorKind::InvalidArgument,
                    format!("`{}` is not indexable", spec.name),
                ))
            }
        }
    }

    fn negotiate_tuple_index(&self, object: ExprId, index: i64) -> Result<TypeSpecId> {
        let object_type = self.expr_type(object);
        let spec = self.types.get(object_type);
        if spec.tag != TypeTag::Tuple {
            return Err(AnalysisError::new(
                ErrorKind::InvalidArgument,
                format!("`{}` is not a tuple", spec.name),
            ));
        }
        spec.parameters
            .get(index as usize)
            .and_then(TypeParam::as_type)
            .ok_or_else(|| {
                AnalysisError::new(ErrorKind::InvalidArgument, format!("tuple index {index} out of range"))
            })
    }

    /// Joins the branch (and optional `else`) result types to their common
    /// ancestor (spec §4.4 "If"). Without an `else`, control may fall
    /// through without producing a value, so the result is wrapped
    /// `Nullable`.
    fn negotiate_if(
        &mut self,
        branches: &[(ExprId, Vec<ExprId>)],
        else_branch: Option<&[ExprId]>,
    ) -> Result<TypeSpecId> {
        let mut branch_types = Vec::with_capacity(branches.len() + 1);
        for (_, body) in branches {
            let t = body
                .last()
                .map(|e| self.expr_type(*e))
                .unwrap_or(self.builtin_types.null);
            branch_types.push(t);
        }
        match else_branch {
            Some(body) => {
                let t = body
                    .last()
                    .map(|e| self.expr_type(*e))
                    .unwrap_or(self.builtin_types.null);
                branch_types.push(t);
                self.common_ancestor(&branch_types)
            }
            None => {
                let joined = self.common_ancestor(&branch_types)?;
                Ok(self.types.alloc(TypeSpec {
                    tag: TypeTag::Nullable,
                    name: Name::new("Nullable"),
                    scope_name: self.scopes[self.built_in_scope].scope_name.clone(),
                    result_type: Some(joined),
                    parameters: Vec::new(),
                    type_member_store: None,
                    local: None,
                }))
            }
        }
    }

    /// Spec §4.4 "Array def": "iteratively widens an element-type
    /// candidate by scanning children under the running candidate as a
    /// hint." `seed` is the container hint's own element type (if any),
    /// folded in as the starting candidate ahead of the children's own
    /// types so an empty or single-element literal still widens toward
    /// its declared element type.
    fn common_ancestor_of_exprs_seeded(&mut self, exprs: &[ExprId], seed: Option<TypeSpecId>) -> Result<TypeSpecId> {
        let mut types: Vec<TypeSpecId> = seed.into_iter().collect();
        types.extend(exprs.iter().map(|e| self.expr_type(*e)));
        self.common_ancestor(&types)
    }

    /// The smallest type in the `Ancestor` order covering every member of
    /// `types`, falling back to `Any` when no narrower bound exists (spec
    /// §4.4's container-literal "fixed-point widening").
    fn common_ancestor(&self, types: &[TypeSpecId]) -> Result<TypeSpecId> {
        let Some(&first) = types.first() else {
            return Ok(self.builtin_types.any);
        };
        let mut acc = first;
        for &candidate in &types[1..] {
            if self.types.is_ancestor_of(acc, candidate) {
                continue;
            }
            if self.types.is_ancestor_of(candidate, acc) {
                acc = candidate;
                continue;
            }
            // Neither covers the other: widen to `Any` rather than fail
            // the whole literal (spec §4.4 leaves mismatched-element
            // literals legal, just loosely typed).
            return Ok(self.builtin_types.any);
        }
        Ok(acc)
    }

    /// `named_object()` (spec §3 "Expressions"): the named-object an
    /// expression directly represents, when it has one. An identifier
    /// represents whatever it resolved to; a call or lambda represents the
    /// concrete function it was bound to; every other expression kind has
    /// no named-object of its own.
    pub fn named_object(&self, id: ExprId) -> Option<NamedObjectId> {
        match self.exprs[id].kind {
            ExprKind::Identifier(object) => Some(object),
            ExprKind::FunctionCall { function, .. } | ExprKind::Lambda(function) => {
                Some(NamedObjectId::Function(function))
            }
            ExprKind::Assignment { var, .. } => Some(NamedObjectId::Var(var)),
            _ => None,
        }
    }

    /// `DebugString()` (spec §3 "Expressions"): a compact, recursive
    /// rendering of an expression tree, used for diagnostics and the
    /// `dump_types` pragma rather than for any semantic purpose.
    pub fn debug_string(&self, id: ExprId) -> String {
        match &self.exprs[id].kind {
            ExprKind::Literal(lit) => format!("{lit:?}"),
            ExprKind::Identifier(object) => self.debug_name_of(object),
            ExprKind::EmptyStruct => "[]".to_string(),
            ExprKind::ArrayDef(items) => self.debug_list(items, "[", "]"),
            ExprKind::MapDef(entries) => {
                let parts: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", self.debug_string(*k), self.debug_string(*v)))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            ExprKind::TupleDef(fields) => {
                let parts: Vec<String> = fields
                    .iter()
                    .map(|(name, e)| match name {
                        Some(n) => format!("{n}={}", self.debug_string(*e)),
                        None => self.debug_string(*e),
                    })
                    .collect();
                format!("({})", parts.join(", "))
            }
            ExprKind::Index { object, index } => {
                format!("{}[{}]", self.debug_string(*object), self.debug_string(*index))
            }
            ExprKind::TupleIndex { object, index } => format!("{}.{index}", self.debug_string(*object)),
            ExprKind::If { branches, else_branch } => {
                let mut out = String::new();
                for (i, (cond, body)) in branches.iter().enumerate() {
                    let keyword = if i == 0 { "if" } else { "elif" };
                    out.push_str(&format!("{keyword} {} {{ {} }} ", self.debug_string(*cond), self.debug_list(body, "", "")));
                }
                if let Some(body) = else_branch {
                    out.push_str(&format!("else {{ {} }}", self.debug_list(body, "", "")));
                }
                out
            }
            ExprKind::Block(exprs) => self.debug_list(exprs, "{ ", " }"),
            ExprKind::Lambda(function) => format!("lambda<{}>", self.functions[*function].name),
            ExprKind::DotAccess { object, name } => format!("{}.{name}", self.debug_string(*object)),
            ExprKind::FunctionCall { function, args } => {
                format!("{}({})", self.functions[*function].name, self.debug_list(args, "", ""))
            }
            ExprKind::Assignment { var, value } => {
                format!("{} = {}", self.vars[*var].name, self.debug_string(*value))
            }
            ExprKind::FunctionResult { kind, value } => match value {
                Some(v) => format!("{kind:?} {}", self.debug_string(*v)),
                None => format!("{kind:?}"),
            },
            ExprKind::Nop => "nop".to_string(),
        }
    }

    /// Best-effort human-readable name for a resolved identifier, used only
    /// by [`Env::debug_string`].
    fn debug_name_of(&self, object: NamedObjectId) -> String {
        match object {
            NamedObjectId::Var(v) => self.vars[v].name.to_string(),
            NamedObjectId::Scope(s) => self.scopes[s].scope_name.to_string(),
            NamedObjectId::Function(f) => self.functions[f].name.to_string(),
            NamedObjectId::FunctionGroup(g) => self.function_groups[g].name.to_string(),
            NamedObjectId::Type(t) => self.types.get(t).name.to_string(),
        }
    }

    fn debug_list(&self, exprs: &[ExprId], open: &str, close: &str) -> String {
        let parts: Vec<String> = exprs.iter().map(|&e| self.debug_string(e)).collect();
        format!("{open}{}{close}", parts.join(", "))
    }

    /// `VisitExpressions(visitor)` (spec §3 "Expressions"): calls `visitor`
    /// on `id` and then recursively on every expression it directly owns,
    /// pre-order. Does not descend into a [`ExprKind::Lambda`]'s body: a
    /// lambda's negotiated body belongs to its own [`FunctionData`], not to
    /// the expression tree of whoever references the lambda.
    pub fn visit_expressions(&self, id: ExprId, visitor: &mut impl FnMut(ExprId)) {
        visitor(id);
        match &self.exprs[id].kind {
            ExprKind::ArrayDef(items) => items.iter().for_each(|&e| self.visit_expressions(e, visitor)),
            ExprKind::MapDef(entries) => entries.iter().for_each(|&(k, v)| {
                self.visit_expressions(k, visitor);
                self.visit_expressions(v, visitor);
            }),
            ExprKind::TupleDef(fields) => fields.iter().for_each(|&(_, e)| self.visit_expressions(e, visitor)),
            ExprKind::Index { object, index } => {
                self.visit_expressions(*object, visitor);
                self.visit_expressions(*index, visitor);
            }
            ExprKind::TupleIndex { object, .. } => self.visit_expressions(*object, visitor),
            ExprKind::If { branches, else_branch } => {
                for (cond, body) in branches {
                    self.visit_expressions(*cond, visitor);
                    body.iter().for_each(|&e| self.visit_expressions(e, visitor));
                }
                if let Some(body) = else_branch {
                    body.iter().for_each(|&e| self.visit_expressions(e, visitor));
                }
            }
            ExprKind::Block(exprs) => exprs.iter().for_each(|&e| self.visit_expressions(e, visitor)),
            ExprKind::DotAccess { object, .. } => self.visit_expressions(*object, visitor),
            ExprKind::FunctionCall { args, .. } => args.iter().for_each(|&e| self.visit_expressions(e, visitor)),
            ExprKind::Assignment { value, .. } => self.visit_expressions(*value, visitor),
            ExprKind::FunctionResult { value: Some(v), .. } => self.visit_expressions(*v, visitor),
            ExprKind::Literal(_)
            | ExprKind::Identifier(_)
            | ExprKind::EmptyStruct
            | ExprKind::Lambda(_)
            | ExprKind::FunctionResult { value: None, .. }
            | ExprKind::Nop => {}
        }
    }

    /// `Clone(override)` (spec §3 "Expressions"): re-allocates an
    /// expression node, optionally substituting its `kind` (e.g. rewriting
    /// a call's argument list after binding discovers a more specific
    /// specialization), re-negotiating the type rather than copying the
    /// cached one since an overridden kind may negotiate differently.
    pub fn clone_expr(&mut self, id: ExprId, override_kind: Option<ExprKind>) -> Result<ExprId> {
        let context = self.exprs[id].context.clone();
        let kind = override_kind.unwrap_or_else(|| self.exprs[id].kind.clone());
        self.build_expr(context, kind)
    }

    /// `ContainsFunctionExit` (spec §4.4): whether an expression list
    /// contains a reachable `return`/`yield`/`pass`, recursing into `if`
    /// and nested blocks but not into lambda bodies (a lambda's own exits
    /// belong to the lambda, not its enclosing function).
    pub fn contains_function_exit(&self, exprs: &[ExprId]) -> bool {
        exprs.iter().any(|&id| self.expr_contains_function_exit(id))
    }

    fn expr_contains_function_exit(&self, id: ExprId) -> bool {
        match &self.exprs[id].kind {
            ExprKind::FunctionResult { .. } => true,
            ExprKind::Block(body) => self.contains_function_exit(body),
            ExprKind::If {
                branches,
                else_branch,
            } => {
                branches.iter().any(|(_, body)| self.contains_function_exit(body))
                    || else_branch
                        .as_ref()
                        .map(|body| self.contains_function_exit(body))
                        .unwrap_or(false)
            }
            _ => false,
        }
    }
}

//! The type store (spec §4.3 "Type store / bind pipeline"). Grounded on
//! `nudl/analysis/type_store.h` (referenced by `scope.h`'s `FindType`
//! family; the header itself wasn't retrieved, but its contract is pinned
//! down by every caller in `scope.h`/`function.h`).
//!
//! `AddRegistrationCallback` in the original is an arbitrary callback fired
//! once a type is fully bound, used to lazily synthesize struct
//! constructors. A `Box<dyn FnMut>` would alias the arena it needs to
//! mutate, so this is modeled as a closed enum of the callback kinds the
//! analyzer actually needs instead (Design Notes §9 tagged-union guidance).

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::ast::{FieldAst, TemplateArgAst, TypeAst};
use crate::error::{AnalysisError, ErrorKind, Result};
use crate::name::{Name, ScopeName, ScopedName};
use crate::scope::ScopeId;
use crate::types::{LocalInfo, TypeParam, TypeSpec, TypeSpecId, TypeTag};
use crate::Env;

/// A deferred action to run once a type becomes fully bound.
#[derive(Debug, Clone)]
pub enum TypeRegistrationCallback {
    /// Emit `__init__`/copy constructors onto a struct's member store once
    /// its field types are all concrete (spec §4.5 "Constructor synthesis").
    SynthesizeStructConstructors {
        type_id: TypeSpecId,
        member_store: ScopeId,
        fields: Vec<(FieldAst, TypeSpecId)>,
    },
}

#[derive(Debug, Default)]
pub struct TypeStore {
    by_name: FxHashMap<(ScopeName, Name), TypeSpecId>,
    aliases: FxHashMap<(ScopeName, Name), (ScopeName, Name)>,
    pub callbacks: Vec<TypeRegistrationCallback>,
}

impl TypeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves a name directly against the flat type table, following at
    /// most one alias hop (spec §4.3 `AddAlias`).
    pub fn find_named(&self, scoped_name: &ScopedName) -> Option<TypeSpecId> {
        let key = (scoped_name.scope().clone(), scoped_name.name().clone());
        if let Some(&id) = self.by_name.get(&key) {
            return Some(id);
        }
        let aliased = self.aliases.get(&key)?;
        self.by_name.get(aliased).copied()
    }

    /// Every name declared directly in `scope_name`'s flat type table, for
    /// the `dump_types` pragma (SPEC_FULL §B "Logging").
    pub(crate) fn names_in_scope(&self, scope_name: &ScopeName) -> Vec<(Name, TypeSpecId)> {
        self.by_name
            .iter()
            .filter(|((s, _), _)| s == scope_name)
            .map(|((_, n), &id)| (n.clone(), id))
            .collect()
    }
}

impl Env {
    /// `DeclareType` (spec §4.3): registers a freshly-built type under its
    /// defining scope, rejecting a duplicate declaration, then fires any
    /// callback waiting on this exact type (`AddRegistrationCallback`,
    /// "invoke `fn` each time a type is added in that sub-store").
    pub fn declare_type(&mut self, scope_name: ScopeName, name: Name, id: TypeSpecId) -> Result<()> {
        let key = (scope_name.clone(), name.clone());
        if self.type_store.by_name.contains_key(&key) {
            return Err(AnalysisError::new(
                ErrorKind::AlreadyExists,
                format!("type `{name}` is already declared in scope `{scope_name}`"),
            ));
        }
        self.type_store.by_name.insert(key, id);
        self.run_registration_callbacks(id)
    }

    /// Invokes and drops every callback registered against `type_id` (spec
    /// §4.3 `AddRegistrationCallback`).
    fn run_registration_callbacks(&mut self, type_id: TypeSpecId) -> Result<()> {
        let mut due = Vec::new();
        self.type_store.callbacks.retain(|cb| {
            let TypeRegistrationCallback::SynthesizeStructConstructors { type_id: t, .. } = cb;
            if *t == type_id {
                due.push(cb.clone());
                false
            } else {
                true
            }
        });
        for cb in due {
            match cb {
                TypeRegistrationCallback::SynthesizeStructConstructors {
                    type_id,
                    member_store,
                    fields,
                } => {
                    if self.active_pragma_flags.log_bindings() {
                        debug!(?type_id, "registration callback: synthesizing struct constructors");
                    }
                    self.synthesize_struct_constructors(type_id, member_store, &fields)?;
                }
            }
        }
        Ok(())
    }

    /// `AddAlias` (spec §4.3): e.g. `type Celsius = Float64`.
    pub fn add_type_alias(
        &mut self,
        scope_name: ScopeName,
        alias: Name,
        target_scope: ScopeName,
        target_name: Name,
    ) -> Result<()> {
        let key = (scope_name.clone(), alias.clone());
        if self.type_store.by_name.contains_key(&key) || self.type_store.aliases.contains_key(&key) {
            return Err(AnalysisError::new(
                ErrorKind::AlreadyExists,
                format!("`{alias}` is already declared in scope `{scope_name}`"),
            ));
        }
        self.type_store.aliases.insert(key, (target_scope, target_name));
        Ok(())
    }

    pub fn add_type_registration_callback(&mut self, callback: TypeRegistrationCallback) {
        self.type_store.callbacks.push(callback);
    }

    /// `FindType(lookup_scope, TypeAst)` (spec §4.1/§4.3): resolves a
    /// type-AST node into a bound [`TypeSpecId`], recursively binding any
    /// template arguments, or introducing a fresh local-type-parameter site
    /// for `{T}`/`{T : Bound}` forms.
    pub fn find_type(&mut self, lookup_scope: ScopeId, ast: &TypeAst) -> Result<TypeSpecId> {
        match ast {
            TypeAst::Local { name, bound } => {
                let bound_id = match bound {
                    Some(b) => Some(self.find_type(lookup_scope, b)?),
                    None => None,
                };
                // Spec §3: two `{T}` occurrences with the same name at the
                // same originating site unify; this scratch map makes every
                // `{T}` written within one function signature (cleared by
                // `build_function_overload`) resolve to the same site.
                let site = match self.local_site_scratch.get(name) {
                    Some(&site) => site,
                    None => {
                        let site = self.types.next_local_site();
                        self.local_site_scratch.insert(name.clone(), site);
                        site
                    }
                };
                let spec = TypeSpec {
                    tag: TypeTag::Unknown,
                    name: name.clone(),
                    scope_name: self.scopes[lookup_scope].scope_name.clone(),
                    result_type: None,
                    parameters: Vec::new(),
                    type_member_store: None,
                    local: Some(LocalInfo {
                        name: name.clone(),
                        site,
                        bound: bound_id,
                    }),
                };
                Ok(self.types.alloc(spec))
            }
            TypeAst::Named {
                name,
                scope_prefix,
                template_args,
            } => {
                let scoped = ScopedName::new(ScopeName::module(scope_prefix.clone()), name.clone());
                let lookup_scope_name = self.scopes[lookup_scope].scope_name.clone();
                let base_id = self
                    .find_name(&lookup_scope_name, &scoped)?
                    .as_type()
                    .ok_or_else(|| {
                        AnalysisError::new(
                            ErrorKind::InvalidArgument,
                            format!("`{scoped}` does not name a type"),
                        )
                    })?;

                if template_args.is_empty() {
                    return Ok(base_id);
                }

                let mut bound_params = Vec::with_capacity(template_args.len());
                for arg in template_args {
                    bound_params.push(match arg {
                        TemplateArgAst::Type(t) => TypeParam::Type(self.find_type(lookup_scope, t)?),
                        TemplateArgAst::Int(v) => TypeParam::Int(*v),
                    });
                }

                match self.types.get(base_id).tag {
                    // `Nullable<T>` stores its inner type as `result_type`,
                    // not as a template parameter (spec §4.2's `Nullable`
                    // carries its inner type the same way `Function` carries
                    // its result).
                    TypeTag::Nullable => {
                        if bound_params.len() != 1 {
                            return Err(AnalysisError::new(
                                ErrorKind::InvalidArgument,
                                format!("`Nullable` expects 1 type argument, got {}", bound_params.len()),
                            ));
                        }
                        let inner = bound_params[0].as_type().ok_or_else(|| {
                            AnalysisError::new(ErrorKind::InvalidArgument, "`Nullable`'s argument must be a type")
                        })?;
                        let base_spec = self.types.get(base_id).clone();
                        Ok(self.types.alloc(TypeSpec {
                            result_type: Some(inner),
                            parameters: Vec::new(),
                            ..base_spec
                        }))
                    }
                    // `Function<A1,…,An,R>` (SPEC_FULL §C Open Question
                    // decision): the trailing template argument names the
                    // result type, the rest name the argument types, stored
                    // the same way `TypeSpec::function` lays out a concrete
                    // function's signature.
                    TypeTag::Function => {
                        if bound_params.is_empty() {
                            return Err(AnalysisError::new(
                                ErrorKind::InvalidArgument,
                                "`Function` expects at least a result type argument",
                            ));
                        }
                        let mut types = Vec::with_capacity(bound_params.len());
                        for p in &bound_params {
                            types.push(p.as_type().ok_or_else(|| {
                                AnalysisError::new(
                                    ErrorKind::InvalidArgument,
                                    "`Function`'s template arguments must all be types",
                                )
                            })?);
                        }
                        let result = types.pop().expect("checked non-empty above");
                        let base_spec = self.types.get(base_id).clone();
                        Ok(self.types.alloc(TypeSpec {
                            result_type: Some(result),
                            parameters: types.into_iter().map(TypeParam::Type).collect(),
                            ..base_spec
                        }))
                    }
                    // `Union<…>`/`Tuple<…>` are variable-arity: every
                    // template argument becomes a parameter slot, with no
                    // fixed arity to check against the base descriptor.
                    TypeTag::Union | TypeTag::Tuple => {
                        let base_spec = self.types.get(base_id).clone();
                        Ok(self.types.alloc(TypeSpec {
                            parameters: bound_params,
                            ..base_spec
                        }))
                    }
                    _ => self.bind_template(base_id, bound_params),
                }
            }
        }
    }

    /// Constructs `Nullable<T>` directly, without going through a name
    /// lookup. Used when result-type negotiation widens a `Null` branch
    /// against a non-null one (spec §4.4 "a `Null` result combined with a
    /// non-null type widens to `Nullable<T>`").
    pub fn wrap_nullable(&mut self, inner: TypeSpecId) -> TypeSpecId {
        let scope_name = self.scopes[self.built_in_scope].scope_name.clone();
        self.types.alloc(TypeSpec {
            tag: TypeTag::Nullable,
            name: Name::new("Nullable"),
            scope_name,
            result_type: Some(inner),
            parameters: Vec::new(),
            type_member_store: None,
            local: None,
        })
    }

    /// Instantiates a parametric type's template (e.g. `Array` + `[Int]` →
    /// `Array<Int>`) by cloning the base descriptor and substituting its
    /// parameter slots, enforcing the arity match (spec §4.3 `Bind`).
    fn bind_template(&mut self, base: TypeSpecId, args: Vec<TypeParam>) -> Result<TypeSpecId> {
        let base_spec = self.types.get(base).clone();
        if base_spec.parameters.len() != args.len() {
            return Err(AnalysisError::new(
                ErrorKind::InvalidArgument,
                format!(
                    "`{}` expects {} type argument(s), got {}",
                    base_spec.name,
                    base_spec.parameters.len(),
                    args.len()
                ),
            ));
        }
        let bound = TypeSpec {
            parameters: args,
            ..base_spec
        };
        Ok(self.types.alloc(bound))
    }
}

//! Semantic analysis for NuDL: name and scope resolution, the static type
//! system, expression type negotiation, and on-demand function
//! specialization.
//!
//! The crate is organized as a semantic-index-plus-type-checker: flat
//! arenas of owned data (scopes,
//! variables, functions, types, expressions) addressed by small `Copy`
//! indices, with one [`Env`] tying every arena together and carrying the
//! operations that cross arena boundaries (name lookup, binding,
//! negotiation). There is no incremental/query-caching layer (no
//! `salsa`): the Non-goals this crate implements explicitly exclude
//! hot-reload and concurrent analysis of a single module, so there is
//! nothing left for an incremental database to buy; see `DESIGN.md`.

mod ast;
mod binding;
mod error;
mod expr;
mod function;
mod index;
mod module;
mod name;
mod object;
mod operator;
mod pragma;
mod scope;
mod type_store;
pub mod types;
mod vars;

pub use ast::{
    AssignmentAst, CallArgAst, ExprAst, ExprKindAst, FieldAst, FunctionCallCalleeAst, FunctionDefAst,
    FunctionResultKindAst, ImportAst, LiteralAst, ModuleAst, ModuleElement, ModuleElementKind, Operator,
    ParameterAst, PragmaAst, SchemaAst, TemplateArgAst, TypeAst, TypeDefAst, TypeParamAst,
};
pub use binding::{FunctionBinding, FunctionCallArgument};
pub use error::{AnalysisError, CodeContext, CodeInterval, ErrorInfo, ErrorKind, Result, StatusBuilder};
pub use expr::{ExprId, ExprKind, LiteralValue};
pub use function::{FunctionData, FunctionGroupData, FunctionGroupId, FunctionId};
pub use module::{ModuleData, ModuleId, ModuleStore};
pub use name::{Name, ScopeName, ScopedName};
pub use object::{NamedObjectId, ObjectKind};
pub use pragma::{PragmaFlags, PragmaHandler};
pub use scope::{ScopeData, ScopeId};
pub use types::{TypeParam, TypeSpec, TypeSpecId, TypeSystem, TypeTag};
pub use vars::{VarBase, VarId};

use rustc_hash::FxHashMap;

use expr::ExprArena;
use function::ParameterSpec;
use index::Arena;
use type_store::TypeStore;

/// Handles every scalar built-in type's `TypeSpecId`, computed once by
/// [`Env::new`]. Exists so the rest of the crate can refer to "the `Int`
/// type" without re-resolving a name lookup at every call site.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinTypes {
    pub any: TypeSpecId,
    pub unknown: TypeSpecId,
    pub null: TypeSpecId,
    pub numeric: TypeSpecId,
    pub integral: TypeSpecId,
    pub int8: TypeSpecId,
    pub int16: TypeSpecId,
    pub int32: TypeSpecId,
    pub int: TypeSpecId,
    pub uint8: TypeSpecId,
    pub uint16: TypeSpecId,
    pub uint32: TypeSpecId,
    pub uint: TypeSpecId,
    pub float32: TypeSpecId,
    pub float64: TypeSpecId,
    pub bool_: TypeSpecId,
    pub string: TypeSpecId,
    pub bytes: TypeSpecId,
    pub date: TypeSpecId,
    pub datetime: TypeSpecId,
    pub time_interval: TypeSpecId,
    pub timestamp: TypeSpecId,
    pub decimal: TypeSpecId,
    pub type_: TypeSpecId,
    pub module: TypeSpecId,
}

impl BuiltinTypes {
    fn placeholder() -> Self {
        let z = TypeSpecId::from_u32(0);
        Self {
            any: z,
            unknown: z,
            null: z,
            numeric: z,
            integral: z,
            int8: z,
            int16: z,
            int32: z,
            int: z,
            uint8: z,
            uint16: z,
            uint32: z,
            uint: z,
            float32: z,
            float64: z,
            bool_: z,
            string: z,
            bytes: z,
            date: z,
            datetime: z,
            time_interval: z,
            timestamp: z,
            decimal: z,
            type_: z,
            module: z,
        }
    }
}

/// Owns every arena in the analyzer and is the receiver for every
/// cross-cutting operation (name resolution, binding, negotiation, module
/// processing). One `Env` corresponds to one analysis run over a set of
/// modules that import each other.
pub struct Env {
    pub(crate) scopes: Arena<ScopeId, ScopeData>,
    pub(crate) vars: Arena<VarId, VarBase>,
    pub(crate) functions: Arena<FunctionId, FunctionData>,
    pub(crate) function_groups: Arena<FunctionGroupId, FunctionGroupData>,
    pub(crate) types: TypeSystem,
    pub(crate) exprs: ExprArena,
    pub(crate) type_store: TypeStore,
    pub(crate) modules: Arena<ModuleId, ModuleData>,
    pub(crate) scope_by_name: FxHashMap<ScopeName, ScopeId>,
    pub(crate) built_in_scope: ScopeId,
    pub(crate) builtin_types: BuiltinTypes,
    /// Scratch map from local-type-parameter name to the [`types::LocalSite`]
    /// it was first assigned while resolving the type expressions of *one*
    /// function signature (spec §3 "Local type parameters": "the same name
    /// in two slots... distinct sites are independent"). `{T}` written
    /// twice in one signature (e.g. `a: Array<{T}>, g: Function<{T},{T}>`)
    /// must name the same site; `{T}` written in two unrelated signatures
    /// must not. [`Env::build_function_overload`] clears this before
    /// resolving each signature's type expressions; see DESIGN.md.
    pub(crate) local_site_scratch: FxHashMap<Name, crate::types::LocalSite>,
    /// The `pragma`-controlled flags of whichever module is currently being
    /// processed, consulted by [`expr::Env::build_expr_with_hint`] and
    /// [`binding::Env::resolve_call`]'s tracing to scope verbose spans to
    /// just the module that asked for them. [`module::Env::process_module`]
    /// saves and restores this around its own run so that a `ModuleStore`
    /// recursing back into `process_module` for an import doesn't leak one
    /// module's flags into another's.
    pub(crate) active_pragma_flags: PragmaFlags,
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

impl Env {
    pub fn new() -> Self {
        let mut env = Self {
            scopes: Arena::new(),
            vars: Arena::new(),
            functions: Arena::new(),
            function_groups: Arena::new(),
            types: TypeSystem::new(),
            exprs: Arena::new(),
            type_store: TypeStore::new(),
            modules: Arena::new(),
            scope_by_name: FxHashMap::default(),
            built_in_scope: ScopeId::from_u32(0),
            builtin_types: BuiltinTypes::placeholder(),
            local_site_scratch: FxHashMap::default(),
            active_pragma_flags: PragmaFlags::default(),
        };
        let root = env.new_root_scope();
        env.built_in_scope = root;
        env.scopes[root].built_in_scope = Some(root);
        env.builtin_types = env
            .bootstrap_builtin_types()
            .expect("built-in type bootstrap cannot fail");
        env
    }

    pub fn built_in_scope(&self) -> ScopeId {
        self.built_in_scope
    }

    pub fn builtin_types(&self) -> BuiltinTypes {
        self.builtin_types
    }

    pub fn types(&self) -> &TypeSystem {
        &self.types
    }

    pub fn expr_node(&self, id: ExprId) -> &expr::ExprNode {
        &self.exprs[id]
    }

    pub fn function(&self, id: FunctionId) -> &FunctionData {
        &self.functions[id]
    }

    pub fn function_group(&self, id: FunctionGroupId) -> &FunctionGroupData {
        &self.function_groups[id]
    }

    pub fn var(&self, id: VarId) -> &VarBase {
        &self.vars[id]
    }

    pub fn scope(&self, id: ScopeId) -> &ScopeData {
        &self.scopes[id]
    }

    pub fn module(&self, id: ModuleId) -> &ModuleData {
        &self.modules[id]
    }

    /// Registers every scalar built-in type and, for the numeric/boolean
    /// scalars that support operators, a member store carrying the
    /// `__add__`-style dunder methods `build_method_call` dispatches to
    /// (SPEC_FULL §C).
    fn bootstrap_builtin_types(&mut self) -> Result<BuiltinTypes> {
        let unknown = self.define_plain_scalar(TypeTag::Unknown, "Unknown")?;
        let any = self.define_plain_scalar(TypeTag::Any, "Any")?;
        let null = self.define_plain_scalar(TypeTag::Null, "Null")?;
        let numeric = self.define_plain_scalar(TypeTag::Numeric, "Numeric")?;
        let integral = self.define_plain_scalar(TypeTag::Integral, "Integral")?;
        let type_ = self.define_plain_scalar(TypeTag::Type, "Type")?;
        let module = self.define_plain_scalar(TypeTag::Module, "Module")?;
        let date = self.define_plain_scalar(TypeTag::Date, "Date")?;
        let datetime = self.define_plain_scalar(TypeTag::Datetime, "Datetime")?;
        let time_interval = self.define_plain_scalar(TypeTag::TimeInterval, "TimeInterval")?;
        let timestamp = self.define_plain_scalar(TypeTag::Timestamp, "Timestamp")?;
        let decimal = self.define_decimal_scalar()?;

        let (int8, _) = self.define_numeric_scalar(TypeTag::Int8, "Int8")?;
        let (int16, _) = self.define_numeric_scalar(TypeTag::Int16, "Int16")?;
        let (int32, _) = self.define_numeric_scalar(TypeTag::Int32, "Int32")?;
        let (int, int_store) = self.define_numeric_scalar(TypeTag::Int, "Int")?;
        let (uint8, _) = self.define_numeric_scalar(TypeTag::UInt8, "UInt8")?;
        let (uint16, _) = self.define_numeric_scalar(TypeTag::UInt16, "UInt16")?;
        let (uint32, _) = self.define_numeric_scalar(TypeTag::UInt32, "UInt32")?;
        let (uint, _) = self.define_numeric_scalar(TypeTag::UInt, "UInt")?;
        let (float32, _) = self.define_numeric_scalar(TypeTag::Float32, "Float32")?;
        let (float64, float64_store) = self.define_numeric_scalar(TypeTag::Float64, "Float64")?;

        let bool_ = self.define_plain_scalar(TypeTag::Bool, "Bool")?;
        let (string, string_store) = self.define_store_backed_scalar(TypeTag::String, "String")?;
        let bytes = self.define_plain_scalar(TypeTag::Bytes, "Bytes")?;

        self.register_comparisons(int_store, int)?;
        self.register_comparisons(float64_store, float64)?;
        self.register_arithmetic(int, int_store, int)?;
        self.register_arithmetic(float64, float64_store, float64)?;
        self.register_equality(string_store, string)?;
        self.register_binary_method(string_store, "__add__", string, string, string)?;

        // Parametric type constructors (spec §3 "Type descriptors", §6
        // "Type-AST grammar"): registered as named types so `Array<Int>`,
        // `Function<{T},{T}>`, `Nullable<Int>`, etc. resolve through
        // `FindType` the same way a scalar name does (SPEC_FULL §C).
        self.define_parametric_builtin(TypeTag::Iterable, "Iterable", 1, false)?;
        self.define_parametric_builtin(TypeTag::Container, "Container", 1, false)?;
        let (array, array_store) = self.define_parametric_builtin(TypeTag::Array, "Array", 1, true)?;
        self.define_parametric_builtin(TypeTag::Set, "Set", 1, false)?;
        self.define_parametric_builtin(TypeTag::Map, "Map", 2, false)?;
        self.define_parametric_builtin(TypeTag::Generator, "Generator", 1, false)?;
        // These four are variable-arity and resolved specially in
        // `Env::find_type`; their own `parameters`/`result_type` here are
        // never consulted for arity, only cloned as a template.
        self.define_parametric_builtin(TypeTag::Nullable, "Nullable", 0, false)?;
        self.define_parametric_builtin(TypeTag::Union, "Union", 0, false)?;
        self.define_parametric_builtin(TypeTag::Tuple, "Tuple", 0, false)?;
        self.define_parametric_builtin(TypeTag::Function, "Function", 0, false)?;

        self.register_array_map(array, array_store.expect("Array is store-backed"))?;

        Ok(BuiltinTypes {
            any,
            unknown,
            null,
            numeric,
            integral,
            int8,
            int16,
            int32,
            int,
            uint8,
            uint16,
            uint32,
            uint,
            float32,
            float64,
            bool_,
            string,
            bytes,
            date,
            datetime,
            time_interval,
            timestamp,
            decimal,
            type_,
            module,
        })
    }

    fn define_plain_scalar(&mut self, tag: TypeTag, name: &str) -> Result<TypeSpecId> {
        let scope_name = self.scopes[self.built_in_scope].scope_name.clone();
        let id = self.types.alloc(TypeSpec::scalar(tag, name, scope_name.clone()));
        self.declare_type(scope_name, Name::new(name), id)?;
        self.define_name(self.built_in_scope, Name::new(name), NamedObjectId::Type(id))?;
        Ok(id)
    }

    fn define_store_backed_scalar(&mut self, tag: TypeTag, name: &str) -> Result<(TypeSpecId, ScopeId)> {
        let scope_name = self.scopes[self.built_in_scope].scope_name.clone();
        let store = self.add_sub_scope(
            self.built_in_scope,
            scope_name.extend_module(name),
            ObjectKind::TypeMemberStore,
            false,
        )?;
        let id = self.types.alloc(TypeSpec {
            tag,
            name: Name::new(name),
            scope_name: scope_name.clone(),
            result_type: None,
            parameters: Vec::new(),
            type_member_store: Some(store),
            local: None,
        });
        self.declare_type(scope_name, Name::new(name), id)?;
        self.define_name(self.built_in_scope, Name::new(name), NamedObjectId::Type(id))?;
        Ok((id, store))
    }

    fn define_numeric_scalar(&mut self, tag: TypeTag, name: &str) -> Result<(TypeSpecId, ScopeId)> {
        self.define_store_backed_scalar(tag, name)
    }

    /// `Decimal<precision, scale>` (spec §6 grammar example): two integer
    /// template slots rather than the usual type slots.
    fn define_decimal_scalar(&mut self) -> Result<TypeSpecId> {
        let scope_name = self.scopes[self.built_in_scope].scope_name.clone();
        let id = self.types.alloc(TypeSpec {
            tag: TypeTag::Decimal,
            name: Name::new("Decimal"),
            scope_name: scope_name.clone(),
            result_type: None,
            parameters: vec![TypeParam::Int(0), TypeParam::Int(0)],
            type_member_store: None,
            local: None,
        });
        self.declare_type(scope_name, Name::new("Decimal"), id)?;
        self.define_name(self.built_in_scope, Name::new("Decimal"), NamedObjectId::Type(id))?;
        Ok(id)
    }

    /// Registers a parametric type constructor (`Array`, `Map`, `Function`,
    /// …) as a named built-in type, so type annotations can resolve it
    /// through `FindType`/`Bind` (spec §4.3). `arity` fixes the number of
    /// type-valued template slots for constructors bound generically by
    /// [`Env::bind_template`]; it is ignored for the variable-arity tags
    /// special-cased directly in [`Env::find_type`] (`Nullable`, `Union`,
    /// `Tuple`, `Function`).
    fn define_parametric_builtin(
        &mut self,
        tag: TypeTag,
        name: &str,
        arity: usize,
        needs_member_store: bool,
    ) -> Result<(TypeSpecId, Option<ScopeId>)> {
        let scope_name = self.scopes[self.built_in_scope].scope_name.clone();
        let store = if needs_member_store {
            Some(self.add_sub_scope(
                self.built_in_scope,
                scope_name.extend_module(name),
                ObjectKind::TypeMemberStore,
                false,
            )?)
        } else {
            None
        };
        let placeholder = self.builtin_types_during_bootstrap_unknown();
        let id = self.types.alloc(TypeSpec {
            tag,
            name: Name::new(name),
            scope_name: scope_name.clone(),
            result_type: None,
            parameters: vec![TypeParam::Type(placeholder); arity],
            type_member_store: store,
            local: None,
        });
        self.declare_type(scope_name, Name::new(name), id)?;
        self.define_name(self.built_in_scope, Name::new(name), NamedObjectId::Type(id))?;
        Ok((id, store))
    }

    /// `Unknown` is the first built-in declared, so later bootstrap steps
    /// can look it up by name as a placeholder parameter value the same
    /// way [`Env::builtin_types_during_bootstrap_bool`] looks up `Bool`.
    fn builtin_types_during_bootstrap_unknown(&self) -> TypeSpecId {
        self.scopes[self.built_in_scope]
            .defined_names
            .get(&Name::new("Unknown"))
            .and_then(|o| o.as_type())
            .expect("Unknown is the first type declared during bootstrap")
    }

    /// `Array<{T}>.map(g: Function<{T},{U}>) -> Array<{U}>` (spec §8
    /// scenario 3): the one illustrative generic container method this
    /// engine bootstraps, demonstrating a generic method resolved against a
    /// generic receiver plus a function-typed argument end to end. This is
    /// a semantic-analysis engine, not a standard library, so no other
    /// container methods are registered (SPEC_FULL §D non-goal).
    fn register_array_map(&mut self, array: TypeSpecId, store: ScopeId) -> Result<()> {
        let array_scope_name = self.scopes[store].scope_name.clone();
        let site_t = self.types.next_local_site();
        let elem_t = self.types.alloc(TypeSpec {
            tag: TypeTag::Unknown,
            name: Name::new("T"),
            scope_name: array_scope_name.clone(),
            result_type: None,
            parameters: Vec::new(),
            type_member_store: None,
            local: Some(crate::types::LocalInfo {
                name: Name::new("T"),
                site: site_t,
                bound: None,
            }),
        });
        let site_u = self.types.next_local_site();
        let elem_u = self.types.alloc(TypeSpec {
            tag: TypeTag::Unknown,
            name: Name::new("U"),
            scope_name: array_scope_name.clone(),
            result_type: None,
            parameters: Vec::new(),
            type_member_store: None,
            local: Some(crate::types::LocalInfo {
                name: Name::new("U"),
                site: site_u,
                bound: None,
            }),
        });
        let array_base = self.types.get(array).clone();
        let self_param_type = self.types.alloc(TypeSpec {
            parameters: vec![TypeParam::Type(elem_t)],
            ..array_base
        });
        let func_param_type =
            self.types.alloc(TypeSpec::function("__map_fn", array_scope_name.clone(), vec![elem_t], elem_u));
        let result_type = self.types.alloc(TypeSpec::parametric(
            TypeTag::Array,
            "Array",
            array_scope_name,
            vec![TypeParam::Type(elem_u)],
        ));

        let group = self.add_function_group(store, Name::new("map"), ObjectKind::MethodGroup)?;
        let self_var = self.vars.push(VarBase::new(Name::new("self"), ObjectKind::Parameter, self_param_type, store));
        let g_var = self.vars.push(VarBase::new(Name::new("g"), ObjectKind::Parameter, func_param_type, store));
        self.add_function(
            group,
            ObjectKind::Method,
            Vec::new(),
            vec![
                ParameterSpec {
                    name: Name::new("self"),
                    var: self_var,
                    type_spec: self_param_type,
                    default_value: None,
                    skip_conversion: false,
                },
                ParameterSpec {
                    name: Name::new("g"),
                    var: g_var,
                    type_spec: func_param_type,
                    default_value: None,
                    skip_conversion: false,
                },
            ],
            FunctionResultKindAst::Return,
            Some(result_type),
            function::FunctionBody::Native(Vec::new()),
        )?;
        Ok(())
    }

    /// Registers a two-operand operator method (`self.__add__(other)` etc).
    /// `build_method_call` always binds the receiver as the call's first
    /// argument, so the signature carries an explicit `self` parameter of
    /// type `owner` ahead of `other`, the same way [`Env::register_array_map`]
    /// declares its own `self` parameter.
    fn register_binary_method(
        &mut self,
        store: ScopeId,
        name: &str,
        owner: TypeSpecId,
        param_type: TypeSpecId,
        result_type: TypeSpecId,
    ) -> Result<()> {
        let group = self.add_function_group(store, Name::new(name), ObjectKind::MethodGroup)?;
        let self_var = self.vars.push(VarBase::new(Name::new("self"), ObjectKind::Parameter, owner, store));
        let other_var = self.vars.push(VarBase::new(Name::new("other"), ObjectKind::Parameter, param_type, store));
        self.add_function(
            group,
            ObjectKind::Method,
            Vec::new(),
            vec![
                ParameterSpec {
                    name: Name::new("self"),
                    var: self_var,
                    type_spec: owner,
                    default_value: None,
                    skip_conversion: false,
                },
                ParameterSpec {
                    name: Name::new("other"),
                    var: other_var,
                    type_spec: param_type,
                    default_value: None,
                    skip_conversion: false,
                },
            ],
            FunctionResultKindAst::Return,
            Some(result_type),
            function::FunctionBody::Native(Vec::new()),
        )?;
        Ok(())
    }

    /// Registers a one-operand operator method (`self.__neg__()` etc), with
    /// an explicit `self` parameter for the same reason as
    /// [`Env::register_binary_method`].
    fn register_unary_method(&mut self, store: ScopeId, name: &str, owner: TypeSpecId, result_type: TypeSpecId) -> Result<()> {
        let group = self.add_function_group(store, Name::new(name), ObjectKind::MethodGroup)?;
        let self_var = self.vars.push(VarBase::new(Name::new("self"), ObjectKind::Parameter, owner, store));
        self.add_function(
            group,
            ObjectKind::Method,
            Vec::new(),
            vec![ParameterSpec {
                name: Name::new("self"),
                var: self_var,
                type_spec: owner,
                default_value: None,
                skip_conversion: false,
            }],
            FunctionResultKindAst::Return,
            Some(result_type),
            function::FunctionBody::Native(Vec::new()),
        )?;
        Ok(())
    }

    fn register_arithmetic(&mut self, owner: TypeSpecId, store: ScopeId, operand: TypeSpecId) -> Result<()> {
        for name in ["__add__", "__sub__", "__mul__", "__div__", "__mod__"] {
            self.register_binary_method(store, name, owner, operand, owner)?;
        }
        self.register_unary_method(store, "__neg__", owner, owner)?;
        self.register_unary_method(store, "__pos__", owner, owner)?;
        Ok(())
    }

    fn register_comparisons(&mut self, store: ScopeId, operand: TypeSpecId) -> Result<()> {
        let bool_ = self.builtin_types_during_bootstrap_bool();
        for name in ["__lt__", "__gt__", "__le__", "__ge__", "__eq__", "__ne__"] {
            self.register_binary_method(store, name, operand, operand, bool_)?;
        }
        Ok(())
    }

    fn register_equality(&mut self, store: ScopeId, operand: TypeSpecId) -> Result<()> {
        let bool_ = self.builtin_types_during_bootstrap_bool();
        self.register_binary_method(store, "__eq__", operand, operand, bool_)?;
        self.register_binary_method(store, "__ne__", operand, operand, bool_)?;
        Ok(())
    }

    /// `Bool` is declared before the comparison operators that return it,
    /// so bootstrap looks it up by name instead of through
    /// [`Env::builtin_types`] (not yet populated at this point).
    fn builtin_types_during_bootstrap_bool(&self) -> TypeSpecId {
        self.scopes[self.built_in_scope]
            .defined_names
            .get(&Name::new("Bool"))
            .and_then(|o| o.as_type())
            .expect("Bool is declared before any comparison operator")
    }
}

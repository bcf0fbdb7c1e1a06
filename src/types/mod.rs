//! The type system (spec §3 "Type descriptors", §4.2). Grounded on
//! `nudl/analysis/type_spec.h` (not itself retrieved into
//! `original_source/`, but its shape is pinned down precisely by
//! `scope.h`/`function.h`'s use of `const TypeSpec*`), encoded as a closed
//! `TypeTag` enum with `strum`'s derive macros for the fixed vocabulary of
//! type constructors.

mod rebind;

pub use rebind::LocalNamesRebinder;

use strum_macros::EnumIs;

use crate::index::newtype_index;
use crate::name::{Name, ScopeName};
use crate::scope::ScopeId;

newtype_index! {
    pub struct TypeSpecId;
}

/// The closed enumeration backing `TypeSpec::type_id` (spec §3).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIs)]
pub enum TypeTag {
    Unknown,
    Any,
    Null,
    Numeric,
    Int,
    Int8,
    Int16,
    Int32,
    UInt,
    UInt8,
    UInt16,
    UInt32,
    String,
    Bytes,
    Bool,
    Float32,
    Float64,
    Date,
    Datetime,
    TimeInterval,
    Timestamp,
    Decimal,
    Iterable,
    Array,
    Tuple,
    Set,
    Map,
    Struct,
    Function,
    Union,
    Nullable,
    Dataset,
    Type,
    Module,
    Integral,
    Container,
    Generator,
}

impl TypeTag {
    pub fn is_signed_integer(self) -> bool {
        matches!(self, TypeTag::Int8 | TypeTag::Int16 | TypeTag::Int32 | TypeTag::Int)
    }

    pub fn is_unsigned_integer(self) -> bool {
        matches!(
            self,
            TypeTag::UInt8 | TypeTag::UInt16 | TypeTag::UInt32 | TypeTag::UInt
        )
    }

    pub fn is_integral_concrete(self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer()
    }

    pub fn is_float(self) -> bool {
        matches!(self, TypeTag::Float32 | TypeTag::Float64)
    }

    pub fn is_concrete_numeric(self) -> bool {
        self.is_integral_concrete() || self.is_float()
    }

    /// Containers whose single parameter is an element type (spec §4.2
    /// `Iterable`/`Container`).
    pub fn is_element_container(self) -> bool {
        matches!(
            self,
            TypeTag::Array | TypeTag::Set | TypeTag::Iterable | TypeTag::Container | TypeTag::Generator
        )
    }

    /// Nominal type constructors compared by identity (name + scope) rather
    /// than structurally.
    pub fn is_nominal(self) -> bool {
        matches!(self, TypeTag::Struct | TypeTag::Type | TypeTag::Module)
    }

    fn signed_rank(self) -> Option<u8> {
        match self {
            TypeTag::Int8 => Some(0),
            TypeTag::Int16 => Some(1),
            TypeTag::Int32 => Some(2),
            TypeTag::Int => Some(3),
            _ => None,
        }
    }

    fn unsigned_rank(self) -> Option<u8> {
        match self {
            TypeTag::UInt8 => Some(0),
            TypeTag::UInt16 => Some(1),
            TypeTag::UInt32 => Some(2),
            TypeTag::UInt => Some(3),
            _ => None,
        }
    }

    fn float_rank(self) -> Option<u8> {
        match self {
            TypeTag::Float32 => Some(0),
            TypeTag::Float64 => Some(1),
            _ => None,
        }
    }
}

/// A template parameter slot: either another type, or (for types like
/// `Decimal<10,2>`) an integer literal (spec §3, §6 "Type-AST grammar").
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum TypeParam {
    Type(TypeSpecId),
    Int(i64),
}

impl TypeParam {
    pub fn as_type(&self) -> Option<TypeSpecId> {
        match self {
            TypeParam::Type(id) => Some(*id),
            TypeParam::Int(_) => None,
        }
    }
}

/// Marks a type descriptor as a named local type variable introduced at a
/// function-signature site (spec §3 "Local type parameters", written
/// `{T}`/`{T : Bound}`). `site` distinguishes `{T}` introduced by two
/// different function signatures: same name, same site unify; different
/// sites are independent, per spec §3.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct LocalSite(pub u32);

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct LocalInfo {
    pub name: Name,
    pub site: LocalSite,
    /// The optional `{T : Bound}` upper bound; `None` means the bound is
    /// implicitly `Any`.
    pub bound: Option<TypeSpecId>,
}

/// A type descriptor (spec §3 "Type descriptors (`TypeSpec`)").
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct TypeSpec {
    pub tag: TypeTag,
    pub name: Name,
    pub scope_name: ScopeName,
    pub result_type: Option<TypeSpecId>,
    pub parameters: Vec<TypeParam>,
    /// Name-store holding methods whose first argument is this type
    /// (spec §3 "type_member_store").
    pub type_member_store: Option<ScopeId>,
    pub local: Option<LocalInfo>,
}

impl TypeSpec {
    pub fn scalar(tag: TypeTag, name: impl Into<Name>, scope_name: ScopeName) -> Self {
        Self {
            tag,
            name: name.into(),
            scope_name,
            result_type: None,
            parameters: Vec::new(),
            type_member_store: None,
            local: None,
        }
    }

    pub fn parametric(
        tag: TypeTag,
        name: impl Into<Name>,
        scope_name: ScopeName,
        parameters: Vec<TypeParam>,
    ) -> Self {
        Self {
            tag,
            name: name.into(),
            scope_name,
            result_type: None,
            parameters,
            type_member_store: None,
            local: None,
        }
    }

    pub fn function(
        name: impl Into<Name>,
        scope_name: ScopeName,
        arg_types: Vec<TypeSpecId>,
        result_type: TypeSpecId,
    ) -> Self {
        Self {
            tag: TypeTag::Function,
            name: name.into(),
            scope_name,
            result_type: Some(result_type),
            parameters: arg_types.into_iter().map(TypeParam::Type).collect(),
            type_member_store: None,
            local: None,
        }
    }

    pub fn is_local(&self) -> bool {
        self.local.is_some()
    }

    /// Every parameter (recursively) is concretely resolved and this type
    /// is not itself a local type variable (spec §3 "bound"/"abstract").
    pub fn is_bound(&self, env: &TypeArena) -> bool {
        if self.is_local() {
            return false;
        }
        if let Some(result) = self.result_type {
            if !env[result].is_bound(env) {
                return false;
            }
        }
        self.parameters.iter().all(|p| match p {
            TypeParam::Type(id) => env[*id].is_bound(env),
            TypeParam::Int(_) => true,
        })
    }

    pub fn is_abstract(&self, env: &TypeArena) -> bool {
        !self.is_bound(env)
    }

    pub fn function_args(&self) -> impl Iterator<Item = TypeSpecId> + '_ {
        self.parameters.iter().filter_map(TypeParam::as_type)
    }
}

pub type TypeArena = crate::index::Arena<TypeSpecId, TypeSpec>;

/// Owns every [`TypeSpec`] allocated while analyzing a module tree, plus
/// the canonical instances of the built-in scalar and generic-template
/// types. This is the `env.types` arena threaded through every type-system
/// operation in this module.
#[derive(Debug, Default)]
pub struct TypeSystem {
    pub arena: TypeArena,
    next_local_site: u32,
}

impl TypeSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, spec: TypeSpec) -> TypeSpecId {
        self.arena.push(spec)
    }

    pub fn get(&self, id: TypeSpecId) -> &TypeSpec {
        &self.arena[id]
    }

    /// A fresh local-type-parameter site, handed out once per function
    /// signature being built (spec §3: "distinct sites are independent").
    pub fn next_local_site(&mut self) -> LocalSite {
        let site = LocalSite(self.next_local_site);
        self.next_local_site += 1;
        site
    }

    /// `Clone` semantics from spec §3: the clone shares the member store
    /// but can be separately mutated for parameter binding, and compares
    /// equal to the original under `IsEqual` immediately after cloning
    /// (spec §8 property 7 "Clone independence").
    pub fn clone_type(&mut self, id: TypeSpecId) -> TypeSpecId {
        let spec = self.arena[id].clone();
        self.arena.push(spec)
    }

    pub fn is_equal(&self, a: TypeSpecId, b: TypeSpecId) -> bool {
        if a == b {
            return true;
        }
        let (ta, tb) = (&self.arena[a], &self.arena[b]);
        if ta.tag != tb.tag || ta.parameters.len() != tb.parameters.len() {
            return false;
        }
        if ta.tag.is_nominal() && (ta.name != tb.name || ta.scope_name != tb.scope_name) {
            return false;
        }
        match (ta.local.as_ref(), tb.local.as_ref()) {
            (Some(la), Some(lb)) => {
                if la.name != lb.name || la.site != lb.site {
                    return false;
                }
            }
            (None, None) => {}
            _ => return false,
        }
        match (ta.result_type, tb.result_type) {
            (Some(ra), Some(rb)) => {
                if !self.is_equal(ra, rb) {
                    return false;
                }
            }
            (None, None) => {}
            _ => return false,
        }
        ta.parameters
            .iter()
            .zip(tb.parameters.iter())
            .all(|(pa, pb)| match (pa, pb) {
                (TypeParam::Int(ia), TypeParam::Int(ib)) => ia == ib,
                (TypeParam::Type(ia), TypeParam::Type(ib)) => self.is_equal(*ia, *ib),
                _ => false,
            })
    }

    /// The `Ancestor` relation (spec §4.2), reflexive and transitive by
    /// construction of the recursive cases below.
    pub fn is_ancestor_of(&self, ancestor: TypeSpecId, descendant: TypeSpecId) -> bool {
        if self.is_equal(ancestor, descendant) {
            return true;
        }
        let (a, b) = (&self.arena[ancestor], &self.arena[descendant]);

        if a.tag.is_any() {
            return true;
        }
        if a.tag.is_unknown() {
            return false;
        }

        match a.tag {
            TypeTag::Numeric => return b.tag.is_concrete_numeric() || b.tag.is_integral(),
            TypeTag::Integral => return b.tag.is_integral_concrete(),
            TypeTag::Nullable => {
                let inner = a.result_type.expect("Nullable carries its inner type");
                return b.tag.is_null() || self.is_ancestor_of(inner, descendant);
            }
            TypeTag::Union => {
                return a
                    .parameters
                    .iter()
                    .filter_map(TypeParam::as_type)
                    .any(|member| self.is_ancestor_of(member, descendant));
            }
            TypeTag::Iterable | TypeTag::Container => {
                let allowed = if a.tag.is_iterable() {
                    matches!(
                        b.tag,
                        TypeTag::Array | TypeTag::Set | TypeTag::Map | TypeTag::Generator
                    )
                } else {
                    matches!(b.tag, TypeTag::Array | TypeTag::Set | TypeTag::Map)
                };
                if !allowed {
                    return false;
                }
                let Some(TypeParam::Type(elem)) = a.parameters.first() else {
                    return true;
                };
                if b.tag == TypeTag::Map {
                    // A map is viewed as an iterable of key-value tuples
                    // (spec §4.2): `elem` must itself be a 2-tuple whose
                    // components cover the map's key and value types.
                    let elem_spec = &self.arena[*elem];
                    if elem_spec.tag.is_any() {
                        return true;
                    }
                    let (Some(TypeParam::Type(k)), Some(TypeParam::Type(v))) =
                        (b.parameters.first(), b.parameters.get(1))
                    else {
                        return false;
                    };
                    let (Some(TypeParam::Type(ek)), Some(TypeParam::Type(ev))) =
                        (elem_spec.parameters.first(), elem_spec.parameters.get(1))
                    else {
                        return false;
                    };
                    return elem_spec.tag == TypeTag::Tuple
                        && self.is_ancestor_of(*ek, *k)
                        && self.is_ancestor_of(*ev, *v);
                }
                let Some(b_elem) = self.element_type_of(descendant) else {
                    return false;
                };
                return self.is_ancestor_of(*elem, b_elem);
            }
            TypeTag::Function => {
                if !b.tag.is_function() {
                    return false;
                }
                let a_args: Vec<_> = a.function_args().collect();
                let b_args: Vec<_> = b.function_args().collect();
                if a_args.len() != b_args.len() {
                    return false;
                }
                if !a_args
                    .iter()
                    .zip(b_args.iter())
                    .all(|(&ai, &bi)| self.is_ancestor_of(ai, bi))
                {
                    return false;
                }
                return match (a.result_type, b.result_type) {
                    (Some(ra), Some(rb)) => self.is_ancestor_of(ra, rb),
                    (None, None) => true,
                    _ => false,
                };
            }
            _ => {}
        }

        // `a.tag.is_any()` already returned above, so any remaining
        // ancestor must cover *every* alternative of a union/nullable
        // descendant to qualify. In practice only `Null` itself does so
        // for the `Nullable` case, since it can never cover a non-null
        // inner type.
        if b.tag == TypeTag::Nullable {
            let inner = b.result_type.expect("Nullable carries its inner type");
            return a.tag.is_null() && self.is_ancestor_of(ancestor, inner);
        }
        if b.tag == TypeTag::Union {
            return b
                .parameters
                .iter()
                .filter_map(TypeParam::as_type)
                .all(|m| self.is_ancestor_of(ancestor, m));
        }

        if a.tag != b.tag {
            return false;
        }
        // "A bound type is never an ancestor of an abstract type with the
        // same constructor" (spec §4.2).
        if a.is_bound(&self.arena) && b.is_abstract(&self.arena) {
            return false;
        }
        if a.tag.is_nominal() {
            return a.name == b.name && a.scope_name == b.scope_name;
        }
        if a.parameters.len() != b.parameters.len() {
            return false;
        }
        let params_ok = a
            .parameters
            .iter()
            .zip(b.parameters.iter())
            .all(|(pa, pb)| match (pa, pb) {
                (TypeParam::Int(ia), TypeParam::Int(ib)) => ia == ib,
                (TypeParam::Type(ia), TypeParam::Type(ib)) => self.is_ancestor_of(*ia, *ib),
                _ => false,
            });
        if !params_ok {
            return false;
        }
        match (a.result_type, b.result_type) {
            (Some(ra), Some(rb)) => self.is_ancestor_of(ra, rb),
            (None, None) => true,
            _ => false,
        }
    }

    fn element_type_of(&self, id: TypeSpecId) -> Option<TypeSpecId> {
        let spec = &self.arena[id];
        match spec.tag {
            TypeTag::Array | TypeTag::Set | TypeTag::Iterable | TypeTag::Generator | TypeTag::Container => {
                spec.parameters.first().and_then(TypeParam::as_type)
            }
            TypeTag::Map => None, // element type is the key/value tuple; see element_type_of_map
            _ => None,
        }
    }

    /// `A IsConvertibleFrom B` (spec §4.2): ancestor, or numeric widening
    /// per the fixed table (`Int8→Int16→Int32→Int`, unsigned analogously,
    /// integrals → `Float32` → `Float64`, any numeric → `Numeric`).
    pub fn is_convertible_from(&self, dest: TypeSpecId, source: TypeSpecId) -> bool {
        if self.is_ancestor_of(dest, source) {
            return true;
        }
        let (d, s) = (&self.arena[dest], &self.arena[source]);
        if d.tag.is_numeric() && s.tag.is_concrete_numeric() {
            return true;
        }
        if let (Some(ds), Some(ss)) = (d.tag.signed_rank(), s.tag.signed_rank()) {
            return ds >= ss;
        }
        if let (Some(du), Some(su)) = (d.tag.unsigned_rank(), s.tag.unsigned_rank()) {
            return du >= su;
        }
        if let Some(df) = d.tag.float_rank() {
            if s.tag.is_integral_concrete() {
                return true;
            }
            if let Some(sf) = s.tag.float_rank() {
                return df >= sf;
            }
        }
        false
    }
}

impl std::ops::Index<TypeSpecId> for TypeSystem {
    type Output = TypeSpec;

    fn index(&self, id: TypeSpecId) -> &TypeSpec {
        &self.arena[id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Name;

    fn scalar(sys: &mut TypeSystem, tag: TypeTag, name: &str) -> TypeSpecId {
        sys.alloc(TypeSpec::scalar(tag, Name::new(name), ScopeName::empty()))
    }

    #[test]
    fn any_is_ancestor_of_everything() {
        let mut sys = TypeSystem::new();
        let any = scalar(&mut sys, TypeTag::Any, "Any");
        let int = scalar(&mut sys, TypeTag::Int, "Int");
        assert!(sys.is_ancestor_of(any, int));
    }

    #[test]
    fn ancestor_is_reflexive_and_transitive_over_numeric_hierarchy() {
        let mut sys = TypeSystem::new();
        let numeric = scalar(&mut sys, TypeTag::Numeric, "Numeric");
        let integral = scalar(&mut sys, TypeTag::Integral, "Integral");
        let int8 = scalar(&mut sys, TypeTag::Int8, "Int8");

        assert!(sys.is_ancestor_of(int8, int8));
        assert!(sys.is_ancestor_of(integral, int8));
        assert!(sys.is_ancestor_of(numeric, integral) || sys.is_ancestor_of(numeric, int8));
        assert!(sys.is_ancestor_of(numeric, int8));
    }

    #[test]
    fn int8_converts_into_int32_but_not_reverse() {
        let mut sys = TypeSystem::new();
        let int8 = scalar(&mut sys, TypeTag::Int8, "Int8");
        let int32 = scalar(&mut sys, TypeTag::Int32, "Int32");
        assert!(sys.is_convertible_from(int32, int8));
        assert!(!sys.is_convertible_from(int8, int32));
    }

    #[test]
    fn clone_independence() {
        let mut sys = TypeSystem::new();
        let array_elem = scalar(&mut sys, TypeTag::Int, "Int");
        let array = sys.alloc(TypeSpec::parametric(
            TypeTag::Array,
            "Array",
            ScopeName::empty(),
            vec![TypeParam::Type(array_elem)],
        ));
        let cloned = sys.clone_type(array);
        assert!(sys.is_equal(array, cloned));
        assert_ne!(array, cloned);
        // Mutating one leaves the other alone: demonstrate by rebinding
        // the clone's parameter to a different element type.
        let string_elem = scalar(&mut sys, TypeTag::String, "String");
        sys.arena[cloned].parameters = vec![TypeParam::Type(string_elem)];
        assert!(!sys.is_equal(array, cloned));
        assert_eq!(sys.arena[array].parameters, vec![TypeParam::Type(array_elem)]);
    }
}

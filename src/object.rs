//! The named-object capability and the closed kind enumeration (spec §3
//! "Named objects"). Grounded on `pb::ObjectKind` (referenced throughout
//! `nudl/analysis/scope.h`/`function.h`), encoded as a closed enum with
//! `strum`-derived predicates for the fixed vocabulary of object kinds.

use strum_macros::EnumIs;

use crate::function::{FunctionGroupId, FunctionId};
use crate::scope::ScopeId;
use crate::types::TypeSpecId;
use crate::vars::VarId;

/// The closed set of kinds a [`NamedObjectId`] can carry.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIs)]
pub enum ObjectKind {
    Unknown,
    Variable,
    Parameter,
    Argument,
    Field,
    Scope,
    Function,
    Method,
    Constructor,
    MainFunction,
    Lambda,
    FunctionGroup,
    MethodGroup,
    Module,
    Type,
    TypeMemberStore,
}

impl ObjectKind {
    /// `IsScopeKind` from spec §3.
    pub fn is_scope_kind(self) -> bool {
        matches!(
            self,
            ObjectKind::Scope
                | ObjectKind::Module
                | ObjectKind::Function
                | ObjectKind::Method
                | ObjectKind::Constructor
                | ObjectKind::MainFunction
                | ObjectKind::Lambda
                | ObjectKind::FunctionGroup
                | ObjectKind::MethodGroup
                | ObjectKind::TypeMemberStore
        )
    }

    /// `IsFunctionKind` from spec §3.
    pub fn is_function_kind(self) -> bool {
        matches!(
            self,
            ObjectKind::Function
                | ObjectKind::Method
                | ObjectKind::Constructor
                | ObjectKind::MainFunction
                | ObjectKind::Lambda
        )
    }

    /// `IsMethodKind` from spec §3.
    pub fn is_method_kind(self) -> bool {
        matches!(self, ObjectKind::Method | ObjectKind::Constructor)
    }

    /// `IsVarKind` from spec §3.
    pub fn is_var_kind(self) -> bool {
        matches!(
            self,
            ObjectKind::Variable | ObjectKind::Parameter | ObjectKind::Argument | ObjectKind::Field
        )
    }
}

/// Any entity addressable by name: a tagged union over the arenas that own
/// the concrete payloads, per the Design Notes' preference for tagged
/// unions over virtual dispatch for the closed hierarchies in this crate.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum NamedObjectId {
    Var(VarId),
    Scope(ScopeId),
    Function(FunctionId),
    FunctionGroup(FunctionGroupId),
    Type(TypeSpecId),
}

impl NamedObjectId {
    pub fn as_var(self) -> Option<VarId> {
        match self {
            NamedObjectId::Var(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_scope(self) -> Option<ScopeId> {
        match self {
            NamedObjectId::Scope(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_function(self) -> Option<FunctionId> {
        match self {
            NamedObjectId::Function(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_function_group(self) -> Option<FunctionGroupId> {
        match self {
            NamedObjectId::FunctionGroup(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_type(self) -> Option<TypeSpecId> {
        match self {
            NamedObjectId::Type(id) => Some(id),
            _ => None,
        }
    }
}

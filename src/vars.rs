//! `VarBase`, the named-object payload for variables, parameters,
//! arguments, and struct fields (spec §3). Grounded on
//! `nudl/analysis/vars.h`'s `VarBase` hierarchy (not itself retrieved into
//! `original_source/`, but referenced throughout `function.h`/`scope.h`);
//! here it is a single struct discriminated by [`ObjectKind`] rather than
//! a small class hierarchy, per the Design Notes' tagged-union guidance.

use crate::index::newtype_index;
use crate::name::Name;
use crate::object::ObjectKind;
use crate::scope::ScopeId;
use crate::types::TypeSpecId;

newtype_index! {
    pub struct VarId;
}

/// A variable, parameter, argument, or struct field.
#[derive(Debug, Clone)]
pub struct VarBase {
    pub name: Name,
    pub kind: ObjectKind,
    pub type_spec: TypeSpecId,
    /// The scope this var lives directly in.
    pub parent_store: Option<ScopeId>,
    /// `param`-qualified module-level assignments become module
    /// parameters rather than plain variables (spec §4.7).
    pub is_module_parameter: bool,
}

impl VarBase {
    pub fn new(name: Name, kind: ObjectKind, type_spec: TypeSpecId, parent_store: ScopeId) -> Self {
        Self {
            name,
            kind,
            type_spec,
            parent_store: Some(parent_store),
            is_module_parameter: false,
        }
    }

    pub fn full_name(&self) -> String {
        self.name.to_string()
    }
}

//! The scope / name-store model (spec §3 "Scopes", §4.1 "Name & Scope
//! model"). Grounded on `nudl/analysis/scope.h`'s `Scope : public
//! BaseNameStore`.

use indexmap::IndexMap;
use itertools::Itertools;
use rustc_hash::FxHashMap;

use crate::error::{AnalysisError, ErrorKind, Result};
use crate::expr::ExprId;
use crate::index::newtype_index;
use crate::name::{Name, ScopeName, ScopedName};
use crate::object::{NamedObjectId, ObjectKind};
use crate::Env;

newtype_index! {
    pub struct ScopeId;
}

/// A scope: a name-store plus the lifecycle data described in spec §3
/// ("Scopes"): its expression list, built-in/module back-pointers, and
/// child scopes it owns.
#[derive(Debug)]
pub struct ScopeData {
    pub scope_name: ScopeName,
    pub kind: ObjectKind,
    pub parent: Option<ScopeId>,
    pub top_scope: ScopeId,
    pub built_in_scope: Option<ScopeId>,
    pub module_scope: Option<ScopeId>,
    pub is_module: bool,
    pub defined_names: IndexMap<Name, NamedObjectId>,
    pub children: Vec<ScopeId>,
    pub expressions: Vec<ExprId>,
    next_name_id: u32,
    binding_name_index: FxHashMap<Name, u32>,
}

impl ScopeData {
    pub fn defined_names(&self) -> impl Iterator<Item = (&Name, &NamedObjectId)> {
        self.defined_names.iter()
    }

    pub fn has_name(&self, name: &Name) -> bool {
        self.defined_names.contains_key(name)
    }
}

impl Env {
    /// Builds the single top-level built-in scope; called once by
    /// [`Env::new`].
    pub(crate) fn new_root_scope(&mut self) -> ScopeId {
        let id = self.scopes.push(ScopeData {
            scope_name: ScopeName::empty(),
            kind: ObjectKind::Scope,
            parent: None,
            top_scope: ScopeId::from_u32(0), // patched below
            built_in_scope: None,
            module_scope: None,
            is_module: false,
            defined_names: IndexMap::new(),
            children: Vec::new(),
            expressions: Vec::new(),
            next_name_id: 0,
            binding_name_index: FxHashMap::default(),
        });
        self.scopes[id].top_scope = id;
        self.scope_by_name.insert(ScopeName::empty(), id);
        id
    }

    /// Adds a child scope. Spec §8 property 2 ("scope prefix") is enforced
    /// here: the child's `ScopeName` must be a strict extension of the
    /// parent's.
    pub fn add_sub_scope(
        &mut self,
        parent: ScopeId,
        scope_name: ScopeName,
        kind: ObjectKind,
        is_module: bool,
    ) -> Result<ScopeId> {
        let parent_data = &self.scopes[parent];
        if !scope_name.is_strict_extension_of(&parent_data.scope_name) {
            return Err(AnalysisError::bug(format!(
                "scope `{scope_name}` is not a strict extension of its parent `{}`",
                parent_data.scope_name
            )));
        }
        let top_scope = parent_data.top_scope;
        let built_in_scope = parent_data.built_in_scope;
        let module_scope = if parent_data.is_module {
            Some(parent)
        } else {
            parent_data.module_scope
        };

        let id = self.scopes.push(ScopeData {
            scope_name: scope_name.clone(),
            kind,
            parent: Some(parent),
            top_scope,
            built_in_scope,
            module_scope,
            is_module,
            defined_names: IndexMap::new(),
            children: Vec::new(),
            expressions: Vec::new(),
            next_name_id: 0,
            binding_name_index: FxHashMap::default(),
        });
        self.scopes[parent].children.push(id);
        if self.scope_by_name.insert(scope_name, id).is_some() {
            return Err(AnalysisError::bug("scope name collision"));
        }
        Ok(id)
    }

    /// Registers `name` in `scope`'s name-store. Spec §8 property 1 ("name
    /// uniqueness"): rejects a name already defined directly in this
    /// scope.
    pub fn define_name(&mut self, scope: ScopeId, name: Name, object: NamedObjectId) -> Result<()> {
        let data = &mut self.scopes[scope];
        if data.defined_names.contains_key(&name) {
            return Err(AnalysisError::new(
                ErrorKind::AlreadyExists,
                format!("`{name}` is already defined in scope `{}`", data.scope_name),
            ));
        }
        data.defined_names.insert(name, object);
        Ok(())
    }

    pub fn scope_parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope].parent
    }

    pub fn top_scope(&self, scope: ScopeId) -> ScopeId {
        self.scopes[scope].top_scope
    }

    pub fn module_scope_of(&self, scope: ScopeId) -> Option<ScopeId> {
        if self.scopes[scope].is_module {
            Some(scope)
        } else {
            self.scopes[scope].module_scope
        }
    }

    /// Closest ancestor scope (inclusive) that is a function kind (spec
    /// §4.1 `FindFunctionAncestor`).
    pub fn find_function_ancestor(&self, scope: ScopeId) -> Option<ScopeId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if self.scopes[id].kind.is_function_kind() {
                return Some(id);
            }
            current = self.scopes[id].parent;
        }
        None
    }

    /// Generates a unique local name inside `scope`, for lambdas and local
    /// block scopes (spec §4.1 `NextLocalName`).
    pub fn next_local_name(&mut self, scope: ScopeId, prefix: &str) -> Name {
        let data = &mut self.scopes[scope];
        let id = data.next_name_id;
        data.next_name_id += 1;
        Name::new(format!("{prefix}{id}"))
    }

    /// Generates a unique specialization name for `fn_name`, guaranteed
    /// unique per module (spec §4.1 `NextBindingName`). The counter lives
    /// on the *module* scope regardless of which nested scope requests it,
    /// matching `nudl/analysis/scope.h`'s `binding_name_index_` being
    /// consulted transitively from module level (SPEC_FULL §C).
    pub fn next_binding_name(&mut self, scope: ScopeId, fn_name: &Name) -> Name {
        let module = self.module_scope_of(scope).unwrap_or(scope);
        let data = &mut self.scopes[module];
        let counter = data.binding_name_index.entry(fn_name.clone()).or_insert(0);
        let index = *counter;
        *counter += 1;
        Name::new(format!("{fn_name}__{index}"))
    }

    /// Whether `lookup_scope` is the enclosing function itself, or nested
    /// inside it: the rule from spec §4.1 step 3 ("A found object that is
    /// a function body … is considered inaccessible and skipped").
    fn is_accessible(&self, object: NamedObjectId, lookup_scope: &ScopeName) -> bool {
        let owner = match object {
            NamedObjectId::Var(v) => self.vars[v]
                .parent_store
                .map(|s| self.scopes[s].scope_name.clone()),
            NamedObjectId::Scope(s) => Some(self.scopes[s].scope_name.clone()),
            NamedObjectId::Function(f) => {
                Some(self.scopes[self.functions[f].scope].scope_name.clone())
            }
            NamedObjectId::FunctionGroup(g) => {
                Some(self.scopes[self.function_groups[g].parent_scope].scope_name.clone())
            }
            NamedObjectId::Type(_) => None,
        };
        let Some(owner) = owner else { return true };
        if !owner.has_function_component() {
            return true;
        }
        lookup_scope == &owner || lookup_scope.is_strict_extension_of(&owner)
    }

    /// Builds the ordered list of candidate compound scope names tried by
    /// step 2 of [`Env::find_name`]: each successively shorter prefix of
    /// `lookup_scope`, joined with `target`'s own scope prefix, skipping
    /// prefixes that still carry a function component once `target`
    /// itself begins with a module component (spec §4.1 step 2).
    fn candidate_scope_names(lookup_scope: &ScopeName, target: &ScopeName) -> Vec<ScopeName> {
        let target_begins_with_module = !target.module_names().is_empty();
        lookup_scope
            .prefixes()
            .into_iter()
            .filter(|p| !(target_begins_with_module && p.has_function_component()))
            .map(|p| p.join(target))
            .collect()
    }

    /// `FindName(lookup_scope, scoped_name)` (spec §4.1).
    pub fn find_name(
        &self,
        lookup_scope: &ScopeName,
        scoped_name: &ScopedName,
    ) -> Result<NamedObjectId> {
        let mut tried_scopes: Vec<ScopeId> = Vec::new();

        // Step 1: direct hit in the caller's own scope.
        if scoped_name.scope().is_empty() {
            if let Some(&current) = self.scope_by_name.get(lookup_scope) {
                tried_scopes.push(current);
                if let Some(&object) = self.scopes[current].defined_names.get(scoped_name.name()) {
                    if self.is_accessible(object, lookup_scope) {
                        return Ok(object);
                    }
                }
            }
        }

        // Step 2: successively shorter prefixes of lookup_scope.
        for candidate in Self::candidate_scope_names(lookup_scope, scoped_name.scope()) {
            if let Some(&sid) = self.scope_by_name.get(&candidate) {
                tried_scopes.push(sid);
                if let Some(&object) = self.scopes[sid].defined_names.get(scoped_name.name()) {
                    if self.is_accessible(object, lookup_scope) {
                        return Ok(object);
                    }
                }
            }
        }

        // Step 4: retry in the built-in scope with an empty lookup-scope.
        let builtin = self.built_in_scope;
        if scoped_name.scope().is_empty() {
            tried_scopes.push(builtin);
            if let Some(&object) = self.scopes[builtin].defined_names.get(scoped_name.name()) {
                return Ok(object);
            }
        }

        // Step 5: if the scope-prefix has no function components, try the
        // type store.
        if !scoped_name.scope().has_function_component() {
            if let Some(type_id) = self.type_store.find_named(scoped_name) {
                return Ok(NamedObjectId::Type(type_id));
            }
        }

        // Step 6: accumulate closest-name alternatives (SPEC_FULL §C).
        let alternatives = self.closest_names(&tried_scopes, scoped_name.name());
        Err(AnalysisError::not_found(scoped_name, &alternatives))
    }

    /// Closest-named alternatives across the scopes consulted during a
    /// failed lookup, by edit distance (SPEC_FULL §C, resolving spec
    /// §4.1 step 6's unspecified "closest-named alternatives").
    fn closest_names(&self, scopes: &[ScopeId], target: &Name) -> Vec<ScopedName> {
        const MAX_DISTANCE: usize = 2;
        const MAX_RESULTS: usize = 3;
        let mut scored: Vec<(usize, ScopedName)> = Vec::new();
        for &scope in scopes {
            let scope_name = self.scopes[scope].scope_name.clone();
            for name in self.scopes[scope].defined_names.keys() {
                let distance = levenshtein(target.as_str(), name.as_str());
                if distance <= MAX_DISTANCE {
                    scored.push((distance, ScopedName::new(scope_name.clone(), name.clone())));
                }
            }
        }
        scored
            .into_iter()
            .sorted_by_key(|(distance, _)| *distance)
            .take(MAX_RESULTS)
            .map(|(_, name)| name)
            .collect()
    }
}

/// Classic iterative Levenshtein edit distance, used only to rank
/// not-found-name suggestions.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levenshtein_distance_examples() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("foo", "foo"), 0);
        assert_eq!(levenshtein("x", "xs"), 1);
    }
}

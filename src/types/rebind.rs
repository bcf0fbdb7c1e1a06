//! The local-name rebinder (spec §4.2 "Local-name rebinder", used
//! throughout §4.6 binding). Grounded on `LocalNamesRebinder` referenced by
//! `nudl/analysis/function.h`'s `FunctionBinding::BindArgument`.

use rustc_hash::FxHashMap;

use crate::error::{AnalysisError, ErrorKind, Result};
use crate::name::Name;
use crate::types::{LocalSite, TypeParam, TypeSpec, TypeSpecId, TypeSystem};

/// Records `{T}`-style local-type-parameter bindings discovered while
/// binding a call's arguments against a function signature, and rebuilds
/// abstract types into concrete ones once all slots are known.
#[derive(Debug, Default)]
pub struct LocalNamesRebinder {
    bindings: FxHashMap<(Name, LocalSite), TypeSpecId>,
}

impl LocalNamesRebinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolved(&self, name: &Name, site: LocalSite) -> Option<TypeSpecId> {
        self.bindings.get(&(name.clone(), site)).copied()
    }

    /// Records (or reconciles) a concrete type for a local name. Repeat
    /// encounters must agree: equal, or related by ancestor, in which case
    /// the most specific of the two is retained (spec §4.2).
    pub fn record(
        &mut self,
        types: &TypeSystem,
        name: &Name,
        site: LocalSite,
        concrete: TypeSpecId,
    ) -> Result<()> {
        match self.bindings.get(&(name.clone(), site)) {
            None => {
                self.bindings.insert((name.clone(), site), concrete);
                Ok(())
            }
            Some(&existing) => {
                if types.is_equal(existing, concrete) {
                    return Ok(());
                }
                if types.is_ancestor_of(existing, concrete) {
                    // `concrete` is more specific; keep it.
                    self.bindings.insert((name.clone(), site), concrete);
                    Ok(())
                } else if types.is_ancestor_of(concrete, existing) {
                    // `existing` is already the more specific of the two.
                    Ok(())
                } else {
                    Err(AnalysisError::new(
                        ErrorKind::InvalidArgument,
                        format!(
                            "local type `{name}` unified to incompatible types at the same site"
                        ),
                    ))
                }
            }
        }
    }

    /// A structural walk substituting each local-type occurrence with its
    /// recorded concrete replacement, producing a fully concrete type
    /// (spec §4.2 `RebuildType`). Types with no local occurrences are
    /// returned unchanged (by id).
    pub fn rebuild_type(&self, types: &mut TypeSystem, abstract_type: TypeSpecId) -> Result<TypeSpecId> {
        let spec = types.get(abstract_type).clone();

        if let Some(local) = &spec.local {
            return self.resolved(&local.name, local.site).ok_or_else(|| {
                AnalysisError::new(
                    ErrorKind::InvalidArgument,
                    format!("local type `{}` could not be resolved from the call site", local.name),
                )
            });
        }

        if spec.parameters.is_empty() && spec.result_type.is_none() {
            return Ok(abstract_type);
        }

        let mut changed = false;
        let mut new_params = Vec::with_capacity(spec.parameters.len());
        for param in &spec.parameters {
            match param {
                TypeParam::Type(id) => {
                    let rebuilt = self.rebuild_type(types, *id)?;
                    changed |= rebuilt != *id;
                    new_params.push(TypeParam::Type(rebuilt));
                }
                TypeParam::Int(v) => new_params.push(TypeParam::Int(*v)),
            }
        }
        let new_result = match spec.result_type {
            Some(id) => {
                let rebuilt = self.rebuild_type(types, id)?;
                changed |= rebuilt != id;
                Some(rebuilt)
            }
            None => None,
        };

        if !changed {
            return Ok(abstract_type);
        }

        let mut rebuilt_spec = TypeSpec {
            parameters: new_params,
            result_type: new_result,
            ..spec
        };
        rebuilt_spec.local = None;
        Ok(types.alloc(rebuilt_spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::ScopeName;
    use crate::types::{LocalInfo, TypeTag};

    #[test]
    fn unifies_local_name_across_two_slots_to_the_most_specific_type() {
        let mut types = TypeSystem::new();
        let site = types.next_local_site();
        let int = types.alloc(TypeSpec::scalar(TypeTag::Int, "Int", ScopeName::empty()));
        let numeric = types.alloc(TypeSpec::scalar(TypeTag::Numeric, "Numeric", ScopeName::empty()));

        let mut rebinder = LocalNamesRebinder::new();
        let t = Name::new("T");
        rebinder.record(&types, &t, site, numeric).unwrap();
        rebinder.record(&types, &t, site, int).unwrap();

        assert_eq!(rebinder.resolved(&t, site), Some(int));
    }

    #[test]
    fn rebuild_type_substitutes_local_occurrences() {
        let mut types = TypeSystem::new();
        let site = types.next_local_site();
        let int = types.alloc(TypeSpec::scalar(TypeTag::Int, "Int", ScopeName::empty()));
        let mut local_t = TypeSpec::scalar(TypeTag::Unknown, "T", ScopeName::empty());
        local_t.local = Some(LocalInfo {
            name: Name::new("T"),
            site,
            bound: None,
        });
        let local_t_id = types.alloc(local_t);
        let array_of_t = types.alloc(TypeSpec::parametric(
            TypeTag::Array,
            "Array",
            ScopeName::empty(),
            vec![TypeParam::Type(local_t_id)],
        ));

        let mut rebinder = LocalNamesRebinder::new();
        rebinder.record(&types, &Name::new("T"), site, int).unwrap();
        let rebuilt = rebinder.rebuild_type(&mut types, array_of_t).unwrap();

        assert_eq!(types.get(rebuilt).parameters, vec![TypeParam::Type(int)]);
    }
}

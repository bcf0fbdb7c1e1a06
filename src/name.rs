//! Names and scoped names (spec §3 "Names").
//!
//! Grounded on `nudl/analysis/names.h`/`scope.h` (`ScopeName`,
//! `ScopedName`) for the dotted module/function path pair, with a simple
//! `compact_str`-backed wrapper for bare identifiers.

use std::fmt;
use std::ops::Deref;

use compact_str::CompactString;

/// A single identifier. Cheaply cloneable, compares by value.
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Name(CompactString);

impl Name {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(CompactString::new(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Deref for Name {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl<T> From<T> for Name
where
    T: AsRef<str>,
{
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

/// An ordered module path and an ordered function-instance path under it.
///
/// `module_names` is the dotted package path (`a.b.c`); `function_names` is
/// the dotted path of function-instance scopes nested under that module
/// (the scope introduced by `def f(...)`, and any lambda/local scopes
/// nested further). Equality is purely structural.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Default)]
pub struct ScopeName {
    module_names: Vec<Name>,
    function_names: Vec<Name>,
}

impl ScopeName {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn module(module_names: Vec<Name>) -> Self {
        Self {
            module_names,
            function_names: Vec::new(),
        }
    }

    pub fn module_names(&self) -> &[Name] {
        &self.module_names
    }

    pub fn function_names(&self) -> &[Name] {
        &self.function_names
    }

    pub fn is_empty(&self) -> bool {
        self.module_names.is_empty() && self.function_names.is_empty()
    }

    /// Has any function-path component, i.e. names a scope nested inside a
    /// function rather than a module's top level.
    pub fn has_function_component(&self) -> bool {
        !self.function_names.is_empty()
    }

    /// Derives a child scope name by appending a module component.
    pub fn extend_module(&self, component: impl Into<Name>) -> Self {
        let mut module_names = self.module_names.clone();
        module_names.push(component.into());
        Self {
            module_names,
            function_names: self.function_names.clone(),
        }
    }

    /// Derives a child scope name by appending a function-path component.
    pub fn extend_function(&self, component: impl Into<Name>) -> Self {
        let mut function_names = self.function_names.clone();
        function_names.push(component.into());
        Self {
            module_names: self.module_names.clone(),
            function_names,
        }
    }

    /// Whether `self` is a strict prefix-extension of `parent`: `parent`'s
    /// module and function components form a strict prefix of `self`'s.
    /// This is the scope-tree invariant from spec §8 property 2.
    pub fn is_strict_extension_of(&self, parent: &ScopeName) -> bool {
        if parent.module_names.len() <= self.module_names.len()
            && self.module_names[..parent.module_names.len()] == parent.module_names[..]
            && parent.function_names.is_empty()
            && self.module_names.len() > parent.module_names.len()
        {
            return true;
        }
        if parent.module_names == self.module_names
            && parent.function_names.len() < self.function_names.len()
            && self.function_names[..parent.function_names.len()] == parent.function_names[..]
        {
            return true;
        }
        false
    }

    /// All successively shorter prefixes of this scope name, longest first,
    /// used by the §4.1 `FindName` lookup algorithm to build candidate
    /// compound names.
    pub fn prefixes(&self) -> Vec<ScopeName> {
        let mut out = Vec::new();
        for i in (0..=self.function_names.len()).rev() {
            out.push(ScopeName {
                module_names: self.module_names.clone(),
                function_names: self.function_names[..i].to_vec(),
            });
        }
        for i in (0..self.module_names.len()).rev() {
            out.push(ScopeName {
                module_names: self.module_names[..i].to_vec(),
                function_names: Vec::new(),
            });
        }
        out
    }

    /// Concatenates `self` as a prefix in front of `suffix`'s components.
    pub fn join(&self, suffix: &ScopeName) -> ScopeName {
        let mut module_names = self.module_names.clone();
        module_names.extend(suffix.module_names.iter().cloned());
        let mut function_names = self.function_names.clone();
        function_names.extend(suffix.function_names.iter().cloned());
        ScopeName {
            module_names,
            function_names,
        }
    }
}

impl fmt::Display for ScopeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for n in &self.module_names {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{n}")?;
            first = false;
        }
        for n in &self.function_names {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{n}")?;
            first = false;
        }
        Ok(())
    }
}

/// A possibly-empty [`ScopeName`] prefix paired with a trailing simple
/// identifier: the general shape of a name reference anywhere in NuDL
/// source (`x`, `A.g`, `a.b.SomeFunction`).
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ScopedName {
    scope: ScopeName,
    name: Name,
}

impl ScopedName {
    pub fn new(scope: ScopeName, name: impl Into<Name>) -> Self {
        Self {
            scope,
            name: name.into(),
        }
    }

    pub fn unscoped(name: impl Into<Name>) -> Self {
        Self {
            scope: ScopeName::empty(),
            name: name.into(),
        }
    }

    pub fn scope(&self) -> &ScopeName {
        &self.scope
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn full_name(&self) -> ScopeName {
        if self.scope.is_empty() {
            ScopeName::module(vec![self.name.clone()])
        } else {
            self.scope.extend_module(self.name.clone())
        }
    }
}

impl fmt::Display for ScopedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scope.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.scope, self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_prefix_invariant_holds_for_module_nesting() {
        let parent = ScopeName::module(vec![Name::new("a")]);
        let child = ScopeName::module(vec![Name::new("a"), Name::new("b")]);
        assert!(child.is_strict_extension_of(&parent));
        assert!(!parent.is_strict_extension_of(&child));
        assert!(!parent.is_strict_extension_of(&parent));
    }

    #[test]
    fn scope_prefix_invariant_holds_for_function_nesting() {
        let parent = ScopeName::module(vec![Name::new("a")]).extend_function(Name::new("f"));
        let child = parent.extend_function(Name::new("__local_0"));
        assert!(child.is_strict_extension_of(&parent));
    }

    #[test]
    fn prefixes_are_longest_first() {
        let name = ScopeName::module(vec![Name::new("a"), Name::new("b")]);
        let prefixes = name.prefixes();
        assert_eq!(prefixes.first().unwrap(), &name);
        assert_eq!(prefixes.last().unwrap(), &ScopeName::empty());
    }
}

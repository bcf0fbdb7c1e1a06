//! Pragma handling (spec §3 "Pragmas", SPEC_FULL §B). A pragma is a
//! directive the analyzer itself consumes (e.g. toggling diagnostic
//! logging) rather than a value the generated program sees. Unknown
//! pragmas are accepted and ignored rather than rejected, so that newer
//! source can be analyzed by an older toolchain without failing outright,
//! mirrored from `nudl/analysis/module.h`'s tolerant handling of
//! unrecognized top-level directives.

use bitflags::bitflags;
use tracing::warn;

use crate::ast::PragmaAst;

bitflags! {
    /// Analyzer-affecting flags a module can turn on via `pragma` statements.
    #[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
    pub struct PragmaFlags: u8 {
        const LOG_BINDINGS = 1 << 0;
        const DUMP_TYPES = 1 << 1;
    }
}

impl PragmaFlags {
    pub fn log_bindings(&self) -> bool {
        self.contains(PragmaFlags::LOG_BINDINGS)
    }

    pub fn dump_types(&self) -> bool {
        self.contains(PragmaFlags::DUMP_TYPES)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PragmaHandler {
    flags: PragmaFlags,
}

impl PragmaHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flags(&self) -> PragmaFlags {
        self.flags
    }

    /// Applies a single `pragma` AST node, warning (but not failing) on
    /// anything unrecognized.
    pub fn apply(&mut self, pragma: &PragmaAst) {
        match pragma.name.as_str() {
            "log_bindings" => self.flags.insert(PragmaFlags::LOG_BINDINGS),
            "dump_types" => self.flags.insert(PragmaFlags::DUMP_TYPES),
            other => warn!(pragma = other, "ignoring unrecognized pragma"),
        }
    }
}

//! Operator-to-method mapping and `between`/chained-relational desugaring
//! (SPEC_FULL §C). Every operator expression is built as a call to a
//! reserved dunder method on its left (or sole, for unary) operand's type,
//! mirroring `nudl/analysis/function.h`'s `kConstructorName`-style
//! reserved-name constants for operator overloading.

use crate::ast::Operator;

/// The reserved method name backing an operator (`a + b` → `a.__add__(b)`).
pub fn operator_method_name(op: Operator) -> &'static str {
    match op {
        Operator::Add => "__add__",
        Operator::Sub => "__sub__",
        Operator::Mul => "__mul__",
        Operator::Div => "__div__",
        Operator::Mod => "__mod__",
        Operator::Shl => "__lshift__",
        Operator::Shr => "__rshift__",
        Operator::Lt => "__lt__",
        Operator::Gt => "__gt__",
        Operator::Le => "__le__",
        Operator::Ge => "__ge__",
        Operator::Eq => "__eq__",
        Operator::Ne => "__ne__",
        Operator::BitAnd => "__and__",
        Operator::BitXor => "__xor__",
        Operator::BitOr => "__or__",
        Operator::And => "__land__",
        Operator::Xor => "__lxor__",
        Operator::Or => "__lor__",
        Operator::Plus => "__pos__",
        Operator::Neg => "__neg__",
        Operator::BitNot => "__invert__",
        Operator::Not => "__not__",
        Operator::Between => unreachable!("`between` desugars before method dispatch"),
    }
}

/// Whether an operator is unary (one operand) rather than binary.
pub fn is_unary(op: Operator) -> bool {
    matches!(op, Operator::Plus | Operator::Neg | Operator::BitNot | Operator::Not)
}

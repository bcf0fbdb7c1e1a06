//! The AST input contract (spec §6 "AST input"). This module is the
//! *only* place that names the shape the grammar/parser collaborator
//! (explicitly out of scope per spec §1) must hand the analyzer: a
//! serialized message describing a module's top-level elements and their
//! expression trees. Nothing here performs parsing; it is pure data,
//! grounded in the field names `nudl/grammar/dsl.h`'s proto-backed tree
//! hands to `nudl/analysis/scope.h`'s `Build*` family (e.g.
//! `pb::Expression`, `pb::FunctionDefinition`, `pb::CodeInterval`).

use crate::error::CodeContext;
use crate::name::Name;

/// A module's top-level elements, in source order (spec §4.7, §6).
#[derive(Debug, Clone)]
pub struct ModuleAst {
    pub elements: Vec<ModuleElement>,
}

#[derive(Debug, Clone)]
pub struct ModuleElement {
    pub context: CodeContext,
    pub kind: ModuleElementKind,
}

#[derive(Debug, Clone)]
pub enum ModuleElementKind {
    Import(ImportAst),
    Schema(SchemaAst),
    FunctionDefinition(FunctionDefAst),
    Assignment(AssignmentAst),
    Pragma(PragmaAst),
    TypeDefinition(TypeDefAst),
}

#[derive(Debug, Clone)]
pub struct ImportAst {
    pub module_name: Name,
    /// `import foo as bar` binds the module locally under `bar`.
    pub local_name: Option<Name>,
}

#[derive(Debug, Clone)]
pub struct SchemaAst {
    pub name: Name,
    pub fields: Vec<FieldAst>,
}

#[derive(Debug, Clone)]
pub struct FieldAst {
    pub name: Name,
    pub type_expr: TypeAst,
}

#[derive(Debug, Clone)]
pub struct TypeDefAst {
    pub name: Name,
    pub type_expr: TypeAst,
}

#[derive(Debug, Clone)]
pub struct PragmaAst {
    pub name: Name,
    pub args: Vec<String>,
}

/// `param`-qualified assignments become module-level `Parameter` objects
/// rather than plain `Variable`s (spec §4.7).
#[derive(Debug, Clone)]
pub struct AssignmentAst {
    pub name: Name,
    pub declared_type: Option<TypeAst>,
    pub value: ExprAst,
    pub is_param: bool,
}

#[derive(Debug, Clone)]
pub struct FunctionDefAst {
    pub name: Name,
    pub type_params: Vec<TypeParamAst>,
    pub parameters: Vec<ParameterAst>,
    pub result_type: Option<TypeAst>,
    pub result_kind: FunctionResultKindAst,
    pub body: Option<Vec<ExprAst>>,
    pub native_impl: Vec<(String, String)>,
    pub is_main: bool,
    pub is_method: bool,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FunctionResultKindAst {
    Return,
    Yield,
    Pass,
    None,
}

#[derive(Debug, Clone)]
pub struct TypeParamAst {
    pub name: Name,
    pub bound: Option<TypeAst>,
}

#[derive(Debug, Clone)]
pub struct ParameterAst {
    pub name: Name,
    pub type_expr: Option<TypeAst>,
    pub default_value: Option<ExprAst>,
}

/// Type-AST grammar (spec §6): an identifier with optional template
/// parameters, or a local type `{Name}`/`{Name : Bound}`.
#[derive(Debug, Clone)]
pub enum TypeAst {
    Named {
        name: Name,
        scope_prefix: Vec<Name>,
        template_args: Vec<TemplateArgAst>,
    },
    Local {
        name: Name,
        bound: Option<Box<TypeAst>>,
    },
}

#[derive(Debug, Clone)]
pub enum TemplateArgAst {
    Type(TypeAst),
    Int(i64),
}

/// Binary/unary/ternary operators (spec §6 "Operators").
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Xor,
    Or,
    Plus,
    Neg,
    BitNot,
    Not,
    Between,
}

/// A closed sum over expression AST node kinds (spec §6, §3 "Expressions").
#[derive(Debug, Clone)]
pub struct ExprAst {
    pub context: CodeContext,
    pub kind: ExprKindAst,
}

#[derive(Debug, Clone)]
pub enum LiteralAst {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone)]
pub enum ExprKindAst {
    Literal(LiteralAst),
    Identifier {
        scope_prefix: Vec<Name>,
        name: Name,
    },
    EmptyStruct,
    Operator {
        op: Operator,
        operands: Vec<ExprAst>,
    },
    /// `a between b and c`, desugared by the expression builder into a
    /// conjunction of binary comparisons (SPEC_FULL §C).
    Between {
        value: Box<ExprAst>,
        low: Box<ExprAst>,
        high: Box<ExprAst>,
    },
    ArrayDef(Vec<ExprAst>),
    MapDef(Vec<(ExprAst, ExprAst)>),
    TupleDef(Vec<(Option<Name>, ExprAst)>),
    Index {
        object: Box<ExprAst>,
        index: Box<ExprAst>,
    },
    TupleIndex {
        object: Box<ExprAst>,
        index: i64,
    },
    If {
        branches: Vec<(ExprAst, Vec<ExprAst>)>,
        else_branch: Option<Vec<ExprAst>>,
    },
    ExpressionBlock(Vec<ExprAst>),
    Lambda(Box<FunctionDefAst>),
    DotAccess {
        object: Box<ExprAst>,
        name: Name,
    },
    FunctionCall {
        callee: FunctionCallCalleeAst,
        args: Vec<CallArgAst>,
    },
    Assignment {
        name: Name,
        declared_type: Option<TypeAst>,
        value: Box<ExprAst>,
    },
    FunctionResult {
        kind: FunctionResultKindAst,
        value: Option<Box<ExprAst>>,
    },
    Pragma(PragmaAst),
    Nop,
}

#[derive(Debug, Clone)]
pub enum FunctionCallCalleeAst {
    Identifier { scope_prefix: Vec<Name>, name: Name },
    Type(TypeAst),
    Expr(Box<ExprAst>),
}

#[derive(Debug, Clone)]
pub struct CallArgAst {
    pub name: Option<Name>,
    pub value: ExprAst,
}

//! Expression AST nodes.

use crate::ast::stmt::Stmt;
use crate::span::Span;

/// An expression in the AST.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// True for literals the compiler can prove are never hashable.
    pub fn is_unhashable_literal(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Array(_) | ExprKind::Hash(_) | ExprKind::Function { .. }
        )
    }
}

/// All expression variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Integer literal: 42
    IntLiteral(i64),
    /// String literal: "hello"
    StringLiteral(String),
    /// Boolean literal: true, false
    BoolLiteral(bool),
    /// Null literal
    Null,

    /// Name reference: foo
    Identifier(String),

    /// Prefix operation: -x, !x, ~x
    Prefix {
        operator: PrefixOp,
        operand: Box<Expr>,
    },

    /// Infix operation: a + b
    Infix {
        left: Box<Expr>,
        operator: InfixOp,
        right: Box<Expr>,
    },

    /// Conditional expression: if (c) { ... } else { ... }
    If {
        condition: Box<Expr>,
        consequence: Vec<Stmt>,
        alternative: Option<Vec<Stmt>>,
    },

    /// Loop expression: while (c) { ... }. Always evaluates to null.
    While {
        condition: Box<Expr>,
        body: Vec<Stmt>,
    },

    /// Function literal: fn(a, b) { ... }
    ///
    /// `name` is filled in when the literal is the right side of a bind, so
    /// the body can call itself.
    Function {
        name: Option<String>,
        params: Vec<String>,
        body: Vec<Stmt>,
    },

    /// Function call: foo(a, b)
    Call {
        callee: Box<Expr>,
        arguments: Vec<Expr>,
    },

    /// Array literal: [1, 2, 3]
    Array(Vec<Expr>),

    /// Hash literal: {"key": value, ...}
    Hash(Vec<(Expr, Expr)>),

    /// Index access: arr[index], also produced by obj.name
    Index { object: Box<Expr>, index: Box<Expr> },

    /// First declaration: x := 5
    Bind { name: String, value: Box<Expr> },

    /// Mutation of an existing binding or container slot: x = 5, a[i] = 5
    Assign { target: Box<Expr>, value: Box<Expr> },

    /// Module import: import("name")
    Import(Box<Expr>),
}

/// Infix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    BitOr,
    BitXor,
    BitAnd,
    ShiftLeft,
    ShiftRight,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
}

impl std::fmt::Display for InfixOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InfixOp::Add => write!(f, "+"),
            InfixOp::Subtract => write!(f, "-"),
            InfixOp::Multiply => write!(f, "*"),
            InfixOp::Divide => write!(f, "/"),
            InfixOp::Modulo => write!(f, "%"),
            InfixOp::BitOr => write!(f, "|"),
            InfixOp::BitXor => write!(f, "^"),
            InfixOp::BitAnd => write!(f, "&"),
            InfixOp::ShiftLeft => write!(f, "<<"),
            InfixOp::ShiftRight => write!(f, ">>"),
            InfixOp::Equal => write!(f, "=="),
            InfixOp::NotEqual => write!(f, "!="),
            InfixOp::Less => write!(f, "<"),
            InfixOp::LessEqual => write!(f, "<="),
            InfixOp::Greater => write!(f, ">"),
            InfixOp::GreaterEqual => write!(f, ">="),
            InfixOp::And => write!(f, "&&"),
            InfixOp::Or => write!(f, "||"),
        }
    }
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
    Negate,
    Not,
    BitNot,
}

impl std::fmt::Display for PrefixOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrefixOp::Negate => write!(f, "-"),
            PrefixOp::Not => write!(f, "!"),
            PrefixOp::BitNot => write!(f, "~"),
        }
    }
}

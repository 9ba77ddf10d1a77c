use crate::error::Span;
use crate::types::{Param, Type};
use crate::value::Value;

/// Index into `Program::routines`.
pub type RoutineId = usize;

/// Runtime slot that receives assignments to a function's own name.
/// Not a valid identifier, so it cannot collide with user names.
pub const RESULT_SLOT: &str = "$result";

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub name: String,
    /// Program-level constants, already folded.
    pub constants: Vec<(String, Value)>,
    pub variables: Vec<(String, Type)>,
    /// Every function and procedure, including nested ones.
    pub routines: Vec<Routine>,
    pub body: Stmt,
}

/// A function or procedure. `return_type` is `None` for procedures.
#[derive(Debug, Clone, PartialEq)]
pub struct Routine {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<Type>,
    pub locals: Vec<(String, Type)>,
    pub body: Stmt,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexStep {
    pub index: Expr,
    pub low: i64,
    pub high: i64,
    /// Type of the element this step lands on.
    pub item: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Block {
        statements: Vec<Stmt>,
        span: Span,
    },
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        span: Span,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    For {
        variable: String,
        initializer: Box<Stmt>,
        limit: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    Writeln {
        args: Vec<Expr>,
        span: Span,
    },
    Assign {
        name: String,
        value: Expr,
        span: Span,
    },
    /// `a[i] := v`, or `a[i][j] := v` with one step per bracket.
    ArrayWrite {
        name: String,
        path: Vec<IndexStep>,
        value: Expr,
        span: Span,
    },
    ProcedureCall {
        routine: RoutineId,
        name: String,
        args: Vec<Expr>,
        span: Span,
    },
    NoOp {
        span: Span,
    },
}

impl Stmt {
    pub fn span(&self) -> &Span {
        match self {
            Stmt::Block { span, .. } => span,
            Stmt::If { span, .. } => span,
            Stmt::While { span, .. } => span,
            Stmt::For { span, .. } => span,
            Stmt::Writeln { span, .. } => span,
            Stmt::Assign { span, .. } => span,
            Stmt::ArrayWrite { span, .. } => span,
            Stmt::ProcedureCall { span, .. } => span,
            Stmt::NoOp { span } => span,
        }
    }
}

/// An expression together with the static type resolved when it was built.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Type, span: Span) -> Self {
        Self { kind, ty, span }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.kind, ExprKind::Literal(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Value),
    Variable(String),
    /// Integer value widened to Real at an assignment or call boundary.
    ToReal(Box<Expr>),
    Binary {
        left: Box<Expr>,
        operator: BinaryOp,
        right: Box<Expr>,
    },
    Unary {
        operator: UnaryOp,
        operand: Box<Expr>,
    },
    Index {
        array: Box<Expr>,
        index: Box<Expr>,
        low: i64,
        high: i64,
    },
    Call {
        routine: RoutineId,
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    IntDiv,
    Modulo,
    Equal,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::IntDiv => "div",
            BinaryOp::Modulo => "mod",
            BinaryOp::Equal => "=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Negate,
    Not,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Plus => "+",
            UnaryOp::Negate => "-",
            UnaryOp::Not => "not",
        }
    }
}

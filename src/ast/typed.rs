//! Type-annotated syntax tree nodes.
use std::fmt::{self, Display};

use serde::Deserialize;

use super::TypeSpec;

#[derive(Debug, Default, Deserialize)]
pub struct Program {
    pub decls: Vec<Decl>,
}
impl Program {
    pub fn globals(&self) -> impl Iterator<Item = &GlobalDecl> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Global(g) => Some(g),
            Decl::Procedure(_) => None,
        })
    }

    pub fn procedures(&self) -> impl Iterator<Item = &ProcDecl> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Procedure(p) => Some(p),
            Decl::Global(_) => None,
        })
    }
}

#[derive(Debug, Deserialize)]
pub enum Decl {
    Global(GlobalDecl),
    Procedure(ProcDecl),
}

/// A global variable. Globals are initialised with a constant.
#[derive(Debug, Deserialize)]
pub struct GlobalDecl {
    pub name: String,
    pub ty: TypeSpec,
    pub init: Literal,
}
impl Display for GlobalDecl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "var {} = {} : {};", self.name, self.init, self.ty)
    }
}

#[derive(Debug, Deserialize)]
pub struct ProcDecl {
    pub name: String,
    pub params: Vec<Param>,
    #[serde(default = "void")]
    pub ret_ty: TypeSpec,
    pub body: Block,
}

impl Display for ProcDecl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let params = self
            .params
            .iter()
            .map(|p| format!("{}: {}", p.name, p.ty))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "def {}({}) : {}", self.name, params, self.ret_ty)
    }
}

fn void() -> TypeSpec {
    TypeSpec::Void
}

#[derive(Debug, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: TypeSpec,
}

#[derive(Debug, Default, Deserialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Deserialize)]
pub enum Stmt {
    VarDecl {
        name: String,
        ty: TypeSpec,
        init: Expr,
    },
    Assign {
        name: String,
        value: Expr,
    },
    Eval(Expr),
    Block(Block),
    IfElse {
        cond: Expr,
        then_block: Block,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    Break,
    Continue,
    Return(Option<Expr>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: TypeSpec,
}
impl Expr {
    pub fn new(kind: ExprKind, ty: TypeSpec) -> Self {
        Self { kind, ty }
    }
}
impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub enum ExprKind {
    Variable(String),
    Int(i64),
    Bool(bool),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}
impl Display for ExprKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ExprKind::*;
        match self {
            Variable(name) => f.write_str(name),
            Int(i) => write!(f, "{}", i),
            Bool(b) => write!(f, "{}", b),
            Unary(op, rhs) => write!(f, "({}{})", op, rhs),
            Binary(op, lhs, rhs) => write!(f, "({} {} {})", lhs, op, rhs),
            Call(name, args) => {
                let args = args
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{}({})", name, args)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum Literal {
    Int(i64),
    Bool(bool),
}
impl Literal {
    pub fn value(self) -> i64 {
        match self {
            Literal::Int(i) => i,
            Literal::Bool(b) => b as i64,
        }
    }
}
impl Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Bool(b) => write!(f, "{}", b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum UnOp {
    /// Arithmetic negation.
    Negate,
    /// Bitwise complement.
    BitNot,
    /// Boolean negation.
    Not,
}
impl Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            UnOp::Negate => "-",
            UnOp::BitNot => "~",
            UnOp::Not => "!",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum BinOp {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,
    // Bitwise
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    // Boolean
    And,
    Or,
    // Comparison
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}
impl BinOp {
    pub fn is_comparison(&self) -> bool {
        use BinOp::*;
        matches!(
            self,
            Equal | NotEqual | Less | LessEqual | Greater | GreaterEqual
        )
    }
}
impl Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use BinOp::*;
        f.write_str(match self {
            Add => "+",
            Subtract => "-",
            Multiply => "*",
            Divide => "/",
            Modulus => "%",
            BitAnd => "&",
            BitOr => "|",
            BitXor => "^",
            Shl => "<<",
            Shr => ">>",
            And => "&&",
            Or => "||",
            Equal => "==",
            NotEqual => "!=",
            Less => "<",
            LessEqual => "<=",
            Greater => ">",
            GreaterEqual => ">=",
        })
    }
}

//! Shorthand constructors for building syntax trees in tests.
use super::{typed::*, TypeSpec};

pub fn int(value: i64) -> Expr {
    Expr::new(ExprKind::Int(value), TypeSpec::Int)
}

pub fn boolean(value: bool) -> Expr {
    Expr::new(ExprKind::Bool(value), TypeSpec::Bool)
}

pub fn var(name: &str) -> Expr {
    Expr::new(ExprKind::Variable(name.to_string()), TypeSpec::Int)
}

pub fn bool_var(name: &str) -> Expr {
    Expr::new(ExprKind::Variable(name.to_string()), TypeSpec::Bool)
}

pub fn bin(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    let ty = if op.is_comparison() || matches!(op, BinOp::And | BinOp::Or) {
        TypeSpec::Bool
    } else {
        TypeSpec::Int
    };
    Expr::new(ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)), ty)
}

pub fn not(expr: Expr) -> Expr {
    Expr::new(ExprKind::Unary(UnOp::Not, Box::new(expr)), TypeSpec::Bool)
}

pub fn neg(expr: Expr) -> Expr {
    Expr::new(ExprKind::Unary(UnOp::Negate, Box::new(expr)), TypeSpec::Int)
}

pub fn call(name: &str, args: Vec<Expr>, ty: TypeSpec) -> Expr {
    Expr::new(ExprKind::Call(name.to_string(), args), ty)
}

pub fn print(expr: Expr) -> Stmt {
    Stmt::Eval(call("print", vec![expr], TypeSpec::Void))
}

pub fn decl(name: &str, init: Expr) -> Stmt {
    Stmt::VarDecl {
        name: name.to_string(),
        ty: init.ty,
        init,
    }
}

pub fn assign(name: &str, value: Expr) -> Stmt {
    Stmt::Assign {
        name: name.to_string(),
        value,
    }
}

pub fn block(stmts: Vec<Stmt>) -> Block {
    Block { stmts }
}

pub fn if_else(cond: Expr, then_stmts: Vec<Stmt>, else_stmts: Vec<Stmt>) -> Stmt {
    Stmt::IfElse {
        cond,
        then_block: block(then_stmts),
        else_branch: Some(Box::new(Stmt::Block(block(else_stmts)))),
    }
}

pub fn while_loop(cond: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::While {
        cond,
        body: block(body),
    }
}

pub fn ret(expr: Option<Expr>) -> Stmt {
    Stmt::Return(expr)
}

pub fn procedure(name: &str, params: &[&str], ret_ty: TypeSpec, stmts: Vec<Stmt>) -> Decl {
    Decl::Procedure(ProcDecl {
        name: name.to_string(),
        params: params
            .iter()
            .map(|p| Param {
                name: p.to_string(),
                ty: TypeSpec::Int,
            })
            .collect(),
        ret_ty,
        body: block(stmts),
    })
}

pub fn global(name: &str, init: i64) -> Decl {
    Decl::Global(GlobalDecl {
        name: name.to_string(),
        ty: TypeSpec::Int,
        init: Literal::Int(init),
    })
}

/// A program consisting of a single `main` procedure.
pub fn main_program(stmts: Vec<Stmt>) -> Program {
    Program {
        decls: vec![procedure("main", &[], TypeSpec::Void, stmts)],
    }
}

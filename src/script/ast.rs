//! AST for the scripting sub-language: a small statement layer sitting
//! on top of the shared expression grammar (`crate::expr::ast::Expr`).

use crate::expr::ast::Expr;

#[derive(Debug, Clone)]
pub enum Stmt {
    /// A bare call expression, e.g. `install_packages('curl')`.
    Expr(Expr),
    /// `name = expr`. Assigns a script-local variable (distinct from the
    /// build context; only `set_variable(...)` reaches the context).
    Assign(String, Expr),
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        else_branch: Option<Vec<Stmt>>,
    },
    For {
        target: String,
        iter: Expr,
        body: Vec<Stmt>,
    },
    Pass,
}

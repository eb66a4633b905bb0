//! The expression engine: a Python/Jinja-like mini-language over a typed
//! value system, used both directly (template `{{ }}`/`{% %}` tags) and
//! as the value space for the embedded scripting engine.

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod value;

pub use eval::{eval, Environment};
pub use parser::parse;
pub use value::Value;

//! The embedded imperative scripting sub-language (§4.6). Python-subset
//! syntax is the reference; statements are parsed line-by-line with
//! Python-style indentation blocks and executed against a `ScriptHost`
//! that exposes the fixed set of build-mutating built-ins.

pub mod ast;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod value;

pub use interp::{run, ScriptHost};
pub use parser::parse;

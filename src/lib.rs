// Minipas Interpreter Library
//
// Front-end and tree-walking interpreter for a small Pascal-like language:
// the parser resolves names, checks types and folds constants while it
// builds the tree, and the evaluator runs that tree directly.

// Public modules
pub mod ast;
pub mod error;
pub mod evaluator;
pub mod lexer;
pub mod parser;
pub mod runner;
pub mod symbol;
pub mod types;
pub mod value;

// Re-export commonly used items
pub use ast::{Expr, Program, Stmt};
pub use error::{ErrorKind, PascalError, Span};
pub use evaluator::{Environment, Evaluator, OutputSink, StdoutSink};
pub use lexer::{Lexer, Token, TokenType};
pub use parser::Parser;
pub use types::Type;
pub use value::Value;

// Re-export main functions
pub use runner::{check, interpret, run};

//! Parser for the system description language.
//!
//! A line-oriented, SPICE-flavoured language for describing equation
//! systems. Devices contribute constraints that are solved symbolically;
//! explicit formulas, delays and iteration groups are written directly.
//!
//! # Grammar Overview
//!
//! ```text
//! system      = { line }
//! line        = comment | directive | component | formula | empty
//! comment     = ('#' | ';') { any_char }
//! directive   = '.' directive_name { argument }
//! component   = type name node+ [value] [model_ref] { key '=' number }
//! formula     = quantity '=' expr
//! quantity    = identifier [ '(' expr { ',' expr } ')' ]
//!
//! expr        = additive [ ('==' | '!=' | '<' | '<=' | '>' | '>=') additive ]
//! additive    = term { ('+' | '-') term }
//! term        = unary { ('*' | '/') unary }
//! unary       = ('-' | '!') unary | power
//! power       = primary [ '^' unary ]
//! primary     = number | identifier [ '(' args ')' ] | '(' expr ')'
//!
//! number      = digit+ ['.' digit+] [('e'|'E') ['-'|'+'] digit+] [unit_suffix]
//! unit_suffix = 'p' | 'n' | 'u' | 'm' | 'k' | 'M' | 'G'
//! identifier  = (letter | '_') { letter | digit | '_' }
//! ```
//!
//! Calls to builtin names (`exp`, `tanh`, `limit`, ...) use the native
//! functions; calls to `.func` definitions are inlined when compiled; any
//! other call such as `V_in(t0)` names a quantity.
//!
//! # Components
//!
//! | Type | Description | Syntax |
//! |------|-------------|--------|
//! | R | Resistor | `R<name> <n+> <n-> <value>` |
//! | D | Diode | `D<name> <anode> <cathode> [model] [is=..] [n=..]` |
//! | DELAY | One-sample delay | `DELAY <name> <in> <out>` |
//!
//! # Directives
//!
//! | Directive | Description | Syntax |
//! |-----------|-------------|--------|
//! | .input | Drive nodes from outside | `.input <node>...` |
//! | .state | Declare a state slot | `.state <name> [initial]` |
//! | .history | One-sample delay pair | `.history <current> <previous>` |
//! | .iterate | Solve unknowns by bounded iteration | `.iterate <unknown>...` |
//! | .output | Quantities to report | `.output <expr>...` |
//! | .func | Define an inlinable function | `.func <name>(<params>) = <expr>` |
//! | .model | Define a diode model | `.model <name> D (<params>)` |
//!
//! # Example
//!
//! ```text
//! # Unit delay into a load; V_in(t0) gets its history slot automatically
//! .input in
//! .output V_out(t)
//!
//! DELAY B1 in out
//! R1 out 0 10k
//! ```

mod ast;
mod lexer;
mod parser;

pub use ast::*;
pub use lexer::{parse_value, Lexer, Token, TokenKind};
pub use parser::Parser;

use crate::error::Result;
use crate::expr::Expr;

/// Parse a system description string into an AST.
pub fn parse(input: &str) -> Result<SystemAst> {
    let lexer = Lexer::new(input);
    let mut parser = Parser::new(lexer)?;
    parser.parse()
}

/// Parse a single expression such as `a*b + exp(-x)`.
pub fn parse_expr(input: &str) -> Result<Expr> {
    let mut parser = Parser::new(Lexer::new(input))?;
    parser.parse_standalone_expr()
}

/// Parse a system description file.
#[cfg(feature = "cli")]
pub fn parse_file(path: &std::path::Path) -> Result<SystemAst> {
    let content =
        std::fs::read_to_string(path).map_err(|e| crate::error::AlgebraError::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;
    parse(&content)
}

//! Error types for the Pedaler algebra compiler.
//!
//! This module provides a unified error type [`AlgebraError`] that covers
//! all error conditions that can occur while parsing system descriptions,
//! manipulating expressions, and lowering solved systems into routines.
//!
//! Expected negative outcomes are not errors: a native function that does not
//! apply to its arguments returns `Ok(None)`, and a scope miss returns `None`.

use thiserror::Error;

use crate::native::RoutineError;

/// Result type alias using [`AlgebraError`].
pub type Result<T> = std::result::Result<T, AlgebraError>;

/// Unified error type for all Pedaler algebra operations.
#[derive(Error, Debug)]
pub enum AlgebraError {
    // ============ DSL Parsing Errors ============
    /// Error during lexical analysis
    #[error("Lexer error at line {line}, column {column}: {message}")]
    LexerError {
        line: usize,
        column: usize,
        message: String,
    },

    /// Error during parsing
    #[error("Parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    // ============ System Description Errors ============
    /// Invalid component definition
    #[error("Invalid component '{name}' at line {line}: {message}")]
    InvalidComponent {
        name: String,
        line: usize,
        message: String,
    },

    /// Unknown component type
    #[error("Unknown component type '{component_type}' at line {line}")]
    UnknownComponentType { component_type: String, line: usize },

    /// Duplicate component name
    #[error("Duplicate component name '{name}'")]
    DuplicateComponent { name: String },

    /// Duplicate model name
    #[error("Duplicate model name '{name}'")]
    DuplicateModel { name: String },

    /// A quantity is given an explicit formula twice
    #[error("Duplicate formula for '{unknown}' at line {line}")]
    DuplicateFormula { unknown: String, line: usize },

    // ============ Expression Errors ============
    /// An operation this core deliberately does not implement
    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },

    /// A wrapped native routine failed; the routine's own error is preserved
    #[error(transparent)]
    Routine(RoutineError),

    /// An expression has the wrong shape for the requested operation
    #[error("Invalid expression '{expr}': {message}")]
    InvalidExpression { expr: String, message: String },

    // ============ Solving Errors ============
    /// An equation could not be turned into an explicit formula
    #[error("Cannot solve for '{unknown}': {message}")]
    Unsolvable { unknown: String, message: String },

    // ============ Compilation Errors ============
    /// A formula references a quantity with no reachable declaration
    #[error("Unresolved symbol '{symbol}' - not declared in the state layout")]
    UnresolvedSymbol { symbol: String },

    /// A call targets a function that can be neither invoked nor inlined
    #[error("No lowering strategy for function '{function}'")]
    NoLoweringStrategy { function: String },

    /// The solved system is circular or incomplete
    #[error("Malformed system: {message}")]
    MalformedSystem { message: String },

    /// The state vector handed to a routine does not match its layout
    #[error("State vector has {actual} slots, routine expects {expected}")]
    StateSize { expected: usize, actual: usize },

    // ============ I/O Errors ============
    /// Error reading a system description file
    #[error("Failed to read system file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Error reading input samples
    #[error("Sample input error: {message}")]
    StreamInputError { message: String },

    /// Error writing output samples
    #[error("Sample output error: {message}")]
    StreamOutputError { message: String },

    // ============ WASM Errors ============
    /// WASM-specific error
    #[cfg(feature = "wasm")]
    #[error("WASM error: {message}")]
    WasmError { message: String },
}

impl AlgebraError {
    /// Create a lexer error
    pub fn lexer(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::LexerError {
            line,
            column,
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::ParseError {
            line,
            message: message.into(),
        }
    }

    /// Create an invalid component error
    pub fn invalid_component(name: &str, line: usize, message: impl Into<String>) -> Self {
        Self::InvalidComponent {
            name: name.to_string(),
            line,
            message: message.into(),
        }
    }

    /// Create an unsupported-operation error
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Create a malformed-system error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedSystem {
            message: message.into(),
        }
    }

    /// Create an unresolved-symbol error
    pub fn unresolved(symbol: impl ToString) -> Self {
        Self::UnresolvedSymbol {
            symbol: symbol.to_string(),
        }
    }

    /// Create an unsolvable-equation error
    pub fn unsolvable(unknown: impl ToString, message: impl Into<String>) -> Self {
        Self::Unsolvable {
            unknown: unknown.to_string(),
            message: message.into(),
        }
    }

    /// The native routine's own error, if this is a routine failure.
    pub fn routine_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Routine(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

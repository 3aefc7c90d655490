//! LiSP - a small Scheme-like evaluator with a self-testing mode
//!
//! This crate provides a minimal Scheme interpreter in the spirit of lis.py and
//! SICP's metacircular evaluator: a single floating-point number type, lists
//! represented as arrays, lexically scoped closures over shared mutable frames,
//! and a fixed set of special forms.
//!
//! ```scheme
//! (define (square x) (* x x))   ; procedure definition
//! (square 12)                    ; => 144
//! (car '(1 2 3))                 ; => 1
//! (if (< 1 2) "yes" "no")        ; => "yes"
//! ```
//!
//! ## Read-Eval-Read-Compare
//!
//! Besides the usual REPL, the interpreter can run a script of
//! `expression expected-value` pairs and report every pair whose evaluated
//! expression does not match the (unevaluated) expected datum:
//!
//! ```scheme
//! (+ 1 2)          3     ; value must be equal? to 3
//! (car '())        ***   ; evaluation must fail
//! (define x 5)     ---   ; any successful result is fine
//! ```
//!
//! ## Limitations
//!
//! There is no tail-call elimination: every nested Scheme call consumes host
//! stack, so sufficiently deep recursion will exhaust the native stack.
//!
//! ## Modules
//!
//! - `ast`: the value model and its canonical printer
//! - `scan`: token stream and line sources (files, strings, console)
//! - `reader`: recursive-descent datum reader
//! - `evaluator`: environments, `eval` and `apply`
//! - `builtinops`: primitive procedures and special-form table
//! - `repl`: the read-eval boundary and the interactive loop
//! - `rerc`: the read-eval-read-compare protocol

use std::fmt;

use crate::ast::Value;

/// Categorizes the different kinds of read failures.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ReadErrorKind {
    /// Input ended while a list was still open
    Unterminated,
    /// A `)` with no list to close
    UnexpectedCloseParen,
    /// A numeric token that does not denote a float
    InvalidNumber,
    /// A `'` with nothing after it
    MissingQuotedDatum,
}

/// A read failure, carrying whatever could be salvaged from the input.
#[derive(Debug, PartialEq, Clone)]
pub struct ReadError {
    pub kind: ReadErrorKind,
    pub message: String,
    /// Best-effort partial datum (for unterminated lists)
    pub partial: Option<Value>,
}

impl ReadError {
    pub fn new(kind: ReadErrorKind, message: impl Into<String>) -> Self {
        ReadError {
            kind,
            message: message.into(),
            partial: None,
        }
    }

    pub fn with_partial(kind: ReadErrorKind, message: impl Into<String>, partial: Value) -> Self {
        ReadError {
            kind,
            message: message.into(),
            partial: Some(partial),
        }
    }
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("ReadError: {0}")]
    Read(ReadError),
    #[error("Undefined symbol: {0}")]
    UnboundSymbol(String),
    #[error("Type error: {0}")]
    TypeError(String),
    #[error("EvaluationError: {0}")]
    EvalError(String),
    #[error("Malformed special form: {0}")]
    MalformedForm(String),
    #[error("{}", describe_arity(.expected, .got, .expression))]
    ArityError {
        expected: String,
        got: usize,
        expression: Option<String>,
    },
    #[error("Cannot apply non-procedure: {0}")]
    NotApplicable(String),
    #[error("Unknown expression type: {0}")]
    UnknownExpression(String),
    #[error("I/O error: {0}")]
    Io(String),
}

fn describe_arity(expected: &str, got: &usize, expression: &Option<String>) -> String {
    match expression {
        Some(expr) => format!("ArityError: {expr}: expected {expected} arguments, got {got}"),
        None => format!("ArityError: expected {expected} arguments, got {got}"),
    }
}

impl Error {
    /// Create an ArityError without expression context
    pub fn arity_error(expected: impl fmt::Display, got: usize) -> Self {
        Error::ArityError {
            expected: expected.to_string(),
            got,
            expression: None,
        }
    }

    /// Create an ArityError naming the operator or form that was misapplied
    pub fn arity_error_with_expr(expected: impl fmt::Display, got: usize, expression: String) -> Self {
        Error::ArityError {
            expected: expected.to_string(),
            got,
            expression: Some(expression),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<ReadError> for Error {
    fn from(err: ReadError) -> Self {
        Error::Read(err)
    }
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod reader;
pub mod repl;
pub mod rerc;
pub mod scan;

//! This module defines the value model shared by the reader, the evaluator and the
//! printer. The main enum, [`Value`], is a closed set of variants: numbers, symbols,
//! arrays, strings, characters, booleans, user procedures, primitives, and the
//! sentinel results of side-effecting forms. An [`Value::Array`] doubles as code
//! (an s-expression before evaluation) and as list data (after evaluation); nothing
//! but its position and the evaluation context tells the two apart.
//!
//! Frames and procedures are garbage-collected with the `gc` crate, because a
//! recursively defined procedure lives inside the very frame it closes over.
//!
//! The `Display` implementation is the canonical printer: its output reads back
//! as a structurally equal datum for every value the reader can produce.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use gc::{Finalize, Gc, Trace, unsafe_empty_trace};

use crate::builtinops::BuiltinOp;
use crate::evaluator::Environment;

/// Type alias for number values in interpreter
pub type NumberType = f64;

/// Characters with a name in `#\name` syntax, in printing preference order
pub(crate) const CHAR_NAMES: &[(&str, char)] = &[
    ("nul", '\0'),
    ("alarm", '\u{7}'),
    ("backspace", '\u{8}'),
    ("tab", '\t'),
    ("newline", '\n'),
    ("linefeed", '\n'),
    ("return", '\r'),
    ("escape", '\u{1b}'),
    ("space", ' '),
    ("delete", '\u{7f}'),
];

thread_local! {
    static SYMBOL_TABLE: RefCell<HashSet<Rc<str>>> = RefCell::new(HashSet::new());
}

/// An interned symbol name
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(Rc<str>);

impl Symbol {
    pub fn new(name: &str) -> Self {
        SYMBOL_TABLE.with(|table| {
            let mut table = table.borrow_mut();
            if let Some(existing) = table.get(name) {
                return Symbol(Rc::clone(existing));
            }
            let interned: Rc<str> = Rc::from(name);
            table.insert(Rc::clone(&interned));
            Symbol(interned)
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

unsafe impl Trace for Symbol {
    unsafe_empty_trace!();
}

impl Finalize for Symbol {}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parameter specification of a user procedure
#[derive(Debug, Clone, PartialEq, Trace, Finalize)]
pub enum Params {
    /// `(lambda (a b c) ...)`: one argument per name
    Fixed(Vec<Symbol>),
    /// `(lambda args ...)`: the whole argument sequence bound to one name
    Variadic(Symbol),
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Params::Fixed(names) => {
                write!(f, "(")?;
                for (i, name) in names.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{name}")?;
                }
                write!(f, ")")
            }
            Params::Variadic(name) => write!(f, "{name}"),
        }
    }
}

/// A user-defined procedure: parameters, a single body form and the frame it closes over
#[derive(Trace, Finalize)]
pub struct Procedure {
    pub params: Params,
    pub body: Value,
    pub env: Environment,
}

/// A native procedure from the builtin registry
#[derive(Clone, Copy)]
pub struct Primitive(pub &'static BuiltinOp);

unsafe impl Trace for Primitive {
    unsafe_empty_trace!();
}

impl Finalize for Primitive {}

impl Primitive {
    pub fn name(&self) -> &'static str {
        self.0.scheme_id
    }
}

/// The "no useful result" produced by side-effecting special forms
#[derive(Debug, Clone, Trace, Finalize)]
pub enum Unspecified {
    /// Result of `set!`
    Set,
    /// Result of `define`, naming the symbol that was bound
    Define(Symbol),
}

/// Core value type in interpreter
///
/// To build values in tests, use the helper functions:
/// - `val(42)` for values, `sym("name")` for symbols, `nil()` for empty arrays
/// - `val([1, 2, 3])` for homogeneous arrays
/// - `val(vec![sym("op"), val(42)])` for mixed arrays
#[derive(Clone, Trace, Finalize)]
pub enum Value {
    /// Double-precision numbers (the only numeric type)
    Flonum(NumberType),
    /// Symbols (identifiers)
    Symbol(Symbol),
    /// Ordered sequences: code forms before evaluation, list data after
    Array(Vec<Value>),
    /// String literals
    String(String),
    /// Character literals
    Char(char),
    /// Boolean values
    Bool(bool),
    /// User-defined procedures (compared by identity)
    Procedure(Gc<Procedure>),
    /// Built-in procedures (compared by identity)
    Primitive(Primitive),
    /// Sentinel results of `define` and `set!`; never equal to anything
    Unspecified(Unspecified),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Flonum(n) => write!(f, "Flonum({n})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Char(c) => write!(f, "Char({c:?})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Array(items) => {
                write!(f, "Array(")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, ")")
            }
            Value::Procedure(procedure) => {
                write!(f, "Procedure(params={}, body={:?})", procedure.params, procedure.body)
            }
            Value::Primitive(prim) => write!(f, "Primitive({})", prim.name()),
            Value::Unspecified(what) => write!(f, "Unspecified({what:?})"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Char(c)
    }
}

impl From<Symbol> for Value {
    fn from(s: Symbol) -> Self {
        Value::Symbol(s)
    }
}

macro_rules! impl_from_number {
    ($num_type:ty) => {
        impl From<$num_type> for Value {
            fn from(n: $num_type) -> Self {
                Value::Flonum(n as NumberType)
            }
        }
    };
}

impl_from_number!(i32);
impl_from_number!(i64);
impl_from_number!(u32);
impl_from_number!(f32);
impl_from_number!(NumberType);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(|x| x.into()).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::Array(arr.into_iter().map(|x| x.into()).collect())
    }
}

/// Helper function for creating symbols
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(Symbol::new(name.as_ref()))
}

/// Helper function for creating Values from anything convertible
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for creating the empty array
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn nil() -> Value {
    Value::Array(vec![])
}

impl Value {
    /// Check if a value is the empty array
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Array(items) if items.is_empty())
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// Short name of the variant, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Flonum(_) => "number",
            Value::Symbol(_) => "symbol",
            Value::Array(_) => "list",
            Value::String(_) => "string",
            Value::Char(_) => "char",
            Value::Bool(_) => "boolean",
            Value::Procedure(_) => "procedure",
            Value::Primitive(_) => "primitive",
            Value::Unspecified(_) => "unspecified",
        }
    }
}

fn write_char_literal(f: &mut fmt::Formatter<'_>, c: char) -> fmt::Result {
    if let Some((name, _)) = CHAR_NAMES.iter().find(|(_, named)| *named == c) {
        return write!(f, "#\\{name}");
    }
    if c.is_control() || c.is_whitespace() || matches!(c, '\u{200b}'..='\u{200f}' | '\u{feff}') {
        write!(f, "#\\x{:x}", c as u32)
    } else {
        write!(f, "#\\{c}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Flonum(n) => write!(f, "{n}"),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::String(s) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '\r' => write!(f, "\\r")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
            Value::Char(c) => write_char_literal(f, *c),
            Value::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::Array(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Value::Procedure(procedure) => write!(f, "#<procedure {}>", procedure.params),
            Value::Primitive(prim) => write!(f, "#<primitive {}>", prim.name()),
            Value::Unspecified(Unspecified::Set) => write!(f, "#<set!>"),
            Value::Unspecified(Unspecified::Define(name)) => {
                write!(f, "#<undefined-value, defining {name}>")
            }
        }
    }
}

/// Deep structural equality, as used by `equal?` and by Rerc comparisons.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Flonum(a), Value::Flonum(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Procedure(a), Value::Procedure(b)) => Gc::ptr_eq(a, b),
            (Value::Primitive(a), Value::Primitive(b)) => std::ptr::eq(a.0, b.0),
            (Value::Unspecified(_), _) | (_, Value::Unspecified(_)) => false,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helper_functions_data_driven() {
        let test_cases = vec![
            (val(42), Value::Flonum(42.0)),
            (val(-17), Value::Flonum(-17.0)),
            (val(2.5), Value::Flonum(2.5)),
            (val(true), Value::Bool(true)),
            (val('x'), Value::Char('x')),
            (val("hello"), Value::String("hello".to_owned())),
            (sym("set!"), Value::Symbol(Symbol::new("set!"))),
            (nil(), Value::Array(vec![])),
            (
                val([1, 2, 3]),
                Value::Array(vec![
                    Value::Flonum(1.0),
                    Value::Flonum(2.0),
                    Value::Flonum(3.0),
                ]),
            ),
            (
                val(vec![sym("quote"), val(vec![val(1), nil()])]),
                Value::Array(vec![
                    Value::Symbol(Symbol::new("quote")),
                    Value::Array(vec![Value::Flonum(1.0), Value::Array(vec![])]),
                ]),
            ),
        ];

        for (i, (actual, expected)) in test_cases.iter().enumerate() {
            assert_eq!(actual, expected, "Test case {} failed", i + 1);
        }
    }

    #[test]
    fn test_symbols_are_interned() {
        let a = Symbol::new("lambda");
        let b = Symbol::new("lambda");
        assert!(Rc::ptr_eq(&a.0, &b.0));
        assert_ne!(a, Symbol::new("lambda2"));
    }

    #[test]
    fn test_render_data_driven() {
        let test_cases = vec![
            (val(6), "6"),
            (val(0.5), "0.5"),
            (val(-2.25), "-2.25"),
            (sym("foo-bar?"), "foo-bar?"),
            (val("a \"quoted\"\nline"), "\"a \\\"quoted\\\"\\nline\""),
            (val('a'), "#\\a"),
            (val('\n'), "#\\newline"),
            (val(' '), "#\\space"),
            (val('\t'), "#\\tab"),
            (val('\u{1}'), "#\\x1"),
            (val('\u{a0}'), "#\\xa0"),
            (val(true), "#t"),
            (val(false), "#f"),
            (nil(), "()"),
            (val(vec![val(1), val(vec![val(2), val(3)]), val("x")]), "(1 (2 3) \"x\")"),
            (Value::Unspecified(Unspecified::Set), "#<set!>"),
            (
                Value::Unspecified(Unspecified::Define(Symbol::new("x"))),
                "#<undefined-value, defining x>",
            ),
        ];

        for (i, (value, expected)) in test_cases.iter().enumerate() {
            assert_eq!(format!("{value}"), *expected, "Render case {} failed", i + 1);
        }
    }

    #[test]
    fn test_deep_equality() {
        assert_eq!(val(vec![val(1), val(vec![val("a")])]), val(vec![val(1), val(vec![val("a")])]));
        assert_ne!(val(vec![val(1), val(2)]), val(vec![val(1), val(3)]));
        assert_ne!(val(vec![val(1)]), val(vec![val(1), val(1)]));
        assert_ne!(val(1), val("1"));
        assert_ne!(sym("a"), val("a"));
    }

    #[test]
    fn test_unspecified_values() {
        let unspec = Value::Unspecified(Unspecified::Set);
        let same = unspec.clone();
        assert_ne!(unspec, same);
        assert_ne!(unspec, Value::Unspecified(Unspecified::Set));
        assert_ne!(unspec, val(42));
    }
}

//! Built-in operations registry.
//!
//! Primitive procedures and special forms are defined once in a static table,
//! each entry carrying its Scheme identifier, its implementation and its arity.
//!
//! ```scheme
//! (+ 1 2 3)            ; => 6
//! (cons 1 '(2 3))      ; => (1 2 3)
//! (equal? '(a) '(a))   ; => #t
//! ```
//!
//! ## Functions vs Special Forms
//!
//! - **Primitives**: receive their arguments already evaluated (e.g., `+`, `car`, `not`)
//! - **Special Forms**: receive their operands unevaluated together with the
//!   environment (e.g., `if`, `define`, `lambda`)
//!
//! Special forms are looked up by the evaluator purely by the head keyword of a
//! form, so rebinding `if` or `quote` as a variable does not change how such a
//! form is evaluated. Primitives are bound as ordinary values in the global
//! environment and can be passed around, rebound or shadowed.
//!
//! ## Error Handling
//!
//! - **Type Safety**: Operations reject incorrect types (e.g., `(not 0)` errors)
//! - **No Truthiness**: `if` and `not` accept only booleans
//! - **Arity Checking**: Argument counts are validated against the table before
//!   the implementation runs
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** following the signature `fn(args: &[Value]) -> Result<Value, Error>`
//! 2. **Add to BUILTIN_OPS** with its Scheme identifier and arity
//! 3. **Add tests** covering edge cases and error conditions

use crate::Error;
use crate::ast::{NumberType, Primitive, Symbol, Value};
use crate::evaluator::{
    Arity, Environment, eval, eval_apply, eval_begin, eval_define, eval_if, eval_lambda,
    eval_quote, eval_set,
};
use crate::reader::read;
use crate::scan::Scanner;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Signature shared by all primitive procedures
pub type PrimitiveFn = fn(&[Value]) -> Result<Value, Error>;

/// Signature shared by all special forms: unevaluated operands, environment and evaluation depth
pub type SpecialFormFn = fn(&[Value], &Environment, usize) -> Result<Value, Error>;

/// Represents the implementation of a built-in expression (primitive or special form)
#[derive(Clone, Copy)]
pub enum OpKind {
    /// Regular procedure that takes evaluated arguments and returns a value
    Primitive(PrimitiveFn),
    /// Special form that controls the evaluation of its operands
    SpecialForm(SpecialFormFn),
}

impl std::fmt::Debug for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Primitive(_) => write!(f, "Primitive(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    /// The Scheme identifier for this operation
    pub scheme_id: &'static str,
    /// The implementation of this operation (primitive or special form)
    pub op_kind: OpKind,
    /// Expected number of arguments
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        // scheme_id uniquely identifies an entry
        self.scheme_id == other.scheme_id
    }
}

impl BuiltinOp {
    /// Check if this operation is a special form
    pub fn is_special_form(&self) -> bool {
        matches!(self.op_kind, OpKind::SpecialForm(_))
    }
}

//
// Builtin Function Implementations
//

/// Iterator over the numeric arguments of `op`, failing on the first non-number
struct NumIter<'a> {
    op: &'static str,
    args: std::slice::Iter<'a, Value>,
}

impl<'a> NumIter<'a> {
    fn new(op: &'static str, args: &'a [Value]) -> Self {
        NumIter {
            op,
            args: args.iter(),
        }
    }
}

impl Iterator for NumIter<'_> {
    type Item = Result<NumberType, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.args.next().map(|arg| match arg {
            Value::Flonum(n) => Ok(*n),
            other => Err(Error::TypeError(format!(
                "{} requires numbers, got {}: {other}",
                self.op,
                other.type_name()
            ))),
        })
    }
}

// Left fold over one or more numbers. A single operand is returned unchanged,
// so (- 7) is 7 and (/ 4) is 4.
macro_rules! numeric_fold {
    ($name:ident, $op:tt, $op_str:expr) => {
        fn $name(args: &[Value]) -> Result<Value, Error> {
            let mut nums = NumIter::new($op_str, args);
            let first = match nums.next() {
                Some(first) => first?,
                None => return Err(Error::arity_error_with_expr(Arity::AtLeast(1), 0, $op_str.to_owned())),
            };
            let result = nums.try_fold(first, |acc, n| n.map(|n| acc $op n))?;
            Ok(Value::Flonum(result))
        }
    };
}

numeric_fold!(builtin_add, +, "+");
numeric_fold!(builtin_sub, -, "-");
numeric_fold!(builtin_mul, *, "*");
numeric_fold!(builtin_div, /, "/");

// Binary numeric comparisons
macro_rules! numeric_comparison {
    ($name:ident, $op:tt, $op_str:expr) => {
        fn $name(args: &[Value]) -> Result<Value, Error> {
            let nums = NumIter::new($op_str, args).collect::<Result<Vec<_>, _>>()?;
            match nums.as_slice() {
                [a, b] => Ok(Value::Bool(a $op b)),
                _ => Err(Error::arity_error_with_expr(2, nums.len(), $op_str.to_owned())),
            }
        }
    };
}

numeric_comparison!(builtin_lt, <, "<");
numeric_comparison!(builtin_le, <=, "<=");
numeric_comparison!(builtin_gt, >, ">");
numeric_comparison!(builtin_ge, >=, ">=");

fn builtin_equal(args: &[Value]) -> Result<Value, Error> {
    match args {
        [a, b] => Ok(Value::Bool(a == b)),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

fn builtin_not_equal(args: &[Value]) -> Result<Value, Error> {
    match args {
        [a, b] => Ok(Value::Bool(a != b)),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

/// Prepend to a list; anything else yields a fresh two-element list
fn builtin_cons(args: &[Value]) -> Result<Value, Error> {
    match args {
        [first, Value::Array(rest)] => {
            let mut result = Vec::with_capacity(rest.len() + 1);
            result.push(first.clone());
            result.extend_from_slice(rest);
            Ok(Value::Array(result))
        }
        [first, second] => Ok(Value::Array(vec![first.clone(), second.clone()])),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

fn builtin_car(args: &[Value]) -> Result<Value, Error> {
    match args {
        [Value::Array(items)] => items
            .first()
            .cloned()
            .ok_or_else(|| Error::EvalError("car of empty list".to_owned())),
        [other] => Err(Error::TypeError(format!(
            "car requires a list, got {}: {other}",
            other.type_name()
        ))),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

fn builtin_cdr(args: &[Value]) -> Result<Value, Error> {
    match args {
        [Value::Array(items)] => match items.split_first() {
            Some((_, rest)) => Ok(Value::Array(rest.to_vec())),
            None => Err(Error::EvalError("cdr of empty list".to_owned())),
        },
        [other] => Err(Error::TypeError(format!(
            "cdr requires a list, got {}: {other}",
            other.type_name()
        ))),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

fn builtin_null(args: &[Value]) -> Result<Value, Error> {
    match args {
        [value] => Ok(Value::Bool(value.is_nil())),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

fn builtin_not(args: &[Value]) -> Result<Value, Error> {
    match args {
        [Value::Bool(b)] => Ok(Value::Bool(!b)),
        [other] => Err(Error::TypeError(format!(
            "not requires a boolean, got {}: {other}",
            other.type_name()
        ))),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

/// Global registry of all built-in operations
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    vec![
        // Arithmetic operations
        BuiltinOp {
            scheme_id: "+",
            op_kind: OpKind::Primitive(builtin_add),
            arity: Arity::AtLeast(1),
        },
        BuiltinOp {
            scheme_id: "-",
            op_kind: OpKind::Primitive(builtin_sub),
            arity: Arity::AtLeast(1),
        },
        BuiltinOp {
            scheme_id: "*",
            op_kind: OpKind::Primitive(builtin_mul),
            arity: Arity::AtLeast(1),
        },
        BuiltinOp {
            scheme_id: "/",
            op_kind: OpKind::Primitive(builtin_div),
            arity: Arity::AtLeast(1),
        },
        // Comparison operations
        BuiltinOp {
            scheme_id: "<",
            op_kind: OpKind::Primitive(builtin_lt),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            scheme_id: "<=",
            op_kind: OpKind::Primitive(builtin_le),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            scheme_id: ">",
            op_kind: OpKind::Primitive(builtin_gt),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            scheme_id: ">=",
            op_kind: OpKind::Primitive(builtin_ge),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            scheme_id: "equal?",
            op_kind: OpKind::Primitive(builtin_equal),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            scheme_id: "!=",
            op_kind: OpKind::Primitive(builtin_not_equal),
            arity: Arity::Exact(2),
        },
        // Logical operations
        BuiltinOp {
            scheme_id: "not",
            op_kind: OpKind::Primitive(builtin_not),
            arity: Arity::Exact(1),
        },
        // List operations
        BuiltinOp {
            scheme_id: "cons",
            op_kind: OpKind::Primitive(builtin_cons),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            scheme_id: "car",
            op_kind: OpKind::Primitive(builtin_car),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            scheme_id: "cdr",
            op_kind: OpKind::Primitive(builtin_cdr),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            scheme_id: "null?",
            op_kind: OpKind::Primitive(builtin_null),
            arity: Arity::Exact(1),
        },
        // Special forms
        BuiltinOp {
            scheme_id: "quote",
            op_kind: OpKind::SpecialForm(eval_quote),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            scheme_id: "if",
            op_kind: OpKind::SpecialForm(eval_if),
            // no two-operand form
            arity: Arity::Exact(3),
        },
        BuiltinOp {
            scheme_id: "set!",
            op_kind: OpKind::SpecialForm(eval_set),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            scheme_id: "define",
            op_kind: OpKind::SpecialForm(eval_define),
            // (define name expr) or (define (name params...) body...)
            arity: Arity::AtLeast(2),
        },
        BuiltinOp {
            scheme_id: "lambda",
            op_kind: OpKind::SpecialForm(eval_lambda),
            arity: Arity::AtLeast(2),
        },
        BuiltinOp {
            scheme_id: "apply",
            op_kind: OpKind::SpecialForm(eval_apply),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            scheme_id: "begin",
            op_kind: OpKind::SpecialForm(eval_begin),
            arity: Arity::AtLeast(1),
        },
    ]
});

/// Lazy static map from scheme_id to BuiltinOp (private - use find_scheme_op)
static BUILTIN_SCHEME: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
    ops.iter().map(|op| (op.scheme_id, op)).collect()
});

/// `list` is an ordinary variadic procedure, not a primitive
const LIST_DEFINITION: &str = "(lambda z z)";

/// Get all builtin operations
pub fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by its Scheme identifier
pub fn find_scheme_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_SCHEME.get(id).copied()
}

/// Find the special form introduced by keyword `id`
pub fn find_special_form(id: &str) -> Option<&'static BuiltinOp> {
    find_scheme_op(id).filter(|op| op.is_special_form())
}

/// Build the global frame: every primitive, `null` bound to the empty list,
/// and `list` bound to the procedure `(lambda z z)`.
pub fn build_global_environment() -> Result<Environment, Error> {
    let env = Environment::new();

    for op in get_builtin_ops() {
        if !op.is_special_form() {
            env.define(Symbol::new(op.scheme_id), Value::Primitive(Primitive(op)));
        }
    }

    env.define(Symbol::new("null"), Value::Array(vec![]));

    let mut scanner = Scanner::from_str("<builtin list>", LIST_DEFINITION);
    let Some(form) = read(&mut scanner)? else {
        return Err(Error::EvalError(format!(
            "empty definition for list: {LIST_DEFINITION}"
        )));
    };
    let list = eval(&form, &env)?;
    env.define(Symbol::new("list"), list);

    Ok(env)
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, sym, val};

    fn call(name: &str, args: &[Value]) -> Result<Value, crate::Error> {
        let op = find_scheme_op(name).unwrap();
        let OpKind::Primitive(func) = op.op_kind else {
            panic!("{name} is not a primitive");
        };
        op.arity.validate(args.len())?;
        func(args)
    }

    /// Test result variants for comprehensive testing
    #[derive(Debug)]
    enum TestResult {
        Success(Value),
        SpecificError(&'static str),
        Error,
    }
    use TestResult::*;

    #[test]
    fn test_primitives_data_driven() {
        let inf = NumberType::INFINITY;
        let test_cases: Vec<(&str, Vec<Value>, TestResult)> = vec![
            // === ARITHMETIC ===
            ("+", vec![val(1), val(2), val(3)], Success(val(6))),
            ("+", vec![val(1.5)], Success(val(1.5))),
            ("+", vec![], SpecificError("ArityError")),
            ("-", vec![val(10), val(4), val(1)], Success(val(5))),
            ("-", vec![val(3)], Success(val(3))),
            ("*", vec![val(2), val(2.5)], Success(val(5))),
            ("/", vec![val(1), val(8)], Success(val(0.125))),
            ("/", vec![val(1), val(0)], Success(val(inf))),
            ("/", vec![val(6)], Success(val(6))),
            ("+", vec![val(1), val("2")], SpecificError("+ requires numbers")),
            ("*", vec![sym("x")], SpecificError("Type error")),
            // === COMPARISON ===
            ("<", vec![val(1), val(2)], Success(val(true))),
            ("<=", vec![val(2), val(2)], Success(val(true))),
            (">", vec![val(2), val(2)], Success(val(false))),
            (">=", vec![val(3), val(2)], Success(val(true))),
            ("<", vec![val(1)], SpecificError("ArityError")),
            ("<", vec![val(1), val(2), val(3)], Error),
            (">", vec![val(1), val(true)], SpecificError("> requires numbers")),
            // === EQUALITY ===
            ("equal?", vec![val([1, 2]), val([1, 2])], Success(val(true))),
            ("equal?", vec![val("a"), val('a')], Success(val(false))),
            ("equal?", vec![nil(), nil()], Success(val(true))),
            ("!=", vec![val(1), val(1)], Success(val(false))),
            ("!=", vec![sym("a"), sym("b")], Success(val(true))),
            // === LOGIC ===
            ("not", vec![val(true)], Success(val(false))),
            ("not", vec![val(false)], Success(val(true))),
            ("not", vec![nil()], SpecificError("not requires a boolean")),
            // === LISTS ===
            ("cons", vec![val(1), val([2, 3])], Success(val([1, 2, 3]))),
            ("cons", vec![val(1), nil()], Success(val([1]))),
            ("cons", vec![val(1), val(2)], Success(val([1, 2]))),
            ("cons", vec![val([1]), val([2])], Success(val(vec![val([1]), val(2)]))),
            ("car", vec![val([1, 2])], Success(val(1))),
            ("car", vec![nil()], SpecificError("car of empty list")),
            ("car", vec![val("abc")], SpecificError("car requires a list")),
            ("cdr", vec![val([1, 2])], Success(val([2]))),
            ("cdr", vec![val([1])], Success(nil())),
            ("cdr", vec![nil()], SpecificError("cdr of empty list")),
            ("cdr", vec![val(1)], Error),
            ("null?", vec![nil()], Success(val(true))),
            ("null?", vec![val([0])], Success(val(false))),
            ("null?", vec![val(0)], Success(val(false))),
            ("null?", vec![], Error),
        ];

        for (i, (name, args, expected)) in test_cases.iter().enumerate() {
            let result = call(name, args);
            match (&result, expected) {
                (Ok(actual), Success(expected)) => {
                    assert_eq!(actual, expected, "Test case {} ({name}) failed", i + 1);
                }
                (Err(_), Error) => {}
                (Err(e), SpecificError(text)) => {
                    let msg = e.to_string();
                    assert!(msg.contains(text), "Test case {} ({name}): got {msg}", i + 1);
                }
                _ => panic!("Test case {} ({name}): expected {expected:?}, got {result:?}", i + 1),
            }
        }
    }

    #[test]
    fn test_registry_lookup() {
        for keyword in ["quote", "if", "set!", "define", "lambda", "apply", "begin"] {
            assert!(find_special_form(keyword).is_some(), "{keyword} should be a special form");
        }
        for name in ["+", "car", "null?", "not", "!="] {
            assert!(find_scheme_op(name).is_some_and(|op| !op.is_special_form()));
            assert!(find_special_form(name).is_none());
        }
        assert!(find_scheme_op("list").is_none());
        assert!(find_scheme_op("string-append").is_none());

        let ids: std::collections::HashSet<_> = get_builtin_ops().iter().map(|op| op.scheme_id).collect();
        assert_eq!(ids.len(), get_builtin_ops().len(), "scheme ids must be unique");
    }

    #[test]
    fn test_global_environment_bindings() {
        let env = build_global_environment().unwrap();

        for op in get_builtin_ops() {
            let bound = env.lookup(&Symbol::new(op.scheme_id));
            if op.is_special_form() {
                assert!(bound.is_err(), "{} must not be bound", op.scheme_id);
            } else {
                assert!(matches!(bound, Ok(Value::Primitive(_))));
            }
        }

        assert_eq!(env.lookup(&Symbol::new("null")).unwrap(), nil());
        let list = env.lookup(&Symbol::new("list")).unwrap();
        assert_eq!(list.to_string(), "#<procedure z>");
        assert_eq!(
            env.lookup(&Symbol::new("car")).unwrap().to_string(),
            "#<primitive car>"
        );
    }
}

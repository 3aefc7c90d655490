use std::fmt;

use tracing::trace;

use crate::Error;
use crate::ast::{Params, Procedure, Symbol, Unspecified, Value};
use crate::builtinops::{OpKind, find_special_form};
use gc::Gc;

pub mod environment;

pub use environment::Environment;

/// Log target for evaluator tracing; enable it with a `lisp::trace=trace` filter
pub const TRACE_TARGET: &str = "lisp::trace";

/// Marker prefix for the expression context attached to errors
const CONTEXT_MARKER: &str = "\n  while evaluating: ";

/// Number of operands accepted by a primitive or special form
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arity {
    /// Exactly n operands
    Exact(usize),
    /// At least n operands
    AtLeast(usize),
    /// Between min and max operands (inclusive)
    Range(usize, usize),
    /// Any number of operands
    Any,
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Range(min, max) => (min..=max).contains(&count),
            Arity::Any => true,
        }
    }

    pub fn validate(&self, count: usize) -> Result<(), Error> {
        if self.accepts(count) {
            Ok(())
        } else {
            Err(Error::arity_error(self, count))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(min, max) => write!(f, "{min} to {max}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// Two spaces per recursion level, rendered lazily so disabled tracing costs nothing
struct Indent(usize);

impl fmt::Display for Indent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:width$}", "", width = self.0 * 2)
    }
}

/// Evaluate an expression in `env`
pub fn eval(expr: &Value, env: &Environment) -> Result<Value, Error> {
    eval_with_depth_tracking(expr, env, 0)
}

/// Evaluate one datum read at top level
pub fn evaluate_top_level(expr: &Value, env: &Environment) -> Result<Value, Error> {
    eval(expr, env)
}

/// Apply a functor to already evaluated arguments
pub fn apply(functor: &Value, args: Vec<Value>) -> Result<Value, Error> {
    apply_with_depth_tracking(functor, args, 0)
}

/// Evaluate with the recursion depth threaded through for trace indentation.
///
/// There is no depth limit and no tail-call elimination: deep Scheme recursion
/// uses host stack in proportion to its depth.
fn eval_with_depth_tracking(expr: &Value, env: &Environment, depth: usize) -> Result<Value, Error> {
    trace!(target: TRACE_TARGET, "{}entering eval: {}", Indent(depth), expr);
    let result = eval_form(expr, env, depth);
    match &result {
        Ok(value) => trace!(target: TRACE_TARGET, "{}leaving eval: {}", Indent(depth), value),
        Err(err) => trace!(target: TRACE_TARGET, "{}leaving eval with error: {}", Indent(depth), err),
    }
    result
}

fn eval_form(expr: &Value, env: &Environment, depth: usize) -> Result<Value, Error> {
    match expr {
        Value::Flonum(_) | Value::String(_) | Value::Char(_) | Value::Bool(_) => Ok(expr.clone()),

        Value::Symbol(name) => env.lookup(name),

        Value::Array(elements) => {
            eval_list(elements, env, depth).map_err(|err| add_context(err, expr))
        }

        Value::Procedure(_) | Value::Primitive(_) | Value::Unspecified(_) => {
            Err(Error::UnknownExpression(format!("{expr}")))
        }
    }
}

/// Attach the innermost failing form to type and evaluation errors
fn add_context(error: Error, expr: &Value) -> Error {
    match error {
        Error::EvalError(msg) if !msg.contains(CONTEXT_MARKER) => {
            Error::EvalError(format!("{msg}{CONTEXT_MARKER}{expr}"))
        }
        Error::TypeError(msg) if !msg.contains(CONTEXT_MARKER) => {
            Error::TypeError(format!("{msg}{CONTEXT_MARKER}{expr}"))
        }
        other => other,
    }
}

fn eval_args(args: &[Value], env: &Environment, depth: usize) -> Result<Vec<Value>, Error> {
    args.iter()
        .map(|arg| eval_with_depth_tracking(arg, env, depth + 1))
        .collect()
}

/// Evaluate a compound form: a special form if the head is a keyword, otherwise an application
fn eval_list(elements: &[Value], env: &Environment, depth: usize) -> Result<Value, Error> {
    match elements {
        [] => Err(Error::EvalError("Cannot evaluate empty list".to_owned())),

        [head, operands @ ..] => {
            if let Value::Symbol(keyword) = head
                && let Some(form) = find_special_form(keyword.as_str())
                && let OpKind::SpecialForm(special_form) = form.op_kind
            {
                if !form.arity.accepts(operands.len()) {
                    return Err(Error::MalformedForm(format!(
                        "{keyword} expects {} operands, got {}",
                        form.arity,
                        operands.len()
                    )));
                }
                return special_form(operands, env, depth);
            }

            let functor = eval_with_depth_tracking(head, env, depth + 1)?;
            let args = eval_args(operands, env, depth)?;
            apply_with_depth_tracking(&functor, args, depth)
        }
    }
}

fn apply_with_depth_tracking(functor: &Value, args: Vec<Value>, depth: usize) -> Result<Value, Error> {
    match functor {
        Value::Primitive(primitive) => {
            let op = primitive.0;
            let OpKind::Primitive(func) = op.op_kind else {
                return Err(Error::NotApplicable(format!("{functor}")));
            };
            if !op.arity.accepts(args.len()) {
                return Err(Error::arity_error_with_expr(
                    op.arity,
                    args.len(),
                    op.scheme_id.to_owned(),
                ));
            }
            func(&args)
        }

        Value::Procedure(procedure) => {
            let frame = Environment::with_outer(&procedure.env);
            match &procedure.params {
                Params::Fixed(names) => {
                    if names.len() != args.len() {
                        return Err(Error::arity_error_with_expr(
                            names.len(),
                            args.len(),
                            format!("{functor}"),
                        ));
                    }
                    for (name, arg) in names.iter().zip(args) {
                        frame.define(name.clone(), arg);
                    }
                }
                Params::Variadic(name) => frame.define(name.clone(), Value::Array(args)),
            }
            eval_with_depth_tracking(&procedure.body, &frame, depth + 1)
        }

        _ => Err(Error::NotApplicable(format!("{functor}"))),
    }
}

/// Turn a parameter form into a parameter spec: a list of distinct symbols, or one symbol
fn parse_params(form: &Value) -> Result<Params, Error> {
    match form {
        Value::Symbol(name) => Ok(Params::Variadic(name.clone())),
        Value::Array(items) => {
            let mut names: Vec<Symbol> = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Symbol(name) => {
                        if names.contains(name) {
                            return Err(Error::MalformedForm(format!(
                                "duplicate parameter name: {name}"
                            )));
                        }
                        names.push(name.clone());
                    }
                    other => {
                        return Err(Error::MalformedForm(format!(
                            "parameters must be symbols, got {other}"
                        )));
                    }
                }
            }
            Ok(Params::Fixed(names))
        }
        other => Err(Error::MalformedForm(format!(
            "parameter list must be a symbol or a list of symbols, got {other}"
        ))),
    }
}

/// A body of several forms is evaluated as one `begin` form
fn body_form(forms: &[Value]) -> Value {
    match forms {
        [single] => single.clone(),
        _ => {
            let mut sequence = Vec::with_capacity(forms.len() + 1);
            sequence.push(Value::Symbol(Symbol::new("begin")));
            sequence.extend_from_slice(forms);
            Value::Array(sequence)
        }
    }
}

fn make_procedure(params: &Value, body: &[Value], env: &Environment) -> Result<Value, Error> {
    Ok(Value::Procedure(Gc::new(Procedure {
        params: parse_params(params)?,
        body: body_form(body),
        env: env.clone(),
    })))
}

/// `(quote datum)`
pub(crate) fn eval_quote(args: &[Value], _env: &Environment, _depth: usize) -> Result<Value, Error> {
    match args {
        [datum] => Ok(datum.clone()),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

/// `(if test consequent alternative)`; only the selected branch is evaluated
pub(crate) fn eval_if(args: &[Value], env: &Environment, depth: usize) -> Result<Value, Error> {
    match args {
        [test, consequent, alternative] => {
            match eval_with_depth_tracking(test, env, depth + 1)? {
                Value::Bool(true) => eval_with_depth_tracking(consequent, env, depth + 1),
                Value::Bool(false) => eval_with_depth_tracking(alternative, env, depth + 1),
                other => Err(Error::TypeError(format!(
                    "if test must be a boolean, got {}: {other}",
                    other.type_name()
                ))),
            }
        }
        _ => Err(Error::arity_error(3, args.len())),
    }
}

/// `(set! name expr)`; `name` must already be bound somewhere in the chain
pub(crate) fn eval_set(args: &[Value], env: &Environment, depth: usize) -> Result<Value, Error> {
    match args {
        [Value::Symbol(name), expr] => {
            let value = eval_with_depth_tracking(expr, env, depth + 1)?;
            env.set(name, value)?;
            Ok(Value::Unspecified(Unspecified::Set))
        }
        [other, _] => Err(Error::MalformedForm(format!(
            "set! requires a symbol, got {other}"
        ))),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

/// `(define name expr)` or `(define (name params...) body...)`, binding in the innermost frame
pub(crate) fn eval_define(args: &[Value], env: &Environment, depth: usize) -> Result<Value, Error> {
    match args {
        [Value::Symbol(name), expr] => {
            trace!(target: TRACE_TARGET, "{}entering define: {}", Indent(depth), name);
            let value = eval_with_depth_tracking(expr, env, depth + 1)?;
            trace!(target: TRACE_TARGET, "{}leaving define: {} = {}", Indent(depth), name, value);
            env.define(name.clone(), value);
            Ok(Value::Unspecified(Unspecified::Define(name.clone())))
        }
        [Value::Symbol(name), _, extra @ ..] => Err(Error::MalformedForm(format!(
            "define {name}: unexpected trailing forms: {}",
            Value::Array(extra.to_vec())
        ))),
        [Value::Array(signature), body @ ..] if !body.is_empty() => match signature.as_slice() {
            [Value::Symbol(name), params @ ..] => {
                trace!(target: TRACE_TARGET, "{}entering define: {}", Indent(depth), name);
                let procedure = make_procedure(&Value::Array(params.to_vec()), body, env)?;
                trace!(target: TRACE_TARGET, "{}leaving define: {} = {}", Indent(depth), name, procedure);
                env.define(name.clone(), procedure);
                Ok(Value::Unspecified(Unspecified::Define(name.clone())))
            }
            _ => Err(Error::MalformedForm(format!(
                "define: procedure name must be a symbol, got {}",
                Value::Array(signature.clone())
            ))),
        },
        [other, ..] => Err(Error::MalformedForm(format!(
            "define requires a symbol or a parameter list, got {other}"
        ))),
        [] => Err(Error::arity_error(Arity::AtLeast(2), 0)),
    }
}

/// `(lambda params body...)`; the body is not evaluated until application
pub(crate) fn eval_lambda(args: &[Value], env: &Environment, _depth: usize) -> Result<Value, Error> {
    match args {
        [params, body @ ..] if !body.is_empty() => make_procedure(params, body, env),
        _ => Err(Error::arity_error(Arity::AtLeast(2), args.len())),
    }
}

/// `(apply functor args)`; the elements of `args` are passed without re-evaluation
pub(crate) fn eval_apply(args: &[Value], env: &Environment, depth: usize) -> Result<Value, Error> {
    match args {
        [functor_expr, args_expr] => {
            let functor = eval_with_depth_tracking(functor_expr, env, depth + 1)?;
            let arguments = eval_with_depth_tracking(args_expr, env, depth + 1)?;
            match &arguments {
                Value::Array(items) => apply_with_depth_tracking(&functor, items.clone(), depth),
                other => Err(Error::TypeError(format!(
                    "apply requires a list of arguments, got {}: {other}",
                    other.type_name()
                ))),
            }
        }
        _ => Err(Error::arity_error(2, args.len())),
    }
}

/// `(begin form...)`; the value of the last form
pub(crate) fn eval_begin(args: &[Value], env: &Environment, depth: usize) -> Result<Value, Error> {
    let Some((last, init)) = args.split_last() else {
        return Err(Error::MalformedForm("begin requires at least one form".to_owned()));
    };
    for form in init {
        eval_with_depth_tracking(form, env, depth + 1)?;
    }
    eval_with_depth_tracking(last, env, depth + 1)
}

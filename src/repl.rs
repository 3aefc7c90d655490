//! The read-eval boundary and the read-eval-print loop.
//!
//! [`read_eval`] is the only place where reading and evaluation meet. It
//! reports exactly one outcome, so callers never have to guess whether a
//! failure happened in the input, while reading or while evaluating.

use std::io::Write;

use crate::Error;
use crate::ReadError;
use crate::ast::Value;
use crate::evaluator::{Environment, evaluate_top_level};
use crate::reader::read;
use crate::scan::{TokenKind, TokenStream};

/// Outcome of reading and evaluating one top-level datum
#[derive(Debug)]
pub enum ReadEval {
    /// The token stream is exhausted
    EndOfInput,
    /// The underlying input failed; the rest of it is lost
    InputFailed(Error),
    /// No datum could be read; nothing was evaluated
    ReadFailed(ReadError),
    /// The datum was read but its evaluation failed
    EvalFailed { datum: Value, error: Error },
    /// The datum was read and evaluated
    Evaluated { datum: Value, value: Value },
}

/// Read one datum and evaluate it in `env`
pub fn read_eval<T: TokenStream + ?Sized>(tokens: &mut T, env: &Environment) -> ReadEval {
    let datum = match read(tokens) {
        Ok(Some(datum)) => datum,
        result => {
            return match (tokens.take_error(), result) {
                (Some(err), _) => ReadEval::InputFailed(err.into()),
                (None, Err(err)) => ReadEval::ReadFailed(err),
                (None, _) => ReadEval::EndOfInput,
            };
        }
    };
    match evaluate_top_level(&datum, env) {
        Ok(value) => ReadEval::Evaluated { datum, value },
        Err(error) => ReadEval::EvalFailed { datum, error },
    }
}

/// Read, evaluate and print every datum until the input ends.
///
/// Interactive sessions report errors as `Error: ...` and keep going; batch
/// runs stop at the first error and return it.
pub fn repl<T, W>(tokens: &mut T, env: &Environment, interactive: bool, out: &mut W) -> Result<(), Error>
where
    T: TokenStream + ?Sized,
    W: Write,
{
    loop {
        if interactive && let Some(command) = meta_command(tokens) {
            run_meta_command(command, env, out)?;
            continue;
        }

        let error = match read_eval(tokens, env) {
            ReadEval::EndOfInput => return Ok(()),
            ReadEval::Evaluated { value, .. } => {
                writeln!(out, "{value}")?;
                continue;
            }
            ReadEval::InputFailed(err) => err,
            ReadEval::ReadFailed(err) => Error::Read(err),
            ReadEval::EvalFailed { error, .. } => error,
        };

        if interactive {
            writeln!(out, "Error: {error}")?;
        } else {
            return Err(error);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum MetaCommand {
    Help,
    Env,
}

/// Consume the next token if it is a meta command
fn meta_command<T: TokenStream + ?Sized>(tokens: &mut T) -> Option<MetaCommand> {
    let token = tokens.peek();
    if token.kind != TokenKind::Symbol {
        return None;
    }
    let command = match token.text.as_str() {
        ":help" => MetaCommand::Help,
        ":env" => MetaCommand::Env,
        _ => return None,
    };
    tokens.next();
    Some(command)
}

fn run_meta_command<W: Write>(command: MetaCommand, env: &Environment, out: &mut W) -> Result<(), Error> {
    match command {
        MetaCommand::Help => {
            writeln!(out, "Commands:")?;
            writeln!(out, "  :help  - Show this help message")?;
            writeln!(out, "  :env   - Show current environment bindings")?;
            writeln!(out, "  Ctrl+D - Exit the interpreter")?;
            writeln!(out)?;
            writeln!(out, "Special forms: quote ('x), if, set!, define, lambda, apply, begin")?;
        }
        MetaCommand::Env => print_environment(env, out)?,
    }
    Ok(())
}

fn print_environment<W: Write>(env: &Environment, out: &mut W) -> Result<(), Error> {
    let bindings = env.get_all_bindings();

    let (primitives, user_defined): (Vec<_>, Vec<_>) = bindings
        .iter()
        .partition(|(_, value)| matches!(value, Value::Primitive(_)));

    writeln!(out, "Environment bindings ({} total):", bindings.len())?;
    if !primitives.is_empty() {
        let names: Vec<&str> = primitives.iter().map(|(name, _)| name.as_str()).collect();
        writeln!(out, "Primitives ({}): {}", names.len(), names.join(" "))?;
    }
    if !user_defined.is_empty() {
        writeln!(out, "Definitions ({}):", user_defined.len())?;
        for (name, value) in user_defined {
            writeln!(out, "  {name} = {value}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ReadErrorKind;
    use crate::ast::{sym, val};
    use crate::builtinops::build_global_environment;
    use crate::scan::{ReaderSource, Scanner};
    use std::io::Cursor;

    fn run(input: &str, interactive: bool) -> (Result<(), Error>, String) {
        let env = build_global_environment().unwrap();
        let mut scanner = Scanner::from_str("<test>", input);
        let mut out = Vec::new();
        let result = repl(&mut scanner, &env, interactive, &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_read_eval_outcomes() {
        let env = build_global_environment().unwrap();
        let mut scanner = Scanner::from_str("<test>", "(+ 1 2) (car '()) ) ");

        match read_eval(&mut scanner, &env) {
            ReadEval::Evaluated { datum, value } => {
                assert_eq!(datum, val(vec![sym("+"), val(1), val(2)]));
                assert_eq!(value, val(3));
            }
            other => panic!("expected a value, got {other:?}"),
        }
        match read_eval(&mut scanner, &env) {
            ReadEval::EvalFailed { datum, error } => {
                assert_eq!(datum.to_string(), "(car (quote ()))");
                assert!(error.to_string().contains("car of empty list"));
            }
            other => panic!("expected an evaluation failure, got {other:?}"),
        }
        match read_eval(&mut scanner, &env) {
            ReadEval::ReadFailed(err) => assert_eq!(err.kind, ReadErrorKind::UnexpectedCloseParen),
            other => panic!("expected a read failure, got {other:?}"),
        }
        assert!(matches!(read_eval(&mut scanner, &env), ReadEval::EndOfInput));
        assert!(matches!(read_eval(&mut scanner, &env), ReadEval::EndOfInput));
    }

    #[test]
    fn test_batch_prints_values_in_order() {
        let (result, output) = run("(define (sq x) (* x x)) (sq 12) \"s\" 'sym", false);
        assert_eq!(result, Ok(()));
        assert_eq!(output, "#<undefined-value, defining sq>\n144\n\"s\"\nsym\n");
    }

    #[test]
    fn test_batch_stops_at_first_error() {
        let (result, output) = run("1 (car 5) 2", false);
        assert!(matches!(result, Err(Error::TypeError(_))));
        assert_eq!(output, "1\n");

        let (result, _) = run("(1 2", false);
        assert!(matches!(result, Err(Error::Read(ref err)) if err.kind == ReadErrorKind::Unterminated));
    }

    #[test]
    fn test_batch_reports_input_failure() {
        let env = build_global_environment().unwrap();
        let bytes = b"(+ 1 1)\n\xff\xfe\n(car 5)\n".to_vec();
        let mut scanner = Scanner::new("bad.scm", ReaderSource::new(Cursor::new(bytes)));
        let mut out = Vec::new();

        let result = repl(&mut scanner, &env, false, &mut out);
        assert!(matches!(result, Err(Error::Io(ref msg)) if msg.starts_with("bad.scm: ")), "{result:?}");
        assert_eq!(String::from_utf8(out).unwrap(), "2\n");

        // the failure is reported once; afterwards the stream is simply at its end
        assert!(matches!(read_eval(&mut scanner, &env), ReadEval::EndOfInput));
    }

    #[test]
    fn test_interactive_reports_and_continues() {
        let (result, output) = run("undefined (+ 1 1) ) 3", true);
        assert_eq!(result, Ok(()));
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Error: Undefined symbol: undefined",
                "2",
                "Error: ReadError: unexpected ')'",
                "3",
            ]
        );
    }

    #[test]
    fn test_interactive_meta_commands() {
        let (result, output) = run("(define x 5) :env :help", true);
        assert_eq!(result, Ok(()));
        assert!(output.contains("Primitives ("));
        assert!(output.contains("  x = 5"));
        assert!(output.contains("  list = #<procedure z>"));
        assert!(output.contains(":help  - Show this help message"));

        // meta commands are ordinary symbols outside interactive sessions
        let (result, _) = run(":env", false);
        assert!(matches!(result, Err(Error::UnboundSymbol(_))));
    }
}

//! Read-Eval-Read-Compare: scripts that test themselves.
//!
//! A script is a sequence of pairs. The first datum of each pair is
//! evaluated; the second is read but not evaluated, and the result must be
//! `equal?` to it:
//!
//! ```scheme
//! (+ 1 2)           3
//! (cdr '(1 2 3))    (2 3)
//! (car '())         ***    ; evaluation must fail
//! (define x 10)     ---    ; any successful result
//! ```
//!
//! A failed comparison is written to the output and counted; the loop goes
//! on to the end of the input. Only a read or input failure stops it early.

use std::fmt;
use std::io::Write;

use tracing::{debug, info};

use crate::ast::Value;
use crate::evaluator::Environment;
use crate::reader::read;
use crate::repl::{ReadEval, read_eval};
use crate::scan::TokenStream;
use crate::{Error, ReadError, ReadErrorKind};

/// Expected value meaning "evaluation must fail"
pub const EXPECT_ERROR: &str = "***";

/// Expected value meaning "any successful result"
pub const DONT_CARE: &str = "---";

/// Why a pair did not match
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FailureReason {
    /// `---` was expected but evaluation failed
    ErrorWhenDontCare,
    /// `***` was expected but evaluation succeeded
    MissingError,
    /// A value was expected but evaluation failed
    UnexpectedError,
    /// Evaluation succeeded with a value not equal to the expected one
    UnexpectedValue,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            FailureReason::ErrorWhenDontCare => "unexpected error during evaluation",
            FailureReason::MissingError => "expected error, but none occurred",
            FailureReason::UnexpectedError => "unexpected error",
            FailureReason::UnexpectedValue => "unexpected value",
        };
        write!(f, "{reason}")
    }
}

/// Summary of one Rerc run
#[derive(Debug, Default)]
pub struct RercReport {
    /// Number of pairs compared
    pub checked: usize,
    /// Number of pairs that did not match
    pub failures: usize,
    /// The read or input failure that ended the run early, if any
    pub error: Option<Error>,
}

impl RercReport {
    /// True when every pair matched and the whole input was read
    pub fn passed(&self) -> bool {
        self.failures == 0 && self.error.is_none()
    }
}

/// What the first datum of a pair produced
enum Outcome {
    Value(Value),
    Failed(Error),
}

/// Run every pair in `tokens`, writing a record of each failure to `out`
pub fn rerc<T, W>(tokens: &mut T, env: &Environment, out: &mut W) -> Result<RercReport, Error>
where
    T: TokenStream + ?Sized,
    W: Write,
{
    let mut report = RercReport::default();

    loop {
        let (datum, outcome) = match read_eval(tokens, env) {
            ReadEval::EndOfInput => break,
            ReadEval::InputFailed(err) => {
                report.error = Some(err);
                break;
            }
            ReadEval::ReadFailed(err) => {
                report.error = Some(Error::Read(err));
                break;
            }
            ReadEval::EvalFailed { datum, error } => (datum, Outcome::Failed(error)),
            ReadEval::Evaluated { datum, value } => (datum, Outcome::Value(value)),
        };

        let expect = match read(tokens) {
            Ok(Some(expect)) => expect,
            result => {
                report.error = Some(match (tokens.take_error(), result) {
                    (Some(err), _) => err.into(),
                    (None, Err(err)) => expected_value_error(err.kind, &err.message),
                    (None, _) => expected_value_error(ReadErrorKind::Unterminated, "end of input"),
                });
                break;
            }
        };

        report.checked += 1;
        if let Some(reason) = compare(&outcome, &expect) {
            report.failures += 1;
            debug!("rerc failure #{}: {reason}: {datum}", report.failures);
            write_failure(out, reason, &datum, &outcome, &expect)?;
        }
    }

    info!(
        "rerc: {} checked, {} failed{}",
        report.checked,
        report.failures,
        if report.error.is_some() { ", stopped early" } else { "" }
    );
    Ok(report)
}

fn expected_value_error(kind: ReadErrorKind, message: &str) -> Error {
    Error::Read(ReadError::new(
        kind,
        format!("RERC: failed while reading expected value: {message}"),
    ))
}

/// Decide whether a pair matches; `None` when it does
fn compare(outcome: &Outcome, expect: &Value) -> Option<FailureReason> {
    let sentinel = expect.as_symbol().map(|symbol| symbol.as_str());
    match (sentinel, outcome) {
        (Some(DONT_CARE), Outcome::Failed(_)) => Some(FailureReason::ErrorWhenDontCare),
        (Some(DONT_CARE), Outcome::Value(_)) => None,
        (Some(EXPECT_ERROR), Outcome::Failed(_)) => None,
        (Some(EXPECT_ERROR), Outcome::Value(_)) => Some(FailureReason::MissingError),
        (_, Outcome::Failed(_)) => Some(FailureReason::UnexpectedError),
        (_, Outcome::Value(value)) if value == expect => None,
        (_, Outcome::Value(_)) => Some(FailureReason::UnexpectedValue),
    }
}

fn write_failure<W: Write>(
    out: &mut W,
    reason: FailureReason,
    datum: &Value,
    outcome: &Outcome,
    expect: &Value,
) -> Result<(), Error> {
    let (value, error) = match outcome {
        Outcome::Value(value) => (value.to_string(), "<none>".to_owned()),
        Outcome::Failed(error) => ("<none>".to_owned(), error.to_string()),
    };
    writeln!(out, "{reason}")?;
    writeln!(out, "   datum: {datum}")?;
    writeln!(out, "   value: {value}")?;
    writeln!(out, "  expect: {expect}")?;
    writeln!(out, "   error: {error}")?;
    Ok(())
}

//! Recursive-descent reader from tokens to data.
//!
//! ```text
//! datum  := atom | '(' datum* ')' | '\'' datum
//! atom   := number | symbol | string | char | #t | #f
//! ```
//!
//! `'x` reads as `(quote x)`. Unrecognised tokens are not fatal: they are
//! logged and read as symbols made from their raw text.

use tracing::warn;

use crate::ast::{Symbol, Value};
use crate::scan::{Token, TokenKind, TokenStream};
use crate::{ReadError, ReadErrorKind};

/// Symbol appended to a list cut short by the end of input
pub const EOF_MARKER: &str = "#%EOF";

/// Read one datum. `Ok(None)` means the input is exhausted.
///
/// On failure inside a list, the error carries everything read so far as a
/// partial value.
pub fn read<T: TokenStream + ?Sized>(tokens: &mut T) -> Result<Option<Value>, ReadError> {
    let token = tokens.next();
    match token.kind {
        TokenKind::Eof => Ok(None),
        _ => read_datum(token, tokens).map(Some),
    }
}

fn read_datum<T: TokenStream + ?Sized>(token: Token, tokens: &mut T) -> Result<Value, ReadError> {
    match token.kind {
        TokenKind::LeftParen => read_list(tokens),
        TokenKind::Quote => read_quoted(tokens),
        TokenKind::RightParen => Err(ReadError::new(
            ReadErrorKind::UnexpectedCloseParen,
            "unexpected ')'",
        )),
        TokenKind::Eof => Err(ReadError::new(
            ReadErrorKind::Unterminated,
            "unexpected end of input",
        )),
        TokenKind::Number => match token.text.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(Value::Flonum(n)),
            Ok(_) => Err(ReadError::new(
                ReadErrorKind::InvalidNumber,
                format!("number out of range '{}'", token.text),
            )),
            Err(err) => Err(ReadError::new(
                ReadErrorKind::InvalidNumber,
                format!("invalid number '{}': {err}", token.text),
            )),
        },
        TokenKind::Symbol => Ok(Value::Symbol(Symbol::new(&token.text))),
        TokenKind::String => Ok(Value::String(token.text)),
        TokenKind::True => Ok(Value::Bool(true)),
        TokenKind::False => Ok(Value::Bool(false)),
        TokenKind::Char => {
            let mut chars = token.text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Char(c)),
                _ => Ok(lenient_symbol(&token)),
            }
        }
        TokenKind::Other => Ok(lenient_symbol(&token)),
    }
}

fn lenient_symbol(token: &Token) -> Value {
    warn!("unrecognized token '{}', reading it as a symbol", token.text);
    Value::Symbol(Symbol::new(&token.text))
}

fn read_quoted<T: TokenStream + ?Sized>(tokens: &mut T) -> Result<Value, ReadError> {
    if matches!(tokens.peek().kind, TokenKind::Eof | TokenKind::RightParen) {
        return Err(ReadError::new(
            ReadErrorKind::MissingQuotedDatum,
            "expected a datum after quote",
        ));
    }
    let token = tokens.next();
    let datum = read_datum(token, tokens).map_err(|mut err| {
        if let Some(inner) = err.partial.take() {
            err.partial = Some(quoted(inner));
        }
        err
    })?;
    Ok(quoted(datum))
}

fn quoted(datum: Value) -> Value {
    Value::Array(vec![Value::Symbol(Symbol::new("quote")), datum])
}

fn read_list<T: TokenStream + ?Sized>(tokens: &mut T) -> Result<Value, ReadError> {
    let mut items = Vec::new();
    loop {
        let token = tokens.next();
        match token.kind {
            TokenKind::RightParen => return Ok(Value::Array(items)),
            TokenKind::Eof => {
                items.push(Value::Symbol(Symbol::new(EOF_MARKER)));
                let partial = Value::Array(items);
                return Err(ReadError::with_partial(
                    ReadErrorKind::Unterminated,
                    format!("unterminated list: {partial}"),
                    partial,
                ));
            }
            _ => match read_datum(token, tokens) {
                Ok(item) => items.push(item),
                Err(mut err) => {
                    if let Some(inner) = err.partial.take() {
                        items.push(inner);
                    }
                    let partial = Value::Array(items);
                    if err.kind == ReadErrorKind::Unterminated {
                        err.message = format!("unterminated list: {partial}");
                    }
                    err.partial = Some(partial);
                    return Err(err);
                }
            },
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, sym, val};
    use crate::scan::Scanner;

    fn read_all(input: &str) -> Vec<Result<Value, ReadError>> {
        let mut scanner = Scanner::from_str("<test>", input);
        let mut result = Vec::new();
        loop {
            match read(&mut scanner) {
                Ok(Some(datum)) => result.push(Ok(datum)),
                Ok(None) => return result,
                Err(err) => {
                    let stop = err.kind == ReadErrorKind::Unterminated;
                    result.push(Err(err));
                    if stop {
                        return result;
                    }
                }
            }
        }
    }

    fn read_one(input: &str) -> Result<Value, ReadError> {
        let mut scanner = Scanner::from_str("<test>", input);
        read(&mut scanner).map(|datum| datum.unwrap())
    }

    #[test]
    fn test_read_data_driven() {
        let test_cases: Vec<(&str, Value)> = vec![
            ("42", val(42)),
            ("-0.5", val(-0.5)),
            ("1e2", val(100)),
            ("foo", sym("foo")),
            ("\"text\"", val("text")),
            ("#\\a", val('a')),
            ("#\\space", val(' ')),
            ("#t", val(true)),
            ("#false", val(false)),
            ("()", nil()),
            ("(1 2 3)", val([1, 2, 3])),
            ("(a (b (c)) \"d\")", val(vec![
                sym("a"),
                val(vec![sym("b"), val(vec![sym("c")])]),
                val("d"),
            ])),
            ("'x", val(vec![sym("quote"), sym("x")])),
            ("''x", val(vec![sym("quote"), val(vec![sym("quote"), sym("x")])])),
            ("'(1 2)", val(vec![sym("quote"), val([1, 2])])),
            ("(a . b)", val(vec![sym("a"), sym("."), sym("b")])),
            ("[x]", sym("[")),
            ("  ; comment\n  (+ 1 ; inner\n 2)", val(vec![sym("+"), val(1), val(2)])),
        ];

        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let actual = read_one(input);
            assert_eq!(actual.as_ref().ok(), Some(expected), "Test case {} failed for {input:?}: {actual:?}", i + 1);
        }
    }

    #[test]
    fn test_read_errors_data_driven() {
        let test_cases: Vec<(&str, ReadErrorKind, Option<Value>)> = vec![
            (")", ReadErrorKind::UnexpectedCloseParen, None),
            ("(1 2", ReadErrorKind::Unterminated, Some(val(vec![val(1), val(2), sym(EOF_MARKER)]))),
            ("(", ReadErrorKind::Unterminated, Some(val(vec![sym(EOF_MARKER)]))),
            (
                "(a (b",
                ReadErrorKind::Unterminated,
                Some(val(vec![sym("a"), val(vec![sym("b"), sym(EOF_MARKER)])])),
            ),
            (
                "'(a",
                ReadErrorKind::Unterminated,
                Some(val(vec![sym("quote"), val(vec![sym("a"), sym(EOF_MARKER)])])),
            ),
            ("'", ReadErrorKind::MissingQuotedDatum, None),
            ("(a ')", ReadErrorKind::MissingQuotedDatum, Some(val(vec![sym("a")]))),
            // literals that would print as inf and read back as a symbol
            ("1e400", ReadErrorKind::InvalidNumber, None),
            ("-1e400", ReadErrorKind::InvalidNumber, None),
        ];

        for (i, (input, kind, partial)) in test_cases.iter().enumerate() {
            let err = read_one(input).unwrap_err();
            assert_eq!(err.kind, *kind, "Test case {} failed for {input:?}", i + 1);
            assert_eq!(err.partial, *partial, "Test case {} partial for {input:?}", i + 1);
        }
    }

    #[test]
    fn test_unterminated_message_shows_partial() {
        let err = read_one("(define (f x)\n  (+ x").unwrap_err();
        assert_eq!(
            err.message,
            "unterminated list: (define (f x) (+ x #%EOF))"
        );
    }

    #[test]
    fn test_sequence_of_data() {
        let data = read_all("1 (a) \"s\" ) b");
        assert_eq!(data.len(), 5);
        assert_eq!(data[0], Ok(val(1)));
        assert_eq!(data[1], Ok(val(vec![sym("a")])));
        assert_eq!(data[2], Ok(val("s")));
        assert!(matches!(&data[3], Err(err) if err.kind == ReadErrorKind::UnexpectedCloseParen));
        assert_eq!(data[4], Ok(sym("b")));
    }

    #[test]
    fn test_round_trip_through_printer() {
        let inputs = [
            "(define (f x) (if (< x 1) 'small \"big\"))",
            "(1 2.5 -3 (nested (deeper ())) #t #f)",
            "(#\\a #\\space #\\newline #\\x1 #\\( \"tab\\there\" \"q\\\"uote\")",
            "(a-symbol set! equal? ... + -)",
            "(1e21 0.001 -0)",
        ];

        for input in inputs {
            let first = read_one(input).unwrap();
            let rendered = first.to_string();
            let second = read_one(&rendered).unwrap();
            assert_eq!(first, second, "round trip changed {input} (rendered as {rendered})");
        }
    }
}

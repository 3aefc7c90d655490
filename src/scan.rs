//! Token stream over line-oriented input.
//!
//! The [`Scanner`] pulls one line at a time from a [`LineSource`] and splits it
//! into [`Token`]s with small nom lexers. Strings may span lines; the scanner
//! asks its source for more input whenever a token is incomplete, and tells
//! interactive sources when a list is still open so they can show the
//! continuation prompt.

use std::io::{self, BufRead, Cursor};

use nom::{
    IResult, Needed, Parser,
    branch::alt,
    bytes::complete::{take, take_while1},
    character::complete::{char, multispace1, not_line_ending},
    combinator::{all_consuming, value},
    multi::many0_count,
    number::complete::recognize_float,
    sequence::preceded,
};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::ast::CHAR_NAMES;

/// Lexical category of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    LeftParen,
    RightParen,
    Quote,
    Symbol,
    Number,
    String,
    Char,
    True,
    False,
    Eof,
    /// Anything the lexer does not recognise; the reader turns it into a symbol
    Other,
}

/// A token and its text.
///
/// For strings and chars `text` holds the decoded contents; for every other
/// kind it is the literal source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        Token {
            kind,
            text: text.into(),
        }
    }

    pub fn eof() -> Self {
        Token::new(TokenKind::Eof, "")
    }
}

/// Pull-based token stream consumed by the reader
pub trait TokenStream {
    /// Consume and return the next token; `Eof` forever once input is exhausted
    fn next(&mut self) -> Token;
    /// Look at the next token without consuming it
    fn peek(&mut self) -> &Token;
    /// The input failure that ended the stream early, if any; taken once
    fn take_error(&mut self) -> Option<io::Error> {
        None
    }
}

/// Line-at-a-time input
pub trait LineSource {
    /// Return the next line including its terminator, or `None` at end of input.
    ///
    /// `continuation` is set while a list or string is still open.
    fn read_line(&mut self, continuation: bool) -> io::Result<Option<String>>;
}

/// Lines from any buffered reader: files, pipes, in-memory text
pub struct ReaderSource<R> {
    reader: R,
}

impl<R: BufRead> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        ReaderSource { reader }
    }
}

impl<R: BufRead> LineSource for ReaderSource<R> {
    fn read_line(&mut self, _continuation: bool) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            Ok(None)
        } else {
            Ok(Some(line))
        }
    }
}

/// Interactive console input with line editing and history
pub struct ConsoleReader {
    editor: DefaultEditor,
    prompt: String,
    prompt2: String,
}

impl ConsoleReader {
    pub fn new(prompt: impl Into<String>, prompt2: impl Into<String>) -> Result<Self, ReadlineError> {
        Ok(ConsoleReader {
            editor: DefaultEditor::new()?,
            prompt: prompt.into(),
            prompt2: prompt2.into(),
        })
    }
}

impl LineSource for ConsoleReader {
    fn read_line(&mut self, continuation: bool) -> io::Result<Option<String>> {
        let prompt = if continuation {
            self.prompt2.as_str()
        } else {
            self.prompt.as_str()
        };
        match self.editor.readline(prompt) {
            Ok(mut line) => {
                if !line.trim().is_empty() {
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                line.push('\n');
                Ok(Some(line))
            }
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => Ok(None),
            Err(ReadlineError::Io(err)) => Err(err),
            Err(err) => Err(io::Error::other(err)),
        }
    }
}

/// Tokenizer over a [`LineSource`]
pub struct Scanner<S> {
    name: String,
    source: S,
    buffer: String,
    pos: usize,
    peeked: Option<Token>,
    depth: usize,
    exhausted: bool,
    pending_error: Option<io::Error>,
}

impl<S: LineSource> Scanner<S> {
    /// `name` identifies the input in diagnostics
    pub fn new(name: impl Into<String>, source: S) -> Self {
        Scanner {
            name: name.into(),
            source,
            buffer: String::new(),
            pos: 0,
            peeked: None,
            depth: 0,
            exhausted: false,
            pending_error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Load the next line, replacing the consumed buffer or extending an incomplete token
    fn fill(&mut self, extend: bool) -> bool {
        if self.exhausted {
            return false;
        }
        match self.source.read_line(extend || self.depth > 0) {
            Ok(Some(line)) => {
                if extend {
                    self.buffer.push_str(&line);
                } else {
                    self.buffer = line;
                    self.pos = 0;
                }
                true
            }
            Ok(None) => {
                self.exhausted = true;
                false
            }
            Err(err) => {
                tracing::debug!("{}: read failed: {err}", self.name);
                self.exhausted = true;
                self.pending_error = Some(io::Error::new(err.kind(), format!("{}: {err}", self.name)));
                false
            }
        }
    }

    fn scan(&mut self) -> Token {
        loop {
            let rest = skip_atmosphere(&self.buffer[self.pos..]);
            self.pos = self.buffer.len() - rest.len();

            if rest.is_empty() {
                if self.fill(false) {
                    continue;
                }
                self.depth = 0;
                return Token::eof();
            }

            let lexed = lex_token(rest)
                .map(|(remaining, token)| (remaining.len(), token))
                .map_err(|err| matches!(err, nom::Err::Incomplete(_)));

            match lexed {
                Ok((remaining, token)) => {
                    self.pos = self.buffer.len() - remaining;
                    match token.kind {
                        TokenKind::LeftParen => self.depth += 1,
                        TokenKind::RightParen => self.depth = self.depth.saturating_sub(1),
                        _ => {}
                    }
                    return token;
                }
                Err(true) => {
                    if !self.fill(true) {
                        // input ended inside a string
                        let raw = self.buffer[self.pos..].to_owned();
                        self.pos = self.buffer.len();
                        return Token::new(TokenKind::Other, raw);
                    }
                }
                Err(false) => {
                    let rest = &self.buffer[self.pos..];
                    let len = rest.chars().next().map_or(1, char::len_utf8);
                    let raw = rest[..len].to_owned();
                    self.pos += len;
                    return Token::new(TokenKind::Other, raw);
                }
            }
        }
    }
}

impl Scanner<ReaderSource<Cursor<String>>> {
    /// Scan in-memory program text
    pub fn from_str(name: impl Into<String>, text: &str) -> Self {
        Scanner::new(name, ReaderSource::new(Cursor::new(text.to_owned())))
    }
}

impl<S: LineSource> TokenStream for Scanner<S> {
    fn next(&mut self) -> Token {
        match self.peeked.take() {
            Some(token) => token,
            None => self.scan(),
        }
    }

    fn peek(&mut self) -> &Token {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.scan(),
        };
        self.peeked.insert(token)
    }

    fn take_error(&mut self) -> Option<io::Error> {
        self.pending_error.take()
    }
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || "()\";'`,[]{}".contains(c)
}

/// Whitespace and `;` comments
fn atmosphere(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0_count(alt((multispace1, preceded(char(';'), not_line_ending)))),
    )
    .parse(input)
}

fn skip_atmosphere(input: &str) -> &str {
    match atmosphere(input) {
        Ok((rest, ())) => rest,
        Err(_) => input,
    }
}

fn lex_token(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::new(TokenKind::LeftParen, "("), char('(')),
        value(Token::new(TokenKind::RightParen, ")"), char(')')),
        value(Token::new(TokenKind::Quote, "'"), char('\'')),
        lex_string,
        lex_atom,
        // stray punctuation: [ ] { } ` ,
        take(1usize).map(|raw: &str| Token::new(TokenKind::Other, raw)),
    ))
    .parse(input)
}

/// String literal; `Incomplete` when the closing quote is not in the buffer yet
fn lex_string(input: &str) -> IResult<&str, Token> {
    let (body, _) = char('"').parse(input)?;
    let mut text = String::new();
    let mut malformed = false;
    let mut chars = body.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '"' => {
                let rest = &body[i + 1..];
                let token = if malformed {
                    Token::new(TokenKind::Other, &input[..input.len() - rest.len()])
                } else {
                    Token::new(TokenKind::String, text)
                };
                return Ok((rest, token));
            }
            '\\' => match chars.next() {
                Some((_, 'n')) => text.push('\n'),
                Some((_, 't')) => text.push('\t'),
                Some((_, 'r')) => text.push('\r'),
                Some((_, '\\')) => text.push('\\'),
                Some((_, '"')) => text.push('"'),
                Some(_) => malformed = true,
                None => return Err(nom::Err::Incomplete(Needed::Unknown)),
            },
            c => text.push(c),
        }
    }
    Err(nom::Err::Incomplete(Needed::Unknown))
}

/// Char literal, boolean, number or symbol: a maximal run of non-delimiters
fn lex_atom(input: &str) -> IResult<&str, Token> {
    if let Some(after) = input.strip_prefix("#\\") {
        return Ok(lex_char(input, after));
    }
    let (rest, word) = take_while1(|c: char| !is_delimiter(c)).parse(input)?;
    Ok((rest, classify_word(word)))
}

fn classify_word(word: &str) -> Token {
    let kind = match word {
        "#t" | "#true" => TokenKind::True,
        "#f" | "#false" => TokenKind::False,
        "." => TokenKind::Other,
        _ if word.starts_with('#') => TokenKind::Other,
        _ if is_number(word) => TokenKind::Number,
        _ => TokenKind::Symbol,
    };
    Token::new(kind, word)
}

fn is_number(word: &str) -> bool {
    let result: IResult<&str, &str> = all_consuming(recognize_float).parse(word);
    result.is_ok()
}

/// `#\c`, `#\name` or `#\xHH`; the first character after `#\` may be a delimiter
fn lex_char<'a>(input: &'a str, after: &'a str) -> (&'a str, Token) {
    let mut chars = after.chars();
    let Some(first) = chars.next() else {
        return (after, Token::new(TokenKind::Other, input));
    };
    let tail = chars.as_str();
    let rest = &tail[tail.find(is_delimiter).unwrap_or(tail.len())..];
    let raw = &input[..input.len() - rest.len()];
    let name = &after[..after.len() - rest.len()];

    let token = if name.chars().count() == 1 {
        Token::new(TokenKind::Char, first.to_string())
    } else {
        match decode_char_name(name) {
            Some(c) => Token::new(TokenKind::Char, c.to_string()),
            None => Token::new(TokenKind::Other, raw),
        }
    };
    (rest, token)
}

fn decode_char_name(name: &str) -> Option<char> {
    if let Some((_, c)) = CHAR_NAMES.iter().find(|(n, _)| *n == name) {
        return Some(*c);
    }
    let hex = name.strip_prefix('x')?;
    if hex.is_empty() || hex.len() > 6 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
}

//! Tokenizer for the textual grammar format.
//!
//! A grammar is line oriented: each definition reads `name <- expression`
//! and ends at a newline. [`Lexer`] turns the text into [`Token`]s one at a
//! time. [`TokenStream`] runs a lexer on its own thread and hands tokens to a
//! single consumer through a rendezvous channel, so the producer is never
//! more than one token ahead of the rule graph builder.

use std::sync::mpsc::{self, Receiver, RecvError};
use std::thread::{self, Scope};

/// The lexical category of a [`Token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// A maximal run of letters, digits and underscores.
    Identifier,
    /// A run of spaces and tabs.
    Whitespace,
    /// A line terminator (`\n`, `\r\n` or `\r`).
    Newline,
    /// The definition operator `<-`.
    Assignment,
    /// The contents of `'...'`, escapes left as written.
    Literal,
    /// The contents of `~'...'`, escapes left as written.
    Regexp,
    /// An explicit rule indirection `~name`; the text is the bare name.
    Reference,
    /// Zero-or-more `*`.
    Closure,
    /// One-or-more `+`.
    Plus,
    /// Ordered choice `/`.
    Alternate,
    /// Optional `?`.
    Optional,
    /// Discard marker `^`.
    Discard,
    /// `(`
    OpenGroup,
    /// `)`
    CloseGroup,
    /// End of the grammar source. Always the last token, with empty text.
    End,
}

/// A single lexical unit, borrowing its text from the grammar source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'src> {
    /// What kind of token this is.
    pub kind: TokenKind,
    /// The token text, with surrounding quotes stripped for literals and regexps.
    pub text: &'src str,
    /// Byte offset of the token's first character in the grammar source.
    pub offset: usize,
}

impl<'src> Token<'src> {
    /// Creates a token.
    #[must_use]
    pub fn new(kind: TokenKind, text: &'src str, offset: usize) -> Self {
        Self { kind, text, offset }
    }
}

/// A malformed token in grammar source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    /// A `'` literal without its closing quote.
    UnterminatedLiteral {
        /// Offset of the opening quote.
        offset: usize,
    },
    /// A `~'` pattern without its closing quote.
    UnterminatedRegexp {
        /// Offset of the leading `~`.
        offset: usize,
    },
    /// A character that cannot start any token.
    UnexpectedChar {
        /// The offending character.
        ch: char,
        /// Its offset.
        offset: usize,
    },
}

impl LexError {
    /// Byte offset in the grammar source where the error was detected.
    #[must_use]
    pub fn offset(&self) -> usize {
        match self {
            LexError::UnterminatedLiteral { offset }
            | LexError::UnterminatedRegexp { offset }
            | LexError::UnexpectedChar { offset, .. } => *offset,
        }
    }
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            LexError::UnterminatedLiteral { offset } => {
                write!(f, "unterminated literal starting at offset {offset}")
            }
            LexError::UnterminatedRegexp { offset } => {
                write!(f, "unterminated regexp starting at offset {offset}")
            }
            LexError::UnexpectedChar { ch, offset } => {
                write!(f, "unexpected character {ch:?} at offset {offset}")
            }
        }
    }
}

impl std::error::Error for LexError {}

fn is_identifier_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// Lazily tokenizes grammar source.
///
/// Yields every token in source order, then a single [`TokenKind::End`]
/// token, then nothing. After a [`LexError`] the lexer yields nothing more.
#[derive(Debug, Clone)]
pub struct Lexer<'src> {
    source: &'src str,
    pos: usize,
    finished: bool,
}

impl<'src> Lexer<'src> {
    /// Creates a lexer positioned at the start of `source`.
    #[must_use]
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            pos: 0,
            finished: false,
        }
    }

    fn rest(&self) -> &'src str {
        &self.source[self.pos..]
    }

    /// Emits `len` bytes from the current position as a token of `kind`.
    fn emit(&mut self, kind: TokenKind, len: usize) -> Token<'src> {
        let start = self.pos;
        self.pos += len;
        Token::new(kind, &self.source[start..self.pos], start)
    }

    fn fail(&mut self, error: LexError) -> Result<Token<'src>, LexError> {
        self.finished = true;
        Err(error)
    }

    /// Length of the run of leading characters satisfying `pred`.
    fn run_len(&self, pred: impl Fn(char) -> bool) -> usize {
        self.rest()
            .char_indices()
            .find(|&(_, ch)| !pred(ch))
            .map_or(self.rest().len(), |(i, _)| i)
    }

    /// Scans the quoted body whose opening quote sits at `open`, advancing
    /// past the closing quote.
    fn quoted(&mut self, open: usize) -> Option<Token<'src>> {
        let body_start = open + 1;
        let mut escaped = false;
        for (i, ch) in self.source[body_start..].char_indices() {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '\'' => {
                    let body_end = body_start + i;
                    self.pos = body_end + 1;
                    return Some(Token::new(
                        TokenKind::Literal,
                        &self.source[body_start..body_end],
                        open,
                    ));
                }
                _ => {}
            }
        }
        None
    }

    fn next_token(&mut self) -> Result<Token<'src>, LexError> {
        let start = self.pos;
        let mut chars = self.rest().chars();
        let Some(ch) = chars.next() else {
            self.finished = true;
            return Ok(Token::new(TokenKind::End, "", start));
        };

        match ch {
            ' ' | '\t' => {
                let len = self.run_len(|c| c == ' ' || c == '\t');
                Ok(self.emit(TokenKind::Whitespace, len))
            }
            '\n' => Ok(self.emit(TokenKind::Newline, 1)),
            '\r' => {
                let len = if chars.next() == Some('\n') { 2 } else { 1 };
                Ok(self.emit(TokenKind::Newline, len))
            }
            '<' if chars.next() == Some('-') => Ok(self.emit(TokenKind::Assignment, 2)),
            '*' => Ok(self.emit(TokenKind::Closure, 1)),
            '+' => Ok(self.emit(TokenKind::Plus, 1)),
            '/' => Ok(self.emit(TokenKind::Alternate, 1)),
            '?' => Ok(self.emit(TokenKind::Optional, 1)),
            '^' => Ok(self.emit(TokenKind::Discard, 1)),
            '(' => Ok(self.emit(TokenKind::OpenGroup, 1)),
            ')' => Ok(self.emit(TokenKind::CloseGroup, 1)),
            '\'' => match self.quoted(start) {
                Some(token) => Ok(token),
                None => self.fail(LexError::UnterminatedLiteral { offset: start }),
            },
            '~' => match chars.next() {
                Some('\'') => match self.quoted(start + 1) {
                    Some(token) => Ok(Token::new(TokenKind::Regexp, token.text, start)),
                    None => self.fail(LexError::UnterminatedRegexp { offset: start }),
                },
                Some(c) if is_identifier_char(c) => {
                    self.pos += 1;
                    let len = self.run_len(is_identifier_char);
                    let mut token = self.emit(TokenKind::Reference, len);
                    token.offset = start;
                    Ok(token)
                }
                _ => self.fail(LexError::UnexpectedChar { ch, offset: start }),
            },
            c if is_identifier_char(c) => {
                let len = self.run_len(is_identifier_char);
                Ok(self.emit(TokenKind::Identifier, len))
            }
            _ => self.fail(LexError::UnexpectedChar { ch, offset: start }),
        }
    }
}

impl<'src> Iterator for Lexer<'src> {
    type Item = Result<Token<'src>, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        Some(self.next_token())
    }
}

/// Tokens produced concurrently by a lexer running on a scoped thread.
///
/// The channel between producer and consumer has no buffer: the producer
/// blocks on every token until the consumer takes it. Once the producer has
/// sent the end token (or an error) it closes the channel, and further
/// receives report [`RecvError`].
#[derive(Debug)]
pub struct TokenStream<'src> {
    receiver: Receiver<Result<Token<'src>, LexError>>,
}

impl<'src> TokenStream<'src> {
    /// Starts tokenizing `source` on a thread owned by `scope`.
    ///
    /// Dropping the stream before it is drained stops the producer at its
    /// next hand-off.
    #[must_use]
    pub fn spawn<'scope>(scope: &'scope Scope<'scope, 'src>, source: &'src str) -> Self {
        let (sender, receiver) = mpsc::sync_channel(0);
        scope.spawn(move || {
            for item in Lexer::new(source) {
                if let Ok(token) = &item {
                    log::trace!("token {:?} {:?} at {}", token.kind, token.text, token.offset);
                }
                if sender.send(item).is_err() {
                    log::debug!("token consumer hung up before end of grammar");
                    break;
                }
            }
        });
        Self { receiver }
    }

    /// Blocks until the producer hands over the next token.
    ///
    /// # Errors
    ///
    /// Returns [`RecvError`] once the producer has finished and closed the
    /// channel.
    pub fn recv(&self) -> Result<Result<Token<'src>, LexError>, RecvError> {
        self.receiver.recv()
    }
}

impl<'src> Iterator for TokenStream<'src> {
    type Item = Result<Token<'src>, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv().ok()
    }
}

/// Tokenizes `source` through a [`TokenStream`] and collects the result.
///
/// # Errors
///
/// Returns the first [`LexError`] the producer reports.
pub fn tokenize(source: &str) -> Result<Vec<Token<'_>>, LexError> {
    thread::scope(|scope| TokenStream::spawn(scope, source).collect())
}

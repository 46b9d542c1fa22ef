//! Builds rule definitions from a token stream.
//!
//! The accepted syntax, lowest precedence first:
//!
//! ```text
//! program    <- (definition newline)* definition?
//! definition <- identifier '<-' expression
//! expression <- sequence ('/' sequence)*
//! sequence   <- postfix+
//! postfix    <- primary ('*' / '+' / '?' / '^')*
//! primary    <- literal / regexp / identifier / '~' identifier / '(' expression ')'
//! ```
//!
//! Identifiers inside expressions become unresolved [`Reference`]s; linking
//! them to definitions is left to [`crate::validate::resolve`].

use super::rules::{Reference, Rule, RuleKind};
use super::GrammarError;
use crate::lexer::{LexError, Token, TokenKind};
use regex::bytes::Regex;
use std::collections::HashSet;
use std::sync::Arc;

/// Recursive-descent builder over a stream of tokens.
pub(crate) struct Builder<'src, I> {
    tokens: I,
    peeked: Option<Token<'src>>,
    last_offset: usize,
    group_depth: usize,
}

impl<'src, I> Builder<'src, I>
where
    I: Iterator<Item = Result<Token<'src>, LexError>>,
{
    pub(crate) fn new(tokens: I) -> Self {
        Self {
            tokens,
            peeked: None,
            last_offset: 0,
            group_depth: 0,
        }
    }

    /// Consumes the whole stream, returning definitions in source order.
    pub(crate) fn build(mut self) -> Result<Vec<Rule>, GrammarError> {
        let mut definitions = Vec::new();
        let mut names = HashSet::new();

        loop {
            self.skip_while(|kind| matches!(kind, TokenKind::Whitespace | TokenKind::Newline))?;
            let token = self.bump()?;
            let name = match token.kind {
                TokenKind::End => break,
                TokenKind::Identifier => token.text,
                _ => return Err(unexpected("rule name", &token)),
            };

            self.skip_blank()?;
            let arrow = self.bump()?;
            if arrow.kind != TokenKind::Assignment {
                return Err(unexpected("'<-'", &arrow));
            }

            let body = self.expression(name)?;
            self.skip_blank()?;
            let terminator = self.peek()?;
            match terminator.kind {
                TokenKind::Newline => {
                    self.bump()?;
                }
                TokenKind::End => {}
                _ => return Err(unexpected("newline", &terminator)),
            }

            if !names.insert(name) {
                return Err(GrammarError::DuplicateRule {
                    name: name.to_string(),
                    offset: token.offset,
                });
            }
            log::debug!("registered rule '{name}' ({})", body.type_name());
            definitions.push(body.renamed(name));
        }

        if definitions.is_empty() {
            return Err(GrammarError::Empty);
        }
        Ok(definitions)
    }

    fn peek(&mut self) -> Result<Token<'src>, GrammarError> {
        if let Some(token) = self.peeked {
            return Ok(token);
        }
        let token = match self.tokens.next() {
            Some(item) => item?,
            None => Token::new(TokenKind::End, "", self.last_offset),
        };
        self.last_offset = token.offset;
        self.peeked = Some(token);
        Ok(token)
    }

    fn bump(&mut self) -> Result<Token<'src>, GrammarError> {
        let token = self.peek()?;
        self.peeked = None;
        Ok(token)
    }

    fn skip_while(&mut self, skip: impl Fn(TokenKind) -> bool) -> Result<(), GrammarError> {
        while skip(self.peek()?.kind) {
            self.bump()?;
        }
        Ok(())
    }

    /// Skips spaces, and newlines too while inside a group.
    fn skip_blank(&mut self) -> Result<(), GrammarError> {
        let in_group = self.group_depth > 0;
        self.skip_while(|kind| {
            kind == TokenKind::Whitespace || (in_group && kind == TokenKind::Newline)
        })
    }

    fn expression(&mut self, rule: &str) -> Result<Rule, GrammarError> {
        let first = self.sequence(rule)?;
        let mut rest = Vec::new();
        loop {
            self.skip_blank()?;
            if self.peek()?.kind != TokenKind::Alternate {
                break;
            }
            self.bump()?;
            rest.push(self.sequence(rule)?);
        }

        // `a / b / c` nests to the right: a / (b / c)
        let Some(mut choice) = rest.pop() else {
            return Ok(first);
        };
        while let Some(left) = rest.pop() {
            choice = Rule::new(rule, RuleKind::Alternate(Arc::new(left), Arc::new(choice)));
        }
        Ok(Rule::new(
            rule,
            RuleKind::Alternate(Arc::new(first), Arc::new(choice)),
        ))
    }

    fn sequence(&mut self, rule: &str) -> Result<Rule, GrammarError> {
        let mut items = Vec::new();
        loop {
            self.skip_blank()?;
            match self.peek()?.kind {
                TokenKind::Literal
                | TokenKind::Regexp
                | TokenKind::Reference
                | TokenKind::Identifier
                | TokenKind::OpenGroup => items.push(self.postfix(rule)?),
                _ => break,
            }
        }

        match items.len() {
            0 => {
                let token = self.peek()?;
                Err(unexpected("expression", &token))
            }
            1 => Ok(items.remove(0)),
            _ => Ok(Rule::new(
                rule,
                RuleKind::Concat(items.into_iter().map(Arc::new).collect()),
            )),
        }
    }

    fn postfix(&mut self, rule: &str) -> Result<Rule, GrammarError> {
        let mut node = self.primary(rule)?;
        loop {
            let (suffix, wrap): (&str, fn(Arc<Rule>) -> RuleKind) = match self.peek()?.kind {
                TokenKind::Closure => ("*", RuleKind::Star),
                TokenKind::Plus => ("+", RuleKind::Plus),
                TokenKind::Optional => ("?", RuleKind::Optional),
                TokenKind::Discard => ("^", RuleKind::Discard),
                _ => return Ok(node),
            };
            self.bump()?;
            node = Rule::new(format!("{}{suffix}", node.name()), wrap(Arc::new(node)));
        }
    }

    fn primary(&mut self, rule: &str) -> Result<Rule, GrammarError> {
        let token = self.bump()?;
        match token.kind {
            TokenKind::Literal => Ok(Rule::new(
                format!("'{}'", token.text),
                RuleKind::Literal(unescape_literal(token.text)),
            )),
            TokenKind::Regexp => {
                let pattern = token.text.replace("\\'", "'");
                let regex = Regex::new(&format!("^(?:{pattern})")).map_err(|e| {
                    GrammarError::InvalidPattern {
                        pattern: pattern.clone(),
                        offset: token.offset,
                        message: e.to_string(),
                    }
                })?;
                Ok(Rule::new(format!("~'{}'", token.text), RuleKind::Pattern(regex)))
            }
            TokenKind::Identifier | TokenKind::Reference => Ok(Rule::new(
                token.text,
                RuleKind::Reference(Reference::new(token.text)),
            )),
            TokenKind::OpenGroup => {
                self.group_depth += 1;
                let inner = self.expression(rule)?;
                self.skip_blank()?;
                let close = self.bump()?;
                if close.kind != TokenKind::CloseGroup {
                    return Err(unexpected("')'", &close));
                }
                self.group_depth -= 1;
                Ok(inner)
            }
            _ => Err(unexpected("expression", &token)),
        }
    }
}

fn unexpected(expected: &str, token: &Token<'_>) -> GrammarError {
    let found = match token.kind {
        TokenKind::End => "end of grammar".to_string(),
        TokenKind::Newline => "newline".to_string(),
        _ => format!("'{}'", token.text),
    };
    GrammarError::Syntax {
        expected: expected.to_string(),
        found,
        offset: token.offset,
    }
}

/// Resolves the escapes of a literal body: `\n`, `\t`, `\r`, `\0`, and any
/// other escaped character standing for itself.
fn unescape_literal(text: &str) -> Vec<u8> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out.into_bytes()
}

//! A parsing expression grammar engine driven by textual grammars.
//!
//! ```text
//! pair  <- key ws^ '=' ws^ value
//! key   <- ~'[a-z]+'
//! value <- ~'[0-9]+' / key
//! ws    <- ' '*
//! ```
//!
//! [`parse_grammar`] turns text like the above into a [`Grammar`], and
//! [`Grammar::parse`] matches input against its first rule, producing a
//! [`ParseTree`].
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(clippy::multiple_crate_versions)]

/// Tokenizer for grammar source.
///
/// Runs as a producer on its own thread and hands tokens one at a time to
/// whoever builds the rule graph.
pub mod lexer;

/// Immutable input buffer with anchored literal and pattern lookups.
pub mod source;

/// Compiled grammars: building them from text and matching input.
///
/// The rule graph and the matching engine live in [`grammar::rules`].
pub mod grammar;

/// The labeled tree produced by a successful parse.
pub mod tree;

/// Reference resolution and static checks over a rule graph.
///
/// Validation protects the matching engine from graphs it cannot run:
/// dangling references, and rules that recurse without consuming input.
pub mod validate;

pub use grammar::rules::{Match, MatchError, Rule, RuleKind};
pub use grammar::{parse_grammar, parse_grammar_with, Grammar, GrammarError, Options, ParseError};
pub use lexer::{LexError, Token, TokenKind};
pub use source::Source;
pub use tree::ParseTree;
pub use validate::ValidationError;

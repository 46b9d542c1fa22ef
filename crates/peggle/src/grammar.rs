//! Compiled grammars and the entry points for building and running them.
//!
//! A [`Grammar`] is the resolved rule graph of a textual grammar. It owns
//! every named rule, knows which one is the entry point, and matches input
//! by invoking that rule at offset 0. Once built it is read-only, so one
//! grammar can serve any number of parses, from any number of threads.

mod builder;
pub mod rules;

use crate::lexer::{LexError, TokenStream};
use crate::source::Source;
use crate::tree::ParseTree;
use crate::validate::{self, ValidationError};
use builder::Builder;
use facet::Facet;
use rules::{Match, MatchContext, MatchError, Rule, DEFAULT_MAX_DEPTH, DEFAULT_NEIGHBORHOOD};
use std::collections::HashMap;
use std::io::{self, Read};
use std::sync::Arc;
use std::thread;

/// Settings for building and running a [`Grammar`].
///
/// Every field is optional when loaded from JSON with
/// [`Options::from_json`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Facet)]
pub struct Options {
    /// Rule to start matching from. Defaults to the first definition.
    #[facet(default)]
    pub entry: Option<String>,

    /// How many bytes of input a [`MatchError`] quotes. Defaults to 10.
    #[facet(default)]
    pub neighborhood: Option<usize>,

    /// When set, a discarded expression that fails to match succeeds
    /// without consuming anything instead of failing.
    #[facet(default)]
    pub lenient_discard: bool,

    /// How many rule references may nest during one match before it fails.
    /// Defaults to 256.
    #[facet(default)]
    pub max_depth: Option<usize>,
}

impl Options {
    /// Parses options from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`GrammarError::Config`] if the JSON is invalid or does not
    /// describe an `Options` object.
    pub fn from_json(json: &str) -> Result<Self, GrammarError> {
        facet_json::from_str(json).map_err(|e| GrammarError::Config(e.to_string()))
    }

    /// The effective excerpt width for match errors.
    #[must_use]
    pub fn neighborhood_width(&self) -> usize {
        self.neighborhood.unwrap_or(DEFAULT_NEIGHBORHOOD)
    }

    /// The effective nesting limit for rule references.
    #[must_use]
    pub fn depth_limit(&self) -> usize {
        self.max_depth.unwrap_or(DEFAULT_MAX_DEPTH)
    }
}

/// Possible errors raised while turning grammar source into a [`Grammar`].
#[derive(Debug)]
pub enum GrammarError {
    /// The grammar source contains a malformed token.
    Lex(LexError),

    /// A token appeared where the grammar syntax does not allow it.
    Syntax {
        /// What the builder was looking for.
        expected: String,
        /// What it found instead.
        found: String,
        /// Offset of the offending token.
        offset: usize,
    },

    /// Two definitions share a name.
    DuplicateRule {
        /// The repeated name.
        name: String,
        /// Offset of the second definition.
        offset: usize,
    },

    /// A `~'...'` pattern is not a valid regular expression.
    InvalidPattern {
        /// The pattern as written.
        pattern: String,
        /// Offset of the pattern token.
        offset: usize,
        /// The regex compiler's explanation.
        message: String,
    },

    /// The grammar source defines no rules.
    Empty,

    /// The rule graph failed resolution or validation.
    Validation(ValidationError),

    /// Options could not be loaded.
    Config(String),
}

impl std::fmt::Display for GrammarError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            GrammarError::Lex(e) => write!(f, "lexical error: {e}"),
            GrammarError::Syntax {
                expected,
                found,
                offset,
            } => write!(f, "expected {expected} but found {found} at offset {offset}"),
            GrammarError::DuplicateRule { name, offset } => {
                write!(f, "rule '{name}' defined twice (second definition at offset {offset})")
            }
            GrammarError::InvalidPattern {
                pattern,
                offset,
                message,
            } => write!(f, "invalid pattern ~'{pattern}' at offset {offset}: {message}"),
            GrammarError::Empty => write!(f, "grammar defines no rules"),
            GrammarError::Validation(e) => write!(f, "validation error: {e}"),
            GrammarError::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for GrammarError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GrammarError::Lex(e) => Some(e),
            GrammarError::Validation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LexError> for GrammarError {
    fn from(e: LexError) -> Self {
        GrammarError::Lex(e)
    }
}

impl From<ValidationError> for GrammarError {
    fn from(e: ValidationError) -> Self {
        GrammarError::Validation(e)
    }
}

/// Errors from parsing input supplied as a reader or by rule name.
#[derive(Debug)]
pub enum ParseError {
    /// Reading the input failed.
    Io(io::Error),
    /// The input did not match.
    Match(MatchError),
    /// No rule has the requested name.
    UnknownRule(String),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ParseError::Io(e) => write!(f, "failed to read input: {e}"),
            ParseError::Match(e) => write!(f, "{e}"),
            ParseError::UnknownRule(name) => write!(f, "no rule named '{name}'"),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::Io(e) => Some(e),
            ParseError::Match(e) => Some(e),
            ParseError::UnknownRule(_) => None,
        }
    }
}

impl From<io::Error> for ParseError {
    fn from(e: io::Error) -> Self {
        ParseError::Io(e)
    }
}

impl From<MatchError> for ParseError {
    fn from(e: MatchError) -> Self {
        ParseError::Match(e)
    }
}

/// A resolved rule graph, ready to match input.
#[derive(Debug)]
pub struct Grammar {
    rules: Vec<Arc<Rule>>,
    index: HashMap<String, usize>,
    entry: usize,
    options: Options,
}

/// Builds a [`Grammar`] from its textual definition with default options.
///
/// # Errors
///
/// Returns a [`GrammarError`] if the source fails to tokenize, does not
/// follow the grammar syntax, or describes an invalid rule graph.
pub fn parse_grammar(source: &str) -> Result<Grammar, GrammarError> {
    parse_grammar_with(source, Options::default())
}

/// Builds a [`Grammar`] from its textual definition.
///
/// Tokens are produced on a separate thread and handed to the builder one
/// at a time.
///
/// # Errors
///
/// Returns a [`GrammarError`] if the source fails to tokenize, does not
/// follow the grammar syntax, or describes an invalid rule graph.
pub fn parse_grammar_with(source: &str, options: Options) -> Result<Grammar, GrammarError> {
    let definitions =
        thread::scope(|scope| Builder::new(TokenStream::spawn(scope, source)).build())?;
    Grammar::from_definitions(definitions, options)
}

impl Grammar {
    /// Assembles a grammar from named definitions, then resolves and
    /// validates it. The first definition is the entry rule unless
    /// `options.entry` names another.
    ///
    /// # Errors
    ///
    /// Returns [`GrammarError::Empty`] for no definitions,
    /// [`GrammarError::DuplicateRule`] for a repeated name, and
    /// [`GrammarError::Validation`] if resolution or validation fails.
    pub fn from_definitions(
        definitions: Vec<Rule>,
        options: Options,
    ) -> Result<Self, GrammarError> {
        if definitions.is_empty() {
            return Err(GrammarError::Empty);
        }

        let mut index = HashMap::with_capacity(definitions.len());
        let mut rules = Vec::with_capacity(definitions.len());
        for rule in definitions {
            if index.insert(rule.name().to_string(), rules.len()).is_some() {
                return Err(GrammarError::DuplicateRule {
                    name: rule.name().to_string(),
                    offset: 0,
                });
            }
            rules.push(Arc::new(rule));
        }

        let entry = match &options.entry {
            Some(name) => *index
                .get(name)
                .ok_or_else(|| ValidationError::UndefinedEntry(name.clone()))?,
            None => 0,
        };

        let grammar = Self {
            rules,
            index,
            entry,
            options,
        };
        validate::resolve(&grammar)?;
        validate::validate(&grammar)?;
        Ok(grammar)
    }

    /// Looks up a named rule.
    #[must_use]
    pub fn rule(&self, name: &str) -> Option<&Arc<Rule>> {
        self.position(name).map(|i| &self.rules[i])
    }

    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// The entry rule.
    #[must_use]
    pub fn root(&self) -> &Arc<Rule> {
        &self.rules[self.entry]
    }

    /// Named rules in definition order.
    pub fn rules(&self) -> impl ExactSizeIterator<Item = &Arc<Rule>> {
        self.rules.iter()
    }

    /// Number of named rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if the grammar has no rules. Built grammars always
    /// have at least one.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The options this grammar was built with.
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    fn run(&self, rule: &Rule, source: &Source) -> Result<Match, MatchError> {
        let mut cx = MatchContext::new(source)
            .with_neighborhood(self.options.neighborhood_width())
            .with_lenient_discard(self.options.lenient_discard)
            .with_max_depth(self.options.depth_limit());
        let result = rule.match_at(&mut cx, 0);
        if let Some(err) = cx.overflowed() {
            return Err(err.clone());
        }
        result.map_err(|err| cx.into_furthest().unwrap_or(err))
    }

    /// Matches the entry rule at the start of `input`, reporting the tree
    /// (if any) and how many bytes were consumed.
    ///
    /// # Errors
    ///
    /// Returns the furthest [`MatchError`] reached if the entry rule fails.
    pub fn match_prefix(&self, input: impl AsRef<[u8]>) -> Result<Match, MatchError> {
        self.run(self.root(), &Source::from_bytes(input.as_ref()))
    }

    /// Parses `input` with the entry rule.
    ///
    /// Input left over after the entry rule succeeds is not an error. If
    /// the entry rule kept no tree, an empty node labeled with its name is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns the furthest [`MatchError`] reached if the entry rule fails.
    pub fn parse(&self, input: impl AsRef<[u8]>) -> Result<ParseTree, MatchError> {
        self.parse_source(&Source::from_bytes(input.as_ref()))
    }

    /// Parses an already materialized [`Source`] with the entry rule.
    ///
    /// # Errors
    ///
    /// Returns the furthest [`MatchError`] reached if the entry rule fails.
    pub fn parse_source(&self, source: &Source) -> Result<ParseTree, MatchError> {
        let root = self.root();
        let matched = self.run(root, source)?;
        Ok(matched
            .tree
            .unwrap_or_else(|| ParseTree::node(root.name(), Vec::new())))
    }

    /// Reads `reader` to the end and parses it with the entry rule.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Io`] if reading fails and [`ParseError::Match`]
    /// if the input does not match.
    pub fn parse_reader<R: Read>(&self, reader: R) -> Result<ParseTree, ParseError> {
        let source = Source::new(reader)?;
        Ok(self.parse_source(&source)?)
    }

    /// Parses `input` starting from the rule called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::UnknownRule`] if there is no such rule and
    /// [`ParseError::Match`] if the input does not match.
    pub fn parse_rule(&self, name: &str, input: impl AsRef<[u8]>) -> Result<ParseTree, ParseError> {
        let rule = self
            .rule(name)
            .ok_or_else(|| ParseError::UnknownRule(name.to_string()))?;
        let matched = self.run(rule, &Source::from_bytes(input.as_ref()))?;
        Ok(matched
            .tree
            .unwrap_or_else(|| ParseTree::node(rule.name(), Vec::new())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_accepts_empty_input() {
        let grammar = parse_grammar("r <- 'x'*").unwrap();
        let matched = grammar.match_prefix("").unwrap();
        assert_eq!(matched.len, 0);
        assert_eq!(matched.tree, Some(ParseTree::node("r", vec![])));
    }

    #[test]
    fn test_plus_rejects_empty_input() {
        let grammar = parse_grammar("r <- 'x'+").unwrap();
        let err = grammar.parse("").unwrap_err();
        assert_eq!(err.position, 0);
        assert_eq!(err.expected, vec!["'x'".to_string()]);
    }

    #[test]
    fn test_alternate_takes_right_branch() {
        let grammar = parse_grammar("r <- 'a' / 'b'").unwrap();
        let matched = grammar.match_prefix("b").unwrap();
        assert_eq!(matched.len, 1);
        assert_eq!(matched.tree.unwrap().text().as_deref(), Some("b"));
    }

    #[test]
    fn test_forward_and_recursive_references() {
        let grammar = parse_grammar(
            "list <- '[' items? ']'\n\
             items <- value (',' value)*\n\
             value <- ~'[0-9]+' / list\n",
        )
        .unwrap();
        let tree = grammar.parse("[1,[2,3],[]]").unwrap();
        assert_eq!(tree.label(), "list");
        assert_eq!(tree.to_bytes(), b"[1,[2,3],[]]");
    }

    #[test]
    fn test_discard_drops_subtrees() {
        let grammar = parse_grammar("pair <- key ws^ '=' ws^ key\nkey <- ~'[a-z]+'\nws <- ' '*").unwrap();
        let tree = grammar.parse("a = b").unwrap();
        let labels: Vec<_> = tree.children().iter().map(ParseTree::label).collect();
        assert_eq!(labels, vec!["key", "'='", "key"]);
        assert_eq!(tree.to_bytes(), b"a=b");
    }

    #[test]
    fn test_trailing_input_is_not_an_error() {
        let grammar = parse_grammar("r <- 'ab'").unwrap();
        assert_eq!(grammar.match_prefix("abcd").unwrap().len, 2);
        assert!(grammar.parse("abcd").is_ok());
    }

    #[test]
    fn test_error_reports_furthest_position() {
        let grammar = parse_grammar("r <- ('a' 'b')* 'c'").unwrap();
        let err = grammar.parse("abax").unwrap_err();
        assert_eq!(err.position, 3);
        assert_eq!(err.neighborhood, "x");
        assert_eq!(err.to_string(), "expected 'b' at offset 3: \"x\"");
    }

    #[test]
    fn test_entry_option() {
        let options = Options {
            entry: Some("b".to_string()),
            ..Options::default()
        };
        let grammar = parse_grammar_with("a <- 'a'\nb <- 'b'", options).unwrap();
        assert_eq!(grammar.root().name(), "b");
        assert!(grammar.parse("b").is_ok());

        let options = Options {
            entry: Some("c".to_string()),
            ..Options::default()
        };
        assert!(matches!(
            parse_grammar_with("a <- 'a'", options),
            Err(GrammarError::Validation(ValidationError::UndefinedEntry(_)))
        ));
    }

    #[test]
    fn test_lenient_discard_option() {
        let grammar = parse_grammar("r <- 'a'^ 'b'").unwrap();
        assert!(grammar.parse("b").is_err());

        let options = Options {
            lenient_discard: true,
            ..Options::default()
        };
        let grammar = parse_grammar_with("r <- 'a'^ 'b'", options).unwrap();
        assert_eq!(grammar.parse("b").unwrap(), ParseTree::leaf("'b'", "b"));
    }

    #[test]
    fn test_deep_nesting_fails_cleanly() {
        let grammar = parse_grammar("v <- '[' v? ']'").unwrap();
        let input = "[".repeat(200_000);
        let err = grammar.parse(&input).unwrap_err();
        assert_eq!(err.position, DEFAULT_MAX_DEPTH + 1);
        assert_eq!(err.expected, vec![format!("nesting depth within {DEFAULT_MAX_DEPTH}")]);

        let shallow = "[".repeat(20) + &"]".repeat(20);
        assert_eq!(grammar.match_prefix(&shallow).unwrap().len, 40);

        let options = Options {
            max_depth: Some(10),
            ..Options::default()
        };
        let grammar = parse_grammar_with("v <- '[' v? ']'", options).unwrap();
        assert_eq!(grammar.parse(&shallow).unwrap_err().position, 11);
    }

    #[test]
    fn test_options_from_json() {
        let options = Options::from_json(r#"{"entry": "value", "neighborhood": 4}"#).unwrap();
        assert_eq!(options.entry.as_deref(), Some("value"));
        assert_eq!(options.neighborhood_width(), 4);
        assert!(!options.lenient_discard);
        assert_eq!(options.depth_limit(), DEFAULT_MAX_DEPTH);
        assert_eq!(Options::from_json(r#"{"max_depth": 32}"#).unwrap().depth_limit(), 32);

        assert_eq!(Options::default().neighborhood_width(), DEFAULT_NEIGHBORHOOD);
        assert!(matches!(
            Options::from_json("not json"),
            Err(GrammarError::Config(_))
        ));
    }

    #[test]
    fn test_parse_rule_and_reader() {
        let grammar = parse_grammar("word <- ~'[a-z]+'\nnum <- ~'[0-9]+'").unwrap();
        assert_eq!(
            grammar.parse_rule("num", "42").unwrap(),
            ParseTree::leaf("num", "42")
        );
        assert!(matches!(
            grammar.parse_rule("nope", "42"),
            Err(ParseError::UnknownRule(_))
        ));
        let tree = grammar.parse_reader(&b"hello"[..]).unwrap();
        assert_eq!(tree.text().as_deref(), Some("hello"));
    }

    #[test]
    fn test_grammar_is_shareable_across_threads() {
        let grammar = parse_grammar("r <- ~'[0-9]+' (',' r)?").unwrap();
        thread::scope(|scope| {
            for input in ["1", "1,2", "3,4,5"] {
                let grammar = &grammar;
                scope.spawn(move || assert_eq!(grammar.parse(input).unwrap().to_bytes(), input.as_bytes()));
            }
        });
    }

    #[test]
    fn test_empty_root_tree() {
        let grammar = parse_grammar("r <- 'a'?").unwrap();
        assert_eq!(grammar.parse("z").unwrap(), ParseTree::node("r", vec![]));
    }
}

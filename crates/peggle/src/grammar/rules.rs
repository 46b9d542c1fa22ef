//! Rule nodes of a compiled grammar and the matching engine behind them.
//!
//! Every node of the rule graph is a [`Rule`]: either a named definition or
//! an unnamed combinator synthesized from child rules. Matching takes the
//! start position explicitly and reports how many bytes were consumed, so no
//! cursor is shared between attempts and backtracking needs no undo step.

use crate::source::Source;
use crate::tree::ParseTree;
use regex::bytes::Regex;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

/// Default number of input bytes quoted in a [`MatchError`].
pub const DEFAULT_NEIGHBORHOOD: usize = 10;

/// Default limit on nested rule references during one match.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// A node of the rule graph.
///
/// Named rules are owned by the [`Grammar`](crate::grammar::Grammar);
/// combinator nodes own their children through [`Arc`]. The only link that
/// does not own its target is a [`Reference`].
#[derive(Debug)]
pub struct Rule {
    name: String,
    kind: RuleKind,
}

/// What a [`Rule`] matches, with its child rules.
#[derive(Debug)]
pub enum RuleKind {
    /// Exactly these bytes.
    Literal(Vec<u8>),
    /// An anchored regular expression.
    Pattern(Regex),
    /// Another named rule, looked up when the graph is resolved.
    Reference(Reference),
    /// Each child in turn.
    Concat(Vec<Arc<Rule>>),
    /// One or more repetitions.
    Plus(Arc<Rule>),
    /// Zero or more repetitions.
    Star(Arc<Rule>),
    /// Zero or one occurrence.
    Optional(Arc<Rule>),
    /// Ordered choice: the left child, else the right one.
    Alternate(Arc<Rule>, Arc<Rule>),
    /// The child, with its sub-tree dropped from the output.
    Discard(Arc<Rule>),
}

/// A placeholder standing in for a named rule.
///
/// The placeholder starts out holding only the target's name. The
/// resolution pass stores a [`Weak`] link to the target, which is upgraded
/// on every match, so a rule may refer to itself or to rules defined after
/// it.
#[derive(Debug)]
pub struct Reference {
    target: String,
    link: OnceLock<Weak<Rule>>,
}

impl Reference {
    /// Creates an unresolved reference to `target`.
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            link: OnceLock::new(),
        }
    }

    /// Name of the referenced rule.
    #[must_use]
    pub fn target_name(&self) -> &str {
        &self.target
    }

    /// Links the placeholder to `rule`. Returns `false` if it was already linked.
    #[must_use]
    pub fn resolve(&self, rule: &Arc<Rule>) -> bool {
        self.link.set(Arc::downgrade(rule)).is_ok()
    }

    /// The referenced rule, if resolved and still alive.
    #[must_use]
    pub fn target(&self) -> Option<Arc<Rule>> {
        self.link.get().and_then(Weak::upgrade)
    }

    /// Returns `true` once the resolution pass has linked this placeholder.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.link.get().is_some()
    }
}

impl Rule {
    /// Creates a rule node.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: RuleKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Returns the same rule under another name.
    #[must_use]
    pub fn renamed(self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self
        }
    }

    /// The rule's name, also used as the label of the trees it builds.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// What the rule matches.
    #[must_use]
    pub fn kind(&self) -> &RuleKind {
        &self.kind
    }

    /// Returns the canonical string name of this rule's kind.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            RuleKind::Literal(_) => "LITERAL",
            RuleKind::Pattern(_) => "PATTERN",
            RuleKind::Reference(_) => "REFERENCE",
            RuleKind::Concat(_) => "CONCAT",
            RuleKind::Plus(_) => "PLUS",
            RuleKind::Star(_) => "STAR",
            RuleKind::Optional(_) => "OPTIONAL",
            RuleKind::Alternate(..) => "ALTERNATE",
            RuleKind::Discard(_) => "DISCARD",
        }
    }

    /// Returns `true` if this rule matches input directly.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, RuleKind::Literal(_) | RuleKind::Pattern(_))
    }

    /// The child rules this node is built from. References have none.
    #[must_use]
    pub fn dependencies(&self) -> Vec<&Arc<Rule>> {
        match &self.kind {
            RuleKind::Literal(_) | RuleKind::Pattern(_) | RuleKind::Reference(_) => Vec::new(),
            RuleKind::Concat(children) => children.iter().collect(),
            RuleKind::Plus(child)
            | RuleKind::Star(child)
            | RuleKind::Optional(child)
            | RuleKind::Discard(child) => vec![child],
            RuleKind::Alternate(left, right) => vec![left, right],
        }
    }

    /// Returns `true` if every reference within this rule has been linked.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        match &self.kind {
            RuleKind::Reference(reference) => reference.is_resolved(),
            _ => self.dependencies().iter().all(|dep| dep.is_resolved()),
        }
    }

    /// Human-readable form of what this rule expects, for error messages.
    fn expectation(&self) -> String {
        match &self.kind {
            RuleKind::Literal(bytes) => format!("'{}'", String::from_utf8_lossy(bytes).escape_debug()),
            RuleKind::Pattern(regex) => format!("~'{}'", unanchored(regex.as_str())),
            _ => self.name.clone(),
        }
    }

    /// Attempts to match this rule at `pos`.
    ///
    /// # Errors
    ///
    /// Returns a [`MatchError`] describing what was expected where the
    /// attempt failed.
    pub fn match_at(&self, cx: &mut MatchContext<'_>, pos: usize) -> Result<Match, MatchError> {
        if let Some(err) = &cx.overflow {
            return Err(err.clone());
        }
        match &self.kind {
            RuleKind::Literal(bytes) => match cx.source.consume_literal(bytes, pos) {
                Some(matched) => Ok(Match::terminal(&self.name, matched)),
                None => Err(cx.fail(pos, self.expectation())),
            },
            RuleKind::Pattern(regex) => match cx.source.consume_pattern(regex, pos) {
                Some(matched) => Ok(Match::terminal(&self.name, matched)),
                None => Err(cx.fail(pos, self.expectation())),
            },
            RuleKind::Reference(reference) => match reference.target() {
                Some(target) => {
                    if cx.depth >= cx.max_depth {
                        return Err(cx.overflow_at(pos));
                    }
                    cx.depth += 1;
                    let result = target.match_at(cx, pos);
                    cx.depth -= 1;
                    result
                }
                None => Err(cx.fail(pos, format!("resolved rule `{}`", reference.target))),
            },
            RuleKind::Concat(children) => {
                let mut trees = Vec::with_capacity(children.len());
                let mut len = 0;
                for child in children {
                    let matched = child.match_at(cx, pos + len)?;
                    trees.extend(matched.tree);
                    len += matched.len;
                }
                let tree = match trees.len() {
                    0 => None,
                    1 => trees.pop(),
                    _ => Some(ParseTree::node(&self.name, trees)),
                };
                Ok(Match { tree, len })
            }
            RuleKind::Plus(child) => {
                let first = child.match_at(cx, pos)?;
                Ok(self.repeat(child, cx, pos, Some(first)))
            }
            RuleKind::Star(child) => Ok(self.repeat(child, cx, pos, None)),
            RuleKind::Optional(child) => Ok(child.match_at(cx, pos).unwrap_or_default()),
            RuleKind::Alternate(left, right) => match left.match_at(cx, pos) {
                Ok(matched) => Ok(matched),
                Err(left_err) => right
                    .match_at(cx, pos)
                    .map_err(|right_err| left_err.furthest(right_err)),
            },
            RuleKind::Discard(child) => match child.match_at(cx, pos) {
                Ok(matched) => Ok(Match {
                    tree: None,
                    len: matched.len,
                }),
                Err(_) if cx.lenient_discard => Ok(Match::default()),
                Err(err) => Err(err),
            },
        }
    }

    /// Collects matches of `child` until it fails or stops consuming input.
    fn repeat(
        &self,
        child: &Rule,
        cx: &mut MatchContext<'_>,
        start: usize,
        first: Option<Match>,
    ) -> Match {
        let mut children = Vec::new();
        let mut pos = start;
        if let Some(first) = first {
            children.extend(first.tree);
            pos += first.len;
            if first.len == 0 {
                return Match {
                    tree: Some(ParseTree::node(&self.name, children)),
                    len: 0,
                };
            }
        }
        while let Ok(matched) = child.match_at(cx, pos) {
            // a zero-length success would repeat forever at the same position
            if matched.len == 0 {
                break;
            }
            children.extend(matched.tree);
            pos += matched.len;
        }
        Match {
            tree: Some(ParseTree::node(&self.name, children)),
            len: pos - start,
        }
    }
}

/// Strips the `^(?:` ... `)` wrapper added when patterns are compiled.
fn unanchored(pattern: &str) -> &str {
    pattern
        .strip_prefix("^(?:")
        .and_then(|p| p.strip_suffix(')'))
        .unwrap_or(pattern)
}

/// A successful match: the tree it built, if any, and the bytes it consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Match {
    /// The sub-tree, or `None` if nothing was kept (discards, empty optionals).
    pub tree: Option<ParseTree>,
    /// Number of input bytes consumed.
    pub len: usize,
}

impl Match {
    fn terminal(label: &str, matched: &[u8]) -> Self {
        let tree = (!matched.is_empty()).then(|| ParseTree::leaf(label, matched));
        Self {
            tree,
            len: matched.len(),
        }
    }
}

/// Why a match attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchError {
    /// Byte offset in the input where the failing construct was tried.
    pub position: usize,
    /// The constructs that would have been accepted there.
    pub expected: Vec<String>,
    /// A short excerpt of the input starting at `position`.
    pub neighborhood: String,
}

impl MatchError {
    /// Keeps whichever error got further into the input, merging the
    /// expectations of errors at the same position.
    #[must_use]
    pub fn furthest(mut self, other: MatchError) -> MatchError {
        match self.position.cmp(&other.position) {
            std::cmp::Ordering::Greater => self,
            std::cmp::Ordering::Less => other,
            std::cmp::Ordering::Equal => {
                for expected in other.expected {
                    if !self.expected.contains(&expected) {
                        self.expected.push(expected);
                    }
                }
                self
            }
        }
    }
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "expected {} at offset {}: {:?}",
            self.expected.join(" or "),
            self.position,
            self.neighborhood
        )
    }
}

impl std::error::Error for MatchError {}

/// Per-attempt state: the input, the furthest failure seen so far and the
/// current reference nesting depth.
///
/// Once the nesting limit is hit every further match in the attempt fails
/// with the same error, so the whole attempt unwinds instead of overflowing
/// the stack.
#[derive(Debug)]
pub struct MatchContext<'s> {
    source: &'s Source,
    neighborhood: usize,
    lenient_discard: bool,
    depth: usize,
    max_depth: usize,
    furthest: Option<MatchError>,
    overflow: Option<MatchError>,
}

impl<'s> MatchContext<'s> {
    /// Creates a context over `source` with default settings.
    #[must_use]
    pub fn new(source: &'s Source) -> Self {
        Self {
            source,
            neighborhood: DEFAULT_NEIGHBORHOOD,
            lenient_discard: false,
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            furthest: None,
            overflow: None,
        }
    }

    /// Sets how many input bytes an error quotes.
    #[must_use]
    pub fn with_neighborhood(mut self, width: usize) -> Self {
        self.neighborhood = width;
        self
    }

    /// Makes a failing discard succeed with zero length instead of failing.
    #[must_use]
    pub fn with_lenient_discard(mut self, lenient: bool) -> Self {
        self.lenient_discard = lenient;
        self
    }

    /// Sets how many rule references may be nested inside one another.
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// The input being matched.
    #[must_use]
    pub fn source(&self) -> &'s Source {
        self.source
    }

    /// Builds an error for `expected` at `pos` and records it if it is the
    /// furthest failure so far.
    fn fail(&mut self, pos: usize, expected: String) -> MatchError {
        let err = self.error_at(pos, expected);
        self.furthest = Some(match self.furthest.take() {
            Some(prev) => prev.furthest(err.clone()),
            None => err.clone(),
        });
        err
    }

    fn error_at(&self, pos: usize, expected: String) -> MatchError {
        MatchError {
            position: pos,
            expected: vec![expected],
            neighborhood: String::from_utf8_lossy(self.source.neighborhood(pos, self.neighborhood))
                .into_owned(),
        }
    }

    fn overflow_at(&mut self, pos: usize) -> MatchError {
        let err = self.error_at(pos, format!("nesting depth within {}", self.max_depth));
        self.overflow = Some(err.clone());
        err
    }

    /// The error that ended the attempt at the nesting limit, if any.
    #[must_use]
    pub fn overflowed(&self) -> Option<&MatchError> {
        self.overflow.as_ref()
    }

    /// The failure to report for this attempt: the nesting overflow if one
    /// happened, otherwise the furthest failure recorded.
    #[must_use]
    pub fn into_furthest(self) -> Option<MatchError> {
        self.overflow.or(self.furthest)
    }
}

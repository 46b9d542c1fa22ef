//! Resolution and validation passes over a built rule graph.
//!
//! [`resolve`] links every reference placeholder to the named rule it
//! stands for. [`validate`] then checks the linked graph: rules that can
//! call themselves without consuming input are rejected, and rules that the
//! entry rule never reaches are reported as warnings.

use crate::grammar::rules::{Reference, Rule, RuleKind};
use crate::grammar::Grammar;
use regex_syntax::ParserBuilder;
use std::collections::HashSet;

/// A structural problem in a rule graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A reference names a rule that was never defined.
    UndefinedRule {
        /// The missing rule.
        name: String,
        /// The definition containing the reference.
        referenced_in: String,
    },
    /// The configured entry rule does not exist.
    UndefinedEntry(String),
    /// These rules can reach themselves without consuming input.
    LeftRecursion(Vec<String>),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ValidationError::UndefinedRule {
                name,
                referenced_in,
            } => write!(
                f,
                "rule '{name}' not found (referenced in rule '{referenced_in}')"
            ),
            ValidationError::UndefinedEntry(name) => write!(f, "entry rule '{name}' not found"),
            ValidationError::LeftRecursion(rules) => {
                write!(f, "left recursion through rules {}", rules.join(" -> "))
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Links every reference in `grammar` to its target rule by name.
///
/// Links are non-owning and looked through at match time, so self and
/// mutual recursion need nothing special here.
///
/// # Errors
///
/// Returns [`ValidationError::UndefinedRule`] for the first reference whose
/// name matches no definition.
pub fn resolve(grammar: &Grammar) -> Result<(), ValidationError> {
    for rule in grammar.rules() {
        let mut missing = None;
        visit_references(rule, &mut |reference| {
            if missing.is_some() {
                return;
            }
            match grammar.rule(reference.target_name()) {
                Some(target) => {
                    if reference.resolve(target) {
                        log::debug!("linked '{}' in rule '{}'", reference.target_name(), rule.name());
                    }
                }
                None => missing = Some(reference.target_name().to_string()),
            }
        });
        if let Some(name) = missing {
            return Err(ValidationError::UndefinedRule {
                name,
                referenced_in: rule.name().to_string(),
            });
        }
    }
    Ok(())
}

/// Performs semantic validation of a resolved [`Grammar`].
///
/// - Warns about rules unreachable from the entry rule.
/// - Detects left recursion, direct or through other rules.
///
/// # Errors
///
/// Returns [`ValidationError::LeftRecursion`] naming the rules of the first
/// left-recursive cycle found.
pub fn validate(grammar: &Grammar) -> Result<(), ValidationError> {
    check_unreachable_rules(grammar);
    check_left_recursion(grammar)
}

fn visit_references(rule: &Rule, f: &mut impl FnMut(&Reference)) {
    if let RuleKind::Reference(reference) = rule.kind() {
        f(reference);
    }
    for dep in rule.dependencies() {
        visit_references(dep, f);
    }
}

fn check_unreachable_rules(grammar: &Grammar) {
    let mut reachable = HashSet::new();
    let mut to_visit = vec![grammar.root().name().to_string()];

    while let Some(rule_name) = to_visit.pop() {
        if !reachable.insert(rule_name.clone()) {
            continue;
        }
        if let Some(rule) = grammar.rule(&rule_name) {
            visit_references(rule, &mut |reference| {
                to_visit.push(reference.target_name().to_string());
            });
        }
    }

    for rule in grammar.rules() {
        if !reachable.contains(rule.name()) {
            log::warn!("unreachable rule '{}'", rule.name());
        }
    }
}

/// Whether `pattern` can match zero bytes at some position.
///
/// Zero-width assertions like `\b` fail on an empty haystack but succeed
/// inside real input, so this goes by the pattern's minimum length.
fn is_nullable_pattern(pattern: &str) -> bool {
    match ParserBuilder::new().utf8(false).build().parse(pattern) {
        Ok(hir) => hir.properties().minimum_len() == Some(0),
        Err(_) => true,
    }
}

/// Whether `rule` can succeed without consuming input, given the current
/// estimate for each named rule.
fn is_nullable(rule: &Rule, grammar: &Grammar, named: &[bool]) -> bool {
    match rule.kind() {
        RuleKind::Literal(bytes) => bytes.is_empty(),
        RuleKind::Pattern(regex) => is_nullable_pattern(regex.as_str()),
        RuleKind::Reference(reference) => grammar
            .position(reference.target_name())
            .is_some_and(|i| named[i]),
        RuleKind::Concat(children) => children.iter().all(|c| is_nullable(c, grammar, named)),
        // a lenient discard turns failure into a zero-length success
        RuleKind::Discard(child) => {
            grammar.options().lenient_discard || is_nullable(child, grammar, named)
        }
        RuleKind::Plus(child) => is_nullable(child, grammar, named),
        RuleKind::Star(_) | RuleKind::Optional(_) => true,
        RuleKind::Alternate(left, right) => {
            is_nullable(left, grammar, named) || is_nullable(right, grammar, named)
        }
    }
}

fn nullable_rules(grammar: &Grammar) -> Vec<bool> {
    let mut named = vec![false; grammar.len()];
    loop {
        let mut changed = false;
        for (i, rule) in grammar.rules().enumerate() {
            if !named[i] && is_nullable(rule, grammar, &named) {
                named[i] = true;
                changed = true;
            }
        }
        if !changed {
            return named;
        }
    }
}

/// Named rules that `rule` may invoke at its own start position.
fn left_calls(rule: &Rule, grammar: &Grammar, nullable: &[bool], out: &mut Vec<usize>) {
    match rule.kind() {
        RuleKind::Literal(_) | RuleKind::Pattern(_) => {}
        RuleKind::Reference(reference) => out.extend(grammar.position(reference.target_name())),
        RuleKind::Concat(children) => {
            for child in children {
                left_calls(child, grammar, nullable, out);
                if !is_nullable(child, grammar, nullable) {
                    break;
                }
            }
        }
        RuleKind::Plus(child)
        | RuleKind::Star(child)
        | RuleKind::Optional(child)
        | RuleKind::Discard(child) => left_calls(child, grammar, nullable, out),
        RuleKind::Alternate(left, right) => {
            left_calls(left, grammar, nullable, out);
            left_calls(right, grammar, nullable, out);
        }
    }
}

fn check_left_recursion(grammar: &Grammar) -> Result<(), ValidationError> {
    let nullable = nullable_rules(grammar);
    let graph: Vec<Vec<usize>> = grammar
        .rules()
        .map(|rule| {
            let mut calls = Vec::new();
            left_calls(rule, grammar, &nullable, &mut calls);
            calls
        })
        .collect();

    for component in strongly_connected(&graph) {
        let cyclic = component.len() > 1 || graph[component[0]].contains(&component[0]);
        if cyclic {
            let mut members = component;
            members.sort_unstable();
            let names = grammar
                .rules()
                .enumerate()
                .filter(|(i, _)| members.binary_search(i).is_ok())
                .map(|(_, rule)| rule.name().to_string())
                .collect();
            return Err(ValidationError::LeftRecursion(names));
        }
    }
    Ok(())
}

/// Tarjan's algorithm; components come out in reverse topological order.
fn strongly_connected(graph: &[Vec<usize>]) -> Vec<Vec<usize>> {
    struct Tarjan<'g> {
        graph: &'g [Vec<usize>],
        index: usize,
        indices: Vec<Option<usize>>,
        low_link: Vec<usize>,
        stack: Vec<usize>,
        on_stack: Vec<bool>,
        components: Vec<Vec<usize>>,
    }

    impl Tarjan<'_> {
        fn strong_connect(&mut self, vertex: usize) {
            self.indices[vertex] = Some(self.index);
            self.low_link[vertex] = self.index;
            self.index += 1;
            self.stack.push(vertex);
            self.on_stack[vertex] = true;

            for &tail in &self.graph[vertex] {
                match self.indices[tail] {
                    None => {
                        self.strong_connect(tail);
                        self.low_link[vertex] = self.low_link[vertex].min(self.low_link[tail]);
                    }
                    Some(index) if self.on_stack[tail] => {
                        self.low_link[vertex] = self.low_link[vertex].min(index);
                    }
                    Some(_) => {}
                }
            }

            if Some(self.low_link[vertex]) == self.indices[vertex] {
                let mut component = Vec::new();
                while let Some(v) = self.stack.pop() {
                    self.on_stack[v] = false;
                    component.push(v);
                    if v == vertex {
                        break;
                    }
                }
                self.components.push(component);
            }
        }
    }

    let mut tarjan = Tarjan {
        graph,
        index: 0,
        indices: vec![None; graph.len()],
        low_link: vec![0; graph.len()],
        stack: Vec::new(),
        on_stack: vec![false; graph.len()],
        components: Vec::new(),
    };
    for vertex in 0..graph.len() {
        if tarjan.indices[vertex].is_none() {
            tarjan.strong_connect(vertex);
        }
    }
    tarjan.components
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{parse_grammar, parse_grammar_with, GrammarError, Options};

    fn validation_error(source: &str) -> ValidationError {
        match parse_grammar(source) {
            Err(GrammarError::Validation(err)) => err,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_undefined_rule() {
        let err = validation_error("prgm <- a b\na <- 'x'\n");
        assert_eq!(
            err,
            ValidationError::UndefinedRule {
                name: "b".to_string(),
                referenced_in: "prgm".to_string(),
            }
        );
        assert_eq!(err.to_string(), "rule 'b' not found (referenced in rule 'prgm')");
    }

    #[test]
    fn test_direct_left_recursion() {
        let err = validation_error("expr <- expr '+' 'n' / 'n'\n");
        assert_eq!(err, ValidationError::LeftRecursion(vec!["expr".to_string()]));
    }

    #[test]
    fn test_left_recursion_through_nullable_prefix() {
        let err = validation_error("a <- ws b\nb <- a 'x' / 'y'\nws <- ' '*\n");
        assert_eq!(
            err,
            ValidationError::LeftRecursion(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_lenient_discard_makes_prefix_nullable() {
        let source = "a <- 'x'^ a / 'y'\n";
        assert!(parse_grammar(source).is_ok());

        let options = Options {
            lenient_discard: true,
            ..Options::default()
        };
        match parse_grammar_with(source, options) {
            Err(GrammarError::Validation(err)) => {
                assert_eq!(err, ValidationError::LeftRecursion(vec!["a".to_string()]));
            }
            other => panic!("expected left recursion, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_width_assertion_is_nullable() {
        let err = validation_error("r <- ~'\\b' r / 'a'\n");
        assert_eq!(err, ValidationError::LeftRecursion(vec!["r".to_string()]));

        assert!(is_nullable_pattern(r"^(?:\b)"));
        assert!(is_nullable_pattern(r"^(?:a*)"));
        assert!(!is_nullable_pattern(r"^(?:a+)"));
        assert!(!is_nullable_pattern(r"^(?:\bword)"));
    }

    #[test]
    fn test_right_recursion_is_fine() {
        let grammar = parse_grammar("list <- item (',' list)?\nitem <- ~'[a-z]+'\n").unwrap();
        assert!(grammar.rules().all(|rule| rule.is_resolved()));
    }

    #[test]
    fn test_strongly_connected() {
        let graph = vec![vec![1], vec![0], vec![2], vec![]];
        let mut components = strongly_connected(&graph);
        for c in &mut components {
            c.sort_unstable();
        }
        components.sort();
        assert_eq!(components, vec![vec![0, 1], vec![2], vec![3]]);
    }
}

//! A small arithmetic grammar exercised end to end.

use peggle::{parse_grammar, Grammar, ParseTree};
use rstest::{fixture, rstest};

const ARITHMETIC: &str = "\
expr   <- term (ws^ addop ws^ term)*
term   <- factor (ws^ mulop ws^ factor)*
factor <- number / '(' ws^ expr ws^ ')'
addop  <- '+' / '-'
mulop  <- '*' / '/'
number <- ~'[0-9]+'
ws     <- ~'[ \\t]*'
";

#[fixture]
fn arithmetic() -> Grammar {
    parse_grammar(ARITHMETIC).unwrap()
}

#[rstest]
#[case("1")]
#[case("1+2")]
#[case("1 + 2 * (3 - 4)")]
#[case("((7))")]
#[case("10/\t2")]
fn accepts_whole_expression(arithmetic: Grammar, #[case] input: &str) {
    let matched = arithmetic.match_prefix(input).unwrap();
    assert_eq!(matched.len, input.len());
    let stripped: Vec<u8> = input.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    assert_eq!(matched.tree.unwrap().to_bytes(), stripped);
}

#[rstest]
#[case("1+", 1)]
#[case("2*(3", 1)]
#[case("4 5", 1)]
fn stops_before_incomplete_tail(arithmetic: Grammar, #[case] input: &str, #[case] len: usize) {
    assert_eq!(arithmetic.match_prefix(input).unwrap().len, len);
}

#[rstest]
#[case("+1", 0)]
#[case(")", 0)]
#[case("(", 1)]
fn rejects_bad_start(arithmetic: Grammar, #[case] input: &str, #[case] position: usize) {
    let err = arithmetic.parse(input).unwrap_err();
    assert_eq!(err.position, position);
}

#[rstest]
fn chosen_alternative_keeps_its_label(arithmetic: Grammar) {
    let tree = arithmetic.parse("6*7").unwrap();
    let labels: Vec<&str> = tree.leaves().iter().map(|leaf| leaf.label()).collect();
    assert_eq!(labels, vec!["number", "'*'", "number"]);
}

#[rstest]
fn subrule_entry(arithmetic: Grammar) {
    let tree = arithmetic.parse_rule("number", "42").unwrap();
    assert_eq!(tree, ParseTree::leaf("number", "42"));
}

//! The labeled tree produced by a successful parse.

use std::borrow::Cow;
use std::fmt;

/// A node in the parse tree.
///
/// A terminal node carries the non-empty bytes it matched and has no
/// children. A composite node carries no bytes and owns its children in
/// input order. Sub-trees that were discarded are simply absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTree {
    label: String,
    data: Option<Vec<u8>>,
    children: Vec<ParseTree>,
}

impl ParseTree {
    /// Creates a terminal node holding `data`.
    #[must_use]
    pub fn leaf(label: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            label: label.into(),
            data: Some(data.into()),
            children: Vec::new(),
        }
    }

    /// Creates a composite node over `children`.
    #[must_use]
    pub fn node(label: impl Into<String>, children: Vec<ParseTree>) -> Self {
        Self {
            label: label.into(),
            data: None,
            children,
        }
    }

    /// The rule or combinator label of this node.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The matched bytes of a terminal node.
    #[must_use]
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// The matched bytes of a terminal node as text, replacing invalid UTF-8.
    #[must_use]
    pub fn text(&self) -> Option<Cow<'_, str>> {
        self.data().map(String::from_utf8_lossy)
    }

    /// Child nodes, in input order.
    #[must_use]
    pub fn children(&self) -> &[ParseTree] {
        &self.children
    }

    /// Returns `true` if this node holds matched bytes.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.data.is_some()
    }

    /// Terminal nodes of the tree, left to right.
    #[must_use]
    pub fn leaves(&self) -> Vec<&ParseTree> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.is_leaf() {
                out.push(node);
            }
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Concatenation of every terminal's bytes, left to right.
    ///
    /// Without discards this equals the input prefix the tree was built from.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.leaves()
            .into_iter()
            .filter_map(ParseTree::data)
            .flatten()
            .copied()
            .collect()
    }
}

impl fmt::Display for ParseTree {
    /// Renders the tree as an s-expression: `(label child ...)` for
    /// composites and `label:"text"` for terminals.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.text() {
            Some(text) => write!(f, "{}:{:?}", self.label, text),
            None => {
                write!(f, "({}", self.label)?;
                for child in &self.children {
                    write!(f, " {child}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ParseTree {
        ParseTree::node(
            "assign",
            vec![
                ParseTree::leaf("name", "x"),
                ParseTree::node(
                    "value*",
                    vec![ParseTree::leaf("digit", "4"), ParseTree::leaf("digit", "2")],
                ),
            ],
        )
    }

    #[test]
    fn test_leaves_in_order() {
        let tree = sample();
        let labels: Vec<_> = tree.leaves().iter().map(|t| t.label()).collect();
        assert_eq!(labels, vec!["name", "digit", "digit"]);
        assert_eq!(tree.to_bytes(), b"x42");
    }

    #[test]
    fn test_composite_has_no_data() {
        let tree = sample();
        assert!(!tree.is_leaf());
        assert_eq!(tree.data(), None);
        assert_eq!(tree.children()[0].text().as_deref(), Some("x"));
    }

    #[test]
    fn test_display_sexpr() {
        assert_eq!(
            sample().to_string(),
            r#"(assign name:"x" (value* digit:"4" digit:"2"))"#
        );
        assert_eq!(ParseTree::node("r*", vec![]).to_string(), "(r*)");
    }
}

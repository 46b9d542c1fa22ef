//! Python bindings for peggle.
//!
//! Exposes `Grammar(source)` and `Grammar.parse(text)`, which returns a
//! `Tree` with `label`, `text` and `children` attributes.

use peggle::ParseTree;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

/// A compiled grammar.
#[pyclass(name = "Grammar", frozen)]
pub struct PyGrammar {
    inner: peggle::Grammar,
}

#[pymethods]
impl PyGrammar {
    /// Compiles grammar source, raising `ValueError` if it is malformed.
    #[new]
    fn new(source: &str) -> PyResult<Self> {
        let inner =
            peggle::parse_grammar(source).map_err(|e| PyValueError::new_err(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Parses `text` with the entry rule, raising `ValueError` on a mismatch.
    fn parse(&self, text: &str) -> PyResult<PyTree> {
        self.inner
            .parse(text)
            .map(|tree| PyTree::from(&tree))
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    /// Names of the grammar's rules in definition order.
    fn rules(&self) -> Vec<String> {
        self.inner.rules().map(|rule| rule.name().to_string()).collect()
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }
}

/// A node of a parse tree. Leaves carry `text`; composites carry `children`.
#[pyclass(name = "Tree", frozen, get_all)]
#[derive(Clone)]
pub struct PyTree {
    label: String,
    text: Option<String>,
    children: Vec<PyTree>,
}

impl From<&ParseTree> for PyTree {
    fn from(tree: &ParseTree) -> Self {
        Self {
            label: tree.label().to_string(),
            text: tree.text().map(|text| text.into_owned()),
            children: tree.children().iter().map(PyTree::from).collect(),
        }
    }
}

#[pymethods]
impl PyTree {
    fn __repr__(&self) -> String {
        match &self.text {
            Some(text) => format!("Tree({:?}, text={text:?})", self.label),
            None => format!("Tree({:?}, children={})", self.label, self.children.len()),
        }
    }
}

/// The `_peggle` extension module.
#[pymodule]
fn _peggle(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyGrammar>()?;
    m.add_class::<PyTree>()?;
    Ok(())
}

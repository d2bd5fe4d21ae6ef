//! Typed query calls as handed over by the query-language front end.
//!
//! A [`Call`] is one node of a parsed query tree: a name, named arguments that
//! have already been bound to typed [`ArgValue`]s, and child calls. The
//! Tanimoto plugin reads its own arguments and forwards the first child to the
//! execution engine to obtain the source set.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Name of the call handled by [`crate::TanimotoPlugin`].
pub const TANIMOTO_CALL: &str = "Tanimoto";

// ─────────────────────────────────────────────
// Argument values
// ─────────────────────────────────────────────

/// A typed argument value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ArgValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ArgValue::Bool(_)  => "bool",
            ArgValue::Int(_)   => "int",
            ArgValue::Float(_) => "float",
            ArgValue::Str(_)   => "string",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ArgValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self { ArgValue::Str(s.to_string()) }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self { ArgValue::Str(s) }
}

impl From<i64> for ArgValue {
    fn from(i: i64) -> Self { ArgValue::Int(i) }
}

impl From<i32> for ArgValue {
    fn from(i: i32) -> Self { ArgValue::Int(i as i64) }
}

impl From<u32> for ArgValue {
    fn from(i: u32) -> Self { ArgValue::Int(i as i64) }
}

impl From<f64> for ArgValue {
    fn from(f: f64) -> Self { ArgValue::Float(f) }
}

impl From<bool> for ArgValue {
    fn from(b: bool) -> Self { ArgValue::Bool(b) }
}

// ─────────────────────────────────────────────
// Call
// ─────────────────────────────────────────────

/// One node of a query tree, e.g. `Tanimoto(Row(frame="f", row=3), frame="f", threshold=50)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub name: String,
    #[serde(default)]
    pub args: BTreeMap<String, ArgValue>,
    #[serde(default)]
    pub children: Vec<Call>,
}

impl Call {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Builder: set a named argument.
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Builder: append a child call.
    pub fn child(mut self, child: Call) -> Self {
        self.children.push(child);
        self
    }

    /// `Row(frame=<frame>, row=<row_id>)`.
    pub fn row(frame: &str, row_id: u64) -> Self {
        Call::new("Row").arg("frame", frame).arg("row", row_id as i64)
    }

    /// `Tanimoto(<source>, frame=<frame>, threshold=<threshold>)`.
    pub fn tanimoto(source: Call, frame: &str, threshold: i64) -> Self {
        Call::new(TANIMOTO_CALL)
            .arg("frame", frame)
            .arg("threshold", threshold)
            .child(source)
    }
}

impl std::fmt::Display for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.name)?;
        let mut first = true;
        for child in &self.children {
            if !first { write!(f, ", ")?; }
            write!(f, "{child}")?;
            first = false;
        }
        for (k, v) in &self.args {
            if !first { write!(f, ", ")?; }
            match v {
                ArgValue::Str(s) => write!(f, "{k}={s:?}")?,
                ArgValue::Int(i) => write!(f, "{k}={i}")?,
                ArgValue::Float(x) => write!(f, "{k}={x}")?,
                ArgValue::Bool(b) => write!(f, "{k}={b}")?,
            }
            first = false;
        }
        write!(f, ")")
    }
}

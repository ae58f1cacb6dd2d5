use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// A term in surface syntax: `head(args)`. A head without arguments is a declared constant,
/// a public name `'a'`, a fresh variable `~x`, a public variable `$x`, or otherwise a message variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IRTerm {
    pub head: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<IRTerm>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IRFunction {
    pub name: String,
    pub arity: usize,
    #[serde(default)]
    pub private: bool
}

/// A user equation `lhs = rhs`, used left to right.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IREquation {
    pub name: String,
    pub lhs: IRTerm,
    pub rhs: IRTerm
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IRFact {
    pub name: String,
    #[serde(default)]
    pub persistent: bool,
    #[serde(default)]
    pub args: Vec<IRTerm>
}

/// A `let` definition of a rule. Later definitions may use earlier ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IRLet {
    pub var: String,
    pub value: IRTerm
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IRRuleKind {
    #[default]
    Protocol,
    Channel,
    SecureChannel
}

/// A boolean expression over configuration flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IRFlagExpr {
    Flag(String),
    Not(Box<IRFlagExpr>),
    And(Vec<IRFlagExpr>),
    Or(Vec<IRFlagExpr>)
}

impl IRFlagExpr {
    pub fn holds(&self, flags: &BTreeSet<String>) -> bool {
        match self {
            IRFlagExpr::Flag(name) => flags.contains(name),
            IRFlagExpr::Not(e) => !e.holds(flags),
            IRFlagExpr::And(es) => es.iter().all(|e| e.holds(flags)),
            IRFlagExpr::Or(es) => es.iter().any(|e| e.holds(flags))
        }
    }
}

/// Whether a construct guarded by `when` is active under `flags`.
pub fn active(when: &Option<IRFlagExpr>, flags: &BTreeSet<String>) -> bool {
    when.as_ref().map_or(true, |w| w.holds(flags))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IRRule {
    pub name: String,
    #[serde(default)]
    pub kind: IRRuleKind,
    #[serde(default)]
    pub premises: Vec<IRFact>,
    #[serde(default)]
    pub actions: Vec<IRFact>,
    #[serde(default)]
    pub conclusions: Vec<IRFact>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lets: Vec<IRLet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restrict: Option<IRFormula>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<IRFlagExpr>
}

/// Temporal formulas. Timepoints are written `#i` in binders and `i` in atoms.
/// Other binders follow the variable syntax of `IRTerm`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IRFormula {
    True,
    False,
    Action { fact: IRFact, at: String },
    Knows { term: IRTerm, at: String },
    Less(String, String),
    TimeEq(String, String),
    Eq(IRTerm, IRTerm),
    Not(Box<IRFormula>),
    And(Vec<IRFormula>),
    Or(Vec<IRFormula>),
    Implies(Box<IRFormula>, Box<IRFormula>),
    Exists { binders: Vec<String>, body: Box<IRFormula> },
    Forall { binders: Vec<String>, body: Box<IRFormula> }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IRRestriction {
    pub name: String,
    pub formula: IRFormula,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<IRFlagExpr>
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IRLemmaKind {
    ExistsTrace,
    AllTraces
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IRLemma {
    pub name: String,
    pub kind: IRLemmaKind,
    pub formula: IRFormula,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tactic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<IRFlagExpr>
}

/// A goal pattern. `kind` is one of `action`, `premise`, `knows`, `chain`, `split`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IRGoalPattern {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pred_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mentions: Option<String>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IRTactic {
    pub name: String,
    #[serde(default)]
    pub prefer: Vec<IRGoalPattern>,
    #[serde(default)]
    pub deprioritize: Vec<IRGoalPattern>
}

/// A complete model as produced by a front end, before flags are resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IRModel {
    pub name: String,
    #[serde(default)]
    pub builtins: Vec<String>,
    #[serde(default)]
    pub functions: Vec<IRFunction>,
    #[serde(default)]
    pub equations: Vec<IREquation>,
    #[serde(default)]
    pub rules: Vec<IRRule>,
    #[serde(default)]
    pub restrictions: Vec<IRRestriction>,
    #[serde(default)]
    pub lemmas: Vec<IRLemma>,
    #[serde(default)]
    pub tactics: Vec<IRTactic>
}

impl IRModel {
    /// Save this `IRModel` as JSON to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Load an `IRModel` from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<IRModel, ConfigError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<IRModel, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl fmt::Display for IRTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.head)?;
        if self.args.is_empty() { return Ok(()) }
        write!(f, "(")?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 { write!(f, ", ")? }
            write!(f, "{}", arg)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for IRFact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.persistent { write!(f, "!")? }
        write!(f, "{}", IRTerm { head: self.name.clone(), args: self.args.clone() })?;
        if self.args.is_empty() { write!(f, "()")? }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_expressions() {
        let flags: BTreeSet<String> = ["compromise".to_string()].into();
        let expr = IRFlagExpr::And(vec![
            IRFlagExpr::Flag("compromise".into()),
            IRFlagExpr::Not(Box::new(IRFlagExpr::Flag("pop".into())))
        ]);
        assert!(expr.holds(&flags));
        assert!(!active(&Some(IRFlagExpr::Flag("pop".into())), &flags));
        assert!(active(&None, &flags));
    }

    #[test]
    fn terms_print_in_surface_syntax() {
        let t = IRTerm { head: "senc".into(), args: vec![
            IRTerm { head: "~m".into(), args: Vec::new() },
            IRTerm { head: "k".into(), args: Vec::new() }
        ] };
        assert_eq!(t.to_string(), "senc(~m, k)");
    }

    #[test]
    fn formulas_read_from_json() {
        let json = r##"{ "exists": { "binders": ["x", "#i"], "body": { "action": { "fact": { "name": "Done", "args": [{ "head": "x" }] }, "at": "i" } } } }"##;
        let formula: IRFormula = serde_json::from_str(json).unwrap();
        let IRFormula::Exists { binders, .. } = formula else { panic!("expected an existential") };
        assert_eq!(binders, vec!["x".to_string(), "#i".to_string()]);
    }
}

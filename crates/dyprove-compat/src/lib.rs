/// Manually construct an IRTerm: `t!("senc", t!("~m"), t!("k"))`.
#[macro_export]
macro_rules! t {
    ($s:expr) => {
        $crate::ir::IRTerm { head: $s.to_string(), args: vec![] }
    };
    ($s:expr, $($arg:expr),+) => {
        $crate::ir::IRTerm { head: $s.to_string(), args: vec![$($arg),+] }
    };
}

/// Manually construct an IRFact. A leading `!` makes it persistent: `fact!(!"Ltk", t!("$A"), t!("~k"))`.
#[macro_export]
macro_rules! fact {
    (! $s:expr $(, $arg:expr)*) => {
        $crate::ir::IRFact { name: $s.to_string(), persistent: true, args: vec![$($arg),*] }
    };
    ($s:expr $(, $arg:expr)*) => {
        $crate::ir::IRFact { name: $s.to_string(), persistent: false, args: vec![$($arg),*] }
    };
}

/// An IRRule with every part empty, to be completed with struct update syntax.
#[macro_export]
macro_rules! rule {
    () => {
        $crate::rule!("")
    };
    ($name:expr) => {
        $crate::ir::IRRule {
            name: $name.to_string(),
            kind: $crate::ir::IRRuleKind::Protocol,
            premises: vec![],
            actions: vec![],
            conclusions: vec![],
            lets: vec![],
            restrict: None,
            when: None
        }
    };
}

pub mod ir;
pub mod config;
pub mod compiler;
pub mod report;
pub mod server;

use compiler::{compile, CompileError};
use config::Config;
use dyprove_core::lemma::evaluate;
use ir::*;
use report::ModelReport;

/// `fact` at timepoint `at`.
pub fn action(fact: IRFact, at: &str) -> IRFormula {
    IRFormula::Action { fact, at: at.to_string() }
}

pub fn exists(binders: &[&str], body: IRFormula) -> IRFormula {
    IRFormula::Exists { binders: binders.iter().map(|b| b.to_string()).collect(), body: Box::new(body) }
}

pub fn forall(binders: &[&str], body: IRFormula) -> IRFormula {
    IRFormula::Forall { binders: binders.iter().map(|b| b.to_string()).collect(), body: Box::new(body) }
}

pub fn implies(a: IRFormula, b: IRFormula) -> IRFormula {
    IRFormula::Implies(Box::new(a), Box::new(b))
}

/// Compiles `ir` under the configured flags and evaluates its lemmas, or only `lemma` if given.
pub fn check(ir: &IRModel, config: &Config, lemma: Option<&str>) -> Result<ModelReport, CompileError> {
    let compiled = compile(ir, &config.flags)?;
    let budget = config.budget.budget();
    let mut report = ModelReport::new(&ir.name);
    for (name, error) in &compiled.lemma_errors {
        if lemma.map_or(true, |l| l == name) {
            report.push_error(name, error);
        }
    }
    for candidate in compiled.model.lemmas.iter().filter(|l| lemma.map_or(true, |name| name == l.name)) {
        match evaluate(&compiled.model, candidate, budget) {
            Ok(verdict) => report.push_verdict(&compiled.model, &candidate.name, &verdict),
            Err(error) => report.push_error(&candidate.name, &error)
        }
    }
    Ok(report)
}

use crate::ir::*;
use dyprove_core::compiler::{builtin_pack, Pack};
use dyprove_core::fact::{Fact, Pred};
use dyprove_core::formula::*;
use dyprove_core::heuristic::{GoalKind, GoalPattern, Tactic};
use dyprove_core::lemma::{Lemma, LemmaKind};
use dyprove_core::model::{Model, ModelError, Restriction};
use dyprove_core::rule::{Rule, RuleKind};
use dyprove_core::term::*;
use dyprove_core::theory::syntactic::RewriteRule;
use dyprove_core::theory::Theories;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("unknown function symbol `{0}`")]
    UnknownFunction(String),
    #[error("`{name}` takes {expected} arguments, found {found}")]
    Arity { name: String, expected: usize, found: usize },
    #[error("`{0}` is not a variable")]
    NotAVariable(String),
    #[error("public name `{0}` uses the reserved prefix `@`")]
    ReservedName(String),
    #[error("unknown goal kind `{0}`")]
    UnknownGoalKind(String),
    #[error("in `{context}`: {source}")]
    In { context: String, #[source] source: Box<CompileError> },
    #[error(transparent)]
    Model(#[from] ModelError)
}

impl CompileError {
    fn within(self, context: &str) -> CompileError {
        CompileError::In { context: context.to_string(), source: Box::new(self) }
    }
}

/// A flag-resolved model, with the lemmas that failed to load. Those do not affect the others.
#[derive(Debug)]
pub struct Compiled {
    pub model: Model,
    pub lemma_errors: Vec<(String, CompileError)>
}

/// Parses a variable in surface syntax: `~x` is fresh, `$x` public, anything else a message variable.
pub fn variable(name: &str) -> Result<Var, CompileError> {
    let var = match name.chars().next() {
        Some('~') => Var::fresh(&name[1..]),
        Some('$') => Var::public(&name[1..]),
        Some(c) if c.is_alphabetic() || c == '_' => Var::msg(name),
        _ => return Err(CompileError::NotAVariable(name.to_string()))
    };
    if var.name.is_empty() { return Err(CompileError::NotAVariable(name.to_string())) }
    Ok(var)
}

fn binder(name: &str) -> Result<Binder, CompileError> {
    match name.strip_prefix('#') {
        Some(time) => Ok(Binder::Time(TVar::new(time))),
        None => Ok(Binder::Msg(variable(name)?))
    }
}

fn time(name: &str) -> TVar {
    TVar::new(name.strip_prefix('#').unwrap_or(name))
}

struct Compiler<'a> {
    sig: &'a Signature
}

impl Compiler<'_> {
    fn term(&self, t: &IRTerm) -> Result<Term, CompileError> {
        if t.args.is_empty() {
            if let Some(name) = t.head.strip_prefix('\'').and_then(|h| h.strip_suffix('\'')) {
                if name.starts_with(GENERATED_NAME_PREFIX) { return Err(CompileError::ReservedName(name.to_string())) }
                return Ok(Term::pub_name(name));
            }
            if let Some(f) = self.sig.lookup(&t.head) {
                let expected = self.sig.arity(f);
                if expected != 0 {
                    return Err(CompileError::Arity { name: t.head.clone(), expected, found: 0 });
                }
                return Ok(Term::constant(f));
            }
            return Ok(Term::Var(variable(&t.head)?));
        }
        let f = self.sig.lookup(&t.head).ok_or_else(|| CompileError::UnknownFunction(t.head.clone()))?;
        let expected = self.sig.arity(f);
        if expected != t.args.len() {
            return Err(CompileError::Arity { name: t.head.clone(), expected, found: t.args.len() });
        }
        let args = t.args.iter().map(|a| self.term(a)).collect::<Result<Vec<_>, _>>()?;
        Ok(Term::app(f, args))
    }

    fn fact(&self, fact: &IRFact) -> Result<Fact, CompileError> {
        let args = fact.args.iter().map(|a| self.term(a)).collect::<Result<Vec<_>, _>>()?;
        let pred = Pred::new(&fact.name);
        Ok(if fact.persistent { Fact::persistent(pred, args) } else { Fact::linear(pred, args) })
    }

    fn facts(&self, facts: &[IRFact]) -> Result<Vec<Fact>, CompileError> {
        facts.iter().map(|f| self.fact(f)).collect()
    }

    fn formula(&self, formula: &IRFormula) -> Result<Formula, CompileError> {
        let all = |fs: &[IRFormula]| fs.iter().map(|f| self.formula(f)).collect::<Result<Vec<_>, _>>();
        let binders = |bs: &[String]| bs.iter().map(|b| binder(b)).collect::<Result<Vec<_>, _>>();
        Ok(match formula {
            IRFormula::True => Formula::True,
            IRFormula::False => Formula::False,
            IRFormula::Action { fact, at } => Formula::Atom(Atom::Action(self.fact(fact)?, time(at))),
            IRFormula::Knows { term, at } => Formula::Atom(Atom::Knows(self.term(term)?, time(at))),
            IRFormula::Less(i, j) => Formula::Atom(Atom::Less(time(i), time(j))),
            IRFormula::TimeEq(i, j) => Formula::Atom(Atom::TEq(time(i), time(j))),
            IRFormula::Eq(s, t) => Formula::Atom(Atom::Eq(self.term(s)?, self.term(t)?)),
            IRFormula::Not(f) => Formula::not(self.formula(f)?),
            IRFormula::And(fs) => Formula::And(all(fs)?),
            IRFormula::Or(fs) => Formula::Or(all(fs)?),
            IRFormula::Implies(a, b) => Formula::implies(self.formula(a)?, self.formula(b)?),
            IRFormula::Exists { binders: bs, body } => Formula::exists(binders(bs)?, self.formula(body)?),
            IRFormula::Forall { binders: bs, body } => Formula::forall(binders(bs)?, self.formula(body)?)
        })
    }

    fn rule(&self, rule: &IRRule) -> Result<Rule, CompileError> {
        let kind = match rule.kind {
            IRRuleKind::Protocol => RuleKind::Protocol,
            IRRuleKind::Channel => RuleKind::Channel { secure: false },
            IRRuleKind::SecureChannel => RuleKind::Channel { secure: true }
        };
        let lets = rule.lets.iter()
            .map(|l| Ok((variable(&l.var)?, self.term(&l.value)?)))
            .collect::<Result<Vec<_>, CompileError>>()?;
        let restrict = rule.restrict.as_ref().map(|f| self.formula(f)).transpose()?;
        Ok(Rule::new(&rule.name, kind, self.facts(&rule.premises)?, self.facts(&rule.actions)?,
            self.facts(&rule.conclusions)?, lets, restrict)?)
    }

    fn pattern(&self, pattern: &IRGoalPattern) -> Result<GoalPattern, CompileError> {
        let kind = match pattern.kind.as_deref() {
            None => None,
            Some("action") => Some(GoalKind::Action),
            Some("premise") => Some(GoalKind::Premise),
            Some("knows") => Some(GoalKind::Knows),
            Some("chain") => Some(GoalKind::Chain),
            Some("split") => Some(GoalKind::Split),
            Some(other) => return Err(CompileError::UnknownGoalKind(other.to_string()))
        };
        let mentions = match &pattern.mentions {
            Some(name) => Some(self.sig.lookup(name).ok_or_else(|| CompileError::UnknownFunction(name.clone()))?),
            None => None
        };
        Ok(GoalPattern { kind, pred_prefix: pattern.pred_prefix.clone(), persistent: pattern.persistent, mentions })
    }

    fn tactic(&self, tactic: &IRTactic) -> Result<Tactic, CompileError> {
        Ok(Tactic {
            name: tactic.name.clone(),
            prefer: tactic.prefer.iter().map(|p| self.pattern(p)).collect::<Result<_, _>>()?,
            deprioritize: tactic.deprioritize.iter().map(|p| self.pattern(p)).collect::<Result<_, _>>()?
        })
    }
}

/// Resolves `flags` and builds the model. Errors in a lemma are collected instead of aborting.
pub fn compile(ir: &IRModel, flags: &BTreeSet<String>) -> Result<Compiled, CompileError> {
    let mut sig = Signature::new();
    let mut pack = Pack::default();
    for name in &ir.builtins {
        pack.merge(builtin_pack(name, &mut sig)?);
    }
    for function in &ir.functions {
        let visibility = if function.private { Visibility::Private } else { Visibility::Public };
        sig.declare(&function.name, function.arity, visibility)?;
    }

    let compiler = Compiler { sig: &sig };
    let mut equations = pack.equations;
    for equation in &ir.equations {
        let lhs = compiler.term(&equation.lhs).map_err(|e| e.within(&equation.name))?;
        let rhs = compiler.term(&equation.rhs).map_err(|e| e.within(&equation.name))?;
        equations.push(RewriteRule { name: equation.name.clone(), lhs, rhs });
    }
    let theories = Theories::new(&sig, equations, pack.builtins)?;

    let mut rules = Vec::new();
    for rule in ir.rules.iter().filter(|r| active(&r.when, flags)) {
        rules.push(compiler.rule(rule).map_err(|e| e.within(&rule.name))?);
    }
    let mut restrictions = Vec::new();
    for restriction in ir.restrictions.iter().filter(|r| active(&r.when, flags)) {
        let formula = compiler.formula(&restriction.formula).map_err(|e| e.within(&restriction.name))?;
        restrictions.push(Restriction::new(&restriction.name, formula)?);
    }
    let tactics = ir.tactics.iter()
        .map(|t| compiler.tactic(t).map_err(|e| e.within(&t.name)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut lemmas = Vec::new();
    let mut lemma_errors = Vec::new();
    for lemma in ir.lemmas.iter().filter(|l| active(&l.when, flags)) {
        let kind = match lemma.kind {
            IRLemmaKind::ExistsTrace => LemmaKind::ExistsTrace,
            IRLemmaKind::AllTraces => LemmaKind::AllTraces
        };
        let loaded = compiler.formula(&lemma.formula)
            .and_then(|formula| Ok(Lemma::new(&lemma.name, kind, formula, lemma.tactic.clone())?));
        match loaded {
            Ok(loaded) => lemmas.push(loaded),
            Err(err) => {
                warn!(lemma = %lemma.name, error = %err, "lemma skipped");
                lemma_errors.push((lemma.name.clone(), err));
            }
        }
    }

    debug!(model = %ir.name, rules = rules.len(), lemmas = lemmas.len(), "model compiled");
    let model = Model::new(sig, theories, rules, restrictions, lemmas, tactics)?;
    Ok(Compiled { model, lemma_errors })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::*;

    fn model() -> IRModel {
        IRModel {
            name: "toy".into(),
            builtins: vec!["hashing".into()],
            functions: vec![IRFunction { name: "secret".into(), arity: 0, private: true }],
            rules: vec![
                IRRule { name: "Gen".into(), premises: vec![fact!("Fr", t!("~k"))], actions: vec![fact!("Gen", t!("~k"))],
                    conclusions: vec![fact!("Out", t!("h", t!("~k")))], ..rule!() },
                IRRule { name: "Leak".into(), premises: vec![fact!("Fr", t!("~k"))], conclusions: vec![fact!("Out", t!("~k"))],
                    when: Some(IRFlagExpr::Flag("leaky".into())), ..rule!() }
            ],
            lemmas: vec![
                IRLemma { name: "bad".into(), kind: IRLemmaKind::AllTraces,
                    formula: IRFormula::Forall { binders: vec!["x".into()], body: Box::new(IRFormula::True) }, tactic: None, when: None }
            ],
            ..IRModel::default()
        }
    }

    #[test]
    fn flags_select_rules() {
        let none = compile(&model(), &BTreeSet::new()).unwrap();
        assert!(none.model.rule("Leak").is_none());
        let leaky = compile(&model(), &["leaky".to_string()].into()).unwrap();
        assert!(leaky.model.rule("Leak").is_some());
    }

    #[test]
    fn broken_lemmas_are_reported_separately() {
        let compiled = compile(&model(), &BTreeSet::new()).unwrap();
        assert!(compiled.model.lemmas.is_empty());
        assert_eq!(compiled.lemma_errors.len(), 1);
        assert_eq!(compiled.lemma_errors[0].0, "bad");
    }

    #[test]
    fn terms_resolve_symbols_and_variables() {
        let mut sig = Signature::new();
        sig.declare("h", 1, Visibility::Public).unwrap();
        sig.declare("c", 0, Visibility::Private).unwrap();
        let compiler = Compiler { sig: &sig };
        let h = sig.lookup("h").unwrap();
        assert_eq!(compiler.term(&t!("h", t!("~k"))).unwrap(), Term::app(h, vec![Term::Var(Var::fresh("k"))]));
        assert_eq!(compiler.term(&t!("'a'")).unwrap(), Term::pub_name("a"));
        assert!(matches!(compiler.term(&t!("c")).unwrap(), Term::App(_, _)));
        assert_eq!(compiler.term(&t!("h")).unwrap_err(), CompileError::Arity { name: "h".into(), expected: 1, found: 0 });
        assert_eq!(compiler.term(&t!("g", t!("x"))).unwrap_err(), CompileError::UnknownFunction("g".into()));
        assert_eq!(compiler.term(&t!("'@x.0'")).unwrap_err(), CompileError::ReservedName("@x.0".into()));
    }

    #[test]
    fn unbound_rule_variables_name_the_rule() {
        let mut ir = model();
        ir.rules.push(IRRule { name: "Broken".into(), conclusions: vec![fact!("Out", t!("x"))], ..rule!() });
        let err = compile(&ir, &BTreeSet::new()).unwrap_err();
        assert!(matches!(err, CompileError::Model(ModelError::UnboundVariable { ref rule, .. }) if rule == "Broken"));
    }
}

use crate::fact::*;
use crate::formula::*;
use crate::knowledge::Knowledge;
use crate::model::{Model, ModelError};
use crate::term::*;
use crate::theory::EquationalOracle;
use crate::trace::Trace;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// An honest protocol step.
    Protocol,
    /// A channel rule. Secure channels never reveal their messages to the network.
    Channel { secure: bool },
    /// A deduction step of the network adversary.
    Adversary
}

/// A transition `premises --[actions]-> conclusions`.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub kind: RuleKind,
    pub premises: Vec<Fact>,
    pub actions: Vec<Fact>,
    pub conclusions: Vec<Fact>,
    /// Local condition on instances, over the rule's variables.
    pub restrict: Option<Nnf>,
    /// Every variable of the rule, in order of first occurrence.
    pub vars: Vec<Var>
}

impl Rule {
    /// Builds a rule, substituting `lets` (each visible to the later ones) into its facts and restriction.
    pub fn new(name: &str, kind: RuleKind, premises: Vec<Fact>, actions: Vec<Fact>, conclusions: Vec<Fact>,
        lets: Vec<(Var, Term)>, restrict: Option<Formula>) -> Result<Self, ModelError> {
        let mut defs = Subst::new();
        for (var, value) in lets {
            let value = defs.apply(&value);
            defs.insert_raw(var, value);
        }
        let restrict = restrict.map(|f| f.to_term_nnf()).transpose()
            .map_err(|source| ModelError::Formula { name: name.to_string(), source })?
            .map(|nnf| nnf.instantiate(&Binding { terms: defs.clone(), ..Binding::default() }));

        let premises: Vec<Fact> = premises.iter().map(|f| f.apply(&defs)).collect();
        let actions: Vec<Fact> = actions.iter().map(|f| f.apply(&defs)).collect();
        let conclusions: Vec<Fact> = conclusions.iter().map(|f| f.apply(&defs)).collect();
        let mut vars = Vec::new();
        for fact in premises.iter().chain(actions.iter()).chain(conclusions.iter()) {
            fact.collect_vars(&mut vars);
        }
        if let Some(nnf) = &restrict {
            nnf_free_vars(nnf, &mut Vec::new(), &mut vars);
        }
        Ok(Rule { name: name.to_string(), kind, premises, actions, conclusions, restrict, vars })
    }

    /// `[In(x)] --[K(x)]-> []`: every message the adversary can derive may be recorded as knowledge.
    pub fn learn() -> Self {
        let x = Term::Var(Var::msg("x"));
        Rule {
            name: "Learn".to_string(),
            kind: RuleKind::Adversary,
            premises: vec![Fact::linear(Pred::input(), vec![x.clone()])],
            actions: vec![Fact::linear(Pred::knows(), vec![x])],
            conclusions: Vec::new(),
            restrict: None,
            vars: vec![Var::msg("x")]
        }
    }

    fn ill_typed(&self, reason: impl Into<String>) -> ModelError {
        ModelError::IllTypedRule { rule: self.name.clone(), reason: reason.into() }
    }

    /// Load-time checks of a protocol or channel rule.
    pub fn validate(&self) -> Result<(), ModelError> {
        for fact in &self.premises {
            if fact.pred == Pred::output() || fact.pred == Pred::knows() {
                return Err(self.ill_typed(format!("`{}` cannot be a premise", fact.pred.name())));
            }
            if fact.pred == Pred::fresh() {
                match fact.args.as_slice() {
                    [Term::Var(v)] if v.sort == Sort::Fresh => {}
                    _ => return Err(self.ill_typed("`Fr` takes a single fresh variable"))
                }
            }
        }
        if let Some(fact) = self.actions.iter().find(|f| f.pred.is_reserved()) {
            return Err(self.ill_typed(format!("`{}` cannot be an action", fact.pred.name())));
        }
        for fact in &self.conclusions {
            if fact.pred.is_reserved() && fact.pred != Pred::output() {
                return Err(self.ill_typed(format!("`{}` cannot be a conclusion", fact.pred.name())));
            }
            if fact.pred == Pred::output() && self.kind == (RuleKind::Channel { secure: true }) {
                return Err(self.ill_typed("a secure channel rule cannot send to the network"));
            }
        }

        let mut bound = Vec::new();
        for fact in &self.premises { fact.collect_vars(&mut bound) }
        if let Some(var) = self.vars.iter().find(|v| v.sort != Sort::Pub && !bound.contains(v)) {
            return Err(ModelError::UnboundVariable { rule: self.name.clone(), var: var.name.to_string() });
        }
        for (i, v) in self.vars.iter().enumerate() {
            if self.vars[..i].iter().any(|w| w.name == v.name && w.idx == v.idx && w.sort != v.sort) {
                return Err(self.ill_typed(format!("variable `{}` is used with two sorts", v.name)));
            }
        }
        Ok(())
    }
}

/// Free term variables of a formula in negation normal form.
pub(crate) fn nnf_free_vars(f: &Nnf, bound: &mut Vec<Var>, out: &mut Vec<Var>) {
    let push = |t: &Term, bound: &Vec<Var>, out: &mut Vec<Var>| {
        for v in t.vars() {
            if !bound.contains(&v) && !out.contains(&v) { out.push(v) }
        }
    };
    let atom_terms = |a: &Atom| -> Vec<Term> {
        match a {
            Atom::Action(fact, _) => fact.args.clone(),
            Atom::Knows(t, _) => vec![t.clone()],
            Atom::Eq(s, t) => vec![s.clone(), t.clone()],
            _ => Vec::new()
        }
    };
    let with_binders = |binders: &[Binder], bound: &mut Vec<Var>| -> usize {
        let before = bound.len();
        bound.extend(binders.iter().filter_map(|b| match b { Binder::Msg(v) => Some(v.clone()), _ => None }));
        before
    };
    match f {
        Nnf::True | Nnf::False => {}
        Nnf::Atom(a) => for t in atom_terms(a) { push(&t, bound, out) },
        Nnf::NotEq(s, t) => { push(s, bound, out); push(t, bound, out) }
        Nnf::And(fs) | Nnf::Or(fs) => for f in fs { nnf_free_vars(f, bound, out) },
        Nnf::Exists(bs, body) => {
            let before = with_binders(bs, bound);
            nnf_free_vars(body, bound, out);
            bound.truncate(before);
        }
        Nnf::Guarded(g) => {
            let before = with_binders(&g.binders, bound);
            for a in &g.guard { for t in atom_terms(a) { push(&t, bound, out) } }
            nnf_free_vars(&g.body, bound, out);
            bound.truncate(before);
        }
    }
}

/// Why a rule instance cannot fire in a state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FireError {
    #[error("the instance leaves variables unassigned")]
    NotGround,
    #[error("premise {0} is not in the state")]
    MissingFact(usize),
    #[error("input {0} is not derivable by the adversary")]
    Underivable(usize),
    #[error("fresh value {0} was already used")]
    FreshReused(usize),
    #[error("fresh premise {0} is not instantiated with a fresh value")]
    NotFresh(usize),
    #[error("the rule's restriction does not hold")]
    Restricted
}

/// A global state of the forward semantics.
#[derive(Debug, Clone, Default)]
pub struct State {
    pub facts: FactStore,
    pub knowledge: Knowledge,
    pub used_fresh: BTreeSet<Name>,
    next_fresh: u32
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A fired rule instance together with the state it leads to.
#[derive(Debug, Clone)]
pub struct Instance {
    pub rule: usize,
    pub subst: Subst,
    pub premises: Vec<Fact>,
    pub actions: Vec<Fact>,
    pub conclusions: Vec<Fact>,
    pub state: State
}

/// Fires `rule` under `sigma` in `state`. Linear premises are consumed one fact each,
/// so two premises can never share a single stored fact.
pub fn fire(model: &Model, state: &State, rule: usize, sigma: &Subst) -> Result<Instance, FireError> {
    let theories = &model.theories;
    let r = &model.rules[rule];
    let ground = |facts: &[Fact]| -> Result<Vec<Fact>, FireError> {
        facts.iter().map(|f| {
            let f = f.apply(sigma).normalize(theories);
            if f.is_ground() { Ok(f) } else { Err(FireError::NotGround) }
        }).collect()
    };
    let premises = ground(&r.premises)?;
    let actions = ground(&r.actions)?;
    let conclusions = ground(&r.conclusions)?;

    let mut next = state.clone();
    for (i, premise) in premises.iter().enumerate() {
        if premise.pred == Pred::fresh() {
            let Some(Term::Name(name @ Name::Fresh(..))) = premise.args.first() else { return Err(FireError::NotFresh(i)) };
            if !next.used_fresh.insert(name.clone()) { return Err(FireError::FreshReused(i)) }
        } else if premise.pred == Pred::input() {
            if !premise.args.iter().all(|t| next.knowledge.derives(t, theories)) { return Err(FireError::Underivable(i)) }
        } else if !next.facts.consume(premise) {
            return Err(FireError::MissingFact(i));
        }
    }
    if let Some(restrict) = &r.restrict {
        let binding = Binding { terms: sigma.clone(), ..Binding::default() };
        if !restrict.instantiate(&binding).holds(&Trace::default(), theories) {
            return Err(FireError::Restricted);
        }
    }
    for conclusion in &conclusions {
        if conclusion.pred == Pred::output() {
            for t in &conclusion.args { next.knowledge.learn(t, theories) }
        } else {
            next.facts.produce(conclusion.clone());
        }
    }
    Ok(Instance { rule, subst: sigma.clone(), premises, actions, conclusions, state: next })
}

/// Every instance of a protocol or channel rule enabled in `state`, in rule declaration order.
/// Rules are matched lazily, one at a time.
pub fn applicable_instances<'a>(model: &'a Model, state: &'a State) -> impl Iterator<Item = Instance> + 'a {
    model.rules.iter().enumerate()
        .filter(|(_, r)| r.kind != RuleKind::Adversary)
        .flat_map(move |(i, _)| instances_of(model, state, i))
}

fn instances_of(model: &Model, state: &State, rule: usize) -> Vec<Instance> {
    let theories = &model.theories;
    let r = &model.rules[rule];
    let mut supply = VarSupply::default();

    // Stored facts first, then fresh values, then inputs, which need the most bindings.
    let order = |f: &Fact| if f.pred == Pred::input() { 2 } else if f.pred == Pred::fresh() { 1 } else { 0 };
    let mut premises: Vec<&Fact> = r.premises.iter().collect();
    premises.sort_by_key(|f| order(*f));

    let mut next_fresh = state.next_fresh;
    let mut sigmas = vec![Subst::new()];
    for premise in premises {
        let mut next = Vec::new();
        if premise.pred == Pred::fresh() {
            let Some(Term::Var(v)) = premise.args.first() else { return Vec::new() };
            let name = Term::Name(Name::Fresh(v.name.clone(), next_fresh));
            next_fresh += 1;
            for mut sigma in sigmas {
                sigma.insert_raw(v.clone(), name.clone());
                next.push(sigma);
            }
        } else if premise.pred == Pred::input() {
            for sigma in &sigmas {
                let mut partial = vec![sigma.clone()];
                for arg in &premise.args {
                    partial = partial.iter().flat_map(|s| match_known(arg, s, state, model, &mut supply)).collect();
                }
                next.extend(partial);
            }
        } else {
            for sigma in &sigmas {
                next.extend(state.facts.match_pattern(premise, sigma, theories, &mut supply).map(|(s, _)| s));
            }
        }
        sigmas = next;
        sigmas.dedup();
    }

    sigmas.into_iter().filter_map(|mut sigma| {
        // Public variables introduced by the rule stand for their own name.
        for v in &r.vars {
            if v.sort == Sort::Pub && sigma.get(v).is_none() {
                sigma.insert_raw(v.clone(), Term::pub_name(&v.name));
            }
        }
        let mut instance = fire(model, state, rule, &sigma).ok()?;
        instance.state.next_fresh = next_fresh;
        Some(instance)
    }).collect()
}

/// Extensions of `sigma` under which the input pattern `t` is derivable from the adversary's knowledge.
fn match_known(t: &Term, sigma: &Subst, state: &State, model: &Model, supply: &mut VarSupply) -> Vec<Subst> {
    let theories = &model.theories;
    let t = theories.normalize(&sigma.apply(t));
    if t.is_ground() {
        return if state.knowledge.derives(&t, theories) { vec![sigma.clone()] } else { Vec::new() };
    }
    let mut out: Vec<Subst> = Vec::new();
    for known in state.knowledge.terms() {
        if !t.sort().admits(known.sort()) && t.is_var() { continue }
        out.extend(theories.unify(&[(t.clone(), known.clone())], sigma, supply).substs);
    }
    if let Term::App(f, args) = &t {
        if model.signature.is_public(*f) && !theories.is_destructor(*f) && !theories.is_builtin(*f) {
            let mut partial = vec![sigma.clone()];
            for arg in args {
                partial = partial.iter().flat_map(|s| match_known(arg, s, state, model, supply)).collect();
            }
            out.extend(partial);
        }
    }
    let mut unique = Vec::new();
    for s in out {
        if !unique.contains(&s) { unique.push(s) }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theory::{Builtins, Theories};

    fn st(args: Vec<Term>) -> Fact {
        Fact::linear(Pred::new("St"), args)
    }

    fn model(rules: Vec<Rule>) -> Model {
        let signature = Signature::new();
        let theories = Theories::new(&signature, Vec::new(), Builtins::default()).unwrap();
        Model::new(signature, theories, rules, Vec::new(), Vec::new(), Vec::new()).unwrap()
    }

    #[test]
    fn lets_are_resolved_in_order() {
        let x = Var::msg("x");
        let y = Var::msg("y");
        let rule = Rule::new("R", RuleKind::Protocol,
            vec![st(vec![Term::Var(x.clone())])], Vec::new(), vec![st(vec![Term::Var(y.clone())])],
            vec![(y.clone(), Term::pair(Term::Var(x.clone()), Term::Var(x.clone())))], None).unwrap();
        assert_eq!(rule.conclusions[0].args[0], Term::pair(Term::Var(x.clone()), Term::Var(x)));
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn unbound_variables_are_rejected() {
        let rule = Rule::new("R", RuleKind::Protocol, Vec::new(), Vec::new(),
            vec![st(vec![Term::Var(Var::msg("x"))])], Vec::new(), None).unwrap();
        assert!(matches!(rule.validate(), Err(ModelError::UnboundVariable { .. })));
    }

    #[test]
    fn secure_channels_cannot_output() {
        let x = Term::Var(Var::msg("x"));
        let rule = Rule::new("Chan", RuleKind::Channel { secure: true }, vec![st(vec![x.clone()])], Vec::new(),
            vec![Fact::linear(Pred::output(), vec![x])], Vec::new(), None).unwrap();
        assert!(matches!(rule.validate(), Err(ModelError::IllTypedRule { .. })));
    }

    #[test]
    fn fresh_values_are_distinct_across_steps() {
        let n = Term::Var(Var::fresh("n"));
        let rule = Rule::new("Gen", RuleKind::Protocol, vec![Fact::linear(Pred::fresh(), vec![n.clone()])], Vec::new(),
            vec![st(vec![n])], Vec::new(), None).unwrap();
        let model = model(vec![rule]);
        let first = applicable_instances(&model, &State::new()).next().unwrap();
        let second = applicable_instances(&model, &first.state).next().unwrap();
        assert_ne!(first.conclusions, second.conclusions);
        assert_eq!(second.state.facts.linear_count(), 2);
    }

    #[test]
    fn inputs_match_adversary_knowledge() {
        let x = Term::Var(Var::msg("x"));
        let send = Rule::new("Send", RuleKind::Protocol, Vec::new(), Vec::new(),
            vec![Fact::linear(Pred::output(), vec![Term::pub_name("hello")])], Vec::new(), None).unwrap();
        let recv = Rule::new("Recv", RuleKind::Protocol, vec![Fact::linear(Pred::input(), vec![x.clone()])], Vec::new(),
            vec![st(vec![x])], Vec::new(), None).unwrap();
        let model = model(vec![send, recv]);
        let sent = applicable_instances(&model, &State::new()).find(|i| i.rule == 0).unwrap();
        let received: Vec<Instance> = applicable_instances(&model, &sent.state).filter(|i| i.rule == 1).collect();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].conclusions[0].args[0], Term::pub_name("hello"));
    }

    #[test]
    fn restrictions_gate_instances() {
        let x = Term::Var(Var::msg("x"));
        let facts = vec![st(vec![Term::pub_name("a")]), st(vec![Term::pub_name("b")])];
        let setup = Rule::new("Setup", RuleKind::Protocol, Vec::new(), Vec::new(), facts, Vec::new(), None).unwrap();
        let restrict = Formula::Atom(Atom::Eq(x.clone(), Term::pub_name("a")));
        let pick = Rule::new("Pick", RuleKind::Protocol, vec![st(vec![x.clone()])], Vec::new(), Vec::new(),
            Vec::new(), Some(restrict)).unwrap();
        let model = model(vec![setup, pick]);
        let set = applicable_instances(&model, &State::new()).next().unwrap();
        let picks: Vec<Instance> = applicable_instances(&model, &set.state).filter(|i| i.rule == 1).collect();
        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].premises[0].args[0], Term::pub_name("a"));
    }
}

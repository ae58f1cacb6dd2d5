use crate::fact::*;
use crate::term::*;
use crate::theory::syntactic::match_term;
use crate::theory::{EquationalOracle, Theories};
use crate::trace::Trace;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;

/// A temporal variable. Formula binders use `idx` 0; timepoints of a constraint system are renamed apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TVar {
    pub name: Arc<str>,
    pub idx: u32
}

impl TVar {
    pub fn new(name: &str) -> Self {
        TVar { name: name.into(), idx: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Binder {
    Msg(Var),
    Time(TVar)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Atom {
    /// `F@i`: the rule instance at `i` emits action `F`.
    Action(Fact, TVar),
    /// `K(t)@i`: the adversary knows `t` at `i`.
    Knows(Term, TVar),
    Less(TVar, TVar),
    TEq(TVar, TVar),
    Eq(Term, Term)
}

/// A first-order formula over action labels, timepoints and terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formula {
    True,
    False,
    Atom(Atom),
    Not(Box<Formula>),
    And(Vec<Formula>),
    Or(Vec<Formula>),
    Implies(Box<Formula>, Box<Formula>),
    Exists(Vec<Binder>, Box<Formula>),
    Forall(Vec<Binder>, Box<Formula>)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    #[error("universally quantified variable `{0}` is not bound by an action of the guard")]
    Unguarded(String),
    #[error("universal quantifiers must have the form `All x. guard ==> body`")]
    GuardShape,
    #[error("knowledge atoms cannot guard a universal quantifier")]
    KnowledgeInGuard,
    #[error("negated knowledge atoms are not supported")]
    NegatedKnowledge,
    #[error("variable `{0}` is not bound by a quantifier")]
    FreeVariable(String),
    #[error("timepoint atoms are not allowed in rule restrictions")]
    Temporal
}

/// A universal formula `All binders. guard ==> body` whose binders all occur in actions of the guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guarded {
    pub binders: Vec<Binder>,
    pub guard: Vec<Atom>,
    pub body: Box<Nnf>
}

/// Negation normal form. Negations survive only as term disequalities; every
/// other negation has been pushed into atoms or turned into a guarded universal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Nnf {
    True,
    False,
    Atom(Atom),
    NotEq(Term, Term),
    And(Vec<Nnf>),
    Or(Vec<Nnf>),
    Exists(Vec<Binder>, Box<Nnf>),
    Guarded(Guarded)
}

/// Values for quantified variables.
#[derive(Debug, Clone, Default)]
pub struct Binding {
    pub terms: Subst,
    pub times: BTreeMap<TVar, TVar>
}

impl Binding {
    fn without(&self, binders: &[Binder]) -> Binding {
        if binders.is_empty() { return self.clone() }
        Binding {
            terms: self.terms.iter().filter(|(v, _)| !binders.contains(&Binder::Msg((*v).clone())))
                .map(|(v, t)| (v.clone(), t.clone())).collect(),
            times: self.times.iter().filter(|(t, _)| !binders.contains(&Binder::Time((*t).clone())))
                .map(|(t, u)| (t.clone(), u.clone())).collect()
        }
    }

    fn time(&self, t: &TVar) -> TVar {
        self.times.get(t).cloned().unwrap_or_else(|| t.clone())
    }
}

impl Atom {
    pub fn map(&self, terms: &mut dyn FnMut(&Term) -> Term, times: &mut dyn FnMut(&TVar) -> TVar) -> Atom {
        match self {
            Atom::Action(fact, i) => Atom::Action(fact.map_terms(&mut *terms), times(i)),
            Atom::Knows(t, i) => Atom::Knows(terms(t), times(i)),
            Atom::Less(i, j) => Atom::Less(times(i), times(j)),
            Atom::TEq(i, j) => Atom::TEq(times(i), times(j)),
            Atom::Eq(s, t) => Atom::Eq(terms(s), terms(t))
        }
    }

    fn instantiate(&self, binding: &Binding) -> Atom {
        self.map(&mut |t| binding.terms.apply(t), &mut |i| binding.time(i))
    }

    /// Knowledge atoms are actions of the adversary's learning rule.
    pub fn as_action(&self) -> Option<(Fact, &TVar)> {
        match self {
            Atom::Action(fact, i) => Some((fact.clone(), i)),
            Atom::Knows(t, i) => Some((Fact::linear(Pred::knows(), vec![t.clone()]), i)),
            _ => None
        }
    }

    fn negate(&self) -> Result<Nnf, FormulaError> {
        Ok(match self {
            Atom::Action(..) => Nnf::Guarded(Guarded { binders: Vec::new(), guard: vec![self.clone()], body: Box::new(Nnf::False) }),
            Atom::Knows(..) => return Err(FormulaError::NegatedKnowledge),
            Atom::Less(i, j) => Nnf::Or(vec![Nnf::Atom(Atom::Less(j.clone(), i.clone())), Nnf::Atom(Atom::TEq(i.clone(), j.clone()))]),
            Atom::TEq(i, j) => Nnf::Or(vec![Nnf::Atom(Atom::Less(i.clone(), j.clone())), Nnf::Atom(Atom::Less(j.clone(), i.clone()))]),
            Atom::Eq(s, t) => Nnf::NotEq(s.clone(), t.clone())
        })
    }

    fn collect_free(&self, vars: &mut Vec<Var>, times: &mut Vec<TVar>) {
        let mut push_time = |t: &TVar| if !times.contains(t) { times.push(t.clone()) };
        match self {
            Atom::Action(fact, i) => { fact.collect_vars(vars); push_time(i) }
            Atom::Knows(t, i) => { t.collect_vars(vars); push_time(i) }
            Atom::Less(i, j) | Atom::TEq(i, j) => { push_time(i); push_time(j) }
            Atom::Eq(s, t) => { s.collect_vars(vars); t.collect_vars(vars) }
        }
    }
}

fn conjuncts(f: &Formula, out: &mut Vec<Formula>) {
    match f {
        Formula::And(fs) => for f in fs { conjuncts(f, out) },
        Formula::True => {}
        _ => out.push(f.clone())
    }
}

impl Formula {
    pub fn not(f: Formula) -> Formula {
        Formula::Not(Box::new(f))
    }

    pub fn implies(a: Formula, b: Formula) -> Formula {
        Formula::Implies(Box::new(a), Box::new(b))
    }

    pub fn exists(binders: Vec<Binder>, f: Formula) -> Formula {
        Formula::Exists(binders, Box::new(f))
    }

    pub fn forall(binders: Vec<Binder>, f: Formula) -> Formula {
        Formula::Forall(binders, Box::new(f))
    }

    pub fn action(fact: Fact, at: &str) -> Formula {
        Formula::Atom(Atom::Action(fact, TVar::new(at)))
    }

    /// Free term and time variables, in order of first occurrence.
    pub fn free_vars(&self) -> (Vec<Var>, Vec<TVar>) {
        let (mut vars, mut times) = (Vec::new(), Vec::new());
        self.collect_free(&mut vars, &mut times);
        (vars, times)
    }

    fn collect_free(&self, vars: &mut Vec<Var>, times: &mut Vec<TVar>) {
        match self {
            Formula::True | Formula::False => {}
            Formula::Atom(a) => a.collect_free(vars, times),
            Formula::Not(f) => f.collect_free(vars, times),
            Formula::And(fs) | Formula::Or(fs) => for f in fs { f.collect_free(vars, times) },
            Formula::Implies(a, b) => { a.collect_free(vars, times); b.collect_free(vars, times) }
            Formula::Exists(bs, f) | Formula::Forall(bs, f) => {
                let (mut inner_vars, mut inner_times) = (Vec::new(), Vec::new());
                f.collect_free(&mut inner_vars, &mut inner_times);
                for v in inner_vars {
                    if !bs.contains(&Binder::Msg(v.clone())) && !vars.contains(&v) { vars.push(v) }
                }
                for t in inner_times {
                    if !bs.contains(&Binder::Time(t.clone())) && !times.contains(&t) { times.push(t) }
                }
            }
        }
    }

    /// Negation normal form of a closed formula.
    pub fn to_nnf(&self) -> Result<Nnf, FormulaError> {
        let (vars, times) = self.free_vars();
        if let Some(v) = vars.first() { return Err(FormulaError::FreeVariable(v.name.to_string())) }
        if let Some(t) = times.first() { return Err(FormulaError::FreeVariable(format!("#{}", t.name))) }
        self.nnf(true)
    }

    /// Negation normal form of a rule restriction, which may mention the rule's variables but no timepoints.
    pub fn to_term_nnf(&self) -> Result<Nnf, FormulaError> {
        if !self.free_vars().1.is_empty() { return Err(FormulaError::Temporal) }
        self.nnf(true)
    }

    fn nnf(&self, positive: bool) -> Result<Nnf, FormulaError> {
        Ok(match (self, positive) {
            (Formula::True, true) | (Formula::False, false) => Nnf::True,
            (Formula::True, false) | (Formula::False, true) => Nnf::False,
            (Formula::Atom(a), true) => Nnf::Atom(a.clone()),
            (Formula::Atom(a), false) => a.negate()?,
            (Formula::Not(f), _) => f.nnf(!positive)?,
            (Formula::And(fs), true) | (Formula::Or(fs), false) =>
                Nnf::And(fs.iter().map(|f| f.nnf(positive)).collect::<Result<_, _>>()?),
            (Formula::Or(fs), true) | (Formula::And(fs), false) =>
                Nnf::Or(fs.iter().map(|f| f.nnf(positive)).collect::<Result<_, _>>()?),
            (Formula::Implies(a, b), true) => Nnf::Or(vec![a.nnf(false)?, b.nnf(true)?]),
            (Formula::Implies(a, b), false) => Nnf::And(vec![a.nnf(true)?, b.nnf(false)?]),
            (Formula::Exists(bs, f), true) | (Formula::Forall(bs, f), false) =>
                Nnf::Exists(bs.clone(), Box::new(f.nnf(positive)?)),
            (Formula::Forall(bs, f), true) => guarded(bs, f, true)?,
            (Formula::Exists(bs, f), false) => guarded(bs, f, false)?
        })
    }
}

/// `All bs. f` when `positive`, `All bs. not f` otherwise.
fn guarded(binders: &[Binder], f: &Formula, positive: bool) -> Result<Nnf, FormulaError> {
    let (guard_formula, body) = match (f, positive) {
        (Formula::Implies(g, b), true) => ((**g).clone(), b.nnf(true)?),
        (Formula::Not(inner), true) => return guarded(binders, inner, false),
        (_, false) => {
            let mut parts = Vec::new();
            conjuncts(f, &mut parts);
            let (atoms, rest): (Vec<Formula>, Vec<Formula>) = parts.into_iter().partition(|p| matches!(p, Formula::Atom(_)));
            let body = match rest.len() {
                0 => Nnf::False,
                _ => Nnf::Or(rest.iter().map(|r| r.nnf(false)).collect::<Result<_, _>>()?)
            };
            (Formula::And(atoms), body)
        }
        _ => return Err(FormulaError::GuardShape)
    };

    let mut parts = Vec::new();
    conjuncts(&guard_formula, &mut parts);
    let mut guard = Vec::new();
    for part in parts {
        match part {
            Formula::Atom(Atom::Knows(..)) => return Err(FormulaError::KnowledgeInGuard),
            Formula::Atom(atom) => guard.push(atom),
            _ => return Err(FormulaError::GuardShape)
        }
    }

    let (mut bound_vars, mut bound_times) = (Vec::new(), Vec::new());
    for atom in &guard {
        if let Atom::Action(fact, i) = atom {
            fact.collect_vars(&mut bound_vars);
            bound_times.push(i.clone());
        }
    }
    for binder in binders {
        match binder {
            Binder::Msg(v) if !bound_vars.contains(v) => return Err(FormulaError::Unguarded(v.name.to_string())),
            Binder::Time(t) if !bound_times.contains(t) => return Err(FormulaError::Unguarded(format!("#{}", t.name))),
            _ => {}
        }
    }
    Ok(Nnf::Guarded(Guarded { binders: binders.to_vec(), guard, body: Box::new(body) }))
}

impl Nnf {
    /// Rewrites every term and timepoint. Binders are left untouched.
    pub fn map(&self, terms: &mut dyn FnMut(&Term) -> Term, times: &mut dyn FnMut(&TVar) -> TVar) -> Nnf {
        match self {
            Nnf::True => Nnf::True,
            Nnf::False => Nnf::False,
            Nnf::Atom(a) => Nnf::Atom(a.map(terms, times)),
            Nnf::NotEq(s, t) => Nnf::NotEq(terms(s), terms(t)),
            Nnf::And(fs) => Nnf::And(fs.iter().map(|f| f.map(terms, times)).collect()),
            Nnf::Or(fs) => Nnf::Or(fs.iter().map(|f| f.map(terms, times)).collect()),
            Nnf::Exists(bs, f) => Nnf::Exists(bs.clone(), Box::new(f.map(terms, times))),
            Nnf::Guarded(g) => Nnf::Guarded(Guarded {
                binders: g.binders.clone(),
                guard: g.guard.iter().map(|a| a.map(terms, times)).collect(),
                body: Box::new(g.body.map(terms, times))
            })
        }
    }

    /// Substitutes bound values, respecting shadowing by inner quantifiers.
    pub fn instantiate(&self, binding: &Binding) -> Nnf {
        match self {
            Nnf::True => Nnf::True,
            Nnf::False => Nnf::False,
            Nnf::Atom(a) => Nnf::Atom(a.instantiate(binding)),
            Nnf::NotEq(s, t) => Nnf::NotEq(binding.terms.apply(s), binding.terms.apply(t)),
            Nnf::And(fs) => Nnf::And(fs.iter().map(|f| f.instantiate(binding)).collect()),
            Nnf::Or(fs) => Nnf::Or(fs.iter().map(|f| f.instantiate(binding)).collect()),
            Nnf::Exists(bs, f) => Nnf::Exists(bs.clone(), Box::new(f.instantiate(&binding.without(bs)))),
            Nnf::Guarded(g) => {
                let inner = binding.without(&g.binders);
                Nnf::Guarded(Guarded {
                    binders: g.binders.clone(),
                    guard: g.guard.iter().map(|a| a.instantiate(&inner)).collect(),
                    body: Box::new(g.body.instantiate(&inner))
                })
            }
        }
    }

    /// Whether the formula holds on a ground trace.
    pub fn holds(&self, trace: &Trace, theories: &Theories) -> bool {
        Evaluator { trace, theories, domain: trace.subterms() }.eval(self, &Env::default())
    }
}

impl Guarded {
    /// The formula a guard instance must satisfy: some non-action guard atom fails, or the body holds.
    pub fn instance(&self, binding: &Binding) -> Nnf {
        let mut disjuncts: Vec<Nnf> = self.guard.iter()
            .filter(|a| a.as_action().is_none())
            .filter_map(|a| a.instantiate(binding).negate().ok())
            .collect();
        let body = self.body.instantiate(binding);
        if disjuncts.is_empty() { return body }
        disjuncts.push(body);
        Nnf::Or(disjuncts)
    }

    pub fn actions(&self) -> impl Iterator<Item = (Fact, &TVar)> {
        self.guard.iter().filter_map(Atom::as_action)
    }
}

/// Renames binders apart, returning the renamed binders and the renaming.
pub fn rename_binders(binders: &[Binder], supply: &mut VarSupply) -> (Vec<Binder>, Binding) {
    let idx = supply.next_idx();
    let mut binding = Binding::default();
    let renamed = binders.iter().map(|b| match b {
        Binder::Msg(v) => {
            let fresh = Var { name: v.name.clone(), idx, sort: v.sort };
            binding.terms.insert_raw(v.clone(), Term::Var(fresh.clone()));
            Binder::Msg(fresh)
        }
        Binder::Time(t) => {
            let fresh = TVar { name: t.name.clone(), idx };
            binding.times.insert(t.clone(), fresh.clone());
            Binder::Time(fresh)
        }
    }).collect();
    (renamed, binding)
}

#[derive(Clone, Default)]
struct Env {
    terms: Subst,
    times: BTreeMap<TVar, usize>
}

struct Evaluator<'a> {
    trace: &'a Trace,
    theories: &'a Theories,
    domain: Vec<Term>
}

impl<'a> Evaluator<'a> {
    fn term(&self, t: &Term, env: &Env) -> Term {
        self.theories.normalize(&env.terms.apply(t))
    }

    fn atom(&self, atom: &Atom, env: &Env) -> bool {
        if let Some((fact, i)) = atom.as_action() {
            let Some(&step) = env.times.get(i) else { return false };
            let fact = fact.map_terms(|t| self.term(t, env));
            return self.trace.steps.get(step).is_some_and(|s| s.actions.iter().any(|a| a.pred == fact.pred && a.args == fact.args));
        }
        match atom {
            Atom::Less(i, j) => matches!((env.times.get(i), env.times.get(j)), (Some(a), Some(b)) if a < b),
            Atom::TEq(i, j) => matches!((env.times.get(i), env.times.get(j)), (Some(a), Some(b)) if a == b),
            Atom::Eq(s, t) => self.term(s, env) == self.term(t, env),
            _ => false
        }
    }

    fn eval(&self, f: &Nnf, env: &Env) -> bool {
        match f {
            Nnf::True => true,
            Nnf::False => false,
            Nnf::Atom(a) => self.atom(a, env),
            Nnf::NotEq(s, t) => self.term(s, env) != self.term(t, env),
            Nnf::And(fs) => fs.iter().all(|f| self.eval(f, env)),
            Nnf::Or(fs) => fs.iter().any(|f| self.eval(f, env)),
            Nnf::Exists(bs, body) => {
                let mut atoms = Vec::new();
                collect_actions(body, &mut atoms);
                self.bindings(bs, &atoms, env).iter().any(|env| self.eval(body, env))
            }
            Nnf::Guarded(g) => {
                let atoms: Vec<Atom> = g.guard.iter().filter(|a| a.as_action().is_some()).cloned().collect();
                self.bindings(&g.binders, &atoms, env).iter().all(|env| {
                    let others = g.guard.iter().filter(|a| a.as_action().is_none()).all(|a| self.atom(a, env));
                    !others || self.eval(&g.body, env)
                })
            }
        }
    }

    /// Every extension of `env` to `binders` that satisfies the action `atoms`.
    fn bindings(&self, binders: &[Binder], atoms: &[Atom], env: &Env) -> Vec<Env> {
        let mut base = env.clone();
        let binder_set: BTreeSet<&Binder> = binders.iter().collect();
        base.terms = env.terms.iter()
            .filter(|(v, _)| !binder_set.contains(&Binder::Msg((*v).clone())))
            .map(|(v, t)| (v.clone(), t.clone())).collect();
        base.times.retain(|t, _| !binder_set.contains(&Binder::Time(t.clone())));

        let mut envs = vec![base];
        for atom in atoms {
            let Some((fact, i)) = atom.as_action() else { continue };
            let mut next = Vec::new();
            for env in envs {
                let pattern: Vec<Term> = fact.args.iter().map(|t| env.terms.apply(t)).collect();
                let steps: Vec<usize> = match env.times.get(i) {
                    Some(&step) => vec![step],
                    None if binder_set.contains(&Binder::Time(i.clone())) => (0..self.trace.steps.len()).collect(),
                    None => Vec::new()
                };
                for step in steps {
                    for action in self.trace.steps[step].actions.iter().filter(|a| a.pred == fact.pred && a.args.len() == pattern.len()) {
                        let mut terms = env.terms.clone();
                        if pattern.iter().zip(action.args.iter()).all(|(p, t)| match_term(&self.theories.normalize(p), t, &mut terms)) {
                            let mut times = env.times.clone();
                            times.insert(i.clone(), step);
                            next.push(Env { terms, times });
                        }
                    }
                }
            }
            envs = next;
        }

        // Binders not fixed by an action range over the trace's terms and timepoints.
        for binder in binders {
            envs = envs.into_iter().flat_map(|env| match binder {
                Binder::Msg(v) if env.terms.get(v).is_none() => self.domain.iter().filter(|t| v.sort.admits(t.sort())).map(|t| {
                    let mut e = env.clone();
                    e.terms.insert_raw(v.clone(), t.clone());
                    e
                }).collect::<Vec<_>>(),
                Binder::Time(t) if !env.times.contains_key(t) => (0..self.trace.steps.len()).map(|step| {
                    let mut e = env.clone();
                    e.times.insert(t.clone(), step);
                    e
                }).collect(),
                _ => vec![env]
            }).collect();
        }
        envs
    }
}

fn collect_actions(f: &Nnf, out: &mut Vec<Atom>) {
    match f {
        Nnf::And(fs) => for f in fs { collect_actions(f, out) },
        Nnf::Atom(a) if a.as_action().is_some() => out.push(a.clone()),
        _ => {}
    }
}

pub mod syntactic;
pub mod dh;
pub mod xor;
pub mod multiset;

use crate::term::*;
use crate::model::ModelError;
use std::fmt;
use syntactic::{RewriteRule, SyntacticTheory};
use tracing::debug;

/// Maximum number of unifiers returned for a single problem.
pub const MAX_UNIFIERS: usize = 64;
/// Maximum number of worklist problems examined by a single `unify` call.
const MAX_WORK: usize = 4096;
/// Maximum number of narrowing steps along one unification path.
const MAX_NARROWING: u32 = 3;

/// Equality modulo the active equational theory, as seen by the rest of the engine.
pub trait EquationalOracle {
    /// Rewrites `t` to its canonical form.
    fn normalize(&self, t: &Term) -> Term;

    /// Simultaneous unifiers of `eqs` extending `base`. Failure is an empty result, never an error.
    fn unify(&self, eqs: &[(Term, Term)], base: &Subst, supply: &mut VarSupply) -> Unifiers;
}

/// A set of unifiers. `complete` is false when enumeration was cut short, so missing
/// unifiers may exist.
#[derive(Debug, Clone)]
pub struct Unifiers {
    pub substs: Vec<Subst>,
    pub complete: bool
}

impl Unifiers {
    pub fn is_empty(&self) -> bool {
        self.substs.is_empty()
    }
}

/// One way of solving an equation: the equations that remain to be solved.
#[derive(Debug, Clone, Default)]
pub struct Alternative {
    pub eqs: Vec<(Term, Term)>,
    pub narrowed: bool
}

impl Alternative {
    pub fn solved() -> Self {
        Alternative::default()
    }

    pub fn eqs(eqs: Vec<(Term, Term)>) -> Self {
        Alternative { eqs, narrowed: false }
    }
}

/// The alternatives a theory offers for one equation.
#[derive(Debug, Clone)]
pub struct Solutions {
    pub alternatives: Vec<Alternative>,
    pub complete: bool
}

impl Solutions {
    pub fn none() -> Self {
        Solutions { alternatives: Vec::new(), complete: true }
    }

    pub fn one(alternative: Alternative) -> Self {
        Solutions { alternatives: vec![alternative], complete: true }
    }
}

/// A deconstruction step available to the adversary: after solving `eqs`,
/// knowing every `side` term reveals `output`.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub eqs: Vec<(Term, Term)>,
    pub output: Term,
    pub side: Vec<Term>
}

/// A capability module for one family of function symbols.
pub trait Theory: Send + Sync + fmt::Debug {
    /// Whether this theory interprets `f`.
    fn owns(&self, f: FunId) -> bool;

    /// One rewrite at the root of `t`, whose arguments are already normal. `None` if `t` is normal.
    fn normalize(&self, t: &Term) -> Option<Term>;

    /// Alternatives for the equation `l = r`, where at least one side is headed by an owned symbol.
    fn unify(&self, l: &Term, r: &Term, supply: &mut VarSupply) -> Solutions;

    /// The ways `t` can be assembled from smaller terms by public operations.
    fn decompose(&self, t: &Term) -> Vec<Vec<Term>>;

    /// The deconstruction steps that apply to a term the adversary holds.
    fn extract(&self, t: &Term, supply: &mut VarSupply) -> Vec<Extraction>;
}

/// Which built-in theories beyond the free symbols are active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Builtins {
    pub diffie_hellman: bool,
    pub xor: bool,
    pub multiset: bool
}

/// The combination of the syntactic theory with the active built-in theories.
/// Symbols are partitioned between the modules, so every equation is handed
/// to the module owning one of its head symbols.
#[derive(Debug)]
pub struct Theories {
    syntactic: SyntacticTheory,
    modules: Vec<Box<dyn Theory>>
}

struct Problem {
    sigma: Subst,
    eqs: Vec<(Term, Term)>,
    narrowings: u32
}

impl Theories {
    /// Builds the theory from the user's rewrite rules, validating them first.
    pub fn new(signature: &Signature, rules: Vec<RewriteRule>, builtins: Builtins) -> Result<Self, ModelError> {
        let mut modules: Vec<Box<dyn Theory>> = Vec::new();
        if builtins.diffie_hellman { modules.push(Box::new(dh::DiffieHellman)) }
        if builtins.xor { modules.push(Box::new(xor::Xor)) }
        if builtins.multiset { modules.push(Box::new(multiset::Multiset)) }
        let theories = Theories { syntactic: SyntacticTheory::new(signature, rules)?, modules };
        theories.check_critical_pairs()?;
        Ok(theories)
    }

    pub fn rules(&self) -> &[RewriteRule] {
        self.syntactic.rules()
    }

    fn module(&self, f: FunId) -> Option<&dyn Theory> {
        self.modules.iter().find(|m| m.owns(f)).map(|m| m.as_ref())
    }

    fn owner(&self, f: FunId) -> &dyn Theory {
        self.module(f).unwrap_or(&self.syntactic)
    }

    /// Whether `f` is interpreted by a built-in theory rather than being free.
    pub fn is_builtin(&self, f: FunId) -> bool {
        self.module(f).is_some()
    }

    /// Whether `f` heads the left side of some rewrite rule.
    pub fn is_destructor(&self, f: FunId) -> bool {
        self.syntactic.is_destructor(f)
    }

    pub fn decompose(&self, t: &Term) -> Vec<Vec<Term>> {
        match t.head() {
            Some(f) => self.owner(f).decompose(t),
            None => Vec::new()
        }
    }

    pub fn extract(&self, t: &Term, supply: &mut VarSupply) -> Vec<Extraction> {
        match t.head() {
            Some(f) => self.owner(f).extract(t, supply),
            None => Vec::new()
        }
    }

    /// Orients `x = t` into a binding if sorts and the occurs check allow it.
    fn orient(l: &Term, r: &Term) -> Option<(Var, Term)> {
        match (l, r) {
            (Term::Var(x), Term::Var(y)) => {
                if x.sort == y.sort {
                    if x > y { Some((x.clone(), r.clone())) } else { Some((y.clone(), l.clone())) }
                } else if x.sort.admits(y.sort) {
                    Some((x.clone(), r.clone()))
                } else if y.sort.admits(x.sort) {
                    Some((y.clone(), l.clone()))
                } else {
                    None
                }
            }
            (Term::Var(x), t) | (t, Term::Var(x)) if x.sort.admits(t.sort()) && !t.occurs(x) =>
                Some((x.clone(), t.clone())),
            _ => None
        }
    }

    fn solve(&self, l: &Term, r: &Term, supply: &mut VarSupply) -> Solutions {
        let module = [l, r].into_iter().find_map(|t| t.head().and_then(|f| self.module(f)));
        match module {
            Some(theory) => theory.unify(l, r, supply),
            None => self.syntactic.unify(l, r, supply)
        }
    }

    /// Root overlaps between rewrite rules must rewrite to the same normal form.
    fn check_critical_pairs(&self) -> Result<(), ModelError> {
        let rules = self.syntactic.rules();
        for (i, first) in rules.iter().enumerate() {
            for second in rules.iter().skip(i + 1) {
                if first.lhs.head() != second.lhs.head() { continue }
                let mut supply = VarSupply::default();
                let renaming = supply.renaming(&second.lhs.vars());
                let lhs = renaming.apply(&second.lhs);
                let rhs = renaming.apply(&second.rhs);
                for sigma in syntactic::syntactic_unify(&first.lhs, &lhs) {
                    if self.normalize(&sigma.apply(&first.rhs)) != self.normalize(&sigma.apply(&rhs)) {
                        return Err(ModelError::NotConfluent { first: first.name.clone(), second: second.name.clone() });
                    }
                }
            }
        }
        Ok(())
    }

    /// Whether `l` and `r` are equal modulo the theory.
    pub fn equal(&self, l: &Term, r: &Term) -> bool {
        self.normalize(l) == self.normalize(r)
    }
}

impl EquationalOracle for Theories {
    fn normalize(&self, t: &Term) -> Term {
        match t {
            Term::App(f, args) => {
                let t = Term::App(*f, args.iter().map(|a| self.normalize(a)).collect());
                match self.owner(*f).normalize(&t) {
                    Some(rewritten) => self.normalize(&rewritten),
                    None => t
                }
            }
            _ => t.clone()
        }
    }

    fn unify(&self, eqs: &[(Term, Term)], base: &Subst, supply: &mut VarSupply) -> Unifiers {
        let mut found: Vec<Subst> = Vec::new();
        let mut complete = true;
        let mut work = 0;
        let mut stack = vec![Problem { sigma: base.clone(), eqs: eqs.iter().rev().cloned().collect(), narrowings: 0 }];
        let normalize = |t: &Term| self.normalize(t);

        while let Some(mut problem) = stack.pop() {
            work += 1;
            if work > MAX_WORK || found.len() >= MAX_UNIFIERS {
                complete = false;
                break;
            }
            let Some((l, r)) = problem.eqs.pop() else {
                if !found.contains(&problem.sigma) { found.push(problem.sigma) }
                continue;
            };
            let l = self.normalize(&problem.sigma.apply(&l));
            let r = self.normalize(&problem.sigma.apply(&r));
            if l == r {
                stack.push(problem);
                continue;
            }
            if let Some((var, term)) = Theories::orient(&l, &r) {
                problem.sigma.bind(var, term, &normalize);
                stack.push(problem);
                continue;
            }

            let solutions = self.solve(&l, &r, supply);
            complete &= solutions.complete;
            for alternative in solutions.alternatives.into_iter().rev() {
                if alternative.narrowed && problem.narrowings >= MAX_NARROWING {
                    complete = false;
                    continue;
                }
                let mut eqs = problem.eqs.clone();
                eqs.extend(alternative.eqs.into_iter().rev());
                stack.push(Problem {
                    sigma: problem.sigma.clone(),
                    eqs,
                    narrowings: problem.narrowings + alternative.narrowed as u32
                });
            }
        }

        // Every unifier is checked against the equations it claims to solve.
        let before = found.len();
        let substs: Vec<Subst> = found.into_iter().filter(|sigma|
            eqs.iter().all(|(l, r)| self.normalize(&sigma.apply(l)) == self.normalize(&sigma.apply(r)))
        ).collect();
        if substs.len() < before {
            debug!(rejected = before - substs.len(), "discarded unsound unifiers");
            complete = false;
        }
        Unifiers { substs, complete }
    }
}

/// All ways of splitting `items` into two non-empty parts, the first part always holding `items[0]`.
pub(crate) fn bipartitions(items: &[Term]) -> Vec<(Vec<Term>, Vec<Term>)> {
    let n = items.len();
    if n < 2 || n > 6 { return Vec::new() }
    let mut out = Vec::new();
    for mask in 0..(1u32 << (n - 1)) {
        let mut first = vec![items[0].clone()];
        let mut second = Vec::new();
        for (i, item) in items.iter().enumerate().skip(1) {
            if mask & (1 << (i - 1)) != 0 { first.push(item.clone()) } else { second.push(item.clone()) }
        }
        if !second.is_empty() { out.push((first, second)) }
    }
    out
}

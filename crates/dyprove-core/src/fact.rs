use crate::term::*;
use crate::theory::EquationalOracle;
use hashbrown::HashMap;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use string_interner::{DefaultBackend, DefaultSymbol, StringInterner};

/// Predicate names are interned for fast comparison.
static INTERNER: Lazy<Mutex<StringInterner<DefaultBackend>>> = Lazy::new(|| Mutex::new(StringInterner::default()));

static IN: Lazy<Pred> = Lazy::new(|| Pred::new("In"));
static OUT: Lazy<Pred> = Lazy::new(|| Pred::new("Out"));
static FR: Lazy<Pred> = Lazy::new(|| Pred::new("Fr"));
static K: Lazy<Pred> = Lazy::new(|| Pred::new("K"));

/// An interned predicate name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pred(DefaultSymbol);

impl Pred {
    pub fn new(name: &str) -> Self {
        Pred(INTERNER.lock().unwrap_or_else(PoisonError::into_inner).get_or_intern(name))
    }

    pub fn name(&self) -> String {
        INTERNER.lock().unwrap_or_else(PoisonError::into_inner).resolve(self.0).unwrap_or_default().to_string()
    }

    /// Message received from the network.
    pub fn input() -> Self { *IN }

    /// Message sent to the network.
    pub fn output() -> Self { *OUT }

    /// Fresh value generation.
    pub fn fresh() -> Self { *FR }

    /// Adversary knowledge, emitted as an action.
    pub fn knows() -> Self { *K }

    /// Whether the engine gives this predicate a built-in meaning.
    pub fn is_reserved(&self) -> bool {
        *self == *IN || *self == *OUT || *self == *FR || *self == *K
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Multiplicity {
    Linear,
    Persistent
}

/// A predicate applied to terms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fact {
    pub pred: Pred,
    pub multiplicity: Multiplicity,
    pub args: Vec<Term>
}

impl Fact {
    pub fn linear(pred: Pred, args: Vec<Term>) -> Self {
        Fact { pred, multiplicity: Multiplicity::Linear, args }
    }

    pub fn persistent(pred: Pred, args: Vec<Term>) -> Self {
        Fact { pred, multiplicity: Multiplicity::Persistent, args }
    }

    pub fn is_persistent(&self) -> bool {
        self.multiplicity == Multiplicity::Persistent
    }

    /// Whether a conclusion with this shape can satisfy `other` as a premise.
    pub fn same_kind(&self, other: &Fact) -> bool {
        self.pred == other.pred && self.multiplicity == other.multiplicity && self.args.len() == other.args.len()
    }

    pub fn map_terms(&self, f: impl FnMut(&Term) -> Term) -> Fact {
        Fact { pred: self.pred, multiplicity: self.multiplicity, args: self.args.iter().map(f).collect() }
    }

    pub fn apply(&self, sigma: &Subst) -> Fact {
        self.map_terms(|t| sigma.apply(t))
    }

    pub fn normalize(&self, oracle: &impl EquationalOracle) -> Fact {
        self.map_terms(|t| oracle.normalize(t))
    }

    pub fn collect_vars(&self, out: &mut Vec<Var>) {
        for arg in &self.args { arg.collect_vars(out) }
    }

    pub fn is_ground(&self) -> bool {
        self.args.iter().all(Term::is_ground)
    }

    /// Equations unifying the arguments of two facts of the same kind.
    pub fn equations(&self, other: &Fact) -> Vec<(Term, Term)> {
        self.args.iter().cloned().zip(other.args.iter().cloned()).collect()
    }
}

/// The multiset state of a run: linear facts with multiplicity, and the
/// append-only set of persistent facts, indexed by content.
#[derive(Debug, Clone, Default)]
pub struct FactStore {
    linear: BTreeMap<Fact, usize>,
    persistent: Vec<Fact>,
    index: HashMap<Fact, usize>
}

impl FactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a ground fact. Persistent facts merge idempotently.
    pub fn produce(&mut self, fact: Fact) {
        match fact.multiplicity {
            Multiplicity::Linear => *self.linear.entry(fact).or_insert(0) += 1,
            Multiplicity::Persistent => if !self.index.contains_key(&fact) {
                self.index.insert(fact.clone(), self.persistent.len());
                self.persistent.push(fact);
            }
        }
    }

    /// Uses a fact as a premise. Linear facts are removed; fails if the fact is absent.
    pub fn consume(&mut self, fact: &Fact) -> bool {
        match fact.multiplicity {
            Multiplicity::Persistent => self.index.contains_key(fact),
            Multiplicity::Linear => match self.linear.get_mut(fact) {
                Some(count) => {
                    *count -= 1;
                    if *count == 0 { self.linear.remove(fact); }
                    true
                }
                None => false
            }
        }
    }

    pub fn contains(&self, fact: &Fact) -> bool {
        match fact.multiplicity {
            Multiplicity::Linear => self.linear.contains_key(fact),
            Multiplicity::Persistent => self.index.contains_key(fact)
        }
    }

    /// Every stored fact unifiable with `pattern` under an extension of `sigma`.
    pub fn match_pattern<'a, O: EquationalOracle>(&'a self, pattern: &'a Fact, sigma: &'a Subst, oracle: &'a O,
        supply: &'a mut VarSupply) -> impl Iterator<Item = (Subst, &'a Fact)> + 'a {
        let stored: Box<dyn Iterator<Item = &'a Fact> + 'a> = match pattern.multiplicity {
            Multiplicity::Linear => Box::new(self.linear.keys()),
            Multiplicity::Persistent => Box::new(self.persistent.iter())
        };
        stored.filter(move |fact| fact.same_kind(pattern)).flat_map(move |fact| {
            let unifiers = oracle.unify(&pattern.equations(fact), sigma, supply);
            unifiers.substs.into_iter().map(move |s| (s, fact))
        })
    }

    /// Linear facts with their multiplicities.
    pub fn linear_facts(&self) -> impl Iterator<Item = (&Fact, usize)> {
        self.linear.iter().map(|(f, n)| (f, *n))
    }

    pub fn persistent_facts(&self) -> &[Fact] {
        &self.persistent
    }

    pub fn linear_count(&self) -> usize {
        self.linear.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theory::{Builtins, Theories};

    fn fact(name: &str, arg: &str) -> Fact {
        Fact::linear(Pred::new(name), vec![Term::pub_name(arg)])
    }

    #[test]
    fn linear_facts_are_counted() {
        let mut store = FactStore::new();
        store.produce(fact("St", "a"));
        store.produce(fact("St", "a"));
        assert!(store.consume(&fact("St", "a")));
        assert!(store.consume(&fact("St", "a")));
        assert!(!store.consume(&fact("St", "a")));
    }

    #[test]
    fn persistent_facts_survive_consumption() {
        let mut store = FactStore::new();
        let key = Fact::persistent(Pred::new("Key"), vec![Term::pub_name("a")]);
        store.produce(key.clone());
        store.produce(key.clone());
        assert!(store.consume(&key));
        assert!(store.consume(&key));
        assert_eq!(store.persistent_facts().len(), 1);
    }

    #[test]
    fn patterns_bind_variables() {
        let theories = Theories::new(&Signature::new(), Vec::new(), Builtins::default()).unwrap();
        let mut store = FactStore::new();
        store.produce(fact("St", "a"));
        store.produce(fact("St", "b"));
        store.produce(fact("Other", "c"));
        let x = Var::msg("x");
        let pattern = Fact::linear(Pred::new("St"), vec![Term::Var(x.clone())]);
        let sigma = Subst::new();
        let mut supply = VarSupply::default();
        let bound: Vec<Term> = store.match_pattern(&pattern, &sigma, &theories, &mut supply)
            .map(|(s, _)| s.apply(&Term::Var(x.clone()))).collect();
        assert_eq!(bound, vec![Term::pub_name("a"), Term::pub_name("b")]);
    }

    #[test]
    fn reserved_predicates_are_recognised() {
        assert!(Pred::new("In").is_reserved());
        assert!(!Pred::new("Init").is_reserved());
    }
}

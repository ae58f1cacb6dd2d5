use crate::term::*;
use crate::theory::{EquationalOracle, Theories};
use std::collections::BTreeSet;

/// Construction depth beyond which a term is considered underivable.
const MAX_CONSTRUCTION_DEPTH: usize = 16;

/// What the adversary has observed, closed under deconstruction. Construction
/// with public symbols is checked on demand by `derives`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Knowledge {
    terms: BTreeSet<Term>
}

impl Knowledge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn terms(&self) -> &BTreeSet<Term> {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn contains(&self, t: &Term) -> bool {
        self.terms.contains(t)
    }

    /// Adds an observed ground term and analyses the result to a fixpoint.
    /// A deconstruction step is taken once every side term it needs is derivable.
    pub fn learn(&mut self, t: &Term, theories: &Theories) {
        if !self.terms.insert(theories.normalize(t)) { return }
        let mut supply = VarSupply::default();
        loop {
            let mut learned = Vec::new();
            for term in &self.terms {
                for extraction in theories.extract(term, &mut supply) {
                    let unifiers = theories.unify(&extraction.eqs, &Subst::new(), &mut supply);
                    for sigma in unifiers.substs {
                        let output = theories.normalize(&sigma.apply(&extraction.output));
                        if !output.is_ground() || self.terms.contains(&output) || learned.contains(&output) { continue }
                        if extraction.side.iter().all(|s| self.derives(&sigma.apply(s), theories)) {
                            learned.push(output);
                        }
                    }
                }
            }
            if learned.is_empty() { return }
            self.terms.extend(learned);
        }
    }

    /// Whether the adversary can produce `t`: it is known, a public name, or built from derivable parts.
    pub fn derives(&self, t: &Term, theories: &Theories) -> bool {
        self.derivable(&theories.normalize(t), theories, 0)
    }

    fn derivable(&self, t: &Term, theories: &Theories, depth: usize) -> bool {
        if self.terms.contains(t) { return true }
        match t {
            Term::Name(Name::Pub(_)) => true,
            Term::App(..) if depth < MAX_CONSTRUCTION_DEPTH => theories.decompose(t).iter()
                .any(|parts| parts.iter().all(|p| self.derivable(p, theories, depth + 1))),
            _ => false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theory::syntactic::RewriteRule;
    use crate::theory::Builtins;
    use crate::term::Visibility::*;

    fn fresh(name: &str) -> Term {
        Term::Name(Name::Fresh(name.into(), 1))
    }

    fn encryption() -> (Theories, FunId) {
        let mut sig = Signature::new();
        let senc = sig.declare("senc", 2, Public).unwrap();
        let sdec = sig.declare("sdec", 2, Public).unwrap();
        let m = Term::Var(Var::msg("m"));
        let k = Term::Var(Var::msg("k"));
        let rule = RewriteRule { name: "sdec".into(), lhs: Term::app(sdec, vec![Term::app(senc, vec![m.clone(), k.clone()]), k]), rhs: m };
        (Theories::new(&sig, vec![rule], Builtins::default()).unwrap(), senc)
    }

    #[test]
    fn pairs_are_split() {
        let (theories, _) = encryption();
        let mut knowledge = Knowledge::new();
        knowledge.learn(&Term::pair(fresh("a"), fresh("b")), &theories);
        assert!(knowledge.contains(&fresh("a")));
        assert!(knowledge.contains(&fresh("b")));
        assert!(knowledge.derives(&Term::pair(fresh("b"), fresh("a")), &theories));
    }

    #[test]
    fn decryption_waits_for_the_key() {
        let (theories, senc) = encryption();
        let mut knowledge = Knowledge::new();
        knowledge.learn(&Term::app(senc, vec![fresh("secret"), fresh("key")]), &theories);
        assert!(!knowledge.derives(&fresh("secret"), &theories));
        knowledge.learn(&fresh("key"), &theories);
        assert!(knowledge.derives(&fresh("secret"), &theories));
    }

    #[test]
    fn public_names_are_always_derivable() {
        let (theories, senc) = encryption();
        let knowledge = Knowledge::new();
        assert!(knowledge.derives(&Term::app(senc, vec![Term::pub_name("a"), Term::pub_name("b")]), &theories));
        assert!(!knowledge.derives(&fresh("n"), &theories));
    }
}

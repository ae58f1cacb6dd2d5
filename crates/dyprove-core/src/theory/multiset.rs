use super::*;

/// Multiset union: associative and commutative, without unit or cancellation.
#[derive(Debug)]
pub struct Multiset;

fn elements(t: &Term) -> Vec<Term> {
    match t {
        Term::App(f, args) if *f == UNION => args.clone(),
        _ => vec![t.clone()]
    }
}

/// The normalized union of a non-empty list of elements.
pub fn union(mut elements: Vec<Term>) -> Term {
    if elements.len() == 1 { return elements.remove(0) }
    elements.sort();
    Term::App(UNION, elements)
}

impl Theory for Multiset {
    fn owns(&self, f: FunId) -> bool {
        f == UNION
    }

    fn normalize(&self, t: &Term) -> Option<Term> {
        let Term::App(f, args) = t else { return None };
        if *f != UNION { return None }
        let normal = union(args.iter().flat_map(elements).collect());
        (normal != *t).then_some(normal)
    }

    fn unify(&self, l: &Term, r: &Term, supply: &mut VarSupply) -> Solutions {
        let mut left = elements(l);
        let mut right = elements(r);
        left.retain(|t| match right.iter().position(|u| u == t) {
            Some(i) => { right.remove(i); false }
            None => true
        });
        match (left.len(), right.len()) {
            (0, 0) => return Solutions::one(Alternative::solved()),
            (0, _) | (_, 0) => return Solutions::none(),
            _ => {}
        }
        if let [single] = left.as_slice() {
            if single.is_msg_var() { return Solutions::one(Alternative::eqs(vec![(single.clone(), union(right))])) }
        }
        if let [single] = right.as_slice() {
            if single.is_msg_var() { return Solutions::one(Alternative::eqs(vec![(single.clone(), union(left))])) }
        }

        // Elements other than message variables are atomic. Only variables on both sides can share
        // parts of each other, which this enumeration does not cover.
        let complete = !(left.iter().any(Term::is_msg_var) && right.iter().any(Term::is_msg_var));

        // Pair the first left element with each right element, or let one of the two absorb more elements.
        let first = left.remove(0);
        let mut alternatives = Vec::new();
        for j in 0..right.len() {
            let mut rest = right.clone();
            let partner = rest.remove(j);
            let pair = (first.clone(), partner.clone());
            match (left.is_empty(), rest.is_empty()) {
                (true, true) => alternatives.push(Alternative::eqs(vec![pair])),
                (false, false) => alternatives.push(Alternative::eqs(vec![pair, (union(left.clone()), union(rest.clone()))])),
                _ => {}
            }
            if first.is_msg_var() && !rest.is_empty() {
                let extra = Term::Var(supply.fresh_var("u", Sort::Msg));
                let mut absorbed = left.clone();
                absorbed.push(extra.clone());
                alternatives.push(Alternative::eqs(vec![
                    (first.clone(), union(vec![partner.clone(), extra])),
                    (union(absorbed), union(rest.clone()))
                ]));
            }
            if partner.is_msg_var() && !left.is_empty() {
                let extra = Term::Var(supply.fresh_var("u", Sort::Msg));
                let mut absorbed = rest.clone();
                absorbed.push(extra.clone());
                alternatives.push(Alternative::eqs(vec![
                    (partner, union(vec![first.clone(), extra])),
                    (union(left.clone()), union(absorbed))
                ]));
            }
        }
        Solutions { alternatives, complete }
    }

    fn decompose(&self, t: &Term) -> Vec<Vec<Term>> {
        let Term::App(f, args) = t else { return Vec::new() };
        if *f != UNION { return Vec::new() }
        bipartitions(args).into_iter().map(|(a, b)| vec![union(a), union(b)]).collect()
    }

    fn extract(&self, _: &Term, _: &mut VarSupply) -> Vec<Extraction> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_is_order_independent() {
        let theories = Theories::new(&Signature::new(), Vec::new(), Builtins { multiset: true, ..Builtins::default() }).unwrap();
        let (a, b, c) = (Term::pub_name("a"), Term::pub_name("b"), Term::pub_name("c"));
        let left = Term::App(UNION, vec![a.clone(), Term::App(UNION, vec![b.clone(), c.clone()])]);
        let right = Term::App(UNION, vec![Term::App(UNION, vec![c, a]), b]);
        assert_eq!(theories.normalize(&left), theories.normalize(&right));
    }

    #[test]
    fn a_variable_absorbs_the_remainder() {
        let theories = Theories::new(&Signature::new(), Vec::new(), Builtins { multiset: true, ..Builtins::default() }).unwrap();
        let (a, b, c) = (Term::pub_name("a"), Term::pub_name("b"), Term::pub_name("c"));
        let x = Term::Var(Var::msg("x"));
        let left = Term::App(UNION, vec![a.clone(), x.clone()]);
        let right = Term::App(UNION, vec![a, b.clone(), c.clone()]);
        let unifiers = theories.unify(&[(left, right)], &Subst::new(), &mut VarSupply::default());
        assert!(unifiers.substs.iter().any(|s| s.apply(&x) == theories.normalize(&Term::App(UNION, vec![b.clone(), c.clone()]))));
    }

    fn theories() -> Theories {
        Theories::new(&Signature::new(), Vec::new(), Builtins { multiset: true, ..Builtins::default() }).unwrap()
    }

    #[test]
    fn atomic_elements_are_matched_exhaustively() {
        let theories = theories();
        let (a, b, c) = (Term::pub_name("a"), Term::pub_name("b"), Term::pub_name("c"));
        let tagged = Term::pair(Term::Var(Var::msg("x")), c);
        let left = Term::App(UNION, vec![tagged, a.clone()]);
        let right = Term::App(UNION, vec![a, b]);
        let unifiers = theories.unify(&[(left, right)], &Subst::new(), &mut VarSupply::default());
        assert!(unifiers.substs.is_empty());
        assert!(unifiers.complete);
    }

    #[test]
    fn a_variable_on_the_other_side_absorbs_several_elements() {
        let theories = theories();
        let (a, b, c) = (Term::pub_name("a"), Term::pub_name("b"), Term::pub_name("c"));
        let (y, z) = (Term::Var(Var::msg("y")), Term::Var(Var::msg("z")));
        let left = Term::App(UNION, vec![a.clone(), b.clone(), c.clone()]);
        let right = Term::App(UNION, vec![y.clone(), z.clone()]);
        let unifiers = theories.unify(&[(left, right)], &Subst::new(), &mut VarSupply::default());
        assert!(unifiers.complete);
        let ab = theories.normalize(&Term::App(UNION, vec![a, b]));
        assert!(unifiers.substs.iter().any(|s|
            theories.normalize(&s.apply(&y)) == ab && theories.normalize(&s.apply(&z)) == c));
    }

    #[test]
    fn variables_on_both_sides_are_incomplete() {
        let theories = theories();
        let (x, y) = (Term::Var(Var::msg("x")), Term::Var(Var::msg("y")));
        let left = Term::App(UNION, vec![x, Term::pub_name("a")]);
        let right = Term::App(UNION, vec![y, Term::pub_name("b")]);
        let unifiers = theories.unify(&[(left, right)], &Subst::new(), &mut VarSupply::default());
        assert!(!unifiers.complete);
        assert!(!unifiers.substs.is_empty());
    }
}

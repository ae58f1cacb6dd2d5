use super::*;

/// Exclusive or: associative, commutative, nilpotent, with unit `zero`.
#[derive(Debug)]
pub struct Xor;

fn summands(t: &Term) -> Vec<Term> {
    match t {
        Term::App(f, args) if *f == XOR => args.clone(),
        Term::App(f, _) if *f == ZERO => Vec::new(),
        _ => vec![t.clone()]
    }
}

/// The normalized sum of `terms`, cancelling equal pairs.
pub fn sum(terms: Vec<Term>) -> Term {
    let mut kept: Vec<Term> = Vec::new();
    for t in terms {
        match kept.iter().position(|k| *k == t) {
            Some(i) => { kept.remove(i); }
            None => kept.push(t)
        }
    }
    match kept.len() {
        0 => Term::constant(ZERO),
        1 => kept.remove(0),
        _ => {
            kept.sort();
            Term::App(XOR, kept)
        }
    }
}

impl Theory for Xor {
    fn owns(&self, f: FunId) -> bool {
        f == XOR || f == ZERO
    }

    fn normalize(&self, t: &Term) -> Option<Term> {
        let Term::App(f, args) = t else { return None };
        if *f != XOR { return None }
        let normal = sum(args.iter().flat_map(summands).collect());
        (normal != *t).then_some(normal)
    }

    fn unify(&self, l: &Term, r: &Term, _: &mut VarSupply) -> Solutions {
        let mut all = summands(l);
        all.extend(summands(r));
        let rest = summands(&sum(all));
        if rest.is_empty() {
            return Solutions::one(Alternative::solved());
        }

        for (i, t) in rest.iter().enumerate() {
            let Term::Var(v) = t else { continue };
            if v.sort != Sort::Msg { continue }
            let others: Vec<Term> = rest.iter().enumerate().filter(|(j, _)| *j != i).map(|(_, t)| t.clone()).collect();
            if others.iter().any(|o| o.occurs(v)) { continue }
            return Solutions::one(Alternative::eqs(vec![(t.clone(), sum(others))]));
        }

        match rest.len() {
            1 => Solutions::none(),
            2 => Solutions::one(Alternative::eqs(vec![(rest[0].clone(), rest[1].clone())])),
            _ => {
                let alternatives = (1..rest.len()).map(|j| {
                    let remaining = rest.iter().enumerate().filter(|(k, _)| *k != 0 && *k != j).map(|(_, t)| t.clone()).collect();
                    Alternative::eqs(vec![(rest[0].clone(), rest[j].clone()), (sum(remaining), Term::constant(ZERO))])
                }).collect();
                Solutions { alternatives, complete: false }
            }
        }
    }

    fn decompose(&self, t: &Term) -> Vec<Vec<Term>> {
        let Term::App(f, args) = t else { return Vec::new() };
        if *f == ZERO { return vec![Vec::new()] }
        bipartitions(args).into_iter().map(|(a, b)| vec![sum(a), sum(b)]).collect()
    }

    fn extract(&self, t: &Term, _: &mut VarSupply) -> Vec<Extraction> {
        let Term::App(f, args) = t else { return Vec::new() };
        if *f != XOR { return Vec::new() }
        (0..args.len()).map(|i| {
            let mut rest = args.clone();
            let output = rest.remove(i);
            Extraction { eqs: Vec::new(), output, side: vec![sum(rest)] }
        }).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_summands_cancel() {
        let theories = Theories::new(&Signature::new(), Vec::new(), Builtins { xor: true, ..Builtins::default() }).unwrap();
        let a = Term::pub_name("a");
        let b = Term::pub_name("b");
        let t = Term::App(XOR, vec![a.clone(), Term::App(XOR, vec![b.clone(), a])]);
        assert_eq!(theories.normalize(&t), b);
    }

    #[test]
    fn extraction_needs_the_other_summands() {
        let a = Term::pub_name("a");
        let b = Term::pub_name("b");
        let extractions = Xor.extract(&Term::App(XOR, vec![a.clone(), b.clone()]), &mut VarSupply::default());
        assert_eq!(extractions.len(), 2);
        assert_eq!(extractions[0].output, a);
        assert_eq!(extractions[0].side, vec![b]);
    }
}

use super::*;

/// Diffie-Hellman exponentiation. Exponents form an abelian group under `mult`
/// with inverse `inv` and unit `one`; products are kept flattened and sorted.
#[derive(Debug)]
pub struct DiffieHellman;

/// The factors of a product, `[t]` for anything that is not a product.
pub fn factors(t: &Term) -> Vec<Term> {
    match t {
        Term::App(f, args) if *f == MULT => args.clone(),
        Term::App(f, _) if *f == ONE => Vec::new(),
        _ => vec![t.clone()]
    }
}

/// The normalized product of `factors`.
pub fn product(mut factors: Vec<Term>) -> Term {
    match factors.len() {
        0 => Term::constant(ONE),
        1 => factors.remove(0),
        _ => {
            factors.sort();
            Term::App(MULT, factors)
        }
    }
}

/// The group inverse of a single normalized factor.
pub fn inverse(t: &Term) -> Term {
    match t {
        Term::App(f, args) if *f == INV => args[0].clone(),
        Term::App(f, _) if *f == ONE => t.clone(),
        Term::App(f, args) if *f == MULT => product(args.iter().map(inverse).collect()),
        _ => Term::App(INV, vec![t.clone()])
    }
}

/// The element a factor is a power of, and whether it is inverted.
fn base(t: &Term) -> (&Term, bool) {
    match t {
        Term::App(f, args) if *f == INV => (&args[0], true),
        _ => (t, false)
    }
}

/// Cancels inverse pairs in a list of factors.
fn cancel(factors: Vec<Term>) -> Vec<Term> {
    let mut out: Vec<Term> = Vec::new();
    for factor in factors {
        let inv = inverse(&factor);
        match out.iter().position(|f| *f == inv) {
            Some(i) => { out.remove(i); }
            None => out.push(factor)
        }
    }
    out
}

impl Theory for DiffieHellman {
    fn owns(&self, f: FunId) -> bool {
        f == EXP || f == MULT || f == INV || f == ONE
    }

    fn normalize(&self, t: &Term) -> Option<Term> {
        let Term::App(f, args) = t else { return None };
        match *f {
            f if f == MULT => {
                let flat: Vec<Term> = args.iter().flat_map(factors).collect();
                let normal = product(cancel(flat));
                (normal != *t).then_some(normal)
            }
            f if f == INV => {
                let normal = inverse(&args[0]);
                (normal != *t).then_some(normal)
            }
            f if f == EXP => match (&args[0], &args[1]) {
                (_, e) if *e == Term::constant(ONE) => Some(args[0].clone()),
                (Term::App(g, inner), e) if *g == EXP =>
                    Some(Term::App(EXP, vec![inner[0].clone(), Term::App(MULT, vec![inner[1].clone(), e.clone()])])),
                _ => None
            },
            _ => None
        }
    }

    fn unify(&self, l: &Term, r: &Term, _: &mut VarSupply) -> Solutions {
        match (l.head(), r.head()) {
            (Some(f), Some(g)) if f == EXP && g == EXP => {
                let (b1, e1) = (&l.args()[0], &l.args()[1]);
                let (b2, e2) = (&r.args()[0], &r.args()[1]);
                let mut alternatives = vec![Alternative::eqs(vec![(b1.clone(), b2.clone()), (e1.clone(), e2.clone())])];
                if b1.is_msg_var() {
                    let shift = Term::App(MULT, vec![e2.clone(), inverse(e1)]);
                    alternatives.push(Alternative::eqs(vec![(b1.clone(), Term::App(EXP, vec![b2.clone(), shift]))]));
                }
                if b2.is_msg_var() {
                    let shift = Term::App(MULT, vec![e1.clone(), inverse(e2)]);
                    alternatives.push(Alternative::eqs(vec![(b2.clone(), Term::App(EXP, vec![b1.clone(), shift]))]));
                }
                Solutions { alternatives, complete: !(b1.is_var() && b2.is_var()) }
            }
            (Some(f), _) if f == EXP => exp_against(l, r),
            (_, Some(g)) if g == EXP => exp_against(r, l),
            _ => solve_group(l, r)
        }
    }

    fn decompose(&self, t: &Term) -> Vec<Vec<Term>> {
        let Term::App(f, args) = t else { return Vec::new() };
        match *f {
            f if f == EXP => {
                let mut out = vec![args.clone()];
                let fs = factors(&args[1]);
                if fs.len() > 1 && fs.len() <= 5 {
                    for mask in 1..(1u32 << fs.len()) - 1 {
                        let (kept, split): (Vec<_>, Vec<_>) = fs.iter().enumerate().partition(|(i, _)| mask & (1 << i) != 0);
                        let kept = product(kept.into_iter().map(|(_, t)| t.clone()).collect());
                        let split = product(split.into_iter().map(|(_, t)| t.clone()).collect());
                        out.push(vec![Term::App(EXP, vec![args[0].clone(), kept]), split]);
                    }
                }
                out
            }
            f if f == MULT => bipartitions(args).into_iter().map(|(a, b)| vec![product(a), product(b)]).collect(),
            f if f == INV => vec![args.clone()],
            f if f == ONE => vec![Vec::new()],
            _ => Vec::new()
        }
    }

    fn extract(&self, t: &Term, _: &mut VarSupply) -> Vec<Extraction> {
        let Term::App(f, args) = t else { return Vec::new() };
        if *f == EXP {
            let fs = factors(&args[1]);
            return (0..fs.len()).map(|i| {
                let mut rest = fs.clone();
                let removed = rest.remove(i);
                Extraction { eqs: Vec::new(), output: Term::App(EXP, vec![args[0].clone(), product(rest)]), side: vec![removed] }
            }).collect();
        }
        if *f == INV {
            return vec![Extraction { eqs: Vec::new(), output: args[0].clone(), side: Vec::new() }];
        }
        Vec::new()
    }
}

/// `exp(b, e) = t` where `t` is not an exponentiation.
fn exp_against(exp: &Term, t: &Term) -> Solutions {
    let (b, e) = (&exp.args()[0], &exp.args()[1]);
    let mut alternatives = Vec::new();
    if b.is_msg_var() {
        alternatives.push(Alternative::eqs(vec![(b.clone(), Term::App(EXP, vec![t.clone(), inverse(e)]))]));
    }
    if e.is_msg_var() {
        alternatives.push(Alternative::eqs(vec![(e.clone(), Term::constant(ONE)), (b.clone(), t.clone())]));
    }
    Solutions { alternatives, complete: true }
}

/// `l = r` in the exponent group: solve `l * inv(r) = one`.
fn solve_group(l: &Term, r: &Term) -> Solutions {
    let mut all = factors(l);
    all.extend(factors(r).iter().map(inverse));
    let rest = cancel(all);
    if rest.is_empty() {
        return Solutions::one(Alternative::solved());
    }

    // A variable occurring once, outside every other factor, can absorb the rest.
    for (i, factor) in rest.iter().enumerate() {
        let (var, inverted) = base(factor);
        let Term::Var(v) = var else { continue };
        if v.sort != Sort::Msg { continue }
        let others: Vec<Term> = rest.iter().enumerate().filter(|(j, _)| *j != i).map(|(_, t)| t.clone()).collect();
        if others.iter().any(|t| t.occurs(v)) { continue }
        let value = if inverted { product(others) } else { inverse(&product(others)) };
        return Solutions::one(Alternative::eqs(vec![(var.clone(), value)]));
    }

    // Otherwise factors must cancel pairwise.
    let (first, first_inverted) = base(&rest[0]);
    let mut alternatives = Vec::new();
    for (j, other) in rest.iter().enumerate().skip(1) {
        let (second, second_inverted) = base(other);
        if first_inverted == second_inverted { continue }
        let remaining: Vec<Term> = rest.iter().enumerate().filter(|(k, _)| *k != 0 && *k != j).map(|(_, t)| t.clone()).collect();
        let mut eqs = vec![(first.clone(), second.clone())];
        if !remaining.is_empty() {
            eqs.push((product(remaining), Term::constant(ONE)));
        }
        alternatives.push(Alternative::eqs(eqs));
    }
    Solutions { alternatives, complete: rest.len() <= 2 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theory::EquationalOracle;

    fn theories() -> Theories {
        let builtins = Builtins { diffie_hellman: true, ..Builtins::default() };
        Theories::new(&Signature::new(), Vec::new(), builtins).unwrap()
    }

    #[test]
    fn exponents_commute() {
        let theories = theories();
        let g = Term::pub_name("g");
        let a = Term::Name(Name::Fresh("a".into(), 1));
        let b = Term::Name(Name::Fresh("b".into(), 2));
        let ab = Term::App(EXP, vec![Term::App(EXP, vec![g.clone(), a.clone()]), b.clone()]);
        let ba = Term::App(EXP, vec![Term::App(EXP, vec![g, b]), a]);
        assert_eq!(theories.normalize(&ab), theories.normalize(&ba));
    }

    #[test]
    fn inverses_cancel() {
        let theories = theories();
        let g = Term::pub_name("g");
        let a = Term::Name(Name::Fresh("a".into(), 1));
        let t = Term::App(EXP, vec![Term::App(EXP, vec![g.clone(), a.clone()]), Term::App(INV, vec![a])]);
        assert_eq!(theories.normalize(&t), g);
    }

    #[test]
    fn exponent_variables_are_solved() {
        let theories = theories();
        let g = Term::pub_name("g");
        let a = Term::Name(Name::Fresh("a".into(), 1));
        let b = Term::Name(Name::Fresh("b".into(), 2));
        let x = Term::Var(Var::msg("x"));
        let lhs = Term::App(EXP, vec![Term::App(EXP, vec![g.clone(), a.clone()]), x.clone()]);
        let rhs = Term::App(EXP, vec![g, Term::App(MULT, vec![a, b.clone()])]);
        let unifiers = theories.unify(&[(lhs, rhs)], &Subst::new(), &mut VarSupply::default());
        assert!(unifiers.substs.iter().any(|s| s.apply(&x) == b));
    }
}

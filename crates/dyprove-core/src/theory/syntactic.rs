use super::*;
use std::collections::BTreeSet;

/// A user equation, oriented as a rewrite rule `lhs -> rhs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRule {
    pub name: String,
    pub lhs: Term,
    pub rhs: Term
}

/// Destructor application `lhs.args[input] -> rhs`, usable by the adversary when `rhs`
/// is a variable inside argument `input`.
#[derive(Debug, Clone)]
struct ExtractRule {
    rule: usize,
    input: usize
}

/// Free function symbols plus user rewrite rules, solved by syntactic unification and narrowing.
#[derive(Debug)]
pub struct SyntacticTheory {
    rules: Vec<RewriteRule>,
    destructors: BTreeSet<FunId>,
    extract_rules: Vec<ExtractRule>,
    public: Vec<bool>
}

impl SyntacticTheory {
    pub fn new(signature: &Signature, user_rules: Vec<RewriteRule>) -> Result<Self, ModelError> {
        let x = Term::Var(Var::msg("x"));
        let y = Term::Var(Var::msg("y"));
        let mut rules = vec![
            RewriteRule { name: "fst".into(), lhs: Term::app(FST, vec![Term::pair(x.clone(), y.clone())]), rhs: x.clone() },
            RewriteRule { name: "snd".into(), lhs: Term::app(SND, vec![Term::pair(x, y.clone())]), rhs: y },
        ];
        for rule in user_rules {
            validate(&rule)?;
            rules.push(rule);
        }

        let destructors = rules.iter().filter_map(|r| r.lhs.head()).collect();
        let public: Vec<bool> = signature.iter().map(|(f, _)| signature.is_public(f)).collect();
        let mut extract_rules = Vec::new();
        for (i, rule) in rules.iter().enumerate() {
            let (Some(head), Term::Var(out)) = (rule.lhs.head(), &rule.rhs) else { continue };
            if !public.get(head.0 as usize).copied().unwrap_or(false) { continue }
            if let Some(input) = rule.lhs.args().iter().position(|a| !a.is_var() && a.occurs(out)) {
                extract_rules.push(ExtractRule { rule: i, input });
            }
        }
        Ok(SyntacticTheory { rules, destructors, extract_rules, public })
    }

    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }

    pub fn is_destructor(&self, f: FunId) -> bool {
        self.destructors.contains(&f)
    }

    fn is_public(&self, f: FunId) -> bool {
        self.public.get(f.0 as usize).copied().unwrap_or(false)
    }

    fn renamed(&self, rule: &RewriteRule, supply: &mut VarSupply) -> (Term, Term) {
        let mut vars = rule.lhs.vars();
        rule.rhs.collect_vars(&mut vars);
        let renaming = supply.renaming(&vars);
        (renaming.apply(&rule.lhs), renaming.apply(&rule.rhs))
    }

    /// Narrowing steps of `side` against every rule for its head symbol.
    fn narrow(&self, side: &Term, other: &Term, supply: &mut VarSupply, out: &mut Vec<Alternative>) {
        let Term::App(f, args) = side else { return };
        if !self.is_destructor(*f) || side.is_ground() { return }
        for rule in self.rules.iter().filter(|r| r.lhs.head() == Some(*f)) {
            let (lhs, rhs) = self.renamed(rule, supply);
            let mut eqs: Vec<(Term, Term)> = args.iter().cloned().zip(lhs.args().iter().cloned()).collect();
            eqs.push((rhs, other.clone()));
            out.push(Alternative { eqs, narrowed: true });
        }
    }
}

fn validate(rule: &RewriteRule) -> Result<(), ModelError> {
    if rule.lhs.is_var() {
        return Err(ModelError::EquationVariableLhs { name: rule.name.clone() });
    }
    let lhs_vars = rule.lhs.vars();
    if let Some(var) = rule.rhs.vars().into_iter().find(|v| !lhs_vars.contains(v)) {
        return Err(ModelError::EquationUnboundVar { name: rule.name.clone(), var: var.name.to_string() });
    }
    if rule.rhs.size() >= rule.lhs.size() {
        return Err(ModelError::EquationNotDecreasing { name: rule.name.clone() });
    }
    Ok(())
}

/// One-way syntactic matching of `pattern` against `t`, extending `sigma`.
pub fn match_term(pattern: &Term, t: &Term, sigma: &mut Subst) -> bool {
    match (pattern, t) {
        (Term::Var(v), _) => match sigma.get(v) {
            Some(bound) => bound == t,
            None => {
                if !v.sort.admits(t.sort()) { return false }
                sigma.insert_raw(v.clone(), t.clone());
                true
            }
        },
        (Term::App(f, ps), Term::App(g, ts)) if f == g && ps.len() == ts.len() =>
            ps.iter().zip(ts.iter()).all(|(p, t)| match_term(p, t, sigma)),
        _ => pattern == t
    }
}

/// Syntactic most general unifier, used for overlap checks between rules.
pub fn syntactic_unify(l: &Term, r: &Term) -> Option<Subst> {
    let mut sigma = Subst::new();
    let mut stack = vec![(l.clone(), r.clone())];
    while let Some((l, r)) = stack.pop() {
        let l = sigma.apply(&l);
        let r = sigma.apply(&r);
        if l == r { continue }
        match Theories::orient(&l, &r) {
            Some((var, term)) => sigma.bind(var, term, &|t| t.clone()),
            None => match (l, r) {
                (Term::App(f, a), Term::App(g, b)) if f == g && a.len() == b.len() => stack.extend(a.into_iter().zip(b)),
                _ => return None
            }
        }
    }
    Some(sigma)
}

impl Theory for SyntacticTheory {
    fn owns(&self, _: FunId) -> bool {
        true
    }

    fn normalize(&self, t: &Term) -> Option<Term> {
        let f = t.head()?;
        if !self.is_destructor(f) { return None }
        self.rules.iter().filter(|r| r.lhs.head() == Some(f)).find_map(|rule| {
            let mut sigma = Subst::new();
            match_term(&rule.lhs, t, &mut sigma).then(|| sigma.apply(&rule.rhs))
        })
    }

    fn unify(&self, l: &Term, r: &Term, supply: &mut VarSupply) -> Solutions {
        let mut alternatives = Vec::new();
        if let (Term::App(f, a), Term::App(g, b)) = (l, r) {
            if f == g && a.len() == b.len() {
                alternatives.push(Alternative::eqs(a.iter().cloned().zip(b.iter().cloned()).collect()));
            }
        }
        self.narrow(l, r, supply, &mut alternatives);
        self.narrow(r, l, supply, &mut alternatives);
        Solutions { alternatives, complete: true }
    }

    fn decompose(&self, t: &Term) -> Vec<Vec<Term>> {
        match t {
            Term::App(f, args) if self.is_public(*f) => vec![args.clone()],
            _ => Vec::new()
        }
    }

    fn extract(&self, t: &Term, supply: &mut VarSupply) -> Vec<Extraction> {
        let Some(head) = t.head() else { return Vec::new() };
        self.extract_rules.iter().filter_map(|extract| {
            let rule = &self.rules[extract.rule];
            if rule.lhs.args()[extract.input].head() != Some(head) { return None }
            let (lhs, rhs) = self.renamed(rule, supply);
            let args = lhs.args();
            Some(Extraction {
                eqs: vec![(t.clone(), args[extract.input].clone())],
                output: rhs,
                side: args.iter().enumerate().filter(|(i, _)| *i != extract.input).map(|(_, a)| a.clone()).collect()
            })
        }).collect()
    }
}

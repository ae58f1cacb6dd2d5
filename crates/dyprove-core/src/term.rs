use crate::model::ModelError;
use hashbrown::HashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The sort of a variable or name, ordered from most to least specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Sort {
    Fresh,
    Pub,
    Msg
}

impl Sort {
    /// Whether a value of sort `other` may stand where `self` is expected.
    pub fn admits(self, other: Sort) -> bool {
        self == Sort::Msg || self == other
    }
}

/// A variable. Templates use `idx` 0, renamed copies get a fresh `idx` from a `VarSupply`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var {
    pub name: Arc<str>,
    pub idx: u32,
    pub sort: Sort
}

impl Var {
    pub fn new(name: &str, sort: Sort) -> Self {
        Var { name: name.into(), idx: 0, sort }
    }

    pub fn msg(name: &str) -> Self { Var::new(name, Sort::Msg) }

    pub fn fresh(name: &str) -> Self { Var::new(name, Sort::Fresh) }

    pub fn public(name: &str) -> Self { Var::new(name, Sort::Pub) }
}

/// A constant: either a public name `'a'` or a fresh value `~n`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Name {
    Pub(Arc<str>),
    Fresh(Arc<str>, u32)
}

/// Public names starting with this character are made up by the prover for variables a solved
/// system leaves open. Model front ends reject it in user names.
pub const GENERATED_NAME_PREFIX: char = '@';

impl Name {
    /// The public name standing in for the open variable `v`.
    pub fn generated(v: &Var) -> Name {
        Name::Pub(format!("{}{}.{}", GENERATED_NAME_PREFIX, v.name, v.idx).into())
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, Name::Pub(name) if name.starts_with(GENERATED_NAME_PREFIX))
    }

    pub fn sort(&self) -> Sort {
        match self {
            Name::Pub(_) => Sort::Pub,
            Name::Fresh(..) => Sort::Fresh
        }
    }
}

/// Index of a function symbol in a `Signature`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunId(pub u32);

pub const PAIR: FunId = FunId(0);
pub const FST: FunId = FunId(1);
pub const SND: FunId = FunId(2);
pub const EXP: FunId = FunId(3);
pub const MULT: FunId = FunId(4);
pub const INV: FunId = FunId(5);
pub const ONE: FunId = FunId(6);
pub const XOR: FunId = FunId(7);
pub const ZERO: FunId = FunId(8);
pub const UNION: FunId = FunId(9);

/// A symbolic term. Terms are immutable values compared structurally;
/// equality modulo the equational theory is decided by comparing normal forms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    Var(Var),
    Name(Name),
    App(FunId, Vec<Term>)
}

impl Term {
    pub fn app(f: FunId, args: Vec<Term>) -> Term {
        Term::App(f, args)
    }

    pub fn constant(f: FunId) -> Term {
        Term::App(f, Vec::new())
    }

    pub fn pub_name(name: &str) -> Term {
        Term::Name(Name::Pub(name.into()))
    }

    pub fn pair(a: Term, b: Term) -> Term {
        Term::App(PAIR, vec![a, b])
    }

    pub fn sort(&self) -> Sort {
        match self {
            Term::Var(v) => v.sort,
            Term::Name(n) => n.sort(),
            Term::App(..) => Sort::Msg
        }
    }

    pub fn as_var(&self) -> Option<&Var> {
        match self {
            Term::Var(v) => Some(v),
            _ => None
        }
    }

    pub fn head(&self) -> Option<FunId> {
        match self {
            Term::App(f, _) => Some(*f),
            _ => None
        }
    }

    pub fn args(&self) -> &[Term] {
        match self {
            Term::App(_, args) => args,
            _ => &[]
        }
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Term::Var(_))
    }

    /// A message variable can be instantiated by any term.
    pub fn is_msg_var(&self) -> bool {
        matches!(self, Term::Var(v) if v.sort == Sort::Msg)
    }

    pub fn occurs(&self, var: &Var) -> bool {
        match self {
            Term::Var(v) => v == var,
            Term::Name(_) => false,
            Term::App(_, args) => args.iter().any(|a| a.occurs(var))
        }
    }

    /// Variables in order of first occurrence, without duplicates.
    pub fn vars(&self) -> Vec<Var> {
        let mut out = Vec::new();
        self.collect_vars(&mut out);
        out
    }

    pub fn collect_vars(&self, out: &mut Vec<Var>) {
        match self {
            Term::Var(v) => if !out.contains(v) { out.push(v.clone()) },
            Term::Name(_) => {}
            Term::App(_, args) => for a in args { a.collect_vars(out) }
        }
    }

    pub fn is_ground(&self) -> bool {
        match self {
            Term::Var(_) => false,
            Term::Name(_) => true,
            Term::App(_, args) => args.iter().all(Term::is_ground)
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Term::App(_, args) => 1 + args.iter().map(Term::size).sum::<usize>(),
            _ => 1
        }
    }

    /// All subterms, including `self`, in pre-order.
    pub fn subterms(&self) -> Vec<&Term> {
        let mut out = vec![self];
        let mut i = 0;
        while i < out.len() {
            let current = out[i];
            out.extend(current.args().iter());
            i += 1;
        }
        out
    }

    pub fn map_vars(&self, f: &mut impl FnMut(&Var) -> Term) -> Term {
        match self {
            Term::Var(v) => f(v),
            Term::Name(_) => self.clone(),
            Term::App(g, args) => Term::App(*g, args.iter().map(|a| a.map_vars(f)).collect())
        }
    }

    pub fn contains_fun(&self, f: FunId) -> bool {
        match self {
            Term::App(g, args) => *g == f || args.iter().any(|a| a.contains_fun(f)),
            _ => false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private
}

/// A function symbol. Private symbols cannot be applied by the adversary.
#[derive(Debug, Clone)]
pub struct FunSym {
    pub name: String,
    pub arity: usize,
    pub visibility: Visibility
}

/// The function symbols of a model. Built-in symbols always occupy the first slots.
#[derive(Debug, Clone)]
pub struct Signature {
    syms: Vec<FunSym>,
    by_name: HashMap<String, FunId>
}

impl Default for Signature {
    fn default() -> Self {
        Self::new()
    }
}

impl Signature {
    pub fn new() -> Self {
        let mut sig = Signature { syms: Vec::new(), by_name: HashMap::new() };
        let builtins = [("pair", 2), ("fst", 1), ("snd", 1), ("exp", 2), ("mult", 2), ("inv", 1),
                        ("one", 0), ("xor", 2), ("zero", 0), ("union", 2)];
        for (name, arity) in builtins {
            sig.push(name, arity, Visibility::Public);
        }
        sig
    }

    fn push(&mut self, name: &str, arity: usize, visibility: Visibility) -> FunId {
        let id = FunId(self.syms.len() as u32);
        self.syms.push(FunSym { name: name.to_string(), arity, visibility });
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Declares a symbol, or returns the existing one if the declaration agrees with it.
    pub fn declare(&mut self, name: &str, arity: usize, visibility: Visibility) -> Result<FunId, ModelError> {
        if let Some(&id) = self.by_name.get(name) {
            let existing = &self.syms[id.0 as usize];
            if existing.arity != arity || existing.visibility != visibility {
                return Err(ModelError::SymbolClash { name: name.to_string() });
            }
            return Ok(id);
        }
        Ok(self.push(name, arity, visibility))
    }

    pub fn lookup(&self, name: &str) -> Option<FunId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, f: FunId) -> &FunSym {
        &self.syms[f.0 as usize]
    }

    pub fn name(&self, f: FunId) -> &str {
        &self.syms[f.0 as usize].name
    }

    pub fn arity(&self, f: FunId) -> usize {
        self.syms[f.0 as usize].arity
    }

    pub fn is_public(&self, f: FunId) -> bool {
        self.syms[f.0 as usize].visibility == Visibility::Public
    }

    pub fn len(&self) -> usize {
        self.syms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.syms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FunId, &FunSym)> {
        self.syms.iter().enumerate().map(|(i, s)| (FunId(i as u32), s))
    }
}

/// An idempotent substitution: no variable bound by the map occurs in any of its values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Subst {
    map: BTreeMap<Var, Term>
}

impl Subst {
    pub fn new() -> Self {
        Subst { map: BTreeMap::new() }
    }

    pub fn get(&self, v: &Var) -> Option<&Term> {
        self.map.get(v)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Var, &Term)> {
        self.map.iter()
    }

    /// Applies the substitution. Pure and total; the result is not normalized.
    pub fn apply(&self, t: &Term) -> Term {
        if self.map.is_empty() { return t.clone() }
        match t {
            Term::Var(v) => self.map.get(v).cloned().unwrap_or_else(|| t.clone()),
            Term::Name(_) => t.clone(),
            Term::App(f, args) => Term::App(*f, args.iter().map(|a| self.apply(a)).collect())
        }
    }

    /// Extends the substitution with `var ↦ term`, rewriting existing values so the result stays idempotent.
    /// The caller is responsible for the occurs and sort checks. `normalize` is applied to every touched value.
    pub fn bind(&mut self, var: Var, term: Term, normalize: &dyn Fn(&Term) -> Term) {
        let term = normalize(&self.apply(&term));
        let single = Subst { map: BTreeMap::from([(var.clone(), term.clone())]) };
        for value in self.map.values_mut() {
            if value.occurs(&var) {
                *value = normalize(&single.apply(value));
            }
        }
        self.map.insert(var, term);
    }

    /// The restriction of the substitution to `vars`.
    pub fn restrict(&self, vars: &[Var]) -> Subst {
        Subst { map: self.map.iter().filter(|(v, _)| vars.contains(v)).map(|(v, t)| (v.clone(), t.clone())).collect() }
    }

    pub fn insert_raw(&mut self, var: Var, term: Term) {
        self.map.insert(var, term);
    }
}

impl FromIterator<(Var, Term)> for Subst {
    fn from_iter<I: IntoIterator<Item = (Var, Term)>>(iter: I) -> Self {
        Subst { map: iter.into_iter().collect() }
    }
}

/// Allocates variable indices for renaming apart. Every constraint system owns one,
/// so renaming is deterministic regardless of which worker explores a branch.
#[derive(Debug, Clone)]
pub struct VarSupply {
    next: u32
}

impl Default for VarSupply {
    fn default() -> Self {
        VarSupply { next: 1 }
    }
}

impl VarSupply {
    pub fn next_idx(&mut self) -> u32 {
        let idx = self.next;
        self.next += 1;
        idx
    }

    pub fn fresh_var(&mut self, name: &str, sort: Sort) -> Var {
        Var { name: name.into(), idx: self.next_idx(), sort }
    }

    /// A renaming of `vars` to unused variables.
    pub fn renaming(&mut self, vars: &[Var]) -> Subst {
        let idx = self.next_idx();
        vars.iter().map(|v| (v.clone(), Term::Var(Var { name: v.name.clone(), idx, sort: v.sort }))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Term { Term::Var(Var::msg("x")) }
    fn y() -> Term { Term::Var(Var::msg("y")) }

    #[test]
    fn bind_keeps_substitution_idempotent() {
        let mut s = Subst::new();
        s.bind(Var::msg("x"), Term::pair(y(), Term::pub_name("a")), &|t| t.clone());
        s.bind(Var::msg("y"), Term::pub_name("b"), &|t| t.clone());
        assert_eq!(s.apply(&x()), Term::pair(Term::pub_name("b"), Term::pub_name("a")));
        for (_, value) in s.iter() {
            assert!(!value.occurs(&Var::msg("y")));
        }
    }

    #[test]
    fn renaming_separates_copies() {
        let mut supply = VarSupply::default();
        let first = supply.renaming(&[Var::msg("x")]);
        let second = supply.renaming(&[Var::msg("x")]);
        assert_ne!(first.apply(&x()), second.apply(&x()));
    }

    #[test]
    fn signature_rejects_conflicting_redeclaration() {
        let mut sig = Signature::new();
        let h = sig.declare("h", 1, Visibility::Public).unwrap();
        assert_eq!(sig.declare("h", 1, Visibility::Public).unwrap(), h);
        assert!(sig.declare("h", 2, Visibility::Public).is_err());
        assert_eq!(sig.lookup("pair"), Some(PAIR));
    }

    #[test]
    fn subterms_are_listed_outermost_first() {
        let t = Term::pair(x(), Term::pair(y(), x()));
        let subs = t.subterms();
        assert_eq!(subs[0], &t);
        assert_eq!(subs.len(), 5);
    }
}

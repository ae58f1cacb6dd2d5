use crate::fact::*;
use crate::formula::*;
use crate::model::Model;
use crate::term::*;
use crate::theory::syntactic::match_term;
use crate::theory::{EquationalOracle, Theories};
use crate::trace::{Step, Trace};
use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

pub type NodeId = usize;

/// A rule instance placed on a timepoint. Its facts mention the system's variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub rule: usize,
    pub time: TVar,
    /// Maps the rule's template variables to the terms they are instantiated with.
    pub renaming: Subst,
    pub premises: Vec<Fact>,
    pub actions: Vec<Fact>,
    pub conclusions: Vec<Fact>
}

/// Conclusion `source` of one node provides premise `target` of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    pub source: (NodeId, usize),
    pub target: (NodeId, usize)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Goal {
    /// Some node at `time` emits `fact`.
    Action { fact: Fact, time: TVar },
    /// Premise `idx` of `node` needs a producing conclusion.
    Premise { node: NodeId, idx: usize },
    /// The adversary derives `term` strictly before `before`.
    Knows { term: Term, before: TVar },
    /// The adversary, holding `from`, deconstructs it until it yields `to`.
    Chain { from: Term, to: Term, before: TVar },
    /// A formula still to be decomposed.
    Split(Nnf)
}

#[derive(Debug, Clone)]
pub struct OpenGoal {
    pub goal: Goal,
    pub id: u64
}

/// The systems a step leads to. `lossy` is set when some alternatives may have been dropped.
#[derive(Debug, Default)]
pub struct Branches {
    pub systems: Vec<System>,
    pub lossy: bool
}

impl Branches {
    pub fn dead() -> Self {
        Branches::default()
    }

    pub fn push(&mut self, system: System) {
        self.systems.push(system);
    }

    pub fn extend(&mut self, other: Branches) {
        self.systems.extend(other.systems);
        self.lossy |= other.lossy;
    }
}

enum Simplified {
    Stable,
    Dead,
    Split(Branches)
}

/// A symbolic trace skeleton: rule instances on partially ordered timepoints,
/// with the goals that remain to be justified.
#[derive(Debug, Clone)]
pub struct System {
    pub nodes: Vec<Option<Node>>,
    parent: BTreeMap<TVar, TVar>,
    pub less: BTreeSet<(TVar, TVar)>,
    pub edges: BTreeSet<Edge>,
    pub goals: Vec<OpenGoal>,
    pub diseqs: Vec<(Term, Term)>,
    pub guarded: Vec<Guarded>,
    applied: BTreeSet<(usize, Vec<(NodeId, usize)>)>,
    pub supply: VarSupply,
    next_goal: u64
}

impl System {
    /// The initial system for a search for traces satisfying `target` and every restriction.
    pub fn new(model: &Model, target: &Nnf) -> Self {
        let mut system = System {
            nodes: Vec::new(),
            parent: BTreeMap::new(),
            less: BTreeSet::new(),
            edges: BTreeSet::new(),
            goals: Vec::new(),
            diseqs: Vec::new(),
            guarded: Vec::new(),
            applied: BTreeSet::new(),
            supply: VarSupply::default(),
            next_goal: 0
        };
        for restriction in &model.restrictions {
            system.push_goal(Goal::Split(restriction.nnf.clone()));
        }
        system.push_goal(Goal::Split(target.clone()));
        system
    }

    pub fn push_goal(&mut self, goal: Goal) {
        self.goals.push(OpenGoal { goal, id: self.next_goal });
        self.next_goal += 1;
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id).and_then(Option::as_ref)
    }

    pub fn live_nodes(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    pub fn iter_nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().filter_map(|(i, n)| n.as_ref().map(|n| (i, n)))
    }

    /// The representative of `t`'s timepoint class.
    pub fn find(&self, t: &TVar) -> TVar {
        let mut current = t;
        while let Some(next) = self.parent.get(current) {
            current = next;
        }
        current.clone()
    }

    pub fn union(&mut self, a: &TVar, b: &TVar) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb { return }
        let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parent.insert(child, root);
    }

    pub fn fresh_time(&mut self, name: &str) -> TVar {
        TVar { name: name.into(), idx: self.supply.next_idx() }
    }

    /// The live node on `t`'s timepoint class.
    pub fn node_at(&self, t: &TVar) -> Option<NodeId> {
        let class = self.find(t);
        self.iter_nodes().find(|(_, n)| self.find(&n.time) == class).map(|(i, _)| i)
    }

    /// Adds a renamed copy of `rule` together with the goals for its premises and restriction.
    pub fn add_node(&mut self, model: &Model, rule: usize, time: Option<TVar>) -> NodeId {
        let r = &model.rules[rule];
        let renaming = self.supply.renaming(&r.vars);
        let time = match time {
            Some(time) => time,
            None => self.fresh_time("t")
        };
        let rename = |facts: &[Fact]| -> Vec<Fact> {
            facts.iter().map(|f| f.apply(&renaming).normalize(&model.theories)).collect()
        };
        let node = Node {
            rule,
            time: time.clone(),
            premises: rename(&r.premises),
            actions: rename(&r.actions),
            conclusions: rename(&r.conclusions),
            renaming: renaming.clone()
        };

        let id = self.nodes.len();
        for (idx, premise) in node.premises.iter().enumerate() {
            if premise.pred == Pred::input() {
                for term in &premise.args {
                    self.push_goal(Goal::Knows { term: term.clone(), before: time.clone() });
                }
            } else if premise.pred != Pred::fresh() {
                self.push_goal(Goal::Premise { node: id, idx });
            }
        }
        if let Some(restrict) = &r.restrict {
            let binding = Binding { terms: renaming, ..Binding::default() };
            self.push_goal(Goal::Split(restrict.instantiate(&binding)));
        }
        self.nodes.push(Some(node));
        id
    }

    /// Records that `source` provides `target`, ordering the producer before the consumer.
    pub fn add_edge(&mut self, source: (NodeId, usize), target: (NodeId, usize)) {
        if let (Some(from), Some(to)) = (self.node(source.0), self.node(target.0)) {
            let order = (from.time.clone(), to.time.clone());
            self.less.insert(order);
        }
        self.edges.insert(Edge { source, target });
    }

    /// Applies `sigma` to every term of the system, keeping terms in normal form.
    pub fn apply(&mut self, sigma: &Subst, theories: &Theories) {
        if sigma.is_empty() { return }
        let norm = |t: &Term| theories.normalize(&sigma.apply(t));
        let facts = |facts: &[Fact]| -> Vec<Fact> { facts.iter().map(|f| f.map_terms(norm)).collect() };
        for node in self.nodes.iter_mut().flatten() {
            node.premises = facts(&node.premises);
            node.actions = facts(&node.actions);
            node.conclusions = facts(&node.conclusions);
            node.renaming = node.renaming.iter().map(|(v, t)| (v.clone(), norm(t))).collect();
        }
        for open in &mut self.goals {
            open.goal = match &open.goal {
                Goal::Action { fact, time } => Goal::Action { fact: fact.map_terms(norm), time: time.clone() },
                Goal::Premise { node, idx } => Goal::Premise { node: *node, idx: *idx },
                Goal::Knows { term, before } => Goal::Knows { term: norm(term), before: before.clone() },
                Goal::Chain { from, to, before } => Goal::Chain { from: norm(from), to: norm(to), before: before.clone() },
                Goal::Split(f) => Goal::Split(f.map(&mut |t| norm(t), &mut |i| i.clone()))
            };
        }
        for (s, t) in &mut self.diseqs {
            *s = norm(s);
            *t = norm(t);
        }
        self.guarded = self.guarded.iter().map(|g| map_guarded(g, &mut |t| norm(t), &mut |i| i.clone())).collect();
    }

    /// Solves `eqs` in this system, one branch per unifier.
    pub fn unify(mut self, eqs: &[(Term, Term)], theories: &Theories) -> Branches {
        let unifiers = theories.unify(eqs, &Subst::new(), &mut self.supply);
        let lossy = !unifiers.complete;
        let mut substs = unifiers.substs;
        let Some(last) = substs.pop() else { return Branches { systems: Vec::new(), lossy } };
        let mut systems: Vec<System> = substs.iter().map(|sigma| {
            let mut system = self.clone();
            system.apply(sigma, theories);
            system
        }).collect();
        self.apply(&last, theories);
        systems.push(self);
        Branches { systems, lossy }
    }

    /// Propagates constraints until the system is stable, splitting when node merges need unification.
    pub fn simplify(self, model: &Model) -> Branches {
        let mut pending = vec![self];
        let mut out = Branches::dead();
        while let Some(mut system) = pending.pop() {
            match system.step(model) {
                Simplified::Stable => out.push(system),
                Simplified::Dead => {}
                Simplified::Split(branches) => {
                    out.lossy |= branches.lossy;
                    pending.extend(branches.systems.into_iter().rev());
                }
            }
        }
        out
    }

    fn step(&mut self, model: &Model) -> Simplified {
        loop {
            if let Some((a, b)) = self.coinciding_nodes() {
                return self.merge(a, b, model);
            }
            if self.unify_fresh_times() { continue }
            break;
        }
        if self.draws_fresh_twice() { return Simplified::Dead }
        self.dedup_goals();
        if self.diseqs.iter().any(|(s, t)| s == t) { return Simplified::Dead }
        if !self.consumption_is_linear() || !self.is_acyclic() { return Simplified::Dead }
        self.saturate_guarded();
        Simplified::Stable
    }

    fn dedup_goals(&mut self) {
        let mut kept: Vec<OpenGoal> = Vec::with_capacity(self.goals.len());
        for open in std::mem::take(&mut self.goals) {
            if !kept.iter().any(|k| k.goal == open.goal) { kept.push(open) }
        }
        self.goals = kept;
    }

    fn coinciding_nodes(&self) -> Option<(NodeId, NodeId)> {
        let mut seen: BTreeMap<TVar, NodeId> = BTreeMap::new();
        for (id, node) in self.iter_nodes() {
            let class = self.find(&node.time);
            if let Some(&first) = seen.get(&class) { return Some((first, id)) }
            seen.insert(class, id);
        }
        None
    }

    /// Two nodes on one timepoint are the same rule instance.
    fn merge(&mut self, a: NodeId, b: NodeId, model: &Model) -> Simplified {
        let (Some(first), Some(second)) = (self.node(a), self.node(b)) else { return Simplified::Dead };
        if first.rule != second.rule { return Simplified::Dead }
        let eqs: Vec<(Term, Term)> = first.renaming.iter()
            .filter_map(|(v, t)| second.renaming.get(v).map(|u| (t.clone(), u.clone())))
            .collect();

        self.nodes[b] = None;
        let redirect = |(n, i): (NodeId, usize)| if n == b { (a, i) } else { (n, i) };
        self.edges = self.edges.iter().map(|e| Edge { source: redirect(e.source), target: redirect(e.target) }).collect();
        self.applied = self.applied.iter().map(|(g, chosen)| (*g, chosen.iter().map(|&c| redirect(c)).collect())).collect();
        let edges = &self.edges;
        self.goals.retain(|open| match open.goal {
            Goal::Premise { node, idx } => node != b && !edges.iter().any(|e| e.target == (node, idx)),
            _ => true
        });

        let system = std::mem::replace(self, System::new_empty());
        Simplified::Split(system.unify(&eqs, &model.theories))
    }

    fn new_empty() -> Self {
        System {
            nodes: Vec::new(),
            parent: BTreeMap::new(),
            less: BTreeSet::new(),
            edges: BTreeSet::new(),
            goals: Vec::new(),
            diseqs: Vec::new(),
            guarded: Vec::new(),
            applied: BTreeSet::new(),
            supply: VarSupply::default(),
            next_goal: 0
        }
    }

    /// A fresh value is generated once, so nodes drawing the same one share a timepoint.
    fn unify_fresh_times(&mut self) -> bool {
        let mut seen: BTreeMap<Term, TVar> = BTreeMap::new();
        let mut pending = None;
        for (_, node) in self.iter_nodes() {
            for premise in node.premises.iter().filter(|p| p.pred == Pred::fresh()) {
                for arg in &premise.args {
                    match seen.get(arg) {
                        Some(time) if self.find(time) != self.find(&node.time) => {
                            pending = Some((time.clone(), node.time.clone()));
                        }
                        Some(_) => {}
                        None => { seen.insert(arg.clone(), node.time.clone()); }
                    }
                }
            }
            if pending.is_some() { break }
        }
        match pending {
            Some((a, b)) => { self.union(&a, &b); true }
            None => false
        }
    }

    /// Whether one rule instance draws the same fresh value in two `Fr` premises.
    fn draws_fresh_twice(&self) -> bool {
        self.iter_nodes().any(|(_, node)| {
            let mut drawn = BTreeSet::new();
            node.premises.iter().filter(|p| p.pred == Pred::fresh())
                .flat_map(|p| p.args.iter())
                .any(|arg| !drawn.insert(arg))
        })
    }

    /// Every linear conclusion is consumed at most once.
    fn consumption_is_linear(&self) -> bool {
        let mut used: BTreeSet<(NodeId, usize)> = BTreeSet::new();
        for edge in &self.edges {
            let persistent = self.node(edge.source.0)
                .and_then(|n| n.conclusions.get(edge.source.1))
                .is_some_and(Fact::is_persistent);
            if !persistent && !used.insert(edge.source) { return false }
        }
        true
    }

    fn is_acyclic(&self) -> bool {
        let mut succ: BTreeMap<TVar, BTreeSet<TVar>> = BTreeMap::new();
        for (a, b) in &self.less {
            let (a, b) = (self.find(a), self.find(b));
            if a == b { return false }
            succ.entry(a).or_default().insert(b);
        }
        // Iterative three-colour depth first search.
        let mut state: BTreeMap<&TVar, u8> = BTreeMap::new();
        for start in succ.keys() {
            if state.contains_key(start) { continue }
            let mut stack = vec![(start, false)];
            while let Some((t, done)) = stack.pop() {
                if done { state.insert(t, 2); continue }
                if state.contains_key(t) { continue }
                state.insert(t, 1);
                stack.push((t, true));
                for next in succ.get(t).into_iter().flatten() {
                    match state.get(next) {
                        Some(1) => return false,
                        Some(_) => {}
                        None => stack.push((next, false))
                    }
                }
            }
        }
        true
    }

    /// Instantiates guarded formulas for every new combination of matching node actions.
    fn saturate_guarded(&mut self) {
        let mut instances = Vec::new();
        for (gi, g) in self.guarded.iter().enumerate() {
            let binders: BTreeSet<&Binder> = g.binders.iter().collect();
            let mut seed = Subst::new();
            for atom in &g.guard {
                if let Some((fact, _)) = atom.as_action() {
                    for v in fact.args.iter().flat_map(Term::vars) {
                        if !binders.contains(&Binder::Msg(v.clone())) { seed.insert_raw(v.clone(), Term::Var(v)) }
                    }
                }
            }
            let actions: Vec<(Fact, TVar)> = g.actions().map(|(f, t)| (f, t.clone())).collect();
            let mut partial = vec![(seed, BTreeMap::<TVar, TVar>::new(), Vec::<(NodeId, usize)>::new())];
            for (pattern, time) in &actions {
                let mut next = Vec::new();
                for (sigma, times, chosen) in &partial {
                    for (id, node) in self.iter_nodes() {
                        let class = self.find(&node.time);
                        let time_ok = if binders.contains(&Binder::Time(time.clone())) {
                            times.get(time).map_or(true, |t| self.find(t) == class)
                        } else {
                            self.find(time) == class
                        };
                        if !time_ok { continue }
                        for (a, action) in node.actions.iter().enumerate() {
                            if action.pred != pattern.pred || action.args.len() != pattern.args.len() { continue }
                            let mut sigma = sigma.clone();
                            if !pattern.args.iter().zip(action.args.iter()).all(|(p, t)| match_term(p, t, &mut sigma)) { continue }
                            let mut times = times.clone();
                            times.insert(time.clone(), node.time.clone());
                            let mut chosen = chosen.clone();
                            chosen.push((id, a));
                            next.push((sigma, times, chosen));
                        }
                    }
                }
                partial = next;
            }
            for (sigma, times, chosen) in partial {
                if self.applied.contains(&(gi, chosen.clone())) { continue }
                let binding = Binding {
                    terms: sigma.iter().filter(|(v, _)| binders.contains(&Binder::Msg((*v).clone())))
                        .map(|(v, t)| (v.clone(), t.clone())).collect(),
                    times
                };
                instances.push(((gi, chosen), g.instance(&binding)));
            }
        }
        for (key, instance) in instances {
            self.applied.insert(key);
            self.push_goal(Goal::Split(instance));
        }
    }

    /// Whether only adversary knowledge of plain message variables remains, which any public value satisfies.
    pub fn is_solved(&self) -> bool {
        self.goals.iter().all(|open| matches!(&open.goal, Goal::Knows { term, .. } if term.is_msg_var()))
    }

    /// Node ids in an order compatible with every ordering constraint, ties broken by creation order.
    pub fn linearize(&self) -> Vec<NodeId> {
        let mut classes: BTreeSet<TVar> = self.iter_nodes().map(|(_, n)| self.find(&n.time)).collect();
        let mut succ: BTreeMap<TVar, BTreeSet<TVar>> = BTreeMap::new();
        for (a, b) in &self.less {
            let (a, b) = (self.find(a), self.find(b));
            classes.insert(a.clone());
            classes.insert(b.clone());
            succ.entry(a).or_default().insert(b);
        }
        let mut indegree: BTreeMap<TVar, usize> = classes.iter().map(|c| (c.clone(), 0)).collect();
        for targets in succ.values() {
            for t in targets {
                if let Some(d) = indegree.get_mut(t) { *d += 1 }
            }
        }
        let node_of: BTreeMap<TVar, NodeId> = self.iter_nodes().map(|(i, n)| (self.find(&n.time), i)).collect();

        let mut order = Vec::new();
        let mut ready: BTreeSet<TVar> = indegree.iter().filter(|(_, d)| **d == 0).map(|(c, _)| c.clone()).collect();
        while !ready.is_empty() {
            let pick = ready.iter().find(|c| !node_of.contains_key(*c)).cloned()
                .or_else(|| ready.iter().min_by_key(|c| node_of.get(*c).copied().unwrap_or(usize::MAX)).cloned());
            let Some(class) = pick else { break };
            ready.remove(&class);
            if let Some(&id) = node_of.get(&class) { order.push(id) }
            for next in succ.get(&class).into_iter().flatten() {
                if let Some(d) = indegree.get_mut(next) {
                    *d -= 1;
                    if *d == 0 { ready.insert(next.clone()); }
                }
            }
        }
        order
    }

    /// A ground trace of a solved system. Remaining variables become distinct names:
    /// fresh variables fresh values, the others public names.
    pub fn instantiate(&self, model: &Model) -> Trace {
        let mut vars = Vec::new();
        for (_, node) in self.iter_nodes() {
            for fact in node.premises.iter().chain(node.actions.iter()).chain(node.conclusions.iter()) {
                fact.collect_vars(&mut vars);
            }
            for (_, t) in node.renaming.iter() { t.collect_vars(&mut vars) }
        }
        let grounding: Subst = vars.into_iter().map(|v| {
            let name = match v.sort {
                Sort::Fresh => Term::Name(Name::Fresh(v.name.clone(), v.idx)),
                _ => Term::Name(Name::generated(&v))
            };
            (v, name)
        }).collect();
        let theories = &model.theories;
        let ground = |facts: &[Fact]| -> Vec<Fact> { facts.iter().map(|f| f.apply(&grounding).normalize(theories)).collect() };

        let steps = self.linearize().into_iter().filter_map(|id| self.node(id)).map(|node| Step {
            rule: model.rules[node.rule].name.clone(),
            subst: node.renaming.iter().map(|(v, t)| (v.clone(), theories.normalize(&grounding.apply(t)))).collect(),
            premises: ground(&node.premises),
            actions: ground(&node.actions),
            conclusions: ground(&node.conclusions)
        }).collect();
        Trace { steps }
    }

    /// A hash of the system that is invariant under renaming of its variables and timepoints.
    pub fn fingerprint(&self) -> (u64, u64) {
        let canon = RefCell::new(Canon { vars: BTreeMap::new(), times: BTreeMap::new() });
        let term = |t: &Term| canon.borrow_mut().term(t);
        let time = |t: &TVar| canon.borrow_mut().time(&self.find(t));
        let facts = |facts: &[Fact]| -> Vec<Fact> { facts.iter().map(|f| f.map_terms(term)).collect() };

        let mut parts: Vec<String> = Vec::new();
        for (id, node) in self.iter_nodes() {
            parts.push(format!("n{} {} {:?} {:?} {:?} {:?}", id, node.rule, time(&node.time),
                facts(&node.premises), facts(&node.actions), facts(&node.conclusions)));
        }
        let mut goals: Vec<String> = self.goals.iter().map(|open| match &open.goal {
            Goal::Action { fact, time: t } => format!("a {:?} {:?}", fact.map_terms(term), time(t)),
            Goal::Premise { node, idx } => format!("p {} {}", node, idx),
            Goal::Knows { term: k, before } => format!("k {:?} {:?}", term(k), time(before)),
            Goal::Chain { from, to, before } => format!("c {:?} {:?} {:?}", term(from), term(to), time(before)),
            Goal::Split(f) => format!("s {:?}", f.map(&mut |t| term(t), &mut |t| time(t)))
        }).collect();
        goals.sort();
        parts.extend(goals);
        let mut less: Vec<(TVar, TVar)> = self.less.iter().map(|(a, b)| (time(a), time(b))).collect();
        less.sort();
        parts.push(format!("{:?} {:?}", less, self.edges));
        parts.push(format!("{:?}", self.diseqs.iter().map(|(s, t)| (term(s), term(t))).collect::<Vec<_>>()));
        for g in &self.guarded {
            parts.push(format!("{:?}", map_guarded(g, &mut |t| term(t), &mut |t| time(t))));
        }
        parts.push(format!("{:?}", self.applied));

        let hash = |seed: u64| {
            let mut hasher = DefaultHasher::new();
            seed.hash(&mut hasher);
            parts.hash(&mut hasher);
            hasher.finish()
        };
        (hash(0), hash(1))
    }
}

pub(crate) fn map_guarded(g: &Guarded, terms: &mut dyn FnMut(&Term) -> Term, times: &mut dyn FnMut(&TVar) -> TVar) -> Guarded {
    Guarded {
        binders: g.binders.clone(),
        guard: g.guard.iter().map(|a| a.map(terms, times)).collect(),
        body: Box::new(g.body.map(terms, times))
    }
}

/// Renames variables and timepoints in order of first occurrence. Formula binders keep their names.
struct Canon {
    vars: BTreeMap<Var, u32>,
    times: BTreeMap<TVar, u32>
}

impl Canon {
    fn term(&mut self, t: &Term) -> Term {
        t.map_vars(&mut |v| {
            if v.idx == 0 { return Term::Var(v.clone()) }
            let next = self.vars.len() as u32 + 1;
            let idx = *self.vars.entry(v.clone()).or_insert(next);
            Term::Var(Var { name: "v".into(), idx, sort: v.sort })
        })
    }

    fn time(&mut self, t: &TVar) -> TVar {
        if t.idx == 0 { return t.clone() }
        let next = self.times.len() as u32 + 1;
        let idx = *self.times.entry(t.clone()).or_insert(next);
        TVar { name: "t".into(), idx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Rule, RuleKind};
    use crate::theory::{Builtins, Theories};

    fn model() -> Model {
        let n = Term::Var(Var::fresh("n"));
        let gen = Rule::new("Gen", RuleKind::Protocol, vec![Fact::linear(Pred::fresh(), vec![n.clone()])],
            vec![Fact::linear(Pred::new("Made"), vec![n.clone()])], vec![Fact::linear(Pred::new("Item"), vec![n.clone()])],
            Vec::new(), None).unwrap();
        let signature = Signature::new();
        let theories = Theories::new(&signature, Vec::new(), Builtins::default()).unwrap();
        Model::new(signature, theories, vec![gen], Vec::new(), Vec::new(), Vec::new()).unwrap()
    }

    #[test]
    fn nodes_on_one_timepoint_merge() {
        let model = model();
        let mut system = System::new(&model, &Nnf::True);
        let t = system.fresh_time("t");
        let a = system.add_node(&model, 0, Some(t.clone()));
        let b = system.add_node(&model, 0, None);
        let time_b = system.node(b).unwrap().time.clone();
        system.union(&t, &time_b);
        let branches = system.simplify(&model);
        assert_eq!(branches.systems.len(), 1);
        assert_eq!(branches.systems[0].live_nodes(), 1);
        assert!(branches.systems[0].node(a).is_some());
    }

    #[test]
    fn cyclic_orderings_are_inconsistent() {
        let model = model();
        let mut system = System::new(&model, &Nnf::True);
        let (i, j) = (system.fresh_time("i"), system.fresh_time("j"));
        system.less.insert((i.clone(), j.clone()));
        system.less.insert((j, i));
        assert!(system.simplify(&model).systems.is_empty());
    }

    #[test]
    fn fingerprints_ignore_variable_names() {
        let model = model();
        let mut first = System::new(&model, &Nnf::True);
        first.add_node(&model, 0, None);
        let mut second = System::new(&model, &Nnf::True);
        second.supply.next_idx();
        second.add_node(&model, 0, None);
        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn solved_systems_linearize_by_order() {
        let model = model();
        let mut system = System::new(&model, &Nnf::True);
        let a = system.add_node(&model, 0, None);
        let b = system.add_node(&model, 0, None);
        let (ta, tb) = (system.node(a).unwrap().time.clone(), system.node(b).unwrap().time.clone());
        system.less.insert((tb, ta));
        assert_eq!(system.linearize(), vec![b, a]);
        let trace = system.instantiate(&model);
        assert_eq!(trace.len(), 2);
        assert_ne!(trace.steps[0].premises, trace.steps[1].premises);
    }
}

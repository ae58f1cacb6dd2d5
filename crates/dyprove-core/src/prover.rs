use crate::formula::Nnf;
use crate::heuristic::{select, GoalKind, Tactic};
use crate::model::Model;
use crate::search::expand;
use crate::stats;
use crate::system::System;
use crate::trace::{replay, Trace};
use hashbrown::HashSet;
use mimalloc::MiMalloc;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const CACHE_SHARDS: usize = 16;

/// Limits on one search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    /// Maximum number of constraint systems visited, over all deepening rounds.
    pub max_steps: u64,
    pub timeout: Option<Duration>,
    /// Largest number of rule instances a system may hold.
    pub max_nodes: usize
}

impl Default for Budget {
    fn default() -> Self {
        Budget { max_steps: 200_000, timeout: Some(Duration::from_secs(60)), max_nodes: 24 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InconclusiveReason {
    StepLimit,
    Timeout,
    /// Every system within `max_nodes` was refuted, but larger ones remain.
    NodeLimit,
    /// Some unification problem was cut short, so alternatives may be missing.
    Incomplete
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Witness(Trace),
    /// No trace satisfies the target.
    Exhausted,
    Inconclusive(InconclusiveReason)
}

#[derive(Debug, Clone)]
pub struct Search {
    pub outcome: Outcome,
    pub steps: u64,
    /// Goals left open in the systems where the search stopped.
    pub open_goals: usize
}

/// Result of a DFS subtree.
#[derive(Debug, Default)]
pub struct DFSResult {
    pub steps: u64,
    pub solutions: u32,
    /// Systems cut off by the node bound.
    pub truncated: u32,
    /// Expansions that may have dropped alternatives, and solutions that failed verification.
    pub lossy: u32,
    /// Subtrees skipped because a witness on an earlier path was already found.
    pub cancelled: u32,
    pub interrupted: bool,
    pub open_goals: usize,
    witness: Option<(Vec<u32>, Trace)>
}

impl DFSResult {
    fn add(&mut self, other: DFSResult) {
        self.steps += other.steps;
        self.solutions += other.solutions;
        self.truncated += other.truncated;
        self.lossy += other.lossy;
        self.cancelled += other.cancelled;
        self.interrupted |= other.interrupted;
        self.open_goals += other.open_goals;
        // Keep the witness of the earliest path so parallel runs report the same trace.
        if let Some((path, trace)) = other.witness {
            if self.witness.as_ref().map_or(true, |(p, _)| path < *p) {
                self.witness = Some((path, trace));
            }
        }
    }

    /// The subtree was searched completely and holds no solution.
    fn refuted(&self) -> bool {
        self.witness.is_none() && self.truncated == 0 && self.lossy == 0 && self.cancelled == 0 && !self.interrupted
    }
}

/// State shared by all threads of one search.
struct SearchControl {
    steps: AtomicU64,
    /// The number of Rayon jobs of this search yet to be completed.
    jobs: AtomicUsize,
    stop: AtomicBool,
    reason: Mutex<Option<InconclusiveReason>>,
    deadline: Option<Instant>,
    best: Mutex<Option<Vec<u32>>>
}

impl SearchControl {
    fn new(budget: &Budget) -> Self {
        SearchControl {
            steps: AtomicU64::new(0),
            jobs: AtomicUsize::new(0),
            stop: AtomicBool::new(false),
            reason: Mutex::new(None),
            deadline: budget.timeout.map(|t| Instant::now() + t),
            best: Mutex::new(None)
        }
    }

    fn halt(&self, reason: InconclusiveReason) {
        let mut current = self.reason.lock().unwrap_or_else(|e| e.into_inner());
        current.get_or_insert(reason);
        self.stop.store(true, Ordering::Release);
    }

    /// Counts a step, stopping the search once the budget is spent.
    fn tick(&self, budget: &Budget) -> bool {
        let steps = self.steps.fetch_add(1, Ordering::Relaxed) + 1;
        if steps > budget.max_steps {
            self.halt(InconclusiveReason::StepLimit);
        } else if self.deadline.is_some_and(|d| steps % 64 == 0 && Instant::now() >= d) {
            self.halt(InconclusiveReason::Timeout);
        }
        self.stop.load(Ordering::Acquire)
    }

    fn superseded(&self, path: &[u32]) -> bool {
        let best = self.best.lock().unwrap_or_else(|e| e.into_inner());
        best.as_deref().is_some_and(|b| b < path)
    }

    fn improve(&self, path: &[u32]) {
        let mut best = self.best.lock().unwrap_or_else(|e| e.into_inner());
        if best.as_deref().map_or(true, |b| path < b) {
            *best = Some(path.to_vec());
        }
    }

    fn reason(&self) -> InconclusiveReason {
        self.reason.lock().unwrap_or_else(|e| e.into_inner()).unwrap_or(InconclusiveReason::StepLimit)
    }
}

/// Backward search for a trace satisfying a target formula together with the model's restrictions.
pub struct Prover<'a> {
    model: &'a Model,
    target: Nnf,
    tactic: Option<&'a Tactic>,
    budget: Budget,
    control: SearchControl,
    /// Fingerprints of systems whose whole subtree was refuted.
    refuted: [RwLock<HashSet<(u64, u64)>>; CACHE_SHARDS]
}

fn child_path(path: &[u32], i: usize) -> Vec<u32> {
    let mut child = path.to_vec();
    child.push(i as u32);
    child
}

impl<'a> Prover<'a> {
    pub fn new(model: &'a Model, target: Nnf, tactic: Option<&'a Tactic>, budget: Budget) -> Self {
        Prover {
            model,
            target,
            tactic,
            control: SearchControl::new(&budget),
            budget,
            refuted: std::array::from_fn(|_| RwLock::new(HashSet::new()))
        }
    }

    /// Iterative deepening over the node bound until a witness is found, the search space
    /// is exhausted, or the budget runs out.
    pub fn search(&self) -> Search {
        let roots = System::new(self.model, &self.target).simplify(self.model);
        let mut bound = self.budget.max_nodes.clamp(1, 4);
        loop {
            let mut round = DFSResult { lossy: roots.lossy as u32, ..DFSResult::default() };
            for (i, root) in roots.systems.iter().cloned().enumerate() {
                let result = self.dfs(root, vec![i as u32], bound);
                let found = result.witness.is_some();
                round.add(result);
                if found { break }
            }

            // Update the global statistics map.
            stats::publish();
            debug!(bound, steps = round.steps, truncated = round.truncated, lossy = round.lossy, "search round finished");
            for (kind, goals) in stats::snapshot() {
                debug!(?kind, expansions = goals.expansions, branching = goals.branching(), dead_ends = goals.dead_ends, "goal statistics");
            }

            let steps = self.control.steps.load(Ordering::Relaxed);
            let open_goals = round.open_goals;
            let outcome = if let Some((_, trace)) = round.witness {
                Outcome::Witness(trace)
            } else if round.interrupted {
                Outcome::Inconclusive(self.control.reason())
            } else if round.truncated == 0 && round.lossy == 0 {
                Outcome::Exhausted
            } else if round.truncated == 0 {
                Outcome::Inconclusive(InconclusiveReason::Incomplete)
            } else if bound >= self.budget.max_nodes {
                Outcome::Inconclusive(InconclusiveReason::NodeLimit)
            } else {
                bound = (bound * 2).min(self.budget.max_nodes);
                continue;
            };
            return Search { outcome, steps, open_goals };
        }
    }

    fn shard(&self, fingerprint: (u64, u64)) -> &RwLock<HashSet<(u64, u64)>> {
        &self.refuted[(fingerprint.0 as usize) % CACHE_SHARDS]
    }

    fn is_refuted(&self, fingerprint: (u64, u64)) -> bool {
        self.shard(fingerprint).read().map(|set| set.contains(&fingerprint)).unwrap_or(false)
    }

    /// Depth-first search below `system`, whose position in the search tree is `path`.
    fn dfs(&self, system: System, path: Vec<u32>, bound: usize) -> DFSResult {
        let mut result = DFSResult { steps: 1, ..DFSResult::default() };
        if self.control.superseded(&path) {
            result.cancelled = 1;
            return result;
        }
        if self.control.tick(&self.budget) {
            result.interrupted = true;
            result.open_goals = system.goals.len();
            return result;
        }
        if system.live_nodes() > bound {
            result.truncated = 1;
            result.open_goals = system.goals.len();
            return result;
        }
        let fingerprint = system.fingerprint();
        if self.is_refuted(fingerprint) { return result }

        let Some(goal) = select(&system, self.tactic) else {
            return self.solved(system, path);
        };
        let kind = GoalKind::of(&system.goals[goal].goal);
        let branches = expand(system, goal, self.model);
        stats::record(kind, branches.systems.len());
        if branches.lossy { result.lossy += 1 }

        let branching = branches.systems.len();
        let mut iter = branches.systems.into_iter().enumerate();
        let num_jobs = self.control.jobs.load(Ordering::Relaxed);

        if branching < 2 || num_jobs > 100 {
            while let Some((i, child)) = iter.next() {
                let child_result = self.dfs(child, child_path(&path, i), bound);
                // If there are more than two remaining options, this option took many steps,
                // and there are less than 100 jobs, execute the remaining options in parallel.
                let parallel = iter.len() > 2 && child_result.steps > num_jobs.saturating_mul(100) as u64 && num_jobs < 100;
                let found = child_result.witness.is_some();
                result.add(child_result);
                if found || parallel { break }
            }
        }

        if result.witness.is_none() {
            let rest: Vec<(usize, System)> = iter.collect();
            self.control.jobs.fetch_add(rest.len(), Ordering::Acquire);
            let more: Vec<DFSResult> = rest.into_par_iter().map(|(i, child)| {
                let child_result = self.dfs(child, child_path(&path, i), bound);
                self.control.jobs.fetch_sub(1, Ordering::Relaxed);
                child_result
            }).collect();
            for child_result in more {
                result.add(child_result);
            }
        }

        if result.refuted() {
            if let Ok(mut set) = self.shard(fingerprint).write() {
                set.insert(fingerprint);
            }
        }
        result
    }

    /// A solved system yields a witness only once its trace passes the forward semantics.
    fn solved(&self, system: System, path: Vec<u32>) -> DFSResult {
        let trace = system.instantiate(self.model);
        let theories = &self.model.theories;
        let problem = match replay(self.model, &trace) {
            Err(err) => Some(err.to_string()),
            Ok(_) if !self.target.holds(&trace, theories) => Some("the target formula does not hold".to_string()),
            Ok(_) => self.model.restrictions.iter()
                .find(|r| !r.nnf.holds(&trace, theories))
                .map(|r| format!("restriction `{}` is violated", r.name))
        };
        match problem {
            Some(problem) => {
                warn!(%problem, steps = trace.len(), "discarding a solved system whose trace does not verify");
                DFSResult { steps: 1, lossy: 1, ..DFSResult::default() }
            }
            None => {
                self.control.improve(&path);
                DFSResult { steps: 1, solutions: 1, witness: Some((path, trace)), ..DFSResult::default() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact::{Fact, Pred};
    use crate::formula::*;
    use crate::rule::{Rule, RuleKind};
    use crate::term::*;
    use crate::theory::{Builtins, Theories};

    fn model() -> Model {
        let n = Term::Var(Var::fresh("n"));
        let x = Term::Var(Var::msg("x"));
        let gen = Rule::new("Gen", RuleKind::Protocol, vec![Fact::linear(Pred::fresh(), vec![n.clone()])],
            vec![Fact::linear(Pred::new("Made"), vec![n.clone()])], vec![Fact::linear(Pred::new("Item"), vec![n.clone()])],
            Vec::new(), None).unwrap();
        let take = Rule::new("Take", RuleKind::Protocol, vec![Fact::linear(Pred::new("Item"), vec![x.clone()])],
            vec![Fact::linear(Pred::new("Taken"), vec![x.clone()])], Vec::new(), Vec::new(), None).unwrap();
        let signature = Signature::new();
        let theories = Theories::new(&signature, Vec::new(), Builtins::default()).unwrap();
        Model::new(signature, theories, vec![gen, take], Vec::new(), Vec::new(), Vec::new()).unwrap()
    }

    fn taken_twice() -> Nnf {
        let x = Var::msg("x");
        let taken = |t: &str| Formula::action(Fact::linear(Pred::new("Taken"), vec![Term::Var(x.clone())]), t);
        Formula::exists(vec![Binder::Msg(x.clone()), Binder::Time(TVar::new("i")), Binder::Time(TVar::new("j"))],
            Formula::And(vec![taken("i"), taken("j"), Formula::Atom(Atom::Less(TVar::new("i"), TVar::new("j")))]))
            .to_nnf().unwrap()
    }

    #[test]
    fn finds_a_verified_witness() {
        let model = model();
        let x = Var::msg("x");
        let target = Formula::exists(vec![Binder::Msg(x.clone()), Binder::Time(TVar::new("i"))],
            Formula::action(Fact::linear(Pred::new("Taken"), vec![Term::Var(x)]), "i")).to_nnf().unwrap();
        let search = Prover::new(&model, target, None, Budget::default()).search();
        let Outcome::Witness(trace) = search.outcome else { panic!("expected a witness, got {:?}", search.outcome) };
        assert_eq!(trace.steps.iter().map(|s| s.rule.as_str()).collect::<Vec<_>>(), vec!["Gen", "Take"]);
    }

    #[test]
    fn linear_facts_are_not_consumed_twice() {
        let model = model();
        let search = Prover::new(&model, taken_twice(), None, Budget::default()).search();
        assert_eq!(search.outcome, Outcome::Exhausted);
    }

    #[test]
    fn step_limit_is_reported() {
        let model = model();
        let budget = Budget { max_steps: 2, ..Budget::default() };
        let search = Prover::new(&model, taken_twice(), None, budget).search();
        assert_eq!(search.outcome, Outcome::Inconclusive(InconclusiveReason::StepLimit));
    }

    #[test]
    fn parallel_jobs_are_counted_per_search() {
        let model = model();
        let prover = Prover::new(&model, taken_twice(), None, Budget::default());
        prover.search();
        assert_eq!(prover.control.jobs.load(Ordering::Relaxed), 0);
    }
}

use crate::heuristic::GoalKind;
use arc_swap::ArcSwap;
use hashbrown::HashMap;
use once_cell::sync::Lazy;
use std::sync::Arc;
use std::thread::ThreadId;
use thread_local_collect::tlm::probed::{Control, Holder};

/// Global map from goal kind to `GoalStats`, refreshed after every deepening round.
/// Totals are process-wide: concurrent searches add to the same counters.
pub static GOAL_MAP: Lazy<ArcSwap<HashMap<GoalKind, GoalStats>>> = Lazy::new(|| ArcSwap::from_pointee(HashMap::new()));
pub static GOAL_CONTROL: Lazy<Control<HashMap<GoalKind, GoalStats>, HashMap<GoalKind, GoalStats>>> =
    Lazy::new(|| Control::new(&LOCAL_GOAL_MAP, HashMap::new(), HashMap::new, goal_op));

thread_local! {
    /// Local map where statistics are tabulated. It is periodically accumulated into `GOAL_MAP`.
    pub static LOCAL_GOAL_MAP: Holder<HashMap<GoalKind, GoalStats>, HashMap<GoalKind, GoalStats>> = Holder::new();
}

/// Reduce operation for `LOCAL_GOAL_MAP`s.
pub fn goal_op(data: HashMap<GoalKind, GoalStats>, acc: &mut HashMap<GoalKind, GoalStats>, _: ThreadId) {
    for (key, stats) in data {
        acc.entry(key).or_default().add(stats);
    }
}

/// How goals of one kind behaved when solved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GoalStats {
    pub expansions: u64,
    pub branches: u64,
    /// Expansions that left no consistent system.
    pub dead_ends: u64
}

impl GoalStats {
    pub fn add(&mut self, stats: GoalStats) {
        self.expansions += stats.expansions;
        self.branches += stats.branches;
        self.dead_ends += stats.dead_ends;
    }

    /// Average number of systems one expansion leads to.
    pub fn branching(&self) -> f64 {
        if self.expansions == 0 { 0.0 } else { self.branches as f64 / self.expansions as f64 }
    }
}

/// Records one expansion of a goal of kind `kind` that produced `branches` systems.
pub fn record(kind: GoalKind, branches: usize) {
    GOAL_CONTROL.with_data_mut(|map| {
        let stats = map.entry(kind).or_default();
        stats.expansions += 1;
        stats.branches += branches as u64;
        if branches == 0 { stats.dead_ends += 1 }
    });
}

/// Folds the thread-local tables into `GOAL_MAP`.
pub fn publish() {
    GOAL_MAP.store(Arc::new(GOAL_CONTROL.probe_tls()));
}

/// The published statistics, sorted by goal kind.
pub fn snapshot() -> Vec<(GoalKind, GoalStats)> {
    let mut all: Vec<(GoalKind, GoalStats)> = GOAL_MAP.load().iter().map(|(k, s)| (*k, *s)).collect();
    all.sort_by_key(|(k, _)| *k);
    all
}

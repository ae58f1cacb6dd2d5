use crate::fact::{Fact, Pred};
use crate::formula::Nnf;
use crate::system::*;
use crate::term::*;

/// Coarse classification of open goals, shared by tactics and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GoalKind {
    Action,
    Premise,
    Knows,
    Chain,
    Split
}

impl GoalKind {
    pub fn of(goal: &Goal) -> Self {
        match goal {
            Goal::Action { .. } => GoalKind::Action,
            Goal::Premise { .. } => GoalKind::Premise,
            Goal::Knows { .. } => GoalKind::Knows,
            Goal::Chain { .. } => GoalKind::Chain,
            Goal::Split(_) => GoalKind::Split
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GoalKind::Action => "action",
            GoalKind::Premise => "premise",
            GoalKind::Knows => "knows",
            GoalKind::Chain => "chain",
            GoalKind::Split => "split"
        }
    }
}

/// A structural pattern over goals. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoalPattern {
    pub kind: Option<GoalKind>,
    /// Matches goals about a fact whose predicate name starts with this prefix.
    pub pred_prefix: Option<String>,
    pub persistent: Option<bool>,
    /// Matches goals mentioning this function symbol.
    pub mentions: Option<FunId>
}

/// A named goal ordering: goals matching `prefer` come first, goals matching `deprioritize` last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tactic {
    pub name: String,
    pub prefer: Vec<GoalPattern>,
    pub deprioritize: Vec<GoalPattern>
}

fn goal_fact<'a>(system: &'a System, goal: &'a Goal) -> Option<&'a Fact> {
    match goal {
        Goal::Action { fact, .. } => Some(fact),
        Goal::Premise { node, idx } => system.node(*node).and_then(|n| n.premises.get(*idx)),
        _ => None
    }
}

fn goal_terms(system: &System, goal: &Goal) -> Vec<Term> {
    match goal {
        Goal::Knows { term, .. } => vec![term.clone()],
        Goal::Chain { from, to, .. } => vec![from.clone(), to.clone()],
        _ => goal_fact(system, goal).map(|f| f.args.clone()).unwrap_or_default()
    }
}

impl GoalPattern {
    pub fn matches(&self, system: &System, goal: &Goal) -> bool {
        if self.kind.is_some_and(|k| k != GoalKind::of(goal)) { return false }
        let fact = goal_fact(system, goal);
        if let Some(prefix) = &self.pred_prefix {
            let pred = match goal {
                Goal::Knows { .. } | Goal::Chain { .. } => Some(Pred::knows()),
                _ => fact.map(|f| f.pred)
            };
            if !pred.is_some_and(|p| p.name().starts_with(prefix.as_str())) { return false }
        }
        if let Some(persistent) = self.persistent {
            if fact.map(Fact::is_persistent) != Some(persistent) { return false }
        }
        if let Some(f) = self.mentions {
            if !goal_terms(system, goal).iter().any(|t| t.contains_fun(f)) { return false }
        }
        true
    }
}

/// Built-in urgency of a goal, before tactics. `None` marks goals that are never worth solving:
/// knowledge of a plain message variable holds for any public value.
fn class(goal: &Goal) -> Option<u8> {
    match goal {
        Goal::Split(Nnf::Or(_)) => Some(5),
        Goal::Split(_) => Some(0),
        Goal::Knows { term, .. } if term.is_msg_var() => None,
        Goal::Knows { term: Term::Name(Name::Pub(_)), .. } => Some(0),
        Goal::Knows { term: Term::Var(v), .. } if v.sort == Sort::Pub => Some(0),
        Goal::Chain { from, .. } if from.is_var() => Some(7),
        Goal::Chain { .. } => Some(1),
        Goal::Action { .. } => Some(2),
        Goal::Premise { .. } => Some(3),
        Goal::Knows { .. } => Some(4)
    }
}

/// Goals about values that later steps may still instantiate: knowledge of a message variable,
/// and deconstruction of a message that is still a variable.
pub fn is_deferred(goal: &Goal) -> bool {
    match goal {
        Goal::Knows { term, .. } => term.is_msg_var(),
        Goal::Chain { from, .. } => from.is_var(),
        _ => false
    }
}

/// Orders goals by tactic bucket, then built-in class, then age.
pub fn rank(system: &System, goal: &OpenGoal, tactic: Option<&Tactic>) -> Option<(u8, u8, u64)> {
    let class = class(&goal.goal)?;
    let bucket = match tactic {
        // Formula decomposition is never reordered.
        _ if class == 0 => 0,
        // A chain from a variable is closed only once nothing else can instantiate it.
        _ if is_deferred(&goal.goal) => 3,
        Some(t) if t.prefer.iter().any(|p| p.matches(system, &goal.goal)) => 0,
        Some(t) if t.deprioritize.iter().any(|p| p.matches(system, &goal.goal)) => 2,
        _ => 1
    };
    Some((bucket, class, goal.id))
}

/// The index of the goal to solve next, or `None` if the system is solved.
pub fn select(system: &System, tactic: Option<&Tactic>) -> Option<usize> {
    system.goals.iter().enumerate()
        .filter_map(|(i, g)| rank(system, g, tactic).map(|r| (r, i)))
        .min()
        .map(|(_, i)| i)
}

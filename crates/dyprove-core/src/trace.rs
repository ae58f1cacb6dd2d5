use crate::fact::Fact;
use crate::model::Model;
use crate::rule::*;
use crate::term::*;
use std::collections::{BTreeSet, VecDeque};
use thiserror::Error;
use tracing::debug;

/// One rule application of a trace, at the timepoint given by its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub rule: String,
    pub subst: Vec<(Var, Term)>,
    pub premises: Vec<Fact>,
    pub actions: Vec<Fact>,
    pub conclusions: Vec<Fact>
}

/// A totally ordered sequence of ground rule applications.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    pub steps: Vec<Step>
}

impl Trace {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Every subterm of every fact of the trace, without duplicates.
    pub fn subterms(&self) -> Vec<Term> {
        let mut seen = BTreeSet::new();
        for step in &self.steps {
            for fact in step.premises.iter().chain(step.actions.iter()).chain(step.conclusions.iter()) {
                for arg in &fact.args {
                    seen.extend(arg.subterms().into_iter().cloned());
                }
            }
        }
        seen.into_iter().collect()
    }

    /// Whether some step emits `fact`.
    pub fn emits(&self, fact: &Fact) -> bool {
        self.steps.iter().any(|s| s.actions.contains(fact))
    }
}

impl Instance {
    pub fn step(&self, model: &Model) -> Step {
        Step {
            rule: model.rules[self.rule].name.clone(),
            subst: self.subst.iter().map(|(v, t)| (v.clone(), t.clone())).collect(),
            premises: self.premises.clone(),
            actions: self.actions.clone(),
            conclusions: self.conclusions.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    #[error("step {step}: unknown rule `{rule}`")]
    UnknownRule { step: usize, rule: String },
    #[error("step {step} ({rule}): {source}")]
    Fire { step: usize, rule: String, #[source] source: FireError },
    #[error("step {step} ({rule}): recorded facts differ from the rule instance")]
    Mismatch { step: usize, rule: String }
}

/// Re-executes `trace` with the forward semantics, returning the state before the first step and after each step.
pub fn replay(model: &Model, trace: &Trace) -> Result<Vec<State>, ReplayError> {
    let mut states = vec![State::new()];
    for (i, step) in trace.steps.iter().enumerate() {
        let Some(rule) = model.rules.iter().position(|r| r.name == step.rule) else {
            return Err(ReplayError::UnknownRule { step: i, rule: step.rule.clone() });
        };
        let sigma: Subst = step.subst.iter().cloned().collect();
        let current = states.last().cloned().unwrap_or_default();
        let instance = fire(model, &current, rule, &sigma)
            .map_err(|source| ReplayError::Fire { step: i, rule: step.rule.clone(), source })?;
        if instance.premises != step.premises || instance.actions != step.actions || instance.conclusions != step.conclusions {
            return Err(ReplayError::Mismatch { step: i, rule: step.rule.clone() });
        }
        states.push(instance.state);
    }
    Ok(states)
}

/// A run of the forward semantics: `states[i + 1]` follows from `states[i]` by `trace.steps[i]`.
#[derive(Debug, Clone)]
pub struct Run {
    pub trace: Trace,
    pub states: Vec<State>
}

/// Breadth-first enumeration of runs of up to `depth` steps, stopping after `limit` runs.
pub fn explore(model: &Model, depth: usize, limit: usize) -> Vec<Run> {
    let mut queue = VecDeque::from([Run { trace: Trace::default(), states: vec![State::new()] }]);
    let mut runs = Vec::new();
    while let Some(run) = queue.pop_front() {
        if runs.len() >= limit {
            debug!(limit, "exploration limit reached");
            break;
        }
        if run.trace.len() < depth {
            if let Some(state) = run.states.last() {
                for instance in applicable_instances(model, state) {
                    let mut next = run.clone();
                    next.trace.steps.push(instance.step(model));
                    next.states.push(instance.state);
                    queue.push_back(next);
                }
            }
        }
        runs.push(run);
    }
    runs
}

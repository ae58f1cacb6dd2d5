use dyprove_core::lemma::Verdict;
use dyprove_core::model::Model;
use dyprove_core::print::show;
use dyprove_core::prover::InconclusiveReason;
use dyprove_core::trace::{Step, Trace};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A rule application of a reported trace, with every term printed in surface syntax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub timepoint: usize,
    pub rule: String,
    pub subst: Vec<(String, String)>,
    pub actions: Vec<String>
}

impl StepReport {
    fn new(model: &Model, timepoint: usize, step: &Step) -> Self {
        let sig = &model.signature;
        StepReport {
            timepoint,
            rule: step.rule.clone(),
            subst: step.subst.iter().map(|(v, t)| (v.to_string(), show(sig, t).to_string())).collect(),
            actions: step.actions.iter().map(|a| show(sig, a).to_string()).collect()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsReport {
    pub steps: u64,
    pub open_goals: usize,
    pub reason: String
}

fn reason(reason: InconclusiveReason) -> &'static str {
    match reason {
        InconclusiveReason::StepLimit => "step limit",
        InconclusiveReason::Timeout => "timeout",
        InconclusiveReason::NodeLimit => "node limit",
        InconclusiveReason::Incomplete => "incomplete unification"
    }
}

/// The outcome of one lemma. `verdict` is `proven`, `falsified`, `inconclusive` or `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LemmaReport {
    pub name: String,
    pub verdict: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<StepReport>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<DiagnosticsReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelReport {
    pub model: String,
    pub lemmas: Vec<LemmaReport>
}

impl ModelReport {
    pub fn new(model: &str) -> Self {
        ModelReport { model: model.to_string(), lemmas: Vec::new() }
    }

    pub fn push_verdict(&mut self, model: &Model, name: &str, verdict: &Verdict) {
        let trace = verdict.trace().map(|trace: &Trace| {
            trace.steps.iter().enumerate().map(|(i, step)| StepReport::new(model, i, step)).collect()
        });
        let diagnostics = match verdict {
            Verdict::Inconclusive(d) =>
                Some(DiagnosticsReport { steps: d.steps, open_goals: d.open_goals, reason: reason(d.reason).to_string() }),
            _ => None
        };
        self.lemmas.push(LemmaReport { name: name.to_string(), verdict: verdict.name().to_string(), trace, diagnostics, error: None });
    }

    pub fn push_error(&mut self, name: &str, error: &impl fmt::Display) {
        self.lemmas.push(LemmaReport {
            name: name.to_string(),
            verdict: "error".to_string(),
            trace: None,
            diagnostics: None,
            error: Some(error.to_string())
        });
    }

    pub fn lemma(&self, name: &str) -> Option<&LemmaReport> {
        self.lemmas.iter().find(|l| l.name == name)
    }

    /// Whether some lemma ended in an error or without an answer.
    pub fn has_failures(&self) -> bool {
        self.lemmas.iter().any(|l| l.verdict == "error" || l.verdict == "inconclusive")
    }
}

impl fmt::Display for ModelReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "model {}", self.model)?;
        for lemma in &self.lemmas {
            write!(f, "  {}: {}", lemma.name, lemma.verdict)?;
            if let Some(d) = &lemma.diagnostics {
                write!(f, " ({} after {} steps, {} open goals)", d.reason, d.steps, d.open_goals)?;
            }
            if let Some(error) = &lemma.error {
                write!(f, " ({})", error)?;
            }
            writeln!(f)?;
            for step in lemma.trace.iter().flatten() {
                write!(f, "    #{}: {}", step.timepoint, step.rule)?;
                if !step.actions.is_empty() {
                    write!(f, " --[{}]->", step.actions.join(", "))?;
                }
                if !step.subst.is_empty() {
                    let subst: Vec<String> = step.subst.iter().map(|(v, t)| format!("{} = {}", v, t)).collect();
                    write!(f, " with {}", subst.join(", "))?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

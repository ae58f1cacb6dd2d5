use crate::formula::*;
use crate::model::{Model, ModelError};
use crate::prover::{Budget, InconclusiveReason, Outcome, Prover};
use crate::trace::Trace;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LemmaKind {
    /// Some trace satisfies the formula.
    ExistsTrace,
    /// Every trace satisfies the formula.
    AllTraces
}

/// A property to evaluate, with the formula the backward search is started from.
#[derive(Debug, Clone)]
pub struct Lemma {
    pub name: String,
    pub kind: LemmaKind,
    pub formula: Formula,
    pub tactic: Option<String>,
    target: Nnf
}

impl Lemma {
    /// Checks that the formula is closed and guarded. For an all-traces lemma the search looks
    /// for a counterexample, so its negation must be guarded as well.
    pub fn new(name: &str, kind: LemmaKind, formula: Formula, tactic: Option<String>) -> Result<Self, ModelError> {
        let invalid = |source| ModelError::Formula { name: name.to_string(), source };
        formula.to_nnf().map_err(invalid)?;
        let searched = match kind {
            LemmaKind::ExistsTrace => formula.clone(),
            LemmaKind::AllTraces => Formula::not(formula.clone())
        };
        let target = searched.to_nnf().map_err(invalid)?;
        Ok(Lemma { name: name.to_string(), kind, formula, tactic, target })
    }

    pub fn target(&self) -> &Nnf {
        &self.target
    }
}

/// Where a search stopped without an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    pub steps: u64,
    pub open_goals: usize,
    pub reason: InconclusiveReason
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// An exists-trace lemma comes with its witness. An all-traces lemma has none.
    Proven { witness: Option<Trace> },
    /// An all-traces lemma comes with the violating trace. An exists-trace lemma has none.
    Falsified { counterexample: Option<Trace> },
    Inconclusive(Diagnostics)
}

impl Verdict {
    pub fn name(&self) -> &'static str {
        match self {
            Verdict::Proven { .. } => "proven",
            Verdict::Falsified { .. } => "falsified",
            Verdict::Inconclusive(_) => "inconclusive"
        }
    }

    /// The trace attached to the verdict, if any.
    pub fn trace(&self) -> Option<&Trace> {
        match self {
            Verdict::Proven { witness } => witness.as_ref(),
            Verdict::Falsified { counterexample } => counterexample.as_ref(),
            Verdict::Inconclusive(_) => None
        }
    }
}

/// Evaluates one lemma within `budget`. Restrictions of the model constrain every search.
pub fn evaluate(model: &Model, lemma: &Lemma, budget: Budget) -> Result<Verdict, ModelError> {
    let tactic = match &lemma.tactic {
        Some(name) => Some(model.tactic(name).ok_or_else(|| ModelError::UnknownTactic {
            lemma: lemma.name.clone(),
            tactic: name.clone()
        })?),
        None => None
    };
    let search = Prover::new(model, lemma.target.clone(), tactic, budget).search();
    let verdict = match (lemma.kind, search.outcome) {
        (LemmaKind::ExistsTrace, Outcome::Witness(trace)) => Verdict::Proven { witness: Some(trace) },
        (LemmaKind::ExistsTrace, Outcome::Exhausted) => Verdict::Falsified { counterexample: None },
        (LemmaKind::AllTraces, Outcome::Witness(trace)) => Verdict::Falsified { counterexample: Some(trace) },
        (LemmaKind::AllTraces, Outcome::Exhausted) => Verdict::Proven { witness: None },
        (_, Outcome::Inconclusive(reason)) =>
            Verdict::Inconclusive(Diagnostics { steps: search.steps, open_goals: search.open_goals, reason })
    };
    info!(lemma = %lemma.name, verdict = verdict.name(), steps = search.steps, "lemma evaluated");
    Ok(verdict)
}

/// Evaluates every lemma of the model in declaration order. A failing lemma does not stop the others.
pub fn evaluate_all(model: &Model, budget: Budget) -> Vec<(String, Result<Verdict, ModelError>)> {
    model.lemmas.iter().map(|lemma| (lemma.name.clone(), evaluate(model, lemma, budget))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::builtin_pack;
    use crate::fact::{Fact, Pred};
    use crate::heuristic::{GoalKind, GoalPattern, Tactic};
    use crate::rule::{Rule, RuleKind};
    use crate::term::*;
    use crate::theory::{Builtins, Theories};

    fn made(x: &Var, at: &str) -> Formula {
        Formula::action(Fact::linear(Pred::new("Made"), vec![Term::Var(x.clone())]), at)
    }

    fn model(lemmas: Vec<Lemma>) -> Model {
        let n = Term::Var(Var::fresh("n"));
        let gen = Rule::new("Gen", RuleKind::Protocol, vec![Fact::linear(Pred::fresh(), vec![n.clone()])],
            vec![Fact::linear(Pred::new("Made"), vec![n])], Vec::new(), Vec::new(), None).unwrap();
        let signature = Signature::new();
        let theories = Theories::new(&signature, Vec::new(), Builtins::default()).unwrap();
        Model::new(signature, theories, vec![gen], Vec::new(), lemmas, Vec::new()).unwrap()
    }

    #[test]
    fn exists_trace_is_proven_with_a_witness() {
        let x = Var::msg("x");
        let lemma = Lemma::new("made", LemmaKind::ExistsTrace,
            Formula::exists(vec![Binder::Msg(x.clone()), Binder::Time(TVar::new("i"))], made(&x, "i")), None).unwrap();
        let model = model(vec![lemma]);
        let verdict = evaluate(&model, &model.lemmas[0], Budget::default()).unwrap();
        assert!(matches!(verdict, Verdict::Proven { witness: Some(_) }));
    }

    #[test]
    fn all_traces_is_falsified_with_a_counterexample() {
        let x = Var::msg("x");
        let never = Formula::forall(vec![Binder::Msg(x.clone()), Binder::Time(TVar::new("i"))],
            Formula::implies(made(&x, "i"), Formula::False));
        let lemma = Lemma::new("never_made", LemmaKind::AllTraces, never, None).unwrap();
        let model = model(vec![lemma]);
        let verdict = evaluate(&model, &model.lemmas[0], Budget::default()).unwrap();
        let Verdict::Falsified { counterexample: Some(trace) } = verdict else { panic!("unexpected verdict {:?}", verdict) };
        assert_eq!(trace.steps[0].rule, "Gen");
    }

    #[test]
    fn fresh_values_are_unique() {
        let (x, i, j) = (Var::msg("x"), TVar::new("i"), TVar::new("j"));
        let unique = Formula::forall(vec![Binder::Msg(x.clone()), Binder::Time(i.clone()), Binder::Time(j.clone())],
            Formula::implies(Formula::And(vec![made(&x, "i"), made(&x, "j")]), Formula::Atom(Atom::TEq(i, j))));
        let lemma = Lemma::new("unique", LemmaKind::AllTraces, unique, None).unwrap();
        let model = model(vec![lemma]);
        assert_eq!(evaluate(&model, &model.lemmas[0], Budget::default()).unwrap(), Verdict::Proven { witness: None });
    }

    fn secret_formula() -> Formula {
        let v = Var::msg("v");
        let fact = |name: &str| Fact::linear(Pred::new(name), vec![Term::Var(v.clone())]);
        Formula::forall(vec![Binder::Msg(v.clone()), Binder::Time(TVar::new("i")), Binder::Time(TVar::new("j"))],
            Formula::implies(Formula::And(vec![Formula::action(fact("Secret"), "i"), Formula::action(fact("Got"), "j")]), Formula::False))
    }

    /// `A` draws `~s` and `~k`, keeps `~s` and sends `~k`, possibly wrapping `~s` in `wrap(~s, ~k)` for `Forward`.
    /// `Receive` records what the adversary hands it.
    fn two_secrets(signature: Signature, theories: Theories, wrap: Option<Term>, tactics: Vec<Tactic>, lemmas: Vec<Lemma>) -> Model {
        let (s, k, x, y) = (Term::Var(Var::fresh("s")), Term::Var(Var::fresh("k")), Term::Var(Var::msg("x")), Term::Var(Var::msg("y")));
        let fr = |t: &Term| Fact::linear(Pred::fresh(), vec![t.clone()]);
        let mut conclusions = vec![Fact::linear(Pred::output(), vec![k.clone()])];
        let mut rules = Vec::new();
        if let Some(wrapped) = wrap {
            conclusions.insert(0, Fact::linear(Pred::new("St"), vec![wrapped]));
            rules.push(Rule::new("Forward", RuleKind::Protocol, vec![Fact::linear(Pred::new("St"), vec![x.clone()])],
                Vec::new(), vec![Fact::linear(Pred::output(), vec![x])], Vec::new(), None).unwrap());
        }
        rules.insert(0, Rule::new("A", RuleKind::Protocol, vec![fr(&s), fr(&k)],
            vec![Fact::linear(Pred::new("Secret"), vec![s.clone()])], conclusions, Vec::new(), None).unwrap());
        rules.push(Rule::new("Receive", RuleKind::Protocol, vec![Fact::linear(Pred::input(), vec![y.clone()])],
            vec![Fact::linear(Pred::new("Got"), vec![y])], Vec::new(), Vec::new(), None).unwrap());
        Model::new(signature, theories, rules, Vec::new(), lemmas, tactics).unwrap()
    }

    #[test]
    fn one_rule_draws_distinct_fresh_values() {
        let lemma = Lemma::new("secret_stays_secret", LemmaKind::AllTraces, secret_formula(), None).unwrap();
        let signature = Signature::new();
        let theories = Theories::new(&signature, Vec::new(), Builtins::default()).unwrap();
        let model = two_secrets(signature, theories, None, Vec::new(), vec![lemma]);
        assert_eq!(evaluate(&model, &model.lemmas[0], Budget::default()).unwrap(), Verdict::Proven { witness: None });
    }

    #[test]
    fn tactics_do_not_change_verdicts() {
        let mut signature = Signature::new();
        let pack = builtin_pack("symmetric-encryption", &mut signature).unwrap();
        let senc = signature.lookup("senc").unwrap();
        let theories = Theories::new(&signature, pack.equations, pack.builtins).unwrap();
        let wrapped = Term::app(senc, vec![Term::Var(Var::fresh("s")), Term::Var(Var::fresh("k"))]);
        let late = Tactic {
            name: "late_premises".into(),
            prefer: Vec::new(),
            deprioritize: vec![GoalPattern { kind: Some(GoalKind::Premise), ..GoalPattern::default() }]
        };
        let lemmas = vec![
            Lemma::new("plain", LemmaKind::AllTraces, secret_formula(), None).unwrap(),
            Lemma::new("late", LemmaKind::AllTraces, secret_formula(), Some("late_premises".into())).unwrap()
        ];
        let model = two_secrets(signature, theories, Some(wrapped), vec![late], lemmas);
        let results = evaluate_all(&model, Budget::default());
        for (name, result) in &results {
            let verdict = result.as_ref().unwrap();
            let Verdict::Falsified { counterexample: Some(trace) } = verdict else { panic!("{}: unexpected verdict {:?}", name, verdict) };
            assert!(trace.steps.iter().any(|step| step.rule == "Forward"));
            assert_eq!(trace.steps.last().map(|step| step.rule.as_str()), Some("Receive"));
        }
    }

    #[test]
    fn unknown_tactics_fail_only_their_lemma() {
        let x = Var::msg("x");
        let formula = Formula::exists(vec![Binder::Msg(x.clone()), Binder::Time(TVar::new("i"))], made(&x, "i"));
        let broken = Lemma::new("broken", LemmaKind::ExistsTrace, formula.clone(), Some("missing".into())).unwrap();
        let fine = Lemma::new("fine", LemmaKind::ExistsTrace, formula, None).unwrap();
        let model = model(vec![broken, fine]);
        let results = evaluate_all(&model, Budget::default());
        assert!(matches!(results[0].1, Err(ModelError::UnknownTactic { .. })));
        assert!(matches!(results[1].1, Ok(Verdict::Proven { .. })));
    }
}

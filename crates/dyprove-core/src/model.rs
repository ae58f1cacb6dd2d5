use crate::fact::*;
use crate::formula::*;
use crate::heuristic::Tactic;
use crate::lemma::Lemma;
use crate::rule::*;
use crate::term::*;
use crate::theory::Theories;
use hashbrown::HashMap;
use thiserror::Error;

/// Load-time errors. They are fatal for the construct they name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("function symbol `{name}` is declared twice with different arity or visibility")]
    SymbolClash { name: String },
    #[error("equation `{name}` has a variable as its left side")]
    EquationVariableLhs { name: String },
    #[error("equation `{name}`: variable `{var}` of the right side does not occur on the left")]
    EquationUnboundVar { name: String, var: String },
    #[error("equation `{name}` does not make terms smaller, so rewriting may not terminate")]
    EquationNotDecreasing { name: String },
    #[error("equations `{first}` and `{second}` overlap without a common normal form")]
    NotConfluent { first: String, second: String },
    #[error("duplicate rule `{0}`")]
    DuplicateRule(String),
    #[error("rule `{rule}`: variable `{var}` is not bound by any premise")]
    UnboundVariable { rule: String, var: String },
    #[error("rule `{rule}`: {reason}")]
    IllTypedRule { rule: String, reason: String },
    #[error("fact `{pred}` is used with {first} and {second} arguments")]
    ArityMismatch { pred: String, first: usize, second: usize },
    #[error("formula `{name}`: {source}")]
    Formula { name: String, #[source] source: FormulaError },
    #[error("lemma `{lemma}` refers to unknown tactic `{tactic}`")]
    UnknownTactic { lemma: String, tactic: String },
    #[error("unknown builtin `{0}`")]
    UnknownBuiltin(String)
}

/// A global filter on traces.
#[derive(Debug, Clone)]
pub struct Restriction {
    pub name: String,
    pub formula: Formula,
    pub nnf: Nnf
}

impl Restriction {
    pub fn new(name: &str, formula: Formula) -> Result<Self, ModelError> {
        let nnf = formula.to_nnf().map_err(|source| ModelError::Formula { name: name.to_string(), source })?;
        Ok(Restriction { name: name.to_string(), formula, nnf })
    }
}

/// A loaded model. Rules are static and shared read-only by every search.
#[derive(Debug)]
pub struct Model {
    pub signature: Signature,
    pub theories: Theories,
    pub rules: Vec<Rule>,
    pub restrictions: Vec<Restriction>,
    pub lemmas: Vec<Lemma>,
    pub tactics: Vec<Tactic>,
    /// Index of the generated adversary rule that turns knowledge into a `K` action.
    pub learn_rule: usize,
    by_conclusion: HashMap<Pred, Vec<(usize, usize)>>,
    by_action: HashMap<Pred, Vec<(usize, usize)>>
}

impl Model {
    /// Validates the protocol rules and appends the adversary rules.
    pub fn new(signature: Signature, theories: Theories, mut rules: Vec<Rule>, restrictions: Vec<Restriction>,
        lemmas: Vec<Lemma>, tactics: Vec<Tactic>) -> Result<Self, ModelError> {
        let mut arities: HashMap<Pred, usize> = HashMap::new();
        for (i, rule) in rules.iter().enumerate() {
            if rules[..i].iter().any(|r| r.name == rule.name) {
                return Err(ModelError::DuplicateRule(rule.name.clone()));
            }
            rule.validate()?;
            for fact in rule.premises.iter().chain(rule.actions.iter()).chain(rule.conclusions.iter()) {
                let arity = *arities.entry(fact.pred).or_insert(fact.args.len());
                if arity != fact.args.len() {
                    return Err(ModelError::ArityMismatch { pred: fact.pred.name(), first: arity, second: fact.args.len() });
                }
            }
        }

        let learn_rule = rules.len();
        rules.push(Rule::learn());

        let mut by_conclusion: HashMap<Pred, Vec<(usize, usize)>> = HashMap::new();
        let mut by_action: HashMap<Pred, Vec<(usize, usize)>> = HashMap::new();
        for (r, rule) in rules.iter().enumerate() {
            for (c, fact) in rule.conclusions.iter().enumerate() {
                by_conclusion.entry(fact.pred).or_default().push((r, c));
            }
            for (a, fact) in rule.actions.iter().enumerate() {
                by_action.entry(fact.pred).or_default().push((r, a));
            }
        }
        Ok(Model { signature, theories, rules, restrictions, lemmas, tactics, learn_rule, by_conclusion, by_action })
    }

    /// Rules and conclusion indices producing facts with predicate `pred`, in declaration order.
    pub fn producers(&self, pred: Pred) -> &[(usize, usize)] {
        self.by_conclusion.get(&pred).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Rules and action indices emitting actions with predicate `pred`, in declaration order.
    pub fn emitters(&self, pred: Pred) -> &[(usize, usize)] {
        self.by_action.get(&pred).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn tactic(&self, name: &str) -> Option<&Tactic> {
        self.tactics.iter().find(|t| t.name == name)
    }

    pub fn lemma(&self, name: &str) -> Option<&Lemma> {
        self.lemmas.iter().find(|l| l.name == name)
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }
}

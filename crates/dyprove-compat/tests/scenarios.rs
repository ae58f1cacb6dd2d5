use dyprove_compat::config::Config;
use dyprove_compat::ir::*;
use dyprove_compat::report::{LemmaReport, ModelReport};
use dyprove_compat::{action, check, exists, fact, forall, implies, rule, t};

fn run(ir: &IRModel, flags: &[&str]) -> ModelReport {
    let config = Config { flags: flags.iter().map(|f| f.to_string()).collect(), ..Config::default() };
    check(ir, &config, None).unwrap()
}

fn lemma<'a>(report: &'a ModelReport, name: &str) -> &'a LemmaReport {
    report.lemma(name).unwrap_or_else(|| panic!("no lemma `{}` in {:?}", name, report))
}

fn rules(lemma: &LemmaReport) -> Vec<&str> {
    lemma.trace.iter().flatten().map(|s| s.rule.as_str()).collect()
}

fn distinct(a: &str, b: &str) -> IRFormula {
    IRFormula::Not(Box::new(IRFormula::Eq(t!(a), t!(b))))
}

fn flag(name: &str) -> Option<IRFlagExpr> {
    Some(IRFlagExpr::Flag(name.into()))
}

/// A group of three members where any two distinct members can produce a group signature.
fn threshold() -> IRModel {
    IRModel {
        name: "threshold".into(),
        builtins: vec!["signing".into()],
        rules: vec![
            IRRule { name: "Setup".into(), premises: vec![fact!("Fr", t!("~g"))],
                actions: vec![fact!("Group", t!("~g"))],
                conclusions: vec![fact!(!"Group", t!("~g")), fact!(!"Member", t!("~g"), t!("'p1'")),
                    fact!(!"Member", t!("~g"), t!("'p2'")), fact!(!"Member", t!("~g"), t!("'p3'"))], ..rule!() },
            IRRule { name: "KeyGen".into(), premises: vec![fact!(!"Member", t!("g"), t!("P")), fact!("Fr", t!("~sk"))],
                actions: vec![fact!("KeyGen", t!("g"), t!("P"))],
                conclusions: vec![fact!(!"Ltk", t!("g"), t!("P"), t!("~sk"))], ..rule!() },
            IRRule { name: "Request".into(), premises: vec![fact!(!"Group", t!("g")), fact!("Fr", t!("~m"))],
                actions: vec![fact!("Requested", t!("g"), t!("~m"))],
                conclusions: vec![fact!(!"Req", t!("g"), t!("~m"))], ..rule!() },
            IRRule { name: "Contribute".into(), premises: vec![fact!(!"Req", t!("g"), t!("m")), fact!(!"Ltk", t!("g"), t!("P"), t!("sk"))],
                actions: vec![fact!("Contributed", t!("P"), t!("m"))],
                conclusions: vec![fact!("Partial", t!("g"), t!("P"), t!("m"), t!("sign", t!("m"), t!("sk")))], ..rule!() },
            IRRule { name: "Combine".into(),
                premises: vec![fact!("Partial", t!("g"), t!("A"), t!("m"), t!("s1")), fact!("Partial", t!("g"), t!("B"), t!("m"), t!("s2"))],
                actions: vec![fact!("GroupSig", t!("g"), t!("m"), t!("A"), t!("B"))],
                restrict: Some(distinct("A", "B")), ..rule!() },
            IRRule { name: "Reveal".into(), premises: vec![fact!(!"Ltk", t!("g"), t!("P"), t!("sk"))],
                actions: vec![fact!("Reveal", t!("P"))], ..rule!() }
        ],
        restrictions: vec![IRRestriction {
            name: "revealed_keys_do_not_count".into(),
            formula: forall(&["P", "m", "#c", "#r"], implies(
                IRFormula::And(vec![action(fact!("Contributed", t!("P"), t!("m")), "c"), action(fact!("Reveal", t!("P")), "r")]),
                IRFormula::Less("c".into(), "r".into()))),
            when: flag("unforgeability")
        }],
        lemmas: vec![
            IRLemma { name: "group_signature_reachable".into(), kind: IRLemmaKind::ExistsTrace,
                formula: exists(&["g", "m", "A", "B", "#i"], action(fact!("GroupSig", t!("g"), t!("m"), t!("A"), t!("B")), "i")),
                tactic: None, when: None },
            IRLemma { name: "revealed_signer_counts".into(), kind: IRLemmaKind::ExistsTrace,
                formula: exists(&["g", "m", "A", "B", "#i", "#c", "#r"], IRFormula::And(vec![
                    action(fact!("GroupSig", t!("g"), t!("m"), t!("A"), t!("B")), "i"),
                    action(fact!("Contributed", t!("A"), t!("m")), "c"),
                    action(fact!("Reveal", t!("A")), "r"),
                    IRFormula::Less("r".into(), "c".into())
                ])),
                tactic: None, when: None }
        ],
        ..IRModel::default()
    }
}

#[test]
fn two_honest_partials_make_a_group_signature() {
    let report = run(&threshold(), &[]);
    let reachable = lemma(&report, "group_signature_reachable");
    assert_eq!(reachable.verdict, "proven");
    let steps = rules(reachable);
    assert_eq!(steps.last(), Some(&"Combine"));
    assert_eq!(steps.iter().filter(|r| **r == "Contribute").count(), 2);
    let combine = reachable.trace.as_ref().unwrap().last().unwrap();
    assert_eq!(combine.actions.len(), 1);
    assert!(combine.actions[0].starts_with("GroupSig("));
}

#[test]
fn revealed_signers_do_not_count_toward_the_threshold() {
    let weak = run(&threshold(), &[]);
    let attack = lemma(&weak, "revealed_signer_counts");
    assert_eq!(attack.verdict, "proven");
    assert!(rules(attack).contains(&"Reveal"));

    let strong = run(&threshold(), &["unforgeability"]);
    let attack = lemma(&strong, "revealed_signer_counts");
    assert_eq!(attack.verdict, "falsified");
    assert!(attack.trace.is_none());
    assert_eq!(lemma(&strong, "group_signature_reachable").verdict, "proven");
}

/// Signing requests travel to the signer over a channel that a compromised network may rewrite.
fn accountability() -> IRModel {
    IRModel {
        name: "accountability".into(),
        rules: vec![
            IRRule { name: "Request".into(), premises: vec![fact!("Fr", t!("~m"))],
                actions: vec![fact!("Requested", t!("~m"), t!("$A"), t!("$B"))],
                conclusions: vec![fact!(!"Req", t!("~m"), t!("$A"), t!("$B"))], ..rule!() },
            IRRule { name: "Deliver".into(), kind: IRRuleKind::SecureChannel,
                premises: vec![fact!(!"Req", t!("m"), t!("A"), t!("B"))],
                conclusions: vec![fact!("Chan", t!("m"), t!("A"), t!("B"))], ..rule!() },
            IRRule { name: "Tamper".into(), kind: IRRuleKind::Channel,
                premises: vec![fact!(!"Req", t!("m"), t!("A"), t!("B"))],
                actions: vec![fact!("Tampered", t!("m"))],
                conclusions: vec![fact!("Chan", t!("m"), t!("$X"), t!("B"))],
                when: flag("compromise"), ..rule!() },
            IRRule { name: "Sign".into(), premises: vec![fact!("Chan", t!("m"), t!("A"), t!("B"))],
                actions: vec![fact!("Signed", t!("m"), t!("A"), t!("B"))], ..rule!() }
        ],
        lemmas: vec![IRLemma {
            name: "signers_match_request".into(),
            kind: IRLemmaKind::AllTraces,
            formula: forall(&["m", "A", "B", "X", "Y", "#i", "#j"], implies(
                IRFormula::And(vec![
                    action(fact!("Signed", t!("m"), t!("A"), t!("B")), "i"),
                    action(fact!("Requested", t!("m"), t!("X"), t!("Y")), "j")
                ]),
                IRFormula::And(vec![IRFormula::Eq(t!("A"), t!("X")), IRFormula::Eq(t!("B"), t!("Y"))]))),
            tactic: None,
            when: None
        }],
        ..IRModel::default()
    }
}

#[test]
fn accountability_holds_on_honest_channels() {
    let report = run(&accountability(), &[]);
    let accountable = lemma(&report, "signers_match_request");
    assert_eq!(accountable.verdict, "proven");
    assert!(accountable.trace.is_none());
}

#[test]
fn compromised_channels_break_accountability() {
    let report = run(&accountability(), &["compromise"]);
    let accountable = lemma(&report, "signers_match_request");
    assert_eq!(accountable.verdict, "falsified");
    assert_eq!(rules(accountable), vec!["Request", "Tamper", "Sign"]);
}

/// Three-party key generation where a compromised channel lets the adversary inject a commitment
/// that cancels the honest ones out of the group key.
fn rogue_key() -> IRModel {
    let commitments = |kind: &str| -> Vec<IRFact> {
        ["A", "B", "C"].iter().zip(["c1", "c2", "c3"]).map(|(p, c)| fact!(!kind, t!(format!("${}", p)), t!(c))).collect()
    };
    let group_key = || t!("groupkey", t!("c1"), t!("c2"), t!("c3"));
    let distinct_parties = IRFormula::And(vec![distinct("$A", "$B"), distinct("$B", "$C"), distinct("$A", "$C")]);
    IRModel {
        name: "rogue_key".into(),
        builtins: vec!["signing".into()],
        functions: vec![
            IRFunction { name: "groupkey".into(), arity: 3, private: false },
            IRFunction { name: "rogue".into(), arity: 3, private: true }
        ],
        equations: vec![IREquation {
            name: "cancel".into(),
            lhs: t!("groupkey", t!("c1"), t!("c2"), t!("rogue", t!("c1"), t!("c2"), t!("x"))),
            rhs: t!("pk", t!("x"))
        }],
        rules: vec![
            IRRule { name: "Commit".into(), premises: vec![fact!("Fr", t!("~s"))],
                actions: vec![fact!("Committed", t!("$P"))],
                conclusions: vec![fact!(!"Commitment", t!("$P"), t!("pk", t!("~s"))), fact!(!"PoP", t!("$P"), t!("pk", t!("~s")))],
                ..rule!() },
            IRRule { name: "Inject".into(), kind: IRRuleKind::Channel,
                premises: vec![fact!(!"PoP", t!("$A"), t!("c1")), fact!(!"PoP", t!("$B"), t!("c2")), fact!("Fr", t!("~x"))],
                actions: vec![fact!("Injected", t!("$R"))],
                conclusions: vec![fact!(!"Commitment", t!("$R"), t!("rogue", t!("c1"), t!("c2"), t!("~x"))), fact!(!"Corrupt", t!("~x"))],
                when: flag("compromise"), ..rule!() },
            IRRule { name: "Aggregate".into(), premises: commitments("Commitment"),
                actions: vec![fact!("GroupKey", group_key())], conclusions: vec![fact!(!"GK", group_key())],
                restrict: Some(distinct_parties.clone()),
                when: Some(IRFlagExpr::Not(Box::new(IRFlagExpr::Flag("pop".into())))), ..rule!() },
            IRRule { name: "AggregatePoP".into(), premises: commitments("PoP").into_iter().rev().collect(),
                actions: vec![fact!("GroupKey", group_key())], conclusions: vec![fact!(!"GK", group_key())],
                restrict: Some(distinct_parties), when: flag("pop"), ..rule!() },
            IRRule { name: "Forge".into(),
                premises: vec![fact!(!"GK", t!("gk")), fact!(!"Corrupt", t!("x")), fact!("Fr", t!("~m"))],
                actions: vec![fact!("Forged", t!("~m"), t!("gk"))],
                restrict: Some(IRFormula::Eq(t!("verify", t!("sign", t!("~m"), t!("x")), t!("~m"), t!("gk")), t!("true"))),
                ..rule!() }
        ],
        lemmas: vec![IRLemma {
            name: "no_forgery".into(),
            kind: IRLemmaKind::AllTraces,
            formula: forall(&["m", "gk", "#i"], implies(action(fact!("Forged", t!("m"), t!("gk")), "i"), IRFormula::False)),
            tactic: None,
            when: None
        }],
        ..IRModel::default()
    }
}

#[test]
fn rogue_commitments_forge_group_signatures() {
    let report = run(&rogue_key(), &["compromise"]);
    let forgery = lemma(&report, "no_forgery");
    assert_eq!(forgery.verdict, "falsified");
    let steps = rules(forgery);
    assert_eq!(steps.last(), Some(&"Forge"));
    assert!(steps.contains(&"Inject"));
    assert_eq!(steps.iter().filter(|r| **r == "Commit").count(), 2);
}

#[test]
fn proofs_of_possession_stop_rogue_keys() {
    let report = run(&rogue_key(), &["compromise", "pop"]);
    assert_eq!(lemma(&report, "no_forgery").verdict, "proven");
}

#[test]
fn forgery_needs_a_compromised_channel() {
    let report = run(&rogue_key(), &[]);
    assert_eq!(lemma(&report, "no_forgery").verdict, "proven");
}

/// Group creation tagged so that an identifier is used at most once.
fn creation() -> IRModel {
    IRModel {
        name: "creation".into(),
        rules: vec![IRRule { name: "Create".into(), premises: vec![fact!("Fr", t!("~k"))],
            actions: vec![fact!("OnlyOnce", t!("$gid")), fact!("Created", t!("$gid"), t!("~k"))], ..rule!() }],
        restrictions: vec![IRRestriction {
            name: "only_once".into(),
            formula: forall(&["x", "#i", "#j"], implies(
                IRFormula::And(vec![action(fact!("OnlyOnce", t!("x")), "i"), action(fact!("OnlyOnce", t!("x")), "j")]),
                IRFormula::TimeEq("i".into(), "j".into()))),
            when: flag("unique")
        }],
        lemmas: vec![IRLemma {
            name: "created_twice".into(),
            kind: IRLemmaKind::ExistsTrace,
            formula: exists(&["g", "k1", "k2", "#i", "#j"], IRFormula::And(vec![
                action(fact!("Created", t!("g"), t!("k1")), "i"),
                action(fact!("Created", t!("g"), t!("k2")), "j"),
                IRFormula::Less("i".into(), "j".into())
            ])),
            tactic: None,
            when: None
        }],
        ..IRModel::default()
    }
}

#[test]
fn only_once_identifiers_are_never_reused() {
    let unrestricted = run(&creation(), &[]);
    let twice = lemma(&unrestricted, "created_twice");
    assert_eq!(twice.verdict, "proven");
    assert_eq!(rules(twice), vec!["Create", "Create"]);

    let restricted = run(&creation(), &["unique"]);
    assert_eq!(lemma(&restricted, "created_twice").verdict, "falsified");
}

#[test]
fn json_models_give_the_same_verdicts() {
    let ir = accountability();
    let json = ir.to_json().unwrap();
    let back = IRModel::from_json(&json).unwrap();
    assert_eq!(back, ir);
    assert_eq!(run(&back, &["compromise"]), run(&ir, &["compromise"]));
}

#[test]
fn single_lemmas_can_be_selected() {
    let config = Config::default();
    let report = check(&threshold(), &config, Some("group_signature_reachable")).unwrap();
    assert_eq!(report.lemmas.len(), 1);
    assert_eq!(report.lemmas[0].name, "group_signature_reachable");
}

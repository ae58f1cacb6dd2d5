use crate::fact::*;
use crate::formula::*;
use crate::heuristic::is_deferred;
use crate::model::Model;
use crate::system::*;
use crate::term::*;

/// Solves goal `index` of `system`, returning one simplified system per alternative.
pub fn expand(mut system: System, index: usize, model: &Model) -> Branches {
    let OpenGoal { goal, .. } = system.goals.remove(index);
    let mut out = Branches::dead();
    match goal {
        Goal::Split(formula) => split(system, formula, model, &mut out),
        Goal::Action { fact, time } => action(system, fact, time, model, &mut out),
        Goal::Premise { node, idx } => premise(system, node, idx, model, &mut out),
        Goal::Knows { term, before } => knows(system, term, before, model, &mut out),
        Goal::Chain { from, to, before } => chain(system, from, to, before, model, &mut out)
    }

    let mut result = Branches { systems: Vec::new(), lossy: out.lossy };
    for system in out.systems {
        result.extend(system.simplify(model));
    }
    result
}

fn split(mut system: System, formula: Nnf, model: &Model, out: &mut Branches) {
    match formula {
        Nnf::True => out.push(system),
        Nnf::False => {}
        Nnf::And(parts) => {
            for part in parts { system.push_goal(Goal::Split(part)) }
            out.push(system);
        }
        Nnf::Or(parts) => for part in parts {
            let mut branch = system.clone();
            branch.push_goal(Goal::Split(part));
            out.push(branch);
        },
        Nnf::Exists(binders, body) => {
            let (_, binding) = rename_binders(&binders, &mut system.supply);
            system.push_goal(Goal::Split(body.instantiate(&binding)));
            out.push(system);
        }
        Nnf::Guarded(guarded) => {
            system.guarded.push(guarded);
            out.push(system);
        }
        Nnf::NotEq(s, t) => {
            system.diseqs.push((s, t));
            out.push(system);
        }
        Nnf::Atom(atom) => match atom {
            Atom::Action(fact, time) => {
                system.push_goal(Goal::Action { fact, time });
                out.push(system);
            }
            Atom::Knows(term, time) => {
                system.push_goal(Goal::Action { fact: Fact::linear(Pred::knows(), vec![term]), time });
                out.push(system);
            }
            Atom::Less(i, j) => {
                system.less.insert((i, j));
                out.push(system);
            }
            Atom::TEq(i, j) => {
                system.union(&i, &j);
                out.push(system);
            }
            Atom::Eq(s, t) => out.extend(system.unify(&[(s, t)], &model.theories))
        }
    }
}

fn same_shape(a: &Fact, b: &Fact) -> bool {
    a.pred == b.pred && a.args.len() == b.args.len()
}

/// An action is emitted by the node on its timepoint, by an existing node moved there, or by a new node.
fn action(system: System, fact: Fact, time: TVar, model: &Model, out: &mut Branches) {
    let theories = &model.theories;
    if let Some(id) = system.node_at(&time) {
        let Some(node) = system.node(id) else { return };
        for emitted in node.actions.iter().filter(|a| same_shape(a, &fact)) {
            out.extend(system.clone().unify(&fact.equations(emitted), theories));
        }
        return;
    }

    for (_, node) in system.iter_nodes() {
        for emitted in node.actions.iter().filter(|a| same_shape(a, &fact)) {
            let mut branch = system.clone();
            branch.union(&time, &node.time);
            out.extend(branch.unify(&fact.equations(emitted), theories));
        }
    }
    for &(rule, a) in model.emitters(fact.pred) {
        let mut branch = system.clone();
        let id = branch.add_node(model, rule, Some(time.clone()));
        let Some(emitted) = branch.node(id).and_then(|n| n.actions.get(a)).cloned() else { continue };
        if !same_shape(&emitted, &fact) { continue }
        out.extend(branch.unify(&fact.equations(&emitted), theories));
    }
}

/// A premise is provided by a conclusion of an existing node or of a new one.
fn premise(system: System, node: NodeId, idx: usize, model: &Model, out: &mut Branches) {
    let theories = &model.theories;
    let Some(wanted) = system.node(node).and_then(|n| n.premises.get(idx)).cloned() else {
        out.push(system);
        return;
    };

    for (id, producer) in system.iter_nodes() {
        if id == node { continue }
        for (c, conclusion) in producer.conclusions.iter().enumerate() {
            if !conclusion.same_kind(&wanted) { continue }
            let mut branch = system.clone();
            branch.add_edge((id, c), (node, idx));
            out.extend(branch.unify(&wanted.equations(conclusion), theories));
        }
    }
    for &(rule, c) in model.producers(wanted.pred) {
        let mut branch = system.clone();
        let id = branch.add_node(model, rule, None);
        let Some(conclusion) = branch.node(id).and_then(|n| n.conclusions.get(c)).cloned() else { continue };
        if !conclusion.same_kind(&wanted) { continue }
        branch.add_edge((id, c), (node, idx));
        out.extend(branch.unify(&wanted.equations(&conclusion), theories));
    }
}

/// The adversary knows a public value, constructs the term with a public symbol,
/// or deconstructs it out of a message some rule sent.
fn knows(mut system: System, term: Term, before: TVar, model: &Model, out: &mut Branches) {
    match &term {
        Term::Name(Name::Pub(_)) => return out.push(system),
        Term::Var(v) if v.sort == Sort::Pub => return out.push(system),
        Term::Var(v) if v.sort == Sort::Msg => {
            system.push_goal(Goal::Knows { term, before });
            return out.push(system);
        }
        _ => {}
    }

    if term.head().is_some_and(|f| model.signature.is_public(f)) {
        for parts in model.theories.decompose(&term) {
            let mut branch = system.clone();
            for part in parts {
                branch.push_goal(Goal::Knows { term: part, before: before.clone() });
            }
            out.push(branch);
        }
    }

    let output = Pred::output();
    let sent: Vec<(TVar, Term)> = system.iter_nodes()
        .flat_map(|(_, n)| n.conclusions.iter().filter(|c| c.pred == output).flat_map(move |c| c.args.iter().map(move |t| (n.time.clone(), t.clone()))))
        .collect();
    for (time, message) in sent {
        let mut branch = system.clone();
        branch.less.insert((time, before.clone()));
        branch.push_goal(Goal::Chain { from: message, to: term.clone(), before: before.clone() });
        out.push(branch);
    }
    for &(rule, c) in model.producers(output) {
        let mut branch = system.clone();
        let id = branch.add_node(model, rule, None);
        let Some(node) = branch.node(id) else { continue };
        let time = node.time.clone();
        let messages = node.conclusions.get(c).map(|f| f.args.clone()).unwrap_or_default();
        for message in messages {
            let mut sender = branch.clone();
            sender.less.insert((time.clone(), before.clone()));
            sender.push_goal(Goal::Chain { from: message, to: term.clone(), before: before.clone() });
            out.push(sender);
        }
    }
}

/// Deconstruction either reaches the wanted term or takes one more extraction step.
fn chain(mut system: System, from: Term, to: Term, before: TVar, model: &Model, out: &mut Branches) {
    let theories = &model.theories;
    out.extend(system.clone().unify(&[(from.clone(), to.clone())], theories));
    if from.is_var() {
        // The variable can no longer become a message to deconstruct unless other goals remain.
        out.lossy |= system.goals.iter().any(|open| !is_deferred(&open.goal));
        return;
    }

    for extraction in theories.extract(&from, &mut system.supply) {
        let mut branch = system.clone();
        for side in extraction.side {
            branch.push_goal(Goal::Knows { term: side, before: before.clone() });
        }
        branch.push_goal(Goal::Chain { from: extraction.output, to: to.clone(), before: before.clone() });
        out.extend(branch.unify(&extraction.eqs, theories));
    }
}

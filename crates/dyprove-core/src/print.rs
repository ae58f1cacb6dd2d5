use crate::fact::Fact;
use crate::term::*;
use crate::trace::{Step, Trace};
use std::fmt;

/// A value paired with the signature its function symbols are named in.
pub struct Show<'a, T: ?Sized> {
    pub sig: &'a Signature,
    pub value: &'a T
}

pub fn show<'a, T: ?Sized>(sig: &'a Signature, value: &'a T) -> Show<'a, T> {
    Show { sig, value }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sort {
            Sort::Fresh => write!(f, "~")?,
            Sort::Pub => write!(f, "$")?,
            Sort::Msg => {}
        }
        write!(f, "{}", self.name)?;
        if self.idx > 0 { write!(f, ".{}", self.idx)? }
        Ok(())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Name::Pub(name) => write!(f, "'{}'", name),
            Name::Fresh(name, 0) => write!(f, "~{}", name),
            Name::Fresh(name, idx) => write!(f, "~{}.{}", name, idx)
        }
    }
}

fn infix(head: FunId) -> Option<&'static str> {
    match head {
        EXP => Some("^"),
        MULT => Some("*"),
        XOR => Some("⊕"),
        UNION => Some("++"),
        _ => None
    }
}

fn list<'a, T>(f: &mut fmt::Formatter<'_>, sig: &'a Signature, items: &'a [T]) -> fmt::Result where Show<'a, T>: fmt::Display {
    for (i, item) in items.iter().enumerate() {
        if i > 0 { write!(f, ", ")? }
        write!(f, "{}", show(sig, item))?;
    }
    Ok(())
}

impl fmt::Display for Show<'_, Term> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Term::Var(v) => write!(f, "{}", v),
            Term::Name(n) => write!(f, "{}", n),
            Term::App(PAIR, args) if args.len() == 2 => {
                write!(f, "<")?;
                list(f, self.sig, args)?;
                write!(f, ">")
            }
            Term::App(head, args) if args.len() == 2 && infix(*head).is_some() => {
                let op = infix(*head).unwrap_or_default();
                let operand = |t: &Term| if t.args().is_empty() { format!("{}", show(self.sig, t)) } else { format!("({})", show(self.sig, t)) };
                write!(f, "{}{}{}", operand(&args[0]), op, operand(&args[1]))
            }
            Term::App(head, args) if args.is_empty() => write!(f, "{}", self.sig.name(*head)),
            Term::App(head, args) => {
                write!(f, "{}(", self.sig.name(*head))?;
                list(f, self.sig, args)?;
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Show<'_, Fact> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value.is_persistent() { write!(f, "!")? }
        write!(f, "{}(", self.value.pred.name())?;
        list(f, self.sig, &self.value.args)?;
        write!(f, ")")
    }
}

impl fmt::Display for Show<'_, Step> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = self.value;
        write!(f, "{}", step.rule)?;
        if !step.actions.is_empty() {
            write!(f, " --[")?;
            list(f, self.sig, &step.actions)?;
            write!(f, "]->")?;
        }
        if !step.subst.is_empty() {
            write!(f, " with ")?;
            for (i, (v, t)) in step.subst.iter().enumerate() {
                if i > 0 { write!(f, ", ")? }
                write!(f, "{} = {}", v, show(self.sig, t))?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Show<'_, Trace> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.value.steps.iter().enumerate() {
            writeln!(f, "#{}: {}", i, show(self.sig, step))?;
        }
        Ok(())
    }
}

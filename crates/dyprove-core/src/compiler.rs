use crate::model::ModelError;
use crate::term::*;
use crate::theory::syntactic::RewriteRule;
use crate::theory::Builtins;

/// The names accepted by `builtin_pack`.
pub const BUILTIN_PACKS: [&str; 7] = [
    "hashing", "signing", "symmetric-encryption", "asymmetric-encryption", "diffie-hellman", "xor", "multiset"
];

/// What a builtin contributes to a model: equations over the symbols it declares, and theory flags.
#[derive(Debug, Clone, Default)]
pub struct Pack {
    pub equations: Vec<RewriteRule>,
    pub builtins: Builtins
}

impl Pack {
    /// Adds the contribution of `other`.
    pub fn merge(&mut self, other: Pack) {
        for equation in other.equations {
            if !self.equations.iter().any(|e| e.name == equation.name) {
                self.equations.push(equation);
            }
        }
        self.builtins.diffie_hellman |= other.builtins.diffie_hellman;
        self.builtins.xor |= other.builtins.xor;
        self.builtins.multiset |= other.builtins.multiset;
    }
}

fn public(signature: &mut Signature, name: &str, arity: usize) -> Result<FunId, ModelError> {
    signature.declare(name, arity, Visibility::Public)
}

fn equation(name: &str, lhs: Term, rhs: Term) -> RewriteRule {
    RewriteRule { name: name.to_string(), lhs, rhs }
}

/// Declares the symbols of builtin `name` in `signature` and returns its equations.
/// Packs sharing a symbol (`pk`) may be combined.
pub fn builtin_pack(name: &str, signature: &mut Signature) -> Result<Pack, ModelError> {
    let m = Term::Var(Var::msg("m"));
    let k = Term::Var(Var::msg("k"));
    let mut pack = Pack::default();
    match name {
        "hashing" => {
            public(signature, "h", 1)?;
        }
        "signing" => {
            let sign = public(signature, "sign", 2)?;
            let verify = public(signature, "verify", 3)?;
            let pk = public(signature, "pk", 1)?;
            let get_message = public(signature, "getMessage", 1)?;
            let ok = public(signature, "true", 0)?;
            let signed = Term::app(sign, vec![m.clone(), k.clone()]);
            pack.equations.push(equation("verify",
                Term::app(verify, vec![signed.clone(), m.clone(), Term::app(pk, vec![k])]), Term::constant(ok)));
            pack.equations.push(equation("getMessage", Term::app(get_message, vec![signed]), m));
        }
        "symmetric-encryption" => {
            let senc = public(signature, "senc", 2)?;
            let sdec = public(signature, "sdec", 2)?;
            pack.equations.push(equation("sdec",
                Term::app(sdec, vec![Term::app(senc, vec![m.clone(), k.clone()]), k]), m));
        }
        "asymmetric-encryption" => {
            let aenc = public(signature, "aenc", 2)?;
            let adec = public(signature, "adec", 2)?;
            let pk = public(signature, "pk", 1)?;
            let sealed = Term::app(aenc, vec![m.clone(), Term::app(pk, vec![k.clone()])]);
            pack.equations.push(equation("adec", Term::app(adec, vec![sealed, k]), m));
        }
        "diffie-hellman" => pack.builtins.diffie_hellman = true,
        "xor" => pack.builtins.xor = true,
        "multiset" => pack.builtins.multiset = true,
        _ => return Err(ModelError::UnknownBuiltin(name.to_string()))
    }
    Ok(pack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theory::{EquationalOracle, Theories};

    #[test]
    fn encryption_packs_share_public_keys() {
        let mut signature = Signature::new();
        let mut pack = builtin_pack("signing", &mut signature).unwrap();
        pack.merge(builtin_pack("asymmetric-encryption", &mut signature).unwrap());
        assert_eq!(pack.equations.len(), 3);
        let theories = Theories::new(&signature, pack.equations, pack.builtins).unwrap();

        let (aenc, adec, pk) = (signature.lookup("aenc").unwrap(), signature.lookup("adec").unwrap(), signature.lookup("pk").unwrap());
        let key = Term::pub_name("sk");
        let sealed = Term::app(aenc, vec![Term::pub_name("msg"), Term::app(pk, vec![key.clone()])]);
        assert_eq!(theories.normalize(&Term::app(adec, vec![sealed, key])), Term::pub_name("msg"));
    }

    #[test]
    fn unknown_packs_are_rejected() {
        let mut signature = Signature::new();
        assert_eq!(builtin_pack("bilinear-pairing", &mut signature).unwrap_err(), ModelError::UnknownBuiltin("bilinear-pairing".into()));
    }

    #[test]
    fn theory_packs_set_flags() {
        let mut signature = Signature::new();
        let pack = builtin_pack("diffie-hellman", &mut signature).unwrap();
        assert!(pack.builtins.diffie_hellman && pack.equations.is_empty());
    }
}

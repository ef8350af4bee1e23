//! Linear combinations over circuit variables with small integer coefficients.

use ark_bn254::Fr;
use common::field_conversion::fr_from_i64;
use serde::{Deserialize, Serialize};

/// A circuit variable. Inputs and auxiliaries are numbered in allocation order;
/// `Constant` is the implicit one-valued slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Variable {
    Input(usize),
    Auxiliary(usize),
    Constant,
}

#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term(pub Variable, pub i64);

/// Sum of terms; each variable appears at most once.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LC(Vec<Term>);

/// Sparse row over the full assignment `z`, with field coefficients.
pub type SparseTerms = Vec<(usize, Fr)>;

impl LC {
    pub fn new(terms: Vec<Term>) -> Self {
        debug_assert!(
            terms
                .iter()
                .enumerate()
                .all(|(i, term)| terms[..i].iter().all(|earlier| earlier.0 != term.0)),
            "repeated variable in {terms:?}"
        );
        LC(terms)
    }

    pub fn zero() -> Self {
        LC::new(vec![])
    }

    pub fn constant(value: i64) -> Self {
        LC::new(vec![Term(Variable::Constant, value)])
    }

    pub fn terms(&self) -> &[Term] {
        &self.0
    }

    pub fn num_terms(&self) -> usize {
        self.0.len()
    }

    /// Resolves each variable to its slot in the assignment.
    pub fn to_sparse(&self, slot: impl Fn(Variable) -> usize) -> SparseTerms {
        self.0
            .iter()
            .filter(|term| term.1 != 0)
            .map(|term| (slot(term.0), fr_from_i64(term.1)))
            .collect()
    }
}

/// Evaluates a sparse row against an assignment. Callers guarantee the slots are in bounds.
pub fn evaluate_sparse(terms: &[(usize, Fr)], z: &[Fr]) -> Fr {
    terms.iter().map(|&(slot, coeff)| z[slot] * coeff).sum()
}

impl std::fmt::Debug for LC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return f.write_str("0");
        }
        let rendered: Vec<String> = self
            .0
            .iter()
            .map(|Term(variable, coeff)| match variable {
                Variable::Constant => coeff.to_string(),
                _ => format!("{coeff}*{variable:?}"),
            })
            .collect();
        f.write_str(&rendered.join(" + "))
    }
}

impl std::fmt::Debug for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", LC::from(*self))
    }
}

impl LC {
    /// `self + sign * other`, merging coefficients of repeated variables.
    fn combine(mut self, other: LC, sign: i64) -> LC {
        for Term(variable, coeff) in other.0 {
            match self.0.iter_mut().find(|term| term.0 == variable) {
                Some(existing) => existing.1 += sign * coeff,
                None => self.0.push(Term(variable, sign * coeff)),
            }
        }
        LC::new(self.0)
    }
}

macro_rules! impl_lc_arithmetic {
    ($($lhs:ty, $rhs:ty);* $(;)?) => {
        $(
            impl std::ops::Add<$rhs> for $lhs {
                type Output = LC;

                fn add(self, rhs: $rhs) -> LC {
                    LC::from(self).combine(LC::from(rhs), 1)
                }
            }

            impl std::ops::Sub<$rhs> for $lhs {
                type Output = LC;

                fn sub(self, rhs: $rhs) -> LC {
                    LC::from(self).combine(LC::from(rhs), -1)
                }
            }
        )*
    };
}

impl_lc_arithmetic! {
    LC, LC;
    LC, Variable;
    Variable, LC;
    Variable, Variable;
}

impl std::ops::Neg for LC {
    type Output = LC;

    fn neg(self) -> LC {
        LC::zero().combine(self, -1)
    }
}

impl std::ops::Mul<i64> for Variable {
    type Output = Term;

    fn mul(self, coeff: i64) -> Term {
        Term(self, coeff)
    }
}

impl From<Variable> for LC {
    fn from(variable: Variable) -> Self {
        LC::new(vec![Term(variable, 1)])
    }
}

impl From<Term> for LC {
    fn from(term: Term) -> Self {
        LC::new(vec![term])
    }
}

impl From<i64> for LC {
    fn from(value: i64) -> Self {
        LC::constant(value)
    }
}

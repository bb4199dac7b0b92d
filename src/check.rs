//! The nonzero-output property: a call whose inputs satisfy the session's
//! preconditions must never return zero.

use std::fmt;

use itertools::Itertools;
use num::BigUint;
use z3::ast::{Ast, BV};

use crate::abi::deserialize;
use crate::error::{Error, Result};
use crate::session::Session;
use crate::ty::{Type, WORD_BITS};
use crate::world::TxResult;

/// Concrete inputs under which the checked function returns `output`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counterexample {
  pub function: String,
  /// Input names and values, in declared order.
  pub inputs: Vec<(String, BigUint)>,
  pub output: BigUint,
}

impl Counterexample {
  pub fn input(&self, name: &str) -> Option<&BigUint> {
    self.inputs.iter().find(|(n, _)| n == name).map(|(_, v)| v)
  }
}

impl fmt::Display for Counterexample {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f, "{}({}) -> {}",
      self.function, self.inputs.iter().map(|(_, v)| v).format(", "), self.output
    )
  }
}

/// Visit every ready state of `session` and look for one where the last
/// transaction can return zero, decoded as `return_type`.
///
/// Every ready state must hold exactly the deployment and the call, and the
/// call must have returned; anything else is an [`Error::Invariant`].
/// An empty result means no violation was found within the exploration bound.
pub fn check_nonzero_output<'ctx>(
  session: &mut Session<'ctx>,
  function: &str,
  inputs: &[(String, BV<'ctx>)],
  return_type: Type,
) -> Result<Vec<Counterexample>> {
  let ctx = session.get_ctx();
  let mut found = Vec::new();
  for (i, st) in session.ready_states_mut().iter_mut().enumerate() {
    let txs = st.transactions();
    if txs.len() != 2 {
      return Err(Error::Invariant(format!(
        "ready state {} has {} transactions, expected 2", i, txs.len()
      )));
    }
    let tx = &txs[1];
    if tx.result != TxResult::Return {
      return Err(Error::Invariant(format!(
        "ready state {} ended with {}, expected {}", i, tx.result, TxResult::Return
      )));
    }
    let ret = deserialize(return_type.abi_name(), &tx.return_data)?.to_word();
    let is_zero = ret._eq(&BV::from_u64(ctx, 0, WORD_BITS));
    if !st.can_be_true(&is_zero)? {
      tracing::debug!(state = i, "output is never zero");
      continue;
    }
    st.constrain(is_zero);
    let symbols: Vec<&BV<'ctx>> = inputs.iter().map(|(_, bv)| bv).collect();
    let values = st.solve_one_n(&symbols, true)?;
    let output = st.solve_one(&ret)?;
    let counterexample = Counterexample {
      function: function.to_string(),
      inputs: inputs.iter().map(|(name, _)| name.clone()).zip(values).collect(),
      output,
    };
    tracing::info!(state = i, %counterexample, "zero output is reachable");
    found.push(counterexample);
  }
  Ok(found)
}

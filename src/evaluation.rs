use std::time::Instant;

use symbolic_evaluation::evaluation::{eval as sym_eval, Exploration};

use crate::state::{EvmState, EvmStateSet};

/// Run one transaction to completion, smallest trail first: at every fork the
/// not-taken side is explored before the taken side.
/// Exploration stops once `deadline` passes; the states finished by then are returned.
/// Without a deadline it runs until every path ends.
pub fn explore<'prog, 'ctx>(
  init_state: EvmState<'prog, 'ctx>,
  deadline: Option<Instant>,
) -> (Vec<EvmState<'prog, 'ctx>>, Exploration) {
  let mut finals = Vec::new();
  let exploration = sym_eval(
    init_state,
    |x: &EvmStateSet| x.first(),
    |x| {
      tracing::trace!("final state\n{}", x);
      finals.push(x)
    },
    || deadline.map_or(true, |d| Instant::now() < d),
  );
  if let Exploration::Interrupted { pending } = exploration {
    tracing::warn!(pending, finished = finals.len(), "exploration deadline reached");
  }
  (finals, exploration)
}

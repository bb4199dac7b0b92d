//! A generic symbolic execution algorithm.

use crate::traits::{State, Transition, StateSet};

/// How an exploration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exploration {
  /// Every reachable state was visited.
  Exhausted,
  /// `keep_going` returned false; `pending` states were left unexplored.
  Interrupted { pending: usize },
}

impl Exploration {
  pub fn is_exhausted(&self) -> bool {
    matches!(self, Exploration::Exhausted)
  }
}

pub fn eval<T, S, F, G, H>(init_state: T, pick_next: F, mut report: G, mut keep_going: H) -> Exploration
  where
    T: State + Transition,
    S: StateSet<T>,
    F: Fn(&S) -> Option<T>,
    G: FnMut(T),
    H: FnMut() -> bool,
{
  let mut frontier = S::new();
  if init_state.is_final() {
    report(init_state);
    return Exploration::Exhausted;
  }
  frontier.insert(init_state);
  while let Some(next) = pick_next(&frontier) {
    if !keep_going() {
      return Exploration::Interrupted { pending: frontier.len() };
    }
    let state = match frontier.remove(&next) {
      Some(state) => state,
      None => break,
    };
    for s in state.suc() {
      if s.is_final() {
        report(s);
      } else {
        frontier.insert(s);
      }
    }
  }
  Exploration::Exhausted
}

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{BitAnd, Index, IndexMut};

use itertools::Itertools;
use symbolic_evaluation::traits::{State, StateSet, Transition};
use z3::{ast::{Ast, Bool}, Context};

use crate::bytecode::{Bytecode, CodeOffset, Label, TempIndex};
use crate::config::OverflowMode;
use crate::constraint::{sat, Constraint};
use crate::contract::{Contract, Function};
use crate::dynamic;
use crate::value::Value;
use crate::world::TxResult;

mod frame;
mod termination;

pub use frame::Frame;
pub use termination::TerminationStatus;

/// One point of the execution of a single transaction.
#[derive(Clone)]
pub struct EvmState<'prog, 'ctx> {
  context: &'ctx Context,
  contract: &'prog Contract,
  /// Call stack, innermost last.
  pub(crate) frames: Vec<Frame<'prog, 'ctx>>,
  /// Path constraint
  pc: Constraint<'ctx>,
  gas_limit: u64,
  gas_left: u64,
  overflow: OverflowMode,
  ts: TerminationStatus<'ctx>,
  /// Branch decisions taken so far; identifies the state among its siblings.
  trail: Vec<bool>,
}

impl<'prog, 'ctx> BitAnd<Constraint<'ctx>> for EvmState<'prog, 'ctx> {
  type Output = Self;

  fn bitand(self, rhs: Constraint<'ctx>) -> Self::Output {
    EvmState {
      pc: (&self.pc & &rhs).simplify(),
      ..self
    }
  }
}

impl<'prog, 'ctx> PartialEq for EvmState<'prog, 'ctx> {
  fn eq(&self, other: &Self) -> bool {
    self.trail == other.trail
  }
}

impl<'prog, 'ctx> Eq for EvmState<'prog, 'ctx> { }

/// `EvmState` is ordered by its trail, so the first state of a set is the
/// leftmost leaf of the fork tree, with not-taken (`false`) sides on the left.
impl<'prog, 'ctx> PartialOrd for EvmState<'prog, 'ctx> {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl<'prog, 'ctx> Ord for EvmState<'prog, 'ctx> {
  fn cmp(&self, other: &Self) -> Ordering {
    self.trail.cmp(&other.trail)
  }
}

/// Forked states are never merged: each of them ends up with a transaction
/// record of its own.
impl<'prog, 'ctx> State for EvmState<'prog, 'ctx> {
  fn merge(self, _other: Self) -> Option<Self> {
    None
  }
}

impl<'prog, 'ctx> Transition for EvmState<'prog, 'ctx> {
  type IntoIter = Vec<EvmState<'prog, 'ctx>>;

  fn suc(self) -> Vec<EvmState<'prog, 'ctx>> {
    assert!(!self.is_final());
    dynamic::step(self)
  }

  fn is_final(&self) -> bool {
    self.ts.is_final()
  }
}

impl<'prog, 'ctx> EvmState<'prog, 'ctx> {
  /// Enter `entry` of `contract` with `args`, under the path constraint `pc`.
  pub fn new(
    context: &'ctx Context,
    contract: &'prog Contract,
    entry: &'prog Function,
    args: Vec<Value<'ctx>>,
    pc: Constraint<'ctx>,
    gas_limit: u64,
    overflow: OverflowMode,
  ) -> Self {
    Self {
      context,
      contract,
      frames: vec![Frame::new(context, entry, args, Vec::new())],
      pc,
      gas_limit,
      gas_left: gas_limit,
      overflow,
      ts: TerminationStatus::None,
      trail: Vec::new(),
    }
  }

  pub fn get_ctx(&self) -> &'ctx Context {
    self.context
  }

  pub fn contract(&self) -> &'prog Contract {
    self.contract
  }

  /// Return the path constraint.
  pub fn pc(&self) -> &Constraint<'ctx> {
    &self.pc
  }

  /// Return the termination status.
  pub fn termination_status(&self) -> &TerminationStatus<'ctx> {
    &self.ts
  }

  pub fn tx_result(&self) -> Option<TxResult> {
    self.ts.tx_result()
  }

  pub fn trail(&self) -> &[bool] {
    &self.trail
  }

  pub fn gas_used(&self) -> u64 {
    self.gas_limit - self.gas_left
  }

  pub fn overflow_mode(&self) -> OverflowMode {
    self.overflow
  }

  pub(crate) fn terminate(&mut self, ts: TerminationStatus<'ctx>) {
    self.ts = ts;
  }

  /// Deduct `cost`; false (and out of gas) when it cannot be paid.
  pub(crate) fn charge(&mut self, cost: u64) -> bool {
    if self.gas_left < cost {
      self.gas_left = 0;
      self.ts = TerminationStatus::OutOfGas;
      false
    } else {
      self.gas_left -= cost;
      true
    }
  }

  pub(crate) fn frame(&self) -> &Frame<'prog, 'ctx> {
    // a running state always has a frame
    self.frames.last().expect("no active frame")
  }

  pub(crate) fn frame_mut(&mut self) -> &mut Frame<'prog, 'ctx> {
    self.frames.last_mut().expect("no active frame")
  }

  /// Split on `cond`. A side that is unsatisfiable under the path constraint
  /// is kept as an `Unsat` state; a side that is trivially false is dropped.
  pub(crate) fn fork(self, cond: &Bool<'ctx>) -> (Option<Self>, Option<Self>) {
    match cond.simplify().as_bool() {
      Some(true) => return (Some(self), None),
      Some(false) => return (None, Some(self)),
      None => {}
    }
    let mut taken = self.clone() & cond.clone();
    let mut not_taken = self & !cond;
    taken.trail.push(true);
    not_taken.trail.push(false);
    for s in [&mut taken, &mut not_taken] {
      if !sat(&s.pc) {
        tracing::trace!(trail = ?s.trail, "pruned unsatisfiable path");
        s.ts = TerminationStatus::Unsat;
      }
    }
    (Some(taken), Some(not_taken))
  }
}

impl<'prog, 'ctx> fmt::Display for EvmState<'prog, 'ctx> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "state [{}] {}", self.trail.iter().map(|&b| if b { '1' } else { '0' }).join(""), self.ts)?;
    writeln!(f, "path: {}", self.pc)?;
    for frame in self.frames.iter().rev() {
      write!(f, "{}", frame)?;
    }
    Ok(())
  }
}

/// The exploration frontier.
pub struct EvmStateSet<'prog, 'ctx>(BTreeSet<EvmState<'prog, 'ctx>>);

impl<'prog, 'ctx> EvmStateSet<'prog, 'ctx> {
  pub fn first(&self) -> Option<EvmState<'prog, 'ctx>> {
    self.0.iter().next().cloned()
  }
}

impl<'prog, 'ctx> StateSet<EvmState<'prog, 'ctx>> for EvmStateSet<'prog, 'ctx> {
  fn new() -> Self {
    Self(BTreeSet::new())
  }

  fn insert(&mut self, s: EvmState<'prog, 'ctx>) {
    if self.0.contains(&s) {
      // trails are unique, and states are never merged
      tracing::warn!(trail = ?s.trail, "dropping a state with a duplicate trail");
    } else {
      self.0.insert(s);
    }
  }

  fn remove(&mut self, s: &EvmState<'prog, 'ctx>) -> Option<EvmState<'prog, 'ctx>> {
    self.0.take(s)
  }

  fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  fn len(&self) -> usize {
    self.0.len()
  }
}

//! An exploration session: accounts, deployed contracts, symbolic inputs,
//! and the execution states reached by the transactions applied so far.

use std::collections::BTreeMap;
use std::time::Instant;

use num::BigUint;
use z3::{
  ast::{Ast, Bool, BV},
  Context, SatResult,
};

use crate::abi::{decode_params, encode_args, encode_values};
use crate::config::{OutOfGasMode, SolverConfig};
use crate::constraint::{conjunction, Constraint};
use crate::context::new_solver;
use crate::contract::{Contract, Visibility};
use crate::error::{Error, Result};
use crate::evaluation::explore;
use crate::state::{EvmState, TerminationStatus};
use crate::value::{bv_from_biguint, biguint_from_bv};
use crate::world::{Account, Address, Transaction, TxKind, TxResult, World};

/// A state between transactions: its transaction record plus the constraints
/// accumulated along the way.
#[derive(Clone)]
pub struct ExecutionState<'ctx> {
  context: &'ctx Context,
  config: SolverConfig,
  pub(crate) world: World<'ctx>,
  constraints: Vec<Constraint<'ctx>>,
}

impl<'ctx> ExecutionState<'ctx> {
  fn new(context: &'ctx Context, config: SolverConfig) -> Self {
    Self { context, config, world: World::new(), constraints: Vec::new() }
  }

  pub fn world(&self) -> &World<'ctx> {
    &self.world
  }

  /// User transactions applied to this state, oldest first.
  pub fn transactions(&self) -> &[Transaction<'ctx>] {
    self.world.human_transactions()
  }

  pub fn constraints(&self) -> &[Constraint<'ctx>] {
    &self.constraints
  }

  /// Add `constraint` to this state only.
  pub fn constrain(&mut self, constraint: Constraint<'ctx>) {
    self.constraints.push(constraint);
  }

  fn solver(&self) -> z3::Solver<'ctx> {
    let solver = new_solver(self.context, &self.config);
    for c in &self.constraints {
      solver.assert(c);
    }
    solver
  }

  /// Whether `cond` is satisfiable together with the state constraints.
  pub fn can_be_true(&self, cond: &Bool<'ctx>) -> Result<bool> {
    let solver = self.solver();
    solver.assert(cond);
    match solver.check() {
      SatResult::Sat => Ok(true),
      SatResult::Unsat => Ok(false),
      SatResult::Unknown => Err(Error::SolverUnknown(
        solver.get_reason_unknown().unwrap_or_else(|| "unknown".to_string()),
      )),
    }
  }

  /// One concrete value `expr` may take in this state.
  pub fn solve_one(&self, expr: &BV<'ctx>) -> Result<BigUint> {
    let mut values = self.solve(&[expr])?;
    values.pop().ok_or(Error::Unsat)
  }

  /// Concrete values for `exprs` from a single model. With `constrain`, the
  /// state is further constrained to that assignment, so later queries agree
  /// with it.
  pub fn solve_one_n(&mut self, exprs: &[&BV<'ctx>], constrain: bool) -> Result<Vec<BigUint>> {
    let values = self.solve(exprs)?;
    if constrain {
      for (expr, value) in exprs.iter().zip(values.iter()) {
        let pinned = expr._eq(&bv_from_biguint(self.context, value, expr.get_size()));
        self.constrain(pinned);
      }
    }
    Ok(values)
  }

  fn solve(&self, exprs: &[&BV<'ctx>]) -> Result<Vec<BigUint>> {
    let solver = self.solver();
    match solver.check() {
      SatResult::Sat => {}
      SatResult::Unsat => return Err(Error::Unsat),
      SatResult::Unknown => {
        return Err(Error::SolverUnknown(
          solver.get_reason_unknown().unwrap_or_else(|| "unknown".to_string()),
        ))
      }
    }
    let model = solver.get_model()
      .ok_or_else(|| Error::SolverUnknown("no model".to_string()))?;
    exprs.iter()
      .map(|expr| {
        model.eval(*expr, true)
          .and_then(|v| biguint_from_bv(&v))
          .ok_or_else(|| Error::SolverUnknown(format!("no value for {}", expr)))
      })
      .collect()
  }
}

/// What a call to [`Session::transact`] did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxSummary {
  /// States that returned, now ready.
  pub ready: usize,
  /// States that reverted or threw.
  pub terminated: usize,
  /// Out-of-gas states, dropped.
  pub out_of_gas: usize,
  /// Infeasible paths.
  pub pruned: usize,
  /// False if the deadline cut the exploration short.
  pub exhausted: bool,
}

/// One exploration.
pub struct Session<'ctx> {
  context: &'ctx Context,
  config: SolverConfig,
  symbols: Vec<BV<'ctx>>,
  constraints: Vec<Constraint<'ctx>>,
  ready: Vec<ExecutionState<'ctx>>,
  terminated: Vec<ExecutionState<'ctx>>,
  contracts: BTreeMap<Address, Contract>,
  next_address: u64,
}

impl<'ctx> Session<'ctx> {
  /// A session with a single, empty ready state.
  pub fn new(context: &'ctx Context, config: SolverConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self {
      context,
      ready: vec![ExecutionState::new(context, config.clone())],
      config,
      symbols: Vec::new(),
      constraints: Vec::new(),
      terminated: Vec::new(),
      contracts: BTreeMap::new(),
      next_address: 0x1000,
    })
  }

  pub fn get_ctx(&self) -> &'ctx Context {
    self.context
  }

  pub fn config(&self) -> &SolverConfig {
    &self.config
  }

  /// Constraints every state has been given through [`Session::constrain`].
  pub fn constraints(&self) -> &[Constraint<'ctx>] {
    &self.constraints
  }

  pub fn ready_states(&self) -> &[ExecutionState<'ctx>] {
    &self.ready
  }

  pub fn ready_states_mut(&mut self) -> &mut [ExecutionState<'ctx>] {
    &mut self.ready
  }

  pub fn terminated_states(&self) -> &[ExecutionState<'ctx>] {
    &self.terminated
  }

  fn fresh_address(&mut self) -> Address {
    let address = Address(self.next_address);
    self.next_address += 1;
    address
  }

  /// Create a user account holding `balance` wei.
  pub fn create_account(&mut self, balance: BigUint) -> Address {
    let address = self.fresh_address();
    for state in self.ready.iter_mut() {
      state.world.add_account(Account { address, balance: balance.clone(), contract: None });
    }
    tracing::debug!(%address, %balance, "account created");
    address
  }

  /// Deploy `contract` from `owner`.
  pub fn create_contract(&mut self, owner: Address, contract: Contract) -> Result<Address> {
    contract.check()?;
    if self.ready.iter().any(|s| s.world.account(owner).is_none()) {
      return Err(Error::Setup(format!("unknown owner account {}", owner)));
    }
    let address = self.fresh_address();
    for state in self.ready.iter_mut() {
      state.world.add_account(Account {
        address,
        balance: BigUint::default(),
        contract: Some(contract.name.clone()),
      });
      state.world.push_transaction(Transaction {
        kind: TxKind::Create,
        caller: owner,
        address,
        function: None,
        data: Vec::new(),
        return_data: Vec::new(),
        result: TxResult::Return,
        gas_used: 0,
      });
    }
    tracing::debug!(contract = %contract.name, %address, %owner, "contract deployed");
    self.contracts.insert(address, contract);
    Ok(address)
  }

  pub fn contract(&self, address: Address) -> Option<&Contract> {
    self.contracts.get(&address)
  }

  /// A fresh symbolic value of `width` bits.
  pub fn make_symbolic_value(&mut self, name: &str, width: u32) -> BV<'ctx> {
    let value = BV::fresh_const(self.context, name, width);
    self.symbols.push(value.clone());
    value
  }

  /// Constrain every ready state.
  pub fn constrain(&mut self, constraint: Constraint<'ctx>) {
    for state in self.ready.iter_mut() {
      state.constrain(constraint.clone());
    }
    self.constraints.push(constraint);
  }

  /// Call `function` of the contract at `address` with `args`, in declared
  /// order, from every ready state.
  ///
  /// Afterwards the ready states are exactly the paths that returned; reverted
  /// and thrown paths move to the terminated states. Infeasible paths vanish.
  /// Out-of-gas paths are dropped, or fail the call under
  /// [`OutOfGasMode::Fatal`].
  pub fn transact(
    &mut self,
    caller: Address,
    address: Address,
    function: &str,
    args: &[BV<'ctx>],
  ) -> Result<TxSummary> {
    let contract = self.contracts.get(&address)
      .ok_or_else(|| Error::Setup(format!("no contract at {}", address)))?;
    let entry = contract.function(function)
      .ok_or_else(|| Error::Setup(format!("`{}` has no function `{}`", contract.name, function)))?;
    if entry.visibility != Visibility::External {
      return Err(Error::Setup(format!("`{}.{}` is not external", contract.name, function)));
    }
    if args.len() != entry.params.len() {
      return Err(Error::Abi(format!(
        "`{}` takes {} arguments, got {}", entry.signature(), entry.params.len(), args.len()
      )));
    }
    let data = encode_args(args)?;
    let params = decode_params(&entry.param_types(), &data)?;
    // a timeout past the end of the clock means no deadline
    let deadline = Instant::now().checked_add(self.config.timeout);
    tracing::debug!(
      function = %entry.signature(), %caller, %address, states = self.ready.len(),
      symbols = self.symbols.len(), "transaction start"
    );

    let mut summary = TxSummary { exhausted: true, ..TxSummary::default() };
    let mut ready = Vec::new();
    for state in std::mem::take(&mut self.ready) {
      let pc = conjunction(self.context, &state.constraints);
      let init = EvmState::new(
        self.context, contract, entry, params.clone(), pc, self.config.gas_limit, self.config.overflow,
      );
      let (finals, exploration) = explore(init, deadline);
      summary.exhausted &= exploration.is_exhausted();
      for end in finals {
        let result = match end.tx_result() {
          None => {
            summary.pruned += 1;
            continue;
          }
          Some(TxResult::OutOfGas) => {
            if self.config.oog == OutOfGasMode::Fatal {
              return Err(Error::OutOfGas { function: function.to_string() });
            }
            tracing::debug!(trail = ?end.trail(), "dropping out-of-gas state");
            summary.out_of_gas += 1;
            continue;
          }
          Some(result) => result,
        };
        let return_data = match end.termination_status() {
          TerminationStatus::Return(vals) => encode_values(vals),
          _ => Vec::new(),
        };
        let mut next = state.clone();
        next.constrain(end.pc().clone());
        next.world.push_transaction(Transaction {
          kind: TxKind::Call,
          caller,
          address,
          function: Some(function.to_string()),
          data: data.clone(),
          return_data,
          result,
          gas_used: end.gas_used(),
        });
        if result.is_success() {
          summary.ready += 1;
          ready.push(next);
        } else {
          summary.terminated += 1;
          self.terminated.push(next);
        }
      }
    }
    self.ready = ready;
    tracing::info!(
      function,
      ready = summary.ready,
      terminated = summary.terminated,
      out_of_gas = summary.out_of_gas,
      pruned = summary.pruned,
      exhausted = summary.exhausted,
      "transaction explored"
    );
    Ok(summary)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::asm::compile;
  use crate::config::OverflowMode;
  use z3::Config;

  const SOURCE: &str = "
    contract Gate
      function check(x: uint8) external returns (uint8)
        var limit: uint8
        var small: bool
        limit = const 10
        small = lt x limit
        br small ok no
      ok:
        ret x
      no:
        revert
      end
      function helper(x: uint8) internal returns (uint8)
        ret x
      end
  ";

  fn deployed<'ctx>(ctx: &'ctx Context, config: SolverConfig) -> (Session<'ctx>, Address, Address) {
    let mut session = Session::new(ctx, config).unwrap();
    let owner = session.create_account(BigUint::from(1u32));
    let contract = compile(SOURCE).unwrap().resolve("Gate").unwrap();
    let address = session.create_contract(owner, contract).unwrap();
    (session, owner, address)
  }

  #[test]
  fn splits_returns_from_reverts() {
    let ctx = Context::new(&Config::new());
    let (mut session, owner, address) = deployed(&ctx, SolverConfig::default());
    let x = session.make_symbolic_value("x", 8);
    let summary = session.transact(owner, address, "check", &[x.clone()]).unwrap();
    assert_eq!(summary.ready, 1);
    assert_eq!(summary.terminated, 1);
    assert!(summary.exhausted);
    let state = &session.ready_states()[0];
    assert_eq!(state.transactions().len(), 2);
    assert_eq!(state.transactions()[0].kind, TxKind::Create);
    assert_eq!(state.transactions()[1].result, TxResult::Return);
    assert_eq!(session.terminated_states()[0].transactions()[1].result, TxResult::Revert);
    assert!(!state.can_be_true(&x.bvuge(&BV::from_u64(&ctx, 10, 8))).unwrap());
  }

  #[test]
  fn global_constraints_prune_paths() {
    let ctx = Context::new(&Config::new());
    let (mut session, owner, address) = deployed(&ctx, SolverConfig::default());
    let x = session.make_symbolic_value("x", 8);
    session.constrain(x.bvugt(&BV::from_u64(&ctx, 20, 8)));
    let summary = session.transact(owner, address, "check", &[x]).unwrap();
    assert_eq!(summary.ready, 0);
    assert_eq!(summary.terminated, 1);
    assert_eq!(summary.pruned, 1);
  }

  #[test]
  fn solving_can_pin_the_model() {
    let ctx = Context::new(&Config::new());
    let (mut session, owner, address) = deployed(&ctx, SolverConfig::default());
    let x = session.make_symbolic_value("x", 8);
    session.constrain(!x._eq(&BV::from_u64(&ctx, 0, 8)));
    session.transact(owner, address, "check", &[x.clone()]).unwrap();
    let state = &mut session.ready_states_mut()[0];
    let first = state.solve_one_n(&[&x], true).unwrap();
    assert!(first[0] > BigUint::from(0u32) && first[0] < BigUint::from(10u32));
    assert_eq!(state.solve_one(&x).unwrap(), first[0]);
    assert!(!state.can_be_true(&!x._eq(&bv_from_biguint(&ctx, &first[0], 8))).unwrap());
  }

  #[test]
  fn rejects_bad_calls() {
    let ctx = Context::new(&Config::new());
    let (mut session, owner, address) = deployed(&ctx, SolverConfig::default());
    let x = session.make_symbolic_value("x", 8);
    assert!(matches!(session.transact(owner, address, "helper", &[x.clone()]), Err(Error::Setup(_))));
    assert!(matches!(session.transact(owner, address, "missing", &[x.clone()]), Err(Error::Setup(_))));
    assert!(matches!(session.transact(owner, Address(1), "check", &[x.clone()]), Err(Error::Setup(_))));
    assert!(matches!(session.transact(owner, address, "check", &[]), Err(Error::Abi(_))));
    let contract = compile(SOURCE).unwrap().resolve("Gate").unwrap();
    assert!(matches!(session.create_contract(Address(2), contract), Err(Error::Setup(_))));
  }

  #[test]
  fn unbounded_timeout_explores_without_a_deadline() {
    let ctx = Context::new(&Config::new());
    let max = u64::MAX.to_string();
    let config = SolverConfig::from_lookup(|key| if key == "SMT_TIMEOUT" { Some(max.clone()) } else { None }).unwrap();
    let (mut session, owner, address) = deployed(&ctx, config);
    let x = session.make_symbolic_value("x", 8);
    let summary = session.transact(owner, address, "check", &[x]).unwrap();
    assert!(summary.exhausted);
    assert_eq!(summary.ready, 1);
    assert_eq!(summary.terminated, 1);
  }

  #[test]
  fn out_of_gas_is_dropped_or_fatal() {
    let ctx = Context::new(&Config::new());
    let starved = SolverConfig { gas_limit: 5, ..SolverConfig::default() };
    let (mut session, owner, address) = deployed(&ctx, starved.clone());
    let x = session.make_symbolic_value("x", 8);
    let summary = session.transact(owner, address, "check", &[x.clone()]).unwrap();
    assert_eq!(summary.out_of_gas, 1);
    assert!(session.ready_states().is_empty());
    assert!(session.terminated_states().is_empty());

    let fatal = SolverConfig { oog: OutOfGasMode::Fatal, overflow: OverflowMode::Wrap, ..starved };
    let (mut session, owner, address) = deployed(&ctx, fatal);
    let x = session.make_symbolic_value("x", 8);
    assert!(matches!(session.transact(owner, address, "check", &[x]), Err(Error::OutOfGas { .. })));
  }
}

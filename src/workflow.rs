//! The verification run: deploy a harness around an internal function, call
//! it once with symbolic arguments, and check that it never returns zero.

use std::fs;
use std::path::Path;

use num::{BigUint, Zero};
use z3::ast::{Ast, BV};

use crate::asm::compile;
use crate::check::{check_nonzero_output, Counterexample};
use crate::config::SolverConfig;
use crate::context::new_context;
use crate::contract::{Contract, Function};
use crate::error::{Error, Result};
use crate::harness::expose;
use crate::session::Session;
use crate::value::{bv_from_biguint, biguint_from_bv};
use crate::world::TxResult;

/// Contract source shipped with the tool.
pub const DEFAULT_SOURCE: &str = include_str!("../contracts/DharmaTokenV0.sasm");

/// What to verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
  pub source: String,
  pub contract: String,
  /// The internal function under test.
  pub function: String,
  /// Name of the external entry the harness adds.
  pub entry: String,
  /// Parameters left free instead of constrained to be nonzero.
  pub unconstrained: Vec<String>,
}

impl Target {
  /// `_fromUnderlying` of the bundled DharmaTokenV0, reached through `fromUnderlying`.
  pub fn dharma() -> Self {
    Self {
      source: DEFAULT_SOURCE.to_string(),
      contract: "DharmaTokenV0".to_string(),
      function: "_fromUnderlying".to_string(),
      entry: "fromUnderlying".to_string(),
      unconstrained: Vec::new(),
    }
  }
}

/// The result of a verification run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
  pub counterexamples: Vec<Counterexample>,
  pub ready: usize,
  pub terminated: usize,
  /// False if the exploration deadline passed first.
  pub exhausted: bool,
}

impl Outcome {
  pub fn holds(&self) -> bool {
    self.counterexamples.is_empty()
  }
}

/// How a concrete call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replay {
  /// Values of the successful return, one per path.
  Returned(Vec<BigUint>),
  Reverted,
}

/// Read contract source from `path`.
pub fn load_source(path: &Path) -> Result<String> {
  Ok(fs::read_to_string(path)?)
}

// Compile, resolve and wrap the target in its harness.
fn harness(target: &Target) -> Result<(Contract, Function)> {
  let program = compile(&target.source)?;
  let base = program.resolve(&target.contract)?;
  let harness = expose(&base, &target.function, &target.entry)?;
  let entry = harness.function(&target.entry)
    .cloned()
    .ok_or_else(|| Error::Setup(format!("harness lacks `{}`", target.entry)))?;
  if entry.returns.len() != 1 {
    return Err(Error::Setup(format!("`{}` must return exactly one value", target.function)));
  }
  for name in &target.unconstrained {
    if !entry.params.iter().any(|p| &p.name == name) {
      return Err(Error::Setup(format!("`{}` has no parameter `{}`", target.function, name)));
    }
  }
  Ok((harness, entry))
}

// One ether, the owner's starting balance.
fn one_ether() -> BigUint {
  BigUint::from(10u32).pow(18)
}

/// Check that the target function never returns zero when its inputs are
/// nonzero.
pub fn verify(config: &SolverConfig, target: &Target) -> Result<Outcome> {
  let (harness, entry) = harness(target)?;
  let ctx = new_context(config);
  let mut session = Session::new(&ctx, config.clone())?;
  let owner = session.create_account(one_ether());
  let address = session.create_contract(owner, harness)?;

  let mut inputs = Vec::with_capacity(entry.params.len());
  for param in &entry.params {
    let width = param.ty.input_bits();
    let symbol = session.make_symbolic_value(&param.name, width);
    if !target.unconstrained.contains(&param.name) {
      session.constrain(!symbol._eq(&BV::from_u64(&ctx, 0, width)));
    }
    inputs.push((param.name.clone(), symbol));
  }
  let args: Vec<BV> = inputs.iter().map(|(_, bv)| bv.clone()).collect();
  tracing::info!(entry = %entry.signature(), "exploring");
  let summary = session.transact(owner, address, &target.entry, &args)?;

  let counterexamples = check_nonzero_output(&mut session, &target.entry, &inputs, entry.returns[0])?;
  Ok(Outcome {
    counterexamples,
    ready: summary.ready,
    terminated: summary.terminated,
    exhausted: summary.exhausted,
  })
}

/// Call the target with concrete `args`, to reproduce a reported bug.
pub fn replay(config: &SolverConfig, target: &Target, args: &[BigUint]) -> Result<Replay> {
  let (harness, entry) = harness(target)?;
  if args.len() != entry.params.len() {
    return Err(Error::Abi(format!(
      "`{}` takes {} arguments, got {}", entry.signature(), entry.params.len(), args.len()
    )));
  }
  let ctx = new_context(config);
  let mut session = Session::new(&ctx, config.clone())?;
  let owner = session.create_account(one_ether());
  let address = session.create_contract(owner, harness)?;
  let words: Vec<BV> = entry.params.iter().zip(args)
    .map(|(param, value)| {
      let width = param.ty.input_bits();
      if value.bits() > width as u64 {
        return Err(Error::Abi(format!("{} does not fit the {} `{}`", value, param.ty, param.name)));
      }
      Ok(bv_from_biguint(&ctx, value, width))
    })
    .collect::<Result<_>>()?;
  session.transact(owner, address, &target.entry, &words)?;

  let mut returned = Vec::new();
  for st in session.ready_states() {
    let tx = st.transactions().last()
      .ok_or_else(|| Error::Invariant("ready state without transactions".to_string()))?;
    debug_assert_eq!(tx.result, TxResult::Return);
    let word = tx.return_data.first()
      .ok_or_else(|| Error::Abi("empty return data".to_string()))?;
    let value = match biguint_from_bv(word) {
      Some(value) => value,
      None => st.solve_one(word)?,
    };
    returned.push(value);
  }
  if returned.is_empty() {
    Ok(Replay::Reverted)
  } else {
    Ok(Replay::Returned(returned))
  }
}

/// Parse `1,0x2a,3` into numbers.
pub fn parse_args(raw: &str) -> Result<Vec<BigUint>> {
  raw.split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(|s| {
      let digits = s.replace('_', "");
      let parsed = match digits.strip_prefix("0x") {
        Some(hex) => BigUint::parse_bytes(hex.as_bytes(), 16),
        None => BigUint::parse_bytes(digits.as_bytes(), 10),
      };
      parsed.ok_or_else(|| Error::Abi(format!("`{}` is not a number", s)))
    })
    .collect()
}

impl Replay {
  /// True if some path returned zero.
  pub fn returns_zero(&self) -> bool {
    matches!(self, Replay::Returned(vals) if vals.iter().any(Zero::is_zero))
  }

  /// The single return value of a deterministic call.
  pub fn value(&self) -> Option<&BigUint> {
    match self {
      Replay::Returned(vals) if vals.len() == 1 => vals.first(),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use num::One;

  #[test]
  fn bundled_source_compiles() {
    let (harness, entry) = harness(&Target::dharma()).unwrap();
    assert_eq!(harness.name, "DharmaTokenV0Harness");
    assert_eq!(entry.signature(), "fromUnderlying(uint256,uint256,bool)");
  }

  #[test]
  fn unknown_parameters_are_a_setup_error() {
    let target = Target { unconstrained: vec!["rate".to_string()], ..Target::dharma() };
    assert!(matches!(harness(&target), Err(Error::Setup(_))));
  }

  #[test]
  fn unreadable_sources_are_io_errors() {
    let path = Path::new("contracts/NoSuchToken.sasm");
    assert!(matches!(load_source(path), Err(Error::Io(_))));
    let bundled = load_source(Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/contracts/DharmaTokenV0.sasm"))).unwrap();
    assert_eq!(bundled, DEFAULT_SOURCE);
  }

  #[test]
  fn parses_replay_arguments() {
    let args = parse_args("1, 0x10,1_000").unwrap();
    assert_eq!(args, vec![BigUint::one(), BigUint::from(16u32), BigUint::from(1000u32)]);
    assert!(parse_args("1,x").is_err());
  }

  #[test]
  fn replays_concrete_calls() {
    let config = SolverConfig::default();
    let target = Target::dharma();
    let one = BigUint::one();
    let res = replay(&config, &target, &[one.clone(), one.clone(), one.clone()]).unwrap();
    assert_eq!(res.value(), Some(&one_ether()));
    let res = replay(&config, &target, &[one.clone(), BigUint::zero(), one.clone()]).unwrap();
    assert_eq!(res, Replay::Reverted);
    assert!(matches!(replay(&config, &target, &[one]), Err(Error::Abi(_))));
  }
}

//! Solver and platform configuration.
//!
//! The configuration is an explicit value handed to [`crate::context::new_context`]
//! and [`crate::session::Session::new`]. Defaults can be overridden through
//! `SMT_TIMEOUT`, `EVM_OOG`, `EVM_OVERFLOW`, `EVM_GAS_LIMIT` and `SMT_SEED`.

use std::{env, fmt, str::FromStr, time::Duration};

use crate::error::{Error, Result};

/// One hour per solver query and per exploration.
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_GAS_LIMIT: u64 = 3_000_000;

/// What to do with states that exhaust their gas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutOfGasMode {
  /// Drop the state; it counts neither as a pass nor as a violation.
  Ignore,
  /// Abort the run.
  Fatal,
}

/// Semantics of the raw `add`, `sub` and `mul` operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowMode {
  /// Modular arithmetic, as the virtual machine does natively.
  Wrap,
  /// Fork on overflow; the overflowing branch terminates with `THROW`.
  Fault,
}

impl FromStr for OutOfGasMode {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "ignore" => Ok(OutOfGasMode::Ignore),
      "fatal" | "strict" => Ok(OutOfGasMode::Fatal),
      other => Err(Error::Config(format!("unknown out-of-gas mode `{}` (expected ignore or fatal)", other))),
    }
  }
}

impl fmt::Display for OutOfGasMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      OutOfGasMode::Ignore => write!(f, "ignore"),
      OutOfGasMode::Fatal => write!(f, "fatal"),
    }
  }
}

impl FromStr for OverflowMode {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "wrap" => Ok(OverflowMode::Wrap),
      "fault" => Ok(OverflowMode::Fault),
      other => Err(Error::Config(format!("unknown overflow mode `{}` (expected wrap or fault)", other))),
    }
  }
}

impl fmt::Display for OverflowMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      OverflowMode::Wrap => write!(f, "wrap"),
      OverflowMode::Fault => write!(f, "fault"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverConfig {
  /// Per-query solver timeout, also the wall-clock bound of an exploration.
  pub timeout: Duration,
  pub oog: OutOfGasMode,
  pub overflow: OverflowMode,
  /// Gas available to each transaction.
  pub gas_limit: u64,
  /// Random seed of the solver.
  pub seed: u32,
}

impl Default for SolverConfig {
  fn default() -> Self {
    Self {
      timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
      oog: OutOfGasMode::Ignore,
      overflow: OverflowMode::Wrap,
      gas_limit: DEFAULT_GAS_LIMIT,
      seed: 0,
    }
  }
}

impl SolverConfig {
  /// Read the configuration from the environment, falling back to defaults
  /// for unset variables.
  pub fn from_env() -> Result<Self> {
    Self::from_lookup(|key| env::var(key).ok())
  }

  /// Same as [`SolverConfig::from_env`] with an arbitrary variable source.
  pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where F: Fn(&str) -> Option<String>
  {
    let mut config = Self::default();
    let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    if let Some(raw) = var("SMT_TIMEOUT") {
      config.timeout = Duration::from_secs(parse_number("SMT_TIMEOUT", &raw)?);
    }
    if let Some(raw) = var("EVM_OOG") {
      config.oog = raw.parse()?;
    }
    if let Some(raw) = var("EVM_OVERFLOW") {
      config.overflow = raw.parse()?;
    }
    if let Some(raw) = var("EVM_GAS_LIMIT") {
      config.gas_limit = parse_number("EVM_GAS_LIMIT", &raw)?;
    }
    if let Some(raw) = var("SMT_SEED") {
      config.seed = parse_number("SMT_SEED", &raw)?;
    }
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<()> {
    if self.timeout.is_zero() {
      return Err(Error::Config("timeout must be positive".to_string()));
    }
    if self.gas_limit == 0 {
      return Err(Error::Config("gas limit must be positive".to_string()));
    }
    Ok(())
  }

  /// The solver timeout in milliseconds, saturated to what z3 accepts.
  pub fn timeout_ms(&self) -> u64 {
    self.timeout.as_millis().min(u32::MAX as u128) as u64
  }
}

fn parse_number<T: FromStr>(name: &str, raw: &str) -> Result<T> {
  raw.parse::<T>()
    .map_err(|_| Error::Config(format!("{} must be a non-negative integer, got `{}`", name, raw)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |key| map.get(key).cloned()
  }

  #[test]
  fn defaults_are_one_hour_and_lenient() {
    let config = SolverConfig::from_lookup(lookup(&[])).unwrap();
    assert_eq!(config.timeout, Duration::from_secs(3600));
    assert_eq!(config.oog, OutOfGasMode::Ignore);
    assert_eq!(config.overflow, OverflowMode::Wrap);
  }

  #[test]
  fn environment_overrides() {
    let config = SolverConfig::from_lookup(lookup(&[
      ("SMT_TIMEOUT", "30"),
      ("EVM_OOG", "fatal"),
      ("EVM_OVERFLOW", " Fault "),
      ("EVM_GAS_LIMIT", "1000"),
    ])).unwrap();
    assert_eq!(config.timeout, Duration::from_secs(30));
    assert_eq!(config.timeout_ms(), 30_000);
    assert_eq!(config.oog, OutOfGasMode::Fatal);
    assert_eq!(config.overflow, OverflowMode::Fault);
    assert_eq!(config.gas_limit, 1000);
  }

  #[test]
  fn rejects_garbage() {
    assert!(matches!(SolverConfig::from_lookup(lookup(&[("EVM_OOG", "maybe")])), Err(Error::Config(_))));
    assert!(matches!(SolverConfig::from_lookup(lookup(&[("SMT_TIMEOUT", "-1")])), Err(Error::Config(_))));
    assert!(matches!(SolverConfig::from_lookup(lookup(&[("SMT_TIMEOUT", "0")])), Err(Error::Config(_))));
  }
}

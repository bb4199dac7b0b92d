use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use symbolic_harness::{
  config::{OutOfGasMode, OverflowMode},
  workflow::{load_source, parse_args, DEFAULT_SOURCE},
  replay, verify, Replay, SolverConfig, Target,
};
use tracing_subscriber::EnvFilter;

/// Check that a contract function never returns zero for nonzero inputs
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Contract source; the bundled DharmaTokenV0 when omitted
    source: Option<PathBuf>,
    /// Contract holding the function under test
    #[clap(short, long, default_value = "DharmaTokenV0")]
    contract: String,
    /// Internal function under test
    #[clap(short, long, default_value = "_fromUnderlying")]
    function: String,
    /// External entry added by the harness [default: the function name without leading underscores]
    #[clap(short, long)]
    entry: Option<String>,
    /// Solver timeout and exploration bound, in seconds
    #[clap(long)]
    timeout: Option<u64>,
    /// Out-of-gas handling: ignore or fatal
    #[clap(long)]
    oog: Option<OutOfGasMode>,
    /// Raw arithmetic overflow: wrap or fault
    #[clap(long)]
    overflow: Option<OverflowMode>,
    /// Gas available to each transaction
    #[clap(long)]
    gas_limit: Option<u64>,
    /// Parameter to leave unconstrained (repeatable)
    #[clap(short, long)]
    unconstrained: Vec<String>,
    /// Call with concrete comma-separated arguments instead, e.g. `1,1,0`
    #[clap(long)]
    replay: Option<String>,
}

fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let mut config = SolverConfig::from_env()?;
  if let Some(secs) = args.timeout {
    config.timeout = Duration::from_secs(secs);
  }
  if let Some(oog) = args.oog {
    config.oog = oog;
  }
  if let Some(overflow) = args.overflow {
    config.overflow = overflow;
  }
  if let Some(gas_limit) = args.gas_limit {
    config.gas_limit = gas_limit;
  }
  config.validate()?;

  let source = match &args.source {
    Some(path) => load_source(path)
      .with_context(|| format!("cannot read {}", path.display()))?,
    None => DEFAULT_SOURCE.to_string(),
  };
  let entry = args.entry.clone()
    .unwrap_or_else(|| args.function.trim_start_matches('_').to_string());
  let target = Target {
    source,
    contract: args.contract,
    function: args.function,
    entry,
    unconstrained: args.unconstrained,
  };

  if let Some(raw) = &args.replay {
    let values = parse_args(raw)?;
    match replay(&config, &target, &values)? {
      Replay::Returned(vals) => {
        for v in vals {
          println!("{}({}) -> {}", target.entry, raw, v);
        }
      }
      Replay::Reverted => println!("{}({}) reverted", target.entry, raw),
    }
    return Ok(());
  }

  let outcome = verify(&config, &target)?;
  for cex in &outcome.counterexamples {
    println!("Bug found. {}", cex);
  }
  if !outcome.exhausted {
    tracing::warn!("exploration was cut short; the search is incomplete");
  }
  tracing::info!(
    ready = outcome.ready,
    terminated = outcome.terminated,
    violations = outcome.counterexamples.len(),
    "done"
  );
  Ok(())
}

//! Symbolic verification of contract functions.
//!
//! An internal function is exposed through a harness contract, called once
//! with symbolic arguments, and every successful end of the call is checked
//! for a zero result.

pub mod error;
pub mod config;
pub mod context;
pub mod ty;
pub mod bytecode;
pub mod constraint;
pub mod value;
pub mod contract;
pub mod asm;
pub mod harness;
pub mod abi;
pub mod world;
pub mod state;
pub mod dynamic;
pub mod evaluation;
pub mod session;
pub mod check;
pub mod workflow;

pub use error::{Error, Result};
pub use config::SolverConfig;
pub use session::{ExecutionState, Session};
pub use workflow::{replay, verify, Outcome, Replay, Target};

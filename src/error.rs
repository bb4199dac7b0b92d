//! Errors raised by the verification workflow and the engine behind it.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The contract source did not compile. Fatal, raised before exploration.
    #[error("compilation failed at line {line}: {message}")]
    Compile { line: usize, message: String },
    /// Deployment or harness construction failed. Fatal, raised before exploration.
    #[error("setup failed: {0}")]
    Setup(String),
    /// A workflow invariant does not hold, which signals a setup bug rather
    /// than a property violation.
    #[error("invariant violated: {0}")]
    Invariant(String),
    #[error("ABI decoding failed: {0}")]
    Abi(String),
    #[error("solver gave up ({0})")]
    SolverUnknown(String),
    #[error("state constraints are unsatisfiable")]
    Unsat,
    /// Raised only when out-of-gas is configured as fatal.
    #[error("transaction to `{function}` ran out of gas")]
    OutOfGas { function: String },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn compile<S: Into<String>>(line: usize, message: S) -> Self {
        Error::Compile { line, message: message.into() }
    }
}

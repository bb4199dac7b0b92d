use super::*;

/// The termination status of an evaluation.
#[derive(Clone, Debug)]
pub enum TerminationStatus<'ctx> {
    /// Still running
    None,
    /// Returned from the entry function
    Return(Vec<Value<'ctx>>),
    /// Reverted, e.g. by a failed `require`
    Revert,
    /// Invalid operation
    Throw(String),
    /// Gas exhausted
    OutOfGas,
    /// Unfeasible execution path
    Unsat,
}

impl<'ctx> TerminationStatus<'ctx> {
    /// Return true iff the current evaluation state is final.
    pub fn is_final(&self) -> bool {
        !matches!(self, TerminationStatus::None)
    }

    /// The transaction result this status ends with; `None` while running
    /// and for pruned paths.
    pub fn tx_result(&self) -> Option<TxResult> {
        match self {
            TerminationStatus::None | TerminationStatus::Unsat => None,
            TerminationStatus::Return(_) => Some(TxResult::Return),
            TerminationStatus::Revert => Some(TxResult::Revert),
            TerminationStatus::Throw(_) => Some(TxResult::Throw),
            TerminationStatus::OutOfGas => Some(TxResult::OutOfGas),
        }
    }
}

impl<'ctx> fmt::Display for TerminationStatus<'ctx> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TerminationStatus::None => write!(f, "Still running"),
            TerminationStatus::Return(return_vals) => {
                write!(f, "Returns ({})", return_vals.iter().format(", "))
            }
            TerminationStatus::Revert => write!(f, "Reverted"),
            TerminationStatus::Throw(reason) => write!(f, "Threw: {}", reason),
            TerminationStatus::OutOfGas => write!(f, "Out of gas"),
            TerminationStatus::Unsat => write!(f, "Unsatisfied"),
        }
    }
}

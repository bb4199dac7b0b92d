//! Accounts and the transaction record of one execution state.

use std::collections::BTreeMap;
use std::fmt;

use num::BigUint;
use crate::abi::Words;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub u64);

impl fmt::Display for Address {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "0x{:040x}", self.0)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
  pub address: Address,
  pub balance: BigUint,
  /// Name of the deployed contract, for contract accounts.
  pub contract: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
  Create,
  Call,
}

/// How a transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxResult {
  Return,
  Revert,
  /// Invalid operation, e.g. an arithmetic fault.
  Throw,
  OutOfGas,
}

impl TxResult {
  pub fn is_success(&self) -> bool {
    matches!(self, TxResult::Return)
  }
}

impl fmt::Display for TxResult {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      TxResult::Return => "RETURN",
      TxResult::Revert => "REVERT",
      TxResult::Throw => "THROW",
      TxResult::OutOfGas => "OOG",
    };
    write!(f, "{}", s)
  }
}

/// A transaction issued by a user account, as opposed to an internal call.
#[derive(Debug, Clone)]
pub struct Transaction<'ctx> {
  pub kind: TxKind,
  pub caller: Address,
  pub address: Address,
  /// The function called; `None` for contract creation.
  pub function: Option<String>,
  pub data: Words<'ctx>,
  pub return_data: Words<'ctx>,
  pub result: TxResult,
  pub gas_used: u64,
}

/// Accounts plus the append-only record of transactions applied to them.
#[derive(Debug, Clone, Default)]
pub struct World<'ctx> {
  accounts: BTreeMap<Address, Account>,
  transactions: Vec<Transaction<'ctx>>,
}

impl<'ctx> World<'ctx> {
  pub fn new() -> Self {
    Self { accounts: BTreeMap::new(), transactions: Vec::new() }
  }

  pub fn add_account(&mut self, account: Account) {
    self.accounts.insert(account.address, account);
  }

  pub fn account(&self, address: Address) -> Option<&Account> {
    self.accounts.get(&address)
  }

  pub fn push_transaction(&mut self, tx: Transaction<'ctx>) {
    self.transactions.push(tx);
  }

  /// Transactions in the order they were applied.
  pub fn human_transactions(&self) -> &[Transaction<'ctx>] {
    &self.transactions
  }
}

impl<'ctx> fmt::Display for Transaction<'ctx> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.kind {
      TxKind::Create => write!(f, "CREATE {} by {}", self.address, self.caller)?,
      TxKind::Call => write!(
        f, "CALL {}.{} by {}", self.address, self.function.as_deref().unwrap_or("<fallback>"), self.caller
      )?,
    }
    write!(f, " -> {} (gas {})", self.result, self.gas_used)
  }
}

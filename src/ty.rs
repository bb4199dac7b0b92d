use std::{fmt, str::FromStr};

use crate::error::{Error, Result};

/// The width of a machine word.
pub const WORD_BITS: u32 = 256;

/// Value types of the contract language, named after their ABI counterparts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
  Bool,
  U8,
  U64,
  U128,
  U256,
}

impl Type {
  /// Bit width of the value once loaded.
  /// Booleans are a single bit conceptually, but never reach the solver as a bitvector.
  pub fn bits(&self) -> u32 {
    match self {
      Type::Bool => 1,
      Type::U8 => 8,
      Type::U64 => 64,
      Type::U128 => 128,
      Type::U256 => 256,
    }
  }

  /// Width of a symbolic input standing for a parameter of this type.
  /// Flags are passed as a byte, so that any nonzero byte is `true`.
  pub fn input_bits(&self) -> u32 {
    match self {
      Type::Bool => 8,
      t => t.bits(),
    }
  }

  pub fn is_integer(&self) -> bool {
    !matches!(self, Type::Bool)
  }

  pub fn abi_name(&self) -> &'static str {
    match self {
      Type::Bool => "bool",
      Type::U8 => "uint8",
      Type::U64 => "uint64",
      Type::U128 => "uint128",
      Type::U256 => "uint256",
    }
  }

  pub fn from_abi_name(name: &str) -> Option<Self> {
    match name.trim() {
      "bool" => Some(Type::Bool),
      "uint8" => Some(Type::U8),
      "uint64" => Some(Type::U64),
      "uint128" => Some(Type::U128),
      "uint256" | "uint" => Some(Type::U256),
      _ => None,
    }
  }
}

impl FromStr for Type {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    Type::from_abi_name(s).ok_or_else(|| Error::Abi(format!("unsupported type `{}`", s)))
  }
}

impl fmt::Display for Type {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.abi_name())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn abi_names_round_trip() {
    for t in [Type::Bool, Type::U8, Type::U64, Type::U128, Type::U256] {
      assert_eq!(t.abi_name().parse::<Type>().unwrap(), t);
    }
    assert_eq!("uint".parse::<Type>().unwrap(), Type::U256);
    assert!("int256".parse::<Type>().is_err());
  }

  #[test]
  fn flags_are_bytes_on_the_wire() {
    assert_eq!(Type::Bool.input_bits(), 8);
    assert_eq!(Type::U256.input_bits(), 256);
  }
}

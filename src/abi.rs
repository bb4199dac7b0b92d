//! Word-based ABI encoding of call data and return data.
//!
//! Every argument and every returned value takes one 256-bit word.

use z3::ast::{Ast, BV};

use crate::error::{Error, Result};
use crate::ty::{Type, WORD_BITS};
use crate::value::Value;

/// Call data or return data: a sequence of words.
pub type Words<'ctx> = Vec<BV<'ctx>>;

/// Encode raw arguments, zero-extending each to a word.
pub fn encode_args<'ctx>(args: &[BV<'ctx>]) -> Result<Words<'ctx>> {
  args.iter()
    .map(|arg| {
      let width = arg.get_size();
      if width > WORD_BITS {
        Err(Error::Abi(format!("argument of {} bits does not fit a word", width)))
      } else if width == WORD_BITS {
        Ok(arg.clone())
      } else {
        Ok(arg.zero_ext(WORD_BITS - width))
      }
    })
    .collect()
}

/// Decode the parameters of a function from call data.
pub fn decode_params<'ctx>(types: &[Type], data: &[BV<'ctx>]) -> Result<Vec<Value<'ctx>>> {
  if data.len() < types.len() {
    return Err(Error::Abi(format!("expected {} words of call data, got {}", types.len(), data.len())));
  }
  Ok(types.iter().zip(data.iter()).map(|(t, word)| Value::from_word(t, word)).collect())
}

/// Encode returned values.
pub fn encode_values<'ctx>(values: &[Value<'ctx>]) -> Words<'ctx> {
  values.iter().map(|v| v.to_word()).collect()
}

/// Decode the first value of `data` as `abi_type`, e.g. `"uint256"`.
pub fn deserialize<'ctx>(abi_type: &str, data: &[BV<'ctx>]) -> Result<Value<'ctx>> {
  let ty: Type = abi_type.parse()?;
  let word = data.first()
    .ok_or_else(|| Error::Abi(format!("no data to decode a {} from", ty)))?;
  Ok(Value::from_word(&ty, word))
}

#[cfg(test)]
mod tests {
  use super::*;
  use num::BigUint;
  use z3::{Config, Context};

  use crate::value::biguint_from_bv;

  #[test]
  fn arguments_are_word_aligned() {
    let ctx = Context::new(&Config::new());
    let words = encode_args(&[BV::from_u64(&ctx, 1, 256), BV::from_u64(&ctx, 0xab, 8)]).unwrap();
    assert!(words.iter().all(|w| w.get_size() == WORD_BITS));
    let params = decode_params(&[Type::U256, Type::Bool], &words).unwrap();
    assert_eq!(params[0].ty(), Type::U256);
    assert_eq!(params[1].simplify().as_bool().and_then(|b| b.as_bool()), Some(true));
  }

  #[test]
  fn short_data_is_an_error() {
    let ctx = Context::new(&Config::new());
    let words = encode_args(&[BV::from_u64(&ctx, 1, 64)]).unwrap();
    assert!(matches!(decode_params(&[Type::U64, Type::U64], &words), Err(Error::Abi(_))));
    assert!(matches!(deserialize("uint256", &[]), Err(Error::Abi(_))));
    assert!(matches!(deserialize("string", &words), Err(Error::Abi(_))));
  }

  #[test]
  fn return_values_decode_as_declared() {
    let ctx = Context::new(&Config::new());
    let data = encode_values(&[Value::U64(BV::from_u64(&ctx, 42, 64))]);
    let ret = deserialize("uint256", &data).unwrap();
    assert_eq!(biguint_from_bv(ret.as_bv().unwrap()), Some(BigUint::from(42u32)));
  }
}

//! Symbolic values of the contract language.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor, Add, Sub, Mul, Div, Rem, Not};
use num::{BigUint, Zero};
use z3::{Context, ast::{Bool, BV, Ast}};

use crate::bytecode::Constant;
use crate::constraint::Constraint;
use crate::ty::{Type, WORD_BITS};

/// Symbolic values.
/// Integer arithmetic is modular in the width of the type, as on the virtual machine.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Value<'ctx> {
  Bool(Bool<'ctx>),
  U8(BV<'ctx>),
  U64(BV<'ctx>),
  U128(BV<'ctx>),
  U256(BV<'ctx>),
}

impl<'ctx> Add for Value<'ctx> {
  type Output = Self;
  fn add(self, rhs: Self) -> Self::Output {
    self.bv_op(&rhs, |x, y| x.bvadd(y))
  }
}

impl<'ctx> Sub for Value<'ctx> {
  type Output = Self;
  fn sub(self, rhs: Self) -> Self::Output {
    self.bv_op(&rhs, |x, y| x.bvsub(y))
  }
}

impl<'ctx> Mul for Value<'ctx> {
  type Output = Self;
  fn mul(self, rhs: Self) -> Self::Output {
    self.bv_op(&rhs, |x, y| x.bvmul(y))
  }
}

/// Unsigned division; dividing by zero yields zero.
impl<'ctx> Div for Value<'ctx> {
  type Output = Self;
  fn div(self, rhs: Self) -> Self::Output {
    self.bv_op(&rhs, |x, y| {
      let zero = BV::from_u64(x.get_ctx(), 0, y.get_size());
      y._eq(&zero).ite(&zero, &x.bvudiv(y))
    })
  }
}

/// Unsigned remainder; a zero modulus yields zero.
impl<'ctx> Rem for Value<'ctx> {
  type Output = Self;
  fn rem(self, rhs: Self) -> Self::Output {
    self.bv_op(&rhs, |x, y| {
      let zero = BV::from_u64(x.get_ctx(), 0, y.get_size());
      y._eq(&zero).ite(&zero, &x.bvurem(y))
    })
  }
}

impl<'ctx> BitOr<Self> for Value<'ctx> {
  type Output = Self;
  fn bitor(self, rhs: Self) -> Self::Output {
    self.bv_op(&rhs, |x, y| x.bvor(y))
  }
}

impl<'ctx> BitAnd<Self> for Value<'ctx> {
  type Output = Self;
  fn bitand(self, rhs: Self) -> Self::Output {
    self.bv_op(&rhs, |x, y| x.bvand(y))
  }
}

impl<'ctx> BitXor<Self> for Value<'ctx> {
  type Output = Self;
  fn bitxor(self, rhs: Self) -> Self::Output {
    self.bv_op(&rhs, |x, y| x.bvxor(y))
  }
}

impl<'ctx> Not for Value<'ctx> {
  type Output = Self;
  fn not(self) -> Self::Output {
    match self {
      Value::Bool(b) => Value::Bool(b.not()),
      _ => panic!("Only values of boolean sort can be negated."),
    }
  }
}

impl<'ctx> Value<'ctx> {
  // Lift a bitvector operation to values of the same integer type.
  fn bv_op<F>(&self, rhs: &Self, f: F) -> Self
    where F: Fn(&BV<'ctx>, &BV<'ctx>) -> BV<'ctx>
  {
    match (self, rhs) {
      (Value::U8(x), Value::U8(y)) => Value::U8(f(x, y)),
      (Value::U64(x), Value::U64(y)) => Value::U64(f(x, y)),
      (Value::U128(x), Value::U128(y)) => Value::U128(f(x, y)),
      (Value::U256(x), Value::U256(y)) => Value::U256(f(x, y)),
      _ => panic!("Type mismatches."),
    }
  }

  // Lift a bitvector predicate to values of the same integer type.
  fn bv_pred<F>(&self, rhs: &Self, f: F) -> Bool<'ctx>
    where F: Fn(&BV<'ctx>, &BV<'ctx>) -> Bool<'ctx>
  {
    match (self, rhs) {
      (Value::U8(x), Value::U8(y))
      | (Value::U64(x), Value::U64(y))
      | (Value::U128(x), Value::U128(y))
      | (Value::U256(x), Value::U256(y)) => f(x, y),
      _ => panic!("Type mismatches."),
    }
  }

  /// Injection from closed values.
  pub fn from_constant(c: &Constant, context: &'ctx Context) -> Self {
    match c {
      Constant::Bool(b) => Value::Bool(Bool::from_bool(context, *b)),
      Constant::U8(x) => Value::U8(BV::from_u64(context, *x as u64, 8)),
      Constant::U64(x) => Value::U64(BV::from_u64(context, *x, 64)),
      Constant::U128(x) => Value::U128(bv_from_biguint(context, &BigUint::from(*x), 128)),
      Constant::U256(x) => Value::U256(bv_from_biguint(context, x, 256)),
    }
  }

  /// The default value of `t`: zero, or false.
  pub fn zero(t: &Type, context: &'ctx Context) -> Self {
    match t {
      Type::Bool => Value::Bool(Bool::from_bool(context, false)),
      t => Value::wrap(t, BV::from_u64(context, 0, t.bits())),
    }
  }

  /// Wrap a bitvector of the right width as an integer value.
  pub fn wrap(t: &Type, bv: BV<'ctx>) -> Self {
    match t {
      Type::Bool => panic!("Booleans are not bitvectors."),
      Type::U8 => Value::U8(bv),
      Type::U64 => Value::U64(bv),
      Type::U128 => Value::U128(bv),
      Type::U256 => Value::U256(bv),
    }
  }

  pub fn ty(&self) -> Type {
    match self {
      Value::Bool(_) => Type::Bool,
      Value::U8(_) => Type::U8,
      Value::U64(_) => Type::U64,
      Value::U128(_) => Type::U128,
      Value::U256(_) => Type::U256,
    }
  }

  pub fn as_bv(&self) -> Option<&BV<'ctx>> {
    match self {
      Value::Bool(_) => None,
      Value::U8(x) | Value::U64(x) | Value::U128(x) | Value::U256(x) => Some(x),
    }
  }

  pub fn as_bool(&self) -> Option<&Bool<'ctx>> {
    match self {
      Value::Bool(b) => Some(b),
      _ => None,
    }
  }

  pub fn get_ctx(&self) -> &'ctx Context {
    match self {
      Value::Bool(b) => b.get_ctx(),
      Value::U8(x) | Value::U64(x) | Value::U128(x) | Value::U256(x) => x.get_ctx(),
    }
  }

  pub fn lt(&self, rhs: &Self) -> Self {
    Value::Bool(self.bv_pred(rhs, |x, y| x.bvult(y)))
  }

  pub fn le(&self, rhs: &Self) -> Self {
    Value::Bool(self.bv_pred(rhs, |x, y| x.bvule(y)))
  }

  pub fn gt(&self, rhs: &Self) -> Self {
    Value::Bool(self.bv_pred(rhs, |x, y| x.bvugt(y)))
  }

  pub fn ge(&self, rhs: &Self) -> Self {
    Value::Bool(self.bv_pred(rhs, |x, y| x.bvuge(y)))
  }

  pub fn and(&self, rhs: &Self) -> Self {
    match (self, rhs) {
      (Value::Bool(x), Value::Bool(y)) => Value::Bool(x & y),
      _ => panic!("Type mismatches."),
    }
  }

  pub fn or(&self, rhs: &Self) -> Self {
    match (self, rhs) {
      (Value::Bool(x), Value::Bool(y)) => Value::Bool(x | y),
      _ => panic!("Type mismatches."),
    }
  }

  pub fn eq(&self, rhs: &Self) -> Self {
    match (self, rhs) {
      (Value::Bool(x), Value::Bool(y)) => Value::Bool(x._eq(y)),
      _ => Value::Bool(self.bv_pred(rhs, |x, y| x._eq(y))),
    }
  }

  pub fn neq(&self, rhs: &Self) -> Self {
    !self.eq(rhs)
  }

  /// The condition under which `self + rhs` wraps around.
  pub fn add_overflows(&self, rhs: &Self) -> Constraint<'ctx> {
    self.bv_pred(rhs, |x, y| x.bvadd(y).bvult(x))
  }

  /// The condition under which `self - rhs` wraps around.
  pub fn sub_underflows(&self, rhs: &Self) -> Constraint<'ctx> {
    self.bv_pred(rhs, |x, y| x.bvult(y))
  }

  /// The condition under which `self * rhs` wraps around.
  pub fn mul_overflows(&self, rhs: &Self) -> Constraint<'ctx> {
    self.bv_pred(rhs, |x, y| {
      let width = x.get_size();
      let wide = x.zero_ext(width).bvmul(&y.zero_ext(width));
      let high = wide.extract(2 * width - 1, width);
      !high._eq(&BV::from_u64(x.get_ctx(), 0, width))
    })
  }

  /// Conversion between integer types: zero extension or truncation.
  pub fn cast(&self, to: &Type) -> Self {
    let bv = self.as_bv().expect("Only integers can be cast.");
    let from = bv.get_size();
    let to_bits = to.bits();
    let res = if to_bits > from {
      bv.zero_ext(to_bits - from)
    } else if to_bits < from {
      bv.extract(to_bits - 1, 0)
    } else {
      bv.clone()
    };
    Value::wrap(to, res)
  }

  /// Encode as a machine word.
  pub fn to_word(&self) -> BV<'ctx> {
    match self {
      Value::Bool(b) => {
        let ctx = b.get_ctx();
        b.ite(&BV::from_u64(ctx, 1, WORD_BITS), &BV::from_u64(ctx, 0, WORD_BITS))
      }
      Value::U256(x) => x.clone(),
      Value::U8(x) | Value::U64(x) | Value::U128(x) => x.zero_ext(WORD_BITS - x.get_size()),
    }
  }

  /// Decode a machine word as a value of type `t`.
  /// Booleans are true iff the word is nonzero; narrower integers keep their low bits.
  pub fn from_word(t: &Type, word: &BV<'ctx>) -> Self {
    match t {
      Type::Bool => Value::Bool(!word._eq(&BV::from_u64(word.get_ctx(), 0, word.get_size()))),
      Type::U256 => Value::U256(word.clone()),
      t => Value::wrap(t, word.extract(t.bits() - 1, 0)),
    }
  }

  pub fn simplify(&self) -> Self {
    match self {
      Value::Bool(b) => Value::Bool(b.simplify()),
      Value::U8(x) => Value::U8(x.simplify()),
      Value::U64(x) => Value::U64(x.simplify()),
      Value::U128(x) => Value::U128(x.simplify()),
      Value::U256(x) => Value::U256(x.simplify()),
    }
  }
}

impl<'ctx> fmt::Display for Value<'ctx> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Bool(b) => write!(f, "{}", b),
      Value::U8(x) | Value::U64(x) | Value::U128(x) | Value::U256(x) => write!(f, "{}", x),
    }
  }
}

/// A bitvector numeral of width `bits` holding `n` (truncated to the width).
pub fn bv_from_biguint<'ctx>(ctx: &'ctx Context, n: &BigUint, bits: u32) -> BV<'ctx> {
  let digits = n.to_u64_digits();
  let chunks = (bits + 63) / 64;
  let mut res: Option<BV<'ctx>> = None;
  for i in (0..chunks).rev() {
    let digit = digits.get(i as usize).copied().unwrap_or(0);
    let chunk = BV::from_u64(ctx, digit, 64);
    res = Some(match res {
      Some(high) => high.concat(&chunk),
      None => chunk,
    });
  }
  match res {
    Some(bv) if bits < 64 * chunks => bv.extract(bits - 1, 0),
    Some(bv) => bv,
    None => BV::from_u64(ctx, 0, bits.max(1)),
  }
}

/// The numeral held by `bv`, if it simplifies to a constant.
pub fn biguint_from_bv(bv: &BV) -> Option<BigUint> {
  let bv = bv.simplify();
  let width = bv.get_size();
  let mut res = BigUint::zero();
  let mut lo = 0;
  while lo < width {
    let hi = (lo + 63).min(width - 1);
    let chunk = bv.extract(hi, lo).simplify().as_u64()?;
    res += BigUint::from(chunk) << (lo as usize);
    lo += 64;
  }
  Some(res)
}

#[cfg(test)]
mod tests {
  use super::*;
  use z3::{Config, SatResult, Solver};

  fn u256<'ctx>(ctx: &'ctx Context, n: u64) -> Value<'ctx> {
    Value::U256(BV::from_u64(ctx, n, 256))
  }

  fn concrete(v: &Value) -> BigUint {
    biguint_from_bv(v.as_bv().unwrap()).unwrap()
  }

  #[test]
  fn biguint_conversion_is_lossless() {
    let ctx = Context::new(&Config::new());
    let n: BigUint = "14474011154664523624477350999513853985339507749031138909263555379280740351999".parse().unwrap();
    let bv = bv_from_biguint(&ctx, &n, 256);
    assert_eq!(bv.get_size(), 256);
    assert_eq!(biguint_from_bv(&bv), Some(n));
    let small = bv_from_biguint(&ctx, &BigUint::from(200u32), 8);
    assert_eq!(small.get_size(), 8);
    assert_eq!(biguint_from_bv(&small), Some(BigUint::from(200u32)));
  }

  #[test]
  fn division_by_zero_yields_zero() {
    let ctx = Context::new(&Config::new());
    let x = Value::U256(BV::new_const(&ctx, "x", 256));
    let q = x.clone() / u256(&ctx, 0);
    let r = x % u256(&ctx, 0);
    let solver = Solver::new(&ctx);
    solver.assert(&!(q.eq(&u256(&ctx, 0)).as_bool().unwrap() & r.eq(&u256(&ctx, 0)).as_bool().unwrap()));
    assert_eq!(solver.check(), SatResult::Unsat);
  }

  #[test]
  fn arithmetic_wraps() {
    let ctx = Context::new(&Config::new());
    let max = Value::U8(BV::from_u64(&ctx, 255, 8));
    let one = Value::U8(BV::from_u64(&ctx, 1, 8));
    assert_eq!(concrete(&(max.clone() + one.clone())), BigUint::zero());
    assert_eq!(concrete(&(one.clone() - max.clone())), BigUint::from(2u32));
    assert_eq!(max.add_overflows(&one).simplify().as_bool(), Some(true));
    assert_eq!(one.sub_underflows(&max).simplify().as_bool(), Some(true));
    assert_eq!(max.sub_underflows(&one).simplify().as_bool(), Some(false));
  }

  #[test]
  fn mul_overflow_is_exact() {
    let ctx = Context::new(&Config::new());
    let x = Value::U8(BV::new_const(&ctx, "x", 8));
    let y = Value::U8(BV::new_const(&ctx, "y", 8));
    // overflow iff the 16-bit product does not fit 8 bits
    let solver = Solver::new(&ctx);
    let wide = x.cast(&Type::U64) * y.cast(&Type::U64);
    let fits = wide.le(&Value::U64(BV::from_u64(&ctx, 255, 64)));
    solver.assert(&x.mul_overflows(&y)._eq(fits.as_bool().unwrap()));
    assert_eq!(solver.check(), SatResult::Unsat);
  }

  #[test]
  fn words_round_trip_through_types() {
    let ctx = Context::new(&Config::new());
    let flag = Value::from_word(&Type::Bool, &BV::from_u64(&ctx, 7, 256));
    assert_eq!(flag.simplify().as_bool().unwrap().as_bool(), Some(true));
    let byte = Value::from_word(&Type::U8, &BV::from_u64(&ctx, 0x1ff, 256));
    assert_eq!(concrete(&byte), BigUint::from(0xffu32));
    assert_eq!(biguint_from_bv(&byte.to_word()), Some(BigUint::from(0xffu32)));
    let t = Value::Bool(Bool::from_bool(&ctx, true));
    assert_eq!(biguint_from_bv(&t.to_word()), Some(BigUint::from(1u32)));
  }
}

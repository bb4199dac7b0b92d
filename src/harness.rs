//! Harness contracts: expose an internal function through an external entry
//! point with the same signature.

use crate::bytecode::{Bytecode, Operation};
use crate::contract::{Contract, Function, Param, Visibility};
use crate::error::{Error, Result};

/// Build `<Base>Harness`, which keeps every function of `base` and adds the
/// external function `entry` forwarding its arguments, in order, to `internal`.
pub fn expose(base: &Contract, internal: &str, entry: &str) -> Result<Contract> {
  let target = base.function(internal)
    .ok_or_else(|| Error::Setup(format!("`{}` has no function `{}`", base.name, internal)))?;
  if target.visibility != Visibility::Internal {
    return Err(Error::Setup(format!("`{}.{}` is already external", base.name, internal)));
  }
  if base.function(entry).is_some() {
    return Err(Error::Setup(format!("`{}` already defines `{}`", base.name, entry)));
  }
  let mut locals = target.params.clone();
  let results: Vec<usize> = target.returns.iter().enumerate()
    .map(|(i, ty)| {
      locals.push(Param { name: format!("ret{}", i), ty: *ty });
      target.params.len() + i
    })
    .collect();
  let args: Vec<usize> = (0..target.params.len()).collect();
  let forward = Function {
    name: entry.to_string(),
    visibility: Visibility::External,
    params: target.params.clone(),
    returns: target.returns.clone(),
    locals,
    code: vec![
      Bytecode::Call(results.clone(), Operation::Invoke(internal.to_string()), args),
      Bytecode::Ret(results),
    ],
    lines: vec![0, 0],
  };
  let mut harness = Contract {
    name: format!("{}Harness", base.name),
    base: Some(base.name.clone()),
    functions: base.functions.clone(),
    line: 0,
  };
  harness.functions.insert(forward.name.clone(), forward);
  harness.check()?;
  Ok(harness)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::asm::compile;
  use crate::ty::Type;

  fn base() -> Contract {
    compile("
      contract Pair
        function _swap(a: uint64, b: uint64) internal returns (uint64, uint64)
          ret b a
        end
        function total(a: uint64, b: uint64) external returns (uint64)
          var s: uint64
          s = add a b
          ret s
        end
    ").unwrap().resolve("Pair").unwrap()
  }

  #[test]
  fn forwards_with_identical_signature() {
    let harness = expose(&base(), "_swap", "swap").unwrap();
    assert_eq!(harness.name, "PairHarness");
    assert_eq!(harness.base.as_deref(), Some("Pair"));
    let entry = harness.function("swap").unwrap();
    assert_eq!(entry.visibility, Visibility::External);
    assert_eq!(entry.param_types(), vec![Type::U64, Type::U64]);
    assert_eq!(entry.returns, vec![Type::U64, Type::U64]);
    assert_eq!(entry.code[0], Bytecode::Call(vec![2, 3], Operation::Invoke("_swap".to_string()), vec![0, 1]));
    assert!(harness.function("_swap").is_some());
    assert_eq!(harness.entry_points().count(), 2);
  }

  #[test]
  fn refuses_bad_targets() {
    assert!(matches!(expose(&base(), "_missing", "missing"), Err(Error::Setup(_))));
    assert!(matches!(expose(&base(), "total", "total2"), Err(Error::Setup(_))));
    assert!(matches!(expose(&base(), "_swap", "total"), Err(Error::Setup(_))));
  }
}

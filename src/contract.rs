//! Compiled contracts: functions, visibility, inheritance and the static
//! checks a program must pass before it can be deployed.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use itertools::Itertools;

use crate::bytecode::{Bytecode, CodeOffset, Constant, Label, Operation, TempIndex};
use crate::error::{Error, Result};
use crate::ty::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
  /// Callable from other functions of the contract only.
  Internal,
  /// Callable by transactions (and internally).
  External,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
  pub name: String,
  pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
  pub name: String,
  pub visibility: Visibility,
  /// Parameters occupy the first temporaries, in declaration order.
  pub params: Vec<Param>,
  pub returns: Vec<Type>,
  /// Every temporary of the body, parameters included.
  pub locals: Vec<Param>,
  pub code: Vec<Bytecode>,
  /// Source line of each instruction; 0 for generated code.
  pub lines: Vec<usize>,
}

impl Function {
  pub fn param_types(&self) -> Vec<Type> {
    self.params.iter().map(|p| p.ty).collect()
  }

  pub fn local_type(&self, t: TempIndex) -> Option<Type> {
    self.locals.get(t).map(|p| p.ty)
  }

  /// ABI signature, e.g. `fromUnderlying(uint256,uint256,bool)`.
  pub fn signature(&self) -> String {
    format!("{}({})", self.name, self.params.iter().map(|p| p.ty.abi_name()).format(","))
  }

  pub fn label_offsets(&self) -> BTreeMap<Label, CodeOffset> {
    self.code.iter().enumerate()
      .filter_map(|(offset, instr)| match instr {
        Bytecode::Label(l) => Some((*l, offset as CodeOffset)),
        _ => None,
      })
      .collect()
  }

  fn line(&self, offset: usize) -> usize {
    self.lines.get(offset).copied().unwrap_or(0)
  }

  /// Type-check the body against `contract`, which resolves callees.
  pub fn check(&self, contract: &Contract) -> Result<()> {
    let fail = |offset: usize, message: String| Error::compile(
      self.line(offset), format!("in `{}`: {}", self.name, message)
    );
    if self.locals.len() < self.params.len()
      || self.params.iter().zip(self.locals.iter()).any(|(p, l)| p != l) {
      return Err(fail(0, "parameters must be the leading locals".to_string()));
    }
    if self.code.len() > CodeOffset::MAX as usize {
      return Err(fail(0, "function body is too long".to_string()));
    }
    match self.code.last() {
      None => return Err(fail(0, "empty body".to_string())),
      Some(last) if !last.is_terminator() => {
        return Err(fail(self.code.len() - 1, "control reaches the end of the function".to_string()))
      }
      _ => {}
    }
    let mut labels = BTreeSet::new();
    for (offset, instr) in self.code.iter().enumerate() {
      if let Bytecode::Label(l) = instr {
        if !labels.insert(*l) {
          return Err(fail(offset, format!("label L{} defined twice", l)));
        }
      }
    }
    let ty = |offset: usize, t: TempIndex| self.local_type(t)
      .ok_or_else(|| fail(offset, format!("unknown temporary $t{}", t)));
    let tys = |offset: usize, ts: &[TempIndex]| ts.iter().map(|t| ty(offset, *t)).collect::<Result<Vec<_>>>();
    for (offset, instr) in self.code.iter().enumerate() {
      match instr {
        Bytecode::Load(dst, c) => {
          let expected = constant_type(c);
          if ty(offset, *dst)? != expected {
            return Err(fail(offset, format!("cannot load a {} constant into $t{}", expected, dst)));
          }
        }
        Bytecode::Assign(dst, src) => {
          if ty(offset, *dst)? != ty(offset, *src)? {
            return Err(fail(offset, format!("type mismatch in $t{} := $t{}", dst, src)));
          }
        }
        Bytecode::Call(dsts, op, srcs) => {
          let (expected_srcs, expected_dsts) = signature_of(op, &tys(offset, srcs)?, contract)
            .map_err(|message| fail(offset, message))?;
          if tys(offset, srcs)? != expected_srcs {
            return Err(fail(offset, format!(
              "`{}` expects ({}), got ({})", op.mnemonic(),
              expected_srcs.iter().format(", "), tys(offset, srcs)?.iter().format(", "),
            )));
          }
          if tys(offset, dsts)? != expected_dsts {
            return Err(fail(offset, format!(
              "`{}` produces ({}), assigned to ({})", op.mnemonic(),
              expected_dsts.iter().format(", "), tys(offset, dsts)?.iter().format(", "),
            )));
          }
        }
        Bytecode::Label(_) => {}
        Bytecode::Jump(l) => {
          if !labels.contains(l) {
            return Err(fail(offset, format!("undefined label L{}", l)));
          }
        }
        Bytecode::Branch(then_label, else_label, cond) => {
          for l in [then_label, else_label] {
            if !labels.contains(l) {
              return Err(fail(offset, format!("undefined label L{}", l)));
            }
          }
          if ty(offset, *cond)? != Type::Bool {
            return Err(fail(offset, format!("branch condition $t{} is not a bool", cond)));
          }
        }
        Bytecode::Ret(srcs) => {
          if tys(offset, srcs)? != self.returns {
            return Err(fail(offset, format!("returns ({}), declared ({})",
              tys(offset, srcs)?.iter().format(", "), self.returns.iter().format(", "))));
          }
        }
        Bytecode::Revert => {}
      }
    }
    Ok(())
  }
}

/// Types of the arguments and results of `op`, given the argument types.
fn signature_of(op: &Operation, args: &[Type], contract: &Contract) -> std::result::Result<(Vec<Type>, Vec<Type>), String> {
  use Operation::*;
  let integer = |i: usize| match args.get(i) {
    Some(t) if t.is_integer() => Ok(*t),
    Some(t) => Err(format!("`{}` expects integers, got {}", op.mnemonic(), t)),
    None => Err(format!("`{}` is missing operands", op.mnemonic())),
  };
  let sig = match op {
    Invoke(name) => {
      let callee = contract.function(name).ok_or_else(|| format!("call to undefined function `{}`", name))?;
      (callee.param_types(), callee.returns.clone())
    }
    Not => (vec![Type::Bool], vec![Type::Bool]),
    CastU8 => (vec![integer(0)?], vec![Type::U8]),
    CastU64 => (vec![integer(0)?], vec![Type::U64]),
    CastU128 => (vec![integer(0)?], vec![Type::U128]),
    CastU256 => (vec![integer(0)?], vec![Type::U256]),
    Add | Sub | Mul | Div | Mod | BitOr | BitAnd | Xor => {
      let t = integer(0)?;
      (vec![t, t], vec![t])
    }
    Lt | Gt | Le | Ge => {
      let t = integer(0)?;
      (vec![t, t], vec![Type::Bool])
    }
    Or | And => (vec![Type::Bool, Type::Bool], vec![Type::Bool]),
    Eq | Neq => {
      let t = args.first().copied().ok_or_else(|| format!("`{}` is missing operands", op.mnemonic()))?;
      (vec![t, t], vec![Type::Bool])
    }
  };
  Ok(sig)
}

pub fn constant_type(c: &Constant) -> Type {
  match c {
    Constant::Bool(_) => Type::Bool,
    Constant::U8(_) => Type::U8,
    Constant::U64(_) => Type::U64,
    Constant::U128(_) => Type::U128,
    Constant::U256(_) => Type::U256,
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contract {
  pub name: String,
  pub base: Option<String>,
  pub functions: BTreeMap<String, Function>,
  /// Source line of the declaration; 0 for generated contracts.
  pub line: usize,
}

impl Contract {
  pub fn function(&self, name: &str) -> Option<&Function> {
    self.functions.get(name)
  }

  /// Functions a transaction may call.
  pub fn entry_points(&self) -> impl Iterator<Item = &Function> {
    self.functions.values().filter(|f| f.visibility == Visibility::External)
  }

  /// Run the static checks of every function.
  pub fn check(&self) -> Result<()> {
    self.functions.values().try_for_each(|f| f.check(self))
  }
}

/// The contracts of one compilation unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
  pub contracts: Vec<Contract>,
}

impl Program {
  pub fn get(&self, name: &str) -> Option<&Contract> {
    self.contracts.iter().find(|c| c.name == name)
  }

  /// Flatten the inheritance chain of `name`. Functions of a derived
  /// contract override base functions of the same name.
  pub fn resolve(&self, name: &str) -> Result<Contract> {
    let contract = self.get(name)
      .ok_or_else(|| Error::Setup(format!("contract `{}` not found in program", name)))?;
    let mut chain = vec![contract];
    let mut seen = BTreeSet::new();
    seen.insert(contract.name.as_str());
    while let Some(base) = chain.last().copied().and_then(|c| c.base.as_deref()) {
      let derived = chain.last().map(|c| c.line).unwrap_or(0);
      let base_contract = self.get(base)
        .ok_or_else(|| Error::compile(derived, format!("unknown base contract `{}`", base)))?;
      if !seen.insert(base_contract.name.as_str()) {
        return Err(Error::compile(derived, format!("inheritance cycle through `{}`", base)));
      }
      chain.push(base_contract);
    }
    let mut functions = BTreeMap::new();
    for c in chain.iter().rev() {
      for (fname, f) in &c.functions {
        functions.insert(fname.clone(), f.clone());
      }
    }
    let resolved = Contract {
      name: contract.name.clone(),
      base: contract.base.clone(),
      functions,
      line: contract.line,
    };
    resolved.check()?;
    Ok(resolved)
  }
}

impl fmt::Display for Function {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let visibility = match self.visibility {
      Visibility::Internal => "internal",
      Visibility::External => "external",
    };
    writeln!(f, "function {} {} returns ({})", self.signature(), visibility, self.returns.iter().format(", "))?;
    for instr in &self.code {
      writeln!(f, "  {}", instr)?;
    }
    Ok(())
  }
}

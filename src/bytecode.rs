use std::fmt;

use itertools::Itertools;
use num::BigUint;

pub type CodeOffset = u16;
pub type TempIndex = usize;
pub type Label = u16;

/// Closed values appearing in code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    Bool(bool),
    U8(u8),
    U64(u64),
    U128(u128),
    U256(BigUint),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    // Calls
    Invoke(String),
    // Unary
    Not,
    CastU8,
    CastU64,
    CastU128,
    CastU256,
    // Binary
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitOr,
    BitAnd,
    Xor,
    Lt,
    Gt,
    Le,
    Ge,
    Or,
    And,
    Eq,
    Neq,
}

impl Operation {
    pub fn from_mnemonic(name: &str) -> Option<Self> {
        use Operation::*;
        let op = match name {
            "not" => Not,
            "cast_u8" => CastU8,
            "cast_u64" => CastU64,
            "cast_u128" => CastU128,
            "cast_u256" => CastU256,
            "add" => Add,
            "sub" => Sub,
            "mul" => Mul,
            "div" => Div,
            "mod" => Mod,
            "bitor" => BitOr,
            "bitand" => BitAnd,
            "xor" => Xor,
            "lt" => Lt,
            "gt" => Gt,
            "le" => Le,
            "ge" => Ge,
            "or" => Or,
            "and" => And,
            "eq" => Eq,
            "neq" => Neq,
            _ => return None,
        };
        Some(op)
    }

    pub fn mnemonic(&self) -> &str {
        use Operation::*;
        match self {
            Invoke(_) => "call",
            Not => "not",
            CastU8 => "cast_u8",
            CastU64 => "cast_u64",
            CastU128 => "cast_u128",
            CastU256 => "cast_u256",
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Div => "div",
            Mod => "mod",
            BitOr => "bitor",
            BitAnd => "bitand",
            Xor => "xor",
            Lt => "lt",
            Gt => "gt",
            Le => "le",
            Ge => "ge",
            Or => "or",
            And => "and",
            Eq => "eq",
            Neq => "neq",
        }
    }

    /// Gas charged for the operation, in the spirit of the yellow paper tiers.
    pub fn gas(&self) -> u64 {
        use Operation::*;
        match self {
            Invoke(_) => 40,
            Mul | Div | Mod => 5,
            _ => 3,
        }
    }
}

/// Register-based bytecode of a function body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bytecode {
    Load(TempIndex, Constant),
    Assign(TempIndex, TempIndex),
    Call(Vec<TempIndex>, Operation, Vec<TempIndex>),
    Label(Label),
    Jump(Label),
    /// Branch(then, else, condition)
    Branch(Label, Label, TempIndex),
    Ret(Vec<TempIndex>),
    Revert,
}

impl Bytecode {
    pub fn gas(&self) -> u64 {
        match self {
            Bytecode::Load(_, _) | Bytecode::Assign(_, _) => 3,
            Bytecode::Call(_, op, _) => op.gas(),
            Bytecode::Label(_) => 1,
            Bytecode::Jump(_) => 8,
            Bytecode::Branch(_, _, _) => 10,
            Bytecode::Ret(_) | Bytecode::Revert => 0,
        }
    }

    /// True for instructions after which control never falls through.
    pub fn is_terminator(&self) -> bool {
        matches!(self, Bytecode::Jump(_) | Bytecode::Branch(_, _, _) | Bytecode::Ret(_) | Bytecode::Revert)
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Bool(b) => write!(f, "{}", b),
            Constant::U8(x) => write!(f, "{}u8", x),
            Constant::U64(x) => write!(f, "{}u64", x),
            Constant::U128(x) => write!(f, "{}u128", x),
            Constant::U256(x) => write!(f, "{}", x),
        }
    }
}

impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bytecode::Load(dst, c) => write!(f, "$t{} := {}", dst, c),
            Bytecode::Assign(dst, src) => write!(f, "$t{} := $t{}", dst, src),
            Bytecode::Call(dsts, op, srcs) => {
                if !dsts.is_empty() {
                    write!(f, "{} := ", dsts.iter().map(|t| format!("$t{}", t)).format(", "))?;
                }
                match op {
                    Operation::Invoke(name) => write!(f, "call {}", name)?,
                    op => write!(f, "{}", op.mnemonic())?,
                }
                write!(f, "({})", srcs.iter().map(|t| format!("$t{}", t)).format(", "))
            }
            Bytecode::Label(l) => write!(f, "L{}:", l),
            Bytecode::Jump(l) => write!(f, "jump L{}", l),
            Bytecode::Branch(then_label, else_label, cond) => write!(f, "if ($t{}) goto L{} else goto L{}", cond, then_label, else_label),
            Bytecode::Ret(srcs) => write!(f, "return ({})", srcs.iter().map(|t| format!("$t{}", t)).format(", ")),
            Bytecode::Revert => write!(f, "revert"),
        }
    }
}

//! Compiler for the textual contract language.
//!
//! ```text
//! const SCALE: uint256 = 1000000000000000000
//!
//! contract Token
//!   function scale(x: uint256) internal returns (uint256)
//!     var s: uint256
//!     s = const SCALE
//!     s = call mul x s
//!     ret s
//!   end
//!
//! contract Harness is Token
//!   ...
//! ```
//!
//! Instructions are `d = const lit`, `d = s`, `d1, d2 = op s1 s2`,
//! `d = call f a b`, `call f a b`, `br c then else`, `jmp l`, `l:`,
//! `ret a b` and `revert`. `//` starts a comment.

use std::collections::BTreeMap;

use num::{BigUint, Num, ToPrimitive};

use crate::bytecode::{Bytecode, Constant, Label, Operation, TempIndex};
use crate::contract::{Contract, Function, Param, Program, Visibility};
use crate::error::{Error, Result};
use crate::ty::Type;

/// Compile `source` into a program. Every contract is resolved, so a
/// program that compiles can be deployed.
pub fn compile(source: &str) -> Result<Program> {
    let mut parser = Parser::default();
    for (i, raw) in source.lines().enumerate() {
        let line = i + 1;
        let text = match raw.find("//") {
            Some(pos) => &raw[..pos],
            None => raw,
        }.trim();
        if !text.is_empty() {
            parser.line(line, text)?;
        }
    }
    let program = parser.finish()?;
    for contract in &program.contracts {
        program.resolve(&contract.name)?;
    }
    Ok(program)
}

// An instruction whose operands are still names.
enum RawInstr {
    Load(String, String),
    Assign(String, String),
    Call(Vec<String>, Operation, Vec<String>),
    Label(String),
    Jump(String),
    Branch(String, String, String),
    Ret(Vec<String>),
    Revert,
}

struct FunctionBuilder {
    name: String,
    visibility: Visibility,
    params: Vec<Param>,
    returns: Vec<Type>,
    locals: Vec<Param>,
    body: Vec<(usize, RawInstr)>,
    line: usize,
}

#[derive(Default)]
struct Parser {
    constants: BTreeMap<String, (Type, Constant)>,
    contracts: Vec<Contract>,
    current: Option<Contract>,
    function: Option<FunctionBuilder>,
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn identifier(line: usize, s: &str) -> Result<String> {
    if is_identifier(s) {
        Ok(s.to_string())
    } else {
        Err(Error::compile(line, format!("`{}` is not an identifier", s)))
    }
}

fn parse_type(line: usize, s: &str) -> Result<Type> {
    Type::from_abi_name(s).ok_or_else(|| Error::compile(line, format!("unknown type `{}`", s.trim())))
}

// `name: type`
fn parse_decl(line: usize, s: &str) -> Result<Param> {
    let (name, ty) = s.split_once(':')
        .ok_or_else(|| Error::compile(line, format!("expected `name: type`, found `{}`", s.trim())))?;
    Ok(Param { name: identifier(line, name.trim())?, ty: parse_type(line, ty)? })
}

/// Parse a literal of type `ty`.
pub fn parse_literal(line: usize, ty: Type, s: &str) -> Result<Constant> {
    let s = s.trim();
    if ty == Type::Bool {
        return match s {
            "true" => Ok(Constant::Bool(true)),
            "false" => Ok(Constant::Bool(false)),
            _ => Err(Error::compile(line, format!("`{}` is not a bool literal", s))),
        };
    }
    let digits = s.replace('_', "");
    let parsed = match digits.strip_prefix("0x") {
        Some(hex) => BigUint::from_str_radix(hex, 16),
        None => BigUint::from_str_radix(&digits, 10),
    };
    let n = parsed.map_err(|_| Error::compile(line, format!("`{}` is not an integer literal", s)))?;
    if n.bits() > ty.bits() as u64 {
        return Err(Error::compile(line, format!("literal {} does not fit {}", n, ty)));
    }
    let out_of_range = || Error::compile(line, format!("literal {} does not fit {}", s, ty));
    Ok(match ty {
        Type::U8 => Constant::U8(n.to_u8().ok_or_else(out_of_range)?),
        Type::U64 => Constant::U64(n.to_u64().ok_or_else(out_of_range)?),
        Type::U128 => Constant::U128(n.to_u128().ok_or_else(out_of_range)?),
        _ => Constant::U256(n),
    })
}

impl Parser {
    fn line(&mut self, line: usize, text: &str) -> Result<()> {
        let (keyword, rest) = match text.split_once(char::is_whitespace) {
            Some((k, r)) => (k, r.trim()),
            None => (text, ""),
        };
        if self.function.is_some() {
            return match keyword {
                "end" if rest.is_empty() => self.end_function(line),
                "var" => {
                    let decl = parse_decl(line, rest)?;
                    self.declare(line, decl)
                }
                _ => {
                    let instr = parse_instr(line, text)?;
                    if let Some(f) = self.function.as_mut() {
                        f.body.push((line, instr));
                    }
                    Ok(())
                }
            };
        }
        match keyword {
            "const" => self.constant(line, rest),
            "contract" => self.contract(line, rest),
            "function" => self.function(line, rest),
            _ => Err(Error::compile(line, format!("unexpected `{}`", text))),
        }
    }

    // const NAME: type = literal
    fn constant(&mut self, line: usize, rest: &str) -> Result<()> {
        let (decl, lit) = rest.split_once('=')
            .ok_or_else(|| Error::compile(line, "expected `const NAME: type = literal`"))?;
        let Param { name, ty } = parse_decl(line, decl)?;
        let value = parse_literal(line, ty, lit)?;
        if self.constants.insert(name.clone(), (ty, value)).is_some() {
            return Err(Error::compile(line, format!("constant `{}` defined twice", name)));
        }
        Ok(())
    }

    // contract Name [is Base]
    fn contract(&mut self, line: usize, rest: &str) -> Result<()> {
        let words: Vec<&str> = rest.split_whitespace().collect();
        let (name, base) = match words.as_slice() {
            [name] => (identifier(line, name)?, None),
            [name, "is", base] => (identifier(line, name)?, Some(identifier(line, base)?)),
            _ => return Err(Error::compile(line, "expected `contract Name [is Base]`")),
        };
        if self.contracts.iter().any(|c| c.name == name) || self.current.as_ref().map_or(false, |c| c.name == name) {
            return Err(Error::compile(line, format!("contract `{}` defined twice", name)));
        }
        if let Some(done) = self.current.take() {
            self.contracts.push(done);
        }
        self.current = Some(Contract { name, base, functions: BTreeMap::new(), line });
        Ok(())
    }

    // function name(a: t, ...) internal|external [returns (t, ...)]
    fn function(&mut self, line: usize, rest: &str) -> Result<()> {
        let contract = self.current.as_ref()
            .ok_or_else(|| Error::compile(line, "function outside of a contract"))?;
        let open = rest.find('(').ok_or_else(|| Error::compile(line, "expected a parameter list"))?;
        let close = rest.find(')').ok_or_else(|| Error::compile(line, "unclosed parameter list"))?;
        if close < open {
            return Err(Error::compile(line, "malformed parameter list"));
        }
        let name = identifier(line, rest[..open].trim())?;
        if contract.functions.contains_key(&name) {
            return Err(Error::compile(line, format!("function `{}` defined twice in `{}`", name, contract.name)));
        }
        let params = rest[open + 1..close].split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| parse_decl(line, p))
            .collect::<Result<Vec<_>>>()?;
        let tail = rest[close + 1..].trim();
        let (visibility, tail) = match tail.split_once(char::is_whitespace) {
            Some((v, t)) => (v, t.trim()),
            None => (tail, ""),
        };
        let visibility = match visibility {
            "internal" | "private" => Visibility::Internal,
            "external" | "public" => Visibility::External,
            other => return Err(Error::compile(line, format!("unknown visibility `{}`", other))),
        };
        let returns = if tail.is_empty() {
            Vec::new()
        } else {
            let list = tail.strip_prefix("returns")
                .map(str::trim)
                .and_then(|t| t.strip_prefix('('))
                .and_then(|t| t.strip_suffix(')'))
                .ok_or_else(|| Error::compile(line, "expected `returns (type, ...)`"))?;
            list.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(|t| parse_type(line, t))
                .collect::<Result<Vec<_>>>()?
        };
        let mut builder = FunctionBuilder {
            name,
            visibility,
            params: params.clone(),
            returns,
            locals: Vec::new(),
            body: Vec::new(),
            line,
        };
        for p in params {
            if builder.locals.iter().any(|l| l.name == p.name) {
                return Err(Error::compile(line, format!("parameter `{}` declared twice", p.name)));
            }
            builder.locals.push(p);
        }
        self.function = Some(builder);
        Ok(())
    }

    fn declare(&mut self, line: usize, decl: Param) -> Result<()> {
        if let Some(f) = self.function.as_mut() {
            if f.locals.iter().any(|l| l.name == decl.name) {
                return Err(Error::compile(line, format!("variable `{}` declared twice", decl.name)));
            }
            f.locals.push(decl);
        }
        Ok(())
    }

    fn end_function(&mut self, line: usize) -> Result<()> {
        let builder = match self.function.take() {
            Some(builder) => builder,
            None => return Err(Error::compile(line, "`end` outside of a function")),
        };
        let function = self.lower(builder)?;
        if let Some(contract) = self.current.as_mut() {
            contract.functions.insert(function.name.clone(), function);
        }
        Ok(())
    }

    // Replace names by temporaries, labels and constants.
    fn lower(&self, builder: FunctionBuilder) -> Result<Function> {
        let FunctionBuilder { name, visibility, params, returns, locals, body, line: _ } = builder;
        let temp = |line: usize, n: &str| -> Result<TempIndex> {
            locals.iter().position(|l| l.name == n)
                .ok_or_else(|| Error::compile(line, format!("undeclared variable `{}` in `{}`", n, name)))
        };
        let temps = |line: usize, ns: &[String]| ns.iter().map(|n| temp(line, n)).collect::<Result<Vec<_>>>();
        let mut labels: BTreeMap<String, Label> = BTreeMap::new();
        for (_, instr) in &body {
            let mentioned: Vec<&String> = match instr {
                RawInstr::Label(l) | RawInstr::Jump(l) => vec![l],
                RawInstr::Branch(_, t, e) => vec![t, e],
                _ => vec![],
            };
            for l in mentioned {
                let next = labels.len() as Label;
                labels.entry(l.clone()).or_insert(next);
            }
        }
        let label = |l: &String| labels[l];
        let mut code = Vec::with_capacity(body.len());
        let mut lines = Vec::with_capacity(body.len());
        for (line, instr) in &body {
            let line = *line;
            let lowered = match instr {
                RawInstr::Load(dst, lit) => {
                    let dst = temp(line, dst)?;
                    let ty = locals[dst].ty;
                    let c = match self.constants.get(lit) {
                        Some((cty, c)) if *cty == ty => c.clone(),
                        Some((cty, _)) => return Err(Error::compile(line, format!(
                            "constant `{}` is a {}, not a {}", lit, cty, ty
                        ))),
                        None => parse_literal(line, ty, lit)?,
                    };
                    Bytecode::Load(dst, c)
                }
                RawInstr::Assign(dst, src) => Bytecode::Assign(temp(line, dst)?, temp(line, src)?),
                RawInstr::Call(dsts, op, srcs) => Bytecode::Call(temps(line, dsts)?, op.clone(), temps(line, srcs)?),
                RawInstr::Label(l) => Bytecode::Label(label(l)),
                RawInstr::Jump(l) => Bytecode::Jump(label(l)),
                RawInstr::Branch(c, t, e) => Bytecode::Branch(label(t), label(e), temp(line, c)?),
                RawInstr::Ret(srcs) => Bytecode::Ret(temps(line, srcs)?),
                RawInstr::Revert => Bytecode::Revert,
            };
            code.push(lowered);
            lines.push(line);
        }
        Ok(Function { name, visibility, params, returns, locals, code, lines })
    }

    fn finish(mut self) -> Result<Program> {
        if let Some(f) = &self.function {
            return Err(Error::compile(f.line, format!("function `{}` is missing `end`", f.name)));
        }
        if let Some(done) = self.current.take() {
            self.contracts.push(done);
        }
        if self.contracts.is_empty() {
            return Err(Error::compile(0, "no contract in source"));
        }
        Ok(Program { contracts: self.contracts })
    }
}

fn parse_instr(line: usize, text: &str) -> Result<RawInstr> {
    if let Some(label) = text.strip_suffix(':') {
        return Ok(RawInstr::Label(identifier(line, label.trim())?));
    }
    let (lhs, rhs) = match text.split_once('=') {
        Some((lhs, rhs)) => (Some(lhs), rhs.trim()),
        None => (None, text),
    };
    let words: Vec<&str> = rhs.split_whitespace().collect();
    let names = |ws: &[&str]| ws.iter().map(|w| identifier(line, w)).collect::<Result<Vec<_>>>();
    let dsts = match lhs {
        Some(lhs) => lhs.split(',').map(|d| identifier(line, d.trim())).collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };
    let single = |what: &str| -> Result<String> {
        match dsts.as_slice() {
            [d] => Ok(d.clone()),
            _ => Err(Error::compile(line, format!("`{}` assigns exactly one variable", what))),
        }
    };
    let instr = match words.as_slice() {
        [] => return Err(Error::compile(line, "missing right-hand side")),
        ["const", lit] => RawInstr::Load(single("const")?, lit.to_string()),
        ["call", f, args @ ..] => RawInstr::Call(dsts.clone(), Operation::Invoke(identifier(line, f)?), names(args)?),
        ["br", c, t, e] if lhs.is_none() => RawInstr::Branch(identifier(line, c)?, identifier(line, t)?, identifier(line, e)?),
        ["jmp", l] if lhs.is_none() => RawInstr::Jump(identifier(line, l)?),
        ["ret", srcs @ ..] if lhs.is_none() => RawInstr::Ret(names(srcs)?),
        ["revert"] if lhs.is_none() => RawInstr::Revert,
        [src] if lhs.is_some() && is_identifier(src) => RawInstr::Assign(single("assignment")?, src.to_string()),
        [op, args @ ..] if lhs.is_some() => {
            let op = Operation::from_mnemonic(op)
                .ok_or_else(|| Error::compile(line, format!("unknown operation `{}`", op)))?;
            RawInstr::Call(dsts.clone(), op, names(args)?)
        }
        _ => return Err(Error::compile(line, format!("cannot parse `{}`", text))),
    };
    Ok(instr)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "
        const LIMIT: uint8 = 200

        contract Base
          function clamp(x: uint8) internal returns (uint8)
            var limit: uint8
            var over: bool
            limit = const LIMIT
            over = gt x limit   // saturate
            br over high low
          high:
            ret limit
          low:
            ret x
          end

        contract Child is Base
          function run(x: uint8) external returns (uint8)
            var y: uint8
            y = call clamp x
            ret y
          end
    ";

    #[test]
    fn compiles_and_resolves_inheritance() {
        let program = compile(SOURCE).unwrap();
        assert_eq!(program.contracts.len(), 2);
        let child = program.resolve("Child").unwrap();
        assert!(child.function("clamp").is_some());
        let run = child.function("run").unwrap();
        assert_eq!(run.visibility, Visibility::External);
        assert_eq!(run.signature(), "run(uint8)");
        assert_eq!(run.code[0], Bytecode::Call(vec![1], Operation::Invoke("clamp".to_string()), vec![0]));
        let clamp = child.function("clamp").unwrap();
        assert_eq!(clamp.code[0], Bytecode::Load(1, Constant::U8(200)));
        assert_eq!(clamp.label_offsets().len(), 2);
    }

    fn compile_error(source: &str) -> (usize, String) {
        match compile(source) {
            Err(Error::Compile { line, message }) => (line, message),
            other => panic!("expected a compile error, got {:?}", other),
        }
    }

    #[test]
    fn reports_type_errors_with_lines() {
        let (line, message) = compile_error("contract C\nfunction f(x: uint8) external returns (bool)\nret x\nend\n");
        assert_eq!(line, 3);
        assert!(message.contains("returns"), "{}", message);
    }

    #[test]
    fn rejects_undeclared_variables_and_labels() {
        let (line, _) = compile_error("contract C\nfunction f() external returns (uint8)\ny = const 1\nret y\nend\n");
        assert_eq!(line, 3);
        let (_, message) = compile_error("contract C\nfunction f(c: bool) external\nbr c a b\na:\nrevert\nend\n");
        assert!(message.contains("undefined label"), "{}", message);
    }

    #[test]
    fn rejects_literals_that_do_not_fit() {
        let (line, message) = compile_error("contract C\nfunction f() external returns (uint8)\nvar y: uint8\ny = const 256\nret y\nend\n");
        assert_eq!(line, 4);
        assert!(message.contains("does not fit"), "{}", message);
    }

    #[test]
    fn rejects_fall_through_and_unknown_bases() {
        let (_, message) = compile_error("contract C\nfunction f(x: uint8) external\nx = add x x\nend\n");
        assert!(message.contains("end of the function"), "{}", message);
        let (line, message) = compile_error("contract C is Missing\nfunction f() external\nrevert\nend\n");
        assert_eq!(line, 1);
        assert!(message.contains("Missing"), "{}", message);
    }

    #[test]
    fn rejects_unterminated_function() {
        let (line, _) = compile_error("contract C\nfunction f() external\nrevert\n");
        assert_eq!(line, 2);
    }

    #[test]
    fn parses_hex_and_underscored_literals() {
        assert_eq!(parse_literal(1, Type::U64, "0xff").unwrap(), Constant::U64(255));
        assert_eq!(parse_literal(1, Type::U256, "1_000").unwrap(), Constant::U256(BigUint::from(1000u32)));
        assert!(parse_literal(1, Type::Bool, "1").is_err());
    }
}

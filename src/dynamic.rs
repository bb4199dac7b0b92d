//! Small-step semantics of the contract language.

use symbolic_evaluation::traits::Transition;

use crate::{
    bytecode::{Bytecode, Operation, TempIndex},
    config::OverflowMode,
    state::{EvmState, Frame, TerminationStatus},
    ty::Type,
    value::Value,
};

/// Execute one instruction of `s`, returning its successors.
/// A branch may return two states; every other instruction returns one.
pub fn step<'prog, 'ctx>(mut s: EvmState<'prog, 'ctx>) -> Vec<EvmState<'prog, 'ctx>> {
    let instr = match s.frame().cur_instr() {
        Some(instr) => instr,
        None => {
            let reason = format!("ran past the end of `{}`", s.frame().function.name);
            s.terminate(TerminationStatus::Throw(reason));
            return vec![s];
        }
    };
    if !s.charge(instr.gas()) {
        tracing::debug!(trail = ?s.trail(), gas_used = s.gas_used(), "out of gas");
        return vec![s];
    }
    match instr {
        Bytecode::Load(dst, c) => {
            let val = Value::from_constant(c, s.get_ctx());
            let frame = s.frame_mut();
            frame[*dst] = val;
            frame.ic += 1;
            vec![s]
        }
        Bytecode::Assign(dst, src) => {
            let frame = s.frame_mut();
            frame[*dst] = frame[*src].clone();
            frame.ic += 1;
            vec![s]
        }
        Bytecode::Label(_) => {
            s.frame_mut().ic += 1;
            vec![s]
        }
        Bytecode::Jump(label) => {
            s.frame_mut().jump(*label);
            vec![s]
        }
        Bytecode::Branch(then_label, else_label, cond) => {
            let cond = match s.frame()[*cond].as_bool() {
                Some(b) => b.clone(),
                None => {
                    s.terminate(TerminationStatus::Throw("branch on a non-boolean".to_string()));
                    return vec![s];
                }
            };
            let (taken, not_taken) = s.fork(&cond);
            let mut res = Vec::with_capacity(2);
            if let Some(mut t) = taken {
                t.frame_mut().jump(*then_label);
                res.push(t);
            }
            if let Some(mut e) = not_taken {
                e.frame_mut().jump(*else_label);
                res.push(e);
            }
            res
        }
        Bytecode::Call(dsts, Operation::Invoke(callee), srcs) => {
            invoke(s, dsts, callee, srcs)
        }
        Bytecode::Call(dsts, op, srcs) => operation(s, dsts, op, srcs),
        Bytecode::Ret(srcs) => {
            ret(&mut s, srcs);
            vec![s]
        }
        Bytecode::Revert => {
            tracing::trace!(trail = ?s.trail(), "revert");
            s.terminate(TerminationStatus::Revert);
            vec![s]
        }
    }
}

// Push a frame for `callee`; its results land in `dsts` on return.
fn invoke<'prog, 'ctx>(
    mut s: EvmState<'prog, 'ctx>,
    dsts: &[TempIndex],
    callee: &str,
    srcs: &[TempIndex],
) -> Vec<EvmState<'prog, 'ctx>> {
    match s.contract().function(callee) {
        Some(function) => {
            let args = s.frame().args(srcs);
            let frame = Frame::new(s.get_ctx(), function, args, dsts.to_vec());
            s.frames.push(frame);
        }
        None => {
            s.terminate(TerminationStatus::Throw(format!("call to unknown function `{}`", callee)));
        }
    }
    vec![s]
}

// Pop the current frame. Returning from the entry function ends the transaction.
fn ret<'prog, 'ctx>(s: &mut EvmState<'prog, 'ctx>, srcs: &[TempIndex]) {
    let vals: Vec<Value<'ctx>> = s.frame().args(srcs).iter().map(Value::simplify).collect();
    let callee = s.frames.pop();
    match (s.frames.last_mut(), callee) {
        (Some(caller), Some(callee)) => {
            caller.assign(&callee.ret_dsts, vals);
            caller.ic += 1;
        }
        _ => s.terminate(TerminationStatus::Return(vals)),
    }
}

// Executes a pure operation. Under `OverflowMode::Fault`, wrapping arithmetic
// forks off a throwing state.
fn operation<'prog, 'ctx>(
    s: EvmState<'prog, 'ctx>,
    dsts: &[TempIndex],
    op: &Operation,
    srcs: &[TempIndex],
) -> Vec<EvmState<'prog, 'ctx>> {
    let args = s.frame().args(srcs);
    if s.overflow_mode() == OverflowMode::Fault {
        let overflow = match op {
            Operation::Add => Some(args[0].add_overflows(&args[1])),
            Operation::Sub => Some(args[0].sub_underflows(&args[1])),
            Operation::Mul => Some(args[0].mul_overflows(&args[1])),
            _ => None,
        };
        if let Some(overflow) = overflow {
            let (faulty, fine) = s.fork(&overflow);
            let mut res = Vec::with_capacity(2);
            if let Some(mut f) = faulty {
                if !f.is_final() {
                    tracing::trace!(trail = ?f.trail(), "arithmetic overflow");
                    f.terminate(TerminationStatus::Throw(format!("arithmetic overflow in {}", op.mnemonic())));
                }
                res.push(f);
            }
            if let Some(f) = fine {
                if f.is_final() {
                    res.push(f);
                } else {
                    res.push(write_results(f, dsts, pure_operation(op, args)));
                }
            }
            return res;
        }
    }
    let vals = pure_operation(op, args);
    vec![write_results(s, dsts, vals)]
}

fn write_results<'prog, 'ctx>(
    mut s: EvmState<'prog, 'ctx>,
    dsts: &[TempIndex],
    vals: Vec<Value<'ctx>>,
) -> EvmState<'prog, 'ctx> {
    let frame = s.frame_mut();
    frame.assign(dsts, vals.iter().map(Value::simplify).collect());
    frame.ic += 1;
    s
}

// the arity of inputs is checked at compile time
fn pure_operation<'ctx>(op: &Operation, x: Vec<Value<'ctx>>) -> Vec<Value<'ctx>> {
    use Operation::*;
    let unary = |x: &[Value<'ctx>]| {
        assert_eq!(x.len(), 1);
        x[0].clone()
    };
    let binary = |x: &[Value<'ctx>]| {
        assert_eq!(x.len(), 2);
        (x[0].clone(), x[1].clone())
    };
    let res = match op {
        Invoke(_) => unreachable!("calls are not pure"),
        // Unary
        Not => !unary(&x),
        CastU8 => unary(&x).cast(&Type::U8),
        CastU64 => unary(&x).cast(&Type::U64),
        CastU128 => unary(&x).cast(&Type::U128),
        CastU256 => unary(&x).cast(&Type::U256),
        // Binary
        Add => { let (a, b) = binary(&x); a + b }
        Sub => { let (a, b) = binary(&x); a - b }
        Mul => { let (a, b) = binary(&x); a * b }
        Div => { let (a, b) = binary(&x); a / b }
        Mod => { let (a, b) = binary(&x); a % b }
        BitOr => { let (a, b) = binary(&x); a | b }
        BitAnd => { let (a, b) = binary(&x); a & b }
        Xor => { let (a, b) = binary(&x); a ^ b }
        Lt => x[0].lt(&x[1]),
        Gt => x[0].gt(&x[1]),
        Le => x[0].le(&x[1]),
        Ge => x[0].ge(&x[1]),
        Or => x[0].or(&x[1]),
        And => x[0].and(&x[1]),
        Eq => x[0].eq(&x[1]),
        Neq => x[0].neq(&x[1]),
    };
    vec![res]
}

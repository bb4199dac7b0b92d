use z3::{
    ast::{Ast, Bool},
    Context, SatResult, Solver,
};

/// Boolean sort
pub type Constraint<'ctx> = Bool<'ctx>;

/// Return false if the constraint is unsatisfiable.
/// An inconclusive check counts as satisfiable, so that nothing is pruned by mistake.
pub fn sat<'ctx>(constraint: &Constraint<'ctx>) -> bool {
    let solver = Solver::new(constraint.get_ctx());
    solver.assert(constraint);
    match solver.check() {
        SatResult::Unsat => false,
        _ => true,
    }
}

/// The conjunction of `constraints`; `true` when empty.
pub fn conjunction<'ctx>(ctx: &'ctx Context, constraints: &[Constraint<'ctx>]) -> Constraint<'ctx> {
    let refs: Vec<&Bool<'ctx>> = constraints.iter().collect();
    if refs.is_empty() {
        Bool::from_bool(ctx, true)
    } else {
        Bool::and(ctx, &refs).simplify()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use z3::{ast::BV, Config};

    #[test]
    fn prunes_contradictions() {
        let ctx = Context::new(&Config::new());
        let x = BV::new_const(&ctx, "x", 8);
        let zero = BV::from_u64(&ctx, 0, 8);
        let nonzero = !x._eq(&zero);
        assert!(sat(&nonzero));
        assert!(!sat(&(&nonzero & &x._eq(&zero))));
        let both = conjunction(&ctx, &[nonzero.clone(), x.bvult(&BV::from_u64(&ctx, 2, 8))]);
        let solver = Solver::new(&ctx);
        solver.assert(&both);
        solver.assert(&!x._eq(&BV::from_u64(&ctx, 1, 8)));
        assert_eq!(solver.check(), SatResult::Unsat);
        assert_eq!(conjunction(&ctx, &[]).as_bool(), Some(true));
    }
}

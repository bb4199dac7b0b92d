use z3::{Config, Context, Params, Solver};

use crate::config::SolverConfig;

/// Create the z3 context of one exploration session.
pub fn new_context(config: &SolverConfig) -> Context {
    let mut z3_config = Config::new();
    z3_config.set_timeout_msec(config.timeout_ms());
    z3_config.set_model_generation(true);
    Context::new(&z3_config)
}

/// Create a solver honouring the session's timeout and seed.
pub fn new_solver<'ctx>(ctx: &'ctx Context, config: &SolverConfig) -> Solver<'ctx> {
    let solver = Solver::new(ctx);
    let mut params = Params::new(ctx);
    params.set_u32("timeout", config.timeout_ms() as u32);
    params.set_u32("random_seed", config.seed);
    solver.set_params(&params);
    solver
}

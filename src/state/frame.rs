use super::*;

/// Activation record of a function.
#[derive(Clone, Debug)]
pub struct Frame<'prog, 'ctx> {
    pub function: &'prog Function,
    label_to_offset: BTreeMap<Label, CodeOffset>,
    /// Instruction Counter
    pub ic: CodeOffset,
    locals: Vec<Value<'ctx>>,
    /// Temporaries of the caller receiving the results.
    pub ret_dsts: Vec<TempIndex>,
}

impl<'prog, 'ctx> Index<TempIndex> for Frame<'prog, 'ctx> {
    type Output = Value<'ctx>;

    fn index(&self, index: TempIndex) -> &Self::Output {
        self.locals.index(index)
    }
}

impl<'prog, 'ctx> IndexMut<TempIndex> for Frame<'prog, 'ctx> {
    fn index_mut(&mut self, index: TempIndex) -> &mut Self::Output {
        self.locals.index_mut(index)
    }
}

impl<'prog, 'ctx> Frame<'prog, 'ctx> {
    /// Enter `function` with `args` bound to its parameters.
    /// Other locals start at their zero value.
    pub fn new(
        ctx: &'ctx Context,
        function: &'prog Function,
        args: Vec<Value<'ctx>>,
        ret_dsts: Vec<TempIndex>,
    ) -> Self {
        debug_assert_eq!(args.len(), function.params.len());
        let mut locals = args;
        for local in function.locals.iter().skip(locals.len()) {
            locals.push(Value::zero(&local.ty, ctx));
        }
        Self {
            function,
            label_to_offset: function.label_offsets(),
            ic: 0,
            locals,
            ret_dsts,
        }
    }

    /// The instruction to be executed, `None` past the end of the body.
    pub fn cur_instr(&self) -> Option<&'prog Bytecode> {
        self.function.code.get(self.ic as usize)
    }

    pub fn jump(&mut self, label: Label) {
        // labels are checked at compile time
        self.ic = self.label_to_offset[&label];
    }

    /// Values of `srcs`, in order.
    pub fn args(&self, srcs: &[TempIndex]) -> Vec<Value<'ctx>> {
        srcs.iter().map(|&t| self[t].clone()).collect()
    }

    /// Store `vals` into `dsts`, pairwise.
    pub fn assign(&mut self, dsts: &[TempIndex], vals: Vec<Value<'ctx>>) {
        debug_assert_eq!(dsts.len(), vals.len());
        for (&dst, val) in dsts.iter().zip(vals.into_iter()) {
            self[dst] = val;
        }
    }
}

impl<'prog, 'ctx> fmt::Display for Frame<'prog, 'ctx> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{} @ {}", self.function.name, self.ic)?;
        for (local, val) in self.function.locals.iter().zip(self.locals.iter()) {
            writeln!(f, "  {}: {} = {}", local.name, local.ty, val)?;
        }
        Ok(())
    }
}

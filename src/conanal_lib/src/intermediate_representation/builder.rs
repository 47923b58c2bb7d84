use super::*;

/// Incremental construction of a [`Program`].
///
/// Handles are handed out in creation order.
/// Blocks are appended to the block list of their function,
/// so the first block created for a function becomes its entry block.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    program: Program,
}

impl ProgramBuilder {
    /// Create an empty builder.
    pub fn new() -> ProgramBuilder {
        ProgramBuilder::default()
    }

    /// Add a function with the given number of formal arguments.
    /// The function stays a declaration until a block is added to it.
    pub fn function(&mut self, name: &str, num_args: usize) -> FuncId {
        self.program.functions.push(Function {
            name: name.to_string(),
            num_args,
            blocks: Vec::new(),
            is_intrinsic: false,
        });
        FuncId::new(self.program.functions.len() - 1)
    }

    /// Add a compiler intrinsic declaration.
    pub fn intrinsic(&mut self, name: &str, num_args: usize) -> FuncId {
        let func = self.function(name, num_args);
        self.program.functions[func.index()].is_intrinsic = true;
        func
    }

    /// Add a global variable.
    pub fn global(&mut self, name: &str) -> GlobalId {
        self.program.globals.push(Global {
            name: name.to_string(),
        });
        GlobalId::new(self.program.globals.len() - 1)
    }

    /// Append a new empty block to the given function.
    pub fn block(&mut self, func: FuncId, name: &str) -> BlockId {
        let id = BlockId::new(self.program.blocks.len());
        let mut block = Block::new(name);
        block.function = func;
        self.program.blocks.push(block);
        self.program.functions[func.index()].blocks.push(id);
        id
    }

    /// Append an instruction to the given block.
    pub fn push(&mut self, block: BlockId, mut inst: Instruction) -> InstId {
        let id = InstId::new(self.program.instructions.len());
        inst.block = block;
        self.program.instructions.push(inst);
        self.program.blocks[block.index()].instructions.push(id);
        id
    }

    /// Add a control flow edge between two blocks of the same function.
    pub fn edge(&mut self, from: BlockId, to: BlockId) {
        self.program.blocks[from.index()].successors.push(to);
    }

    /// Validate the program and compute all derived fields.
    pub fn build(mut self) -> Result<Program, Error> {
        self.program.normalize()?;
        Ok(self.program)
    }
}

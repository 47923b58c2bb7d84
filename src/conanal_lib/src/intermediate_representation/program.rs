use super::*;
use crate::utils::log::LogMessage;
use std::collections::HashSet;

/// A function of the analyzed program.
///
/// Functions are *single-entry*,
/// i.e. calling a function will execute the first block in the list of basic blocks.
/// A function without blocks is a declaration of an external function,
/// e.g. a function imported from a shared library.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone)]
pub struct Function {
    /// The (linker) name of the function.
    pub name: String,
    /// The number of formal arguments.
    #[serde(default)]
    pub num_args: usize,
    /// The basic blocks of the function. The first block is the entry block.
    #[serde(default)]
    pub blocks: Vec<BlockId>,
    /// Set for compiler intrinsics, which are ignored by all analyses.
    #[serde(default)]
    pub is_intrinsic: bool,
}

impl Function {
    /// Returns `true` if the function has no body in the analyzed program.
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Returns `true` for compiler intrinsics.
    /// Functions in the reserved `llvm.` namespace are always intrinsics.
    pub fn is_intrinsic(&self) -> bool {
        self.is_intrinsic || self.name.starts_with("llvm.")
    }

    /// Get the entry block of the function if it has a body.
    pub fn entry_block(&self) -> Option<BlockId> {
        self.blocks.first().copied()
    }
}

/// A basic block is a sequence of instructions that is only entered at the beginning
/// and only left at the end.
///
/// The control flow successors are stored explicitly.
/// The predecessors are computed by [`Program::normalize`].
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone)]
pub struct Block {
    /// The label of the block.
    pub name: String,
    /// The instructions of the block in order of execution.
    #[serde(default)]
    pub instructions: Vec<InstId>,
    /// The control flow successors of the block.
    #[serde(default)]
    pub successors: Vec<BlockId>,
    /// The control flow predecessors of the block.
    #[serde(skip)]
    pub predecessors: Vec<BlockId>,
    /// The function containing the block.
    #[serde(skip)]
    pub function: FuncId,
}

impl Block {
    /// Create a new empty block with the given label.
    pub fn new(name: impl ToString) -> Block {
        Block {
            name: name.to_string(),
            instructions: Vec::new(),
            successors: Vec::new(),
            predecessors: Vec::new(),
            function: FuncId::default(),
        }
    }
}

/// A global variable.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone)]
pub struct Global {
    /// The name of the global variable.
    pub name: String,
}

/// The whole analyzed program.
///
/// All functions, blocks, instructions and global variables are stored in arenas
/// and reference each other through their handles.
/// Parent links and predecessor lists are not part of the serialized form.
/// They are computed by [`Program::normalize`],
/// which has to be called before the program is handed to any analysis.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
pub struct Program {
    /// The functions of the program, including declarations of external functions.
    pub functions: Vec<Function>,
    /// The basic blocks of all functions.
    pub blocks: Vec<Block>,
    /// The instructions of all blocks.
    pub instructions: Vec<Instruction>,
    /// The global variables.
    #[serde(default)]
    pub globals: Vec<Global>,
}

impl Program {
    /// Get the function for the given handle.
    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.index()]
    }

    /// Get the block for the given handle.
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    /// Get the instruction for the given handle.
    pub fn inst(&self, id: InstId) -> &Instruction {
        &self.instructions[id.index()]
    }

    /// Get the global variable for the given handle.
    pub fn global(&self, id: GlobalId) -> &Global {
        &self.globals[id.index()]
    }

    /// Iterate over all functions together with their handles.
    pub fn iter_functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(index, func)| (FuncId::new(index), func))
    }

    /// Find a function by name.
    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.iter_functions()
            .find(|(_, func)| func.name == name)
            .map(|(id, _)| id)
    }

    /// Get the function containing the given instruction.
    pub fn function_of(&self, inst: InstId) -> FuncId {
        self.block(self.inst(inst).block).function
    }

    /// Get the function a value belongs to.
    /// Returns `None` for constants and global variables.
    pub fn enclosing_function(&self, value: &Value) -> Option<FuncId> {
        match value {
            Value::Inst(inst) => Some(self.function_of(*inst)),
            Value::Arg { function, .. } => Some(*function),
            Value::Const(_) | Value::Global(_) => None,
        }
    }

    /// Iterate over all instructions of a function in layout order,
    /// i.e. block by block in the order of the block list of the function.
    pub fn function_instructions(&self, func: FuncId) -> impl Iterator<Item = InstId> + '_ {
        self.function(func)
            .blocks
            .iter()
            .flat_map(move |block| self.block(*block).instructions.iter().copied())
    }

    /// Returns `true` if the value is the result of an instruction with the given opcode.
    pub fn is_inst_with_opcode(&self, value: &Value, opcode: &Opcode) -> bool {
        match value {
            Value::Inst(inst) => self.inst(*inst).opcode == *opcode,
            _ => false,
        }
    }

    /// Deserialize a program from its JSON representation and normalize it.
    pub fn from_json(json: &str) -> Result<(Program, Vec<LogMessage>), Error> {
        let mut program: Program =
            serde_json::from_str(json).context("Parsing of the program representation failed")?;
        let logs = program.normalize()?;
        Ok((program, logs))
    }

    /// Validate all handles of the program and compute the derived fields,
    /// i.e. the parent links of blocks and instructions and the predecessor lists of blocks.
    ///
    /// Dangling handles and objects with more than one parent are fatal errors.
    /// Suspicious but analyzable constructs are reported as log messages.
    pub fn normalize(&mut self) -> Result<Vec<LogMessage>, Error> {
        let mut logs = Vec::new();
        let mut block_owner: Vec<Option<FuncId>> = vec![None; self.blocks.len()];
        for (func_id, func) in self.functions.iter().enumerate() {
            for block in func.blocks.iter() {
                match block_owner.get_mut(block.index()) {
                    None => bail!("Function {} references unknown block {}", func.name, block),
                    Some(Some(owner)) => bail!(
                        "Block {} is contained in both {} and {}",
                        block,
                        self.functions[owner.index()].name,
                        func.name
                    ),
                    Some(owner) => *owner = Some(FuncId::new(func_id)),
                }
            }
            if func.is_intrinsic() && !func.is_declaration() {
                logs.push(
                    LogMessage::new_debug(format!("Intrinsic {} has a body", func.name))
                        .source("Normalization"),
                );
            }
        }
        let mut inst_owner: Vec<Option<BlockId>> = vec![None; self.instructions.len()];
        for (block_id, owner) in block_owner.iter().enumerate() {
            let func_id = owner.ok_or_else(|| {
                anyhow!("Block {} is not contained in any function", BlockId::new(block_id))
            })?;
            let block = &mut self.blocks[block_id];
            block.function = func_id;
            block.predecessors.clear();
            for inst in block.instructions.iter() {
                match inst_owner.get_mut(inst.index()) {
                    None => bail!("Block {} references unknown instruction {}", block.name, inst),
                    Some(Some(_)) => bail!("Instruction {} is contained in two blocks", inst),
                    Some(owner) => *owner = Some(BlockId::new(block_id)),
                }
            }
        }
        for (inst_id, owner) in inst_owner.iter().enumerate() {
            let block_id = owner.ok_or_else(|| {
                anyhow!("Instruction {} is not contained in any block", InstId::new(inst_id))
            })?;
            self.instructions[inst_id].block = block_id;
        }
        for (inst_id, inst) in self.instructions.iter().enumerate() {
            for operand in inst.operands.iter() {
                self.check_operand(operand)
                    .with_context(|| format!("Invalid operand of {}", InstId::new(inst_id)))?;
            }
            if let Some(callee) = inst.opcode.callee() {
                let targets = match callee {
                    Callee::Direct(func) => std::slice::from_ref(func),
                    Callee::Indirect { candidates } => &candidates[..],
                };
                if let Some(target) = targets
                    .iter()
                    .find(|target| target.index() >= self.functions.len())
                {
                    bail!("Call {} targets unknown function {}", InstId::new(inst_id), target);
                }
            }
        }
        for block_id in 0..self.blocks.len() {
            for succ_index in 0..self.blocks[block_id].successors.len() {
                let succ = self.blocks[block_id].successors[succ_index];
                let Some(succ_block) = self.blocks.get(succ.index()) else {
                    bail!("Block {} has unknown successor {}", BlockId::new(block_id), succ);
                };
                if succ_block.function != self.blocks[block_id].function {
                    bail!(
                        "Block {} jumps into block {} of another function",
                        BlockId::new(block_id),
                        succ
                    );
                }
                let preds = &mut self.blocks[succ.index()].predecessors;
                if !preds.contains(&BlockId::new(block_id)) {
                    preds.push(BlockId::new(block_id));
                }
            }
        }
        for func in self.functions.iter() {
            for block in func.blocks.iter().skip(1) {
                if self.blocks[block.index()].predecessors.is_empty() {
                    logs.push(
                        LogMessage::new_debug(format!(
                            "Block {} of {} is unreachable",
                            self.blocks[block.index()].name,
                            func.name
                        ))
                        .source("Normalization"),
                    );
                }
            }
        }
        Ok(logs)
    }

    /// Check that the handles inside an operand point to existing objects.
    fn check_operand(&self, operand: &Value) -> Result<(), Error> {
        match operand {
            Value::Inst(inst) if inst.index() >= self.instructions.len() => {
                Err(anyhow!("Unknown instruction {}", inst))
            }
            Value::Global(global) if global.index() >= self.globals.len() => {
                Err(anyhow!("Unknown global {}", global))
            }
            Value::Arg { function, index } => match self.functions.get(function.index()) {
                None => Err(anyhow!("Unknown function {}", function)),
                Some(func) if *index >= func.num_args => {
                    Err(anyhow!("{} has no argument {}", func.name, index))
                }
                Some(_) => Ok(()),
            },
            _ => Ok(()),
        }
    }

    /// Get the set of all blocks of a function.
    pub fn function_blocks(&self, func: FuncId) -> HashSet<BlockId> {
        self.function(func).blocks.iter().copied().collect()
    }
}

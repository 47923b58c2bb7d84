//! Numbering of instructions and lookup of instructions by source line.

use crate::intermediate_representation::*;
use itertools::Itertools;
use std::collections::BTreeMap;

/// Dense instruction ids and the mapping from source lines to instructions.
///
/// Ids start at 1 and are assigned in layout order:
/// function by function, each function block by block.
/// The ids are the instruction numbers shown to the user
/// and accepted as manual overrides on the command line.
#[derive(Debug, Clone, Default)]
pub struct InstIndex {
    /// The id of each instruction, indexed by the arena position of the instruction.
    ids: Vec<u64>,
    /// The instruction of each id. Position `i` holds the instruction with id `i + 1`.
    instructions: Vec<InstId>,
    lines: BTreeMap<FileLine, Vec<InstId>>,
    num_unlocated: usize,
}

impl InstIndex {
    /// Number all instructions of the program.
    pub fn new(program: &Program) -> InstIndex {
        let mut index = InstIndex {
            ids: vec![0; program.instructions.len()],
            ..Default::default()
        };
        for (func, _) in program.iter_functions() {
            for inst in program.function_instructions(func) {
                index.instructions.push(inst);
                index.ids[inst.index()] = index.instructions.len() as u64;
                match &program.inst(inst).location {
                    Some(location) => index
                        .lines
                        .entry(location.file_line())
                        .or_default()
                        .push(inst),
                    None => index.num_unlocated += 1,
                }
            }
        }
        index
    }

    /// Get the id of an instruction.
    pub fn id_of(&self, inst: InstId) -> u64 {
        self.ids[inst.index()]
    }

    /// Get the instruction with the given id.
    pub fn instruction_of(&self, id: u64) -> Option<InstId> {
        let position = usize::try_from(id).ok()?.checked_sub(1)?;
        self.instructions.get(position).copied()
    }

    /// Get the instructions generated from a source line in layout order.
    pub fn instructions_at(&self, file_line: &FileLine) -> Option<&[InstId]> {
        self.lines.get(file_line).map(Vec::as_slice)
    }

    /// The number of instructions without source location.
    pub fn num_unlocated(&self) -> usize {
        self.num_unlocated
    }

    /// Format an operand for display.
    /// Instruction results are shown by their id.
    pub fn describe_value(&self, program: &Program, value: &Value) -> String {
        match value {
            Value::Inst(inst) => format!("%{}", self.id_of(*inst)),
            Value::Arg { function, index } => {
                format!("{}.arg{}", program.function(*function).name, index)
            }
            Value::Const(constant) => constant.to_string(),
            Value::Global(global) => format!("@{}", program.global(*global).name),
        }
    }

    /// Format an instruction as `%id:\topcode\toperands | file : line`.
    pub fn describe(&self, program: &Program, inst: InstId) -> String {
        let instruction = program.inst(inst);
        let callee = instruction
            .direct_callee()
            .map(|callee| format!("@{}", program.function(callee).name));
        let operands = callee
            .into_iter()
            .chain(
                instruction
                    .operands
                    .iter()
                    .map(|operand| self.describe_value(program, operand)),
            )
            .join(" ");
        let mut text = format!(
            "%{}:\t{}\t{}",
            self.id_of(inst),
            instruction.opcode.mnemonic(),
            operands
        );
        if let Some(location) = &instruction.location {
            text.push_str(&format!(" | {} : {}", location.file_name(), location.line));
        }
        text
    }

    /// List all instructions of the program, grouped by function and block.
    pub fn listing(&self, program: &Program) -> String {
        let mut text = String::new();
        for (_, function) in program.iter_functions() {
            text.push_str(&format!("FUNCTION {}\n", function.name));
            for block in function.blocks.iter() {
                text.push_str(&format!("  BLOCK {}\n", program.block(*block).name));
                for inst in program.block(*block).instructions.iter() {
                    text.push_str(&format!("    {}\n", self.describe(program, *inst)));
                }
            }
        }
        text
    }
}

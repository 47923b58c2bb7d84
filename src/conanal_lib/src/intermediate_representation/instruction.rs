use super::{BlockId, FuncId, SourceLocation, Value};
use crate::prelude::*;

/// The target of a call instruction.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone)]
pub enum Callee {
    /// A direct call to a known function.
    Direct(FuncId),
    /// An indirect call through a function pointer.
    ///
    /// The `candidates` are the functions that the alias analysis of the front end
    /// considers as possible targets of the call.
    /// The list may be empty if the front end could not resolve the call at all.
    Indirect {
        /// Possible call targets according to the alias analysis.
        #[serde(default)]
        candidates: Vec<FuncId>,
    },
}

/// The kind of an instruction.
///
/// The operand layout of each kind follows the usual SSA conventions:
/// - `Load`: `[address]`
/// - `Store`: `[stored value, destination address]`
/// - `GetElementPtr`: `[base pointer, index]` or `[base pointer, array index, field index]`
/// - `Call` and `Invoke`: the actual arguments in parameter order
/// - `Branch`: `[]` for unconditional and `[condition]` for conditional branches
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone)]
pub enum Opcode {
    /// A read from memory.
    Load,
    /// A write to memory.
    Store,
    /// Computation of a derived address from a base pointer and one or two indices.
    GetElementPtr,
    /// A function call.
    Call {
        /// The called function.
        callee: Callee,
    },
    /// A function call with an exceptional successor.
    Invoke {
        /// The called function.
        callee: Callee,
    },
    /// A conditional or unconditional intraprocedural branch.
    /// The branch targets are the successors of the containing block.
    Branch,
    /// An integer or floating point comparison.
    Compare,
    /// A binary arithmetic or logical operation.
    BinaryOp,
    /// A reinterpretation of a value as another type.
    BitCast,
    /// An SSA phi node.
    Phi,
    /// A stack allocation.
    Alloca,
    /// A return from the current function.
    Return,
    /// Any other operation. Operand taint flows to the result.
    Other,
}

impl Opcode {
    /// Get the callee for call and invoke instructions.
    pub fn callee(&self) -> Option<&Callee> {
        match self {
            Opcode::Call { callee } | Opcode::Invoke { callee } => Some(callee),
            _ => None,
        }
    }

    /// A short mnemonic of the opcode, used when printing instructions.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Load => "load",
            Opcode::Store => "store",
            Opcode::GetElementPtr => "getelementptr",
            Opcode::Call { .. } => "call",
            Opcode::Invoke { .. } => "invoke",
            Opcode::Branch => "br",
            Opcode::Compare => "cmp",
            Opcode::BinaryOp => "binop",
            Opcode::BitCast => "bitcast",
            Opcode::Phi => "phi",
            Opcode::Alloca => "alloca",
            Opcode::Return => "ret",
            Opcode::Other => "other",
        }
    }
}

/// A single instruction of the program.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone)]
pub struct Instruction {
    /// The kind of the instruction.
    pub opcode: Opcode,
    /// The operands in order.
    #[serde(default)]
    pub operands: Vec<Value>,
    /// The source code location the instruction was generated from, if known.
    #[serde(default)]
    pub location: Option<SourceLocation>,
    /// The block containing the instruction.
    /// Filled in by [`Program::normalize`](super::Program::normalize).
    #[serde(skip)]
    pub block: BlockId,
}

impl Instruction {
    /// Create a new instruction without source location.
    /// The containing block is set when the instruction is added to a program.
    pub fn new(opcode: Opcode, operands: Vec<Value>) -> Instruction {
        Instruction {
            opcode,
            operands,
            location: None,
            block: BlockId::default(),
        }
    }

    /// Set the source location of the instruction.
    pub fn at(mut self, location: SourceLocation) -> Instruction {
        self.location = Some(location);
        self
    }

    /// Returns `true` for `Call` and `Invoke` instructions.
    pub fn is_call(&self) -> bool {
        self.opcode.callee().is_some()
    }

    /// Returns `true` for pointer-indexing instructions.
    pub fn is_gep(&self) -> bool {
        self.opcode == Opcode::GetElementPtr
    }

    /// Returns `true` for branch instructions.
    pub fn is_branch(&self) -> bool {
        self.opcode == Opcode::Branch
    }

    /// Returns `true` for load instructions.
    pub fn is_load(&self) -> bool {
        self.opcode == Opcode::Load
    }

    /// Returns `true` for store instructions.
    pub fn is_store(&self) -> bool {
        self.opcode == Opcode::Store
    }

    /// Returns `true` for comparisons and binary operations,
    /// i.e. the instructions that may compute a loop exit condition.
    pub fn is_compare_or_binary_op(&self) -> bool {
        matches!(self.opcode, Opcode::Compare | Opcode::BinaryOp)
    }

    /// Get the directly called function for calls with a known target.
    pub fn direct_callee(&self) -> Option<FuncId> {
        match self.opcode.callee() {
            Some(Callee::Direct(func)) => Some(*func),
            _ => None,
        }
    }
}

use super::{FuncId, GlobalId, InstId};
use crate::prelude::*;

/// A compile-time constant operand.
///
/// Constants are compared structurally,
/// i.e. two occurrences of the integer `0` denote the same value.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub enum Constant {
    /// An integer literal.
    Int(i64),
    /// The null pointer.
    Null,
    /// An undefined value.
    Undef,
}

impl std::fmt::Display for Constant {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Constant::Int(value) => write!(formatter, "{value}"),
            Constant::Null => write!(formatter, "null"),
            Constant::Undef => write!(formatter, "undef"),
        }
    }
}

/// An operand of an instruction.
///
/// Values are also the unit of taint:
/// the result of an instruction, a formal function argument or a global variable
/// can be marked as corrupted by the analyses.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub enum Value {
    /// The result of another instruction.
    Inst(InstId),
    /// The formal argument at position `index` of the function `function`.
    Arg {
        /// The function the argument belongs to.
        function: FuncId,
        /// The position of the argument in the parameter list.
        index: usize,
    },
    /// A compile-time constant.
    Const(Constant),
    /// The address of a global variable.
    Global(GlobalId),
}

impl Value {
    /// Shorthand for an integer constant operand.
    pub fn int(value: i64) -> Value {
        Value::Const(Constant::Int(value))
    }

    /// Shorthand for a formal argument operand.
    pub fn arg(function: FuncId, index: usize) -> Value {
        Value::Arg { function, index }
    }

    /// Return the instruction handle if the value is the result of an instruction.
    pub fn as_inst(&self) -> Option<InstId> {
        match self {
            Value::Inst(inst) => Some(*inst),
            _ => None,
        }
    }

    /// Returns `true` for compile-time constants.
    pub fn is_constant(&self) -> bool {
        matches!(self, Value::Const(_))
    }

    /// Returns `true` for addresses of global variables.
    pub fn is_global(&self) -> bool {
        matches!(self, Value::Global(_))
    }
}

impl From<InstId> for Value {
    fn from(inst: InstId) -> Value {
        Value::Inst(inst)
    }
}

impl From<GlobalId> for Value {
    fn from(global: GlobalId) -> Value {
        Value::Global(global)
    }
}

impl From<Constant> for Value {
    fn from(constant: Constant) -> Value {
        Value::Const(constant)
    }
}

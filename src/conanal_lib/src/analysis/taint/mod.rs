//! Forward taint propagation.
//!
//! Starting from a seed instruction, the propagation marks every value that may carry data derived
//! from the seed as tainted. Besides plain data flow through operands, the propagation tracks
//! - element-precise taint of pointer-indexing instructions (see [`PointerIndex`]),
//! - branches with a tainted condition and the instructions controlled by them,
//! - calls, which are followed into the callee along an explicit call stack.
//!
//! All mutable state of one propagation pass lives in a [`TaintState`],
//! the propagation itself is implemented by the [`TaintEngine`](engine::TaintEngine).

use crate::intermediate_representation::*;
use crate::prelude::*;
use fnv::{FnvHashMap, FnvHashSet};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

pub mod engine;
pub use engine::{CorruptedArgs, PropagationMode, TaintEngine};

/// A set of tainted values that remembers the order of insertion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaintSet {
    members: FnvHashSet<Value>,
    ordered: Vec<Value>,
}

impl TaintSet {
    /// Add a value to the set.
    /// Returns `true` if the value was not tainted before.
    pub fn add(&mut self, value: Value) -> bool {
        if self.members.contains(&value) {
            return false;
        }
        self.members.insert(value.clone());
        self.ordered.push(value);
        true
    }

    /// Returns `true` if the value is tainted.
    pub fn contains(&self, value: &Value) -> bool {
        self.members.contains(value)
    }

    /// The number of tainted values.
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Returns `true` if nothing is tainted.
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// The tainted values in the order they were tainted.
    pub fn ordered(&self) -> &[Value] {
        &self.ordered
    }

    /// Iterate over the tainted instructions in the order they were tainted.
    pub fn instructions(&self) -> impl Iterator<Item = InstId> + '_ {
        self.ordered.iter().filter_map(Value::as_inst)
    }
}

/// The index operands of a pointer-indexing instruction.
///
/// Taint recorded for `base[i]` only flows to other indexing instructions on the same base
/// with structurally equal indices.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub enum PointerIndex {
    /// The single index of `gep base, idx`.
    Single(Value),
    /// The array index and field index of `gep base, idx1, idx2`.
    Pair(Value, Value),
}

impl PointerIndex {
    /// Get the index descriptor of a pointer-indexing instruction.
    /// Returns an error if the instruction has neither two nor three operands.
    pub fn from_gep(inst: &Instruction) -> Result<PointerIndex, Error> {
        match &inst.operands[..] {
            [_base, index] => Ok(PointerIndex::Single(index.clone())),
            [_base, array_index, field_index] => Ok(PointerIndex::Pair(
                array_index.clone(),
                field_index.clone(),
            )),
            operands => Err(anyhow!(
                "Cannot parse pointer-indexing instruction with {} operands",
                operands.len()
            )),
        }
    }
}

/// Index descriptors of tainted elements, keyed by the base pointer.
pub type PointerTaintMap = FnvHashMap<Value, Vec<PointerIndex>>;

/// A frame of the simulated call stack.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct Frame {
    /// The executing function.
    pub function: FuncId,
    /// For frames built from a race report: the seed instruction or the call site the frame resumes at.
    /// `None` for frames pushed during propagation, which start at the function entry.
    pub instruction: Option<InstId>,
}

impl Frame {
    /// Create a frame for the function containing the given instruction.
    pub fn at(program: &Program, inst: InstId) -> Frame {
        Frame {
            function: program.function_of(inst),
            instruction: Some(inst),
        }
    }
}

/// The simulated call stack. The front is the currently executing frame.
pub type CallStack = VecDeque<Frame>;

/// Size of the taint set when a callee was last entered and left.
///
/// If the taint set did not grow between entering and leaving the callee,
/// a later call with an unchanged taint set is not followed again.
/// This is a heuristic: it ignores which arguments of the later call are tainted.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub struct EnterExitVal {
    /// Taint set size on entry.
    pub enter: usize,
    /// Taint set size on exit.
    pub exit: usize,
}

/// All mutable state of one propagation pass.
#[derive(Debug, Clone, Default)]
pub struct TaintState {
    /// The tainted values.
    pub tainted: TaintSet,
    /// Index descriptors of tainted pointer elements.
    pub pointers: PointerTaintMap,
    /// The simulated call stack.
    pub call_stack: CallStack,
    /// The taint growth memo per callee.
    pub memo: FnvHashMap<FuncId, EnterExitVal>,
    /// Branches with a tainted condition in the order of discovery.
    pub corrupted_branches: Vec<InstId>,
    /// Calls followed while a control dependence on a tainted branch was active.
    pub corrupted_calls: Vec<InstId>,
    /// Dangerous pointer sites reached under cross-function control dependence,
    /// together with the tainted branches responsible for it.
    pub inter_ctrl_dep_ptr: BTreeMap<FileLine, Vec<InstId>>,
    /// Dangerous call sites reached under cross-function control dependence.
    pub inter_ctrl_dep_func: BTreeMap<FileLine, Vec<InstId>>,
    /// How often the body of each function was scanned.
    pub scan_count: FnvHashMap<FuncId, usize>,
}

impl TaintState {
    /// Create the initial state of a pass for the given call stack.
    pub fn new(call_stack: CallStack) -> TaintState {
        TaintState {
            call_stack,
            ..Default::default()
        }
    }

    /// Get the functions containing at least one tainted instruction.
    pub fn corrupted_functions(&self, program: &Program) -> BTreeSet<FuncId> {
        self.tainted
            .instructions()
            .map(|inst| program.function_of(inst))
            .collect()
    }

    /// How often the body of the function was scanned during the pass.
    pub fn scans_of(&self, func: FuncId) -> usize {
        self.scan_count.get(&func).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taint_set_keeps_order() {
        let mut set = TaintSet::default();
        assert!(set.add(Value::Inst(InstId::new(3))));
        assert!(set.add(Value::Global(GlobalId::new(0))));
        assert!(set.add(Value::Inst(InstId::new(1))));
        assert!(!set.add(Value::Inst(InstId::new(3))));
        assert_eq!(set.len(), 3);
        assert_eq!(
            set.instructions().collect::<Vec<_>>(),
            vec![InstId::new(3), InstId::new(1)]
        );
        assert!(set.contains(&Value::Global(GlobalId::new(0))));
    }

    #[test]
    fn pointer_index_arity() {
        let base = Value::Global(GlobalId::new(0));
        let gep = Instruction::new(Opcode::GetElementPtr, vec![base.clone(), Value::int(1)]);
        assert_eq!(
            PointerIndex::from_gep(&gep).unwrap(),
            PointerIndex::Single(Value::int(1))
        );
        let gep = Instruction::new(
            Opcode::GetElementPtr,
            vec![base.clone(), Value::int(0), Value::int(2)],
        );
        assert_eq!(
            PointerIndex::from_gep(&gep).unwrap(),
            PointerIndex::Pair(Value::int(0), Value::int(2))
        );
        let gep = Instruction::new(Opcode::GetElementPtr, vec![base]);
        assert!(PointerIndex::from_gep(&gep).is_err());
    }
}

//! The propagation algorithm.

use super::*;
use crate::analysis::control_dependence::ControlDependence;
use crate::analysis::labels::DangerousOpLabels;
use crate::utils::log::LogMessage;

/// Tainted actual arguments of a call, keyed by parameter position.
pub type CorruptedArgs = BTreeMap<usize, Value>;

/// The flavour of the propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationMode {
    /// Calls are followed into their callees.
    /// Cross-function control dependence on dangerous operations is recorded.
    Interprocedural,
    /// Calls are treated as ordinary instructions.
    /// Instructions controlled by a tainted branch of the same function become tainted.
    Intraprocedural,
}

/// Forward taint propagation over a program.
pub struct TaintEngine<'a> {
    program: &'a Program,
    control_dependence: &'a dyn ControlDependence,
    labels: Option<&'a DangerousOpLabels>,
    mode: PropagationMode,
}

impl<'a> TaintEngine<'a> {
    /// Create an engine following calls.
    /// Cross-function control dependence is recorded for the sites in `labels`.
    pub fn interprocedural(
        program: &'a Program,
        control_dependence: &'a dyn ControlDependence,
        labels: &'a DangerousOpLabels,
    ) -> TaintEngine<'a> {
        TaintEngine {
            program,
            control_dependence,
            labels: Some(labels),
            mode: PropagationMode::Interprocedural,
        }
    }

    /// Create an engine confined to single functions.
    pub fn intraprocedural(
        program: &'a Program,
        control_dependence: &'a dyn ControlDependence,
    ) -> TaintEngine<'a> {
        TaintEngine {
            program,
            control_dependence,
            labels: None,
            mode: PropagationMode::Intraprocedural,
        }
    }

    /// Run one full pass for a seed frame and the outer call frames of a race report.
    ///
    /// The frames are processed front to back.
    /// Whenever a frame discovered new taint, the call site the next frame resumes at gets tainted,
    /// modelling the return of the corrupted data to the caller.
    pub fn run_pass(
        &self,
        seed: Frame,
        outer_frames: &[Frame],
        logs: &mut Vec<LogMessage>,
    ) -> Result<TaintState, Error> {
        let call_stack = std::iter::once(seed)
            .chain(outer_frames.iter().copied())
            .collect();
        let mut state = TaintState::new(call_stack);
        while let Some(frame) = state.call_stack.front().copied() {
            let new_taint = self.propagate(
                &mut state,
                frame.function,
                frame.instruction,
                &CorruptedArgs::new(),
                false,
                logs,
            )?;
            state.call_stack.pop_front();
            if new_taint {
                if let Some(call) = state.call_stack.front().and_then(|frame| frame.instruction) {
                    state.tainted.add(call.into());
                }
            }
        }
        Ok(state)
    }

    /// Propagate taint from a single instruction through its function.
    pub fn run_from(&self, seed: InstId, logs: &mut Vec<LogMessage>) -> Result<TaintState, Error> {
        let frame = Frame::at(self.program, seed);
        let mut state = TaintState::new(CallStack::from([frame]));
        self.propagate(&mut state, frame.function, Some(seed), &CorruptedArgs::new(), false, logs)?;
        Ok(state)
    }

    /// Propagate taint through the function `func`.
    ///
    /// If `entry` is given, the walk starts there.
    /// A call as entry marks a caller frame resuming after its callee, so the call itself is skipped.
    /// Any other entry instruction is the seed and becomes tainted.
    /// Without entry, the whole function is scanned.
    ///
    /// Formal arguments are tainted if the corresponding actual argument in `args` is tainted.
    /// `ctrl_dep` signals that the call of this function was control dependent on a tainted branch.
    ///
    /// Returns `true` if new taint was discovered inside the function.
    pub fn propagate(
        &self,
        state: &mut TaintState,
        func: FuncId,
        entry: Option<InstId>,
        args: &CorruptedArgs,
        ctrl_dep: bool,
        logs: &mut Vec<LogMessage>,
    ) -> Result<bool, Error> {
        let program = self.program;
        *state.scan_count.entry(func).or_insert(0) += 1;
        let instructions: Vec<InstId> = program.function_instructions(func).collect();
        let mut new_taint = false;
        let mut start = 0;
        if let Some(entry) = entry {
            start = instructions
                .iter()
                .position(|inst| *inst == entry)
                .ok_or_else(|| {
                    anyhow!(
                        "Call stack instruction {} not found in function {}",
                        entry,
                        program.function(func).name
                    )
                })?;
            let inst = program.inst(entry);
            if self.mode == PropagationMode::Interprocedural && inst.is_call() {
                start += 1;
            } else if state.tainted.add(entry.into()) {
                new_taint = true;
                if self.mode == PropagationMode::Interprocedural && inst.is_gep() {
                    let index = PointerIndex::from_gep(inst)
                        .with_context(|| format!("Invalid seed instruction {}", entry))?;
                    state
                        .pointers
                        .entry(inst.operands[0].clone())
                        .or_default()
                        .push(index);
                }
            }
        }

        for (position, actual) in args.iter() {
            let formal = Value::arg(func, *position);
            if state.tainted.contains(actual) {
                state.tainted.add(formal.clone());
            }
            if let Some(indices) = state.pointers.get(actual).cloned() {
                state.pointers.insert(formal, indices);
            }
        }

        let mut local_branches: Vec<InstId> = Vec::new();
        for inst_id in instructions[start..].iter().copied() {
            let inst = program.inst(inst_id);
            let local_ctrl_dep = self.control_dependence.has_graph(func)
                && local_branches.iter().any(|branch| {
                    self.control_dependence
                        .influences(func, program.inst(*branch).block, inst.block)
                });
            match self.mode {
                PropagationMode::Interprocedural => {
                    if ctrl_dep && !local_ctrl_dep {
                        self.correlate_dangerous_site(state, inst);
                    }
                    if inst.is_call() {
                        let call_ctrl_dep = ctrl_dep || local_ctrl_dep;
                        new_taint |= self.handle_call(state, inst_id, call_ctrl_dep, logs)?;
                        continue;
                    }
                }
                PropagationMode::Intraprocedural => {
                    if local_ctrl_dep {
                        state.tainted.add(inst_id.into());
                    }
                }
            }
            if inst.is_gep() {
                new_taint |= self.handle_pointer_index(state, inst_id)?;
            } else if inst.operands.iter().any(|op| state.tainted.contains(op))
                && state.tainted.add(inst_id.into())
            {
                if inst.is_store() {
                    if let Some(destination) = inst.operands.get(1) {
                        if !destination.is_constant() {
                            state.tainted.add(destination.clone());
                        }
                    }
                } else if inst.is_branch() {
                    if !state.corrupted_branches.contains(&inst_id) {
                        state.corrupted_branches.push(inst_id);
                    }
                    local_branches.push(inst_id);
                }
                new_taint = true;
            }
        }
        Ok(new_taint)
    }

    /// Follow a call into its callee.
    fn handle_call(
        &self,
        state: &mut TaintState,
        call: InstId,
        ctrl_dep: bool,
        logs: &mut Vec<LogMessage>,
    ) -> Result<bool, Error> {
        let program = self.program;
        let inst = program.inst(call);
        let Some(callee) = inst.direct_callee() else {
            let mut log = LogMessage::new_debug(format!("Could not resolve callee of {}", call))
                .source("TaintEngine");
            if let Some(location) = &inst.location {
                log = log.location(location);
            }
            logs.push(log);
            return Ok(false);
        };
        let callee_fn = program.function(callee);
        if callee_fn.is_intrinsic()
            || state.call_stack.iter().any(|frame| frame.function == callee)
        {
            return Ok(false);
        }
        let args: CorruptedArgs = inst
            .operands
            .iter()
            .enumerate()
            .filter(|(_, op)| {
                !op.is_constant()
                    && (state.tainted.contains(op) || state.pointers.contains_key(*op))
            })
            .map(|(position, op)| (position, op.clone()))
            .collect();
        if callee_fn.is_declaration() {
            // Without a body the result is assumed to depend on all arguments.
            return Ok(!args.is_empty() && state.tainted.add(call.into()));
        }
        let size = state.tainted.len();
        match state.memo.get_mut(&callee) {
            Some(memo) if memo.enter == memo.exit => {
                if memo.enter < size {
                    memo.enter = size;
                } else if memo.enter == size {
                    return Ok(false);
                }
            }
            Some(_) => (),
            None => {
                state.memo.insert(
                    callee,
                    EnterExitVal {
                        enter: size,
                        exit: 0,
                    },
                );
            }
        }

        state.call_stack.push_front(Frame {
            function: callee,
            instruction: None,
        });
        if ctrl_dep && !state.corrupted_calls.contains(&call) {
            state.corrupted_calls.push(call);
        }
        let callee_taint = self.propagate(state, callee, None, &args, ctrl_dep, logs)?;
        let new_taint = callee_taint && state.tainted.add(call.into());
        state.memo.entry(callee).or_default().exit = state.tainted.len();
        state.call_stack.pop_front();
        Ok(new_taint)
    }

    /// Taint a pointer-indexing instruction if it indexes a tainted element
    /// or if one of its operands is tainted as a whole.
    fn handle_pointer_index(&self, state: &mut TaintState, inst_id: InstId) -> Result<bool, Error> {
        let inst = self.program.inst(inst_id);
        let index = PointerIndex::from_gep(inst)
            .with_context(|| format!("Invalid pointer-indexing instruction {}", inst_id))?;
        // A valid pointer-indexing instruction always has a base operand.
        let base = &inst.operands[0];
        let mut new_taint = false;
        if let Some(indices) = state.pointers.get(base) {
            if indices.contains(&index) && state.tainted.add(inst_id.into()) {
                new_taint = true;
            }
        }
        if inst.operands.iter().any(|op| state.tainted.contains(op))
            && state.tainted.add(inst_id.into())
        {
            state.pointers.entry(base.clone()).or_default().push(index);
            new_taint = true;
        }
        Ok(new_taint)
    }

    /// Record the tainted branches that control a dangerous operation across function boundaries.
    ///
    /// A recorded branch controls a call that was followed while a control dependence was active.
    /// The pairing ignores which call actually leads to the dangerous operation.
    fn correlate_dangerous_site(&self, state: &mut TaintState, inst: &Instruction) {
        let (Some(labels), Some(location)) = (self.labels, &inst.location) else {
            return;
        };
        let file_line = location.file_line();
        let is_pointer_site = labels.is_pointer_site(&file_line);
        if !is_pointer_site && !labels.is_function_site(&file_line) {
            return;
        }
        let program = self.program;
        let mut branches: Vec<InstId> = Vec::new();
        for call in state.corrupted_calls.iter() {
            let call_block = program.inst(*call).block;
            let func = program.block(call_block).function;
            for branch in state.corrupted_branches.iter() {
                let branch_block = program.inst(*branch).block;
                if program.block(branch_block).function == func
                    && self.control_dependence.influences(func, branch_block, call_block)
                    && !branches.contains(branch)
                {
                    branches.push(*branch);
                }
            }
        }
        if branches.is_empty() {
            return;
        }
        if is_pointer_site {
            state.inter_ctrl_dep_ptr.insert(file_line, branches);
        } else {
            state.inter_ctrl_dep_func.insert(file_line, branches);
        }
    }
}

#[cfg(test)]
mod tests;

//! Conversion of a race report into the seeds of the taint propagation.
//!
//! The first report line names the source line of the corrupted value.
//! Several instructions may have been generated from that line,
//! so heuristics pick the instructions that actually produce the corrupted value.
//! All further lines name call sites of the enclosing frames,
//! where the first non-intrinsic call generated from the line becomes the frame.

use crate::analysis::index::InstIndex;
use crate::analysis::taint::Frame;
use crate::intermediate_representation::*;
use crate::prelude::*;
use crate::utils::log::LogMessage;
use crate::utils::report::FuncFileLine;
use fnv::FnvHashSet;

/// The frames of the simulated call stack derived from a race report.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallStackSeeds {
    /// Candidate seeds for the corrupted value. Each one starts an independent pass.
    pub head: Vec<Frame>,
    /// The enclosing call frames, innermost first. Shared by all passes.
    pub body: Vec<Frame>,
}

/// Resolve the race report entries to seed instructions and call frames.
///
/// A manual override id replaces all seeds derived from the first report line.
pub fn initialize_call_stack(
    program: &Program,
    index: &InstIndex,
    report: &[FuncFileLine],
    manual_seed: Option<u64>,
    logs: &mut Vec<LogMessage>,
) -> Result<CallStackSeeds, Error> {
    if report.is_empty() {
        bail!("The race report is empty");
    }
    let mut seeds = CallStackSeeds::default();
    let mut finished: FnvHashSet<Value> = FnvHashSet::default();
    for (report_position, entry) in report.iter().enumerate() {
        let is_first_line = report_position == 0;
        let Some(instructions) = index.instructions_at(&entry.file_line) else {
            if is_first_line {
                bail!("No instructions found for the corrupted value at {}", entry);
            }
            logs.push(
                LogMessage::new_warning(format!("No instructions found for {}", entry))
                    .location(&entry.file_line)
                    .source(super::CHECK_MODULE.name),
            );
            continue;
        };
        if instructions.is_empty() {
            bail!("No matching instructions at {}", entry);
        }
        let mut first_is_call = false;
        for (position, inst_id) in instructions.iter().copied().enumerate() {
            let inst = program.inst(inst_id);
            if inst.is_gep() {
                if !is_first_line || first_is_call {
                    continue;
                }
                if inst.operands.iter().any(|op| finished.contains(op)) {
                    break;
                }
                seeds.head.push(Frame::at(program, inst_id));
                finished.insert(inst_id.into());
            } else if let Some(callee) = inst.opcode.callee() {
                if let Callee::Direct(func) = callee {
                    if program.function(*func).is_intrinsic() {
                        continue;
                    }
                }
                if is_first_line && position == 0 {
                    logs.push(
                        LogMessage::new_warning(format!(
                            "Call %{} is the first instruction of the corrupted value line",
                            index.id_of(inst_id)
                        ))
                        .location(&entry.file_line)
                        .source(super::CHECK_MODULE.name),
                    );
                    first_is_call = true;
                    continue;
                }
                seeds.body.push(Frame::at(program, inst_id));
                break;
            } else {
                if !is_first_line || first_is_call {
                    continue;
                }
                let is_last = position + 1 == instructions.len();
                if (!is_last || !seeds.head.is_empty())
                    && is_consumed_or_unlikely_seed(program, inst, inst_id, &mut finished)
                {
                    continue;
                }
                seeds.head.push(Frame::at(program, inst_id));
                finished.insert(inst_id.into());
            }
        }
    }

    if let Some(id) = manual_seed {
        match index.instruction_of(id) {
            Some(inst) => {
                seeds.head = vec![Frame::at(program, inst)];
                logs.push(
                    LogMessage::new_info(format!("Corrupted variable manually set to %{}", id))
                        .source(super::CHECK_MODULE.name),
                );
            }
            None => logs.push(
                LogMessage::new_warning(format!(
                    "Unknown instruction id {} for the corrupted variable, override ignored",
                    id
                ))
                .source(super::CHECK_MODULE.name),
            ),
        }
    }
    if seeds.head.is_empty() {
        bail!(
            "No seed instruction found for the corrupted value at {}",
            report[0]
        );
    }
    Ok(seeds)
}

/// Returns `true` if an instruction should not become a seed:
/// it consumes an already chosen seed, it is a load not reading a global variable,
/// or it is neither a load nor derived from a pointer-indexing or bitcast instruction.
///
/// Instructions consuming an already chosen seed are added to `finished`.
pub fn is_consumed_or_unlikely_seed(
    program: &Program,
    inst: &Instruction,
    inst_id: InstId,
    finished: &mut FnvHashSet<Value>,
) -> bool {
    let mut consumes_seed = false;
    let mut has_global = false;
    let mut is_pointer = false;
    let mut is_bitcast = false;
    for op in inst.operands.iter() {
        if finished.contains(op) {
            consumes_seed = true;
            finished.insert(inst_id.into());
        }
        has_global |= op.is_global();
        is_pointer |= program.is_inst_with_opcode(op, &Opcode::GetElementPtr);
        is_bitcast |= program.is_inst_with_opcode(op, &Opcode::BitCast);
    }
    consumes_seed
        || (!has_global && inst.is_load())
        || (!is_bitcast && !is_pointer && !inst.is_load())
}

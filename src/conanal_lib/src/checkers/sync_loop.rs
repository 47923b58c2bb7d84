/*!
This module implements a check for adhoc synchronization, i.e. busy-wait loops.

A thread waiting for another thread by polling a shared flag in a loop
instead of using proper synchronization primitives causes benign-looking data races.
The race report names the racing write (e.g. `flag = 1;`) and the racing read (e.g. `while (!flag);`).

How the check works:

* The racing write must store a compile-time constant.
* The racing read must lie in a loop.
The outermost loop containing the read is searched in all functions.
* For each read a taint propagation confined to its function runs.
Instructions controlled by a tainted branch become tainted as well.
* The first tainted comparison or arithmetic instruction in a block exiting the loop
is reported as the condition of an adhoc synchronization loop.

False Positives

* The loop may exit on other conditions than the polled flag.

False Negatives

* Flags written by a non-constant value are ignored.
* Flags polled through a called function are not tracked.
*/

use crate::analysis::index::InstIndex;
use crate::analysis::loops::Loop;
use crate::analysis::taint::TaintEngine;
use crate::intermediate_representation::*;
use crate::prelude::*;
use crate::utils::log::{CweWarning, LogMessage};
use crate::utils::report::FuncFileLine;
use crate::CheckModule;
use fnv::FnvHashSet;

use super::con_analysis::is_consumed_or_unlikely_seed;

const VERSION: &str = "0.1";

/// The module name and version
pub static CHECK_MODULE: CheckModule = CheckModule {
    name: "SyncLoop",
    version: VERSION,
    run: check_sync_loop,
};

/// The check has no configurable parameters.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone)]
pub struct Config {}

/// The instructions generated from the racing source lines.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RacingInstructions {
    /// All instructions generated from the write line.
    pub writes: Vec<InstId>,
    /// The instructions of the read line that actually read the shared value.
    pub reads: Vec<InstId>,
}

/// Resolve the two lines of the race report to instructions.
///
/// A missing write line is tolerated with a warning, a missing read line is an error.
/// Manual overrides replace the write and read candidates independently.
pub fn resolve_racing_instructions(
    program: &Program,
    index: &InstIndex,
    report: &[FuncFileLine],
    manual_write: Option<u64>,
    manual_read: Option<u64>,
    logs: &mut Vec<LogMessage>,
) -> Result<RacingInstructions, Error> {
    let [write_line, read_line] = report else {
        bail!(
            "The race report must name exactly one write and one read, found {} entries",
            report.len()
        );
    };
    let mut racing = RacingInstructions::default();
    match index.instructions_at(&write_line.file_line) {
        Some(instructions) if !instructions.is_empty() => {
            racing.writes = instructions.to_vec();
        }
        Some(_) => bail!("No matching instructions at {}", write_line),
        None => logs.push(
            LogMessage::new_warning(format!(
                "No instructions found for the racing write {}",
                write_line
            ))
            .location(&write_line.file_line)
            .source(CHECK_MODULE.name),
        ),
    }

    let instructions = index
        .instructions_at(&read_line.file_line)
        .ok_or_else(|| anyhow!("No instructions found for the racing read {}", read_line))?;
    if instructions.is_empty() {
        bail!("No matching instructions at {}", read_line);
    }
    let mut finished: FnvHashSet<Value> = FnvHashSet::default();
    for (position, inst_id) in instructions.iter().copied().enumerate() {
        let inst = program.inst(inst_id);
        if inst.is_gep() {
            if inst.operands.iter().any(|op| finished.contains(op)) {
                break;
            }
            racing.reads.push(inst_id);
            finished.insert(inst_id.into());
        } else if let Some(callee) = inst.opcode.callee() {
            if let Callee::Direct(func) = callee {
                if program.function(*func).is_intrinsic() {
                    continue;
                }
            }
            if position == 0 {
                logs.push(
                    LogMessage::new_warning(format!(
                        "Call %{} is the first instruction of the racing read line",
                        index.id_of(inst_id)
                    ))
                    .location(&read_line.file_line)
                    .source(CHECK_MODULE.name),
                );
            }
        } else {
            let is_last = position + 1 == instructions.len();
            if (!is_last || !racing.reads.is_empty() || !racing.writes.is_empty())
                && is_consumed_or_unlikely_seed(program, inst, inst_id, &mut finished)
            {
                continue;
            }
            racing.reads.push(inst_id);
            finished.insert(inst_id.into());
        }
    }

    if let Some(id) = manual_write {
        racing.writes = vec![manual_instruction(index, id, "write", logs)?];
    }
    if let Some(id) = manual_read {
        racing.reads = vec![manual_instruction(index, id, "read", logs)?];
    }
    if racing.reads.is_empty() {
        bail!("No racing read instruction found at {}", read_line);
    }
    Ok(racing)
}

fn manual_instruction(
    index: &InstIndex,
    id: u64,
    kind: &str,
    logs: &mut Vec<LogMessage>,
) -> Result<InstId, Error> {
    let inst = index
        .instruction_of(id)
        .ok_or_else(|| anyhow!("Unknown instruction id {} for the racing {}", id, kind))?;
    logs.push(
        LogMessage::new_info(format!("Racing {} manually set to %{}", kind, id))
            .source(CHECK_MODULE.name),
    );
    Ok(inst)
}

/// Returns `true` if one of the write candidates stores a compile-time constant.
fn has_constant_write(program: &Program, writes: &[InstId]) -> bool {
    writes.iter().any(|write| {
        let inst = program.inst(*write);
        inst.is_store() && matches!(inst.operands.first(), Some(Value::Const(_)))
    })
}

/// Run the check.
pub fn check_sync_loop(
    analysis_results: &AnalysisResults,
    check_params: &serde_json::Value,
) -> Result<(Vec<LogMessage>, Vec<CweWarning>), Error> {
    let _config: Config = serde_json::from_value(check_params.clone())
        .context("Invalid configuration of the SyncLoop check")?;
    let program = analysis_results.program;
    let index = analysis_results.index;
    let report = analysis_results.race_report;
    let mut logs = Vec::new();
    let mut warnings = Vec::new();

    let racing = resolve_racing_instructions(
        program,
        index,
        report,
        analysis_results.overrides.write_var,
        analysis_results.overrides.read_var,
        &mut logs,
    )?;
    let read_block = program.inst(racing.reads[0]).block;
    let Some(polling_loop) = analysis_results
        .loops
        .outermost_loop_containing(program, read_block)
    else {
        logs.push(
            LogMessage::new_info("The racing read is not inside a loop")
                .location(&report[1].file_line)
                .source(CHECK_MODULE.name),
        );
        return Ok((logs, warnings));
    };
    if !has_constant_write(program, &racing.writes) {
        logs.push(
            LogMessage::new_info("The racing write does not store a constant")
                .location(&report[0].file_line)
                .source(CHECK_MODULE.name),
        );
        return Ok((logs, warnings));
    }

    let engine = TaintEngine::intraprocedural(program, analysis_results.control_dependence);
    for read in racing.reads.iter() {
        let state = engine.run_from(*read, &mut logs)?;
        let exit_condition = state.tainted.instructions().find(|inst| {
            program.inst(*inst).is_compare_or_binary_op()
                && polling_loop.is_loop_exiting(program.inst(*inst).block)
        });
        if let Some(condition) = exit_condition {
            warnings.push(generate_cwe_warning(
                analysis_results,
                polling_loop,
                condition,
            ));
        }
    }
    Ok((logs, warnings))
}

fn generate_cwe_warning(
    analysis_results: &AnalysisResults,
    polling_loop: &Loop,
    condition: InstId,
) -> CweWarning {
    let program = analysis_results.program;
    let report = analysis_results.race_report;
    let function_name = program.function(program.function_of(condition)).name.clone();
    CweWarning::new(
        CHECK_MODULE.name,
        CHECK_MODULE.version,
        format!(
            "(Adhoc Synchronization Loop Detected) Write at {} polled by read at {} in {}",
            report[0].file_line, report[1].file_line, function_name
        ),
    )
    .locations(vec![
        report[0].file_line.to_string(),
        report[1].file_line.to_string(),
    ])
    .tids(vec![format!("%{}", analysis_results.index.id_of(condition))])
    .symbols(vec![function_name])
    .other(vec![vec![
        "loop_header".to_string(),
        program.block(polling_loop.header).name.clone(),
    ]])
}

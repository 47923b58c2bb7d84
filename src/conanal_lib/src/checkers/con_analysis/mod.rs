//! This module implements the check for security relevant consequences of a data race.
//!
//! A dynamic race detector reports the source line of a corrupted value
//! together with the call stack leading to it.
//! The check decides whether the corrupted data can influence a dangerous operation,
//! i.e. a pointer dereference or a call to a function from the list of dangerous functions.
//!
//! ## How the check works
//!
//! - The race report is converted into seed instructions and call frames
//!   (see [`initialize_call_stack`]).
//! - For each seed an interprocedural taint propagation runs along the call stack.
//!   Calls are followed into their callees and the taint returns to the outer frames.
//! - Dangerous operations reached while a tainted branch of a calling function was active
//!   are reported as cross-function control dependent.
//! - Dangerous operations in functions containing taint are confirmed
//!   if a tainted branch dominates them and the taint trace intersects the dominating instructions
//!   (see [`confirm_sites`]).
//!
//! ## False Positives
//!
//! - Cross-function control dependence pairs every tainted branch controlling a followed call
//!   with every dangerous operation reached afterwards, even through a different call.
//! - A dominating tainted branch does not imply that the branch decides whether the site is reached.
//!
//! ## False Negatives
//!
//! - A callee is not scanned again if the taint set did not grow during its last scan
//!   and has not grown since, even if different arguments are tainted.
//! - Indirect calls are not followed.
//! - Taint through memory is only tracked for the destination operand of stores
//!   and element-wise for pointer-indexing instructions.

use crate::analysis::dominators::DominatorCache;
use crate::analysis::labels::DangerousOpLabels;
use crate::analysis::taint::{Frame, TaintEngine, TaintState};
use crate::intermediate_representation::*;
use crate::prelude::*;
use crate::utils::log::{CweWarning, LogMessage};
use crate::utils::report::FuncFileLine;
use crate::CheckModule;
use itertools::Itertools;
use std::collections::BTreeMap;

mod call_stack;
pub use call_stack::*;
mod feasibility;
pub use feasibility::*;


const VERSION: &str = "0.1";

/// The module name and version
pub static CHECK_MODULE: CheckModule = CheckModule {
    name: "ConAnalysis",
    version: VERSION,
    run: check_con_analysis,
};

/// The configuration struct.
/// Each kind of dangerous operation can be checked separately.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone)]
pub struct Config {
    /// Check whether the corrupted value influences pointer dereferences.
    pointer_dereference_check: bool,
    /// Check whether the corrupted value influences calls to dangerous functions.
    dangerous_function_check: bool,
}

/// The two kinds of dangerous operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DangerousOperation {
    PointerDereference,
    DangerousFunction,
}

impl DangerousOperation {
    fn name(self) -> &'static str {
        match self {
            DangerousOperation::PointerDereference => "pointer dereference",
            DangerousOperation::DangerousFunction => "dangerous function",
        }
    }

    fn sites(self, labels: &DangerousOpLabels) -> &[FuncFileLine] {
        match self {
            DangerousOperation::PointerDereference => &labels.pointer_sites,
            DangerousOperation::DangerousFunction => &labels.function_sites,
        }
    }

    fn cross_function_results(self, state: &TaintState) -> &BTreeMap<FileLine, Vec<InstId>> {
        match self {
            DangerousOperation::PointerDereference => &state.inter_ctrl_dep_ptr,
            DangerousOperation::DangerousFunction => &state.inter_ctrl_dep_func,
        }
    }
}

/// Run the check.
///
/// One taint pass is run for each seed derived from the race report.
/// Each pass reports its results separately.
pub fn check_con_analysis(
    analysis_results: &AnalysisResults,
    check_params: &serde_json::Value,
) -> Result<(Vec<LogMessage>, Vec<CweWarning>), Error> {
    let config: Config = serde_json::from_value(check_params.clone())
        .context("Invalid configuration of the ConAnalysis check")?;
    let labels = analysis_results
        .labels
        .ok_or_else(|| anyhow!("The ConAnalysis check needs a list of dangerous functions"))?;
    let program = analysis_results.program;
    let mut logs = Vec::new();
    let mut warnings = Vec::new();

    let seeds = initialize_call_stack(
        program,
        analysis_results.index,
        analysis_results.race_report,
        analysis_results.overrides.corrupted_var,
        &mut logs,
    )?;
    let engine =
        TaintEngine::interprocedural(program, analysis_results.control_dependence, labels);
    let mut dominators = DominatorCache::new();
    for seed in seeds.head.iter() {
        let state = engine.run_pass(*seed, &seeds.body, &mut logs)?;
        logs.push(taint_trace_message(analysis_results, seed, &state));
        let corrupted_functions = state.corrupted_functions(program);
        let checks = [
            (
                config.pointer_dereference_check,
                DangerousOperation::PointerDereference,
            ),
            (
                config.dangerous_function_check,
                DangerousOperation::DangerousFunction,
            ),
        ];
        for (_, operation) in checks.into_iter().filter(|(enabled, _)| *enabled) {
            let mut found = cross_function_warnings(analysis_results, operation, &state);
            let confirmed = confirm_sites(
                program,
                analysis_results.index,
                &mut dominators,
                operation.sites(labels),
                &state,
                &corrupted_functions,
            )?;
            found.extend(
                confirmed
                    .iter()
                    .map(|site| confirmed_site_warning(analysis_results, operation, seed, site)),
            );
            logs.push(
                LogMessage::new_info(format!(
                    "# of static {} statements: {}",
                    operation.name(),
                    operation.sites(labels).len()
                ))
                .source(CHECK_MODULE.name),
            );
            logs.push(
                LogMessage::new_info(format!(
                    "# of detected potential vulnerabilities ({}): {}",
                    operation.name(),
                    found.len()
                ))
                .source(CHECK_MODULE.name),
            );
            warnings.append(&mut found);
        }
    }
    logs.push(
        LogMessage::new_debug(format!(
            "Dominators computed for {} functions",
            dominators.len()
        ))
        .source(CHECK_MODULE.name),
    );
    Ok((logs, warnings))
}

/// Generate the debug message listing the taint trace of a pass.
fn taint_trace_message(
    analysis_results: &AnalysisResults,
    seed: &Frame,
    state: &TaintState,
) -> LogMessage {
    let index = analysis_results.index;
    let trace = state
        .tainted
        .instructions()
        .map(|inst| format!("%{}", index.id_of(inst)))
        .join(", ");
    let mut message = LogMessage::new_debug(format!(
        "Taint trace of seed {}: [{}]",
        describe_frame(analysis_results, seed),
        trace
    ))
    .source(CHECK_MODULE.name);
    if let Some(location) = seed
        .instruction
        .and_then(|inst| analysis_results.program.inst(inst).location.as_ref())
    {
        message = message.location(location);
    }
    message
}

fn describe_frame(analysis_results: &AnalysisResults, frame: &Frame) -> String {
    match frame.instruction {
        Some(inst) => format!("%{}", analysis_results.index.id_of(inst)),
        None => analysis_results.program.function(frame.function).name.clone(),
    }
}

/// Generate warnings for dangerous operations reached under cross-function control dependence.
fn cross_function_warnings(
    analysis_results: &AnalysisResults,
    operation: DangerousOperation,
    state: &TaintState,
) -> Vec<CweWarning> {
    let program = analysis_results.program;
    let index = analysis_results.index;
    operation
        .cross_function_results(state)
        .iter()
        .map(|(file_line, branches)| {
            let symbols: Vec<String> = index
                .instructions_at(file_line)
                .and_then(|instructions| instructions.first())
                .map(|inst| vec![program.function(program.function_of(*inst)).name.clone()])
                .unwrap_or_default();
            CweWarning::new(
                CHECK_MODULE.name,
                CHECK_MODULE.version,
                format!(
                    "(Cross-Function Control Dependence) The {} at {} is controlled by tainted branches of a calling function",
                    operation.name(),
                    file_line
                ),
            )
            .locations(vec![file_line.to_string()])
            .tids(
                branches
                    .iter()
                    .map(|branch| format!("%{}", index.id_of(*branch)))
                    .collect(),
            )
            .symbols(symbols)
            .other(vec![vec![
                "dangerous_operation".to_string(),
                operation.name().to_string(),
            ]])
        })
        .collect()
}

/// Generate the warning for a confirmed dangerous operation site.
fn confirmed_site_warning(
    analysis_results: &AnalysisResults,
    operation: DangerousOperation,
    seed: &Frame,
    site: &ConfirmedSite,
) -> CweWarning {
    let function_name = &analysis_results.program.function(site.function).name;
    CweWarning::new(
        CHECK_MODULE.name,
        CHECK_MODULE.version,
        format!(
            "(Corrupted Dangerous Operation) The {} in {} at {} is reachable from the corrupted value {}",
            operation.name(),
            function_name,
            site.file_line,
            describe_frame(analysis_results, seed)
        ),
    )
    .locations(vec![site.file_line.to_string()])
    .tids(
        site.trace
            .iter()
            .map(|inst| format!("%{}", analysis_results.index.id_of(*inst)))
            .collect(),
    )
    .symbols(vec![function_name.clone()])
    .other(vec![vec![
        "dangerous_operation".to_string(),
        operation.name().to_string(),
    ]])
}

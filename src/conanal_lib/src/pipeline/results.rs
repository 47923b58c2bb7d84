use crate::analysis::control_dependence::ControlDependenceGraphs;
use crate::analysis::index::InstIndex;
use crate::analysis::labels::DangerousOpLabels;
use crate::analysis::loops::LoopInfo;
use crate::intermediate_representation::Program;
use crate::utils::report::FuncFileLine;

/// Instruction ids given on the command line that replace the seeds derived from the race report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManualOverrides {
    /// Replaces all seeds of the `ConAnalysis` check.
    pub corrupted_var: Option<u64>,
    /// Replaces the racing write of the `SyncLoop` check.
    pub write_var: Option<u64>,
    /// Replaces the racing read of the `SyncLoop` check.
    pub read_var: Option<u64>,
}

/// A struct containing pointers to all known analysis results
/// that may be needed as input for the checks.
#[derive(Clone, Copy)]
pub struct AnalysisResults<'a> {
    /// The analyzed program.
    pub program: &'a Program,
    /// Instruction ids and the source line lookup.
    pub index: &'a InstIndex,
    /// The control dependence graphs of all functions.
    pub control_dependence: &'a ControlDependenceGraphs,
    /// The loop forests of all functions.
    pub loops: &'a LoopInfo,
    /// The parsed race report.
    pub race_report: &'a [FuncFileLine],
    /// The dangerous operation sites if a dangerous function list was given.
    pub labels: Option<&'a DangerousOpLabels>,
    /// Manual overrides of seed instructions.
    pub overrides: ManualOverrides,
}

impl<'a> AnalysisResults<'a> {
    /// Create a new `AnalysisResults` struct without dangerous operation labels or overrides.
    pub fn new(
        program: &'a Program,
        index: &'a InstIndex,
        control_dependence: &'a ControlDependenceGraphs,
        loops: &'a LoopInfo,
        race_report: &'a [FuncFileLine],
    ) -> AnalysisResults<'a> {
        AnalysisResults {
            program,
            index,
            control_dependence,
            loops,
            race_report,
            labels: None,
            overrides: ManualOverrides::default(),
        }
    }

    /// Create a new `AnalysisResults` struct containing the given dangerous operation labels.
    pub fn with_labels(self, labels: Option<&'a DangerousOpLabels>) -> AnalysisResults<'a> {
        AnalysisResults { labels, ..self }
    }

    /// Create a new `AnalysisResults` struct containing the given manual overrides.
    pub fn with_overrides(self, overrides: ManualOverrides) -> AnalysisResults<'a> {
        AnalysisResults { overrides, ..self }
    }
}

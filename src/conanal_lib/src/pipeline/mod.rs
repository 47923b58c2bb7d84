//! This module contains functions and structs helpful for building a complete analysis pipeline
//! starting from the path of the serialized program.

mod results;
pub use results::{AnalysisResults, ManualOverrides};

use crate::analysis::control_dependence::ControlDependenceGraphs;
use crate::analysis::index::InstIndex;
use crate::analysis::loops::LoopInfo;
use crate::intermediate_representation::Program;
use crate::prelude::*;
use crate::utils::log::LogMessage;
use crate::utils::report::FuncFileLine;
use std::path::Path;

/// Read the serialized program from the given path and normalize it.
///
/// If successful, returns the program and the log messages generated during normalization.
pub fn load_program(program_file_path: &Path) -> Result<(Program, Vec<LogMessage>), Error> {
    let json = std::fs::read_to_string(program_file_path).with_context(|| {
        format!(
            "Could not read from program file path {}",
            program_file_path.display()
        )
    })?;
    Program::from_json(&json)
        .with_context(|| format!("Invalid program file {}", program_file_path.display()))
}

/// A program together with the analyses every check depends on.
pub struct PreparedProgram {
    /// The normalized program.
    pub program: Program,
    /// Instruction ids and the source line lookup.
    pub index: InstIndex,
    /// The control dependence graphs of all functions.
    pub control_dependence: ControlDependenceGraphs,
    /// The loop forests of all functions.
    pub loops: LoopInfo,
}

impl PreparedProgram {
    /// Compute the basic analyses of a normalized program.
    pub fn new(program: Program) -> PreparedProgram {
        let index = InstIndex::new(&program);
        let control_dependence = ControlDependenceGraphs::new(&program);
        let loops = LoopInfo::new(&program);
        PreparedProgram {
            program,
            index,
            control_dependence,
            loops,
        }
    }

    /// Bundle the analyses with a race report.
    pub fn analysis_results<'a>(&'a self, race_report: &'a [FuncFileLine]) -> AnalysisResults<'a> {
        AnalysisResults::new(
            &self.program,
            &self.index,
            &self.control_dependence,
            &self.loops,
            race_report,
        )
    }

    /// Log statistics about the program.
    pub fn statistics(&self) -> LogMessage {
        LogMessage::new_debug(format!(
            "{} functions, {} blocks, {} instructions ({} without source location)",
            self.program.functions.len(),
            self.program.blocks.len(),
            self.program.instructions.len(),
            self.index.num_unlocated()
        ))
        .source("Pipeline")
    }
}

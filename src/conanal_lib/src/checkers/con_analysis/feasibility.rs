//! Confirmation of dangerous operation sites through dominating tainted branches.
//!
//! A site is confirmed if a tainted branch lies in a block dominating the site
//! and the taint trace intersects the instructions executed on every path to the site.

use crate::analysis::dominators::DominatorCache;
use crate::analysis::index::InstIndex;
use crate::analysis::taint::TaintState;
use crate::intermediate_representation::*;
use crate::prelude::*;
use crate::utils::report::FuncFileLine;
use fnv::FnvHashSet;
use std::collections::BTreeSet;

/// A dangerous operation reachable from the corrupted value along a feasible path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedSite {
    /// The function containing the dangerous operation.
    pub function: FuncId,
    /// The source line of the dangerous operation.
    pub file_line: FileLine,
    /// The tainted instructions on every path to the site, in taint order.
    pub trace: Vec<InstId>,
}

/// Check every site against the result of a taint pass.
///
/// Sites in functions without tainted instructions are skipped,
/// as are sites whose recorded function name does not match the function found through the index.
/// Returns an error if a site cannot be resolved through the index.
pub fn confirm_sites(
    program: &Program,
    index: &InstIndex,
    dominators: &mut DominatorCache,
    sites: &[FuncFileLine],
    state: &TaintState,
    corrupted_functions: &BTreeSet<FuncId>,
) -> Result<Vec<ConfirmedSite>, Error> {
    let mut confirmed = Vec::new();
    for site in sites {
        let dangerous_op = index
            .instructions_at(&site.file_line)
            .and_then(|instructions| instructions.first().copied())
            .ok_or_else(|| anyhow!("Dangerous operation site {} not found in the program", site))?;
        let func = program.function_of(dangerous_op);
        if !corrupted_functions.contains(&func) || program.function(func).name != site.function {
            continue;
        }
        let Some(dominator_path) = dominator_path(program, dominators, dangerous_op, state) else {
            continue;
        };
        let trace: Vec<InstId> = state
            .tainted
            .instructions()
            .filter(|inst| dominator_path.contains(inst))
            .collect();
        if trace.is_empty() {
            continue;
        }
        confirmed.push(ConfirmedSite {
            function: func,
            file_line: site.file_line.clone(),
            trace,
        });
    }
    Ok(confirmed)
}

/// Collect the instructions of all blocks dominating the block of the dangerous operation,
/// stopping at the dangerous operation itself.
///
/// Returns `None` if none of the collected instructions is a tainted branch.
fn dominator_path(
    program: &Program,
    dominators: &mut DominatorCache,
    dangerous_op: InstId,
    state: &TaintState,
) -> Option<FnvHashSet<InstId>> {
    let func = program.function_of(dangerous_op);
    let block = program.inst(dangerous_op).block;
    let dominating_blocks = dominators.get(program, func).get(&block)?;
    let mut path = FnvHashSet::default();
    let mut has_tainted_branch = false;
    for dominator in dominating_blocks {
        for inst in program.block(*dominator).instructions.iter().copied() {
            if program.inst(inst).is_branch() && state.tainted.contains(&inst.into()) {
                has_tainted_branch = true;
            }
            path.insert(inst);
            if inst == dangerous_op {
                break;
            }
        }
    }
    if has_tainted_branch {
        Some(path)
    } else {
        None
    }
}

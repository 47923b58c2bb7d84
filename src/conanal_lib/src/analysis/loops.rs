//! Natural loops of functions.
//!
//! An edge `latch -> header` is a back edge if the header dominates the latch.
//! The natural loop of a back edge consists of the header
//! and all blocks that can reach the latch without passing through the header.
//! Loops sharing the same header are merged into one loop.
//! Loops are nested by containment, which yields a forest of loops per function.

use super::dominators::compute_dominators;
use super::graph::FunctionCfg;
use crate::intermediate_representation::*;
use fnv::{FnvHashMap, FnvHashSet};
use petgraph::visit::Dfs;
use std::collections::{BTreeMap, BTreeSet};

/// A natural loop together with the loops nested inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loop {
    /// The single entry block of the loop.
    pub header: BlockId,
    /// All blocks of the loop, including the blocks of nested loops.
    pub blocks: BTreeSet<BlockId>,
    /// Blocks of the loop with at least one successor outside of the loop.
    pub exiting: BTreeSet<BlockId>,
    /// Loops directly nested inside this loop.
    pub sub_loops: Vec<Loop>,
}

impl Loop {
    /// Returns `true` if the block belongs to the loop or one of its nested loops.
    pub fn contains(&self, block: BlockId) -> bool {
        self.blocks.contains(&block)
    }

    /// Returns `true` if control flow may leave the loop from the given block.
    pub fn is_loop_exiting(&self, block: BlockId) -> bool {
        self.exiting.contains(&block)
    }

    /// The nesting depth of the deepest loop inside this loop, counting this loop as 1.
    pub fn depth(&self) -> usize {
        1 + self.sub_loops.iter().map(Loop::depth).max().unwrap_or(0)
    }

    /// Insert a loop into the subtree rooted at this loop.
    /// The loop must be contained in this loop.
    fn insert(&mut self, inner: Loop) {
        match self
            .sub_loops
            .iter_mut()
            .find(|sub_loop| inner.blocks.is_subset(&sub_loop.blocks))
        {
            Some(sub_loop) => sub_loop.insert(inner),
            None => self.sub_loops.push(inner),
        }
    }
}

/// Compute the loop forest of one function.
/// The top-level loops are ordered by their header blocks.
pub fn compute_loops(program: &Program, func: FuncId) -> Vec<Loop> {
    let Some(cfg) = FunctionCfg::new(program, func) else {
        return Vec::new();
    };
    let mut reachable = FnvHashSet::default();
    let mut dfs = Dfs::new(&cfg.graph, cfg.entry());
    while let Some(node) = dfs.next(&cfg.graph) {
        reachable.insert(cfg.block(node));
    }
    let dominators = compute_dominators(program, func);

    let mut bodies: BTreeMap<BlockId, BTreeSet<BlockId>> = BTreeMap::new();
    for latch in program.function(func).blocks.iter() {
        if !reachable.contains(latch) {
            continue;
        }
        for header in program.block(*latch).successors.iter() {
            if !dominators[latch].contains(header) {
                continue;
            }
            let body = bodies
                .entry(*header)
                .or_insert_with(|| BTreeSet::from([*header]));
            let mut worklist = vec![*latch];
            while let Some(block) = worklist.pop() {
                if reachable.contains(&block) && body.insert(block) {
                    worklist.extend(program.block(block).predecessors.iter().copied());
                }
            }
        }
    }

    let mut loops: Vec<Loop> = bodies
        .into_iter()
        .map(|(header, blocks)| {
            let exiting = blocks
                .iter()
                .copied()
                .filter(|block| {
                    program
                        .block(*block)
                        .successors
                        .iter()
                        .any(|succ| !blocks.contains(succ))
                })
                .collect();
            Loop {
                header,
                blocks,
                exiting,
                sub_loops: Vec::new(),
            }
        })
        .collect();
    // Insert outer loops first so that every loop finds its parent.
    loops.sort_by_key(|lp| std::cmp::Reverse(lp.blocks.len()));
    let mut forest: Vec<Loop> = Vec::new();
    for lp in loops {
        match forest
            .iter_mut()
            .find(|outer| lp.blocks.is_subset(&outer.blocks))
        {
            Some(outer) => outer.insert(lp),
            None => forest.push(lp),
        }
    }
    forest.sort_by_key(|lp| lp.header);
    forest
}

/// The loop forests of all functions with a body.
#[derive(Debug, Clone, Default)]
pub struct LoopInfo {
    loops: FnvHashMap<FuncId, Vec<Loop>>,
}

impl LoopInfo {
    /// Compute the loops of all functions of the program.
    pub fn new(program: &Program) -> LoopInfo {
        let loops = program
            .iter_functions()
            .filter(|(_, function)| !function.is_declaration())
            .map(|(id, _)| (id, compute_loops(program, id)))
            .collect();
        LoopInfo { loops }
    }

    /// Get the top-level loops of a function.
    pub fn top_level_loops(&self, func: FuncId) -> &[Loop] {
        self.loops.get(&func).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Find the outermost loop containing the given block,
    /// searching the loop forests of all functions in program order.
    pub fn outermost_loop_containing(&self, program: &Program, block: BlockId) -> Option<&Loop> {
        program
            .iter_functions()
            .flat_map(|(id, _)| self.top_level_loops(id).iter())
            .find(|lp| lp.contains(block))
    }
}

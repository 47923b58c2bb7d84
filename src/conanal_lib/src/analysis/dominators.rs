//! Iterative computation of dominator sets.
//!
//! A block `A` dominates a block `B` if every path from the function entry to `B` passes through `A`.
//! The sets are computed with the classic worklist algorithm:
//! - `dom(entry) = {entry}`,
//! - blocks with predecessors start with the set of all blocks of the function,
//! - blocks without predecessors start with themselves and are never updated,
//! - `dom(n) = {n} ∪ ⋂ dom(p)` over all predecessors `p` of `n`,
//!   recomputed for blocks on the worklist until no set changes.
//!
//! The worklist is seeded with the successors of the entry block.
//! Successors of a block whose set changed are re-enqueued, the entry block never is.

use crate::intermediate_representation::*;
use fnv::FnvHashMap;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// The dominator sets of all blocks of a function.
/// Each set contains the block itself.
pub type DominatorMap = BTreeMap<BlockId, BTreeSet<BlockId>>;

/// Compute the dominator sets of all blocks of a function.
/// The result is empty for declarations.
pub fn compute_dominators(program: &Program, func: FuncId) -> DominatorMap {
    let function = program.function(func);
    let mut dominators = DominatorMap::new();
    let Some(entry) = function.entry_block() else {
        return dominators;
    };
    let all_blocks: BTreeSet<BlockId> = function.blocks.iter().copied().collect();
    for block in function.blocks.iter().skip(1) {
        let initial = if program.block(*block).predecessors.is_empty() {
            BTreeSet::from([*block])
        } else {
            all_blocks.clone()
        };
        dominators.insert(*block, initial);
    }
    dominators.insert(entry, BTreeSet::from([entry]));

    let mut worklist: VecDeque<BlockId> = program
        .block(entry)
        .successors
        .iter()
        .copied()
        .filter(|succ| *succ != entry)
        .collect();
    while let Some(block) = worklist.pop_front() {
        let mut preds = program.block(block).predecessors.iter();
        let Some(first_pred) = preds.next() else {
            continue;
        };
        let mut new_doms = dominators[first_pred].clone();
        for pred in preds {
            new_doms = new_doms
                .intersection(&dominators[pred])
                .copied()
                .collect();
        }
        new_doms.insert(block);
        if dominators[&block] != new_doms {
            dominators.insert(block, new_doms);
            for succ in program.block(block).successors.iter() {
                if *succ != entry && !worklist.contains(succ) {
                    worklist.push_back(*succ);
                }
            }
        }
    }
    dominators
}

/// Memoized dominator maps, computed on first request per function.
#[derive(Debug, Default, Clone)]
pub struct DominatorCache {
    maps: FnvHashMap<FuncId, DominatorMap>,
}

impl DominatorCache {
    /// Create an empty cache.
    pub fn new() -> DominatorCache {
        DominatorCache::default()
    }

    /// Get the dominator map of the function, computing it if necessary.
    pub fn get(&mut self, program: &Program, func: FuncId) -> &DominatorMap {
        self.maps
            .entry(func)
            .or_insert_with(|| compute_dominators(program, func))
    }

    /// The number of functions for which dominators were computed.
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    /// Returns `true` if no dominator map was computed yet.
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

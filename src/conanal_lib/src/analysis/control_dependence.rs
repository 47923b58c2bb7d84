//! Control dependence graphs of functions.
//!
//! A block `B` is control dependent on a block `A`
//! if `A` has a successor from which every path to the function exit passes through `B`,
//! while `B` does not post-dominate `A` itself.
//! Intuitively the branch at the end of `A` decides whether `B` is executed.
//!
//! The graphs are computed with the construction of Ferrante, Ottenstein and Warren:
//! For every control flow edge `A -> S` where `S` does not post-dominate `A`,
//! all blocks on the post-dominator tree path from `S` up to (but excluding) the immediate
//! post-dominator of `A` are control dependent on `A`.
//! Post-dominators are computed on the reversed control flow graph,
//! where a virtual exit node is connected to every block without successors.

use super::graph::FunctionCfg;
use crate::intermediate_representation::*;
use fnv::{FnvHashMap, FnvHashSet};
use petgraph::algo::dominators;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

/// Queries on the control dependence relation of the functions of a program.
pub trait ControlDependence {
    /// Returns `true` if a control dependence graph exists for the function,
    /// i.e. if the function has a body.
    fn has_graph(&self, func: FuncId) -> bool;

    /// Returns `true` if the execution of block `b` is (transitively) controlled by block `a`.
    /// A block only influences itself if it controls itself through a loop.
    fn influences(&self, func: FuncId, a: BlockId, b: BlockId) -> bool;
}

/// The control dependence graph of one function.
///
/// An edge `A -> B` means that `B` is directly control dependent on `A`.
#[derive(Debug, Clone)]
pub struct ControlDependenceGraph {
    graph: DiGraph<BlockId, ()>,
    nodes: FnvHashMap<BlockId, NodeIndex>,
}

impl ControlDependenceGraph {
    /// Compute the control dependence graph for the given control flow graph.
    pub fn new(cfg: &FunctionCfg) -> ControlDependenceGraph {
        // The reversed graph uses the node indices of the control flow graph
        // plus one additional node for the virtual exit.
        let mut reversed: DiGraph<Option<BlockId>, ()> = DiGraph::new();
        for node in cfg.graph.node_indices() {
            reversed.add_node(Some(cfg.block(node)));
        }
        let virtual_exit = reversed.add_node(None);
        for edge in cfg.graph.edge_references() {
            reversed.add_edge(edge.target(), edge.source(), ());
        }
        for exit in cfg.exits() {
            reversed.add_edge(virtual_exit, exit, ());
        }
        let post_dominators = dominators::simple_fast(&reversed, virtual_exit);

        // Same node indices as the control flow graph.
        let mut graph = DiGraph::new();
        let mut nodes = FnvHashMap::default();
        for node in cfg.graph.node_indices() {
            nodes.insert(cfg.block(node), graph.add_node(cfg.block(node)));
        }
        for edge in cfg.graph.edge_references() {
            let (source, target) = (edge.source(), edge.target());
            let target_post_dominates_source = post_dominators
                .strict_dominators(source)
                .map(|mut iter| iter.any(|node| node == target))
                .unwrap_or(false);
            if target_post_dominates_source {
                continue;
            }
            let stop = post_dominators.immediate_dominator(source);
            let mut runner = Some(target);
            while let Some(current) = runner {
                if Some(current) == stop || current == virtual_exit {
                    break;
                }
                graph.update_edge(source, current, ());
                runner = post_dominators.immediate_dominator(current);
            }
        }
        ControlDependenceGraph { graph, nodes }
    }

    /// Returns `true` if block `b` is reachable from block `a` through at least one control dependence edge.
    pub fn influences(&self, a: BlockId, b: BlockId) -> bool {
        let (Some(start), Some(goal)) = (self.nodes.get(&a), self.nodes.get(&b)) else {
            return false;
        };
        let mut visited = FnvHashSet::default();
        let mut worklist: Vec<NodeIndex> = self.graph.neighbors(*start).collect();
        while let Some(node) = worklist.pop() {
            if node == *goal {
                return true;
            }
            if visited.insert(node) {
                worklist.extend(self.graph.neighbors(node));
            }
        }
        false
    }

    /// Get the blocks the given block is directly control dependent on.
    pub fn dependencies(&self, block: BlockId) -> Vec<BlockId> {
        let Some(node) = self.nodes.get(&block) else {
            return Vec::new();
        };
        let mut deps: Vec<BlockId> = self
            .graph
            .neighbors_directed(*node, petgraph::Direction::Incoming)
            .map(|node| self.graph[node])
            .collect();
        deps.sort();
        deps
    }
}

/// The control dependence graphs of all functions with a body.
#[derive(Debug, Clone, Default)]
pub struct ControlDependenceGraphs {
    graphs: FnvHashMap<FuncId, ControlDependenceGraph>,
}

impl ControlDependenceGraphs {
    /// Compute the control dependence graphs of all functions of the program.
    pub fn new(program: &Program) -> ControlDependenceGraphs {
        let graphs = super::graph::get_function_cfgs(program)
            .into_iter()
            .map(|(func, cfg)| (func, ControlDependenceGraph::new(&cfg)))
            .collect();
        ControlDependenceGraphs { graphs }
    }

    /// Get the graph of a function.
    pub fn get(&self, func: FuncId) -> Option<&ControlDependenceGraph> {
        self.graphs.get(&func)
    }
}

impl ControlDependence for ControlDependenceGraphs {
    fn has_graph(&self, func: FuncId) -> bool {
        self.graphs.contains_key(&func)
    }

    fn influences(&self, func: FuncId, a: BlockId, b: BlockId) -> bool {
        self.graphs
            .get(&func)
            .map(|graph| graph.influences(a, b))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::graph::tests::mock_loop_program;

    #[test]
    fn if_then_else_in_loop() {
        let (program, func, blocks) = mock_loop_program();
        let cdgs = ControlDependenceGraphs::new(&program);
        let [entry, then, else_, join, exit] = blocks[..] else {
            panic!()
        };
        assert!(cdgs.has_graph(func));
        assert!(cdgs.influences(func, entry, then));
        assert!(cdgs.influences(func, entry, else_));
        assert!(!cdgs.influences(func, entry, join));
        assert!(!cdgs.influences(func, then, join));
        // The loop condition at the end of `join` decides whether the body is executed again.
        assert!(cdgs.influences(func, join, entry));
        assert!(cdgs.influences(func, join, join));
        assert!(cdgs.influences(func, join, then));
        assert!(!cdgs.influences(func, join, exit));
        assert_eq!(cdgs.get(func).unwrap().dependencies(then), vec![entry]);
    }

    #[test]
    fn straight_line_code() {
        let mut builder = ProgramBuilder::new();
        let func = builder.function("main", 0);
        let first = builder.block(func, "first");
        let second = builder.block(func, "second");
        builder.push(first, Instruction::new(Opcode::Branch, vec![]));
        builder.push(second, Instruction::new(Opcode::Return, vec![]));
        builder.edge(first, second);
        let extern_func = builder.function("puts", 1);
        let program = builder.build().unwrap();
        let cdgs = ControlDependenceGraphs::new(&program);
        assert!(!cdgs.influences(func, first, second));
        assert!(!cdgs.has_graph(extern_func));
    }
}

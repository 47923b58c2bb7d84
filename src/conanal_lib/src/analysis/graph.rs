//! Generate intraprocedural control flow graphs out of the functions of a program.
//!
//! Each basic block of a function is one node of the graph
//! and each control flow transfer between two blocks is one edge.
//! Graphs are only generated for functions with a body.
//! The node of the entry block is always the first node of the graph.

use crate::intermediate_representation::*;
use fnv::FnvHashMap;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

/// The graph type of an intraprocedural control flow graph.
/// Nodes are labelled with the handle of the block they represent.
pub type Graph = DiGraph<BlockId, ()>;

/// The control flow graph of a single function.
#[derive(Debug, Clone)]
pub struct FunctionCfg {
    /// The graph itself.
    pub graph: Graph,
    /// The node of each block of the function.
    nodes: FnvHashMap<BlockId, NodeIndex>,
}

impl FunctionCfg {
    /// Build the control flow graph of a function.
    /// Returns `None` for declarations.
    pub fn new(program: &Program, func: FuncId) -> Option<FunctionCfg> {
        let function = program.function(func);
        if function.is_declaration() {
            return None;
        }
        let mut graph = Graph::new();
        let mut nodes = FnvHashMap::default();
        for block in function.blocks.iter() {
            nodes.insert(*block, graph.add_node(*block));
        }
        for block in function.blocks.iter() {
            for succ in program.block(*block).successors.iter() {
                if let Some(succ_node) = nodes.get(succ) {
                    graph.update_edge(nodes[block], *succ_node, ());
                }
            }
        }
        Some(FunctionCfg { graph, nodes })
    }

    /// The node of the entry block.
    pub fn entry(&self) -> NodeIndex {
        NodeIndex::new(0)
    }

    /// Get the node corresponding to a block of the function.
    pub fn node(&self, block: BlockId) -> Option<NodeIndex> {
        self.nodes.get(&block).copied()
    }

    /// Get the block corresponding to a node.
    pub fn block(&self, node: NodeIndex) -> BlockId {
        self.graph[node]
    }

    /// Iterate over the blocks without successors, i.e. the points where control flow leaves the function.
    pub fn exits(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices().filter(move |node| {
            self.graph
                .neighbors_directed(*node, Direction::Outgoing)
                .next()
                .is_none()
        })
    }
}

/// Build the control flow graphs of all functions with a body.
pub fn get_function_cfgs(program: &Program) -> FnvHashMap<FuncId, FunctionCfg> {
    program
        .iter_functions()
        .filter_map(|(id, _)| FunctionCfg::new(program, id).map(|cfg| (id, cfg)))
        .collect()
}

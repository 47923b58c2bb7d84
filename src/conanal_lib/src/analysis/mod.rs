//! Analyses of the program representation that the check modules are built upon.

pub mod control_dependence;
pub mod dominators;
pub mod graph;
pub mod index;
pub mod labels;
pub mod loops;
pub mod taint;

//! Labelling of dangerous operations.
//!
//! Two kinds of program sites are considered dangerous:
//! - pointer dereferences, i.e. every pointer-indexing instruction with a known source location,
//! - calls to functions from a user-provided list of dangerous functions (e.g. `strcpy` or `system`).
//!
//! Indirect calls are resolved to the alias candidates provided by the front end.
//! A candidate is only considered if its number of parameters matches the number of actual arguments
//! of the call.
//! Sites are identified by their function and source line,
//! so several instructions generated from the same line form one site.

use crate::intermediate_representation::*;
use crate::utils::report::FuncFileLine;
use fnv::FnvHashSet;
use std::collections::BTreeSet;

/// The dangerous operation sites of a program.
#[derive(Debug, Clone, Default)]
pub struct DangerousOpLabels {
    /// The dangerous function names the labels were computed for.
    pub dangerous_functions: BTreeSet<String>,
    /// Dangerous pointer dereference sites, most recently discovered first.
    pub pointer_sites: Vec<FuncFileLine>,
    /// Dangerous call sites, most recently discovered first.
    pub function_sites: Vec<FuncFileLine>,
    pointer_lines: BTreeSet<FileLine>,
    function_lines: BTreeSet<FileLine>,
}

impl DangerousOpLabels {
    /// Label all dangerous operations of the program.
    pub fn new(program: &Program, dangerous_functions: BTreeSet<String>) -> DangerousOpLabels {
        let mut labels = DangerousOpLabels {
            dangerous_functions,
            ..Default::default()
        };
        let mut seen_pointer_sites: FnvHashSet<FuncFileLine> = FnvHashSet::default();
        let mut seen_function_sites: FnvHashSet<FuncFileLine> = FnvHashSet::default();
        for (func, function) in program.iter_functions() {
            for inst_id in program.function_instructions(func) {
                let inst = program.inst(inst_id);
                let Some(location) = &inst.location else {
                    continue;
                };
                let site = FuncFileLine {
                    function: function.name.clone(),
                    file_line: location.file_line(),
                };
                if inst.is_gep() {
                    if seen_pointer_sites.insert(site.clone()) {
                        labels.pointer_lines.insert(site.file_line.clone());
                        labels.pointer_sites.push(site);
                    }
                } else if let Some(callee) = inst.opcode.callee() {
                    let names = resolve_callee_names(program, callee, inst.operands.len());
                    if names
                        .iter()
                        .any(|name| labels.dangerous_functions.contains(*name))
                        && seen_function_sites.insert(site.clone())
                    {
                        labels.function_lines.insert(site.file_line.clone());
                        labels.function_sites.push(site);
                    }
                }
            }
        }
        // Most recently discovered first.
        labels.pointer_sites.reverse();
        labels.function_sites.reverse();
        labels
    }

    /// Returns `true` if a dangerous pointer dereference was generated from the source line.
    pub fn is_pointer_site(&self, file_line: &FileLine) -> bool {
        self.pointer_lines.contains(file_line)
    }

    /// Returns `true` if a dangerous call was generated from the source line.
    pub fn is_function_site(&self, file_line: &FileLine) -> bool {
        self.function_lines.contains(file_line)
    }
}

/// Get the names of all functions a call may target.
/// Intrinsics in the `llvm.` namespace resolve to no name at all.
fn resolve_callee_names<'a>(program: &'a Program, callee: &Callee, num_args: usize) -> Vec<&'a str> {
    match callee {
        Callee::Direct(func) => {
            let name = program.function(*func).name.as_str();
            if name.starts_with("llvm.") {
                Vec::new()
            } else {
                vec![name]
            }
        }
        Callee::Indirect { candidates } => candidates
            .iter()
            .map(|func| program.function(*func))
            .filter(|function| !function.name.starts_with("llvm.") && function.num_args == num_args)
            .map(|function| function.name.as_str())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_sites() {
        let mut builder = ProgramBuilder::new();
        let buf = builder.global("buf");
        let strcpy = builder.function("strcpy", 2);
        let memset = builder.intrinsic("llvm.memset", 2);
        let system = builder.function("system", 1);
        let main = builder.function("main", 0);
        let entry = builder.block(main, "entry");
        let at = |line| SourceLocation::new("src/prog.c", line);
        let gep = builder.push(
            entry,
            Instruction::new(Opcode::GetElementPtr, vec![buf.into(), Value::int(0)]).at(at(5)),
        );
        builder.push(
            entry,
            Instruction::new(Opcode::GetElementPtr, vec![gep.into(), Value::int(1)]).at(at(5)),
        );
        builder.push(
            entry,
            Instruction::new(Opcode::GetElementPtr, vec![buf.into(), Value::int(2)]).at(at(6)),
        );
        builder.push(
            entry,
            Instruction::new(
                Opcode::Call { callee: Callee::Direct(strcpy) },
                vec![gep.into(), gep.into()],
            )
            .at(at(7)),
        );
        builder.push(
            entry,
            Instruction::new(
                Opcode::Call { callee: Callee::Direct(memset) },
                vec![gep.into(), Value::int(0)],
            )
            .at(at(8)),
        );
        // Only `system` has a matching signature.
        builder.push(
            entry,
            Instruction::new(
                Opcode::Call { callee: Callee::Indirect { candidates: vec![strcpy, system] } },
                vec![gep.into()],
            )
            .at(at(9)),
        );
        builder.push(entry, Instruction::new(Opcode::Return, vec![]));
        let program = builder.build().unwrap();

        let dangerous: BTreeSet<String> =
            ["strcpy", "system", "llvm.memset"].iter().map(|s| s.to_string()).collect();
        let labels = DangerousOpLabels::new(&program, dangerous);
        let site = |line| FuncFileLine {
            function: "main".into(),
            file_line: FileLine::new("prog.c", line),
        };
        assert_eq!(labels.pointer_sites, vec![site(6), site(5)]);
        assert_eq!(labels.function_sites, vec![site(9), site(7)]);
        assert!(labels.is_pointer_site(&FileLine::new("prog.c", 5)));
        assert!(!labels.is_function_site(&FileLine::new("prog.c", 8)));
    }

    #[test]
    fn repeated_sites_keep_first_discovery() {
        let mut builder = ProgramBuilder::new();
        let buf = builder.global("buf");
        let strcpy = builder.function("strcpy", 0);
        let main = builder.function("main", 0);
        let worker = builder.function("worker", 0);
        let at = |line| SourceLocation::new("src/prog.c", line);
        let gep_at = |line| {
            Instruction::new(Opcode::GetElementPtr, vec![buf.into(), Value::int(0)]).at(at(line))
        };
        let call_at = |line| {
            Instruction::new(Opcode::Call { callee: Callee::Direct(strcpy) }, vec![]).at(at(line))
        };
        let main_entry = builder.block(main, "entry");
        builder.push(main_entry, gep_at(5));
        builder.push(main_entry, call_at(5));
        builder.push(main_entry, gep_at(6));
        builder.push(main_entry, gep_at(5));
        builder.push(main_entry, call_at(6));
        builder.push(main_entry, call_at(5));
        builder.push(main_entry, Instruction::new(Opcode::Return, vec![]));
        let worker_entry = builder.block(worker, "entry");
        // Same source line as in `main`, but a different site.
        builder.push(worker_entry, gep_at(5));
        builder.push(worker_entry, Instruction::new(Opcode::Return, vec![]));
        let program = builder.build().unwrap();

        let dangerous: BTreeSet<String> = ["strcpy".to_string()].into_iter().collect();
        let labels = DangerousOpLabels::new(&program, dangerous);
        let site = |function: &str, line| FuncFileLine {
            function: function.into(),
            file_line: FileLine::new("prog.c", line),
        };
        assert_eq!(
            labels.pointer_sites,
            vec![site("worker", 5), site("main", 6), site("main", 5)]
        );
        assert_eq!(labels.function_sites, vec![site("main", 6), site("main", 5)]);
    }
}

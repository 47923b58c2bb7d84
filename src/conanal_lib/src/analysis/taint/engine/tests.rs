use super::*;
use crate::analysis::control_dependence::ControlDependenceGraphs;
use fnv::FnvHashSet;

fn at(line: u32) -> SourceLocation {
    SourceLocation::new("src/prog.c", line)
}

fn call(callee: FuncId, args: Vec<Value>) -> Instruction {
    Instruction::new(
        Opcode::Call {
            callee: Callee::Direct(callee),
        },
        args,
    )
}

fn no_labels() -> DangerousOpLabels {
    DangerousOpLabels::default()
}

#[test]
fn element_precision() {
    let mut builder = ProgramBuilder::new();
    let base = builder.global("table");
    let main = builder.function("main", 0);
    let entry = builder.block(main, "entry");
    let first = builder.push(
        entry,
        Instruction::new(Opcode::GetElementPtr, vec![base.into(), Value::int(0)]),
    );
    let second = builder.push(
        entry,
        Instruction::new(Opcode::GetElementPtr, vec![base.into(), Value::int(1)]),
    );
    let again = builder.push(
        entry,
        Instruction::new(Opcode::GetElementPtr, vec![base.into(), Value::int(0)]),
    );
    let load = builder.push(entry, Instruction::new(Opcode::Load, vec![second.into()]));
    builder.push(entry, Instruction::new(Opcode::Return, vec![]));
    let program = builder.build().unwrap();
    let cdgs = ControlDependenceGraphs::new(&program);
    let labels = no_labels();
    let engine = TaintEngine::interprocedural(&program, &cdgs, &labels);

    let mut logs = Vec::new();
    let state = engine
        .run_pass(Frame::at(&program, first), &[], &mut logs)
        .unwrap();
    assert!(state.tainted.contains(&first.into()));
    assert!(state.tainted.contains(&again.into()));
    assert!(!state.tainted.contains(&second.into()));
    assert!(!state.tainted.contains(&load.into()));
    assert_eq!(
        state.pointers[&Value::from(base)],
        vec![PointerIndex::Single(Value::int(0))]
    );
}

#[test]
fn element_precision_with_field_index() {
    let mut builder = ProgramBuilder::new();
    let table = builder.global("table");
    let ptr = builder.global("ptr");
    let main = builder.function("main", 0);
    let entry = builder.block(main, "entry");
    let field = builder.push(
        entry,
        Instruction::new(
            Opcode::GetElementPtr,
            vec![table.into(), Value::int(0), Value::int(1)],
        ),
    );
    let same_field = builder.push(
        entry,
        Instruction::new(
            Opcode::GetElementPtr,
            vec![table.into(), Value::int(0), Value::int(1)],
        ),
    );
    let other_field = builder.push(
        entry,
        Instruction::new(
            Opcode::GetElementPtr,
            vec![table.into(), Value::int(0), Value::int(2)],
        ),
    );
    let load = builder.push(entry, Instruction::new(Opcode::Load, vec![ptr.into()]));
    let through_load = builder.push(
        entry,
        Instruction::new(
            Opcode::GetElementPtr,
            vec![load.into(), Value::int(3), Value::int(4)],
        ),
    );
    builder.push(entry, Instruction::new(Opcode::Return, vec![]));
    let program = builder.build().unwrap();
    let cdgs = ControlDependenceGraphs::new(&program);
    let labels = no_labels();
    let engine = TaintEngine::interprocedural(&program, &cdgs, &labels);

    let state = engine
        .run_pass(Frame::at(&program, field), &[], &mut Vec::new())
        .unwrap();
    assert!(state.tainted.contains(&same_field.into()));
    assert!(!state.tainted.contains(&other_field.into()));
    assert_eq!(
        state.pointers[&Value::from(table)],
        vec![PointerIndex::Pair(Value::int(0), Value::int(1))]
    );
    assert!(!state.pointers.contains_key(&Value::from(load)));

    // A base tainted as a whole taints the element access and records its descriptor.
    let state = engine
        .run_pass(Frame::at(&program, load), &[], &mut Vec::new())
        .unwrap();
    assert!(state.tainted.contains(&through_load.into()));
    assert!(!state.tainted.contains(&other_field.into()));
    assert_eq!(
        state.pointers[&Value::from(load)],
        vec![PointerIndex::Pair(Value::int(3), Value::int(4))]
    );
}

#[test]
fn taint_order_is_first_taint_order() {
    let mut builder = ProgramBuilder::new();
    let counter = builder.global("counter");
    let copy = builder.global("copy");
    let main = builder.function("main", 0);
    let entry = builder.block(main, "entry");
    let load = builder.push(entry, Instruction::new(Opcode::Load, vec![counter.into()]));
    let first_store = builder.push(
        entry,
        Instruction::new(Opcode::Store, vec![load.into(), copy.into()]),
    );
    // Stores to `copy` again, which is already tainted.
    let second_store = builder.push(
        entry,
        Instruction::new(Opcode::Store, vec![load.into(), copy.into()]),
    );
    let reload = builder.push(entry, Instruction::new(Opcode::Load, vec![copy.into()]));
    let sum = builder.push(
        entry,
        Instruction::new(Opcode::BinaryOp, vec![reload.into(), load.into()]),
    );
    builder.push(entry, Instruction::new(Opcode::Return, vec![]));
    let program = builder.build().unwrap();
    let cdgs = ControlDependenceGraphs::new(&program);
    let labels = no_labels();
    let engine = TaintEngine::interprocedural(&program, &cdgs, &labels);

    let state = engine
        .run_pass(Frame::at(&program, load), &[], &mut Vec::new())
        .unwrap();
    let ordered = state.tainted.ordered();
    assert_eq!(
        ordered.to_vec(),
        vec![
            Value::from(load),
            Value::from(first_store),
            Value::from(copy),
            Value::from(second_store),
            Value::from(reload),
            Value::from(sum),
        ]
    );
    let distinct: FnvHashSet<&Value> = ordered.iter().collect();
    assert_eq!(distinct.len(), ordered.len());
    assert!(ordered.iter().all(|value| state.tainted.contains(value)));
    assert!(!state.tainted.contains(&counter.into()));
}

#[test]
fn malformed_pointer_index_is_fatal() {
    let mut builder = ProgramBuilder::new();
    let counter = builder.global("counter");
    let main = builder.function("main", 0);
    let entry = builder.block(main, "entry");
    let load = builder.push(entry, Instruction::new(Opcode::Load, vec![counter.into()]));
    builder.push(
        entry,
        Instruction::new(
            Opcode::GetElementPtr,
            vec![load.into(), Value::int(0), Value::int(1), Value::int(2)],
        ),
    );
    let program = builder.build().unwrap();
    let cdgs = ControlDependenceGraphs::new(&program);
    let labels = no_labels();
    let engine = TaintEngine::interprocedural(&program, &cdgs, &labels);
    assert!(engine
        .run_pass(Frame::at(&program, load), &[], &mut Vec::new())
        .is_err());
}

#[test]
fn pointer_index_without_operands_is_fatal() {
    let mut builder = ProgramBuilder::new();
    let counter = builder.global("counter");
    let main = builder.function("main", 0);
    let entry = builder.block(main, "entry");
    let load = builder.push(entry, Instruction::new(Opcode::Load, vec![counter.into()]));
    builder.push(entry, Instruction::new(Opcode::GetElementPtr, vec![]));
    builder.push(entry, Instruction::new(Opcode::Return, vec![]));
    let program = builder.build().unwrap();
    let cdgs = ControlDependenceGraphs::new(&program);
    let labels = no_labels();
    let engine = TaintEngine::interprocedural(&program, &cdgs, &labels);
    assert!(engine
        .run_pass(Frame::at(&program, load), &[], &mut Vec::new())
        .is_err());
}

#[test]
fn store_and_branch() {
    let mut builder = ProgramBuilder::new();
    let counter = builder.global("counter");
    let copy = builder.global("copy");
    let main = builder.function("main", 0);
    let entry = builder.block(main, "entry");
    let then = builder.block(main, "then");
    let exit = builder.block(main, "exit");
    let load = builder.push(entry, Instruction::new(Opcode::Load, vec![counter.into()]));
    let store = builder.push(
        entry,
        Instruction::new(Opcode::Store, vec![load.into(), copy.into()]),
    );
    let cmp = builder.push(
        entry,
        Instruction::new(Opcode::Compare, vec![load.into(), Value::int(0)]),
    );
    let branch = builder.push(entry, Instruction::new(Opcode::Branch, vec![cmp.into()]));
    let reload = builder.push(then, Instruction::new(Opcode::Load, vec![copy.into()]));
    let unrelated = builder.push(then, Instruction::new(Opcode::Alloca, vec![]));
    builder.push(then, Instruction::new(Opcode::Branch, vec![]));
    builder.push(exit, Instruction::new(Opcode::Return, vec![]));
    builder.edge(entry, then);
    builder.edge(entry, exit);
    builder.edge(then, exit);
    let program = builder.build().unwrap();
    let cdgs = ControlDependenceGraphs::new(&program);
    let labels = no_labels();

    let engine = TaintEngine::interprocedural(&program, &cdgs, &labels);
    let state = engine
        .run_pass(Frame::at(&program, load), &[], &mut Vec::new())
        .unwrap();
    assert_eq!(
        state.tainted.ordered().to_vec(),
        vec![
            Value::from(load),
            Value::from(store),
            Value::from(copy),
            Value::from(cmp),
            Value::from(branch),
            Value::from(reload),
        ]
    );
    assert_eq!(state.corrupted_branches, vec![branch]);
    assert!(!state.tainted.contains(&unrelated.into()));

    // Confined to the function, control dependence taints the controlled instructions.
    let engine = TaintEngine::intraprocedural(&program, &cdgs);
    let state = engine.run_from(load, &mut Vec::new()).unwrap();
    assert!(state.tainted.contains(&unrelated.into()));
}

#[test]
fn mutual_recursion_terminates() {
    let mut builder = ProgramBuilder::new();
    let counter = builder.global("counter");
    let f = builder.function("f", 1);
    let g = builder.function("g", 1);
    let main = builder.function("main", 0);
    let f_entry = builder.block(f, "entry");
    let g_entry = builder.block(g, "entry");
    let main_entry = builder.block(main, "entry");
    let f_add = builder.push(
        f_entry,
        Instruction::new(Opcode::BinaryOp, vec![Value::arg(f, 0), Value::int(1)]),
    );
    let f_call = builder.push(f_entry, call(g, vec![f_add.into()]));
    builder.push(f_entry, Instruction::new(Opcode::Return, vec![f_call.into()]));
    let g_add = builder.push(
        g_entry,
        Instruction::new(Opcode::BinaryOp, vec![Value::arg(g, 0), Value::int(2)]),
    );
    builder.push(g_entry, call(f, vec![g_add.into()]));
    builder.push(g_entry, Instruction::new(Opcode::Return, vec![]));
    let load = builder.push(main_entry, Instruction::new(Opcode::Load, vec![counter.into()]));
    let main_call = builder.push(main_entry, call(f, vec![load.into()]));
    builder.push(main_entry, Instruction::new(Opcode::Return, vec![]));
    let program = builder.build().unwrap();
    let cdgs = ControlDependenceGraphs::new(&program);
    let labels = no_labels();
    let engine = TaintEngine::interprocedural(&program, &cdgs, &labels);

    let state = engine
        .run_pass(Frame::at(&program, load), &[], &mut Vec::new())
        .unwrap();
    assert!(state.tainted.contains(&Value::arg(f, 0)));
    assert!(state.tainted.contains(&Value::arg(g, 0)));
    assert!(state.tainted.contains(&g_add.into()));
    assert!(state.tainted.contains(&f_call.into()));
    assert!(state.tainted.contains(&main_call.into()));
    assert_eq!(state.scans_of(f), 1);
    assert_eq!(state.scans_of(g), 1);
    assert!(state.call_stack.is_empty());
}

#[test]
fn memo_skips_unchanged_callee() {
    let mut builder = ProgramBuilder::new();
    let counter = builder.global("counter");
    let log = builder.function("log_event", 0);
    let main = builder.function("main", 0);
    let log_entry = builder.block(log, "entry");
    builder.push(log_entry, Instruction::new(Opcode::Alloca, vec![]));
    builder.push(log_entry, Instruction::new(Opcode::Return, vec![]));
    let entry = builder.block(main, "entry");
    let load = builder.push(entry, Instruction::new(Opcode::Load, vec![counter.into()]));
    builder.push(entry, call(log, vec![]));
    builder.push(entry, call(log, vec![]));
    builder.push(entry, Instruction::new(Opcode::Return, vec![]));
    let program = builder.build().unwrap();
    let cdgs = ControlDependenceGraphs::new(&program);
    let labels = no_labels();
    let engine = TaintEngine::interprocedural(&program, &cdgs, &labels);

    let state = engine
        .run_pass(Frame::at(&program, load), &[], &mut Vec::new())
        .unwrap();
    assert_eq!(state.scans_of(log), 1);
    assert_eq!(state.memo[&log], EnterExitVal { enter: 1, exit: 1 });
}

#[test]
fn declarations_and_unresolved_calls() {
    let mut builder = ProgramBuilder::new();
    let counter = builder.global("counter");
    let strlen = builder.function("strlen", 1);
    let memcpy = builder.intrinsic("llvm.memcpy", 2);
    let main = builder.function("main", 0);
    let entry = builder.block(main, "entry");
    let load = builder.push(entry, Instruction::new(Opcode::Load, vec![counter.into()]));
    let len = builder.push(entry, call(strlen, vec![load.into()]));
    let untainted = builder.push(entry, call(strlen, vec![counter.into()]));
    let intrinsic = builder.push(entry, call(memcpy, vec![load.into(), load.into()]));
    let indirect = builder.push(
        entry,
        Instruction::new(
            Opcode::Call {
                callee: Callee::Indirect { candidates: vec![] },
            },
            vec![load.into()],
        )
        .at(at(12)),
    );
    builder.push(entry, Instruction::new(Opcode::Return, vec![]));
    let program = builder.build().unwrap();
    let cdgs = ControlDependenceGraphs::new(&program);
    let labels = no_labels();
    let engine = TaintEngine::interprocedural(&program, &cdgs, &labels);

    let mut logs = Vec::new();
    let state = engine
        .run_pass(Frame::at(&program, load), &[], &mut logs)
        .unwrap();
    assert!(state.tainted.contains(&len.into()));
    assert!(!state.tainted.contains(&untainted.into()));
    assert!(!state.tainted.contains(&intrinsic.into()));
    assert!(!state.tainted.contains(&indirect.into()));
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].location.as_deref(), Some("prog.c:12"));
}

#[test]
fn taint_returns_to_outer_frames() {
    let mut builder = ProgramBuilder::new();
    let counter = builder.global("counter");
    let worker = builder.function("worker", 0);
    let main = builder.function("main", 0);
    let worker_entry = builder.block(worker, "entry");
    let load = builder.push(worker_entry, Instruction::new(Opcode::Load, vec![counter.into()]));
    builder.push(worker_entry, Instruction::new(Opcode::Return, vec![load.into()]));
    let main_entry = builder.block(main, "entry");
    let call_site = builder.push(main_entry, call(worker, vec![]));
    let use_site = builder.push(
        main_entry,
        Instruction::new(Opcode::BinaryOp, vec![call_site.into(), Value::int(4)]),
    );
    builder.push(main_entry, Instruction::new(Opcode::Return, vec![]));
    let program = builder.build().unwrap();
    let cdgs = ControlDependenceGraphs::new(&program);
    let labels = no_labels();
    let engine = TaintEngine::interprocedural(&program, &cdgs, &labels);

    let outer = [Frame::at(&program, call_site)];
    let state = engine
        .run_pass(Frame::at(&program, load), &outer, &mut Vec::new())
        .unwrap();
    assert!(state.tainted.contains(&call_site.into()));
    assert!(state.tainted.contains(&use_site.into()));
    // The callee of the resumed call site is not scanned again.
    assert_eq!(state.scans_of(worker), 1);

    let missing = Frame {
        function: worker,
        instruction: Some(use_site),
    };
    assert!(engine.run_pass(missing, &[], &mut Vec::new()).is_err());
}

#[test]
fn cross_function_control_dependence() {
    let mut builder = ProgramBuilder::new();
    let counter = builder.global("counter");
    let buf = builder.global("buf");
    let helper = builder.function("helper", 0);
    let main = builder.function("main", 0);
    let helper_entry = builder.block(helper, "entry");
    let deref = builder.push(
        helper_entry,
        Instruction::new(Opcode::GetElementPtr, vec![buf.into(), Value::int(0)]).at(at(30)),
    );
    builder.push(helper_entry, Instruction::new(Opcode::Return, vec![]));
    let entry = builder.block(main, "entry");
    let then = builder.block(main, "then");
    let exit = builder.block(main, "exit");
    let load = builder.push(entry, Instruction::new(Opcode::Load, vec![counter.into()]).at(at(10)));
    let cmp = builder.push(
        entry,
        Instruction::new(Opcode::Compare, vec![load.into(), Value::int(0)]).at(at(11)),
    );
    let branch = builder.push(entry, Instruction::new(Opcode::Branch, vec![cmp.into()]).at(at(11)));
    let call_site = builder.push(then, call(helper, vec![]).at(at(12)));
    builder.push(then, Instruction::new(Opcode::Branch, vec![]));
    builder.push(exit, Instruction::new(Opcode::Return, vec![]));
    builder.edge(entry, then);
    builder.edge(entry, exit);
    builder.edge(then, exit);
    let program = builder.build().unwrap();
    let cdgs = ControlDependenceGraphs::new(&program);
    let labels = DangerousOpLabels::new(&program, Default::default());
    let engine = TaintEngine::interprocedural(&program, &cdgs, &labels);

    let state = engine
        .run_pass(Frame::at(&program, load), &[], &mut Vec::new())
        .unwrap();
    assert_eq!(state.corrupted_calls, vec![call_site]);
    assert_eq!(
        state.inter_ctrl_dep_ptr.get(&FileLine::new("prog.c", 30)),
        Some(&vec![branch])
    );
    assert!(state.inter_ctrl_dep_func.is_empty());
    assert!(!state.tainted.contains(&deref.into()));
}

use super::*;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

/// Records `(function, depth, event)` and optionally asks for opcodes or
/// stops at a chosen event kind.
#[derive(Default)]
struct Recorder {
    events: Vec<(String, usize, String)>,
    lines: Vec<u32>,
    arm_opcodes: bool,
    stop_on: Option<&'static str>,
}

impl Recorder {
    fn kinds(&self) -> Vec<&str> {
        self.events.iter().map(|(_, _, kind)| kind.as_str()).collect()
    }
}

impl Tracer for Recorder {
    fn on_event(&mut self, frame: &mut FrameView<'_>, event: TraceEvent<'_>) -> TraceAction {
        if self.arm_opcodes {
            frame.set_trace_opcodes(true);
        }
        let label = match event {
            TraceEvent::Line(line) => {
                self.lines.push(line);
                "line".to_string()
            }
            TraceEvent::Return(value) => format!("return {}", value),
            TraceEvent::Exception(message) => format!("exception {}", message),
            other => other.kind().to_string(),
        };
        self.events.push((frame.function_name().to_string(), frame.depth(), label));
        if self.stop_on == Some(event.kind()) {
            TraceAction::Stop
        } else {
            TraceAction::Continue
        }
    }
}

fn count_loop(vm: &mut Vm, n: i64) -> Value {
    programs::load(vm, &programs::count_loop_module(n).unwrap(), "abc").unwrap()
}

#[test]
fn test_histogram_for_trace_loop() {
    let n = programs::TRACE_LOOP_ITERATIONS as u64;
    let mut vm = Vm::new();
    let histogram = programs::count_opcodes(&mut vm, n as i64).unwrap();

    assert_eq!(histogram.total(), 10_809);
    let expected = [
        ("FOR_ITER", n + 1),
        ("STORE_FAST", n),
        ("LOAD_FAST", n),
        ("LOAD_CONST", n + 2),
        ("COMPARE_OP", n),
        ("POP_JUMP_IF_FALSE", n),
        ("NOP", 1),
        ("JUMP_ABSOLUTE", 1),
        ("LOAD_GLOBAL", 1),
        ("CALL_FUNCTION", 1),
        ("GET_ITER", 1),
        ("RETURN_VALUE", 1),
    ];
    for (name, count) in expected {
        assert_eq!(histogram.get(name), count, "{}", name);
    }
    assert_eq!(histogram.len(), expected.len());
    assert_eq!(histogram.sorted()[0], ("LOAD_CONST", n + 2));
    assert!(!vm.is_tracing());
}

#[test]
fn test_histogram_total_matches_executed_instructions() {
    for n in [0i64, 5, 64] {
        let mut vm = Vm::new();
        let abc = count_loop(&mut vm, n);
        let before = vm.instructions_executed();
        let mut counter = OpcodeCounter::new();
        vm.trace(&mut counter).call(&abc, vec![]).unwrap();
        assert_eq!(counter.histogram().total(), vm.instructions_executed() - before);
        assert_eq!(counter.histogram().total(), programs::count_loop_instructions(n as u64));
    }
}

#[test]
fn test_traced_and_untraced_runs_agree() {
    let mut plain = Vm::capturing();
    let fib = programs::load(&mut plain, &programs::fib_module().unwrap(), "fib").unwrap();
    let expected = plain.call(&fib, vec![Value::Int(15)]).unwrap();

    let mut traced = Vm::capturing();
    let fib = programs::load(&mut traced, &programs::fib_module().unwrap(), "fib").unwrap();
    let mut counter = OpcodeCounter::new();
    let got = traced.trace(&mut counter).call(&fib, vec![Value::Int(15)]).unwrap();

    assert_eq!(got, expected);
    assert_eq!(got, Value::Int(610));
    assert_eq!(traced.instructions_executed(), plain.instructions_executed());
    assert_eq!(traced.take_output(), plain.take_output());
}

#[test]
fn test_print_output_is_unchanged_by_tracing() {
    let greet = || {
        let mut b = CodeBuilder::new("f");
        b.load_global("print").load_const(Value::from("hello")).call(1).ret();
        b.build().unwrap()
    };

    let mut plain = Vm::capturing();
    let f = install(&mut plain, greet());
    plain.call(&f, vec![]).unwrap();

    let mut traced = Vm::capturing();
    let f = install(&mut traced, greet());
    let mut counter = OpcodeCounter::new();
    traced.trace(&mut counter).call(&f, vec![]).unwrap();

    assert_eq!(traced.take_output(), vec!["hello".to_string()]);
    assert_eq!(plain.take_output(), vec!["hello".to_string()]);
    assert_eq!(counter.histogram().total(), 4);
}

#[test]
fn test_unarmed_tracer_sees_no_opcodes() {
    let mut vm = Vm::new();
    let abc = count_loop(&mut vm, 3);
    let mut recorder = Recorder::default();
    vm.trace(&mut recorder).call(&abc, vec![]).unwrap();

    let kinds = recorder.kinds();
    assert_eq!(kinds.first(), Some(&"call"));
    assert_eq!(kinds.last(), Some(&"return none"));
    assert!(kinds.iter().all(|kind| *kind != "opcode"));
    assert_eq!(recorder.lines, vec![2, 3, 4, 2, 3, 2, 3, 2, 4]);
}

#[test]
fn test_armed_tracer_sees_every_instruction() {
    let mut vm = Vm::new();
    let abc = count_loop(&mut vm, 3);
    let mut recorder = Recorder {
        arm_opcodes: true,
        ..Recorder::default()
    };
    vm.trace(&mut recorder).call(&abc, vec![]).unwrap();
    let opcodes = recorder.kinds().iter().filter(|kind| **kind == "opcode").count() as u64;
    assert_eq!(opcodes, programs::count_loop_instructions(3));
}

#[test]
fn test_stop_on_call_leaves_frame_untraced() {
    let mut vm = Vm::new();
    let abc = count_loop(&mut vm, 3);
    let mut recorder = Recorder {
        arm_opcodes: true,
        stop_on: Some("call"),
        ..Recorder::default()
    };
    vm.trace(&mut recorder).call(&abc, vec![]).unwrap();
    assert_eq!(recorder.kinds(), vec!["call"]);
}

#[test]
fn test_stop_on_line_ends_local_tracing() {
    let mut vm = Vm::new();
    let abc = count_loop(&mut vm, 3);
    let mut recorder = Recorder {
        stop_on: Some("line"),
        ..Recorder::default()
    };
    let result = vm.trace(&mut recorder).call(&abc, vec![]).unwrap();
    assert_eq!(result, Value::None);
    assert_eq!(recorder.kinds(), vec!["call", "line"]);
    assert_eq!(recorder.lines, vec![2]);
}

#[test]
fn test_nested_frames_report_depth() {
    let mut vm = Vm::new();
    let fib = programs::load(&mut vm, &programs::fib_module().unwrap(), "fib").unwrap();
    let mut recorder = Recorder::default();
    vm.trace(&mut recorder).call(&fib, vec![Value::Int(3)]).unwrap();

    let calls: Vec<usize> = recorder
        .events
        .iter()
        .filter(|(_, _, kind)| kind == "call")
        .map(|(_, depth, _)| *depth)
        .collect();
    // fib(3) -> fib(2), fib(1)
    assert_eq!(calls, vec![1, 2, 2]);
    assert!(recorder.events.iter().all(|(name, _, _)| name == "fib"));
    let returns: Vec<&str> = recorder
        .events
        .iter()
        .filter(|(_, _, kind)| kind.starts_with("return"))
        .map(|(_, _, kind)| kind.as_str())
        .collect();
    assert_eq!(returns, vec!["return 1", "return 1", "return 2"]);
}

#[test]
fn test_exception_event_and_hook_release_on_error() {
    let mut vm = Vm::new();
    let g = programs::load(&mut vm, &programs::hashmap_getter_module().unwrap(), "getter").unwrap();
    let mut recorder = Recorder::default();
    let err = {
        let mut scope = vm.trace(&mut recorder);
        scope.call(&g, vec![Value::Int(2), Value::Int(3)]).unwrap_err()
    };
    assert_eq!(vm_error(&err).kind, ErrorKind::Key);
    assert!(!vm.is_tracing());
    assert_eq!(recorder.kinds().last(), Some(&"exception KeyError: 2"));

    // The next call runs without the hook.
    let before = recorder.events.len();
    vm.call(&g, vec![Value::Int(2), Value::Int(2)]).unwrap();
    assert_eq!(recorder.events.len(), before);
}

#[test]
fn test_scope_reports_tracing_state() {
    let mut vm = Vm::new();
    let abc = count_loop(&mut vm, 2);
    assert!(!vm.is_tracing());
    let mut counter = OpcodeCounter::new();
    {
        let mut scope = vm.trace(&mut counter);
        assert!(scope.is_tracing());
        scope.call(&abc, vec![]).unwrap();
        assert!(scope.is_tracing());
    }
    assert!(!vm.is_tracing());
}

struct Panicking;

impl Tracer for Panicking {
    fn on_event(&mut self, _frame: &mut FrameView<'_>, _event: TraceEvent<'_>) -> TraceAction {
        panic!("tracer gave up");
    }
}

#[test]
fn test_vm_is_reusable_after_tracer_panic() {
    let mut vm = Vm::new().with_recursion_limit(2);
    let fib = programs::load(&mut vm, &programs::fib_module().unwrap(), "fib").unwrap();
    assert_eq!(vm.call(&fib, vec![Value::Int(3)]).unwrap(), Value::Int(2));

    let mut tracer = Panicking;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let _ = vm.trace(&mut tracer).call(&fib, vec![Value::Int(3)]);
    }));
    assert!(outcome.is_err());
    assert!(!vm.is_tracing());

    // Depth unwound with the panic, so the full limit is available again.
    assert_eq!(vm.call(&fib, vec![Value::Int(3)]).unwrap(), Value::Int(2));
}

#[test]
fn test_profiler_counts_match_counter() {
    for n in [0i64, 3, 250] {
        let mut vm = Vm::new();
        let counted = programs::count_opcodes(&mut vm, n).unwrap();

        let mut vm = Vm::new();
        let started = Instant::now();
        let profile = programs::profile_opcodes(&mut vm, n).unwrap();
        let wall = started.elapsed();

        assert_eq!(profile.histogram(), &counted);
        assert_eq!(profile.histogram().total(), programs::count_loop_instructions(n as u64));
        assert!(profile.total_elapsed() <= wall, "{:?} > {:?}", profile.total_elapsed(), wall);
        assert_eq!(profile.elapsed("BINARY_ADD"), Duration::ZERO);
    }
}

#[test]
fn test_profiler_closes_frames_on_error() {
    let mut vm = Vm::new();
    let g = programs::load(&mut vm, &programs::hashmap_getter_module().unwrap(), "getter").unwrap();
    let mut profiler = OpcodeProfiler::new();
    vm.trace(&mut profiler).call(&g, vec![Value::Int(1), Value::Int(2)]).unwrap_err();
    let profile = profiler.into_profile();
    assert_eq!(profile.histogram().get("BINARY_SUBSCR"), 2);
    let rows = profile.to_string();
    assert_eq!(rows.lines().count(), profile.histogram().len());
    assert!(rows.lines().all(|row| row.trim_end().ends_with('s')), "{}", rows);
}

#[test]
fn test_traced_module_run() {
    let mut vm = Vm::new();
    let module = programs::count_loop_module(2).unwrap();
    let mut recorder = Recorder::default();
    vm.trace(&mut recorder).run(&module).unwrap();
    assert_eq!(recorder.events[0], ("<module>".to_string(), 1, "call".to_string()));
    let result = vm.trace(&mut recorder).call_global("abc", vec![]).unwrap();
    assert_eq!(result, Value::None);
    assert!(recorder.events.iter().any(|(name, _, _)| name == "abc"));
}

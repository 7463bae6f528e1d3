use crate::{
    vm::{OpcodeCounter, Value, Vm, programs},
    workload::{self, FIB_ARG, FIB_RESULT},
};
use anyhow::{Context, Result, bail};

/// Argument used by the VM fib scenario; the native one uses [`FIB_ARG`].
pub const VM_FIB_ARG: i64 = 20;
/// Entries populated and probed by the VM getter scenario.
pub const VM_GETTER_SIZE: i64 = 100_000;

#[derive(Clone, Copy)]
pub struct Scenario {
    key: &'static str,
    title: &'static str,
    expected: u64,
    run: fn() -> Result<u64>,
}

impl Scenario {
    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn title(&self) -> &'static str {
        self.title
    }

    pub fn expected(&self) -> u64 {
        self.expected
    }

    pub fn bench_case_name(&self) -> String {
        format!("{}_run", self.key)
    }

    /// Runs the workload once and checks its result.
    pub fn run(&self) -> Result<u64> {
        let observed = (self.run)().with_context(|| format!("scenario {} failed", self.key))?;
        if observed != self.expected {
            bail!("scenario {}: expected {} but observed {}", self.key, self.expected, observed);
        }
        Ok(observed)
    }
}

impl std::fmt::Debug for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario")
            .field("key", &self.key)
            .field("expected", &self.expected)
            .finish()
    }
}

fn native_fib() -> Result<u64> {
    Ok(workload::fib(FIB_ARG))
}

fn hashmap_int() -> Result<u64> {
    let map = workload::populate_int(workload::MAP_SIZE);
    Ok(workload::lookup_int(&map, 0..workload::MAP_SIZE)?)
}

fn hashmap_str() -> Result<u64> {
    let map = workload::populate_str(workload::MAP_SIZE);
    Ok(workload::lookup_str(&map, 0..workload::MAP_SIZE).hits)
}

fn delegate() -> Result<u64> {
    Ok(workload::drain(workload::delegate(workload::SEQUENCE_LEN)))
}

fn int_result(value: Value) -> Result<u64> {
    match value {
        Value::Int(i) => u64::try_from(i).context("negative result"),
        other => bail!("expected an int result, got {:?}", other),
    }
}

fn vm_fib() -> Result<u64> {
    let mut vm = Vm::new();
    let fib = programs::load(&mut vm, &programs::fib_module()?, "fib")?;
    int_result(vm.call(&fib, vec![Value::Int(VM_FIB_ARG)])?)
}

fn vm_count_loop() -> Result<u64> {
    let mut vm = Vm::new();
    let abc = programs::load(
        &mut vm,
        &programs::count_loop_module(programs::TRACE_LOOP_ITERATIONS)?,
        "abc",
    )?;
    let before = vm.instructions_executed();
    vm.call(&abc, Vec::new())?;
    Ok(vm.instructions_executed() - before)
}

fn vm_count_loop_traced() -> Result<u64> {
    let mut vm = Vm::new();
    let abc = programs::load(
        &mut vm,
        &programs::count_loop_module(programs::TRACE_LOOP_ITERATIONS)?,
        "abc",
    )?;
    let mut counter = OpcodeCounter::new();
    vm.trace(&mut counter).call(&abc, Vec::new())?;
    Ok(counter.histogram().total())
}

fn vm_hashmap_getter() -> Result<u64> {
    let mut vm = Vm::new();
    let getter = programs::load(&mut vm, &programs::hashmap_getter_module()?, "getter")?;
    int_result(vm.call(&getter, vec![Value::Int(VM_GETTER_SIZE), Value::Int(VM_GETTER_SIZE)])?)
}

const TRACE_LOOP_TOTAL: u64 = 6 * programs::TRACE_LOOP_ITERATIONS as u64 + 9;

static SCENARIOS: &[Scenario] = &[
    Scenario {
        key: "native_fib",
        title: "Recursive fibonacci",
        expected: FIB_RESULT,
        run: native_fib,
    },
    Scenario {
        key: "hashmap_int",
        title: "Int-keyed populate and checked lookup",
        expected: workload::MAP_SIZE,
        run: hashmap_int,
    },
    Scenario {
        key: "hashmap_str",
        title: "String-keyed populate and lookup",
        expected: workload::MAP_SIZE,
        run: hashmap_str,
    },
    Scenario {
        key: "delegate",
        title: "Chained sequence drain",
        expected: workload::SEQUENCE_LEN * workload::DELEGATE_COUNT as u64,
        run: delegate,
    },
    Scenario {
        key: "vm_fib",
        title: "Recursive fibonacci on the VM",
        expected: 6_765,
        run: vm_fib,
    },
    Scenario {
        key: "vm_count_loop",
        title: "Count loop, untraced",
        expected: TRACE_LOOP_TOTAL,
        run: vm_count_loop,
    },
    Scenario {
        key: "vm_count_loop_traced",
        title: "Count loop under the opcode counter",
        expected: TRACE_LOOP_TOTAL,
        run: vm_count_loop_traced,
    },
    Scenario {
        key: "vm_hashmap_getter",
        title: "Map populate and checked lookup on the VM",
        expected: VM_GETTER_SIZE as u64,
        run: vm_hashmap_getter,
    },
];

pub fn scenarios() -> &'static [Scenario] {
    SCENARIOS
}

pub fn find(key: &str) -> Option<&'static Scenario> {
    SCENARIOS.iter().find(|s| s.key == key)
}

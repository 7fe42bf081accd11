//! The `Vm` instance: memory, registers, the loaded header, and the
//! tracing flag, all owned by one struct rather than scattered across
//! process-wide globals, so multiple machines can coexist in one
//! process (handy for tests). The driver loop lives here too, pumping
//! the executor until the exit syscall fires.

use std::io::{Read, Write};

use crate::bof::BofHeader;
use crate::error::SrmError;
use crate::exec::{step, StepOutcome};
use crate::memory::Memory;
use crate::registers::Registers;
use crate::tracer;

#[derive(Debug)]
pub struct Vm {
    pub memory: Memory,
    pub registers: Registers,
    pub header: BofHeader,
    pub tracing: bool,
}

impl Vm {
    /// A freshly-initialised, unloaded machine: zero memory and
    /// registers, tracing on (tracing starts enabled).
    pub fn new() -> Self {
        Self {
            memory: Memory::new(),
            registers: Registers::new(),
            header: BofHeader {
                text_start_address: 0,
                text_length: 0,
                data_start_address: 0,
                data_length: 0,
                stack_bottom_addr: 0,
            },
            tracing: true,
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

/// Pump the executor until the exit syscall fires, printing the
/// tracer's four views around each step at the right moments.
/// Returns the exit syscall's status (already truncated to
/// `i32` by `sgnExt`; the caller narrows further to the platform exit
/// code width).
pub fn run<W: Write, R: Read>(
    vm: &mut Vm,
    stdout: &mut W,
    stdin: &mut R,
) -> Result<i32, SrmError> {
    run_with(vm, stdout, stdin, |_vm| {})
}

/// Like [`run`], but invokes `on_step` after every traced step. The
/// CLI uses this to pause for Enter between instructions under
/// `--step`; tests and the plain `run` wrapper pass a no-op.
pub fn run_with<W: Write, R: Read>(
    vm: &mut Vm,
    stdout: &mut W,
    stdin: &mut R,
    mut on_step: impl FnMut(&Vm),
) -> Result<i32, SrmError> {
    tracer::print_registers(vm, stdout);
    tracer::print_words(vm, stdout);

    loop {
        if vm.tracing {
            tracer::print_instruction(vm, vm.registers.pc, stdout)?;
        }
        match step(vm, stdout, stdin)? {
            StepOutcome::Continue => {}
            StepOutcome::Exit(status) => return Ok(status),
        }
        if vm.tracing {
            tracer::print_registers(vm, stdout);
            tracer::print_words(vm, stdout);
            on_step(vm);
        }
    }
}

//! The four tracer/display outputs: program listing, register dump,
//! single-instruction trace line, and touched-word dump. Everything
//! writes through a generic `io::Write` (so tests can capture output)
//! rather than calling `println!` directly, and reads `Memory`'s
//! touched-set instead of keeping a parallel index. None of these
//! functions mutate `vm`.

use std::io::Write;

use itertools::Itertools;

use crate::disasm::assembly_form;
use crate::error::SrmError;
use crate::regnames::name_of;
use crate::vm::Vm;

const COLUMNS: usize = 5;

fn cell(addr: u32, value: i32) -> String {
    format!("{addr:8}: {value}\t")
}

fn print_in_columns<W: Write>(out: &mut W, cells: impl Iterator<Item = String>) -> usize {
    let mut total = 0;
    for chunk in cells.chunks(COLUMNS).into_iter() {
        let line: Vec<_> = chunk.collect();
        total += line.len();
        writeln!(out, "{}", line.join("")).unwrap();
    }
    total
}

/// Listing mode (`-p`): the full text segment disassembled in
/// address order, then a compact dump of the initial data segment.
pub fn print_program<W: Write>(vm: &Vm, out: &mut W) {
    writeln!(out, "Address Instruction").unwrap();
    let text_start = vm.header.text_start_address;
    for i in 0..vm.header.text_length {
        let addr = text_start + i;
        let word = vm.memory.read_raw(addr as i64).unwrap();
        writeln!(out, "{addr:6}: {}", assembly_form(addr, word)).unwrap();
    }

    let data_start = vm.header.data_start_address;
    let data_end = data_start + vm.header.data_length;
    let cells = (data_start..=data_end)
        .map(|addr| cell(addr, vm.memory.read_signed(addr as i64).unwrap()));
    let count = print_in_columns(out, cells);
    if count % COLUMNS == 0 {
        writeln!(out, "{:>11}     ", "...").unwrap();
    } else {
        writeln!(out, "{:>11}     \n", "...").unwrap();
    }
}

/// PC followed by every GPR, five columns per line, mnemonic names
/// from `regnames::name_of`.
pub fn print_registers<W: Write>(vm: &Vm, out: &mut W) {
    writeln!(out, "{:>8}: {}\t", "PC", vm.registers.pc).unwrap();
    let cells = vm.registers.all().iter().enumerate().map(|(i, value)| {
        let name = name_of(i as u8).unwrap_or("?");
        let label = format!("GPR[{name:<3}]");
        format!("{label:>8}: {value}\t")
    });
    print_in_columns(out, cells);
}

/// The single line printed just before executing the instruction at
/// `k` while tracing is on. Fallible: `k` is `vm.registers.pc`, which a
/// preceding `JMP`/`CSI`/`JMPA`/`CALL`/taken-branch may have set to an
/// out-of-range address before `step` gets a chance to reject it, so
/// this must surface the same `SrmError::Memory` the executor would
/// rather than panic on an out-of-bounds read.
pub fn print_instruction<W: Write>(vm: &Vm, k: u32, out: &mut W) -> Result<(), SrmError> {
    let word = vm
        .memory
        .read_raw(k as i64)
        .map_err(|source| SrmError::Memory { pc: k, source })?;
    writeln!(out, "==>{k:7}: {}", assembly_form(k, word)).unwrap();
    Ok(())
}

/// Walk `[program_size, stack_bottom_addr]` and print only the
/// touched words, five columns per line. Called after every step
/// while tracing is on, so this is how a program's data/stack
/// footprint becomes visible without dumping all 32768 words.
pub fn print_words<W: Write>(vm: &Vm, out: &mut W) {
    let start = vm.header.text_length;
    let end = vm.header.stack_bottom_addr;
    let cells = (start..=end)
        .filter(|addr| vm.memory.is_touched(*addr as usize))
        .map(|addr| cell(addr, vm.memory.read_signed(addr as i64).unwrap()));
    print_in_columns(out, cells);
}

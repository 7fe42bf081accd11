//! The instruction disassembler: `assembly_form(address, instr) ->
//! String`. Lives alongside the decoder it reads from since there's no
//! separate crate for it.
//!
//! One `format!` arm per opcode, operands in the order the instruction
//! semantics name them, using the conventional assembler operand
//! syntax `offset(register)` for a memory reference.

use crate::decode::{comp_func, decode, immed_op, jump_op, othc_func, syscall_code, Instruction};
use crate::fields::{form_address, form_offset, sgn_ext, zero_ext};
use crate::regnames::name_of;

fn reg(index: u8) -> &'static str {
    name_of(index).unwrap_or("??")
}

fn mem_operand(offset_field: u16, reg_index: u8) -> String {
    format!("{}({})", form_offset(offset_field), reg(reg_index))
}

/// Format a single decoded instruction the way `print_instruction`/
/// `print_program` expect: a mnemonic followed by its operands, never
/// the raw instruction word.
pub fn assembly_form(address: u32, word: u32) -> String {
    match decode(word) {
        Instruction::Computational { func, rs, os, rt, ot } => {
            let t = mem_operand(ot, rt);
            let s = mem_operand(os, rs);
            match func {
                comp_func::NOP => "NOP".to_string(),
                comp_func::ADD => format!("ADD    {t},{s}"),
                comp_func::SUB => format!("SUB    {t},{s}"),
                comp_func::CPW => format!("CPW    {t},{s}"),
                comp_func::AND => format!("AND    {t},{s}"),
                comp_func::BOR => format!("BOR    {t},{s}"),
                comp_func::NOR => format!("NOR    {t},{s}"),
                comp_func::XOR => format!("XOR    {t},{s}"),
                comp_func::LWR => format!("LWR    {},{s}", reg(rt)),
                comp_func::SWR => format!("SWR    {t},{}", reg(rs)),
                comp_func::SCA => format!("SCA    {t},{s}"),
                comp_func::LWI => format!("LWI    {t},{s}"),
                comp_func::NEG => format!("NEG    {t},{s}"),
                other => format!("UNKNOWN.COMP func={other}"),
            }
        }
        Instruction::OtherComputational { func, reg: r, offset, arg } => {
            let dst = mem_operand(offset, r);
            match func {
                othc_func::LIT => format!("LIT    {dst},{}", sgn_ext(arg)),
                othc_func::ARI => format!("ARI    {},{}", reg(r), sgn_ext(arg)),
                othc_func::SRI => format!("SRI    {},{}", reg(r), sgn_ext(arg)),
                othc_func::MUL => format!("MUL    {dst}"),
                othc_func::DIV => format!("DIV    {dst}"),
                othc_func::CFHI => format!("CFHI   {dst}"),
                othc_func::CFLO => format!("CFLO   {dst}"),
                othc_func::SLL => format!("SLL    {dst},{}", arg & 0x1f),
                othc_func::SRL => format!("SRL    {dst},{}", arg & 0x1f),
                othc_func::JMP => format!("JMP    {dst}"),
                othc_func::CSI => format!("CSI    {dst}"),
                othc_func::JREL => format!(
                    "JREL   {} ; -> {}",
                    form_offset(offset),
                    (address as i64 + form_offset(offset) as i64)
                ),
                other => format!("UNKNOWN.OTHC func={other}"),
            }
        }
        Instruction::Immediate { op, reg: r, offset, immed } => {
            let dst = mem_operand(offset, r);
            match op {
                immed_op::ADDI => format!("ADDI   {dst},{}", sgn_ext(immed)),
                immed_op::ANDI => format!("ANDI   {dst},0x{:x}", zero_ext(immed)),
                immed_op::BORI => format!("BORI   {dst},0x{:x}", zero_ext(immed)),
                immed_op::NORI => format!("NORI   {dst},0x{:x}", zero_ext(immed)),
                immed_op::XORI => format!("XORI   {dst},0x{:x}", zero_ext(immed)),
                immed_op::BEQ => branch("BEQ", address, &dst, immed),
                immed_op::BNE => branch("BNE", address, &dst, immed),
                immed_op::BGEZ => branch("BGEZ", address, &dst, immed),
                immed_op::BGTZ => branch("BGTZ", address, &dst, immed),
                immed_op::BLEZ => branch("BLEZ", address, &dst, immed),
                immed_op::BLTZ => branch("BLTZ", address, &dst, immed),
                other => format!("UNKNOWN.IMMED op={other}"),
            }
        }
        Instruction::Jump { op, addr } => {
            let target = form_address(address, addr);
            match op {
                jump_op::JMPA => format!("JMPA   {target}"),
                jump_op::CALL => format!("CALL   {target}"),
                jump_op::RTN => "RTN".to_string(),
                other => format!("UNKNOWN.JUMP op={other}"),
            }
        }
        Instruction::Syscall { reg: r, offset, code } => {
            let dst = mem_operand(offset, r);
            match code {
                syscall_code::EXIT => format!("SYSCALL exit,{}", sgn_ext(offset)),
                syscall_code::PRINT_STR => format!("SYSCALL print_str,{dst}"),
                syscall_code::PRINT_INT => format!("SYSCALL print_int,{dst}"),
                syscall_code::PRINT_CHAR => format!("SYSCALL print_char,{dst}"),
                syscall_code::READ_CHAR => format!("SYSCALL read_char,{dst}"),
                syscall_code::START_TRACING => "SYSCALL start_tracing".to_string(),
                syscall_code::STOP_TRACING => "SYSCALL stop_tracing".to_string(),
                other => format!("SYSCALL code={other},{dst}"),
            }
        }
    }
}

fn branch(mnemonic: &str, address: u32, dst: &str, immed: u16) -> String {
    let target = address as i64 + form_offset(immed) as i64;
    format!("{mnemonic:<6} {dst},{} ; -> {target}", form_offset(immed))
}

//! Populate a freshly-created `Vm` from a BOF file: header, then the
//! five load steps (registers, text segment, data segment, terminating
//! sentinels), returning `Result` instead of aborting the process on a
//! bad file.

use crate::bof::BofReader;
use crate::error::SrmError;
use crate::registers::{FP, GP, RA, SP};
use crate::vm::Vm;

/// Load `path` into a fresh `Vm`: header, text segment, data segment,
/// and the two terminating sentinel words.
pub fn load(path: &str) -> Result<Vm, SrmError> {
    let mut vm = Vm::new();
    let mut reader = BofReader::open(path)?;
    let header = reader.read_header()?;
    vm.header = header;

    // Step 2: PC/GP/SP/FP from the header, RA and the scratch GPRs
    // zeroed, HI/LO zeroed (already true of a fresh Vm).
    let expect_msg = "GP/SP/FP/RA are fixed, in-range register indices";
    vm.registers.pc = header.text_start_address;
    vm.registers
        .set(GP as u8, header.data_start_address as i32)
        .expect(expect_msg);
    vm.registers
        .set(SP as u8, header.stack_bottom_addr as i32)
        .expect(expect_msg);
    vm.registers
        .set(FP as u8, header.stack_bottom_addr as i32)
        .expect(expect_msg);
    vm.registers.set(RA as u8, 0).expect(expect_msg);

    // Step 3: text segment, as raw instruction words. Marked touched
    // like every other loaded word (spec.md §4.1 step 3), so the
    // listing mode's view of memory is consistent with the data
    // segment's.
    for i in 0..header.text_length {
        let word = reader.read_instruction()?;
        vm.memory
            .write_unsigned((header.text_start_address + i) as i64, word)
            .map_err(|source| SrmError::Memory {
                pc: vm.registers.pc,
                source,
            })?;
    }

    // Step 4: data segment, marked touched so the listing's initial
    // dump and the first `print_words` call show it.
    for i in 0..header.data_length {
        let word = reader.read_word()?;
        vm.memory
            .write_unsigned((header.data_start_address + i) as i64, word)
            .map_err(|source| SrmError::Memory {
                pc: vm.registers.pc,
                source,
            })?;
    }

    // Step 5: terminating sentinels.
    let mem_err = |pc: u32| {
        move |source| SrmError::Memory { pc, source }
    };
    vm.memory
        .write_unsigned(
            (header.data_start_address + header.data_length) as i64,
            0,
        )
        .map_err(mem_err(vm.registers.pc))?;
    vm.memory
        .write_unsigned(header.stack_bottom_addr as i64, 0)
        .map_err(mem_err(vm.registers.pc))?;

    Ok(vm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const MAGIC: &[u8; 4] = b"BOF2";

    fn write_sample(path: &std::path::Path) {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&0u32.to_be_bytes()); // text_start
        bytes.extend_from_slice(&1u32.to_be_bytes()); // text_length
        bytes.extend_from_slice(&10u32.to_be_bytes()); // data_start
        bytes.extend_from_slice(&2u32.to_be_bytes()); // data_length
        bytes.extend_from_slice(&100u32.to_be_bytes()); // stack_bottom
        bytes.extend_from_slice(&0u32.to_be_bytes()); // one NOP instruction
        bytes.extend_from_slice(&11u32.to_be_bytes()); // data word 0
        bytes.extend_from_slice(&22u32.to_be_bytes()); // data word 1
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn load_populates_registers_and_memory() {
        let path = std::env::temp_dir().join("srm_loader_test_load_populates.bof");
        write_sample(&path);

        let vm = load(path.to_str().unwrap()).unwrap();
        assert_eq!(vm.registers.pc, 0);
        assert_eq!(vm.registers.get(GP as u8).unwrap(), 10);
        assert_eq!(vm.registers.get(SP as u8).unwrap(), 100);
        assert_eq!(vm.registers.get(FP as u8).unwrap(), 100);
        assert_eq!(vm.memory.read_unsigned(10).unwrap(), 11);
        assert_eq!(vm.memory.read_unsigned(11).unwrap(), 22);
        assert_eq!(vm.memory.read_unsigned(12).unwrap(), 0); // sentinel
        assert_eq!(vm.memory.read_unsigned(100).unwrap(), 0); // stack sentinel
        assert!(vm.memory.is_touched(0)); // text word, per spec.md §4.1 step 3
        assert!(vm.memory.is_touched(10));
        assert!(vm.memory.is_touched(12));
        assert!(vm.memory.is_touched(100));

        fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_file_is_a_load_error() {
        assert!(load("/nonexistent/path/to.bof").is_err());
    }
}

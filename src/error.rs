//! Crate-wide error type. Every fatal condition named in the
//! component design (load, decode, arithmetic, memory) funnels into
//! this one enum so the driver has a single place to print the
//! diagnostic and pick an exit status.

use crate::bof::BofError;
use crate::memory::MemoryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SrmError {
    #[error("{0}")]
    Load(#[from] BofError),
    #[error("at pc={pc}: unknown opcode/func in instruction word 0x{word:08x}")]
    Decode { pc: u32, word: u32 },
    #[error("at pc={pc}: division by zero")]
    DivideByZero { pc: u32 },
    #[error("at pc={pc}: {source}")]
    Memory {
        pc: u32,
        #[source]
        source: MemoryError,
    },
    #[error("usage: srm [-p] <file.bof>")]
    Usage,
}

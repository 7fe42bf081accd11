//! The binary-object-file reader: `open`/`read_header`/
//! `read_instruction`/`read_word`, a thin byte-stream reader over the
//! BOF layout — a fixed-field header followed by `text_length`
//! big-endian instruction words followed by `data_length` big-endian
//! data words.

use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BofError {
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("file is shorter than its header claims: {0}")]
    Truncated(String),
    #[error("header is inconsistent: {0}")]
    InconsistentHeader(String),
}

/// The fields of a BOF header. A real assembler-produced BOF carries a
/// magic number ahead of these fields, checked and discarded here
/// since the interpreter has nothing further to do with it beyond
/// confirming the file is the right shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BofHeader {
    pub text_start_address: u32,
    pub text_length: u32,
    pub data_start_address: u32,
    pub data_length: u32,
    pub stack_bottom_addr: u32,
}

const MAGIC: &[u8; 4] = b"BOF2";
/// Magic (4 bytes) + five big-endian u32 header fields.
const HEADER_BYTES: usize = 4 + 5 * 4;

/// An open BOF file, positioned just after the header once
/// `read_header` has run, then advancing one word at a time.
pub struct BofReader {
    path: String,
    bytes: Vec<u8>,
    cursor: usize,
}

impl BofReader {
    /// `open(path) -> handle`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BofError> {
        let path_string = path.as_ref().display().to_string();
        let bytes = fs::read(&path).map_err(|source| BofError::Io {
            path: path_string.clone(),
            source,
        })?;
        Ok(Self {
            path: path_string,
            bytes,
            cursor: 0,
        })
    }

    fn take_word(&mut self) -> Result<u32, BofError> {
        let end = self.cursor + 4;
        let slice = self.bytes.get(self.cursor..end).ok_or_else(|| {
            BofError::Truncated(format!("{}: expected another word at byte {}", self.path, self.cursor))
        })?;
        self.cursor = end;
        Ok(u32::from_be_bytes(slice.try_into().unwrap()))
    }

    /// `read_header(handle) -> BofHeader`.
    pub fn read_header(&mut self) -> Result<BofHeader, BofError> {
        if self.bytes.len() < HEADER_BYTES {
            return Err(BofError::Truncated(format!(
                "{}: file is shorter than a BOF header",
                self.path
            )));
        }
        let magic = &self.bytes[0..4];
        if magic != MAGIC {
            return Err(BofError::InconsistentHeader(format!(
                "{}: bad magic number",
                self.path
            )));
        }
        self.cursor = 4;
        let header = BofHeader {
            text_start_address: self.take_word()?,
            text_length: self.take_word()?,
            data_start_address: self.take_word()?,
            data_length: self.take_word()?,
            stack_bottom_addr: self.take_word()?,
        };
        if header.data_start_address < header.text_start_address + header.text_length {
            return Err(BofError::InconsistentHeader(format!(
                "{}: data segment overlaps text segment",
                self.path
            )));
        }
        Ok(header)
    }

    /// `read_instruction(handle) -> raw 32-bit instruction word`.
    /// Splitting into bit-fields is the decoder's job (`decode.rs`),
    /// not the reader's.
    pub fn read_instruction(&mut self) -> Result<u32, BofError> {
        self.take_word()
    }

    /// `read_word(handle) -> raw 32-bit data word`.
    pub fn read_word(&mut self) -> Result<u32, BofError> {
        self.take_word()
    }
}

//! The 32-byte command record stored in shared memory.

use binrw::{binrw, BinReaderExt, BinWriterExt};
use std::io::Cursor;

/// Size of one command record in bytes.
pub const COMMAND_SIZE: usize = 32;

/// `next_offset` value terminating a command list.
pub const END_OF_LIST: u16 = 0xFFFF;

/// Byte offset of the status word inside a record.
pub const STATUS_OFFSET: usize = 4;

/// Status value written back once a command has been processed.
pub const STATUS_ACKNOWLEDGED: u32 = 1;

/// Error decoding or encoding a command record.
pub type CommandCodecError = binrw::Error;

/// One node of a guest command list.
///
/// Layout (little-endian):
/// ```text
/// 0x00 u16 next_offset
/// 0x02 u16 opcode
/// 0x04 u32 status
/// 0x08 u32 params[6]
/// ```
#[binrw]
#[brw(little)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Command {
    pub next_offset: u16,
    pub opcode: u16,
    pub status: u32,
    pub params: [u32; 6],
}

impl Command {
    /// Create an unacknowledged command.
    pub fn new(opcode: u16, params: [u32; 6]) -> Self {
        Self {
            next_offset: END_OF_LIST,
            opcode,
            status: 0,
            params,
        }
    }

    /// Decode a record from exactly [`COMMAND_SIZE`] bytes.
    pub fn decode(bytes: &[u8; COMMAND_SIZE]) -> Result<Self, CommandCodecError> {
        Cursor::new(&bytes[..]).read_le()
    }

    /// Encode this record into [`COMMAND_SIZE`] bytes.
    pub fn encode(&self) -> Result<[u8; COMMAND_SIZE], CommandCodecError> {
        let mut out = [0u8; COMMAND_SIZE];
        Cursor::new(&mut out[..]).write_le(self)?;
        Ok(out)
    }

    /// Is this the last node of its list?
    pub fn is_last(&self) -> bool {
        self.next_offset == END_OF_LIST
    }
}

//! Command protocol types for the csnd sound mixer core.
//!
//! This crate defines the wire vocabulary shared between the guest and the
//! mixer: the 32-byte command record, the opcode table, the packed register
//! words carried in command parameters, and the fixed protocol constants.
//! The engine consumes these types; the guest-side builder produces them.

mod builder;
mod command;
mod opcode;
mod rate;
mod registers;

pub use builder::CommandListBuilder;
pub use command::{Command, CommandCodecError, COMMAND_SIZE, END_OF_LIST, STATUS_ACKNOWLEDGED, STATUS_OFFSET};
pub use opcode::Opcode;
pub use rate::{
    convert_sample_rate, raw_rate_for, small_buffer_size, BLOCK_HEADER_SIZE, CHANNEL_COUNT,
    MAX_SMALL_BUFFER, NOMINAL_SAMPLE_RATE, SAMPLE_RATE_CLOCK,
};
pub use registers::{ChannelFlags, Encoding, Interpolation, RepeatMode, VolumePair};

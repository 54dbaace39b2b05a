//! Mixer engine for the csnd sound core.
//!
//! Walks guest command lists, mutates the 32 channel register sets and runs
//! one double-buffered feed task per playing channel.

mod channel;
mod decoder;
pub mod dispatch;
mod feed;
mod memory;
mod mixer;
mod output;
mod pcm;
mod player;

#[cfg(test)]
mod testing;

pub use channel::{BlockRef, BlockRegister, ChannelRegisters, ChannelSnapshot};
pub use decoder::{execute_commands, DecodeError, ExecutionReport};
pub use dispatch::{lookup, Dispatch, Handler};
pub use feed::{split_block, FeedConfig, SILENT_REFILL_SAMPLES};
pub use memory::{GuestMemory, GuestMemoryError, HeapSharedMemory, SharedMemory, VecGuestMemory};
pub use mixer::Mixer;
pub use output::{AudioError, BufferSlot, OutputDevice, OutputStream, PcmBuffer};
pub use pcm::{decode_pcm, silent_len};
pub use player::ChannelPlayer;

//! Protocol constants and the two numeric rules of the streaming protocol.

/// Number of hardware channels.
pub const CHANNEL_COUNT: usize = 32;

/// Rate at which every channel stream is opened.
pub const NOMINAL_SAMPLE_RATE: u32 = 44100;

/// Clock the raw rate code divides.
pub const SAMPLE_RATE_CLOCK: u32 = 67_027_964;

/// Bytes skipped at the start of every guest block before sample data.
pub const BLOCK_HEADER_SIZE: u32 = 0x2C;

/// Upper bound of the trailing (small) chunk of a block.
pub const MAX_SMALL_BUFFER: u32 = 0x400;

/// A small chunk shorter than this is folded back into the large chunk, so
/// blocks under 8 bytes are never split.
const MIN_SMALL_BUFFER: u32 = 4;

/// Convert a raw rate code into Hz. A zero code has no meaning.
pub fn convert_sample_rate(raw_rate: u32) -> Option<u32> {
    if raw_rate == 0 {
        return None;
    }
    Some(SAMPLE_RATE_CLOCK / raw_rate)
}

/// Raw rate code closest to producing `hz` (guest side).
pub fn raw_rate_for(hz: u32) -> u16 {
    if hz == 0 {
        return u16::MAX;
    }
    (SAMPLE_RATE_CLOCK / hz).clamp(1, u16::MAX as u32) as u16
}

/// Size of the trailing chunk a block of `total_size` bytes is split into.
///
/// Half the block, capped at [`MAX_SMALL_BUFFER`], rounded down to an even
/// byte count so 16-bit frames are never split.
pub fn small_buffer_size(total_size: u32) -> u32 {
    let small = (total_size / 2).min(MAX_SMALL_BUFFER) & !1;
    if small < MIN_SMALL_BUFFER {
        0
    } else {
        small
    }
}

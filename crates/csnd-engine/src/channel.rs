//! Per-channel register state.
//!
//! Registers are written by handlers on the control thread and read live by
//! the channel's feed task, so every field is an atomic. Block pointer and
//! size share one atomic word so a reader never sees a new pointer with a
//! stale size.

use csnd_ir::{Encoding, Interpolation, RepeatMode, VolumePair, NOMINAL_SAMPLE_RATE};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};

/// A translated guest block: address of the first sample byte and its size.
///
/// `addr == 0` means no block has been set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockRef {
    pub addr: u32,
    pub size: u32,
}

impl BlockRef {
    pub const UNSET: BlockRef = BlockRef { addr: 0, size: 0 };

    pub fn is_mapped(&self) -> bool {
        self.addr != 0
    }

    /// Mapped and non-empty.
    pub fn is_playable(&self) -> bool {
        self.is_mapped() && self.size > 0
    }

    fn pack(self) -> u64 {
        (self.addr as u64) << 32 | self.size as u64
    }

    fn unpack(word: u64) -> Self {
        Self {
            addr: (word >> 32) as u32,
            size: word as u32,
        }
    }
}

/// A block register with a generation counter.
///
/// The generation is bumped after every store, letting a reader that copied
/// the block's bytes detect that the guest swapped it mid-copy.
#[derive(Debug, Default)]
pub struct BlockRegister {
    packed: AtomicU64,
    generation: AtomicU64,
}

impl BlockRegister {
    pub fn load(&self) -> BlockRef {
        BlockRef::unpack(self.packed.load(Ordering::Acquire))
    }

    /// Load the block together with the generation it belongs to.
    pub fn load_versioned(&self) -> (BlockRef, u64) {
        let generation = self.generation.load(Ordering::Acquire);
        (self.load(), generation)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn store(&self, block: BlockRef) {
        self.packed.store(block.pack(), Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Change the size, keeping the address.
    pub fn resize(&self, size: u32) {
        let _ = self
            .packed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                let mut block = BlockRef::unpack(word);
                block.size = size;
                Some(block.pack())
            });
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

/// Register file of one channel.
#[derive(Debug)]
pub struct ChannelRegisters {
    index: usize,
    /// Block playback starts from
    pub primary: BlockRegister,
    /// Block every refill reads from
    pub secondary: BlockRegister,
    looping: AtomicBool,
    playing: AtomicBool,
    sample_rate: AtomicU32,
    encoding: AtomicU8,
    interpolation: AtomicU8,
    repeat_mode: AtomicU8,
    volume: AtomicU32,
    capture_volume: AtomicU32,
}

/// Plain copy of a channel's registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelSnapshot {
    pub index: usize,
    pub primary: BlockRef,
    pub secondary: BlockRef,
    pub looping: bool,
    pub playing: bool,
    pub sample_rate: u32,
    pub encoding: Encoding,
    pub interpolation: Interpolation,
    pub repeat_mode: RepeatMode,
    pub volume: VolumePair,
    pub capture_volume: VolumePair,
}

impl ChannelRegisters {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            primary: BlockRegister::default(),
            secondary: BlockRegister::default(),
            looping: AtomicBool::new(false),
            playing: AtomicBool::new(false),
            sample_rate: AtomicU32::new(NOMINAL_SAMPLE_RATE),
            encoding: AtomicU8::new(Encoding::default().bits() as u8),
            interpolation: AtomicU8::new(Interpolation::default().bit() as u8),
            repeat_mode: AtomicU8::new(RepeatMode::default().bits() as u8),
            volume: AtomicU32::new(0),
            capture_volume: AtomicU32::new(0),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    pub fn is_looping(&self) -> bool {
        self.looping.load(Ordering::Relaxed)
    }

    pub fn set_looping(&self, looping: bool) {
        self.looping.store(looping, Ordering::Relaxed);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Acquire)
    }

    pub fn set_sample_rate(&self, hz: u32) {
        self.sample_rate.store(hz, Ordering::Release);
    }

    pub fn encoding(&self) -> Encoding {
        Encoding::from_bits(self.encoding.load(Ordering::Acquire) as u32)
    }

    pub fn set_encoding(&self, encoding: Encoding) {
        self.encoding.store(encoding.bits() as u8, Ordering::Release);
    }

    pub fn interpolation(&self) -> Interpolation {
        Interpolation::from_bit(self.interpolation.load(Ordering::Acquire) as u32)
    }

    pub fn set_interpolation(&self, interpolation: Interpolation) {
        self.interpolation
            .store(interpolation.bit() as u8, Ordering::Release);
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        RepeatMode::from_bits(self.repeat_mode.load(Ordering::Relaxed) as u32)
    }

    pub fn set_repeat_mode(&self, mode: RepeatMode) {
        self.repeat_mode.store(mode.bits() as u8, Ordering::Relaxed);
    }

    pub fn volume(&self) -> VolumePair {
        VolumePair::unpack(self.volume.load(Ordering::Relaxed))
    }

    pub fn set_volume(&self, volume: VolumePair) {
        self.volume.store(volume.pack(), Ordering::Relaxed);
    }

    pub fn capture_volume(&self) -> VolumePair {
        VolumePair::unpack(self.capture_volume.load(Ordering::Relaxed))
    }

    pub fn set_capture_volume(&self, volume: VolumePair) {
        self.capture_volume.store(volume.pack(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            index: self.index,
            primary: self.primary.load(),
            secondary: self.secondary.load(),
            looping: self.is_looping(),
            playing: self.is_playing(),
            sample_rate: self.sample_rate(),
            encoding: self.encoding(),
            interpolation: self.interpolation(),
            repeat_mode: self.repeat_mode(),
            volume: self.volume(),
            capture_volume: self.capture_volume(),
        }
    }
}

//! Packed register words carried in command parameters.
//!
//! Bit layouts are extracted with explicit shifts and masks so the decode is
//! independent of host endianness and struct layout.

/// Sample encoding of a channel's blocks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Encoding {
    #[default]
    Pcm8,
    Pcm16,
    ImaAdpcm,
    Psg,
}

impl Encoding {
    /// Decode a 2-bit field.
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0x3 {
            0 => Encoding::Pcm8,
            1 => Encoding::Pcm16,
            2 => Encoding::ImaAdpcm,
            _ => Encoding::Psg,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            Encoding::Pcm8 => 0,
            Encoding::Pcm16 => 1,
            Encoding::ImaAdpcm => 2,
            Encoding::Psg => 3,
        }
    }

    /// Bytes per sample for the PCM encodings.
    pub fn bytes_per_sample(self) -> Option<usize> {
        match self {
            Encoding::Pcm8 => Some(1),
            Encoding::Pcm16 => Some(2),
            Encoding::ImaAdpcm | Encoding::Psg => None,
        }
    }
}

/// Block repeat behavior requested by the guest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RepeatMode {
    #[default]
    Manual,
    Normal,
    OneShot,
    LoopConstSize,
}

impl RepeatMode {
    /// Decode a 2-bit field.
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0x3 {
            0 => RepeatMode::Manual,
            1 => RepeatMode::Normal,
            2 => RepeatMode::OneShot,
            _ => RepeatMode::LoopConstSize,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            RepeatMode::Manual => 0,
            RepeatMode::Normal => 1,
            RepeatMode::OneShot => 2,
            RepeatMode::LoopConstSize => 3,
        }
    }
}

/// Sample interpolation mode. Bit value 0 means enabled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Interpolation {
    #[default]
    Enabled,
    Disabled,
}

impl Interpolation {
    pub fn from_bit(bit: u32) -> Self {
        if bit & 1 == 0 {
            Interpolation::Enabled
        } else {
            Interpolation::Disabled
        }
    }

    pub fn bit(self) -> u32 {
        match self {
            Interpolation::Enabled => 0,
            Interpolation::Disabled => 1,
        }
    }

    pub fn is_enabled(self) -> bool {
        self == Interpolation::Enabled
    }
}

const CHANNEL_SHIFT: u32 = 0;
const CHANNEL_MASK: u32 = 0x3F;
const INTERP_SHIFT: u32 = 6;
const REPEAT_SHIFT: u32 = 10;
const ENCODING_SHIFT: u32 = 12;
const PLAYBACK_SHIFT: u32 = 14;
const RATE_SHIFT: u32 = 16;

/// The flags word of `SetChannelRegs` (parameter 0).
///
/// ```text
/// bits 0-5   channel index
/// bit  6     interpolation (0 = enabled)
/// bits 7-9   reserved
/// bits 10-11 repeat mode
/// bits 12-13 encoding
/// bit  14    playback
/// bit  15    reserved
/// bits 16-31 raw sample rate code
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelFlags {
    pub channel: u8,
    pub interpolation: Interpolation,
    pub repeat_mode: RepeatMode,
    pub encoding: Encoding,
    pub playback: bool,
    pub raw_rate: u16,
}

impl ChannelFlags {
    pub fn unpack(word: u32) -> Self {
        Self {
            channel: ((word >> CHANNEL_SHIFT) & CHANNEL_MASK) as u8,
            interpolation: Interpolation::from_bit(word >> INTERP_SHIFT),
            repeat_mode: RepeatMode::from_bits(word >> REPEAT_SHIFT),
            encoding: Encoding::from_bits(word >> ENCODING_SHIFT),
            playback: (word >> PLAYBACK_SHIFT) & 1 != 0,
            raw_rate: (word >> RATE_SHIFT) as u16,
        }
    }

    /// Inverse of [`ChannelFlags::unpack`]; reserved bits are zero.
    pub fn pack(&self) -> u32 {
        ((self.channel as u32 & CHANNEL_MASK) << CHANNEL_SHIFT)
            | (self.interpolation.bit() << INTERP_SHIFT)
            | (self.repeat_mode.bits() << REPEAT_SHIFT)
            | (self.encoding.bits() << ENCODING_SHIFT)
            | ((self.playback as u32) << PLAYBACK_SHIFT)
            | ((self.raw_rate as u32) << RATE_SHIFT)
    }
}

/// A left/right pair of 16-bit volumes packed low/high into one word.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VolumePair {
    pub left: u16,
    pub right: u16,
}

impl VolumePair {
    pub fn unpack(word: u32) -> Self {
        Self {
            left: (word & 0xFFFF) as u16,
            right: (word >> 16) as u16,
        }
    }

    pub fn pack(&self) -> u32 {
        self.left as u32 | ((self.right as u32) << 16)
    }
}

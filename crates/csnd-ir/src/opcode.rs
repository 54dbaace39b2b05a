//! Type-0 command opcodes.

/// Every opcode the mixer recognizes.
///
/// Only a handful carry behavior; the rest are part of the protocol surface
/// and are acknowledged without effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    SetPlayStateR,
    SetPlayState,
    SetEncoding,
    SetBlock,
    SetLooping,
    SetBit7,
    SetInterp,
    SetDuty,
    SetTimer,
    SetVol,
    SetBlockZero,
    SetAdpcmStateZero,
    SetAdpcmState,
    SetAdpcmReload,
    SetChannelRegs,
    SetChannelRegsPsg,
    SetChannelRegsNoise,
    CapEnable,
    CapSetRepeat,
    CapSetFormat,
    CapSetBit2,
    CapSetTimer,
    CapSetBuffer,
    SetCapRegs,
    SetDspFlags,
    UpdateInfo,
}

impl Opcode {
    /// All recognized opcodes, in wire order.
    pub const ALL: [Opcode; 26] = [
        Opcode::SetPlayStateR,
        Opcode::SetPlayState,
        Opcode::SetEncoding,
        Opcode::SetBlock,
        Opcode::SetLooping,
        Opcode::SetBit7,
        Opcode::SetInterp,
        Opcode::SetDuty,
        Opcode::SetTimer,
        Opcode::SetVol,
        Opcode::SetBlockZero,
        Opcode::SetAdpcmStateZero,
        Opcode::SetAdpcmState,
        Opcode::SetAdpcmReload,
        Opcode::SetChannelRegs,
        Opcode::SetChannelRegsPsg,
        Opcode::SetChannelRegsNoise,
        Opcode::CapEnable,
        Opcode::CapSetRepeat,
        Opcode::CapSetFormat,
        Opcode::CapSetBit2,
        Opcode::CapSetTimer,
        Opcode::CapSetBuffer,
        Opcode::SetCapRegs,
        Opcode::SetDspFlags,
        Opcode::UpdateInfo,
    ];

    /// Map a raw 16-bit opcode to a recognized one.
    pub fn from_raw(raw: u16) -> Option<Self> {
        let op = match raw {
            0x0 => Opcode::SetPlayStateR,
            0x1 => Opcode::SetPlayState,
            0x2 => Opcode::SetEncoding,
            0x3 => Opcode::SetBlock,
            0x4 => Opcode::SetLooping,
            0x5 => Opcode::SetBit7,
            0x6 => Opcode::SetInterp,
            0x7 => Opcode::SetDuty,
            0x8 => Opcode::SetTimer,
            0x9 => Opcode::SetVol,
            0xA => Opcode::SetBlockZero,
            0xB => Opcode::SetAdpcmStateZero,
            0xC => Opcode::SetAdpcmState,
            0xD => Opcode::SetAdpcmReload,
            0xE => Opcode::SetChannelRegs,
            0xF => Opcode::SetChannelRegsPsg,
            0x10 => Opcode::SetChannelRegsNoise,
            0x100 => Opcode::CapEnable,
            0x101 => Opcode::CapSetRepeat,
            0x102 => Opcode::CapSetFormat,
            0x103 => Opcode::CapSetBit2,
            0x104 => Opcode::CapSetTimer,
            0x105 => Opcode::CapSetBuffer,
            0x106 => Opcode::SetCapRegs,
            0x200 => Opcode::SetDspFlags,
            0x300 => Opcode::UpdateInfo,
            _ => return None,
        };
        Some(op)
    }

    /// The raw wire value.
    pub fn raw(self) -> u16 {
        match self {
            Opcode::SetPlayStateR => 0x0,
            Opcode::SetPlayState => 0x1,
            Opcode::SetEncoding => 0x2,
            Opcode::SetBlock => 0x3,
            Opcode::SetLooping => 0x4,
            Opcode::SetBit7 => 0x5,
            Opcode::SetInterp => 0x6,
            Opcode::SetDuty => 0x7,
            Opcode::SetTimer => 0x8,
            Opcode::SetVol => 0x9,
            Opcode::SetBlockZero => 0xA,
            Opcode::SetAdpcmStateZero => 0xB,
            Opcode::SetAdpcmState => 0xC,
            Opcode::SetAdpcmReload => 0xD,
            Opcode::SetChannelRegs => 0xE,
            Opcode::SetChannelRegsPsg => 0xF,
            Opcode::SetChannelRegsNoise => 0x10,
            Opcode::CapEnable => 0x100,
            Opcode::CapSetRepeat => 0x101,
            Opcode::CapSetFormat => 0x102,
            Opcode::CapSetBit2 => 0x103,
            Opcode::CapSetTimer => 0x104,
            Opcode::CapSetBuffer => 0x105,
            Opcode::SetCapRegs => 0x106,
            Opcode::SetDspFlags => 0x200,
            Opcode::UpdateInfo => 0x300,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::SetPlayStateR => "SetPlayStateR",
            Opcode::SetPlayState => "SetPlayState",
            Opcode::SetEncoding => "SetEncoding",
            Opcode::SetBlock => "SetBlock",
            Opcode::SetLooping => "SetLooping",
            Opcode::SetBit7 => "SetBit7",
            Opcode::SetInterp => "SetInterp",
            Opcode::SetDuty => "SetDuty",
            Opcode::SetTimer => "SetTimer",
            Opcode::SetVol => "SetVol",
            Opcode::SetBlockZero => "SetBlockZero",
            Opcode::SetAdpcmStateZero => "SetAdpcmStateZero",
            Opcode::SetAdpcmState => "SetAdpcmState",
            Opcode::SetAdpcmReload => "SetAdpcmReload",
            Opcode::SetChannelRegs => "SetChnRegs",
            Opcode::SetChannelRegsPsg => "SetChnRegsPSG",
            Opcode::SetChannelRegsNoise => "SetChnRegsNoise",
            Opcode::CapEnable => "CapEnable",
            Opcode::CapSetRepeat => "CapSetRepeat",
            Opcode::CapSetFormat => "CapSetFormat",
            Opcode::CapSetBit2 => "CapSetBit2",
            Opcode::CapSetTimer => "CapSetTimer",
            Opcode::CapSetBuffer => "CapSetBuffer",
            Opcode::SetCapRegs => "SetCapRegs",
            Opcode::SetDspFlags => "SetDspFlags",
            Opcode::UpdateInfo => "UpdateInfo",
        }
    }
}

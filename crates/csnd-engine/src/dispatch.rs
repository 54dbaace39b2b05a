//! Opcode dispatch table.

use csnd_ir::{ChannelFlags, Opcode, VolumePair};

use crate::mixer::Mixer;

/// A command handler. Receives the command's six parameter words.
pub type Handler = fn(&mut Mixer, &[u32; 6]);

/// Result of looking an opcode up.
#[derive(Clone, Copy)]
pub enum Dispatch {
    /// Not part of the protocol
    Unknown(u16),
    /// Part of the protocol, acknowledged without effect
    Unimplemented(Opcode),
    Implemented(Opcode, Handler),
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dispatch::Unknown(raw) => write!(f, "Unknown({raw:#x})"),
            Dispatch::Unimplemented(op) => write!(f, "Unimplemented({})", op.name()),
            Dispatch::Implemented(op, _) => write!(f, "Implemented({})", op.name()),
        }
    }
}

pub fn lookup(raw: u16) -> Dispatch {
    let Some(op) = Opcode::from_raw(raw) else {
        return Dispatch::Unknown(raw);
    };
    match handler_for(op) {
        Some(handler) => Dispatch::Implemented(op, handler),
        None => Dispatch::Unimplemented(op),
    }
}

fn handler_for(op: Opcode) -> Option<Handler> {
    match op {
        // The reset variant has no extra behavior yet.
        Opcode::SetPlayStateR | Opcode::SetPlayState => Some(set_play_state),
        Opcode::SetBlock => Some(set_block),
        Opcode::SetChannelRegs => Some(set_channel_regs),
        _ => None,
    }
}

fn set_play_state(mixer: &mut Mixer, params: &[u32; 6]) {
    mixer.set_play_state(params[0], params[1] == 1);
}

fn set_block(mixer: &mut Mixer, params: &[u32; 6]) {
    mixer.set_block(params[1], params[2]);
}

fn set_channel_regs(mixer: &mut Mixer, params: &[u32; 6]) {
    mixer.set_channel_regs(
        ChannelFlags::unpack(params[0]),
        VolumePair::unpack(params[1]),
        VolumePair::unpack(params[2]),
        params[3],
        params[4],
        params[5],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn implemented_opcodes() {
        for raw in [0x0, 0x1, 0x3, 0xE] {
            assert!(matches!(lookup(raw), Dispatch::Implemented(..)), "{raw:#x}");
        }
    }

    #[test]
    fn every_other_recognized_opcode_is_unimplemented() {
        let implemented = [0x0, 0x1, 0x3, 0xE];
        for op in Opcode::ALL {
            if implemented.contains(&op.raw()) {
                continue;
            }
            assert!(matches!(lookup(op.raw()), Dispatch::Unimplemented(o) if o == op));
        }
    }

    #[test]
    fn unrecognized_opcode_is_unknown() {
        assert!(matches!(lookup(0x50), Dispatch::Unknown(0x50)));
        assert!(matches!(lookup(0x400), Dispatch::Unknown(0x400)));
    }
}

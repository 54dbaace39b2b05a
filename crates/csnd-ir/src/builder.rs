//! Guest-side construction of command lists.

use crate::command::{Command, CommandCodecError, COMMAND_SIZE, END_OF_LIST};
use crate::opcode::Opcode;
use crate::registers::{ChannelFlags, VolumePair};

/// Lays out a command list contiguously, starting at `base` in shared memory.
///
/// Each node's `next_offset` points at the following node and the last one
/// carries [`END_OF_LIST`].
#[derive(Clone, Debug, Default)]
pub struct CommandListBuilder {
    base: u16,
    commands: Vec<Command>,
}

impl CommandListBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder whose first node lives at `base`.
    pub fn at(base: u16) -> Self {
        Self {
            base,
            commands: Vec::new(),
        }
    }

    /// Append a raw command.
    pub fn push(&mut self, opcode: u16, params: [u32; 6]) -> &mut Self {
        self.commands.push(Command::new(opcode, params));
        self
    }

    pub fn set_play_state(&mut self, channel: u8, play: bool) -> &mut Self {
        self.push(
            Opcode::SetPlayState.raw(),
            [channel as u32, play as u32, 0, 0, 0, 0],
        )
    }

    /// `phys_addr == 0` keeps the block pointer and only resizes.
    pub fn set_block(&mut self, phys_addr: u32, size: u32) -> &mut Self {
        self.push(Opcode::SetBlock.raw(), [0, phys_addr, size, 0, 0, 0])
    }

    pub fn set_channel_regs(
        &mut self,
        flags: ChannelFlags,
        volume: VolumePair,
        capture_volume: VolumePair,
        block1: u32,
        block2: u32,
        block_size: u32,
    ) -> &mut Self {
        self.push(
            Opcode::SetChannelRegs.raw(),
            [
                flags.pack(),
                volume.pack(),
                capture_volume.pack(),
                block1,
                block2,
                block_size,
            ],
        )
    }

    /// Offset to pass to `ExecuteCommands`.
    pub fn start_offset(&self) -> u16 {
        if self.commands.is_empty() {
            END_OF_LIST
        } else {
            self.base
        }
    }

    /// Shared-memory offset of the `index`th node.
    pub fn offset_of(&self, index: usize) -> usize {
        self.base as usize + index * COMMAND_SIZE
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Encode the list. The returned bytes belong at offset `base`.
    pub fn encode(&self) -> Result<Vec<u8>, CommandCodecError> {
        let mut out = Vec::with_capacity(self.commands.len() * COMMAND_SIZE);
        let last = self.commands.len().saturating_sub(1);
        for (i, cmd) in self.commands.iter().enumerate() {
            let mut cmd = *cmd;
            cmd.next_offset = if i == last {
                END_OF_LIST
            } else {
                self.offset_of(i + 1) as u16
            };
            out.extend_from_slice(&cmd.encode()?);
        }
        Ok(out)
    }
}

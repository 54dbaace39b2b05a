//! Walks a command list in shared memory and dispatches each node.

use csnd_ir::{Command, CommandCodecError, COMMAND_SIZE, END_OF_LIST, STATUS_ACKNOWLEDGED, STATUS_OFFSET};
use tracing::{debug, trace, warn};

use crate::dispatch::{lookup, Dispatch};
use crate::memory::{GuestMemoryError, SharedMemory};
use crate::mixer::Mixer;

/// A command list that cannot be walked.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("command at offset 0x{offset:x} lies outside shared memory of 0x{size:x} bytes")]
    OffsetOutOfRange { offset: usize, size: usize },
    #[error("command list exceeds {limit} nodes, chain is cyclic")]
    ListTooLong { limit: usize },
    /// The record codec rejected the bytes. A full 32-byte record always
    /// decodes with the current layout.
    #[error("malformed command at offset 0x{offset:x}: {source}")]
    Malformed {
        offset: usize,
        #[source]
        source: CommandCodecError,
    },
    #[error(transparent)]
    Memory(#[from] GuestMemoryError),
}

/// What happened while walking one list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Nodes visited and acknowledged
    pub commands: usize,
    pub executed: usize,
    pub unimplemented: usize,
    pub unknown: usize,
}

/// Execute the list rooted at `start`.
///
/// Every visited node gets its status word set to 1. Commands before a
/// corrupt node stay applied when an error is returned.
pub fn execute_commands(
    shared: &dyn SharedMemory,
    start: u16,
    mixer: &mut Mixer,
) -> Result<ExecutionReport, DecodeError> {
    let size = shared.size();
    let limit = size / COMMAND_SIZE + 1;
    let mut report = ExecutionReport::default();
    let mut offset = start;

    while offset != END_OF_LIST {
        if report.commands >= limit {
            return Err(DecodeError::ListTooLong { limit });
        }

        let at = offset as usize;
        if at + COMMAND_SIZE > size {
            return Err(DecodeError::OffsetOutOfRange { offset: at, size });
        }

        let mut raw = [0u8; COMMAND_SIZE];
        shared.read(at, &mut raw)?;
        let command = Command::decode(&raw).map_err(|source| DecodeError::Malformed { offset: at, source })?;
        trace!(offset = at, opcode = command.opcode, next = command.next_offset, "command");

        match lookup(command.opcode) {
            Dispatch::Implemented(_, handler) => {
                handler(mixer, &command.params);
                report.executed += 1;
            }
            Dispatch::Unimplemented(op) => {
                debug!(opcode = op.name(), "unimplemented command skipped");
                report.unimplemented += 1;
            }
            Dispatch::Unknown(raw) => {
                warn!(opcode = format_args!("{raw:#x}"), offset = at, "unknown command skipped");
                report.unknown += 1;
            }
        }

        shared.write(at + STATUS_OFFSET, &STATUS_ACKNOWLEDGED.to_le_bytes())?;
        report.commands += 1;
        offset = command.next_offset;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedConfig;
    use crate::memory::{HeapSharedMemory, VecGuestMemory};
    use crate::testing::InstantDevice;
    use csnd_ir::{
        ChannelFlags, CommandListBuilder, Encoding, Interpolation, RepeatMode, VolumePair,
    };
    use std::sync::Arc;

    const PHYS: u32 = 0x2000_0000;
    const VIRT: u32 = 0x1400_0000;

    fn setup() -> (HeapSharedMemory, Mixer, InstantDevice) {
        let memory = Arc::new(VecGuestMemory::new(PHYS, VIRT, 0x4000));
        let mut mixer = Mixer::new(memory, FeedConfig::default());
        let mut device = InstantDevice::new(8);
        mixer.open_streams(&mut device, 44100);
        (HeapSharedMemory::new(0x1000), mixer, device)
    }

    fn write_list(shared: &HeapSharedMemory, list: &CommandListBuilder) {
        let base = list.start_offset() as usize;
        shared.write(base, &list.encode().unwrap()).unwrap();
    }

    fn status_at(shared: &HeapSharedMemory, offset: usize) -> u32 {
        let mut word = [0u8; 4];
        shared.read(offset + STATUS_OFFSET, &mut word).unwrap();
        u32::from_le_bytes(word)
    }

    fn flags(channel: u8) -> ChannelFlags {
        ChannelFlags {
            channel,
            interpolation: Interpolation::Enabled,
            repeat_mode: RepeatMode::Normal,
            encoding: Encoding::Pcm16,
            playback: true,
            raw_rate: 32728,
        }
    }

    #[test]
    fn set_channel_regs_list_round_trip() {
        let (shared, mut mixer, _device) = setup();
        let mut list = CommandListBuilder::at(0x40);
        list.set_channel_regs(
            flags(5),
            VolumePair { left: 100, right: 200 },
            VolumePair::default(),
            PHYS + 0x100,
            0,
            0x200,
        );
        write_list(&shared, &list);

        let report = execute_commands(&shared, list.start_offset(), &mut mixer).unwrap();
        assert_eq!(report, ExecutionReport { commands: 1, executed: 1, unimplemented: 0, unknown: 0 });
        assert_eq!(status_at(&shared, 0x40), 1);

        let snap = mixer.snapshot(5).unwrap();
        assert!(snap.playing);
        assert_eq!(snap.volume, VolumePair { left: 100, right: 200 });
        assert_eq!(snap.encoding, Encoding::Pcm16);
        assert!(mixer.is_playing(5));
        mixer.stop_all();
    }

    #[test]
    fn unknown_and_unimplemented_opcodes_are_acknowledged() {
        let (shared, mut mixer, _device) = setup();
        let before = mixer.snapshot(0).unwrap();
        let mut list = CommandListBuilder::new();
        list.push(0x50, [1, 2, 3, 4, 5, 6])
            .push(0x100, [0; 6])
            .set_play_state(7, false);
        write_list(&shared, &list);

        let report = execute_commands(&shared, list.start_offset(), &mut mixer).unwrap();
        assert_eq!(report, ExecutionReport { commands: 3, executed: 1, unimplemented: 1, unknown: 1 });
        for i in 0..3 {
            assert_eq!(status_at(&shared, list.offset_of(i)), 1);
        }
        assert_eq!(mixer.snapshot(0).unwrap(), before);
        assert_eq!(mixer.current_channel(), 7);
    }

    #[test]
    fn end_of_list_start_executes_nothing() {
        let (shared, mut mixer, _device) = setup();
        let report = execute_commands(&shared, END_OF_LIST, &mut mixer).unwrap();
        assert_eq!(report, ExecutionReport::default());
    }

    #[test]
    fn out_of_range_offset_is_an_error() {
        let (shared, mut mixer, _device) = setup();
        let err = execute_commands(&shared, 0x0FF0, &mut mixer).unwrap_err();
        assert!(matches!(err, DecodeError::OffsetOutOfRange { offset: 0x0FF0, size: 0x1000 }));
    }

    #[test]
    fn commands_before_corrupt_link_stay_applied() {
        let (shared, mut mixer, _device) = setup();
        let mut first = Command::new(0x1, [3, 0, 0, 0, 0, 0]);
        first.next_offset = 0x2000;
        shared.write(0, &first.encode().unwrap()).unwrap();

        let err = execute_commands(&shared, 0, &mut mixer).unwrap_err();
        assert!(matches!(err, DecodeError::OffsetOutOfRange { offset: 0x2000, .. }));
        assert_eq!(status_at(&shared, 0), 1);
        assert_eq!(mixer.current_channel(), 3);
    }

    #[test]
    fn arbitrary_record_bytes_still_decode() {
        let (shared, mut mixer, _device) = setup();
        shared.write(0x80, &[0xFF; COMMAND_SIZE]).unwrap();

        let report = execute_commands(&shared, 0x80, &mut mixer).unwrap();
        assert_eq!(report, ExecutionReport { commands: 1, executed: 0, unimplemented: 0, unknown: 1 });
        assert_eq!(status_at(&shared, 0x80), 1);
    }

    #[test]
    fn cyclic_list_is_rejected() {
        let (shared, mut mixer, _device) = setup();
        let mut node = Command::new(0x50, [0; 6]);
        node.next_offset = 0x20;
        shared.write(0x20, &node.encode().unwrap()).unwrap();

        let err = execute_commands(&shared, 0x20, &mut mixer).unwrap_err();
        assert!(matches!(err, DecodeError::ListTooLong { limit: 129 }));
    }
}

//! The 32-channel mixer: register mutation and playback control.

use std::sync::Arc;

use csnd_ir::{
    convert_sample_rate, ChannelFlags, VolumePair, BLOCK_HEADER_SIZE, CHANNEL_COUNT,
};
use tracing::{debug, warn};

use crate::channel::{BlockRef, ChannelRegisters, ChannelSnapshot};
use crate::feed::FeedConfig;
use crate::memory::GuestMemory;
use crate::output::OutputDevice;
use crate::player::ChannelPlayer;

/// All channel state plus the current-channel cursor used by commands that
/// do not name a channel.
pub struct Mixer {
    channels: Vec<ChannelPlayer>,
    current: usize,
    memory: Arc<dyn GuestMemory>,
    config: FeedConfig,
}

impl Mixer {
    pub fn new(memory: Arc<dyn GuestMemory>, config: FeedConfig) -> Self {
        Self {
            channels: (0..CHANNEL_COUNT).map(ChannelPlayer::new).collect(),
            current: 0,
            memory,
            config,
        }
    }

    /// Open one stream per channel. Returns how many opened.
    ///
    /// A channel whose stream fails to open stays silent for the session.
    pub fn open_streams(&mut self, device: &mut dyn OutputDevice, sample_rate: u32) -> usize {
        let mut opened = 0;
        for (index, player) in self.channels.iter_mut().enumerate() {
            match device.open_stream(index, sample_rate) {
                Ok(stream) => {
                    player.attach_stream(stream);
                    opened += 1;
                }
                Err(e) => warn!(channel = index, error = %e, "failed to open channel stream"),
            }
        }
        opened
    }

    pub fn current_channel(&self) -> usize {
        self.current
    }

    pub fn set_current_channel(&mut self, channel: usize) {
        if channel < CHANNEL_COUNT {
            self.current = channel;
        }
    }

    pub fn registers(&self, channel: usize) -> Option<&Arc<ChannelRegisters>> {
        self.channels.get(channel).map(ChannelPlayer::registers)
    }

    pub fn snapshot(&self, channel: usize) -> Option<ChannelSnapshot> {
        self.registers(channel).map(|r| r.snapshot())
    }

    pub fn is_playing(&self, channel: usize) -> bool {
        self.channels.get(channel).is_some_and(ChannelPlayer::is_playing)
    }

    pub fn has_stream(&self, channel: usize) -> bool {
        self.channels.get(channel).is_some_and(ChannelPlayer::has_stream)
    }

    /// Start a channel. No-op if it already plays.
    pub fn play_channel(&mut self, channel: usize) -> bool {
        let memory = self.memory.clone();
        let config = self.config;
        match self.channels.get_mut(channel) {
            Some(player) => player.play(&memory, config),
            None => false,
        }
    }

    /// Stop a channel and wait for its feed task to exit.
    pub fn stop_channel(&mut self, channel: usize) {
        if let Some(player) = self.channels.get_mut(channel) {
            player.stop();
        }
    }

    pub fn stop_all(&mut self) {
        for player in &mut self.channels {
            player.stop();
        }
    }

    /// Stop every channel and release its stream.
    pub fn close_streams(&mut self) {
        for player in &mut self.channels {
            player.close();
        }
    }

    // --- Command handlers ---

    /// Select `channel` and start or stop it.
    pub fn set_play_state(&mut self, channel: u32, play: bool) {
        let Some(channel) = self.select(channel) else {
            return;
        };
        if play {
            self.play_channel(channel);
        } else {
            self.stop_channel(channel);
        }
    }

    /// Point the current channel's secondary block at `phys_addr`, or only
    /// resize it when `phys_addr` is zero.
    pub fn set_block(&mut self, phys_addr: u32, size: u32) {
        let regs = self.channels[self.current].registers().clone();
        if phys_addr == 0 {
            regs.secondary.resize(size);
            return;
        }
        if let Some(block) = self.translate_block(phys_addr, size) {
            regs.secondary.store(block);
        }
    }

    /// Apply a full register write to the channel named in `flags`.
    pub fn set_channel_regs(
        &mut self,
        flags: ChannelFlags,
        volume: VolumePair,
        capture_volume: VolumePair,
        block1: u32,
        block2: u32,
        block_size: u32,
    ) {
        let Some(channel) = self.select(flags.channel as u32) else {
            return;
        };
        let regs = self.channels[channel].registers().clone();

        regs.set_interpolation(flags.interpolation);
        regs.set_repeat_mode(flags.repeat_mode);
        regs.set_encoding(flags.encoding);
        match convert_sample_rate(flags.raw_rate as u32) {
            Some(hz) => regs.set_sample_rate(hz),
            None => warn!(channel, "zero sample rate code, keeping previous rate"),
        }
        regs.set_volume(volume);
        regs.set_capture_volume(capture_volume);

        let mut primary_failed = false;
        if block1 != 0 {
            match self.translate_block(block1, block_size) {
                Some(block) => regs.primary.store(block),
                None => primary_failed = true,
            }
        }
        if block2 != 0 {
            if let Some(block) = self.translate_block(block2, block_size) {
                regs.secondary.store(block);
            }
        }

        if flags.playback {
            // Never start from a stale primary block.
            if primary_failed {
                warn!(channel, "primary block unmapped, playback not started");
            } else {
                self.play_channel(channel);
            }
        } else {
            self.stop_channel(channel);
        }
    }

    /// Make `channel` current if it exists.
    fn select(&mut self, channel: u32) -> Option<usize> {
        let index = channel as usize;
        if index >= CHANNEL_COUNT {
            warn!(channel, "channel index out of range, command ignored");
            return None;
        }
        self.current = index;
        Some(index)
    }

    /// Translate a block's physical address and skip its header.
    fn translate_block(&self, phys_addr: u32, size: u32) -> Option<BlockRef> {
        let Some(addr) = self.memory.translate(phys_addr) else {
            warn!(phys_addr = format_args!("{phys_addr:#010x}"), "block address does not translate");
            return None;
        };
        let Some(data) = addr.checked_add(BLOCK_HEADER_SIZE) else {
            warn!(phys_addr = format_args!("{phys_addr:#010x}"), "block header runs past the address space");
            return None;
        };
        debug!(phys_addr = format_args!("{phys_addr:#010x}"), addr = format_args!("{data:#010x}"), size, "block mapped");
        Some(BlockRef { addr: data, size })
    }
}

impl Drop for Mixer {
    fn drop(&mut self) {
        self.stop_all();
    }
}

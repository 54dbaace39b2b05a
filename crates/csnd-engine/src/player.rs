//! Idle/Playing state machine of one channel.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, warn};

use crate::channel::ChannelRegisters;
use crate::feed::{FeedConfig, FeedTask};
use crate::memory::GuestMemory;
use crate::output::OutputStream;

/// Owns a channel's stream and, while playing, the feed task holding it.
///
/// The stream moves into the feed task on start and comes back when the
/// task is joined on stop.
pub struct ChannelPlayer {
    regs: Arc<ChannelRegisters>,
    stream: Option<Box<dyn OutputStream>>,
    feed: Option<JoinHandle<Box<dyn OutputStream>>>,
}

impl ChannelPlayer {
    pub fn new(index: usize) -> Self {
        Self {
            regs: Arc::new(ChannelRegisters::new(index)),
            stream: None,
            feed: None,
        }
    }

    pub fn registers(&self) -> &Arc<ChannelRegisters> {
        &self.regs
    }

    pub fn attach_stream(&mut self, stream: Box<dyn OutputStream>) {
        self.stream = Some(stream);
    }

    /// Does the channel own a stream (idle or playing)?
    pub fn has_stream(&self) -> bool {
        self.stream.is_some() || self.feed.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.feed.is_some()
    }

    /// Transition Idle -> Playing. Returns false if nothing was started.
    pub fn play(&mut self, memory: &Arc<dyn GuestMemory>, config: FeedConfig) -> bool {
        let channel = self.regs.index();
        if self.feed.is_some() {
            return false;
        }

        let block = self.regs.primary.load();
        if !block.is_playable() {
            warn!(channel, "play requested without a primary block");
            return false;
        }

        let primary = match memory.read_vec(block.addr, block.size as usize) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(channel, error = %e, "primary block unreadable");
                return false;
            }
        };

        let Some(stream) = self.stream.take() else {
            debug!(channel, "no output stream, channel stays silent");
            return false;
        };

        self.regs.set_playing(true);
        let task = FeedTask::new(self.regs.clone(), memory.clone(), stream, primary, config);
        let spawned = thread::Builder::new()
            .name(format!("csnd-ch{channel}"))
            .spawn(move || task.run());

        match spawned {
            Ok(handle) => {
                self.feed = Some(handle);
                true
            }
            Err(e) => {
                error!(channel, error = %e, "failed to spawn feed task, channel output lost");
                self.regs.set_playing(false);
                false
            }
        }
    }

    /// Transition Playing -> Idle.
    ///
    /// Returns only after the feed task has exited, so the guest's blocks
    /// are no longer read once this returns.
    pub fn stop(&mut self) {
        let channel = self.regs.index();
        self.regs.set_playing(false);

        if let Some(handle) = self.feed.take() {
            match handle.join() {
                Ok(stream) => self.stream = Some(stream),
                Err(_) => error!(channel, "feed task panicked, channel output lost"),
            }
        }

        if let Some(stream) = self.stream.as_mut() {
            if let Err(e) = stream.stop() {
                warn!(channel, error = %e, "failed to stop stream");
            }
        }
    }

    /// Stop and release the stream.
    pub fn close(&mut self) {
        self.stop();
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close() {
                warn!(channel = self.regs.index(), error = %e, "failed to close stream");
            }
        }
    }
}

impl Drop for ChannelPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

//! Output device seam.
//!
//! A channel owns one [`OutputStream`] for the whole session. The stream
//! exposes two physical buffers ([`BufferSlot`]) that are queued, played in
//! order, and handed back once consumed.

use csnd_ir::Interpolation;
use std::time::Duration;

/// Error type for output device operations.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("no audio device available")]
    NoDevice,
    #[error("device init error: {0}")]
    DeviceInit(String),
    #[error("stream create error: {0}")]
    StreamCreate(String),
    #[error("playback error: {0}")]
    Playback(String),
    #[error("stream closed")]
    Closed,
}

/// One of the two physical buffers of a channel stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferSlot {
    /// Carries the leading, larger part of a block.
    Large,
    /// Carries the trailing part of a block.
    Small,
}

impl BufferSlot {
    /// Queue order of a freshly started stream.
    pub const BOTH: [BufferSlot; 2] = [BufferSlot::Large, BufferSlot::Small];

    pub fn index(self) -> usize {
        match self {
            BufferSlot::Large => 0,
            BufferSlot::Small => 1,
        }
    }
}

/// Mono 16-bit PCM handed to a stream.
#[derive(Clone, Copy, Debug)]
pub struct PcmBuffer<'a> {
    pub samples: &'a [i16],
    pub sample_rate: u32,
    pub interpolation: Interpolation,
}

/// A mono output stream belonging to one channel.
pub trait OutputStream: Send {
    /// Append a buffer to the play queue under `slot`.
    fn queue(&mut self, slot: BufferSlot, buffer: PcmBuffer<'_>) -> Result<(), AudioError>;

    /// Block until a queued buffer has been consumed, or `timeout` elapses.
    ///
    /// Buffers are handed back in queue order. Empty buffers count as
    /// consumed as soon as they reach the head of the queue.
    fn wait_processed(&mut self, timeout: Duration) -> Result<Option<BufferSlot>, AudioError>;

    /// False once `stop` was called or the queue ran dry.
    fn is_playing(&self) -> bool;

    fn play(&mut self) -> Result<(), AudioError>;

    /// Stop playback and drop everything still queued.
    fn stop(&mut self) -> Result<(), AudioError>;

    /// Release the stream. It must not be used afterwards.
    fn close(&mut self) -> Result<(), AudioError> {
        self.stop()
    }
}

/// An output device able to open one stream per channel.
pub trait OutputDevice {
    fn open_stream(
        &mut self,
        channel: usize,
        sample_rate: u32,
    ) -> Result<Box<dyn OutputStream>, AudioError>;

    /// Close the device. Streams must already be closed.
    fn close(&mut self) -> Result<(), AudioError>;
}

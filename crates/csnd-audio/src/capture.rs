//! Offline output device that records what each channel plays.
//!
//! Buffers are consumed as soon as they are waited on, so a channel runs as
//! fast as its feed task can refill. Used for rendering to WAV and in tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use csnd_engine::{AudioError, BufferSlot, OutputDevice, OutputStream, PcmBuffer};
use csnd_ir::Interpolation;
use tracing::debug;

/// Everything a captured channel produced.
#[derive(Clone, Debug, Default)]
pub struct Recording {
    pub samples: Vec<i16>,
    /// Rate of the most recently consumed buffer
    pub sample_rate: u32,
    pub interpolation: Option<Interpolation>,
    /// Buffers consumed, empty ones included
    pub buffers: usize,
    pub plays: usize,
    pub stops: usize,
    pub closed: bool,
}

#[derive(Default)]
struct Shared {
    channels: Vec<Option<Arc<Mutex<Recording>>>>,
    device_closed: bool,
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Inspection handle, valid after the device moved into a session.
#[derive(Clone)]
pub struct CaptureHandle {
    shared: Arc<Mutex<Shared>>,
}

impl CaptureHandle {
    /// Copy of a channel's recording, `None` if no stream was opened for it.
    pub fn recording(&self, channel: usize) -> Option<Recording> {
        let shared = lock(&self.shared);
        let rec = shared.channels.get(channel)?.as_ref()?;
        let copy = lock(rec).clone();
        Some(copy)
    }

    pub fn samples(&self, channel: usize) -> Vec<i16> {
        self.recording(channel).map(|r| r.samples).unwrap_or_default()
    }

    /// Number of channels with an open stream.
    pub fn open_streams(&self) -> usize {
        let shared = lock(&self.shared);
        shared
            .channels
            .iter()
            .flatten()
            .filter(|rec| !lock(rec).closed)
            .count()
    }

    pub fn device_closed(&self) -> bool {
        lock(&self.shared).device_closed
    }
}

/// Records every channel to memory.
pub struct CaptureDevice {
    shared: Arc<Mutex<Shared>>,
    limit: Option<usize>,
    fail_channels: Vec<usize>,
}

impl CaptureDevice {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
            limit: None,
            fail_channels: Vec::new(),
        }
    }

    /// Stop consuming once a channel recorded `samples` samples.
    pub fn with_limit(mut self, samples: usize) -> Self {
        self.limit = Some(samples);
        self
    }

    /// Refuse to open streams for these channels.
    pub fn failing(mut self, channels: &[usize]) -> Self {
        self.fail_channels = channels.to_vec();
        self
    }

    pub fn handle(&self) -> CaptureHandle {
        CaptureHandle {
            shared: self.shared.clone(),
        }
    }
}

impl Default for CaptureDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputDevice for CaptureDevice {
    fn open_stream(
        &mut self,
        channel: usize,
        _sample_rate: u32,
    ) -> Result<Box<dyn OutputStream>, AudioError> {
        let mut shared = lock(&self.shared);
        if shared.device_closed {
            return Err(AudioError::Closed);
        }
        if self.fail_channels.contains(&channel) {
            return Err(AudioError::StreamCreate(format!("channel {channel} unavailable")));
        }

        let recording = Arc::new(Mutex::new(Recording::default()));
        if shared.channels.len() <= channel {
            shared.channels.resize_with(channel + 1, || None);
        }
        shared.channels[channel] = Some(recording.clone());

        Ok(Box::new(CaptureStream {
            recording,
            queue: VecDeque::new(),
            limit: self.limit,
            playing: false,
        }))
    }

    fn close(&mut self) -> Result<(), AudioError> {
        lock(&self.shared).device_closed = true;
        debug!("capture device closed");
        Ok(())
    }
}

struct Pending {
    slot: BufferSlot,
    samples: Vec<i16>,
    sample_rate: u32,
    interpolation: Interpolation,
}

struct CaptureStream {
    recording: Arc<Mutex<Recording>>,
    queue: VecDeque<Pending>,
    limit: Option<usize>,
    playing: bool,
}

impl CaptureStream {
    fn check_open(&self) -> Result<(), AudioError> {
        if lock(&self.recording).closed {
            Err(AudioError::Closed)
        } else {
            Ok(())
        }
    }
}

impl OutputStream for CaptureStream {
    fn queue(&mut self, slot: BufferSlot, buffer: PcmBuffer<'_>) -> Result<(), AudioError> {
        self.check_open()?;
        self.queue.push_back(Pending {
            slot,
            samples: buffer.samples.to_vec(),
            sample_rate: buffer.sample_rate,
            interpolation: buffer.interpolation,
        });
        Ok(())
    }

    fn wait_processed(&mut self, timeout: Duration) -> Result<Option<BufferSlot>, AudioError> {
        self.check_open()?;
        let full = match self.limit {
            Some(limit) => lock(&self.recording).samples.len() >= limit,
            None => false,
        };
        if !self.playing || full || self.queue.is_empty() {
            std::thread::sleep(timeout);
            return Ok(None);
        }

        let Some(buffer) = self.queue.pop_front() else {
            return Ok(None);
        };
        {
            let mut rec = lock(&self.recording);
            let room = self
                .limit
                .map_or(buffer.samples.len(), |l| l.saturating_sub(rec.samples.len()));
            let take = buffer.samples.len().min(room);
            rec.samples.extend_from_slice(&buffer.samples[..take]);
            rec.sample_rate = buffer.sample_rate;
            rec.interpolation = Some(buffer.interpolation);
            rec.buffers += 1;
        }
        if self.queue.is_empty() {
            self.playing = false;
        }
        Ok(Some(buffer.slot))
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn play(&mut self) -> Result<(), AudioError> {
        self.check_open()?;
        self.playing = true;
        lock(&self.recording).plays += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.playing = false;
        self.queue.clear();
        lock(&self.recording).stops += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), AudioError> {
        self.stop()?;
        lock(&self.recording).closed = true;
        Ok(())
    }
}

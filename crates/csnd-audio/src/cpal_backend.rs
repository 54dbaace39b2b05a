//! CPAL-based output device.
//!
//! One cpal output stream mixes every channel. Each channel stream feeds its
//! own ring buffer; the callback pops from all of them and reports how many
//! samples each voice consumed so queued buffers can be handed back.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use csnd_engine::{AudioError, BufferSlot, OutputDevice, OutputStream, PcmBuffer};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{debug, error, info};

use crate::resample::Resampler;

/// State shared between a channel stream and the audio callback.
#[derive(Default)]
struct VoiceState {
    /// Samples popped (or flushed) by the callback so far
    consumed: AtomicU64,
    running: AtomicBool,
    /// Ask the callback to discard everything buffered
    flush: AtomicBool,
    wake: Mutex<()>,
    woken: Condvar,
}

impl VoiceState {
    fn notify(&self) {
        let _guard = self.wake.lock().unwrap_or_else(PoisonError::into_inner);
        self.woken.notify_all();
    }

    fn wait(&self, timeout: Duration) {
        let guard = self.wake.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = self
            .woken
            .wait_timeout(guard, timeout)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

/// Callback-side half of a channel stream.
struct Voice {
    consumer: HeapCons<f32>,
    state: Arc<VoiceState>,
}

type VoiceTable = Arc<Mutex<Vec<Option<Voice>>>>;

/// Default cpal device mixing up to 32 mono channel streams.
pub struct CpalDevice {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    voices: VoiceTable,
}

impl CpalDevice {
    /// Open the default output device and start the mixing stream.
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioError::NoDevice)?;

        let config = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?;
        let config: StreamConfig = config.into();

        if let Ok(name) = device.name() {
            info!(device = %name, rate = config.sample_rate.0, channels = config.channels, "audio device opened");
        }

        let mut output = Self {
            device,
            config,
            stream: None,
            voices: Arc::new(Mutex::new(Vec::new())),
        };
        output.build_stream()?;
        Ok(output)
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn build_stream(&mut self) -> Result<(), AudioError> {
        let voices = self.voices.clone();
        let channels = self.config.channels as usize;

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    data.fill(0.0);
                    // Never block the audio thread; skip a period instead.
                    let Ok(mut voices) = voices.try_lock() else {
                        return;
                    };
                    for voice in voices.iter_mut().flatten() {
                        mix_voice(voice, data, channels);
                    }
                    for sample in data.iter_mut() {
                        *sample = sample.clamp(-1.0, 1.0);
                    }
                },
                |err| error!(error = %err, "audio stream error"),
                None,
            )
            .map_err(|e| AudioError::StreamCreate(e.to_string()))?;

        stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }
}

fn mix_voice(voice: &mut Voice, data: &mut [f32], channels: usize) {
    let state = &voice.state;
    if state.flush.swap(false, Ordering::AcqRel) {
        let mut dropped = 0u64;
        while voice.consumer.try_pop().is_some() {
            dropped += 1;
        }
        state.consumed.fetch_add(dropped, Ordering::AcqRel);
        state.notify();
        return;
    }
    if !state.running.load(Ordering::Acquire) {
        return;
    }

    let mut popped = 0u64;
    for frame in data.chunks_mut(channels) {
        let Some(sample) = voice.consumer.try_pop() else {
            break;
        };
        for out in frame.iter_mut().take(2) {
            *out += sample;
        }
        popped += 1;
    }
    if popped > 0 {
        state.consumed.fetch_add(popped, Ordering::AcqRel);
        state.notify();
    }
}

impl OutputDevice for CpalDevice {
    fn open_stream(
        &mut self,
        channel: usize,
        _sample_rate: u32,
    ) -> Result<Box<dyn OutputStream>, AudioError> {
        if self.stream.is_none() {
            return Err(AudioError::Closed);
        }

        // About 100ms of device-rate audio per channel
        let capacity = (self.sample_rate() as usize / 10).max(1);
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
        let state = Arc::new(VoiceState::default());

        let mut voices = self.voices.lock().unwrap_or_else(PoisonError::into_inner);
        if voices.len() <= channel {
            voices.resize_with(channel + 1, || None);
        }
        voices[channel] = Some(Voice {
            consumer,
            state: state.clone(),
        });
        debug!(channel, capacity, "channel stream opened");

        Ok(Box::new(CpalStream {
            channel,
            producer,
            state,
            voices: self.voices.clone(),
            out_rate: self.sample_rate(),
            resampler: Resampler::new(),
            scratch: Vec::new(),
            pending: VecDeque::new(),
            pushed: 0,
            queued: VecDeque::new(),
            playing: false,
            closed: false,
        }))
    }

    fn close(&mut self) -> Result<(), AudioError> {
        if let Some(stream) = self.stream.take() {
            stream.pause().map_err(|e| AudioError::Playback(e.to_string()))?;
            self.voices.lock().unwrap_or_else(PoisonError::into_inner).clear();
            info!("audio device closed");
        }
        Ok(())
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Producer half of one channel's voice.
pub struct CpalStream {
    channel: usize,
    producer: HeapProd<f32>,
    state: Arc<VoiceState>,
    voices: VoiceTable,
    out_rate: u32,
    resampler: Resampler,
    scratch: Vec<f32>,
    /// Resampled audio waiting for ring-buffer space
    pending: VecDeque<f32>,
    /// Samples moved into the ring buffer so far
    pushed: u64,
    /// Slots in queue order with the sample position at which each ends
    queued: VecDeque<(BufferSlot, u64)>,
    playing: bool,
    closed: bool,
}

impl CpalStream {
    fn pump(&mut self) {
        if self.state.flush.load(Ordering::Acquire) {
            return;
        }
        while let Some(&sample) = self.pending.front() {
            if self.producer.try_push(sample).is_err() {
                break;
            }
            self.pending.pop_front();
            self.pushed += 1;
        }
    }

    fn end_position(&self) -> u64 {
        self.pushed + self.pending.len() as u64
    }

    fn check_open(&self) -> Result<(), AudioError> {
        if self.closed {
            Err(AudioError::Closed)
        } else {
            Ok(())
        }
    }
}

impl OutputStream for CpalStream {
    fn queue(&mut self, slot: BufferSlot, buffer: PcmBuffer<'_>) -> Result<(), AudioError> {
        self.check_open()?;
        self.scratch.clear();
        self.resampler.process(
            buffer.samples,
            buffer.sample_rate,
            self.out_rate,
            buffer.interpolation,
            &mut self.scratch,
        );
        self.pending.extend(self.scratch.iter().copied());
        let end = self.end_position();
        self.queued.push_back((slot, end));
        self.pump();
        Ok(())
    }

    fn wait_processed(&mut self, timeout: Duration) -> Result<Option<BufferSlot>, AudioError> {
        self.check_open()?;
        let deadline = Instant::now() + timeout;
        loop {
            self.pump();

            if let Some(&(slot, end)) = self.queued.front() {
                if self.state.consumed.load(Ordering::Acquire) >= end {
                    self.queued.pop_front();
                    if self.queued.is_empty() {
                        // Starved until the next play().
                        self.playing = false;
                        self.state.running.store(false, Ordering::Release);
                    }
                    return Ok(Some(slot));
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            self.state.wait(deadline - now);
        }
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn play(&mut self) -> Result<(), AudioError> {
        self.check_open()?;
        self.playing = true;
        self.state.running.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.playing = false;
        self.state.running.store(false, Ordering::Release);
        self.pending.clear();
        self.queued.clear();
        self.resampler.reset();
        self.state.flush.store(true, Ordering::Release);
        Ok(())
    }

    fn close(&mut self) -> Result<(), AudioError> {
        if self.closed {
            return Ok(());
        }
        self.stop()?;
        self.closed = true;
        let mut voices = self.voices.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = voices.get_mut(self.channel) {
            *slot = None;
        }
        debug!(channel = self.channel, "channel stream closed");
        Ok(())
    }
}

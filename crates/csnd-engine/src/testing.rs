//! In-process output stream for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use csnd_ir::Interpolation;

use crate::output::{AudioError, BufferSlot, OutputDevice, OutputStream, PcmBuffer};

#[derive(Clone, Debug)]
pub struct Queued {
    pub slot: BufferSlot,
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub interpolation: Interpolation,
}

#[derive(Debug, Default)]
pub struct StreamLog {
    pub queued: Vec<Queued>,
    pub plays: usize,
    pub stops: usize,
    pub closed: bool,
    /// Calls that returned an injected error
    pub errors: usize,
}

/// Consumes queued buffers instantly until `budget` buffers were queued.
pub struct InstantStream {
    log: Arc<Mutex<StreamLog>>,
    pending: VecDeque<BufferSlot>,
    playing: bool,
    budget: usize,
    starves: bool,
    queue_faults: usize,
    wait_faults: usize,
}

impl InstantStream {
    pub fn with_budget(budget: usize) -> (Self, Arc<Mutex<StreamLog>>) {
        let log = Arc::new(Mutex::new(StreamLog::default()));
        let stream = Self {
            log: log.clone(),
            pending: VecDeque::new(),
            playing: false,
            budget,
            starves: false,
            queue_faults: 0,
            wait_faults: 0,
        };
        (stream, log)
    }

    /// Stops playing every time it hands a buffer back.
    pub fn starving(budget: usize) -> (Self, Arc<Mutex<StreamLog>>) {
        let (mut stream, log) = Self::with_budget(budget);
        stream.starves = true;
        (stream, log)
    }

    /// The first `queue_faults` queue calls and `wait_faults` waits fail.
    pub fn faulty(
        budget: usize,
        queue_faults: usize,
        wait_faults: usize,
    ) -> (Self, Arc<Mutex<StreamLog>>) {
        let (mut stream, log) = Self::with_budget(budget);
        stream.queue_faults = queue_faults;
        stream.wait_faults = wait_faults;
        (stream, log)
    }
}

/// Fail once if `left` faults remain.
fn inject(log: &Mutex<StreamLog>, left: &mut usize) -> Result<(), AudioError> {
    if *left == 0 {
        return Ok(());
    }
    *left -= 1;
    log.lock().unwrap().errors += 1;
    Err(AudioError::Playback("injected fault".into()))
}

impl OutputStream for InstantStream {
    fn queue(&mut self, slot: BufferSlot, buffer: PcmBuffer<'_>) -> Result<(), AudioError> {
        inject(&self.log, &mut self.queue_faults)?;
        self.log.lock().unwrap().queued.push(Queued {
            slot,
            samples: buffer.samples.to_vec(),
            sample_rate: buffer.sample_rate,
            interpolation: buffer.interpolation,
        });
        self.pending.push_back(slot);
        Ok(())
    }

    fn wait_processed(&mut self, timeout: Duration) -> Result<Option<BufferSlot>, AudioError> {
        inject(&self.log, &mut self.wait_faults)?;
        let exhausted = self.log.lock().unwrap().queued.len() >= self.budget;
        if exhausted || self.pending.is_empty() {
            std::thread::sleep(timeout);
            return Ok(None);
        }
        let slot = self.pending.pop_front();
        if self.starves || self.pending.is_empty() {
            self.playing = false;
        }
        Ok(slot)
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn play(&mut self) -> Result<(), AudioError> {
        self.playing = true;
        self.log.lock().unwrap().plays += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.playing = false;
        self.pending.clear();
        self.log.lock().unwrap().stops += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), AudioError> {
        self.stop()?;
        self.log.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Opens [`InstantStream`]s and keeps their logs by channel.
pub struct InstantDevice {
    pub budget: usize,
    pub logs: Vec<Arc<Mutex<StreamLog>>>,
    pub fail_channels: Vec<usize>,
}

impl InstantDevice {
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            logs: Vec::new(),
            fail_channels: Vec::new(),
        }
    }

    pub fn log(&self, channel: usize) -> &Arc<Mutex<StreamLog>> {
        &self.logs[channel]
    }
}

impl OutputDevice for InstantDevice {
    fn open_stream(
        &mut self,
        channel: usize,
        _sample_rate: u32,
    ) -> Result<Box<dyn OutputStream>, AudioError> {
        let (stream, log) = InstantStream::with_budget(self.budget);
        self.logs.push(log);
        if self.fail_channels.contains(&channel) {
            return Err(AudioError::StreamCreate(format!("channel {channel} refused")));
        }
        Ok(Box::new(stream))
    }

    fn close(&mut self) -> Result<(), AudioError> {
        Ok(())
    }
}

/// Poll `cond` for up to two seconds.
pub fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}

//! Shared harness for the integration tests: a session over in-memory guest
//! RAM with the capture device standing in for audio hardware.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use csnd_audio::{CaptureDevice, CaptureHandle};
use csnd_engine::{ExecutionReport, SharedMemory, VecGuestMemory};
use csnd_ir::{CommandListBuilder, BLOCK_HEADER_SIZE, STATUS_OFFSET};
use csnd_service::{LocalKernel, MixerSession, ServiceError, SessionConfig};

pub const PHYS: u32 = 0x2000_0000;
pub const VIRT: u32 = 0x1400_0000;
pub const GUEST_RAM: usize = 0x10000;
pub const SHARED_SIZE: u32 = 0x1000;

pub struct Harness {
    pub session: MixerSession,
    pub captures: CaptureHandle,
    pub memory: Arc<VecGuestMemory>,
}

impl Harness {
    /// Initialized session whose channels record up to `limit` samples.
    pub fn new(limit: usize) -> Self {
        Self::with_device(CaptureDevice::new().with_limit(limit))
    }

    pub fn with_device(device: CaptureDevice) -> Self {
        let memory = Arc::new(VecGuestMemory::new(PHYS, VIRT, GUEST_RAM));
        let captures = device.handle();
        let mut session = MixerSession::new(
            SessionConfig::default(),
            Box::new(LocalKernel::new()),
            memory.clone(),
            Box::new(device),
        );
        session.initialize(SHARED_SIZE, [0; 4]).unwrap();
        Self {
            session,
            captures,
            memory,
        }
    }

    pub fn shared(&self) -> Arc<dyn SharedMemory> {
        self.session.shared_memory().unwrap().clone()
    }

    /// Write `list` at its base offset and execute it.
    pub fn submit(&mut self, list: &CommandListBuilder) -> Result<ExecutionReport, ServiceError> {
        self.shared()
            .write(list.start_offset() as usize, &list.encode().unwrap())
            .unwrap();
        self.session.execute_commands(list.start_offset() as u32)
    }

    pub fn status(&self, offset: usize) -> u32 {
        let mut word = [0u8; 4];
        self.shared().read(offset + STATUS_OFFSET, &mut word).unwrap();
        u32::from_le_bytes(word)
    }

    /// Store sample bytes behind a block header at `phys`.
    pub fn write_block(&self, phys: u32, data: &[u8]) {
        self.memory.write_phys(phys + BLOCK_HEADER_SIZE, data).unwrap();
    }
}

pub fn pcm16(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
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

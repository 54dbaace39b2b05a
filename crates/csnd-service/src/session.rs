//! Session lifecycle: initialize, execute command lists, tear down.

use std::sync::Arc;

use csnd_engine::{
    execute_commands, ChannelSnapshot, ExecutionReport, GuestMemory, Mixer, OutputDevice,
    SharedMemory,
};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::kernel::{Handle, KernelObjects};
use crate::ServiceError;

/// Channel mask reported by `AcquireSoundChannels`.
pub const ACQUIRED_CHANNEL_MASK: u32 = 0x1F;

/// Handles produced by `Initialize`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InitializeResponse {
    pub mutex: Handle,
    pub shared_memory: Handle,
}

/// One guest's sound session.
///
/// Owns the mixer, the output device and the shared-memory region command
/// lists are read from. Streams are opened on the first `initialize` and
/// closed on `shutdown` or drop.
pub struct MixerSession {
    config: SessionConfig,
    kernel: Box<dyn KernelObjects>,
    device: Option<Box<dyn OutputDevice>>,
    mixer: Mixer,
    shared: Option<Arc<dyn SharedMemory>>,
    offsets: [u32; 4],
    initialized: bool,
    shut_down: bool,
}

impl MixerSession {
    pub fn new(
        config: SessionConfig,
        kernel: Box<dyn KernelObjects>,
        memory: Arc<dyn GuestMemory>,
        device: Box<dyn OutputDevice>,
    ) -> Self {
        let mixer = Mixer::new(memory, config.feed);
        Self {
            config,
            kernel,
            device: Some(device),
            mixer,
            shared: None,
            offsets: [0; 4],
            initialized: false,
            shut_down: false,
        }
    }

    /// Create the shared memory and mutex for the guest.
    ///
    /// Every call produces fresh handles; the device streams are opened only
    /// on the first call.
    pub fn initialize(
        &mut self,
        byte_count: u32,
        offsets: [u32; 4],
    ) -> Result<InitializeResponse, ServiceError> {
        let (shared_memory, region) = self
            .kernel
            .create_shared_memory(&self.config.shared_memory_name, byte_count as usize)?;
        let mutex = self.kernel.create_mutex(&self.config.mutex_name)?;
        self.shared = Some(region);
        self.offsets = offsets;

        if !self.initialized {
            match self.device.as_deref_mut() {
                Some(device) => {
                    let opened = self.mixer.open_streams(device, self.config.nominal_rate);
                    info!(opened, rate = self.config.nominal_rate, "channel streams opened");
                }
                None => warn!("output device already closed, all channels silent"),
            }
            self.mixer.set_current_channel(0);
            self.initialized = true;
        }

        debug!(byte_count, ?offsets, "initialized");
        Ok(InitializeResponse {
            mutex,
            shared_memory,
        })
    }

    /// Walk the command list rooted at `start` (truncated to 16 bits).
    pub fn execute_commands(&mut self, start: u32) -> Result<ExecutionReport, ServiceError> {
        let shared = self.shared.clone().ok_or(ServiceError::NotInitialized)?;
        let report = execute_commands(shared.as_ref(), start as u16, &mut self.mixer)?;
        debug!(?report, "command list executed");
        Ok(report)
    }

    /// All channels are always reported available.
    pub fn acquire_sound_channels(&self) -> u32 {
        ACQUIRED_CHANNEL_MASK
    }

    pub fn release_sound_channels(&mut self) {
        debug!("ReleaseSoundChannels (stub)");
    }

    pub fn execute_type1_commands(&mut self) {
        debug!("ExecuteType1Commands (stub)");
    }

    pub fn acquire_capture_device(&mut self) {
        debug!("AcquireCaptureDevice (stub)");
    }

    pub fn release_capture_device(&mut self) {
        debug!("ReleaseCaptureDevice (stub)");
    }

    pub fn flush_dcache(&mut self) {
        debug!("FlushDCache (stub)");
    }

    pub fn store_dcache(&mut self) {
        debug!("StoreDCache (stub)");
    }

    pub fn invalidate_dcache(&mut self) {
        debug!("InvalidateDCache (stub)");
    }

    /// The RPC `Shutdown` entry. Teardown happens in [`MixerSession::shutdown`].
    pub fn shutdown_rpc(&mut self) {
        debug!("Shutdown (stub)");
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn offsets(&self) -> [u32; 4] {
        self.offsets
    }

    pub fn shared_memory(&self) -> Option<&Arc<dyn SharedMemory>> {
        self.shared.as_ref()
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    pub fn channel(&self, index: usize) -> Option<ChannelSnapshot> {
        self.mixer.snapshot(index)
    }

    pub fn is_channel_playing(&self, index: usize) -> bool {
        self.mixer.is_playing(index)
    }

    /// Stop every channel, close its stream and close the device.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.mixer.close_streams();
        if let Some(mut device) = self.device.take() {
            if let Err(e) = device.close() {
                warn!(error = %e, "failed to close output device");
            }
        }
        info!("session shut down");
    }
}

impl Drop for MixerSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

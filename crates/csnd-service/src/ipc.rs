//! RPC surface: the service function table and command-buffer marshalling.

use tracing::{trace, warn};

use crate::result::ResultCode;
use crate::session::MixerSession;

/// Translate header preceding the two handles returned by `Initialize`.
pub const HANDLE_LIST_HEADER: u32 = 0x0400_0000;

/// Entries of the service's function table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ServiceFunction {
    Initialize,
    Shutdown,
    ExecuteType0Commands,
    ExecuteType1Commands,
    AcquireSoundChannels,
    ReleaseSoundChannels,
    AcquireCaptureDevice,
    ReleaseCaptureDevice,
    FlushDCache,
    StoreDCache,
    InvalidateDCache,
}

impl ServiceFunction {
    pub const ALL: [ServiceFunction; 11] = [
        Self::Initialize,
        Self::Shutdown,
        Self::ExecuteType0Commands,
        Self::ExecuteType1Commands,
        Self::AcquireSoundChannels,
        Self::ReleaseSoundChannels,
        Self::AcquireCaptureDevice,
        Self::ReleaseCaptureDevice,
        Self::FlushDCache,
        Self::StoreDCache,
        Self::InvalidateDCache,
    ];

    pub fn header(self) -> u32 {
        match self {
            Self::Initialize => 0x0001_0140,
            Self::Shutdown => 0x0002_0000,
            Self::ExecuteType0Commands => 0x0003_0040,
            Self::ExecuteType1Commands => 0x0004_0080,
            Self::AcquireSoundChannels => 0x0005_0000,
            Self::ReleaseSoundChannels => 0x0006_0000,
            Self::AcquireCaptureDevice => 0x0007_0000,
            Self::ReleaseCaptureDevice => 0x0008_0040,
            Self::FlushDCache => 0x0009_0082,
            Self::StoreDCache => 0x000A_0082,
            Self::InvalidateDCache => 0x000B_0082,
        }
    }

    pub fn from_header(header: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.header() == header)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Initialize => "Initialize",
            Self::Shutdown => "Shutdown",
            Self::ExecuteType0Commands => "ExecuteType0Commands",
            Self::ExecuteType1Commands => "ExecuteType1Commands",
            Self::AcquireSoundChannels => "AcquireSoundChannels",
            Self::ReleaseSoundChannels => "ReleaseSoundChannels",
            Self::AcquireCaptureDevice => "AcquireCaptureDevice",
            Self::ReleaseCaptureDevice => "ReleaseCaptureDevice",
            Self::FlushDCache => "FlushDCache",
            Self::StoreDCache => "StoreDCache",
            Self::InvalidateDCache => "InvalidateDCache",
        }
    }
}

/// Words a request with `header` occupies, header included.
fn request_words(header: u32) -> usize {
    let normal = (header >> 6) & 0x3F;
    let translate = header & 0x3F;
    1 + (normal + translate) as usize
}

/// The service endpoint: decodes command buffers and drives a session.
pub struct CsndService {
    session: MixerSession,
}

impl CsndService {
    pub fn new(session: MixerSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &MixerSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut MixerSession {
        &mut self.session
    }

    /// Handle one request in place. Word 0 is the header; results are
    /// written from word 1 on.
    ///
    /// Returns the function that ran, `None` for an unknown header or a
    /// buffer too short for the request.
    pub fn handle_request(&mut self, cmd: &mut [u32]) -> Option<ServiceFunction> {
        let Some(&header) = cmd.first() else {
            return None;
        };

        let Some(function) = ServiceFunction::from_header(header) else {
            warn!(header = format_args!("{header:#010x}"), "unknown service function");
            write_result(cmd, ResultCode::NOT_IMPLEMENTED);
            return None;
        };

        if cmd.len() < request_words(header).max(5) {
            warn!(function = function.name(), len = cmd.len(), "command buffer too short");
            write_result(cmd, ResultCode::INVALID_REQUEST);
            return None;
        }

        trace!(function = function.name(), "service request");
        match function {
            ServiceFunction::Initialize => {
                let offsets = [cmd[2], cmd[3], cmd[4], cmd[5]];
                match self.session.initialize(cmd[1], offsets) {
                    Ok(response) => {
                        cmd[1] = ResultCode::SUCCESS.raw();
                        cmd[2] = HANDLE_LIST_HEADER;
                        cmd[3] = response.mutex.0;
                        cmd[4] = response.shared_memory.0;
                    }
                    Err(e) => {
                        warn!(error = %e, "Initialize failed");
                        cmd[1] = ResultCode::from(&e).raw();
                    }
                }
            }
            ServiceFunction::ExecuteType0Commands => {
                let result = self.session.execute_commands(cmd[1]);
                if let Err(e) = &result {
                    warn!(error = %e, "command list rejected");
                }
                cmd[1] = ResultCode::from(&result).raw();
            }
            ServiceFunction::AcquireSoundChannels => {
                cmd[1] = ResultCode::SUCCESS.raw();
                cmd[2] = self.session.acquire_sound_channels();
            }
            stub => {
                match stub {
                    ServiceFunction::Shutdown => self.session.shutdown_rpc(),
                    ServiceFunction::ExecuteType1Commands => self.session.execute_type1_commands(),
                    ServiceFunction::ReleaseSoundChannels => self.session.release_sound_channels(),
                    ServiceFunction::AcquireCaptureDevice => self.session.acquire_capture_device(),
                    ServiceFunction::ReleaseCaptureDevice => self.session.release_capture_device(),
                    ServiceFunction::FlushDCache => self.session.flush_dcache(),
                    ServiceFunction::StoreDCache => self.session.store_dcache(),
                    ServiceFunction::InvalidateDCache => self.session.invalidate_dcache(),
                    _ => {}
                }
                cmd[1] = ResultCode::SUCCESS.raw();
            }
        }
        Some(function)
    }
}

fn write_result(cmd: &mut [u32], code: ResultCode) {
    if let Some(word) = cmd.get_mut(1) {
        *word = code.raw();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::kernel::LocalKernel;
    use csnd_audio::CaptureDevice;
    use csnd_engine::{SharedMemory, VecGuestMemory};
    use csnd_ir::CommandListBuilder;
    use std::sync::Arc;

    fn service() -> CsndService {
        let memory = Arc::new(VecGuestMemory::new(0x2000_0000, 0x1400_0000, 0x1000));
        CsndService::new(MixerSession::new(
            SessionConfig::default(),
            Box::new(LocalKernel::new()),
            memory,
            Box::new(CaptureDevice::new().with_limit(1024)),
        ))
    }

    #[test]
    fn header_table_round_trips() {
        for f in ServiceFunction::ALL {
            assert_eq!(ServiceFunction::from_header(f.header()), Some(f));
        }
        assert_eq!(ServiceFunction::from_header(0x000C_0000), None);
    }

    #[test]
    fn initialize_writes_handles() {
        let mut svc = service();
        let mut cmd = [0u32; 16];
        cmd[0] = ServiceFunction::Initialize.header();
        cmd[1] = 0x2000;
        cmd[2..6].copy_from_slice(&[0, 0x400, 0x800, 0xC00]);

        assert_eq!(svc.handle_request(&mut cmd), Some(ServiceFunction::Initialize));
        assert_eq!(cmd[1], 0);
        assert_eq!(cmd[2], HANDLE_LIST_HEADER);
        assert_ne!(cmd[3], 0);
        assert_ne!(cmd[4], 0);
        assert_ne!(cmd[3], cmd[4]);
        assert_eq!(svc.session().offsets(), [0, 0x400, 0x800, 0xC00]);
    }

    #[test]
    fn execute_and_acquire() {
        let mut svc = service();
        let mut cmd = [0u32; 16];
        cmd[0] = ServiceFunction::ExecuteType0Commands.header();
        svc.handle_request(&mut cmd);
        assert_eq!(cmd[1], ResultCode::NOT_INITIALIZED.raw());

        svc.session_mut().initialize(0x200, [0; 4]).unwrap();
        let mut list = CommandListBuilder::at(0x20);
        list.set_play_state(6, false);
        let shared = svc.session().shared_memory().unwrap().clone();
        shared.write(0x20, &list.encode().unwrap()).unwrap();

        let mut cmd = [0u32; 16];
        cmd[0] = ServiceFunction::ExecuteType0Commands.header();
        cmd[1] = 0x20;
        assert_eq!(svc.handle_request(&mut cmd), Some(ServiceFunction::ExecuteType0Commands));
        assert_eq!(cmd[1], 0);
        assert_eq!(svc.session().mixer().current_channel(), 6);

        cmd[0] = ServiceFunction::ExecuteType0Commands.header();
        cmd[1] = 0x1F0;
        svc.handle_request(&mut cmd);
        assert_eq!(cmd[1], ResultCode::INVALID_COMMAND_LIST.raw());

        let mut cmd = [0u32; 16];
        cmd[0] = ServiceFunction::AcquireSoundChannels.header();
        svc.handle_request(&mut cmd);
        assert_eq!(&cmd[1..3], &[0, 0x1F]);
    }

    #[test]
    fn stubs_succeed_and_unknown_fails() {
        let mut svc = service();
        for f in ServiceFunction::ALL {
            if matches!(
                f,
                ServiceFunction::Initialize
                    | ServiceFunction::ExecuteType0Commands
                    | ServiceFunction::AcquireSoundChannels
            ) {
                continue;
            }
            let mut cmd = [0xFFFF_FFFFu32; 16];
            cmd[0] = f.header();
            assert_eq!(svc.handle_request(&mut cmd), Some(f));
            assert_eq!(cmd[1], 0, "{}", f.name());
        }

        let mut cmd = [0u32; 4];
        cmd[0] = 0x00FF_0000;
        assert_eq!(svc.handle_request(&mut cmd), None);
        assert!(!ResultCode(cmd[1]).is_success());
    }

    #[test]
    fn short_buffer_is_rejected() {
        let mut svc = service();
        let mut cmd = [ServiceFunction::Initialize.header(), 0x100, 0];
        assert_eq!(svc.handle_request(&mut cmd), None);
        assert_eq!(cmd[1], ResultCode::INVALID_REQUEST.raw());
    }
}

//! Session lifecycle and RPC surface of the csnd sound mixer core.

mod config;
mod ipc;
mod kernel;
mod result;
mod session;

use csnd_engine::DecodeError;

pub use config::SessionConfig;
pub use ipc::{CsndService, ServiceFunction, HANDLE_LIST_HEADER};
pub use kernel::{Handle, KernelError, KernelObjects, LocalKernel};
pub use result::ResultCode;
pub use session::{InitializeResponse, MixerSession, ACQUIRED_CHANNEL_MASK};

/// Errors returned by session operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("session not initialized")]
    NotInitialized,
    #[error("command list rejected: {0}")]
    Decode(#[from] DecodeError),
    #[error("kernel object creation failed: {0}")]
    Kernel(#[from] crate::kernel::KernelError),
}

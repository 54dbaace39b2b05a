//! Output devices for the csnd sound mixer core.

mod capture;
mod cpal_backend;
mod resample;

pub use capture::{CaptureDevice, CaptureHandle, Recording};
pub use cpal_backend::{CpalDevice, CpalStream};
pub use resample::Resampler;

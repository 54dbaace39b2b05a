//! Result codes returned to the guest.

use crate::ServiceError;
use csnd_engine::DecodeError;

/// 32-bit result word. Failures have the high bit set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResultCode(pub u32);

impl ResultCode {
    pub const SUCCESS: ResultCode = ResultCode(0);
    pub const NOT_INITIALIZED: ResultCode = ResultCode(0xE0E0_2C01);
    pub const INVALID_COMMAND_LIST: ResultCode = ResultCode(0xE0E0_2C02);
    pub const OUT_OF_MEMORY: ResultCode = ResultCode(0xE0E0_2C03);
    pub const NOT_IMPLEMENTED: ResultCode = ResultCode(0xE0E0_2C04);
    pub const INVALID_REQUEST: ResultCode = ResultCode(0xE0E0_2C05);

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self.0 & 0x8000_0000 == 0
    }
}

impl From<&ServiceError> for ResultCode {
    fn from(err: &ServiceError) -> Self {
        match err {
            ServiceError::NotInitialized => ResultCode::NOT_INITIALIZED,
            ServiceError::Decode(DecodeError::Memory(_)) => ResultCode::OUT_OF_MEMORY,
            ServiceError::Decode(_) => ResultCode::INVALID_COMMAND_LIST,
            ServiceError::Kernel(_) => ResultCode::OUT_OF_MEMORY,
        }
    }
}

impl<T> From<&Result<T, ServiceError>> for ResultCode {
    fn from(result: &Result<T, ServiceError>) -> Self {
        match result {
            Ok(_) => ResultCode::SUCCESS,
            Err(e) => e.into(),
        }
    }
}

use derive_more::From;
use orion_error::{ErrorCode, StructError, UvsReason};

#[derive(Debug, Clone, PartialEq, thiserror::Error, From)]
pub enum CoreReason {
    #[error("unknown control")]
    UnknownControl,
    #[error("control already registered")]
    DuplicateControl,
    #[error("wait predicate mismatch")]
    WaitMismatch,
    #[error("pump engine precondition failed")]
    PumpBusy,
    #[error("{0}")]
    Uvs(UvsReason),
}

impl ErrorCode for CoreReason {
    fn error_code(&self) -> i32 {
        match self {
            Self::UnknownControl => 1001,
            Self::DuplicateControl => 1002,
            Self::WaitMismatch => 1003,
            Self::PumpBusy => 1004,
            Self::Uvs(u) => u.error_code(),
        }
    }
}

pub type CoreError = StructError<CoreReason>;
pub type CoreResult<T> = Result<T, CoreError>;

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EclError>;

/// 库内统一错误类型。
///
/// "找不到"（关键字/occurrence/report step/时间）不在这里：那些走 `Option`/`bool`，
/// 调用方在正常流程里就会分支处理。这里只放 I/O 故障与 API 误用。
#[derive(Debug, Error)]
pub enum EclError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("stream detached, cannot load keyword on demand")]
    StreamDetached,

    #[error("keyword at offset {offset} is not managed by this index")]
    UnknownHandle { offset: u64 },

    #[error("replacement for {name} changes the keyword shape: expected {expected}, got {found}")]
    ShapeMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("pop without matching push")]
    PopWithoutPush,

    #[error("position {pos} out of range (view size {len})")]
    PositionOutOfRange { pos: usize, len: usize },

    #[error("file was not opened writable")]
    ReadOnly,

    #[error("encoded size of {name} changed: {expected} bytes on disk, {found} bytes new")]
    EncodedSizeMismatch {
        name: String,
        expected: u64,
        found: u64,
    },

    #[error("payload of {name} at offset {offset} is truncated or corrupt")]
    CorruptPayload { name: String, offset: u64 },

    #[error("keyword {name} has type {found}, expected {expected}")]
    UnexpectedType {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("required keyword {0} not present")]
    MissingKeyword(String),
}

impl EclError {
    /// API 误用（应当让调用方"大声失败"），区别于 I/O 故障。
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            EclError::StreamDetached
                | EclError::UnknownHandle { .. }
                | EclError::ShapeMismatch { .. }
                | EclError::PopWithoutPush
                | EclError::PositionOutOfRange { .. }
                | EclError::ReadOnly
                | EclError::EncodedSizeMismatch { .. }
        )
    }
}

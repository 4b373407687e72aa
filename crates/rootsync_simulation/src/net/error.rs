//! Ошибки wire-слоя

use thiserror::Error;

/// Ошибки чтения/записи root motion по сети
///
/// Всё, что приходит с провода, считается недоверенным: любая из этих
/// ошибок означает "сообщение отбросить", не панику.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    #[error("Unknown root motion type tag: {0}")]
    UnknownTypeTag(u8),

    #[error("Type tag {0} is not a concrete root motion source")]
    NotARootMotionSource(u8),

    #[error("Invalid accumulate mode: {0}")]
    InvalidAccumulateMode(u8),

    #[error("String is not valid UTF-8")]
    InvalidUtf8,

    #[error("String too long: {len} > {max}")]
    StringTooLong { len: usize, max: usize },

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Non-finite {0} in root motion data")]
    NonFinite(&'static str),

    #[error("{0} requires a positive duration")]
    InvalidDuration(&'static str),
}

impl WireError {
    /// Нарушение протокола (мусор от пира), а не обрыв буфера
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            WireError::UnknownTypeTag(_)
                | WireError::NotARootMotionSource(_)
                | WireError::InvalidAccumulateMode(_)
                | WireError::InvalidUtf8
                | WireError::NonFinite(_)
                | WireError::InvalidDuration(_)
        )
    }

    pub fn code(&self) -> u16 {
        match self {
            WireError::UnexpectedEof => 3000,
            WireError::UnknownTypeTag(_) => 3001,
            WireError::NotARootMotionSource(_) => 3002,
            WireError::InvalidAccumulateMode(_) => 3003,
            WireError::InvalidUtf8 => 3004,
            WireError::StringTooLong { .. } => 3005,
            WireError::Archive(_) => 3006,
            WireError::NonFinite(_) => 3007,
            WireError::InvalidDuration(_) => 3008,
        }
    }
}

pub type WireResult<T> = Result<T, WireError>;

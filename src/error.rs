use thiserror::Error;

use crate::models::{BookingId, BookingStatus};

/// Бизнес-ошибки брони. Все они возвращаются вызывающей стороне как значения.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookingError {
    #[error("time slot is already taken")]
    SlotTaken,

    #[error("illegal status transition: {from} -> {to}")]
    IllegalTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("booking not found: {0}")]
    NotFound(BookingId),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// Сбой хранилища. Фасад повторяет операцию и наружу отдаёт `Unavailable`.
    #[error("storage backend error: {0}")]
    Store(String),

    #[error("booking storage is unavailable")]
    Unavailable,
}

impl BookingError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::Store(_))
    }
}

impl From<sqlx::Error> for BookingError {
    fn from(err: sqlx::Error) -> Self {
        BookingError::Store(err.to_string())
    }
}

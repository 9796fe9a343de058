use ulid::Ulid;

use crate::interval::SlotLabelError;
use crate::model::BookingStatus;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    InvalidSlotLabel(SlotLabelError),
    /// A committed booking's blocked window covers the requested slot.
    SlotNoLongerAvailable { conflicting: Ulid },
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    LimitExceeded(&'static str),
    WalError(String),
}

impl From<SlotLabelError> for EngineError {
    fn from(e: SlotLabelError) -> Self {
        EngineError::InvalidSlotLabel(e)
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "booking already exists: {id}"),
            EngineError::InvalidSlotLabel(e) => write!(f, "{e}"),
            EngineError::SlotNoLongerAvailable { conflicting } => {
                write!(f, "slot no longer available: blocked by booking {conflicting}")
            }
            EngineError::InvalidTransition { from, to } => {
                write!(f, "invalid status transition: {from} -> {to}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

use ulid::Ulid;

use crate::rules::RuleViolation;

#[derive(Debug, PartialEq, Eq)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(String),
    /// Missing, unknown or expired credential.
    Unauthenticated,
    InvalidCredentials,
    Forbidden(&'static str),
    Invalid(RuleViolation),
    InvalidInput(&'static str),
    NotModifiable(Ulid),
    NotCancellable(Ulid),
    NoChanges,
    HasBookings(Ulid),
    LimitExceeded(&'static str),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(what) => write!(f, "already exists: {what}"),
            EngineError::Unauthenticated => write!(f, "not authenticated"),
            EngineError::InvalidCredentials => write!(f, "invalid credentials"),
            EngineError::Forbidden(what) => write!(f, "forbidden: {what}"),
            EngineError::Invalid(rule) => write!(f, "invalid dates: {rule}"),
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::NotModifiable(id) => {
                write!(f, "booking {id} can no longer be modified: stay has started or ended")
            }
            EngineError::NotCancellable(id) => {
                write!(f, "booking {id} can no longer be cancelled: stay has ended")
            }
            EngineError::NoChanges => write!(f, "no changes"),
            EngineError::HasBookings(id) => {
                write!(f, "cannot delete hotel {id}: has bookings")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<RuleViolation> for EngineError {
    fn from(rule: RuleViolation) -> Self {
        EngineError::Invalid(rule)
    }
}

use sea_orm::DbErr;
use thiserror::Error;

/// Faults raised by the engine.
///
/// Business *rejections* (untrusted network, duplicate, no schedule, already
/// attended) are not errors; they are values on their respective outcome
/// enums. Keeping the two apart means a caller can never mistake "you are not
/// eligible" for "the system is broken".
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Signature, expiry and malformed-payload failures all collapse here so
    /// the response never reveals which check failed.
    #[error("invalid or expired token")]
    InvalidToken,

    #[error("database error: {0}")]
    Db(#[from] DbErr),
}

impl EngineError {
    /// True for the coarse client-facing failures (4xx), false for faults (5xx).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, EngineError::Db(_))
    }
}

use thiserror::Error;

/// Failure taxonomy for everything that can go wrong during a tick or a
/// transfer. All variants are caught at the tick boundary and reported.
#[derive(Debug, Error)]
pub enum BotError {
    /// Login itself failed; the session is unusable.
    #[error("authentication failed: {0}")]
    Authentication(String),
    /// The session lapsed; re-authenticate and retry on the next tick.
    #[error("session expired")]
    SessionExpired,
    /// The booking page could not be interpreted.
    #[error("could not parse booking page: {0}")]
    Parse(String),
    /// The booking site could not be reached or answered with an error status.
    #[error("network error talking to booking site: {0}")]
    Transport(String),
    #[error("reservation failed: {0}")]
    Reservation(String),
    #[error("release failed: {0}")]
    Release(String),
    /// Seeker released, target not acquired.
    #[error("transfer critical: {0}")]
    TransferCritical(String),
    #[error("no answer received before the deadline")]
    AnswerTimeout,
    #[error("could not understand answer: {0}")]
    AnswerUnparseable(String),
    #[error("notification failed: {0}")]
    Notification(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Fail-fast configuration problems detected at load time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("invalid time '{0}', expected HH:MM")]
    InvalidTime(String),
    #[error("range start is after its end: {0}")]
    InvertedRange(String),
    #[error("polling interval for '{target}' is {secs}s, minimum is 30s")]
    IntervalTooShort { target: String, secs: u64 },
    #[error("missing required setting: {0}")]
    Missing(String),
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// Why a reply could not be turned into a transfer target.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("empty reply")]
    Empty,
    #[error("'{0}' does not match any target")]
    NoMatch(String),
    #[error("'{0}' is not a configured target and no default section is set")]
    UnknownAddress(String),
}

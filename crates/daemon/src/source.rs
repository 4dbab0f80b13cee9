use async_trait::async_trait;
use tcseek_core::{ActionRef, BotError, PageRef, SectionView, Slot};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SourceError {
    /// The server no longer accepts the session; re-authenticate before retrying.
    #[error("session expired")]
    SessionExpired,
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("could not parse page: {0}")]
    Parse(String),
    #[error("http error: {0}")]
    Http(String),
}

impl From<SourceError> for BotError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::SessionExpired => BotError::SessionExpired,
            SourceError::Authentication(m) => BotError::Authentication(m),
            SourceError::Parse(m) => BotError::Parse(m),
            SourceError::Http(m) => BotError::Transport(m),
        }
    }
}

/// Booking-page collaborator: reads sections and performs single-use actions.
///
/// `fetch_section` must report [`SourceError::SessionExpired`] rather than an
/// empty view when the session has lapsed.
#[async_trait]
pub trait SlotSource: Send + Sync {
    async fn session_valid(&self) -> bool;

    /// Establishes a fresh session.
    async fn authenticate(&self) -> Result<(), SourceError>;

    async fn fetch_section(&self, page: &PageRef, section: &str) -> Result<SectionView, SourceError>;

    /// The bookable slot in `section` starting when `like` starts, found with
    /// as few requests as the source allows.
    async fn find_slot(&self, page: &PageRef, section: &str, like: &Slot) -> Result<Option<Slot>, SourceError>;

    /// `Ok(false)` means the server refused the reservation.
    async fn reserve(&self, action: &ActionRef) -> Result<bool, SourceError>;

    /// `Ok(false)` means the server refused the release.
    async fn release(&self, action: &ActionRef) -> Result<bool, SourceError>;
}

/// Re-authenticates when the session check says the session is gone.
pub async fn ensure_session(source: &dyn SlotSource) -> Result<(), SourceError> {
    if source.session_valid().await {
        return Ok(());
    }
    warn!("session no longer valid, re-authenticating");
    source.authenticate().await?;
    info!("re-authenticated");
    Ok(())
}

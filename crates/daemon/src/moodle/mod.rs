//! Moodle TC booking pages as a [`SlotSource`].

mod auth;
pub mod parse;

use async_trait::async_trait;
use chrono::Local;
use reqwest::{StatusCode, Url};
use tcseek_core::{now_ms, parse_slot_date, ActionRef, PageRef, SectionView, Slot};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::session::{CachedSession, SessionCache};
use crate::source::{SlotSource, SourceError};
use auth::HttpSession;
use parse::DateCell;

/// Site address and credentials.
#[derive(Clone, Debug)]
pub struct MoodleConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

pub struct MoodleClient {
    base: String,
    origin: Url,
    username: String,
    password: String,
    cache: SessionCache,
    http: RwLock<HttpSession>,
}

impl MoodleClient {
    /// Restores the cached session or logs in. Login failure is returned.
    pub async fn connect(config: MoodleConfig, cache: SessionCache) -> Result<Self, SourceError> {
        let base = config.base_url.trim_end_matches('/').to_string();
        let origin = Url::parse(&base)
            .map_err(|e| SourceError::Authentication(format!("invalid Moodle url '{base}': {e}")))?;

        let restored = match cache.load(&base) {
            Some(cached) => {
                let session = HttpSession::with_cookies(&cached.cookies, &origin)?;
                if session.probe(&base).await {
                    info!("restored session from cache");
                    Some(session)
                } else {
                    info!("cached session invalid, will re-authenticate");
                    None
                }
            }
            None => None,
        };

        let needs_login = restored.is_none();
        let client = Self {
            http: RwLock::new(match restored {
                Some(s) => s,
                None => HttpSession::new()?,
            }),
            base,
            origin,
            username: config.username,
            password: config.password,
            cache,
        };
        if needs_login {
            client.authenticate().await?;
        }
        Ok(client)
    }

    /// Absolute address for a link found on a TC page.
    pub fn absolute(&self, link: &str) -> String {
        resolve_link(&self.base, link)
    }

    fn persist(&self, session: &HttpSession) {
        let Some(cookies) = session.cookie_header(&self.origin) else {
            warn!("no cookies to cache after login");
            return;
        };
        let cached = CachedSession {
            base_url: self.base.clone(),
            cookies,
            saved_at: now_ms(),
        };
        if let Err(e) = self.cache.save(&cached) {
            warn!(error = %e, "failed to save session cache");
        }
    }

    async fn client(&self) -> reqwest::Client {
        self.http.read().await.client.clone()
    }

    /// GETs a page, treating a bounce to the login form as session expiry.
    async fn get_page(&self, url: &str) -> Result<(StatusCode, String), SourceError> {
        let resp = self
            .client()
            .await
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::Http(format!("GET {url}: {e}")))?;
        let status = resp.status();
        if status == StatusCode::SEE_OTHER || resp.url().as_str().contains("login/index.php") {
            warn!(url, "redirected to login page");
            return Err(SourceError::SessionExpired);
        }
        let body = resp
            .text()
            .await
            .map_err(|e| SourceError::Parse(format!("read body of {url}: {e}")))?;
        Ok((status, body))
    }

    async fn get_ok_page(&self, url: &str) -> Result<String, SourceError> {
        let (status, body) = self.get_page(url).await?;
        if !status.is_success() {
            return Err(SourceError::Http(format!("GET {url}: status {status}")));
        }
        Ok(body)
    }

    /// Bookable times listed on one calendar day's page.
    async fn day_slots(&self, day: &DateCell) -> Result<Vec<Slot>, SourceError> {
        let html = self.get_ok_page(&self.absolute(&day.link)).await?;
        Ok(parse::available_times(&html)
            .into_iter()
            .map(|t| Slot {
                date: day.date.clone(),
                time: t.time,
                slot_id: t.slot_id,
                capacity: t.capacity,
                action: ActionRef::new(self.absolute(&t.link)),
                deadline: None,
            })
            .collect())
    }
}

#[async_trait]
impl SlotSource for MoodleClient {
    async fn session_valid(&self) -> bool {
        let session = self.http.read().await.clone();
        session.probe(&self.base).await
    }

    async fn authenticate(&self) -> Result<(), SourceError> {
        let session = auth::login(&self.base, &self.username, &self.password).await?;
        self.persist(&session);
        *self.http.write().await = session;
        Ok(())
    }

    async fn fetch_section(&self, page: &PageRef, section: &str) -> Result<SectionView, SourceError> {
        debug!(page = %page, section, "fetching section");
        let html = self.get_ok_page(page.as_str()).await?;
        let reserved = parse::reserved_slots(&html, section, Local::now().date_naive());

        let dates = parse::available_dates(&html);
        info!(section, dates = dates.len(), "fetching time slots for available dates");
        let mut available = Vec::new();
        for day in dates {
            match self.day_slots(&day).await {
                Ok(slots) => available.extend(slots),
                Err(SourceError::SessionExpired) => return Err(SourceError::SessionExpired),
                Err(e) => warn!(date = %day.date, error = %e, "could not fetch times for date"),
            }
        }
        info!(section, available = available.len(), reserved = reserved.len(), "section fetched");
        Ok(SectionView { available, reserved })
    }

    async fn find_slot(&self, page: &PageRef, section: &str, like: &Slot) -> Result<Option<Slot>, SourceError> {
        let Some(date) = like.parsed_date() else {
            return Ok(None);
        };
        let html = self.get_ok_page(page.as_str()).await?;
        let Some(day) = parse::available_dates(&html)
            .into_iter()
            .find(|d| parse_slot_date(&d.date) == Some(date))
        else {
            debug!(section, date = %like.date, "date not offered in calendar");
            return Ok(None);
        };
        let found = self
            .day_slots(&day)
            .await?
            .into_iter()
            .find(|s| s.same_start(like));
        debug!(section, date = %like.date, time = %like.time, found = found.is_some(), "slot lookup");
        Ok(found)
    }

    async fn reserve(&self, action: &ActionRef) -> Result<bool, SourceError> {
        let url = self.absolute(action.as_str());
        info!(url = %url, "registering slot");
        let (status, body) = self.get_page(&url).await?;
        if status != StatusCode::OK {
            warn!(%status, "registration request failed");
            return Ok(false);
        }
        if parse::confirms_reservation(&body) {
            info!("slot registration confirmed");
            return Ok(true);
        }
        if let Some(msg) = parse::danger_alert(&body) {
            warn!(message = %msg, "registration refused");
            return Ok(false);
        }
        warn!("registration status unclear, assuming success on HTTP 200");
        Ok(true)
    }

    async fn release(&self, action: &ActionRef) -> Result<bool, SourceError> {
        let url = self.absolute(action.as_str());
        info!(url = %url, "unregistering slot");
        let (status, body) = self.get_page(&url).await?;
        if status != StatusCode::OK {
            warn!(%status, "unregister request failed");
            return Ok(false);
        }
        if parse::confirms_release(&body) {
            info!("slot release confirmed");
            return Ok(true);
        }
        if let Some(msg) = parse::danger_alert(&body) {
            warn!(message = %msg, "unregister refused");
            return Ok(false);
        }
        info!("slot released (HTTP 200, no error shown)");
        Ok(true)
    }
}

/// `?query` links are relative to the TC view page; `/path` links to the site root.
pub fn resolve_link(base: &str, link: &str) -> String {
    let base = base.trim_end_matches('/');
    let link = link.trim();
    if link.starts_with("http://") || link.starts_with("https://") {
        link.to_string()
    } else if link.starts_with('?') {
        format!("{base}/mod/tcb/view.php{link}")
    } else if link.starts_with('/') {
        format!("{base}{link}")
    } else {
        format!("{base}/mod/tcb/{link}")
    }
}

use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, Url};
use tracing::{debug, info, warn};

use super::parse;
use crate::source::SourceError;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// One cookie jar and the client bound to it. Replaced wholesale on re-login.
#[derive(Clone)]
pub(crate) struct HttpSession {
    pub client: Client,
    pub jar: Arc<Jar>,
}

impl HttpSession {
    pub fn new() -> Result<Self, SourceError> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(|e| SourceError::Http(format!("build http client: {e}")))?;
        Ok(Self { client, jar })
    }

    /// Seeds the jar from a `name=value; ...` cookie header.
    pub fn with_cookies(header: &str, origin: &Url) -> Result<Self, SourceError> {
        let session = Self::new()?;
        for pair in header.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            session.jar.add_cookie_str(pair, origin);
        }
        Ok(session)
    }

    /// Cookie header the jar would send to `origin`.
    pub fn cookie_header(&self, origin: &Url) -> Option<String> {
        self.jar
            .cookies(origin)
            .and_then(|v| v.to_str().ok().map(str::to_string))
    }

    /// True when the dashboard loads without bouncing to the login form.
    pub async fn probe(&self, base: &str) -> bool {
        let url = format!("{base}/my/");
        match self.client.get(&url).send().await {
            Ok(resp) => {
                let ok = resp.status().is_success() && !resp.url().as_str().contains("login/index.php");
                debug!(status = %resp.status(), final_url = %resp.url(), ok, "session probe");
                ok
            }
            Err(e) => {
                warn!(error = %e, "session probe failed");
                false
            }
        }
    }
}

/// Performs the logintoken form login on a fresh session.
pub(crate) async fn login(base: &str, username: &str, password: &str) -> Result<HttpSession, SourceError> {
    info!("authenticating with Moodle");
    let auth = |e: reqwest::Error| SourceError::Authentication(format!("network error: {e}"));
    let session = HttpSession::new()?;
    let login_url = format!("{base}/login/index.php");

    let page = session
        .client
        .get(&login_url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(auth)?
        .text()
        .await
        .map_err(auth)?;

    let token = parse::login_token(&page)
        .ok_or_else(|| SourceError::Authentication("logintoken not found on login page".into()))?;

    session
        .client
        .post(&login_url)
        .form(&[
            ("username", username),
            ("password", password),
            ("logintoken", token.as_str()),
        ])
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(auth)?;

    if !session.probe(base).await {
        return Err(SourceError::Authentication(
            "invalid credentials or authentication check failed".into(),
        ));
    }
    info!("authenticated with Moodle");
    Ok(session)
}

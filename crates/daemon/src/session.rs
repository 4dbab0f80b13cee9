use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Cookie header captured after a successful login.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSession {
    pub base_url: String,
    /// `name=value; name2=value2` as sent to the Moodle origin.
    pub cookies: String,
    pub saved_at: i64,
}

/// On-disk session cache. Every failure here is non-fatal to the caller.
#[derive(Clone, Debug)]
pub struct SessionCache {
    path: PathBuf,
}

impl SessionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the cached session for `base_url`, or `None` when absent,
    /// unreadable or saved for another origin.
    pub fn load(&self, base_url: &str) -> Option<CachedSession> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no session cache found");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not read session cache");
                return None;
            }
        };
        let cached: CachedSession = match serde_json::from_slice(&bytes) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring malformed session cache");
                return None;
            }
        };
        if cached.base_url.trim_end_matches('/') != base_url.trim_end_matches('/') {
            info!(cached = %cached.base_url, "session cache belongs to another site");
            return None;
        }
        if cached.cookies.trim().is_empty() {
            debug!("session cache holds no cookies");
            return None;
        }
        Some(cached)
    }

    pub fn save(&self, session: &CachedSession) -> Result<()> {
        let json = serde_json::to_vec_pretty(session).context("serialize session cache")?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let mut file = open_private(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        file.write_all(&json)
            .with_context(|| format!("write {}", self.path.display()))?;
        info!(path = %self.path.display(), "session saved");
        Ok(())
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies on creation.
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

//! Configuration: a YAML file for what to watch, the environment for secrets.
//!
//! Everything is validated once at load; any problem is fatal at startup.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tcseek_core::{
    ConfigError, DateWindow, MonitoredTarget, PageRef, TimeWindow, TransferTarget,
    MIN_POLL_INTERVAL, SEEKER_ID,
};
use tracing::warn;

use crate::moodle::MoodleConfig;

pub const DEFAULT_MOODLE_URL: &str = "https://moodle.czu.cz";
pub const DEFAULT_SESSION_CACHE: &str = ".session_cache.json";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Deserialize)]
pub struct RangeConfig {
    pub start: String,
    pub end: String,
}

fn default_check_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageConfig {
    pub id: String,
    pub name: String,
    pub url: String,
    /// Test section heading to watch; empty matches any.
    #[serde(default)]
    pub test_name: String,
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
    pub date_range: RangeConfig,
    pub time_range: RangeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeekerConfig {
    pub tc_url: String,
    pub test_name: String,
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
    pub date_range: RangeConfig,
    pub time_range: RangeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub test_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub answer_timeout_secs: u64,
    pub answer_retries: u32,
    pub default_section: Option<String>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            answer_timeout_secs: 3600,
            answer_retries: 1,
            default_section: None,
        }
    }
}

/// Shape of `config.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub tc_pages: Vec<PageConfig>,
    #[serde(default)]
    pub seeker: Option<SeekerConfig>,
    #[serde(default)]
    pub target_tcs: Vec<TargetConfig>,
    #[serde(default)]
    pub transfer: TransferConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSettings {
    pub answer_timeout: Duration,
    /// Unparseable replies tolerated before giving up.
    pub answer_retries: u32,
    pub default_section: Option<String>,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            answer_timeout: Duration::from_secs(3600),
            answer_retries: 1,
            default_section: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: i64,
}

/// The operating mode, fixed for the process lifetime.
#[derive(Debug, Clone)]
pub enum Mode {
    Seeker {
        seeker: MonitoredTarget,
        targets: Vec<TransferTarget>,
        transfer: TransferSettings,
    },
    Legacy {
        targets: Vec<MonitoredTarget>,
    },
}

impl Mode {
    pub fn target_count(&self) -> usize {
        match self {
            Mode::Seeker { .. } => 1,
            Mode::Legacy { targets } => targets.len(),
        }
    }
}

/// `LOG_LEVEL`, or `info` when unset.
pub fn log_level(env: &dyn Fn(&str) -> Option<String>) -> String {
    env("LOG_LEVEL")
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub moodle: MoodleConfig,
    pub telegram: TelegramConfig,
    pub session_cache_file: PathBuf,
    pub mode: Mode,
}

impl Settings {
    /// Reads `path` and the environment through `env`.
    pub fn load(path: &Path, env: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let file: FileConfig = serde_yaml::from_str(&text)
            .with_context(|| format!("parse config file {}", path.display()))?;
        Ok(Self::from_parts(file, env)?)
    }

    pub fn from_parts(file: FileConfig, env: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &str| {
            env(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::Missing(key.to_string()))
        };

        let moodle = MoodleConfig {
            base_url: env("MOODLE_URL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MOODLE_URL.to_string()),
            username: required("MOODLE_USERNAME")?,
            password: required("MOODLE_PASSWORD")?,
        };
        let chat = required("TELEGRAM_CHAT_ID")?;
        let telegram = TelegramConfig {
            bot_token: required("TELEGRAM_BOT_TOKEN")?,
            chat_id: chat.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "TELEGRAM_CHAT_ID".into(),
                reason: format!("'{chat}' is not a numeric chat id"),
            })?,
        };

        Ok(Self {
            moodle,
            telegram,
            session_cache_file: env("SESSION_CACHE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_CACHE)),
            mode: build_mode(file)?,
        })
    }
}

fn check_interval(target: &str, secs: u64) -> Result<Duration, ConfigError> {
    let interval = Duration::from_secs(secs);
    if interval < MIN_POLL_INTERVAL {
        return Err(ConfigError::IntervalTooShort {
            target: target.to_string(),
            secs,
        });
    }
    Ok(interval)
}

fn windows(dates: &RangeConfig, times: &RangeConfig) -> Result<(DateWindow, TimeWindow), ConfigError> {
    Ok((
        DateWindow::parse(&dates.start, &dates.end)?,
        TimeWindow::parse(&times.start, &times.end)?,
    ))
}

fn build_mode(file: FileConfig) -> Result<Mode, ConfigError> {
    if let Some(s) = file.seeker {
        if !file.tc_pages.is_empty() {
            warn!("both seeker and tc_pages configured; running seeker mode only");
        }
        if file.target_tcs.is_empty() {
            return Err(ConfigError::Missing("target_tcs (required with seeker)".into()));
        }
        if file.transfer.answer_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "transfer.answer_timeout_secs".into(),
                reason: "must be positive".into(),
            });
        }
        let (dates, times) = windows(&s.date_range, &s.time_range)?;
        let seeker = MonitoredTarget {
            id: SEEKER_ID.to_string(),
            name: s.test_name.clone(),
            page: PageRef::new(&s.tc_url),
            section: s.test_name.clone(),
            interval: check_interval(SEEKER_ID, s.check_interval)?,
            dates,
            times,
        };
        let default_section = file.transfer.default_section.clone();
        let targets = file
            .target_tcs
            .into_iter()
            .map(|t| TransferTarget {
                section: t
                    .test_name
                    .or_else(|| default_section.clone())
                    .unwrap_or_else(|| s.test_name.clone()),
                name: t.name,
                page: PageRef::new(t.url),
            })
            .collect();
        return Ok(Mode::Seeker {
            seeker,
            targets,
            transfer: TransferSettings {
                answer_timeout: Duration::from_secs(file.transfer.answer_timeout_secs),
                answer_retries: file.transfer.answer_retries,
                default_section,
            },
        });
    }

    if file.tc_pages.is_empty() {
        return Err(ConfigError::Missing("seeker or tc_pages".into()));
    }
    let mut seen = HashSet::new();
    let mut targets = Vec::with_capacity(file.tc_pages.len());
    for p in file.tc_pages {
        if !seen.insert(p.id.clone()) {
            return Err(ConfigError::Invalid {
                key: "tc_pages".into(),
                reason: format!("duplicate id '{}'", p.id),
            });
        }
        let (dates, times) = windows(&p.date_range, &p.time_range)?;
        targets.push(MonitoredTarget {
            interval: check_interval(&p.id, p.check_interval)?,
            id: p.id,
            name: p.name,
            page: PageRef::new(p.url),
            section: p.test_name,
            dates,
            times,
        });
    }
    Ok(Mode::Legacy { targets })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_with(extra: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let mut vars: HashMap<String, String> = [
            ("MOODLE_USERNAME", "student"),
            ("MOODLE_PASSWORD", "secret"),
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("TELEGRAM_CHAT_ID", "42"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in extra {
            vars.insert(k.to_string(), v.to_string());
        }
        move |k: &str| vars.get(k).cloned()
    }

    const SEEKER_YAML: &str = r#"
seeker:
  tc_url: "https://moodle.czu.cz/mod/tcb/view.php?id=1"
  test_name: "Zkouškový test"
  check_interval: 45
  date_range: { start: "2026-01-15", end: "2026-01-20" }
  time_range: { start: "10:00", end: "16:00" }
target_tcs:
  - name: "UNIX Exam"
    url: "https://moodle.czu.cz/mod/tcb/view.php?id=2"
  - name: "Databases"
    url: "https://moodle.czu.cz/mod/tcb/view.php?id=3"
    test_name: "Zápočtový test"
"#;

    const LEGACY_YAML: &str = r#"
tc_pages:
  - id: "unix"
    name: "UNIX"
    url: "https://moodle.czu.cz/mod/tcb/view.php?id=2"
    date_range: { start: "2026-01-15", end: "2026-01-20" }
    time_range: { start: "10:00", end: "16:00" }
  - id: "db"
    name: "Databases"
    url: "https://moodle.czu.cz/mod/tcb/view.php?id=3"
    check_interval: 30
    date_range: { start: "2026-01-15", end: "2026-01-20" }
    time_range: { start: "08:00", end: "12:00" }
"#;

    fn parse(yaml: &str) -> FileConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn seeker_mode_with_defaults() {
        let s = Settings::from_parts(parse(SEEKER_YAML), &env_with(&[])).unwrap();
        assert_eq!(s.moodle.base_url, DEFAULT_MOODLE_URL);
        assert_eq!(s.telegram.chat_id, 42);
        assert_eq!(s.session_cache_file, PathBuf::from(DEFAULT_SESSION_CACHE));
        let Mode::Seeker { seeker, targets, transfer } = s.mode else {
            panic!("expected seeker mode");
        };
        assert_eq!(seeker.id, SEEKER_ID);
        assert_eq!(seeker.section, "Zkouškový test");
        assert_eq!(seeker.interval, Duration::from_secs(45));
        assert_eq!(targets[0].section, "Zkouškový test");
        assert_eq!(targets[1].section, "Zápočtový test");
        assert_eq!(transfer, TransferSettings::default());
    }

    #[test]
    fn legacy_mode_defaults_interval() {
        let s = Settings::from_parts(parse(LEGACY_YAML), &env_with(&[])).unwrap();
        let Mode::Legacy { targets } = &s.mode else {
            panic!("expected legacy mode");
        };
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].interval, Duration::from_secs(60));
        assert_eq!(s.mode.target_count(), 2);
    }

    #[test]
    fn interval_below_floor_is_rejected() {
        let yaml = SEEKER_YAML.replace("check_interval: 45", "check_interval: 10");
        let err = Settings::from_parts(parse(&yaml), &env_with(&[])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::IntervalTooShort {
                target: SEEKER_ID.into(),
                secs: 10
            }
        );
    }

    #[test]
    fn malformed_or_inverted_ranges_fail_fast() {
        let yaml = LEGACY_YAML.replace("\"08:00\"", "\"8am\"");
        assert!(matches!(
            Settings::from_parts(parse(&yaml), &env_with(&[])),
            Err(ConfigError::InvalidTime(_))
        ));
        let yaml = SEEKER_YAML.replace("end: \"2026-01-20\"", "end: \"2026-01-10\"");
        assert!(matches!(
            Settings::from_parts(parse(&yaml), &env_with(&[])),
            Err(ConfigError::InvertedRange(_))
        ));
    }

    #[test]
    fn missing_secrets_and_modes_are_reported() {
        let env = |k: &str| (k != "MOODLE_PASSWORD").then(|| "x".to_string());
        assert_eq!(
            Settings::from_parts(parse(SEEKER_YAML), &env).unwrap_err(),
            ConfigError::Missing("MOODLE_PASSWORD".into())
        );
        assert!(matches!(
            Settings::from_parts(FileConfig::default(), &env_with(&[])),
            Err(ConfigError::Missing(_))
        ));
        let no_targets = SEEKER_YAML.split("target_tcs:").next().unwrap().to_string();
        assert!(matches!(
            Settings::from_parts(parse(&no_targets), &env_with(&[])),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn duplicate_ids_and_bad_chat_id_are_invalid() {
        let yaml = LEGACY_YAML.replace("id: \"db\"", "id: \"unix\"");
        assert!(matches!(
            Settings::from_parts(parse(&yaml), &env_with(&[])),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            Settings::from_parts(parse(LEGACY_YAML), &env_with(&[("TELEGRAM_CHAT_ID", "me")])),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, LEGACY_YAML).unwrap();
        let s = Settings::load(&path, &env_with(&[("MOODLE_URL", "https://m.example")])).unwrap();
        assert_eq!(s.moodle.base_url, "https://m.example");
        assert!(Settings::load(&dir.path().join("missing.yaml"), &env_with(&[])).is_err());
    }

    #[test]
    fn log_level_defaults_to_info() {
        assert_eq!(log_level(&env_with(&[])), "info");
        assert_eq!(log_level(&env_with(&[("LOG_LEVEL", "debug")])), "debug");
        assert_eq!(log_level(&env_with(&[("LOG_LEVEL", " ")])), "info");
    }
}

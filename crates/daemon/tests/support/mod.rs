//! In-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tcseek_core::{
    ActionRef, DateWindow, MonitoredTarget, Notice, NoticeKind, PageRef, SectionView, Slot,
    TimeWindow, TransferTarget,
};
use tcseek_daemon::channel::{ChannelError, Correlator, InteractiveChannel, PendingQuestion};
use tcseek_daemon::notify::{Notifier, NotifyError};
use tcseek_daemon::source::{SlotSource, SourceError};

pub const RELEASE_PREFIX: &str = "release:";

pub fn slot(date: &str, time: &str, action: &str) -> Slot {
    Slot {
        date: date.into(),
        time: time.into(),
        slot_id: action.into(),
        capacity: 1,
        action: ActionRef::new(action),
        deadline: None,
    }
}

/// A reservation as the booking page lists it: same start, release action.
pub fn reserved(date: &str, time: &str, action: &str) -> Slot {
    slot(date, time, &format!("{RELEASE_PREFIX}{action}"))
}

pub fn monitored(id: &str, page: &str, section: &str) -> MonitoredTarget {
    MonitoredTarget {
        id: id.into(),
        name: format!("TC {id}"),
        page: PageRef::new(page),
        section: section.into(),
        interval: Duration::from_secs(60),
        dates: DateWindow::parse("2026-01-01", "2026-12-31").unwrap(),
        times: TimeWindow::parse("08:00", "20:00").unwrap(),
    }
}

pub fn transfer_target(name: &str, page: &str, section: &str) -> TransferTarget {
    TransferTarget {
        name: name.into(),
        page: PageRef::new(page),
        section: section.into(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Fetch { page: String, section: String },
    Lookup { page: String, section: String, date: String },
    Reserve(String),
    Release(String),
    Authenticate,
}

type SectionKey = (String, String);

#[derive(Default)]
struct Inner {
    sections: HashMap<SectionKey, SectionView>,
    calls: Vec<Call>,
    refuse_reserve: HashSet<String>,
    refuse_release: HashSet<String>,
    broken_fetch: HashSet<SectionKey>,
    fresh: HashSet<SectionKey>,
    fresh_counter: u32,
    max_reserved: HashMap<SectionKey, usize>,
}

impl Inner {
    fn section(&mut self, key: &SectionKey) -> &mut SectionView {
        self.sections.entry(key.clone()).or_default()
    }

    fn conflicts(&self, candidate: &Slot) -> bool {
        self.sections
            .values()
            .flat_map(|v| v.reserved.iter())
            .any(|r| r.same_start(candidate))
    }

    fn record_peak(&mut self, key: &SectionKey) {
        let now = self.sections.get(key).map_or(0, |v| v.reserved.len());
        let peak = self.max_reserved.entry(key.clone()).or_default();
        *peak = (*peak).max(now);
    }
}

/// Booking pages held in memory.
///
/// A participant cannot hold two reservations with the same start: such a
/// slot is hidden from every listing and refused on reserve until the other
/// reservation is released.
pub struct FakeSource {
    inner: Mutex<Inner>,
    session_ok: AtomicBool,
    expire_next_fetch: AtomicBool,
}

impl Default for FakeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSource {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            session_ok: AtomicBool::new(true),
            expire_next_fetch: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn set_section(&self, page: &str, section: &str, available: Vec<Slot>, reserved: Vec<Slot>) {
        let key = (page.to_string(), section.to_string());
        let mut inner = self.lock();
        *inner.section(&key) = SectionView { available, reserved };
        inner.record_peak(&key);
    }

    pub fn add_available(&self, page: &str, section: &str, slot: Slot) {
        let key = (page.to_string(), section.to_string());
        self.lock().section(&key).available.push(slot);
    }

    /// Every fetch of this section adds one more bookable slot.
    pub fn fresh_slots(&self, page: &str, section: &str) {
        self.lock().fresh.insert((page.to_string(), section.to_string()));
    }

    pub fn refuse_reserve(&self, action: &str) {
        self.lock().refuse_reserve.insert(action.to_string());
    }

    pub fn refuse_release(&self, action: &str) {
        self.lock().refuse_release.insert(action.to_string());
    }

    pub fn break_fetch(&self, page: &str, section: &str) {
        self.lock()
            .broken_fetch
            .insert((page.to_string(), section.to_string()));
    }

    /// The session check reports a dead session until the next authenticate.
    pub fn invalidate_session(&self) {
        self.session_ok.store(false, Ordering::SeqCst);
    }

    /// The session check still passes but the next fetch finds the session gone.
    pub fn expire_on_next_fetch(&self) {
        self.expire_next_fetch.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn position(&self, call: &Call) -> Option<usize> {
        self.lock().calls.iter().position(|c| c == call)
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn reserved_in(&self, page: &str, section: &str) -> Vec<Slot> {
        self.lock()
            .sections
            .get(&(page.to_string(), section.to_string()))
            .map(|v| v.reserved.clone())
            .unwrap_or_default()
    }

    /// Highest number of simultaneous reservations ever seen in a section.
    pub fn peak_reserved(&self, page: &str, section: &str) -> usize {
        self.lock()
            .max_reserved
            .get(&(page.to_string(), section.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl SlotSource for FakeSource {
    async fn session_valid(&self) -> bool {
        self.session_ok.load(Ordering::SeqCst)
    }

    async fn authenticate(&self) -> Result<(), SourceError> {
        self.lock().calls.push(Call::Authenticate);
        self.session_ok.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch_section(&self, page: &PageRef, section: &str) -> Result<SectionView, SourceError> {
        tokio::task::yield_now().await;
        let key = (page.as_str().to_string(), section.to_string());
        let mut inner = self.lock();
        inner.calls.push(Call::Fetch {
            page: key.0.clone(),
            section: key.1.clone(),
        });
        if self.expire_next_fetch.swap(false, Ordering::SeqCst) {
            return Err(SourceError::SessionExpired);
        }
        if inner.broken_fetch.contains(&key) {
            return Err(SourceError::Http("connection reset".into()));
        }
        if inner.fresh.contains(&key) {
            inner.fresh_counter += 1;
            let n = inner.fresh_counter;
            let fresh = slot(
                &format!("2026-02-{:02}", n % 28 + 1),
                "10:00",
                &format!("fresh-{n}"),
            );
            inner.section(&key).available.push(fresh);
        }
        let view = inner.section(&key).clone();
        let available = view
            .available
            .into_iter()
            .filter(|s| !inner.conflicts(s))
            .collect();
        Ok(SectionView {
            available,
            reserved: view.reserved,
        })
    }

    async fn find_slot(&self, page: &PageRef, section: &str, like: &Slot) -> Result<Option<Slot>, SourceError> {
        tokio::task::yield_now().await;
        let key = (page.as_str().to_string(), section.to_string());
        let mut inner = self.lock();
        inner.calls.push(Call::Lookup {
            page: key.0.clone(),
            section: key.1.clone(),
            date: like.date.clone(),
        });
        if inner.broken_fetch.contains(&key) {
            return Err(SourceError::Http("connection reset".into()));
        }
        let found = inner
            .section(&key)
            .available
            .iter()
            .find(|s| s.same_start(like))
            .cloned();
        Ok(found.filter(|s| !inner.conflicts(s)))
    }

    async fn reserve(&self, action: &ActionRef) -> Result<bool, SourceError> {
        tokio::task::yield_now().await;
        let mut inner = self.lock();
        inner.calls.push(Call::Reserve(action.as_str().to_string()));
        if inner.refuse_reserve.contains(action.as_str()) {
            return Ok(false);
        }
        let found = inner.sections.iter().find_map(|(key, view)| {
            view.available
                .iter()
                .position(|s| s.action == *action)
                .map(|i| (key.clone(), i))
        });
        let Some((key, index)) = found else {
            return Ok(false);
        };
        let candidate = inner.sections[&key].available[index].clone();
        if inner.conflicts(&candidate) {
            return Ok(false);
        }
        let view = inner.section(&key);
        let mut booked = view.available.remove(index);
        booked.action = ActionRef::new(format!("{RELEASE_PREFIX}{}", action.as_str()));
        view.reserved.push(booked);
        inner.record_peak(&key);
        Ok(true)
    }

    async fn release(&self, action: &ActionRef) -> Result<bool, SourceError> {
        tokio::task::yield_now().await;
        let mut inner = self.lock();
        inner.calls.push(Call::Release(action.as_str().to_string()));
        if inner.refuse_release.contains(action.as_str()) {
            return Ok(false);
        }
        let found = inner.sections.iter().find_map(|(key, view)| {
            view.reserved
                .iter()
                .position(|s| s.action == *action)
                .map(|i| (key.clone(), i))
        });
        let Some((key, index)) = found else {
            return Ok(false);
        };
        let view = inner.section(&key);
        let mut freed = view.reserved.remove(index);
        let original = freed
            .action
            .as_str()
            .strip_prefix(RELEASE_PREFIX)
            .unwrap_or(freed.action.as_str())
            .to_string();
        freed.action = ActionRef::new(original);
        view.available.push(freed);
        Ok(true)
    }
}

/// Answers every question with a fixed script of replies, or not at all.
pub struct FakeChannel {
    correlator: Correlator,
    script: Vec<String>,
    prompts: Mutex<Vec<String>>,
}

impl FakeChannel {
    pub fn silent() -> Self {
        Self::replying(&[])
    }

    pub fn replying(replies: &[&str]) -> Self {
        Self {
            correlator: Correlator::new(),
            script: replies.iter().map(|r| r.to_string()).collect(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl InteractiveChannel for FakeChannel {
    async fn ask(&self, prompt: &str) -> Result<PendingQuestion, ChannelError> {
        let pending = self.correlator.open()?;
        self.prompts.lock().unwrap().push(prompt.to_string());
        for reply in &self.script {
            self.correlator.deliver(reply);
        }
        Ok(pending)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.sent.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<NoticeKind> {
        self.sent.lock().unwrap().iter().map(Notice::kind).collect()
    }

    pub fn count(&self, kind: NoticeKind) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notice: &Notice) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}

//! In-memory fakes for the source traits (testing only)
//!
//! Provides `MemoryTracker`, `StaticOrgSource`, `StaticCiSource`, and
//! `MemoryNotifier` that satisfy the trait contracts without any network.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use triage_core::{Bug, BugSet, CiPassRates, OrgDirectory};

use crate::ci::CiPassRateSource;
use crate::error::{SourceError, SourceResult};
use crate::org::OrgSource;
use crate::slack::ChatNotifier;
use crate::tracker::{BugQuery, BugUpdate, IssueTracker};

fn injected(body: String) -> SourceError {
    SourceError::Upstream {
        service: "fake",
        status: 503,
        body,
    }
}

fn take_failure(slot: &Mutex<Option<String>>) -> SourceResult<()> {
    match slot.lock().unwrap_or_else(PoisonError::into_inner).take() {
        Some(body) => Err(injected(body)),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// MemoryTracker
// ---------------------------------------------------------------------------

/// Issue tracker backed by a `BTreeMap<id, Bug>`.
#[derive(Debug, Default)]
pub struct MemoryTracker {
    bugs: Mutex<BTreeMap<u64, Bug>>,
    updates: Mutex<Vec<(u64, BugUpdate)>>,
    fail_next: Mutex<Option<String>>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bugs(bugs: Vec<Bug>) -> Self {
        let tracker = Self::new();
        tracker.set_bugs(bugs);
        tracker
    }

    /// Replace the whole bug population.
    pub fn set_bugs(&self, bugs: Vec<Bug>) {
        let mut store = self.bugs.lock().unwrap_or_else(PoisonError::into_inner);
        *store = bugs.into_iter().map(|b| (b.id, b)).collect();
    }

    /// Make the next call fail with an upstream error.
    pub fn fail_next(&self, body: &str) {
        *self.fail_next.lock().unwrap_or_else(PoisonError::into_inner) = Some(body.to_string());
    }

    /// Updates applied so far, oldest first.
    pub fn updates(&self) -> Vec<(u64, BugUpdate)> {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl IssueTracker for MemoryTracker {
    async fn search(&self, query: &BugQuery) -> SourceResult<BugSet> {
        take_failure(&self.fail_next)?;
        let store = self.bugs.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(BugSet::new(
            store.values().filter(|b| query.matches(b)).cloned().collect(),
        ))
    }

    async fn get_bug(&self, id: u64) -> SourceResult<Bug> {
        take_failure(&self.fail_next)?;
        let store = self.bugs.lock().unwrap_or_else(PoisonError::into_inner);
        store.get(&id).cloned().ok_or(SourceError::NotFound { id })
    }

    async fn update_bug(&self, id: u64, update: &BugUpdate) -> SourceResult<()> {
        take_failure(&self.fail_next)?;
        let mut store = self.bugs.lock().unwrap_or_else(PoisonError::into_inner);
        let bug = store.get_mut(&id).ok_or(SourceError::NotFound { id })?;
        update.apply_to(bug);
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, update.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StaticOrgSource
// ---------------------------------------------------------------------------

/// Org source returning a fixed directory until told otherwise.
#[derive(Debug)]
pub struct StaticOrgSource {
    directory: Mutex<OrgDirectory>,
    fail_next: Mutex<Option<String>>,
}

impl StaticOrgSource {
    pub fn new(directory: OrgDirectory) -> Self {
        StaticOrgSource {
            directory: Mutex::new(directory),
            fail_next: Mutex::new(None),
        }
    }

    pub fn set(&self, directory: OrgDirectory) {
        *self.directory.lock().unwrap_or_else(PoisonError::into_inner) = directory;
    }

    pub fn fail_next(&self, body: &str) {
        *self.fail_next.lock().unwrap_or_else(PoisonError::into_inner) = Some(body.to_string());
    }
}

#[async_trait]
impl OrgSource for StaticOrgSource {
    async fn load(&self) -> SourceResult<OrgDirectory> {
        take_failure(&self.fail_next)?;
        Ok(self
            .directory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

// ---------------------------------------------------------------------------
// StaticCiSource
// ---------------------------------------------------------------------------

/// CI source returning the same table for every release.
#[derive(Debug, Default)]
pub struct StaticCiSource {
    rates: Mutex<CiPassRates>,
    requested: Mutex<Vec<String>>,
}

impl StaticCiSource {
    pub fn new(rates: CiPassRates) -> Self {
        StaticCiSource {
            rates: Mutex::new(rates),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn set(&self, rates: CiPassRates) {
        *self.rates.lock().unwrap_or_else(PoisonError::into_inner) = rates;
    }

    /// Release versions asked for so far.
    pub fn requested(&self) -> Vec<String> {
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CiPassRateSource for StaticCiSource {
    async fn pass_rates(&self, version: &str) -> SourceResult<CiPassRates> {
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(version.to_string());
        Ok(self
            .rates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

// ---------------------------------------------------------------------------
// MemoryNotifier
// ---------------------------------------------------------------------------

/// Where a recorded message was addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    Channel(String),
    Email(String),
    Debug,
}

/// Notifier that records messages instead of sending them.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<(Recipient, String)>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(Recipient, String)> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn record(&self, to: Recipient, text: &str) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((to, text.to_string()));
    }
}

#[async_trait]
impl ChatNotifier for MemoryNotifier {
    async fn message_channel(&self, channel: &str, text: &str) -> SourceResult<()> {
        self.record(Recipient::Channel(channel.to_string()), text);
        Ok(())
    }

    async fn message_email(&self, email: &str, text: &str) -> SourceResult<()> {
        self.record(Recipient::Email(email.to_string()), text);
        Ok(())
    }

    async fn message_debug(&self, text: &str) -> SourceResult<()> {
        self.record(Recipient::Debug, text);
        Ok(())
    }
}

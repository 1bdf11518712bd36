use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::clock::Clock;
use crate::lifecycle::AppState;
use crate::notice::{Notice, PlatformError};
use crate::phone::{digits_only, tel_target};

/// Rolling history capacity
pub const HISTORY_CAPACITY: usize = 50;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DialError {
    #[error("Please enter a phone number")]
    InvalidInput,
    #[error("A call to {0} is still in progress")]
    SessionAlreadyOpen(String),
}

impl Serialize for DialError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<DialError> for Notice {
    fn from(e: DialError) -> Self {
        Notice::InvalidInput(e.to_string())
    }
}

/// Session lifecycle. Closed is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Open,
    Closed,
}

/// Where the dialed number came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ContactType {
    #[default]
    AdHoc,
    Contact,
    Lead,
}

/// Lookup reference to the contact or lead a call was placed from.
/// Not an owning copy: the record itself lives in its loader's collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PartyRef {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// What a dial request carries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DialTarget {
    pub number: String,
    pub contact_type: ContactType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party: Option<PartyRef>,
}

impl DialTarget {
    pub fn ad_hoc(number: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            contact_type: ContactType::AdHoc,
            party: None,
        }
    }
}

/// One dial-to-foreground interval, used as a proxy for a phone call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallSession {
    pub id: String,
    /// Digits only
    pub number: String,
    /// As entered or stored on the originating record
    pub dialed: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: u64,
    pub contact_type: ContactType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party: Option<PartyRef>,
}

impl CallSession {
    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }

    fn close(&mut self, at: DateTime<Utc>) {
        self.duration_secs = elapsed_secs(self.started_at, at);
        self.ended_at = Some(at);
        self.status = SessionStatus::Closed;
    }

    /// Close without crediting any call time.
    fn abandon(&mut self, at: DateTime<Utc>) {
        self.duration_secs = 0;
        self.ended_at = Some(at);
        self.status = SessionStatus::Closed;
    }
}

/// round((end - start) / 1000ms), never negative
pub fn elapsed_secs(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    let ms = (end - start).num_milliseconds();
    if ms <= 0 {
        0
    } else {
        (ms as f64 / 1000.0).round() as u64
    }
}

/// What to do when a dial arrives while a session is still open
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OpenSessionPolicy {
    /// Refuse the new dial; nothing changes.
    #[default]
    Reject,
    /// Close the open session with zero duration, then open the new one.
    Supersede,
}

/// Outbound dial collaborator. Accepts a `tel:<digits>` target.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn open(&self, target: &str) -> Result<(), PlatformError>;
}

/// Result of an accepted dial
#[derive(Debug, Clone)]
pub struct DialOutcome {
    pub session: CallSession,
    /// Set when the platform refused the `tel:` target. The session stays
    /// recorded, closed with zero duration.
    pub dialer_error: Option<PlatformError>,
}

/// Call session state machine over a newest-first rolling history.
pub struct CallSessionTracker {
    history: Mutex<VecDeque<CallSession>>,
    capacity: usize,
    policy: OpenSessionPolicy,
    clock: Arc<dyn Clock>,
    dialer: Arc<dyn Dialer>,
}

impl CallSessionTracker {
    pub fn new(clock: Arc<dyn Clock>, dialer: Arc<dyn Dialer>) -> Self {
        Self::with_policy(clock, dialer, HISTORY_CAPACITY, OpenSessionPolicy::default())
    }

    pub fn with_policy(
        clock: Arc<dyn Clock>,
        dialer: Arc<dyn Dialer>,
        capacity: usize,
        policy: OpenSessionPolicy,
    ) -> Self {
        Self {
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            policy,
            clock,
            dialer,
        }
    }

    /// Open a session for `target` and ask the platform to place the call.
    ///
    /// Blank or digit-less numbers are rejected before any state changes.
    pub async fn dial(&self, target: DialTarget) -> Result<DialOutcome, DialError> {
        let number = digits_only(&target.number);
        if number.is_empty() {
            debug!(input = %target.number, "Rejected dial with no digits");
            return Err(DialError::InvalidInput);
        }

        let session = {
            let mut history = self.history.lock();
            let now = self.clock.now();

            if let Some(open) = history.iter_mut().find(|s| s.is_open()) {
                match self.policy {
                    OpenSessionPolicy::Reject => {
                        return Err(DialError::SessionAlreadyOpen(open.number.clone()));
                    }
                    OpenSessionPolicy::Supersede => {
                        info!(session_id = %open.id, "Superseding open session");
                        open.abandon(now);
                    }
                }
            }

            let session = CallSession {
                id: Ulid::new().to_string(),
                number,
                dialed: target.number,
                status: SessionStatus::Open,
                started_at: now,
                ended_at: None,
                duration_secs: 0,
                contact_type: target.contact_type,
                party: target.party,
            };
            history.push_front(session.clone());
            while history.len() > self.capacity {
                if let Some(evicted) = history.pop_back() {
                    debug!(session_id = %evicted.id, "Evicted oldest session");
                }
            }
            session
        };

        info!(session_id = %session.id, number = %session.number, "Call session opened");

        match self.dialer.open(&tel_target(&session.number)).await {
            Ok(()) => Ok(DialOutcome { session, dialer_error: None }),
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Dialer refused target");
                // A refused dial never backgrounds the app; close it here.
                let session = self.abandon_session(session);
                Ok(DialOutcome { session, dialer_error: Some(e) })
            }
        }
    }

    /// Close `session` in place with zero duration if it is still open.
    fn abandon_session(&self, mut session: CallSession) -> CallSession {
        let now = self.clock.now();
        let mut history = self.history.lock();
        if let Some(entry) = history.iter_mut().find(|s| s.id == session.id) {
            if entry.is_open() {
                entry.abandon(now);
            }
            session = entry.clone();
        }
        session
    }

    /// Lifecycle hook. A background -> active transition closes the head of
    /// history if it is open; every other transition is ignored.
    pub fn on_transition(&self, previous: AppState, next: AppState) -> Option<CallSession> {
        if previous != AppState::Background || next != AppState::Active {
            return None;
        }
        let mut history = self.history.lock();
        let head = history.front_mut()?;
        if !head.is_open() {
            return None;
        }
        head.close(self.clock.now());
        info!(session_id = %head.id, duration_secs = head.duration_secs, "Call session closed");
        Some(head.clone())
    }

    /// Snapshot, newest first
    pub fn history(&self) -> Vec<CallSession> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn open_session(&self) -> Option<CallSession> {
        self.history.lock().iter().find(|s| s.is_open()).cloned()
    }

    pub fn len(&self) -> usize {
        self.history.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;

    /// Records every target; optionally refuses them all.
    #[derive(Default)]
    pub(crate) struct FakeDialer {
        pub targets: Mutex<Vec<String>>,
        pub fail: bool,
    }

    #[async_trait]
    impl Dialer for FakeDialer {
        async fn open(&self, target: &str) -> Result<(), PlatformError> {
            self.targets.lock().push(target.to_string());
            if self.fail {
                Err(PlatformError::ReadFailed("no handler for tel:".into()))
            } else {
                Ok(())
            }
        }
    }

    fn tracker(policy: OpenSessionPolicy) -> (CallSessionTracker, Arc<ManualClock>, Arc<FakeDialer>) {
        let clock = Arc::new(ManualClock::default());
        let dialer = Arc::new(FakeDialer::default());
        let tracker = CallSessionTracker::with_policy(clock.clone(), dialer.clone(), HISTORY_CAPACITY, policy);
        (tracker, clock, dialer)
    }

    #[tokio::test]
    async fn test_dial_then_foreground_after_42_seconds() {
        let (tracker, clock, dialer) = tracker(OpenSessionPolicy::Reject);
        let started = clock.now();

        let outcome = tracker.dial(DialTarget::ad_hoc("555-1234")).await.unwrap();
        assert!(outcome.dialer_error.is_none());

        let history = tracker.history();
        let head = &history[0];
        assert_eq!(head.number, "5551234");
        assert_eq!(head.status, SessionStatus::Open);
        assert_eq!(head.started_at, started);
        assert_eq!(*dialer.targets.lock(), vec!["tel:5551234".to_string()]);

        clock.advance(Duration::seconds(42));
        let closed = tracker.on_transition(AppState::Background, AppState::Active).unwrap();
        assert_eq!(closed.status, SessionStatus::Closed);
        assert_eq!(closed.duration_secs, 42);

        let history = tracker.history();
        let head = &history[0];
        assert_eq!(head.status, SessionStatus::Closed);
        assert_eq!(head.duration_secs, 42);
        assert!(head.ended_at.unwrap() >= head.started_at);
    }

    #[tokio::test]
    async fn test_blank_number_changes_nothing() {
        let (tracker, _clock, dialer) = tracker(OpenSessionPolicy::Reject);
        assert_eq!(tracker.dial(DialTarget::ad_hoc("")).await.unwrap_err(), DialError::InvalidInput);
        assert_eq!(tracker.dial(DialTarget::ad_hoc("   ")).await.unwrap_err(), DialError::InvalidInput);
        assert!(tracker.is_empty());
        assert!(dialer.targets.lock().is_empty());
    }

    #[tokio::test]
    async fn test_dialer_failure_keeps_session() {
        let clock = Arc::new(ManualClock::default());
        let dialer = Arc::new(FakeDialer { fail: true, ..Default::default() });
        let tracker = CallSessionTracker::new(clock, dialer);

        let outcome = tracker.dial(DialTarget::ad_hoc("5551234567")).await.unwrap();
        assert!(outcome.dialer_error.is_some());
        assert_eq!(outcome.session.status, SessionStatus::Closed);
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.history()[0].duration_secs, 0);
        assert!(tracker.open_session().is_none());
    }

    #[tokio::test]
    async fn test_dial_after_refused_dial_is_accepted() {
        let clock = Arc::new(ManualClock::default());
        let dialer = Arc::new(FakeDialer { fail: true, ..Default::default() });
        let tracker = CallSessionTracker::new(clock.clone(), dialer.clone());

        tracker.dial(DialTarget::ad_hoc("5551234567")).await.unwrap();
        clock.advance(Duration::seconds(3));
        let second = tracker.dial(DialTarget::ad_hoc("5559999999")).await.unwrap();

        assert_eq!(second.session.number, "5559999999");
        let history = tracker.history();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|s| s.status == SessionStatus::Closed && s.duration_secs == 0));
        assert_eq!(dialer.targets.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_only_background_to_active_closes() {
        let (tracker, clock, _dialer) = tracker(OpenSessionPolicy::Reject);
        tracker.dial(DialTarget::ad_hoc("5551234")).await.unwrap();
        clock.advance(Duration::seconds(5));

        assert!(tracker.on_transition(AppState::Active, AppState::Background).is_none());
        assert!(tracker.on_transition(AppState::Inactive, AppState::Active).is_none());
        assert!(tracker.open_session().is_some());

        assert!(tracker.on_transition(AppState::Background, AppState::Active).is_some());
        // Closed is terminal
        clock.advance(Duration::seconds(5));
        assert!(tracker.on_transition(AppState::Background, AppState::Active).is_none());
        assert_eq!(tracker.history()[0].duration_secs, 5);
    }

    #[tokio::test]
    async fn test_reject_policy_refuses_second_open_dial() {
        let (tracker, _clock, dialer) = tracker(OpenSessionPolicy::Reject);
        tracker.dial(DialTarget::ad_hoc("5551234")).await.unwrap();
        let err = tracker.dial(DialTarget::ad_hoc("5559999")).await.unwrap_err();
        assert_eq!(err, DialError::SessionAlreadyOpen("5551234".into()));
        assert_eq!(tracker.len(), 1);
        assert_eq!(dialer.targets.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_supersede_policy_keeps_single_open_session() {
        let (tracker, clock, _dialer) = tracker(OpenSessionPolicy::Supersede);
        tracker.dial(DialTarget::ad_hoc("5551234")).await.unwrap();
        clock.advance(Duration::seconds(30));
        tracker.dial(DialTarget::ad_hoc("5559999")).await.unwrap();

        let history = tracker.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().filter(|s| s.is_open()).count(), 1);
        assert_eq!(history[0].number, "5559999");
        assert_eq!(history[1].status, SessionStatus::Closed);
        assert_eq!(history[1].duration_secs, 0);
    }

    #[tokio::test]
    async fn test_history_capped_oldest_evicted_first() {
        let (tracker, clock, _dialer) = tracker(OpenSessionPolicy::Reject);
        for i in 0..(HISTORY_CAPACITY + 10) {
            tracker.dial(DialTarget::ad_hoc(format!("555{:04}", i))).await.unwrap();
            clock.advance(Duration::seconds(1));
            tracker.on_transition(AppState::Background, AppState::Active);
            assert!(tracker.len() <= HISTORY_CAPACITY);
        }
        let history = tracker.history();
        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history[0].number, format!("555{:04}", HISTORY_CAPACITY + 9));
        assert_eq!(history[HISTORY_CAPACITY - 1].number, "5550010");
    }

    #[test]
    fn test_elapsed_secs_rounds_and_clamps() {
        let start = Utc::now();
        assert_eq!(elapsed_secs(start, start + Duration::milliseconds(1499)), 1);
        assert_eq!(elapsed_secs(start, start + Duration::milliseconds(1500)), 2);
        assert_eq!(elapsed_secs(start, start - Duration::seconds(3)), 0);
    }
}

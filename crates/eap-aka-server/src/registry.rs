//! Concurrent session registry with per-session expiry timers
//!
//! Sessions live in a `DashMap` keyed by session ID. Each entry is a slot
//! owning a `tokio::sync::Mutex<Session>` that serializes every request for
//! that ID, plus a single cancellable eviction timer tagged with the
//! [`TimerClass`] that armed it. Arming a timer supersedes the previous one.
//!
//! Timer eviction never waits for the session lock: the slot is marked
//! evicted and unlinked from the map. A request still holding the lock sees
//! [`SessionGuard::is_evicted`] and must treat the session as absent.

use dashmap::DashMap;
use eap_aka_proto::{AkaMethod, EapPacket};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Protocol state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Created, nothing sent yet
    Start,
    /// AKA-Identity request sent, waiting for the permanent identity
    IdentityRequested,
    /// AKA-Challenge sent, waiting for the response
    ChallengeIssued,
    /// EAP Success sent; retransmitted responses are re-acknowledged
    Authenticated,
    /// Failure Notification sent, waiting for the peer to close
    FailureNotified,
}

impl SessionState {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Authenticated | SessionState::FailureNotified)
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, next: &SessionState) -> bool {
        match (self, next) {
            // From Start
            (SessionState::Start, SessionState::IdentityRequested) => true,
            (SessionState::Start, SessionState::ChallengeIssued) => true, // permanent identity up front
            (SessionState::Start, SessionState::FailureNotified) => true,

            // From IdentityRequested
            (SessionState::IdentityRequested, SessionState::IdentityRequested) => true, // Nak restart
            (SessionState::IdentityRequested, SessionState::ChallengeIssued) => true,
            (SessionState::IdentityRequested, SessionState::FailureNotified) => true,

            // From ChallengeIssued
            (SessionState::ChallengeIssued, SessionState::Authenticated) => true,
            (SessionState::ChallengeIssued, SessionState::FailureNotified) => true,

            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Start => "start",
            SessionState::IdentityRequested => "identity_requested",
            SessionState::ChallengeIssued => "challenge_issued",
            SessionState::Authenticated => "authenticated",
            SessionState::FailureNotified => "failure_notified",
        }
    }
}

/// Which policy armed a session's eviction timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerClass {
    /// Waiting for the Challenge response
    Challenge,
    /// Waiting for closure after a failure Notification
    ErrorNotification,
    /// Unauthenticated session lifetime
    Session,
    /// Hold time after success
    SessionAuthenticated,
}

impl TimerClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerClass::Challenge => "challenge",
            TimerClass::ErrorNotification => "error_notification",
            TimerClass::Session => "session",
            TimerClass::SessionAuthenticated => "session_authenticated",
        }
    }
}

impl std::fmt::Display for TimerClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Invalid session transition: {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}

/// Challenge issued to the peer and not yet confirmed
#[derive(Clone)]
pub struct PendingChallenge {
    pub rand: [u8; 16],
    pub autn: [u8; 16],
    pub xres: Vec<u8>,
    /// AT_MAC key for this exchange
    pub k_aut: Vec<u8>,
    /// MSK derived when the challenge was built
    pub msk: [u8; 64],
    pub msisdn: Option<String>,
}

impl std::fmt::Debug for PendingChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingChallenge")
            .field("rand", &hex::encode(self.rand))
            .field("msisdn", &self.msisdn)
            .finish_non_exhaustive()
    }
}

/// Per-subscriber authentication session
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub state: SessionState,
    /// Negotiated method
    pub method: Option<AkaMethod>,
    /// Permanent identity once learned
    pub identity: Option<String>,
    pub imsi: Option<String>,
    pub challenge: Option<PendingChallenge>,
    /// Exact Success reply, kept for retransmission
    pub success_packet: Option<EapPacket>,
    /// Last packet received from the peer
    pub last_response: Option<EapPacket>,
    /// Last packet sent (for retransmission)
    pub last_request: Option<EapPacket>,
    pub created_at: Instant,
    pub last_transition_at: Instant,
}

impl Session {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Instant::now();
        Session {
            session_id: session_id.into(),
            state: SessionState::Start,
            method: None,
            identity: None,
            imsi: None,
            challenge: None,
            success_packet: None,
            last_response: None,
            last_request: None,
            created_at: now,
            last_transition_at: now,
        }
    }

    /// Transition to a new state
    pub fn transition(&mut self, next: SessionState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(&next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.last_transition_at = Instant::now();
        Ok(())
    }

    /// Discard all progress and start over
    pub fn reset(&mut self) {
        *self = Session::new(std::mem::take(&mut self.session_id));
    }

    /// Get session age
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

#[derive(Default)]
struct TimerState {
    generation: u64,
    class: Option<TimerClass>,
    handle: Option<JoinHandle<()>>,
}

struct SessionSlot {
    session: Arc<AsyncMutex<Session>>,
    evicted: AtomicBool,
    timer: Mutex<TimerState>,
}

impl SessionSlot {
    fn new(session_id: &str) -> Self {
        SessionSlot {
            session: Arc::new(AsyncMutex::new(Session::new(session_id))),
            evicted: AtomicBool::new(false),
            timer: Mutex::new(TimerState::default()),
        }
    }

    fn timer(&self) -> std::sync::MutexGuard<'_, TimerState> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel_timer(&self) {
        let mut timer = self.timer();
        timer.generation += 1;
        timer.class = None;
        if let Some(handle) = timer.handle.take() {
            handle.abort();
        }
    }
}

/// Called with the session ID and timer class after a timer evicts a session
pub type EvictionListener = Arc<dyn Fn(&str, TimerClass) + Send + Sync>;

struct RegistryInner {
    sessions: DashMap<String, Arc<SessionSlot>>,
    evictions: AtomicU64,
    listener: RwLock<Option<EvictionListener>>,
}

impl RegistryInner {
    fn unlink(&self, session_id: &str, slot: &Arc<SessionSlot>) -> bool {
        slot.evicted.store(true, Ordering::SeqCst);
        self.sessions
            .remove_if(session_id, |_, current| Arc::ptr_eq(current, slot))
            .is_some()
    }

    fn arm(
        self: &Arc<Self>,
        session_id: &str,
        slot: &Arc<SessionSlot>,
        class: TimerClass,
        duration: Duration,
    ) -> bool {
        if slot.evicted.load(Ordering::SeqCst) {
            return false;
        }

        let mut timer = slot.timer();
        timer.generation += 1;
        let generation = timer.generation;
        if let Some(previous) = timer.handle.take() {
            previous.abort();
        }

        let registry = Arc::downgrade(self);
        let weak_slot = Arc::downgrade(slot);
        let id = session_id.to_string();
        timer.class = Some(class);
        timer.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            Self::expire(registry, weak_slot, &id, class, generation);
        }));

        debug!(
            session_id = %session_id,
            class = %class,
            timeout_ms = duration.as_millis() as u64,
            "Session timer armed"
        );
        true
    }

    fn expire(
        registry: Weak<Self>,
        slot: Weak<SessionSlot>,
        session_id: &str,
        class: TimerClass,
        generation: u64,
    ) {
        let (Some(inner), Some(slot)) = (registry.upgrade(), slot.upgrade()) else {
            return;
        };

        {
            let mut timer = slot.timer();
            // Superseded by a later arm or cancel
            if timer.generation != generation {
                return;
            }
            timer.class = None;
            timer.handle = None;
        }

        if inner.unlink(session_id, &slot) {
            inner.evictions.fetch_add(1, Ordering::Relaxed);
            info!(session_id = %session_id, class = %class, "Session evicted by timer");

            let listener = inner
                .listener
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(listener) = listener {
                listener(session_id, class);
            }
        }
    }
}

/// Exclusive access to one session for the duration of a request
pub struct SessionGuard {
    registry: Arc<RegistryInner>,
    slot: Arc<SessionSlot>,
    session: OwnedMutexGuard<Session>,
}

impl SessionGuard {
    /// Whether a timer or removal evicted this session while it was held
    pub fn is_evicted(&self) -> bool {
        self.slot.evicted.load(Ordering::SeqCst)
    }

    /// Arm this session's timer, replacing any armed one
    ///
    /// Returns false if the session has been evicted.
    pub fn arm_timer(&self, class: TimerClass, duration: Duration) -> bool {
        let session_id = self.session.session_id.clone();
        self.registry.arm(&session_id, &self.slot, class, duration)
    }

    /// Class of the currently armed timer
    pub fn timer_class(&self) -> Option<TimerClass> {
        self.slot.timer().class
    }

    /// Remove this session from the registry
    pub fn remove(&self) -> bool {
        self.slot.cancel_timer();
        self.registry.unlink(&self.session.session_id, &self.slot)
    }
}

impl Deref for SessionGuard {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}

/// Session statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub total: usize,
    pub start: usize,
    pub identity_requested: usize,
    pub challenge_issued: usize,
    pub authenticated: usize,
    pub failure_notified: usize,
    /// Sessions locked by an in-flight request when sampled
    pub busy: usize,
    /// Sessions evicted by timers since startup
    pub evicted: u64,
}

/// Thread-safe session table
///
/// Cloning is cheap; clones share the same table.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        SessionRegistry {
            inner: Arc::new(RegistryInner {
                sessions: DashMap::new(),
                evictions: AtomicU64::new(0),
                listener: RwLock::new(None),
            }),
        }
    }

    /// Register a callback run after every timer eviction
    pub fn set_eviction_listener(&self, listener: EvictionListener) {
        *self
            .inner
            .listener
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    fn slot(&self, session_id: &str) -> Option<Arc<SessionSlot>> {
        self.inner
            .sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    fn guard(&self, slot: Arc<SessionSlot>, session: OwnedMutexGuard<Session>) -> SessionGuard {
        SessionGuard {
            registry: Arc::clone(&self.inner),
            slot,
            session,
        }
    }

    /// Lock the session, creating it in `Start` if absent
    ///
    /// Waits for any in-flight request on the same ID. If the session is
    /// evicted while waiting, a fresh one is created.
    pub async fn get_or_create(&self, session_id: &str) -> SessionGuard {
        loop {
            let slot = Arc::clone(
                self.inner
                    .sessions
                    .entry(session_id.to_string())
                    .or_insert_with(|| Arc::new(SessionSlot::new(session_id)))
                    .value(),
            );
            let session = Arc::clone(&slot.session).lock_owned().await;
            if slot.evicted.load(Ordering::SeqCst) {
                continue;
            }
            return self.guard(slot, session);
        }
    }

    /// Lock an existing session
    pub async fn lock(&self, session_id: &str) -> Option<SessionGuard> {
        let slot = self.slot(session_id)?;
        let session = Arc::clone(&slot.session).lock_owned().await;
        if slot.evicted.load(Ordering::SeqCst) {
            return None;
        }
        Some(self.guard(slot, session))
    }

    /// Atomic read-modify-write of an existing session
    pub async fn update<R>(&self, session_id: &str, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let mut guard = self.lock(session_id).await?;
        Some(f(&mut guard))
    }

    /// Remove a session and cancel its timer
    pub fn remove(&self, session_id: &str) -> bool {
        match self.slot(session_id) {
            Some(slot) => {
                slot.cancel_timer();
                self.inner.unlink(session_id, &slot)
            }
            None => false,
        }
    }

    /// (Re)schedule eviction of a session after `duration`
    ///
    /// Supersedes any timer previously armed for the session. Returns false
    /// if no such session exists.
    pub fn arm_timer(&self, session_id: &str, class: TimerClass, duration: Duration) -> bool {
        match self.slot(session_id) {
            Some(slot) => self.inner.arm(session_id, &slot, class, duration),
            None => false,
        }
    }

    /// Class of the timer currently armed for a session
    pub fn timer_class(&self, session_id: &str) -> Option<TimerClass> {
        self.slot(session_id).and_then(|slot| slot.timer().class)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.inner.sessions.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.inner.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.sessions.is_empty()
    }

    /// Get statistics about sessions
    pub fn stats(&self) -> SessionStats {
        let mut stats = SessionStats {
            evicted: self.inner.evictions.load(Ordering::Relaxed),
            ..SessionStats::default()
        };

        for entry in self.inner.sessions.iter() {
            stats.total += 1;
            let Ok(session) = entry.value().session.try_lock() else {
                stats.busy += 1;
                continue;
            };
            match session.state {
                SessionState::Start => stats.start += 1,
                SessionState::IdentityRequested => stats.identity_requested += 1,
                SessionState::ChallengeIssued => stats.challenge_issued += 1,
                SessionState::Authenticated => stats.authenticated += 1,
                SessionState::FailureNotified => stats.failure_notified += 1,
            }
        }

        stats
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_state_transitions() {
        use SessionState::*;
        assert!(Start.can_transition_to(&IdentityRequested));
        assert!(Start.can_transition_to(&ChallengeIssued));
        assert!(IdentityRequested.can_transition_to(&IdentityRequested));
        assert!(ChallengeIssued.can_transition_to(&Authenticated));
        assert!(ChallengeIssued.can_transition_to(&FailureNotified));
        assert!(!Start.can_transition_to(&Authenticated));
        assert!(!IdentityRequested.can_transition_to(&Authenticated));
        assert!(!Authenticated.can_transition_to(&ChallengeIssued));
        assert!(!FailureNotified.can_transition_to(&IdentityRequested));
        assert!(Authenticated.is_terminal());
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        use SessionState::*;
        let all = [Start, IdentityRequested, ChallengeIssued, Authenticated, FailureNotified];
        for from in all.iter().filter(|s| s.is_terminal()) {
            for to in &all {
                assert!(!from.can_transition_to(to), "{:?} -> {:?}", from, to);
            }
        }
    }

    #[test]
    fn test_session_transition_rejects_illegal() {
        let mut session = Session::new("s1");
        assert!(session.transition(SessionState::IdentityRequested).is_ok());
        let err = session.transition(SessionState::Authenticated).unwrap_err();
        assert_eq!(err.from, SessionState::IdentityRequested);
        assert_eq!(session.state, SessionState::IdentityRequested);

        session.reset();
        assert_eq!(session.state, SessionState::Start);
        assert_eq!(session.session_id, "s1");
    }

    #[tokio::test]
    async fn test_get_or_create_and_remove() {
        let registry = SessionRegistry::new();
        assert!(registry.is_empty());

        {
            let mut guard = registry.get_or_create("s1").await;
            assert_eq!(guard.state, SessionState::Start);
            guard.transition(SessionState::IdentityRequested).unwrap();
        }

        assert!(registry.contains("s1"));
        assert_eq!(registry.len(), 1);
        let state = registry.update("s1", |s| s.state).await;
        assert_eq!(state, Some(SessionState::IdentityRequested));

        assert!(registry.remove("s1"));
        assert!(!registry.remove("s1"));
        assert!(registry.lock("s1").await.is_none());
        assert!(registry.update("s1", |s| s.state).await.is_none());
    }

    #[tokio::test]
    async fn test_timer_evicts_session() {
        let registry = SessionRegistry::new();
        drop(registry.get_or_create("s1").await);

        assert!(registry.arm_timer("s1", TimerClass::Session, Duration::from_millis(30)));
        assert_eq!(registry.timer_class("s1"), Some(TimerClass::Session));
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(!registry.contains("s1"));
        assert_eq!(registry.stats().evicted, 1);
        assert!(!registry.arm_timer("s1", TimerClass::Session, Duration::from_millis(30)));
    }

    #[tokio::test]
    async fn test_rearm_supersedes_previous_timer() {
        let registry = SessionRegistry::new();
        drop(registry.get_or_create("s1").await);

        registry.arm_timer("s1", TimerClass::Session, Duration::from_millis(40));
        registry.arm_timer("s1", TimerClass::Challenge, Duration::from_millis(400));
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(registry.contains("s1"));
        assert_eq!(registry.timer_class("s1"), Some(TimerClass::Challenge));
    }

    #[tokio::test]
    async fn test_eviction_while_locked() {
        let registry = SessionRegistry::new();
        let guard = registry.get_or_create("s1").await;
        assert!(guard.arm_timer(TimerClass::Challenge, Duration::from_millis(20)));

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(guard.is_evicted());
        assert!(!registry.contains("s1"));
        assert!(!guard.arm_timer(TimerClass::Challenge, Duration::from_millis(20)));
        drop(guard);

        // A reused ID starts fresh
        let guard = registry.get_or_create("s1").await;
        assert!(!guard.is_evicted());
        assert_eq!(guard.state, SessionState::Start);
    }

    #[tokio::test]
    async fn test_remove_cancels_timer() {
        let registry = SessionRegistry::new();
        drop(registry.get_or_create("s1").await);
        registry.arm_timer("s1", TimerClass::Session, Duration::from_millis(30));
        assert!(registry.remove("s1"));

        drop(registry.get_or_create("s1").await);
        tokio::time::sleep(Duration::from_millis(120)).await;
        // The old timer must not evict the new session
        assert!(registry.contains("s1"));
        assert_eq!(registry.stats().evicted, 0);
    }

    #[tokio::test]
    async fn test_eviction_listener() {
        let registry = SessionRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        registry.set_eviction_listener(Arc::new(move |id, class| {
            assert_eq!(id, "s1");
            assert_eq!(class, TimerClass::ErrorNotification);
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        drop(registry.get_or_create("s1").await);
        registry.arm_timer("s1", TimerClass::ErrorNotification, Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_requests_serialize_per_session() {
        let registry = SessionRegistry::new();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let mut guard = registry.get_or_create("shared").await;
                let before = guard.state;
                tokio::time::sleep(Duration::from_millis(2)).await;
                if before == SessionState::Start {
                    guard.transition(SessionState::IdentityRequested).unwrap();
                    true
                } else {
                    false
                }
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_stats() {
        let registry = SessionRegistry::new();
        drop(registry.get_or_create("a").await);
        {
            let mut guard = registry.get_or_create("b").await;
            guard.transition(SessionState::IdentityRequested).unwrap();
        }
        let _held = registry.get_or_create("c").await;

        let stats = registry.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.start, 1);
        assert_eq!(stats.identity_requested, 1);
        assert_eq!(stats.busy, 1);
    }
}

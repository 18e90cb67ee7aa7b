//! EAP-AKA / EAP-AKA' protocol state machine
//!
//! [`AkaEngine`] consumes decoded EAP responses for a session ID and
//! produces the next EAP packet to send. It owns no transport: callers pass
//! packets in and write the returned [`Reply`] out.
//!
//! # Flow
//!
//! ```text
//! Response/Identity ──► [permanent id?] ──no──► AKA-Identity request   (IdentityRequested)
//!                              │
//!                             yes
//!                              ▼
//! AKA-Identity response ─► PLMN check ─► vector fetch ─► AKA-Challenge (ChallengeIssued)
//!                              │              │
//!                              └── failure ───┴──────► AKA-Notification (FailureNotified)
//!
//! AKA-Challenge response ─► AT_MAC + AT_RES ok ─► EAP Success          (Authenticated)
//! ```
//!
//! Every failure resolves to a well-formed EAP packet; only undecodable
//! input is returned as an error, and it never touches session state.

use eap_aka_proto::aka::{
    challenge_request, identity_request, notification, notification_request,
};
use eap_aka_proto::keys::verify_equal;
use eap_aka_proto::{
    AkaMessage, AkaMethod, AttributeType, EapCode, EapError, EapPacket, EapType, KeyError,
    MppeError, MppeKeys, SessionKeys, Subtype,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::audit::{AuditEntry, AuditEventType, AuditLogger};
use crate::config::Config;
use crate::plmn::{imsi_from_identity, PlmnFilter};
use crate::registry::{
    InvalidTransition, PendingChallenge, Session, SessionGuard, SessionRegistry, SessionState,
    TimerClass,
};
use crate::vector::{VectorError, VectorSource};

/// Engine errors
///
/// Only `MalformedPacket` and `UnexpectedMessage` for non-response packets
/// are returned to the caller; every other variant is resolved into an EAP
/// reply and surfaces in logs and the audit trail.
#[derive(Debug, Error)]
pub enum AkaError {
    #[error("Malformed packet: {0}")]
    MalformedPacket(#[from] EapError),

    #[error("Unsupported EAP method: {0}")]
    UnsupportedMethod(u8),

    #[error("Identity mismatch: {0}")]
    IdentityMismatch(String),

    #[error("PLMN rejected for IMSI {0}")]
    PlmnRejected(String),

    #[error("Vector source unavailable: {0}")]
    VectorSourceUnavailable(#[from] VectorError),

    #[error("Session expired or unknown: {0}")]
    SessionExpired(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(#[from] KeyError),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

impl AkaError {
    fn audit_event(&self) -> AuditEventType {
        match self {
            AkaError::PlmnRejected(_) => AuditEventType::PlmnRejected,
            AkaError::VectorSourceUnavailable(_) => AuditEventType::VectorFetchFailed,
            _ => AuditEventType::AuthFailure,
        }
    }
}

/// Outcome of a successful authentication
#[derive(Clone)]
pub struct SuccessContext {
    pub imsi: String,
    pub msisdn: Option<String>,
    pub method: AkaMethod,
    pub msk: [u8; 64],
}

impl SuccessContext {
    /// Wrap the MSK as MS-MPPE-Recv-Key / MS-MPPE-Send-Key values
    pub fn mppe_keys(
        &self,
        request_authenticator: &[u8; 16],
        secret: &[u8],
    ) -> Result<MppeKeys, MppeError> {
        MppeKeys::from_msk(&self.msk, request_authenticator, secret)
    }
}

impl std::fmt::Debug for SuccessContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuccessContext")
            .field("imsi", &self.imsi)
            .field("msisdn", &self.msisdn)
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

/// Packet to send back, plus key material when it is an EAP Success
#[derive(Debug, Clone)]
pub struct Reply {
    pub packet: EapPacket,
    pub success: Option<SuccessContext>,
}

impl Reply {
    fn new(packet: EapPacket) -> Self {
        Reply {
            packet,
            success: None,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.packet.to_bytes()
    }

    pub fn is_success(&self) -> bool {
        self.packet.code == EapCode::Success
    }
}

/// Timer durations in milliseconds, adjustable at runtime
struct Timeouts {
    challenge: AtomicU64,
    error_notification: AtomicU64,
    session: AtomicU64,
    session_authenticated: AtomicU64,
}

fn load(value: &AtomicU64) -> Duration {
    Duration::from_millis(value.load(Ordering::Relaxed))
}

fn store(value: &AtomicU64, duration: Duration) {
    let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    value.store(millis, Ordering::Relaxed);
}

/// EAP-AKA / EAP-AKA' authenticator
pub struct AkaEngine {
    registry: SessionRegistry,
    vectors: Arc<dyn VectorSource>,
    plmn: PlmnFilter,
    /// Enabled methods in server preference order
    methods: Vec<AkaMethod>,
    network_name: String,
    timeouts: Timeouts,
    audit: Arc<AuditLogger>,
}

impl AkaEngine {
    pub fn new(config: &Config, registry: SessionRegistry, vectors: Arc<dyn VectorSource>) -> Self {
        let mut methods = config.enabled_methods();
        if methods.is_empty() {
            methods.push(AkaMethod::Aka);
        }

        let timeouts = &config.timeouts;
        AkaEngine {
            registry,
            vectors,
            plmn: PlmnFilter::new(config.plmn_ids.clone()),
            methods,
            network_name: config.access_network_name.clone(),
            timeouts: Timeouts {
                challenge: AtomicU64::new(timeouts.challenge_ms),
                error_notification: AtomicU64::new(timeouts.error_notification_ms),
                session: AtomicU64::new(timeouts.session_ms),
                session_authenticated: AtomicU64::new(timeouts.session_authenticated_ms),
            },
            audit: Arc::new(AuditLogger::disabled()),
        }
    }

    /// Record audit events, including timer evictions, to `audit`
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        let listener_audit = Arc::clone(&audit);
        self.registry
            .set_eviction_listener(Arc::new(move |session_id: &str, class: TimerClass| {
                let audit = Arc::clone(&listener_audit);
                let entry = AuditEntry::new(AuditEventType::SessionEvicted)
                    .with_session_id(session_id)
                    .with_details(format!("{} timeout", class));
                tokio::spawn(async move { audit.log(entry).await });
            }));
        self.audit = audit;
        self
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn methods(&self) -> &[AkaMethod] {
        &self.methods
    }

    pub fn challenge_timeout(&self) -> Duration {
        load(&self.timeouts.challenge)
    }

    pub fn set_challenge_timeout(&self, timeout: Duration) {
        store(&self.timeouts.challenge, timeout);
    }

    pub fn error_notification_timeout(&self) -> Duration {
        load(&self.timeouts.error_notification)
    }

    pub fn set_error_notification_timeout(&self, timeout: Duration) {
        store(&self.timeouts.error_notification, timeout);
    }

    pub fn session_timeout(&self) -> Duration {
        load(&self.timeouts.session)
    }

    pub fn set_session_timeout(&self, timeout: Duration) {
        store(&self.timeouts.session, timeout);
    }

    pub fn session_authenticated_timeout(&self) -> Duration {
        load(&self.timeouts.session_authenticated)
    }

    pub fn set_session_authenticated_timeout(&self, timeout: Duration) {
        store(&self.timeouts.session_authenticated, timeout);
    }

    fn timeout(&self, class: TimerClass) -> Duration {
        match class {
            TimerClass::Challenge => self.challenge_timeout(),
            TimerClass::ErrorNotification => self.error_notification_timeout(),
            TimerClass::Session => self.session_timeout(),
            TimerClass::SessionAuthenticated => self.session_authenticated_timeout(),
        }
    }

    fn arm(&self, guard: &SessionGuard, class: TimerClass) {
        if !guard.arm_timer(class, self.timeout(class)) {
            debug!(session_id = %guard.session_id, class = %class, "Timer not armed, session evicted");
        }
    }

    /// Handle one inbound EAP packet for `session_id`
    pub async fn handle(&self, session_id: &str, packet: &EapPacket) -> Result<Reply, AkaError> {
        if packet.code != EapCode::Response {
            return Err(AkaError::UnexpectedMessage(format!(
                "expected an EAP Response, got {:?}",
                packet.code
            )));
        }

        match packet.eap_type {
            Some(EapType::Identity) => {
                let preferred = self.methods[0];
                self.handle_identity(session_id, preferred, packet).await
            }
            Some(EapType::Nak) => self.handle_nak(session_id, packet).await,
            Some(EapType::Aka) | Some(EapType::AkaPrime) => {
                self.handle_method_response(session_id, packet).await
            }
            other => {
                let raw = other.map(EapType::as_u8).unwrap_or(0);
                Ok(self
                    .reject(session_id, packet.identifier, AkaError::UnsupportedMethod(raw))
                    .await)
            }
        }
    }

    /// Start authentication from an EAP Response/Identity using `method`
    pub async fn handle_identity(
        &self,
        session_id: &str,
        method: AkaMethod,
        packet: &EapPacket,
    ) -> Result<Reply, AkaError> {
        let Some(identity) = packet.identity().filter(|_| packet.code == EapCode::Response) else {
            return Err(AkaError::UnexpectedMessage(format!(
                "expected EAP Response/Identity, got {:?}/{:?}",
                packet.code, packet.eap_type
            )));
        };

        if !self.methods.contains(&method) {
            return Ok(self
                .reject(
                    session_id,
                    packet.identifier,
                    AkaError::UnsupportedMethod(method.as_u8()),
                )
                .await);
        }

        let mut guard = self.registry.get_or_create(session_id).await;
        if let Some(reply) = self.retransmission(&guard, packet) {
            return Ok(reply);
        }

        guard.reset();
        guard.method = Some(method);
        self.arm(&guard, TimerClass::Session);

        info!(
            session_id = %session_id,
            method = %method,
            identifier = packet.identifier,
            identity = %identity,
            "EAP identity received"
        );
        self.audit
            .log(
                AuditEntry::new(AuditEventType::AuthAttempt)
                    .with_session_id(session_id)
                    .with_method(method.as_u8())
                    .with_identifier(packet.identifier)
                    .with_details(identity.clone()),
            )
            .await;

        let reply = if method.is_permanent_identity(&identity) {
            self.issue_challenge(&mut guard, method, &identity, packet.identifier)
                .await
        } else {
            guard.transition(SessionState::IdentityRequested)?;
            identity_request(packet.identifier.wrapping_add(1), method)
        };

        Ok(self.finish(&mut guard, packet, reply))
    }

    async fn handle_nak(&self, session_id: &str, packet: &EapPacket) -> Result<Reply, AkaError> {
        let desired = packet.desired_types().unwrap_or(&[]);
        let identifier = packet.identifier;

        let mut guard = self.registry.get_or_create(session_id).await;
        if let Some(reply) = self.retransmission(&guard, packet) {
            return Ok(reply);
        }

        // Before any exchange the server's preference wins; after an
        // Identity-Request the peer's does, and it must name a different
        // method. Later Naks end the session.
        let current = guard.method;
        let next = match guard.state {
            SessionState::Start => self
                .methods
                .iter()
                .copied()
                .find(|method| desired.contains(&method.as_u8())),
            SessionState::IdentityRequested => desired
                .iter()
                .filter_map(|raw| AkaMethod::from_u8(*raw))
                .find(|method| self.methods.contains(method) && Some(*method) != current),
            _ => None,
        };

        let Some(method) = next else {
            let raw = desired.first().copied().unwrap_or(0);
            return Ok(self
                .close(&guard, identifier, AkaError::UnsupportedMethod(raw))
                .await);
        };

        info!(
            session_id = %session_id,
            method = %method,
            identifier = identifier,
            desired = ?desired,
            "Nak accepted, requesting identity"
        );
        guard.method = Some(method);
        guard.transition(SessionState::IdentityRequested)?;
        self.arm(&guard, TimerClass::Session);

        let reply = identity_request(identifier.wrapping_add(1), method);
        Ok(self.finish(&mut guard, packet, reply))
    }

    async fn handle_method_response(
        &self,
        session_id: &str,
        packet: &EapPacket,
    ) -> Result<Reply, AkaError> {
        let message = AkaMessage::from_eap(packet)?;
        let method = message.method;
        let identifier = packet.identifier;

        if !self.methods.contains(&method) {
            return Ok(self
                .reject(session_id, identifier, AkaError::UnsupportedMethod(method.as_u8()))
                .await);
        }

        let Some(mut guard) = self.registry.lock(session_id).await else {
            return Ok(self.expired(session_id, method, identifier));
        };
        if let Some(reply) = self.retransmission(&guard, packet) {
            return Ok(reply);
        }

        if guard.method != Some(method) {
            let err = AkaError::UnexpectedMessage(format!(
                "{} response on a session negotiated for {:?}",
                method, guard.method
            ));
            let reply = self.notify_failure(&mut guard, method, identifier, err).await;
            return Ok(self.finish(&mut guard, packet, reply));
        }

        debug!(
            session_id = %session_id,
            state = guard.state.as_str(),
            subtype = ?message.subtype,
            identifier = identifier,
            "AKA response received"
        );

        let reply = match (guard.state, message.subtype) {
            (SessionState::IdentityRequested, Subtype::Identity) => {
                self.on_permanent_identity(&mut guard, method, &message).await
            }
            (SessionState::ChallengeIssued, Subtype::Challenge) => {
                self.on_challenge_response(&mut guard, method, &message).await
            }
            (SessionState::Authenticated, Subtype::Challenge) => {
                return Ok(self.on_repeated_challenge_response(&guard, method, &message));
            }
            (SessionState::ChallengeIssued, Subtype::SynchronizationFailure) => {
                let err = AkaError::AuthenticationFailed(
                    "synchronization failure, resynchronization not supported".to_string(),
                );
                self.notify_failure(&mut guard, method, identifier, err).await
            }
            (SessionState::FailureNotified, Subtype::Notification) => {
                info!(session_id = %session_id, "Failure notification acknowledged");
                guard.remove();
                return Ok(Reply::new(EapPacket::failure(identifier)));
            }
            (_, Subtype::AuthenticationReject) | (_, Subtype::ClientError) => {
                let code = message
                    .find(AttributeType::ClientErrorCode)
                    .and_then(|attr| attr.as_u16().ok());
                let err = AkaError::AuthenticationFailed(match code {
                    Some(code) => format!("peer client error {}", code),
                    None => format!("peer aborted with {:?}", message.subtype),
                });
                return Ok(self.close(&guard, identifier, err).await);
            }
            (state, subtype) => {
                let err = AkaError::UnexpectedMessage(format!(
                    "{:?} in state {}",
                    subtype,
                    state.as_str()
                ));
                if !state.can_transition_to(&SessionState::FailureNotified) {
                    warn!(session_id = %session_id, error = %err, "Ignoring message for settled session");
                    return Ok(Reply::new(failure_notification(identifier, method)));
                }
                self.notify_failure(&mut guard, method, identifier, err).await
            }
        };

        Ok(self.finish(&mut guard, packet, reply))
    }

    async fn on_permanent_identity(
        &self,
        guard: &mut SessionGuard,
        method: AkaMethod,
        message: &AkaMessage,
    ) -> EapPacket {
        let identity = match message.find(AttributeType::Identity).map(|a| a.as_string()) {
            Some(Ok(identity)) => identity,
            Some(Err(e)) => {
                let err = AkaError::IdentityMismatch(format!("malformed AT_IDENTITY: {}", e));
                return self.notify_failure(guard, method, message.identifier, err).await;
            }
            None => {
                let err = AkaError::IdentityMismatch("AT_IDENTITY missing".to_string());
                return self.notify_failure(guard, method, message.identifier, err).await;
            }
        };

        self.issue_challenge(guard, method, &identity, message.identifier)
            .await
    }

    /// Validate the PLMN, fetch a vector and build the Challenge
    ///
    /// The session lock is held across the vector fetch, so duplicates of
    /// this request wait and then see the issued challenge.
    async fn issue_challenge(
        &self,
        guard: &mut SessionGuard,
        method: AkaMethod,
        identity: &str,
        identifier: u8,
    ) -> EapPacket {
        let Some(imsi) = imsi_from_identity(identity, method) else {
            let err = AkaError::IdentityMismatch(format!(
                "{} is not a permanent {} identity",
                identity, method
            ));
            return self.notify_failure(guard, method, identifier, err).await;
        };

        guard.identity = Some(identity.to_string());
        guard.imsi = Some(imsi.clone());

        if !self.plmn.accepts(&imsi) {
            return self
                .notify_failure(guard, method, identifier, AkaError::PlmnRejected(imsi))
                .await;
        }

        let vector = match self.vectors.fetch_vector(&imsi).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(session_id = %guard.session_id, imsi = %imsi, kind = e.kind(), "Vector fetch failed");
                return self.notify_failure(guard, method, identifier, e.into()).await;
            }
        };

        if guard.is_evicted() {
            return self.expired(&guard.session_id, method, identifier).packet;
        }

        let keys = match SessionKeys::derive(
            method,
            identity.as_bytes(),
            &vector.ck,
            &vector.ik,
            &self.network_name,
            &vector.autn,
        ) {
            Ok(keys) => keys,
            Err(e) => return self.notify_failure(guard, method, identifier, e.into()).await,
        };

        let packet = match challenge_request(
            identifier.wrapping_add(1),
            method,
            &vector.rand,
            &vector.autn,
            Some(&self.network_name),
            &keys.k_aut,
        ) {
            Ok(packet) => packet,
            Err(e) => return self.notify_failure(guard, method, identifier, e.into()).await,
        };

        if let Err(e) = guard.transition(SessionState::ChallengeIssued) {
            return self.notify_failure(guard, method, identifier, e.into()).await;
        }
        guard.challenge = Some(PendingChallenge {
            rand: vector.rand,
            autn: vector.autn,
            xres: vector.xres,
            k_aut: keys.k_aut,
            msk: keys.msk,
            msisdn: vector.msisdn,
        });
        self.arm(guard, TimerClass::Challenge);

        info!(
            session_id = %guard.session_id,
            imsi = %imsi,
            method = %method,
            identifier = packet.identifier,
            "Challenge issued"
        );
        packet
    }

    async fn on_challenge_response(
        &self,
        guard: &mut SessionGuard,
        method: AkaMethod,
        message: &AkaMessage,
    ) -> EapPacket {
        let validated = guard
            .challenge
            .as_ref()
            .map(|challenge| challenge_validates(challenge, message))
            .unwrap_or(false);
        if !validated {
            let err = AkaError::AuthenticationFailed("AT_MAC or AT_RES mismatch".to_string());
            return self
                .notify_failure(guard, method, message.identifier, err)
                .await;
        }

        if guard.is_evicted() {
            return self.expired(&guard.session_id, method, message.identifier).packet;
        }

        if let Err(e) = guard.transition(SessionState::Authenticated) {
            return self
                .notify_failure(guard, method, message.identifier, e.into())
                .await;
        }
        let success = EapPacket::success(message.identifier);
        guard.success_packet = Some(success.clone());
        self.arm(guard, TimerClass::SessionAuthenticated);

        let imsi = guard.imsi.clone().unwrap_or_default();
        info!(
            session_id = %guard.session_id,
            imsi = %imsi,
            method = %method,
            identifier = message.identifier,
            "Authentication succeeded"
        );
        self.audit
            .log(
                AuditEntry::new(AuditEventType::AuthSuccess)
                    .with_session_id(guard.session_id.clone())
                    .with_imsi(imsi)
                    .with_method(method.as_u8())
                    .with_identifier(message.identifier),
            )
            .await;
        success
    }

    /// Re-acknowledge a retransmitted Challenge response without touching state
    fn on_repeated_challenge_response(
        &self,
        guard: &SessionGuard,
        method: AkaMethod,
        message: &AkaMessage,
    ) -> Reply {
        let validated = guard
            .challenge
            .as_ref()
            .map(|challenge| challenge_validates(challenge, message))
            .unwrap_or(false);

        match (&guard.success_packet, validated) {
            (Some(success), true) => {
                debug!(session_id = %guard.session_id, "Re-sending stored Success");
                Reply {
                    packet: success.clone(),
                    success: success_context(guard),
                }
            }
            _ => {
                warn!(
                    session_id = %guard.session_id,
                    identifier = message.identifier,
                    "Repeated Challenge response does not validate"
                );
                Reply::new(failure_notification(message.identifier, method))
            }
        }
    }

    /// Send Notification(Failure) and wait for the peer to acknowledge it
    async fn notify_failure(
        &self,
        guard: &mut SessionGuard,
        method: AkaMethod,
        identifier: u8,
        err: AkaError,
    ) -> EapPacket {
        warn!(
            session_id = %guard.session_id,
            method = %method,
            identifier = identifier,
            error = %err,
            "Authentication failed, sending failure notification"
        );
        self.audit_failure(guard, identifier, &err).await;

        if guard.transition(SessionState::FailureNotified).is_ok() {
            guard.challenge = None;
            self.arm(guard, TimerClass::ErrorNotification);
        }
        failure_notification(identifier, method)
    }

    /// Answer EAP Failure and forget the session
    async fn close(&self, guard: &SessionGuard, identifier: u8, err: AkaError) -> Reply {
        warn!(
            session_id = %guard.session_id,
            identifier = identifier,
            error = %err,
            "Ending session with EAP Failure"
        );
        self.audit_failure(guard, identifier, &err).await;
        guard.remove();
        Reply::new(EapPacket::failure(identifier))
    }

    /// EAP Failure for a method this server will not run
    async fn reject(&self, session_id: &str, identifier: u8, err: AkaError) -> Reply {
        match self.registry.lock(session_id).await {
            Some(guard) => self.close(&guard, identifier, err).await,
            None => {
                warn!(session_id = %session_id, identifier = identifier, error = %err, "Rejecting packet");
                self.audit
                    .log(
                        AuditEntry::new(AuditEventType::AuthFailure)
                            .with_session_id(session_id)
                            .with_identifier(identifier)
                            .with_details(err.to_string()),
                    )
                    .await;
                Reply::new(EapPacket::failure(identifier))
            }
        }
    }

    /// Absent-session policy: terminate with Notification(Failure)
    fn expired(&self, session_id: &str, method: AkaMethod, identifier: u8) -> Reply {
        let err = AkaError::SessionExpired(session_id.to_string());
        warn!(session_id = %session_id, identifier = identifier, error = %err, "No live session");
        Reply::new(failure_notification(identifier, method))
    }

    async fn audit_failure(&self, session: &Session, identifier: u8, err: &AkaError) {
        let mut entry = AuditEntry::new(err.audit_event())
            .with_session_id(session.session_id.clone())
            .with_identifier(identifier)
            .with_details(err.to_string());
        if let Some(method) = session.method {
            entry = entry.with_method(method.as_u8());
        }
        if let Some(imsi) = &session.imsi {
            entry = entry.with_imsi(imsi.clone());
        }
        self.audit.log(entry).await;
    }

    /// Replay the previous reply if the peer repeated its last packet
    fn retransmission(&self, guard: &SessionGuard, packet: &EapPacket) -> Option<Reply> {
        if guard.state == SessionState::Start || guard.last_response.as_ref() != Some(packet) {
            return None;
        }
        let reply = guard.last_request.clone()?;
        debug!(
            session_id = %guard.session_id,
            identifier = packet.identifier,
            "Duplicate response, re-sending last request"
        );
        let success = if reply.code == EapCode::Success {
            success_context(guard)
        } else {
            None
        };
        Some(Reply {
            packet: reply,
            success,
        })
    }

    fn finish(&self, guard: &mut SessionGuard, inbound: &EapPacket, reply: EapPacket) -> Reply {
        guard.last_response = Some(inbound.clone());
        guard.last_request = Some(reply.clone());
        let success = if reply.code == EapCode::Success {
            success_context(guard)
        } else {
            None
        };
        Reply {
            packet: reply,
            success,
        }
    }
}

fn failure_notification(identifier: u8, method: AkaMethod) -> EapPacket {
    notification_request(identifier, method, notification::GENERAL_FAILURE)
}

fn challenge_validates(challenge: &PendingChallenge, message: &AkaMessage) -> bool {
    if !message.verify_mac(&challenge.k_aut) {
        return false;
    }
    message
        .find(AttributeType::Res)
        .and_then(|attr| attr.as_res().ok())
        .map(|res| verify_equal(&challenge.xres, &res))
        .unwrap_or(false)
}

fn success_context(session: &Session) -> Option<SuccessContext> {
    if session.state != SessionState::Authenticated {
        return None;
    }
    let challenge = session.challenge.as_ref()?;
    Some(SuccessContext {
        imsi: session.imsi.clone()?,
        msisdn: challenge.msisdn.clone(),
        method: session.method?,
        msk: challenge.msk,
    })
}

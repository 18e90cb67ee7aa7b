//! End-to-end tests for the EAP-AKA engine
//!
//! These tests drive `AkaEngine` the way a peer would:
//! - Full AKA and AKA' exchanges
//! - PLMN filtering
//! - Nak negotiation
//! - Timer eviction and the absent-session policy
//! - Idempotent retransmission
//! - Concurrent sessions and duplicate requests

use async_trait::async_trait;
use eap_aka_proto::aka::{
    authentication_reject, challenge_response, identity_response, notification,
    notification_response, synchronization_failure,
};
use eap_aka_proto::{
    AkaMessage, AkaMethod, AttributeType, EapCode, EapPacket, SessionKeys, Subtype,
};
use eap_aka_server::{
    AkaEngine, AuditEventType, AuditLogger, AuthVector, Config, SessionRegistry, SessionState,
    StaticVectorSource, TimerClass, VectorError, VectorSource,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const IMSI: &str = "001010000000001";

/// Vector source that counts fetches and can be slowed down
struct CountingSource {
    inner: StaticVectorSource,
    fetches: AtomicUsize,
    delay: Duration,
}

impl CountingSource {
    fn new(delay: Duration) -> Arc<Self> {
        let inner = StaticVectorSource::new();
        inner.insert(IMSI, vector());
        Arc::new(CountingSource {
            inner,
            fetches: AtomicUsize::new(0),
            delay,
        })
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorSource for CountingSource {
    async fn fetch_vector(&self, imsi: &str) -> Result<AuthVector, VectorError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        self.inner.fetch_vector(imsi).await
    }
}

struct FailingSource;

#[async_trait]
impl VectorSource for FailingSource {
    async fn fetch_vector(&self, _imsi: &str) -> Result<AuthVector, VectorError> {
        Err(VectorError::Transport("connection refused".to_string()))
    }
}

fn vector() -> AuthVector {
    AuthVector {
        rand: [0x11; 16],
        autn: [0x22; 16],
        xres: vec![0x33; 8],
        ck: [0x44; 16],
        ik: [0x55; 16],
        msisdn: Some("15551230001".to_string()),
    }
}

fn permanent_identity(method: AkaMethod) -> String {
    format!(
        "{}{}@wlan.mnc001.mcc001.3gppnetwork.org",
        method.permanent_identity_prefix(),
        IMSI
    )
}

fn session_keys(method: AkaMethod) -> SessionKeys {
    let v = vector();
    SessionKeys::derive(
        method,
        permanent_identity(method).as_bytes(),
        &v.ck,
        &v.ik,
        "WLAN",
        &v.autn,
    )
    .unwrap()
}

fn config_with_methods(methods: Vec<u8>) -> Config {
    Config {
        methods,
        ..Config::default()
    }
}

fn engine(config: &Config, source: &Arc<CountingSource>) -> AkaEngine {
    let vectors: Arc<dyn VectorSource> = source.clone();
    AkaEngine::new(config, SessionRegistry::new(), vectors)
}

fn decode(packet: &EapPacket) -> AkaMessage {
    AkaMessage::from_eap(packet).unwrap()
}

fn assert_failure_notification(packet: &EapPacket, identifier: u8) {
    assert_eq!(packet.code, EapCode::Request);
    assert_eq!(packet.identifier, identifier);
    let message = decode(packet);
    assert_eq!(message.subtype, Subtype::Notification);
    let code = message
        .find(AttributeType::Notification)
        .unwrap()
        .as_u16()
        .unwrap();
    assert_eq!(code, notification::GENERAL_FAILURE);
}

/// Drive a session up to the Challenge and return it
async fn start_challenge(engine: &AkaEngine, session_id: &str, method: AkaMethod) -> EapPacket {
    let reply = engine
        .handle_identity(
            session_id,
            method,
            &EapPacket::identity_response(1, &permanent_identity(method)),
        )
        .await
        .unwrap();
    assert_eq!(decode(&reply.packet).subtype, Subtype::Challenge);
    reply.packet
}

#[tokio::test]
async fn test_full_aka_exchange_via_identity_request() {
    let source = CountingSource::new(Duration::ZERO);
    let engine = engine(&Config::default(), &source);

    let reply = engine
        .handle("sess", &EapPacket::identity_response(236, "anonymous@wlan.example"))
        .await
        .unwrap();
    assert_eq!(
        reply.to_bytes(),
        vec![0x01, 0xed, 0x00, 0x0c, 0x17, 0x05, 0x00, 0x00, 0x0a, 0x01, 0x00, 0x00]
    );

    let identity = permanent_identity(AkaMethod::Aka);
    let reply = engine
        .handle("sess", &identity_response(0xed, AkaMethod::Aka, &identity).unwrap())
        .await
        .unwrap();
    let challenge = decode(&reply.packet);
    assert_eq!(challenge.subtype, Subtype::Challenge);
    assert_eq!(challenge.identifier, 0xee);
    assert_eq!(
        challenge.find(AttributeType::Rand).unwrap().as_block().unwrap(),
        vector().rand
    );
    assert!(challenge.find(AttributeType::KdfInput).is_none());

    let keys = session_keys(AkaMethod::Aka);
    assert!(challenge.verify_mac(&keys.k_aut));

    let reply = engine
        .handle(
            "sess",
            &challenge_response(0xee, AkaMethod::Aka, &vector().xres, &keys.k_aut).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(reply.to_bytes(), vec![0x03, 0xee, 0x00, 0x04]);

    let success = reply.success.unwrap();
    assert_eq!(success.imsi, IMSI);
    assert_eq!(success.method, AkaMethod::Aka);
    assert_eq!(success.msk, keys.msk);
    assert_eq!(source.fetches(), 1);
}

#[tokio::test]
async fn test_full_aka_prime_exchange() {
    let source = CountingSource::new(Duration::ZERO);
    let engine = engine(&config_with_methods(vec![50]), &source);

    let identity = permanent_identity(AkaMethod::AkaPrime);
    let reply = engine
        .handle("sess", &EapPacket::identity_response(10, &identity))
        .await
        .unwrap();
    assert_eq!(reply.packet.eap_type.map(|t| t.as_u8()), Some(50));

    let challenge = decode(&reply.packet);
    assert_eq!(challenge.method, AkaMethod::AkaPrime);
    assert_eq!(
        challenge.find(AttributeType::KdfInput).unwrap().as_string().unwrap(),
        "WLAN"
    );
    assert_eq!(challenge.find(AttributeType::Kdf).unwrap().as_u16().unwrap(), 1);

    let keys = session_keys(AkaMethod::AkaPrime);
    assert_eq!(keys.k_aut.len(), 32);
    assert!(challenge.verify_mac(&keys.k_aut));

    let reply = engine
        .handle(
            "sess",
            &challenge_response(11, AkaMethod::AkaPrime, &vector().xres, &keys.k_aut).unwrap(),
        )
        .await
        .unwrap();
    assert!(reply.is_success());
    assert_eq!(reply.success.unwrap().msk, keys.msk);
    assert_ne!(keys.msk, session_keys(AkaMethod::Aka).msk);
}

#[tokio::test]
async fn test_plmn_rejected_without_vector_fetch() {
    let source = CountingSource::new(Duration::ZERO);
    let config = Config {
        plmn_ids: vec!["001011".to_string()],
        ..Config::default()
    };
    let engine = engine(&config, &source);

    let reply = engine
        .handle(
            "sess",
            &EapPacket::identity_response(42, &permanent_identity(AkaMethod::Aka)),
        )
        .await
        .unwrap();

    assert_failure_notification(&reply.packet, 42);
    assert_eq!(source.fetches(), 0);
    assert_eq!(
        engine.registry().timer_class("sess"),
        Some(TimerClass::ErrorNotification)
    );
}

#[tokio::test]
async fn test_plmn_accepted() {
    let source = CountingSource::new(Duration::ZERO);
    let config = Config {
        plmn_ids: vec!["99999".to_string(), "00101".to_string()],
        ..Config::default()
    };
    let engine = engine(&config, &source);

    start_challenge(&engine, "sess", AkaMethod::Aka).await;
    assert_eq!(source.fetches(), 1);
}

#[tokio::test]
async fn test_nak_scenario() {
    let source = CountingSource::new(Duration::ZERO);
    let engine = engine(&Config::default(), &source);

    let reply = engine
        .handle("sess", &EapPacket::identity_response(0xec, "anonymous@realm"))
        .await
        .unwrap();
    assert_eq!(reply.packet.identifier, 0xed);

    // Peer only wants AKA', which is not enabled
    let reply = engine
        .handle("sess", &EapPacket::nak(0xed, &[50]))
        .await
        .unwrap();
    assert_eq!(reply.to_bytes(), vec![0x04, 0xed, 0x00, 0x04]);
    assert!(!engine.registry().contains("sess"));

    let reply = engine
        .handle("sess", &EapPacket::nak(0xec, &[50, 23]))
        .await
        .unwrap();
    assert_eq!(
        reply.to_bytes(),
        vec![0x01, 0xed, 0x00, 0x0c, 0x17, 0x05, 0x00, 0x00, 0x0a, 0x01, 0x00, 0x00]
    );
    assert_eq!(
        engine.registry().update("sess", |s| s.state).await,
        Some(SessionState::IdentityRequested)
    );
}

#[tokio::test]
async fn test_nak_renegotiates_to_aka_prime() {
    let source = CountingSource::new(Duration::ZERO);
    let engine = engine(&config_with_methods(vec![23, 50]), &source);

    engine
        .handle("sess", &EapPacket::identity_response(1, "anonymous@realm"))
        .await
        .unwrap();
    let reply = engine
        .handle("sess", &EapPacket::nak(2, &[50]))
        .await
        .unwrap();

    let message = decode(&reply.packet);
    assert_eq!(message.method, AkaMethod::AkaPrime);
    assert_eq!(message.subtype, Subtype::Identity);
    assert_eq!(message.identifier, 3);
    assert!(message.find(AttributeType::PermanentIdReq).is_some());

    // Naking back to the method already in use is not a renegotiation
    let reply = engine
        .handle("sess", &EapPacket::nak(3, &[50]))
        .await
        .unwrap();
    assert_eq!(reply.packet.code, EapCode::Failure);
}

#[tokio::test]
async fn test_nak_without_acceptable_method() {
    let source = CountingSource::new(Duration::ZERO);
    let engine = engine(&Config::default(), &source);

    let reply = engine
        .handle("sess", &EapPacket::nak(7, &[4, 13]))
        .await
        .unwrap();
    assert_eq!(reply.to_bytes(), vec![0x04, 0x07, 0x00, 0x04]);
    assert!(!engine.registry().contains("sess"));
}

#[tokio::test]
async fn test_nak_after_challenge_fails() {
    let source = CountingSource::new(Duration::ZERO);
    let engine = engine(&config_with_methods(vec![23, 50]), &source);

    start_challenge(&engine, "sess", AkaMethod::Aka).await;
    let reply = engine
        .handle("sess", &EapPacket::nak(2, &[50]))
        .await
        .unwrap();
    assert_eq!(reply.to_bytes(), vec![0x04, 0x02, 0x00, 0x04]);
    assert!(!engine.registry().contains("sess"));
}

#[tokio::test]
async fn test_challenge_timeout_gives_failure_notification() {
    let source = CountingSource::new(Duration::ZERO);
    let engine = engine(&Config::default(), &source);
    engine.set_challenge_timeout(Duration::from_millis(40));

    start_challenge(&engine, "sess", AkaMethod::Aka).await;
    assert_eq!(engine.registry().timer_class("sess"), Some(TimerClass::Challenge));
    sleep(Duration::from_millis(200)).await;
    assert!(!engine.registry().contains("sess"));

    let keys = session_keys(AkaMethod::Aka);
    let reply = engine
        .handle(
            "sess",
            &challenge_response(77, AkaMethod::Aka, &vector().xres, &keys.k_aut).unwrap(),
        )
        .await
        .unwrap();
    assert_failure_notification(&reply.packet, 77);
    assert!(reply.success.is_none());
    assert!(!engine.registry().contains("sess"));
}

#[tokio::test]
async fn test_session_timeout_evicts_identity_requested() {
    let source = CountingSource::new(Duration::ZERO);
    let engine = engine(&Config::default(), &source);
    engine.set_session_timeout(Duration::from_millis(40));

    let reply = engine
        .handle("sess", &EapPacket::identity_response(1, "anonymous@realm"))
        .await
        .unwrap();
    assert_eq!(decode(&reply.packet).subtype, Subtype::Identity);
    assert_eq!(engine.registry().timer_class("sess"), Some(TimerClass::Session));
    sleep(Duration::from_millis(200)).await;
    assert!(!engine.registry().contains("sess"));

    let response =
        identity_response(2, AkaMethod::Aka, &permanent_identity(AkaMethod::Aka)).unwrap();
    let reply = engine.handle("sess", &response).await.unwrap();
    assert_failure_notification(&reply.packet, 2);
    assert!(reply.success.is_none());
    assert_eq!(source.fetches(), 0);
    assert!(!engine.registry().contains("sess"));
}

#[tokio::test]
async fn test_absent_session_response() {
    let source = CountingSource::new(Duration::ZERO);
    let engine = engine(&Config::default(), &source);

    let reply = engine
        .handle("unknown", &notification_response(19, AkaMethod::Aka))
        .await
        .unwrap();
    assert_failure_notification(&reply.packet, 19);
    assert!(!engine.registry().contains("unknown"));
}

#[tokio::test]
async fn test_success_is_idempotent() {
    let source = CountingSource::new(Duration::ZERO);
    let engine = engine(&Config::default(), &source);
    let challenge = start_challenge(&engine, "sess", AkaMethod::Aka).await;

    let keys = session_keys(AkaMethod::Aka);
    let response =
        challenge_response(challenge.identifier, AkaMethod::Aka, &vector().xres, &keys.k_aut)
            .unwrap();

    let first = engine.handle("sess", &response).await.unwrap();
    let second = engine.handle("sess", &response).await.unwrap();
    assert!(first.is_success());
    assert_eq!(first.to_bytes(), second.to_bytes());
    assert_eq!(first.success.unwrap().msk, second.success.unwrap().msk);

    // A freshly signed copy under a new identifier still gets the stored Success
    let resigned = challenge_response(99, AkaMethod::Aka, &vector().xres, &keys.k_aut).unwrap();
    let third = engine.handle("sess", &resigned).await.unwrap();
    assert_eq!(
        third.to_bytes(),
        EapPacket::success(challenge.identifier).to_bytes()
    );

    assert_eq!(source.fetches(), 1);
    assert_eq!(
        engine.registry().timer_class("sess"),
        Some(TimerClass::SessionAuthenticated)
    );
}

#[tokio::test]
async fn test_invalid_repeat_after_success_leaves_session() {
    let source = CountingSource::new(Duration::ZERO);
    let engine = engine(&Config::default(), &source);
    let challenge = start_challenge(&engine, "sess", AkaMethod::Aka).await;

    let keys = session_keys(AkaMethod::Aka);
    let response =
        challenge_response(challenge.identifier, AkaMethod::Aka, &vector().xres, &keys.k_aut)
            .unwrap();
    assert!(engine.handle("sess", &response).await.unwrap().is_success());

    let forged = challenge_response(challenge.identifier, AkaMethod::Aka, &[0; 8], &keys.k_aut)
        .unwrap();
    let reply = engine.handle("sess", &forged).await.unwrap();
    assert_failure_notification(&reply.packet, challenge.identifier);

    assert_eq!(
        engine.registry().update("sess", |s| s.state).await,
        Some(SessionState::Authenticated)
    );
    assert!(engine.handle("sess", &response).await.unwrap().is_success());
}

#[tokio::test]
async fn test_authenticated_session_expires() {
    let source = CountingSource::new(Duration::ZERO);
    let engine = engine(&Config::default(), &source);
    engine.set_session_authenticated_timeout(Duration::from_millis(40));

    let challenge = start_challenge(&engine, "sess", AkaMethod::Aka).await;
    let keys = session_keys(AkaMethod::Aka);
    let response =
        challenge_response(challenge.identifier, AkaMethod::Aka, &vector().xres, &keys.k_aut)
            .unwrap();
    assert!(engine.handle("sess", &response).await.unwrap().is_success());

    sleep(Duration::from_millis(200)).await;
    assert!(!engine.registry().contains("sess"));
    let reply = engine.handle("sess", &response).await.unwrap();
    assert_failure_notification(&reply.packet, challenge.identifier);
}

#[tokio::test]
async fn test_wrong_mac_then_notification_ack() {
    let source = CountingSource::new(Duration::ZERO);
    let engine = engine(&Config::default(), &source);
    let challenge = start_challenge(&engine, "sess", AkaMethod::Aka).await;

    let response =
        challenge_response(challenge.identifier, AkaMethod::Aka, &vector().xres, &[0xaa; 16])
            .unwrap();
    let reply = engine.handle("sess", &response).await.unwrap();
    assert_failure_notification(&reply.packet, challenge.identifier);

    let reply = engine
        .handle("sess", &notification_response(challenge.identifier, AkaMethod::Aka))
        .await
        .unwrap();
    assert_eq!(reply.packet, EapPacket::failure(challenge.identifier));
    assert!(!engine.registry().contains("sess"));
}

#[tokio::test]
async fn test_authentication_reject_ends_session() {
    let source = CountingSource::new(Duration::ZERO);
    let engine = engine(&Config::default(), &source);
    let challenge = start_challenge(&engine, "sess", AkaMethod::Aka).await;

    let reply = engine
        .handle("sess", &authentication_reject(challenge.identifier, AkaMethod::Aka))
        .await
        .unwrap();
    assert_eq!(reply.packet, EapPacket::failure(challenge.identifier));
    assert!(!engine.registry().contains("sess"));
}

#[tokio::test]
async fn test_synchronization_failure_notifies() {
    let source = CountingSource::new(Duration::ZERO);
    let engine = engine(&Config::default(), &source);
    let challenge = start_challenge(&engine, "sess", AkaMethod::Aka).await;

    let reply = engine
        .handle(
            "sess",
            &synchronization_failure(challenge.identifier, AkaMethod::Aka, &[0x5a; 14]),
        )
        .await
        .unwrap();
    assert_failure_notification(&reply.packet, challenge.identifier);
    assert_eq!(
        engine.registry().update("sess", |s| s.state).await,
        Some(SessionState::FailureNotified)
    );
}

#[tokio::test]
async fn test_vector_source_failure_notifies() {
    let engine = AkaEngine::new(
        &Config::default(),
        SessionRegistry::new(),
        Arc::new(FailingSource),
    );
    let reply = engine
        .handle(
            "sess",
            &EapPacket::identity_response(3, &permanent_identity(AkaMethod::Aka)),
        )
        .await
        .unwrap();
    assert_failure_notification(&reply.packet, 3);
}

#[tokio::test]
async fn test_wrong_method_identity_prefix() {
    let source = CountingSource::new(Duration::ZERO);
    let engine = engine(&Config::default(), &source);

    engine
        .handle("sess", &EapPacket::identity_response(1, "anonymous@realm"))
        .await
        .unwrap();
    let reply = engine
        .handle(
            "sess",
            &identity_response(2, AkaMethod::Aka, &permanent_identity(AkaMethod::AkaPrime))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_failure_notification(&reply.packet, 2);
    assert_eq!(source.fetches(), 0);
}

#[tokio::test]
async fn test_new_identity_restarts_session() {
    let source = CountingSource::new(Duration::ZERO);
    let engine = engine(&Config::default(), &source);
    start_challenge(&engine, "sess", AkaMethod::Aka).await;

    let reply = engine
        .handle("sess", &EapPacket::identity_response(50, "anonymous@realm"))
        .await
        .unwrap();
    assert_eq!(decode(&reply.packet).subtype, Subtype::Identity);
    assert_eq!(
        engine.registry().update("sess", |s| s.challenge.is_none()).await,
        Some(true)
    );
}

#[tokio::test]
async fn test_concurrent_distinct_sessions() {
    let source = CountingSource::new(Duration::from_millis(5));
    let engine = Arc::new(engine(&Config::default(), &source));
    let keys = session_keys(AkaMethod::Aka);

    let mut handles = Vec::new();
    for i in 0..32 {
        let engine = Arc::clone(&engine);
        let k_aut = keys.k_aut.clone();
        handles.push(tokio::spawn(async move {
            let session_id = format!("sess-{}", i);
            let challenge = start_challenge(&engine, &session_id, AkaMethod::Aka).await;
            let response = challenge_response(
                challenge.identifier,
                AkaMethod::Aka,
                &vector().xres,
                &k_aut,
            )
            .unwrap();
            engine.handle(&session_id, &response).await.unwrap()
        }));
    }

    for handle in handles {
        let reply = handle.await.unwrap();
        assert!(reply.is_success());
        assert_eq!(reply.success.unwrap().msk, keys.msk);
    }
    assert_eq!(source.fetches(), 32);
    assert_eq!(engine.registry().stats().authenticated, 32);
}

#[tokio::test]
async fn test_duplicate_requests_issue_one_challenge() {
    let source = CountingSource::new(Duration::from_millis(20));
    let engine = Arc::new(engine(&Config::default(), &source));
    let packet = EapPacket::identity_response(8, &permanent_identity(AkaMethod::Aka));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let engine = Arc::clone(&engine);
        let packet = packet.clone();
        handles.push(tokio::spawn(async move {
            engine.handle("shared", &packet).await.unwrap().to_bytes()
        }));
    }

    let mut replies = Vec::new();
    for handle in handles {
        replies.push(handle.await.unwrap());
    }
    assert_eq!(source.fetches(), 1);
    assert!(replies.iter().all(|reply| reply == &replies[0]));

    let challenge = EapPacket::from_bytes(&replies[0]).unwrap();
    assert_eq!(decode(&challenge).subtype, Subtype::Challenge);
}

#[tokio::test]
async fn test_eviction_is_audited() {
    let temp_file = tempfile::NamedTempFile::new().unwrap();
    let path = temp_file.path().to_str().unwrap().to_string();
    let audit = Arc::new(AuditLogger::new(Some(path.clone())).unwrap());

    let source = CountingSource::new(Duration::ZERO);
    let engine = engine(&Config::default(), &source).with_audit(audit);
    engine.set_error_notification_timeout(Duration::from_millis(30));

    let reply = engine
        .handle("sess", &EapPacket::identity_response(1, "0123@realm"))
        .await
        .unwrap();
    assert_failure_notification(&reply.packet, 1);

    sleep(Duration::from_millis(200)).await;
    assert!(!engine.registry().contains("sess"));

    let contents = std::fs::read_to_string(&path).unwrap();
    let events: Vec<AuditEventType> = contents
        .lines()
        .map(|line| serde_json::from_str::<eap_aka_server::AuditEntry>(line).unwrap().event_type)
        .collect();
    assert!(events.contains(&AuditEventType::AuthAttempt));
    assert!(events.contains(&AuditEventType::AuthFailure));
    assert!(events.contains(&AuditEventType::SessionEvicted));
}

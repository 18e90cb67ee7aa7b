//! Full AKA and AKA' exchanges driven through the public codec API

use eap_aka_proto::aka::{
    challenge_request, challenge_response, identity_request, identity_response,
};
use eap_aka_proto::{
    AkaMessage, AkaMethod, AttributeType, EapCode, EapPacket, MppeKeys, SessionKeys, Subtype,
    decode_vendor_key,
};

const IDENTITY: &str = "0001010000000001@wlan.mnc001.mcc001.3gppnetwork.org";

struct Vector {
    rand: [u8; 16],
    autn: [u8; 16],
    xres: Vec<u8>,
    ck: [u8; 16],
    ik: [u8; 16],
}

fn vector() -> Vector {
    Vector {
        rand: [0x10; 16],
        autn: [0x20; 16],
        xres: vec![0x30; 8],
        ck: [0x40; 16],
        ik: [0x50; 16],
    }
}

fn run_exchange(method: AkaMethod, identity: &str) {
    let v = vector();

    // Server asks for the permanent identity
    let request = identity_request(10, method);
    let wire = EapPacket::from_bytes(&request.to_bytes()).unwrap();
    let message = AkaMessage::from_eap(&wire).unwrap();
    assert_eq!(message.subtype, Subtype::Identity);

    // Peer answers
    let response = identity_response(10, method, identity).unwrap();
    let message = AkaMessage::from_eap(&EapPacket::from_bytes(&response.to_bytes()).unwrap())
        .unwrap();
    let learned = message
        .require(AttributeType::Identity)
        .unwrap()
        .as_string()
        .unwrap();
    assert_eq!(learned, identity);

    // Server derives keys and challenges
    let server_keys = SessionKeys::derive(
        method,
        learned.as_bytes(),
        &v.ck,
        &v.ik,
        "WLAN",
        &v.autn,
    )
    .unwrap();
    let challenge = challenge_request(
        11,
        method,
        &v.rand,
        &v.autn,
        Some("WLAN"),
        &server_keys.k_aut,
    )
    .unwrap();

    // Peer decodes the challenge, derives the same keys and checks AT_MAC
    let message =
        AkaMessage::from_eap(&EapPacket::from_bytes(&challenge.to_bytes()).unwrap()).unwrap();
    assert_eq!(message.code, EapCode::Request);
    let rand = message.require(AttributeType::Rand).unwrap().as_block().unwrap();
    let autn = message.require(AttributeType::Autn).unwrap().as_block().unwrap();
    assert_eq!(rand, v.rand);
    let network_name = match method {
        AkaMethod::Aka => "WLAN".to_string(),
        AkaMethod::AkaPrime => message
            .require(AttributeType::KdfInput)
            .unwrap()
            .as_string()
            .unwrap(),
    };
    let peer_keys =
        SessionKeys::derive(method, identity.as_bytes(), &v.ck, &v.ik, &network_name, &autn)
            .unwrap();
    assert!(message.verify_mac(&peer_keys.k_aut));

    // Peer responds; server checks AT_MAC and AT_RES
    let response = challenge_response(11, method, &v.xres, &peer_keys.k_aut).unwrap();
    let message =
        AkaMessage::from_eap(&EapPacket::from_bytes(&response.to_bytes()).unwrap()).unwrap();
    assert!(message.verify_mac(&server_keys.k_aut));
    assert_eq!(
        message.require(AttributeType::Res).unwrap().as_res().unwrap(),
        v.xres
    );

    // Both sides agree on the MSK
    assert_eq!(server_keys.msk, peer_keys.msk);

    let auth = [0x77u8; 16];
    let mppe = MppeKeys::from_msk(&server_keys.msk, &auth, b"radius-secret").unwrap();
    assert_eq!(
        decode_vendor_key(&mppe.recv_key, &auth, b"radius-secret").unwrap(),
        server_keys.msk[..32].to_vec()
    );
}

#[test]
fn test_aka_exchange() {
    run_exchange(AkaMethod::Aka, IDENTITY);
}

#[test]
fn test_aka_prime_exchange() {
    run_exchange(
        AkaMethod::AkaPrime,
        "6001010000000001@wlan.mnc001.mcc001.3gppnetwork.org",
    );
}

#[test]
fn test_methods_produce_different_msk() {
    let v = vector();
    let aka = SessionKeys::derive(AkaMethod::Aka, b"0001", &v.ck, &v.ik, "WLAN", &v.autn).unwrap();
    let prime =
        SessionKeys::derive(AkaMethod::AkaPrime, b"0001", &v.ck, &v.ik, "WLAN", &v.autn).unwrap();
    assert_ne!(aka.msk, prime.msk);
    assert_eq!(aka.k_aut.len(), 16);
    assert_eq!(prime.k_aut.len(), 32);
}
